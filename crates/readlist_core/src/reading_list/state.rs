use crate::reading_list::types::{ReadingListEntry, ReadingStatus};

/// Which entries a list view shows.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum StatusFilter {
    #[default]
    All,
    Only(ReadingStatus),
}

impl StatusFilter {
    #[must_use]
    #[inline]
    pub fn admits(self, status: ReadingStatus) -> bool {
        match self {
            Self::All => true,
            Self::Only(wanted) => wanted == status,
        }
    }
}

/// Client-side copy of the user's reading list, kept in step with the mutations issued through
/// `ReadingListService`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReadingListState {
    entries: Vec<ReadingListEntry>,
}

impl ReadingListState {
    #[must_use]
    #[inline]
    pub const fn from_entries(entries: Vec<ReadingListEntry>) -> Self {
        Self { entries }
    }

    #[must_use]
    #[inline]
    pub fn entries(&self) -> &[ReadingListEntry] {
        &self.entries
    }

    #[must_use]
    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Replaces the entry with the same id or, failing that, the same book. Appends otherwise.
    #[allow(clippy::missing_inline_in_public_items, reason = "Called rarely")]
    pub fn apply_upsert(&mut self, entry: ReadingListEntry) {
        let position = self
            .entries
            .iter()
            .position(|existing| existing.id == entry.id)
            .or_else(|| {
                self.entries
                    .iter()
                    .position(|existing| existing.book_id == entry.book_id)
            });
        match position.and_then(|index| self.entries.get_mut(index)) {
            Some(existing) => {
                // keep the expanded book if the mutation response didn't carry it
                let book = entry.book.clone().or_else(|| existing.book.take());
                *existing = ReadingListEntry { book, ..entry };
            }
            None => self.entries.push(entry),
        }
    }

    /// Drops the entry and hands it back, so a failed removal can be rolled back with
    /// [`Self::restore`].
    #[allow(clippy::missing_inline_in_public_items, reason = "Called rarely")]
    pub fn apply_removal(&mut self, entry_id: &str) -> Option<(usize, ReadingListEntry)> {
        let index = self.entries.iter().position(|entry| entry.id == entry_id)?;
        Some((index, self.entries.remove(index)))
    }

    /// Puts a removed entry back at its old position.
    #[allow(clippy::missing_inline_in_public_items, reason = "Called rarely")]
    pub fn restore(&mut self, index: usize, entry: ReadingListEntry) {
        let index = index.min(self.entries.len());
        self.entries.insert(index, entry);
    }

    #[allow(clippy::missing_inline_in_public_items, reason = "Called on every render")]
    pub fn filtered(&self, filter: StatusFilter) -> impl Iterator<Item = &ReadingListEntry> {
        self.entries
            .iter()
            .filter(move |entry| filter.admits(entry.status))
    }

    #[must_use]
    #[allow(clippy::missing_inline_in_public_items, reason = "Called on every render")]
    pub fn find_by_book(&self, book_id: &str) -> Option<&ReadingListEntry> {
        self.entries.iter().find(|entry| entry.book_id == book_id)
    }

    /// Number of entries per status, in declaration order of `ReadingStatus`.
    #[must_use]
    #[allow(clippy::missing_inline_in_public_items, reason = "Called rarely")]
    pub fn counts(&self) -> [(ReadingStatus, usize); 4] {
        [
            ReadingStatus::ToRead,
            ReadingStatus::Reading,
            ReadingStatus::Completed,
            ReadingStatus::Dropped,
        ]
        .map(|status| {
            let count = self
                .entries
                .iter()
                .filter(|entry| entry.status == status)
                .count();
            (status, count)
        })
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    reason = "Tests are predefined and guaranteed to be Some/Ok"
)]
mod tests {
    use super::*;
    use crate::catalog::normalize::CoverUrls;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn entry(id: &str, book: &str, status: &str) -> ReadingListEntry {
        ReadingListEntry::from_record(
            json!({"id": id, "user": "u1", "book": book, "status": status,
                   "expand": {"book": {"id": book, "title": format!("Title of {book}")}}}),
            &CoverUrls::new("https://db", "https://covers"),
        )
        .unwrap()
    }

    fn ids(state: &ReadingListState, filter: StatusFilter) -> Vec<&str> {
        state
            .filtered(filter)
            .map(|entry| entry.id.as_str())
            .collect()
    }

    #[test]
    fn upsert_replaces_by_id_then_by_book() {
        let mut state = ReadingListState::from_entries(vec![
            entry("e1", "b1", "to-read"),
            entry("e2", "b2", "reading"),
        ]);

        let mut updated = entry("e1", "b1", "completed");
        updated.book = None;
        state.apply_upsert(updated);
        assert_eq!(state.len(), 2);
        assert_eq!(state.entries()[0].status, ReadingStatus::Completed);
        assert_eq!(state.entries()[0].book.as_ref().unwrap().title, "Title of b1");

        state.apply_upsert(entry("e9", "b2", "dropped"));
        assert_eq!(state.len(), 2);
        assert_eq!(state.entries()[1].id, "e9");

        state.apply_upsert(entry("e3", "b3", "reading"));
        assert_eq!(state.len(), 3);
    }

    #[test]
    fn removal_can_be_rolled_back() {
        let mut state = ReadingListState::from_entries(vec![
            entry("e1", "b1", "to-read"),
            entry("e2", "b2", "reading"),
            entry("e3", "b3", "reading"),
        ]);

        let (index, removed) = state.apply_removal("e2").unwrap();
        assert_eq!(ids(&state, StatusFilter::All), vec!["e1", "e3"]);
        assert!(state.apply_removal("e2").is_none());

        state.restore(index, removed);
        assert_eq!(ids(&state, StatusFilter::All), vec!["e1", "e2", "e3"]);
    }

    #[test]
    fn filters_by_status() {
        let state = ReadingListState::from_entries(vec![
            entry("e1", "b1", "to-read"),
            entry("e2", "b2", "reading"),
            entry("e3", "b3", "reading"),
        ]);
        assert_eq!(
            ids(&state, StatusFilter::Only(ReadingStatus::Reading)),
            vec!["e2", "e3"]
        );
        assert!(ids(&state, StatusFilter::Only(ReadingStatus::Dropped)).is_empty());
        assert_eq!(state.find_by_book("b3").unwrap().id, "e3");
        assert_eq!(
            state.counts(),
            [
                (ReadingStatus::ToRead, 1),
                (ReadingStatus::Reading, 2),
                (ReadingStatus::Completed, 0),
                (ReadingStatus::Dropped, 0),
            ]
        );
    }
}
