use crate::catalog::normalize::{CoverUrls, normalize};
use crate::catalog::types::{Book, RemoteBookRecord, SourceBook};
use crate::errors::ClientError;
use chrono::{DateTime, NaiveDateTime, Utc};
use core::fmt;
use log::warn;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Value, json};

/// Kinds that are tracked by chapter instead of by page.
const CHAPTER_KINDS: [&str; 5] = ["manga", "manhwa", "manhua", "comic", "webtoon"];

#[non_exhaustive]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ReadingStatus {
    #[default]
    ToRead,
    Reading,
    Completed,
    Dropped,
}

impl ReadingStatus {
    #[must_use]
    #[inline]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ToRead => "to-read",
            Self::Reading => "reading",
            Self::Completed => "completed",
            Self::Dropped => "dropped",
        }
    }

    /// Parses the wire value; `None` for anything that is not a known status.
    #[must_use]
    #[allow(clippy::missing_inline_in_public_items, reason = "Called for every entry")]
    pub fn from_wire(raw: &str) -> Option<Self> {
        match raw.trim() {
            "to-read" => Some(Self::ToRead),
            "reading" => Some(Self::Reading),
            "completed" => Some(Self::Completed),
            "dropped" => Some(Self::Dropped),
            _ => None,
        }
    }
}

#[allow(clippy::missing_inline_in_public_items, reason = "Called rarely")]
impl fmt::Display for ReadingStatus {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

/// Which pair of progress counters applies to a book.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgressUnit {
    Pages,
    Chapters,
}

impl ProgressUnit {
    /// Serialized kinds (manga, comics...) count chapters, everything else counts pages.
    #[must_use]
    #[allow(clippy::missing_inline_in_public_items, reason = "Called rarely")]
    pub fn for_kind(kind: Option<&str>) -> Self {
        match kind {
            Some(kind)
                if CHAPTER_KINDS
                    .iter()
                    .any(|chapter_kind| kind.trim().eq_ignore_ascii_case(chapter_kind)) =>
            {
                Self::Chapters
            }
            _ => Self::Pages,
        }
    }
}

/// Progress counters. Unset counters are 0.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Progress {
    #[serde(default)]
    pub current_page: u32,
    #[serde(default)]
    pub total_pages: u32,
    #[serde(default)]
    pub current_chapter: u32,
    #[serde(default)]
    pub total_chapters: u32,
}

impl Progress {
    #[must_use]
    #[inline]
    pub const fn pages(current_page: u32, total_pages: u32) -> Self {
        Self {
            current_page,
            total_pages,
            current_chapter: 0,
            total_chapters: 0,
        }
    }

    #[must_use]
    #[inline]
    pub const fn chapters(current_chapter: u32, total_chapters: u32) -> Self {
        Self {
            current_page: 0,
            total_pages: 0,
            current_chapter,
            total_chapters,
        }
    }

    /// Rounded completion in percent, 0 when the total is unknown, capped at 100.
    #[must_use]
    #[allow(clippy::missing_inline_in_public_items, reason = "Called rarely")]
    pub fn percent(&self, unit: ProgressUnit) -> u8 {
        let (current, total) = match unit {
            ProgressUnit::Pages => (self.current_page, self.total_pages),
            ProgressUnit::Chapters => (self.current_chapter, self.total_chapters),
        };
        if total == 0 {
            return 0;
        }
        let current = u64::from(current.min(total));
        let total = u64::from(total);
        let rounded = (current * 200 + total) / (total * 2);
        u8::try_from(rounded).unwrap_or(100)
    }
}

/// A reading-list entry linking a user to a book.
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReadingListEntry {
    pub id: String,
    pub user_id: String,
    pub book_id: String,
    /// The referenced book, when the backend expanded the relation
    pub book: Option<Book>,
    pub status: ReadingStatus,
    pub progress: Progress,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl ReadingListEntry {
    /// Parses a raw `reading_list` record.
    /// # Errors
    /// Fails if the record lacks the required fields.
    #[allow(clippy::missing_inline_in_public_items, reason = "Called for every entry")]
    pub fn from_record(record: Value, urls: &CoverUrls) -> Result<Self, ClientError> {
        let record: EntryRecord = serde_json::from_value(record)?;
        let created_at = record
            .date_added
            .as_deref()
            .and_then(parse_timestamp)
            .or_else(|| record.created.as_deref().and_then(parse_timestamp));
        let updated_at = record
            .date_updated
            .as_deref()
            .and_then(parse_timestamp)
            .or_else(|| record.updated.as_deref().and_then(parse_timestamp))
            .or(created_at);

        Ok(Self {
            id: record.id,
            user_id: record.user,
            book_id: record.book,
            book: record
                .expand
                .and_then(|expand| expand.book)
                .map(|book| normalize(SourceBook::Remote(book), urls)),
            status: record.status,
            progress: record.progress,
            created_at,
            updated_at,
        })
    }

    /// Completion in percent, using the unit that fits the expanded book's kind.
    #[must_use]
    #[inline]
    pub fn percent(&self) -> u8 {
        let kind = self.book.as_ref().and_then(|book| book.kind.as_deref());
        self.progress.percent(ProgressUnit::for_kind(kind))
    }
}

/// Wire shape of a `reading_list` record.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EntryRecord {
    id: String,
    #[serde(default)]
    user: String,
    #[serde(default)]
    book: String,
    #[serde(default, deserialize_with = "lenient_status")]
    status: ReadingStatus,
    #[serde(flatten)]
    progress: Progress,
    #[serde(default)]
    date_added: Option<String>,
    #[serde(default)]
    date_updated: Option<String>,
    #[serde(default)]
    created: Option<String>,
    #[serde(default)]
    updated: Option<String>,
    #[serde(default)]
    expand: Option<EntryExpand>,
}

#[derive(Debug, Deserialize)]
struct EntryExpand {
    #[serde(default)]
    book: Option<RemoteBookRecord>,
}

/// The status select is optional on the backend, so blank (or unknown) values read as `to-read`.
fn lenient_status<'de, D>(deserializer: D) -> Result<ReadingStatus, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<String>::deserialize(deserializer)?.unwrap_or_default();
    if let Some(status) = ReadingStatus::from_wire(&raw) {
        return Ok(status);
    }
    if !raw.trim().is_empty() {
        warn!("Unknown reading status {raw:?}, treating it as to-read");
    }
    Ok(ReadingStatus::default())
}

/// Body for a fresh entry.
pub(crate) fn create_body(
    user_id: &str,
    book_id: &str,
    status: ReadingStatus,
    progress: Progress,
    now: DateTime<Utc>,
) -> Value {
    let mut body = update_body(status, progress, now);
    body["user"] = json!(user_id);
    body["book"] = json!(book_id);
    body["dateAdded"] = json!(now.to_rfc3339());
    body
}

/// Body for an in-place update of status and progress.
pub(crate) fn update_body(status: ReadingStatus, progress: Progress, now: DateTime<Utc>) -> Value {
    json!({
        "status": status,
        "currentPage": progress.current_page,
        "totalPages": progress.total_pages,
        "currentChapter": progress.current_chapter,
        "totalChapters": progress.total_chapters,
        "dateUpdated": now.to_rfc3339(),
    })
}

/// Accepts RFC 3339 as well as the backend's `2024-01-15 10:20:30.123Z` format.
fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    DateTime::parse_from_rfc3339(raw)
        .map(|timestamp| timestamp.to_utc())
        .ok()
        .or_else(|| {
            NaiveDateTime::parse_from_str(raw.trim_end_matches('Z'), "%Y-%m-%d %H:%M:%S%.f")
                .ok()
                .map(|naive| naive.and_utc())
        })
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    reason = "Tests are predefined and guaranteed to be Some/Ok"
)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn urls() -> CoverUrls {
        CoverUrls::new("https://db.example.org", "https://covers.openlibrary.org")
    }

    #[test]
    fn parses_record_with_expanded_book() {
        let record = json!({
            "id": "e1",
            "user": "u1",
            "book": "b1",
            "status": "reading",
            "currentPage": 120,
            "totalPages": 180,
            "currentChapter": 0,
            "totalChapters": 0,
            "dateAdded": "2023-01-15T08:00:00Z",
            "created": "2023-01-15 08:00:00.000Z",
            "updated": "2023-02-01 09:30:00.250Z",
            "expand": {"book": {
                "id": "b1",
                "title": "The Great Gatsby",
                "author": "F. Scott Fitzgerald",
                "type": "book"
            }}
        });
        let entry = ReadingListEntry::from_record(record, &urls()).unwrap();
        assert_eq!(entry.status, ReadingStatus::Reading);
        assert_eq!(entry.progress, Progress::pages(120, 180));
        assert_eq!(entry.book.as_ref().unwrap().title, "The Great Gatsby");
        assert_eq!(
            entry.created_at,
            Some(DateTime::parse_from_rfc3339("2023-01-15T08:00:00Z").unwrap().to_utc())
        );
        assert_eq!(
            entry.updated_at,
            Some(DateTime::parse_from_rfc3339("2023-02-01T09:30:00.250Z").unwrap().to_utc())
        );
        assert_eq!(entry.percent(), 67);
    }

    #[test]
    fn missing_progress_defaults_to_zero() {
        let record = json!({"id": "e2", "user": "u1", "book": "b2", "status": "to-read"});
        let entry = ReadingListEntry::from_record(record, &urls()).unwrap();
        assert_eq!(entry.progress, Progress::default());
        assert_eq!(entry.book, None);
        assert_eq!(entry.updated_at, None);
    }

    #[test]
    fn blank_or_unknown_status_reads_as_to_read() {
        for status in [json!(""), json!(null), json!("on-hold")] {
            let record = json!({"id": "e3", "user": "u1", "book": "b3", "status": status});
            let entry = ReadingListEntry::from_record(record, &urls()).unwrap();
            assert_eq!(entry.status, ReadingStatus::ToRead);
        }
        assert_eq!(
            ReadingStatus::from_wire(" completed "),
            Some(ReadingStatus::Completed)
        );
    }

    #[test]
    fn record_without_id_is_rejected() {
        let record = json!({"user": "u1", "book": "b2"});
        assert!(matches!(
            ReadingListEntry::from_record(record, &urls()),
            Err(ClientError::Unknown(_))
        ));
    }

    #[test]
    fn percent_uses_unit_of_kind() {
        let progress = Progress {
            current_page: 10,
            total_pages: 200,
            current_chapter: 950,
            total_chapters: 1088,
        };
        assert_eq!(progress.percent(ProgressUnit::Pages), 5);
        assert_eq!(progress.percent(ProgressUnit::Chapters), 87);
        assert_eq!(Progress::default().percent(ProgressUnit::Pages), 0);
        assert_eq!(Progress::pages(400, 300).percent(ProgressUnit::Pages), 100);
        assert_eq!(ProgressUnit::for_kind(Some("Manhwa")), ProgressUnit::Chapters);
        assert_eq!(ProgressUnit::for_kind(Some("fiction")), ProgressUnit::Pages);
        assert_eq!(ProgressUnit::for_kind(None), ProgressUnit::Pages);
    }

    #[test]
    fn status_uses_kebab_case_on_the_wire() {
        assert_eq!(json!(ReadingStatus::ToRead), json!("to-read"));
        let body = create_body(
            "u1",
            "book-7",
            ReadingStatus::ToRead,
            Progress::default(),
            Utc::now(),
        );
        assert_eq!(body["status"], "to-read");
        assert_eq!(body["user"], "u1");
        assert_eq!(body["currentPage"], 0);
        assert!(body["dateAdded"].is_string());
    }
}
