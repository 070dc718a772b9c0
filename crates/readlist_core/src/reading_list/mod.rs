//! The user's reading list
//!
//! Entries link a user to a book with a status and progress counters. There is at most one entry
//! per (user, book): adding a book that is already listed updates the existing entry.
mod retry;
mod service;
mod state;
mod types;

pub use retry::{RetryPolicy, retry_transient};
pub use service::{FETCH_PAGE_SIZE, ReadingListService, Upsert, dedupe_by_book};
pub use state::{ReadingListState, StatusFilter};
pub use types::{Progress, ProgressUnit, ReadingListEntry, ReadingStatus};
