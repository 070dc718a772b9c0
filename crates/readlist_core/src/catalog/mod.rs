//! The shared book catalog
//!
//! Books live in the backend's `books` collection and can also be looked up in the public
//! metadata API. Both shapes are reconciled into one [`Book`] by [`normalize`].
pub mod normalize;
mod service;
pub mod types;

pub use normalize::{CoverUrls, normalize};
pub use service::{BookService, CATALOG_PAGE_SIZE, RATINGS_PAGE_SIZE};
pub use types::{
    Book, BookSource, CoverImage, NewBook, RatingOutcome, RatingRecord, RemoteBookRecord,
    SourceBook,
};
