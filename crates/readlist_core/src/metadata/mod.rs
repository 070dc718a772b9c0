//! Metadata API client
//!
//! Read-only access to the public book-metadata API: full-text search, subject browsing, work
//! details and cover image URLs. Records come back in the API's own field naming and are turned
//! into [`crate::catalog::Book`] by [`crate::catalog::normalize`].
pub mod client;
pub mod request_builder;
pub mod types;

pub use client::MetadataClient;
pub use types::{CoverSize, OpenLibraryDoc, SubjectWork, WorkDetails};
