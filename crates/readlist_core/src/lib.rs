//! `readlist_core`
//!
//! Client-side logic of the readlist library catalog: a personal reading list kept on a hosted
//! record backend, the shared book catalog, a session that survives restarts and lookups against
//! a public book-metadata API. The crate has no view layer; a front end drives it through
//! [`app::LibraryApp`].

pub mod app;

pub mod catalog;

pub mod config;

pub mod errors;

pub mod metadata;

pub mod reading_list;

pub mod remote;

pub mod session;

pub mod storage;

pub mod telemetry;

#[cfg(test)]
mod testing;
