//! Core types and traits for the Tether URL shortener.
//!
//! This crate provides the domain types shared by the storage adapters,
//! the code generator and the shortener service: the short code itself,
//! the stored record, the durable store contract and the error taxonomy.

pub mod error;
pub mod repository;
pub mod shortcode;
pub mod shortener;

pub use error::{ShortenerError, StorageError};
pub use repository::{PendingDelete, Repository, UrlRecord, UrlStats};
pub use shortcode::ShortCode;
pub use shortener::{BatchItem, BatchResult, ShortenParams, ShortenStatus, Shortened, Shortener};
