//! URL shortener service implementation.
//!
//! This crate holds the in-memory [`Registry`] of shortened URLs, the
//! debounced [`DeletionPipeline`] and the [`ShortenerService`] façade that
//! composes them with a durable store and a code generator. Core types are
//! re-exported from `tether_core`.

pub mod deletion;
pub mod error;
mod inflight;
pub mod registry;
pub mod service;
#[cfg(test)]
mod testing;

pub use deletion::{DeletionPipeline, DeletionSettings};
pub use error::RegistryError;
pub use registry::{InsertOutcome, Registry};
pub use service::ShortenerService;
pub use tether_core::{ShortenerError, Shortener};
