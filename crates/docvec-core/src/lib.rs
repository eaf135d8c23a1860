//! # docvec core
//!
//! Shared, WASM-safe logic for docvec: data models, chunking, the
//! embedding provider trait, structured metadata filters, the vector
//! store abstraction, and top-K ranking.
//!
//! This crate contains no tokio, sqlx, filesystem I/O, or network
//! dependencies. Concrete providers, the SQLite store, and the ingestion
//! pipeline live in the `docvec` application crate.

pub mod chunk;
pub mod embedding;
pub mod error;
pub mod filter;
pub mod models;
pub mod search;
pub mod store;

pub use error::{Error, Result};
