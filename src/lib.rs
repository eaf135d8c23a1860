//! # docvec
//!
//! Ingest a directory of PDFs into a vector index and run filtered
//! similarity search over it.
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────┐   ┌─────────┐   ┌──────────┐   ┌─────────┐   ┌─────────┐
//! │  Scanner  │──▶│ Chunker │──▶│ Embedder │──▶│ Indexer │──▶│ SQLite  │
//! │ PDF/txt   │   │ chars   │   │ batched  │   │ upsert  │   │ vectors │
//! └───────────┘   └─────────┘   └──────────┘   └─────────┘   └────┬────┘
//!                                     ▲                           │
//!                      query ─────────┴──────── Retriever ◀───────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! export OPENAI_API_KEY=sk-...
//! docvec init
//! docvec ingest ./documents
//! docvec query "How did insurance float change?" --filter "filename~Berkshire"
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration and environment overrides |
//! | [`scan`] | Directory walking and per-file extraction |
//! | [`extract`] | PDF and plain-text extraction |
//! | [`embedding`] | HTTP embedding providers |
//! | [`embedder`] | Batching, retry and bounded concurrency |
//! | [`indexer`] | Index creation and document writes |
//! | [`ingest`] | The ingestion pipeline |
//! | [`report`] | Per-item ingestion outcomes |
//! | [`search`] | Retrieval |
//! | [`sqlite_store`] | SQLite vector store |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |
//! | [`stats`] | Index statistics |
//!
//! Data model, chunking, filters and the store trait live in
//! [`docvec_core`].

pub mod config;
pub mod db;
pub mod embedder;
pub mod embedding;
pub mod extract;
pub mod indexer;
pub mod ingest;
pub mod migrate;
pub mod report;
pub mod scan;
pub mod search;
pub mod sqlite_store;
pub mod stats;

#[cfg(test)]
mod test_support;

pub use docvec_core;
