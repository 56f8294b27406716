//! # Knowledge Harness
//!
//! A local knowledge base of structured engineering experience entries with
//! an incrementally maintained vector index for semantic retrieval.
//!
//! Entries (intent, problem context, root cause, solution, evidence) are
//! written to SQLite. An explicitly invoked build turns every entry into a
//! canonical text document, embeds it, and persists a vector index plus a
//! manifest. Retrieval reads only the persisted index and reloads it when the
//! manifest shows a newer build.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐ record  ┌──────────────┐  list_all  ┌──────────────┐
//! │   CLI    │────────▶│ Entry Store  │───────────▶│ Index Builder│
//! │   (kb)   │         │ SQLite (WAL) │            │ full / incr. │
//! └────┬─────┘         └──────────────┘            └──────┬───────┘
//!      │ query                                            │ index-<stamp>.json
//!      ▼                                                  ▼ index_meta.json
//! ┌──────────────┐     reload on new build_time    ┌──────────────┐
//! │  Retriever   │◀────────────────────────────────│ Storage dir  │
//! └──────────────┘                                 └──────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! kb init
//! kb record --intent "Fix Redis connection timeout" --root-cause "pool exhausted"
//! kb build
//! kb query "redis timeout"
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing and validation |
//! | [`error`] | Error taxonomy |
//! | [`models`] | Core data types |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |
//! | [`store`] | Entry CRUD |
//! | [`reconstruct`] | Entry → document text, metadata, content hash |
//! | [`embedding`] | Embedding provider abstraction |
//! | [`vector_index`] | Persisted vectors and cosine search |
//! | [`manifest`] | Build manifest |
//! | [`storage`] | Atomic file writes in the index directory |
//! | [`builder`] | Full and incremental index builds |
//! | [`retrieval`] | Query service with hot reload |
//! | [`entries`] | Entry CLI commands |
//! | [`export`] | JSONL import/export |
//! | [`status`] | Status and index reset |

pub mod builder;
pub mod config;
pub mod db;
pub mod embedding;
pub mod entries;
pub mod error;
pub mod export;
pub mod manifest;
pub mod migrate;
pub mod models;
pub mod reconstruct;
pub mod retrieval;
pub mod status;
pub mod storage;
pub mod store;
pub mod vector_index;

pub use error::{Error, Result};
