//! # code-context
//!
//! A local retrieval layer for code completion. Projects are chunked along
//! their syntactic structure, embedded into a SQLite-backed index, and
//! queried for token-budgeted context blocks. A long-running server keeps
//! several projects indexed and reindexes them as files change.
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────┐   ┌──────────────┐   ┌─────────────┐
//! │  Watcher  │──▶│   Indexer    │──▶│   SQLite    │
//! │ (notify)  │   │ chunk+embed  │   │ vectors+kv  │
//! └───────────┘   └──────────────┘   └──────┬──────┘
//!                                          │
//!                 ┌──────────────┐          │
//!                 │ Query engine │◀─────────┘
//!                 │ cache+budget │
//!                 └──────┬───────┘
//!                  ┌─────┴─────┐
//!                  ▼           ▼
//!             ┌────────┐  ┌────────┐
//!             │  CLI   │  │  HTTP  │
//!             │ (cctx) │  │ (axum) │
//!             └────────┘  └────────┘
//! ```
//!
//! Runtime-free logic (chunking, budgeting, fingerprints, debounce, traits)
//! lives in the `code-context-core` crate.
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`app`] | Service bootstrap |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |
//! | [`vector_store`] | SQLite vector index |
//! | [`kv_store`] | SQLite key/value store for the query cache |
//! | [`embedding`] | Embedding providers |
//! | [`tokens`] | Tokenizer-backed token encodings |
//! | [`state`] | Persisted per-project index state |
//! | [`indexer`] | Incremental project indexing |
//! | [`query`] | Query orchestration |
//! | [`project`] | Projects and the project registry |
//! | [`watcher`] | Debounced file watching |
//! | [`server`] | HTTP server |

pub mod app;
pub mod config;
pub mod db;
pub mod embedding;
pub mod error;
pub mod indexer;
pub mod kv_store;
pub mod migrate;
pub mod paths;
pub mod project;
pub mod query;
pub mod server;
pub mod state;
pub mod tokens;
pub mod vector_store;
pub mod watcher;
