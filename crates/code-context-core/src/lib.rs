//! # code-context core
//!
//! Runtime-free logic for code-context: data models, source chunking,
//! token accounting and context assembly, content fingerprints, the
//! debounce state machine, and the traits behind which the embedding
//! search service and the key/value cache live.
//!
//! This crate contains no tokio, sqlx, or filesystem I/O. The application
//! crate supplies concrete backends and drives the pipeline.
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`models`] | Chunks, index documents, search hits, summaries |
//! | [`chunk`] | Structure-aware source chunker |
//! | [`encoding`] | [`encoding::TokenEncoding`] trait and the fallback encoding |
//! | [`budget`] | Token counting, truncation, context assembly |
//! | [`fingerprint`] | SHA-256 digests and the change tracker |
//! | [`debounce`] | Change filter and debounce state machine |
//! | [`index`] | [`index::VectorIndex`] trait and in-memory index |
//! | [`cache`] | [`cache::KvStore`] trait, in-memory store, query cache |
//! | [`embedding`] | [`embedding::Embedder`] trait and vector helpers |

pub mod budget;
pub mod cache;
pub mod chunk;
pub mod debounce;
pub mod embedding;
pub mod encoding;
pub mod fingerprint;
pub mod index;
pub mod models;
