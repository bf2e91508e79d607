//! # stdout-relay
//!
//! Streams the standard output of a long-running automation engine through a
//! processing pipeline while the engine is still running: free-text lines are
//! decorated and filtered, a whole JSON result document is relayed and checked
//! for host failures, and JSONL event streams are validated and re-encoded.
//!
//! ## Modules
//!
//! - `streaming` - Line assembly, transformers, decoders and the two-stage pipeline
//! - `results` - Result document model, stats health check and document decoding
//! - `config` - TOML relay configuration
//! - `error` - Error types for streams, records, stats and configuration
//! - `app` - Logging and error reporting for the binary
pub mod app;
pub mod config;
pub mod error;
pub mod results;
pub mod streaming;
