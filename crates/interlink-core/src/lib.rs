//! # Interlink Core
//!
//! Storage-agnostic logic for Interlink: data models, text processing,
//! sparse vector math, the store abstraction, and the similarity engine.
//!
//! This crate contains no tokio, sqlx, filesystem I/O, or other
//! native-only dependencies. The SQLite backend and the CLI live in the
//! `interlink` application crate.

pub mod cancel;
pub mod engine;
pub mod models;
pub mod processor;
pub mod stopwords;
pub mod store;
pub mod vector;
