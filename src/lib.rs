//! # Interlink
//!
//! Internal-link recommendations for a content site. Interlink turns every
//! published document into a TF-IDF vector, stores pairwise cosine scores,
//! and answers "which pages are most like this one?" from those scores.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐   ┌──────────────────────────┐   ┌───────────┐
//! │  Documents  │──▶│  Register → Vectorize →  │──▶│  SQLite   │
//! │ (import)    │   │  IDF → Similarity        │   │ edges     │
//! └─────────────┘   └──────────────────────────┘   └─────┬─────┘
//!                                                        ▼
//!                                               ┌────────────────┐
//!                                               │ interlink CLI  │
//!                                               │ similar / stats│
//!                                               └────────────────┘
//! ```
//!
//! The pipeline itself lives in [`interlink_core`]; this crate provides the
//! SQLite store, configuration, and CLI commands.
//!
//! ## Quick Start
//!
//! ```bash
//! interlink init
//! interlink import ./export/documents.json
//! interlink index run
//! interlink similar post-42 --limit 5
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`db`] | Database connection and engine construction |
//! | [`migrate`] | Schema migrations |
//! | [`sqlite_store`] | SQLite implementation of the store trait |
//! | [`import`] | JSON document import |
//! | [`index_cmd`] | Pipeline stage commands |
//! | [`similar`] | Similarity queries |
//! | [`stats`] | Index statistics and term inspection |
//! | [`logging`] | `tracing` subscriber setup |

pub mod config;
pub mod db;
pub mod import;
pub mod index_cmd;
pub mod logging;
pub mod migrate;
pub mod similar;
pub mod sqlite_store;
pub mod stats;
