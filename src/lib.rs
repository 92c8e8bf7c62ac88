//! # docassist
//!
//! An AI document assistant: ingest uploaded documents, index them for
//! semantic retrieval, and answer questions or generate structured documents
//! grounded in what was uploaded.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐   ┌─────────┐   ┌──────────┐   ┌─────────────┐
//! │   Loader    │──▶│ Chunker │──▶│ Indexer  │──▶│ VectorStore │
//! │ pdf/ooxml/… │   │ overlap │   │  embed   │   │ SQLite/mem  │
//! └─────────────┘   └─────────┘   └──────────┘   └──────┬──────┘
//!                                                       │
//!                      ┌────────────────────────────────┤
//!                      ▼                                ▼
//!                ┌─────────────┐                  ┌──────────┐
//!                │ QueryEngine │◀── generate ─────│   HTTP   │
//!                │ top-k + LLM │    validate      │  (axum)  │
//!                └─────────────┘                  └──────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! docassist init
//! docassist index
//! docassist ask "What is the project timeline?"
//! docassist generate proposal --input client_name=Acme
//! docassist serve
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`error`] | Pipeline error taxonomy |
//! | [`models`] | Core data types |
//! | [`extract`] | Text extraction for PDF and OOXML formats |
//! | [`loader`] | File discovery and normalization |
//! | [`chunk`] | Overlapping character-window chunking |
//! | [`embedding`] | Embedding provider abstraction |
//! | [`store`] | Vector store trait, SQLite and in-memory backends |
//! | [`index`] | Batched, failure-isolating indexer |
//! | [`generation`] | Text generation provider abstraction |
//! | [`query`] | Retrieval, context budgeting and answering |
//! | [`templates`] | Document template catalog |
//! | [`generate`] | Template-driven document generation |
//! | [`validate`] | Document validation and scoring |
//! | [`upload`] | Transcript, codebase and wireframe intake |
//! | [`server`] | HTTP server |
//! | [`progress`] | Index progress reporting |
//! | [`commands`] | CLI command implementations |
//! | [`status`] | Store statistics |

pub mod chunk;
pub mod commands;
pub mod config;
pub mod embedding;
pub mod error;
pub mod extract;
pub mod generate;
pub mod generation;
pub mod index;
pub mod loader;
pub mod models;
pub mod progress;
pub mod query;
mod remote;
pub mod server;
pub mod status;
pub mod store;
pub mod templates;
pub mod upload;
pub mod validate;
