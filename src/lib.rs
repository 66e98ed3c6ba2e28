//! Client-side synchronization core for a manuscript editor backed by a
//! narrative-analysis service.
//!
//! The crate is organized around a small set of collaborating layers:
//! - [`core`] owns the editing session: the state store, the debounced
//!   submission controller, per-submission timers, the reconnecting
//!   connection manager and entity normalization.
//! - [`api`] defines the wire payloads and the request/response clients for
//!   character arcs and story questions.
//! - [`utils`] holds URL construction and logging setup.
//!
//! The binary (`src/main.rs`) routes through [`crate::cli::main`], a thin
//! driver over [`core::session`].

pub mod api;
pub mod cli;
pub mod core;
pub mod utils;
