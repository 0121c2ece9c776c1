//! Per-server facade for codenav.
//!
//! A [`LanguageServer`] wraps one running LSP session in a uniform,
//! repository-relative symbolic API: document symbols (cached by content
//! hash), name-path lookup, references, definitions, rename, hover, and
//! workspace symbols. Ref-counted open-file scopes guarantee every
//! `didOpen` is paired with exactly one `didClose` on all exit paths.
//!
//! Hybrid file formats get companion orchestration: a primary server
//! delegates definition/reference/rename operations to companion servers
//! for the embedded language and merges the results.

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used, clippy::panic))]

mod caches;
mod call_graph;
mod companion;
mod config;
mod convert;
mod edits;
mod facade;
mod policy;

pub use caches::{CacheFlavor, CachedSymbols, PROCESSED_CACHE_FILENAME, RAW_CACHE_FILENAME};
pub use call_graph::{CallDirection, CallEdge, CallGraph, CallNode};
pub use companion::{
    CompanionOperation, CompanionSet, DomainReferencesFn, EmbeddedLanguageConfig,
};
pub use config::{Encoding, IgnoreSpec, Language, ServerConfig, language_id_for_extension};
pub use edits::{DocumentEdits, Hover, TextEdit, WorkspaceEdit};
pub use facade::{FileScope, LanguageServer};
pub use policy::{DefaultPolicy, LanguagePolicy, extend_ranges_over_terminator};
