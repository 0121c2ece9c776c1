//! Unified symbol taxonomy and name-path matching for codenav.
//!
//! This crate provides the single, authoritative representation of symbols
//! used across the client runtime, the per-server facades, and the caches.
//!
//! # Design Goals
//!
//! - **Single source of truth**: every layer exchanges [`Symbol`] values,
//!   never raw server payloads
//! - **LSP coordinates**: positions are zero-indexed with UTF-16 columns,
//!   exactly as they travel on the wire
//! - **Lossless kinds**: unknown symbol kinds coerce to [`SymbolKind::Other`]
//!   instead of being dropped
//! - **Name paths**: `/`-separated qualified names with optional `[N]`
//!   overload indices, matched absolutely, relatively, or by substring

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used, clippy::panic))]

mod kind;
mod name_path;
mod position;
mod symbol;

pub use kind::SymbolKind;
pub use name_path::{NamePathComponent, NamePathPattern, assign_overload_indices};
pub use position::{
    Position, Range, byte_to_utf16_col, extract_range, offset_for_position, utf16_col_to_byte,
};
pub use symbol::{Reference, Symbol, SymbolLocation, find_containing};
