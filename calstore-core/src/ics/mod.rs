//! ICS document parsing and generation.
//!
//! Grammar, line folding and escaping are delegated to the `icalendar` crate.
//! This module exposes the owned [`Document`] tree the codec reads and writes.

mod document;
mod generate;
mod parse;
mod time;

pub use document::{Component, Document, PRIMARY_COMPONENT, Property};
pub use time::{format_utc, parse_datetime, zoned_local};
