//! Core models for gtrack: tools for genomic interval overlap analysis and
//! indexed binary tracks.
//!
//! This crate holds the pieces every other gtrack crate agrees on:
//!
//! - [`models::Strand`] and [`models::Interval`], the value that flows between
//!   the overlap engine, the track engine and any text-format collaborator
//! - [`utils::natural_cmp`], the sequence-name collation used for all ordering
//! - [`errors::GtrackError`], the error taxonomy shared across the workspace
//!
//! ```
//! use gtrack_core::models::{Interval, Strand};
//!
//! let a = Interval::new("chr2", 100, 200, ()).unwrap();
//! let b = Interval::new("chr10", 1, 50, ()).unwrap().with_strand(Strand::Reverse);
//! assert!(a.cmp_position(&b).is_lt());
//! ```
pub mod errors;
pub mod models;
pub mod utils;

pub use errors::{GtrackError, Result};
