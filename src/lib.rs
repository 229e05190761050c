// SPDX-License-Identifier: MIT OR Apache-2.0

//! codevec - Embedding indexer and multi-mode code search library
//!
//! Code units (files, functions, classes) are embedded in paced batches and
//! stored in a vector store; searches run in semantic, exact or similarity
//! mode over the stored units.

pub mod config;
pub mod embedding;
pub mod errors;
pub mod filters;
pub mod governor;
pub mod indexer;
pub mod output;
pub mod parser;
pub mod search;
pub mod service;
pub mod units;
pub mod utils;

pub use errors::{CodevecError, ErrorKind, Result};
