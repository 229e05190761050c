// SPDX-License-Identifier: MIT OR Apache-2.0

//! Indexing: directory scanning, decomposition into units and batch embedding

pub mod batch;
pub mod decompose;
pub mod scanner;

pub use batch::{BatchIndexer, IndexerConfig, IndexingReport, UnitFailure};
pub use decompose::{decompose_file, decompose_files};
pub use scanner::{detect_language, FileScanner, ScannedFile};
