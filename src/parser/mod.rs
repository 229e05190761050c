// SPDX-License-Identifier: MIT OR Apache-2.0

//! Tree-sitter parsing used to decompose source files into units

pub mod languages;
pub mod symbols;

pub use languages::LANGUAGES;
pub use symbols::{complexity_of, ExtractedSymbol, FileSymbols, SymbolExtractor};
