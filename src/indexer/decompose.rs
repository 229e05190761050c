// SPDX-License-Identifier: MIT OR Apache-2.0

//! Turns scanned files into index-trigger file inputs

use rayon::prelude::*;
use tracing::debug;

use crate::indexer::scanner::ScannedFile;
use crate::parser::{ExtractedSymbol, SymbolExtractor, LANGUAGES};
use crate::units::{FileInput, SymbolInput};

/// Decomposes files in parallel. Order follows the input.
///
/// Languages without a grammar become file-only inputs.
pub fn decompose_files(files: Vec<ScannedFile>) -> Vec<FileInput> {
    files.into_par_iter().map(decompose_file).collect()
}

pub fn decompose_file(file: ScannedFile) -> FileInput {
    let grammar = grammar_for(&file.path, &file.language);
    let symbols = if LANGUAGES.supports(grammar) {
        match SymbolExtractor::new().extract(&file.content, grammar) {
            Ok(symbols) => Some(symbols),
            Err(err) => {
                debug!(path = %file.path, error = %err, "symbol extraction failed");
                None
            }
        }
    } else {
        None
    };

    let (functions, classes, complexity) = match symbols {
        Some(symbols) => (
            symbols.functions.into_iter().map(to_input).collect(),
            symbols.classes.into_iter().map(to_input).collect(),
            Some(symbols.complexity),
        ),
        None => (Vec::new(), Vec::new(), None),
    };

    FileInput {
        path: file.path,
        content: file.content,
        language: file.language,
        complexity,
        functions,
        classes,
    }
}

fn grammar_for<'a>(path: &str, language: &'a str) -> &'a str {
    if path.ends_with(".tsx") {
        "tsx"
    } else {
        language
    }
}

fn to_input(symbol: ExtractedSymbol) -> SymbolInput {
    SymbolInput {
        name: symbol.name,
        content: symbol.content,
        start_line: symbol.start_line,
        end_line: symbol.end_line,
        complexity: Some(symbol.complexity),
    }
}
