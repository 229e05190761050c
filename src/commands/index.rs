// SPDX-License-Identifier: MIT OR Apache-2.0

//! Index command: scan, decompose and embed a directory

use anyhow::{Context as _, Result};
use std::path::PathBuf;
use tracing::info;

use crate::commands::{
    cancel_on_ctrl_c, current_dir, print_report, progress_bar, Context, Session, CLI_CALLER,
};
use codevec::indexer::{decompose_files, FileScanner};
use codevec::units::IndexRequest;
use codevec::utils::default_repository_id;

pub async fn run(
    ctx: &Context,
    path: Option<PathBuf>,
    repository: Option<String>,
    batch_size: Option<usize>,
    exclude_paths: Vec<String>,
    replace: bool,
) -> Result<()> {
    let root = match path {
        Some(path) => path,
        None => current_dir()?,
    };
    let root = root
        .canonicalize()
        .with_context(|| format!("cannot index {}", root.display()))?;
    let repository_id = repository.unwrap_or_else(|| default_repository_id(&root));

    // CLI excludes first, then config excludes
    let mut excludes = exclude_paths;
    excludes.extend(ctx.config.indexing.exclude_paths().iter().cloned());

    let files = FileScanner::new(&root)
        .with_excludes(&excludes)
        .with_max_file_size(ctx.config.indexing.max_file_size())
        .scan()?;
    let file_count = files.len();
    let request = IndexRequest {
        repository_id,
        units: decompose_files(files),
    };
    info!(root = %root.display(), files = file_count, "decomposed repository");

    let session = Session::at_root(ctx, &root, batch_size)?;
    let progress = progress_bar(ctx);
    let cancel = cancel_on_ctrl_c();
    let report = if replace {
        session
            .service
            .replace(CLI_CALLER, request, &cancel, Some(progress.clone()))
            .await
    } else {
        session
            .service
            .index(CLI_CALLER, request, &cancel, Some(progress.clone()))
            .await
    };
    progress.finish_and_clear();

    print_report(ctx, &report?)
}
