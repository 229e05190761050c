// SPDX-License-Identifier: MIT OR Apache-2.0

//! Ingest command: index a pre-decomposed JSON request

use anyhow::{Context as _, Result};
use std::io::Read;
use std::path::Path;

use crate::commands::{
    cancel_on_ctrl_c, current_dir, print_report, progress_bar, Context, Session, CLI_CALLER,
};
use codevec::errors::CodevecError;
use codevec::units::IndexRequest;

pub async fn run(ctx: &Context, file: &Path, replace: bool) -> Result<()> {
    let raw = if file == Path::new("-") {
        let mut buffer = String::new();
        std::io::stdin()
            .read_to_string(&mut buffer)
            .context("failed to read request from stdin")?;
        buffer
    } else {
        std::fs::read_to_string(file)
            .with_context(|| format!("failed to read {}", file.display()))?
    };
    let request: IndexRequest = serde_json::from_str(&raw).map_err(CodevecError::from)?;

    let session = Session::locate(ctx, &current_dir()?)?;
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
