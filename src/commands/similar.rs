// SPDX-License-Identifier: MIT OR Apache-2.0

//! Similar command: neighbors of a stored reference unit

use anyhow::Result;

use crate::cli::OutputFormat;
use crate::commands::{current_dir, print_hits, Context, Session};
use codevec::output::print_json;
use codevec::service::ReferenceRequest;

pub async fn run(ctx: &Context, request: ReferenceRequest) -> Result<()> {
    let title = [
        request.file_path.as_deref(),
        request.function_name.as_deref(),
        request.class_name.as_deref(),
    ]
    .into_iter()
    .flatten()
    .collect::<Vec<_>>()
    .join("::");

    let session = Session::locate(ctx, &current_dir()?)?;
    let response = session.service.similar(request).await?;

    match ctx.format {
        OutputFormat::Json => print_json(&response, ctx.compact)?,
        OutputFormat::Text => print_hits(ctx, &title, &response.results),
    }
    Ok(())
}
