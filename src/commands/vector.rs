// SPDX-License-Identifier: MIT OR Apache-2.0

//! Vector command: nearest neighbors of a raw embedding

use anyhow::Result;
use serde_json::Value;

use crate::cli::OutputFormat;
use crate::commands::{current_dir, print_hits, Context, Session};
use codevec::errors::CodevecError;
use codevec::output::print_json;
use codevec::service::VectorRequest;

pub async fn run(
    ctx: &Context,
    embedding: &str,
    limit: Option<usize>,
    threshold: Option<f32>,
    filter: Option<&str>,
) -> Result<()> {
    let request = VectorRequest {
        embedding: Some(serde_json::from_str::<Value>(embedding).map_err(CodevecError::from)?),
        limit,
        threshold,
        filter: filter
            .map(serde_json::from_str::<Value>)
            .transpose()
            .map_err(CodevecError::from)?,
    };

    let session = Session::locate(ctx, &current_dir()?)?;
    let response = session.service.vector_search(request).await?;

    match ctx.format {
        OutputFormat::Json => print_json(&response, ctx.compact)?,
        OutputFormat::Text => print_hits(ctx, "embedding", &response.results),
    }
    Ok(())
}
