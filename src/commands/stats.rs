// SPDX-License-Identifier: MIT OR Apache-2.0

//! Stats command

use anyhow::Result;
use colored::Colorize;

use crate::cli::OutputFormat;
use crate::commands::{current_dir, Context, Session};
use codevec::output::{colorize_kind, print_json};
use codevec::utils::{default_repository_id, find_index_root};

pub async fn run(ctx: &Context, repository: Option<String>) -> Result<()> {
    let cwd = current_dir()?;
    let repository_id = repository.unwrap_or_else(|| {
        let root = find_index_root(&cwd).map(|r| r.root).unwrap_or_else(|| cwd.clone());
        default_repository_id(&root)
    });

    let session = Session::locate(ctx, &cwd)?;
    let stats = session.service.stats(&repository_id).await?;

    if ctx.format == OutputFormat::Json {
        print_json(&stats, ctx.compact)?;
        return Ok(());
    }

    let use_color = ctx.use_color();
    if use_color {
        println!(
            "{} {} embeddings",
            stats.repository_id.bold(),
            stats.total_embeddings.to_string().cyan()
        );
    } else {
        println!("{} {} embeddings", stats.repository_id, stats.total_embeddings);
    }
    for entry in &stats.breakdown {
        let avg = entry
            .avg_complexity
            .map(|c| format!("{:.1}", c))
            .unwrap_or_else(|| "-".to_string());
        println!(
            "  {:<10} {:>6}  avg complexity {:>5}  {}",
            colorize_kind(entry.unit_type.as_str(), use_color),
            entry.count,
            avg,
            entry.languages.join(", ")
        );
    }
    Ok(())
}
