// SPDX-License-Identifier: MIT OR Apache-2.0

//! Subcommand implementations

pub mod index;
pub mod ingest;
pub mod search;
pub mod similar;
pub mod stats;
pub mod vector;

use anyhow::{Context as _, Result};
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::cli::OutputFormat;
use codevec::config::Config;
use codevec::embedding::{create_provider, EmbeddingStore, SqliteStore};
use codevec::indexer::IndexingReport;
use codevec::output::{
    colorize_context, colorize_kind, colorize_lines, colorize_name, colorize_path,
    colorize_score, preview, use_colors,
};
use codevec::search::SearchHit;
use codevec::service::{CodeSearchService, ServiceOptions};
use codevec::utils::resolve_db_path;

/// Caller key used for the analysis governor in CLI runs.
pub const CLI_CALLER: &str = "cli";

/// Settings shared by every subcommand.
pub struct Context {
    pub format: OutputFormat,
    pub compact: bool,
    pub db: Option<PathBuf>,
    pub config: Config,
}

impl Context {
    pub fn use_color(&self) -> bool {
        use_colors() && self.format == OutputFormat::Text
    }

    /// Explicit `--db`, then `[store] path`.
    fn explicit_db(&self) -> Option<&Path> {
        self.db.as_deref().or(self.config.store.path.as_deref())
    }
}

/// The service over an opened store.
pub struct Session {
    pub service: CodeSearchService,
}

impl Session {
    /// Opens the store found by walking up from `start`.
    pub fn locate(ctx: &Context, start: &Path) -> Result<Self> {
        Self::open(ctx, resolve_db_path(ctx.explicit_db(), start), None)
    }

    /// Opens the store rooted at `root`, creating it if needed.
    pub fn at_root(ctx: &Context, root: &Path, batch_size: Option<usize>) -> Result<Self> {
        let path = match ctx.explicit_db() {
            Some(path) => path.to_path_buf(),
            None => codevec::embedding::storage::default_db_path(root),
        };
        Self::open(ctx, path, batch_size)
    }

    fn open(ctx: &Context, path: PathBuf, batch_size: Option<usize>) -> Result<Self> {
        debug!(path = %path.display(), "opening store");
        let store: Arc<dyn EmbeddingStore> = Arc::new(
            SqliteStore::open(&path)
                .with_context(|| format!("failed to open store {}", path.display()))?,
        );
        let provider = create_provider(&ctx.config.embeddings)?;

        let mut options = ServiceOptions::from(&ctx.config);
        if let Some(size) = batch_size {
            options.indexer.batch_size = size;
        }
        Ok(Self {
            service: CodeSearchService::new(provider, store, options),
        })
    }
}

/// Token cancelled on Ctrl-C.
pub fn cancel_on_ctrl_c() -> CancellationToken {
    let token = CancellationToken::new();
    let child = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("Cancelling after the current batch...");
            child.cancel();
        }
    });
    token
}

/// Unit progress bar, hidden in JSON mode.
pub fn progress_bar(ctx: &Context) -> ProgressBar {
    if ctx.format == OutputFormat::Json {
        return ProgressBar::hidden();
    }
    let bar = ProgressBar::new(0);
    if let Ok(style) =
        ProgressStyle::default_bar().template("[{bar:40.cyan/blue}] {pos}/{len} units | {elapsed}")
    {
        bar.set_style(style.progress_chars("=>-"));
    }
    bar
}

pub fn print_report(ctx: &Context, report: &IndexingReport) -> Result<()> {
    if ctx.format == OutputFormat::Json {
        codevec::output::print_json(report, ctx.compact)?;
        return Ok(());
    }

    let use_color = ctx.use_color();
    let summary = format!(
        "Indexed {}/{} units of {} in {} batches ({:.2}s)",
        report.succeeded,
        report.attempted,
        report.repository_id,
        report.batches,
        report.elapsed_ms as f64 / 1000.0
    );
    if use_color {
        println!("{} {}", "✓".green(), summary);
    } else {
        println!("{}", summary);
    }
    for failure in &report.failures {
        println!(
            "  {} {} [{}] {}",
            if use_color { "✗".red().to_string() } else { "x".to_string() },
            colorize_path(&failure.unit, use_color),
            failure.code,
            failure.error
        );
    }
    if report.cancelled {
        println!("Cancelled: {} units skipped", report.skipped);
    }
    Ok(())
}

pub fn print_hits(ctx: &Context, title: &str, hits: &[SearchHit]) {
    let use_color = ctx.use_color();
    if hits.is_empty() {
        if use_color {
            println!("{} No results for: {}", "✗".red(), title.yellow());
        } else {
            println!("No results for: {}", title);
        }
        return;
    }

    println!();
    for hit in hits {
        let kind = format!("[{}]", hit.metadata.unit_type);
        let lines = colorize_lines(hit.metadata.start_line, hit.metadata.end_line, use_color);
        let location = if lines.is_empty() {
            colorize_path(&hit.file_path, use_color)
        } else {
            format!("{}:{}", colorize_path(&hit.file_path, use_color), lines)
        };
        let name = hit
            .function_name
            .as_deref()
            .or(hit.class_name.as_deref())
            .map(|n| colorize_name(n, use_color))
            .unwrap_or_default();
        println!(
            "{} {} {} {}",
            colorize_score(hit.score, use_color),
            colorize_kind(&kind, use_color),
            location,
            name
        );
        println!("{}", colorize_context(&preview(&hit.content, 3), use_color));
    }

    if use_color {
        println!("\n{} {} results", "✓".green(), hits.len().to_string().cyan());
    } else {
        println!("\n{} results", hits.len());
    }
}

pub fn current_dir() -> Result<PathBuf> {
    std::env::current_dir().context("failed to read current directory")
}
