// SPDX-License-Identifier: MIT OR Apache-2.0

//! codevec - Embedding indexer and code search tool
//!
//! Decomposes repositories into files, functions and classes, embeds them in
//! paced batches and answers semantic, exact and similarity queries.

mod cli;
mod commands;

use anyhow::Result;
use clap::{CommandFactory, Parser};
use clap_complete::generate;
use cli::{Cli, Commands, OutputFormat};
use codevec::config::{Config, ConfigOutputFormat};
use codevec::errors::CodevecError;
use codevec::output::{error_json, internal_error_json};
use codevec::service::ReferenceRequest;
use commands::search::SearchArgs;
use commands::Context;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> ExitCode {
    // Initialize tracing with CODEVEC_LOG env var (e.g., CODEVEC_LOG=debug codevec index)
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_env("CODEVEC_LOG").unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = Config::load();
    let format = cli.format.unwrap_or(match config.output_format() {
        Some(ConfigOutputFormat::Json) => OutputFormat::Json,
        _ => OutputFormat::Text,
    });
    let ctx = Context {
        format,
        compact: cli.compact,
        db: cli.db,
        config,
    };

    match run(cli.command, &ctx).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            report_error(&err, &ctx);
            ExitCode::FAILURE
        }
    }
}

async fn run(command: Commands, ctx: &Context) -> Result<()> {
    match command {
        Commands::Index {
            path,
            repository,
            batch_size,
            exclude_paths,
            replace,
        } => {
            commands::index::run(ctx, path, repository, batch_size, exclude_paths, replace).await?;
        }
        Commands::Ingest { file, replace } => {
            commands::ingest::run(ctx, &file, replace).await?;
        }
        Commands::Search {
            query,
            search_type,
            language,
            unit_type,
            complexity,
            repository,
            limit,
            threshold,
            timeout_ms,
        } => {
            let args = SearchArgs {
                query,
                search_type,
                language,
                unit_type,
                complexity,
                repository,
                limit,
                threshold,
                timeout_ms,
            };
            commands::search::run(ctx, args).await?;
        }
        Commands::Similar {
            repository,
            file,
            function,
            class,
            limit,
            threshold,
        } => {
            let request = ReferenceRequest {
                repository_id: Some(repository),
                file_path: file,
                function_name: function,
                class_name: class,
                threshold,
                limit,
            };
            commands::similar::run(ctx, request).await?;
        }
        Commands::Vector {
            embedding,
            limit,
            threshold,
            filter,
        } => {
            commands::vector::run(ctx, &embedding, limit, threshold, filter.as_deref()).await?;
        }
        Commands::Stats { repository } => {
            commands::stats::run(ctx, repository).await?;
        }
        Commands::Completions { shell } => {
            let mut cmd = Cli::command();
            generate(shell, &mut cmd, "codevec", &mut std::io::stdout());
        }
    }

    Ok(())
}

/// JSON envelope on stdout in JSON mode, plain message on stderr otherwise.
fn report_error(err: &anyhow::Error, ctx: &Context) {
    match ctx.format {
        OutputFormat::Json => {
            let value = match err.downcast_ref::<CodevecError>() {
                Some(err) => error_json(err),
                None => internal_error_json(&format!("{:#}", err)),
            };
            let rendered = if ctx.compact {
                serde_json::to_string(&value)
            } else {
                serde_json::to_string_pretty(&value)
            };
            match rendered {
                Ok(text) => println!("{}", text),
                Err(_) => eprintln!("Error: {:#}", err),
            }
        }
        OutputFormat::Text => eprintln!("Error: {:#}", err),
    }
}
