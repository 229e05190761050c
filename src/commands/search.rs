// SPDX-License-Identifier: MIT OR Apache-2.0

//! Search command

use anyhow::Result;
use std::time::Duration;

use crate::cli::OutputFormat;
use crate::commands::{current_dir, print_hits, Context, Session};
use codevec::filters::{ComplexityBand, SearchFilters};
use codevec::output::print_json;
use codevec::search::{SearchQuery, SearchType};
use codevec::units::UnitKey;
use codevec::utils::{default_repository_id, find_index_root};

/// Flags of `codevec search`
pub struct SearchArgs {
    pub query: String,
    pub search_type: String,
    pub language: Option<String>,
    pub unit_type: Option<String>,
    pub complexity: Option<String>,
    pub repository: Option<String>,
    pub limit: Option<usize>,
    pub threshold: Option<f32>,
    pub timeout_ms: Option<u64>,
}

pub async fn run(ctx: &Context, args: SearchArgs) -> Result<()> {
    let search_type: SearchType = args.search_type.parse()?;
    let filters = SearchFilters {
        language: args.language,
        file_type: args.unit_type,
        complexity: args
            .complexity
            .map(|c| c.parse::<ComplexityBand>())
            .transpose()?,
        repository: args.repository,
    };

    let mut query = match search_type {
        SearchType::Semantic => SearchQuery::semantic(&args.query),
        SearchType::Exact => SearchQuery::exact(&args.query),
        // The query text names the reference file in the current repository
        SearchType::Similarity => {
            let cwd = current_dir()?;
            let root = find_index_root(&cwd).map(|r| r.root).unwrap_or(cwd);
            let repository = filters
                .repository
                .clone()
                .unwrap_or_else(|| default_repository_id(&root));
            SearchQuery::similarity(UnitKey::repository(repository).file(&args.query))
        }
    }
    .with_filters(filters);
    query.limit = args.limit;
    query.threshold = args.threshold;
    query.timeout = args.timeout_ms.map(Duration::from_millis);
    query.validate()?;

    let session = Session::locate(ctx, &current_dir()?)?;
    let response = session.service.search_query(&query).await?;

    match ctx.format {
        OutputFormat::Json => print_json(&response, ctx.compact)?,
        OutputFormat::Text => print_hits(ctx, &args.query, &response.results),
    }
    Ok(())
}
