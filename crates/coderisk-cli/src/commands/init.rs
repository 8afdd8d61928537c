//! `init` / `init --local`: fetch → stage → parse → build.

use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;

use coderisk_core::Result;
use coderisk_fetch::{forge_limiter, ForgeClient, SourceFetcher};
use coderisk_graph::{BuildInput, GraphBuilder};
use coderisk_parser::{SourceParser, TestFileResolver};

use crate::context::AppContext;

pub async fn run(ctx: AppContext, local_only: bool) -> Result<i32> {
    let spinner_style = ProgressStyle::with_template("{spinner} {msg}")
        .expect("progress template")
        .tick_chars("⠁⠂⠄⡀⢀⠠⠐⠈ ");
    let progress = ProgressBar::new_spinner().with_style(spinner_style);

    // stage 1: clone + forge fetch into staging
    progress.set_message(format!("fetching {}", ctx.remote_url));
    let client = if local_only {
        None
    } else {
        match ctx.forge_token() {
            Some(token) => Some(ForgeClient::new(
                &ctx.config.forge.api_base,
                Some(token),
                forge_limiter(ctx.config.forge.requests_per_hour),
            )?),
            None => {
                progress.println("no forge token found; falling back to local-only ingestion");
                None
            }
        }
    };
    let fetcher = SourceFetcher::new(ctx.staging.clone(), client, ctx.config.clone());
    let outcome = fetcher.fetch(&ctx.remote_url).await?;
    progress.println(format!(
        "staged {} commits, {} issues, {} pull requests",
        outcome.delta.commits, outcome.delta.issues, outcome.delta.pull_requests
    ));

    // stage 2: parse the clone
    progress.set_message("parsing source tree");
    let parser = SourceParser::new();
    let (parsed, stats) = parser.parse_directory(&outcome.clone_root).await?;
    progress.println(format!(
        "parsed {}/{} files ({} lines)",
        stats.parsed_files, stats.total_files, stats.total_lines
    ));

    // stage 3: build the graph
    progress.set_message("building knowledge graph");
    let resolver = TestFileResolver::new(ctx.config.check.test_conventions.clone());
    let builder = GraphBuilder::new(ctx.backend.clone(), ctx.staging.clone());
    let report = builder
        .build(BuildInput {
            repo_id: &outcome.repo_id,
            branch: &outcome.default_branch,
            clone_root: &outcome.clone_root,
            parsed: &parsed,
            test_resolver: &resolver,
        })
        .await?;
    progress.finish_and_clear();

    println!(
        "{}",
        format!(
            "graph ready: {} nodes, {} edges, {} co-change pairs, {} incident links",
            report.nodes_written, report.edges_written, report.co_change_pairs, report.incidents_linked
        )
        .green()
    );
    if report.edges_skipped > 0 {
        println!("{} edges skipped (missing endpoints)", report.edges_skipped);
    }
    for diagnostic in &report.diagnostics {
        println!("diagnostic: {}", diagnostic);
    }
    info!(repo = ctx.repo_id, "initialization complete");
    Ok(0)
}
