//! `check`: the pre-commit risk assessment entry point.

use coderisk_core::Result;
use coderisk_staging::RepositoryRow;

use crate::changes::{resolve_changes, CheckTarget};
use crate::context::AppContext;
use crate::orchestrator::Orchestrator;
use crate::output::{render, Verbosity};

pub async fn run(ctx: AppContext, args: Vec<String>, verbosity: Verbosity) -> Result<i32> {
    let target = CheckTarget::from_args(&args, &ctx.worktree_root);
    let changes = resolve_changes(&ctx.worktree_root, &target)?;
    if changes.is_empty() {
        if verbosity != Verbosity::AiMode {
            println!("no changes to check");
        }
        return Ok(0);
    }

    let branch = ctx
        .staging
        .repository(&ctx.repo_id)
        .ok()
        .flatten()
        .map(|r: RepositoryRow| r.default_branch)
        .unwrap_or_else(|| "main".to_string());

    let orchestrator = Orchestrator {
        repo_id: ctx.repo_id.clone(),
        branch,
        clone_root: ctx.clone_root.clone(),
        staging: ctx.staging.clone(),
        reader: ctx.reader.clone(),
        engine: ctx.engine.clone(),
        llm: ctx.llm.clone(),
    };
    let outcome = orchestrator.check(changes).await;

    println!("{}", render(&outcome, verbosity, &ctx.reader).await);
    Ok(outcome.exit_code())
}
