//! `hook install|uninstall`: the pre-commit wrapper.

use std::fs;
use std::path::PathBuf;

use colored::Colorize;

use coderisk_core::{CodeRiskError, Result};

use crate::context::AppContext;

const HOOK_MARKER: &str = "# coderisk pre-commit hook";

const PRE_COMMIT_HOOK: &str = r#"#!/usr/bin/env sh
# coderisk pre-commit hook
# Exit codes: 0 ok, 1 advisory, 2 block (override with --no-verify), 3 hard block, 10 tool error (fail open)
CODERISK_HOOK=1 coderisk check --quiet
status=$?
if [ "$status" -eq 10 ]; then
    echo "coderisk unavailable, allowing commit" >&2
    exit 0
fi
if [ "$status" -eq 1 ]; then
    echo "coderisk: MEDIUM risk (advisory)" >&2
    exit 0
fi
if [ "$status" -eq 2 ]; then
    echo "coderisk: HIGH risk. Override with: git commit --no-verify" >&2
    echo "  then record it: coderisk hook override --justification '<why>'" >&2
fi
exit $status
"#;

fn hook_path(ctx: &AppContext) -> PathBuf {
    ctx.worktree_root.join(".git").join("hooks").join("pre-commit")
}

pub fn install(ctx: AppContext, force: bool) -> Result<i32> {
    let path = hook_path(&ctx);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    if path.exists() && !force {
        let existing = fs::read_to_string(&path).unwrap_or_default();
        if !existing.contains(HOOK_MARKER) {
            return Err(CodeRiskError::Input(format!(
                "{} exists and is not ours; re-run with --force to overwrite",
                path.display()
            )));
        }
    }
    fs::write(&path, PRE_COMMIT_HOOK)?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mut perms = fs::metadata(&path)?.permissions();
        perms.set_mode(0o755);
        fs::set_permissions(&path, perms)?;
    }
    println!("{}", format!("installed {}", path.display()).green());
    Ok(0)
}

/// Records a `--no-verify` override in the audit log. Git skips the hook
/// entirely on override, so the event is recorded after the fact.
pub fn record_override(ctx: AppContext, justification: Option<String>) -> Result<i32> {
    let staged = crate::changes::resolve_changes(
        &ctx.worktree_root,
        &crate::changes::CheckTarget::Ref("HEAD".into()),
    )
    .map(|files| files.into_iter().map(|f| f.path).collect())
    .unwrap_or_default();
    crate::hook_log::append_override(
        &ctx.worktree_root,
        staged,
        coderisk_core::RiskLevel::High,
        justification,
    )?;
    println!(
        "override recorded in {}",
        crate::hook_log::log_path(&ctx.worktree_root).display()
    );
    Ok(0)
}

pub fn uninstall(ctx: AppContext) -> Result<i32> {
    let path = hook_path(&ctx);
    if !path.exists() {
        println!("no hook installed");
        return Ok(0);
    }
    let existing = fs::read_to_string(&path)?;
    if !existing.contains(HOOK_MARKER) {
        return Err(CodeRiskError::Input(format!(
            "{} was not installed by coderisk; leaving it alone",
            path.display()
        )));
    }
    fs::remove_file(&path)?;
    println!("removed {}", path.display());
    Ok(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hook_script_fails_open_on_tool_error() {
        assert!(PRE_COMMIT_HOOK.contains("-eq 10"));
        assert!(PRE_COMMIT_HOOK.contains("exit 0"));
        assert!(PRE_COMMIT_HOOK.contains(HOOK_MARKER));
    }
}
