pub mod clone;
pub mod fetcher;
pub mod github;
pub mod rate_limit;

pub use clone::{discover_remote_url, discover_worktree_root, ClonedRepo};
pub use fetcher::{repo_id_from_url, FetchOutcome, SourceFetcher};
pub use github::{issue_refs, ForgeClient};
pub use rate_limit::{forge_limiter, ForgeLimiter};
