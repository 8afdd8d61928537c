pub mod models;
pub mod schema;
pub mod store;

pub use models::{
    CommitFileRow, CommitRow, IncidentFileRow, IncidentRow, IssueRow, PullRequestRow,
    RepositoryRow, SearchHit, StagingDelta, TreeEntryRow,
};
pub use store::StagingStore;
