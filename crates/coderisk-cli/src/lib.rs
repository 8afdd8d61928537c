pub mod ai_schema;
pub mod changes;
pub mod commands;
pub mod context;
pub mod hook_log;
pub mod orchestrator;
pub mod output;
