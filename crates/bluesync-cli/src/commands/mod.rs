//! Command implementations for the CLI.

mod check;
mod config;
mod profiles;
mod replay;

pub use check::{ScriptSummary, cmd_check, summarize_script};
pub use config::cmd_config;
pub use profiles::cmd_profiles;
pub use replay::{ReplayReport, cmd_replay, render_text, run_replay};
