pub mod agent;
pub mod cli;
pub mod commands;
pub mod config;
pub mod error;
pub mod fuzzy_edit;
pub mod provider;
pub mod session;
pub mod tool_collection;
pub mod tools;
pub mod ui;
pub mod workspace;

pub use agent::{Agent, RunOutcome};
pub use config::Config;
pub use session::{Session, Task};
pub use tool_collection::ToolCollection;
pub use workspace::Workspace;
