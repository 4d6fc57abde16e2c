pub mod ai;
pub mod assistant;
pub mod config;
pub mod executor;
pub mod logging;
pub mod shell;

#[cfg(test)]
mod tests;

// Re-export commonly used types
pub use ai::{CompletionClient, HttpCompletionClient};
pub use assistant::{Assistant, TurnOutcome};
pub use config::Config;
pub use executor::{CommandExecutor, ExecutionResult};
pub use shell::{EnvironmentInfo, ShellType};
