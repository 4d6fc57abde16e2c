use crate::ai::{AIError, CompletionClient};
use crate::assistant::Assistant;
use crate::config::{DisplayConfig, SecurityConfig};
use crate::executor::history::CommandHistory;
use crate::executor::validation::CommandValidator;
use crate::executor::CommandExecutor;
use crate::shell::{EnvironmentInfo, OsFamily, ShellType};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;


/// A completion client that replays canned replies in order and remembers
/// every (system, user) message pair it was sent.
pub(crate) struct ScriptedClient {
    replies: Mutex<VecDeque<Result<String, AIError>>>,
    requests: Mutex<Vec<(String, String)>>,
}

impl ScriptedClient {
    pub fn new(replies: Vec<Result<String, AIError>>) -> Self {
        Self {
            replies: Mutex::new(replies.into()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn requests(&self) -> Vec<(String, String)> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl CompletionClient for ScriptedClient {
    async fn complete(&self, system_prompt: &str, user_message: &str) -> Result<String, AIError> {
        self.requests
            .lock()
            .unwrap()
            .push((system_prompt.to_string(), user_message.to_string()));
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(AIError::APIError("no scripted reply left".to_string())))
    }
}

// Test utilities and helpers
pub(crate) struct TestUtils;

impl TestUtils {
    pub fn command_reply(command: &str) -> Result<String, AIError> {
        Ok(serde_json::json!({ "command": command }).to_string())
    }

    pub fn environment() -> EnvironmentInfo {
        EnvironmentInfo {
            shell: ShellType::Sh,
            os: OsFamily::Linux,
        }
    }

    pub fn assistant(replies: Vec<Result<String, AIError>>) -> Assistant<ScriptedClient> {
        Self::assistant_with(replies, CommandHistory::new(10), Duration::from_secs(5))
    }

    pub fn assistant_with(
        replies: Vec<Result<String, AIError>>,
        history: CommandHistory,
        timeout: Duration,
    ) -> Assistant<ScriptedClient> {
        Assistant::new(
            ScriptedClient::new(replies),
            Self::environment(),
            history,
            CommandValidator::new(&SecurityConfig::default()).unwrap(),
            CommandExecutor::new(ShellType::Sh, timeout),
            DisplayConfig::default(),
        )
    }
}
