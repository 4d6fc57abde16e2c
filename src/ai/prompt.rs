use crate::executor::history::{CommandHistory, HistoryEntry};
use crate::shell::EnvironmentInfo;

/// Number of past turns embedded in each system prompt.
pub const PROMPT_HISTORY_ENTRIES: usize = 3;

pub fn format_history_line(entry: &HistoryEntry) -> String {
    format!(
        "Previous Command: {}, Success: {}, Error: {}",
        entry.command,
        entry.success,
        entry.error.as_deref().unwrap_or("None")
    )
}

/// Renders the system instruction for one completion request. The output
/// depends only on `environment` and the last entries of `history`.
pub fn build_system_prompt(environment: &EnvironmentInfo, history: &CommandHistory) -> String {
    let hints = environment.hints();
    let history_info = history
        .recent(PROMPT_HISTORY_ENTRIES)
        .map(format_history_line)
        .collect::<Vec<_>>()
        .join("\n");
    let history_block = if history_info.is_empty() {
        "No previous commands.".to_string()
    } else {
        history_info
    };

    format!(
        "You are a command-line assistant that turns natural language requests into \
         shell commands. Analyze the user's request, choose the single most appropriate \
         command, and reply with it.\n\
         \n\
         Environment Information:\n\
         - Shell: {shell}\n\
         - Operating System: {os}\n\
         - Open Command: {open}\n\
         - Default Browser: {browser}\n\
         \n\
         Recent command history:\n\
         {history}\n\
         \n\
         When a task needs several steps, express it as one command line for {shell} \
         using pipes (`|`), logical operators (`&&`, `||`) and redirections (`>`, `>>`, `<`) \
         instead of multiple replies.\n\
         \n\
         Respond ONLY with a single JSON object with exactly one key, \"command\", \
         for example:\n\
         {{\"command\": \"ls -la\"}}\n\
         Do not include explanations, markdown or any text outside the JSON object.",
        shell = environment.shell,
        os = environment.os,
        open = hints.open_command,
        browser = hints.browser,
        history = history_block,
    )
}

/// The follow-up user message sent after a failed execution.
pub fn build_retry_request(error: &str) -> String {
    format!(
        "The last command failed with the following error: {}. \
         Please modify the command to fix the error.",
        error.trim()
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shell::{OsFamily, ShellType};
    use pretty_assertions::assert_eq;

    fn environment() -> EnvironmentInfo {
        EnvironmentInfo {
            shell: ShellType::Zsh,
            os: OsFamily::MacOs,
        }
    }

    fn history_with(commands: &[(&str, bool)]) -> CommandHistory {
        let mut history = CommandHistory::new(10);
        for (command, success) in commands {
            let entry = if *success {
                HistoryEntry::success("prompt", command, String::new())
            } else {
                HistoryEntry::failure("prompt", command, format!("{} failed", command))
            };
            history.append(entry);
        }
        history
    }

    #[test]
    fn test_prompt_is_deterministic() {
        let history = history_with(&[("ls", true), ("cat missing", false)]);
        let first = build_system_prompt(&environment(), &history);
        let second = build_system_prompt(&environment(), &history.clone());
        assert_eq!(first, second);
    }

    #[test]
    fn test_prompt_embeds_environment_and_json_instruction() {
        let prompt = build_system_prompt(&environment(), &CommandHistory::new(10));
        assert!(prompt.contains("- Shell: zsh"));
        assert!(prompt.contains("- Operating System: macos"));
        assert!(prompt.contains("- Open Command: open"));
        assert!(prompt.contains("\"command\""));
        assert!(prompt.contains("No previous commands."));
    }

    #[test]
    fn test_prompt_embeds_last_three_entries_oldest_first() {
        let history = history_with(&[
            ("echo one", true),
            ("echo two", true),
            ("cat three", false),
            ("echo four", true),
        ]);
        let prompt = build_system_prompt(&environment(), &history);

        assert!(!prompt.contains("echo one"));
        let two = prompt
            .find("Previous Command: echo two, Success: true, Error: None")
            .unwrap();
        let three = prompt
            .find("Previous Command: cat three, Success: false, Error: cat three failed")
            .unwrap();
        let four = prompt
            .find("Previous Command: echo four, Success: true, Error: None")
            .unwrap();
        assert!(two < three && three < four);
    }

    #[test]
    fn test_retry_request_embeds_error() {
        assert_eq!(
            build_retry_request("ls: /nope: No such file or directory\n"),
            "The last command failed with the following error: ls: /nope: No such file or directory. \
             Please modify the command to fix the error."
        );
    }
}
