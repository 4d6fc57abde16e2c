use crate::ai::{build_retry_request, build_system_prompt, parse_command_response, CompletionClient};
use crate::config::DisplayConfig;
use crate::executor::hints::describe_failure;
use crate::executor::history::{CommandHistory, HistoryEntry};
use crate::executor::validation::{is_affirmative, Classification, CommandValidator};
use crate::executor::{CommandExecutor, ExecutionResult};
use crate::shell::EnvironmentInfo;
use anyhow::Result;
use colored::*;
use std::io::{BufRead, Write};
use std::time::Instant;

pub const PROMPT: &str = "termpal> ";

/// Follow-up model turns allowed after a failed execution.
pub const MAX_RETRIES: usize = 1;

const HELP_TEXT: &str = "\
Describe what you want to do in plain language and termpal will run a matching command.
Examples:
  - list files on desktop
  - show the five largest files in this directory
  - open browser
Keywords:
  help          show this message
  history       show the remembered commands
  exit, quit    stop the assistant (an empty line or Ctrl-D also works)
Commands that delete, move or overwrite files ask for confirmation first.";

/// What a single line of input led to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TurnOutcome {
    Exit,
    Help,
    History,
    /// At least one command ran. `attempts` counts executions, retries included.
    Executed { success: bool, attempts: usize },
    ModelError(String),
    ParseError(String),
    Refused(String),
    Cancelled,
    Interrupted,
}

enum Attempt {
    Succeeded,
    Failed(String),
    Stopped(TurnOutcome),
}

pub struct Assistant<C> {
    client: C,
    environment: EnvironmentInfo,
    history: CommandHistory,
    validator: CommandValidator,
    executor: CommandExecutor,
    display: DisplayConfig,
}

impl<C: CompletionClient> Assistant<C> {
    pub fn new(
        client: C,
        environment: EnvironmentInfo,
        history: CommandHistory,
        validator: CommandValidator,
        executor: CommandExecutor,
        display: DisplayConfig,
    ) -> Self {
        Self {
            client,
            environment,
            history,
            validator,
            executor,
            display,
        }
    }

    pub fn client(&self) -> &C {
        &self.client
    }

    pub fn history(&self) -> &CommandHistory {
        &self.history
    }

    /// Reads lines from `input` until an exit keyword, an empty line or EOF.
    /// Confirmation answers are read from the same `input`.
    pub async fn run<R, W>(&mut self, input: &mut R, output: &mut W) -> Result<()>
    where
        R: BufRead,
        W: Write,
    {
        loop {
            write!(output, "{}", PROMPT.green().bold())?;
            output.flush()?;

            let mut line = String::new();
            if input.read_line(&mut line)? == 0 {
                writeln!(output)?;
                break;
            }

            if self.handle_input(&line, input, output).await? == TurnOutcome::Exit {
                break;
            }
        }

        writeln!(output, "Exiting the assistant.")?;
        self.save_history(output)?;
        Ok(())
    }

    /// Runs one turn for `line`. The outer `Result` only carries I/O errors on
    /// `input`/`output`; everything else is folded into the outcome.
    pub async fn handle_input<R, W>(
        &mut self,
        line: &str,
        input: &mut R,
        output: &mut W,
    ) -> Result<TurnOutcome>
    where
        R: BufRead,
        W: Write,
    {
        let user_prompt = line.trim();

        if user_prompt.is_empty()
            || user_prompt.eq_ignore_ascii_case("exit")
            || user_prompt.eq_ignore_ascii_case("quit")
        {
            return Ok(TurnOutcome::Exit);
        }
        if user_prompt.eq_ignore_ascii_case("help") {
            writeln!(output, "{}", HELP_TEXT)?;
            return Ok(TurnOutcome::Help);
        }
        if user_prompt.eq_ignore_ascii_case("history") {
            self.print_history(output)?;
            return Ok(TurnOutcome::History);
        }

        tracing::info!(user_prompt, "new request");

        let mut request = user_prompt.to_string();
        let mut attempts = 0;
        loop {
            let retrying = attempts > 0;
            match self
                .attempt(user_prompt, &request, retrying, input, output)
                .await?
            {
                Attempt::Succeeded => {
                    return Ok(TurnOutcome::Executed {
                        success: true,
                        attempts: attempts + 1,
                    });
                }
                Attempt::Failed(error) if attempts < MAX_RETRIES => {
                    attempts += 1;
                    writeln!(output, "{}", "Asking for a corrected command...".yellow())?;
                    request = build_retry_request(&error);
                }
                Attempt::Failed(_) => {
                    return Ok(TurnOutcome::Executed {
                        success: false,
                        attempts: attempts + 1,
                    });
                }
                Attempt::Stopped(outcome) => return Ok(outcome),
            }
        }
    }

    async fn attempt<R, W>(
        &mut self,
        user_prompt: &str,
        request: &str,
        retrying: bool,
        input: &mut R,
        output: &mut W,
    ) -> Result<Attempt>
    where
        R: BufRead,
        W: Write,
    {
        let system_prompt = build_system_prompt(&self.environment, &self.history);
        tracing::debug!(%system_prompt, request, "requesting command");

        let reply = match self.client.complete(&system_prompt, request).await {
            Ok(reply) => reply,
            Err(e) => {
                tracing::error!(user_prompt, error = %e, "model call failed");
                writeln!(output, "{}: {}", "Error".red().bold(), e)?;
                return Ok(Attempt::Stopped(TurnOutcome::ModelError(e.to_string())));
            }
        };

        let command = match parse_command_response(&reply) {
            Ok(parsed) => parsed.command,
            Err(e) => {
                tracing::warn!(user_prompt, reason = %e.reason, raw = %e.raw, "unparsable model reply");
                writeln!(output, "{}: {}", "Error".red().bold(), e)?;
                writeln!(output, "Response: {}", e.raw)?;
                writeln!(
                    output,
                    "Tip: Please ensure your input is clear, or try simplifying your request."
                )?;
                return Ok(Attempt::Stopped(TurnOutcome::ParseError(e.reason)));
            }
        };

        match self.validator.classify(&command) {
            Classification::Forbidden { reason } => {
                tracing::warn!(user_prompt, %command, %reason, "refused forbidden command");
                writeln!(
                    output,
                    "{} [{}]: {}",
                    "Refusing to run".red().bold(),
                    command,
                    reason
                )?;
                return Ok(Attempt::Stopped(TurnOutcome::Refused(reason)));
            }
            Classification::RequiresConfirmation { reason } => {
                write!(
                    output,
                    "{} [{}] {}. Are you sure you want to execute it? (yes/no): ",
                    "Warning:".yellow().bold(),
                    command,
                    reason
                )?;
                output.flush()?;

                let mut answer = String::new();
                input.read_line(&mut answer)?;
                if !is_affirmative(&answer) {
                    tracing::info!(user_prompt, %command, "execution cancelled by user");
                    writeln!(output, "Command execution cancelled.")?;
                    return Ok(Attempt::Stopped(TurnOutcome::Cancelled));
                }
            }
            Classification::Allowed => {}
        }

        let verb = if retrying { "Retrying" } else { "Running" };
        writeln!(output, "{} command [{}] ...", verb, command.cyan())?;

        let started = Instant::now();
        let result = tokio::select! {
            result = self.executor.execute(&command) => result,
            _ = interrupted() => {
                tracing::warn!(user_prompt, %command, "command interrupted");
                writeln!(output, "\n{}", "Command interrupted.".yellow())?;
                return Ok(Attempt::Stopped(TurnOutcome::Interrupted));
            }
        };
        let elapsed = started.elapsed();

        tracing::info!(
            user_prompt,
            %command,
            success = result.success(),
            exit_code = result.exit_code,
            retry = retrying,
            "command finished"
        );

        let attempt = self.report(user_prompt, &command, result, output)?;
        if self.display.show_execution_time {
            writeln!(output, "{}", format!("Completed in {:.2?}", elapsed).dimmed())?;
        }
        self.save_history(output)?;
        Ok(attempt)
    }

    /// Prints the result and records it in the history.
    fn report<W: Write>(
        &mut self,
        user_prompt: &str,
        command: &str,
        result: ExecutionResult,
        output: &mut W,
    ) -> Result<Attempt> {
        if result.success() {
            writeln!(output, "{}", "Command executed successfully.".green())?;
            if !result.stdout.is_empty() {
                writeln!(output, "Command output:")?;
                writeln!(output, "{}", result.stdout)?;
            }
            self.history
                .append(HistoryEntry::success(user_prompt, command, result.stdout));
            Ok(Attempt::Succeeded)
        } else {
            let error = describe_failure(command, &result);
            writeln!(output, "{}", "Error executing command:".red().bold())?;
            writeln!(output, "{}", error)?;
            self.history
                .append(HistoryEntry::failure(user_prompt, command, error.clone()));
            Ok(Attempt::Failed(error))
        }
    }

    fn print_history<W: Write>(&self, output: &mut W) -> Result<()> {
        if self.history.is_empty() {
            writeln!(output, "No commands in history.")?;
            return Ok(());
        }

        for (i, entry) in self.history.iter().enumerate() {
            let status = if entry.success {
                "ok".green()
            } else {
                "failed".red()
            };
            writeln!(
                output,
                "{:>2}. [{}] {} -> {}",
                i + 1,
                status,
                entry.user_prompt,
                entry.command.cyan()
            )?;
        }
        Ok(())
    }

    /// Writes the history to disk when it has a backing file. Failures are
    /// reported but never end the session.
    fn save_history<W: Write>(&self, output: &mut W) -> Result<()> {
        if !self.history.is_persistent() {
            return Ok(());
        }
        if let Err(e) = self.history.persist() {
            tracing::warn!(error = %e, "could not save command history");
            writeln!(
                output,
                "{}: could not save command history: {}",
                "Warning".yellow(),
                e
            )?;
        }
        Ok(())
    }
}

/// Resolves on Ctrl-C. Never resolves when the handler cannot be installed.
async fn interrupted() {
    if tokio::signal::ctrl_c().await.is_err() {
        std::future::pending::<()>().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::TestUtils;
    use std::io::Cursor;

    #[tokio::test]
    async fn test_exit_keywords() {
        for line in ["exit", "QUIT", "", "   \n"] {
            let mut assistant = TestUtils::assistant(vec![]);
            let mut input = Cursor::new(Vec::new());
            let mut output = Vec::new();
            let outcome = assistant
                .handle_input(line, &mut input, &mut output)
                .await
                .unwrap();
            assert_eq!(outcome, TurnOutcome::Exit, "line {:?}", line);
        }
    }

    #[tokio::test]
    async fn test_help_skips_the_model() {
        let mut assistant = TestUtils::assistant(vec![]);
        let mut input = Cursor::new(Vec::new());
        let mut output = Vec::new();

        let outcome = assistant
            .handle_input("help\n", &mut input, &mut output)
            .await
            .unwrap();

        assert_eq!(outcome, TurnOutcome::Help);
        assert!(String::from_utf8(output).unwrap().contains("exit, quit"));
        assert!(assistant.history().is_empty());
    }

    #[tokio::test]
    async fn test_history_keyword_lists_entries() {
        let mut assistant = TestUtils::assistant(vec![]);
        let mut input = Cursor::new(Vec::new());

        let mut output = Vec::new();
        assistant
            .handle_input("history", &mut input, &mut output)
            .await
            .unwrap();
        assert!(String::from_utf8(output).unwrap().contains("No commands in history."));

        assistant
            .history
            .append(HistoryEntry::success("say hi", "echo hi", "hi".to_string()));
        let mut output = Vec::new();
        let outcome = assistant
            .handle_input("history", &mut input, &mut output)
            .await
            .unwrap();
        assert_eq!(outcome, TurnOutcome::History);
        assert!(String::from_utf8(output).unwrap().contains("say hi -> "));
    }

    #[tokio::test]
    async fn test_run_stops_at_eof() {
        let mut assistant = TestUtils::assistant(vec![]);
        let mut input = Cursor::new(b"help\n".to_vec());
        let mut output = Vec::new();

        assistant.run(&mut input, &mut output).await.unwrap();

        let printed = String::from_utf8(output).unwrap();
        assert!(printed.contains(PROMPT));
        assert!(printed.ends_with("Exiting the assistant.\n"));
    }
}
