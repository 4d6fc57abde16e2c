use super::ExecutionResult;
use crate::shell::is_program_installed;
use regex::Regex;
use std::sync::OnceLock;

fn not_found_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| {
            // bash: "bash: foo: command not found", dash: "sh: 1: foo: not found",
            // zsh: "zsh: command not found: foo", cmd: "'foo' is not recognized ..."
            Regex::new(
                r"(?m)(?:([^\s:']+): (?:command )?not found$|command not found: (\S+)|'([^']+)' is not recognized as)",
            )
            .ok()
        })
        .as_ref()
}

/// Names the program a "not found" error refers to, falling back to the
/// first word of the command.
fn missing_program(command: &str, stderr: &str) -> String {
    not_found_pattern()
        .and_then(|pattern| pattern.captures(stderr))
        .and_then(|caps| caps.get(1).or_else(|| caps.get(2)).or_else(|| caps.get(3)))
        .map(|m| m.as_str().to_string())
        .or_else(|| {
            command
                .split_whitespace()
                .find(|word| !matches!(*word, "sudo" | "env" | "command" | "exec"))
                .map(str::to_string)
        })
        .unwrap_or_default()
}

/// A one-line suggestion for a failed execution, when one of the known
/// failure shapes is recognized.
pub fn failure_hint(command: &str, result: &ExecutionResult) -> Option<String> {
    if result.timed_out() {
        return Some(
            "Tip: The command did not finish in time. Try a quicker or non-interactive variant."
                .to_string(),
        );
    }

    let stderr = &result.stderr;
    if stderr.contains("not found") || stderr.contains("is not recognized as") {
        let program = missing_program(command, stderr);
        if !program.is_empty() && !is_program_installed(&program) {
            return Some(format!(
                "Tip: The command '{}' is not available. Please install it or check your spelling.",
                program
            ));
        }
    }

    if stderr.contains("No such file or directory") || stderr.contains("cannot find the path") {
        return Some(format!(
            "Tip: A path in the command '{}' does not exist. Please check the path.",
            command
        ));
    }

    if stderr.contains("Permission denied") || stderr.contains("Access is denied") {
        return Some(
            "Tip: Permission was denied. Check the file permissions or whether elevated privileges are needed."
                .to_string(),
        );
    }

    None
}

/// The error text recorded for a failed execution: stderr (or the exit
/// status when stderr is empty) followed by a hint when one applies.
pub fn describe_failure(command: &str, result: &ExecutionResult) -> String {
    let mut error = if result.stderr.trim().is_empty() {
        format!("Command exited with status {}", result.exit_code)
    } else {
        result.stderr.clone()
    };

    if let Some(hint) = failure_hint(command, result) {
        error.push('\n');
        error.push_str(&hint);
    }
    error
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::TIMEOUT_EXIT_CODE;

    fn failed(stderr: &str, exit_code: i32) -> ExecutionResult {
        ExecutionResult {
            stdout: String::new(),
            stderr: stderr.to_string(),
            exit_code,
        }
    }

    #[test]
    fn test_missing_program_hint() {
        let result = failed("bash: frobnicatezz: command not found", 127);
        let hint = failure_hint("frobnicatezz --all", &result).unwrap();
        assert!(hint.contains("'frobnicatezz' is not available"));

        let result = failed("sh: 1: qwertyzz: not found", 127);
        let hint = failure_hint("echo a | qwertyzz", &result).unwrap();
        assert!(hint.contains("'qwertyzz'"));

        let result = failed("zsh: command not found: zxcvbzz", 127);
        assert!(failure_hint("zxcvbzz", &result).unwrap().contains("'zxcvbzz'"));
    }

    #[test]
    fn test_missing_path_hint() {
        let result = failed("ls: cannot access '/nope': No such file or directory", 2);
        let hint = failure_hint("ls /nope", &result).unwrap();
        assert_eq!(
            hint,
            "Tip: A path in the command 'ls /nope' does not exist. Please check the path."
        );
    }

    #[test]
    fn test_timeout_hint() {
        let result = failed("Command timed out after 10 seconds", TIMEOUT_EXIT_CODE);
        assert!(failure_hint("top", &result).unwrap().contains("did not finish in time"));
    }

    #[test]
    fn test_describe_failure() {
        let result = failed("", 3);
        assert_eq!(describe_failure("exit 3", &result), "Command exited with status 3");

        let result = failed("cat: secret: Permission denied", 1);
        let described = describe_failure("cat secret", &result);
        assert!(described.starts_with("cat: secret: Permission denied\nTip: Permission was denied"));

        let result = failed("something odd happened", 1);
        assert_eq!(describe_failure("odd", &result), "something odd happened");
    }
}
