use crate::config::SecurityConfig;
use anyhow::{Context, Result};
use regex::Regex;
use std::collections::HashSet;
use std::fmt;

/// Outcome of checking a model-proposed command against the safety rules.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Classification {
    Allowed,
    RequiresConfirmation { reason: String },
    Forbidden { reason: String },
}

impl fmt::Display for Classification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Allowed => write!(f, "allowed"),
            Self::RequiresConfirmation { reason } => write!(f, "requires confirmation ({})", reason),
            Self::Forbidden { reason } => write!(f, "forbidden ({})", reason),
        }
    }
}

const ROOT_DELETE_REASON: &str = "recursive delete of a root or home directory";

const PROTECTED_TARGETS: &[&str] = &["/", "~", "$HOME", "${HOME}"];

// Words that run the next word as the actual program.
const COMMAND_PREFIXES: &[&str] = &["sudo", "doas", "env", "command", "exec", "nohup"];

pub const DEFAULT_FORBIDDEN_PATTERNS: &[(&str, &str)] = &[
    (
        r"\brm\s+(-[a-z]*\s+)*--no-preserve-root",
        "delete without root protection",
    ),
    (r"\bmkfs(\.[a-z0-9]+)?\b", "filesystem format"),
    (r"\bdd\b.*\bof=/dev/(sd|hd|nvme|disk|mmcblk|vd)", "raw write to a block device"),
    (r">\s*/dev/(sd|hd|nvme|disk|mmcblk|vd)[a-z0-9]*", "redirect onto a block device"),
    (r":\(\)\s*\{\s*:\s*\|\s*:\s*&\s*\}\s*;\s*:", "fork bomb"),
    (
        r"\b(chmod|chown)\s+(-[a-z]*\s+)*-[a-z]*r[a-z]*\s+(\S+\s+)?/(\s|$)",
        "recursive permission change of the root directory",
    ),
    (r"\bformat-volume\b", "volume format"),
    (r"\bformat\s+[a-z]:", "drive format"),
    (
        r"\b(rmdir|rd)\s+(/q\s+)*/s\s+(/q\s+)*[a-z]:\\?(\s|$)",
        "recursive delete of a drive",
    ),
];

pub const DEFAULT_DESTRUCTIVE_COMMANDS: &[&str] = &[
    "rm", "rmdir", "mv", "cp", "chmod", "chown", "dd", "shred", "truncate", "del", "erase", "rd",
    "move", "copy", "remove-item", "move-item", "shutdown", "reboot", "halt", "poweroff",
    "stop-computer", "restart-computer",
];

struct ForbiddenRule {
    pattern: Regex,
    reason: String,
}

/// Two-tier safety policy: hard deny for catastrophic patterns, confirmation
/// for destructive verbs and file redirection.
pub struct CommandValidator {
    forbidden: Vec<ForbiddenRule>,
    destructive_commands: HashSet<String>,
    redirection: Regex,
}

impl fmt::Debug for CommandValidator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandValidator")
            .field("forbidden_rules", &self.forbidden.len())
            .field("destructive_commands", &self.destructive_commands)
            .finish()
    }
}

impl CommandValidator {
    pub fn new(config: &SecurityConfig) -> Result<Self> {
        let mut forbidden = Vec::with_capacity(config.forbidden_patterns.len());
        for pattern in &config.forbidden_patterns {
            let regex = Regex::new(&format!("(?i){}", pattern))
                .with_context(|| format!("Invalid forbidden pattern: {}", pattern))?;
            let reason = DEFAULT_FORBIDDEN_PATTERNS
                .iter()
                .find(|(p, _)| p == pattern)
                .map(|(_, reason)| reason.to_string())
                .unwrap_or_else(|| format!("matches forbidden pattern `{}`", pattern));
            forbidden.push(ForbiddenRule {
                pattern: regex,
                reason,
            });
        }

        let destructive_commands = config
            .destructive_commands
            .iter()
            .map(|c| c.trim().to_lowercase())
            .filter(|c| !c.is_empty())
            .collect();

        // `>`/`>>`/`&>` followed by a target that is not an fd duplicate
        let redirection = Regex::new(r"(?:^|[^<>&0-9])(?:[0-9]|&)?>>?\s*([^\s&|;<>][^\s|;<>]*)")?;

        Ok(Self {
            forbidden,
            destructive_commands,
            redirection,
        })
    }

    pub fn classify(&self, command: &str) -> Classification {
        let command = command.trim();

        if deletes_root_or_home(command) {
            return Classification::Forbidden {
                reason: ROOT_DELETE_REASON.to_string(),
            };
        }

        if let Some(rule) = self
            .forbidden
            .iter()
            .find(|rule| rule.pattern.is_match(command))
        {
            return Classification::Forbidden {
                reason: rule.reason.clone(),
            };
        }

        if let Some(verb) = self.find_destructive_word(command) {
            return Classification::RequiresConfirmation {
                reason: format!("uses `{}`", verb),
            };
        }

        if let Some(target) = self.find_file_redirection(command) {
            return Classification::RequiresConfirmation {
                reason: format!("writes output to `{}`", target),
            };
        }

        Classification::Allowed
    }

    fn find_destructive_word(&self, command: &str) -> Option<String> {
        command
            .split(|c: char| c.is_whitespace() || matches!(c, ';' | '|' | '&' | '(' | ')' | '`'))
            .map(|word| word.trim_matches(|c: char| matches!(c, '"' | '\'' | '{' | '}')))
            .filter(|word| !word.is_empty())
            .map(|word| {
                let name = word.rsplit(['/', '\\']).next().unwrap_or(word).to_lowercase();
                name.strip_suffix(".exe").unwrap_or(&name).to_string()
            })
            .find(|word| self.destructive_commands.contains(word))
    }

    fn find_file_redirection(&self, command: &str) -> Option<String> {
        self.redirection
            .captures_iter(command)
            .filter_map(|caps| caps.get(1))
            .map(|m| m.as_str().trim_matches(|c: char| c == '"' || c == '\''))
            .find(|target| {
                !target.is_empty() && *target != "/dev/null" && !target.eq_ignore_ascii_case("nul")
            })
            .map(str::to_string)
    }
}

/// Finds `rm` invocations that recursively delete `/`, `~` or `$HOME`,
/// whatever the flag spelling, quoting or `--` placement.
fn deletes_root_or_home(command: &str) -> bool {
    command
        .split(|c: char| matches!(c, ';' | '|' | '&' | '\n' | '(' | ')' | '`'))
        .any(|segment| {
            let mut words = segment
                .split_whitespace()
                .map(|word| word.trim_matches(|c: char| c == '"' || c == '\''));

            let program = loop {
                match words.next() {
                    Some(word) if COMMAND_PREFIXES.contains(&word) || word.starts_with('-') => {}
                    Some(word) => break word,
                    None => return false,
                }
            };
            if program.rsplit('/').next() != Some("rm") {
                return false;
            }

            let mut recursive = false;
            let mut options_done = false;
            let mut targets = Vec::new();
            for word in words {
                if options_done || !word.starts_with('-') || word == "-" {
                    targets.push(word);
                } else if word == "--" {
                    options_done = true;
                } else if let Some(long) = word.strip_prefix("--") {
                    recursive |= long == "recursive";
                } else {
                    recursive |= word[1..].contains(['r', 'R']);
                }
            }

            recursive && targets.into_iter().any(is_protected_target)
        })
}

fn is_protected_target(target: &str) -> bool {
    if target.is_empty() {
        return false;
    }
    let trimmed = target
        .strip_suffix("/*")
        .unwrap_or(target)
        .trim_end_matches('/');
    let normalized = if trimmed.is_empty() { "/" } else { trimmed };
    PROTECTED_TARGETS
        .iter()
        .any(|protected| protected.eq_ignore_ascii_case(normalized))
}

/// Exact, case-insensitive "yes" or "y".
pub fn is_affirmative(answer: &str) -> bool {
    let answer = answer.trim();
    answer.eq_ignore_ascii_case("yes") || answer.eq_ignore_ascii_case("y")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn validator() -> CommandValidator {
        CommandValidator::new(&SecurityConfig::default()).unwrap()
    }

    #[test]
    fn test_classification_tiers() {
        let v = validator();
        assert!(matches!(v.classify("rm -rf /"), Classification::Forbidden { .. }));
        assert!(matches!(
            v.classify("rm file.txt"),
            Classification::RequiresConfirmation { .. }
        ));
        assert_eq!(v.classify("ls -la"), Classification::Allowed);
    }

    #[test]
    fn test_catastrophic_patterns_are_forbidden() {
        let v = validator();
        for command in [
            "rm -rf ~",
            "rm -rf ~/",
            "rm -fr /*",
            "sudo rm -r -f /",
            "rm -Rf $HOME",
            "rm -rf -- /",
            "rm --recursive --force /",
            "rm -r --force /",
            "rm -rf \"/\"",
            "rm -rf $HOME/",
            "rm -rf \"$HOME\"",
            "rm -rf ${HOME}/*",
            "cd /tmp && sudo /bin/rm -fr ~/",
            "rm --no-preserve-root -rf /",
            "mkfs.ext4 /dev/sda1",
            "dd if=/dev/zero of=/dev/sda bs=1M",
            "echo hi > /dev/sda",
            ":(){ :|:& };:",
            "chmod -R 777 /",
            r"rd /s /q C:\",
            r"rmdir /S D:",
        ] {
            assert!(
                matches!(v.classify(command), Classification::Forbidden { .. }),
                "{} should be forbidden",
                command
            );
        }
    }

    #[test]
    fn test_scoped_deletes_only_need_confirmation() {
        let v = validator();
        for command in [
            "rm -rf ./build",
            "rm -rf ~/tmp/cache",
            "/bin/rm notes.txt",
            "sudo mv a.txt b.txt",
            "cp -f a b",
            "chmod +x run.sh",
            "find . -name '*.tmp' | xargs rm",
        ] {
            assert!(
                matches!(v.classify(command), Classification::RequiresConfirmation { .. }),
                "{} should require confirmation",
                command
            );
        }
    }

    #[test]
    fn test_non_recursive_or_scoped_rm_is_not_forbidden() {
        let v = validator();
        for command in ["rm /", "rm -f ~", "rm -rf ''", "rm -rf ~/.cache/*", "rm -rf /tmp/build"] {
            assert!(
                matches!(v.classify(command), Classification::RequiresConfirmation { .. }),
                "{} should require confirmation",
                command
            );
        }
    }

    #[test]
    fn test_power_commands_need_confirmation() {
        let v = validator();
        for command in [
            "shutdown -h now",
            "sudo reboot",
            "halt",
            "systemctl poweroff; poweroff",
            "Stop-Computer -Force",
            "Restart-Computer",
        ] {
            assert!(
                matches!(v.classify(command), Classification::RequiresConfirmation { .. }),
                "{} should require confirmation",
                command
            );
        }
    }

    #[test]
    fn test_redirection_detection() {
        let v = validator();
        assert!(matches!(
            v.classify("echo hello > out.txt"),
            Classification::RequiresConfirmation { .. }
        ));
        assert!(matches!(
            v.classify("date >> log.txt"),
            Classification::RequiresConfirmation { .. }
        ));
        assert_eq!(v.classify("ls 2>/dev/null"), Classification::Allowed);
        assert_eq!(v.classify("make 2>&1 | tail -n 5"), Classification::Allowed);
        assert_eq!(v.classify("grep -c foo < input.txt"), Classification::Allowed);
    }

    #[test]
    fn test_verbs_inside_words_are_not_destructive() {
        let v = validator();
        assert_eq!(v.classify("git format-patch HEAD~1"), Classification::Allowed);
        assert_eq!(v.classify("echo performance"), Classification::Allowed);
        assert_eq!(v.classify("ls ~/firmware"), Classification::Allowed);
    }

    #[test]
    fn test_custom_configuration() {
        let config = SecurityConfig {
            destructive_commands: vec!["git".to_string()],
            forbidden_patterns: vec![r"\bshutdown\b".to_string()],
        };
        let v = CommandValidator::new(&config).unwrap();
        assert!(matches!(v.classify("sudo shutdown -h now"), Classification::Forbidden { .. }));
        assert!(matches!(
            v.classify("git push --force"),
            Classification::RequiresConfirmation { .. }
        ));
        assert_eq!(v.classify("rm file.txt"), Classification::Allowed);
    }

    #[test]
    fn test_invalid_pattern_is_rejected() {
        let config = SecurityConfig {
            destructive_commands: vec![],
            forbidden_patterns: vec!["(unclosed".to_string()],
        };
        assert!(CommandValidator::new(&config).is_err());
    }

    #[test]
    fn test_affirmative_answers() {
        assert!(is_affirmative("yes"));
        assert!(is_affirmative(" Y \n"));
        assert!(is_affirmative("YES"));
        assert!(!is_affirmative("yeah"));
        assert!(!is_affirmative(""));
        assert!(!is_affirmative("no"));
    }
}
