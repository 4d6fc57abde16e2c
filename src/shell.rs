// src/shell.rs
use serde::{Deserialize, Serialize};
use std::env;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ShellType {
    Bash,
    Zsh,
    Fish,
    Sh,
    PowerShell,
    Cmd,
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OsFamily {
    MacOs,
    Linux,
    Windows,
    Other,
}

/// Facts about the machine the assistant runs on, computed once at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EnvironmentInfo {
    pub shell: ShellType,
    pub os: OsFamily,
}

/// Per-platform conveniences the model can use when a request involves
/// opening files or URLs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlatformHints {
    pub open_command: &'static str,
    pub browser: &'static str,
}

const DEFAULT_UNIX_SHELL: &str = "/bin/bash";

impl ShellType {
    /// Classifies a shell path or program name by matching known names.
    pub fn from_path(path: &str) -> Self {
        let name = path
            .rsplit(['/', '\\'])
            .next()
            .unwrap_or(path)
            .trim()
            .to_lowercase();
        let name = name.strip_suffix(".exe").unwrap_or(&name);

        if name.contains("pwsh") || name.contains("powershell") {
            ShellType::PowerShell
        } else if name.contains("zsh") {
            ShellType::Zsh
        } else if name.contains("fish") {
            ShellType::Fish
        } else if name.contains("bash") {
            ShellType::Bash
        } else if name == "cmd" {
            ShellType::Cmd
        } else if name.ends_with("sh") {
            // sh, dash, ksh, ash, mksh
            ShellType::Sh
        } else {
            ShellType::Unknown
        }
    }

    pub fn get_shell_command(&self) -> (&'static str, &'static [&'static str]) {
        match self {
            ShellType::Bash => ("bash", &["-c"]),
            ShellType::Zsh => ("zsh", &["-c"]),
            ShellType::Fish => ("fish", &["-c"]),
            ShellType::Sh => ("sh", &["-c"]),
            ShellType::PowerShell => {
                if cfg!(windows) {
                    ("powershell", &["-NoProfile", "-Command"])
                } else {
                    ("pwsh", &["-NoProfile", "-Command"])
                }
            }
            ShellType::Cmd => ("cmd", &["/C"]),
            ShellType::Unknown => {
                if cfg!(windows) {
                    ("cmd", &["/C"])
                } else {
                    ("sh", &["-c"])
                }
            }
        }
    }

    pub fn get_shell_name(&self) -> &'static str {
        match self {
            ShellType::Bash => "bash",
            ShellType::Zsh => "zsh",
            ShellType::Fish => "fish",
            ShellType::Sh => "sh",
            ShellType::PowerShell => "pwsh",
            ShellType::Cmd => "cmd",
            ShellType::Unknown => "unknown",
        }
    }
}

impl fmt::Display for ShellType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.get_shell_name())
    }
}

impl OsFamily {
    pub fn from_name(name: &str) -> Self {
        match name.trim().to_lowercase().as_str() {
            "macos" | "darwin" | "mac" | "osx" => OsFamily::MacOs,
            "linux" => OsFamily::Linux,
            "windows" | "win32" => OsFamily::Windows,
            _ => OsFamily::Other,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            OsFamily::MacOs => "macos",
            OsFamily::Linux => "linux",
            OsFamily::Windows => "windows",
            OsFamily::Other => "other",
        }
    }

    pub fn hints(&self) -> PlatformHints {
        match self {
            OsFamily::MacOs => PlatformHints {
                open_command: "open",
                browser: "Safari",
            },
            OsFamily::Linux => PlatformHints {
                open_command: "xdg-open",
                browser: "firefox",
            },
            OsFamily::Windows => PlatformHints {
                open_command: "start",
                browser: "Microsoft Edge",
            },
            OsFamily::Other => PlatformHints {
                open_command: "unknown",
                browser: "unknown",
            },
        }
    }
}

impl fmt::Display for OsFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl EnvironmentInfo {
    pub fn detect() -> Self {
        Self::from_vars(|key| env::var(key).ok(), env::consts::OS)
    }

    /// Pure core of [`EnvironmentInfo::detect`]: `lookup` resolves
    /// environment variables and `os_name` identifies the platform.
    pub fn from_vars<F>(lookup: F, os_name: &str) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let os = OsFamily::from_name(os_name);
        let shell_var = lookup("SHELL").filter(|s| !s.trim().is_empty());

        let shell = match shell_var {
            Some(path) => ShellType::from_path(&path),
            None if os == OsFamily::Windows => {
                let in_powershell = lookup("PSModulePath")
                    .map(|v| !v.is_empty())
                    .unwrap_or(false);
                if in_powershell {
                    ShellType::PowerShell
                } else {
                    lookup("COMSPEC")
                        .map(|path| ShellType::from_path(&path))
                        .filter(|shell| *shell != ShellType::Unknown)
                        .unwrap_or(ShellType::Cmd)
                }
            }
            None => ShellType::from_path(DEFAULT_UNIX_SHELL),
        };

        Self { shell, os }
    }

    pub fn hints(&self) -> PlatformHints {
        self.os.hints()
    }
}

/// Returns true when `program` resolves to an executable on `PATH`.
pub fn is_program_installed(program: &str) -> bool {
    !program.is_empty() && which::which(program).is_ok()
}
