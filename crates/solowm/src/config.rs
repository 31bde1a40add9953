//! Runtime configuration

use serde::{Deserialize, Serialize};

/// How switching away from a panel hides it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LeaveMode {
    /// The next panel simply covers the previous one.
    #[default]
    Raise,
    /// The previous panel is unmapped before the next one is shown.
    Unmap,
}

/// An entry of the program list overlay.
///
/// `command: None` marks an engine action addressed by its exact title
/// (`quit`, `resize`, `restart`, `print state`, `position fix`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgramEntry {
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
    /// Single-key shortcut usable while the program list is visible.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<char>,
}

/// Remote-control bridge settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteConfig {
    pub enabled: bool,
    /// lircd-compatible socket; empty means the bridge's default.
    pub socket: String,
    /// Button-to-command mapping file; empty means the bridge's default.
    pub mapping: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub leave_mode: LeaveMode,
    pub quit_on_last_close: bool,
    pub confirm_quit: bool,
    /// One chord rotates panel list -> program list -> hidden.
    pub single_key: bool,
    pub position_fix: bool,
    /// Core font used by the list overlays.
    pub font: String,
    /// Programs launched once at startup.
    pub startup: Vec<String>,
    pub remote: RemoteConfig,
    pub programs: Vec<ProgramEntry>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            leave_mode: LeaveMode::default(),
            quit_on_last_close: false,
            confirm_quit: false,
            single_key: false,
            position_fix: false,
            font: "fixed".to_string(),
            startup: Vec::new(),
            remote: RemoteConfig::default(),
            programs: Vec::new(),
        }
    }
}

impl Config {
    /// Load configuration from file, falling back to the built-in set.
    pub fn load() -> Self {
        let config_paths = [
            dirs::config_dir().map(|p| p.join("solowm/config.toml")),
            Some(std::path::PathBuf::from("/etc/solowm/config.toml")),
        ];

        for path in config_paths.into_iter().flatten() {
            if path.exists() {
                match std::fs::read_to_string(&path) {
                    Ok(content) => match toml::from_str::<Config>(&content) {
                        Ok(config) => {
                            tracing::info!(
                                ?path,
                                programs = config.programs.len(),
                                remote = config.remote.enabled,
                                "loaded configuration"
                            );
                            return config;
                        }
                        Err(e) => {
                            tracing::warn!(?path, error = %e, "failed to parse config");
                        }
                    },
                    Err(e) => {
                        tracing::warn!(?path, error = %e, "failed to read config");
                    }
                }
            }
        }

        tracing::warn!("no readable configuration, using built-in program list");
        Self::fallback()
    }

    /// Built-in configuration used when no file is readable: a terminal to
    /// work with at startup and a way to leave.
    pub fn fallback() -> Self {
        Self {
            startup: vec!["/usr/bin/xterm".to_string()],
            programs: vec![
                ProgramEntry {
                    title: "xterm".to_string(),
                    command: Some("/usr/bin/xterm".to_string()),
                    key: Some('x'),
                },
                ProgramEntry {
                    title: "quit".to_string(),
                    command: None,
                    key: None,
                },
            ],
            ..Self::default()
        }
    }
}

/// Helper for getting XDG directories
mod dirs {
    use std::path::PathBuf;

    pub fn config_dir() -> Option<PathBuf> {
        std::env::var_os("XDG_CONFIG_HOME")
            .map(PathBuf::from)
            .or_else(|| std::env::var_os("HOME").map(|h| PathBuf::from(h).join(".config")))
    }
}
