//! Button-event parsing and translation
//!
//! An lircd-compatible daemon writes one line per button event:
//! `<code> <repeat> <button> <remote>`, with the repeat count in hex. The
//! mapping file translates button names into command names; the command
//! vocabulary does the rest.

use std::collections::HashMap;

use serde::Deserialize;
use solowm::commands::Command;

/// A decoded button event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ButtonEvent {
    pub button: String,
    /// 0 for the initial press, counting up while the button is held.
    pub repeat: u32,
}

/// Parse one daemon line. Short or malformed lines yield `None`.
pub fn parse_event(line: &str) -> Option<ButtonEvent> {
    let mut fields = line.split_whitespace();
    let _code = fields.next()?;
    let repeat = u32::from_str_radix(fields.next()?, 16).ok()?;
    let button = fields.next()?.to_string();
    Some(ButtonEvent { button, repeat })
}

/// Button-name to command-name translation table.
#[derive(Debug, Clone, Deserialize)]
pub struct RemoteMap {
    #[serde(default)]
    buttons: HashMap<String, String>,
}

impl RemoteMap {
    /// A usable table for common remote layouts, applied when no mapping
    /// file is readable.
    pub fn builtin() -> Self {
        let buttons = [
            ("KEY_RIGHT", "NEXTPANEL"),
            ("KEY_LEFT", "PREVPANEL"),
            ("KEY_UP", "UP"),
            ("KEY_DOWN", "DOWN"),
            ("KEY_OK", "OK"),
            ("KEY_ENTER", "OK"),
            ("KEY_MENU", "PANELLIST"),
            ("KEY_EPG", "PROGRAMLIST"),
            ("KEY_EXIT", "HIDE"),
            ("KEY_BACK", "HIDE"),
            ("KEY_POWER", "QUIT"),
        ]
        .into_iter()
        .map(|(button, command)| (button.to_string(), command.to_string()))
        .collect();
        Self { buttons }
    }

    /// Load a mapping file, falling back to the built-in table.
    pub fn load(path: Option<&str>) -> Self {
        let default_path = dirs_config().map(|p| p.join("solowm/remote.toml"));
        let candidate = match path {
            Some(p) => Some(std::path::PathBuf::from(p)),
            None => default_path,
        };

        if let Some(path) = candidate {
            if path.exists() {
                match std::fs::read_to_string(&path) {
                    Ok(content) => match toml::from_str::<RemoteMap>(&content) {
                        Ok(map) => {
                            tracing::info!(?path, buttons = map.buttons.len(), "loaded button mapping");
                            return map;
                        }
                        Err(e) => tracing::warn!(?path, error = %e, "failed to parse button mapping"),
                    },
                    Err(e) => tracing::warn!(?path, error = %e, "failed to read button mapping"),
                }
            }
        }

        tracing::info!("using built-in button mapping");
        Self::builtin()
    }

    /// Translate a button name into a command.
    pub fn command_for(&self, button: &str) -> Option<Command> {
        let name = self.buttons.get(button)?;
        match Command::from_name(name) {
            Some(command) => Some(command),
            None => {
                tracing::warn!(button, command = %name, "mapping names an unknown command");
                None
            }
        }
    }
}

fn dirs_config() -> Option<std::path::PathBuf> {
    std::env::var_os("XDG_CONFIG_HOME")
        .map(std::path::PathBuf::from)
        .or_else(|| std::env::var_os("HOME").map(|h| std::path::PathBuf::from(h).join(".config")))
}
