//! Command vocabulary
//!
//! Every operation the manager performs is a `Command` with a stable integer
//! id and name. Keyboard chords, remote-control messages and overlay
//! selections all resolve into this one space. The id space is partitioned:
//! singletons, overlay toggles, in-overlay navigation, and a numbered
//! selection range whose parameter is recovered arithmetically.

use x11rb::protocol::xproto::Keysym;

use crate::keymap;

// Modifier bits as they appear in a key event state (X11 core values).
pub const MOD_SHIFT: u16 = 1 << 0;
pub const MOD_CONTROL: u16 = 1 << 2;
pub const MOD_ALT: u16 = 1 << 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Explicit no-op; unbound input also resolves here.
    Nop,
    NextPanel,
    PrevPanel,
    Quit,
    Restart,
    /// Force the active content back to full-screen geometry.
    Resize,
    /// Toggle off-screen override-window relocation.
    PositionFix,
    /// Dump registry, tracker and overlay state to the log.
    PrintState,
    PanelList,
    ProgramList,
    QuitDialog,
    Up,
    Down,
    Hide,
    Ok,
    /// Close the panel highlighted in the panel list.
    Close,
    /// Move the panel highlighted in the panel list to the end.
    ToEnd,
    /// Pick entry n (1-based) of the visible list overlay.
    Select(u16),
}

/// A fixed keyboard chord for a command.
///
/// `grabbed` chords are passively grabbed on the root at startup; the rest
/// only arrive while an overlay holds the keyboard grab.
pub struct Binding {
    pub command: Command,
    pub keysym: Keysym,
    pub modifiers: u16,
    pub grabbed: bool,
}

pub const BINDINGS: &[Binding] = &[
    Binding { command: Command::NextPanel, keysym: keymap::XK_RIGHT, modifiers: MOD_ALT, grabbed: true },
    Binding { command: Command::PrevPanel, keysym: keymap::XK_LEFT, modifiers: MOD_ALT, grabbed: true },
    Binding { command: Command::Quit, keysym: keymap::XK_TAB, modifiers: MOD_CONTROL | MOD_SHIFT, grabbed: true },
    Binding { command: Command::PanelList, keysym: keymap::XK_TAB, modifiers: MOD_ALT, grabbed: true },
    Binding { command: Command::ProgramList, keysym: keymap::XK_TAB, modifiers: MOD_CONTROL, grabbed: true },
    Binding { command: Command::Up, keysym: keymap::XK_UP, modifiers: 0, grabbed: false },
    Binding { command: Command::Down, keysym: keymap::XK_DOWN, modifiers: 0, grabbed: false },
    Binding { command: Command::Hide, keysym: keymap::XK_ESCAPE, modifiers: 0, grabbed: false },
    Binding { command: Command::Ok, keysym: keymap::XK_RETURN, modifiers: 0, grabbed: false },
    Binding { command: Command::Close, keysym: keymap::XK_C, modifiers: 0, grabbed: false },
    Binding { command: Command::ToEnd, keysym: keymap::XK_E, modifiers: 0, grabbed: false },
];

impl Command {
    /// First id of the numbered selection range; `Select(n)` has id base + n.
    pub const SELECT_BASE: u32 = 30;
    /// Largest accepted selection parameter.
    pub const SELECT_LIMIT: u16 = 99;

    pub fn id(self) -> u32 {
        match self {
            Command::Nop => 0,
            Command::NextPanel => 1,
            Command::PrevPanel => 2,
            Command::Quit => 3,
            Command::Restart => 4,
            Command::Resize => 5,
            Command::PositionFix => 6,
            Command::PrintState => 7,
            Command::PanelList => 10,
            Command::ProgramList => 11,
            Command::QuitDialog => 12,
            Command::Up => 20,
            Command::Down => 21,
            Command::Hide => 22,
            Command::Ok => 23,
            Command::Close => 24,
            Command::ToEnd => 25,
            Command::Select(n) => Self::SELECT_BASE + u32::from(n),
        }
    }

    pub fn from_id(id: u32) -> Option<Self> {
        let select_range = Self::SELECT_BASE + 1..=Self::SELECT_BASE + u32::from(Self::SELECT_LIMIT);
        match id {
            0 => Some(Command::Nop),
            1 => Some(Command::NextPanel),
            2 => Some(Command::PrevPanel),
            3 => Some(Command::Quit),
            4 => Some(Command::Restart),
            5 => Some(Command::Resize),
            6 => Some(Command::PositionFix),
            7 => Some(Command::PrintState),
            10 => Some(Command::PanelList),
            11 => Some(Command::ProgramList),
            12 => Some(Command::QuitDialog),
            20 => Some(Command::Up),
            21 => Some(Command::Down),
            22 => Some(Command::Hide),
            23 => Some(Command::Ok),
            24 => Some(Command::Close),
            25 => Some(Command::ToEnd),
            id if select_range.contains(&id) => Some(Command::Select((id - Self::SELECT_BASE) as u16)),
            _ => None,
        }
    }

    pub fn name(self) -> String {
        match self {
            Command::Nop => "NOP".into(),
            Command::NextPanel => "NEXTPANEL".into(),
            Command::PrevPanel => "PREVPANEL".into(),
            Command::Quit => "QUIT".into(),
            Command::Restart => "RESTART".into(),
            Command::Resize => "RESIZE".into(),
            Command::PositionFix => "POSITIONFIX".into(),
            Command::PrintState => "PRINTSTATE".into(),
            Command::PanelList => "PANELLIST".into(),
            Command::ProgramList => "PROGRAMLIST".into(),
            Command::QuitDialog => "QUITDIALOG".into(),
            Command::Up => "UP".into(),
            Command::Down => "DOWN".into(),
            Command::Hide => "HIDE".into(),
            Command::Ok => "OK".into(),
            Command::Close => "CLOSE".into(),
            Command::ToEnd => "TOEND".into(),
            Command::Select(n) => format!("SELECT{n}"),
        }
    }

    /// Name for a raw id; ids outside the vocabulary get an error marker.
    pub fn name_for(id: u32) -> String {
        match Self::from_id(id) {
            Some(cmd) => cmd.name(),
            None => format!("ERROR: no such command ({id})"),
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        if let Some(rest) = name.strip_prefix("SELECT") {
            let n: u16 = rest.parse().ok()?;
            return (1..=Self::SELECT_LIMIT).contains(&n).then_some(Command::Select(n));
        }
        match name {
            "NOP" => Some(Command::Nop),
            "NEXTPANEL" => Some(Command::NextPanel),
            "PREVPANEL" => Some(Command::PrevPanel),
            "QUIT" => Some(Command::Quit),
            "RESTART" => Some(Command::Restart),
            "RESIZE" => Some(Command::Resize),
            "POSITIONFIX" => Some(Command::PositionFix),
            "PRINTSTATE" => Some(Command::PrintState),
            "PANELLIST" => Some(Command::PanelList),
            "PROGRAMLIST" => Some(Command::ProgramList),
            "QUITDIALOG" => Some(Command::QuitDialog),
            "UP" => Some(Command::Up),
            "DOWN" => Some(Command::Down),
            "HIDE" => Some(Command::Hide),
            "OK" => Some(Command::Ok),
            "CLOSE" => Some(Command::Close),
            "TOEND" => Some(Command::ToEnd),
            _ => None,
        }
    }

    /// Resolve a key chord.
    ///
    /// Fixed bindings win; the shortcut table is consulted only when the
    /// caller supplies one (a list overlay with shortcut keys is visible).
    /// Entries with keysym 0 in the table are placeholders and never match.
    pub fn from_key(keysym: Keysym, modifiers: u16, shortcuts: Option<&[Keysym]>) -> Option<Self> {
        for binding in BINDINGS {
            if binding.keysym == keysym && binding.modifiers == modifiers {
                return Some(binding.command);
            }
        }
        let table = shortcuts?;
        if modifiers != 0 {
            return None;
        }
        table
            .iter()
            .position(|&k| k != 0 && k == keysym)
            .map(|i| Command::Select(i as u16 + 1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_round_trip() {
        let all = [
            Command::Nop,
            Command::NextPanel,
            Command::PrevPanel,
            Command::Quit,
            Command::Restart,
            Command::Resize,
            Command::PositionFix,
            Command::PrintState,
            Command::PanelList,
            Command::ProgramList,
            Command::QuitDialog,
            Command::Up,
            Command::Down,
            Command::Hide,
            Command::Ok,
            Command::Close,
            Command::ToEnd,
            Command::Select(1),
            Command::Select(42),
        ];
        for cmd in all {
            assert_eq!(Command::from_id(cmd.id()), Some(cmd));
            assert_eq!(Command::from_name(&cmd.name()), Some(cmd));
        }
    }

    #[test]
    fn select_parameter_is_arithmetic() {
        assert_eq!(Command::Select(7).id(), Command::SELECT_BASE + 7);
        assert_eq!(
            Command::from_id(Command::SELECT_BASE + 7),
            Some(Command::Select(7))
        );
    }

    #[test]
    fn select_base_itself_is_not_a_command() {
        assert_eq!(Command::from_id(Command::SELECT_BASE), None);
    }

    #[test]
    fn ids_past_the_select_range_are_unknown() {
        let past = Command::SELECT_BASE + u32::from(Command::SELECT_LIMIT) + 1;
        assert_eq!(Command::from_id(past), None);
        assert!(Command::name_for(past).starts_with("ERROR"));
    }

    #[test]
    fn unknown_name_is_not_found() {
        assert_eq!(Command::from_name("FULLSCREEN"), None);
        assert_eq!(Command::from_name("SELECT0"), None);
        assert_eq!(Command::from_name("SELECTx"), None);
    }

    #[test]
    fn chords_resolve_against_fixed_bindings() {
        assert_eq!(
            Command::from_key(keymap::XK_TAB, MOD_ALT, None),
            Some(Command::PanelList)
        );
        assert_eq!(
            Command::from_key(keymap::XK_TAB, MOD_CONTROL | MOD_SHIFT, None),
            Some(Command::Quit)
        );
        assert_eq!(Command::from_key(keymap::XK_TAB, 0, None), None);
    }

    #[test]
    fn shortcut_table_is_only_used_when_supplied() {
        let table = [0, keymap::XK_C, 0x78]; // entry 2 = 'c', entry 3 = 'x'
        assert_eq!(Command::from_key(0x78, 0, None), None);
        assert_eq!(
            Command::from_key(0x78, 0, Some(&table)),
            Some(Command::Select(3))
        );
        // Placeholder keysym 0 never matches.
        assert_eq!(Command::from_key(0, 0, Some(&table)), None);
    }

    #[test]
    fn fixed_bindings_shadow_shortcuts() {
        // 'c' is the close binding; a program shortcut on 'c' loses.
        let table = [keymap::XK_C];
        assert_eq!(
            Command::from_key(keymap::XK_C, 0, Some(&table)),
            Some(Command::Close)
        );
    }

    #[test]
    fn modified_chords_do_not_match_shortcuts() {
        let table = [0x78];
        assert_eq!(Command::from_key(0x78, MOD_CONTROL, Some(&table)), None);
    }
}
