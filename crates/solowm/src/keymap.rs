//! Keycode/keysym translation, cached from the server's keyboard mapping.

use anyhow::Result;
use x11rb::connection::Connection;
use x11rb::protocol::xproto::{ConnectionExt, Keycode, Keysym};

// The keysyms the fixed bindings use (X11/keysymdef.h values).
pub const XK_TAB: Keysym = 0xff09;
pub const XK_RETURN: Keysym = 0xff0d;
pub const XK_ESCAPE: Keysym = 0xff1b;
pub const XK_LEFT: Keysym = 0xff51;
pub const XK_UP: Keysym = 0xff52;
pub const XK_RIGHT: Keysym = 0xff53;
pub const XK_DOWN: Keysym = 0xff54;
pub const XK_C: Keysym = 0x0063;
pub const XK_E: Keysym = 0x0065;

/// Keysym for a single-character overlay shortcut, if it is expressible
/// in the Latin-1 keysym range.
pub fn keysym_for_char(c: char) -> Option<Keysym> {
    let code = c as u32;
    (0x20..=0xff).contains(&code).then_some(code)
}

/// Snapshot of the server's keycode-to-keysym mapping.
///
/// Rebuilt on `MappingNotify` so chord lookup stays correct after the user
/// changes their keyboard layout.
pub struct Keymap {
    min_keycode: Keycode,
    keysyms_per_keycode: usize,
    keysyms: Vec<Keysym>,
}

impl Keymap {
    pub fn new<C: Connection>(conn: &C) -> Result<Self> {
        let setup = conn.setup();
        let min = setup.min_keycode;
        let max = setup.max_keycode;
        let reply = conn.get_keyboard_mapping(min, max - min + 1)?.reply()?;
        Ok(Self {
            min_keycode: min,
            keysyms_per_keycode: reply.keysyms_per_keycode as usize,
            keysyms: reply.keysyms,
        })
    }

    pub fn refresh<C: Connection>(&mut self, conn: &C) -> Result<()> {
        *self = Self::new(conn)?;
        Ok(())
    }

    /// First (unshifted) keysym for a keycode, 0 if unmapped.
    pub fn keysym_for(&self, keycode: Keycode) -> Keysym {
        let index = (keycode.saturating_sub(self.min_keycode)) as usize * self.keysyms_per_keycode;
        self.keysyms.get(index).copied().unwrap_or(0)
    }

    /// Keycode producing the given keysym in any column, if one exists.
    pub fn keycode_for(&self, keysym: Keysym) -> Option<Keycode> {
        self.keysyms
            .chunks(self.keysyms_per_keycode)
            .position(|chunk| chunk.contains(&keysym))
            .map(|i| self.min_keycode + i as Keycode)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keymap(min: Keycode, per: usize, keysyms: Vec<Keysym>) -> Keymap {
        Keymap { min_keycode: min, keysyms_per_keycode: per, keysyms }
    }

    #[test]
    fn keysym_lookup_uses_first_column() {
        let km = keymap(8, 2, vec![XK_TAB, 0, XK_RETURN, 0xfe20]);
        assert_eq!(km.keysym_for(8), XK_TAB);
        assert_eq!(km.keysym_for(9), XK_RETURN);
    }

    #[test]
    fn unmapped_keycode_yields_zero() {
        let km = keymap(8, 1, vec![XK_TAB]);
        assert_eq!(km.keysym_for(200), 0);
    }

    #[test]
    fn keycode_lookup_searches_all_columns() {
        let km = keymap(8, 2, vec![0, XK_ESCAPE, XK_C, 0]);
        assert_eq!(km.keycode_for(XK_ESCAPE), Some(8));
        assert_eq!(km.keycode_for(XK_C), Some(9));
        assert_eq!(km.keycode_for(XK_UP), None);
    }

    #[test]
    fn char_shortcuts_map_to_latin1() {
        assert_eq!(keysym_for_char('c'), Some(XK_C));
        assert_eq!(keysym_for_char('1'), Some(0x31));
        assert_eq!(keysym_for_char('\u{1F600}'), None);
    }
}
