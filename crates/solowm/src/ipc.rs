//! Inter-process command channel
//!
//! One ClientMessage type delivered to the root window: `SOLOWM_COMMAND`,
//! format 32, with the command id in the first data slot. The remote bridge,
//! the pointer-gesture helper and plain scripts all compose the same
//! message; no other field is interpreted.

use thiserror::Error;
use x11rb::connection::Connection;
use x11rb::protocol::xproto::{Atom, ClientMessageEvent, ConnectionExt, EventMask, Window};

use crate::commands::Command;

/// Name of the interned message-type atom.
pub const COMMAND_ATOM: &str = "SOLOWM_COMMAND";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum MessageError {
    #[error("command message has format {0}, expected 32")]
    BadFormat(u8),
    #[error("unknown command id {0}")]
    UnknownCommand(u32),
}

/// Build the command message addressed to the root window.
pub fn encode(root: Window, command_atom: Atom, command: Command) -> ClientMessageEvent {
    ClientMessageEvent::new(32, root, command_atom, [command.id(), 0, 0, 0, 0])
}

/// Interpret a ClientMessage. `None` when it is not a command message at
/// all; `Some(Err(..))` when it is one but malformed.
pub fn decode(
    event: &ClientMessageEvent,
    command_atom: Atom,
) -> Option<Result<Command, MessageError>> {
    if event.type_ != command_atom {
        return None;
    }
    if event.format != 32 {
        return Some(Err(MessageError::BadFormat(event.format)));
    }
    let id = event.data.as_data32()[0];
    Some(Command::from_id(id).ok_or(MessageError::UnknownCommand(id)))
}

/// Send a command to a running manager on this display.
pub fn send<C: Connection>(
    conn: &C,
    root: Window,
    command_atom: Atom,
    command: Command,
) -> Result<(), x11rb::errors::ConnectionError> {
    // The manager selects SubstructureRedirect on the root, so this mask
    // routes the message to it.
    conn.send_event(
        false,
        root,
        EventMask::SUBSTRUCTURE_REDIRECT,
        encode(root, command_atom, command),
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const ATOM: Atom = 400;
    const ROOT: Window = 1;

    #[test]
    fn encode_decode_round_trip() {
        for command in [Command::NextPanel, Command::Quit, Command::Select(9)] {
            let event = encode(ROOT, ATOM, command);
            assert_eq!(decode(&event, ATOM), Some(Ok(command)));
        }
    }

    #[test]
    fn command_id_travels_in_the_first_slot() {
        let event = encode(ROOT, ATOM, Command::PanelList);
        assert_eq!(event.format, 32);
        assert_eq!(event.window, ROOT);
        assert_eq!(event.data.as_data32()[0], Command::PanelList.id());
    }

    #[test]
    fn foreign_message_types_are_ignored() {
        let event = encode(ROOT, ATOM, Command::Quit);
        assert_eq!(decode(&event, ATOM + 1), None);
    }

    #[test]
    fn wrong_format_is_rejected() {
        let mut event = encode(ROOT, ATOM, Command::Quit);
        event.format = 8;
        assert_eq!(decode(&event, ATOM), Some(Err(MessageError::BadFormat(8))));
    }

    #[test]
    fn unknown_ids_are_rejected() {
        let event = ClientMessageEvent::new(32, ROOT, ATOM, [9999, 0, 0, 0, 0]);
        assert_eq!(
            decode(&event, ATOM),
            Some(Err(MessageError::UnknownCommand(9999)))
        );
    }
}
