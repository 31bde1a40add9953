//! Command dispatch engine
//!
//! The blocking event loop. Each X event or client message derives at most
//! one command; commands then drain through a one-slot pending register,
//! because overlay toggles and program-list meta entries synthesize
//! follow-up commands that must resolve before the loop waits again. All
//! protocol side effects go through the panel registry, the override
//! tracker and the draw helpers.

use anyhow::{bail, Context as _, Result};
use rand::rngs::SmallRng;
use rand::SeedableRng;
use x11rb::connection::Connection;
use x11rb::protocol::xproto::{
    AtomEnum, ChangeWindowAttributesAux, ClientMessageEvent, ConfigureRequestEvent,
    ConfigureWindowAux, ConnectionExt, CreateWindowAux, EventMask, GrabMode, KeyPressEvent,
    Keysym, MapState, Mapping, ModMask, PropMode, StackMode, Window, WindowClass,
    CHANGE_PROPERTY_REQUEST, CONFIGURE_WINDOW_REQUEST, DELETE_PROPERTY_REQUEST,
    DESTROY_WINDOW_REQUEST, GET_GEOMETRY_REQUEST, GET_PROPERTY_REQUEST,
    GET_WINDOW_ATTRIBUTES_REQUEST, KILL_CLIENT_REQUEST, MAP_WINDOW_REQUEST,
    REPARENT_WINDOW_REQUEST, SEND_EVENT_REQUEST, SET_INPUT_FOCUS_REQUEST, UNMAP_WINDOW_REQUEST,
};
use x11rb::protocol::{ErrorKind, Event};
use x11rb::rust_connection::RustConnection;
use x11rb::wrapper::ConnectionExt as _;
use x11rb::x11_utils::X11Error;
use x11rb::{COPY_DEPTH_FROM_PARENT, CURRENT_TIME};

use crate::atoms::Atoms;
use crate::commands::Command;
use crate::config::Config;
use crate::draw::{self, ListWindow, Painter};
use crate::ipc;
use crate::keymap::{self, Keymap};
use crate::overlay::{OverlayKind, OverlayUi};
use crate::overrides::OverrideTracker;
use crate::panels::{self, Geometry, PanelRegistry, Removal};
use crate::spawn;

/// Request kinds tolerated against a window whose destruction has not yet
/// been reported. Anything else failing with a window error is a logic
/// error in the manager itself.
const STALE_WINDOW_REQUESTS: &[u8] = &[
    MAP_WINDOW_REQUEST,
    UNMAP_WINDOW_REQUEST,
    CONFIGURE_WINDOW_REQUEST,
    REPARENT_WINDOW_REQUEST,
    DESTROY_WINDOW_REQUEST,
    CHANGE_PROPERTY_REQUEST,
    DELETE_PROPERTY_REQUEST,
    GET_PROPERTY_REQUEST,
    GET_WINDOW_ATTRIBUTES_REQUEST,
    GET_GEOMETRY_REQUEST,
    SET_INPUT_FOCUS_REQUEST,
    SEND_EVENT_REQUEST,
    KILL_CLIENT_REQUEST,
];

const CONFIRM_CHOICES: [&str; 2] = ["yes", "no"];

/// Engine actions reachable from the program list by exact title.
pub fn meta_command(title: &str) -> Option<Command> {
    match title {
        "quit" => Some(Command::Quit),
        "resize" => Some(Command::Resize),
        "restart" => Some(Command::Restart),
        "print state" => Some(Command::PrintState),
        "position fix" => Some(Command::PositionFix),
        _ => None,
    }
}

/// How the run loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Exit {
    Quit,
    /// Re-exec the manager in place after teardown.
    Restart,
}

pub struct Wm {
    conn: RustConnection,
    screen_num: usize,
    root: Window,
    root_geom: Geometry,
    atoms: Atoms,
    keymap: Keymap,
    config: Config,
    registry: PanelRegistry,
    overrides: OverrideTracker,
    overlay: OverlayUi,
    painter: Painter,
    panel_list: ListWindow,
    program_list: ListWindow,
    confirm: ListWindow,
    check_window: Window,
    rng: SmallRng,
    position_fix: bool,
    running: bool,
    restart: bool,
}

impl Wm {
    /// Connect, acquire the redirect on the root and create the manager's
    /// own windows. Fails early when another manager is running.
    pub fn new(config: Config) -> Result<Self> {
        let (conn, screen_num) =
            RustConnection::connect(None).context("cannot open display")?;
        let screen = &conn.setup().roots[screen_num];
        let root = screen.root;
        let root_geom = Geometry {
            x: 0,
            y: 0,
            width: screen.width_in_pixels,
            height: screen.height_in_pixels,
        };
        tracing::info!(
            root,
            width = root_geom.width,
            height = root_geom.height,
            "connected to display"
        );

        let atoms = Atoms::new(&conn)?.reply()?;

        // SubstructureRedirect is what makes this process the manager.
        let redirect = conn.change_window_attributes(
            root,
            &ChangeWindowAttributesAux::new().event_mask(
                EventMask::SUBSTRUCTURE_REDIRECT
                    | EventMask::SUBSTRUCTURE_NOTIFY
                    | EventMask::KEY_PRESS,
            ),
        )?;
        if let Err(e) = redirect.check() {
            bail!("another window manager is already running: {e}");
        }

        let keymap = Keymap::new(&conn)?;
        let painter = Painter::new(&conn, screen, &config.font)?;

        let list_width = root_geom.width / 4;
        let list_height = painter.list_height();
        let list_y = (root_geom.height / 2).saturating_sub(list_height / 2) as i16;
        let panel_list = draw::create_list_window(
            &conn,
            screen,
            (root_geom.width / 2) as i16,
            list_y,
            list_width,
            list_height,
            "solowm panel list",
        )?;
        let program_list = draw::create_list_window(
            &conn,
            screen,
            (root_geom.width / 4) as i16,
            list_y,
            list_width,
            list_height,
            "solowm program list",
        )?;
        let confirm = draw::create_list_window(
            &conn,
            screen,
            (u32::from(root_geom.width) * 3 / 8) as i16,
            list_y,
            list_width,
            list_height,
            "solowm confirm quit",
        )?;

        let check_window = conn.generate_id()?;
        conn.create_window(
            COPY_DEPTH_FROM_PARENT,
            check_window,
            root,
            -1,
            -1,
            1,
            1,
            0,
            WindowClass::INPUT_ONLY,
            0,
            &CreateWindowAux::new(),
        )?;

        Ok(Self {
            screen_num,
            root,
            root_geom,
            atoms,
            keymap,
            registry: PanelRegistry::new(config.leave_mode),
            overrides: OverrideTracker::new(),
            overlay: OverlayUi::new(config.single_key),
            painter,
            panel_list,
            program_list,
            confirm,
            check_window,
            rng: SmallRng::from_entropy(),
            position_fix: config.position_fix,
            running: true,
            restart: false,
            config,
            conn,
        })
    }

    /// Set up, run the blocking event loop, tear down.
    pub fn run(&mut self) -> Result<Exit> {
        spawn::install_sigchld_reaper().context("cannot install SIGCHLD handler")?;
        self.publish_hints()?;
        self.grab_keys()?;

        for command in self.config.startup.clone() {
            spawn::launch(&command);
        }
        if self.config.remote.enabled {
            spawn::spawn_bridge(&self.config.remote.socket, &self.config.remote.mapping);
        }

        self.scan_existing_windows()?;
        self.conn.flush()?;
        tracing::info!("entering event loop");

        while self.running {
            let event = self.conn.wait_for_event()?;
            let command = self.handle_event(event)?;
            self.drain(command)?;
            self.conn.flush()?;
        }

        self.teardown()?;
        Ok(if self.restart { Exit::Restart } else { Exit::Quit })
    }

    // --- startup ---

    fn publish_hints(&self) -> Result<()> {
        let supported = [
            self.atoms._NET_SUPPORTED,
            self.atoms._NET_CLIENT_LIST,
            self.atoms._NET_ACTIVE_WINDOW,
            self.atoms._NET_SUPPORTING_WM_CHECK,
            self.atoms._NET_WM_NAME,
        ];
        self.conn.change_property32(
            PropMode::REPLACE,
            self.root,
            self.atoms._NET_SUPPORTED,
            AtomEnum::ATOM,
            &supported,
        )?;
        for window in [self.root, self.check_window] {
            self.conn.change_property32(
                PropMode::REPLACE,
                window,
                self.atoms._NET_SUPPORTING_WM_CHECK,
                AtomEnum::WINDOW,
                &[self.check_window],
            )?;
        }
        self.conn.change_property8(
            PropMode::REPLACE,
            self.check_window,
            self.atoms._NET_WM_NAME,
            self.atoms.UTF8_STRING,
            b"solowm",
        )?;
        self.publish_client_list()?;
        self.publish_active()?;
        Ok(())
    }

    /// Passively grab the fixed chords, with and without NumLock/CapsLock.
    fn grab_keys(&self) -> Result<()> {
        let numlock = u16::from(ModMask::M2);
        let capslock = u16::from(ModMask::LOCK);

        for binding in crate::commands::BINDINGS.iter().filter(|b| b.grabbed) {
            let Some(keycode) = self.keymap.keycode_for(binding.keysym) else {
                tracing::warn!(
                    command = %binding.command.name(),
                    keysym = binding.keysym,
                    "no keycode for chord, not grabbing"
                );
                continue;
            };
            for extra in [0, capslock, numlock, capslock | numlock] {
                self.conn.grab_key(
                    false,
                    self.root,
                    ModMask::from(binding.modifiers | extra),
                    keycode,
                    GrabMode::ASYNC,
                    GrabMode::ASYNC,
                )?;
            }
            tracing::debug!(command = %binding.command.name(), keycode, "grabbed chord");
        }
        Ok(())
    }

    /// Manage windows that were mapped before the manager started.
    fn scan_existing_windows(&mut self) -> Result<()> {
        let tree = self.conn.query_tree(self.root)?.reply()?;
        let own = [
            self.panel_list.window,
            self.program_list.window,
            self.confirm.window,
            self.check_window,
        ];
        for window in tree.children {
            if own.contains(&window) {
                continue;
            }
            let Ok(attrs) = self.conn.get_window_attributes(window)?.reply() else {
                continue;
            };
            if attrs.override_redirect || attrs.map_state != MapState::VIEWABLE {
                continue;
            }
            tracing::info!(window, "managing existing window");
            self.manage_window(window)?;
        }
        Ok(())
    }

    // --- event intake ---

    fn handle_event(&mut self, event: Event) -> Result<Option<Command>> {
        match event {
            Event::MapRequest(e) => {
                tracing::debug!(window = e.window, parent = e.parent, "MapRequest");
                self.manage_window(e.window)?;
                Ok(None)
            }
            Event::ConfigureRequest(e) => {
                self.handle_configure_request(e)?;
                Ok(None)
            }
            Event::DestroyNotify(e) => {
                tracing::debug!(window = e.window, event = e.event, "DestroyNotify");
                self.handle_destroyed(e.window)?;
                Ok(None)
            }
            Event::UnmapNotify(e) => {
                if self.overrides.remove(e.window) {
                    tracing::debug!(window = e.window, "override window unmapped");
                }
                Ok(None)
            }
            Event::MapNotify(e) => {
                if e.override_redirect {
                    self.track_override(e.window)?;
                }
                Ok(None)
            }
            Event::CreateNotify(e) => {
                tracing::trace!(
                    window = e.window,
                    parent = e.parent,
                    override_redirect = e.override_redirect,
                    "CreateNotify"
                );
                Ok(None)
            }
            Event::ReparentNotify(e) => {
                tracing::trace!(window = e.window, parent = e.parent, "ReparentNotify");
                Ok(None)
            }
            Event::ClientMessage(e) => self.handle_client_message(e),
            Event::KeyPress(e) => Ok(self.handle_key_press(e)),
            Event::Expose(e) => {
                if e.count == 0 {
                    self.redraw_window(e.window)?;
                }
                Ok(None)
            }
            Event::MappingNotify(e) => {
                if e.request == Mapping::KEYBOARD {
                    tracing::debug!("keyboard mapping changed");
                    self.keymap.refresh(&self.conn)?;
                }
                Ok(None)
            }
            Event::Error(e) => self.handle_x_error(e),
            _ => Ok(None),
        }
    }

    /// Stale-reference errors are expected when a client destroys windows
    /// we are still operating on; everything else means a bug here.
    fn handle_x_error(&self, error: X11Error) -> Result<Option<Command>> {
        if matches!(error.error_kind, ErrorKind::Window)
            && STALE_WINDOW_REQUESTS.contains(&error.major_opcode)
        {
            tracing::warn!(
                request = ?error.request_name,
                window = error.bad_value,
                "request against a vanished window ignored"
            );
            return Ok(None);
        }
        bail!(
            "fatal X error {:?} in request {:?} (bad value {:#x})",
            error.error_kind,
            error.request_name,
            error.bad_value
        );
    }

    fn handle_configure_request(&mut self, event: ConfigureRequestEvent) -> Result<()> {
        tracing::debug!(
            window = event.window,
            x = event.x,
            y = event.y,
            width = event.width,
            height = event.height,
            "ConfigureRequest"
        );
        if let Some(index) = self.registry.find(event.window) {
            // Managed clients do not get to shrink themselves.
            self.registry.resize_content(&self.conn, index, self.root_geom)?;
            return Ok(());
        }
        let aux = ConfigureWindowAux::from_configure_request(&event)
            .stack_mode(None)
            .sibling(None);
        self.conn.configure_window(event.window, &aux)?;
        Ok(())
    }

    fn handle_destroyed(&mut self, window: Window) -> Result<()> {
        if self.overrides.remove(window) {
            tracing::debug!(window, "override window destroyed");
        }
        let Some(index) = self.registry.find_content(window) else {
            return Ok(());
        };
        let removal = self.registry.destroy(&self.conn, self.root, index, true)?;
        self.after_structural_change(removal)
    }

    fn handle_client_message(&mut self, event: ClientMessageEvent) -> Result<Option<Command>> {
        match ipc::decode(&event, self.atoms.SOLOWM_COMMAND) {
            Some(Ok(command)) => {
                tracing::info!(command = %command.name(), "command message");
                return Ok(Some(command));
            }
            Some(Err(error)) => {
                tracing::warn!(%error, "bad command message");
                return Ok(None);
            }
            None => {}
        }

        if event.type_ == self.atoms.WM_CHANGE_STATE
            && event.format == 32
            && event.data.as_data32()[0] == panels::WM_STATE_ICONIC
        {
            if let Some(index) = self.registry.find_content(event.window) {
                tracing::info!(window = event.window, index, "client asked to be iconified");
                let removal = self.registry.withdraw_panel(&self.conn, &self.atoms, index)?;
                self.after_structural_change(removal)?;
            }
            return Ok(None);
        }

        // Purely diagnostic; the client may send any atom, so a failing
        // name lookup is ignored.
        let type_name = self
            .conn
            .get_atom_name(event.type_)
            .ok()
            .and_then(|cookie| cookie.reply().ok())
            .map(|reply| String::from_utf8_lossy(&reply.name).into_owned());
        tracing::debug!(
            window = event.window,
            message_type = ?type_name,
            format = event.format,
            "unhandled client message"
        );
        Ok(None)
    }

    fn handle_key_press(&mut self, event: KeyPressEvent) -> Option<Command> {
        let keysym = self.keymap.keysym_for(event.detail);
        let state = u16::from(event.state) & !(u16::from(ModMask::M2) | u16::from(ModMask::LOCK));

        // Program shortcuts only apply while the program list is visible;
        // entries without a shortcut hold a placeholder to keep positions.
        let shortcuts: Option<Vec<Keysym>> = self
            .overlay
            .is_active(OverlayKind::ProgramList)
            .then(|| {
                self.config
                    .programs
                    .iter()
                    .map(|p| p.key.and_then(keymap::keysym_for_char).unwrap_or(0))
                    .collect()
            });

        let command = Command::from_key(keysym, state, shortcuts.as_deref());
        tracing::debug!(keycode = event.detail, keysym, state, command = ?command.map(Command::name), "KeyPress");
        command
    }

    // --- command resolution ---

    /// Drain a command through the pending register until it settles.
    fn drain(&mut self, command: Option<Command>) -> Result<()> {
        let mut pending = command;
        while let Some(command) = pending.take() {
            pending = self.apply(command)?;
        }
        Ok(())
    }

    /// Execute one command; the return value is re-dispatched.
    fn apply(&mut self, command: Command) -> Result<Option<Command>> {
        let command = self.overlay.rewrite(command);
        tracing::debug!(command = %command.name(), "dispatch");
        match command {
            Command::Nop => Ok(None),
            Command::NextPanel | Command::PrevPanel => {
                let dir = if command == Command::PrevPanel { -1 } else { 1 };
                if self.registry.switch(&self.conn, &self.atoms, &self.overrides, dir)? {
                    self.publish_active()?;
                    self.raise_lists()?;
                }
                Ok(None)
            }
            Command::Quit => {
                if self.config.confirm_quit && !self.registry.is_empty() {
                    Ok(Some(Command::QuitDialog))
                } else {
                    tracing::info!("quit");
                    self.running = false;
                    Ok(None)
                }
            }
            Command::Restart => {
                tracing::info!("restart requested");
                self.running = false;
                self.restart = true;
                Ok(None)
            }
            Command::Resize => {
                if let Some(index) = self.registry.active() {
                    self.registry.resize_content(&self.conn, index, self.root_geom)?;
                }
                Ok(None)
            }
            Command::PositionFix => {
                self.position_fix = !self.position_fix;
                tracing::info!(enabled = self.position_fix, "override position fixing toggled");
                Ok(None)
            }
            Command::PrintState => {
                self.log_state();
                Ok(None)
            }
            Command::PanelList => {
                self.show_overlay(OverlayKind::PanelList)?;
                Ok(None)
            }
            Command::ProgramList => {
                self.show_overlay(OverlayKind::ProgramList)?;
                Ok(None)
            }
            Command::QuitDialog => {
                self.show_overlay(OverlayKind::ConfirmQuit)?;
                Ok(None)
            }
            Command::Up | Command::Down => {
                if let Some(kind) = self.overlay.active() {
                    let delta = if command == Command::Up { -1 } else { 1 };
                    let count = self.count_for(kind);
                    self.overlay.navigate(delta, count);
                    self.conn.clear_area(true, self.window_for(kind), 0, 0, 0, 0)?;
                }
                Ok(None)
            }
            Command::Hide => {
                self.hide_overlay()?;
                Ok(None)
            }
            Command::Ok => self.confirm_selection(),
            Command::Close => {
                if self.overlay.is_active(OverlayKind::PanelList) {
                    if let Some(panel) = self.registry.get(self.overlay.cursor()) {
                        let content = panel.content;
                        tracing::info!(content, "closing highlighted panel");
                        self.close_window(content)?;
                    }
                }
                Ok(None)
            }
            Command::ToEnd => {
                if self.overlay.is_active(OverlayKind::PanelList) && !self.registry.is_empty() {
                    let cursor = self.overlay.cursor().min(self.registry.len() - 1);
                    self.registry.move_to_end(cursor);
                    self.overlay.jump(self.registry.len(), self.registry.len());
                    // The advertised order is the insertion order.
                    self.publish_client_list()?;
                    self.conn.clear_area(true, self.panel_list.window, 0, 0, 0, 0)?;
                }
                Ok(None)
            }
            Command::Select(n) => {
                if let Some(kind) = self.overlay.active() {
                    let count = self.count_for(kind);
                    if self.overlay.jump(n as usize, count) {
                        return Ok(Some(Command::Ok));
                    }
                }
                Ok(None)
            }
        }
    }

    /// Act on the highlighted entry of the visible overlay.
    fn confirm_selection(&mut self) -> Result<Option<Command>> {
        let Some(kind) = self.overlay.active() else {
            return Ok(None);
        };
        let cursor = self.overlay.cursor();
        self.hide_overlay()?;
        match kind {
            OverlayKind::PanelList => {
                if cursor < self.registry.len() {
                    self.registry.activate(&self.conn, &self.atoms, &self.overrides, cursor)?;
                    self.publish_active()?;
                    self.raise_lists()?;
                }
                Ok(None)
            }
            OverlayKind::ProgramList => {
                let Some(entry) = self.config.programs.get(cursor) else {
                    return Ok(None);
                };
                match &entry.command {
                    Some(command) => {
                        spawn::launch(command);
                        Ok(None)
                    }
                    None => match meta_command(&entry.title) {
                        Some(follow_up) => Ok(Some(follow_up)),
                        None => {
                            tracing::warn!(title = %entry.title, "list entry is neither a program nor an engine action");
                            Ok(None)
                        }
                    },
                }
            }
            OverlayKind::ConfirmQuit => {
                if cursor == 0 {
                    tracing::info!("quit confirmed");
                    self.running = false;
                }
                Ok(None)
            }
        }
    }

    // --- panels ---

    fn manage_window(&mut self, window: Window) -> Result<()> {
        let leader = self.transient_leader(window);
        let title = panels::fetch_title(&self.conn, &self.atoms, window);
        let screen = &self.conn.setup().roots[self.screen_num];
        let Some(index) =
            self.registry
                .add(&self.conn, screen, window, self.root_geom, leader, title)?
        else {
            return Ok(());
        };

        self.registry.resize_content(&self.conn, index, self.root_geom)?;
        // A newly mapped window becomes the active panel.
        self.registry.activate(&self.conn, &self.atoms, &self.overrides, index)?;

        self.publish_client_list()?;
        self.publish_active()?;
        self.raise_lists()?;
        Ok(())
    }

    fn after_structural_change(&mut self, removal: Removal) -> Result<()> {
        match removal {
            Removal::Activated(index) => {
                tracing::info!(index, "selection moved");
                self.registry.enter(&self.conn, &self.atoms, &self.overrides)?;
            }
            Removal::NoneActive => {
                if self.registry.is_empty() && self.config.quit_on_last_close {
                    tracing::info!("last panel closed, quitting");
                    self.running = false;
                } else {
                    self.conn
                        .set_input_focus(x11rb::protocol::xproto::InputFocus::PARENT, self.root, CURRENT_TIME)?;
                }
            }
            Removal::Kept | Removal::OutOfRange => {}
        }
        self.publish_client_list()?;
        self.publish_active()?;
        self.raise_lists()?;
        Ok(())
    }

    fn transient_leader(&self, window: Window) -> Option<Window> {
        self.conn
            .get_property(false, window, AtomEnum::WM_TRANSIENT_FOR, AtomEnum::WINDOW, 0, 1)
            .ok()
            .and_then(|cookie| cookie.reply().ok())
            .and_then(|reply| reply.value32().and_then(|mut values| values.next()))
            .filter(|&leader| leader != 0)
    }

    /// Close a content window, politely if it supports `WM_DELETE_WINDOW`.
    fn close_window(&self, window: Window) -> Result<()> {
        let deletable = self
            .conn
            .get_property(false, window, self.atoms.WM_PROTOCOLS, AtomEnum::ATOM, 0, 32)
            .ok()
            .and_then(|cookie| cookie.reply().ok())
            .and_then(|reply| reply.value32().map(|mut v| v.any(|a| a == self.atoms.WM_DELETE_WINDOW)))
            .unwrap_or(false);

        if deletable {
            let message = ClientMessageEvent::new(
                32,
                window,
                self.atoms.WM_PROTOCOLS,
                [self.atoms.WM_DELETE_WINDOW, 0, 0, 0, 0],
            );
            self.conn.send_event(false, window, EventMask::NO_EVENT, message)?;
        } else {
            self.conn.kill_client(window)?;
        }
        Ok(())
    }

    // --- overrides ---

    fn track_override(&mut self, window: Window) -> Result<()> {
        let on_top = self.window_is_on_top(window);
        if self.overrides.add(window, on_top) {
            tracing::debug!(window, on_top, "tracking override window");
            if self.position_fix {
                self.overrides
                    .relocate_if_offscreen(&self.conn, window, self.root_geom, &mut self.rng)?;
            }
        }
        Ok(())
    }

    fn window_is_on_top(&self, window: Window) -> bool {
        self.conn
            .get_property(false, window, self.atoms._NET_WM_STATE, AtomEnum::ATOM, 0, 32)
            .ok()
            .and_then(|cookie| cookie.reply().ok())
            .and_then(|reply| {
                reply
                    .value32()
                    .map(|mut v| v.any(|a| a == self.atoms._NET_WM_STATE_ABOVE))
            })
            .unwrap_or(false)
    }

    // --- overlays ---

    fn window_for(&self, kind: OverlayKind) -> Window {
        match kind {
            OverlayKind::PanelList => self.panel_list.window,
            OverlayKind::ProgramList => self.program_list.window,
            OverlayKind::ConfirmQuit => self.confirm.window,
        }
    }

    fn count_for(&self, kind: OverlayKind) -> usize {
        match kind {
            OverlayKind::PanelList => self.registry.len(),
            OverlayKind::ProgramList => self.config.programs.len(),
            OverlayKind::ConfirmQuit => CONFIRM_CHOICES.len(),
        }
    }

    /// Show an overlay, hiding whichever was visible. The keyboard is
    /// exclusively grabbed while any overlay is up.
    fn show_overlay(&mut self, kind: OverlayKind) -> Result<()> {
        let initial = match kind {
            OverlayKind::PanelList => Some(self.registry.active().unwrap_or(0)),
            OverlayKind::ProgramList => None,
            OverlayKind::ConfirmQuit => Some(0),
        };
        let previous = self.overlay.show(kind, initial);

        match previous {
            Some(prev) if prev != kind => {
                self.conn.unmap_window(self.window_for(prev))?;
            }
            Some(_) => {}
            None => {
                let _ = self.conn.grab_keyboard(
                    false,
                    self.root,
                    CURRENT_TIME,
                    GrabMode::ASYNC,
                    GrabMode::ASYNC,
                )?;
            }
        }

        let window = self.window_for(kind);
        if previous == Some(kind) {
            self.conn.clear_area(true, window, 0, 0, 0, 0)?;
        } else {
            self.conn.map_window(window)?;
            self.conn
                .configure_window(window, &ConfigureWindowAux::new().stack_mode(StackMode::ABOVE))?;
        }
        Ok(())
    }

    fn hide_overlay(&mut self) -> Result<()> {
        if let Some(kind) = self.overlay.hide() {
            self.conn.unmap_window(self.window_for(kind))?;
            self.conn.ungrab_keyboard(CURRENT_TIME)?;
        }
        Ok(())
    }

    /// Keep the overlay windows above freshly raised panels, and redraw the
    /// visible one since the world changed under it.
    fn raise_lists(&mut self) -> Result<()> {
        for window in [self.panel_list.window, self.program_list.window, self.confirm.window] {
            self.conn
                .configure_window(window, &ConfigureWindowAux::new().stack_mode(StackMode::ABOVE))?;
        }
        if let Some(kind) = self.overlay.active() {
            self.overlay.clamp(self.count_for(kind));
            self.conn.clear_area(true, self.window_for(kind), 0, 0, 0, 0)?;
        }
        Ok(())
    }

    fn redraw_window(&mut self, window: Window) -> Result<()> {
        if window == self.panel_list.window {
            self.registry.refresh_titles(&self.conn, &self.atoms);
            let elements: Vec<String> = self
                .registry
                .panels()
                .iter()
                .enumerate()
                .map(|(i, p)| {
                    let marker = if p.withdrawn { "*" } else { "-" };
                    format!(" {i:2} {marker} {} ", p.title)
                })
                .collect();
            let selected = self.overlay.is_active(OverlayKind::PanelList).then(|| self.overlay.cursor()).unwrap_or(0);
            self.painter.draw_list(
                &self.conn,
                &self.panel_list,
                "solowm: open windows",
                &elements,
                selected,
                &["enter: switch", "escape: cancel", "c: close  e: to end"],
            )?;
        } else if window == self.program_list.window {
            let elements: Vec<String> = self
                .config
                .programs
                .iter()
                .map(|entry| match entry.key {
                    Some(key) => format!(" {key}  {} ", entry.title),
                    None => format!("    {} ", entry.title),
                })
                .collect();
            let selected = self.overlay.is_active(OverlayKind::ProgramList).then(|| self.overlay.cursor()).unwrap_or(0);
            self.painter.draw_list(
                &self.conn,
                &self.program_list,
                "solowm: programs",
                &elements,
                selected,
                &["enter: run", "escape: cancel"],
            )?;
        } else if window == self.confirm.window {
            let elements: Vec<String> = CONFIRM_CHOICES.iter().map(|s| format!(" {s} ")).collect();
            let selected = self.overlay.is_active(OverlayKind::ConfirmQuit).then(|| self.overlay.cursor()).unwrap_or(0);
            self.painter.draw_list(
                &self.conn,
                &self.confirm,
                "solowm: really quit?",
                &elements,
                selected,
                &["enter: confirm", "escape: cancel"],
            )?;
        }
        Ok(())
    }

    // --- published state ---

    fn publish_client_list(&self) -> Result<()> {
        let clients: Vec<Window> = self.registry.panels().iter().map(|p| p.content).collect();
        self.conn.change_property32(
            PropMode::REPLACE,
            self.root,
            self.atoms._NET_CLIENT_LIST,
            AtomEnum::WINDOW,
            &clients,
        )?;
        Ok(())
    }

    fn publish_active(&self) -> Result<()> {
        let active = self
            .registry
            .active()
            .map(|i| self.registry.panels()[i].content)
            .unwrap_or(x11rb::NONE);
        self.conn.change_property32(
            PropMode::REPLACE,
            self.root,
            self.atoms._NET_ACTIVE_WINDOW,
            AtomEnum::WINDOW,
            &[active],
        )?;
        Ok(())
    }

    fn log_state(&self) {
        tracing::info!(
            panels = self.registry.len(),
            active = ?self.registry.active(),
            overrides = self.overrides.len(),
            overlay = ?self.overlay.active(),
            position_fix = self.position_fix,
            "manager state"
        );
        for (i, panel) in self.registry.panels().iter().enumerate() {
            tracing::info!(
                index = i,
                wrapper = panel.wrapper,
                content = panel.content,
                withdrawn = panel.withdrawn,
                leader = ?panel.leader,
                title = %panel.title,
                "panel"
            );
        }
    }

    // --- teardown ---

    /// Stop the bridge and close every client window gracefully; no managed
    /// window is left unreachable behind a dead manager.
    fn teardown(&mut self) -> Result<()> {
        spawn::stop_bridge();
        let contents: Vec<Window> = self.registry.panels().iter().map(|p| p.content).collect();
        for content in contents {
            self.close_window(content)?;
        }
        self.conn.flush()?;
        tracing::info!("window manager ended");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn meta_entries_resolve_by_exact_title() {
        assert_eq!(meta_command("quit"), Some(Command::Quit));
        assert_eq!(meta_command("resize"), Some(Command::Resize));
        assert_eq!(meta_command("restart"), Some(Command::Restart));
        assert_eq!(meta_command("print state"), Some(Command::PrintState));
        assert_eq!(meta_command("position fix"), Some(Command::PositionFix));
    }

    #[test]
    fn meta_lookup_is_not_fuzzy() {
        assert_eq!(meta_command("Quit"), None);
        assert_eq!(meta_command("quit "), None);
        assert_eq!(meta_command("xterm"), None);
    }

    #[test]
    fn stale_window_policy_covers_the_requests_the_engine_issues() {
        for opcode in [
            MAP_WINDOW_REQUEST,
            CONFIGURE_WINDOW_REQUEST,
            CHANGE_PROPERTY_REQUEST,
            SET_INPUT_FOCUS_REQUEST,
            GET_WINDOW_ATTRIBUTES_REQUEST,
        ] {
            assert!(STALE_WINDOW_REQUESTS.contains(&opcode));
        }
    }
}
