//! Panel registry
//!
//! Every managed client window ("content") lives inside a manager-created
//! wrapper window sized to the whole screen; the pair is a panel. The
//! registry owns the panels in insertion order, the active selection and the
//! withdrawal flags, and issues the map/unmap/raise/focus requests that keep
//! the screen consistent with the bookkeeping.
//!
//! Selection logic (cycling, skip-withdrawn stepping, cascade computation)
//! is kept free of protocol calls so it can be tested directly.

use std::collections::{BTreeSet, HashMap};

use anyhow::Result;
use x11rb::connection::Connection;
use x11rb::protocol::xproto::{
    AtomEnum, ConfigureWindowAux, ConnectionExt, CreateWindowAux, EventMask, InputFocus, PropMode,
    Screen, StackMode, Window, WindowClass,
};
use x11rb::wrapper::ConnectionExt as _;
use x11rb::{COPY_DEPTH_FROM_PARENT, CURRENT_TIME};

use crate::atoms::Atoms;
use crate::config::LeaveMode;
use crate::overrides::OverrideTracker;

/// Registered panels beyond this are rejected with a warning.
pub const MAX_PANELS: usize = 1000;

// ICCCM WM_STATE values.
pub const WM_STATE_NORMAL: u32 = 1;
pub const WM_STATE_ICONIC: u32 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Geometry {
    pub x: i16,
    pub y: i16,
    pub width: u16,
    pub height: u16,
}

/// A wrapper/content pair.
#[derive(Debug, Clone)]
pub struct Panel {
    pub wrapper: Window,
    pub content: Window,
    /// Cached display title, refreshed when the panel list is drawn.
    pub title: String,
    /// Content window of the panel this one belongs to (dialogs, tool
    /// windows), from `WM_TRANSIENT_FOR`.
    pub leader: Option<Window>,
    pub withdrawn: bool,
}

impl Panel {
    pub fn new(wrapper: Window, content: Window, title: String, leader: Option<Window>) -> Self {
        Self { wrapper, content, title, leader, withdrawn: false }
    }
}

/// What a structural change did to the active selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Removal {
    /// The active panel survived (its index may have shifted).
    Kept,
    /// Selection stepped to another panel; the caller must enter it.
    Activated(usize),
    /// No live panel remains.
    NoneActive,
    /// The index was out of range; nothing changed.
    OutOfRange,
}

pub struct PanelRegistry {
    panels: Vec<Panel>,
    by_window: HashMap<Window, usize>,
    active: Option<usize>,
    leave_mode: LeaveMode,
}

impl PanelRegistry {
    pub fn new(leave_mode: LeaveMode) -> Self {
        Self {
            panels: Vec::new(),
            by_window: HashMap::new(),
            active: None,
            leave_mode,
        }
    }

    pub fn len(&self) -> usize {
        self.panels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.panels.is_empty()
    }

    pub fn panels(&self) -> &[Panel] {
        &self.panels
    }

    pub fn get(&self, index: usize) -> Option<&Panel> {
        self.panels.get(index)
    }

    pub fn active(&self) -> Option<usize> {
        self.active
    }

    /// Index of the panel owning this window, wrapper or content.
    pub fn find(&self, window: Window) -> Option<usize> {
        self.by_window.get(&window).copied()
    }

    /// Index of the panel whose content is this window.
    pub fn find_content(&self, window: Window) -> Option<usize> {
        self.find(window).filter(|&i| self.panels[i].content == window)
    }

    /// Register a panel. Returns the existing index for a duplicate window,
    /// `None` when the registry is full.
    pub fn insert(&mut self, panel: Panel) -> Option<usize> {
        if let Some(i) = self.find(panel.content).or_else(|| self.find(panel.wrapper)) {
            tracing::info!(content = panel.content, index = i, "window already has a panel");
            return Some(i);
        }
        if self.panels.len() >= MAX_PANELS {
            tracing::warn!(content = panel.content, "too many open panels, not creating one");
            return None;
        }
        let index = self.panels.len();
        self.by_window.insert(panel.wrapper, index);
        self.by_window.insert(panel.content, index);
        self.panels.push(panel);
        Some(index)
    }

    /// Next non-withdrawn index stepping by `dir` from `from`, wrapping.
    ///
    /// Returns `from` itself after a full wrap when it is the only live
    /// panel, and `None` when every panel is withdrawn.
    pub fn next_live(&self, from: usize, dir: i32) -> Option<usize> {
        let n = self.panels.len();
        if n == 0 {
            return None;
        }
        (1..=n)
            .map(|step| (from as i64 + i64::from(dir) * step as i64).rem_euclid(n as i64) as usize)
            .find(|&i| !self.panels[i].withdrawn)
    }

    /// First non-withdrawn index scanning forward from `start`, inclusive.
    pub fn first_live_from(&self, start: usize) -> Option<usize> {
        let n = self.panels.len();
        (0..n)
            .map(|step| (start + step) % n)
            .find(|&i| !self.panels[i].withdrawn)
    }

    /// Advance the active selection, skipping withdrawn panels.
    pub fn cycle(&mut self, dir: i32) -> Option<usize> {
        let active = self.active?;
        let target = self.next_live(active, dir)?;
        self.active = Some(target);
        Some(target)
    }

    /// Make `index` the active panel and clear its withdrawn flag.
    pub fn activate_entry(&mut self, index: usize) -> bool {
        if index >= self.panels.len() {
            return false;
        }
        self.active = Some(index);
        self.panels[index].withdrawn = false;
        true
    }

    /// The panel at `index` plus, transitively, every panel whose leader is
    /// the content of a panel already in the set. Ascending order.
    pub fn cascade_set(&self, index: usize) -> Vec<usize> {
        let mut set = BTreeSet::new();
        set.insert(index);
        loop {
            let mut grew = false;
            for (i, panel) in self.panels.iter().enumerate() {
                if set.contains(&i) {
                    continue;
                }
                let follows = panel
                    .leader
                    .is_some_and(|l| set.iter().any(|&m| self.panels[m].content == l));
                if follows {
                    set.insert(i);
                    grew = true;
                }
            }
            if !grew {
                break;
            }
        }
        set.into_iter().collect()
    }

    /// Mark a panel withdrawn, stepping the selection off it if needed.
    pub fn mark_withdrawn(&mut self, index: usize) -> Removal {
        if index >= self.panels.len() {
            return Removal::OutOfRange;
        }
        self.panels[index].withdrawn = true;
        if self.active != Some(index) {
            return Removal::Kept;
        }
        match self.next_live(index, 1) {
            Some(next) => {
                self.active = Some(next);
                Removal::Activated(next)
            }
            None => {
                self.active = None;
                Removal::NoneActive
            }
        }
    }

    /// Drop the given entries, repairing the active selection.
    pub fn remove_entries(&mut self, victims: &BTreeSet<usize>) -> Removal {
        let active_pos = self.active;
        let active_content = self.active.map(|i| self.panels[i].content);

        let mut index = 0;
        self.panels.retain(|_| {
            let keep = !victims.contains(&index);
            index += 1;
            keep
        });
        self.rebuild_index();

        if self.panels.is_empty() {
            self.active = None;
            return Removal::NoneActive;
        }
        let (Some(pos), Some(content)) = (active_pos, active_content) else {
            return Removal::Kept;
        };
        if let Some(&new_index) = self.by_window.get(&content) {
            self.active = Some(new_index);
            return Removal::Kept;
        }
        // The active panel itself went away: step from where it used to be.
        let shifted = pos - victims.iter().filter(|&&v| v < pos).count();
        match self.first_live_from(shifted.min(self.panels.len() - 1)) {
            Some(next) => {
                self.active = Some(next);
                Removal::Activated(next)
            }
            None => {
                self.active = None;
                Removal::NoneActive
            }
        }
    }

    /// Exchange two entries positionally; the active selection follows the
    /// panel it pointed at.
    pub fn swap(&mut self, i: usize, j: usize) {
        if i >= self.panels.len() || j >= self.panels.len() || i == j {
            return;
        }
        self.panels.swap(i, j);
        self.rebuild_index();
        self.active = match self.active {
            Some(a) if a == i => Some(j),
            Some(a) if a == j => Some(i),
            other => other,
        };
    }

    /// Move an entry to the end of the list by successive adjacent swaps.
    pub fn move_to_end(&mut self, index: usize) {
        if index >= self.panels.len() {
            return;
        }
        for k in index..self.panels.len().saturating_sub(1) {
            self.swap(k, k + 1);
        }
    }

    fn rebuild_index(&mut self) {
        self.by_window.clear();
        for (i, panel) in self.panels.iter().enumerate() {
            self.by_window.insert(panel.wrapper, i);
            self.by_window.insert(panel.content, i);
        }
    }

    // --- protocol-issuing operations ---

    /// Create a wrapper for `content` and register the pair.
    ///
    /// Duplicate windows return the existing index without creating a second
    /// entry; a full registry returns `None`.
    pub fn add<C: Connection>(
        &mut self,
        conn: &C,
        screen: &Screen,
        content: Window,
        geometry: Geometry,
        leader: Option<Window>,
        title: String,
    ) -> Result<Option<usize>> {
        if let Some(existing) = self.find(content) {
            tracing::info!(content, index = existing, "window already has a panel");
            return Ok(Some(existing));
        }
        if self.panels.len() >= MAX_PANELS {
            tracing::warn!(content, "too many open panels, not creating one");
            return Ok(None);
        }

        let wrapper = conn.generate_id()?;
        conn.create_window(
            COPY_DEPTH_FROM_PARENT,
            wrapper,
            screen.root,
            geometry.x,
            geometry.y,
            geometry.width,
            geometry.height,
            0,
            WindowClass::INPUT_OUTPUT,
            0,
            &CreateWindowAux::new()
                .background_pixel(screen.white_pixel)
                // After the reparent the root stops reporting the content:
                // the wrapper reports its destruction, and redirects the map
                // request a withdrawn client sends to de-iconify itself.
                .event_mask(EventMask::SUBSTRUCTURE_NOTIFY | EventMask::SUBSTRUCTURE_REDIRECT),
        )?;
        conn.reparent_window(content, wrapper, 0, 0)?;
        let name = format!("solowm panel #{}", self.panels.len());
        conn.change_property8(
            PropMode::REPLACE,
            wrapper,
            AtomEnum::WM_NAME,
            AtomEnum::STRING,
            name.as_bytes(),
        )?;

        let index = self.insert(Panel::new(wrapper, content, title, leader));
        if let Some(index) = index {
            let panel = &self.panels[index];
            tracing::info!(
                index,
                wrapper = panel.wrapper,
                content = panel.content,
                title = %panel.title,
                "panel created"
            );
        }
        Ok(index)
    }

    /// Show the active panel: map content then wrapper, raise, restack the
    /// override windows, advertise Normal state and take the input focus.
    pub fn enter<C: Connection>(
        &mut self,
        conn: &C,
        atoms: &Atoms,
        overrides: &OverrideTracker,
    ) -> Result<()> {
        let Some(index) = self.active else {
            return Ok(());
        };
        let panel = &mut self.panels[index];
        tracing::info!(index, content = panel.content, title = %panel.title, "enter panel");

        conn.map_window(panel.content)?;
        conn.map_window(panel.wrapper)?;
        conn.configure_window(panel.wrapper, &ConfigureWindowAux::new().stack_mode(StackMode::ABOVE))?;
        overrides.raise_all(conn)?;
        conn.change_property32(
            PropMode::REPLACE,
            panel.content,
            atoms.WM_STATE,
            atoms.WM_STATE,
            &[WM_STATE_NORMAL, 0],
        )?;
        conn.set_input_focus(InputFocus::PARENT, panel.content, CURRENT_TIME)?;
        panel.withdrawn = false;
        Ok(())
    }

    /// Leave the active panel. In raise mode the next panel simply covers
    /// it; in unmap mode it is hidden, wrapper before content.
    pub fn leave<C: Connection>(&self, conn: &C, atoms: &Atoms) -> Result<()> {
        let Some(index) = self.active else {
            return Ok(());
        };
        let panel = &self.panels[index];
        tracing::info!(index, content = panel.content, title = %panel.title, "leave panel");

        if self.leave_mode == LeaveMode::Unmap {
            conn.unmap_window(panel.wrapper)?;
            conn.unmap_window(panel.content)?;
            conn.delete_property(panel.content, atoms.WM_STATE)?;
        }
        Ok(())
    }

    /// Switch to the next/previous live panel. No-op on an empty registry.
    pub fn switch<C: Connection>(
        &mut self,
        conn: &C,
        atoms: &Atoms,
        overrides: &OverrideTracker,
        dir: i32,
    ) -> Result<bool> {
        let Some(active) = self.active else {
            return Ok(false);
        };
        let Some(target) = self.next_live(active, dir) else {
            return Ok(false);
        };
        self.leave(conn, atoms)?;
        self.active = Some(target);
        self.enter(conn, atoms, overrides)?;
        Ok(true)
    }

    /// Make `index` the active panel, leaving the previous one first.
    /// Re-entering a withdrawn panel restores it.
    pub fn activate<C: Connection>(
        &mut self,
        conn: &C,
        atoms: &Atoms,
        overrides: &OverrideTracker,
        index: usize,
    ) -> Result<()> {
        if index >= self.panels.len() {
            tracing::warn!(index, count = self.panels.len(), "activate: index out of range");
            return Ok(());
        }
        if self.active != Some(index) {
            self.leave(conn, atoms)?;
        }
        self.active = Some(index);
        self.enter(conn, atoms, overrides)
    }

    /// Withdraw a panel: hide the wrapper, advertise Iconic state, keep the
    /// entry. The caller enters the panel reported by `Removal::Activated`.
    pub fn withdraw_panel<C: Connection>(
        &mut self,
        conn: &C,
        atoms: &Atoms,
        index: usize,
    ) -> Result<Removal> {
        if index >= self.panels.len() {
            return Ok(Removal::OutOfRange);
        }
        let panel = &self.panels[index];
        tracing::info!(index, content = panel.content, title = %panel.title, "withdraw panel");

        conn.unmap_window(panel.wrapper)?;
        conn.unmap_window(panel.content)?;
        conn.change_property32(
            PropMode::REPLACE,
            panel.content,
            atoms.WM_STATE,
            atoms.WM_STATE,
            &[WM_STATE_ICONIC, 0],
        )?;
        Ok(self.mark_withdrawn(index))
    }

    /// Destroy a panel and, transitively, the panels led by its content.
    ///
    /// `content_gone` marks the trigger's content as already destroyed;
    /// other contents are reparented back to the root and hidden before
    /// their wrapper goes away. The caller enters the panel reported by
    /// `Removal::Activated`.
    pub fn destroy<C: Connection>(
        &mut self,
        conn: &C,
        root: Window,
        index: usize,
        content_gone: bool,
    ) -> Result<Removal> {
        if index >= self.panels.len() {
            return Ok(Removal::OutOfRange);
        }
        let cascade = self.cascade_set(index);
        for &i in &cascade {
            let panel = &self.panels[i];
            tracing::info!(index = i, content = panel.content, title = %panel.title, "destroy panel");
            if !(i == index && content_gone) {
                conn.reparent_window(panel.content, root, 0, 0)?;
                conn.unmap_window(panel.content)?;
            }
            conn.destroy_window(panel.wrapper)?;
        }
        let victims: BTreeSet<usize> = cascade.into_iter().collect();
        Ok(self.remove_entries(&victims))
    }

    /// Force a panel's content to the wrapper origin at the given size with
    /// no border, both on initial placement and on an explicit resize.
    pub fn resize_content<C: Connection>(
        &self,
        conn: &C,
        index: usize,
        geometry: Geometry,
    ) -> Result<()> {
        let Some(panel) = self.panels.get(index) else {
            return Ok(());
        };
        conn.configure_window(
            panel.content,
            &ConfigureWindowAux::new()
                .x(0)
                .y(0)
                .width(u32::from(geometry.width))
                .height(u32::from(geometry.height))
                .border_width(0),
        )?;
        Ok(())
    }

    /// Refresh every panel's cached title.
    pub fn refresh_titles<C: Connection>(&mut self, conn: &C, atoms: &Atoms) {
        for panel in &mut self.panels {
            panel.title = fetch_title(conn, atoms, panel.content);
        }
    }
}

/// Display title of a window: `_NET_WM_NAME`, then `WM_NAME`, then a
/// placeholder. Lookup failures mean the window is on its way out and are
/// not errors.
pub fn fetch_title<C: Connection>(conn: &C, atoms: &Atoms, window: Window) -> String {
    let utf8 = conn
        .get_property(false, window, atoms._NET_WM_NAME, atoms.UTF8_STRING, 0, 1024)
        .ok()
        .and_then(|cookie| cookie.reply().ok())
        .filter(|reply| !reply.value.is_empty())
        .and_then(|reply| String::from_utf8(reply.value).ok());
    if let Some(title) = utf8 {
        return title;
    }

    conn.get_property(false, window, AtomEnum::WM_NAME, AtomEnum::STRING, 0, 1024)
        .ok()
        .and_then(|cookie| cookie.reply().ok())
        .filter(|reply| !reply.value.is_empty())
        .map(|reply| String::from_utf8_lossy(&reply.value).into_owned())
        .unwrap_or_else(|| "NoName".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn panel(n: u32) -> Panel {
        Panel::new(1000 + n, 2000 + n, format!("window {n}"), None)
    }

    fn registry_with(n: u32) -> PanelRegistry {
        let mut registry = PanelRegistry::new(LeaveMode::Raise);
        for i in 0..n {
            registry.insert(panel(i));
        }
        registry
    }

    #[test]
    fn insert_rejects_duplicates() {
        let mut registry = registry_with(2);
        assert_eq!(registry.insert(panel(0)), Some(0));
        assert_eq!(registry.insert(panel(1)), Some(1));
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn lookup_by_wrapper_and_content() {
        let registry = registry_with(3);
        assert_eq!(registry.find(1001), Some(1));
        assert_eq!(registry.find(2002), Some(2));
        assert_eq!(registry.find_content(2001), Some(1));
        assert_eq!(registry.find_content(1001), None);
        assert_eq!(registry.find(42), None);
    }

    #[test]
    fn new_panel_becomes_active_and_switching_wraps() {
        // First window managed: it is the selection.
        let mut registry = registry_with(0);
        registry.insert(panel(0));
        registry.activate_entry(0);
        assert_eq!(registry.active(), Some(0));

        // Second window mapped: it takes over.
        registry.insert(panel(1));
        registry.activate_entry(1);
        assert_eq!(registry.active(), Some(1));

        // Two live panels: +1 wraps around.
        assert_eq!(registry.cycle(1), Some(0));
        assert_eq!(registry.cycle(1), Some(1));
        assert_eq!(registry.cycle(-1), Some(0));
    }

    #[test]
    fn cycling_skips_withdrawn_panels() {
        let mut registry = registry_with(4);
        registry.activate_entry(0);
        registry.mark_withdrawn(1);
        registry.mark_withdrawn(3);

        assert_eq!(registry.cycle(1), Some(2));
        assert_eq!(registry.cycle(1), Some(0));
        assert_eq!(registry.cycle(-1), Some(2));
    }

    #[test]
    fn sole_live_panel_cycles_to_itself() {
        let mut registry = registry_with(3);
        registry.activate_entry(1);
        registry.mark_withdrawn(0);
        registry.mark_withdrawn(2);
        assert_eq!(registry.cycle(1), Some(1));
    }

    #[test]
    fn cycle_on_empty_registry_is_a_noop() {
        let mut registry = registry_with(0);
        assert_eq!(registry.cycle(1), None);
        assert_eq!(registry.active(), None);
    }

    #[test]
    fn withdrawing_the_active_panel_steps_forward() {
        let mut registry = registry_with(3);
        registry.activate_entry(1);
        assert_eq!(registry.mark_withdrawn(1), Removal::Activated(2));
        assert_eq!(registry.active(), Some(2));
    }

    #[test]
    fn withdrawing_the_last_live_panel_clears_the_selection() {
        let mut registry = registry_with(2);
        registry.activate_entry(0);
        registry.mark_withdrawn(1);
        assert_eq!(registry.mark_withdrawn(0), Removal::NoneActive);
        assert_eq!(registry.active(), None);
    }

    #[test]
    fn withdrawal_round_trip_restores_without_duplicating() {
        let mut registry = registry_with(2);
        registry.activate_entry(0);
        registry.mark_withdrawn(0);
        assert!(registry.get(0).unwrap().withdrawn);

        // Re-entering clears the flag; the entry was retained all along.
        registry.activate_entry(0);
        assert!(!registry.get(0).unwrap().withdrawn);
        assert_eq!(registry.len(), 2);
        assert_eq!(registry.insert(panel(0)), Some(0));
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn out_of_range_indices_are_rejected_without_mutation() {
        let mut registry = registry_with(2);
        registry.activate_entry(1);
        assert_eq!(registry.mark_withdrawn(5), Removal::OutOfRange);
        assert!(!registry.activate_entry(5));
        assert_eq!(registry.active(), Some(1));
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn cascade_follows_leaders_transitively() {
        let mut registry = registry_with(0);
        registry.insert(panel(0));
        registry.insert(Panel::new(1001, 2001, "dialog".into(), Some(2000)));
        registry.insert(Panel::new(1002, 2002, "sub-dialog".into(), Some(2001)));
        registry.insert(Panel::new(1003, 2003, "unrelated".into(), Some(9999)));
        registry.insert(panel(4));

        assert_eq!(registry.cascade_set(0), vec![0, 1, 2]);
        assert_eq!(registry.cascade_set(1), vec![1, 2]);
        assert_eq!(registry.cascade_set(4), vec![4]);
    }

    #[test]
    fn group_teardown_removes_dependents_in_the_same_call() {
        let mut registry = registry_with(0);
        registry.insert(panel(0));
        registry.insert(Panel::new(1001, 2001, "dialog".into(), Some(2000)));
        registry.insert(panel(2));
        registry.activate_entry(2);

        let victims: BTreeSet<usize> = registry.cascade_set(0).into_iter().collect();
        assert_eq!(registry.remove_entries(&victims), Removal::Kept);
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.find_content(2002), Some(0));
        assert_eq!(registry.active(), Some(0));
    }

    #[test]
    fn removing_the_active_panel_activates_the_next_live_one() {
        let mut registry = registry_with(4);
        registry.activate_entry(1);
        registry.mark_withdrawn(2);

        let victims: BTreeSet<usize> = [1].into_iter().collect();
        assert_eq!(registry.remove_entries(&victims), Removal::Activated(2));
        // Old index 3 is the live panel now at index 2.
        assert_eq!(registry.active(), Some(2));
        assert_eq!(registry.get(2).unwrap().content, 2003);
    }

    #[test]
    fn removing_the_last_panel_empties_the_selection() {
        let mut registry = registry_with(1);
        registry.activate_entry(0);
        let victims: BTreeSet<usize> = [0].into_iter().collect();
        assert_eq!(registry.remove_entries(&victims), Removal::NoneActive);
        assert!(registry.is_empty());
        assert_eq!(registry.active(), None);
    }

    #[test]
    fn removing_before_the_active_panel_shifts_its_index() {
        let mut registry = registry_with(3);
        registry.activate_entry(2);
        let victims: BTreeSet<usize> = [0].into_iter().collect();
        assert_eq!(registry.remove_entries(&victims), Removal::Kept);
        assert_eq!(registry.active(), Some(1));
        assert_eq!(registry.get(1).unwrap().content, 2002);
    }

    #[test]
    fn swap_keeps_the_selection_on_the_same_panel() {
        let mut registry = registry_with(3);
        registry.activate_entry(0);
        registry.swap(0, 2);
        assert_eq!(registry.active(), Some(2));
        assert_eq!(registry.get(0).unwrap().content, 2002);
        assert_eq!(registry.find_content(2000), Some(2));
    }

    #[test]
    fn move_to_end_preserves_the_order_of_the_rest() {
        let mut registry = registry_with(4);
        registry.activate_entry(1);
        registry.move_to_end(1);
        let contents: Vec<Window> = registry.panels().iter().map(|p| p.content).collect();
        assert_eq!(contents, vec![2000, 2002, 2003, 2001]);
        assert_eq!(registry.active(), Some(3));
    }
}
