//! Override-redirect window tracking
//!
//! Windows that opt out of management (menus, tooltips, dropdowns) are
//! tracked so they can be re-raised above the active panel on every switch,
//! and optionally pushed back on screen when they come up outside the
//! visible area. Placement correction is randomized toward the screen edges
//! so that a menu larger than the screen eventually exposes all of its
//! content across repeated openings.

use anyhow::Result;
use rand::Rng;
use x11rb::connection::Connection;
use x11rb::protocol::xproto::{ConfigureWindowAux, ConnectionExt, StackMode, Window};

use crate::panels::Geometry;

/// Tracked overrides beyond this are rejected with a warning.
pub const MAX_OVERRIDES: usize = 256;

struct Entry {
    window: Window,
    /// Last position chosen by placement correction; identical geometry is
    /// never re-randomized, so a correction-triggered move cannot trigger
    /// another correction.
    corrected: Option<(i32, i32)>,
    on_top: bool,
}

#[derive(Default)]
pub struct OverrideTracker {
    entries: Vec<Entry>,
}

impl OverrideTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, window: Window) -> bool {
        self.entries.iter().any(|e| e.window == window)
    }

    /// Track an override window. Duplicates and overflow are rejected.
    pub fn add(&mut self, window: Window, on_top: bool) -> bool {
        if self.contains(window) {
            return false;
        }
        if self.entries.len() >= MAX_OVERRIDES {
            tracing::warn!(window, "too many override windows, not tracking");
            return false;
        }
        self.entries.push(Entry { window, corrected: None, on_top });
        true
    }

    pub fn remove(&mut self, window: Window) -> bool {
        match self.entries.iter().position(|e| e.window == window) {
            Some(i) => {
                self.entries.swap_remove(i);
                true
            }
            None => false,
        }
    }

    /// Cached corrected position for a window, if any.
    pub fn corrected(&self, window: Window) -> Option<(i32, i32)> {
        self.entries
            .iter()
            .find(|e| e.window == window)
            .and_then(|e| e.corrected)
    }

    /// Stacking order for a raise pass: ordinary overrides first, always-on-top
    /// ones last so they end up above everything.
    fn raise_order(&self) -> impl Iterator<Item = Window> + '_ {
        let normal = self.entries.iter().filter(|e| !e.on_top);
        let on_top = self.entries.iter().filter(|e| e.on_top);
        normal.chain(on_top).map(|e| e.window)
    }

    /// Re-raise every tracked window to the top of the stacking order.
    pub fn raise_all<C: Connection>(&self, conn: &C) -> Result<()> {
        for window in self.raise_order() {
            conn.configure_window(window, &ConfigureWindowAux::new().stack_mode(StackMode::ABOVE))?;
        }
        Ok(())
    }

    /// Move a tracked window back into `bounds` if it lies outside them.
    ///
    /// A no-op when the window's geometry already equals its cached corrected
    /// position, or when the window has vanished in the meantime.
    pub fn relocate_if_offscreen<C: Connection, R: Rng>(
        &mut self,
        conn: &C,
        window: Window,
        bounds: Geometry,
        rng: &mut R,
    ) -> Result<()> {
        let Some(index) = self.entries.iter().position(|e| e.window == window) else {
            return Ok(());
        };
        let Ok(geo) = conn.get_geometry(window)?.reply() else {
            return Ok(());
        };
        let current = (i32::from(geo.x), i32::from(geo.y));
        if self.entries[index].corrected == Some(current) {
            return Ok(());
        }

        let border = i32::from(geo.border_width);
        let target = (
            correct_axis(current.0, i32::from(geo.width), border, i32::from(bounds.x), i32::from(bounds.width), rng),
            correct_axis(current.1, i32::from(geo.height), border, i32::from(bounds.y), i32::from(bounds.height), rng),
        );
        self.entries[index].corrected = Some(target);

        if target != current {
            tracing::debug!(window, from = ?current, to = ?target, "moving override window on screen");
            conn.configure_window(window, &ConfigureWindowAux::new().x(target.0).y(target.1))?;
        }
        Ok(())
    }
}

/// Pick a coordinate along one axis.
///
/// The free margin is the range of offsets from the reference origin that
/// keep the window fully visible. A coordinate already inside it is kept.
/// Otherwise the offset is drawn from {origin edge, far edge, uniform
/// in-between}; with a negative margin (window larger than the screen) the
/// same three-way choice slides the window so either end becomes reachable.
pub fn correct_axis<R: Rng>(
    pos: i32,
    window_extent: i32,
    border: i32,
    origin: i32,
    reference_extent: i32,
    rng: &mut R,
) -> i32 {
    let margin = reference_extent - window_extent - 2 * border;
    let rel = pos - origin;
    if margin >= 0 && (0..=margin).contains(&rel) {
        return pos;
    }
    let offset = match rng.gen_range(0u8..3) {
        0 => 0,
        1 => margin,
        _ if margin == 0 => 0,
        _ => rng.gen_range(margin.min(0)..=margin.max(0)),
    };
    origin + offset
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::SmallRng;
    use rand::SeedableRng;

    fn rng() -> SmallRng {
        SmallRng::seed_from_u64(0x5eed)
    }

    #[test]
    fn add_is_unique_by_window() {
        let mut tracker = OverrideTracker::new();
        assert!(tracker.add(7, false));
        assert!(!tracker.add(7, true));
        assert_eq!(tracker.len(), 1);
    }

    #[test]
    fn add_rejects_overflow() {
        let mut tracker = OverrideTracker::new();
        for w in 0..MAX_OVERRIDES {
            assert!(tracker.add(w as Window, false));
        }
        assert!(!tracker.add(99999, false));
        assert_eq!(tracker.len(), MAX_OVERRIDES);
    }

    #[test]
    fn remove_by_value() {
        let mut tracker = OverrideTracker::new();
        tracker.add(1, false);
        tracker.add(2, false);
        assert!(tracker.remove(1));
        assert!(!tracker.remove(1));
        assert!(tracker.contains(2));
    }

    #[test]
    fn raise_order_puts_on_top_windows_last() {
        let mut tracker = OverrideTracker::new();
        tracker.add(1, true);
        tracker.add(2, false);
        tracker.add(3, true);
        tracker.add(4, false);
        let order: Vec<Window> = tracker.raise_order().collect();
        assert_eq!(order, vec![2, 4, 1, 3]);
    }

    #[test]
    fn coordinate_inside_margin_is_kept() {
        let mut rng = rng();
        // screen 0..1000, window 200 wide, border 2: margin = 796
        for pos in [0, 1, 400, 796] {
            assert_eq!(correct_axis(pos, 200, 2, 0, 1000, &mut rng), pos);
        }
    }

    #[test]
    fn coordinate_outside_margin_lands_inside() {
        let mut rng = rng();
        for pos in [-500, -1, 797, 5000] {
            for _ in 0..100 {
                let fixed = correct_axis(pos, 200, 2, 0, 1000, &mut rng);
                assert!((0..=796).contains(&fixed), "got {fixed} for {pos}");
            }
        }
    }

    #[test]
    fn correction_respects_reference_origin() {
        let mut rng = rng();
        for _ in 0..100 {
            let fixed = correct_axis(-300, 100, 0, 50, 500, &mut rng);
            assert!((50..=450).contains(&fixed), "got {fixed}");
        }
    }

    #[test]
    fn oversized_window_slides_between_its_ends() {
        let mut rng = rng();
        // window 1500 on a 1000 screen: margin = -500, offsets in [-500, 0]
        let mut saw_origin = false;
        let mut saw_far_edge = false;
        let mut saw_interior = false;
        for _ in 0..1000 {
            let fixed = correct_axis(300, 1500, 0, 0, 1000, &mut rng);
            assert!((-500..=0).contains(&fixed), "got {fixed}");
            match fixed {
                0 => saw_origin = true,
                -500 => saw_far_edge = true,
                _ => saw_interior = true,
            }
        }
        assert!(saw_origin && saw_far_edge && saw_interior);
    }

    #[test]
    fn edge_bias_still_covers_the_interior() {
        let mut rng = rng();
        let mut hits = [0usize; 3];
        for _ in 0..3000 {
            let fixed = correct_axis(5000, 200, 0, 0, 1000, &mut rng);
            match fixed {
                0 => hits[0] += 1,
                800 => hits[1] += 1,
                _ => hits[2] += 1,
            }
        }
        // Each edge gets roughly a third; the interior gets the rest.
        assert!(hits.iter().all(|&h| h > 500), "distribution {hits:?}");
    }
}
