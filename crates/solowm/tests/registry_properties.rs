//! Property-based tests for panel registry invariants
//!
//! These exercise the selection logic over arbitrary withdrawal patterns
//! and removal sequences: cycling always lands on a live panel, a full
//! cycle returns to its start, and the active index never dangles.

use std::collections::BTreeSet;

use proptest::prelude::*;
use solowm::config::LeaveMode;
use solowm::panels::{Panel, PanelRegistry, Removal};

/// Build a registry of `flags.len()` panels with the given withdrawal
/// pattern, activating the first live one.
fn registry_from(flags: &[bool]) -> PanelRegistry {
    let mut registry = PanelRegistry::new(LeaveMode::Raise);
    for (i, &withdrawn) in flags.iter().enumerate() {
        let n = i as u32;
        registry.insert(Panel {
            wrapper: 1000 + n,
            content: 2000 + n,
            title: format!("window {n}"),
            leader: None,
            withdrawn,
        });
    }
    if let Some(first_live) = registry.first_live_from(0) {
        registry.activate_entry(first_live);
    }
    registry
}

/// Withdrawal patterns with at least one live panel.
fn live_patterns() -> impl Strategy<Value = Vec<bool>> {
    prop::collection::vec(any::<bool>(), 1..12)
        .prop_filter("at least one live panel", |flags| flags.iter().any(|&w| !w))
}

proptest! {
    /// Cycling k times over k live panels returns to the starting index,
    /// and every intermediate stop is live.
    #[test]
    fn full_cycle_returns_to_start(flags in live_patterns()) {
        let mut registry = registry_from(&flags);
        let start = registry.active().unwrap();
        let live = flags.iter().filter(|&&w| !w).count();

        for _ in 0..live {
            let index = registry.cycle(1).expect("live panels exist");
            prop_assert!(!registry.get(index).unwrap().withdrawn);
        }
        prop_assert_eq!(registry.active(), Some(start));
    }

    /// One step forward then one step back is the identity.
    #[test]
    fn cycle_is_reversible(flags in live_patterns()) {
        let mut registry = registry_from(&flags);
        let start = registry.active();
        registry.cycle(1);
        registry.cycle(-1);
        prop_assert_eq!(registry.active(), start);
    }

    /// The active index always refers to a live panel, or is None.
    #[test]
    fn active_panel_is_never_withdrawn(
        flags in live_patterns(),
        steps in prop::collection::vec(prop_oneof![Just(1i32), Just(-1i32)], 0..20),
        withdraw in prop::collection::vec(0usize..12, 0..6),
    ) {
        let mut registry = registry_from(&flags);
        for dir in steps {
            registry.cycle(dir);
            if let Some(active) = registry.active() {
                prop_assert!(!registry.get(active).unwrap().withdrawn);
            }
        }
        for index in withdraw {
            if index < registry.len() {
                registry.mark_withdrawn(index);
            }
            if let Some(active) = registry.active() {
                prop_assert!(!registry.get(active).unwrap().withdrawn);
            }
        }
    }

    /// Removing arbitrary entries never leaves the selection dangling and
    /// keeps the windows-to-index mapping consistent.
    #[test]
    fn removal_repairs_the_selection(
        flags in live_patterns(),
        victims in prop::collection::vec(0usize..12, 1..6),
    ) {
        let mut registry = registry_from(&flags);
        let victims: BTreeSet<usize> =
            victims.into_iter().filter(|&v| v < registry.len()).collect();
        prop_assume!(!victims.is_empty());

        let before = registry.len();
        let removal = registry.remove_entries(&victims);

        prop_assert_eq!(registry.len(), before - victims.len());
        match registry.active() {
            Some(active) => {
                prop_assert!(active < registry.len());
                prop_assert!(!registry.get(active).unwrap().withdrawn);
            }
            None => prop_assert!(matches!(removal, Removal::NoneActive)),
        }
        for (i, panel) in registry.panels().iter().enumerate() {
            prop_assert_eq!(registry.find(panel.wrapper), Some(i));
            prop_assert_eq!(registry.find_content(panel.content), Some(i));
        }
    }

    /// Moving a panel to the end is a rotation: relative order of the rest
    /// is unchanged and the selection follows its panel.
    #[test]
    fn move_to_end_is_a_rotation(flags in live_patterns(), index in 0usize..12) {
        let mut registry = registry_from(&flags);
        prop_assume!(index < registry.len());

        let active_content = registry.active().map(|a| registry.get(a).unwrap().content);
        let mut expected: Vec<u32> = registry.panels().iter().map(|p| p.content).collect();
        let moved = expected.remove(index);
        expected.push(moved);

        registry.move_to_end(index);

        let order: Vec<u32> = registry.panels().iter().map(|p| p.content).collect();
        prop_assert_eq!(order, expected);
        if let (Some(active), Some(content)) = (registry.active(), active_content) {
            prop_assert_eq!(registry.get(active).unwrap().content, content);
        }
    }
}
