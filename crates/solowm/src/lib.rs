//! solowm core library
//!
//! One client window is visible full screen at a time, wrapped in a
//! manager-created panel. The modules below split the manager into the
//! command vocabulary, the panel registry, the override-window tracker,
//! the overlay list UI and the dispatch engine that ties them together.

pub mod atoms;
pub mod commands;
pub mod config;
pub mod draw;
pub mod engine;
pub mod ipc;
pub mod keymap;
pub mod overlay;
pub mod overrides;
pub mod panels;
pub mod spawn;
