//! solowm - one full-screen window at a time
//!
//! Managed windows are reparented into screen-sized panels; exactly one is
//! visible and focused. Panels are cycled and programs launched from a small
//! command vocabulary reachable by keyboard chords, an infrared remote
//! bridge, or a plain client message.

use anyhow::Result;

use solowm::config::Config;
use solowm::engine::{Exit, Wm};
use solowm::spawn;

fn main() -> Result<()> {
    setup_logging();
    tracing::info!("starting solowm");

    let config = Config::load();
    let mut wm = Wm::new(config)?;

    match wm.run()? {
        Exit::Quit => Ok(()),
        Exit::Restart => {
            // exec only returns on failure
            let error = spawn::reexec();
            Err(anyhow::Error::new(error).context("failed to re-execute solowm"))
        }
    }
}

fn setup_logging() {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let use_ansi = std::env::var("NO_COLOR").is_err();

    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_target(true)
                .with_line_number(true)
                .with_ansi(use_ansi),
        )
        .with(filter)
        .init();
}
