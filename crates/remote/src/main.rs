//! solowm-remote - infrared remote bridge
//!
//! Connects to an lircd-compatible daemon socket, translates received
//! button names into command names through a mapping file, and forwards
//! them to the running manager as the same client message any other
//! collaborator would send. The manager itself never talks to the remote
//! daemon.

mod mapping;

use std::io::{BufRead, BufReader};
use std::os::unix::net::UnixStream;

use anyhow::{Context as _, Result};
use x11rb::connection::Connection;
use x11rb::protocol::xproto::ConnectionExt;
use x11rb::rust_connection::RustConnection;

use mapping::RemoteMap;
use solowm::ipc;

const DEFAULT_SOCKET: &str = "/var/run/lirc/lircd";

struct Options {
    socket: String,
    mapping: Option<String>,
}

fn parse_options() -> Options {
    let mut options = Options { socket: DEFAULT_SOCKET.to_string(), mapping: None };
    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--socket" => {
                if let Some(value) = args.next() {
                    options.socket = value;
                }
            }
            "--mapping" => options.mapping = args.next(),
            other => {
                eprintln!("usage: solowm-remote [--socket PATH] [--mapping FILE]");
                eprintln!("unrecognized option: {other}");
                std::process::exit(2);
            }
        }
    }
    options
}

fn main() -> Result<()> {
    setup_logging();

    let options = parse_options();
    let map = RemoteMap::load(options.mapping.as_deref());

    let (conn, screen_num) = RustConnection::connect(None).context("cannot open display")?;
    let root = conn.setup().roots[screen_num].root;
    let command_atom = conn
        .intern_atom(false, ipc::COMMAND_ATOM.as_bytes())?
        .reply()?
        .atom;

    let stream = UnixStream::connect(&options.socket)
        .with_context(|| format!("cannot connect to remote daemon at {}", options.socket))?;
    tracing::info!(socket = %options.socket, "connected to remote daemon");

    for line in BufReader::new(stream).lines() {
        let line = line.context("remote daemon read failed")?;
        let Some(event) = mapping::parse_event(&line) else {
            tracing::debug!(%line, "unparsable daemon line");
            continue;
        };
        // Only the initial press counts; held-button repeats would flood
        // the manager with switches.
        if event.repeat != 0 {
            continue;
        }
        let Some(command) = map.command_for(&event.button) else {
            tracing::debug!(button = %event.button, "unmapped button");
            continue;
        };
        tracing::info!(button = %event.button, command = %command.name(), "forwarding command");
        ipc::send(&conn, root, command_atom, command)?;
        conn.flush()?;
    }

    tracing::info!("remote daemon closed the connection");
    Ok(())
}

fn setup_logging() {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true).with_ansi(std::env::var("NO_COLOR").is_err()))
        .with(filter)
        .init();
}
