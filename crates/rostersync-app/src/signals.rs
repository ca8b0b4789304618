// Line-oriented control input for the headless harness.
//
// Each stdin line is one command. Environment signals are forwarded to every
// monitor controller; the rest are handled by the app loop.

use rostersync_core::{ConnectionEvent, PageId, Signal};
use thiserror::Error;

/// A parsed input line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Broadcast to the monitor controllers.
    Signal(Signal),
    /// Log the current slot grid of every roster.
    Status,
    Quit,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unrecognized command: {0:?} (try: focus on|off, page <id>, connected, disconnected, status, quit)")]
pub struct UnknownCommand(pub String);

/// Parse one input line. Blank lines and `#` comments yield `Ok(None)`.
pub fn parse_line(line: &str) -> Result<Option<Command>, UnknownCommand> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return Ok(None);
    }

    let mut words = line.split_whitespace();
    let verb = words.next().unwrap_or_default().to_ascii_lowercase();
    let arg = words.next();
    let extra = words.next();
    let unknown = || UnknownCommand(line.to_string());

    let command = match (verb.as_str(), arg, extra) {
        ("focus", Some(state), None) => match state.to_ascii_lowercase().as_str() {
            "on" | "gained" | "true" => Command::Signal(Signal::Focus(true)),
            "off" | "lost" | "false" => Command::Signal(Signal::Focus(false)),
            _ => return Err(unknown()),
        },
        ("blur", None, None) => Command::Signal(Signal::Focus(false)),
        ("page", Some(page), None) => Command::Signal(Signal::Page(PageId::new(page))),
        ("connected", None, None) => {
            Command::Signal(Signal::Connection(ConnectionEvent::Connected))
        }
        ("disconnected", None, None) => {
            Command::Signal(Signal::Connection(ConnectionEvent::Disconnected))
        }
        ("status", None, None) => Command::Status,
        ("quit" | "exit" | "q", None, None) => Command::Quit,
        _ => return Err(unknown()),
    };
    Ok(Some(command))
}
