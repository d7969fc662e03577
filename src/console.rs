use std::io::BufRead;
use std::sync::Arc;

use crate::net::message::Message;
use crate::net::relay::RelayShared;
use crate::net::server::ServerControl;
use crate::net::session::MessageSession;
use crate::skin::store::SkinStore;
use crate::telemetry::logging;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsoleCommand {
    /// Reapply a skin onto the relayed session: the cached
    /// self-appearance, or a stored artifact named by its dotted
    /// geometry identifier.
    Apply { source: Option<String> },
    Quit,
    Unknown(String),
}

pub fn parse_console_command(line: &str) -> Option<ConsoleCommand> {
    let mut parts = line.split_whitespace();
    let verb = parts.next()?;
    let parsed = match verb {
        "skin" => ConsoleCommand::Apply {
            source: parts.next().map(str::to_string),
        },
        "quit" => ConsoleCommand::Quit,
        other => ConsoleCommand::Unknown(other.to_string()),
    };
    Some(parsed)
}

/// Reads operator commands until the source closes or `quit` arrives.
/// Apply failures are reported and never stop the loop.
pub fn run_console<R: BufRead>(
    input: R,
    shared: Arc<RelayShared>,
    store: Arc<SkinStore>,
    control: Arc<ServerControl>,
) {
    for line in input.lines() {
        let line = match line {
            Ok(line) => line,
            Err(_) => break,
        };
        match parse_console_command(&line) {
            Some(ConsoleCommand::Apply { source }) => {
                apply_skin(&shared, &store, source.as_deref());
            }
            Some(ConsoleCommand::Quit) => {
                println!("skinrelay: shutdown requested");
                control.request_shutdown();
                break;
            }
            // Unrecognized verbs and blank lines are ignored.
            Some(ConsoleCommand::Unknown(_)) | None => {}
        }
    }
}

fn apply_skin(shared: &RelayShared, store: &SkinStore, source: Option<&str>) {
    let Some(target) = shared.active() else {
        eprintln!("skinrelay: no active session to apply a skin to");
        return;
    };
    let skin = match source {
        None => match shared.cached_skin() {
            Some(skin) => skin,
            None => {
                eprintln!("skinrelay: no cached skin yet");
                return;
            }
        },
        Some(dotted_id) => match store.load(dotted_id, &target.skin_id) {
            Ok(skin) => skin,
            Err(err) => {
                eprintln!("skinrelay: skin load failed: {}", err);
                return;
            }
        },
    };
    let message = Message::PlayerSkin {
        uuid: target.identity,
        skin,
    };
    if let Err(err) = target.session.write_message(&message) {
        eprintln!("skinrelay: skin apply write failed: {}", err);
        logging::log_error(&format!("skin apply write failed: {}", err));
    }
}
