use std::sync::{Arc, Mutex};
use std::thread;

use uuid::Uuid;

use crate::net::message::Message;
use crate::net::session::{MessageSession, Session};
use crate::persistence::tokens::TokenStore;
use crate::skin::artifact::Skin;
use crate::skin::store::{SaveOutcome, SkinStore};
use crate::telemetry::logging;

/// The outbound session commands are injected into, together with the
/// identity it relays for.
#[derive(Clone)]
pub struct ActiveTarget {
    pub session: Arc<dyn MessageSession>,
    pub identity: Uuid,
    pub skin_id: String,
}

/// State shared between the accept loop, the interception filter, and
/// the operator console. One active relay at a time; a newly
/// established pair overwrites the previous target.
pub struct RelayShared {
    active: Mutex<Option<ActiveTarget>>,
    cached_skin: Mutex<Option<Skin>>,
}

impl RelayShared {
    pub fn new() -> Self {
        Self {
            active: Mutex::new(None),
            cached_skin: Mutex::new(None),
        }
    }

    pub fn set_active(&self, target: ActiveTarget) {
        if let Ok(mut active) = self.active.lock() {
            *active = Some(target);
        }
    }

    pub fn active(&self) -> Option<ActiveTarget> {
        self.active.lock().ok().and_then(|active| active.clone())
    }

    pub fn set_cached_skin(&self, skin: Skin) {
        if let Ok(mut cached) = self.cached_skin.lock() {
            *cached = Some(skin);
        }
    }

    pub fn cached_skin(&self) -> Option<Skin> {
        self.cached_skin.lock().ok().and_then(|skin| skin.clone())
    }
}

impl Default for RelayShared {
    fn default() -> Self {
        Self::new()
    }
}

/// Dials the outbound session for an accepted client and runs the two
/// initialization steps in parallel. Forwarding must not start before
/// both have completed; either failing is fatal to the pair.
pub fn establish_pair(
    client: &Arc<Session>,
    remote_addr: &str,
    tokens: &TokenStore,
) -> Result<Arc<Session>, String> {
    let token = tokens.access_token();
    let server = Arc::new(Session::dial(
        remote_addr,
        client.client_data().clone(),
        &token,
    )?);
    let game = server
        .game_data()
        .ok_or_else(|| "dialed session carries no game data".to_string())?;

    thread::scope(|scope| {
        let start = scope.spawn(|| client.start_game(&game));
        let spawn = scope.spawn(|| server.complete_spawn());
        let start_result = start
            .join()
            .map_err(|_| "game start thread panicked".to_string())?;
        let spawn_result = spawn
            .join()
            .map_err(|_| "spawn thread panicked".to_string())?;
        start_result?;
        spawn_result
    })?;

    Ok(server)
}

/// Observes the server-to-client stream. Never drops or mutates a
/// message; only records side data.
pub struct InterceptionFilter {
    identity: Uuid,
    shared: Arc<RelayShared>,
    store: Arc<SkinStore>,
}

impl InterceptionFilter {
    pub fn new(identity: Uuid, shared: Arc<RelayShared>, store: Arc<SkinStore>) -> Self {
        Self {
            identity,
            shared,
            store,
        }
    }

    pub fn inspect(&self, message: &Message) {
        match message {
            Message::PlayerSkin { uuid, skin } if *uuid == self.identity => {
                self.shared.set_cached_skin(skin.clone());
                let summary = format!(
                    "self skin update persona={} premium={} id={} trusted={} colour={} patch={}",
                    skin.persona,
                    skin.premium,
                    skin.skin_id,
                    skin.trusted,
                    skin.skin_colour,
                    String::from_utf8_lossy(&skin.resource_patch)
                );
                println!("skinrelay: {}", summary);
                logging::log_skins(&summary);
            }
            Message::PlayerRoster(entries) => {
                // Entries are independent; one bad or skipped entry
                // never affects the rest.
                for entry in entries {
                    match self.store.save(&entry.skin) {
                        Ok(SaveOutcome::Written(path)) => {
                            println!("skinrelay: cached skin {}", path.display());
                            logging::log_skins(&format!(
                                "cached {} for {}",
                                path.display(),
                                entry.display_name
                            ));
                        }
                        Ok(SaveOutcome::Skipped) => {}
                        Err(err) => {
                            eprintln!("skinrelay: skin cache write failed: {}", err);
                            logging::log_error(&format!("skin cache write failed: {}", err));
                        }
                    }
                }
            }
            _ => {}
        }
    }
}

/// Runs both forwarding directions for an established pair until either
/// side fails. Both loops tear down both sessions on exit; close is
/// idempotent, so whichever direction loses first wins harmlessly.
pub fn relay_pair(
    client: Arc<dyn MessageSession>,
    server: Arc<dyn MessageSession>,
    filter: InterceptionFilter,
) {
    let upstream_client = Arc::clone(&client);
    let upstream_server = Arc::clone(&server);
    let upstream = thread::spawn(move || {
        loop {
            let message = match upstream_client.read_message() {
                Ok(message) => message,
                Err(_) => break,
            };
            if upstream_server.write_message(&message).is_err() {
                break;
            }
        }
        upstream_client.close();
        upstream_server.close();
    });

    loop {
        let message = match server.read_message() {
            Ok(message) => message,
            Err(_) => break,
        };
        filter.inspect(&message);
        if client.write_message(&message).is_err() {
            break;
        }
    }
    server.close();
    client.close();

    let _ = upstream.join();
}
