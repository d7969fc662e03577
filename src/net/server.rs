use std::net::{TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crate::net::relay::{establish_pair, relay_pair, ActiveTarget, InterceptionFilter, RelayShared};
use crate::net::session::{MessageSession, Session};
use crate::persistence::tokens::TokenStore;
use crate::skin::store::SkinStore;
use crate::telemetry::logging;

#[derive(Debug)]
pub struct ServerControl {
    shutdown: AtomicBool,
}

impl ServerControl {
    pub fn new() -> Self {
        Self {
            shutdown: AtomicBool::new(false),
        }
    }

    pub fn request_shutdown(&self) {
        self.shutdown.store(true, Ordering::SeqCst);
    }

    pub fn is_running(&self) -> bool {
        !self.shutdown.load(Ordering::SeqCst)
    }
}

impl Default for ServerControl {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone)]
pub struct RelayServerConfig {
    pub bind_addr: String,
    pub remote_addr: String,
}

/// Accept loop: one relayed session pair per inbound connection, each
/// handled on its own thread. Connection failures are logged and never
/// fatal to the loop.
pub fn run_relay_server(
    config: RelayServerConfig,
    control: Arc<ServerControl>,
    shared: Arc<RelayShared>,
    store: Arc<SkinStore>,
    tokens: Arc<TokenStore>,
) -> Result<(), String> {
    let listener = TcpListener::bind(&config.bind_addr)
        .map_err(|err| format!("bind {} failed: {}", config.bind_addr, err))?;
    listener
        .set_nonblocking(true)
        .map_err(|err| format!("relay listener nonblocking failed: {}", err))?;

    logging::log_relay(&format!("relay listening on {}", config.bind_addr));
    println!("skinrelay: listening on {}", config.bind_addr);

    while control.is_running() {
        match listener.accept() {
            Ok((stream, addr)) => {
                println!("skinrelay: connection from {}", addr);
                let config = config.clone();
                let shared = Arc::clone(&shared);
                let store = Arc::clone(&store);
                let tokens = Arc::clone(&tokens);
                thread::spawn(move || {
                    if let Err(err) = handle_connection(stream, config, shared, store, tokens) {
                        logging::log_error(&format!("relay connection error: {}", err));
                        eprintln!("relay connection error: {}", err);
                    }
                });
            }
            Err(err) if err.kind() == std::io::ErrorKind::WouldBlock => {
                thread::sleep(Duration::from_millis(50));
            }
            Err(err) => {
                logging::log_error(&format!("relay accept error: {}", err));
                eprintln!("relay accept error: {}", err);
            }
        }
    }

    Ok(())
}

fn handle_connection(
    stream: TcpStream,
    config: RelayServerConfig,
    shared: Arc<RelayShared>,
    store: Arc<SkinStore>,
    tokens: Arc<TokenStore>,
) -> Result<(), String> {
    stream
        .set_nonblocking(false)
        .map_err(|err| format!("session blocking mode failed: {}", err))?;
    let client = Arc::new(Session::accept(stream)?);
    let identity = client.client_data().identity;
    let display_name = client.client_data().display_name.clone();
    let skin_id = client.client_data().skin_id.clone();

    let server = establish_pair(&client, &config.remote_addr, &tokens)?;
    shared.set_active(ActiveTarget {
        session: Arc::clone(&server) as Arc<dyn MessageSession>,
        identity,
        skin_id,
    });
    logging::log_relay(&format!(
        "relaying {} to {} as {}",
        identity, config.remote_addr, display_name
    ));
    println!(
        "skinrelay: relaying {} to {} as {}",
        identity, config.remote_addr, display_name
    );

    let filter = InterceptionFilter::new(identity, shared, store);
    relay_pair(client, server, filter);

    logging::log_relay(&format!("relay session for {} ended", display_name));
    println!("skinrelay: relay session for {} ended", display_name);
    Ok(())
}
