mod config;
pub mod console;
pub mod net;
pub mod persistence;
pub mod skin;
pub mod telemetry;

pub use net::message::{ClientData, GameData, Message, MessageDecodeError, PROTOCOL_VERSION};
pub use net::packet::{PacketReader, PacketWriter};
pub use net::relay::{establish_pair, relay_pair, ActiveTarget, InterceptionFilter, RelayShared};
pub use net::server::{run_relay_server, RelayServerConfig, ServerControl};
pub use net::session::{MessageSession, Session};
pub use skin::artifact::{Skin, DEFAULT_RESOURCE_PATCH};
pub use skin::codec::{plan_files, skin_from_files, SkinDecodeError, SkinEncodeError};
pub use skin::store::{SaveOutcome, SkinLoadError, SkinStore};

pub fn run(args: &[String]) -> Result<(), String> {
    let config = config::AppConfig::load(args)?;
    telemetry::logging::init(&config.root)?;
    if config.connection.remote_address.is_empty() {
        return Err(format!(
            "config: remote_address is empty, set it in {} or SKINRELAY_REMOTE_ADDR",
            config.root.join(config::CONFIG_FILE_NAME).display()
        ));
    }

    let tokens = std::sync::Arc::new(persistence::tokens::TokenStore::load_or_create(
        &config.root,
        &config.connection.token_identifier,
    )?);
    let store = std::sync::Arc::new(SkinStore::new(config.root.join("skin")));
    let shared = std::sync::Arc::new(RelayShared::new());
    let control = std::sync::Arc::new(ServerControl::new());

    println!("skinrelay: configuration");
    println!("- root: {}", config.root.display());
    println!("- local address: {}", config.connection.local_address);
    println!("- remote address: {}", config.connection.remote_address);
    println!("- token identifier: {}", config.connection.token_identifier);
    println!("- skin store: {}", store.base().display());

    {
        let shared = std::sync::Arc::clone(&shared);
        let store = std::sync::Arc::clone(&store);
        let control = std::sync::Arc::clone(&control);
        // Not joined: the console blocks on stdin for the process
        // lifetime, exactly like the relay loops it feeds.
        std::thread::spawn(move || {
            let stdin = std::io::stdin();
            console::run_console(stdin.lock(), shared, store, control);
        });
    }

    let server_config = RelayServerConfig {
        bind_addr: config.connection.local_address.clone(),
        remote_addr: config.connection.remote_address.clone(),
    };
    run_relay_server(server_config, control, shared, store, std::sync::Arc::clone(&tokens))?;

    // Accept loop is done; save the credential for the next run.
    tokens.persist()?;
    println!("skinrelay: shut down");
    Ok(())
}
