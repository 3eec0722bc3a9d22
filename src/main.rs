#![deny(dead_code)]
use anyhow::{Context, Result};
use clap::Parser;
use log::{error, info, warn};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::TcpListener;

use chatterbox_relay::{
    config::{self, RelayConfig},
    models::{Identity, UserProfile},
    realtime::{RealtimeHub, SystemClock},
    service::ChatService,
    store::{MemoryAssetHost, MemoryStore},
    transport::{LineServer, SessionHub},
    utils,
};

/// Command line arguments for the relay
#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "chatterbox-relay: presence and message-delivery coordinator for one-to-one chat.",
    long_about = "Serves newline-delimited JSON over TCP. The first line of a connection is\n\
    {\"identity\": \"<user>\"}; every following line is a client frame.\n\n\
    Settings are read from the config file, then CHATTERBOX_* environment variables,\n\
    then these flags."
)]
struct Args {
    /// Path to a JSON config file (defaults to the user config directory)
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Address to listen on, e.g. 127.0.0.1:5050
    #[arg(long, value_name = "ADDR")]
    listen: Option<String>,

    /// Seconds a disconnected user is reported as recently offline
    #[arg(long, value_name = "SECS")]
    presence_window_secs: Option<i64>,

    /// Write logs to this file instead of stderr
    #[arg(long, value_name = "PATH")]
    log_file: Option<PathBuf>,

    /// error, warn, info, debug or trace
    #[arg(long, value_name = "LEVEL")]
    log_level: Option<String>,

    /// Register users in the in-memory directory (comma separated or repeated)
    #[arg(long = "user", value_name = "ID", value_delimiter = ',')]
    users: Vec<String>,
}

impl Args {
    fn apply(&self, config: &mut RelayConfig) {
        if let Some(listen) = &self.listen {
            config.listen_addr = listen.clone();
        }
        if let Some(secs) = self.presence_window_secs {
            config.presence_window_secs = secs;
        }
        if let Some(path) = &self.log_file {
            config.log_file = Some(path.clone());
        }
        if let Some(level) = &self.log_level {
            config.log_level = level.clone();
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut relay_config = config::load_config(args.config.as_deref())?;
    relay_config.apply_env()?;
    args.apply(&mut relay_config);
    relay_config.validate()?;

    utils::setup_logging(relay_config.log_file.as_deref(), relay_config.log_level_filter()?)?;
    info!("chatterbox-relay starting up");
    info!("System information: {} {}", std::env::consts::OS, std::env::consts::ARCH);

    let store = Arc::new(MemoryStore::new());
    for user in &args.users {
        let user = user.trim();
        if user.is_empty() {
            continue;
        }
        store
            .add_user(UserProfile {
                identity: Identity::from(user),
                display_name: user.to_string(),
                profile_pic: None,
            })
            .await;
    }
    if args.users.is_empty() {
        warn!("No users registered; peer lists will be empty (use --user)");
    }

    let sessions = Arc::new(SessionHub::new(relay_config.session_buffer));
    let hub = RealtimeHub::with_clock(
        sessions.clone(),
        Arc::new(SystemClock),
        relay_config.presence_window(),
    );
    let service = ChatService::new(hub, store.clone(), store, Arc::new(MemoryAssetHost::default()));
    let server = LineServer::new(service, sessions).with_max_frame_bytes(relay_config.max_frame_bytes);

    let listener = TcpListener::bind(&relay_config.listen_addr)
        .await
        .with_context(|| format!("Failed to bind {}", relay_config.listen_addr))?;
    println!("chatterbox-relay listening on {}", relay_config.listen_addr);

    tokio::select! {
        result = server.run(listener) => {
            if let Err(e) = &result {
                error!("Server stopped: {}", e);
            }
            result
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl-C, shutting down");
            Ok(())
        }
    }
}
