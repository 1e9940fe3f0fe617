mod http;

use std::error::Error;
use std::net::{IpAddr, Ipv4Addr};
use std::str::FromStr;
use std::sync::mpsc::{Receiver, Sender};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;

use rocket::config::{self, Config, LogLevel};
use rocket::data::{Limits, ToByteUnit};
use rocket::Shutdown;
use serde_json::Value as JsonValue;

use crate::ingestion;
use crate::ingestion::messages::EventKind;
use crate::store::StoreHandle;
use crate::utils::{loggable_payload, Context};
use crate::{try_error, try_info};

pub const DEFAULT_EVENT_PORT: u16 = 3700;

/// One unit of work for the single-writer queue. The reply channel
/// carries the commit outcome back to the blocked HTTP request.
pub enum IngestionCommand {
    ProcessEvent {
        kind: EventKind,
        payload: JsonValue,
        reply: Sender<Result<(), String>>,
    },
    Terminate,
}

/// Spawn the concurrency-1 consumer that owns the store handle. All typed
/// writes funnel through this loop, in submission order; a failed command
/// is reported back and the loop moves on to the next one.
pub fn start_ingestion_runloop(
    store: StoreHandle,
    commands_rx: Receiver<IngestionCommand>,
    ctx: Context,
) -> std::io::Result<JoinHandle<()>> {
    hiro_system_kit::thread_named("Ingestion runloop").spawn(move || {
        while let Ok(command) = commands_rx.recv() {
            match command {
                IngestionCommand::Terminate => {
                    try_info!(ctx, "Terminating ingestion runloop");
                    break;
                }
                IngestionCommand::ProcessEvent {
                    kind,
                    payload,
                    reply,
                } => {
                    let result = ingestion::dispatch_record(kind, &payload, store.as_ref(), &ctx);
                    if let Err(ref e) = result {
                        try_error!(
                            ctx,
                            "{} handler failed: {}; payload: {}",
                            kind.path(),
                            e,
                            loggable_payload(&payload)
                        );
                    }
                    let _ = reply.send(result.map_err(|e| e.to_string()));
                }
            }
        }
    })
}

#[derive(Debug, Clone)]
pub struct EventServerConfig {
    pub host: String,
    pub port: u16,
    pub display_logs: bool,
}

impl EventServerConfig {
    pub fn localhost(port: u16) -> EventServerConfig {
        EventServerConfig {
            host: "127.0.0.1".to_string(),
            port,
            display_logs: false,
        }
    }
}

/// Ignite the event endpoint and launch it on its own thread. The
/// returned handle shuts the endpoint down; the ingestion run loop is
/// expected to be running already.
pub async fn start_event_server(
    config: EventServerConfig,
    store: StoreHandle,
    ingestion_commands_tx: Sender<IngestionCommand>,
    ctx: Context,
) -> Result<Shutdown, Box<dyn Error>> {
    let log_level = if config.display_logs {
        LogLevel::Debug
    } else {
        LogLevel::Off
    };

    // The initial genesis block payload alone is ~80 MB of JSON.
    let limits = Limits::default().limit("json", 500.megabytes());
    let mut shutdown_config = config::Shutdown::default();
    shutdown_config.ctrlc = false;
    shutdown_config.grace = 0;
    shutdown_config.mercy = 0;

    let address = IpAddr::from_str(&config.host)
        .unwrap_or(IpAddr::V4(Ipv4Addr::new(0, 0, 0, 0)));

    let server_config = Config {
        port: config.port,
        workers: 1,
        address,
        keep_alive: 5,
        temp_dir: std::env::temp_dir().into(),
        log_level,
        cli_colors: false,
        limits,
        shutdown: shutdown_config,
        ..Config::default()
    };

    let routes = rocket::routes![
        http::handle_readiness,
        http::handle_new_block,
        http::handle_new_microblocks,
        http::handle_new_burn_block,
        http::handle_new_mempool_tx,
        http::handle_drop_mempool_tx,
        http::handle_new_attachments,
    ];

    let ctx_cloned = ctx.clone();
    let ignite = rocket::custom(server_config)
        .manage(store)
        .manage(Arc::new(Mutex::new(ingestion_commands_tx)))
        .manage(ctx_cloned)
        .mount("/", routes)
        .ignite()
        .await?;
    let shutdown = ignite.shutdown();

    try_info!(
        ctx,
        "Listening on {}:{} for chain events",
        config.host,
        config.port
    );

    let _ = std::thread::spawn(move || {
        let _ = hiro_system_kit::nestable_block_on(ignite.launch());
    });

    Ok(shutdown)
}
