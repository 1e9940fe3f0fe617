use std::path::PathBuf;
use std::process;
use std::str::FromStr;
use std::sync::mpsc::channel;
use std::sync::Arc;

use clap::{Parser, Subcommand};

use crate::config::{self, Config};
use crate::observer::{self, EventServerConfig, IngestionCommand};
use crate::store::memory::MemoryStore;
use crate::store::StoreHandle;
use crate::tsv::{self, ReplayMode};
use crate::utils::Context;
use crate::{try_error, try_info};

#[derive(Parser, Debug)]
#[clap(author, version, about, long_about = None)]
struct Opts {
    #[clap(subcommand)]
    command: Command,
}

#[derive(Subcommand, PartialEq, Clone, Debug)]
enum Command {
    /// Start the event ingestion service
    #[clap(name = "service", bin_name = "service")]
    Service(ServiceArgs),
    /// Export the raw event log to a TSV file
    #[clap(name = "export-events", bin_name = "export-events")]
    ExportEvents(ExportEventsArgs),
    /// Replay an exported TSV event log into a fresh store
    #[clap(name = "replay-events", bin_name = "replay-events")]
    ReplayEvents(ReplayEventsArgs),
}

#[derive(Parser, PartialEq, Clone, Debug)]
struct ServiceArgs {
    /// On shutdown, export the raw event log to this TSV file
    #[clap(long = "events-export-file")]
    pub events_export_file: Option<String>,
}

#[derive(Parser, PartialEq, Clone, Debug)]
struct ExportEventsArgs {
    /// Target file path
    #[clap(long = "file")]
    pub file: String,
    /// Replace the target file if it exists
    #[clap(long = "overwrite")]
    pub overwrite: bool,
}

#[derive(Parser, PartialEq, Clone, Debug)]
struct ReplayEventsArgs {
    /// Source file path
    #[clap(long = "file")]
    pub file: String,
    /// Retention mode: archival or pruned
    #[clap(long = "mode", default_value = "archival")]
    pub mode: String,
    /// Replay even if the target store is not empty
    #[clap(long = "force")]
    pub force: bool,
}

pub fn main() {
    let logger = hiro_system_kit::log::setup_logger();
    let _guard = hiro_system_kit::log::setup_global_logger(logger.clone());
    let ctx = Context {
        logger: Some(logger),
        tracer: false,
    };

    let opts: Opts = match Opts::try_parse() {
        Ok(opts) => opts,
        Err(e) => {
            println!("{}", e);
            process::exit(1);
        }
    };

    match opts.command {
        Command::Service(args) => {
            let config = load_config_or_exit(&ctx);
            if let Err(e) = config::check_chain_id(&config, &ctx) {
                try_error!(ctx, "{}", e);
                process::exit(1);
            }
            start_service(config, args, ctx);
        }
        Command::ExportEvents(args) => {
            let store: StoreHandle = Arc::new(MemoryStore::new());
            let file_path = PathBuf::from(&args.file);
            match tsv::export_raw_events(store.as_ref(), &file_path, args.overwrite, &ctx) {
                Ok(exported) => {
                    try_info!(ctx, "Export complete: {} records", exported);
                }
                Err(e) => {
                    try_error!(ctx, "{}", e);
                    process::exit(1);
                }
            }
        }
        Command::ReplayEvents(args) => {
            let config = load_config_or_exit(&ctx);
            let mode = match ReplayMode::from_str(&args.mode) {
                Ok(mode) => mode,
                Err(e) => {
                    try_error!(ctx, "{}", e);
                    process::exit(1);
                }
            };
            // Replay always opens a blank store: wipe semantics by
            // construction for the in-memory backend.
            let store: StoreHandle = Arc::new(MemoryStore::new());
            let file_path = PathBuf::from(&args.file);
            match tsv::replay_raw_events(
                store,
                config.event_port,
                &file_path,
                mode,
                args.force,
                &ctx,
            ) {
                Ok(replayed) => {
                    try_info!(ctx, "Replay complete: {} records", replayed);
                }
                Err(e) => {
                    try_error!(ctx, "{}", e);
                    process::exit(1);
                }
            }
        }
    }
}

fn load_config_or_exit(ctx: &Context) -> Config {
    match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            try_error!(ctx, "{}", e);
            process::exit(1);
        }
    }
}

fn start_service(config: Config, args: ServiceArgs, ctx: Context) {
    if !config.mode.ingests_events() {
        try_info!(
            ctx,
            "Event ingestion disabled in {:?} mode; nothing to run",
            config.mode
        );
        return;
    }

    let store: StoreHandle = Arc::new(MemoryStore::new());
    let (commands_tx, commands_rx) = channel();

    let runloop_handle =
        match observer::start_ingestion_runloop(store.clone(), commands_rx, ctx.clone()) {
            Ok(handle) => handle,
            Err(e) => {
                try_error!(ctx, "unable to spawn ingestion runloop: {}", e);
                process::exit(1);
            }
        };

    let server_config = EventServerConfig {
        host: config.event_host.clone(),
        port: config.event_port,
        display_logs: true,
    };
    let shutdown = match hiro_system_kit::nestable_block_on(observer::start_event_server(
        server_config,
        store.clone(),
        commands_tx.clone(),
        ctx.clone(),
    )) {
        Ok(shutdown) => shutdown,
        Err(e) => {
            try_error!(ctx, "unable to start event endpoint: {}", e);
            process::exit(1);
        }
    };

    let terminate_tx = commands_tx.clone();
    let ctrlc_ctx = ctx.clone();
    if let Err(e) = ctrlc::set_handler(move || {
        try_info!(ctrlc_ctx, "Shutdown requested, draining ingestion queue");
        let _ = terminate_tx.send(IngestionCommand::Terminate);
    }) {
        try_error!(ctx, "unable to install shutdown handler: {}", e);
        process::exit(1);
    }

    let _ = runloop_handle.join();
    shutdown.notify();

    if let Some(export_path) = args.events_export_file {
        let file_path = PathBuf::from(export_path);
        match tsv::export_raw_events(store.as_ref(), &file_path, true, &ctx) {
            Ok(exported) => {
                try_info!(ctx, "Raw event log preserved: {} records", exported);
            }
            Err(e) => {
                try_error!(ctx, "unable to preserve raw event log: {}", e);
            }
        }
    }
}
