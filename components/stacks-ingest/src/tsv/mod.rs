//! Bit-exact export and replay of the raw event sequence: the disaster
//! recovery and reindex path.

use std::fs::File;
use std::io::Write;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::mpsc::channel;

use stacks_ingest_types::RawEventRecord;

use crate::observer::{start_event_server, EventServerConfig, IngestionCommand};
use crate::store::{IngestionStore, StoreHandle};
use crate::try_info;
use crate::utils::Context;

/// First line of every export; versions the column layout.
pub const TSV_HEADER: &str = "# stacks-event-replay v1";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplayMode {
    /// Retain everything, raw event rows included.
    Archival,
    /// Drop the raw event rows once the replay has been applied.
    Pruned,
}

impl FromStr for ReplayMode {
    type Err = String;

    fn from_str(value: &str) -> Result<ReplayMode, String> {
        match value {
            "archival" => Ok(ReplayMode::Archival),
            "pruned" => Ok(ReplayMode::Pruned),
            _ => Err(format!("unsupported replay mode {}", value)),
        }
    }
}

/// Stream every raw record, ascending by `seq`, to
/// `seq \t path \t payload` rows. Payloads are compact single-line JSON,
/// so the three columns never collide with the delimiter.
pub fn export_raw_events(
    store: &dyn IngestionStore,
    file_path: &PathBuf,
    overwrite: bool,
    ctx: &Context,
) -> Result<u64, String> {
    if file_path.exists() && !overwrite {
        return Err(format!(
            "file {} exists; pass --overwrite to replace it",
            file_path.display()
        ));
    }

    let mut file = File::create(file_path)
        .map_err(|e| format!("unable to create {}: {}", file_path.display(), e))?;
    writeln!(file, "{}", TSV_HEADER)
        .map_err(|e| format!("unable to write {}: {}", file_path.display(), e))?;

    let mut writer = csv::WriterBuilder::default()
        .has_headers(false)
        .delimiter(b'\t')
        .quote_style(csv::QuoteStyle::Never)
        .from_writer(file);

    let records = store.raw_event_requests().map_err(|e| e.to_string())?;
    for record in records.iter() {
        writer
            .write_record([
                record.seq.to_string().as_str(),
                record.path.as_str(),
                record.payload.as_str(),
            ])
            .map_err(|e| format!("unable to serialize record {}: {}", record.seq, e))?;
    }
    writer
        .flush()
        .map_err(|e| format!("unable to flush {}: {}", file_path.display(), e))?;

    try_info!(
        ctx,
        "Exported {} raw events to {}",
        records.len(),
        file_path.display()
    );
    Ok(records.len() as u64)
}

/// Load an exported file back into `(seq, path, payload)` records,
/// verifying the sequence is ascending.
pub fn read_replay_file(file_path: &PathBuf) -> Result<Vec<RawEventRecord>, String> {
    let mut reader = csv::ReaderBuilder::default()
        .has_headers(false)
        .delimiter(b'\t')
        .comment(Some(b'#'))
        .quoting(false)
        .buffer_capacity(8 * (1 << 10))
        .from_path(file_path)
        .map_err(|e| format!("unable to open {}: {}", file_path.display(), e))?;

    let mut records: Vec<RawEventRecord> = vec![];
    for result in reader.deserialize() {
        let record: RawEventRecord =
            result.map_err(|e| format!("malformed replay file {}: {}", file_path.display(), e))?;
        if let Some(previous) = records.last() {
            if record.seq <= previous.seq {
                return Err(format!(
                    "replay file {} is out of order at seq {}",
                    file_path.display(),
                    record.seq
                ));
            }
        }
        records.push(record);
    }
    Ok(records)
}

/// Re-post every recorded request, in order, against a fresh store: start
/// the event endpoint on a loopback port and drive it exactly the way the
/// node would have.
pub fn replay_raw_events(
    store: StoreHandle,
    port: u16,
    file_path: &PathBuf,
    mode: ReplayMode,
    force: bool,
    ctx: &Context,
) -> Result<u64, String> {
    if store.has_ingested_data() && !force {
        return Err(
            "target store already contains ingested data; pass --force to replay anyway"
                .to_string(),
        );
    }

    let records = read_replay_file(file_path)?;

    let (commands_tx, commands_rx) = channel();
    let runloop_handle =
        crate::observer::start_ingestion_runloop(store.clone(), commands_rx, ctx.clone())
            .map_err(|e| format!("unable to spawn ingestion runloop: {}", e))?;
    let server_config = EventServerConfig::localhost(port);
    let shutdown = hiro_system_kit::nestable_block_on(start_event_server(
        server_config,
        store.clone(),
        commands_tx.clone(),
        ctx.clone(),
    ))
    .map_err(|e| format!("unable to start event endpoint: {}", e))?;

    let client = reqwest::blocking::Client::builder()
        .timeout(None)
        .build()
        .map_err(|e| format!("unable to build http client: {}", e))?;
    let base_url = format!("http://127.0.0.1:{}", port);

    let mut replayed: u64 = 0;
    let outcome = (|| {
        for record in records.iter() {
            let response = client
                .post(format!("{}{}", base_url, record.path))
                .header("Content-Type", "application/json")
                .body(record.payload.clone())
                .send()
                .map_err(|e| format!("replay aborted at seq {}: {}", record.seq, e))?;
            if !response.status().is_success() {
                return Err(format!(
                    "replay aborted at seq {}: endpoint returned {}",
                    record.seq,
                    response.status()
                ));
            }
            replayed += 1;
        }
        Ok(())
    })();

    let _ = commands_tx.send(IngestionCommand::Terminate);
    shutdown.notify();
    let _ = runloop_handle.join();
    outcome?;

    if mode == ReplayMode::Pruned {
        store.prune_raw_event_requests().map_err(|e| e.to_string())?;
    }

    try_info!(ctx, "Replayed {} raw events", replayed);
    Ok(replayed)
}
