use std::sync::mpsc::{channel, Sender};
use std::sync::{Arc, Mutex};

use rocket::http::Status;
use rocket::response::status::Custom;
use rocket::serde::json::{json, Json, Value as JsonValue};
use rocket::State;

use super::IngestionCommand;
use crate::ingestion::messages::EventKind;
use crate::store::{IngestionStore, StoreHandle};
use crate::utils::Context;
use crate::{try_debug, try_error, try_info};

fn success_response() -> Result<Json<JsonValue>, Custom<Json<JsonValue>>> {
    Ok(Json(json!({
        "result": "ok",
    })))
}

fn error_response(
    message: String,
    ctx: &State<Context>,
) -> Result<Json<JsonValue>, Custom<Json<JsonValue>>> {
    try_error!(ctx, "{message}");
    Err(Custom(
        Status::InternalServerError,
        Json(json!({
            "error": message,
        })),
    ))
}

/// Persist the verbatim request, then hand it to the serialization queue
/// and block until the single writer has committed or rejected it. The
/// node interprets a 500 as "try again later", which is exactly the
/// back-pressure this endpoint needs.
fn record_and_submit(
    kind: EventKind,
    payload: JsonValue,
    store: &State<StoreHandle>,
    ingestion_commands_tx: &State<Arc<Mutex<Sender<IngestionCommand>>>>,
    ctx: &State<Context>,
) -> Result<Json<JsonValue>, Custom<Json<JsonValue>>> {
    if let Err(e) = store.store_raw_event_request(kind.path(), &payload) {
        return error_response(format!("unable to record raw event: {}", e), ctx);
    }

    let (reply_tx, reply_rx) = channel();
    let command = IngestionCommand::ProcessEvent {
        kind,
        payload,
        reply: reply_tx,
    };
    match ingestion_commands_tx.lock() {
        Ok(tx) => {
            if let Err(e) = tx.send(command) {
                return error_response(format!("unable to reach ingestion loop: {}", e), ctx);
            }
        }
        Err(e) => {
            return error_response(format!("unable to acquire ingestion_commands_tx: {}", e), ctx);
        }
    }

    match reply_rx.recv() {
        Ok(Ok(())) => success_response(),
        Ok(Err(e)) => error_response(e, ctx),
        Err(e) => error_response(format!("ingestion loop disconnected: {}", e), ctx),
    }
}

#[rocket::get("/")]
pub fn handle_readiness(ctx: &State<Context>) -> Json<JsonValue> {
    try_debug!(ctx, "GET /");
    Json(json!({
        "status": "ready",
        "msg": "ingestion engine accepting node events",
    }))
}

#[rocket::post("/new_block", format = "application/json", data = "<marshalled_block>")]
pub fn handle_new_block(
    store: &State<StoreHandle>,
    ingestion_commands_tx: &State<Arc<Mutex<Sender<IngestionCommand>>>>,
    marshalled_block: Json<JsonValue>,
    ctx: &State<Context>,
) -> Result<Json<JsonValue>, Custom<Json<JsonValue>>> {
    try_info!(ctx, "POST /new_block");
    record_and_submit(
        EventKind::BlockReceived,
        marshalled_block.into_inner(),
        store,
        ingestion_commands_tx,
        ctx,
    )
}

#[rocket::post(
    "/new_microblocks",
    format = "application/json",
    data = "<marshalled_microblock>"
)]
pub fn handle_new_microblocks(
    store: &State<StoreHandle>,
    ingestion_commands_tx: &State<Arc<Mutex<Sender<IngestionCommand>>>>,
    marshalled_microblock: Json<JsonValue>,
    ctx: &State<Context>,
) -> Result<Json<JsonValue>, Custom<Json<JsonValue>>> {
    try_info!(ctx, "POST /new_microblocks");
    record_and_submit(
        EventKind::MicroblocksReceived,
        marshalled_microblock.into_inner(),
        store,
        ingestion_commands_tx,
        ctx,
    )
}

#[rocket::post("/new_burn_block", format = "application/json", data = "<burn_block>")]
pub fn handle_new_burn_block(
    store: &State<StoreHandle>,
    ingestion_commands_tx: &State<Arc<Mutex<Sender<IngestionCommand>>>>,
    burn_block: Json<JsonValue>,
    ctx: &State<Context>,
) -> Result<Json<JsonValue>, Custom<Json<JsonValue>>> {
    try_info!(ctx, "POST /new_burn_block");
    record_and_submit(
        EventKind::BurnBlockReceived,
        burn_block.into_inner(),
        store,
        ingestion_commands_tx,
        ctx,
    )
}

#[rocket::post("/new_mempool_tx", format = "application/json", data = "<raw_txs>")]
pub fn handle_new_mempool_tx(
    store: &State<StoreHandle>,
    ingestion_commands_tx: &State<Arc<Mutex<Sender<IngestionCommand>>>>,
    raw_txs: Json<JsonValue>,
    ctx: &State<Context>,
) -> Result<Json<JsonValue>, Custom<Json<JsonValue>>> {
    try_info!(ctx, "POST /new_mempool_tx");
    record_and_submit(
        EventKind::MempoolTxsReceived,
        raw_txs.into_inner(),
        store,
        ingestion_commands_tx,
        ctx,
    )
}

#[rocket::post("/drop_mempool_tx", format = "application/json", data = "<payload>")]
pub fn handle_drop_mempool_tx(
    store: &State<StoreHandle>,
    ingestion_commands_tx: &State<Arc<Mutex<Sender<IngestionCommand>>>>,
    payload: Json<JsonValue>,
    ctx: &State<Context>,
) -> Result<Json<JsonValue>, Custom<Json<JsonValue>>> {
    try_info!(ctx, "POST /drop_mempool_tx");
    record_and_submit(
        EventKind::MempoolTxsDropped,
        payload.into_inner(),
        store,
        ingestion_commands_tx,
        ctx,
    )
}

#[rocket::post("/attachments/new", format = "application/json", data = "<payload>")]
pub fn handle_new_attachments(
    store: &State<StoreHandle>,
    ingestion_commands_tx: &State<Arc<Mutex<Sender<IngestionCommand>>>>,
    payload: Json<JsonValue>,
    ctx: &State<Context>,
) -> Result<Json<JsonValue>, Custom<Json<JsonValue>>> {
    try_info!(ctx, "POST /attachments/new");
    record_and_submit(
        EventKind::AttachmentsReceived,
        payload.into_inner(),
        store,
        ingestion_commands_tx,
        ctx,
    )
}
