use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::net::TcpStream;
use tokio_util::codec::{Framed, LinesCodec, LinesCodecError};
use tracing::debug;
use ulid::Ulid;

use crate::engine::{parse_request_date, Engine, EngineError};
use crate::limits::MAX_LINE_LEN;
use crate::model::*;
use crate::observability::{self, REQUESTS_TOTAL, REQUEST_DURATION_SECONDS};

/// One request line.
///
/// ```json
/// {"op":"book","request":{"kind":"group","date":"2025-07-01","party_size":12}}
/// {"op":"set_status","id":"01J...","status":"confirmed"}
/// {"op":"capacity","kind":"event","date":"2025-07-01"}
/// ```
#[derive(Debug, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Command {
    Validate { request: ReservationRequest },
    Book { request: ReservationRequest },
    Get { id: Ulid },
    SetStatus { id: Ulid, status: ReservationStatus },
    Delete { id: Ulid },
    Capacity { kind: ReservationKind, date: String },
}

fn error_kind(err: &EngineError) -> &'static str {
    match err {
        EngineError::Rejected(r) => r.kind(),
        EngineError::ConfigurationMissing(_) => "ConfigurationMissing",
        EngineError::NotFound(_) => "NotFound",
        EngineError::InvalidTransition { .. } => "InvalidTransition",
        EngineError::LimitExceeded(_) => "LimitExceeded",
        EngineError::JournalError(_) => "JournalError",
    }
}

fn error_body(kind: &str, message: impl std::fmt::Display) -> Value {
    json!({ "ok": false, "error": { "kind": kind, "message": message.to_string() } })
}

fn engine_error(err: &EngineError) -> Value {
    let message = match err {
        EngineError::Rejected(r) => r.to_string(),
        other => other.to_string(),
    };
    error_body(error_kind(err), message)
}

async fn execute(engine: &Engine, cmd: Command, now: DateTime<Utc>) -> Result<Value, EngineError> {
    Ok(match cmd {
        Command::Validate { request } => {
            let validated = engine.validate(request, now).await?;
            json!({ "ok": true, "validated": validated })
        }
        Command::Book { request } => {
            let reservation = engine.book(request, now).await?;
            json!({ "ok": true, "reservation": reservation })
        }
        Command::Get { id } => {
            json!({ "ok": true, "reservation": engine.get(id).await? })
        }
        Command::SetStatus { id, status } => {
            json!({ "ok": true, "reservation": engine.set_status(id, status).await? })
        }
        Command::Delete { id } => {
            json!({ "ok": true, "reservation": engine.delete(id).await? })
        }
        Command::Capacity { kind, date } => {
            let date = parse_request_date(&date, engine.timezone())?;
            json!({ "ok": true, "capacity": engine.remaining_capacity(kind, date).await? })
        }
    })
}

/// Handle one request line and build its response. `now` is the reference
/// time for advance-notice checks.
pub async fn handle_line(engine: &Engine, line: &str, now: DateTime<Utc>) -> Value {
    let cmd: Command = match serde_json::from_str(line) {
        Ok(cmd) => cmd,
        Err(e) => {
            metrics::counter!(REQUESTS_TOTAL, "op" => "unknown", "status" => "error").increment(1);
            return error_body("BadRequest", e);
        }
    };

    let op = observability::command_label(&cmd);
    let started = Instant::now();
    let result = execute(engine, cmd, now).await;
    metrics::histogram!(REQUEST_DURATION_SECONDS, "op" => op)
        .record(started.elapsed().as_secs_f64());

    match result {
        Ok(body) => {
            metrics::counter!(REQUESTS_TOTAL, "op" => op, "status" => "ok").increment(1);
            body
        }
        Err(e) => {
            metrics::counter!(REQUESTS_TOTAL, "op" => op, "status" => "error").increment(1);
            if e.is_unavailable() {
                tracing::error!(op, "request failed: {e}");
            }
            engine_error(&e)
        }
    }
}

/// Serve one client until it disconnects.
pub async fn process_connection(
    socket: TcpStream,
    engine: Arc<Engine>,
) -> Result<(), LinesCodecError> {
    let mut framed = Framed::new(socket, LinesCodec::new_with_max_length(MAX_LINE_LEN));
    while let Some(line) = framed.next().await {
        let line = match line {
            Ok(line) => line,
            Err(LinesCodecError::MaxLineLengthExceeded) => {
                let body = error_body("LimitExceeded", "request line too long");
                framed.send(body.to_string()).await?;
                break;
            }
            Err(e) => return Err(e),
        };
        if line.trim().is_empty() {
            continue;
        }
        let response = handle_line(&engine, &line, Utc::now()).await;
        framed.send(response.to_string()).await?;
    }
    debug!("client disconnected");
    Ok(())
}
