//! TCP server: one thread per accepted session, one JSON object per line.

use crate::wire::common::{
    clamp_limit, CommitRequest, CreateTopicRequest, FetchGroupRequest, FetchRequest,
    GroupStatsRequest, ProduceRequest, MAX_REQUEST_BYTES,
};
use crate::{FetchGroupResult, FetchResult, StorageError, Store, MAX_PARTITIONS};
use log::{debug, error, info, warn};
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use std::io::{BufRead, BufReader, Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::Arc;
use std::thread;

/// Bind the listener and serve forever.
pub fn start_server(port: u16, store: Arc<Store>) -> std::io::Result<()> {
    let listener = TcpListener::bind(("0.0.0.0", port))?;
    info!("listening on 0.0.0.0:{port}");
    serve(listener, store)
}

/// Accept loop over an already-bound listener. Each session runs on its own
/// thread and issues synchronous calls into the shared store.
pub fn serve(listener: TcpListener, store: Arc<Store>) -> std::io::Result<()> {
    for stream in listener.incoming() {
        match stream {
            Ok(stream) => {
                let store = Arc::clone(&store);
                thread::spawn(move || handle_session(stream, store));
            }
            Err(e) => warn!("accept failed: {e}"),
        }
    }
    Ok(())
}

fn handle_session(stream: TcpStream, store: Arc<Store>) {
    let peer = stream
        .peer_addr()
        .map(|addr| addr.to_string())
        .unwrap_or_else(|_| "unknown".to_string());
    debug!("session opened: {peer}");

    let mut reader = match stream.try_clone() {
        Ok(clone) => BufReader::new(clone),
        Err(e) => {
            warn!("session {peer}: clone failed: {e}");
            return;
        }
    };
    let mut writer = stream;

    loop {
        let line = match read_request_line(&mut reader) {
            Ok(Some(line)) if !line.is_empty() => line,
            // EOF, an empty line, or an oversize line all end the session.
            _ => break,
        };

        let request: Value = match serde_json::from_str(&line) {
            Ok(request) => request,
            Err(_) => {
                if write_line(&mut writer, &json!({"ok": false, "error": "invalid_json"})).is_err()
                {
                    break;
                }
                continue;
            }
        };

        match dispatch(&store, &request) {
            Ok(response) => {
                if write_line(&mut writer, &response).is_err() {
                    break;
                }
            }
            Err(e) => {
                // Storage failure: elide the response and drop the session.
                error!("session {peer}: {e}");
                break;
            }
        }
    }

    debug!("session closed: {peer}");
}

/// Read one newline-terminated request. Returns `Ok(None)` when the peer
/// closed the connection or the line exceeded `MAX_REQUEST_BYTES`.
fn read_request_line<R: BufRead>(reader: &mut R) -> std::io::Result<Option<String>> {
    let mut buf = Vec::new();
    let n = reader
        .by_ref()
        .take((MAX_REQUEST_BYTES + 2) as u64)
        .read_until(b'\n', &mut buf)?;
    if n == 0 {
        return Ok(None);
    }
    if buf.last() == Some(&b'\n') {
        buf.pop();
    }
    if buf.len() > MAX_REQUEST_BYTES {
        warn!("dropping session: request line over {MAX_REQUEST_BYTES} bytes");
        return Ok(None);
    }
    Ok(Some(String::from_utf8_lossy(&buf).into_owned()))
}

fn write_line(stream: &mut TcpStream, response: &Value) -> std::io::Result<()> {
    let mut line = response.to_string();
    line.push('\n');
    stream.write_all(line.as_bytes())
}

fn bad_request() -> Value {
    json!({"ok": false, "error": "bad_request"})
}

fn parse<T: DeserializeOwned>(request: &Value) -> Option<T> {
    serde_json::from_value(request.clone()).ok()
}

fn dispatch(store: &Store, request: &Value) -> Result<Value, StorageError> {
    let request_type = request.get("type").and_then(Value::as_str).unwrap_or("");
    match request_type {
        "PING" => Ok(json!({"ok": true, "type": "PONG"})),
        "CREATE_TOPIC" => handle_create_topic(store, request),
        "TOPICS" => Ok(json!({"ok": true, "topics": store.list_topics()})),
        "PRODUCE" => handle_produce(store, request),
        "FETCH" => handle_fetch(store, request),
        "COMMIT" => handle_commit(store, request),
        "FETCH_GROUP" => handle_fetch_group(store, request),
        "GROUP_STATS" => handle_group_stats(store, request),
        _ => Ok(json!({"ok": false, "error": "unknown_type", "got": request_type})),
    }
}

fn handle_create_topic(store: &Store, request: &Value) -> Result<Value, StorageError> {
    let Some(req) = parse::<CreateTopicRequest>(request) else {
        return Ok(bad_request());
    };
    if req.topic.is_empty() {
        return Ok(json!({"ok": false, "error": "missing_topic"}));
    }

    let ok = if req.partitions < 1 || req.partitions > i64::from(MAX_PARTITIONS) {
        false
    } else {
        store.create_topic(&req.topic, req.partitions as u32)?
    };
    Ok(json!({"ok": ok, "topic": req.topic, "partitions": req.partitions}))
}

fn handle_produce(store: &Store, request: &Value) -> Result<Value, StorageError> {
    let Some(req) = parse::<ProduceRequest>(request) else {
        return Ok(bad_request());
    };
    if req.topic.is_empty() {
        return Ok(json!({"ok": false, "error": "missing_topic"}));
    }

    let (partition, offset) = store.produce(&req.topic, &req.key, &req.value)?;
    Ok(json!({
        "ok": true,
        "topic": req.topic,
        "partition": partition,
        "offset": offset,
    }))
}

fn handle_fetch(store: &Store, request: &Value) -> Result<Value, StorageError> {
    let Some(req) = parse::<FetchRequest>(request) else {
        return Ok(bad_request());
    };
    if req.topic.is_empty() || req.offset < 0 {
        return Ok(bad_request());
    }

    let limit = clamp_limit(req.limit);
    let batch = match u32::try_from(req.partition) {
        Ok(partition) => store.fetch(&req.topic, partition, req.offset as u64, limit)?,
        // A partition outside u32 can never be in range: empty batch, offset echoed.
        Err(_) => FetchResult {
            records: Vec::new(),
            next_offset: req.offset as u64,
        },
    };

    Ok(json!({
        "ok": true,
        "topic": req.topic,
        "partition": req.partition,
        "next_offset": batch.next_offset,
        "records": batch.records,
    }))
}

fn handle_commit(store: &Store, request: &Value) -> Result<Value, StorageError> {
    let Some(req) = parse::<CommitRequest>(request) else {
        return Ok(bad_request());
    };
    if req.group.is_empty() || req.topic.is_empty() || req.next_offset < 0 {
        return Ok(bad_request());
    }

    let ok = match u32::try_from(req.partition) {
        Ok(partition) => {
            store.commit_offset(&req.group, &req.topic, partition, req.next_offset as u64)?
        }
        Err(_) => false,
    };

    Ok(json!({
        "ok": ok,
        "group": req.group,
        "topic": req.topic,
        "partition": req.partition,
        "committed_next_offset": req.next_offset,
    }))
}

fn handle_fetch_group(store: &Store, request: &Value) -> Result<Value, StorageError> {
    let Some(req) = parse::<FetchGroupRequest>(request) else {
        return Ok(bad_request());
    };
    if req.group.is_empty() || req.topic.is_empty() {
        return Ok(bad_request());
    }

    let limit = clamp_limit(req.limit);
    let result = match u32::try_from(req.partition) {
        Ok(partition) => {
            store.fetch_group(&req.group, &req.topic, partition, limit, req.auto_commit)?
        }
        Err(_) => FetchGroupResult {
            start_offset: 0,
            next_offset: 0,
            auto_commit: req.auto_commit,
            commit_ok: !req.auto_commit,
            committed_offset_after: 0,
            records: Vec::new(),
        },
    };

    Ok(json!({
        "ok": true,
        "group": req.group,
        "topic": req.topic,
        "partition": req.partition,
        "start_offset": result.start_offset,
        "next_offset": result.next_offset,
        "auto_commit": result.auto_commit,
        "commit_ok": result.commit_ok,
        "committed_offset_after": result.committed_offset_after,
        "records": result.records,
    }))
}

fn handle_group_stats(store: &Store, request: &Value) -> Result<Value, StorageError> {
    let Some(req) = parse::<GroupStatsRequest>(request) else {
        return Ok(bad_request());
    };
    if req.group.is_empty() {
        return Ok(json!({"ok": false, "error": "missing_group"}));
    }

    Ok(json!({"ok": true, "stats": store.group_stats(&req.group)}))
}
