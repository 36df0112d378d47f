#![forbid(unsafe_code)]
#![cfg_attr(docsrs, feature(doc_cfg))]
#![doc = include_str!("../README.md")]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use futures::future::BoxFuture;
use serde_json::Value;

mod key;

pub use key::{hydration_key, HydrationKey};

pub use fetchlane_core::{Error, Result};

/// Tracing target for hydration operations.
pub const TRACING_TARGET: &str = "fetchlane_hydrate";

/// The well-known property the payload assigns on the client global.
pub const PAYLOAD_PROPERTY: &str = "__FETCHLANE_HYDRATION__";

/// Which half of the server/client handoff this process is running.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "snake_case")]
pub enum Phase {
    /// The server-evaluation pass: loads are registered and executed in
    /// bulk, then published as hydration records.
    Server,
    /// The client phase (default): records are consumed instead of
    /// re-fetched.
    Client,
}

static SERVER_PHASE: AtomicBool = AtomicBool::new(false);

/// Switches the process phase.
///
/// Called once before a server render, and not at all on the client.
pub fn set_phase(phase: Phase) {
    tracing::debug!(target: TRACING_TARGET, phase = %phase, "Hydration phase set");
    SERVER_PHASE.store(phase == Phase::Server, Ordering::SeqCst);
}

/// Returns the current process phase.
pub fn phase() -> Phase {
    if SERVER_PHASE.load(Ordering::SeqCst) {
        Phase::Server
    } else {
        Phase::Client
    }
}

static TABLE: Mutex<Option<HashMap<HydrationKey, Value>>> = Mutex::new(None);

fn with_table<T>(f: impl FnOnce(&mut HashMap<HydrationKey, Value>) -> T) -> T {
    let mut guard = TABLE.lock().unwrap();
    f(guard.get_or_insert_with(HashMap::new))
}

/// Stores a record in the process-wide table, replacing any previous value
/// under the same key.
pub fn publish(key: HydrationKey, value: Value) {
    tracing::debug!(target: TRACING_TARGET, key = %key, "Hydration record published");
    with_table(|table| {
        table.insert(key, value);
    });
}

/// Removes and returns the record for `key`.
///
/// A record is a single-use handoff, not a cache: the first successful read
/// deletes it, and a second read for the same key finds nothing.
pub fn consume(key: &HydrationKey) -> Option<Value> {
    let value = with_table(|table| table.remove(key));
    if value.is_some() {
        tracing::debug!(target: TRACING_TARGET, key = %key, "Hydration record consumed");
    }
    value
}

/// Returns how many records are currently held.
pub fn len() -> usize {
    with_table(|table| table.len())
}

/// Drops every record. Part of the explicit lifecycle between renders.
pub fn clear() {
    with_table(|table| table.clear());
}

/// Serializes the table into the script tag delivered with a server-rendered
/// page.
pub fn render_payload() -> String {
    let json = with_table(|table| serde_json::to_string(table).unwrap_or_else(|_| "{}".into()));
    format!("<script>window.{PAYLOAD_PROPERTY}={json}</script>")
}

/// Installs a payload mapping into the client-side table.
///
/// `json` is the serialized mapping the server embedded (the value assigned
/// to [`PAYLOAD_PROPERTY`]). Returns how many records were installed.
///
/// # Errors
///
/// Returns a serialization error when the payload is not a valid mapping.
pub fn install_payload(json: &str) -> Result<usize> {
    let records: HashMap<HydrationKey, Value> = serde_json::from_str(json).map_err(Error::from)?;
    let installed = records.len();
    tracing::debug!(target: TRACING_TARGET, records = installed, "Hydration payload installed");
    with_table(|table| table.extend(records));
    Ok(installed)
}

static SERVER_PASS: Mutex<Vec<BoxFuture<'static, ()>>> = Mutex::new(Vec::new());

/// Registers a load to run during the server-evaluation pass.
///
/// Called by slots while the process is in the server phase; the load runs
/// when [`run_server_pass`] drains the registry.
pub fn register_server_load(load: BoxFuture<'static, ()>) {
    SERVER_PASS.lock().unwrap().push(load);
}

/// Runs every registered load to completion and returns how many ran.
///
/// Loads registered while the pass is running (by loads that trigger further
/// loads) are drained in follow-up rounds until the registry is empty.
pub async fn run_server_pass() -> usize {
    let mut ran = 0;
    loop {
        let batch: Vec<_> = std::mem::take(&mut *SERVER_PASS.lock().unwrap());
        if batch.is_empty() {
            break;
        }
        ran += batch.len();
        futures::future::join_all(batch).await;
    }
    tracing::debug!(target: TRACING_TARGET, loads = ran, "Server-evaluation pass completed");
    ran
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Arc;

    #[test]
    fn test_consume_is_one_shot() {
        let key = hydration_key("one-shot-test", &json!([7]));
        publish(key.clone(), json!({"items": [1, 2]}));

        assert_eq!(consume(&key), Some(json!({"items": [1, 2]})));
        assert_eq!(consume(&key), None, "second read must find nothing");
    }

    #[test]
    fn test_payload_round_trip() {
        let key = hydration_key("payload-test", &json!([1]));
        publish(key.clone(), json!(["server", "data"]));

        let payload = render_payload();
        assert!(payload.starts_with(&format!("<script>window.{PAYLOAD_PROPERTY}=")));
        assert!(payload.ends_with("</script>"));

        // The client installs exactly what sits between the assignment and
        // the closing tag.
        let json = payload
            .strip_prefix(&format!("<script>window.{PAYLOAD_PROPERTY}="))
            .unwrap()
            .strip_suffix("</script>")
            .unwrap();

        consume(&key);
        assert!(install_payload(json).unwrap() >= 1);
        assert_eq!(consume(&key), Some(json!(["server", "data"])));
    }

    #[test]
    fn test_install_rejects_malformed_payload() {
        let err = install_payload("not json").unwrap_err();
        assert_eq!(err.kind(), fetchlane_core::ErrorKind::Serialization);
    }

    #[tokio::test]
    async fn test_server_pass_drains_registered_loads() {
        let ran = Arc::new(AtomicUsize::new(0));
        for _ in 0..3 {
            let ran = ran.clone();
            register_server_load(Box::pin(async move {
                ran.fetch_add(1, Ordering::SeqCst);
            }));
        }

        assert_eq!(run_server_pass().await, 3);
        assert_eq!(ran.load(Ordering::SeqCst), 3);

        // The registry is empty afterwards.
        assert_eq!(run_server_pass().await, 0);
    }
}
