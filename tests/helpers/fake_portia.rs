//! In-memory Portia server speaking the line protocol over loopback TCP.
//!
//! Keeps one annotation record per MSISDN. `resolve` answers with the
//! `observed-network` annotation, or `null` when the number was never seen.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use serde_json::{Map, Value, json};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

#[derive(Default)]
struct State {
    store: Mutex<HashMap<String, Map<String, Value>>>,
    received: Mutex<Vec<Value>>,
    /// When set, requests are recorded but never answered.
    mute: AtomicBool,
    /// Cancelled to drop every open connection; replaced afterwards.
    disconnect: Mutex<CancellationToken>,
}

pub struct FakePortia {
    address: SocketAddr,
    state: Arc<State>,
    request_count: watch::Receiver<usize>,
    shutdown: CancellationToken,
}

impl FakePortia {
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap();
        let state = Arc::new(State::default());
        let (count_tx, request_count) = watch::channel(0);
        let count_tx = Arc::new(count_tx);
        let shutdown = CancellationToken::new();

        let accept_state = Arc::clone(&state);
        let accept_shutdown = shutdown.clone();
        tokio::spawn(async move {
            loop {
                let stream = tokio::select! {
                    _ = accept_shutdown.cancelled() => break,
                    accepted = listener.accept() => match accepted {
                        Ok((stream, _)) => stream,
                        Err(_) => break,
                    },
                };
                let disconnect = accept_state.disconnect.lock().unwrap().clone();
                tokio::spawn(serve_connection(
                    stream,
                    Arc::clone(&accept_state),
                    Arc::clone(&count_tx),
                    disconnect,
                ));
            }
        });

        Self {
            address,
            state,
            request_count,
            shutdown,
        }
    }

    pub fn address(&self) -> String {
        self.address.to_string()
    }

    pub fn set_mute(&self, mute: bool) {
        self.state.mute.store(mute, Ordering::SeqCst);
    }

    /// Drop every open connection. New connections are still accepted.
    pub fn disconnect_all(&self) {
        let mut token = self.state.disconnect.lock().unwrap();
        token.cancel();
        *token = CancellationToken::new();
    }

    /// Pre-populate an annotation.
    pub fn annotate(&self, msisdn: &str, key: &str, value: &str) {
        self.state
            .store
            .lock()
            .unwrap()
            .entry(msisdn.to_owned())
            .or_default()
            .insert(key.to_owned(), json!(value));
    }

    pub fn annotations(&self, msisdn: &str) -> Map<String, Value> {
        self.state
            .store
            .lock()
            .unwrap()
            .get(msisdn)
            .cloned()
            .unwrap_or_default()
    }

    pub fn received(&self) -> Vec<Value> {
        self.state.received.lock().unwrap().clone()
    }

    /// Wait until at least `count` requests arrived.
    pub async fn wait_for_requests(&self, count: usize) {
        let mut request_count = self.request_count.clone();
        request_count
            .wait_for(|received| *received >= count)
            .await
            .unwrap();
    }
}

impl Drop for FakePortia {
    fn drop(&mut self) {
        self.shutdown.cancel();
        self.disconnect_all();
    }
}

async fn serve_connection(
    stream: TcpStream,
    state: Arc<State>,
    count: Arc<watch::Sender<usize>>,
    disconnect: CancellationToken,
) {
    let (read, mut write) = stream.into_split();
    let mut lines = BufReader::new(read).lines();

    loop {
        let line = tokio::select! {
            _ = disconnect.cancelled() => return,
            line = lines.next_line() => match line {
                Ok(Some(line)) => line,
                _ => return,
            },
        };

        let request: Value = match serde_json::from_str(&line) {
            Ok(request) => request,
            Err(_) => continue,
        };
        state.received.lock().unwrap().push(request.clone());
        count.send_modify(|received| *received += 1);

        if state.mute.load(Ordering::SeqCst) {
            continue;
        }

        let mut reply = handle(&state, &request).to_string();
        reply.push('\n');
        if write.write_all(reply.as_bytes()).await.is_err() {
            return;
        }
    }
}

fn handle(state: &State, request: &Value) -> Value {
    let cmd = request["cmd"].as_str().unwrap_or_default();
    let params = &request["request"];
    let msisdn = params["msisdn"].as_str().unwrap_or_default().to_owned();
    let mut store = state.store.lock().unwrap();

    let response = match cmd {
        "get" => Value::Object(store.get(&msisdn).cloned().unwrap_or_default()),
        "annotate" => {
            let key = params["key"].as_str().unwrap_or_default().to_owned();
            let record = store.entry(msisdn).or_default();
            record.insert(format!("{key}-timestamp"), params["timestamp"].clone());
            record.insert(key, params["value"].clone());
            json!(true)
        }
        "resolve" => {
            let entry = store.get(&msisdn).cloned().unwrap_or_default();
            json!({
                "network": entry.get("observed-network").cloned().unwrap_or(Value::Null),
                "entry": entry,
                "strategy": "observed-network",
            })
        }
        other => {
            return json!({
                "status": "error",
                "reference_id": request["id"],
                "reference_cmd": other,
                "message": format!("Unsupported command: {other}"),
            });
        }
    };

    json!({
        "status": "ok",
        "reference_id": request["id"],
        "reference_cmd": cmd,
        "response": response,
    })
}
