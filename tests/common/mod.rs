//! Scripted stand-in for the master used by integration tests.

#![allow(dead_code)]

use fleetctl::FleetConfig;
use parking_lot::Mutex;
use serde_json::{Value, json};
use std::io::{BufRead, BufReader, Write};
use std::net::TcpListener;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use uuid::Uuid;

/// Accepts one connection and answers every correlated request.
pub struct FakeMaster {
    port: u16,
    requests: Arc<Mutex<Vec<Value>>>,
    handle: JoinHandle<()>,
}

impl FakeMaster {
    /// Serve `liveactivity.list` from `snapshot`; every other request succeeds.
    pub fn start(snapshot: Vec<Value>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
        let port = listener.local_addr().expect("local addr").port();
        let requests = Arc::new(Mutex::new(Vec::new()));
        let log = requests.clone();

        let handle = thread::spawn(move || {
            let (stream, _) = match listener.accept() {
                Ok(conn) => conn,
                Err(_) => return,
            };
            let mut writer = stream.try_clone().expect("clone stream");
            let reader = BufReader::new(stream);
            for line in reader.lines() {
                let Ok(line) = line else { break };
                let frame: Value = serde_json::from_str(&line).expect("frame json");
                log.lock().push(frame.clone());

                let request_id = frame["requestId"].as_str().unwrap_or_default();
                if request_id.is_empty() {
                    continue;
                }
                let result = match frame["type"].as_str() {
                    Some("liveactivity.list") => json!({"status": "success", "data": snapshot}),
                    _ => json!({"status": "success"}),
                };
                let reply = json!({"requestId": request_id, "result": result});
                if writeln!(writer, "{reply}").is_err() {
                    break;
                }
            }
        });

        Self {
            port,
            requests,
            handle,
        }
    }

    /// Configuration pointing at this master with no settle delay.
    pub fn config(&self) -> FleetConfig {
        FleetConfig {
            host: "127.0.0.1".to_string(),
            port: self.port,
            settle_delay_ms: 0,
            ..FleetConfig::default()
        }
    }

    /// Wait for the client to disconnect and return every frame received.
    pub fn finish(self) -> Vec<Value> {
        self.handle.join().expect("fake master thread");
        let requests = self.requests.lock().clone();
        requests
    }
}

/// Build a live-activity record as the master reports it.
pub fn live_activity(id: &str, name: &str, activity: &str, state: &str) -> Value {
    json!({
        "id": id,
        "uuid": Uuid::new_v4().to_string(),
        "name": name,
        "activityName": activity,
        "activityVersion": "1.0.0",
        "controller": "C1",
        "runtimeState": state,
    })
}

/// Mark a live-activity record as older than the master's copy.
pub fn out_of_date(mut record: Value) -> Value {
    record["outOfDate"] = json!(true);
    record
}

/// Frames of one operation type.
pub fn of_type<'a>(frames: &'a [Value], kind: &str) -> Vec<&'a Value> {
    frames.iter().filter(|f| f["type"] == kind).collect()
}

/// Operation types in the order they were sent.
pub fn types(frames: &[Value]) -> Vec<String> {
    frames
        .iter()
        .filter_map(|f| f["type"].as_str().map(String::from))
        .collect()
}
