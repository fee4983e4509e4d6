//! Duplex channel to the master with request/response correlation.
//!
//! One background receiver thread reads newline-delimited JSON frames and
//! files each result under its `requestId`. Callers park on a shared condition
//! variable until their own id shows up or the channel closes. A closed
//! channel wakes every waiter so nobody blocks past the end of the connection.
//!
//! Frames on the wire:
//!   * outbound: `{"requestId": "<id or empty>", "type": "...", "data": {...}}`
//!   * inbound:  `{"requestId": "<id>", "result": {...}}`
//!
//! An empty outbound `requestId` means no response is expected. Results are
//! only kept for ids that still have a caller waiting on them.

use super::error::{ChannelError, ChannelResult};
use parking_lot::{Condvar, Mutex};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::net::{Shutdown, TcpStream};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct OutboundEnvelope<'a> {
    request_id: &'a str,
    #[serde(rename = "type")]
    kind: &'a str,
    data: &'a Value,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct InboundEnvelope {
    #[serde(default)]
    request_id: Option<String>,
    #[serde(default)]
    result: Value,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Phase {
    Connecting,
    Open,
    Failed(String),
    Closed,
}

struct ChannelState {
    phase: Phase,
    responses: HashMap<String, Value>,
    pending: HashSet<String>,
    closing: bool,
}

struct Shared {
    state: Mutex<ChannelState>,
    signal: Condvar,
    writer: Mutex<Option<BufWriter<TcpStream>>>,
    stream: Mutex<Option<TcpStream>>,
}

/// Persistent connection to the master.
///
/// `send` and `wait_for_response` take `&self`, so several threads may have
/// requests outstanding at once; each one receives only its own response.
pub struct Channel {
    shared: Arc<Shared>,
    next_request_id: AtomicU64,
    response_timeout: Option<Duration>,
    receiver: Mutex<Option<JoinHandle<()>>>,
}

impl Channel {
    /// Open the channel and block until the transport reports it is open.
    pub fn connect(addr: &str, response_timeout: Option<Duration>) -> ChannelResult<Self> {
        let shared = Arc::new(Shared {
            state: Mutex::new(ChannelState {
                phase: Phase::Connecting,
                responses: HashMap::new(),
                pending: HashSet::new(),
                closing: false,
            }),
            signal: Condvar::new(),
            writer: Mutex::new(None),
            stream: Mutex::new(None),
        });

        let receiver_shared = shared.clone();
        let target = addr.to_string();
        let handle = thread::Builder::new()
            .name("fleet-receiver".into())
            .spawn(move || receive(receiver_shared, target))?;

        let channel = Channel {
            shared,
            next_request_id: AtomicU64::new(1),
            response_timeout,
            receiver: Mutex::new(Some(handle)),
        };

        let mut state = channel.shared.state.lock();
        while state.phase == Phase::Connecting {
            channel.shared.signal.wait(&mut state);
        }
        let phase = state.phase.clone();
        drop(state);

        match phase {
            Phase::Open => {
                debug!(addr, "channel open");
                Ok(channel)
            }
            Phase::Failed(detail) => {
                channel.join_receiver();
                Err(ChannelError::OpenFailed {
                    addr: addr.to_string(),
                    detail,
                })
            }
            _ => Err(ChannelError::NotOpen),
        }
    }

    /// Whether the channel is currently open.
    pub fn is_open(&self) -> bool {
        self.shared.state.lock().phase == Phase::Open
    }

    /// Send a frame. Returns the correlation id, empty when no response is expected.
    pub fn send(&self, kind: &str, data: Value, expect_response: bool) -> ChannelResult<String> {
        if !self.is_open() {
            return Err(ChannelError::NotOpen);
        }

        let request_id = if expect_response {
            self.next_request_id
                .fetch_add(1, Ordering::SeqCst)
                .to_string()
        } else {
            String::new()
        };

        let envelope = OutboundEnvelope {
            request_id: &request_id,
            kind,
            data: &data,
        };
        let mut payload = serde_json::to_vec(&envelope)?;
        payload.push(b'\n');

        if expect_response {
            self.shared.state.lock().pending.insert(request_id.clone());
        }
        if let Err(err) = self.write_frame(&payload) {
            self.forget(&request_id);
            return Err(err);
        }

        debug!(kind, request_id = %request_id, "sent request");
        Ok(request_id)
    }

    fn write_frame(&self, payload: &[u8]) -> ChannelResult<()> {
        let mut writer = self.shared.writer.lock();
        let writer = writer.as_mut().ok_or(ChannelError::NotOpen)?;
        writer.write_all(payload)?;
        writer.flush()?;
        Ok(())
    }

    fn forget(&self, request_id: &str) {
        let mut state = self.shared.state.lock();
        state.pending.remove(request_id);
        state.responses.remove(request_id);
    }

    /// Park until the response for `request_id` arrives.
    ///
    /// Returns `None` when the channel closes first (or the configured
    /// response timeout elapses). Callers must treat `None` as a lost
    /// connection, never as an empty answer.
    pub fn wait_for_response(&self, request_id: &str) -> Option<Value> {
        let deadline = self.response_timeout.map(|timeout| Instant::now() + timeout);
        let mut state = self.shared.state.lock();
        loop {
            if let Some(result) = state.responses.remove(request_id) {
                state.pending.remove(request_id);
                return Some(result);
            }
            if state.phase != Phase::Open {
                state.pending.remove(request_id);
                return None;
            }
            match deadline {
                Some(deadline) => {
                    if self
                        .shared
                        .signal
                        .wait_until(&mut state, deadline)
                        .timed_out()
                        && !state.responses.contains_key(request_id)
                    {
                        warn!(request_id, "timed out waiting for response");
                        state.pending.remove(request_id);
                        return None;
                    }
                }
                None => self.shared.signal.wait(&mut state),
            }
        }
    }

    /// Close the channel. Safe to call more than once.
    pub fn close(&self) {
        {
            let mut state = self.shared.state.lock();
            state.closing = true;
        }
        if let Some(stream) = self.shared.stream.lock().take() {
            let _ = stream.shutdown(Shutdown::Both);
        }
        self.shared.writer.lock().take();
        self.join_receiver();
    }

    fn join_receiver(&self) {
        if let Some(handle) = self.receiver.lock().take() {
            let _ = handle.join();
        }
    }
}

impl Drop for Channel {
    fn drop(&mut self) {
        self.close();
    }
}

fn receive(shared: Arc<Shared>, addr: String) {
    let stream = match open_stream(&shared, &addr) {
        Ok(stream) => stream,
        Err(err) => {
            let mut state = shared.state.lock();
            state.phase = Phase::Failed(err.to_string());
            shared.signal.notify_all();
            return;
        }
    };

    {
        let mut state = shared.state.lock();
        state.phase = Phase::Open;
        shared.signal.notify_all();
    }

    let mut reader = BufReader::new(stream);
    let mut line = String::new();
    loop {
        line.clear();
        match reader.read_line(&mut line) {
            Ok(0) => break,
            Ok(_) => {}
            Err(err) => {
                debug!(%err, "channel read failed");
                break;
            }
        }
        if line.trim().is_empty() {
            continue;
        }

        let envelope: InboundEnvelope = match serde_json::from_str(&line) {
            Ok(envelope) => envelope,
            Err(err) => {
                warn!(%err, "discarding undecodable frame");
                continue;
            }
        };

        match envelope.request_id.filter(|id| !id.is_empty()) {
            Some(request_id) => {
                let mut state = shared.state.lock();
                if state.pending.contains(&request_id) {
                    state.responses.insert(request_id, envelope.result);
                    shared.signal.notify_all();
                } else {
                    debug!(request_id = %request_id, "dropping response nobody is waiting for");
                }
            }
            None => debug!("ignoring uncorrelated frame"),
        }
    }

    let mut state = shared.state.lock();
    state.phase = Phase::Closed;
    if !state.closing {
        warn!(addr = %addr, "connection to master closed unexpectedly");
    }
    shared.signal.notify_all();
}

fn open_stream(shared: &Shared, addr: &str) -> std::io::Result<TcpStream> {
    let stream = TcpStream::connect(addr)?;
    stream.set_nodelay(true).ok();
    *shared.writer.lock() = Some(BufWriter::new(stream.try_clone()?));
    *shared.stream.lock() = Some(stream.try_clone()?);
    Ok(stream)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::net::TcpListener;

    #[test]
    fn test_connect_to_closed_port_fails() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        drop(listener);

        let result = Channel::connect(&addr, None);
        assert!(matches!(result, Err(ChannelError::OpenFailed { .. })));
    }

    #[test]
    fn test_fire_and_forget_has_empty_id() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        let server = thread::spawn(move || {
            let (stream, _) = listener.accept().unwrap();
            let mut reader = BufReader::new(stream);
            let mut line = String::new();
            reader.read_line(&mut line).unwrap();
            serde_json::from_str::<Value>(&line).unwrap()
        });

        let channel = Channel::connect(&addr, None).unwrap();
        let id = channel.send("space.status", json!({}), false).unwrap();
        assert!(id.is_empty());

        let frame = server.join().unwrap();
        assert_eq!(frame["requestId"], "");
        assert_eq!(frame["type"], "space.status");
        channel.close();
        channel.close();
        assert!(!channel.is_open());
    }

    #[test]
    fn test_correlation_ids_increase() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        let server = thread::spawn(move || {
            let (stream, _) = listener.accept().unwrap();
            let mut reader = BufReader::new(stream);
            let mut ids = Vec::new();
            for _ in 0..2 {
                let mut line = String::new();
                reader.read_line(&mut line).unwrap();
                let frame: Value = serde_json::from_str(&line).unwrap();
                ids.push(frame["requestId"].as_str().unwrap().to_string());
            }
            ids
        });

        let channel = Channel::connect(&addr, None).unwrap();
        let first = channel.send("liveactivity.list", json!({}), true).unwrap();
        let second = channel.send("liveactivity.list", json!({}), true).unwrap();
        assert_eq!(first, "1");
        assert_eq!(second, "2");
        assert_eq!(server.join().unwrap(), vec!["1".to_string(), "2".to_string()]);
    }

    #[test]
    fn test_response_timeout_yields_none() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        let server = thread::spawn(move || {
            let (stream, _) = listener.accept().unwrap();
            let mut reader = BufReader::new(stream);
            let mut line = String::new();
            reader.read_line(&mut line).unwrap();
            // Hold the connection open without answering until the client leaves.
            line.clear();
            let _ = reader.read_line(&mut line);
        });

        let channel = Channel::connect(&addr, Some(Duration::from_millis(50))).unwrap();
        let id = channel.send("liveactivity.list", json!({}), true).unwrap();
        assert_eq!(channel.wait_for_response(&id), None);
        channel.close();
        server.join().unwrap();
    }

    #[test]
    fn test_late_and_unknown_responses_are_not_retained() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        let server = thread::spawn(move || {
            let (stream, _) = listener.accept().unwrap();
            let mut writer = stream.try_clone().unwrap();
            let mut reader = BufReader::new(stream);
            let mut ids = Vec::new();
            for _ in 0..2 {
                let mut line = String::new();
                reader.read_line(&mut line).unwrap();
                let frame: Value = serde_json::from_str(&line).unwrap();
                ids.push(frame["requestId"].as_str().unwrap().to_string());
            }
            for id in [ids[0].as_str(), "99", ids[1].as_str()] {
                let reply = json!({"requestId": id, "result": {"id": id}});
                writeln!(writer, "{reply}").unwrap();
            }
            let mut rest = String::new();
            let _ = reader.read_line(&mut rest);
        });

        let channel = Channel::connect(&addr, Some(Duration::from_millis(200))).unwrap();
        let stale = channel.send("liveactivity.list", json!({}), true).unwrap();
        assert_eq!(channel.wait_for_response(&stale), None);

        let fresh = channel.send("liveactivity.list", json!({}), true).unwrap();
        let result = channel.wait_for_response(&fresh).unwrap();
        assert_eq!(result["id"], fresh.as_str());

        {
            let state = channel.shared.state.lock();
            assert!(state.responses.is_empty());
            assert!(state.pending.is_empty());
        }
        channel.close();
        server.join().unwrap();
    }
}
