//! Scripted in-memory transport for integration tests.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use market_feed_client::{
    ConnectionEvent, ConnectionObserver, Frame, FrameKind, Inbound, Transport, TransportError,
    TransportSession,
};
use parking_lot::Mutex;
use tokio::sync::{broadcast, mpsc};

/// Transport whose sessions are driven by the test.
#[derive(Clone, Default)]
pub struct ScriptedTransport {
    state: Arc<Mutex<State>>,
}

#[derive(Default)]
struct State {
    unreachable: bool,
    opens: usize,
    sessions: Vec<SessionControl>,
}

struct SessionControl {
    inbound: mpsc::UnboundedSender<Inbound>,
    sent: Arc<Mutex<Vec<String>>>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent `open` fail (or succeed again).
    pub fn set_reachable(&self, reachable: bool) {
        self.state.lock().unreachable = !reachable;
    }

    /// Number of `open` calls so far, failed ones included.
    pub fn open_count(&self) -> usize {
        self.state.lock().opens
    }

    /// Number of sessions opened successfully.
    pub fn session_count(&self) -> usize {
        self.state.lock().sessions.len()
    }

    /// Deliver text on the most recent session.
    pub fn push_text(&self, text: impl Into<String>) {
        self.push(Inbound::Text(text.into()));
    }

    /// Deliver an encoded frame on the most recent session.
    pub fn push_frame(&self, frame: &Frame) {
        self.push_text(serde_json::to_string(frame).unwrap());
    }

    /// Close the most recent session from the remote side.
    pub fn drop_connection(&self) {
        self.push(Inbound::Closed {
            code: Some(1006),
            reason: "abnormal closure".to_string(),
        });
    }

    /// Frames written on session `index` (0-based, in open order).
    pub fn session_sent(&self, index: usize) -> Vec<Frame> {
        let sent = Arc::clone(&self.state.lock().sessions[index].sent);
        let frames = sent.lock().iter().map(|text| decode(text)).collect();
        frames
    }

    /// Frames written across all sessions.
    pub fn sent(&self) -> Vec<Frame> {
        (0..self.session_count())
            .flat_map(|i| self.session_sent(i))
            .collect()
    }

    /// Frames of `kind` for `channel` written across all sessions.
    pub fn sent_count(&self, kind: FrameKind, channel: &str) -> usize {
        self.sent()
            .iter()
            .filter(|f| f.kind == kind && f.channel == channel)
            .count()
    }

    fn push(&self, item: Inbound) {
        let state = self.state.lock();
        let session = state.sessions.last().unwrap();
        let _ = session.inbound.send(item);
    }
}

fn decode(text: &str) -> Frame {
    serde_json::from_str(text).unwrap()
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn open(&self, _endpoint: &str) -> Result<Box<dyn TransportSession>, TransportError> {
        let mut state = self.state.lock();
        state.opens += 1;

        if state.unreachable {
            return Err(TransportError::ConnectFailed(
                "connection refused".to_string(),
            ));
        }

        let (tx, rx) = mpsc::unbounded_channel();
        let sent = Arc::new(Mutex::new(Vec::new()));
        state.sessions.push(SessionControl {
            inbound: tx,
            sent: Arc::clone(&sent),
        });

        Ok(Box::new(ScriptedSession { inbound: rx, sent }))
    }
}

struct ScriptedSession {
    inbound: mpsc::UnboundedReceiver<Inbound>,
    sent: Arc<Mutex<Vec<String>>>,
}

#[async_trait]
impl TransportSession for ScriptedSession {
    async fn send(&mut self, text: String) -> Result<(), TransportError> {
        self.sent.lock().push(text);
        Ok(())
    }

    async fn recv(&mut self) -> Result<Inbound, TransportError> {
        self.inbound.recv().await.ok_or(TransportError::Closed)
    }

    async fn close(&mut self) {
        self.inbound.close();
    }
}

/// Observer that records every frame it sees.
#[derive(Default)]
pub struct FrameRecorder {
    frames: Mutex<Vec<Frame>>,
}

impl FrameRecorder {
    pub fn frames(&self) -> Vec<Frame> {
        self.frames.lock().clone()
    }
}

impl ConnectionObserver for FrameRecorder {
    fn on_frame(&self, frame: &Frame) {
        self.frames.lock().push(frame.clone());
    }
}

/// Let spawned tasks run until they block.
pub async fn settle() {
    for _ in 0..50 {
        tokio::task::yield_now().await;
    }
}

/// Next lifecycle event. Under a paused clock this auto-advances through
/// pending backoff timers.
pub async fn next_event(events: &mut broadcast::Receiver<ConnectionEvent>) -> ConnectionEvent {
    tokio::time::timeout(Duration::from_secs(3600), events.recv())
        .await
        .expect("timed out waiting for connection event")
        .expect("event channel closed")
}

/// Skip events until `Connected`.
pub async fn wait_connected(events: &mut broadcast::Receiver<ConnectionEvent>) {
    loop {
        if matches!(next_event(events).await, ConnectionEvent::Connected) {
            return;
        }
    }
}
