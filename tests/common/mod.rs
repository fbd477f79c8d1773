// Shared fakes for integration tests
//
// The microphone, peer connection and speaker are replaced with in-process
// fakes; the signaling backend is a real axum server on a loopback port.

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use axum::{extract::State, http::StatusCode, routing::post, Json, Router};
use serde_json::{json, Value};
use tokio::sync::{mpsc, Mutex, Notify};
use voice_agent_client::media::{AudioBackend, AudioBackendFactory, LocalAudioTrack};
use voice_agent_client::peer::{
    DataChannel, IceServer, PeerConnection, PeerConnectionFactory, PeerEventSender,
};
use voice_agent_client::signaling::SessionDescription;
use voice_agent_client::{
    AudioFrame, AudioOutput, CaptureConstraints, MediaError, NegotiationError, PeerEvent,
    PeerState, Platform, SessionConfig, SessionController, SessionEvent, SpeakingConfig,
};

// ============================================================================
// Microphone
// ============================================================================

#[derive(Default)]
pub struct FakeMicrophone {
    pub started: AtomicUsize,
    pub stopped: AtomicUsize,
    pub deny: AtomicBool,
    pub last_constraints: StdMutex<Option<CaptureConstraints>>,
    feeds: StdMutex<Vec<mpsc::Sender<AudioFrame>>>,
}

impl FakeMicrophone {
    /// Tracks started and not yet stopped
    pub fn live(&self) -> usize {
        self.started.load(Ordering::SeqCst) - self.stopped.load(Ordering::SeqCst)
    }

    /// Push a captured frame into the most recently started track
    pub async fn feed(&self, frame: AudioFrame) {
        let tx = self.feeds.lock().unwrap().last().cloned();
        if let Some(tx) = tx {
            let _ = tx.send(frame).await;
        }
    }
}

pub struct FakeMicrophoneFactory(pub Arc<FakeMicrophone>);

impl AudioBackendFactory for FakeMicrophoneFactory {
    fn create(&self) -> Result<Box<dyn AudioBackend>, MediaError> {
        Ok(Box::new(FakeInput {
            mic: Arc::clone(&self.0),
            tx: None,
        }))
    }
}

struct FakeInput {
    mic: Arc<FakeMicrophone>,
    tx: Option<mpsc::Sender<AudioFrame>>,
}

#[async_trait::async_trait]
impl AudioBackend for FakeInput {
    async fn start(
        &mut self,
        constraints: &CaptureConstraints,
    ) -> Result<mpsc::Receiver<AudioFrame>, MediaError> {
        if self.mic.deny.load(Ordering::SeqCst) {
            return Err(MediaError::PermissionDenied);
        }

        *self.mic.last_constraints.lock().unwrap() = Some(constraints.clone());
        let (tx, rx) = mpsc::channel(16);
        self.mic.feeds.lock().unwrap().push(tx.clone());
        self.tx = Some(tx);
        self.mic.started.fetch_add(1, Ordering::SeqCst);
        Ok(rx)
    }

    async fn stop(&mut self) -> Result<(), MediaError> {
        if self.tx.take().is_some() {
            self.mic.stopped.fetch_add(1, Ordering::SeqCst);
        }
        Ok(())
    }

    fn is_capturing(&self) -> bool {
        self.tx.is_some()
    }

    fn name(&self) -> &str {
        "fake-microphone"
    }
}

// ============================================================================
// Peer connection
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailPoint {
    Create,
    AddTrack,
    DataChannel,
    Offer,
    RemoteDescription,
}

#[derive(Default)]
pub struct FakePeers {
    pub created: AtomicUsize,
    pub closed: AtomicUsize,
    pub tracks_added: AtomicUsize,
    pub channels: StdMutex<Vec<String>>,
    pub remote_descriptions: StdMutex<Vec<SessionDescription>>,
    pub fail_at: StdMutex<Option<FailPoint>>,
    /// Report `connected` once the answer is applied
    pub auto_connect: AtomicBool,
    /// When set, `create_offer` waits for a permit
    pub offer_gate: StdMutex<Option<Arc<Notify>>>,
    pub offer_reached: Notify,
    events: StdMutex<Option<PeerEventSender>>,
}

impl FakePeers {
    pub fn new() -> Arc<Self> {
        let peers = Self::default();
        peers.auto_connect.store(true, Ordering::SeqCst);
        Arc::new(peers)
    }

    pub fn fail_at(&self, point: FailPoint) {
        *self.fail_at.lock().unwrap() = Some(point);
    }

    pub fn gate_offer(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        *self.offer_gate.lock().unwrap() = Some(Arc::clone(&gate));
        gate
    }

    /// Raise a platform event on the most recent connection
    pub fn emit(&self, event: PeerEvent) {
        if let Some(events) = self.events.lock().unwrap().as_ref() {
            let _ = events.send(event);
        }
    }

    pub fn open(&self) -> usize {
        self.created.load(Ordering::SeqCst) - self.closed.load(Ordering::SeqCst)
    }

    fn check(&self, point: FailPoint) -> Result<(), NegotiationError> {
        if *self.fail_at.lock().unwrap() == Some(point) {
            Err(NegotiationError::new(format!("injected failure at {:?}", point)))
        } else {
            Ok(())
        }
    }
}

pub struct FakePeerFactory(pub Arc<FakePeers>);

#[async_trait::async_trait]
impl PeerConnectionFactory for FakePeerFactory {
    async fn create(
        &self,
        _ice_servers: &[IceServer],
        events: PeerEventSender,
    ) -> Result<Arc<dyn PeerConnection>, NegotiationError> {
        self.0.check(FailPoint::Create)?;
        self.0.created.fetch_add(1, Ordering::SeqCst);
        *self.0.events.lock().unwrap() = Some(events.clone());

        Ok(Arc::new(FakeConnection {
            peers: Arc::clone(&self.0),
            events,
            local: Mutex::new(None),
        }))
    }
}

struct FakeConnection {
    peers: Arc<FakePeers>,
    events: PeerEventSender,
    local: Mutex<Option<SessionDescription>>,
}

struct FakeChannel(String);

#[async_trait::async_trait]
impl DataChannel for FakeChannel {
    fn label(&self) -> &str {
        &self.0
    }

    async fn close(&self) -> Result<(), NegotiationError> {
        Ok(())
    }
}

#[async_trait::async_trait]
impl PeerConnection for FakeConnection {
    async fn add_track(&self, _track: &LocalAudioTrack) -> Result<(), NegotiationError> {
        self.peers.check(FailPoint::AddTrack)?;
        self.peers.tracks_added.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn create_data_channel(
        &self,
        label: &str,
    ) -> Result<Arc<dyn DataChannel>, NegotiationError> {
        self.peers.check(FailPoint::DataChannel)?;
        self.peers.channels.lock().unwrap().push(label.to_string());
        Ok(Arc::new(FakeChannel(label.to_string())))
    }

    async fn create_offer(&self) -> Result<SessionDescription, NegotiationError> {
        let gate = self.peers.offer_gate.lock().unwrap().clone();
        if let Some(gate) = gate {
            self.peers.offer_reached.notify_one();
            gate.notified().await;
        }

        self.peers.check(FailPoint::Offer)?;
        Ok(SessionDescription::offer("OFFER_SDP"))
    }

    async fn set_local_description(
        &self,
        description: &SessionDescription,
    ) -> Result<(), NegotiationError> {
        let mut local = description.clone();
        local.sdp.push_str("\r\na=candidate:fake");
        *self.local.lock().await = Some(local);
        Ok(())
    }

    async fn wait_gathering_complete(&self) {}

    async fn local_description(&self) -> Option<SessionDescription> {
        self.local.lock().await.clone()
    }

    async fn set_remote_description(
        &self,
        description: &SessionDescription,
    ) -> Result<(), NegotiationError> {
        self.peers.check(FailPoint::RemoteDescription)?;
        self.peers
            .remote_descriptions
            .lock()
            .unwrap()
            .push(description.clone());

        if self.peers.auto_connect.load(Ordering::SeqCst) {
            let _ = self.events.send(PeerEvent::StateChanged(PeerState::Connecting));
            let _ = self.events.send(PeerEvent::StateChanged(PeerState::Connected));
        }
        Ok(())
    }

    async fn close(&self) -> Result<(), NegotiationError> {
        self.peers.closed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

// ============================================================================
// Speaker
// ============================================================================

#[derive(Default)]
pub struct RecordingOutput {
    pub frames: StdMutex<Vec<AudioFrame>>,
}

impl RecordingOutput {
    pub fn peak(&self) -> i16 {
        self.frames
            .lock()
            .unwrap()
            .iter()
            .flat_map(|f| f.samples.iter().copied())
            .map(|s| s.saturating_abs())
            .max()
            .unwrap_or(0)
    }

    pub fn frame_count(&self) -> usize {
        self.frames.lock().unwrap().len()
    }
}

impl AudioOutput for RecordingOutput {
    fn write(&self, frame: AudioFrame) {
        self.frames.lock().unwrap().push(frame);
    }
}

// ============================================================================
// Signaling backend
// ============================================================================

#[derive(Debug, Clone)]
pub enum BackendReply {
    Answer,
    Status(u16),
    Malformed,
    /// Replies with an offer instead of an answer
    WrongType,
}

pub struct MockBackend {
    pub url: String,
    pub offers: Arc<StdMutex<Vec<Value>>>,
}

impl MockBackend {
    pub fn offer_count(&self) -> usize {
        self.offers.lock().unwrap().len()
    }
}

#[derive(Clone)]
struct BackendState {
    reply: BackendReply,
    offers: Arc<StdMutex<Vec<Value>>>,
}

async fn offer_handler(
    State(state): State<BackendState>,
    Json(offer): Json<Value>,
) -> (StatusCode, String) {
    state.offers.lock().unwrap().push(offer);

    match state.reply {
        BackendReply::Answer => (
            StatusCode::OK,
            json!({"sdp": "ANSWER_SDP", "type": "answer", "pc_id": "pc-1"}).to_string(),
        ),
        BackendReply::Status(code) => (
            StatusCode::from_u16(code).unwrap(),
            "backend exploded".to_string(),
        ),
        BackendReply::Malformed => (StatusCode::OK, "{not json".to_string()),
        BackendReply::WrongType => (
            StatusCode::OK,
            json!({"sdp": "OFFER_SDP", "type": "offer"}).to_string(),
        ),
    }
}

/// Serve `/api/offer` on an ephemeral loopback port
pub async fn spawn_backend(reply: BackendReply) -> MockBackend {
    let offers = Arc::new(StdMutex::new(Vec::new()));
    let state = BackendState {
        reply,
        offers: Arc::clone(&offers),
    };

    let app = Router::new()
        .route("/api/offer", post(offer_handler))
        .with_state(state);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    MockBackend {
        url: format!("http://{}", addr),
        offers,
    }
}

// ============================================================================
// Controller harness
// ============================================================================

pub struct Harness {
    pub controller: SessionController,
    pub events: mpsc::UnboundedReceiver<SessionEvent>,
    pub mic: Arc<FakeMicrophone>,
    pub peers: Arc<FakePeers>,
    pub output: Arc<RecordingOutput>,
    pub backend: MockBackend,
}

pub async fn harness(reply: BackendReply) -> Harness {
    let backend = spawn_backend(reply).await;
    harness_with(backend, SessionConfig::default().volume)
}

pub fn harness_with(backend: MockBackend, volume: f32) -> Harness {
    let mic = Arc::new(FakeMicrophone::default());
    let peers = FakePeers::new();
    let output = Arc::new(RecordingOutput::default());

    let config = SessionConfig {
        base_url: backend.url.clone(),
        ice_servers: vec![],
        gathering_timeout: Duration::from_millis(200),
        speaking: SpeakingConfig {
            interval_ms: 20,
            ..SpeakingConfig::default()
        },
        volume,
        ..SessionConfig::default()
    };

    let platform = Platform {
        microphone: Arc::new(FakeMicrophoneFactory(Arc::clone(&mic))),
        peers: Arc::new(FakePeerFactory(Arc::clone(&peers))),
        output: output.clone(),
    };

    let (controller, events) = SessionController::new(config, platform);

    Harness {
        controller,
        events,
        mic,
        peers,
        output,
        backend,
    }
}

/// Wait for the next controller event
pub async fn next_event(events: &mut mpsc::UnboundedReceiver<SessionEvent>) -> SessionEvent {
    tokio::time::timeout(Duration::from_secs(5), events.recv())
        .await
        .expect("timed out waiting for a session event")
        .expect("event channel closed")
}

/// Collect events until one matches `done` (inclusive)
pub async fn events_until(
    events: &mut mpsc::UnboundedReceiver<SessionEvent>,
    done: impl Fn(&SessionEvent) -> bool,
) -> Vec<SessionEvent> {
    let mut seen = Vec::new();
    loop {
        let event = next_event(events).await;
        let finished = done(&event);
        seen.push(event);
        if finished {
            return seen;
        }
    }
}

/// Everything already queued, without waiting
pub fn drain(events: &mut mpsc::UnboundedReceiver<SessionEvent>) -> Vec<SessionEvent> {
    let mut seen = Vec::new();
    while let Ok(event) = events.try_recv() {
        seen.push(event);
    }
    seen
}

/// Loud broadband noise that clears the default speaking threshold
pub fn loud_frame(len: usize, seed: u32) -> AudioFrame {
    let mut state = seed;
    let samples = (0..len)
        .map(|_| {
            state = state.wrapping_mul(1_664_525).wrapping_add(1_013_904_223);
            let unit = (state >> 8) as f32 / (1u32 << 24) as f32 * 2.0 - 1.0;
            (unit * 16_000.0) as i16
        })
        .collect();

    AudioFrame {
        samples,
        sample_rate: 8000,
        channels: 1,
        timestamp_ms: 0,
    }
}

pub fn silent_frame(len: usize) -> AudioFrame {
    AudioFrame {
        samples: vec![0; len],
        sample_rate: 8000,
        channels: 1,
        timestamp_ms: 0,
    }
}
