use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::config::SessionConfig;
use super::state::{ConnectionState, SessionEvent, SessionStatus};
use crate::error::{MediaError, NegotiationError, SessionError, SignalingError};
use crate::media::{AudioBackendFactory, LocalStream, MediaCapture, RemoteAudio};
use crate::peer::{PeerConnectionFactory, PeerEvent, PeerSession, PeerState};
use crate::playback::{AudioOutput, PlaybackSink};
use crate::signaling::SignalingClient;
use crate::speaking::{SpeakingDetector, SpeakingState};
use crate::transcript::{AgentMessage, TranscriptEntry};

/// Platform services the controller drives
#[derive(Clone)]
pub struct Platform {
    pub microphone: Arc<dyn AudioBackendFactory>,
    pub peers: Arc<dyn PeerConnectionFactory>,
    pub output: Arc<dyn AudioOutput>,
}

/// Orchestrates connect/disconnect and owns all session-scoped state
///
/// Cloning yields another handle to the same controller. The state lock is
/// never held across an await, so `disconnect` can run while `connect` is
/// suspended; every `connect` step re-checks that its session is still the
/// current one when it resumes.
#[derive(Clone)]
pub struct SessionController {
    inner: Arc<Inner>,
}

struct Inner {
    config: SessionConfig,
    capture: MediaCapture,
    peers: Arc<dyn PeerConnectionFactory>,
    signaling: SignalingClient,
    playback: PlaybackSink,
    events: mpsc::UnboundedSender<SessionEvent>,
    state: Mutex<ControllerState>,
    dropped_messages: AtomicUsize,
}

#[derive(Default)]
struct ControllerState {
    connection: ConnectionState,
    session: Option<ActiveSession>,
}

impl ControllerState {
    fn current_mut(&mut self, id: Uuid) -> Option<&mut ActiveSession> {
        self.session.as_mut().filter(|session| session.id == id)
    }

    fn is_current(&self, id: Uuid) -> bool {
        self.session.as_ref().is_some_and(|session| session.id == id)
    }
}

/// Resources of one connect attempt
struct ActiveSession {
    id: Uuid,
    cancel: CancellationToken,
    stream: Option<LocalStream>,
    peer: Option<Arc<PeerSession>>,
    detector: Option<SpeakingDetector>,
    muted: bool,
}

impl ActiveSession {
    fn new(id: Uuid, cancel: CancellationToken) -> Self {
        Self {
            id,
            cancel,
            stream: None,
            peer: None,
            detector: None,
            muted: false,
        }
    }

    /// Stop everything this session holds; returns whether remote audio was
    /// being analysed
    async fn release(mut self, playback: &PlaybackSink) -> bool {
        self.cancel.cancel();

        let had_remote = match self.detector.take() {
            Some(mut detector) => {
                detector.stop().await;
                playback.detach().await;
                true
            }
            None => false,
        };

        if let Some(peer) = self.peer.take() {
            peer.close().await;
        }

        if let Some(stream) = self.stream.take() {
            stream.release().await;
        }

        info!("Session {} released", self.id);
        had_remote
    }
}

/// Why `connect` stopped early
enum StepError {
    /// The session was torn down while a step was pending
    Superseded,
    Failed(SessionError),
}

impl From<MediaError> for StepError {
    fn from(err: MediaError) -> Self {
        StepError::Failed(err.into())
    }
}

impl From<NegotiationError> for StepError {
    fn from(err: NegotiationError) -> Self {
        StepError::Failed(err.into())
    }
}

impl From<SignalingError> for StepError {
    fn from(err: SignalingError) -> Self {
        StepError::Failed(err.into())
    }
}

impl SessionController {
    /// Create a controller and the receiving end of its event stream
    pub fn new(
        config: SessionConfig,
        platform: Platform,
    ) -> (Self, mpsc::UnboundedReceiver<SessionEvent>) {
        let (events, rx) = mpsc::unbounded_channel();

        let inner = Inner {
            capture: MediaCapture::new(platform.microphone, config.capture.clone()),
            peers: platform.peers,
            signaling: SignalingClient::new(&config.base_url),
            playback: PlaybackSink::new(platform.output, config.volume),
            events,
            state: Mutex::new(ControllerState::default()),
            dropped_messages: AtomicUsize::new(0),
            config,
        };

        info!(
            "Session controller ready (backend {})",
            inner.signaling.endpoint()
        );

        (
            Self {
                inner: Arc::new(inner),
            },
            rx,
        )
    }

    pub fn config(&self) -> &SessionConfig {
        &self.inner.config
    }

    /// Start a session; does nothing while one is connecting or connected
    ///
    /// Any step failure tears the session down and is returned. A session
    /// that was disconnected while connecting returns `Ok`.
    pub async fn connect(&self) -> Result<(), SessionError> {
        let (id, peer_events) = {
            let mut state = self.inner.state.lock().await;

            if state.session.is_some()
                || matches!(
                    state.connection,
                    ConnectionState::Connecting | ConnectionState::Connected
                )
            {
                debug!("Connect ignored while {}", state.connection);
                return Ok(());
            }

            let id = Uuid::new_v4();
            let cancel = CancellationToken::new();
            let (tx, rx) = mpsc::unbounded_channel();

            state.session = Some(ActiveSession::new(id, cancel.clone()));
            self.transition(&mut state, ConnectionState::Connecting);

            tokio::spawn(self.clone().pump(id, rx, cancel));

            (id, tx)
        };

        info!("Connecting session {}", id);

        match self.establish(id, peer_events).await {
            Ok(()) => Ok(()),
            Err(StepError::Superseded) => {
                info!("Session {} ended while connecting", id);
                Ok(())
            }
            Err(StepError::Failed(err)) => self.fail(id, err).await,
        }
    }

    /// The strictly ordered connect steps
    async fn establish(
        &self,
        id: Uuid,
        peer_events: mpsc::UnboundedSender<PeerEvent>,
    ) -> Result<(), StepError> {
        let config = &self.inner.config;

        let stream = self.inner.capture.acquire().await?;
        self.adopt_stream(id, &stream).await?;

        let peer = PeerSession::create(
            self.inner.peers.as_ref(),
            &config.ice_servers,
            peer_events,
            config.gathering_timeout,
        )
        .await?;
        let peer = Arc::new(peer);
        self.adopt_peer(id, &peer).await?;

        peer.attach_local_tracks(&stream).await?;
        self.ensure_current(id).await?;

        peer.create_data_channel(&config.data_channel_label).await?;
        self.ensure_current(id).await?;

        let offer = peer.negotiate().await?;
        self.ensure_current(id).await?;

        let answer = self.inner.signaling.exchange_offer(&offer).await?;
        self.ensure_current(id).await?;

        if let Some(pc_id) = &answer.pc_id {
            debug!("Backend peer connection id: {}", pc_id);
        }

        peer.apply_remote_answer(&answer).await?;
        self.ensure_current(id).await?;

        info!("Session {} negotiated, waiting for transport", id);
        Ok(())
    }

    async fn adopt_stream(&self, id: Uuid, stream: &LocalStream) -> Result<(), StepError> {
        {
            let mut state = self.inner.state.lock().await;
            if let Some(session) = state.current_mut(id) {
                stream.set_muted(session.muted);
                session.stream = Some(stream.clone());
                return Ok(());
            }
        }

        debug!("Releasing microphone acquired for stale session {}", id);
        stream.release().await;
        Err(StepError::Superseded)
    }

    async fn adopt_peer(&self, id: Uuid, peer: &Arc<PeerSession>) -> Result<(), StepError> {
        {
            let mut state = self.inner.state.lock().await;
            if let Some(session) = state.current_mut(id) {
                session.peer = Some(Arc::clone(peer));
                return Ok(());
            }
        }

        debug!("Closing peer connection created for stale session {}", id);
        peer.close().await;
        Err(StepError::Superseded)
    }

    async fn ensure_current(&self, id: Uuid) -> Result<(), StepError> {
        if self.inner.state.lock().await.is_current(id) {
            Ok(())
        } else {
            Err(StepError::Superseded)
        }
    }

    async fn fail(&self, id: Uuid, err: SessionError) -> Result<(), SessionError> {
        let session = {
            let mut state = self.inner.state.lock().await;
            if !state.is_current(id) {
                info!("Session {} ended while connecting ({})", id, err);
                return Ok(());
            }

            error!("Connection failed: {}", err);
            self.transition(&mut state, ConnectionState::Failed);
            self.emit(SessionEvent::Transcript(TranscriptEntry::info(format!(
                "Connection failed: {}",
                err
            ))));
            state.session.take()
        };

        if let Some(session) = session {
            self.finish(session).await;
        }

        Err(err)
    }

    /// End the current session; safe to call with no session
    pub async fn disconnect(&self) {
        let session = {
            let mut state = self.inner.state.lock().await;
            let Some(session) = state.session.take() else {
                debug!("Disconnect with no active session");
                return;
            };

            self.transition(&mut state, ConnectionState::Disconnected);
            self.emit(SessionEvent::Transcript(TranscriptEntry::info(
                "Disconnected",
            )));
            session
        };

        info!("Disconnecting session {}", session.id);
        self.finish(session).await;
    }

    /// Tear down a session whose transport dropped
    async fn connection_lost(&self, id: Uuid, via: ConnectionState) {
        let session = {
            let mut state = self.inner.state.lock().await;
            if !state.is_current(id) {
                return;
            }

            self.emit(SessionEvent::Transcript(TranscriptEntry::info(
                "Connection lost",
            )));
            self.transition(&mut state, via);
            state.session.take()
        };

        warn!("Session {}: {}", id, SessionError::ConnectionLost(via));

        if let Some(session) = session {
            self.finish(session).await;
        }
    }

    async fn finish(&self, session: ActiveSession) {
        if session.release(&self.inner.playback).await {
            self.emit(SessionEvent::Speaking(SpeakingState::Idle));
        }

        let mut state = self.inner.state.lock().await;
        if state.session.is_none()
            && matches!(
                state.connection,
                ConnectionState::Disconnected | ConnectionState::Failed
            )
        {
            self.transition(&mut state, ConnectionState::Idle);
        }
    }

    /// Flip the mute flag of the active session; `None` without a session
    pub async fn toggle_mute(&self) -> Option<bool> {
        let mut state = self.inner.state.lock().await;
        let Some(session) = state.session.as_mut() else {
            debug!("Mute ignored with no active session");
            return None;
        };

        session.muted = !session.muted;
        if let Some(stream) = &session.stream {
            stream.set_muted(session.muted);
        }

        let muted = session.muted;
        info!("Microphone {}", if muted { "muted" } else { "unmuted" });
        self.emit(SessionEvent::Muted(muted));
        Some(muted)
    }

    /// Set the playback volume, clamped to `0.0..=1.0`; works without a session
    pub fn set_volume(&self, volume: f32) -> f32 {
        let applied = self.inner.playback.set_volume(volume);
        debug!("Volume set to {:.2}", applied);
        self.emit(SessionEvent::Volume(applied));
        applied
    }

    pub fn volume(&self) -> f32 {
        self.inner.playback.volume()
    }

    /// Ask the transcript sink to clear
    pub fn clear_transcript(&self) {
        self.emit(SessionEvent::TranscriptCleared);
    }

    pub async fn status(&self) -> SessionStatus {
        // Read before taking the state lock
        let remote_audio_playing = self.inner.playback.is_playing().await;

        let state = self.inner.state.lock().await;
        let session = state.session.as_ref();

        SessionStatus {
            state: state.connection,
            session_id: session.map(|s| s.id),
            muted: session.is_some_and(|s| s.muted),
            volume: self.inner.playback.volume(),
            dropped_messages: self.inner.dropped_messages.load(Ordering::SeqCst),
            microphone_live: session
                .and_then(|s| s.stream.as_ref())
                .is_some_and(|stream| stream.live_tracks() > 0),
            peer_open: session
                .and_then(|s| s.peer.as_ref())
                .is_some_and(|peer| !peer.is_closed()),
            remote_audio_playing,
        }
    }

    /// Disconnect before the process exits
    pub async fn shutdown(&self) {
        info!("Shutting down session controller");
        self.disconnect().await;
    }

    fn transition(&self, state: &mut ControllerState, next: ConnectionState) {
        if state.connection == next {
            return;
        }
        debug!("Connection state {} -> {}", state.connection, next);
        state.connection = next;
        self.emit(SessionEvent::Connection(next));
    }

    fn emit(&self, event: SessionEvent) {
        if self.inner.events.send(event).is_err() {
            debug!("Session event dropped, no receiver");
        }
    }

    /// Route platform events of one session until it is cancelled
    async fn pump(
        self,
        id: Uuid,
        mut events: mpsc::UnboundedReceiver<PeerEvent>,
        cancel: CancellationToken,
    ) {
        loop {
            let event = tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                event = events.recv() => match event {
                    Some(event) => event,
                    None => break,
                },
            };

            match event {
                PeerEvent::StateChanged(peer_state) => self.on_peer_state(id, peer_state).await,
                PeerEvent::RemoteTrack(remote) => self.on_remote_track(id, remote).await,
                PeerEvent::Message { label, text } => self.on_message(id, &label, &text).await,
            }
        }

        debug!("Event pump for session {} stopped", id);
    }

    async fn on_peer_state(&self, id: Uuid, peer_state: PeerState) {
        debug!("Session {} peer state {:?}", id, peer_state);

        match peer_state {
            PeerState::Connected => {
                let mut state = self.inner.state.lock().await;
                if state.is_current(id) && state.connection == ConnectionState::Connecting {
                    self.transition(&mut state, ConnectionState::Connected);
                    self.emit(SessionEvent::Transcript(TranscriptEntry::info("Connected")));
                    info!("Session {} connected", id);
                }
            }
            PeerState::Disconnected => {
                self.connection_lost(id, ConnectionState::Disconnected).await
            }
            PeerState::Failed => self.connection_lost(id, ConnectionState::Failed).await,
            PeerState::New | PeerState::Connecting | PeerState::Closed => {}
        }
    }

    async fn on_remote_track(&self, id: Uuid, remote: RemoteAudio) {
        {
            let mut state = self.inner.state.lock().await;
            let Some(session) = state.current_mut(id) else {
                debug!("Remote track {} for stale session {}", remote.id(), id);
                return;
            };

            if session.detector.is_some() {
                warn!("Ignoring additional remote track {}", remote.id());
                return;
            }

            let events = self.inner.events.clone();
            session.detector = Some(SpeakingDetector::start(
                &remote,
                &self.inner.config.speaking,
                move |speaking| {
                    let _ = events.send(SessionEvent::Speaking(speaking));
                },
            ));
        }

        self.inner.playback.attach(&remote).await;

        if !self.inner.state.lock().await.is_current(id) {
            self.inner.playback.detach().await;
        }
    }

    async fn on_message(&self, id: Uuid, label: &str, text: &str) {
        if !self.inner.state.lock().await.is_current(id) {
            return;
        }

        match AgentMessage::parse(text) {
            Ok(message) => self.emit(SessionEvent::Transcript(message.into_entry())),
            Err(e) => {
                let dropped = self.inner.dropped_messages.fetch_add(1, Ordering::SeqCst) + 1;
                warn!(
                    "Dropping malformed message on '{}' ({} dropped so far): {}",
                    label, dropped, e
                );
            }
        }
    }
}
