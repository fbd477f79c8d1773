// WebRTC peer connections backed by webrtc-rs
//
// Only PCMU (G.711 µ-law, 8kHz mono) is registered, so the offer carries a
// single audio codec that every WebRTC stack accepts.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tokio::sync::{broadcast, mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use webrtc::api::interceptor_registry::register_default_interceptors;
use webrtc::api::media_engine::{MediaEngine, MIME_TYPE_PCMU};
use webrtc::api::{APIBuilder, API};
use webrtc::data_channel::data_channel_init::RTCDataChannelInit;
use webrtc::data_channel::data_channel_message::DataChannelMessage;
use webrtc::data_channel::RTCDataChannel;
use webrtc::ice_transport::ice_server::RTCIceServer;
use webrtc::interceptor::registry::Registry;
use webrtc::media::Sample;
use webrtc::peer_connection::configuration::RTCConfiguration;
use webrtc::peer_connection::peer_connection_state::RTCPeerConnectionState;
use webrtc::peer_connection::sdp::sdp_type::RTCSdpType;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;
use webrtc::peer_connection::RTCPeerConnection;
use webrtc::rtp_transceiver::rtp_codec::{
    RTCRtpCodecCapability, RTCRtpCodecParameters, RTPCodecType,
};
use webrtc::rtp_transceiver::rtp_receiver::RTCRtpReceiver;
use webrtc::rtp_transceiver::RTCRtpTransceiver;
use webrtc::track::track_local::track_local_static_sample::TrackLocalStaticSample;
use webrtc::track::track_local::TrackLocal;
use webrtc::track::track_remote::TrackRemote;

use super::connection::{
    DataChannel, IceServer, PeerConnection, PeerConnectionFactory, PeerEvent, PeerEventSender,
    PeerState,
};
use super::g711;
use crate::error::NegotiationError;
use crate::media::{AudioFrame, LocalAudioTrack, RemoteAudio, TrackReader};
use crate::signaling::{SdpType, SessionDescription};

const PCMU_SAMPLE_RATE: u32 = 8000;
const PCMU_PAYLOAD_TYPE: u8 = 0;
const LOCAL_STREAM_ID: &str = "voice-agent-client";

impl From<webrtc::Error> for NegotiationError {
    fn from(err: webrtc::Error) -> Self {
        NegotiationError::new(err.to_string())
    }
}

/// Builds webrtc-rs peer connections
#[derive(Debug, Default)]
pub struct RtcPeerFactory;

impl RtcPeerFactory {
    pub fn new() -> Self {
        Self
    }
}

fn pcmu_capability() -> RTCRtpCodecCapability {
    RTCRtpCodecCapability {
        mime_type: MIME_TYPE_PCMU.to_owned(),
        clock_rate: PCMU_SAMPLE_RATE,
        channels: 1,
        sdp_fmtp_line: String::new(),
        rtcp_feedback: vec![],
    }
}

fn build_api() -> Result<API, webrtc::Error> {
    let mut media_engine = MediaEngine::default();
    media_engine.register_codec(
        RTCRtpCodecParameters {
            capability: pcmu_capability(),
            payload_type: PCMU_PAYLOAD_TYPE,
            ..Default::default()
        },
        RTPCodecType::Audio,
    )?;

    let registry = register_default_interceptors(Registry::new(), &mut media_engine)?;

    Ok(APIBuilder::new()
        .with_media_engine(media_engine)
        .with_interceptor_registry(registry)
        .build())
}

fn to_rtc_ice_server(server: &IceServer) -> RTCIceServer {
    RTCIceServer {
        urls: server.urls.clone(),
        username: server.username.clone().unwrap_or_default(),
        credential: server.credential.clone().unwrap_or_default(),
        ..Default::default()
    }
}

fn map_state(state: RTCPeerConnectionState) -> PeerState {
    match state {
        RTCPeerConnectionState::Unspecified | RTCPeerConnectionState::New => PeerState::New,
        RTCPeerConnectionState::Connecting => PeerState::Connecting,
        RTCPeerConnectionState::Connected => PeerState::Connected,
        RTCPeerConnectionState::Disconnected => PeerState::Disconnected,
        RTCPeerConnectionState::Failed => PeerState::Failed,
        RTCPeerConnectionState::Closed => PeerState::Closed,
    }
}

#[async_trait::async_trait]
impl PeerConnectionFactory for RtcPeerFactory {
    async fn create(
        &self,
        ice_servers: &[IceServer],
        events: PeerEventSender,
    ) -> Result<Arc<dyn PeerConnection>, NegotiationError> {
        let api = build_api()?;

        let config = RTCConfiguration {
            ice_servers: ice_servers.iter().map(to_rtc_ice_server).collect(),
            ..Default::default()
        };

        let pc = Arc::new(api.new_peer_connection(config).await?);

        let state_tx = events.clone();
        pc.on_peer_connection_state_change(Box::new(move |state: RTCPeerConnectionState| {
            debug!("Peer connection state: {}", state);
            let _ = state_tx.send(PeerEvent::StateChanged(map_state(state)));
            Box::pin(async {})
        }));

        let track_tx = events.clone();
        pc.on_track(Box::new(
            move |track: Arc<TrackRemote>,
                  _receiver: Arc<RTCRtpReceiver>,
                  _transceiver: Arc<RTCRtpTransceiver>| {
                let track_tx = track_tx.clone();
                Box::pin(async move {
                    let remote = RemoteAudio::new(track.id());
                    info!("Remote track {} arrived", remote.id());
                    tokio::spawn(read_remote_track(track, remote.publisher()));
                    let _ = track_tx.send(PeerEvent::RemoteTrack(remote));
                })
            },
        ));

        Ok(Arc::new(RtcPeerConnection {
            pc,
            events,
            gathering: Mutex::new(None),
            pumps: Mutex::new(Vec::new()),
        }))
    }
}

struct RtcPeerConnection {
    pc: Arc<RTCPeerConnection>,
    events: PeerEventSender,
    gathering: Mutex<Option<mpsc::Receiver<()>>>,
    pumps: Mutex<Vec<JoinHandle<()>>>,
}

#[async_trait::async_trait]
impl PeerConnection for RtcPeerConnection {
    async fn add_track(&self, track: &LocalAudioTrack) -> Result<(), NegotiationError> {
        let reader = track
            .take_reader()
            .await
            .ok_or_else(|| NegotiationError::new(format!("track {} is not available", track.id())))?;

        let local = Arc::new(TrackLocalStaticSample::new(
            pcmu_capability(),
            track.id().to_string(),
            LOCAL_STREAM_ID.to_string(),
        ));

        let sender = self
            .pc
            .add_track(Arc::clone(&local) as Arc<dyn TrackLocal + Send + Sync>)
            .await?;

        // RTCP has to be drained for the interceptors to run
        let rtcp = tokio::spawn(async move {
            let mut buf = vec![0u8; 1500];
            while sender.read(&mut buf).await.is_ok() {}
        });

        let pump = tokio::spawn(send_local_track(reader, local));

        let mut pumps = self.pumps.lock().await;
        pumps.push(rtcp);
        pumps.push(pump);

        Ok(())
    }

    async fn create_data_channel(
        &self,
        label: &str,
    ) -> Result<Arc<dyn DataChannel>, NegotiationError> {
        let init = RTCDataChannelInit {
            ordered: Some(true),
            ..Default::default()
        };

        let channel = self.pc.create_data_channel(label, Some(init)).await?;

        let message_tx = self.events.clone();
        let channel_label = label.to_string();
        channel.on_message(Box::new(move |msg: DataChannelMessage| {
            let message_tx = message_tx.clone();
            let label = channel_label.clone();
            Box::pin(async move {
                match String::from_utf8(msg.data.to_vec()) {
                    Ok(text) => {
                        let _ = message_tx.send(PeerEvent::Message { label, text });
                    }
                    Err(_) => debug!("Ignoring binary message on '{}'", label),
                }
            })
        }));

        let open_label = label.to_string();
        channel.on_open(Box::new(move || {
            Box::pin(async move {
                info!("Data channel '{}' open", open_label);
            })
        }));

        Ok(Arc::new(RtcDataChannel {
            label: label.to_string(),
            channel,
        }))
    }

    async fn create_offer(&self) -> Result<SessionDescription, NegotiationError> {
        let offer = self.pc.create_offer(None).await?;
        Ok(SessionDescription::offer(offer.sdp))
    }

    async fn set_local_description(
        &self,
        description: &SessionDescription,
    ) -> Result<(), NegotiationError> {
        let local = to_rtc(description)?;

        // Must be taken before the description is applied
        let gathering = self.pc.gathering_complete_promise().await;
        self.pc.set_local_description(local).await?;
        *self.gathering.lock().await = Some(gathering);

        Ok(())
    }

    async fn wait_gathering_complete(&self) {
        let gathering = self.gathering.lock().await.take();
        if let Some(mut gathering) = gathering {
            let _ = gathering.recv().await;
            debug!("ICE gathering complete");
        }
    }

    async fn local_description(&self) -> Option<SessionDescription> {
        let local = self.pc.local_description().await?;
        let kind = match local.sdp_type {
            RTCSdpType::Answer => SdpType::Answer,
            _ => SdpType::Offer,
        };
        Some(SessionDescription {
            sdp: local.sdp,
            kind,
            pc_id: None,
        })
    }

    async fn set_remote_description(
        &self,
        description: &SessionDescription,
    ) -> Result<(), NegotiationError> {
        self.pc.set_remote_description(to_rtc(description)?).await?;
        Ok(())
    }

    async fn close(&self) -> Result<(), NegotiationError> {
        for pump in self.pumps.lock().await.drain(..) {
            pump.abort();
        }
        self.pc.close().await?;
        Ok(())
    }
}

fn to_rtc(description: &SessionDescription) -> Result<RTCSessionDescription, webrtc::Error> {
    match description.kind {
        SdpType::Offer => RTCSessionDescription::offer(description.sdp.clone()),
        SdpType::Answer => RTCSessionDescription::answer(description.sdp.clone()),
    }
}

struct RtcDataChannel {
    label: String,
    channel: Arc<RTCDataChannel>,
}

#[async_trait::async_trait]
impl DataChannel for RtcDataChannel {
    fn label(&self) -> &str {
        &self.label
    }

    async fn close(&self) -> Result<(), NegotiationError> {
        self.channel.close().await?;
        Ok(())
    }
}

/// Encode microphone frames as PCMU samples on the outbound track
async fn send_local_track(mut reader: TrackReader, track: Arc<TrackLocalStaticSample>) {
    while let Some(frame) = reader.recv().await {
        let frame = frame.into_mono().resample(PCMU_SAMPLE_RATE);
        if frame.samples.is_empty() {
            continue;
        }

        let sample = Sample {
            data: Bytes::from(g711::encode(&frame.samples)),
            duration: Duration::from_secs_f64(
                frame.samples.len() as f64 / PCMU_SAMPLE_RATE as f64,
            ),
            ..Default::default()
        };

        if let Err(e) = track.write_sample(&sample).await {
            warn!("Failed to write outbound audio: {}", e);
        }
    }
    debug!("Outbound track {} ended", track.id());
}

/// Decode inbound PCMU packets into frames for playback and analysis
async fn read_remote_track(track: Arc<TrackRemote>, frames: broadcast::Sender<AudioFrame>) {
    let mut elapsed_ms = 0.0;

    while let Ok((packet, _)) = track.read_rtp().await {
        if packet.header.payload_type != PCMU_PAYLOAD_TYPE {
            debug!(
                "Ignoring packet with payload type {}",
                packet.header.payload_type
            );
            continue;
        }

        let frame = AudioFrame {
            samples: g711::decode(&packet.payload),
            sample_rate: PCMU_SAMPLE_RATE,
            channels: 1,
            timestamp_ms: elapsed_ms as u64,
        };
        elapsed_ms += frame.duration_ms();

        // No subscribers just means nobody is listening yet
        let _ = frames.send(frame);
    }

    debug!("Remote track {} ended", track.id());
}
