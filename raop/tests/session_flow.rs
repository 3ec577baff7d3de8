//! End-to-end scenarios driving a real `RaopSession` against a fake
//! receiver bound to loopback UDP sockets, mirroring spec.md §8's S1/S5/S6
//! scenarios (S2/S3/S4 are covered at the component level by
//! `src/udp/control.rs` and `src/streaming.rs`'s own test modules).

use std::collections::HashMap;
use std::net::{IpAddr, Ipv4Addr};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::net::UdpSocket;
use tokio::sync::Mutex as AsyncMutex;

use raop::metadata::{AudioMetadata, PlaybackInfo};
use raop::pcm::PcmSource;
use raop::rtsp::{
    ConnectionInfo, FeedbackResponse, RtspCollaborator, RtspError, SetupResponse, TransportHeader,
};
use raop::session::{RaopListener, RaopSession};

struct TestRtsp {
    local_ip: IpAddr,
    remote_ip: IpAddr,
    remote_server_port: u16,
    remote_control_port: u16,
    feedback_code: u16,
}

#[async_trait]
impl RtspCollaborator for TestRtsp {
    async fn auth_setup(&self) -> Result<(), RtspError> {
        Ok(())
    }

    async fn verify_legacy_pairing(&self, _credentials: &str) -> Result<(), RtspError> {
        Ok(())
    }

    async fn announce(&self) -> Result<(), RtspError> {
        Ok(())
    }

    async fn setup(
        &self,
        local_control_port: u16,
        local_timing_port: u16,
    ) -> Result<SetupResponse, RtspError> {
        let transport = TransportHeader::parse(&format!(
            "RTP/AVP/UDP;unicast;mode=record;control_port={};timing_port={};server_port={}",
            self.remote_control_port, local_timing_port, self.remote_server_port
        ));
        let _ = local_control_port;
        Ok(SetupResponse {
            transport,
            session: "test-session".to_string(),
        })
    }

    async fn record(&self, _rtpseq: u16, _rtptime: u32) -> Result<(), RtspError> {
        Ok(())
    }

    async fn set_parameter(&self, _name: &str, _value: &str) -> Result<(), RtspError> {
        Ok(())
    }

    async fn set_metadata(
        &self,
        _rtpseq: u16,
        _rtptime: u32,
        _metadata: &AudioMetadata,
    ) -> Result<(), RtspError> {
        Ok(())
    }

    async fn feedback(&self, _allow_error: bool) -> Result<FeedbackResponse, RtspError> {
        Ok(FeedbackResponse {
            code: self.feedback_code,
        })
    }

    fn connection_info(&self) -> ConnectionInfo {
        ConnectionInfo {
            local_ip: self.local_ip,
            remote_ip: self.remote_ip,
        }
    }
}

struct RecordingListener {
    playing_calls: AtomicUsize,
    stopped_calls: AtomicUsize,
    last_playback_info: AsyncMutex<Option<PlaybackInfo>>,
}

impl RecordingListener {
    fn new() -> Self {
        Self {
            playing_calls: AtomicUsize::new(0),
            stopped_calls: AtomicUsize::new(0),
            last_playback_info: AsyncMutex::new(None),
        }
    }
}

impl RaopListener for RecordingListener {
    fn playing(&self, playback_info: PlaybackInfo) {
        self.playing_calls.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut guard) = self.last_playback_info.try_lock() {
            *guard = Some(playback_info);
        }
    }

    fn stopped(&self) {
        self.stopped_calls.fetch_add(1, Ordering::SeqCst);
    }
}

struct SilenceSource {
    remaining_frames: usize,
}

#[async_trait]
impl PcmSource for SilenceSource {
    async fn read_frames(&mut self, n: usize) -> std::io::Result<Vec<u8>> {
        let take = n.min(self.remaining_frames);
        self.remaining_frames -= take;
        Ok(vec![0u8; take * 2 * 2])
    }

    fn duration(&self) -> f64 {
        self.remaining_frames as f64 / 44_100.0
    }
}

fn unencrypted_properties() -> HashMap<String, String> {
    let mut props = HashMap::new();
    props.insert("et".to_string(), "0".to_string());
    props.insert("md".to_string(), "0,1,2".to_string());
    props.insert("sr".to_string(), "44100".to_string());
    props.insert("ch".to_string(), "2".to_string());
    props.insert("ss".to_string(), "16".to_string());
    props
}

/// S1: happy path. A fake receiver listens on both the audio and control
/// sockets; streaming 70400 frames (200 packets) should deliver exactly
/// 200 audio datagrams, the first with payload-type `0xE0` and the rest
/// `0x60`, plus `playing`/`stopped` firing exactly once each.
#[tokio::test]
async fn s1_happy_path_delivers_every_packet_in_order() {
    let fake_audio = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let fake_control = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let audio_port = fake_audio.local_addr().unwrap().port();
    let control_port = fake_control.local_addr().unwrap().port();

    let rtsp = Arc::new(TestRtsp {
        local_ip: IpAddr::V4(Ipv4Addr::LOCALHOST),
        remote_ip: IpAddr::V4(Ipv4Addr::LOCALHOST),
        remote_server_port: audio_port,
        remote_control_port: control_port,
        feedback_code: FeedbackResponse::SUCCESS,
    });

    let mut session = RaopSession::new(rtsp, None);
    let concrete_listener = Arc::new(RecordingListener::new());
    let listener: Arc<dyn RaopListener> = concrete_listener.clone();
    session.set_listener(&listener);
    drop(listener);

    session
        .initialize(&unencrypted_properties())
        .await
        .expect("initialize should succeed");

    let total_packets = 200usize;
    let source = Box::new(SilenceSource {
        remaining_frames: total_packets * 352,
    });

    let recv_task = tokio::spawn(async move {
        let mut packets = Vec::new();
        let mut buf = vec![0u8; 2048];
        loop {
            match tokio::time::timeout(
                std::time::Duration::from_millis(500),
                fake_audio.recv_from(&mut buf),
            )
            .await
            {
                Ok(Ok((len, _))) => packets.push(buf[..len].to_vec()),
                _ => break,
            }
        }
        packets
    });

    session
        .send_audio(source, AudioMetadata::default())
        .await
        .expect("send_audio should succeed");

    let packets = recv_task.await.expect("recv task should not panic");
    assert_eq!(packets.len(), total_packets);
    assert_eq!(packets[0][1], raop::packet::AUDIO_PAYLOAD_TYPE_FIRST);
    for packet in &packets[1..] {
        assert_eq!(packet[1], raop::packet::AUDIO_PAYLOAD_TYPE_REST);
    }

    assert_eq!(concrete_listener.playing_calls.load(Ordering::SeqCst), 1);
    assert_eq!(concrete_listener.stopped_calls.load(Ordering::SeqCst), 1);

    let last_info = concrete_listener.last_playback_info.lock().await;
    assert_eq!(
        last_info.as_ref().expect("playing should have recorded info").metadata.title,
        "Streaming"
    );
}

/// S5: a FEEDBACK with an error status code during setup must not start
/// the keep-alive task, but streaming otherwise proceeds normally.
#[tokio::test]
async fn s5_feedback_error_suppresses_keep_alive_but_streaming_proceeds() {
    let fake_audio = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let audio_port = fake_audio.local_addr().unwrap().port();

    let rtsp = Arc::new(TestRtsp {
        local_ip: IpAddr::V4(Ipv4Addr::LOCALHOST),
        remote_ip: IpAddr::V4(Ipv4Addr::LOCALHOST),
        remote_server_port: audio_port,
        remote_control_port: 0,
        feedback_code: 500,
    });

    let mut session = RaopSession::new(rtsp, None);
    session
        .initialize(&unencrypted_properties())
        .await
        .expect("initialize should succeed");

    let source = Box::new(SilenceSource {
        remaining_frames: 352 * 3,
    });

    session
        .send_audio(source, AudioMetadata::default())
        .await
        .expect("send_audio should succeed even when feedback is an error");
}

/// S6: initializing with only an unrecognized encryption code fails with
/// `NotSupported`.
#[tokio::test]
async fn s6_unknown_encryption_fails_initialize() {
    let rtsp = Arc::new(TestRtsp {
        local_ip: IpAddr::V4(Ipv4Addr::LOCALHOST),
        remote_ip: IpAddr::V4(Ipv4Addr::LOCALHOST),
        remote_server_port: 0,
        remote_control_port: 0,
        feedback_code: FeedbackResponse::SUCCESS,
    });

    let mut session = RaopSession::new(rtsp, None);
    let mut properties = HashMap::new();
    properties.insert("et".to_string(), "99".to_string());

    let result = session.initialize(&properties).await;
    assert!(matches!(result, Err(raop::RaopError::NotSupported(_))));
}
