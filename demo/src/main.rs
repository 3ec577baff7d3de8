//! RAOP streaming demo.
//!
//! Reads a WAV file and streams it to a RAOP (AirPlay v1) receiver whose
//! ports are already known, using a mock RTSP collaborator in place of a
//! real ANNOUNCE/SETUP/RECORD exchange (out of scope for the engine
//! itself — see `raop::rtsp`).

mod listener;
mod mock_rtsp;
mod wav;

use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use raop_common::{ColorWhen, MetricsServerConfig};
use tokio::net::UdpSocket;
use tracing::info;

use listener::LoggingListener;
use mock_rtsp::MockRtspCollaborator;
use raop::metadata::AudioMetadata;
use raop::session::RaopSession;
use wav::WavSource;

/// Stream a WAV file to a RAOP (AirPlay v1) receiver.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Input audio file (WAV format).
    #[arg(short, long)]
    input: String,

    /// Receiver's IP address.
    #[arg(short, long)]
    remote: IpAddr,

    /// Receiver's audio (RTP) port.
    #[arg(long, default_value = "6000")]
    server_port: u16,

    /// Receiver's control port.
    #[arg(long, default_value = "6001")]
    control_port: u16,

    /// Receiver's timing port.
    #[arg(long, default_value = "6002")]
    timing_port: u16,

    /// Track title, artist, album metadata to send (optional).
    #[arg(long)]
    title: Option<String>,
    #[arg(long)]
    artist: Option<String>,
    #[arg(long)]
    album: Option<String>,

    /// Legacy pairing credentials, used only when the receiver doesn't
    /// advertise MFiSAP.
    #[arg(long)]
    credentials: Option<String>,

    /// Bind address for the Prometheus `/metrics` endpoint. Omit to
    /// disable metrics entirely.
    #[arg(long)]
    metrics_addr: Option<SocketAddr>,

    /// When to use ANSI colors in log output.
    #[arg(long, value_enum, default_value = "auto")]
    color: CliColor,
}

#[derive(Debug, Clone, Copy, clap::ValueEnum)]
enum CliColor {
    Auto,
    Always,
    Never,
}

impl From<CliColor> for ColorWhen {
    fn from(value: CliColor) -> Self {
        match value {
            CliColor::Auto => ColorWhen::Auto,
            CliColor::Always => ColorWhen::Always,
            CliColor::Never => ColorWhen::Never,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    raop_common::init_tracing(args.color.into())?;

    info!("starting RAOP demo");
    info!("input file: {}", args.input);
    info!("remote receiver: {}", args.remote);

    let metrics = match args.metrics_addr {
        Some(bind) => {
            let ctx = raop_common::MetricsContext::new("raop-demo")
                .context("failed to initialize metrics registry")?;
            ctx.spawn_metrics_server(MetricsServerConfig::new(bind));
            info!("metrics listening on http://{bind}/metrics");
            Some(ctx)
        }
        None => None,
    };

    let input = args.input.clone();
    let source = tokio::task::spawn_blocking(move || WavSource::open(input))
        .await
        .context("WAV reading task failed")??;

    let local_ip = local_ip_towards(args.remote).await?;
    info!("local address: {local_ip}");

    let rtsp = Arc::new(MockRtspCollaborator::new(
        local_ip,
        args.remote,
        args.server_port,
        args.control_port,
        args.timing_port,
    ));

    let mut session = RaopSession::with_metrics(rtsp, args.credentials, metrics);

    let listener: Arc<dyn raop::RaopListener> = Arc::new(LoggingListener);
    session.set_listener(&listener);

    let mut properties: HashMap<String, String> = HashMap::new();
    properties.insert("et".to_string(), "0".to_string());
    properties.insert("md".to_string(), "0,1,2".to_string());
    properties.insert("sr".to_string(), source.sample_rate().to_string());
    properties.insert("ch".to_string(), source.channels().to_string());
    properties.insert("ss".to_string(), "16".to_string());

    session
        .initialize(&properties)
        .await
        .context("failed to initialize RAOP session")?;

    let metadata = AudioMetadata::new(
        args.title.unwrap_or_default(),
        args.artist.unwrap_or_default(),
        args.album.unwrap_or_default(),
    );

    let source: Box<dyn raop::pcm::PcmSource> = Box::new(source);
    session
        .send_audio(source, metadata)
        .await
        .context("streaming failed")?;

    info!("done");
    Ok(())
}

/// Determines the local address the kernel would use to reach `remote`,
/// by "connecting" a UDP socket (no packets are actually sent for a
/// connect call) and reading back its local endpoint.
async fn local_ip_towards(remote: IpAddr) -> Result<IpAddr> {
    let bind_addr = if remote.is_ipv4() {
        "0.0.0.0:0"
    } else {
        "[::]:0"
    };
    let socket = UdpSocket::bind(bind_addr).await?;
    socket.connect((remote, 1)).await?;
    Ok(socket.local_addr()?.ip())
}
