//! The RAOP (AirPlay v1) streaming engine.
//!
//! Streams PCM audio to a remote RAOP receiver over UDP with
//! bit-accurate timing: packetization, sync-packet emission, retransmit
//! service, timing reflection, and real-time pacing. RTSP signalling,
//! MFiSAP/legacy-pairing cryptography, service discovery, and audio
//! decoding are external collaborators — see [`rtsp`] and [`pcm`] for
//! the seams this crate depends on rather than implements.

pub mod backlog;
pub mod context;
pub mod error;
pub mod metadata;
pub mod packet;
pub mod pcm;
pub mod properties;
pub mod rtsp;
pub mod session;
pub mod stats;
pub mod streaming;
pub mod timestamp;
mod udp;

pub use error::RaopError;
pub use session::{RaopListener, RaopSession, State};
pub use udp::{AudioSender, ControlEndpoint, TimingEndpoint};
