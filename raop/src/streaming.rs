//! Streaming Loop (§4.7): the real-time scheduler that reads PCM frames,
//! builds audio packets, paces transmission to the receiver's
//! consumption rate, and compensates when scheduling jitter puts it
//! behind.

use std::time::{Duration, Instant};

use tracing::{debug, warn};

use crate::backlog::SharedBacklog;
use crate::context::{SharedContext, FRAMES_PER_PACKET};
use crate::packet::{build_alac_body, AudioPacketHeader};
use crate::pcm::PcmSource;
use crate::stats::Statistics;
use crate::udp::AudioSender;

/// Maximum number of extra packets sent in one tick to catch up when
/// behind schedule (§6).
pub const MAX_PACKETS_COMPENSATE: u32 = 3;

enum SendOutcome {
    // ---
    Sent(u64),
    EndOfStream,
    Closed,
}

fn build_audio_packet(
    channels: u16,
    session_id: u32,
    seq: u16,
    timestamp: u32,
    first_packet: bool,
    pcm: &[u8],
) -> Vec<u8> {
    // ---
    let header = if first_packet {
        AudioPacketHeader::first(seq, timestamp, session_id)
    } else {
        AudioPacketHeader::subsequent(seq, timestamp, session_id)
    };

    let mut packet = header.encode().to_vec();
    packet.extend(build_alac_body(channels as u8, pcm));
    packet
}

async fn send_one_packet(
    context: &SharedContext,
    backlog: &SharedBacklog,
    audio: &AudioSender,
    source: &mut dyn PcmSource,
    first_packet: bool,
    metrics: Option<&raop_common::MetricsContext>,
) -> std::io::Result<SendOutcome> {
    // ---
    let frames = source.read_frames(FRAMES_PER_PACKET as usize).await?;
    if frames.is_empty() {
        return Ok(SendOutcome::EndOfStream);
    }

    if audio.is_closing() {
        warn!("connection closed while streaming audio");
        return Ok(SendOutcome::Closed);
    }

    let (packet, seq, frame_count) = {
        let ctx = context.lock().expect("context mutex poisoned");
        let frame_size = ctx.channels as usize * ctx.bytes_per_channel as usize;
        let frame_count = frames.len() / frame_size;
        let packet = build_audio_packet(
            ctx.channels,
            ctx.session_id,
            ctx.rtpseq,
            ctx.head_ts,
            first_packet,
            &frames,
        );
        (packet, ctx.rtpseq, frame_count)
    };

    {
        let mut backlog = backlog.lock().expect("backlog mutex poisoned");
        backlog.insert(seq, packet.clone());
    }

    let sent = audio.send(&packet).await;
    if let Some(m) = metrics {
        if sent {
            m.audio_packets_sent_total.inc();
            m.audio_bytes_sent_total.inc_by(packet.len() as u64);
        }
    }
    if !sent {
        return Ok(SendOutcome::Closed);
    }

    {
        let mut ctx = context.lock().expect("context mutex poisoned");
        ctx.advance(frame_count as u32);
    }

    Ok(SendOutcome::Sent(frame_count as u64))
}

/// Drives the pacing loop until the PCM source is exhausted or the audio
/// socket closes. Returns once the post-loop drain sleep has elapsed.
pub async fn run(
    context: SharedContext,
    backlog: SharedBacklog,
    audio: &AudioSender,
    mut source: Box<dyn PcmSource>,
    metrics: Option<raop_common::MetricsContext>,
) -> std::io::Result<()> {
    // ---
    let (sample_rate, latency) = {
        let ctx = context.lock().expect("context mutex poisoned");
        (ctx.sample_rate, ctx.latency)
    };

    let packets_per_second = sample_rate as f64 / FRAMES_PER_PACKET as f64;
    let packet_interval = Duration::from_secs_f64(1.0 / packets_per_second);

    let mut stats = Statistics::new(sample_rate);
    let mut first_packet = true;

    loop {
        let start_time = Instant::now();

        let outcome = send_one_packet(
            &context,
            &backlog,
            audio,
            source.as_mut(),
            first_packet,
            metrics.as_ref(),
        )
        .await?;
        first_packet = false;

        let sent = match outcome {
            SendOutcome::Sent(frames) => frames,
            SendOutcome::EndOfStream | SendOutcome::Closed => break,
        };
        stats.tick(sent);

        let frames_behind = stats.frames_behind();
        if let Some(m) = &metrics {
            m.frames_behind.observe(frames_behind as f64);
        }

        if frames_behind >= FRAMES_PER_PACKET as i64 {
            let max_packets =
                ((frames_behind / FRAMES_PER_PACKET as i64) as u32).min(MAX_PACKETS_COMPENSATE);
            debug!("compensating with {max_packets} packets ({frames_behind} frames behind)");

            let mut compensated = 0u32;
            let mut exhausted = false;
            for _ in 0..max_packets {
                let outcome = send_one_packet(
                    &context,
                    &backlog,
                    audio,
                    source.as_mut(),
                    false,
                    metrics.as_ref(),
                )
                .await?;
                match outcome {
                    SendOutcome::Sent(frames) => {
                        stats.tick(frames);
                        compensated += 1;
                    }
                    SendOutcome::EndOfStream | SendOutcome::Closed => {
                        exhausted = true;
                        break;
                    }
                }
            }
            if let Some(m) = &metrics {
                m.compensation_packets_sent.observe(compensated as f64);
            }
            if exhausted {
                break;
            }
        }

        if stats.interval_completed() {
            let (elapsed, frames) = stats.new_interval();
            debug!(
                "sent {frames} frames in {elapsed:.6}s (total: {}, expected: {})",
                stats.total_frames(),
                stats.expected_frame_count()
            );
        }

        let processing_time = start_time.elapsed();
        if processing_time < packet_interval {
            // Deliberate under-sleep: biases the loop to run slightly
            // fast so `frames_behind` stays small and positive, and the
            // compensation branch above — not the receiver's jitter
            // buffer — absorbs scheduling noise.
            tokio::time::sleep(packet_interval.saturating_sub(processing_time * 2)).await;
        } else {
            let seq = context.lock().expect("context mutex poisoned").rtpseq.wrapping_sub(1);
            warn!(
                "too slow to keep up for seqno {seq} ({:.6}s > {:.6}s)",
                processing_time.as_secs_f64(),
                packet_interval.as_secs_f64()
            );
        }
    }

    debug!(
        "audio finished sending in {:.6}s",
        (crate::timestamp::monotonic_ns() - stats.start_time_ns()) as f64 / 1e9
    );

    tokio::time::sleep(Duration::from_secs_f64(latency as f64 / sample_rate as f64)).await;
    Ok(())
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;
    use crate::backlog::PacketBacklog;
    use crate::context::SessionContext;
    use crate::pcm::test_support::MemoryPcmSource;
    use std::net::{Ipv4Addr, SocketAddr};
    use std::sync::{Arc, Mutex};

    async fn make_audio_sender() -> AudioSender {
        // ---
        let remote = SocketAddr::new(Ipv4Addr::LOCALHOST.into(), 1);
        AudioSender::connect(remote).await.expect("connect")
    }

    #[tokio::test]
    async fn sends_exactly_the_expected_number_of_packets() {
        // ---
        let mut ctx = SessionContext::new();
        ctx.sample_rate = 44_100;
        ctx.channels = 2;
        ctx.bytes_per_channel = 2;
        let start_ts = ctx.head_ts;
        let context: SharedContext = Arc::new(Mutex::new(ctx));
        let backlog: SharedBacklog = Arc::new(Mutex::new(PacketBacklog::default()));
        let audio = make_audio_sender().await;

        let total_packets = 200usize;
        let frames = total_packets * FRAMES_PER_PACKET as usize;
        let source: Box<dyn PcmSource> =
            Box::new(MemoryPcmSource::silence(frames, 2, 2));

        run(context.clone(), backlog.clone(), &audio, source, None)
            .await
            .expect("run should succeed");

        let ctx = context.lock().unwrap();
        assert_eq!(
            ctx.head_ts,
            start_ts.wrapping_add(total_packets as u32 * FRAMES_PER_PACKET)
        );
        assert_eq!(backlog.lock().unwrap().len(), total_packets.min(1000));
    }

    #[tokio::test]
    async fn short_final_read_still_sends_one_last_packet() {
        // ---
        let context: SharedContext = Arc::new(Mutex::new(SessionContext::new()));
        let backlog: SharedBacklog = Arc::new(Mutex::new(PacketBacklog::default()));
        let audio = make_audio_sender().await;
        let start_ts = context.lock().unwrap().head_ts;

        // One full packet plus a short, partial final packet.
        let short_frames = FRAMES_PER_PACKET as usize + 100;
        let source: Box<dyn PcmSource> =
            Box::new(MemoryPcmSource::silence(short_frames, 2, 2));

        run(context.clone(), backlog.clone(), &audio, source, None)
            .await
            .expect("run should succeed");

        let ctx = context.lock().unwrap();
        assert_eq!(ctx.head_ts, start_ts.wrapping_add(short_frames as u32));
    }
}
