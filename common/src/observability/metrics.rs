//! Prometheus metrics (Rust `prometheus` crate).
//!
//! One `MetricsContext` is intended per process. Each binary owns its registry
//! and controls which metrics it reports.

use anyhow::Result;
use hyper::service::{make_service_fn, service_fn};
use hyper::{Body, Method, Request, Response, Server, StatusCode};
use prometheus::{Encoder, Histogram, HistogramOpts, IntCounter, Opts, Registry, TextEncoder};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::task::JoinHandle;

/// Configuration for the built-in Prometheus scrape endpoint.
#[derive(Debug, Clone)]
pub struct MetricsServerConfig {
    // ---
    /// Address to bind, e.g. `127.0.0.1:9100`.
    pub bind: SocketAddr,
}

impl MetricsServerConfig {
    // ---
    pub fn new(bind: SocketAddr) -> Self {
        // ---
        Self { bind }
    }
}

/// Prometheus metrics registry + handles.
///
/// This is a thin, explicit wrapper around the `prometheus` crate so hot-path
/// instrumentation is just counter increments / histogram observations.
#[derive(Clone)]
pub struct MetricsContext {
    // ---
    registry: Registry,

    /// Audio packets sent by the streaming loop.
    pub audio_packets_sent_total: IntCounter,

    /// Audio payload bytes sent by the streaming loop.
    pub audio_bytes_sent_total: IntCounter,

    /// Sync packets emitted by the control endpoint.
    pub sync_packets_sent_total: IntCounter,

    /// Individual packets served from the backlog in response to a
    /// retransmit request.
    pub retransmits_served_total: IntCounter,

    /// Requested sequence numbers that were not present in the backlog.
    pub retransmit_misses_total: IntCounter,

    /// Keep-alive FEEDBACK round-trips that returned successfully.
    pub keep_alive_success_total: IntCounter,

    /// Keep-alive FEEDBACK round-trips that failed.
    pub keep_alive_failure_total: IntCounter,

    /// Additional packets sent by the compensation branch of the
    /// streaming loop, per catch-up event.
    pub compensation_packets_sent: Histogram,

    /// Frames the streaming loop was behind schedule at each tick.
    pub frames_behind: Histogram,
}

impl MetricsContext {
    // ---
    /// Create a new registry and register the standard metrics.
    ///
    /// `process_name` is applied as a constant label (`process=<name>`).
    pub fn new(process_name: &str) -> Result<Self> {
        // ---
        let registry = Registry::new_custom(
            Some("raop_engine".into()),
            Some(prometheus::labels! { "process".to_string() => process_name.to_string() }),
        )?;

        let audio_packets_sent_total = IntCounter::with_opts(Opts::new(
            "audio_packets_sent_total",
            "Total RAOP audio packets sent",
        ))?;
        let audio_bytes_sent_total = IntCounter::with_opts(Opts::new(
            "audio_bytes_sent_total",
            "Total RAOP audio payload bytes sent",
        ))?;
        let sync_packets_sent_total = IntCounter::with_opts(Opts::new(
            "sync_packets_sent_total",
            "Total sync packets emitted on the control channel",
        ))?;
        let retransmits_served_total = IntCounter::with_opts(Opts::new(
            "retransmits_served_total",
            "Total packets re-sent in response to a retransmit request",
        ))?;
        let retransmit_misses_total = IntCounter::with_opts(Opts::new(
            "retransmit_misses_total",
            "Total requested sequence numbers missing from the backlog",
        ))?;
        let keep_alive_success_total = IntCounter::with_opts(Opts::new(
            "keep_alive_success_total",
            "Total successful keep-alive FEEDBACK round-trips",
        ))?;
        let keep_alive_failure_total = IntCounter::with_opts(Opts::new(
            "keep_alive_failure_total",
            "Total failed keep-alive FEEDBACK round-trips",
        ))?;

        let compensation_packets_sent = Histogram::with_opts(HistogramOpts::new(
            "compensation_packets_sent",
            "Extra packets sent per catch-up event in the streaming loop",
        ))?;
        let frames_behind = Histogram::with_opts(HistogramOpts::new(
            "frames_behind",
            "Frames the streaming loop was behind schedule at each tick",
        ))?;

        registry.register(Box::new(audio_packets_sent_total.clone()))?;
        registry.register(Box::new(audio_bytes_sent_total.clone()))?;
        registry.register(Box::new(sync_packets_sent_total.clone()))?;
        registry.register(Box::new(retransmits_served_total.clone()))?;
        registry.register(Box::new(retransmit_misses_total.clone()))?;
        registry.register(Box::new(keep_alive_success_total.clone()))?;
        registry.register(Box::new(keep_alive_failure_total.clone()))?;
        registry.register(Box::new(compensation_packets_sent.clone()))?;
        registry.register(Box::new(frames_behind.clone()))?;

        Ok(Self {
            registry,
            audio_packets_sent_total,
            audio_bytes_sent_total,
            sync_packets_sent_total,
            retransmits_served_total,
            retransmit_misses_total,
            keep_alive_success_total,
            keep_alive_failure_total,
            compensation_packets_sent,
            frames_behind,
        })
    }

    /// Gather metric families from this registry.
    pub fn gather(&self) -> Vec<prometheus::proto::MetricFamily> {
        // ---
        self.registry.gather()
    }

    /// Spawns a minimal HTTP server that serves `GET /metrics`.
    ///
    /// This is intentionally explicit (callers decide whether to run it).
    pub fn spawn_metrics_server(&self, cfg: MetricsServerConfig) -> JoinHandle<Result<()>> {
        // ---
        let registry = Arc::new(self.registry.clone());
        tokio::spawn(async move {
            // ---
            let make_svc = make_service_fn(move |_conn| {
                let registry = Arc::clone(&registry);
                async move {
                    Ok::<_, hyper::Error>(service_fn(move |req| {
                        let registry = Arc::clone(&registry);
                        async move { handle_metrics_request(req, registry).await }
                    }))
                }
            });

            let server = Server::bind(&cfg.bind).serve(make_svc);
            server.await.map_err(|e| anyhow::anyhow!(e))?;
            Ok(())
        })
    }
}

async fn handle_metrics_request(
    req: Request<Body>,
    registry: Arc<Registry>,
) -> Result<Response<Body>, hyper::Error> {
    match (req.method(), req.uri().path()) {
        (&Method::GET, "/metrics") => {
            let encoder = TextEncoder::new();
            let metric_families = registry.gather();
            let mut buffer = Vec::new();

            if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
                let mut resp = Response::new(Body::from(format!("encode error: {e}")));
                *resp.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
                return Ok(resp);
            }

            let mut resp = Response::new(Body::from(buffer));
            resp.headers_mut().insert(
                hyper::header::CONTENT_TYPE,
                hyper::header::HeaderValue::from_static("text/plain; version=0.0.4"),
            );
            Ok(resp)
        }
        _ => {
            let mut resp = Response::new(Body::from("not found"));
            *resp.status_mut() = StatusCode::NOT_FOUND;
            Ok(resp)
        }
    }
}
