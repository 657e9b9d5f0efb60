use prometheus::{
    Encoder, HistogramVec, IntCounterVec, IntGauge, Opts, Registry, TextEncoder,
};

#[derive(Clone)]
pub struct Metrics {
    registry: Registry,
    pub location_updates_total: IntCounterVec,
    pub tracking_sessions_active: IntGauge,
    pub publish_total: IntCounterVec,
    pub delayed_publications_pending: IntGauge,
    pub geofence_checks_total: IntCounterVec,
    pub ingest_latency_seconds: HistogramVec,
}

impl Metrics {
    pub fn new() -> Self {
        let registry = Registry::new();

        let location_updates_total = IntCounterVec::new(
            Opts::new("location_updates_total", "Location updates by outcome"),
            &["outcome"],
        )
        .expect("valid location_updates_total metric");

        let tracking_sessions_active = IntGauge::new(
            "tracking_sessions_active",
            "Current number of active tracking sessions",
        )
        .expect("valid tracking_sessions_active metric");

        let publish_total = IntCounterVec::new(
            Opts::new("publish_total", "Published tracking events by channel and outcome"),
            &["channel", "outcome"],
        )
        .expect("valid publish_total metric");

        let delayed_publications_pending = IntGauge::new(
            "delayed_publications_pending",
            "Customer-channel publications waiting for their delay to elapse",
        )
        .expect("valid delayed_publications_pending metric");

        let geofence_checks_total = IntCounterVec::new(
            Opts::new("geofence_checks_total", "Completion geofence checks by verdict"),
            &["verdict"],
        )
        .expect("valid geofence_checks_total metric");

        let ingest_latency_seconds = HistogramVec::new(
            prometheus::HistogramOpts::new(
                "ingest_latency_seconds",
                "Latency of location ingestion in seconds",
            ),
            &["outcome"],
        )
        .expect("valid ingest_latency_seconds metric");

        registry
            .register(Box::new(location_updates_total.clone()))
            .expect("register location_updates_total");
        registry
            .register(Box::new(tracking_sessions_active.clone()))
            .expect("register tracking_sessions_active");
        registry
            .register(Box::new(publish_total.clone()))
            .expect("register publish_total");
        registry
            .register(Box::new(delayed_publications_pending.clone()))
            .expect("register delayed_publications_pending");
        registry
            .register(Box::new(geofence_checks_total.clone()))
            .expect("register geofence_checks_total");
        registry
            .register(Box::new(ingest_latency_seconds.clone()))
            .expect("register ingest_latency_seconds");

        Self {
            registry,
            location_updates_total,
            tracking_sessions_active,
            publish_total,
            delayed_publications_pending,
            geofence_checks_total,
            ingest_latency_seconds,
        }
    }

    pub fn encode(&self) -> Result<String, String> {
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();

        TextEncoder::new()
            .encode(&metric_families, &mut buffer)
            .map_err(|err| format!("failed to encode metrics: {err}"))?;

        String::from_utf8(buffer).map_err(|err| format!("metrics are not valid utf8: {err}"))
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}
