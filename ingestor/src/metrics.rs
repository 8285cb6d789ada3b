use lazy_static::lazy_static;
use prometheus::{Counter, Encoder, Gauge, Histogram, HistogramOpts, Opts, Registry, TextEncoder};
use tracing::error;

lazy_static! {
    pub static ref REGISTRY: Registry = Registry::new();
    pub static ref POLLS_TOTAL: Counter = Counter::with_opts(Opts::new(
        "lora_ingestor_polls_total",
        "Total poll cycles started"
    ))
    .unwrap();
    pub static ref FETCH_FAILURES_TOTAL: Counter = Counter::with_opts(Opts::new(
        "lora_ingestor_fetch_failures_total",
        "Total failed upstream fetches"
    ))
    .unwrap();
    pub static ref READINGS_RECEIVED_TOTAL: Counter = Counter::with_opts(Opts::new(
        "lora_ingestor_readings_received_total",
        "Total raw readings received from upstream"
    ))
    .unwrap();
    pub static ref READINGS_SKIPPED_TOTAL: Counter = Counter::with_opts(Opts::new(
        "lora_ingestor_readings_skipped_total",
        "Total raw readings dropped during normalization"
    ))
    .unwrap();
    pub static ref ROWS_PERSISTED_TOTAL: Counter = Counter::with_opts(Opts::new(
        "lora_ingestor_rows_persisted_total",
        "Total telemetry rows committed"
    ))
    .unwrap();
    pub static ref PERSIST_FAILURES_TOTAL: Counter = Counter::with_opts(Opts::new(
        "lora_ingestor_persist_failures_total",
        "Total batches discarded after a failed write"
    ))
    .unwrap();
    pub static ref ALERTS_RAISED_TOTAL: Counter = Counter::with_opts(Opts::new(
        "lora_ingestor_alerts_raised_total",
        "Total fire-risk alerts let through the cooldown gate"
    ))
    .unwrap();
    pub static ref ALERTS_SUPPRESSED_TOTAL: Counter = Counter::with_opts(Opts::new(
        "lora_ingestor_alerts_suppressed_total",
        "Total fire-risk alerts suppressed by cooldown"
    ))
    .unwrap();
    pub static ref NOTIFICATIONS_SENT_TOTAL: Counter = Counter::with_opts(Opts::new(
        "lora_ingestor_notifications_sent_total",
        "Total alert notifications delivered"
    ))
    .unwrap();
    pub static ref NOTIFICATIONS_FAILED_TOTAL: Counter = Counter::with_opts(Opts::new(
        "lora_ingestor_notifications_failed_total",
        "Total alert notifications that failed to deliver"
    ))
    .unwrap();
    pub static ref NOTIFICATIONS_UNCONFIGURED_TOTAL: Counter = Counter::with_opts(Opts::new(
        "lora_ingestor_notifications_unconfigured_total",
        "Total alert notifications skipped because the channel is not configured"
    ))
    .unwrap();
    pub static ref COOLDOWN_ENTRIES: Gauge = Gauge::with_opts(Opts::new(
        "lora_ingestor_cooldown_entries",
        "Number of tracked cooldown keys"
    ))
    .unwrap();
    pub static ref CYCLE_LATENCY_SECONDS: Histogram = Histogram::with_opts(
        HistogramOpts::new(
            "lora_ingestor_cycle_latency_seconds",
            "Time taken by one fetch-normalize-persist-evaluate cycle"
        )
        .buckets(vec![0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0])
    )
    .unwrap();
}

pub fn init_metrics() -> prometheus::Result<()> {
    REGISTRY.register(Box::new(POLLS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(FETCH_FAILURES_TOTAL.clone()))?;
    REGISTRY.register(Box::new(READINGS_RECEIVED_TOTAL.clone()))?;
    REGISTRY.register(Box::new(READINGS_SKIPPED_TOTAL.clone()))?;
    REGISTRY.register(Box::new(ROWS_PERSISTED_TOTAL.clone()))?;
    REGISTRY.register(Box::new(PERSIST_FAILURES_TOTAL.clone()))?;
    REGISTRY.register(Box::new(ALERTS_RAISED_TOTAL.clone()))?;
    REGISTRY.register(Box::new(ALERTS_SUPPRESSED_TOTAL.clone()))?;
    REGISTRY.register(Box::new(NOTIFICATIONS_SENT_TOTAL.clone()))?;
    REGISTRY.register(Box::new(NOTIFICATIONS_FAILED_TOTAL.clone()))?;
    REGISTRY.register(Box::new(NOTIFICATIONS_UNCONFIGURED_TOTAL.clone()))?;
    REGISTRY.register(Box::new(COOLDOWN_ENTRIES.clone()))?;
    REGISTRY.register(Box::new(CYCLE_LATENCY_SECONDS.clone()))?;
    Ok(())
}

pub fn gather_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        error!("Failed to encode metrics: {}", e);
        return String::new();
    }
    String::from_utf8_lossy(&buffer).into_owned()
}
