use actix_web::HttpResponse;
use once_cell::sync::Lazy;
use prometheus::{Encoder, HistogramOpts, HistogramVec, IntCounterVec, Opts, TextEncoder};

static SESSION_ROTATIONS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    let counter = IntCounterVec::new(
        Opts::new(
            "review_service_session_rotations_total",
            "Session rotation attempts by outcome",
        ),
        &["outcome"],
    )
    .expect("failed to create review_service_session_rotations_total");
    prometheus::default_registry()
        .register(Box::new(counter.clone()))
        .expect("failed to register review_service_session_rotations_total");
    counter
});

static DELEGATED_REFRESHES_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    let counter = IntCounterVec::new(
        Opts::new(
            "review_service_delegated_refreshes_total",
            "Delegated credential refreshes by outcome",
        ),
        &["outcome"],
    )
    .expect("failed to create review_service_delegated_refreshes_total");
    prometheus::default_registry()
        .register(Box::new(counter.clone()))
        .expect("failed to register review_service_delegated_refreshes_total");
    counter
});

static PUBLISH_ATTEMPTS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    let counter = IntCounterVec::new(
        Opts::new(
            "review_service_publish_attempts_total",
            "Publish attempts by outcome",
        ),
        &["outcome"],
    )
    .expect("failed to create review_service_publish_attempts_total");
    prometheus::default_registry()
        .register(Box::new(counter.clone()))
        .expect("failed to register review_service_publish_attempts_total");
    counter
});

static ASSET_TRANSITIONS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    let counter = IntCounterVec::new(
        Opts::new(
            "review_service_asset_transitions_total",
            "Asset review transitions by target status",
        ),
        &["to"],
    )
    .expect("failed to create review_service_asset_transitions_total");
    prometheus::default_registry()
        .register(Box::new(counter.clone()))
        .expect("failed to register review_service_asset_transitions_total");
    counter
});

static PUBLISH_DURATION_SECONDS: Lazy<HistogramVec> = Lazy::new(|| {
    let histogram = HistogramVec::new(
        HistogramOpts::new(
            "review_service_publish_duration_seconds",
            "Wall time of the platform upload",
        )
        .buckets(vec![1.0, 5.0, 15.0, 30.0, 60.0, 120.0, 300.0, 600.0, 1800.0]),
        &["outcome"],
    )
    .expect("failed to create review_service_publish_duration_seconds");
    prometheus::default_registry()
        .register(Box::new(histogram.clone()))
        .expect("failed to register review_service_publish_duration_seconds");
    histogram
});

pub fn record_session_rotation(outcome: &str) {
    SESSION_ROTATIONS_TOTAL.with_label_values(&[outcome]).inc();
}

pub fn record_delegated_refresh(outcome: &str) {
    DELEGATED_REFRESHES_TOTAL.with_label_values(&[outcome]).inc();
}

pub fn record_publish(outcome: &str, elapsed: std::time::Duration) {
    PUBLISH_ATTEMPTS_TOTAL.with_label_values(&[outcome]).inc();
    PUBLISH_DURATION_SECONDS
        .with_label_values(&[outcome])
        .observe(elapsed.as_secs_f64());
}

pub fn record_transition(to: &str) {
    ASSET_TRANSITIONS_TOTAL.with_label_values(&[to]).inc();
}

pub async fn serve_metrics() -> HttpResponse {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();

    let mut buffer = Vec::new();
    if let Err(err) = encoder.encode(&metric_families, &mut buffer) {
        return HttpResponse::InternalServerError().body(err.to_string());
    }

    HttpResponse::Ok()
        .content_type(encoder.format_type())
        .body(buffer)
}
