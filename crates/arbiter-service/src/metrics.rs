use prometheus::{
    register_histogram_vec, register_int_counter, register_int_counter_vec, Encoder,
    HistogramVec, IntCounter, IntCounterVec, TextEncoder,
};
use std::sync::LazyLock;

pub static FORCE_PAYMENT_REQUESTS: LazyLock<IntCounterVec> = LazyLock::new(|| {
    register_int_counter_vec!(
        "arbiter_force_payment_total",
        "Force-payment requests by outcome",
        &["result"]
    )
    .unwrap()
});

pub static SETTLE_LATENCY: LazyLock<HistogramVec> = LazyLock::new(|| {
    register_histogram_vec!(
        "arbiter_settle_duration_seconds",
        "Force-payment handling latency in seconds",
        &["result"],
        vec![0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0]
    )
    .unwrap()
});

pub static NOTIFICATIONS: LazyLock<IntCounterVec> = LazyLock::new(|| {
    register_int_counter_vec!(
        "arbiter_notifications_total",
        "Settlement notifications by delivery path",
        &["result"]
    )
    .unwrap()
});

/// Sum of forced payments, saturating at u64::MAX per settlement.
pub static AMOUNT_PAID: LazyLock<IntCounter> = LazyLock::new(|| {
    register_int_counter!(
        "arbiter_amount_paid_total",
        "Total amount moved out of requestor deposits"
    )
    .unwrap()
});

pub fn metrics_output() -> String {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    if encoder.encode(&metric_families, &mut buffer).is_err() {
        return String::new();
    }
    String::from_utf8(buffer).unwrap_or_default()
}
