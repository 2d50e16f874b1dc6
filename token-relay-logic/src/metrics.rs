use lazy_static::lazy_static;
use prometheus::{IntCounterVec, IntGaugeVec, register_int_counter_vec, register_int_gauge_vec};

// Keep labels low-cardinality: contract codes, group keys and message types are bounded.
lazy_static! {
    /// Next block each scanner will fetch.
    pub static ref SCANNER_CURSOR: IntGaugeVec = register_int_gauge_vec!(
        "token_relay_scanner_cursor",
        "next unscanned block per contract",
        &["contract"],
    )
    .unwrap();

    /// Processed ranges with result label {ok, fetch_error, dispatch_error, skipped}.
    pub static ref SCANNER_RANGES: IntCounterVec = register_int_counter_vec!(
        "token_relay_scanner_ranges_total",
        "block ranges handled by scanners",
        &["contract", "result"],
    )
    .unwrap();

    pub static ref PROVIDER_ROTATIONS: IntCounterVec = register_int_counter_vec!(
        "token_relay_provider_rotations_total",
        "provider rotations per provider group",
        &["group"],
    )
    .unwrap();

    /// Alerts with kind label {block_skipped, providers_exhausted}.
    pub static ref OPERATOR_ALERTS: IntCounterVec = register_int_counter_vec!(
        "token_relay_operator_alerts_total",
        "events that need operator attention",
        &["kind"],
    )
    .unwrap();

    pub static ref RELAY_BUNDLES: IntCounterVec = register_int_counter_vec!(
        "token_relay_relay_bundles_total",
        "meta-transaction bundles by submission result",
        &["result"],
    )
    .unwrap();

    pub static ref HANDLER_OUTCOMES: IntCounterVec = register_int_counter_vec!(
        "token_relay_handler_outcomes_total",
        "terminal handler outcomes per message type",
        &["type", "outcome"],
    )
    .unwrap();
}

pub fn alert(kind: &str) {
    OPERATOR_ALERTS.with_label_values(&[kind]).inc();
}
