use lazy_static::lazy_static;
use prometheus::{
    Counter, CounterVec, Gauge, Histogram, register_counter, register_counter_vec, register_gauge,
    register_histogram,
};

lazy_static! {
    pub static ref REQUEST_TOTAL: Counter =
        register_counter!("gateway_requests_total", "Total number of dispatched requests").unwrap();
    pub static ref ADMISSION_DECISIONS: CounterVec = register_counter_vec!(
        "gateway_admission_decisions_total",
        "Admission decisions by outcome",
        &["outcome"]
    )
    .unwrap();
    // summed over every admission controller in the process
    pub static ref LIVE_WINDOWS: Gauge =
        register_gauge!("gateway_live_windows", "Identities with tracked admission state").unwrap();
    pub static ref HANDLER_TIMEOUTS: Counter =
        register_counter!("gateway_handler_timeouts_total", "Handlers cut off by the deadline guard").unwrap();
    pub static ref HANDLER_LATENCY: Histogram = register_histogram!(
        "gateway_handler_latency_seconds",
        "Route handler latency in seconds"
    )
    .unwrap();
}
