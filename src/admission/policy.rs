use std::time::Duration;

/// Thresholds and lifetimes driving the admission state machine.
#[derive(Debug, Clone)]
pub struct AdmissionPolicy {
    /// Minimum spacing between two requests under the address policy.
    pub address_spacing: Duration,
    /// Spacing used for identified callers when the route declares no hint.
    pub default_spacing: Duration,
    /// Lifetime of the record that opens a window.
    pub first_record_ttl: Duration,
    /// Lifetime of a record inserted by a spacing violation.
    pub spacing_record_ttl: Duration,
    /// Lifetime of a regular or capacity record.
    pub record_ttl: Duration,
    /// Block opened on a spacing violation.
    pub spacing_block: Duration,
    /// Retry offset reported to the caller on a spacing violation.
    /// Deliberately longer than `spacing_block`.
    pub spacing_advertised: Duration,
    /// Tracked record count at which the capacity rule fires.
    pub capacity: usize,
    /// Block opened by the capacity and burst rules.
    pub penalty_block: Duration,
    /// Minimum tracked records before the burst rule is evaluated.
    pub burst_min_records: usize,
    /// Mean inter-arrival gap under which the burst rule fires.
    pub burst_mean_gap: Duration,
}

impl Default for AdmissionPolicy {
    fn default() -> Self {
        Self {
            address_spacing: Duration::from_millis(4000),
            default_spacing: Duration::from_millis(3000),
            first_record_ttl: Duration::from_secs(15),
            spacing_record_ttl: Duration::from_secs(5),
            record_ttl: Duration::from_secs(20),
            spacing_block: Duration::from_secs(5),
            spacing_advertised: Duration::from_millis(10000),
            capacity: 100,
            penalty_block: Duration::from_secs(30),
            burst_min_records: 5,
            burst_mean_gap: Duration::from_millis(5000),
        }
    }
}

impl AdmissionPolicy {
    /// Spacing threshold for a request.
    pub fn spacing_threshold(&self, timeout_hint: Option<Duration>, use_address_policy: bool) -> Duration {
        if use_address_policy {
            self.address_spacing
        } else {
            timeout_hint.unwrap_or(self.default_spacing)
        }
    }

    /// Routes with an explicit hint and a non-address caller are exempt from the burst rule.
    pub fn burst_rule_applies(&self, timeout_hint: Option<Duration>, use_address_policy: bool) -> bool {
        use_address_policy || timeout_hint.is_none()
    }
}
