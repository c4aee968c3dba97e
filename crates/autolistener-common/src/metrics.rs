//! OpenTelemetry metrics for the listener controller
//!
//! Instruments are created lazily against the global meter, so they are
//! no-ops until `telemetry::init_telemetry` installs an OTLP meter provider.

use once_cell::sync::Lazy;
use opentelemetry::metrics::{Counter, Histogram, Meter};
use opentelemetry::{global, KeyValue};

static METER: Lazy<Meter> = Lazy::new(|| global::meter("gateway-auto-listener"));

/// Counter of reconciliation passes
///
/// Labels:
/// - `outcome`: ignored, not_found, synced, cleaned_up, error
pub static RECONCILE_TOTAL: Lazy<Counter<u64>> = Lazy::new(|| {
    METER
        .u64_counter("gateway_auto_listener_reconcile_total")
        .with_description("Total number of HTTPRoute reconciliation passes")
        .with_unit("{passes}")
        .build()
});

/// Histogram of reconciliation pass duration
pub static RECONCILE_DURATION: Lazy<Histogram<f64>> = Lazy::new(|| {
    METER
        .f64_histogram("gateway_auto_listener_reconcile_duration_seconds")
        .with_description("Duration of HTTPRoute reconciliation passes in seconds")
        .with_unit("s")
        .build()
});

/// Counter of Gateway patch attempts
///
/// Labels:
/// - `result`: applied, noop, conflict
pub static GATEWAY_PATCHES: Lazy<Counter<u64>> = Lazy::new(|| {
    METER
        .u64_counter("gateway_auto_listener_gateway_patches_total")
        .with_description("Gateway listener patch attempts by result")
        .with_unit("{patches}")
        .build()
});

/// Counter of listeners added to or removed from the Gateway
///
/// Labels:
/// - `change`: added, removed
pub static LISTENER_CHANGES: Lazy<Counter<u64>> = Lazy::new(|| {
    METER
        .u64_counter("gateway_auto_listener_listener_changes_total")
        .with_description("Listeners added to or removed from the Gateway")
        .with_unit("{listeners}")
        .build()
});

/// Counter of hostnames rejected by the namespace hostname policy
pub static HOSTNAME_DENIALS: Lazy<Counter<u64>> = Lazy::new(|| {
    METER
        .u64_counter("gateway_auto_listener_hostname_denials_total")
        .with_description("Hostnames rejected by the namespace hostname policy")
        .with_unit("{hostnames}")
        .build()
});

/// Record the end of a reconciliation pass
pub fn record_reconcile(outcome: &'static str, seconds: f64) {
    let labels = [KeyValue::new("outcome", outcome)];
    RECONCILE_TOTAL.add(1, &labels);
    RECONCILE_DURATION.record(seconds, &labels);
}

/// Record the result of a Gateway patch attempt
pub fn record_gateway_patch(result: &'static str) {
    GATEWAY_PATCHES.add(1, &[KeyValue::new("result", result)]);
}

/// Record listeners added and removed by an applied patch
pub fn record_listener_changes(added: usize, removed: usize) {
    if added > 0 {
        LISTENER_CHANGES.add(added as u64, &[KeyValue::new("change", "added")]);
    }
    if removed > 0 {
        LISTENER_CHANGES.add(removed as u64, &[KeyValue::new("change", "removed")]);
    }
}

/// Record a hostname policy denial
pub fn record_hostname_denial() {
    HOSTNAME_DENIALS.add(1, &[]);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recording_without_provider_is_a_noop() {
        record_reconcile("synced", 0.01);
        record_gateway_patch("applied");
        record_listener_changes(2, 1);
        record_listener_changes(0, 0);
        record_hostname_denial();
    }
}
