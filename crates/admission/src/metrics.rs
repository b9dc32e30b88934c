//! Decision counters.

use std::time::Duration;

use telemetry::{Counter, Histogram, KeyValue, Meter, metrics};

use crate::decision::AdmissionDecision;

pub(crate) struct AdmissionMetrics {
    decisions: Counter<u64>,
    counter_faults: Counter<u64>,
    duration: Histogram<f64>,
}

impl AdmissionMetrics {
    pub(crate) fn new(meter: &Meter) -> Self {
        Self {
            decisions: meter
                .u64_counter(metrics::ADMISSION_DECISIONS)
                .with_description("Admission decisions by outcome and scope")
                .build(),
            counter_faults: meter
                .u64_counter(metrics::ADMISSION_COUNTER_FAULTS)
                .with_description("Admission decisions that failed because the counter store failed")
                .build(),
            duration: meter
                .f64_histogram(metrics::ADMISSION_DECISION_DURATION)
                .with_unit("ms")
                .build(),
        }
    }

    pub(crate) fn record_decision(&self, decision: &AdmissionDecision, elapsed: Duration) {
        let outcome = if decision.allowed { "allowed" } else { "denied" };

        let attributes = [
            KeyValue::new("outcome", outcome),
            KeyValue::new("scope", decision.scope_kind().as_str()),
            KeyValue::new("fallback", decision.used_fallback),
        ];

        self.decisions.add(1, &attributes);
        self.duration.record(elapsed.as_secs_f64() * 1000.0, &attributes);
    }

    pub(crate) fn record_counter_fault(&self) {
        self.counter_faults.add(1, &[]);
    }
}
