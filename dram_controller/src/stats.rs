//! Injected statistics sink.
//!
//! Every counter increment the core produces (`acts`, `mitig_used`,
//! `mitig_wasted`, `graphene_spills`, `hydra_resets`, `num_alerts`, ...) is
//! published through this trait. The sink has no bearing on correctness —
//! it is an external collaborator, same as the harness that feeds
//! transactions in and reads statistics out.

/// One method per counter family the core touches. A no-op default means
/// callers only override what they want to observe.
pub trait StatsSink {
    fn increment(&mut self, _counter: Counter) {}
    fn add_value(&mut self, _counter: Counter, _value: f64) {}
}

/// Named counters the core increments. Kept as a closed enum rather than a
/// stringly-typed key: every counter the core can possibly emit is known at
/// compile time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Counter {
    Acts,
    MitigUsed,
    MitigWasted,
    GrapheneSpills,
    GrapheneResets,
    HydraResets,
    DreamResets,
    AbacusResets,
    NumAlerts,
    OndemandPrecharges,
    BurstyAccessCount,
}

/// A sink that discards everything. The default for tests, benches, and
/// any caller that doesn't care about observability.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl StatsSink for NullSink {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_sink_accepts_all_counters() {
        let mut sink = NullSink;
        sink.increment(Counter::Acts);
        sink.add_value(Counter::BurstyAccessCount, 3.0);
    }
}
