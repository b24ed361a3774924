// Copyright 2024 ActorEdge Contributors
// SPDX-License-Identifier: Apache-2.0, MIT

//! The metrics surface named by the spec (§4.J): backends are an external
//! collaborator, but the runtime still owns instrumentation and exposes a
//! `prometheus_client::registry::Registry` an external scrape endpoint can
//! render, the same shape `forest_metrics` uses upstream.

use prometheus_client::encoding::{EncodeLabelSet, EncodeLabelValue};
use prometheus_client::metrics::counter::Counter;
use prometheus_client::metrics::family::Family;
use prometheus_client::metrics::histogram::Histogram;
use prometheus_client::registry::Registry;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EncodeLabelValue)]
pub enum Direction {
    Client,
    Server,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EncodeLabelValue)]
pub enum CallResult {
    Ok,
    DomainError,
    TransportError,
    Timeout,
}

impl CallResult {
    pub fn from_metric_str(s: &str) -> Self {
        match s {
            "ok" => CallResult::Ok,
            "domain_error" => CallResult::DomainError,
            "timeout" => CallResult::Timeout,
            _ => CallResult::TransportError,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, EncodeLabelSet)]
pub struct CallLabels {
    pub direction: Direction,
    pub target: String,
    pub result: CallResult,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, EncodeLabelSet)]
pub struct TargetLabels {
    pub direction: Direction,
    pub target: String,
}

/// Owns the five canonical metric families from spec §4.J and registers
/// them into a caller-supplied `Registry` under `namespace`.
pub struct Metrics {
    pub calls_total: Family<CallLabels, Counter>,
    pub calls_failed_total: Family<CallLabels, Counter>,
    pub call_latency_seconds: Family<TargetLabels, Histogram>,
    pub actor_registrations_total: Counter,
    pub actor_resolutions_total: Counter,
}

impl Metrics {
    pub fn new(namespace: &str, registry: &mut Registry) -> Self {
        let sub = registry.sub_registry_with_prefix(namespace);
        let calls_total = Family::<CallLabels, Counter>::default();
        let calls_failed_total = Family::<CallLabels, Counter>::default();
        let call_latency_seconds =
            Family::<TargetLabels, Histogram>::new_with_constructor(|| Histogram::new(default_latency_buckets()));
        let actor_registrations_total = Counter::default();
        let actor_resolutions_total = Counter::default();

        sub.register("calls_total", "Total RPC calls observed", calls_total.clone());
        sub.register("calls_failed_total", "RPC calls that did not complete ok", calls_failed_total.clone());
        sub.register("call_latency_seconds", "RPC call latency", call_latency_seconds.clone());
        sub.register("actor_registrations_total", "Actors registered via actorReady", actor_registrations_total.clone());
        sub.register("actor_resolutions_total", "Successful registry lookups", actor_resolutions_total.clone());

        Self { calls_total, calls_failed_total, call_latency_seconds, actor_registrations_total, actor_resolutions_total }
    }

    pub fn record_call(&self, direction: Direction, target: &str, result: CallResult, latency_seconds: f64) {
        let labels = CallLabels { direction, target: target.to_string(), result };
        self.calls_total.get_or_create(&labels).inc();
        if result != CallResult::Ok {
            self.calls_failed_total.get_or_create(&labels).inc();
        }
        self.call_latency_seconds
            .get_or_create(&TargetLabels { direction, target: target.to_string() })
            .observe(latency_seconds);
    }

    pub fn record_actor_registration(&self) {
        self.actor_registrations_total.inc();
    }

    pub fn record_actor_resolution(&self) {
        self.actor_resolutions_total.inc();
    }
}

fn default_latency_buckets() -> impl Iterator<Item = f64> {
    [0.001, 0.005, 0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0].into_iter()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn metrics_register_without_panicking() {
        let mut registry = Registry::default();
        let metrics = Metrics::new("actor_edge", &mut registry);
        metrics.record_call(Direction::Client, "echo", CallResult::Ok, 0.01);
        metrics.record_call(Direction::Server, "echo", CallResult::Timeout, 0.05);
        metrics.record_actor_registration();
        metrics.record_actor_resolution();
    }
}
