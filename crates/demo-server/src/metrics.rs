// Numan Thabit 2025
use prometheus::core::Collector;
use prometheus::proto::MetricType;
use prometheus::{opts, Encoder, IntCounterVec, Registry, TextEncoder};

use crate::error::Result;

/// Process-wide collection point, passed explicitly to every component that
/// registers or renders metrics. Clones share the same underlying registry.
#[derive(Clone, Default)]
pub struct MetricsRegistry {
    registry: Registry,
}

impl MetricsRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, collector: Box<dyn Collector>) -> Result<()> {
        self.registry.register(collector)?;
        Ok(())
    }

    /// Render every registered family in the Prometheus text format.
    pub fn render(&self) -> Result<String> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::with_capacity(8192);
        encoder.encode(&metric_families, &mut buffer)?;
        Ok(String::from_utf8(buffer)?)
    }
}

/// Current value of the counter or gauge series in `collector` whose labels
/// are exactly `labels`. Reading never creates the series.
pub(crate) fn current_value(collector: &dyn Collector, labels: &[(&str, &str)]) -> Option<f64> {
    collector.collect().iter().find_map(|family| {
        let is_counter = family.get_field_type() == MetricType::COUNTER;
        family
            .get_metric()
            .iter()
            .find(|metric| {
                let pairs = metric.get_label();
                pairs.len() == labels.len()
                    && labels.iter().all(|(name, value)| {
                        pairs
                            .iter()
                            .any(|pair| pair.get_name() == *name && pair.get_value() == *value)
                    })
            })
            .map(|metric| {
                if is_counter {
                    metric.get_counter().get_value()
                } else {
                    metric.get_gauge().get_value()
                }
            })
    })
}

/// The demo's own counter, partitioned by the greeted name.
#[derive(Clone)]
pub struct HelloMetrics {
    handled: IntCounterVec,
}

impl HelloMetrics {
    pub const HANDLE_COUNT: &'static str = "demo_server_say_hello_method_handle_count";

    pub fn new() -> Result<Self> {
        let handled = IntCounterVec::new(
            opts!(
                Self::HANDLE_COUNT,
                "Total number of RPCs handled on the server."
            ),
            &["name"],
        )?;
        Ok(Self { handled })
    }

    pub fn register(&self, registry: &MetricsRegistry) -> Result<()> {
        registry.register(Box::new(self.handled.clone()))
    }

    /// Export `names` at zero before any call observes them.
    pub fn preinitialize<S: AsRef<str>>(&self, names: &[S]) {
        for name in names {
            self.handled.with_label_values(&[name.as_ref()]);
        }
    }

    pub fn observe(&self, name: &str) {
        self.handled.with_label_values(&[name]).inc();
    }

    /// Calls observed for `name`; zero for a name never seen.
    pub fn count(&self, name: &str) -> u64 {
        current_value(&self.handled, &[("name", name)]).unwrap_or_default() as u64
    }
}
