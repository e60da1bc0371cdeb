//! Resolution metrics and tracing spans.
//!
//! With the `metrics` feature, [`METRICS`] records through an OpenTelemetry
//! meter backed by a Prometheus registry; [`ResolverMetrics::gather`] exposes
//! the registry for a scrape endpoint. With the `tracing` feature,
//! [`tracing_helpers`] builds the spans the resolver and stores enter.

#[cfg(feature = "metrics")]
pub use self::otel::{ResolverMetrics, METRICS};

#[cfg(feature = "metrics")]
mod otel {
    use once_cell::sync::Lazy;
    use opentelemetry::metrics::{Counter, Histogram, MeterProvider};
    use opentelemetry::KeyValue;
    use opentelemetry_sdk::metrics::SdkMeterProvider;
    use std::time::Duration;

    pub static METRICS: Lazy<ResolverMetrics> = Lazy::new(ResolverMetrics::init);

    pub struct ResolverMetrics {
        registry: prometheus::Registry,
        _provider: SdkMeterProvider,
        pub resolutions_total: Counter<u64>,
        pub cache_lookups_total: Counter<u64>,
        pub schema_fallbacks_total: Counter<u64>,
        pub degraded_fetches_total: Counter<u64>,
        pub store_errors_total: Counter<u64>,
        pub store_query_duration: Histogram<f64>,
    }

    impl ResolverMetrics {
        pub fn init() -> Self {
            let registry = prometheus::Registry::new();
            let exporter = opentelemetry_prometheus::exporter()
                .with_registry(registry.clone())
                .build()
                .expect("failed to build prometheus exporter");
            let provider = SdkMeterProvider::builder().with_reader(exporter).build();
            let meter = provider.meter("category_attributes");

            let resolutions_total = meter
                .u64_counter("category_attributes_resolutions_total")
                .with_description("Resolutions by outcome")
                .build();

            let cache_lookups_total = meter
                .u64_counter("category_attributes_cache_lookups_total")
                .with_description("Cache region lookups by result (hit/miss)")
                .build();

            let schema_fallbacks_total = meter
                .u64_counter("category_attributes_schema_fallbacks_total")
                .with_description("Queries retried without the is_active column")
                .build();

            let degraded_fetches_total = meter
                .u64_counter("category_attributes_degraded_fetches_total")
                .with_description("Attribute fetches that failed and degraded to empty")
                .build();

            let store_errors_total = meter
                .u64_counter("category_attributes_store_errors_total")
                .with_description("Store queries that returned an error")
                .build();

            let store_query_duration = meter
                .f64_histogram("category_attributes_store_query_duration_seconds")
                .with_description("Duration of store queries")
                .build();

            Self {
                registry,
                _provider: provider,
                resolutions_total,
                cache_lookups_total,
                schema_fallbacks_total,
                degraded_fetches_total,
                store_errors_total,
                store_query_duration,
            }
        }

        /// Snapshot of every metric family for a Prometheus scrape.
        pub fn gather(&self) -> Vec<prometheus::proto::MetricFamily> {
            self.registry.gather()
        }

        pub fn record_resolution(&self, outcome: &'static str) {
            self.resolutions_total
                .add(1, &[KeyValue::new("outcome", outcome)]);
        }

        pub fn record_cache_lookup(&self, hit: bool) {
            let result = if hit { "hit" } else { "miss" };
            self.cache_lookups_total
                .add(1, &[KeyValue::new("result", result)]);
        }

        pub fn record_schema_fallback(&self, scope: &'static str) {
            self.schema_fallbacks_total
                .add(1, &[KeyValue::new("scope", scope)]);
        }

        pub fn record_degraded_fetch(&self, scope: &'static str) {
            self.degraded_fetches_total
                .add(1, &[KeyValue::new("scope", scope)]);
        }

        pub fn record_query_error(&self) {
            self.store_errors_total.add(1, &[]);
        }

        pub fn record_query_duration(&self, elapsed: Duration) {
            self.store_query_duration.record(elapsed.as_secs_f64(), &[]);
        }
    }
}

#[cfg(feature = "tracing")]
pub mod tracing_helpers {
    use crate::model::ResolveFlags;
    use tracing::{debug_span, info_span, Span};

    pub fn resolve_span(slug_or_id: &str, flags: &ResolveFlags) -> Span {
        info_span!(
            "category_attributes.resolve",
            slug_or_id = %slug_or_id,
            include_parents = flags.include_parents,
            include_global = flags.include_global,
            filterable_only = flags.filterable_only,
        )
    }

    pub fn ancestor_walk_span(category_id: &str) -> Span {
        debug_span!("category_attributes.ancestors", category_id = %category_id)
    }

    pub fn fetch_span(category_count: usize, include_global: bool) -> Span {
        debug_span!(
            "category_attributes.fetch",
            category_count = category_count,
            include_global = include_global,
        )
    }

    pub fn store_query_span(query: &str) -> Span {
        debug_span!("category_attributes.store_query", db.statement = %query)
    }

    pub fn connect_span() -> Span {
        debug_span!("category_attributes.connect")
    }
}
