//! Prometheus metrics served at `GET /metrics`.
//!
//! Two families of series share one [`Registry`]:
//!
//! - `dude_http_duration_seconds` / `dude_http_requests_total`, recorded by
//!   the observability decorator for every request
//! - `dude_db_connections_*` gauges, read from each pool's
//!   [`StatsCollector`](crate::db::StatsCollector) at scrape time
//!
//! Each [`Metrics`] owns its registry, so several apps can live in one
//! process without clashing over metric names.

use crate::db::ConnectionManager;
use axum::http::{Method, StatusCode};
use prometheus::core::{Collector, Desc};
use prometheus::proto::MetricFamily;
use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounterVec, IntGaugeVec, Opts, Registry, TextEncoder,
};
use std::sync::Arc;
use std::time::Duration;

/// Request duration and count, labelled by route pattern and method.
#[derive(Clone)]
pub struct HttpMetrics {
    duration: HistogramVec,
    requests: IntCounterVec,
}

impl HttpMetrics {
    /// Create the request series and register them with `registry`.
    pub fn register(registry: &Registry) -> Result<Self, prometheus::Error> {
        let duration = HistogramVec::new(
            HistogramOpts::new("dude_http_duration_seconds", "Duration of HTTP requests."),
            &["path", "method"],
        )?;
        let requests = IntCounterVec::new(
            Opts::new("dude_http_requests_total", "Number of HTTP requests."),
            &["path", "method", "status"],
        )?;
        registry.register(Box::new(duration.clone()))?;
        registry.register(Box::new(requests.clone()))?;
        Ok(Self { duration, requests })
    }

    /// Record one finished request. `status` is labelled as e.g. `200 OK`.
    pub fn observe(&self, path: &str, method: &Method, status: StatusCode, elapsed: Duration) {
        self.duration
            .with_label_values(&[path, method.as_str()])
            .observe(elapsed.as_secs_f64());
        self.requests
            .with_label_values(&[path, method.as_str(), &status.to_string()])
            .inc();
    }
}

impl std::fmt::Debug for HttpMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpMetrics").finish_non_exhaustive()
    }
}

/// Connection gauges for every registered pool, labelled by database name.
struct PoolMetrics {
    manager: Arc<ConnectionManager>,
    max_open: IntGaugeVec,
    open: IntGaugeVec,
    in_use: IntGaugeVec,
    idle: IntGaugeVec,
}

impl PoolMetrics {
    fn new(manager: Arc<ConnectionManager>) -> Result<Self, prometheus::Error> {
        let gauge = |name: &str, help: &str| IntGaugeVec::new(Opts::new(name, help), &["db_name"]);
        Ok(Self {
            manager,
            max_open: gauge(
                "dude_db_connections_max_open",
                "Maximum number of open connections to the database.",
            )?,
            open: gauge(
                "dude_db_connections_open",
                "The number of established connections both in use and idle.",
            )?,
            in_use: gauge(
                "dude_db_connections_in_use",
                "The number of connections currently in use.",
            )?,
            idle: gauge("dude_db_connections_idle", "The number of idle connections.")?,
        })
    }

    fn gauges(&self) -> [&IntGaugeVec; 4] {
        [&self.max_open, &self.open, &self.in_use, &self.idle]
    }
}

impl Collector for PoolMetrics {
    fn desc(&self) -> Vec<&Desc> {
        self.gauges().into_iter().flat_map(|g| g.desc()).collect()
    }

    fn collect(&self) -> Vec<MetricFamily> {
        for stats in self.manager.collect_stats() {
            let labels = [stats.name.as_str()];
            self.max_open
                .with_label_values(&labels)
                .set(i64::from(stats.max_connections));
            self.open.with_label_values(&labels).set(i64::from(stats.open));
            self.in_use
                .with_label_values(&labels)
                .set(i64::from(stats.in_use));
            self.idle
                .with_label_values(&labels)
                .set(i64::try_from(stats.idle).unwrap_or(i64::MAX));
        }
        self.gauges().into_iter().flat_map(|g| g.collect()).collect()
    }
}

/// The service's metrics registry.
pub struct Metrics {
    registry: Registry,
    http: HttpMetrics,
}

impl std::fmt::Debug for Metrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Metrics").finish_non_exhaustive()
    }
}

impl Metrics {
    pub fn new(manager: Arc<ConnectionManager>) -> Result<Self, prometheus::Error> {
        let registry = Registry::new();
        let http = HttpMetrics::register(&registry)?;
        registry.register(Box::new(PoolMetrics::new(manager)?))?;
        Ok(Self { registry, http })
    }

    pub fn http(&self) -> HttpMetrics {
        self.http.clone()
    }

    pub fn gather(&self) -> Vec<MetricFamily> {
        self.registry.gather()
    }

    /// Encode every series in the Prometheus text exposition format.
    ///
    /// Request series only appear once a request has been recorded.
    pub fn render(&self) -> Result<String, prometheus::Error> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::NamedEndpoint;

    fn family<'a>(families: &'a [MetricFamily], name: &str) -> &'a MetricFamily {
        families
            .iter()
            .find(|f| f.get_name() == name)
            .unwrap_or_else(|| panic!("missing metric family {}", name))
    }

    fn label<'a>(metric: &'a prometheus::proto::Metric, name: &str) -> &'a str {
        metric
            .get_label()
            .iter()
            .find(|l| l.get_name() == name)
            .map(|l| l.get_value())
            .unwrap_or_default()
    }

    #[test]
    fn test_http_metrics_recorded() {
        let registry = Registry::new();
        let http = HttpMetrics::register(&registry).unwrap();

        http.observe("/dude", &Method::GET, StatusCode::OK, Duration::from_millis(5));
        http.observe("/dude", &Method::GET, StatusCode::OK, Duration::from_millis(7));
        http.observe("/dude/{id}", &Method::GET, StatusCode::NOT_FOUND, Duration::ZERO);

        let families = registry.gather();
        let requests = family(&families, "dude_http_requests_total");
        let ok = requests
            .get_metric()
            .iter()
            .find(|m| label(m, "path") == "/dude")
            .unwrap();
        assert_eq!(label(ok, "method"), "GET");
        assert_eq!(label(ok, "status"), "200 OK");
        assert_eq!(ok.get_counter().get_value(), 2.0);

        let duration = family(&families, "dude_http_duration_seconds");
        assert_eq!(duration.get_metric().len(), 2);
    }

    #[test]
    fn test_registering_twice_fails() {
        let registry = Registry::new();
        HttpMetrics::register(&registry).unwrap();
        assert!(HttpMetrics::register(&registry).is_err());
    }

    #[tokio::test]
    async fn test_pool_gauges_follow_manager() {
        let mut manager = ConnectionManager::new();
        manager
            .setup(vec![
                NamedEndpoint::parse("a", "sqlite::memory:?_x-poolSize=4").unwrap(),
                NamedEndpoint::parse("b", "sqlite::memory:").unwrap(),
            ])
            .await
            .unwrap();
        let manager = Arc::new(manager);
        let metrics = Metrics::new(manager.clone()).unwrap();

        let families = metrics.gather();
        let max_open = family(&families, "dude_db_connections_max_open");
        let a = max_open
            .get_metric()
            .iter()
            .find(|m| label(m, "db_name") == "A")
            .unwrap();
        assert_eq!(a.get_gauge().get_value(), 4.0);
        assert_eq!(max_open.get_metric().len(), 2);

        let text = metrics.render().unwrap();
        assert!(text.contains("# TYPE dude_db_connections_open gauge"));
        assert!(text.contains("dude_db_connections_max_open{db_name=\"B\"} 10"));
        manager.close().await;
    }
}
