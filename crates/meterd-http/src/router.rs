use std::{sync::Arc, time::Duration};

use axum::{Router, middleware, routing::get};
use meterd_common::error::Result;
use meterd_metrics::{HttpMetrics, MetricsRegistry, ProcessMetrics};
use rand::Rng;
use tower_http::trace::TraceLayer;

use crate::{handlers, middleware::track_http_metrics};

#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Upper bound of the random latency `/hello` waits before answering.
    pub max_simulated_delay: Duration,
    /// Prepended to every default process metric name.
    pub process_metrics_prefix: String,
}

impl AppConfig {
    pub fn simulated_delay(&self) -> Duration {
        let max_millis = u64::try_from(self.max_simulated_delay.as_millis()).unwrap_or(u64::MAX);
        if max_millis == 0 {
            return Duration::ZERO;
        }
        Duration::from_millis(rand::thread_rng().gen_range(0..=max_millis))
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            max_simulated_delay: Duration::from_millis(1000),
            process_metrics_prefix: String::new(),
        }
    }
}

pub struct AppState {
    pub registry: Arc<MetricsRegistry>,
    pub http_metrics: Arc<HttpMetrics>,
    pub process_metrics: Arc<ProcessMetrics>,
    pub config: AppConfig,
}

impl AppState {
    pub fn new(registry: Arc<MetricsRegistry>, config: AppConfig) -> Result<Self> {
        let http_metrics = Arc::new(HttpMetrics::register(registry.as_ref())?);
        let process_metrics = Arc::new(ProcessMetrics::register_with_prefix(
            registry.as_ref(),
            &config.process_metrics_prefix,
        )?);

        Ok(Self {
            registry,
            http_metrics,
            process_metrics,
            config,
        })
    }
}

/// Application routes are instrumented; the scrape endpoint is not.
pub fn app_router(state: Arc<AppState>) -> Router {
    let instrumented = Router::new()
        .route("/hello", get(handlers::demo::hello))
        .route("/error", get(handlers::demo::simulated_error))
        .route_layer(middleware::from_fn_with_state(
            Arc::clone(&state),
            track_http_metrics,
        ));

    Router::new()
        .route("/metrics", get(handlers::metrics::prometheus_metrics))
        .merge(instrumented)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_max_delay_never_waits() {
        let config = AppConfig {
            max_simulated_delay: Duration::ZERO,
            ..AppConfig::default()
        };
        assert_eq!(config.simulated_delay(), Duration::ZERO);
    }

    #[test]
    fn delay_stays_within_bound() {
        let config = AppConfig {
            max_simulated_delay: Duration::from_millis(5),
            ..AppConfig::default()
        };
        for _ in 0..100 {
            assert!(config.simulated_delay() <= Duration::from_millis(5));
        }
    }

    #[test]
    fn state_registers_default_metrics() {
        let registry = Arc::new(MetricsRegistry::new());
        let state = AppState::new(Arc::clone(&registry), AppConfig::default()).expect("state");
        assert!(state.registry.find("http_requests_total").expect("find").is_some());
        assert!(registry.find("process_resident_memory_bytes").expect("find").is_some());
        assert!(AppState::new(registry, AppConfig::default()).is_err());
    }
}
