use std::{sync::Arc, time::Duration};

use clap::Parser;
use meterd_http::{AppConfig, AppState, app_router};
use meterd_metrics::MetricsRegistry;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "meterd", about = "HTTP demo server exposing Prometheus metrics")]
struct Cli {
    #[arg(long, default_value = "0.0.0.0")]
    host: String,

    #[arg(long, env = "PORT", default_value = "8080")]
    port: u16,

    /// Upper bound of the random latency added to /hello, in milliseconds.
    #[arg(long, env = "METERD_MAX_DELAY_MS", default_value = "1000")]
    max_delay_ms: u64,

    /// Prefix for the default process metrics.
    #[arg(long, env = "METERD_METRICS_PREFIX", default_value = "")]
    metrics_prefix: String,
}

impl Cli {
    fn app_config(&self) -> AppConfig {
        AppConfig {
            max_simulated_delay: Duration::from_millis(self.max_delay_ms),
            process_metrics_prefix: self.metrics_prefix.clone(),
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let env_filter = EnvFilter::from_default_env().add_directive("meterd=info".parse()?);
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    let cli = Cli::parse();
    let addr = format!("{}:{}", cli.host, cli.port);

    let registry = Arc::new(MetricsRegistry::new());
    let state = Arc::new(AppState::new(registry, cli.app_config())?);
    let app = app_router(state);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("meterd listening on {addr}");
    axum::serve(listener, app).await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_defaults() {
        let cli = Cli::try_parse_from(["meterd"]).expect("parse");
        assert_eq!(cli.host, "0.0.0.0");
        let config = cli.app_config();
        assert_eq!(config.max_simulated_delay, Duration::from_secs(1));
        assert!(config.process_metrics_prefix.is_empty());
    }

    #[test]
    fn cli_overrides() {
        let cli = Cli::try_parse_from([
            "meterd",
            "--port",
            "9100",
            "--max-delay-ms",
            "0",
            "--metrics-prefix",
            "demo_",
        ])
        .expect("parse");
        assert_eq!(cli.port, 9100);
        assert_eq!(cli.app_config().max_simulated_delay, Duration::ZERO);
        assert_eq!(cli.app_config().process_metrics_prefix, "demo_");
    }
}
