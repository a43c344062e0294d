//! Process configuration: command line flags with environment fallbacks.

use std::{net::SocketAddr, time::Duration};

use clap::Parser;

use crate::{
    admin::AdminConfig, backoff::BackoffConfig, client::DEFAULT_CLIENT_ID,
    service::SamplingStrategy,
};

/// Kafka control panel API server
#[derive(Parser, Debug, Clone)]
#[command(name = "kafka-console")]
#[command(about = "Control panel API for Apache Kafka compatible clusters")]
#[command(version)]
pub struct Args {
    /// Bootstrap servers to connect to at startup (`host:port,host:port`)
    #[arg(long, env = "KAFKA_BROKERS", value_delimiter = ',')]
    pub brokers: Vec<String>,

    /// Client id sent to the brokers
    #[arg(long, env = "KAFKA_CLIENT_ID", default_value = DEFAULT_CLIENT_ID)]
    pub client_id: String,

    /// Bind address
    #[arg(short, long, env = "KAFKA_CONSOLE_BIND", default_value = "0.0.0.0")]
    pub bind: String,

    /// HTTP server port
    #[arg(short, long, env = "KAFKA_CONSOLE_PORT", default_value = "3000")]
    pub port: u16,

    /// Topic count up to which partition totals are exact
    #[arg(long, env = "KAFKA_CONSOLE_SAMPLE_THRESHOLD", default_value = "50")]
    pub sample_threshold: usize,

    /// Topics inspected when estimating partition totals
    #[arg(long, env = "KAFKA_CONSOLE_SAMPLE_SIZE", default_value = "50")]
    pub sample_size: usize,

    /// Topics inspected when estimating per-broker counts
    #[arg(long, env = "KAFKA_CONSOLE_BROKER_SAMPLE_SIZE", default_value = "20")]
    pub broker_sample_size: usize,

    /// TCP connect timeout in milliseconds
    #[arg(long, env = "KAFKA_CONNECT_TIMEOUT_MS", default_value = "10000")]
    pub connect_timeout_ms: u64,

    /// Per request timeout in milliseconds
    #[arg(long, env = "KAFKA_REQUEST_TIMEOUT_MS", default_value = "30000")]
    pub request_timeout_ms: u64,

    /// Give up retrying a request after this many milliseconds
    #[arg(long, env = "KAFKA_RETRY_DEADLINE_MS", default_value = "10000")]
    pub retry_deadline_ms: u64,

    /// Log level (trace, debug, info, warn, error), overridden by RUST_LOG
    #[arg(long, env = "KAFKA_CONSOLE_LOG_LEVEL", default_value = "info")]
    pub log_level: String,
}

impl Args {
    pub fn listen_addr(&self) -> Result<SocketAddr, std::net::AddrParseError> {
        format!("{}:{}", self.bind, self.port).parse()
    }

    /// Bootstrap servers with blanks removed.
    pub fn bootstrap_servers(&self) -> Vec<String> {
        self.brokers
            .iter()
            .map(|b| b.trim().to_string())
            .filter(|b| !b.is_empty())
            .collect()
    }

    pub fn admin_config(&self) -> AdminConfig {
        AdminConfig {
            client_id: self.client_id.clone(),
            connect_timeout: Duration::from_millis(self.connect_timeout_ms),
            request_timeout: Duration::from_millis(self.request_timeout_ms),
            retry: BackoffConfig {
                deadline: Some(Duration::from_millis(self.retry_deadline_ms)),
                ..BackoffConfig::default()
            },
            ..AdminConfig::new(self.bootstrap_servers())
        }
    }

    pub fn sampling(&self) -> SamplingStrategy {
        SamplingStrategy {
            threshold: self.sample_threshold,
            sample_size: self.sample_size,
            broker_sample_size: self.broker_sample_size,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let args = Args::try_parse_from(["kafka-console"]).unwrap();
        assert_eq!(args.port, 3000);
        assert_eq!(args.client_id, "kafka-console");
        assert_eq!(args.sampling(), SamplingStrategy::default());
        assert_eq!(args.admin_config(), AdminConfig::new(vec![]));
        assert_eq!(args.listen_addr().unwrap().to_string(), "0.0.0.0:3000");
    }

    #[test]
    fn broker_list() {
        let args = Args::try_parse_from([
            "kafka-console",
            "--brokers",
            "a:9092, b:9092,",
            "--request-timeout-ms",
            "500",
        ])
        .unwrap();
        assert_eq!(args.bootstrap_servers(), vec!["a:9092", "b:9092"]);
        assert_eq!(
            args.admin_config().request_timeout,
            Duration::from_millis(500)
        );
    }

    #[test]
    fn only_server_options_are_accepted() {
        assert!(Args::try_parse_from(["kafka-console", "--state-dir", "/tmp"]).is_err());
    }
}
