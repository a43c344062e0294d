//! The console's view of the HTTP API.

use async_trait::async_trait;
use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::Value;
use thiserror::Error;
use tracing::debug;

use crate::{
    http::{
        handlers::ConnectionStatusData,
        validation::{ConnectRequest, CreateTopicRequest},
        Envelope,
    },
    service::model::{BrokerInfo, ClusterConnection, ClusterOverview, TopicInfo},
};

#[derive(Debug, Error)]
pub enum ConsoleError {
    #[error("Request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("{}", .message.as_deref().unwrap_or(.error.as_str()))]
    Api {
        status: u16,
        error: String,
        message: Option<String>,
        details: Option<Value>,
    },

    #[error("Unexpected response: {0}")]
    UnexpectedResponse(String),

    #[error("Cannot access connection store: {0}")]
    Store(#[from] std::io::Error),

    #[error("Cannot decode stored connection: {0}")]
    Decode(#[from] serde_json::Error),
}

impl ConsoleError {
    /// HTTP status of an API error.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Api { status, .. } => Some(*status),
            Self::Http(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }
}

pub type Result<T, E = ConsoleError> = std::result::Result<T, E>;

/// Topics plus the averages the listing reports.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TopicsPage {
    pub topics: Vec<TopicInfo>,
    pub avg_partitions: f64,
    pub avg_replication_factor: f64,
}

#[async_trait]
pub trait ConsoleApi: std::fmt::Debug + Send + Sync {
    async fn connect(&self, form: &ConnectRequest) -> Result<ClusterConnection>;

    async fn status(&self) -> Result<ConnectionStatusData>;

    async fn disconnect(&self) -> Result<()>;

    async fn cluster_overview(&self) -> Result<ClusterOverview>;

    async fn brokers(&self) -> Result<Vec<BrokerInfo>>;

    async fn topics(&self) -> Result<TopicsPage>;

    async fn create_topic(&self, form: &CreateTopicRequest) -> Result<()>;

    async fn delete_topic(&self, name: &str) -> Result<()>;
}

/// [`ConsoleApi`] over HTTP.
#[derive(Debug, Clone)]
pub struct HttpConsoleApi {
    client: reqwest::Client,
    base_url: String,
}

impl HttpConsoleApi {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_client(reqwest::Client::new(), base_url)
    }

    pub fn with_client(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    fn request(&self, method: Method, path: &str) -> reqwest::RequestBuilder {
        let url = format!("{}{path}", self.base_url);
        debug!(%method, %url, "Calling console API");
        self.client.request(method, url)
    }

    /// Sends the request and unwraps the envelope, turning `success: false`
    /// into [`ConsoleError::Api`].
    async fn send<T: DeserializeOwned>(&self, request: reqwest::RequestBuilder) -> Result<Envelope<T>> {
        let response = request.send().await?;
        let status = response.status();
        let envelope: Envelope<T> = match response.json().await {
            Ok(envelope) => envelope,
            Err(e) if status.is_success() => return Err(e.into()),
            Err(_) => {
                return Err(ConsoleError::UnexpectedResponse(format!(
                    "{status} with undecodable body"
                )))
            }
        };

        if envelope.success && status == StatusCode::OK {
            return Ok(envelope);
        }
        Err(ConsoleError::Api {
            status: status.as_u16(),
            error: envelope
                .error
                .unwrap_or_else(|| status.canonical_reason().unwrap_or("error").to_string()),
            message: envelope.message,
            details: envelope.details,
        })
    }

    async fn data<T: DeserializeOwned>(&self, request: reqwest::RequestBuilder) -> Result<T> {
        self.send(request)
            .await?
            .data
            .ok_or_else(|| ConsoleError::UnexpectedResponse("response carried no data".to_string()))
    }
}

#[async_trait]
impl ConsoleApi for HttpConsoleApi {
    async fn connect(&self, form: &ConnectRequest) -> Result<ClusterConnection> {
        self.data(self.request(Method::POST, "/kafka/connect").json(form))
            .await
    }

    async fn status(&self) -> Result<ConnectionStatusData> {
        self.data(self.request(Method::GET, "/kafka/connect")).await
    }

    async fn disconnect(&self) -> Result<()> {
        self.send::<Value>(self.request(Method::DELETE, "/kafka/connect"))
            .await
            .map(|_| ())
    }

    async fn cluster_overview(&self) -> Result<ClusterOverview> {
        self.data(self.request(Method::GET, "/kafka/cluster")).await
    }

    async fn brokers(&self) -> Result<Vec<BrokerInfo>> {
        self.data(self.request(Method::GET, "/kafka/brokers")).await
    }

    async fn topics(&self) -> Result<TopicsPage> {
        let envelope = self
            .send::<Vec<TopicInfo>>(self.request(Method::GET, "/kafka/topics"))
            .await?;
        let avg = |key: &str| envelope.extra.get(key).and_then(Value::as_f64).unwrap_or(0.0);
        Ok(TopicsPage {
            avg_partitions: avg("avgPartitions"),
            avg_replication_factor: avg("avgReplicationFactor"),
            topics: envelope.data.clone().unwrap_or_default(),
        })
    }

    async fn create_topic(&self, form: &CreateTopicRequest) -> Result<()> {
        self.send::<Value>(self.request(Method::POST, "/kafka/topics").json(form))
            .await
            .map(|_| ())
    }

    async fn delete_topic(&self, name: &str) -> Result<()> {
        self.send::<Value>(
            self.request(Method::DELETE, "/kafka/topics")
                .query(&[("name", name)]),
        )
        .await
        .map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn api_error_prefers_message() {
        let err = ConsoleError::Api {
            status: 422,
            error: "Failed to connect to Kafka cluster".to_string(),
            message: Some("Connection refused.".to_string()),
            details: None,
        };
        assert_eq!(err.to_string(), "Connection refused.");
        assert_eq!(err.status(), Some(422));

        let err = ConsoleError::Api {
            status: 401,
            error: "Not connected to Kafka cluster".to_string(),
            message: None,
            details: None,
        };
        assert_eq!(err.to_string(), "Not connected to Kafka cluster");
    }

    #[test]
    fn base_url_is_normalized() {
        let api = HttpConsoleApi::new("http://localhost:3000/");
        assert_eq!(api.base_url, "http://localhost:3000");
    }
}
