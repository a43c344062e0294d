//! The `{ success, data, error, message, details, timestamp }` body every
//! endpoint answers with.

use std::collections::BTreeMap;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::error;

use super::validation::FieldError;
use crate::service::{ServiceError, TopicCommandError};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Envelope<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,

    /// Endpoint specific top-level fields such as `count`.
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
    pub timestamp: DateTime<Utc>,
}

impl<T> Envelope<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            message: None,
            details: None,
            extra: BTreeMap::new(),
            timestamp: Utc::now(),
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn with_extra(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.extra.insert(key.to_string(), value.into());
        self
    }
}

impl Envelope<()> {
    /// A success without payload.
    pub fn done(message: impl Into<String>) -> Self {
        Self {
            data: None,
            ..Envelope::ok(())
        }
        .with_message(message)
    }
}

impl<T: Serialize> IntoResponse for Envelope<T> {
    fn into_response(self) -> Response {
        (StatusCode::OK, Json(self)).into_response()
    }
}

/// A failed request, rendered as an envelope with `success: false`.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiError {
    pub status: StatusCode,
    pub error: String,
    pub message: Option<String>,
    pub details: Option<Value>,

    /// Placeholder data some endpoints return alongside the error.
    pub data: Option<Value>,
}

impl ApiError {
    fn new(status: StatusCode, error: impl Into<String>) -> Self {
        Self {
            status,
            error: error.into(),
            message: None,
            details: None,
            data: None,
        }
    }

    pub fn not_connected() -> Self {
        Self::new(StatusCode::UNAUTHORIZED, ServiceError::NotConnected.to_string())
            .with_message("Connect to a Kafka cluster first")
    }

    pub fn validation(errors: Vec<FieldError>) -> Self {
        let mut err = Self::new(StatusCode::BAD_REQUEST, "Validation failed");
        err.details = serde_json::to_value(errors).ok();
        err
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "Invalid request").with_message(message)
    }

    pub fn unprocessable(error: impl Into<String>, details: Option<Value>) -> Self {
        let mut err = Self::new(StatusCode::UNPROCESSABLE_ENTITY, error);
        err.details = details;
        err
    }

    pub fn unavailable(error: impl Into<String>) -> Self {
        Self::new(StatusCode::SERVICE_UNAVAILABLE, error)
    }

    /// Logs the full cause and hides it from the caller.
    pub fn internal(cause: &dyn std::fmt::Display) -> Self {
        error!(%cause, "Unexpected error while handling request");
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
            .with_message("An unexpected error occurred")
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn with_data(mut self, data: impl Serialize) -> Self {
        self.data = serde_json::to_value(data).ok();
        self
    }

    /// Maps a failed mutation. Cluster failures outside a Kafka rejection are
    /// unexpected here.
    pub fn mutation(err: ServiceError) -> Self {
        match err {
            ServiceError::Kafka { .. } => Self::internal(&err),
            other => other.into(),
        }
    }
}

impl From<TopicCommandError> for ApiError {
    fn from(err: TopicCommandError) -> Self {
        if err.is_validation() {
            return Self::validation(vec![FieldError::new("name", err.to_string())]);
        }

        match &err {
            TopicCommandError::ReplicationFactorTooHigh { requested, brokers } => {
                Self::unprocessable(
                    err.to_string(),
                    Some(serde_json::json!({
                        "replicationFactor": requested,
                        "availableBrokers": brokers,
                    })),
                )
            }
            TopicCommandError::Rejected { name, source } => {
                Self::unprocessable("Kafka rejected the request", Some(topic_details(name)))
                    .with_message(source.to_string())
            }
            _ => {
                let details = err.topic_name().map(topic_details);
                Self::unprocessable(err.to_string(), details)
            }
        }
    }
}

fn topic_details(name: &str) -> Value {
    serde_json::json!({ "topicName": name })
}

/// Read-side mapping: cluster failures are reported as unavailable.
impl From<ServiceError> for ApiError {
    fn from(err: ServiceError) -> Self {
        match err {
            ServiceError::NotConnected => Self::not_connected(),
            ServiceError::Connect { .. } => {
                Self::unprocessable("Failed to connect to Kafka cluster", None)
                    .with_message(err.to_string())
            }
            ServiceError::Topic(e) => e.into(),
            ServiceError::Kafka { .. } => Self::unavailable(err.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Envelope {
            success: false,
            data: self.data,
            error: Some(self.error),
            message: self.message,
            details: self.details,
            extra: BTreeMap::new(),
            timestamp: Utc::now(),
        };
        (self.status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::admin::AdminError;
    use crate::client::error::ProtocolError;

    fn kafka(error: ProtocolError) -> AdminError {
        AdminError::Kafka {
            error,
            message: None,
            context: "t".to_string(),
        }
    }

    #[test]
    fn success_serializes_extras_at_top_level() {
        let body = serde_json::to_value(
            Envelope::ok(Vec::<u32>::new())
                .with_extra("count", 0)
                .with_extra("avgPartitions", 0.0),
        )
        .unwrap();

        assert_eq!(body["success"], true);
        assert_eq!(body["data"], serde_json::json!([]));
        assert_eq!(body["count"], 0);
        assert_eq!(body["avgPartitions"], 0.0);
        assert!(body.get("error").is_none());
        assert!(body["timestamp"].is_string());
    }

    #[test]
    fn error_body_decodes_without_data() {
        #[derive(Debug, Deserialize)]
        struct Topic {
            #[allow(dead_code)]
            name: String,
        }

        let body = serde_json::json!({
            "success": false,
            "error": "Not connected to Kafka cluster",
            "timestamp": "2024-01-01T00:00:00Z",
        });
        let envelope: Envelope<Topic> = serde_json::from_value(body).unwrap();
        assert!(!envelope.success);
        assert!(envelope.data.is_none());
        assert_eq!(envelope.error.as_deref(), Some("Not connected to Kafka cluster"));
    }

    #[test]
    fn done_has_no_data() {
        let body = serde_json::to_value(Envelope::done("ok")).unwrap();
        assert!(body.get("data").is_none());
        assert_eq!(body["message"], "ok");
    }

    #[test]
    fn status_codes() {
        assert_eq!(
            ApiError::from(ServiceError::NotConnected).status,
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            ApiError::from(TopicCommandError::InvalidCharacters).status,
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::from(TopicCommandError::NotFound {
                name: "a".to_string()
            })
            .status,
            StatusCode::UNPROCESSABLE_ENTITY
        );

        let read = ServiceError::kafka("Failed to list topics")(kafka(
            ProtocolError::ClusterAuthorizationFailed,
        ));
        assert_eq!(ApiError::from(read).status, StatusCode::SERVICE_UNAVAILABLE);

        let mutation = ServiceError::kafka("Failed to list topics")(kafka(
            ProtocolError::ClusterAuthorizationFailed,
        ));
        assert_eq!(
            ApiError::mutation(mutation).status,
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn missing_topic_names_it() {
        let err = ApiError::from(TopicCommandError::NotFound {
            name: "orders".to_string(),
        });
        assert_eq!(err.details.unwrap()["topicName"], "orders");
    }

    #[test]
    fn rejection_keeps_kafka_message() {
        let err = ApiError::mutation(ServiceError::Topic(TopicCommandError::Rejected {
            name: "orders".to_string(),
            source: kafka(ProtocolError::PolicyViolation),
        }));
        assert_eq!(err.status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(err.message.as_deref(), Some(ProtocolError::PolicyViolation.to_string().as_str()));
        assert_eq!(err.details.unwrap()["topicName"], "orders");
    }
}
