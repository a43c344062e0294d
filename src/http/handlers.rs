//! Endpoint handlers.
//!
//! Every handler checks the connection before anything else, then validates
//! its input and finally delegates to the service layer.

use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, info};
use uuid::Uuid;

use super::{
    envelope::{ApiError, Envelope},
    validation::{
        decode, ConnectRequest, CreateTopicRequest, FieldError, RequestBody, TopicQuery,
        UpdateConfigRequest,
    },
    AppState,
};
use crate::service::{
    model::{
        BrokerInfo, ClusterConnection, ClusterOverview, ConnectionStatus, TopicDetails, TopicInfo,
    },
    validate_topic_name,
};

type ApiResult<T> = Result<Envelope<T>, ApiError>;

fn require_connection(state: &AppState) -> Result<(), ApiError> {
    if state.connections.is_active() {
        Ok(())
    } else {
        Err(ApiError::not_connected())
    }
}

/// Malformed JSON is a bad request; a well-formed body with missing or
/// mistyped fields fails validation per field.
fn body<T: RequestBody>(payload: Result<Json<Value>, JsonRejection>) -> Result<T, ApiError> {
    let Json(value) =
        payload.map_err(|rejection| ApiError::bad_request(rejection.body_text()))?;
    decode(value).map_err(ApiError::validation)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusInfo {
    pub bootstrap_servers: String,
    pub client_id: String,
    pub connected_at: chrono::DateTime<chrono::Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionStatusData {
    pub is_connected: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connection_info: Option<StatusInfo>,
}

/// POST /kafka/connect
pub async fn connect(
    State(state): State<AppState>,
    payload: Result<Json<Value>, JsonRejection>,
) -> ApiResult<ClusterConnection> {
    let req: ConnectRequest = body(payload)?;
    let servers = req.validated().map_err(ApiError::validation)?;

    let info = state
        .connections
        .connect(servers, req.client_id.filter(|id| !id.is_empty()))
        .await?;

    Ok(Envelope::ok(ClusterConnection {
        id: Uuid::new_v4().to_string(),
        name: req.name,
        bootstrap_servers: info.bootstrap_servers,
        status: ConnectionStatus::Connected,
        version: None,
        controller_id: info.controller_id,
        cluster_id: info.cluster_id,
    })
    .with_message("Successfully connected to Kafka cluster"))
}

/// GET /kafka/connect
pub async fn connection_status(State(state): State<AppState>) -> Envelope<ConnectionStatusData> {
    let info = state.connections.connection_info();
    Envelope::ok(ConnectionStatusData {
        is_connected: info.is_some(),
        connection_info: info.map(|info| StatusInfo {
            bootstrap_servers: info.bootstrap_servers.join(","),
            client_id: info.client_id,
            connected_at: info.connected_at,
        }),
    })
}

/// DELETE /kafka/connect
pub async fn disconnect(State(state): State<AppState>) -> Envelope<()> {
    state.connections.disconnect().await;
    Envelope::done("Disconnected from Kafka cluster")
}

/// GET /kafka/cluster
pub async fn cluster_overview(State(state): State<AppState>) -> ApiResult<ClusterOverview> {
    require_connection(&state)
        .map_err(|e| e.with_data(ClusterOverview::unknown()))?;

    let overview = state.aggregator.cluster_overview().await?;
    Ok(Envelope::ok(overview))
}

/// GET /kafka/brokers
pub async fn brokers(State(state): State<AppState>) -> ApiResult<Vec<BrokerInfo>> {
    require_connection(&state)?;

    let brokers = state.aggregator.brokers().await?;
    let count = brokers.len();
    Ok(Envelope::ok(brokers).with_extra("count", count))
}

/// GET /kafka/topics
pub async fn topics(State(state): State<AppState>) -> ApiResult<Vec<TopicInfo>> {
    require_connection(&state)?;

    let listing = state.aggregator.topics().await?;
    let count = listing.topics.len();
    Ok(Envelope::ok(listing.topics)
        .with_extra("count", count)
        .with_extra("avgPartitions", listing.avg_partitions)
        .with_extra("avgReplicationFactor", listing.avg_replication_factor))
}

/// POST /kafka/topics
pub async fn create_topic(
    State(state): State<AppState>,
    payload: Result<Json<Value>, JsonRejection>,
) -> ApiResult<Value> {
    require_connection(&state)?;
    let topic = body::<CreateTopicRequest>(payload)?
        .validated()
        .map_err(ApiError::validation)?;
    debug!(topic = %topic.name, "Create topic request");

    let data = json!({
        "name": topic.name,
        "partitions": topic.partitions,
        "replicationFactor": topic.replication_factor,
        "config": topic.config,
    });
    let name = topic.name.clone();
    state
        .commands
        .create_topic(topic)
        .await
        .map_err(ApiError::mutation)?;

    Ok(Envelope::ok(data).with_message(format!("Topic \"{name}\" created successfully")))
}

/// DELETE /kafka/topics?name=
pub async fn delete_topic(
    State(state): State<AppState>,
    Query(query): Query<TopicQuery>,
) -> ApiResult<()> {
    require_connection(&state)?;
    let name = query.validated().map_err(ApiError::validation)?;

    state
        .commands
        .delete_topic(&name)
        .await
        .map_err(ApiError::mutation)?;

    info!(topic = %name, "Topic deleted via API");
    Ok(Envelope::done(format!("Topic \"{name}\" deleted successfully")))
}

/// GET /kafka/topics/:name
pub async fn topic_details(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> ApiResult<TopicDetails> {
    require_connection(&state)?;
    validate_topic_name(&name)
        .map_err(|e| ApiError::validation(vec![FieldError::new("name", e.to_string())]))?;

    let details = state.aggregator.topic_details(&name).await?;
    Ok(Envelope::ok(details))
}

/// PATCH /kafka/topics/:name/config
pub async fn update_topic_config(
    State(state): State<AppState>,
    Path(name): Path<String>,
    payload: Result<Json<Value>, JsonRejection>,
) -> ApiResult<()> {
    require_connection(&state)?;
    validate_topic_name(&name)
        .map_err(|e| ApiError::validation(vec![FieldError::new("name", e.to_string())]))?;
    let updates = body::<UpdateConfigRequest>(payload)?
        .validated()
        .map_err(ApiError::validation)?;

    state
        .commands
        .update_topic_config(&name, updates)
        .await
        .map_err(ApiError::mutation)?;

    Ok(Envelope::done(format!(
        "Configuration of topic \"{name}\" updated successfully"
    )))
}

/// GET /health
pub async fn health(State(state): State<AppState>) -> Envelope<Value> {
    Envelope::ok(json!({
        "status": "ok",
        "kafkaConnected": state.connections.is_active(),
    }))
}
