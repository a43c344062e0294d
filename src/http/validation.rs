//! Request bodies and their validation.
//!
//! Bodies are first checked field by field against their wire shape, so a
//! missing or mistyped field is reported like any other invalid value.
//! Length and range rules are declared with `validator`; patterns are
//! checked by hand afterwards and reported in the same per-field format.

use std::collections::BTreeMap;

use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value;
use validator::{Validate, ValidationErrors};

use crate::service::{validate_topic_name, CreateTopic};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

impl FieldError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// Flattens `validator`'s errors, sorted by field name.
pub fn field_errors(errors: &ValidationErrors) -> Vec<FieldError> {
    let mut out: Vec<FieldError> = errors
        .field_errors()
        .into_iter()
        .flat_map(|(field, errs)| {
            let field = wire_name(&field);
            errs.iter().map(move |e| {
                let message = e
                    .message
                    .as_ref()
                    .map(|m| m.to_string())
                    .unwrap_or_else(|| format!("Invalid value ({})", e.code));
                FieldError::new(field.clone(), message)
            })
        })
        .collect();
    out.sort_by(|a, b| a.field.cmp(&b.field));
    out
}

/// Request fields are reported with their wire names.
fn wire_name(field: &str) -> String {
    match field {
        "bootstrap_servers" => "bootstrapServers",
        "client_id" => "clientId",
        "replication_factor" => "replicationFactor",
        other => other,
    }
    .to_string()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    String,
    Integer,
    /// An object whose values are all strings.
    StringMap,
}

impl FieldKind {
    fn accepts(self, value: &Value) -> bool {
        match self {
            Self::String => value.is_string(),
            Self::Integer => value.is_i64(),
            Self::StringMap => value
                .as_object()
                .map_or(false, |map| map.values().all(Value::is_string)),
        }
    }

    fn expected(self) -> &'static str {
        match self {
            Self::String => "a string",
            Self::Integer => "an integer",
            Self::StringMap => "an object of string values",
        }
    }
}

/// One top-level field of a request body.
#[derive(Debug, Clone, Copy)]
pub struct WireField {
    pub name: &'static str,
    pub label: &'static str,
    pub kind: FieldKind,
    pub required: bool,
}

/// A JSON request body with a known set of top-level fields.
pub trait RequestBody: DeserializeOwned {
    const FIELDS: &'static [WireField];
}

/// Decodes a body, reporting every missing or mistyped field.
///
/// A `null` optional field is treated as absent.
pub fn decode<T: RequestBody>(value: Value) -> Result<T, Vec<FieldError>> {
    let Value::Object(mut body) = value else {
        return Err(vec![FieldError::new(
            "body",
            "Request body must be a JSON object",
        )]);
    };

    body.retain(|_, value| !value.is_null());

    let mut errors = vec![];
    for field in T::FIELDS {
        match body.get(field.name) {
            None if field.required => {
                errors.push(FieldError::new(
                    field.name,
                    format!("{} is required", field.label),
                ));
            }
            Some(value) if !field.kind.accepts(value) => {
                errors.push(FieldError::new(
                    field.name,
                    format!("{} must be {}", field.label, field.kind.expected()),
                ));
            }
            _ => {}
        }
    }
    finish(errors)?;

    serde_json::from_value(Value::Object(body))
        .map_err(|e| vec![FieldError::new("body", e.to_string())])
}

fn declared(req: &impl Validate) -> Vec<FieldError> {
    match req.validate() {
        Ok(()) => vec![],
        Err(e) => field_errors(&e),
    }
}

fn finish(mut errors: Vec<FieldError>) -> Result<(), Vec<FieldError>> {
    errors.sort_by(|a, b| a.field.cmp(&b.field));
    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ConnectRequest {
    #[validate(length(min = 1, message = "Cluster name is required"))]
    pub name: String,

    /// `host:port[,host:port]*`
    #[validate(length(min = 1, message = "Bootstrap servers are required"))]
    pub bootstrap_servers: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
}

impl RequestBody for ConnectRequest {
    const FIELDS: &'static [WireField] = &[
        WireField {
            name: "name",
            label: "Cluster name",
            kind: FieldKind::String,
            required: true,
        },
        WireField {
            name: "bootstrapServers",
            label: "Bootstrap servers",
            kind: FieldKind::String,
            required: true,
        },
        WireField {
            name: "clientId",
            label: "Client id",
            kind: FieldKind::String,
            required: false,
        },
    ];
}

impl ConnectRequest {
    /// Validates the body and returns the parsed server list.
    pub fn validated(&self) -> Result<Vec<String>, Vec<FieldError>> {
        let mut errors = declared(self);
        let servers = parse_bootstrap_servers(&self.bootstrap_servers);
        if servers.is_none() && !errors.iter().any(|e| e.field == "bootstrapServers") {
            errors.push(FieldError::new(
                "bootstrapServers",
                "Bootstrap servers must be in format host:port,host:port",
            ));
        }
        finish(errors)?;
        Ok(servers.unwrap_or_default())
    }
}

/// Splits `host:port,host:port`, or `None` if any entry is malformed.
pub fn parse_bootstrap_servers(raw: &str) -> Option<Vec<String>> {
    raw.split(',')
        .map(|entry| {
            let entry = entry.trim();
            let (host, port) = entry.rsplit_once(':')?;
            let host_ok = !host.is_empty()
                && host
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_'));
            let port_ok = port.parse::<u16>().map_or(false, |p| p > 0);
            (host_ok && port_ok).then(|| entry.to_string())
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateTopicRequest {
    #[validate(length(
        min = 1,
        max = 249,
        message = "Topic name must be between 1 and 249 characters"
    ))]
    pub name: String,

    #[validate(range(min = 1, max = 1000, message = "Partitions must be between 1 and 1000"))]
    pub partitions: i32,

    #[validate(range(
        min = 1,
        max = 10,
        message = "Replication factor must be between 1 and 10"
    ))]
    pub replication_factor: i16,

    #[serde(default)]
    pub config: BTreeMap<String, String>,
}

impl RequestBody for CreateTopicRequest {
    const FIELDS: &'static [WireField] = &[
        WireField {
            name: "name",
            label: "Topic name",
            kind: FieldKind::String,
            required: true,
        },
        WireField {
            name: "partitions",
            label: "Partitions",
            kind: FieldKind::Integer,
            required: true,
        },
        WireField {
            name: "replicationFactor",
            label: "Replication factor",
            kind: FieldKind::Integer,
            required: true,
        },
        WireField {
            name: "config",
            label: "Config",
            kind: FieldKind::StringMap,
            required: false,
        },
    ];
}

impl CreateTopicRequest {
    pub fn validated(self) -> Result<CreateTopic, Vec<FieldError>> {
        let mut errors = declared(&self);
        if !errors.iter().any(|e| e.field == "name") {
            if let Err(e) = validate_topic_name(&self.name) {
                errors.push(FieldError::new("name", e.to_string()));
            }
        }
        finish(errors)?;

        Ok(CreateTopic {
            name: self.name,
            partitions: self.partitions,
            replication_factor: self.replication_factor,
            config: self.config,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct UpdateConfigRequest {
    #[validate(length(min = 1, message = "At least one configuration entry is required"))]
    pub config: BTreeMap<String, String>,
}

impl RequestBody for UpdateConfigRequest {
    const FIELDS: &'static [WireField] = &[WireField {
        name: "config",
        label: "Config",
        kind: FieldKind::StringMap,
        required: true,
    }];
}

impl UpdateConfigRequest {
    pub fn validated(self) -> Result<BTreeMap<String, String>, Vec<FieldError>> {
        finish(declared(&self))?;
        Ok(self.config)
    }
}

/// `?name=` of the delete endpoint.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TopicQuery {
    pub name: Option<String>,
}

impl TopicQuery {
    pub fn validated(self) -> Result<String, Vec<FieldError>> {
        match self.name.filter(|n| !n.is_empty()) {
            Some(name) => Ok(name),
            None => Err(vec![FieldError::new("name", "Topic name is required")]),
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn create(name: &str, partitions: i32, replication_factor: i16) -> CreateTopicRequest {
        CreateTopicRequest {
            name: name.to_string(),
            partitions,
            replication_factor,
            config: BTreeMap::new(),
        }
    }

    #[test]
    fn bootstrap_servers() {
        assert_eq!(
            parse_bootstrap_servers("a:9092, b.example.com:9093"),
            Some(vec![
                "a:9092".to_string(),
                "b.example.com:9093".to_string()
            ])
        );
        assert_eq!(parse_bootstrap_servers("a"), None);
        assert_eq!(parse_bootstrap_servers("a:x"), None);
        assert_eq!(parse_bootstrap_servers("a:9092,"), None);
        assert_eq!(parse_bootstrap_servers(":9092"), None);
        assert_eq!(parse_bootstrap_servers("a:0"), None);
    }

    #[test]
    fn connect_request() {
        let req = ConnectRequest {
            name: String::new(),
            bootstrap_servers: "nope".to_string(),
            client_id: None,
        };
        let errors = req.validated().unwrap_err();
        let fields: Vec<_> = errors.iter().map(|e| e.field.as_str()).collect();
        assert_eq!(fields, vec!["bootstrapServers", "name"]);

        let req = ConnectRequest {
            name: "local".to_string(),
            bootstrap_servers: "localhost:9092".to_string(),
            client_id: Some("me".to_string()),
        };
        assert_eq!(req.validated().unwrap(), vec!["localhost:9092".to_string()]);
    }

    #[test]
    fn create_topic_charset() {
        let errors = create("My Topic!", 1, 1).validated().unwrap_err();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].field, "name");
        assert!(errors[0].message.contains("letters, numbers, dots"));
    }

    #[test]
    fn create_topic_ranges() {
        let errors = create("ok", 0, 11).validated().unwrap_err();
        let fields: Vec<_> = errors.iter().map(|e| e.field.as_str()).collect();
        assert_eq!(fields, vec!["partitions", "replicationFactor"]);

        let errors = create(&"a".repeat(250), 1, 1).validated().unwrap_err();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].field, "name");

        let topic = create("orders", 3, 2).validated().unwrap();
        assert_eq!(topic.partitions, 3);
        assert_eq!(topic.replication_factor, 2);
    }

    #[test]
    fn missing_and_mistyped_fields() {
        let errors = decode::<CreateTopicRequest>(json!({ "name": "x" })).unwrap_err();
        let fields: Vec<_> = errors.iter().map(|e| e.field.as_str()).collect();
        assert_eq!(fields, vec!["partitions", "replicationFactor"]);
        assert_eq!(errors[0].message, "Partitions is required");

        let errors = decode::<CreateTopicRequest>(json!({
            "name": 7,
            "partitions": 1.5,
            "replicationFactor": "x",
            "config": { "retention.ms": 1000 },
        }))
        .unwrap_err();
        let fields: Vec<_> = errors.iter().map(|e| e.field.as_str()).collect();
        assert_eq!(fields, vec!["config", "name", "partitions", "replicationFactor"]);
        assert_eq!(errors[3].message, "Replication factor must be an integer");

        let errors = decode::<UpdateConfigRequest>(json!([])).unwrap_err();
        assert_eq!(errors[0].field, "body");
    }

    #[test]
    fn null_optional_is_absent() {
        let req: CreateTopicRequest = decode(json!({
            "name": "orders",
            "partitions": 1,
            "replicationFactor": 1,
            "config": null,
        }))
        .unwrap();
        assert!(req.config.is_empty());

        let req: ConnectRequest = decode(json!({
            "name": "local",
            "bootstrapServers": "localhost:9092",
            "clientId": null,
        }))
        .unwrap();
        assert_eq!(req.client_id, None);
    }

    #[test]
    fn validator_fields_use_wire_names() {
        let req = ConnectRequest {
            name: "local".to_string(),
            bootstrap_servers: String::new(),
            client_id: None,
        };
        let errors = req.validated().unwrap_err();
        assert_eq!(errors[0].field, "bootstrapServers");
        assert_eq!(errors[0].message, "Bootstrap servers are required");
    }

    #[test]
    fn update_config_needs_an_entry() {
        let req = UpdateConfigRequest {
            config: BTreeMap::new(),
        };
        assert_eq!(req.validated().unwrap_err()[0].field, "config");
    }

    #[test]
    fn delete_query() {
        assert!(TopicQuery::default().validated().is_err());
        assert!(TopicQuery {
            name: Some(String::new())
        }
        .validated()
        .is_err());
        assert_eq!(
            TopicQuery {
                name: Some("a".to_string())
            }
            .validated()
            .unwrap(),
            "a"
        );
    }
}
