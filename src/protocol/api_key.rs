//! ApiKey to tag request types.
//!
//! Only the administrative APIs spoken by this crate are named, every other key
//! is carried through as [`ApiKey::Unknown`].
//!
//! # References
//! - <https://kafka.apache.org/protocol#protocol_api_keys>

#[derive(Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Clone, Copy)]
pub enum ApiKey {
    Metadata,
    ApiVersions,
    CreateTopics,
    DeleteTopics,
    DescribeConfigs,
    AlterConfigs,
    Unknown(i16),
}

impl From<i16> for ApiKey {
    fn from(key: i16) -> Self {
        match key {
            3 => Self::Metadata,
            18 => Self::ApiVersions,
            19 => Self::CreateTopics,
            20 => Self::DeleteTopics,
            32 => Self::DescribeConfigs,
            33 => Self::AlterConfigs,
            _ => Self::Unknown(key),
        }
    }
}

impl From<ApiKey> for i16 {
    fn from(key: ApiKey) -> Self {
        match key {
            ApiKey::Metadata => 3,
            ApiKey::ApiVersions => 18,
            ApiKey::CreateTopics => 19,
            ApiKey::DeleteTopics => 20,
            ApiKey::DescribeConfigs => 32,
            ApiKey::AlterConfigs => 33,
            ApiKey::Unknown(code) => code,
        }
    }
}
