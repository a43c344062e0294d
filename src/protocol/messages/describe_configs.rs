use std::io::{Read, Write};

use super::{
    read_versioned_array, write_versioned_array, ReadVersionedError, ReadVersionedType,
    RequestBody, WriteVersionedError, WriteVersionedType,
};
use crate::protocol::{
    api_key::ApiKey,
    api_version::{ApiVersion, ApiVersionRange},
    error::Error,
    traits::{ReadType, WriteType},
};

/// Resource type of a topic in the config APIs.
pub const RESOURCE_TYPE_TOPIC: i8 = 2;

/// Resource type of a broker in the config APIs.
pub const RESOURCE_TYPE_BROKER: i8 = 4;

#[derive(Debug, PartialEq, Eq)]
pub struct DescribeConfigsRequest {
    /// The resources whose configurations we want to describe.
    pub resources: Vec<DescribeConfigsResource>,

    /// True if we should include all synonyms.
    ///
    /// Added in version 1
    pub include_synonyms: bool,
}

impl RequestBody for DescribeConfigsRequest {
    type ResponseBody = DescribeConfigsResponse;

    const API_KEY: ApiKey = ApiKey::DescribeConfigs;

    /// Later versions only add documentation fields the console never shows.
    const API_VERSION_RANGE: ApiVersionRange = ApiVersionRange::new(0, 1);
}

impl<W> WriteVersionedType<W> for DescribeConfigsRequest
where
    W: Write,
{
    fn write_versioned(
        &self,
        writer: &mut W,
        version: ApiVersion,
    ) -> Result<(), WriteVersionedError> {
        let v = version.0;
        assert!(v <= 1);

        write_versioned_array(writer, version, Some(&self.resources))?;
        if v >= 1 {
            self.include_synonyms.write(writer)?;
        }

        Ok(())
    }
}

#[derive(Debug, PartialEq, Eq)]
pub struct DescribeConfigsResource {
    /// The resource type.
    pub resource_type: i8,

    /// The resource name.
    pub resource_name: String,

    /// The configuration keys to list, or null to list all configuration keys.
    pub configuration_keys: Option<Vec<String>>,
}

impl<W> WriteVersionedType<W> for DescribeConfigsResource
where
    W: Write,
{
    fn write_versioned(
        &self,
        writer: &mut W,
        version: ApiVersion,
    ) -> Result<(), WriteVersionedError> {
        assert!(version.0 <= 1);

        self.resource_type.write(writer)?;
        self.resource_name.write(writer)?;
        match &self.configuration_keys {
            Some(keys) => keys.write(writer)?,
            None => (-1i32).write(writer)?,
        }

        Ok(())
    }
}

#[derive(Debug, PartialEq, Eq)]
pub struct DescribeConfigsResponse {
    /// The duration in milliseconds for which the request was throttled due to a quota
    /// violation, or zero if the request did not violate any quota.
    pub throttle_time_ms: i32,

    /// The results for each resource.
    pub results: Vec<DescribeConfigsResult>,
}

impl<R> ReadVersionedType<R> for DescribeConfigsResponse
where
    R: Read,
{
    fn read_versioned(reader: &mut R, version: ApiVersion) -> Result<Self, ReadVersionedError> {
        assert!(version.0 <= 1);

        Ok(Self {
            throttle_time_ms: i32::read(reader)?,
            results: read_versioned_array(reader, version)?.unwrap_or_default(),
        })
    }
}

#[derive(Debug, PartialEq, Eq)]
pub struct DescribeConfigsResult {
    /// The error code, or 0 if we were able to successfully describe the configurations.
    pub error: Option<Error>,

    /// The error message, or null if we were able to successfully describe the configurations.
    pub error_message: Option<String>,

    /// The resource type.
    pub resource_type: i8,

    /// The resource name.
    pub resource_name: String,

    /// Each listed configuration.
    pub configs: Vec<DescribeConfigsResourceResult>,
}

impl<R> ReadVersionedType<R> for DescribeConfigsResult
where
    R: Read,
{
    fn read_versioned(reader: &mut R, version: ApiVersion) -> Result<Self, ReadVersionedError> {
        assert!(version.0 <= 1);

        Ok(Self {
            error: Error::new(i16::read(reader)?),
            error_message: ReadType::read(reader)?,
            resource_type: i8::read(reader)?,
            resource_name: String::read(reader)?,
            configs: read_versioned_array(reader, version)?.unwrap_or_default(),
        })
    }
}

#[derive(Debug, PartialEq, Eq)]
pub struct DescribeConfigsResourceResult {
    /// The configuration name.
    pub name: String,

    /// The configuration value.
    pub value: Option<String>,

    /// True if the configuration is read-only.
    pub read_only: bool,

    /// True if the configuration is not set.
    ///
    /// Version 0 sends this flag, later versions derive it from the config
    /// source (`5` means default).
    pub is_default: bool,

    /// True if this configuration is sensitive.
    pub is_sensitive: bool,
}

impl<R> ReadVersionedType<R> for DescribeConfigsResourceResult
where
    R: Read,
{
    fn read_versioned(reader: &mut R, version: ApiVersion) -> Result<Self, ReadVersionedError> {
        let v = version.0;
        assert!(v <= 1);

        let name = String::read(reader)?;
        let value = ReadType::read(reader)?;
        let read_only = bool::read(reader)?;
        let is_default = if v >= 1 {
            i8::read(reader)? == 5
        } else {
            bool::read(reader)?
        };
        let is_sensitive = bool::read(reader)?;

        if v >= 1 {
            // synonyms: name, value, source
            let len = i32::read(reader)?;
            for _ in 0..len.max(0) {
                String::read(reader)?;
                Option::<String>::read(reader)?;
                i8::read(reader)?;
            }
        }

        Ok(Self {
            name,
            value,
            read_only,
            is_default,
            is_sensitive,
        })
    }
}
