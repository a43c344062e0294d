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

/// Replaces the dynamic configuration of resources.
///
/// This is the non-incremental API: keys left out of a resource revert to
/// their defaults, so callers send the complete desired set.
#[derive(Debug, PartialEq, Eq)]
pub struct AlterConfigsRequest {
    /// The updates for each resource.
    pub resources: Vec<AlterConfigsResource>,

    /// True if we should validate the request, but not change the configurations.
    pub validate_only: bool,
}

impl RequestBody for AlterConfigsRequest {
    type ResponseBody = AlterConfigsResponse;

    const API_KEY: ApiKey = ApiKey::AlterConfigs;

    const API_VERSION_RANGE: ApiVersionRange = ApiVersionRange::new(0, 1);
}

impl<W> WriteVersionedType<W> for AlterConfigsRequest
where
    W: Write,
{
    fn write_versioned(
        &self,
        writer: &mut W,
        version: ApiVersion,
    ) -> Result<(), WriteVersionedError> {
        assert!(version.0 <= 1);

        write_versioned_array(writer, version, Some(&self.resources))?;
        self.validate_only.write(writer)?;

        Ok(())
    }
}

#[derive(Debug, PartialEq, Eq)]
pub struct AlterConfigsResource {
    /// The resource type.
    pub resource_type: i8,

    /// The resource name.
    pub resource_name: String,

    /// The configurations.
    pub configs: Vec<AlterableConfig>,
}

impl<W> WriteVersionedType<W> for AlterConfigsResource
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
        write_versioned_array(writer, version, Some(&self.configs))?;

        Ok(())
    }
}

#[derive(Debug, PartialEq, Eq)]
pub struct AlterableConfig {
    /// The configuration key name.
    pub name: String,

    /// The value to set for the configuration key.
    pub value: Option<String>,
}

impl<W> WriteVersionedType<W> for AlterableConfig
where
    W: Write,
{
    fn write_versioned(
        &self,
        writer: &mut W,
        version: ApiVersion,
    ) -> Result<(), WriteVersionedError> {
        assert!(version.0 <= 1);

        self.name.write(writer)?;
        self.value.write(writer)?;

        Ok(())
    }
}

#[derive(Debug, PartialEq, Eq)]
pub struct AlterConfigsResponse {
    /// Duration in milliseconds for which the request was throttled due to a quota violation, or zero if the request
    /// did not violate any quota.
    pub throttle_time_ms: i32,

    /// The responses for each resource.
    pub responses: Vec<AlterConfigsResourceResponse>,
}

impl<R> ReadVersionedType<R> for AlterConfigsResponse
where
    R: Read,
{
    fn read_versioned(reader: &mut R, version: ApiVersion) -> Result<Self, ReadVersionedError> {
        assert!(version.0 <= 1);

        Ok(Self {
            throttle_time_ms: i32::read(reader)?,
            responses: read_versioned_array(reader, version)?.unwrap_or_default(),
        })
    }
}

#[derive(Debug, PartialEq, Eq)]
pub struct AlterConfigsResourceResponse {
    /// The resource error code.
    pub error: Option<Error>,

    /// The resource error message, or null if there was no error.
    pub error_message: Option<String>,

    /// The resource type.
    pub resource_type: i8,

    /// The resource name.
    pub resource_name: String,
}

impl<R> ReadVersionedType<R> for AlterConfigsResourceResponse
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
        })
    }
}
