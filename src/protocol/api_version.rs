#[derive(Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Clone, Copy)]
pub struct ApiVersion(pub i16);

impl From<i16> for ApiVersion {
    fn from(value: i16) -> Self {
        ApiVersion(value)
    }
}

impl ApiVersion {
    pub const fn new(value: i16) -> ApiVersion {
        ApiVersion(value)
    }
}

impl std::fmt::Display for ApiVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Inclusive range of versions supported for one API.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub struct ApiVersionRange {
    min: ApiVersion,
    max: ApiVersion,
}

impl ApiVersionRange {
    pub const fn new(min: i16, max: i16) -> Self {
        assert!(min <= max);

        Self {
            min: ApiVersion(min),
            max: ApiVersion(max),
        }
    }

    pub fn min(&self) -> ApiVersion {
        self.min
    }

    pub fn max(&self) -> ApiVersion {
        self.max
    }

    /// Highest version supported by both ranges, if they overlap.
    pub fn highest_common(&self, other: &ApiVersionRange) -> Option<ApiVersion> {
        let max = self.max.min(other.max);
        let min = self.min.max(other.min);
        (min <= max).then_some(max)
    }
}

impl std::fmt::Display for ApiVersionRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.min, self.max)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn highest_common_version() {
        let ours = ApiVersionRange::new(0, 4);
        assert_eq!(
            ours.highest_common(&ApiVersionRange::new(0, 12)),
            Some(ApiVersion(4))
        );
        assert_eq!(
            ours.highest_common(&ApiVersionRange::new(2, 3)),
            Some(ApiVersion(3))
        );
        assert_eq!(ours.highest_common(&ApiVersionRange::new(5, 9)), None);
    }
}
