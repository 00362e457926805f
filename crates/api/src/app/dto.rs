use std::str::FromStr;

use serde::Deserialize;

use backoffice_core::ExpectedVersion;

use crate::app::errors::ApiError;

/// `?expected_version=N` on entry update/delete.
#[derive(Debug, Default, Deserialize)]
pub struct VersionQuery {
    pub expected_version: Option<u64>,
}

impl VersionQuery {
    pub fn expected(&self) -> ExpectedVersion {
        ExpectedVersion::from_option(self.expected_version)
    }
}

/// Parse a path segment into a typed id.
pub fn parse_id<T: FromStr>(raw: &str, what: &str) -> Result<T, ApiError> {
    raw.parse()
        .map_err(|_| ApiError::InvalidId(format!("invalid {what} id '{raw}'")))
}
