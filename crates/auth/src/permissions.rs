use std::borrow::Cow;

use serde::{Deserialize, Serialize};

/// Permission identifier.
///
/// Permissions are opaque strings (e.g. `"entries.write"`). The wildcard
/// `"*"` allows everything.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Permission(Cow<'static, str>);

impl Permission {
    /// Create, rename and delete customers.
    pub const CUSTOMERS_WRITE: Permission = Permission(Cow::Borrowed("customers.write"));
    /// Create, update and delete ledger entries; rebuild balances.
    pub const ENTRIES_WRITE: Permission = Permission(Cow::Borrowed("entries.write"));
    /// Maintain worksites, groups, companies and personnel.
    pub const DIRECTORY_WRITE: Permission = Permission(Cow::Borrowed("directory.write"));
    pub const WILDCARD: Permission = Permission(Cow::Borrowed("*"));

    pub fn new(name: impl Into<Cow<'static, str>>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_wildcard(&self) -> bool {
        self.as_str() == "*"
    }
}

impl core::fmt::Display for Permission {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}
