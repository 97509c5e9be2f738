//! Requested permissions and target connection.
//!
//! Both are immutable once built; validation happens at construction.

use crate::{AuthError, AuthResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

/// Permission requested when the caller supplies none.
pub const DEFAULT_PERMISSION: &str = "public_profile";

/// A single scope requested from the identity provider.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Permission(String);

impl Permission {
    /// Validate and build a permission. Surrounding whitespace is trimmed;
    /// empty values and values with inner whitespace are rejected.
    pub fn new(value: impl AsRef<str>) -> AuthResult<Self> {
        let trimmed = value.as_ref().trim();
        if trimmed.is_empty() {
            return Err(AuthError::invalid_configuration(
                "permission must not be empty",
            ));
        }
        if trimmed.chars().any(char::is_whitespace) {
            return Err(AuthError::invalid_configuration(format!(
                "permission '{}' must not contain whitespace",
                trimmed
            )));
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for Permission {
    type Err = AuthError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Permission::new(s)
    }
}

impl TryFrom<String> for Permission {
    type Error = AuthError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Permission::new(value)
    }
}

impl From<Permission> for String {
    fn from(permission: Permission) -> Self {
        permission.0
    }
}

impl AsRef<str> for Permission {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Non-empty set of requested permissions. Order is not significant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct PermissionSet(BTreeSet<Permission>);

impl PermissionSet {
    /// The default set: `{"public_profile"}`.
    pub fn default_set() -> Self {
        let mut set = BTreeSet::new();
        set.insert(Permission(DEFAULT_PERMISSION.to_string()));
        Self(set)
    }

    /// Build a set from caller-supplied scope strings.
    ///
    /// An empty input yields the default set. Any invalid entry fails the
    /// whole construction. Duplicates collapse.
    pub fn new<I, S>(permissions: I) -> AuthResult<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let set = permissions
            .into_iter()
            .map(Permission::new)
            .collect::<AuthResult<BTreeSet<_>>>()?;

        if set.is_empty() {
            Ok(Self::default_set())
        } else {
            Ok(Self(set))
        }
    }

    pub fn contains(&self, permission: &str) -> bool {
        self.0.iter().any(|p| p.as_str() == permission)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Permission> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Always false; kept for API symmetry with `len`.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Scope strings in sorted order.
    pub fn to_strings(&self) -> Vec<String> {
        self.0.iter().map(|p| p.0.clone()).collect()
    }
}

impl Default for PermissionSet {
    fn default() -> Self {
        Self::default_set()
    }
}

impl fmt::Display for PermissionSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_strings().join(" "))
    }
}

/// Which identity-provider connection an orchestrator targets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawConnectionDescriptor")]
pub struct ConnectionDescriptor {
    name: Option<String>,
    is_default: bool,
}

/// Unvalidated wire form. `is_default` follows from `name`.
#[derive(Deserialize)]
struct RawConnectionDescriptor {
    #[serde(default)]
    name: Option<String>,
}

impl TryFrom<RawConnectionDescriptor> for ConnectionDescriptor {
    type Error = AuthError;

    fn try_from(raw: RawConnectionDescriptor) -> Result<Self, Self::Error> {
        match raw.name {
            Some(name) => ConnectionDescriptor::named(name),
            None => Ok(ConnectionDescriptor::provider_default()),
        }
    }
}

impl ConnectionDescriptor {
    /// The provider's default connection.
    pub fn provider_default() -> Self {
        Self {
            name: None,
            is_default: true,
        }
    }

    /// A named connection. The name is trimmed and must not be empty.
    pub fn named(name: impl AsRef<str>) -> AuthResult<Self> {
        let trimmed = name.as_ref().trim();
        if trimmed.is_empty() {
            return Err(AuthError::invalid_configuration(
                "connection name must not be empty",
            ));
        }
        Ok(Self {
            name: Some(trimmed.to_string()),
            is_default: false,
        })
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn is_default(&self) -> bool {
        self.is_default
    }

    /// The connection name to send, falling back to the provider default.
    pub fn resolve<'a>(&'a self, provider_default: &'a str) -> &'a str {
        self.name.as_deref().unwrap_or(provider_default)
    }
}

impl Default for ConnectionDescriptor {
    fn default() -> Self {
        Self::provider_default()
    }
}
