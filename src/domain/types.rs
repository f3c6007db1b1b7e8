//! Shared domain enumerations for settings scoping.

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// How records of a settings type are partitioned across tenants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScopeKind {
    /// One record per site.
    Site,
    /// One record for the whole deployment.
    Global,
    /// One record, resolved without a request-bound site lookup.
    Generic,
}

impl ScopeKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ScopeKind::Site => "site",
            ScopeKind::Global => "global",
            ScopeKind::Generic => "generic",
        }
    }

    pub fn is_site_aware(self) -> bool {
        matches!(self, ScopeKind::Site)
    }
}

impl fmt::Display for ScopeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("unknown scope kind `{0}` (expected site, global or generic)")]
pub struct ParseScopeKindError(pub String);

impl FromStr for ScopeKind {
    type Err = ParseScopeKindError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "site" => Ok(ScopeKind::Site),
            "global" => Ok(ScopeKind::Global),
            "generic" => Ok(ScopeKind::Generic),
            _ => Err(ParseScopeKindError(value.to_string())),
        }
    }
}

/// Identity a setting instance was resolved for.
///
/// Site-scoped types resolve one instance per site; global and generic types
/// share a single deployment-wide identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(tag = "kind", content = "site_id", rename_all = "snake_case")]
pub enum ScopeIdentity {
    Site(Uuid),
    Singleton,
}

impl ScopeIdentity {
    pub fn label(self) -> &'static str {
        match self {
            ScopeIdentity::Site(_) => "site",
            ScopeIdentity::Singleton => "singleton",
        }
    }
}

impl fmt::Display for ScopeIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScopeIdentity::Site(id) => write!(f, "site:{id}"),
            ScopeIdentity::Singleton => f.write_str("singleton"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scope_kind_parses_case_insensitively() {
        assert_eq!("Site".parse::<ScopeKind>(), Ok(ScopeKind::Site));
        assert_eq!(" GLOBAL ".parse::<ScopeKind>(), Ok(ScopeKind::Global));
        assert_eq!("generic".parse::<ScopeKind>(), Ok(ScopeKind::Generic));
        assert!("tenant".parse::<ScopeKind>().is_err());
    }

    #[test]
    fn only_site_scope_is_site_aware() {
        assert!(ScopeKind::Site.is_site_aware());
        assert!(!ScopeKind::Global.is_site_aware());
        assert!(!ScopeKind::Generic.is_site_aware());
    }

    #[test]
    fn scope_identity_display() {
        let id = Uuid::nil();
        assert_eq!(
            ScopeIdentity::Site(id).to_string(),
            format!("site:{id}")
        );
        assert_eq!(ScopeIdentity::Singleton.to_string(), "singleton");
    }
}
