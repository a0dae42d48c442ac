//! Caller identity and realization-level authorization
//!
//! The gatekeeper re-checks every successful response against the
//! realization (cube or table) that actually answered it. Denials are tied
//! to the caller and are therefore never cached.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use crate::config::ConfigSource;

/// Caller roles with hierarchical permissions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Analyst,
    Viewer,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Admin => write!(f, "admin"),
            Role::Analyst => write!(f, "analyst"),
            Role::Viewer => write!(f, "viewer"),
        }
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "admin" => Ok(Role::Admin),
            "analyst" => Ok(Role::Analyst),
            "viewer" => Ok(Role::Viewer),
            _ => Err(format!(
                "Unknown role '{s}'. Valid roles: admin, analyst, viewer"
            )),
        }
    }
}

/// Identity of whoever issued the request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Caller {
    pub username: String,
    pub roles: Vec<Role>,
}

impl Caller {
    pub fn new(username: impl Into<String>, roles: Vec<Role>) -> Self {
        Self {
            username: username.into(),
            roles,
        }
    }

    pub fn anonymous(role: Role) -> Self {
        Self::new("anonymous", vec![role])
    }

    pub fn has_role(&self, role: Role) -> bool {
        self.roles.contains(&role)
    }
}

/// The caller may not read the realization that produced a result.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Access is denied: {0}")]
pub struct AccessDenied(pub String);

/// Decides whether a caller may see a result produced by `realization`.
pub trait Authorizer: Send + Sync {
    fn check_authorization(&self, caller: &Caller, realization: &str) -> Result<(), AccessDenied>;
}

/// Grants everything. For deployments running with secure query mode off.
pub struct AllowAll;

impl Authorizer for AllowAll {
    fn check_authorization(&self, _caller: &Caller, _realization: &str) -> Result<(), AccessDenied> {
        Ok(())
    }
}

/// ACL-backed authorizer reading `[security.acl]` from the live configuration.
///
/// Admins may read every realization. Anyone else needs an ACL entry naming
/// their username or one of their roles; realizations without an entry are
/// denied.
pub struct AclAuthorizer {
    config: Arc<dyn ConfigSource>,
}

impl AclAuthorizer {
    pub fn new(config: Arc<dyn ConfigSource>) -> Self {
        Self { config }
    }
}

impl Authorizer for AclAuthorizer {
    fn check_authorization(&self, caller: &Caller, realization: &str) -> Result<(), AccessDenied> {
        if caller.has_role(Role::Admin) {
            return Ok(());
        }

        let config = self.config.current();
        let Some(entry) = config.security.acl.get(realization) else {
            return Err(AccessDenied(format!(
                "user '{}' has no access to '{realization}'",
                caller.username
            )));
        };

        let by_user = entry.users.iter().any(|u| *u == caller.username);
        let by_role = caller.roles.iter().any(|r| entry.roles.contains(r));
        if by_user || by_role {
            Ok(())
        } else {
            Err(AccessDenied(format!(
                "user '{}' has no access to '{realization}'",
                caller.username
            )))
        }
    }
}
