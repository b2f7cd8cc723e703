use std::{collections::BTreeSet, fmt};

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(ToSchema, Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Solicitor,
    Staff,
    Client,
}

impl Role {
    /// True only when a role is known and listed in `allowed`.
    #[must_use]
    pub fn can_see(allowed: &[Role], role: Option<Role>) -> bool {
        role.is_some_and(|role| allowed.contains(&role))
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Admin => "admin",
            Self::Solicitor => "solicitor",
            Self::Staff => "staff",
            Self::Client => "client",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Profile as returned by the identity API `me` endpoint.
#[derive(ToSchema, Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct Profile {
    pub user_id: String,
    pub org_id: String,
    pub role: Role,
    #[serde(default)]
    pub perms: Vec<String>,
    #[serde(default)]
    pub twofa: bool,
    /// Expiry, unix seconds.
    pub exp: i64,
}

/// Identity derived from a [`Profile`]. Always replaced wholesale.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct UserIdentity {
    pub id: String,
    pub org_id: String,
    pub role: Role,
    pub permissions: BTreeSet<String>,
    pub two_factor: bool,
    pub expires_at: i64,
}

impl UserIdentity {
    #[must_use]
    pub fn has_permission(&self, permission: &str) -> bool {
        self.permissions.contains(permission)
    }

    #[must_use]
    pub fn is_expired_at(&self, unix_seconds: i64) -> bool {
        self.expires_at <= unix_seconds
    }
}

impl From<Profile> for UserIdentity {
    fn from(profile: Profile) -> Self {
        Self {
            id: profile.user_id,
            org_id: profile.org_id,
            role: profile.role,
            permissions: profile.perms.into_iter().collect(),
            two_factor: profile.twofa,
            expires_at: profile.exp,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AuthStatus {
    Loading,
    Authenticated,
    Unauthenticated,
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use serde_json::json;

    #[test]
    fn can_see_requires_a_role() {
        assert!(!Role::can_see(&[Role::Admin], None));
        assert!(Role::can_see(&[Role::Admin, Role::Staff], Some(Role::Staff)));
        assert!(!Role::can_see(&[Role::Admin], Some(Role::Client)));
    }

    #[test]
    fn profile_becomes_identity() -> Result<()> {
        let profile: Profile = serde_json::from_value(json!({
            "user_id": "u_1",
            "org_id": "org_9",
            "role": "solicitor",
            "perms": ["matters:read", "matters:read", "billing:view"],
            "twofa": true,
            "exp": 1_900_000_000
        }))?;
        let identity = UserIdentity::from(profile);
        assert_eq!(identity.role, Role::Solicitor);
        assert_eq!(identity.org_id, "org_9");
        assert_eq!(identity.permissions.len(), 2);
        assert!(identity.has_permission("billing:view"));
        assert!(identity.two_factor);
        assert!(!identity.is_expired_at(1_800_000_000));
        Ok(())
    }

    #[test]
    fn unknown_role_is_rejected() {
        let result = serde_json::from_value::<Profile>(json!({
            "user_id": "u_1",
            "org_id": "org_9",
            "role": "superuser",
            "exp": 0
        }));
        assert!(result.is_err());
    }
}
