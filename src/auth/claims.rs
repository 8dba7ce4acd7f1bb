use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeSet;

use super::AuthorizationContext;

/// The two token payload shapes we accept.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenClaims {
    /// `{"sub": ..., "scopes": [...]}`; the subject doubles as e-mail.
    DirectScopes { subject: Option<String>, scopes: Vec<String> },
    /// Keycloak: `{"sub": ..., "email": ..., "realm_access": {"roles": [...]}}`.
    RealmRoles { subject: Option<String>, email: Option<String>, roles: Vec<String> },
}

#[derive(Deserialize)]
struct RawClaims {
    sub: Option<String>,
    email: Option<String>,
    scopes: Option<Vec<String>>,
    realm_access: Option<RealmAccess>,
}

#[derive(Deserialize)]
struct RealmAccess {
    #[serde(default)]
    roles: Vec<String>,
}

impl TokenClaims {
    /// Classify a decoded payload. `None` when neither shape matches.
    pub fn from_value(value: &Value) -> Option<Self> {
        let raw: RawClaims = serde_json::from_value(value.clone()).ok()?;
        if let Some(scopes) = raw.scopes {
            return Some(TokenClaims::DirectScopes { subject: raw.sub, scopes });
        }
        raw.realm_access.map(|realm| TokenClaims::RealmRoles {
            subject: raw.sub,
            email: raw.email,
            roles: realm.roles,
        })
    }

    pub fn normalize(self) -> AuthorizationContext {
        match self {
            TokenClaims::DirectScopes { subject, scopes } => {
                let scopes: BTreeSet<String> = scopes.into_iter().collect();
                AuthorizationContext::authenticated(subject.clone(), subject, scopes)
            }
            TokenClaims::RealmRoles { subject, email, roles } => {
                let scopes = roles.iter().map(|r| convert_scope(r)).collect();
                AuthorizationContext::authenticated(subject, email, scopes)
            }
        }
    }
}

/// Keycloak role -> scope: `fake_secret` becomes `FAKE/SECRET`.
pub fn convert_scope(role: &str) -> String {
    role.to_uppercase().replace('_', "/")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn direct_scopes_are_used_as_is() {
        let claims = TokenClaims::from_value(&json!({"sub": "test@example.com", "scopes": ["FAKE/SECRET", "BRK/RS"]})).unwrap();
        let ctx = claims.normalize();
        assert_eq!(ctx.subject.as_deref(), Some("test@example.com"));
        assert_eq!(ctx.email.as_deref(), Some("test@example.com"));
        assert!(ctx.scopes.unwrap().contains("FAKE/SECRET"));
    }

    #[test]
    fn realm_roles_are_converted() {
        let value = json!({
            "sub": "abc-123",
            "email": "medewerker@amsterdam.nl",
            "realm_access": {"roles": ["fake_secret", "brk_rsn"]}
        });
        let ctx = TokenClaims::from_value(&value).unwrap().normalize();
        let scopes = ctx.scopes.unwrap();
        assert!(scopes.contains("FAKE/SECRET"));
        assert!(scopes.contains("BRK/RSN"));
        assert_eq!(ctx.email.as_deref(), Some("medewerker@amsterdam.nl"));
        assert_eq!(ctx.subject.as_deref(), Some("abc-123"));
    }

    #[test]
    fn empty_scope_list_is_still_authenticated() {
        let ctx = TokenClaims::from_value(&json!({"sub": "x", "scopes": []})).unwrap().normalize();
        assert_eq!(ctx.scopes, Some(BTreeSet::new()));
    }

    #[test]
    fn unknown_shapes_are_rejected() {
        assert!(TokenClaims::from_value(&json!({"sub": "x"})).is_none());
        assert!(TokenClaims::from_value(&json!({"scopes": "not-a-list"})).is_none());
    }
}
