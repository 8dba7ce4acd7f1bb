//! Bearer-token authorization: key sets, verification and claim normalization.

pub mod claims;
pub mod jwks;
pub mod verifier;

use std::collections::BTreeSet;

pub use claims::TokenClaims;
pub use jwks::{JwksError, KeySet};
pub use verifier::{AuthError, TokenVerifier};

/// Who is asking, and what they may see.
///
/// `scopes == None` means no token was supplied; `Some(empty)` means a valid
/// token that grants nothing. Both see only public datasets.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuthorizationContext {
    pub subject: Option<String>,
    pub email: Option<String>,
    pub scopes: Option<BTreeSet<String>>,
}

impl AuthorizationContext {
    pub fn anonymous() -> Self {
        Self::default()
    }

    pub fn authenticated(subject: Option<String>, email: Option<String>, scopes: BTreeSet<String>) -> Self {
        Self { subject, email, scopes: Some(scopes) }
    }

    pub fn is_authenticated(&self) -> bool {
        self.scopes.is_some()
    }

    /// Identity used for database roles: e-mail, else subject.
    pub fn identity(&self) -> Option<&str> {
        self.email
            .as_deref()
            .or(self.subject.as_deref())
            .filter(|s| !s.is_empty())
    }

    pub fn granted(&self) -> Option<&BTreeSet<String>> {
        self.scopes.as_ref()
    }
}

/// Extract the token from an `Authorization` value of the form `bearer <token>`
/// (scheme case-insensitive). Anything else yields `None`.
pub fn token_from_header(value: &str) -> Option<&str> {
    let scheme = value.get(..7)?;
    let token = value.get(7..)?;
    if !scheme.eq_ignore_ascii_case("bearer ") || token.is_empty() {
        return None;
    }
    token
        .chars()
        .all(|c| c.is_alphanumeric() || matches!(c, '_' | '-' | '.' | '='))
        .then_some(token)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_bearer_header() {
        assert_eq!(token_from_header("Bearer abc.def-ghi_j="), Some("abc.def-ghi_j="));
        assert_eq!(token_from_header("bearer abc"), Some("abc"));
        assert_eq!(token_from_header("BEARER abc"), Some("abc"));
        assert_eq!(token_from_header("Basic dXNlcjpwYXNz"), None);
        assert_eq!(token_from_header("Bearer "), None);
        assert_eq!(token_from_header("Bearer abc def"), None);
        assert_eq!(token_from_header("Bearer"), None);
    }

    #[test]
    fn identity_prefers_email() {
        let ctx = AuthorizationContext::authenticated(Some("sub-1".into()), Some("a@b.nl".into()), BTreeSet::new());
        assert_eq!(ctx.identity(), Some("a@b.nl"));
        let ctx = AuthorizationContext::authenticated(Some("sub-1".into()), None, BTreeSet::new());
        assert_eq!(ctx.identity(), Some("sub-1"));
        assert_eq!(AuthorizationContext::anonymous().identity(), None);
    }

    #[test]
    fn zero_scopes_differs_from_no_token() {
        let empty = AuthorizationContext::authenticated(None, None, BTreeSet::new());
        assert!(empty.is_authenticated());
        assert!(!AuthorizationContext::anonymous().is_authenticated());
    }
}
