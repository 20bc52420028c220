//! Signing URLs.
//!
//! The URL shape is fixed for compatibility: `{origin}/sign-contract/{token}`,
//! the token being the only path segment after the prefix and nothing
//! trust-relevant travelling in the query string.

use cosign_types::SigningToken;
use serde::Serialize;

/// Path prefix of the signing surface.
pub const SIGNING_PATH: &str = "sign-contract";

#[derive(Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct SigningLink(String);

impl SigningLink {
    pub fn build(origin: &str, token: &SigningToken) -> Self {
        Self(format!(
            "{}/{}/{}",
            origin.trim().trim_end_matches('/'),
            SIGNING_PATH,
            token.as_str()
        ))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }

    /// Extract the token from a signing path such as `/sign-contract/{token}`.
    pub fn token_from_path(path: &str) -> Option<SigningToken> {
        let path = path.split(['?', '#']).next().unwrap_or_default();
        let rest = path
            .trim_start_matches('/')
            .strip_prefix(SIGNING_PATH)?
            .strip_prefix('/')?;
        let token = rest.trim_end_matches('/');
        if token.is_empty() || token.contains('/') {
            return None;
        }
        Some(SigningToken::new(token))
    }
}

impl std::fmt::Debug for SigningLink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let prefix = self
            .0
            .rsplit_once('/')
            .map(|(prefix, _)| prefix)
            .unwrap_or_default();
        write!(f, "SigningLink({}/…)", prefix)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_canonical_url() {
        let link = SigningLink::build("https://app.example.com/", &SigningToken::new("abc123"));
        assert_eq!(link.as_str(), "https://app.example.com/sign-contract/abc123");
    }

    #[test]
    fn parses_token_back_out() {
        let token = SigningLink::token_from_path("/sign-contract/abc123").unwrap();
        assert_eq!(token.as_str(), "abc123");

        let token = SigningLink::token_from_path("sign-contract/abc123/?utm=mail").unwrap();
        assert_eq!(token.as_str(), "abc123");
    }

    #[test]
    fn rejects_foreign_or_nested_paths() {
        assert!(SigningLink::token_from_path("/contracts/abc123").is_none());
        assert!(SigningLink::token_from_path("/sign-contract/").is_none());
        assert!(SigningLink::token_from_path("/sign-contract/a/b").is_none());
        assert!(SigningLink::token_from_path("/sign-contractabc").is_none());
    }

    #[test]
    fn debug_hides_the_token() {
        let link = SigningLink::build("https://app.example.com", &SigningToken::new("secret"));
        assert!(!format!("{:?}", link).contains("secret"));
    }
}
