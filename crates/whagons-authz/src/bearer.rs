use sha2::{Digest, Sha256};

use crate::errors::{AuthError, AuthResult};

/// Parsed bearer credentials: `<token id>|<opaque secret>`.
///
/// The secret is kept private and only ever leaves as its SHA-256 hex digest,
/// which is what the token store persists.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BearerCredentials {
    pub token_id: i64,
    secret: String,
}

impl BearerCredentials {
    /// Splits on `|`. Zero or more than one separator, an empty half, or a
    /// non-numeric id all reject as [`AuthError::MalformedBearer`].
    pub fn parse(raw: &str) -> AuthResult<Self> {
        let parts: Vec<&str> = raw.split('|').collect();
        let [id, secret] = parts.as_slice() else {
            return Err(AuthError::MalformedBearer);
        };
        if secret.is_empty() {
            return Err(AuthError::MalformedBearer);
        }
        let token_id: i64 = id.parse().map_err(|_| AuthError::MalformedBearer)?;
        Ok(Self {
            token_id,
            secret: secret.to_string(),
        })
    }

    /// Lowercase hex SHA-256 of the opaque secret (64 chars).
    pub fn hashed_secret(&self) -> String {
        format!("{:x}", Sha256::digest(self.secret.as_bytes()))
    }
}

/// Pulls the bearer out of an `Authorization: Bearer …` header value, falling
/// back to the `token` query parameter used by browser transports.
pub fn extract_bearer(auth_header: Option<&str>, query_param: Option<&str>) -> Option<String> {
    if let Some(header) = auth_header
        && let Some(token) = header.strip_prefix("Bearer ")
        && !token.is_empty()
    {
        return Some(token.to_string());
    }
    query_param
        .filter(|token| !token.is_empty())
        .map(|token| token.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_well_formed_bearer() {
        let credentials = BearerCredentials::parse("7|secret").expect("parse");
        assert_eq!(credentials.token_id, 7);
        assert_eq!(
            credentials.hashed_secret(),
            // sha256("secret")
            "2bb80d537b1da3e38bd30361aa855686bde0eacd7162fef6a25fe97bf527a25b"
        );
    }

    #[test]
    fn rejects_missing_separator() {
        assert!(matches!(
            BearerCredentials::parse("justasecret"),
            Err(AuthError::MalformedBearer)
        ));
    }

    #[test]
    fn rejects_extra_separators() {
        assert!(matches!(
            BearerCredentials::parse("7|part|extra"),
            Err(AuthError::MalformedBearer)
        ));
    }

    #[test]
    fn rejects_non_numeric_id() {
        assert!(matches!(
            BearerCredentials::parse("seven|secret"),
            Err(AuthError::MalformedBearer)
        ));
    }

    #[test]
    fn rejects_empty_secret() {
        assert!(matches!(
            BearerCredentials::parse("7|"),
            Err(AuthError::MalformedBearer)
        ));
    }

    #[test]
    fn header_takes_precedence_over_query() {
        let bearer = extract_bearer(Some("Bearer abc"), Some("def"));
        assert_eq!(bearer.as_deref(), Some("abc"));
    }

    #[test]
    fn query_is_the_fallback() {
        assert_eq!(extract_bearer(None, Some("def")).as_deref(), Some("def"));
        // A non-bearer Authorization header falls through to the query param.
        assert_eq!(
            extract_bearer(Some("Basic xyz"), Some("def")).as_deref(),
            Some("def")
        );
    }

    #[test]
    fn absent_everywhere_is_none() {
        assert!(extract_bearer(None, None).is_none());
        assert!(extract_bearer(Some(""), Some("")).is_none());
    }
}
