use thiserror::Error;

/// Authentication failure taxonomy. Every variant is reported to the client
/// on an `error/auth_error` frame and never retried server-side.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("malformed bearer token")]
    MalformedBearer,
    #[error("no tenant found for domain: {0}")]
    TenantNotFound(String),
    #[error("tenant unreachable: {0}")]
    TenantUnreachable(String),
    #[error("token not found in tenant {0}")]
    InvalidToken(String),
    #[error("token expired")]
    Expired,
}

pub type AuthResult<T> = Result<T, AuthError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_variants() {
        let errors = vec![
            AuthError::MalformedBearer,
            AuthError::TenantNotFound("acme.example".to_string()),
            AuthError::TenantUnreachable("acme".to_string()),
            AuthError::InvalidToken("acme".to_string()),
            AuthError::Expired,
        ];
        for error in errors {
            assert!(!error.to_string().is_empty());
        }
    }
}
