//! Authn primitives for the realtime gateway.
//!
//! # Purpose
//! Centralizes bearer-credential parsing, ability matching, the auth error
//! taxonomy, and the positive token cache shared by connection handshakes.
//!
//! # How it fits
//! The gateway's token validator parses bearers here, queries the tenant
//! database itself, and memoizes successful validations in [`TokenCache`].
//!
//! # Key invariants
//! - Bearer tokens are `<numeric id>|<opaque secret>` with exactly one `|`.
//! - The opaque secret is compared by SHA-256 lowercase hex, never raw.
//! - Cache entries never outlive the token's own expiry.

mod abilities;
mod bearer;
mod cache;
mod errors;
mod session;

pub use abilities::Abilities;
pub use bearer::{BearerCredentials, extract_bearer};
pub use cache::{CachedToken, DEFAULT_CACHE_TTL_SECS, TokenCache};
pub use errors::{AuthError, AuthResult};
pub use session::AuthenticatedSession;
