//! HTTP Basic authentication for upload, update and delete

use super::AppState;
use crate::config::AuthConfig;
use crate::error::{CoreError, Result};
use argon2::password_hash::{rand_core::OsRng, PasswordHash, SaltString};
use argon2::{Argon2, PasswordHasher, PasswordVerifier};
use axum::{
    body::Body,
    extract::State,
    http::{header, Request},
    middleware::Next,
    response::{IntoResponse, Response},
};
use base64::{engine::general_purpose::STANDARD, Engine as _};

/// Upload account: a username and an Argon2 PHC password hash
#[derive(Debug, Clone)]
pub struct Credentials {
    username: String,
    password_hash: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password_hash: &str) -> Result<Self> {
        PasswordHash::new(password_hash)
            .map_err(|e| CoreError::Config(format!("Invalid password hash: {}", e)))?;

        Ok(Credentials {
            username: username.into(),
            password_hash: password_hash.to_string(),
        })
    }

    /// Credentials from the `[auth]` section; `None` if neither value is set
    pub fn from_config(auth: &AuthConfig) -> Result<Option<Self>> {
        match (&auth.username, &auth.password_hash) {
            (Some(username), Some(hash)) => Self::new(username.clone(), hash).map(Some),
            (None, None) => Ok(None),
            _ => Err(CoreError::Config(
                "auth.username and auth.password_hash must be set together".to_string(),
            )),
        }
    }

    /// Check a username/password pair. The password is always verified so
    /// timing does not reveal whether the username matched.
    pub fn verify(&self, username: &str, password: &str) -> bool {
        let username_ok = constant_time_eq(username.as_bytes(), self.username.as_bytes());
        let password_ok = PasswordHash::new(&self.password_hash)
            .map(|hash| {
                Argon2::default()
                    .verify_password(password.as_bytes(), &hash)
                    .is_ok()
            })
            .unwrap_or(false);
        username_ok & password_ok
    }
}

/// Hash a password into an Argon2id PHC string for `auth.password_hash`
pub fn hash_password(plain: &str) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(plain.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| CoreError::Config(format!("Failed to hash password: {}", e)))
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

/// Split `Basic <base64(user:password)>` into its parts
fn parse_basic(header: &str) -> Option<(String, String)> {
    let (scheme, encoded) = header.trim().split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("basic") {
        return None;
    }
    let decoded = STANDARD.decode(encoded.trim()).ok()?;
    let decoded = String::from_utf8(decoded).ok()?;
    let (user, password) = decoded.split_once(':')?;
    Some((user.to_string(), password.to_string()))
}

/// Authentication middleware
///
/// Expects `Authorization: Basic <base64(username:password)>`. When no
/// credentials are configured every request is rejected.
pub async fn require_credentials(
    State(state): State<AppState>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let Some(credentials) = state.credentials.clone() else {
        tracing::warn!("Rejected {}: no upload credentials configured", request.uri());
        return CoreError::Unauthorized.into_response();
    };

    let provided = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(parse_basic);

    let Some((username, password)) = provided else {
        return CoreError::Unauthorized.into_response();
    };

    // Argon2 verification is CPU-bound
    let verified = tokio::task::spawn_blocking(move || credentials.verify(&username, &password))
        .await
        .unwrap_or(false);

    if verified {
        next.run(request).await
    } else {
        tracing::warn!("Invalid credentials for {}", request.uri());
        CoreError::Unauthorized.into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_basic() {
        let header = format!("Basic {}", STANDARD.encode("clerk:pa:ss"));
        assert_eq!(
            parse_basic(&header),
            Some(("clerk".to_string(), "pa:ss".to_string()))
        );
        assert_eq!(parse_basic("Bearer abc"), None);
        assert_eq!(parse_basic("Basic !!!"), None);
        assert_eq!(parse_basic(&format!("Basic {}", STANDARD.encode("nocolon"))), None);
    }

    #[test]
    fn test_verify() {
        let hash = hash_password("s3cret").unwrap();
        let credentials = Credentials::new("clerk", &hash).unwrap();

        assert!(credentials.verify("clerk", "s3cret"));
        assert!(!credentials.verify("clerk", "wrong"));
        assert!(!credentials.verify("other", "s3cret"));
    }

    #[test]
    fn test_from_config() {
        assert!(Credentials::from_config(&AuthConfig::default())
            .unwrap()
            .is_none());

        let half = AuthConfig {
            username: Some("clerk".to_string()),
            password_hash: None,
        };
        assert!(matches!(
            Credentials::from_config(&half),
            Err(CoreError::Config(_))
        ));

        let bad_hash = AuthConfig {
            username: Some("clerk".to_string()),
            password_hash: Some("plaintext".to_string()),
        };
        assert!(Credentials::from_config(&bad_hash).is_err());
    }

    #[test]
    fn test_constant_time_eq() {
        assert!(constant_time_eq(b"abc", b"abc"));
        assert!(!constant_time_eq(b"abc", b"abd"));
        assert!(!constant_time_eq(b"abc", b"ab"));
    }
}
