//! Staff access-token verification for the `/ws` upgrade (spec §4.6): HS256
//! JWTs, rejecting anything whose `type` claim is `refresh`.

use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub role: String,
    #[serde(default = "default_token_type")]
    pub r#type: String,
    pub exp: i64,
}

fn default_token_type() -> String {
    "access".to_string()
}

/// `{userId, role}` attached to an authenticated socket connection.
#[derive(Debug, Clone)]
pub struct Identity {
    pub user_id: String,
    pub role: String,
}

/// Verify a staff token against `secret`. Any decode failure, expiry, or a
/// `type` claim other than `access` is an auth failure (spec §4.6: "rejecting
/// tokens whose type is `refresh`").
pub fn verify(token: &str, secret: &str) -> Result<Identity, String> {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.validate_exp = true;
    let data = decode::<Claims>(token, &DecodingKey::from_secret(secret.as_bytes()), &validation)
        .map_err(|e| e.to_string())?;
    if data.claims.r#type != "access" {
        return Err(format!("unsupported token type: {}", data.claims.r#type));
    }
    Ok(Identity { user_id: data.claims.sub, role: data.claims.role })
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::{encode, EncodingKey, Header};

    fn token(role: &str, token_type: &str, exp_offset_secs: i64) -> String {
        let claims = Claims {
            sub: "user-1".to_string(),
            role: role.to_string(),
            r#type: token_type.to_string(),
            exp: (chrono::Utc::now().timestamp() + exp_offset_secs),
        };
        encode(&Header::new(Algorithm::HS256), &claims, &EncodingKey::from_secret(b"test-secret")).unwrap()
    }

    #[test]
    fn valid_access_token_verifies() {
        let t = token("manager", "access", 3600);
        let identity = verify(&t, "test-secret").unwrap();
        assert_eq!(identity.user_id, "user-1");
        assert_eq!(identity.role, "manager");
    }

    #[test]
    fn refresh_tokens_are_rejected() {
        let t = token("manager", "refresh", 3600);
        assert!(verify(&t, "test-secret").is_err());
    }

    #[test]
    fn expired_tokens_are_rejected() {
        let t = token("manager", "access", -10);
        assert!(verify(&t, "test-secret").is_err());
    }

    #[test]
    fn wrong_secret_is_rejected() {
        let t = token("manager", "access", 3600);
        assert!(verify(&t, "wrong-secret").is_err());
    }
}
