use jsonwebtoken::{DecodingKey, EncodingKey, Header, TokenData, Validation};
use serde::{Deserialize, Serialize};

/// Claims carried by the hosted auth provider's access tokens.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserClaims {
    pub sub: String,
    pub exp: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aud: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default = "default_role")]
    pub role: String,
    #[serde(default)]
    pub user_metadata: UserMetadata,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UserMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
}

fn default_role() -> String {
    String::from("authenticated")
}

pub fn generate_token<K: AsRef<[u8]>>(
    claims: UserClaims,
    key: K,
) -> jsonwebtoken::errors::Result<String> {
    let header = Header::default();
    let key = EncodingKey::from_secret(key.as_ref());

    let token = jsonwebtoken::encode(&header, &claims, &key)?;
    Ok(token)
}

/// Decodes an access token. Without a secret the signature is not checked:
/// the database verifies it again on every request, the client only needs
/// the claims.
pub fn process_token(
    token: &str,
    key: Option<&[u8]>,
) -> jsonwebtoken::errors::Result<TokenData<UserClaims>> {
    let mut validation = Validation::default();
    validation.validate_aud = false;

    let key = match key {
        Some(key) => DecodingKey::from_secret(key),
        None => {
            validation.insecure_disable_signature_validation();
            DecodingKey::from_secret(&[])
        }
    };

    let claims = jsonwebtoken::decode::<UserClaims>(token, &key, &validation)?;
    Ok(claims)
}

#[cfg(test)]
mod test {
    use super::*;

    fn claims() -> UserClaims {
        UserClaims {
            sub: uuid::Uuid::new_v4().to_string(),
            exp: chrono::Utc::now().timestamp() + 3600,
            aud: Some("authenticated".into()),
            email: Some("learner@example.com".into()),
            role: default_role(),
            user_metadata: UserMetadata {
                username: Some("photon".into()),
            },
        }
    }

    #[test]
    fn wrong_secret_is_rejected() {
        let token = generate_token(claims(), "right").unwrap();
        assert!(process_token(&token, Some(b"wrong")).is_err());
        assert!(process_token(&token, Some(b"right")).is_ok());
    }

    #[test]
    fn claims_are_readable_without_secret() {
        let token = generate_token(claims(), "unknown to the client").unwrap();
        let data = process_token(&token, None).unwrap();
        assert_eq!(data.claims.user_metadata.username.as_deref(), Some("photon"));
        assert_eq!(data.claims.role, "authenticated");
    }
}
