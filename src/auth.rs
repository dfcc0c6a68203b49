//! Bearer token validation: RS256 against the Auth0 key set, or HS256 with a
//! shared secret for local development.

use std::{collections::HashMap, sync::Arc};

use axum::{
    async_trait,
    extract::{FromRef, FromRequestParts},
    http::{header::AUTHORIZATION, request::Parts},
};
use color_eyre::eyre::{Result as EyreResult, WrapErr};
use jsonwebtoken::{
    decode, decode_header,
    jwk::{Jwk, JwkSet},
    Algorithm, DecodingKey, Validation,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use crate::{
    clients::get_reqwest_client,
    config::AuthConfig,
    error::{Error, Result},
    net::response::ResponseError,
};

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    pub sub: String,
    pub exp: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

#[derive(Default)]
pub struct Authenticator {
    /// RS256 keys by key id
    keys: HashMap<String, DecodingKey>,
    issuer: Option<String>,
    audience: Option<String>,
    secret: Option<DecodingKey>,
}

impl Authenticator {
    pub fn hs256(secret: &str) -> Self {
        Authenticator {
            secret: Some(DecodingKey::from_secret(secret.as_bytes())),
            ..Default::default()
        }
    }

    pub fn with_jwks(mut self, jwks: &JwkSet, domain: &str, audience: Option<String>) -> Self {
        self.keys = jwks
            .keys
            .iter()
            .filter_map(|jwk: &Jwk| {
                let kid = jwk.common.key_id.clone()?;
                match DecodingKey::from_jwk(jwk) {
                    Ok(key) => Some((kid, key)),
                    Err(e) => {
                        warn!("skipping unusable jwk {kid}: {e}");
                        None
                    }
                }
            })
            .collect();
        self.issuer = Some(format!("https://{domain}/"));
        self.audience = audience;
        self
    }

    /// Builds the authenticator, fetching the Auth0 key set when a domain is configured
    #[instrument(skip(config))]
    pub async fn from_config(config: &AuthConfig) -> EyreResult<Self> {
        let mut authenticator = match &config.hs256_secret {
            Some(secret) => Authenticator::hs256(secret),
            None => Authenticator::default(),
        };
        if let Some(domain) = &config.auth0_domain {
            let jwks = load_jwks(domain).await?;
            authenticator =
                authenticator.with_jwks(&jwks, domain, config.auth0_audience.clone());
            info!("loaded {} signing keys from {domain}", authenticator.keys.len());
        }
        if authenticator.keys.is_empty() && authenticator.secret.is_none() {
            warn!("no token verification configured, authenticated routes will reject every request");
        }
        Ok(authenticator)
    }

    pub fn verify(&self, token: &str) -> Result<Claims> {
        let header = decode_header(token).map_err(unauthorized)?;
        let (key, mut validation) = match header.alg {
            Algorithm::RS256 => {
                let kid = header
                    .kid
                    .ok_or_else(|| Error::Unauthorized("Token has no key id".to_string()))?;
                let key = self
                    .keys
                    .get(&kid)
                    .ok_or_else(|| Error::Unauthorized(format!("Unknown signing key {kid}")))?;
                let mut validation = Validation::new(Algorithm::RS256);
                if let Some(issuer) = &self.issuer {
                    validation.set_issuer(&[issuer]);
                }
                (key, validation)
            }
            Algorithm::HS256 => {
                let key = self.secret.as_ref().ok_or_else(|| {
                    Error::Unauthorized("Shared secret tokens are not accepted".to_string())
                })?;
                (key, Validation::new(Algorithm::HS256))
            }
            other => {
                return Err(Error::Unauthorized(format!(
                    "Unsupported token algorithm {other:?}"
                )))
            }
        };
        match &self.audience {
            Some(audience) => validation.set_audience(&[audience]),
            None => validation.validate_aud = false,
        }
        let data = decode::<Claims>(token, key, &validation).map_err(unauthorized)?;
        debug!("authenticated {}", data.claims.sub);
        Ok(data.claims)
    }
}

fn unauthorized(e: jsonwebtoken::errors::Error) -> Error {
    Error::Unauthorized(format!("Invalid token: {e}"))
}

#[instrument]
pub async fn load_jwks(domain: &str) -> EyreResult<JwkSet> {
    let url = format!("https://{domain}/.well-known/jwks.json");
    let jwks = get_reqwest_client()?
        .get(&url)
        .send()
        .await
        .wrap_err_with(|| format!("Failed to fetch {url}"))?
        .error_for_status()?
        .json::<JwkSet>()
        .await?;
    Ok(jwks)
}

/// The caller identified by a valid bearer token
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthUser {
    pub sub: String,
    pub email: Option<String>,
}

#[async_trait]
impl<S> FromRequestParts<S> for AuthUser
where
    Arc<Authenticator>: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = ResponseError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let header = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| Error::Unauthorized("Missing Authorization header".to_string()))?;
        let token = header.strip_prefix("Bearer ").ok_or_else(|| {
            Error::Unauthorized("Expected Authorization: Bearer <token>".to_string())
        })?;
        let authenticator = Arc::<Authenticator>::from_ref(state);
        let claims = authenticator.verify(token)?;
        Ok(AuthUser {
            sub: claims.sub,
            email: claims.email,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use jsonwebtoken::{encode, EncodingKey, Header};

    fn token(secret: &str, sub: &str, exp_offset: i64) -> String {
        let claims = Claims {
            sub: sub.to_string(),
            exp: chrono::Utc::now().timestamp() + exp_offset,
            email: None,
        };
        encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(secret.as_bytes()),
        )
        .unwrap()
    }

    #[test]
    fn accepts_valid_shared_secret_token() {
        let auth = Authenticator::hs256("dev-secret");
        let claims = auth.verify(&token("dev-secret", "auth0|abc", 3600)).unwrap();
        assert_eq!(claims.sub, "auth0|abc");
    }

    #[test]
    fn rejects_wrong_secret() {
        let auth = Authenticator::hs256("dev-secret");
        assert_matches!(
            auth.verify(&token("other-secret", "auth0|abc", 3600)),
            Err(Error::Unauthorized(_))
        );
    }

    #[test]
    fn rejects_expired_token() {
        let auth = Authenticator::hs256("dev-secret");
        assert_matches!(
            auth.verify(&token("dev-secret", "auth0|abc", -600)),
            Err(Error::Unauthorized(_))
        );
    }

    #[test]
    fn shared_secret_tokens_need_a_configured_secret() {
        let auth = Authenticator::default();
        assert_matches!(
            auth.verify(&token("dev-secret", "auth0|abc", 3600)),
            Err(Error::Unauthorized(_))
        );
    }

    #[test]
    fn garbage_is_unauthorized() {
        let auth = Authenticator::hs256("dev-secret");
        assert_matches!(auth.verify("not.a.jwt"), Err(Error::Unauthorized(_)));
    }
}
