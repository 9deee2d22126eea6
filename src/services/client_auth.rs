//! Client authentication: client_assertion, HTTP Basic, and form credentials.
//!
//! Resolves and authenticates the calling client across the three methods the token and
//! revocation endpoints accept, in priority order: JWT `client_assertion` (RFC 7523,
//! `private_key_jwt`), HTTP Basic, then client_id/client_secret in the form body. CONFIDENTIAL
//! clients must present a secret (or assertion); PUBLIC clients must not present one at all.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use jsonwebtoken::{Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::config::Config;
use crate::error::OAuthError;
use crate::models::OAuthClient;
use crate::repositories::OAuthRepository;
use crate::utils::secret::verify_secret;

/// The only `client_assertion_type` this server accepts (RFC 7523 §2.2).
pub const JWT_BEARER_ASSERTION_TYPE: &str =
    "urn:ietf:params:oauth:client-assertion-type:jwt-bearer";

const ASSERTION_JTI_PREFIX: &str = "client-assertion:";
const JWKS_CACHE_TTL: Duration = Duration::from_secs(300);
const ASSERTION_MAX_LIFETIME_SECS: i64 = 300;

/// Claims carried by a `client_assertion` JWT. `iss` and `sub` must both equal the client_id
/// being authenticated; `aud` must equal the token endpoint's own absolute URL.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct AssertionClaims {
    iss: String,
    sub: String,
    aud: String,
    exp: i64,
    #[serde(default)]
    iat: Option<i64>,
    jti: String,
}

/// Whatever the caller was able to pull off the request: form fields, an `Authorization:
/// Basic` header already split into `(client_id, secret)`, and/or a JWT assertion pair.
#[derive(Debug, Clone, Default)]
pub struct ClientCredentials {
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub client_assertion_type: Option<String>,
    pub client_assertion: Option<String>,
    pub basic_auth: Option<(String, String)>,
}

struct CachedJwks {
    keys_by_kid: HashMap<String, (DecodingKey, Algorithm)>,
    fetched_at: Instant,
}

/// Holds only configuration and the outbound JWKS-fetch cache; everything else
/// (client lookup, secret verification) goes through the repository passed to `authenticate`.
#[derive(Clone)]
pub struct ClientAuthenticator {
    #[allow(dead_code)]
    config: Arc<Config>,
    http: reqwest::Client,
    jwks_cache: Arc<RwLock<HashMap<String, CachedJwks>>>,
}

impl ClientAuthenticator {
    pub fn new(config: Arc<Config>) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(5))
            .build()
            .unwrap_or_default();
        Self {
            config,
            http,
            jwks_cache: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Resolves and authenticates the client, trying `client_assertion`, then HTTP Basic, then
    /// form credentials, in that priority order. `token_endpoint_url` is the absolute URL of
    /// the endpoint the caller hit, honouring `X-Forwarded-Proto`/`Host`.
    pub async fn authenticate(
        &self,
        creds: &ClientCredentials,
        token_endpoint_url: &str,
        repo: &dyn OAuthRepository,
    ) -> Result<OAuthClient, OAuthError> {
        if let (Some(assertion_type), Some(assertion)) =
            (&creds.client_assertion_type, &creds.client_assertion)
        {
            if assertion_type == JWT_BEARER_ASSERTION_TYPE {
                return self.authenticate_via_assertion(assertion, token_endpoint_url, repo).await;
            }
            return Err(OAuthError::InvalidClient(
                "unsupported client_assertion_type".to_string(),
            ));
        }

        if let Some((client_id, secret)) = &creds.basic_auth {
            return self.authenticate_with_secret(client_id, Some(secret), repo).await;
        }

        if let Some(client_id) = &creds.client_id {
            return self
                .authenticate_with_secret(client_id, creds.client_secret.as_deref(), repo)
                .await;
        }

        Err(OAuthError::InvalidClient("no client credentials presented".to_string()))
    }

    async fn authenticate_with_secret(
        &self,
        client_id: &str,
        secret: Option<&str>,
        repo: &dyn OAuthRepository,
    ) -> Result<OAuthClient, OAuthError> {
        let client = repo
            .find_active_client(client_id)
            .await?
            .ok_or_else(|| OAuthError::InvalidClient("unknown client".to_string()))?;

        if client.is_public() {
            if secret.is_some() {
                return Err(OAuthError::InvalidClient(
                    "public clients must not present a secret".to_string(),
                ));
            }
            return Ok(client);
        }

        let secret = secret
            .ok_or_else(|| OAuthError::InvalidClient("client secret is required".to_string()))?;
        let hash = client
            .secret_hash
            .as_deref()
            .ok_or_else(|| OAuthError::InvalidClient("client has no secret configured".to_string()))?;

        if client.secret_is_expired() {
            return Err(OAuthError::InvalidClient("client secret has expired".to_string()));
        }

        if !verify_secret(secret, hash)? {
            return Err(OAuthError::InvalidClient("invalid client secret".to_string()));
        }

        Ok(client)
    }

    async fn authenticate_via_assertion(
        &self,
        assertion: &str,
        token_endpoint_url: &str,
        repo: &dyn OAuthRepository,
    ) -> Result<OAuthClient, OAuthError> {
        let header = jsonwebtoken::decode_header(assertion)
            .map_err(|_| OAuthError::InvalidClient("malformed client_assertion".to_string()))?;

        if !matches!(header.alg, Algorithm::RS256 | Algorithm::ES256 | Algorithm::PS256) {
            return Err(OAuthError::InvalidClient(
                "unsupported client_assertion signing algorithm".to_string(),
            ));
        }

        let unverified_claims = Self::peek_claims(assertion)?;

        let client = repo
            .find_active_client(&unverified_claims.sub)
            .await?
            .ok_or_else(|| OAuthError::InvalidClient("unknown client".to_string()))?;

        if unverified_claims.iss != client.client_id || unverified_claims.sub != client.client_id {
            return Err(OAuthError::InvalidClient(
                "client_assertion iss/sub must equal client_id".to_string(),
            ));
        }

        let jwks_uri = client
            .jwks_uri
            .as_deref()
            .ok_or_else(|| OAuthError::InvalidClient("client has no jwks_uri configured".to_string()))?;

        let kid = header
            .kid
            .ok_or_else(|| OAuthError::InvalidClient("client_assertion is missing kid".to_string()))?;
        let (decoding_key, alg) = self.decoding_key_for(jwks_uri, &kid).await?;

        let mut validation = Validation::new(alg);
        validation.set_issuer(&[client.client_id.as_str()]);
        validation.set_audience(&[token_endpoint_url]);
        validation.leeway = 30;

        let data = jsonwebtoken::decode::<AssertionClaims>(assertion, &decoding_key, &validation)
            .map_err(|_| OAuthError::InvalidClient("client_assertion signature invalid".to_string()))?;
        let claims = data.claims;

        let now = chrono::Utc::now().timestamp();
        if claims.exp - now > ASSERTION_MAX_LIFETIME_SECS {
            return Err(OAuthError::InvalidClient(
                "client_assertion exp is too far in the future".to_string(),
            ));
        }

        let blacklist_key = format!("{ASSERTION_JTI_PREFIX}{}", claims.jti);
        if repo.is_jti_blacklisted(&blacklist_key).await? {
            return Err(OAuthError::InvalidClient("client_assertion has already been used".to_string()));
        }
        let expires_at = chrono::DateTime::from_timestamp(claims.exp, 0)
            .unwrap_or_else(chrono::Utc::now);
        repo.blacklist_jti(&blacklist_key, expires_at).await?;

        Ok(client)
    }

    /// Base64url-decode the JWT payload without verifying its signature, solely to learn
    /// which client (`sub`) to look up a verification key for.
    fn peek_claims(assertion: &str) -> Result<AssertionClaims, OAuthError> {
        let mut parts = assertion.split('.');
        let _header = parts.next();
        let payload = parts
            .next()
            .ok_or_else(|| OAuthError::InvalidClient("malformed client_assertion".to_string()))?;
        let decoded = URL_SAFE_NO_PAD
            .decode(payload)
            .map_err(|_| OAuthError::InvalidClient("malformed client_assertion".to_string()))?;
        serde_json::from_slice(&decoded)
            .map_err(|_| OAuthError::InvalidClient("malformed client_assertion claims".to_string()))
    }

    async fn decoding_key_for(
        &self,
        jwks_uri: &str,
        kid: &str,
    ) -> Result<(DecodingKey, Algorithm), OAuthError> {
        {
            let cache = self.jwks_cache.read().await;
            if let Some(entry) = cache.get(jwks_uri) {
                if entry.fetched_at.elapsed() < JWKS_CACHE_TTL {
                    if let Some((key, alg)) = entry.keys_by_kid.get(kid) {
                        return Ok((key.clone(), *alg));
                    }
                }
            }
        }

        let fetched = self.fetch_jwks(jwks_uri).await?;
        let result = fetched
            .get(kid)
            .cloned()
            .ok_or_else(|| OAuthError::InvalidClient(format!("no jwks key for kid '{kid}'")));

        let mut cache = self.jwks_cache.write().await;
        cache.insert(
            jwks_uri.to_string(),
            CachedJwks { keys_by_kid: fetched, fetched_at: Instant::now() },
        );

        result
    }

    async fn fetch_jwks(
        &self,
        jwks_uri: &str,
    ) -> Result<HashMap<String, (DecodingKey, Algorithm)>, OAuthError> {
        let response = self
            .http
            .get(jwks_uri)
            .send()
            .await
            .map_err(|e| OAuthError::InvalidClient(format!("jwks_uri fetch failed: {e}")))?;
        let document: RemoteJwksDocument = response
            .json()
            .await
            .map_err(|e| OAuthError::InvalidClient(format!("jwks_uri returned invalid JSON: {e}")))?;

        let mut keys = HashMap::new();
        for key in document.keys {
            let Some(kid) = key.kid.clone() else { continue };
            let parsed = match key.kty.as_str() {
                "RSA" => {
                    let (Some(n), Some(e)) = (&key.n, &key.e) else { continue };
                    let alg = match key.alg.as_deref() {
                        Some("PS256") => Algorithm::PS256,
                        _ => Algorithm::RS256,
                    };
                    DecodingKey::from_rsa_components(n, e).ok().map(|k| (k, alg))
                }
                "EC" => {
                    let (Some(x), Some(y)) = (&key.x, &key.y) else { continue };
                    DecodingKey::from_ec_components(x, y).ok().map(|k| (k, Algorithm::ES256))
                }
                _ => None,
            };
            if let Some(decoding_key) = parsed {
                keys.insert(kid, decoding_key);
            }
        }

        Ok(keys)
    }
}

#[derive(Debug, Deserialize)]
struct RemoteJwksDocument {
    keys: Vec<RemoteJwk>,
}

#[derive(Debug, Deserialize)]
struct RemoteJwk {
    kty: String,
    kid: Option<String>,
    alg: Option<String>,
    n: Option<String>,
    e: Option<String>,
    x: Option<String>,
    y: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn assertion_type_constant_matches_rfc_7523() {
        assert_eq!(
            JWT_BEARER_ASSERTION_TYPE,
            "urn:ietf:params:oauth:client-assertion-type:jwt-bearer"
        );
    }

    #[test]
    fn peek_claims_rejects_malformed_assertion() {
        assert!(ClientAuthenticator::peek_claims("not-a-jwt").is_err());
    }
}
