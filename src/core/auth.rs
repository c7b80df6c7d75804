//! Caller identity resolution
//!
//! The identity provider issues RS256 JWTs; we only verify them against the
//! issuer's published key set and read the subject.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use jsonwebtoken::jwk::{Jwk, JwkSet};
use jsonwebtoken::{decode, decode_header, Algorithm, DecodingKey, Validation};
use serde::Deserialize;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::core::clock::{elapsed_ms, Clock};
use crate::core::errors::{Result, TranslationError};
use crate::core::models::AuthUser;

/// How long a fetched key set is trusted before refetching
const JWKS_TTL: Duration = Duration::from_secs(60 * 60);

/// Minimum gap between fetches triggered by an unknown `kid`
const JWKS_MIN_REFETCH: Duration = Duration::from_secs(5 * 60);

/// Resolves a bearer token to a caller
#[async_trait]
pub trait IdentityResolver: Send + Sync {
    /// Caller behind `bearer`, or `None` if missing or invalid
    async fn get_user(&self, bearer: Option<&str>) -> Option<AuthUser>;
}

/// Caller behind `bearer`, or `Unauthenticated`
pub async fn require_user(
    resolver: &dyn IdentityResolver,
    bearer: Option<&str>,
) -> Result<AuthUser> {
    resolver
        .get_user(bearer)
        .await
        .ok_or(TranslationError::Unauthenticated)
}

/// Issuer URL for a bare domain or a full URL
pub fn issuer_url(domain: &str) -> String {
    let domain = domain.trim().trim_end_matches('/');
    if domain.starts_with("https://") || domain.starts_with("http://") {
        domain.to_string()
    } else {
        format!("https://{}", domain)
    }
}

#[derive(Debug, Deserialize)]
struct Claims {
    sub: String,
    email: Option<String>,
    name: Option<String>,
}

/// Verifies issuer-signed JWTs using the issuer's JWKS
pub struct JwtIdentityResolver {
    client: reqwest::Client,
    issuer: String,
    audience: Option<String>,
    clock: Arc<dyn Clock>,
    keys: RwLock<KeyCache>,
}

#[derive(Default)]
struct KeyCache {
    jwks: Option<JwkSet>,
    /// Last fetch attempt, successful or not
    fetched_at: Option<DateTime<Utc>>,
}

impl KeyCache {
    fn age_ms(&self, now: DateTime<Utc>) -> Option<u64> {
        self.fetched_at.map(|at| elapsed_ms(at, now))
    }
}

impl JwtIdentityResolver {
    /// Create a resolver for `issuer_domain`
    pub fn new(
        issuer_domain: &str,
        audience: Option<String>,
        timeout: Duration,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| TranslationError::Internal(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            issuer: issuer_url(issuer_domain),
            audience,
            clock,
            keys: RwLock::new(KeyCache::default()),
        })
    }

    /// Expected `iss` claim
    pub fn issuer(&self) -> &str {
        &self.issuer
    }

    async fn fetch_jwks(&self) -> Result<JwkSet> {
        let url = format!("{}/.well-known/jwks.json", self.issuer);
        debug!("Fetching JWKS from {}", url);
        let response = self.client.get(&url).send().await?;
        if !response.status().is_success() {
            return Err(TranslationError::unavailable(format!(
                "JWKS endpoint responded with {}",
                response.status()
            )));
        }
        Ok(response.json().await?)
    }

    /// Key for `kid` from the cached set
    ///
    /// The set is refetched when stale, or when `kid` is unknown and the last
    /// attempt is older than `JWKS_MIN_REFETCH`. Unknown ids inside that gap
    /// are rejected without touching the network.
    async fn key_for(&self, kid: &str) -> Result<Option<DecodingKey>> {
        let ttl_ms = JWKS_TTL.as_millis() as u64;
        let min_refetch_ms = JWKS_MIN_REFETCH.as_millis() as u64;

        let cached = {
            let keys = self.keys.read().await;
            let fresh = keys.age_ms(self.clock.now()).is_some_and(|age| age < ttl_ms);
            fresh
                .then(|| keys.jwks.as_ref().and_then(|set| set.find(kid).cloned()))
                .flatten()
        };

        let jwk = match cached {
            Some(jwk) => jwk,
            None => {
                {
                    // claimed under the write lock so concurrent misses fetch once
                    let mut keys = self.keys.write().await;
                    let now = self.clock.now();
                    match keys.age_ms(now) {
                        Some(age) if age < min_refetch_ms => {
                            debug!("Unknown key {} within refetch interval", kid);
                            return Ok(None);
                        }
                        _ => keys.fetched_at = Some(now),
                    }
                }

                let jwks = self.fetch_jwks().await?;
                let found = jwks.find(kid).cloned();
                self.keys.write().await.jwks = Some(jwks);
                match found {
                    Some(jwk) => jwk,
                    None => return Ok(None),
                }
            }
        };

        decoding_key(kid, &jwk).map(Some)
    }

    async fn verify(&self, token: &str) -> Result<Option<AuthUser>> {
        let header = match decode_header(token) {
            Ok(header) => header,
            Err(e) => {
                debug!("Rejecting malformed token: {}", e);
                return Ok(None);
            }
        };
        let Some(kid) = header.kid else {
            debug!("Rejecting token without kid");
            return Ok(None);
        };
        let Some(key) = self.key_for(&kid).await? else {
            debug!("Rejecting token signed with unknown key {}", kid);
            return Ok(None);
        };

        let mut validation = Validation::new(Algorithm::RS256);
        validation.set_issuer(&[self.issuer.as_str()]);
        match &self.audience {
            Some(audience) => validation.set_audience(&[audience.as_str()]),
            None => validation.validate_aud = false,
        }

        match decode::<Claims>(token, &key, &validation) {
            Ok(data) => Ok(Some(AuthUser {
                id: format!("{}|{}", self.issuer, data.claims.sub),
                email: data.claims.email,
                name: data.claims.name,
            })),
            Err(e) => {
                debug!("Rejecting token: {}", e);
                Ok(None)
            }
        }
    }
}

fn decoding_key(kid: &str, jwk: &Jwk) -> Result<DecodingKey> {
    DecodingKey::from_jwk(jwk)
        .map_err(|e| TranslationError::Internal(format!("unusable JWK {kid}: {e}")))
}

#[async_trait]
impl IdentityResolver for JwtIdentityResolver {
    async fn get_user(&self, bearer: Option<&str>) -> Option<AuthUser> {
        let token = bearer.map(str::trim).filter(|t| !t.is_empty())?;
        match self.verify(token).await {
            Ok(user) => user,
            Err(e) => {
                warn!("Identity verification failed: {}", e);
                None
            }
        }
    }
}
