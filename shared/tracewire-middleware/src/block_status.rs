//! Blocked-account gate
//!
//! Decodes the bearer JWT of each request and rejects the request with `403` when the
//! subject is blocked. Requests without a usable token pass through untouched; a failing
//! store is logged and the request proceeds.

use std::sync::Arc;

use async_trait::async_trait;
use axum::{
    extract::{Request, State},
    http::header,
    middleware::Next,
    response::{IntoResponse, Response},
};
use dashmap::DashMap;
use jsonwebtoken::{decode, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{MiddlewareError, Result};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub exp: i64,
    #[serde(default)]
    pub roles: Vec<String>,
}

/// Source of truth for blocked accounts.
#[async_trait]
pub trait BlockStatusStore: Send + Sync {
    async fn is_blocked(&self, user_id: &str) -> Result<bool>;
}

/// Process-local store, keyed by user id with the block reason as value.
#[derive(Debug, Clone, Default)]
pub struct InMemoryBlockStatusStore {
    blocked: Arc<DashMap<String, String>>,
}

impl InMemoryBlockStatusStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn block(&self, user_id: impl Into<String>, reason: impl Into<String>) {
        self.blocked.insert(user_id.into(), reason.into());
    }

    pub fn unblock(&self, user_id: &str) -> bool {
        self.blocked.remove(user_id).is_some()
    }

    pub fn reason(&self, user_id: &str) -> Option<String> {
        self.blocked.get(user_id).map(|entry| entry.value().clone())
    }
}

#[async_trait]
impl BlockStatusStore for InMemoryBlockStatusStore {
    async fn is_blocked(&self, user_id: &str) -> Result<bool> {
        Ok(self.blocked.contains_key(user_id))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateDecision {
    Allow,
    Blocked { user_id: String },
}

pub struct BlockStatusGate {
    decoding_key: DecodingKey,
    validation: Validation,
    store: Arc<dyn BlockStatusStore>,
}

impl BlockStatusGate {
    pub fn new(secret: &str, store: Arc<dyn BlockStatusStore>) -> Self {
        Self {
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            validation: Validation::default(),
            store,
        }
    }

    /// Secret from `JWT_SECRET`.
    pub fn from_env(store: Arc<dyn BlockStatusStore>) -> Result<Self> {
        let secret = std::env::var("JWT_SECRET")
            .map_err(|_| MiddlewareError::Config("JWT_SECRET is not set".to_string()))?;
        Ok(Self::new(&secret, store))
    }

    pub fn extract_token(auth_header: &str) -> Option<&str> {
        auth_header
            .strip_prefix("Bearer ")
            .map(str::trim)
            .filter(|t| !t.is_empty())
    }

    pub fn decode_subject(&self, token: &str) -> Result<String> {
        let data = decode::<Claims>(token, &self.decoding_key, &self.validation)
            .map_err(|e| MiddlewareError::InvalidToken(e.to_string()))?;
        Ok(data.claims.sub)
    }

    /// Decide on a request given its `Authorization` header value.
    pub async fn check(&self, authorization: Option<&str>) -> GateDecision {
        let Some(token) = authorization.and_then(Self::extract_token) else {
            return GateDecision::Allow;
        };

        let user_id = match self.decode_subject(token) {
            Ok(sub) => sub,
            Err(e) => {
                debug!(error = %e, "Skipping block check for undecodable token");
                return GateDecision::Allow;
            }
        };

        match self.store.is_blocked(&user_id).await {
            Ok(true) => GateDecision::Blocked { user_id },
            Ok(false) => GateDecision::Allow,
            Err(e) => {
                warn!(user_id = %user_id, error = %e, "Block status lookup failed, allowing request");
                GateDecision::Allow
            }
        }
    }
}

/// Use with `axum::middleware::from_fn_with_state(Arc<BlockStatusGate>, block_status_middleware)`.
pub async fn block_status_middleware(
    State(gate): State<Arc<BlockStatusGate>>,
    request: Request,
    next: Next,
) -> Response {
    let authorization = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    match gate.check(authorization.as_deref()).await {
        GateDecision::Allow => next.run(request).await,
        GateDecision::Blocked { user_id } => {
            warn!(user_id = %user_id, path = %request.uri().path(), "Rejected request from blocked account");
            MiddlewareError::Blocked.into_response()
        }
    }
}
