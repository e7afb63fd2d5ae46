//! CORS middleware

use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::{header, HeaderMap, HeaderValue, Method, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};

use crate::error::{MiddlewareError, Result};

const DEFAULT_METHODS: [&str; 6] = ["GET", "POST", "PUT", "PATCH", "DELETE", "OPTIONS"];
const DEFAULT_HEADERS: [&str; 3] = ["Content-Type", "Authorization", "X-Requested-With"];
const DEFAULT_MAX_AGE_SECS: u64 = 86_400;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AllowedOrigins {
    Any,
    List(Vec<String>),
}

#[derive(Debug, Clone)]
pub struct CorsConfig {
    pub allowed_origins: AllowedOrigins,
    pub allow_credentials: bool,
    pub allowed_methods: Vec<String>,
    pub allowed_headers: Vec<String>,
    pub max_age_secs: u64,
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            allowed_origins: AllowedOrigins::Any,
            allow_credentials: false,
            allowed_methods: DEFAULT_METHODS.iter().map(|s| s.to_string()).collect(),
            allowed_headers: DEFAULT_HEADERS.iter().map(|s| s.to_string()).collect(),
            max_age_secs: DEFAULT_MAX_AGE_SECS,
        }
    }
}

impl CorsConfig {
    /// Reads `CORS_ALLOWED_ORIGINS` (`*` or a comma-separated list) and
    /// `CORS_ALLOW_CREDENTIALS`.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(origins) = lookup("CORS_ALLOWED_ORIGINS") {
            config.allowed_origins = parse_origins(&origins);
        }
        if let Some(raw) = lookup("CORS_ALLOW_CREDENTIALS") {
            config.allow_credentials = raw.trim().parse().map_err(|_| {
                MiddlewareError::Config(format!("CORS_ALLOW_CREDENTIALS must be true or false, got {:?}", raw))
            })?;
        }

        Ok(config)
    }

    pub fn with_origins<I, S>(mut self, origins: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.allowed_origins = AllowedOrigins::List(origins.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_credentials(mut self, allow: bool) -> Self {
        self.allow_credentials = allow;
        self
    }

    /// Value for `Access-Control-Allow-Origin`, if the request origin is allowed.
    pub fn allow_origin(&self, origin: Option<&str>) -> Option<String> {
        match (&self.allowed_origins, origin) {
            // Browsers reject `*` on credentialed requests, so echo instead.
            (AllowedOrigins::Any, Some(origin)) if self.allow_credentials => Some(origin.to_string()),
            (AllowedOrigins::Any, _) => Some("*".to_string()),
            (AllowedOrigins::List(list), Some(origin)) if list.iter().any(|o| o == origin) => {
                Some(origin.to_string())
            }
            _ => None,
        }
    }

    fn apply(&self, headers: &mut HeaderMap, allowed: Option<&str>, preflight: bool) {
        let Some(allowed) = allowed else { return };
        let Ok(value) = HeaderValue::from_str(allowed) else { return };

        headers.insert(header::ACCESS_CONTROL_ALLOW_ORIGIN, value);
        if allowed != "*" {
            headers.append(header::VARY, HeaderValue::from_static("Origin"));
        }
        if self.allow_credentials {
            headers.insert(
                header::ACCESS_CONTROL_ALLOW_CREDENTIALS,
                HeaderValue::from_static("true"),
            );
        }
        if preflight {
            if let Ok(methods) = HeaderValue::from_str(&self.allowed_methods.join(", ")) {
                headers.insert(header::ACCESS_CONTROL_ALLOW_METHODS, methods);
            }
            if let Ok(allowed_headers) = HeaderValue::from_str(&self.allowed_headers.join(", ")) {
                headers.insert(header::ACCESS_CONTROL_ALLOW_HEADERS, allowed_headers);
            }
            headers.insert(header::ACCESS_CONTROL_MAX_AGE, HeaderValue::from(self.max_age_secs));
        }
    }
}

fn parse_origins(raw: &str) -> AllowedOrigins {
    let origins: Vec<String> = raw
        .split(',')
        .map(str::trim)
        .filter(|o| !o.is_empty())
        .map(str::to_string)
        .collect();

    if origins.is_empty() || origins.iter().any(|o| o == "*") {
        AllowedOrigins::Any
    } else {
        AllowedOrigins::List(origins)
    }
}

/// Use with `axum::middleware::from_fn_with_state(Arc<CorsConfig>, cors_middleware)`.
pub async fn cors_middleware(
    State(config): State<Arc<CorsConfig>>,
    request: Request,
    next: Next,
) -> Response {
    let origin = request
        .headers()
        .get(header::ORIGIN)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    let allowed = config.allow_origin(origin.as_deref());

    if request.method() == Method::OPTIONS {
        let mut response = StatusCode::NO_CONTENT.into_response();
        config.apply(response.headers_mut(), allowed.as_deref(), true);
        return response;
    }

    let mut response = next.run(request).await;
    config.apply(response.headers_mut(), allowed.as_deref(), false);
    response
}
