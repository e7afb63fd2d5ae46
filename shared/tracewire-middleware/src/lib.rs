//! Tracewire Middleware
//!
//! axum middleware shared by traced services:
//! - CORS with allow-list or wildcard origins and preflight handling
//! - a JWT-based gate rejecting requests from blocked accounts
//!
//! ```ignore
//! let app = Router::new()
//!     .route("/api/orders", post(create_order))
//!     .layer(from_fn_with_state(Arc::new(gate), block_status_middleware))
//!     .layer(from_fn_with_state(Arc::new(CorsConfig::from_env()?), cors_middleware));
//! ```

pub mod block_status;
pub mod cors;
pub mod error;

pub use block_status::{
    block_status_middleware, BlockStatusGate, BlockStatusStore, Claims, GateDecision,
    InMemoryBlockStatusStore,
};
pub use cors::{cors_middleware, AllowedOrigins, CorsConfig};
pub use error::{MiddlewareError, Result};
