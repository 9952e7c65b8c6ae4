//! HTTP middleware stack for the gift-card service.
//!
//! # Middleware Order (bottom to top in Router)
//!
//! 1. Sentry layer (capture errors)
//! 2. `TraceLayer` (request tracing)
//! 3. Request ID (add unique ID to each request)
//! 4. Rate limiting (governor, public redemption routes only)

pub mod rate_limit;
pub mod request_id;

pub use rate_limit::{redemption_rate_limiter, staff_rate_limiter};
pub use request_id::request_id_middleware;
