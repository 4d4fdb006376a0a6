//! # Middleware Stack
//!
//! - `TraceLayer` (tower-http): request/response spans, installed in [`crate::app`].
//! - [`metrics`]: Prometheus request metrics.

pub mod metrics;
