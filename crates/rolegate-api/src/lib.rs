//! rolegate-api: HTTP surface
//!
//! This crate provides the outer layer including:
//! - JSON endpoints over the permission gate and role operations
//! - Error classification (denials render as a generic "unauthorized")
//! - Structured logging and Prometheus metrics
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │                rolegate-api                  │
//! ├─────────────────────────────────────────────┤
//! │  http/          - Axum routes and state     │
//! │  errors.rs      - Error classification      │
//! │  observability/ - Logging and metrics       │
//! └─────────────────────────────────────────────┘
//! ```

pub mod errors;
pub mod http;
pub mod observability;
