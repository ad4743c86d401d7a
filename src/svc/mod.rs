//! # Services module
//!
//! This module provide services to interact with kubernetes, serve probes and
//! metrics, and the helpers to do so.
pub mod cfg;
pub mod crd;
pub mod http;
pub mod k8s;
pub mod telemetry;
