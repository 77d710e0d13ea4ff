//! # Fleetgauge Load Balancer
//!
//! Rewrites a telemetry snapshot so that no device carries more synthetic
//! load than the configured thresholds allow.
//!
//! ## Algorithm
//!
//! 1. Score every device as the weighted sum of its metrics normalised by
//!    their thresholds; a score above 1.0 marks the device overloaded
//! 2. Clamp overloaded devices to the thresholds, pooling the surplus per metric
//! 3. Spread each pool evenly over the underloaded devices, never past a threshold
//!
//! The transform is pure: the input snapshot is never modified and the host
//! record passes through untouched.

pub mod balancer;
pub mod config;
pub mod errors;
pub mod scoring;

pub use balancer::{BalanceOutcome, BalanceReport, LoadBalancer};
pub use config::{BalancePolicy, BalanceProfile, BalancerConfig, MetricThresholds, MetricWeights};
pub use errors::ConfigurationError;
pub use scoring::{classify, score, Classification};
