//! Overhead and volume safety for probes
//!
//! - `ProbeCircuitBreaker` disables a probe that spends too much time in
//!   instrumentation overhead
//! - `RateLimiter` samples probe firings and condition failure reports

mod circuit_breaker;
mod rate_limiter;

pub use circuit_breaker::{CircuitBreakerStats, ProbeCircuitBreaker};
pub use rate_limiter::RateLimiter;
