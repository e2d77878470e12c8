//! Protection against clients that flood the server with frames.
//!
//! Oversized frames are rejected by the message router; this module bounds
//! how many frames per second each connection may send.

pub mod rate_limiter;

pub use rate_limiter::RateLimiter;
