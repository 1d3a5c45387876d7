//! API middleware stack.
//!
//! Execution order on protected routes (outermost → innermost):
//! 1. Auth validator: bearer token to session
//! 2. Rate limiter: keyed on the resolved user
//! 3. Audit logger: logs after auth, has user_id
//!
//! Public routes only run the rate limiter, keyed on the peer address.

pub mod audit;
pub mod auth;
pub mod rate;
