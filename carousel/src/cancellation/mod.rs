//! Cooperative cancellation with a forced fallback.
//!
//! This module provides:
//! - [`CancellationToken`], polled by the execution context and awaited by the gate
//! - [`CancellationController`], which signals the token and aborts the task
//!   if it has not returned within the grace period

mod controller;
mod token;

pub use controller::{CancelOutcome, CancellationController, DEFAULT_GRACE_PERIOD};
pub use token::{CancelCallback, CancellationToken};
