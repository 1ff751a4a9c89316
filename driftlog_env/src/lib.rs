//! driftlog Environment Abstraction Layer
//!
//! Everything a generator needs from the outside world goes through
//! [`DriftContext`]:
//! - Time (`now()`, `system_time()`, `sleep()`)
//! - Tasks (`spawn()`)
//! - Randomness (`derive_rng()`)
//!
//! Deriving every RNG from one master seed makes a run reproducible; the
//! default context draws from OS entropy instead.
//!
//! # Example
//!
//! ```ignore
//! use driftlog_env::{DriftContext, TokioContext};
//!
//! let ctx = TokioContext::shared();
//! let handle = ctx.spawn("worker", async move {
//!     ctx.sleep(Duration::from_millis(5)).await;
//! });
//! handle.await?;
//! ```

mod context;
mod tokio_impl;

pub use context::DriftContext;
pub use tokio_impl::TokioContext;
