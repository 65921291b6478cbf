//! Distributed execution lock.
//!
//! [`LockProvider`] hands out at most one [`LockHandle`] per name across every
//! replica sharing a [`pkg_state::LockStore`]. [`ExecutionGuard`] wraps a unit
//! of periodic work with acquire, run once, hold for `min_lease`, release.

pub mod guard;
pub mod handle;
pub mod provider;
pub mod registry;

pub use guard::{ExecutionGuard, GuardState, Outcome, RunResult, SkipReason};
pub use handle::LockHandle;
pub use provider::{Acquire, LockProvider};
pub use registry::TaskRegistry;
