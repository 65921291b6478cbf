//! Lock store adapters.
//!
//! A [`LockStore`] is the shared medium every replica talks to. It offers two
//! atomic primitives, set-if-absent-with-expiry and compare-and-delete, and
//! nothing in the rest of the workspace mutates lock records any other way.

pub mod client;
pub mod memory;
pub mod slate;
pub mod store;

pub use memory::MemoryLockStore;
pub use slate::SlateLockStore;
pub use store::LockStore;
