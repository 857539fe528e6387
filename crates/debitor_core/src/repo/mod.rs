//! Repository layer abstractions and guarded implementations.
//!
//! # Responsibility
//! - Define use-case oriented data access contracts.
//! - Keep SQL text and row mapping out of callers.
//!
//! # Invariants
//! - Repository writes must pass `Debitor::validate()` before reaching the guard.

pub mod debitor_repo;
