//! Domain model for debitor master data.
//!
//! # Responsibility
//! - Define the record shape shared by repository, CLI and serialization.
//! - Keep input validation next to the data it guards.
//!
//! # Invariants
//! - Validation never touches storage.

pub mod debitor;
