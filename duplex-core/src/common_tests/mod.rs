//! Shared test suites, generic over the reclamation guard.
//!
//! Compiled with the `common-tests` feature so that every guard crate can run
//! the same suites from its own `tests/` directory.

pub mod linearizability;
pub mod sequential_list;
