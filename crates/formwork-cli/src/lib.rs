// formwork-cli/src/lib.rs
// ============================================================================
// Module: Formwork CLI Library
// Description: Shared helpers for the `formwork` binary.
// Purpose: Expose the message catalog to the binary and integration tests.
// Dependencies: Standard library
// ============================================================================

//! ## Overview
//! The `formwork` binary routes every user-facing string through the
//! [`i18n`] catalog and the [`t!`] macro.

pub mod i18n;

#[cfg(test)]
#[path = "tests/i18n.rs"]
mod i18n_tests;
