//! Consolidated test modules.
//!
//! End-to-end passes through the reconciler, against the in-memory provider
//! and against a mocked HTTP identity provider.
