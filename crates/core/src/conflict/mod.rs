//! Conflict-marker handling.
//!
//! [`MergeConflictExtractor`] turns text that still carries `<<<<<<<` /
//! `=======` / `>>>>>>>` markers into the clean texts it could resolve to.
//! It is pure and never fails, so validation and import flows can call it
//! on any input.

pub mod extractor;

pub use extractor::MergeConflictExtractor;
