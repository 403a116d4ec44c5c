//! Test-only crate; the scenarios live in `tests/`.
