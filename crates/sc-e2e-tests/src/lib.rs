//! Test-only crate. The end-to-end scenarios live in `tests/`.
