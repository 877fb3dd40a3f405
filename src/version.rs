// src/version.rs

//! Version ordering
//!
//! Versions compare lexicographically, both for equality against an
//! installed version and for picking the greatest version in the catalog.

/// True when `candidate` orders after `current`
pub fn is_newer(candidate: &str, current: &str) -> bool {
    candidate > current
}
