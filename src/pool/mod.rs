//! The fixed identifier universe, expanded once at startup.

mod pattern;

pub use pattern::expand_patterns;
