//! Secret handling utilities.
//!
//! Re-exports secrecy types so callers do not import secrecy directly.

pub use secrecy::{ExposeSecret, SecretString};
