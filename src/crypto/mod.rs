//! Cryptographic primitives for the envelope.
//!
//! Provides password key derivation, primary key wrapping, and the
//! counter-mode payload transform.

pub mod kdf;
pub mod stream;
pub mod wrap;

pub use kdf::derive_keys;
pub use stream::{apply_keystream, secure_random};
pub use wrap::{unwrap_primary_key, wrap_primary_key};

/// Length of the PBKDF2 salt (8 bytes).
pub const SALT_LEN: usize = 8;
/// Length of the CBC initialization vector (16 bytes / one AES block).
pub const IV_LEN: usize = 16;
/// Length of the primary key and of the wrapping key (16 bytes / AES-128).
pub const KEY_LEN: usize = 16;
/// Length of the password verifier (16 bytes).
pub const VERIFIER_LEN: usize = 16;
/// PBKDF2 rounds. Fixed so that key files stay readable across versions.
pub const PBKDF2_ITERATIONS: u32 = 1500;
