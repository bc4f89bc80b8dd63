use aes::Aes128;
use ctr::cipher::{KeyIvInit, StreamCipher};
use getrandom::fill;

use super::KEY_LEN;
use crate::error::CryptoError;

type Aes128Ctr = ctr::Ctr128BE<Aes128>;

/// Initial counter block: a 128-bit big-endian counter starting at 1.
///
/// There is no per-message nonce. Every payload starts from this block, so
/// encrypt and decrypt stay in lockstep and existing ciphertexts remain
/// readable.
pub const INITIAL_COUNTER: [u8; 16] = [0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 1];

/// Fill buffer with cryptographically secure random bytes
pub fn secure_random(buf: &mut [u8]) -> Result<(), CryptoError> {
    fill(buf).map_err(|e| CryptoError::RandomSource(e.to_string()))
}

/// XOR `data` in place with the AES-128-CTR keystream of `primary_key`.
///
/// Encryption and decryption are the same operation.
pub fn apply_keystream(primary_key: &[u8; KEY_LEN], data: &mut [u8]) {
    let mut cipher = Aes128Ctr::new(primary_key.into(), (&INITIAL_COUNTER).into());
    cipher.apply_keystream(data);
}
