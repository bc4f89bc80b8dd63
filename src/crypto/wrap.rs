//! Wrapping of the primary key under the password-derived key.
//!
//! The primary key is exactly one AES block, so the CBC wrap is a single
//! block operation with no padding.

use aes::Aes128;
use cbc::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use zeroize::Zeroizing;

use super::{IV_LEN, KEY_LEN};

type Aes128CbcEnc = cbc::Encryptor<Aes128>;
type Aes128CbcDec = cbc::Decryptor<Aes128>;

/// Encrypt the primary key with AES-128-CBC under `(wrapping_key, iv)`.
pub fn wrap_primary_key(
    primary_key: &[u8; KEY_LEN],
    wrapping_key: &[u8; KEY_LEN],
    iv: &[u8; IV_LEN],
) -> [u8; KEY_LEN] {
    let mut block = aes::Block::from(*primary_key);
    Aes128CbcEnc::new(wrapping_key.into(), iv.into()).encrypt_block_mut(&mut block);

    let mut wrapped = [0u8; KEY_LEN];
    wrapped.copy_from_slice(&block);
    wrapped
}

/// Recover the primary key. The caller must have verified the password
/// first; with a wrong key this returns garbage, not an error.
pub fn unwrap_primary_key(
    encrypted_primary_key: &[u8; KEY_LEN],
    wrapping_key: &[u8; KEY_LEN],
    iv: &[u8; IV_LEN],
) -> Zeroizing<[u8; KEY_LEN]> {
    let mut block = aes::Block::from(*encrypted_primary_key);
    Aes128CbcDec::new(wrapping_key.into(), iv.into()).decrypt_block_mut(&mut block);

    let mut primary_key = Zeroizing::new([0u8; KEY_LEN]);
    primary_key.copy_from_slice(&block);
    block.as_mut_slice().fill(0);
    primary_key
}
