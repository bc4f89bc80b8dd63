use pbkdf2::pbkdf2_hmac;
use sha2::Sha256;
use zeroize::Zeroize;

use super::{KEY_LEN, PBKDF2_ITERATIONS, SALT_LEN, VERIFIER_LEN};

/// Total PBKDF2 output, split into the wrapping key and the verifier.
const DERIVED_LEN: usize = KEY_LEN + VERIFIER_LEN;

/// The two halves of one PBKDF2 derivation.
///
/// The wrapping key only ever encrypts or decrypts the primary key and is
/// never stored. The verifier is stored in the clear and only used to check
/// that a password reproduces the same derivation.
pub struct DerivedKeys {
    wrapping_key: [u8; KEY_LEN],
    verifier_key: [u8; VERIFIER_LEN],
}

impl Drop for DerivedKeys {
    fn drop(&mut self) {
        self.wrapping_key.zeroize();
        self.verifier_key.zeroize();
    }
}

impl DerivedKeys {
    pub fn wrapping_key(&self) -> &[u8; KEY_LEN] {
        &self.wrapping_key
    }

    pub fn verifier_key(&self) -> &[u8; VERIFIER_LEN] {
        &self.verifier_key
    }
}

/// Derive the wrapping key and verifier from a password.
///
/// PBKDF2-HMAC-SHA256 with a fixed round count; the first 16 output bytes
/// are the wrapping key, the last 16 the verifier. Any password works,
/// including an empty one.
pub fn derive_keys(password: &[u8], salt: &[u8; SALT_LEN]) -> DerivedKeys {
    let mut output = [0u8; DERIVED_LEN];
    pbkdf2_hmac::<Sha256>(password, salt, PBKDF2_ITERATIONS, &mut output);

    let mut keys = DerivedKeys {
        wrapping_key: [0u8; KEY_LEN],
        verifier_key: [0u8; VERIFIER_LEN],
    };
    keys.wrapping_key.copy_from_slice(&output[..KEY_LEN]);
    keys.verifier_key.copy_from_slice(&output[KEY_LEN..]);
    output.zeroize();

    keys
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kdf_is_deterministic() {
        let salt = [42u8; SALT_LEN];

        let k1 = derive_keys(b"password", &salt);
        let k2 = derive_keys(b"password", &salt);

        assert_eq!(k1.wrapping_key(), k2.wrapping_key());
        assert_eq!(k1.verifier_key(), k2.verifier_key());
    }

    #[test]
    fn kdf_matches_reference_vector() {
        let keys = derive_keys(b"password", b"saltsalt");

        assert_eq!(
            hex::encode(keys.wrapping_key()),
            "c099d3c6f879164753e1cdc1ce7a4612"
        );
        assert_eq!(
            hex::encode(keys.verifier_key()),
            "bea15305ac67342602026e9721f314a8"
        );
    }

    #[test]
    fn kdf_accepts_empty_password() {
        let keys = derive_keys(b"", &[0u8; SALT_LEN]);

        assert_eq!(
            hex::encode(keys.wrapping_key()),
            "f122ed249351b51c13b7baa4973ad305"
        );
        assert_eq!(
            hex::encode(keys.verifier_key()),
            "8b2b90692aab5eb6501082141dd84f90"
        );
    }

    #[test]
    fn salt_affects_output() {
        let k1 = derive_keys(b"pw", &[1u8; SALT_LEN]);
        let k2 = derive_keys(b"pw", &[2u8; SALT_LEN]);

        assert_ne!(k1.wrapping_key(), k2.wrapping_key());
        assert_ne!(k1.verifier_key(), k2.verifier_key());
    }

    #[test]
    fn halves_are_independent() {
        let keys = derive_keys(b"pw", &[7u8; SALT_LEN]);
        assert_ne!(keys.wrapping_key(), keys.verifier_key());
    }
}
