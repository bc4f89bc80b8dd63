//! The persisted envelope and the operations on it.
//!
//! A [`StorableCryptoSystem`] holds a random primary key wrapped under a
//! password-derived key, plus the salt, IV and verifier needed to unwrap it
//! again. Every operation re-derives from the password; nothing is cached.

use serde::{Deserialize, Serialize};
use subtle::ConstantTimeEq;
use zeroize::Zeroizing;

use crate::crypto::{
    self, IV_LEN, KEY_LEN, SALT_LEN, VERIFIER_LEN, apply_keystream, derive_keys,
    unwrap_primary_key, wrap_primary_key,
};
use crate::error::{CryptoError, MalformedInput};

const FIELD_ENCRYPTED_PRIMARY_KEY: &str = "encryptedPrimaryKey";
const FIELD_IV: &str = "IV";
const FIELD_SALT: &str = "salt";
const FIELD_VERIFIER_KEY: &str = "verifierKey";
const FIELD_CIPHERTEXT: &str = "ciphertext";

/// A crypto system with every field hex-encoded, as stored in the key file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StorableCryptoSystem {
    #[serde(rename = "encryptedPrimaryKey")]
    encrypted_primary_key: String,
    #[serde(rename = "IV")]
    iv: String,
    salt: String,
    #[serde(rename = "verifierKey")]
    verifier_key: String,
}

impl StorableCryptoSystem {
    /// Builds a storable system from already hex-encoded fields.
    ///
    /// No validation happens here; malformed fields are reported by the
    /// operation that first needs them.
    pub fn new(
        encrypted_primary_key: impl Into<String>,
        iv: impl Into<String>,
        salt: impl Into<String>,
        verifier_key: impl Into<String>,
    ) -> Self {
        Self {
            encrypted_primary_key: encrypted_primary_key.into(),
            iv: iv.into(),
            salt: salt.into(),
            verifier_key: verifier_key.into(),
        }
    }

    pub fn encrypted_primary_key(&self) -> &str {
        &self.encrypted_primary_key
    }

    pub fn iv(&self) -> &str {
        &self.iv
    }

    pub fn salt(&self) -> &str {
        &self.salt
    }

    pub fn verifier_key(&self) -> &str {
        &self.verifier_key
    }

    /// Decodes and length-checks all four fields.
    pub fn decode(&self) -> Result<CryptoSystem, CryptoError> {
        CryptoSystem::try_from(self)
    }
}

/// The binary form of a crypto system.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CryptoSystem {
    encrypted_primary_key: [u8; KEY_LEN],
    iv: [u8; IV_LEN],
    salt: [u8; SALT_LEN],
    verifier_key: [u8; VERIFIER_LEN],
}

impl CryptoSystem {
    pub fn encrypted_primary_key(&self) -> &[u8; KEY_LEN] {
        &self.encrypted_primary_key
    }

    pub fn iv(&self) -> &[u8; IV_LEN] {
        &self.iv
    }

    pub fn salt(&self) -> &[u8; SALT_LEN] {
        &self.salt
    }

    pub fn verifier_key(&self) -> &[u8; VERIFIER_LEN] {
        &self.verifier_key
    }

    pub fn to_storable(&self) -> StorableCryptoSystem {
        StorableCryptoSystem {
            encrypted_primary_key: hex::encode(self.encrypted_primary_key),
            iv: hex::encode(self.iv),
            salt: hex::encode(self.salt),
            verifier_key: hex::encode(self.verifier_key),
        }
    }
}

impl TryFrom<&StorableCryptoSystem> for CryptoSystem {
    type Error = CryptoError;

    fn try_from(stored: &StorableCryptoSystem) -> Result<Self, Self::Error> {
        Ok(Self {
            encrypted_primary_key: decode_field(
                FIELD_ENCRYPTED_PRIMARY_KEY,
                &stored.encrypted_primary_key,
            )?,
            iv: decode_field(FIELD_IV, &stored.iv)?,
            salt: decode_field(FIELD_SALT, &stored.salt)?,
            verifier_key: decode_field(FIELD_VERIFIER_KEY, &stored.verifier_key)?,
        })
    }
}

fn decode_hex(field: &'static str, value: &str) -> Result<Vec<u8>, MalformedInput> {
    hex::decode(value).map_err(|source| MalformedInput::InvalidHex { field, source })
}

fn decode_field<const N: usize>(
    field: &'static str,
    value: &str,
) -> Result<[u8; N], MalformedInput> {
    let bytes = decode_hex(field, value)?;
    let actual = bytes.len();
    bytes.try_into().map_err(|_| MalformedInput::InvalidLength {
        field,
        expected: N,
        actual,
    })
}

/// Creates a fresh crypto system protected by `password`.
///
/// The primary key, IV and salt are drawn from the OS random generator. The
/// only failure is an unavailable random source.
pub fn setup_system(password: &str) -> Result<StorableCryptoSystem, CryptoError> {
    let mut primary_key = Zeroizing::new([0u8; KEY_LEN]);
    let mut iv = [0u8; IV_LEN];
    let mut salt = [0u8; SALT_LEN];
    crypto::secure_random(primary_key.as_mut_slice())?;
    crypto::secure_random(&mut iv)?;
    crypto::secure_random(&mut salt)?;

    let keys = derive_keys(password.as_bytes(), &salt);
    let encrypted_primary_key = wrap_primary_key(&primary_key, keys.wrapping_key(), &iv);

    let system = CryptoSystem {
        encrypted_primary_key,
        iv,
        salt,
        verifier_key: *keys.verifier_key(),
    };
    Ok(system.to_storable())
}

/// Checks the password against the stored verifier and, on success,
/// recovers the primary key.
///
/// A verifier of the wrong length is treated like a wrong one. Nothing is
/// unwrapped unless the verifier matches.
fn verify_and_unwrap(
    password: &str,
    stored: &StorableCryptoSystem,
) -> Result<Zeroizing<[u8; KEY_LEN]>, CryptoError> {
    let encrypted_primary_key: [u8; KEY_LEN] =
        decode_field(FIELD_ENCRYPTED_PRIMARY_KEY, &stored.encrypted_primary_key)?;
    let iv: [u8; IV_LEN] = decode_field(FIELD_IV, &stored.iv)?;
    let salt: [u8; SALT_LEN] = decode_field(FIELD_SALT, &stored.salt)?;
    let stored_verifier = decode_hex(FIELD_VERIFIER_KEY, &stored.verifier_key)?;

    let keys = derive_keys(password.as_bytes(), &salt);
    if !bool::from(keys.verifier_key().as_slice().ct_eq(&stored_verifier)) {
        return Err(CryptoError::PasswordVerification);
    }

    Ok(unwrap_primary_key(&encrypted_primary_key, keys.wrapping_key(), &iv))
}

/// Encrypts UTF-8 text and returns the ciphertext as lowercase hex.
///
/// Deterministic for a given text, password and system.
pub fn encrypt_with_password(
    plain_text: &str,
    password: &str,
    system: &StorableCryptoSystem,
) -> Result<String, CryptoError> {
    let primary_key = verify_and_unwrap(password, system)?;

    let mut buf = Zeroizing::new(plain_text.as_bytes().to_vec());
    apply_keystream(&primary_key, &mut buf);

    Ok(hex::encode(buf.as_slice()))
}

/// Decrypts a hex ciphertext produced by [`encrypt_with_password`] back to
/// text.
pub fn decrypt_with_password(
    cipher_hex: &str,
    password: &str,
    system: &StorableCryptoSystem,
) -> Result<String, CryptoError> {
    let primary_key = verify_and_unwrap(password, system)?;

    let mut buf = decode_hex(FIELD_CIPHERTEXT, cipher_hex)?;
    apply_keystream(&primary_key, &mut buf);

    String::from_utf8(buf).map_err(|e| {
        // the rejected bytes are plaintext
        drop(Zeroizing::new(e.into_bytes()));
        MalformedInput::InvalidUtf8.into()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn fixture() -> StorableCryptoSystem {
        StorableCryptoSystem::new(
            "563412658f69217839f5278aa23f3fd0",
            "a41f0c9e3b7d2265f08e13c7594ab6d1",
            "3f9a1c0e7b42d856",
            "e17457fd1fd79413739c42534e4f89da",
        )
    }

    #[test]
    fn setup_field_lengths() {
        let system = setup_system("pw").unwrap();
        assert_eq!(system.encrypted_primary_key().len(), 32);
        assert_eq!(system.iv().len(), 32);
        assert_eq!(system.salt().len(), 16);
        assert_eq!(system.verifier_key().len(), 32);
        assert!(system.decode().is_ok());
    }

    #[test]
    fn setup_is_randomized() {
        let a = setup_system("pw").unwrap();
        let b = setup_system("pw").unwrap();
        assert_ne!(a.salt(), b.salt());
        assert_ne!(a.iv(), b.iv());
        assert_ne!(a.verifier_key(), b.verifier_key());
    }

    #[test]
    fn fixture_encrypts_to_known_digest() {
        let digest = encrypt_with_password("Hello from Jest", "uhg", &fixture()).unwrap();
        assert_eq!(digest, "a5dbcc2fb97487a54651343a53f0e1");

        let plain = decrypt_with_password(&digest, "uhg", &fixture()).unwrap();
        assert_eq!(plain, "Hello from Jest");
    }

    #[test]
    fn empty_text_encrypts_to_empty_hex() {
        let digest = encrypt_with_password("", "uhg", &fixture()).unwrap();
        assert_eq!(digest, "");
        assert_eq!(decrypt_with_password("", "uhg", &fixture()).unwrap(), "");
    }

    #[test]
    fn wrong_password_is_rejected() {
        let err = encrypt_with_password("Hello", "wrong", &fixture()).unwrap_err();
        assert!(err.is_password_verification());

        let err = decrypt_with_password("0e05", "wrong", &fixture()).unwrap_err();
        assert!(err.is_password_verification());
    }

    #[test]
    fn tampered_verifier_is_rejected() {
        let mut system = fixture();
        system.verifier_key = "e17457fd1fd79413739c42534e4f89db".to_string();
        let err = encrypt_with_password("Hello", "uhg", &system).unwrap_err();
        assert!(err.is_password_verification());
    }

    #[test]
    fn short_verifier_is_rejected_as_verification_failure() {
        let mut system = fixture();
        system.verifier_key = "e17457fd1fd79413".to_string();
        let err = encrypt_with_password("Hello", "uhg", &system).unwrap_err();
        assert!(err.is_password_verification());
    }

    #[test]
    fn bad_salt_is_malformed() {
        let mut system = fixture();
        system.salt = "zz9a1c0e7b42d856".to_string();
        match encrypt_with_password("Hello", "uhg", &system) {
            Err(CryptoError::Malformed(MalformedInput::InvalidHex { field, .. })) => {
                assert_eq!(field, "salt")
            }
            other => panic!("expected InvalidHex, got: {other:?}"),
        }
    }

    #[test]
    fn short_iv_is_malformed() {
        let mut system = fixture();
        system.iv = "a41f0c9e".to_string();
        match system.decode() {
            Err(CryptoError::Malformed(MalformedInput::InvalidLength {
                field,
                expected,
                actual,
            })) => {
                assert_eq!(field, "IV");
                assert_eq!(expected, 16);
                assert_eq!(actual, 4);
            }
            other => panic!("expected InvalidLength, got: {other:?}"),
        }
    }

    #[test]
    fn malformed_ciphertext_hex_is_reported() {
        let err = decrypt_with_password("not hex", "uhg", &fixture()).unwrap_err();
        assert!(err.is_malformed());

        let err = decrypt_with_password("abc", "uhg", &fixture()).unwrap_err();
        assert!(err.is_malformed());
    }

    #[test]
    fn non_utf8_plaintext_is_reported() {
        // keystream XOR the first byte gives 0xff, which never starts UTF-8
        let digest = encrypt_with_password("H", "uhg", &fixture()).unwrap();
        let first = u8::from_str_radix(&digest, 16).unwrap();
        let forged = hex::encode([first ^ b'H' ^ 0xff]);

        match decrypt_with_password(&forged, "uhg", &fixture()) {
            Err(CryptoError::Malformed(MalformedInput::InvalidUtf8)) => {}
            other => panic!("expected InvalidUtf8, got: {other:?}"),
        }
    }

    #[test]
    fn json_uses_camel_case_field_names() {
        let json = serde_json::to_value(fixture()).unwrap();
        let obj = json.as_object().unwrap();
        assert_eq!(obj.len(), 4);
        for key in ["encryptedPrimaryKey", "IV", "salt", "verifierKey"] {
            assert!(obj.contains_key(key), "missing {key}");
        }
    }

    #[test]
    fn json_with_unknown_field_is_rejected() {
        let json = r#"{"encryptedPrimaryKey":"","IV":"","salt":"","verifierKey":"","extra":""}"#;
        assert!(serde_json::from_str::<StorableCryptoSystem>(json).is_err());
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(32))]

        #[test]
        fn roundtrip_any_text(text in ".*", password in ".{0,24}") {
            let system = setup_system(&password).unwrap();
            let digest = encrypt_with_password(&text, &password, &system).unwrap();
            prop_assert_eq!(digest.len(), text.len() * 2);
            prop_assert_eq!(decrypt_with_password(&digest, &password, &system).unwrap(), text);
        }

        #[test]
        fn encrypt_is_deterministic(text in ".*") {
            let a = encrypt_with_password(&text, "uhg", &fixture()).unwrap();
            let b = encrypt_with_password(&text, "uhg", &fixture()).unwrap();
            prop_assert_eq!(a, b);
        }
    }
}
