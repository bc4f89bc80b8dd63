//! Whole-document transforms that can leave YAML front matter readable.

use crate::error::CryptoError;
use crate::system::{StorableCryptoSystem, decrypt_with_password, encrypt_with_password};

const FRONT_MATTER_FENCE: &str = "---";

/// Splits a document into its leading front matter block and the body.
///
/// Front matter must open with a `---` line at the very start and close with
/// another `---` line; the closing line (with its line break) belongs to the
/// front matter. Without a closed block the whole text is body.
pub fn split_front_matter(text: &str) -> (&str, &str) {
    let mut lines = text.split_inclusive('\n');

    let mut end = match lines.next() {
        Some(first) if is_fence(first) => first.len(),
        _ => return ("", text),
    };

    for line in lines {
        end += line.len();
        if is_fence(line) {
            return text.split_at(end);
        }
    }

    ("", text)
}

fn is_fence(line: &str) -> bool {
    line.trim_end_matches(['\n', '\r']) == FRONT_MATTER_FENCE
}

/// Encrypts a document. Unless `include_front_matter` is set, the front
/// matter is kept in the clear and only the body is replaced by hex.
pub fn encrypt_document(
    text: &str,
    password: &str,
    system: &StorableCryptoSystem,
    include_front_matter: bool,
) -> Result<String, CryptoError> {
    let (front, body) = if include_front_matter {
        ("", text)
    } else {
        split_front_matter(text)
    };

    let cipher_hex = encrypt_with_password(body, password, system)?;
    Ok(format!("{front}{cipher_hex}"))
}

/// Reverses [`encrypt_document`] with the same `include_front_matter`
/// setting. Trailing whitespace after the hex body is ignored.
pub fn decrypt_document(
    text: &str,
    password: &str,
    system: &StorableCryptoSystem,
    include_front_matter: bool,
) -> Result<String, CryptoError> {
    let (front, body) = if include_front_matter {
        ("", text)
    } else {
        split_front_matter(text)
    };

    let plain = decrypt_with_password(body.trim_end(), password, system)?;
    Ok(format!("{front}{plain}"))
}
