//! Encoding helpers: base64url, tag decoding, random identifiers

use crate::error::{EmulatorError, Result};
use crate::transaction::Tag;
use base64::engine::general_purpose::{URL_SAFE, URL_SAFE_NO_PAD};
use base64::Engine;
use rand::Rng;
use sha2::{Digest, Sha256};

/// Length of a transaction id produced by [`random_id`] when no length is given.
pub const DEFAULT_ID_LENGTH: usize = 43;

const ID_ALPHABET: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";

pub fn to_b64url(bytes: &[u8]) -> String {
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Decodes base64url input, accepting both padded and unpadded forms.
pub fn from_b64url(input: &str) -> Result<Vec<u8>> {
    let trimmed = input.trim_end_matches('=');
    URL_SAFE_NO_PAD
        .decode(trimmed)
        .or_else(|_| URL_SAFE.decode(input))
        .map_err(|e| EmulatorError::InvalidInput(format!("Invalid base64url '{}': {}", input, e)))
}

/// Decodes base64url input to text, replacing invalid UTF-8 sequences.
pub fn b64url_to_string(input: &str) -> Result<String> {
    Ok(String::from_utf8_lossy(&from_b64url(input)?).into_owned())
}

/// Returns the decoded value of the first tag whose decoded name matches `name`
/// case-insensitively, or an empty string.
pub fn tag_value(tags: &[Tag], name: &str) -> String {
    tags.iter()
        .find_map(|tag| {
            let tag_name = b64url_to_string(&tag.name).ok()?;
            if tag_name.eq_ignore_ascii_case(name) {
                b64url_to_string(&tag.value).ok()
            } else {
                None
            }
        })
        .unwrap_or_default()
}

/// Lowercase base-36 identifier of `len` characters.
pub fn random_id(len: usize) -> String {
    let mut rng = rand::thread_rng();
    (0..len)
        .map(|_| ID_ALPHABET[rng.gen_range(0..ID_ALPHABET.len())] as char)
        .collect()
}

/// Address of an owner key: base64url(SHA-256(raw key bytes)).
pub fn owner_to_address(owner: &str) -> Result<String> {
    let key = from_b64url(owner)?;
    Ok(to_b64url(&Sha256::digest(key)))
}
