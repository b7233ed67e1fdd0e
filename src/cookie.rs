//! HMAC-signed identity cookie codec.
//!
//! A [`SigningKey`] stamps arbitrary payload bytes with HMAC-SHA256 and
//! verifies them back. Malformed tokens, bad base64, and MAC mismatches all
//! collapse to the same "no valid identity" outcome so callers can't
//! distinguish a forged cookie from a missing one.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use hmac::{Hmac, Mac};
use rand::RngCore;
use sha2::Sha256;
use std::fs;
use std::path::Path;

type HmacSha256 = Hmac<Sha256>;

const KEY_LEN: usize = 64;

pub struct SigningKey {
    bytes: [u8; KEY_LEN],
}

impl SigningKey {
    /// Load the key from `path` if set, otherwise generate 64 secure-random bytes.
    pub fn load_or_generate(keyfile: Option<&Path>) -> Result<Self, std::io::Error> {
        if let Some(path) = keyfile {
            let contents = fs::read(path)?;
            if contents.len() != KEY_LEN {
                return Err(std::io::Error::new(
                    std::io::ErrorKind::InvalidData,
                    format!("signing keyfile must be exactly {KEY_LEN} bytes"),
                ));
            }
            let mut bytes = [0u8; KEY_LEN];
            bytes.copy_from_slice(&contents);
            Ok(Self { bytes })
        } else {
            let mut bytes = [0u8; KEY_LEN];
            rand::thread_rng().fill_bytes(&mut bytes);
            Ok(Self { bytes })
        }
    }

    /// Sign `payload`, producing `base64url(payload).base64url(mac)`.
    pub fn sign(&self, payload: &[u8]) -> String {
        let mac = self.mac_for(payload);
        format!(
            "{}.{}",
            URL_SAFE_NO_PAD.encode(payload),
            URL_SAFE_NO_PAD.encode(mac)
        )
    }

    /// Verify a token produced by [`SigningKey::sign`], returning the original
    /// payload bytes on success. Any malformed input, bad base64, or MAC
    /// mismatch returns `None` — callers cannot tell these apart.
    pub fn verify(&self, token: &str) -> Option<Vec<u8>> {
        let (payload_b64, mac_b64) = token.split_once('.')?;
        if payload_b64.contains('.') || mac_b64.is_empty() {
            return None;
        }
        let payload = URL_SAFE_NO_PAD.decode(payload_b64).ok()?;
        let mac_bytes = URL_SAFE_NO_PAD.decode(mac_b64).ok()?;

        let mut mac = HmacSha256::new_from_slice(&self.bytes).ok()?;
        mac.update(&payload);
        mac.verify_slice(&mac_bytes).ok()?;
        Some(payload)
    }

    fn mac_for(&self, payload: &[u8]) -> Vec<u8> {
        let mut mac = HmacSha256::new_from_slice(&self.bytes)
            .expect("HMAC accepts keys of any length");
        mac.update(payload);
        mac.finalize().into_bytes().to_vec()
    }
}
