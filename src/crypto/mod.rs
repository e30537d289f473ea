// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Crypto primitives shared by the trust core.
//!
//! Everything here is a thin, opinionated wrapper around a single vetted
//! crate per primitive: `bcrypt` for passwords, `hmac`+`sha2` for keyed and
//! unkeyed digests, `jsonwebtoken`'s RSA verifier for RS256/384/512, `rand`
//! for key material. No primitive is implemented by hand.

use hmac::{Hmac, Mac};
use rand::RngCore;
use sha2::{Digest, Sha256};
use thiserror::Error;

type HmacSha256 = Hmac<Sha256>;

/// bcrypt work factor. Fixed per spec; not configurable, so a weakened
/// deployment can't silently lower it.
pub const BCRYPT_COST: u32 = 12;

#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("bcrypt error: {0}")]
    Bcrypt(#[from] bcrypt::BcryptError),
    #[error("hmac key of invalid length")]
    InvalidHmacKeyLength,
    #[error("rsa signature verification failed")]
    RsaVerifyFailed,
}

/// Hash a plaintext password with bcrypt at the fixed cost.
pub fn hash_password(password: &str) -> Result<String, CryptoError> {
    Ok(bcrypt::hash(password, BCRYPT_COST)?)
}

/// Verify a plaintext password against a bcrypt hash.
///
/// Returns `false` — never an error — for empty input or an empty/malformed
/// hash, matching the store contract: a nonexistent credential must look
/// exactly like a wrong one.
pub fn verify_password(password: &str, hash: &str) -> bool {
    if password.is_empty() || hash.is_empty() {
        return false;
    }
    bcrypt::verify(password, hash).unwrap_or(false)
}

/// Fill a buffer with cryptographically secure random bytes.
pub fn random_bytes(len: usize) -> Vec<u8> {
    let mut buf = vec![0u8; len];
    rand::thread_rng().fill_bytes(&mut buf);
    buf
}

/// Generate a cryptographically secure 32-byte key (HMAC secrets, API key
/// material, CSRF state tokens before encoding).
pub fn random_32() -> [u8; 32] {
    let mut buf = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut buf);
    buf
}

/// Generate a cryptographically secure 16-byte nonce (CSRF nonce).
pub fn random_16() -> [u8; 16] {
    let mut buf = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut buf);
    buf
}

/// URL-safe, no-padding base64 encode — the encoding used throughout this
/// crate for API keys, CSRF tokens, and JWKS `n`/`e` values.
pub fn b64url_encode(bytes: &[u8]) -> String {
    use base64::Engine;
    base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(bytes)
}

/// URL-safe, no-padding base64 decode.
pub fn b64url_decode(s: &str) -> Result<Vec<u8>, base64::DecodeError> {
    use base64::Engine;
    base64::engine::general_purpose::URL_SAFE_NO_PAD.decode(s)
}

/// Compute HMAC-SHA256 over `data` keyed by `key`, returned as lowercase hex.
///
/// `key` may be any length; callers that need a fixed-size secret (the API
/// key store, the audit logger) validate that separately.
pub fn hmac_sha256_hex(key: &[u8], data: &[u8]) -> String {
    let mut mac = HmacSha256::new_from_slice(key).expect("HMAC accepts any key length");
    mac.update(data);
    hex::encode(mac.finalize().into_bytes())
}

/// Compute a plain (unkeyed) SHA-256 digest, returned as lowercase hex.
/// Used for the audit log's hash chain, never for secrets.
pub fn sha256_hex(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

/// Constant-time comparison of two byte strings. Used to compare HMAC
/// digests and CSRF tokens so a timing side-channel can't narrow down a
/// guess byte by byte.
pub fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    use subtle::ConstantTimeEq;
    a.len() == b.len() && bool::from(a.ct_eq(b))
}

/// RSA signature algorithms accepted for OIDC ID tokens.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RsaAlg {
    Rs256,
    Rs384,
    Rs512,
}

impl RsaAlg {
    pub fn from_jwt_alg(alg: &str) -> Option<Self> {
        match alg {
            "RS256" => Some(Self::Rs256),
            "RS384" => Some(Self::Rs384),
            "RS512" => Some(Self::Rs512),
            _ => None,
        }
    }

    fn to_jsonwebtoken(self) -> jsonwebtoken::Algorithm {
        match self {
            Self::Rs256 => jsonwebtoken::Algorithm::RS256,
            Self::Rs384 => jsonwebtoken::Algorithm::RS384,
            Self::Rs512 => jsonwebtoken::Algorithm::RS512,
        }
    }
}

/// Verify an RSA-PKCS#1v1.5 signature over `signing_input` (the JWT's
/// `header.payload`) given the base64url-decoded modulus/exponent from a
/// JWKS entry.
///
/// This delegates to `jsonwebtoken`'s verifier rather than hand-rolling
/// PKCS#1v1.5 padding checks; the `n`/`e` are re-encoded URL-safe-base64
/// because that's the input format `DecodingKey::from_rsa_components`
/// expects (it mirrors the JWK wire format).
pub fn rsa_verify(
    alg: RsaAlg,
    signing_input: &str,
    signature: &[u8],
    n_b64url: &str,
    e_b64url: &str,
) -> Result<(), CryptoError> {
    let key = jsonwebtoken::DecodingKey::from_rsa_components(n_b64url, e_b64url)
        .map_err(|_| CryptoError::RsaVerifyFailed)?;
    let sig_b64 = b64url_encode(signature);
    jsonwebtoken::crypto::verify(&sig_b64, signing_input.as_bytes(), &key, alg.to_jsonwebtoken())
        .map_err(|_| CryptoError::RsaVerifyFailed)
        .and_then(|ok| if ok { Ok(()) } else { Err(CryptoError::RsaVerifyFailed) })
}
