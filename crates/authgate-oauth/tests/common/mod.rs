//! Shared fixtures for relying-party integration tests.

#![allow(dead_code)]

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use rsa::pkcs8::{EncodePrivateKey, LineEnding};
use rsa::traits::PublicKeyParts;
use rsa::RsaPrivateKey;
use serde_json::Value;
use std::time::{SystemTime, UNIX_EPOCH};

pub const TEST_KID: &str = "integration-key";

/// RS256 key pair with its JWKS document, generated per test.
pub struct SigningKey {
    encoding_key: EncodingKey,
    /// JWKS document the mock authorization server publishes
    pub jwks: Value,
}

impl SigningKey {
    pub fn generate() -> Self {
        let key = RsaPrivateKey::new(&mut rand::thread_rng(), 2048).expect("generate RSA key");
        let pem = key.to_pkcs8_pem(LineEnding::LF).expect("encode private key");
        let encoding_key =
            EncodingKey::from_rsa_pem(pem.as_bytes()).expect("load signing key");
        let jwks = serde_json::json!({
            "keys": [{
                "kty": "RSA",
                "kid": TEST_KID,
                "use": "sig",
                "alg": "RS256",
                "n": URL_SAFE_NO_PAD.encode(key.n().to_bytes_be()),
                "e": URL_SAFE_NO_PAD.encode(key.e().to_bytes_be()),
            }]
        });
        Self { encoding_key, jwks }
    }

    /// Sign an ID token with this key under [`TEST_KID`].
    pub fn sign(&self, claims: &Value) -> String {
        let mut header = Header::new(Algorithm::RS256);
        header.kid = Some(TEST_KID.to_string());
        jsonwebtoken::encode(&header, claims, &self.encoding_key).expect("sign token")
    }
}

pub fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock before epoch")
        .as_secs()
}
