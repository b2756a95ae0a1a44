//! Compact JWT assembly for the signing and issuance request payloads.
//!
//! The crate never verifies JWTs, it only produces them; the signing capability is a
//! seam so deployments can back it with an HSM or a remote key service.

use std::fmt::Debug;

use async_trait::async_trait;
use base64::prelude::*;
use p256::ecdsa::{signature::Signer, Signature, SigningKey};
use serde::Serialize;
use serde_json::json;
use x509_cert::{der::Encode, Certificate};

use crate::error::Result;

#[async_trait]
pub trait JwtSigner: Debug {
    /// The JWS algorithm this signer produces.
    fn alg(&self) -> &'static str;

    /// Base64 DER certificate chain embedded in the `x5c` header.
    fn x5c(&self) -> &[String];

    async fn sign(&self, payload: &[u8]) -> Vec<u8>;
}

/// ES256 signer over a raw P-256 key with an optional certificate chain.
#[derive(Debug)]
pub struct P256Signer {
    key: SigningKey,
    x5c: Vec<String>,
}

impl P256Signer {
    pub fn new(key: SigningKey) -> Self {
        Self { key, x5c: vec![] }
    }

    pub fn with_chain(key: SigningKey, chain: &[Certificate]) -> Result<Self> {
        let x5c = chain
            .iter()
            .map(|cert| Ok(BASE64_STANDARD.encode(cert.to_der()?)))
            .collect::<anyhow::Result<_>>()?;
        Ok(Self { key, x5c })
    }
}

#[async_trait]
impl JwtSigner for P256Signer {
    fn alg(&self) -> &'static str {
        "ES256"
    }

    fn x5c(&self) -> &[String] {
        &self.x5c
    }

    async fn sign(&self, payload: &[u8]) -> Vec<u8> {
        let signature: Signature = self.key.sign(payload);
        signature.to_vec()
    }
}

/// Serialize `claims` into a compact JWT with header `{typ, alg, x5c}`.
pub async fn sign_jwt<S: JwtSigner + ?Sized>(claims: &impl Serialize, signer: &S) -> Result<String> {
    let header = json!({
        "typ": "JWT",
        "alg": signer.alg(),
        "x5c": signer.x5c(),
    });
    let header_b64 = serde_json::to_vec(&header)
        .map(|b| BASE64_URL_SAFE_NO_PAD.encode(b))
        .map_err(anyhow::Error::from)?;
    let claims_b64 = serde_json::to_vec(claims)
        .map(|b| BASE64_URL_SAFE_NO_PAD.encode(b))
        .map_err(anyhow::Error::from)?;
    let payload = [header_b64.as_bytes(), b".", claims_b64.as_bytes()].concat();
    let signature = signer.sign(&payload).await;
    let signature_b64 = BASE64_URL_SAFE_NO_PAD.encode(signature);
    Ok(format!("{header_b64}.{claims_b64}.{signature_b64}"))
}

#[cfg(test)]
mod tests {
    use serde_json::Value as Json;

    use super::*;

    #[tokio::test]
    async fn produces_a_three_segment_token_with_es256_header() {
        let signer = P256Signer::new(SigningKey::random(&mut rand::rngs::OsRng));
        let jwt = sign_jwt(&json!({"iss": "https://jobs.example.com"}), &signer)
            .await
            .unwrap();

        let segments: Vec<&str> = jwt.split('.').collect();
        assert_eq!(segments.len(), 3);

        let header: Json =
            serde_json::from_slice(&BASE64_URL_SAFE_NO_PAD.decode(segments[0]).unwrap()).unwrap();
        assert_eq!(header["typ"], "JWT");
        assert_eq!(header["alg"], "ES256");
        assert!(header["x5c"].is_array());

        let claims: Json =
            serde_json::from_slice(&BASE64_URL_SAFE_NO_PAD.decode(segments[1]).unwrap()).unwrap();
        assert_eq!(claims["iss"], "https://jobs.example.com");
    }
}
