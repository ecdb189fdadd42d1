//! HMAC-SHA256 signing for Crypto.com private requests.

use std::collections::BTreeMap;

use hmac::{Hmac, Mac};
use serde::Serialize;
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// JSON body of a signed request.
#[derive(Debug, Clone, Serialize)]
pub struct SignedRequest {
    pub id: u64,
    pub method: String,
    pub api_key: String,
    pub params: BTreeMap<String, String>,
    pub nonce: i64,
    pub sig: String,
}

/// Signs private requests with the account's API secret.
pub struct RequestSigner {
    api_key: String,
    secret: String,
}

impl RequestSigner {
    pub fn new(api_key: impl Into<String>, secret: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            secret: secret.into(),
        }
    }

    /// Signature over `method + id + api_key + params + nonce`, where params
    /// are concatenated as `key + value` in ascending key order. Returned as
    /// lowercase hex.
    pub fn sign(&self, method: &str, id: u64, params: &[(&str, String)], nonce: i64) -> String {
        let mut sorted = params.to_vec();
        sorted.sort_by(|a, b| a.0.cmp(b.0));
        let param_string: String = sorted.iter().map(|(k, v)| format!("{k}{v}")).collect();

        let payload = format!("{method}{id}{}{param_string}{nonce}", self.api_key);

        let mut mac = HmacSha256::new_from_slice(self.secret.as_bytes())
            .expect("HMAC accepts any key length");
        mac.update(payload.as_bytes());
        hex::encode(mac.finalize().into_bytes())
    }

    /// Build the full signed request body.
    pub fn envelope(
        &self,
        method: &str,
        id: u64,
        params: &[(&str, String)],
        nonce: i64,
    ) -> SignedRequest {
        SignedRequest {
            id,
            method: method.to_string(),
            api_key: self.api_key.clone(),
            params: params
                .iter()
                .map(|(k, v)| (k.to_string(), v.clone()))
                .collect(),
            nonce,
            sig: self.sign(method, id, params, nonce),
        }
    }
}
