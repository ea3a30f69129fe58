//! HTTP adapter for a Cloud-KMS-style signing authority.
//!
//! Every call is one blocking round trip. Each outbound payload carries its
//! CRC32C; the authority must confirm it received the same bytes and must
//! checksum whatever it sends back. Any disagreement is an integrity failure,
//! never a plain "invalid".

use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::KmsConfig;
use crate::crypto::checksum;
use crate::crypto::signer::{Cipher, MacSigner, SignerError};
use crate::types::SigningKeyRef;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct MacSignRequest {
    data: String,
    data_crc32c: u64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MacSignResponse {
    mac: String,
    mac_crc32c: u64,
    #[serde(default)]
    verified_data_crc32c: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct MacVerifyRequest {
    data: String,
    data_crc32c: u64,
    mac: String,
    mac_crc32c: u64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MacVerifyResponse {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    verified_data_crc32c: bool,
    #[serde(default)]
    verified_mac_crc32c: bool,
    #[serde(default)]
    verified_success_integrity: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct EncryptRequest {
    plaintext: String,
    plaintext_crc32c: u64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EncryptResponse {
    ciphertext: String,
    ciphertext_crc32c: u64,
    #[serde(default)]
    verified_plaintext_crc32c: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct DecryptRequest {
    ciphertext: String,
    ciphertext_crc32c: u64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DecryptResponse {
    plaintext: String,
    plaintext_crc32c: u64,
}

/// Client for the remote KMS.
pub struct KmsClient {
    endpoint: String,
    access_token: Option<String>,
    client: reqwest::Client,
}

impl KmsClient {
    /// Create a client from configuration.
    pub fn new(config: &KmsConfig) -> Result<Self, SignerError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .map_err(|e| SignerError::Protocol(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
            access_token: config.access_token.clone(),
            client,
        })
    }

    fn url(&self, key: &SigningKeyRef, method: &str) -> String {
        format!("{}/v1/{}:{}", self.endpoint, key, method)
    }

    async fn call<Req, Resp>(
        &self,
        key: &SigningKeyRef,
        method: &str,
        body: &Req,
    ) -> Result<Resp, SignerError>
    where
        Req: Serialize + ?Sized,
        Resp: DeserializeOwned,
    {
        let url = self.url(key, method);
        debug!("KMS {} on {}", method, key);

        let mut request = self.client.post(&url).json(body);
        if let Some(token) = &self.access_token {
            request = request.bearer_auth(token);
        }

        let response = request
            .send()
            .await
            .map_err(|e| SignerError::Unavailable(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let message = format!("HTTP {} from KMS {}", status, method);
            warn!("{}", message);
            return Err(match status.as_u16() {
                401 | 403 | 404 => SignerError::Unauthorized(message),
                429 | 500..=599 => SignerError::Unavailable(message),
                _ => SignerError::Protocol(message),
            });
        }

        response
            .json::<Resp>()
            .await
            .map_err(|e| SignerError::Protocol(format!("invalid {} response: {}", method, e)))
    }
}

fn decode_field(field: &str, value: &str) -> Result<Vec<u8>, SignerError> {
    STANDARD
        .decode(value)
        .map_err(|e| SignerError::Protocol(format!("invalid base64 in {}: {}", field, e)))
}

#[async_trait]
impl MacSigner for KmsClient {
    async fn sign(&self, key: &SigningKeyRef, data: &[u8]) -> Result<Vec<u8>, SignerError> {
        let request = MacSignRequest {
            data: STANDARD.encode(data),
            data_crc32c: checksum::crc32c(data),
        };
        let response: MacSignResponse = self.call(key, "macSign", &request).await?;

        if !response.verified_data_crc32c {
            return Err(SignerError::Integrity(
                "request data corrupted in transit".to_string(),
            ));
        }

        let mac = decode_field("mac", &response.mac)?;
        if !checksum::matches(&mac, response.mac_crc32c) {
            return Err(SignerError::Integrity(
                "response mac corrupted in transit".to_string(),
            ));
        }

        Ok(mac)
    }

    async fn verify(
        &self,
        key: &SigningKeyRef,
        data: &[u8],
        mac: &[u8],
    ) -> Result<bool, SignerError> {
        let request = MacVerifyRequest {
            data: STANDARD.encode(data),
            data_crc32c: checksum::crc32c(data),
            mac: STANDARD.encode(mac),
            mac_crc32c: checksum::crc32c(mac),
        };
        let response: MacVerifyResponse = self.call(key, "macVerify", &request).await?;

        if !response.verified_data_crc32c || !response.verified_mac_crc32c {
            return Err(SignerError::Integrity(
                "request corrupted in transit".to_string(),
            ));
        }
        // The authority mirrors `success` into `verifiedSuccessIntegrity`; a
        // disagreement means the verdict itself was altered on the way back.
        if response.verified_success_integrity != response.success {
            return Err(SignerError::Integrity(
                "verification verdict corrupted in transit".to_string(),
            ));
        }

        Ok(response.success)
    }
}

#[async_trait]
impl Cipher for KmsClient {
    async fn encrypt(&self, key: &SigningKeyRef, plaintext: &[u8]) -> Result<Vec<u8>, SignerError> {
        let request = EncryptRequest {
            plaintext: STANDARD.encode(plaintext),
            plaintext_crc32c: checksum::crc32c(plaintext),
        };
        let response: EncryptResponse = self.call(key, "encrypt", &request).await?;

        if !response.verified_plaintext_crc32c {
            return Err(SignerError::Integrity(
                "plaintext corrupted in transit".to_string(),
            ));
        }

        let ciphertext = decode_field("ciphertext", &response.ciphertext)?;
        if !checksum::matches(&ciphertext, response.ciphertext_crc32c) {
            return Err(SignerError::Integrity(
                "ciphertext corrupted in transit".to_string(),
            ));
        }

        Ok(ciphertext)
    }

    async fn decrypt(
        &self,
        key: &SigningKeyRef,
        ciphertext: &[u8],
    ) -> Result<Vec<u8>, SignerError> {
        let request = DecryptRequest {
            ciphertext: STANDARD.encode(ciphertext),
            ciphertext_crc32c: checksum::crc32c(ciphertext),
        };
        let response: DecryptResponse = self.call(key, "decrypt", &request).await?;

        let plaintext = decode_field("plaintext", &response.plaintext)?;
        if !checksum::matches(&plaintext, response.plaintext_crc32c) {
            return Err(SignerError::Integrity(
                "plaintext corrupted in transit".to_string(),
            ));
        }

        Ok(plaintext)
    }
}
