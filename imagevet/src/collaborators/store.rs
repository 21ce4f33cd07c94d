//! Object-store collaborator.
//!
//! The real implementation speaks the S3 protocol directly (the original
//! harness uploaded to DigitalOcean Spaces): requests are signed with AWS
//! Signature V4 and carry a Content-MD5 so the store verifies payload
//! integrity. Puts are idempotent under the same key, which is what makes
//! the publisher's retry loop safe.

use crate::config::StorageConfig;
use crate::errors::StoreError;
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use chrono::Utc;
use hmac::{Hmac, Mac};
use md5::Md5;
use sha2::{Digest, Sha256};
use tracing::debug;

type HmacSha256 = Hmac<Sha256>;

const SIGNED_HEADERS: &str =
    "content-md5;content-type;host;x-amz-acl;x-amz-content-sha256;x-amz-date";

/// Interface to the durable object store.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Writes `bytes` under `key`. Idempotent under the same key.
    async fn put(&self, key: &str, bytes: &[u8], media_type: &str) -> Result<(), StoreError>;
}

/// S3-compatible store client.
pub struct S3Store {
    http: reqwest::Client,
    config: StorageConfig,
    host: String,
}

impl S3Store {
    /// Creates a client for the configured endpoint.
    #[must_use]
    pub fn new(config: StorageConfig) -> Self {
        let host = config
            .endpoint
            .trim_start_matches("https://")
            .trim_start_matches("http://")
            .trim_end_matches('/')
            .to_string();
        Self {
            http: reqwest::Client::new(),
            config,
            host,
        }
    }

    fn sign(
        &self,
        canonical_uri: &str,
        amz_date: &str,
        date: &str,
        payload_hash: &str,
        content_md5: &str,
        media_type: &str,
    ) -> Result<String, StoreError> {
        let canonical_request = format!(
            "PUT\n{canonical_uri}\n\n\
             content-md5:{content_md5}\n\
             content-type:{media_type}\n\
             host:{host}\n\
             x-amz-acl:public-read\n\
             x-amz-content-sha256:{payload_hash}\n\
             x-amz-date:{amz_date}\n\n\
             {SIGNED_HEADERS}\n{payload_hash}",
            host = self.host,
        );

        let scope = format!("{date}/{region}/s3/aws4_request", region = self.config.region);
        let string_to_sign = format!(
            "AWS4-HMAC-SHA256\n{amz_date}\n{scope}\n{}",
            hex::encode(Sha256::digest(canonical_request.as_bytes()))
        );

        let mut key = hmac_sha256(
            format!("AWS4{}", self.config.secret_key).as_bytes(),
            date.as_bytes(),
        )?;
        for part in [self.config.region.as_str(), "s3", "aws4_request"] {
            key = hmac_sha256(&key, part.as_bytes())?;
        }
        let signature = hex::encode(hmac_sha256(&key, string_to_sign.as_bytes())?);

        Ok(format!(
            "AWS4-HMAC-SHA256 Credential={access_key}/{scope}, SignedHeaders={SIGNED_HEADERS}, Signature={signature}",
            access_key = self.config.access_key,
        ))
    }
}

#[async_trait]
impl ObjectStore for S3Store {
    async fn put(&self, key: &str, bytes: &[u8], media_type: &str) -> Result<(), StoreError> {
        let canonical_uri = format!(
            "/{}/{}",
            uri_encode(&self.config.bucket, false),
            uri_encode(key, false)
        );
        let now = Utc::now();
        let amz_date = now.format("%Y%m%dT%H%M%SZ").to_string();
        let date = now.format("%Y%m%d").to_string();
        let payload_hash = hex::encode(Sha256::digest(bytes));
        let content_md5 = BASE64.encode(Md5::digest(bytes));

        let authorization = self.sign(
            &canonical_uri,
            &amz_date,
            &date,
            &payload_hash,
            &content_md5,
            media_type,
        )?;

        let url = format!("{}{canonical_uri}", self.config.endpoint.trim_end_matches('/'));
        debug!(%key, size = bytes.len(), "uploading object");

        let response = self
            .http
            .put(&url)
            .header("Host", &self.host)
            .header("Content-MD5", content_md5)
            .header("Content-Type", media_type)
            .header("x-amz-acl", "public-read")
            .header("x-amz-content-sha256", payload_hash)
            .header("x-amz-date", amz_date)
            .header("Authorization", authorization)
            .body(bytes.to_vec())
            .send()
            .await
            .map_err(|err| StoreError::new(format!("put {key} failed: {err}")))?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        let body = response.text().await.unwrap_or_default();
        Err(StoreError::new(format!(
            "put {key} rejected with {status}: {}",
            body.chars().take(200).collect::<String>()
        )))
    }
}

fn hmac_sha256(key: &[u8], data: &[u8]) -> Result<Vec<u8>, StoreError> {
    let mut mac = HmacSha256::new_from_slice(key)
        .map_err(|_| StoreError::new("signing key rejected"))?;
    mac.update(data);
    Ok(mac.finalize().into_bytes().to_vec())
}

/// Percent-encodes a path per the SigV4 canonicalization rules.
fn uri_encode(input: &str, encode_slash: bool) -> String {
    let mut out = String::with_capacity(input.len());
    for byte in input.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(byte as char);
            }
            b'/' if !encode_slash => out.push('/'),
            other => out.push_str(&format!("%{other:02X}")),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uri_encode_preserves_unreserved() {
        assert_eq!(
            uri_encode("image/2.4.13/report.json", false),
            "image/2.4.13/report.json"
        );
    }

    #[test]
    fn uri_encode_escapes_specials() {
        assert_eq!(uri_encode("a b+c", true), "a%20b%2Bc");
        assert_eq!(uri_encode("a/b", true), "a%2Fb");
    }

    #[test]
    fn signature_is_deterministic() {
        let store = S3Store::new(StorageConfig {
            access_key: "AKIDEXAMPLE".to_string(),
            secret_key: "secret".to_string(),
            region: "nyc3".to_string(),
            bucket: "ci".to_string(),
            endpoint: "https://nyc3.digitaloceanspaces.com".to_string(),
        });

        let a = store
            .sign("/ci/key", "20260101T000000Z", "20260101", "hash", "md5", "text/plain")
            .unwrap();
        let b = store
            .sign("/ci/key", "20260101T000000Z", "20260101", "hash", "md5", "text/plain")
            .unwrap();
        assert_eq!(a, b);
        assert!(a.starts_with("AWS4-HMAC-SHA256 Credential=AKIDEXAMPLE/20260101/nyc3/s3/aws4_request"));
    }

    #[test]
    fn host_strips_scheme() {
        let store = S3Store::new(StorageConfig {
            access_key: String::new(),
            secret_key: String::new(),
            region: "nyc3".to_string(),
            bucket: "ci".to_string(),
            endpoint: "https://nyc3.digitaloceanspaces.com/".to_string(),
        });
        assert_eq!(store.host, "nyc3.digitaloceanspaces.com");
    }
}
