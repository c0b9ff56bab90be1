//! Client side of the Auth cryptographic service.
//!
//! The service performs every PRE operation (keys, encryption, fragment
//! splitting, re-encryption, signatures, key refresh). The harness never
//! looks inside the fragments it gets back beyond checking their length.

use async_trait::async_trait;
use std::time::Duration;

use super::http::JsonEndpoint;
use super::types::*;
use crate::error::HarnessResult;

#[async_trait]
pub trait AuthService: Send + Sync {
    async fn request_keypair(&self) -> HarnessResult<Keypair>;

    async fn request_signer(&self) -> HarnessResult<Keypair>;

    async fn sign(&self, request: &SignRequest) -> HarnessResult<SignResponse>;

    async fn verify(&self, request: &VerifyRequest) -> HarnessResult<VerifyResponse>;

    async fn encrypt(&self, request: &EncryptRequest) -> HarnessResult<EncryptResponse>;

    async fn generate_key_fragments(&self, request: &KeyFragmentsRequest) -> HarnessResult<KeyFragmentsResponse>;

    async fn reencrypt(&self, request: &ReencryptRequest) -> HarnessResult<ReencryptResponse>;

    async fn decrypt(&self, request: &DecryptRequest) -> HarnessResult<DecryptResponse>;

    async fn key_refresh(&self, request: &KeyRefreshRequest) -> HarnessResult<()>;
}

/// Auth service reached over HTTP.
#[derive(Debug, Clone)]
pub struct HttpAuthClient {
    endpoint: JsonEndpoint,
}

impl HttpAuthClient {
    pub fn new(base_url: &str, timeout: Duration) -> HarnessResult<Self> {
        Ok(Self {
            endpoint: JsonEndpoint::new("auth", base_url, timeout)?,
        })
    }

    pub fn base_url(&self) -> &str {
        self.endpoint.base_url()
    }
}

#[async_trait]
impl AuthService for HttpAuthClient {
    async fn request_keypair(&self) -> HarnessResult<Keypair> {
        self.endpoint.get("requestKeypair", "/stateless/keypair").await
    }

    async fn request_signer(&self) -> HarnessResult<Keypair> {
        self.endpoint.get("requestSigner", "/stateless/signer").await
    }

    async fn sign(&self, request: &SignRequest) -> HarnessResult<SignResponse> {
        self.endpoint.post("sign", "/stateless/sign", request).await
    }

    async fn verify(&self, request: &VerifyRequest) -> HarnessResult<VerifyResponse> {
        self.endpoint.post("verify", "/stateless/verify", request).await
    }

    async fn encrypt(&self, request: &EncryptRequest) -> HarnessResult<EncryptResponse> {
        self.endpoint.post("encrypt", "/stateless/encrypt", request).await
    }

    async fn generate_key_fragments(&self, request: &KeyFragmentsRequest) -> HarnessResult<KeyFragmentsResponse> {
        self.endpoint.post("generateKeyFragments", "/stateless/kfrags", request).await
    }

    async fn reencrypt(&self, request: &ReencryptRequest) -> HarnessResult<ReencryptResponse> {
        self.endpoint.post("reencrypt", "/stateless/reencrypt", request).await
    }

    async fn decrypt(&self, request: &DecryptRequest) -> HarnessResult<DecryptResponse> {
        self.endpoint.post("decrypt", "/stateless/decrypt", request).await
    }

    async fn key_refresh(&self, request: &KeyRefreshRequest) -> HarnessResult<()> {
        self.endpoint.post_status("keyRefresh", "/stateless/key_refresh", request).await
    }
}
