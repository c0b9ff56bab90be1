use async_trait::async_trait;
use std::time::Duration;

use super::http::JsonEndpoint;
use super::types::*;
use crate::error::HarnessResult;

/// Capsule/fragment store and re-encryption relay running on every node.
///
/// Every call except `get_reencryption_fragment` reports success through its
/// status alone.
#[async_trait]
pub trait BrokerService: Send + Sync {
    async fn store_capsule(&self, request: &StoreCapsuleRequest) -> HarnessResult<()>;

    async fn store_key_fragment(&self, request: &StoreKeyFragmentRequest) -> HarnessResult<()>;

    async fn generate_reencryption_fragment(&self, request: &GenerateFragmentRequest) -> HarnessResult<()>;

    async fn get_reencryption_fragment(&self, request: &FragmentAccessRequest) -> HarnessResult<RetrievedFragment>;

    async fn check_permissions(&self, request: &FragmentAccessRequest) -> HarnessResult<()>;
}

#[derive(Debug, Clone)]
pub struct HttpBrokerClient {
    endpoint: JsonEndpoint,
}

impl HttpBrokerClient {
    pub fn new(base_url: &str, timeout: Duration) -> HarnessResult<Self> {
        Ok(Self {
            endpoint: JsonEndpoint::new("broker", base_url, timeout)?,
        })
    }

    pub fn base_url(&self) -> &str {
        self.endpoint.base_url()
    }
}

#[async_trait]
impl BrokerService for HttpBrokerClient {
    async fn store_capsule(&self, request: &StoreCapsuleRequest) -> HarnessResult<()> {
        self.endpoint.post_status("storeCapsule", "/auth/storeCapsule", request).await
    }

    async fn store_key_fragment(&self, request: &StoreKeyFragmentRequest) -> HarnessResult<()> {
        self.endpoint.post_status("storeKeyFragment", "/auth/storeKFrag", request).await
    }

    async fn generate_reencryption_fragment(&self, request: &GenerateFragmentRequest) -> HarnessResult<()> {
        self.endpoint
            .post_status("generateReencryptionFragment", "/auth/generateCFrag", request)
            .await
    }

    async fn get_reencryption_fragment(&self, request: &FragmentAccessRequest) -> HarnessResult<RetrievedFragment> {
        self.endpoint
            .post("getReencryptionFragment", "/auth/getCFrag", request)
            .await
    }

    async fn check_permissions(&self, request: &FragmentAccessRequest) -> HarnessResult<()> {
        self.endpoint
            .post_status("checkPermissions", "/auth/checkPermissions", request)
            .await
    }
}
