//! Ledger collaborator.
//!
//! The contracts (token, timelock, DAO, aggregator, per-entity access
//! control) are deployed and driven through a JSON gateway in front of the
//! chain. The harness treats it as an opaque transactional service: every
//! method returns once the transaction is mined.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::time::Duration;

use super::http::JsonEndpoint;
use super::types::{AccessRequest, AccessRequestReceipt, ContractHandle};
use crate::error::{HarnessError, HarnessResult};

#[async_trait]
pub trait Ledger: Send + Sync {
    /// The first `count` accounts managed by the gateway's wallet.
    async fn accounts(&self, count: usize) -> HarnessResult<Vec<String>>;

    /// Address controlled by the given secret key.
    async fn derive_address(&self, secret_key: &[u8]) -> HarnessResult<String>;

    async fn transfer(&self, from: &str, to: &str, amount_wei: u128) -> HarnessResult<()>;

    /// Deploys the token, timelock and DAO contracts plus the aggregator
    /// contract wired to them.
    async fn deploy_aggregator_contract(&self, owner: &str) -> HarnessResult<ContractHandle>;

    async fn deploy_access_contract(&self, owner: &str) -> HarnessResult<ContractHandle>;

    async fn request_access_to_data(
        &self,
        aggregator: &ContractHandle,
        request: &AccessRequest,
    ) -> HarnessResult<AccessRequestReceipt>;

    /// Sent by the contract owner.
    async fn grant_access_request(&self, contract: &ContractHandle, request_id: &str) -> HarnessResult<()>;

    async fn check_permissions(&self, contract: &ContractHandle, account: &str, data_id: &str) -> HarnessResult<bool>;

    /// Releases the wallet provider. Called once, after the last iteration.
    async fn close(&self) {}
}

#[derive(Debug, Deserialize)]
struct AccountsResponse {
    accounts: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct AddressResponse {
    address: String,
}

#[derive(Debug, Deserialize)]
struct PermissionsResponse {
    granted: bool,
}

#[derive(Debug, Serialize)]
struct DeployRequest<'a> {
    owner: &'a str,
}

/// Ledger gateway reached over HTTP.
#[derive(Debug, Clone)]
pub struct HttpLedger {
    endpoint: JsonEndpoint,
}

impl HttpLedger {
    pub fn new(base_url: &str, timeout: Duration) -> HarnessResult<Self> {
        Ok(Self {
            endpoint: JsonEndpoint::new("ledger", base_url, timeout)?,
        })
    }
}

#[async_trait]
impl Ledger for HttpLedger {
    async fn accounts(&self, count: usize) -> HarnessResult<Vec<String>> {
        let resp: AccountsResponse = self
            .endpoint
            .get("accounts", &format!("/accounts?count={}", count))
            .await?;
        if resp.accounts.len() < count {
            return Err(HarnessError::Ledger(format!(
                "wallet manages {} accounts, {} needed",
                resp.accounts.len(),
                count
            )));
        }
        Ok(resp.accounts)
    }

    async fn derive_address(&self, secret_key: &[u8]) -> HarnessResult<String> {
        let payload = json!({ "secret_key": format!("0x{}", hex::encode(secret_key)) });
        let resp: AddressResponse = self.endpoint.post("deriveAddress", "/accounts/derive", &payload).await?;
        Ok(resp.address)
    }

    async fn transfer(&self, from: &str, to: &str, amount_wei: u128) -> HarnessResult<()> {
        // u128 does not survive JSON number precision; send it as a decimal string.
        let payload = json!({ "from": from, "to": to, "amount": amount_wei.to_string() });
        self.endpoint.post_status("transfer", "/transfer", &payload).await
    }

    async fn deploy_aggregator_contract(&self, owner: &str) -> HarnessResult<ContractHandle> {
        self.endpoint
            .post("deployAggregator", "/contracts/aggregator", &DeployRequest { owner })
            .await
    }

    async fn deploy_access_contract(&self, owner: &str) -> HarnessResult<ContractHandle> {
        self.endpoint
            .post("deployAccessContract", "/contracts/access", &DeployRequest { owner })
            .await
    }

    async fn request_access_to_data(
        &self,
        aggregator: &ContractHandle,
        request: &AccessRequest,
    ) -> HarnessResult<AccessRequestReceipt> {
        let payload = json!({
            "contract": aggregator.address,
            "from": aggregator.owner,
            "request": request,
        });
        self.endpoint
            .post("requestAccessToData", "/contracts/aggregator/request-access", &payload)
            .await
    }

    async fn grant_access_request(&self, contract: &ContractHandle, request_id: &str) -> HarnessResult<()> {
        let payload = json!({
            "contract": contract.address,
            "from": contract.owner,
            "request_id": request_id,
        });
        self.endpoint
            .post_status("grantAccessRequest", "/contracts/access/grant", &payload)
            .await
    }

    async fn check_permissions(&self, contract: &ContractHandle, account: &str, data_id: &str) -> HarnessResult<bool> {
        let payload = json!({
            "contract": contract.address,
            "account": account,
            "data_id": data_id,
        });
        let resp: PermissionsResponse = self
            .endpoint
            .post("checkPermissions", "/contracts/access/permissions", &payload)
            .await?;
        Ok(resp.granted)
    }
}
