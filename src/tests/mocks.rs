//! In-memory collaborators with call counters and failure injection.

use async_trait::async_trait;
use std::collections::HashSet;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::config::{BenchmarkConfig, KFRAG_SIZE};
use crate::error::{HarnessError, HarnessResult};
use crate::external::types::*;
use crate::external::{AuthService, BrokerService, Ledger};
use crate::topology::provisioner::{provision, Population};
use crate::topology::registry::Topology;

#[derive(Debug, Default)]
pub struct CallLog {
    calls: Mutex<Vec<&'static str>>,
}

impl CallLog {
    fn push(&self, op: &'static str) {
        self.calls.lock().unwrap().push(op);
    }

    pub fn count(&self, op: &str) -> usize {
        self.calls.lock().unwrap().iter().filter(|c| **c == op).count()
    }

    pub fn total(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn reset(&self) {
        self.calls.lock().unwrap().clear();
    }
}

/// Auth double: "encryption" is the identity and signatures are the signed
/// bytes, which is enough for every round trip to check out.
#[derive(Debug)]
pub struct MockAuth {
    label: String,
    issued: AtomicUsize,
    pub calls: CallLog,
    /// Number of upcoming splits that return a truncated fragment.
    pub bad_splits: AtomicUsize,
    pub reject_signatures: AtomicBool,
    pub fail_refresh: AtomicBool,
    /// Delay applied to every `generateKeyFragments` call.
    split_delay: Mutex<Option<Duration>>,
}

impl MockAuth {
    pub fn new(label: &str) -> Self {
        Self {
            label: label.to_string(),
            issued: AtomicUsize::new(0),
            calls: CallLog::default(),
            bad_splits: AtomicUsize::new(0),
            reject_signatures: AtomicBool::new(false),
            fail_refresh: AtomicBool::new(false),
            split_delay: Mutex::new(None),
        }
    }

    pub fn slow_splits(&self, delay: Duration) {
        *self.split_delay.lock().unwrap() = Some(delay);
    }

    fn next_keypair(&self, kind: &str) -> Keypair {
        let n = self.issued.fetch_add(1, Ordering::SeqCst);
        Keypair {
            pk: format!("{}-{}-pk-{}", self.label, kind, n).into_bytes(),
            sk: format!("{}-{}-sk-{}", self.label, kind, n).into_bytes(),
        }
    }
}

#[async_trait]
impl AuthService for MockAuth {
    async fn request_keypair(&self) -> HarnessResult<Keypair> {
        self.calls.push("requestKeypair");
        Ok(self.next_keypair("key"))
    }

    async fn request_signer(&self) -> HarnessResult<Keypair> {
        self.calls.push("requestSigner");
        Ok(self.next_keypair("signer"))
    }

    async fn sign(&self, request: &SignRequest) -> HarnessResult<SignResponse> {
        self.calls.push("sign");
        Ok(SignResponse {
            signature: request.data.clone().into_bytes(),
        })
    }

    async fn verify(&self, request: &VerifyRequest) -> HarnessResult<VerifyResponse> {
        self.calls.push("verify");
        let verified = !self.reject_signatures.load(Ordering::SeqCst) && request.signature == request.data.as_bytes();
        Ok(VerifyResponse { verified })
    }

    async fn encrypt(&self, request: &EncryptRequest) -> HarnessResult<EncryptResponse> {
        self.calls.push("encrypt");
        Ok(EncryptResponse {
            ciphertext: request.plaintext.clone().into_bytes(),
            capsule: request.pk.clone(),
        })
    }

    async fn generate_key_fragments(&self, request: &KeyFragmentsRequest) -> HarnessResult<KeyFragmentsResponse> {
        self.calls.push("generateKeyFragments");
        let delay = *self.split_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let mut kfrags: Vec<Vec<u8>> = (0..request.node_count).map(|i| vec![i as u8; KFRAG_SIZE]).collect();
        let truncate = self
            .bad_splits
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if truncate {
            if let Some(first) = kfrags.first_mut() {
                first.pop();
            }
        }
        Ok(KeyFragmentsResponse { kfrags })
    }

    async fn reencrypt(&self, request: &ReencryptRequest) -> HarnessResult<ReencryptResponse> {
        self.calls.push("reencrypt");
        Ok(ReencryptResponse {
            cfrag: request.kfrag.clone(),
        })
    }

    async fn decrypt(&self, request: &DecryptRequest) -> HarnessResult<DecryptResponse> {
        self.calls.push("decrypt");
        let plaintext = String::from_utf8(request.ciphertext.clone())
            .map_err(|e| HarnessError::collaborator("auth", "decrypt", e))?;
        Ok(DecryptResponse { plaintext })
    }

    async fn key_refresh(&self, _request: &KeyRefreshRequest) -> HarnessResult<()> {
        self.calls.push("keyRefresh");
        if self.fail_refresh.load(Ordering::SeqCst) {
            return Err(HarnessError::Rejected {
                service: "auth",
                operation: "keyRefresh",
                status: 500,
            });
        }
        Ok(())
    }
}

/// Broker double that fails chosen operations for chosen senders.
#[derive(Debug, Default)]
pub struct MockBroker {
    pub calls: CallLog,
    failing: Mutex<HashSet<(&'static str, Vec<u8>)>>,
    /// Delay applied to every `generateReencryptionFragment` call.
    stall: Mutex<Option<Duration>>,
}

impl MockBroker {
    pub fn fail_for(&self, op: &'static str, sender: &[u8]) {
        self.failing.lock().unwrap().insert((op, sender.to_vec()));
    }

    pub fn heal(&self) {
        self.failing.lock().unwrap().clear();
    }

    pub fn stall_generation(&self, delay: Duration) {
        *self.stall.lock().unwrap() = Some(delay);
    }

    fn answer(&self, op: &'static str, sender: &[u8]) -> HarnessResult<()> {
        self.calls.push(op);
        if self.failing.lock().unwrap().contains(&(op, sender.to_vec())) {
            return Err(HarnessError::Rejected {
                service: "broker",
                operation: op,
                status: 503,
            });
        }
        Ok(())
    }
}

#[async_trait]
impl BrokerService for MockBroker {
    async fn store_capsule(&self, request: &StoreCapsuleRequest) -> HarnessResult<()> {
        self.answer("storeCapsule", &request.sender)
    }

    async fn store_key_fragment(&self, request: &StoreKeyFragmentRequest) -> HarnessResult<()> {
        self.answer("storeKeyFragment", &request.sender)
    }

    async fn generate_reencryption_fragment(&self, request: &GenerateFragmentRequest) -> HarnessResult<()> {
        let stall = *self.stall.lock().unwrap();
        if let Some(delay) = stall {
            tokio::time::sleep(delay).await;
        }
        self.answer("generateReencryptionFragment", &request.sender)
    }

    async fn get_reencryption_fragment(&self, request: &FragmentAccessRequest) -> HarnessResult<RetrievedFragment> {
        self.answer("getReencryptionFragment", &request.sender)?;
        Ok(RetrievedFragment {
            result: serde_json::json!({ "cfrag": request.address }),
        })
    }

    async fn check_permissions(&self, request: &FragmentAccessRequest) -> HarnessResult<()> {
        self.answer("checkPermissions", &request.sender)
    }
}

#[derive(Debug, Default)]
pub struct MockLedger {
    pub calls: CallLog,
    pub fail_batch_requests: AtomicBool,
    /// Makes `accounts` come back empty.
    pub no_accounts: AtomicBool,
    /// Paused-clock instants at which batch requests arrived.
    pub requested_at: Mutex<Vec<tokio::time::Instant>>,
    batches: AtomicUsize,
    pub closed: AtomicBool,
}

#[async_trait]
impl Ledger for MockLedger {
    async fn accounts(&self, count: usize) -> HarnessResult<Vec<String>> {
        self.calls.push("accounts");
        if self.no_accounts.load(Ordering::SeqCst) {
            return Ok(Vec::new());
        }
        Ok((0..count).map(|i| format!("0xacct{}", i)).collect())
    }

    async fn derive_address(&self, secret_key: &[u8]) -> HarnessResult<String> {
        self.calls.push("deriveAddress");
        Ok(format!("0x{}", hex::encode(secret_key)))
    }

    async fn transfer(&self, _from: &str, _to: &str, _amount_wei: u128) -> HarnessResult<()> {
        self.calls.push("transfer");
        Ok(())
    }

    async fn deploy_aggregator_contract(&self, owner: &str) -> HarnessResult<ContractHandle> {
        self.calls.push("deployAggregator");
        Ok(ContractHandle {
            address: "0xdao".into(),
            owner: owner.to_string(),
        })
    }

    async fn deploy_access_contract(&self, owner: &str) -> HarnessResult<ContractHandle> {
        self.calls.push("deployAccessContract");
        Ok(ContractHandle {
            address: format!("0xacl-{}", owner),
            owner: owner.to_string(),
        })
    }

    async fn request_access_to_data(
        &self,
        _aggregator: &ContractHandle,
        request: &AccessRequest,
    ) -> HarnessResult<AccessRequestReceipt> {
        self.calls.push("requestAccessToData");
        self.requested_at.lock().unwrap().push(tokio::time::Instant::now());
        if self.fail_batch_requests.load(Ordering::SeqCst) {
            return Err(HarnessError::Ledger("transaction reverted".into()));
        }
        let batch = self.batches.fetch_add(1, Ordering::SeqCst);
        Ok(AccessRequestReceipt {
            request_ids: (0..request.contract_addresses.len())
                .map(|i| format!("req-{}-{}", batch, i))
                .collect(),
            aggregation_id: format!("agg-{}", batch),
        })
    }

    async fn grant_access_request(&self, _contract: &ContractHandle, _request_id: &str) -> HarnessResult<()> {
        self.calls.push("grantAccessRequest");
        Ok(())
    }

    async fn check_permissions(&self, _contract: &ContractHandle, _account: &str, _data_id: &str) -> HarnessResult<bool> {
        self.calls.push("checkPermissions");
        Ok(true)
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

pub struct Fixture {
    pub topology: Topology,
    pub auths: Vec<Arc<MockAuth>>,
    pub brokers: Vec<Arc<MockBroker>>,
    pub coordinator: Arc<MockAuth>,
    pub ledger: Arc<MockLedger>,
}

impl Fixture {
    pub fn new(node_count: usize) -> Self {
        let auths: Vec<Arc<MockAuth>> = (0..node_count)
            .map(|i| Arc::new(MockAuth::new(&format!("node{}", i))))
            .collect();
        let brokers: Vec<Arc<MockBroker>> = (0..node_count).map(|_| Arc::new(MockBroker::default())).collect();
        let coordinator = Arc::new(MockAuth::new("coordinator"));
        let ledger = Arc::new(MockLedger::default());

        let services = auths
            .iter()
            .zip(&brokers)
            .map(|(a, b)| {
                let auth: Arc<dyn AuthService> = a.clone();
                let broker: Arc<dyn BrokerService> = b.clone();
                (auth, broker)
            })
            .collect();
        let topology = Topology::new(services, coordinator.clone(), ledger.clone()).unwrap();

        Self {
            topology,
            auths,
            brokers,
            coordinator,
            ledger,
        }
    }

    /// Broker calls of `op` summed over every node.
    pub fn broker_calls(&self, op: &str) -> usize {
        self.brokers.iter().map(|b| b.calls.count(op)).sum()
    }

    /// Every call any node received, Auth and Broker.
    pub fn node_calls(&self) -> usize {
        self.auths.iter().map(|a| a.calls.total()).sum::<usize>()
            + self.brokers.iter().map(|b| b.calls.total()).sum::<usize>()
    }

    pub fn reset_node_calls(&self) {
        for auth in &self.auths {
            auth.calls.reset();
        }
        for broker in &self.brokers {
            broker.calls.reset();
        }
    }

    pub async fn provision(&self, config: &BenchmarkConfig) -> Population {
        provision(&self.topology, config, 1, Duration::from_secs(1)).await.unwrap()
    }
}

pub fn test_config(output: &Path, entity_count: usize, threshold: usize, node_count: usize) -> BenchmarkConfig {
    BenchmarkConfig {
        entity_count,
        threshold,
        node_count,
        test_runs: 1,
        cycles: 3,
        lambda_ms: 5.0,
        output_dir: output.to_path_buf(),
        key_refresh: true,
        max_kfrag_attempts: 5,
        preflight: false,
        warmup: Duration::ZERO,
        settle: Duration::ZERO,
    }
}
