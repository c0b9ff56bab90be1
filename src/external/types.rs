use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A keypair as handed out by the Auth service. Byte strings travel as JSON
/// arrays of numbers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Keypair {
    pub pk: Vec<u8>,
    pub sk: Vec<u8>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EncryptRequest {
    pub plaintext: String,
    pub pk: Vec<u8>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EncryptResponse {
    pub ciphertext: Vec<u8>,
    pub capsule: Vec<u8>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignRequest {
    pub signer: Keypair,
    pub data: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignResponse {
    pub signature: Vec<u8>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerifyRequest {
    pub signature: Vec<u8>,
    pub data: String,
    pub pk: Vec<u8>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerifyResponse {
    pub verified: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeyFragmentsRequest {
    pub sender: Keypair,
    pub signer: Keypair,
    pub receiver: Vec<u8>,
    pub threshold: usize,
    #[serde(rename = "nodes_number")]
    pub node_count: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeyFragmentsResponse {
    pub kfrags: Vec<Vec<u8>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReencryptRequest {
    pub sender: Vec<u8>,
    pub signer: Vec<u8>,
    pub receiver: Vec<u8>,
    pub capsule: Vec<u8>,
    pub kfrag: Vec<u8>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReencryptResponse {
    pub cfrag: Vec<u8>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecryptRequest {
    pub sender: Vec<u8>,
    pub signer: Vec<u8>,
    pub receiver: Keypair,
    pub capsule: Vec<u8>,
    pub ciphertext: Vec<u8>,
    pub cfrags: Vec<Vec<u8>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecryptResponse {
    pub plaintext: String,
}

/// One participant's contribution to a key-refresh ceremony.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeyRefreshRequest {
    pub sid: u64,
    pub parties: usize,
    pub threshold: usize,
    pub dh_point: Vec<u8>,
    pub precursor: Vec<u8>,
    pub delegatee_key: Vec<u8>,
    pub id: String,
    pub sk: Vec<u8>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreCapsuleRequest {
    pub sender: Vec<u8>,
    #[serde(rename = "dataId")]
    pub data_id: String,
    pub capsule: Vec<u8>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreKeyFragmentRequest {
    pub sender: Vec<u8>,
    pub receiver: Vec<u8>,
    pub kfrag: Vec<u8>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerateFragmentRequest {
    pub sender: Vec<u8>,
    pub signer: Vec<u8>,
    #[serde(rename = "dataId")]
    pub data_id: String,
    pub receiver: Vec<u8>,
}

/// Payload shared by `getCFrag` and `checkPermissions`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FragmentAccessRequest {
    pub address: String,
    #[serde(rename = "dataId")]
    pub data_id: String,
    pub sender: Vec<u8>,
    pub signer: Vec<u8>,
    pub signature: Vec<u8>,
    pub receiver: Vec<u8>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RetrievedFragment {
    #[serde(default)]
    pub result: Value,
}

/// Handle to a contract deployed through the ledger gateway.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContractHandle {
    pub address: String,
    pub owner: String,
}

/// Arguments of the aggregator contract's `requestAccessToData`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessRequest {
    pub data_ids: Vec<String>,
    pub contract_addresses: Vec<String>,
    pub signer_addresses: Vec<String>,
    pub reasons: String,
    pub parameters: Vec<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessRequestReceipt {
    pub request_ids: Vec<String>,
    pub aggregation_id: String,
}
