//! Sanity checks run once against a freshly provisioned deployment.

use anyhow::{anyhow, Context, Result};
use log::{info, warn};

use super::engine::WorkflowParams;
use super::fanout::with_timeout;
use crate::config::{DATA_ID, SIGNATURE_CHALLENGE};
use crate::external::types::{
    DecryptRequest, EncryptRequest, FragmentAccessRequest, KeyFragmentsRequest, ReencryptRequest, SignRequest,
    VerifyRequest,
};
use crate::scheduler::arrival::ascii_to_hex;
use crate::topology::provisioner::Population;
use crate::topology::registry::Topology;

const PROBE_PLAINTEXT: &str = "preflight probe";

/// Proves the deployment works end to end before any cycle is timed.
///
/// A PRE round trip through node 0 and the aggregator's signature must both
/// check out; permission queries are only logged.
pub async fn preflight(topology: &Topology, population: &Population, params: &WorkflowParams) -> Result<()> {
    let timeout = params.call_timeout;
    let auth = topology.node(0).auth.as_ref();

    let sender = with_timeout("requestKeypair", timeout, auth.request_keypair()).await?;
    let signer = with_timeout("requestSigner", timeout, auth.request_signer()).await?;
    let receiver = with_timeout("requestKeypair", timeout, auth.request_keypair()).await?;

    let encrypted = with_timeout(
        "encrypt",
        timeout,
        auth.encrypt(&EncryptRequest {
            plaintext: PROBE_PLAINTEXT.to_string(),
            pk: sender.pk.clone(),
        }),
    )
    .await?;

    let split = with_timeout(
        "generateKeyFragments",
        timeout,
        auth.generate_key_fragments(&KeyFragmentsRequest {
            sender: sender.clone(),
            signer: signer.clone(),
            receiver: receiver.pk.clone(),
            threshold: params.threshold,
            node_count: params.node_count,
        }),
    )
    .await?;
    if split.kfrags.len() < params.threshold {
        return Err(anyhow!(
            "Preflight split returned {} fragments, threshold is {}",
            split.kfrags.len(),
            params.threshold
        ));
    }

    let mut cfrags = Vec::with_capacity(params.threshold);
    for kfrag in split.kfrags.iter().take(params.threshold) {
        let reencrypted = with_timeout(
            "reencrypt",
            timeout,
            auth.reencrypt(&ReencryptRequest {
                sender: sender.pk.clone(),
                signer: signer.pk.clone(),
                receiver: receiver.pk.clone(),
                capsule: encrypted.capsule.clone(),
                kfrag: kfrag.clone(),
            }),
        )
        .await?;
        cfrags.push(reencrypted.cfrag);
    }

    let decrypted = with_timeout(
        "decrypt",
        timeout,
        auth.decrypt(&DecryptRequest {
            sender: sender.pk.clone(),
            signer: signer.pk.clone(),
            receiver: receiver.clone(),
            capsule: encrypted.capsule.clone(),
            ciphertext: encrypted.ciphertext.clone(),
            cfrags,
        }),
    )
    .await
    .context("Preflight decryption failed")?;
    if decrypted.plaintext != PROBE_PLAINTEXT {
        return Err(anyhow!(
            "Preflight round trip mismatch: decrypted '{}', expected '{}'",
            decrypted.plaintext,
            PROBE_PLAINTEXT
        ));
    }
    info!("Preflight: re-encryption round trip with {} fragments ok", params.threshold);

    let aggregator = &population.aggregator;
    let signed = with_timeout(
        "sign",
        timeout,
        auth.sign(&SignRequest {
            signer: aggregator.signer.clone(),
            data: SIGNATURE_CHALLENGE.to_string(),
        }),
    )
    .await?;
    let verified = with_timeout(
        "verify",
        timeout,
        auth.verify(&VerifyRequest {
            signature: signed.signature.clone(),
            data: SIGNATURE_CHALLENGE.to_string(),
            pk: aggregator.signer.pk.clone(),
        }),
    )
    .await?;
    if !verified.verified {
        return Err(anyhow!("Preflight: aggregator signature did not verify"));
    }
    info!("Preflight: aggregator signature verified");

    if let Some(entity) = population.entities.first() {
        let broker = topology.node(0).broker.as_ref();
        let request = FragmentAccessRequest {
            address: entity.contract.address.clone(),
            data_id: DATA_ID.to_string(),
            sender: entity.keypair.pk.clone(),
            signer: aggregator.signer.pk.clone(),
            signature: signed.signature,
            receiver: aggregator.keypair.pk.clone(),
        };
        match with_timeout("checkPermissions", timeout, broker.check_permissions(&request)).await {
            Ok(()) => info!("Preflight: broker permissions for bob {} ok", entity.index),
            Err(e) => warn!("Preflight: broker permissions for bob {}: {}", entity.index, e),
        }

        let data_id = ascii_to_hex(DATA_ID);
        let ledger = topology.ledger();
        match with_timeout(
            "checkPermissions",
            timeout,
            ledger.check_permissions(&entity.contract, &aggregator.signer_account, &data_id),
        )
        .await
        {
            Ok(granted) => info!("Preflight: ledger permission for bob {}: {}", entity.index, granted),
            Err(e) => warn!("Preflight: ledger permission query for bob {} failed: {}", entity.index, e),
        }
    }

    Ok(())
}
