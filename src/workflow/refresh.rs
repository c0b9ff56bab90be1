//! Sequential key-refresh ceremony.
//!
//! Models a multi-party refresh of the delegated key: each participant
//! contributes its secret share in turn against the same node, so the calls
//! are issued one after another rather than fanned out.

use rand::Rng;
use std::time::Duration;

use super::fanout::with_timeout;
use crate::config;
use crate::error::{HarnessError, HarnessResult};
use crate::external::types::KeyRefreshRequest;
use crate::external::AuthService;

/// Upper bound (exclusive) of the random part of a session id.
const SESSION_NONCE_BOUND: u64 = 1 << 52;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefreshParticipant {
    pub id: String,
    pub secret_share: Vec<u8>,
}

#[derive(Debug, Clone)]
pub struct RefreshCeremony {
    pub threshold: usize,
    pub dh_point: Vec<u8>,
    pub precursor: Vec<u8>,
    pub delegatee_key: Vec<u8>,
    pub participants: Vec<RefreshParticipant>,
}

impl RefreshCeremony {
    /// The five-party ceremony the benchmark ships with, run at the
    /// benchmark's own threshold.
    pub fn reference(threshold: usize) -> HarnessResult<Self> {
        let decode = |what: &str, hex_str: &str| {
            hex::decode(hex_str).map_err(|e| HarnessError::Config(format!("bad {} in refresh defaults: {}", what, e)))
        };
        let participants = config::REFRESH_PARTICIPANTS
            .iter()
            .map(|(id, sk)| -> HarnessResult<RefreshParticipant> {
                Ok(RefreshParticipant {
                    id: (*id).to_string(),
                    secret_share: decode("secret share", *sk)?,
                })
            })
            .collect::<HarnessResult<Vec<_>>>()?;

        Ok(Self {
            threshold,
            dh_point: decode("dh point", config::REFRESH_DH_POINT_HEX)?,
            precursor: decode("precursor", config::REFRESH_PRECURSOR_HEX)?,
            delegatee_key: decode("delegatee key", config::REFRESH_DELEGATEE_KEY_HEX)?,
            participants,
        })
    }

    pub fn parties(&self) -> usize {
        self.participants.len()
    }

    /// Session id unique to an (entity, cycle) pair with high probability.
    pub fn session_id<R: Rng + ?Sized>(cycle: u32, entity: usize, rng: &mut R) -> u64 {
        u64::from(cycle) * 1000 + entity as u64 + rng.gen_range(0, SESSION_NONCE_BOUND)
    }

    pub fn request_for(&self, session_id: u64, participant: &RefreshParticipant) -> KeyRefreshRequest {
        KeyRefreshRequest {
            sid: session_id,
            parties: self.parties(),
            threshold: self.threshold,
            dh_point: self.dh_point.clone(),
            precursor: self.precursor.clone(),
            delegatee_key: self.delegatee_key.clone(),
            id: participant.id.clone(),
            sk: participant.secret_share.clone(),
        }
    }

    /// Runs every participant's refresh call against `auth`, in order,
    /// stopping at the first failure.
    pub async fn run(&self, auth: &dyn AuthService, session_id: u64, call_timeout: Duration) -> HarnessResult<()> {
        for participant in &self.participants {
            let request = self.request_for(session_id, participant);
            with_timeout("keyRefresh", call_timeout, auth.key_refresh(&request)).await?;
        }
        Ok(())
    }
}
