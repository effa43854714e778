//! On-chain escrow program semantics (spec §4.4, §6): PDA derivation and an
//! in-memory ledger standing in for the real program's account state, used
//! by the pre-pay verifier and by tests.

use std::collections::BTreeMap;
use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::{CoreError, VerificationError};

/// A 32-byte chain address, opaque to the coordinator beyond equality and hex display.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Pubkey(pub [u8; 32]);

impl Pubkey {
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    pub fn from_hex(s: &str) -> Option<Pubkey> {
        let bytes = hex::decode(s).ok()?;
        let arr: [u8; 32] = bytes.try_into().ok()?;
        Some(Pubkey(arr))
    }
}

/// Derive the escrow PDA for a given program and payment hash.
///
/// This is a stand-in for the real program's `find_program_address`: it is
/// deterministic and collision-resistant but is not claimed to match any
/// specific on-chain program's actual derivation algorithm.
pub fn derive_pda(program_id: &Pubkey, seed: &[u8], payment_hash: &[u8; 32]) -> Pubkey {
    let mut hasher = Sha256::new();
    hasher.update(b"escrow");
    hasher.update(seed);
    hasher.update(payment_hash);
    hasher.update(program_id.0);
    let digest = hasher.finalize();
    let mut out = [0u8; 32];
    out.copy_from_slice(&digest);
    Pubkey(out)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EscrowStatus {
    Funded,
    Claimed,
    Refunded,
}

/// The observable on-chain state of one escrow account.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EscrowAccount {
    pub owner_program: Pubkey,
    pub payment_hash: [u8; 32],
    pub mint: Pubkey,
    pub amount: u128,
    pub recipient: Pubkey,
    pub refund: Pubkey,
    pub refund_after_unix: i64,
    pub status: EscrowStatus,
}

impl EscrowAccount {
    /// Encode this account's state the way it would be read back out of
    /// `AccountInfo.data` by a chain RPC client. The pre-pay verifier
    /// decodes this independently of whatever the counterparty's envelope
    /// claims (spec §4.5 check 3).
    pub fn encode(&self) -> Vec<u8> {
        serde_json::to_vec(self).expect("EscrowAccount always serializes")
    }

    /// Parse raw account data into an `EscrowAccount`. Returns
    /// `EscrowAmountMismatch` on any decode failure — the account does not
    /// hold a value this verifier can reconcile with declared terms.
    pub fn decode(data: &[u8]) -> Result<EscrowAccount, CoreError> {
        serde_json::from_slice(data)
            .map_err(|_| CoreError::Verification(VerificationError::EscrowAmountMismatch))
    }
}

/// An in-memory simulation of the escrow program's account store, keyed by
/// escrow PDA. Production deployments back this with real RPC calls through
/// [`crate::boundary::ChainRpc`]; this ledger exists for tests and local
/// orchestration against a simulated chain.
#[derive(Debug, Default)]
pub struct EscrowLedger {
    accounts: Mutex<BTreeMap<Pubkey, EscrowAccount>>,
}

impl EscrowLedger {
    pub fn new() -> Self {
        EscrowLedger {
            accounts: Mutex::new(BTreeMap::new()),
        }
    }

    /// Create the escrow account at `pda`. Fails if the PDA already exists
    /// (spec §4.6: "Fails if the PDA already exists (no re-funding)").
    pub fn create(&self, pda: Pubkey, account: EscrowAccount) -> Result<(), CoreError> {
        let mut accounts = self.accounts.lock().expect("escrow ledger poisoned");
        if accounts.contains_key(&pda) {
            return Err(CoreError::State(crate::error::StateError::IllegalTransition));
        }
        accounts.insert(pda, account);
        Ok(())
    }

    pub fn get(&self, pda: &Pubkey) -> Option<EscrowAccount> {
        self.accounts.lock().expect("escrow ledger poisoned").get(pda).cloned()
    }

    /// Claim the escrow by revealing a preimage whose SHA-256 matches the
    /// stored payment hash. Succeeds regardless of `refund_after_unix`.
    pub fn claim(&self, pda: &Pubkey, preimage: &[u8; 32]) -> Result<(), CoreError> {
        let mut accounts = self.accounts.lock().expect("escrow ledger poisoned");
        let account = accounts
            .get_mut(pda)
            .ok_or(CoreError::Verification(VerificationError::EscrowMissing))?;
        if account.status != EscrowStatus::Funded {
            return Err(CoreError::State(crate::error::StateError::IllegalTransition));
        }
        let digest = Sha256::digest(preimage);
        if digest.as_slice() != account.payment_hash {
            return Err(CoreError::Verification(VerificationError::PayHashMismatch));
        }
        account.status = EscrowStatus::Claimed;
        Ok(())
    }

    /// Refund the escrow back to its refund address. Permissionless: anyone
    /// may call this once `now_unix >= refund_after_unix` and the escrow is
    /// still `Funded` (spec §4.6 open question, resolved).
    pub fn refund(&self, pda: &Pubkey, now_unix: i64) -> Result<(), CoreError> {
        let mut accounts = self.accounts.lock().expect("escrow ledger poisoned");
        let account = accounts
            .get_mut(pda)
            .ok_or(CoreError::Verification(VerificationError::EscrowMissing))?;
        if account.status != EscrowStatus::Funded {
            return Err(CoreError::State(crate::error::StateError::IllegalTransition));
        }
        if now_unix < account.refund_after_unix {
            return Err(CoreError::Verification(VerificationError::EscrowTimeTooTight));
        }
        account.status = EscrowStatus::Refunded;
        Ok(())
    }
}
