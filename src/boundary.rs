//! Boundary traits for external collaborators (spec §6): the sidechannel
//! transport, the chain RPC client, and the Lightning node. These are
//! typed interfaces only — no concrete network client ships in this core,
//! matching the spec's explicit out-of-scope boundary.

use async_trait::async_trait;

use crate::error::TransportError;

/// A signed record declaring a channel's owner (spec §3). Opaque at this
/// boundary: the core only passes it through to the sidechannel transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Welcome(pub Vec<u8>);

/// A signed record granting a specific invitee public key permission to
/// join a channel within a TTL (spec §3). Opaque at this boundary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invite(pub Vec<u8>);

/// An observed account on the settlement chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountInfo {
    pub owner: String,
    pub data: Vec<u8>,
}

/// An observed token account balance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenAccountInfo {
    pub amount: u128,
    pub mint: String,
}

/// The settlement chain RPC surface the pre-pay verifier depends on
/// (spec §6). Implementations talk to a real node; this crate only
/// defines the seam.
#[async_trait]
pub trait ChainRpc: Send + Sync {
    async fn get_account(&self, pubkey: &str) -> Result<Option<AccountInfo>, TransportError>;
    async fn send_tx(&self, signed_tx: &[u8]) -> Result<String, TransportError>;
    async fn confirm(&self, sig: &str) -> Result<(), TransportError>;
    async fn get_token_account(&self, ata: &str) -> Result<Option<TokenAccountInfo>, TransportError>;
}

/// A created Lightning invoice.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvoiceHandle {
    pub bolt11: String,
    pub payment_hash_hex: String,
}

/// A settled payment's revealed preimage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentResult {
    pub payment_preimage_hex: String,
}

/// The Lightning node RPC surface (spec §6). Hodl invoices and MPP flows
/// are explicitly out of scope; implementations must not offer them.
#[async_trait]
pub trait LightningRpc: Send + Sync {
    async fn invoice(
        &self,
        amount_sat: u64,
        label: &str,
        desc: &str,
    ) -> Result<InvoiceHandle, TransportError>;
    async fn pay(&self, bolt11: &str) -> Result<PaymentResult, TransportError>;
}

/// A message observed on a subscribed sidechannel topic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SidechannelMessage {
    pub channel: String,
    pub message: Vec<u8>,
}

/// The pub/sub sidechannel transport (spec §6): invite-gated admission,
/// with a welcome-gated-but-not-invite-gated public RFQ rendezvous channel.
#[async_trait]
pub trait Sidechannel: Send + Sync {
    async fn subscribe(&self, channels: &[String]) -> Result<(), TransportError>;
    async fn join(
        &self,
        channel: &str,
        invite: Option<&Invite>,
        welcome: Option<&Welcome>,
    ) -> Result<(), TransportError>;
    async fn send(
        &self,
        channel: &str,
        message: &[u8],
        invite: Option<&Invite>,
    ) -> Result<(), TransportError>;
    /// Pull the next delivered message, if any is queued.
    async fn recv(&self) -> Result<Option<SidechannelMessage>, TransportError>;
}
