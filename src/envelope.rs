//! Envelope types (spec §3, §4.2, §4.3): the append-only, verifiable message
//! format carried over the untrusted sidechannel transport.

use serde::{Deserialize, Serialize};

/// The complete, closed set of envelope kinds (spec §6).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Kind {
    #[serde(rename = "RFQ")]
    Rfq,
    #[serde(rename = "QUOTE")]
    Quote,
    #[serde(rename = "QUOTE_ACCEPT")]
    QuoteAccept,
    #[serde(rename = "SWAP_INVITE")]
    SwapInvite,
    #[serde(rename = "TERMS")]
    Terms,
    #[serde(rename = "ACCEPT")]
    Accept,
    #[serde(rename = "LN_INVOICE")]
    LnInvoice,
    #[serde(rename = "SOL_ESCROW_CREATED")]
    SolEscrowCreated,
    #[serde(rename = "LN_PAID")]
    LnPaid,
    #[serde(rename = "SOL_CLAIMED")]
    SolClaimed,
    #[serde(rename = "STATUS")]
    Status,
    #[serde(rename = "CANCEL")]
    Cancel,
}

impl Kind {
    /// Parse a kind from its wire string, used by the schema validator before
    /// any strongly-typed body parsing has happened.
    pub fn from_wire(s: &str) -> Option<Kind> {
        Some(match s {
            "RFQ" => Kind::Rfq,
            "QUOTE" => Kind::Quote,
            "QUOTE_ACCEPT" => Kind::QuoteAccept,
            "SWAP_INVITE" => Kind::SwapInvite,
            "TERMS" => Kind::Terms,
            "ACCEPT" => Kind::Accept,
            "LN_INVOICE" => Kind::LnInvoice,
            "SOL_ESCROW_CREATED" => Kind::SolEscrowCreated,
            "LN_PAID" => Kind::LnPaid,
            "SOL_CLAIMED" => Kind::SolClaimed,
            "STATUS" => Kind::Status,
            "CANCEL" => Kind::Cancel,
            _ => return None,
        })
    }

    pub fn as_wire(&self) -> &'static str {
        match self {
            Kind::Rfq => "RFQ",
            Kind::Quote => "QUOTE",
            Kind::QuoteAccept => "QUOTE_ACCEPT",
            Kind::SwapInvite => "SWAP_INVITE",
            Kind::Terms => "TERMS",
            Kind::Accept => "ACCEPT",
            Kind::LnInvoice => "LN_INVOICE",
            Kind::SolEscrowCreated => "SOL_ESCROW_CREATED",
            Kind::LnPaid => "LN_PAID",
            Kind::SolClaimed => "SOL_CLAIMED",
            Kind::Status => "STATUS",
            Kind::Cancel => "CANCEL",
        }
    }
}

/// `RFQ` body: request for quote.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RfqBody {
    pub pair: String,
    pub direction: String,
    pub btc_sats: u64,
    pub usdt_amount: String,
    pub valid_until_unix: i64,
}

/// `QUOTE` body: RFQ fields plus a reference to the originating RFQ.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuoteBody {
    pub pair: String,
    pub direction: String,
    pub btc_sats: u64,
    pub usdt_amount: String,
    pub rfq_id: String,
    pub valid_until_unix: i64,
}

/// `QUOTE_ACCEPT` body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuoteAcceptBody {
    pub rfq_id: String,
    pub quote_id: String,
}

/// `SWAP_INVITE` body: carries the sidechannel join capability.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SwapInviteBody {
    pub rfq_id: String,
    pub quote_id: String,
    pub swap_channel: String,
    pub owner_pubkey: String,
    pub invite: String,
    pub welcome: String,
}

/// `TERMS` body: the negotiated trade terms, immutable once accepted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TermsBody {
    pub pair: String,
    pub direction: String,
    pub btc_sats: u64,
    pub usdt_amount: String,
    pub usdt_decimals: u8,
    pub sol_mint: String,
    pub sol_recipient: String,
    pub sol_refund: String,
    pub sol_refund_after_unix: i64,
    pub ln_receiver_peer: String,
    pub ln_payer_peer: String,
    pub terms_valid_until_unix: i64,
}

/// `ACCEPT` body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AcceptBody {
    pub terms_hash: String,
}

/// `LN_INVOICE` body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LnInvoiceBody {
    pub bolt11: String,
    pub payment_hash_hex: String,
    pub amount_msat: String,
}

/// `SOL_ESCROW_CREATED` body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SolEscrowCreatedBody {
    pub payment_hash_hex: String,
    pub program_id: String,
    pub escrow_pda: String,
    pub vault_ata: String,
    pub mint: String,
    pub amount: String,
    pub refund_after_unix: i64,
    pub recipient: String,
    pub refund: String,
    pub tx_sig: String,
}

/// `LN_PAID` body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LnPaidBody {
    pub payment_hash_hex: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub preimage_hex: Option<String>,
}

/// `SOL_CLAIMED` body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SolClaimedBody {
    pub payment_hash_hex: String,
    pub escrow_pda: String,
    pub tx_sig: String,
}

/// `STATUS` body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusBody {
    pub state: String,
    pub note: String,
}

/// `CANCEL` body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CancelBody {
    pub reason: String,
}

/// A strongly-typed envelope body. Serialization is untagged: the wrapping
/// [`Kind`] on the envelope itself is the discriminant, so the body on the
/// wire is exactly the kind-specific field set with no extra tag key.
/// Deserialization of `Body` directly is for tests and round-trips only —
/// production parsing always goes through [`crate::schema::parse_raw`],
/// which is kind-directed and field-validating rather than best-effort.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Body {
    Rfq(RfqBody),
    Quote(QuoteBody),
    QuoteAccept(QuoteAcceptBody),
    SwapInvite(SwapInviteBody),
    Terms(TermsBody),
    Accept(AcceptBody),
    LnInvoice(LnInvoiceBody),
    SolEscrowCreated(SolEscrowCreatedBody),
    LnPaid(LnPaidBody),
    SolClaimed(SolClaimedBody),
    Status(StatusBody),
    Cancel(CancelBody),
}

/// An unsigned envelope: the canonical, hashable unit (spec §3).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnsignedEnvelope {
    pub v: u32,
    pub kind: Kind,
    pub trade_id: String,
    pub body: Body,
}

/// The wire form before schema validation: `body` is untyped JSON so the
/// schema validator (spec §4.3) can apply per-kind field checks before any
/// strongly-typed value exists.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawEnvelope {
    pub v: u32,
    pub kind: String,
    pub trade_id: String,
    pub body: serde_json::Value,
    pub signer_pubkey: String,
    pub signature: String,
}

/// A signed envelope: an unsigned envelope plus a detached Ed25519 signature
/// over `encode_canonical(unsigned)` (spec §3, §4.2).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignedEnvelope {
    #[serde(flatten)]
    pub unsigned: UnsignedEnvelope,
    pub signer_pubkey: String,
    pub signature: String,
}

impl SignedEnvelope {
    pub fn kind(&self) -> Kind {
        self.unsigned.kind
    }

    pub fn trade_id(&self) -> &str {
        &self.unsigned.trade_id
    }
}
