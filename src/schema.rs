//! Schema validator (spec §4.3): parses the untyped wire form into strongly
//! typed, per-kind envelope bodies, enforcing field presence, integer
//! ranges, string/hex widths, and enum membership as it goes.

use serde_json::{Map, Value};

use crate::envelope::{
    AcceptBody, Body, CancelBody, Kind, LnInvoiceBody, LnPaidBody, QuoteAcceptBody, QuoteBody,
    RawEnvelope, RfqBody, SolClaimedBody, SolEscrowCreatedBody, StatusBody, SwapInviteBody,
    TermsBody, UnsignedEnvelope,
};
use crate::error::{CoreError, ProtocolError};

const VALID_PAIRS: &[&str] = &["BTC_LN/USDT_SOL"];
const VALID_DIRECTIONS: &[&str] = &["BTC_LN->USDT_SOL", "USDT_SOL->BTC_LN"];

fn invalid(msg: impl Into<String>) -> CoreError {
    CoreError::Protocol(ProtocolError::SchemaInvalid(msg.into()))
}

fn is_hex32(s: &str) -> bool {
    s.len() == 64 && s.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase())
}

fn is_atomic_amount(s: &str) -> bool {
    !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit())
}

/// A small cursor over a JSON object that turns missing/mistyped fields into
/// `SchemaInvalid` errors instead of panics or silent defaults.
struct Fields<'a> {
    kind: &'static str,
    obj: &'a Map<String, Value>,
}

impl<'a> Fields<'a> {
    fn new(kind: &'static str, value: &'a Value) -> Result<Self, CoreError> {
        let obj = value
            .as_object()
            .ok_or_else(|| invalid(format!("{kind}: body must be an object")))?;
        Ok(Fields { kind, obj })
    }

    fn get(&self, name: &str) -> Result<&'a Value, CoreError> {
        self.obj
            .get(name)
            .ok_or_else(|| invalid(format!("{}: missing field `{}`", self.kind, name)))
    }

    fn str(&self, name: &str) -> Result<String, CoreError> {
        self.get(name)?
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| invalid(format!("{}: `{}` must be a string", self.kind, name)))
    }

    fn opt_str(&self, name: &str) -> Result<Option<String>, CoreError> {
        match self.obj.get(name) {
            None | Some(Value::Null) => Ok(None),
            Some(v) => Ok(Some(v.as_str().map(str::to_string).ok_or_else(|| {
                invalid(format!("{}: `{}` must be a string", self.kind, name))
            })?)),
        }
    }

    fn u64(&self, name: &str) -> Result<u64, CoreError> {
        self.get(name)?
            .as_u64()
            .ok_or_else(|| invalid(format!("{}: `{}` must be a non-negative integer", self.kind, name)))
    }

    fn i64(&self, name: &str) -> Result<i64, CoreError> {
        self.get(name)?
            .as_i64()
            .ok_or_else(|| invalid(format!("{}: `{}` must be an integer", self.kind, name)))
    }

    fn u8(&self, name: &str) -> Result<u8, CoreError> {
        let n = self.u64(name)?;
        u8::try_from(n).map_err(|_| invalid(format!("{}: `{}` out of range for u8", self.kind, name)))
    }

    fn hex32(&self, name: &str) -> Result<String, CoreError> {
        let s = self.str(name)?;
        if !is_hex32(&s) {
            return Err(invalid(format!(
                "{}: `{}` must be 64 lowercase hex characters",
                self.kind, name
            )));
        }
        Ok(s)
    }

    fn atomic(&self, name: &str) -> Result<String, CoreError> {
        let s = self.str(name)?;
        if !is_atomic_amount(&s) {
            return Err(invalid(format!(
                "{}: `{}` must match ^[0-9]+$",
                self.kind, name
            )));
        }
        Ok(s)
    }

    fn one_of(&self, name: &str, allowed: &[&str]) -> Result<String, CoreError> {
        let s = self.str(name)?;
        if !allowed.contains(&s.as_str()) {
            return Err(invalid(format!(
                "{}: `{}` must be one of {:?}",
                self.kind, name, allowed
            )));
        }
        Ok(s)
    }
}

fn parse_rfq(value: &Value) -> Result<RfqBody, CoreError> {
    let f = Fields::new("RFQ", value)?;
    Ok(RfqBody {
        pair: f.one_of("pair", VALID_PAIRS)?,
        direction: f.one_of("direction", VALID_DIRECTIONS)?,
        btc_sats: f.u64("btc_sats")?,
        usdt_amount: f.atomic("usdt_amount")?,
        valid_until_unix: f.i64("valid_until_unix")?,
    })
}

fn parse_quote(value: &Value) -> Result<QuoteBody, CoreError> {
    let f = Fields::new("QUOTE", value)?;
    Ok(QuoteBody {
        pair: f.one_of("pair", VALID_PAIRS)?,
        direction: f.one_of("direction", VALID_DIRECTIONS)?,
        btc_sats: f.u64("btc_sats")?,
        usdt_amount: f.atomic("usdt_amount")?,
        rfq_id: f.hex32("rfq_id")?,
        valid_until_unix: f.i64("valid_until_unix")?,
    })
}

fn parse_quote_accept(value: &Value) -> Result<QuoteAcceptBody, CoreError> {
    let f = Fields::new("QUOTE_ACCEPT", value)?;
    Ok(QuoteAcceptBody {
        rfq_id: f.hex32("rfq_id")?,
        quote_id: f.hex32("quote_id")?,
    })
}

fn parse_swap_invite(value: &Value) -> Result<SwapInviteBody, CoreError> {
    let f = Fields::new("SWAP_INVITE", value)?;
    Ok(SwapInviteBody {
        rfq_id: f.hex32("rfq_id")?,
        quote_id: f.hex32("quote_id")?,
        swap_channel: f.str("swap_channel")?,
        owner_pubkey: f.str("owner_pubkey")?,
        invite: f.str("invite")?,
        welcome: f.str("welcome")?,
    })
}

fn parse_terms(value: &Value) -> Result<TermsBody, CoreError> {
    let f = Fields::new("TERMS", value)?;
    Ok(TermsBody {
        pair: f.one_of("pair", VALID_PAIRS)?,
        direction: f.one_of("direction", VALID_DIRECTIONS)?,
        btc_sats: f.u64("btc_sats")?,
        usdt_amount: f.atomic("usdt_amount")?,
        usdt_decimals: f.u8("usdt_decimals")?,
        sol_mint: f.str("sol_mint")?,
        sol_recipient: f.str("sol_recipient")?,
        sol_refund: f.str("sol_refund")?,
        sol_refund_after_unix: f.i64("sol_refund_after_unix")?,
        ln_receiver_peer: f.str("ln_receiver_peer")?,
        ln_payer_peer: f.str("ln_payer_peer")?,
        terms_valid_until_unix: f.i64("terms_valid_until_unix")?,
    })
}

fn parse_accept(value: &Value) -> Result<AcceptBody, CoreError> {
    let f = Fields::new("ACCEPT", value)?;
    Ok(AcceptBody {
        terms_hash: f.hex32("terms_hash")?,
    })
}

fn parse_ln_invoice(value: &Value) -> Result<LnInvoiceBody, CoreError> {
    let f = Fields::new("LN_INVOICE", value)?;
    Ok(LnInvoiceBody {
        bolt11: f.str("bolt11")?,
        payment_hash_hex: f.hex32("payment_hash_hex")?,
        amount_msat: f.atomic("amount_msat")?,
    })
}

fn parse_sol_escrow_created(value: &Value) -> Result<SolEscrowCreatedBody, CoreError> {
    let f = Fields::new("SOL_ESCROW_CREATED", value)?;
    Ok(SolEscrowCreatedBody {
        payment_hash_hex: f.hex32("payment_hash_hex")?,
        program_id: f.str("program_id")?,
        escrow_pda: f.str("escrow_pda")?,
        vault_ata: f.str("vault_ata")?,
        mint: f.str("mint")?,
        amount: f.atomic("amount")?,
        refund_after_unix: f.i64("refund_after_unix")?,
        recipient: f.str("recipient")?,
        refund: f.str("refund")?,
        tx_sig: f.str("tx_sig")?,
    })
}

fn parse_ln_paid(value: &Value) -> Result<LnPaidBody, CoreError> {
    let f = Fields::new("LN_PAID", value)?;
    let preimage_hex = f.opt_str("preimage_hex")?;
    if let Some(ref p) = preimage_hex {
        if !is_hex32(p) {
            return Err(invalid("LN_PAID: `preimage_hex` must be 64 lowercase hex characters"));
        }
    }
    Ok(LnPaidBody {
        payment_hash_hex: f.hex32("payment_hash_hex")?,
        preimage_hex,
    })
}

fn parse_sol_claimed(value: &Value) -> Result<SolClaimedBody, CoreError> {
    let f = Fields::new("SOL_CLAIMED", value)?;
    Ok(SolClaimedBody {
        payment_hash_hex: f.hex32("payment_hash_hex")?,
        escrow_pda: f.str("escrow_pda")?,
        tx_sig: f.str("tx_sig")?,
    })
}

fn parse_status(value: &Value) -> Result<StatusBody, CoreError> {
    let f = Fields::new("STATUS", value)?;
    Ok(StatusBody {
        state: f.str("state")?,
        note: f.str("note")?,
    })
}

fn parse_cancel(value: &Value) -> Result<CancelBody, CoreError> {
    let f = Fields::new("CANCEL", value)?;
    Ok(CancelBody {
        reason: f.str("reason")?,
    })
}

/// Parse and validate a raw, untyped envelope into a strongly-typed
/// [`UnsignedEnvelope`]. This is the single entry point downstream code
/// should use; nothing past this function ever inspects untyped JSON again.
pub fn parse_raw(raw: &RawEnvelope) -> Result<UnsignedEnvelope, CoreError> {
    let kind = Kind::from_wire(&raw.kind)
        .ok_or_else(|| CoreError::Protocol(ProtocolError::UnknownKind(raw.kind.clone())))?;

    let body = match kind {
        Kind::Rfq => Body::Rfq(parse_rfq(&raw.body)?),
        Kind::Quote => Body::Quote(parse_quote(&raw.body)?),
        Kind::QuoteAccept => Body::QuoteAccept(parse_quote_accept(&raw.body)?),
        Kind::SwapInvite => Body::SwapInvite(parse_swap_invite(&raw.body)?),
        Kind::Terms => Body::Terms(parse_terms(&raw.body)?),
        Kind::Accept => Body::Accept(parse_accept(&raw.body)?),
        Kind::LnInvoice => Body::LnInvoice(parse_ln_invoice(&raw.body)?),
        Kind::SolEscrowCreated => Body::SolEscrowCreated(parse_sol_escrow_created(&raw.body)?),
        Kind::LnPaid => Body::LnPaid(parse_ln_paid(&raw.body)?),
        Kind::SolClaimed => Body::SolClaimed(parse_sol_claimed(&raw.body)?),
        Kind::Status => Body::Status(parse_status(&raw.body)?),
        Kind::Cancel => Body::Cancel(parse_cancel(&raw.body)?),
    };

    Ok(UnsignedEnvelope {
        v: raw.v,
        kind,
        trade_id: raw.trade_id.clone(),
        body,
    })
}
