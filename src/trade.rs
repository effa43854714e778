//! Trade state machine (spec §4.4): a pure function over a trade record and
//! an incoming signed envelope. No I/O, no clock reads beyond the caller-
//! supplied `now_unix`.

use tracing::{debug, warn};

use crate::crypto;
use crate::envelope::{
    AcceptBody, Body, Kind, LnInvoiceBody, SignedEnvelope, SolClaimedBody, SolEscrowCreatedBody,
    TermsBody,
};
use crate::error::{CoreError, StateError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TradeState {
    Init,
    Terms,
    Accepted,
    Invoice,
    Escrow,
    LnPaid,
    Claimed,
    Cancelled,
    Refunded,
    /// A confirmed on-chain observation contradicted the persisted record
    /// (spec §7 fatal case). No further transitions are legal.
    Inconsistent,
}

impl TradeState {
    fn is_terminal(self) -> bool {
        matches!(
            self,
            TradeState::Claimed | TradeState::Cancelled | TradeState::Refunded | TradeState::Inconsistent
        )
    }
}

/// A trade record, mutated only through [`Trade::apply`].
#[derive(Debug, Clone, PartialEq)]
pub struct Trade {
    pub trade_id: String,
    pub state: TradeState,
    pub terms: Option<TermsBody>,
    pub terms_hash: Option<String>,
    pub invoice: Option<LnInvoiceBody>,
    pub escrow: Option<SolEscrowCreatedBody>,
    pub paid_preimage_hex: Option<String>,
    pub claim: Option<SolClaimedBody>,
    pub counterparty_pubkeys: Vec<String>,
    /// Hashes of every envelope successfully applied so far, for idempotent replay.
    applied_hashes: Vec<String>,
}

impl Trade {
    /// Create a fresh trade in state `INIT` with no bindings (spec §4.4).
    pub fn create_initial(trade_id: impl Into<String>) -> Trade {
        Trade {
            trade_id: trade_id.into(),
            state: TradeState::Init,
            terms: None,
            terms_hash: None,
            invoice: None,
            escrow: None,
            paid_preimage_hex: None,
            claim: None,
            counterparty_pubkeys: Vec::new(),
            applied_hashes: Vec::new(),
        }
    }

    fn record_signer(&mut self, signed: &SignedEnvelope) {
        if !self.counterparty_pubkeys.contains(&signed.signer_pubkey) {
            self.counterparty_pubkeys.push(signed.signer_pubkey.clone());
        }
    }

    /// Apply one signed envelope, returning the resulting trade or a
    /// rejection reason. Never mutates `self`; callers replace their trade
    /// record with the returned value on success.
    pub fn apply(&self, signed: &SignedEnvelope, now_unix: i64) -> Result<Trade, CoreError> {
        let trade_id = signed.trade_id();
        let kind = signed.kind();
        debug!(trade_id, ?kind, from = ?self.state, "applying envelope");

        if trade_id != self.trade_id {
            warn!(trade_id, expected = %self.trade_id, "rejected: wrong trade_id");
            return Err(CoreError::Protocol(crate::error::ProtocolError::WrongTradeId));
        }

        if let Err(err) = crypto::verify(signed) {
            warn!(trade_id, %err, "rejected: signature verification failed");
            return Err(err);
        }

        let envelope_hash = crate::canonical::hash(&signed.unsigned)?;
        if self.applied_hashes.contains(&envelope_hash) {
            // Byte-identical replay is a no-op success (spec §4.4 tie-breaking).
            debug!(trade_id, envelope_hash, "idempotent replay, no-op");
            return Ok(self.clone());
        }

        let mut next = self.clone();
        next.record_signer(signed);

        match (self.state, signed.kind(), &signed.unsigned.body) {
            (TradeState::Init, Kind::Terms, Body::Terms(terms)) => {
                if now_unix >= terms.terms_valid_until_unix {
                    warn!(trade_id, now_unix, "rejected: TERMS past valid_until_unix");
                    return Err(CoreError::State(StateError::StaleExpiry));
                }
                let terms_hash = crate::canonical::hash(&signed.unsigned)?;
                next.terms = Some(terms.clone());
                next.terms_hash = Some(terms_hash);
                next.state = TradeState::Terms;
            }
            (TradeState::Terms, Kind::Accept, Body::Accept(AcceptBody { terms_hash })) => {
                let expected = next.terms_hash.as_deref().unwrap_or_default();
                if terms_hash != expected {
                    warn!(trade_id, "rejected: ACCEPT terms_hash does not match trade");
                    return Err(CoreError::State(StateError::MismatchedBinding(
                        "terms_hash".to_string(),
                    )));
                }
                next.state = TradeState::Accepted;
            }
            (TradeState::Accepted, Kind::LnInvoice, Body::LnInvoice(invoice)) => {
                next.invoice = Some(invoice.clone());
                next.state = TradeState::Invoice;
            }
            (TradeState::Invoice, Kind::SolEscrowCreated, Body::SolEscrowCreated(escrow)) => {
                let invoice = next
                    .invoice
                    .as_ref()
                    .ok_or_else(|| CoreError::State(StateError::IllegalTransition))?;
                if escrow.payment_hash_hex != invoice.payment_hash_hex {
                    warn!(trade_id, "rejected: SOL_ESCROW_CREATED payment_hash does not match invoice");
                    return Err(CoreError::State(StateError::MismatchedBinding(
                        "payment_hash_hex".to_string(),
                    )));
                }
                let terms = next
                    .terms
                    .as_ref()
                    .ok_or_else(|| CoreError::State(StateError::IllegalTransition))?;
                if let Err(err) = check_escrow_matches_terms(escrow, terms) {
                    warn!(trade_id, %err, "rejected: escrow fields do not match terms");
                    return Err(err);
                }
                next.escrow = Some(escrow.clone());
                next.state = TradeState::Escrow;
            }
            (TradeState::Escrow, Kind::LnPaid, Body::LnPaid(paid)) => {
                let escrow = next
                    .escrow
                    .as_ref()
                    .ok_or_else(|| CoreError::State(StateError::IllegalTransition))?;
                if paid.payment_hash_hex != escrow.payment_hash_hex {
                    warn!(trade_id, "rejected: LN_PAID payment_hash does not match escrow");
                    return Err(CoreError::State(StateError::MismatchedBinding(
                        "payment_hash_hex".to_string(),
                    )));
                }
                next.paid_preimage_hex = paid.preimage_hex.clone();
                next.state = TradeState::LnPaid;
            }
            (TradeState::LnPaid, Kind::SolClaimed, Body::SolClaimed(claim)) => {
                let escrow = next
                    .escrow
                    .as_ref()
                    .ok_or_else(|| CoreError::State(StateError::IllegalTransition))?;
                if claim.payment_hash_hex != escrow.payment_hash_hex {
                    warn!(trade_id, "rejected: SOL_CLAIMED payment_hash does not match escrow");
                    return Err(CoreError::State(StateError::MismatchedBinding(
                        "payment_hash_hex".to_string(),
                    )));
                }
                if claim.escrow_pda != escrow.escrow_pda {
                    warn!(trade_id, "rejected: SOL_CLAIMED escrow_pda does not match escrow");
                    return Err(CoreError::State(StateError::MismatchedBinding(
                        "escrow_pda".to_string(),
                    )));
                }
                next.claim = Some(claim.clone());
                next.state = TradeState::Claimed;
            }
            (from, Kind::Cancel, Body::Cancel(_)) if !from.is_terminal() => {
                next.state = TradeState::Cancelled;
            }
            (TradeState::Init, Kind::Terms, _) => {
                warn!(trade_id, "rejected: illegal transition from INIT");
                return Err(CoreError::State(StateError::IllegalTransition));
            }
            _ => {
                if self.state == TradeState::Terms && signed.kind() == Kind::Terms {
                    warn!(trade_id, "rejected: duplicate TERMS");
                    return Err(CoreError::State(StateError::DuplicateTerms));
                }
                warn!(trade_id, from = ?self.state, ?kind, "rejected: illegal transition");
                return Err(CoreError::State(StateError::IllegalTransition));
            }
        }

        debug!(trade_id, to = ?next.state, "transition applied");
        next.applied_hashes.push(envelope_hash);
        Ok(next)
    }

    /// Observe an on-chain refund of this trade's escrow. Not an envelope
    /// application: the refund is a chain fact, observed rather than sent
    /// by a peer, but it still moves the trade into a terminal state.
    pub fn observe_refund(&self, now_unix: i64) -> Result<Trade, CoreError> {
        let trade_id = self.trade_id.as_str();
        if self.state != TradeState::Escrow && self.state != TradeState::LnPaid {
            warn!(trade_id, from = ?self.state, "rejected: refund observed from non-funded state");
            return Err(CoreError::State(StateError::IllegalTransition));
        }
        let escrow = self
            .escrow
            .as_ref()
            .ok_or(CoreError::State(StateError::IllegalTransition))?;
        if now_unix < escrow.refund_after_unix {
            warn!(trade_id, now_unix, refund_after_unix = escrow.refund_after_unix, "rejected: refund observed before timeout");
            return Err(CoreError::Verification(
                crate::error::VerificationError::EscrowTimeTooTight,
            ));
        }
        let mut next = self.clone();
        next.state = TradeState::Refunded;
        debug!(trade_id, "transition applied: REFUNDED");
        Ok(next)
    }
}

fn check_escrow_matches_terms(
    escrow: &SolEscrowCreatedBody,
    terms: &TermsBody,
) -> Result<(), CoreError> {
    if escrow.amount != terms.usdt_amount
        || escrow.mint != terms.sol_mint
        || escrow.recipient != terms.sol_recipient
        || escrow.refund != terms.sol_refund
        || escrow.refund_after_unix != terms.sol_refund_after_unix
    {
        return Err(CoreError::State(StateError::MismatchedBinding(
            "escrow fields do not match terms".to_string(),
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::envelope::{
        AcceptBody, Body, CancelBody, Kind, LnInvoiceBody, LnPaidBody, SolEscrowCreatedBody,
        TermsBody, UnsignedEnvelope,
    };
    use ed25519_dalek::SigningKey;
    use rand::rngs::OsRng;

    fn signer() -> SigningKey {
        SigningKey::generate(&mut OsRng)
    }

    fn envelope(trade_id: &str, kind: Kind, body: Body, key: &SigningKey) -> SignedEnvelope {
        let unsigned = UnsignedEnvelope {
            v: 1,
            kind,
            trade_id: trade_id.to_string(),
            body,
        };
        crypto::sign(unsigned, key).unwrap()
    }

    fn sample_terms(valid_until: i64) -> TermsBody {
        TermsBody {
            pair: "BTC_LN/USDT_SOL".to_string(),
            direction: "BTC_LN->USDT_SOL".to_string(),
            btc_sats: 50_000,
            usdt_amount: "100000000".to_string(),
            usdt_decimals: 6,
            sol_mint: "mint1".to_string(),
            sol_recipient: "recipient1".to_string(),
            sol_refund: "refund1".to_string(),
            sol_refund_after_unix: 1_700_003_600,
            ln_receiver_peer: "peerA".to_string(),
            ln_payer_peer: "peerB".to_string(),
            terms_valid_until_unix: valid_until,
        }
    }

    #[test]
    fn happy_path_reaches_claimed() {
        let key = signer();
        let trade = Trade::create_initial("t1");

        let terms_env = envelope(
            "t1",
            Kind::Terms,
            Body::Terms(sample_terms(1_700_003_000)),
            &key,
        );
        let trade = trade.apply(&terms_env, 1_700_000_000).unwrap();
        assert_eq!(trade.state, TradeState::Terms);
        let terms_hash = trade.terms_hash.clone().unwrap();

        let accept_env = envelope(
            "t1",
            Kind::Accept,
            Body::Accept(AcceptBody { terms_hash }),
            &key,
        );
        let trade = trade.apply(&accept_env, 1_700_000_001).unwrap();
        assert_eq!(trade.state, TradeState::Accepted);

        let payment_hash = "a".repeat(64);
        let invoice_env = envelope(
            "t1",
            Kind::LnInvoice,
            Body::LnInvoice(LnInvoiceBody {
                bolt11: "lnbc1...".to_string(),
                payment_hash_hex: payment_hash.clone(),
                amount_msat: "50000000".to_string(),
            }),
            &key,
        );
        let trade = trade.apply(&invoice_env, 1_700_000_002).unwrap();
        assert_eq!(trade.state, TradeState::Invoice);

        let escrow_env = envelope(
            "t1",
            Kind::SolEscrowCreated,
            Body::SolEscrowCreated(SolEscrowCreatedBody {
                payment_hash_hex: payment_hash.clone(),
                program_id: "prog1".to_string(),
                escrow_pda: "pda1".to_string(),
                vault_ata: "vault1".to_string(),
                mint: "mint1".to_string(),
                amount: "100000000".to_string(),
                refund_after_unix: 1_700_003_600,
                recipient: "recipient1".to_string(),
                refund: "refund1".to_string(),
                tx_sig: "sig1".to_string(),
            }),
            &key,
        );
        let trade = trade.apply(&escrow_env, 1_700_000_003).unwrap();
        assert_eq!(trade.state, TradeState::Escrow);

        let preimage_hex = "b".repeat(64);
        let paid_env = envelope(
            "t1",
            Kind::LnPaid,
            Body::LnPaid(LnPaidBody {
                payment_hash_hex: payment_hash.clone(),
                preimage_hex: Some(preimage_hex),
            }),
            &key,
        );
        let trade = trade.apply(&paid_env, 1_700_000_004).unwrap();
        assert_eq!(trade.state, TradeState::LnPaid);

        let claimed_env = envelope(
            "t1",
            Kind::SolClaimed,
            Body::SolClaimed(SolClaimedBody {
                payment_hash_hex: payment_hash,
                escrow_pda: "pda1".to_string(),
                tx_sig: "sig2".to_string(),
            }),
            &key,
        );
        let trade = trade.apply(&claimed_env, 1_700_000_005).unwrap();
        assert_eq!(trade.state, TradeState::Claimed);
    }

    #[test]
    fn stale_terms_rejected() {
        let key = signer();
        let trade = Trade::create_initial("t1");
        let terms_env = envelope(
            "t1",
            Kind::Terms,
            Body::Terms(sample_terms(1_699_999_999)),
            &key,
        );
        let err = trade.apply(&terms_env, 1_700_000_000).unwrap_err();
        assert!(matches!(err, CoreError::State(StateError::StaleExpiry)));
    }

    #[test]
    fn duplicate_terms_rejected() {
        let key = signer();
        let trade = Trade::create_initial("t1");
        let terms_env = envelope(
            "t1",
            Kind::Terms,
            Body::Terms(sample_terms(1_700_003_000)),
            &key,
        );
        let trade = trade.apply(&terms_env, 1_700_000_000).unwrap();

        let mut other_terms = sample_terms(1_700_003_000);
        other_terms.btc_sats = 60_000;
        let terms_env2 = envelope("t1", Kind::Terms, Body::Terms(other_terms), &key);
        let err = trade.apply(&terms_env2, 1_700_000_001).unwrap_err();
        assert!(matches!(err, CoreError::State(StateError::DuplicateTerms)));
    }

    #[test]
    fn idempotent_replay_is_noop() {
        let key = signer();
        let trade = Trade::create_initial("t1");
        let terms_env = envelope(
            "t1",
            Kind::Terms,
            Body::Terms(sample_terms(1_700_003_000)),
            &key,
        );
        let once = trade.apply(&terms_env, 1_700_000_000).unwrap();
        let twice = once.apply(&terms_env, 1_700_000_000).unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn wrong_trade_id_rejected() {
        let key = signer();
        let trade = Trade::create_initial("t1");
        let terms_env = envelope(
            "t2",
            Kind::Terms,
            Body::Terms(sample_terms(1_700_003_000)),
            &key,
        );
        let err = trade.apply(&terms_env, 1_700_000_000).unwrap_err();
        assert!(matches!(
            err,
            CoreError::Protocol(crate::error::ProtocolError::WrongTradeId)
        ));
    }

    #[test]
    fn cancel_from_any_nonterminal_state_succeeds() {
        let key = signer();
        let trade = Trade::create_initial("t1");
        let cancel_env = envelope(
            "t1",
            Kind::Cancel,
            Body::Cancel(CancelBody {
                reason: "changed my mind".to_string(),
            }),
            &key,
        );
        let trade = trade.apply(&cancel_env, 1_700_000_000).unwrap();
        assert_eq!(trade.state, TradeState::Cancelled);
    }

    #[test]
    fn out_of_order_envelope_is_illegal_transition() {
        let key = signer();
        let trade = Trade::create_initial("t1");
        let accept_env = envelope(
            "t1",
            Kind::Accept,
            Body::Accept(AcceptBody {
                terms_hash: "x".repeat(64),
            }),
            &key,
        );
        let err = trade.apply(&accept_env, 1_700_000_000).unwrap_err();
        assert!(matches!(err, CoreError::State(StateError::IllegalTransition)));
    }
}
