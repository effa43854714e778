//! Pre-pay verifier (spec §4.5): the critical safety rule. Proves, via the
//! chain RPC, that an on-chain escrow exactly satisfies the negotiated
//! terms before the client is allowed to broadcast a Lightning payment.

use tracing::{debug, warn};

use crate::boundary::ChainRpc;
use crate::config::CoordinatorConfig;
use crate::envelope::{LnInvoiceBody, SolEscrowCreatedBody, TermsBody};
use crate::error::{CoreError, VerificationError};
use crate::escrow::{derive_pda, EscrowAccount, EscrowStatus, Pubkey};

/// Run all six pre-pay checks. Returns `Ok(())` only if every one holds; the
/// client may then call `pay(bolt11)`. Any failure means refuse to pay.
pub async fn verify_prepay(
    terms: &TermsBody,
    invoice: &LnInvoiceBody,
    escrow: &SolEscrowCreatedBody,
    chain: &dyn ChainRpc,
    config: &CoordinatorConfig,
    now_unix: i64,
) -> Result<(), CoreError> {
    // 1. invoice and escrow agree on payment_hash.
    if invoice.payment_hash_hex != escrow.payment_hash_hex {
        warn!("pre-pay check 1 failed: invoice/escrow payment_hash mismatch");
        return Err(CoreError::Verification(VerificationError::PayHashMismatch));
    }
    debug!("pre-pay check 1 passed: payment_hash agrees");

    // 2. PDA derivation must match what the escrow envelope claims.
    let program_id = Pubkey::from_hex(&escrow.program_id)
        .ok_or(CoreError::Verification(VerificationError::EscrowWrongOwner))?;
    let payment_hash: [u8; 32] = hex::decode(&escrow.payment_hash_hex)
        .ok()
        .and_then(|b| b.try_into().ok())
        .ok_or(CoreError::Verification(VerificationError::PayHashMismatch))?;
    let expected_pda = derive_pda(&program_id, b"escrow", &payment_hash);
    if expected_pda.to_hex() != escrow.escrow_pda {
        warn!("pre-pay check 2 failed: escrow_pda does not match derive_pda(program_id, \"escrow\", payment_hash)");
        return Err(CoreError::Verification(VerificationError::EscrowWrongOwner));
    }
    debug!("pre-pay check 2 passed: PDA derivation matches");

    // 3. On-chain escrow account exists, is owned by program_id, and its
    // *parsed on-chain state* matches terms exactly. This independently
    // proves the chain's real state rather than re-asserting whatever the
    // counterparty's envelope claims (that binding is already checked by
    // the state machine in trade.rs).
    let account_info = chain
        .get_account(&escrow.escrow_pda)
        .await?
        .ok_or(CoreError::Verification(VerificationError::EscrowMissing))?;
    if account_info.owner != escrow.program_id {
        warn!("pre-pay check 3 failed: escrow account not owned by program_id");
        return Err(CoreError::Verification(VerificationError::EscrowWrongOwner));
    }
    let onchain: EscrowAccount = EscrowAccount::decode(&account_info.data)?;
    if onchain.owner_program != program_id {
        warn!("pre-pay check 3 failed: decoded owner_program does not match program_id");
        return Err(CoreError::Verification(VerificationError::EscrowWrongOwner));
    }
    if onchain.status != EscrowStatus::Funded {
        warn!(?onchain.status, "pre-pay check 3 failed: on-chain escrow is not FUNDED");
        return Err(CoreError::Verification(VerificationError::EscrowAmountMismatch));
    }
    if onchain.payment_hash != payment_hash {
        warn!("pre-pay check 3 failed: decoded payment_hash does not match escrow's");
        return Err(CoreError::Verification(VerificationError::EscrowAmountMismatch));
    }
    let terms_amount: u128 = terms
        .usdt_amount
        .parse()
        .map_err(|_| CoreError::Verification(VerificationError::EscrowAmountMismatch))?;
    let terms_mint = Pubkey::from_hex(&terms.sol_mint)
        .ok_or(CoreError::Verification(VerificationError::EscrowAmountMismatch))?;
    let terms_recipient = Pubkey::from_hex(&terms.sol_recipient)
        .ok_or(CoreError::Verification(VerificationError::EscrowAmountMismatch))?;
    let terms_refund = Pubkey::from_hex(&terms.sol_refund)
        .ok_or(CoreError::Verification(VerificationError::EscrowAmountMismatch))?;
    if onchain.amount != terms_amount
        || onchain.mint != terms_mint
        || onchain.recipient != terms_recipient
        || onchain.refund != terms_refund
        || onchain.refund_after_unix != terms.sol_refund_after_unix
    {
        warn!("pre-pay check 3 failed: decoded on-chain escrow state does not match terms");
        return Err(CoreError::Verification(VerificationError::EscrowAmountMismatch));
    }
    debug!("pre-pay check 3 passed: on-chain escrow state matches terms exactly");

    // 4. Time sanity: enough margin before the refund cliff.
    if now_unix + config.safety_margin_secs >= escrow.refund_after_unix {
        warn!(now_unix, refund_after_unix = escrow.refund_after_unix, "pre-pay check 4 failed: refund cliff too close");
        return Err(CoreError::Verification(VerificationError::EscrowTimeTooTight));
    }
    debug!("pre-pay check 4 passed: safety margin before refund cliff holds");

    // 5. Vault ATA exists, belongs to this mint/escrow, holds at least `amount`.
    let vault = chain
        .get_token_account(&escrow.vault_ata)
        .await?
        .ok_or(CoreError::Verification(VerificationError::VaultUnderfunded))?;
    if vault.mint != escrow.mint {
        warn!("pre-pay check 5 failed: vault ATA mint does not match escrow mint");
        return Err(CoreError::Verification(VerificationError::VaultUnderfunded));
    }
    if vault.amount < terms_amount {
        warn!(vault_amount = vault.amount, required = terms_amount, "pre-pay check 5 failed: vault underfunded");
        return Err(CoreError::Verification(VerificationError::VaultUnderfunded));
    }
    debug!("pre-pay check 5 passed: vault holds at least the negotiated amount");

    // 6. Invoice amount matches the negotiated BTC amount.
    let expected_msat = (terms.btc_sats as u128) * 1000;
    let actual_msat: u128 = invoice
        .amount_msat
        .parse()
        .map_err(|_| CoreError::Verification(VerificationError::EscrowAmountMismatch))?;
    if actual_msat != expected_msat {
        warn!(actual_msat, expected_msat, "pre-pay check 6 failed: invoice amount does not match terms.btc_sats");
        return Err(CoreError::Verification(VerificationError::EscrowAmountMismatch));
    }
    debug!("pre-pay check 6 passed: invoice amount matches terms.btc_sats");

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::boundary::{AccountInfo, TokenAccountInfo};
    use crate::error::TransportError;
    use async_trait::async_trait;
    use sha2::{Digest, Sha256};
    use std::collections::BTreeMap;
    use std::sync::Mutex;

    struct MockChain {
        accounts: Mutex<BTreeMap<String, AccountInfo>>,
        tokens: Mutex<BTreeMap<String, TokenAccountInfo>>,
    }

    #[async_trait]
    impl ChainRpc for MockChain {
        async fn get_account(&self, pubkey: &str) -> Result<Option<AccountInfo>, TransportError> {
            Ok(self.accounts.lock().unwrap().get(pubkey).cloned())
        }
        async fn send_tx(&self, _signed_tx: &[u8]) -> Result<String, TransportError> {
            Ok("sig".to_string())
        }
        async fn confirm(&self, _sig: &str) -> Result<(), TransportError> {
            Ok(())
        }
        async fn get_token_account(
            &self,
            ata: &str,
        ) -> Result<Option<TokenAccountInfo>, TransportError> {
            Ok(self.tokens.lock().unwrap().get(ata).cloned())
        }
    }

    fn sample_terms() -> TermsBody {
        TermsBody {
            pair: "BTC_LN/USDT_SOL".to_string(),
            direction: "BTC_LN->USDT_SOL".to_string(),
            btc_sats: 50_000,
            usdt_amount: "100000000".to_string(),
            usdt_decimals: 6,
            sol_mint: Pubkey([2u8; 32]).to_hex(),
            sol_recipient: Pubkey([3u8; 32]).to_hex(),
            sol_refund: Pubkey([4u8; 32]).to_hex(),
            sol_refund_after_unix: 1_700_003_600,
            ln_receiver_peer: "peerA".to_string(),
            ln_payer_peer: "peerB".to_string(),
            terms_valid_until_unix: 1_700_003_000,
        }
    }

    /// Replace the on-chain escrow account's encoded bytes in place, so
    /// tests can make the *chain's* state diverge from `terms` independently
    /// of whatever the counterparty's envelope claims.
    fn mutate_onchain_account(chain: &MockChain, pda: &str, f: impl FnOnce(&mut EscrowAccount)) {
        let mut accounts = chain.accounts.lock().unwrap();
        let info = accounts.get_mut(pda).unwrap();
        let mut account = EscrowAccount::decode(&info.data).unwrap();
        f(&mut account);
        info.data = account.encode();
    }

    fn setup() -> (MockChain, TermsBody, LnInvoiceBody, SolEscrowCreatedBody) {
        let terms = sample_terms();
        let preimage = [7u8; 32];
        let payment_hash: [u8; 32] = Sha256::digest(preimage).into();
        let payment_hash_hex = hex::encode(payment_hash);
        let program_id = Pubkey([1u8; 32]);
        let pda = derive_pda(&program_id, b"escrow", &payment_hash);

        let escrow = SolEscrowCreatedBody {
            payment_hash_hex: payment_hash_hex.clone(),
            program_id: program_id.to_hex(),
            escrow_pda: pda.to_hex(),
            vault_ata: "vault1".to_string(),
            mint: terms.sol_mint.clone(),
            amount: terms.usdt_amount.clone(),
            refund_after_unix: terms.sol_refund_after_unix,
            recipient: terms.sol_recipient.clone(),
            refund: terms.sol_refund.clone(),
            tx_sig: "sig1".to_string(),
        };
        let invoice = LnInvoiceBody {
            bolt11: "lnbc1...".to_string(),
            payment_hash_hex,
            amount_msat: "50000000".to_string(),
        };

        let onchain = EscrowAccount {
            owner_program: program_id,
            payment_hash,
            mint: Pubkey::from_hex(&terms.sol_mint).unwrap(),
            amount: terms.usdt_amount.parse().unwrap(),
            recipient: Pubkey::from_hex(&terms.sol_recipient).unwrap(),
            refund: Pubkey::from_hex(&terms.sol_refund).unwrap(),
            refund_after_unix: terms.sol_refund_after_unix,
            status: EscrowStatus::Funded,
        };

        let mut accounts = BTreeMap::new();
        accounts.insert(
            escrow.escrow_pda.clone(),
            AccountInfo {
                owner: escrow.program_id.clone(),
                data: onchain.encode(),
            },
        );
        let mut tokens = BTreeMap::new();
        tokens.insert(
            escrow.vault_ata.clone(),
            TokenAccountInfo {
                amount: 100_000_000,
                mint: escrow.mint.clone(),
            },
        );
        let chain = MockChain {
            accounts: Mutex::new(accounts),
            tokens: Mutex::new(tokens),
        };
        (chain, terms, invoice, escrow)
    }

    #[tokio::test]
    async fn all_checks_pass_on_well_formed_escrow() {
        let (chain, terms, invoice, escrow) = setup();
        let config = CoordinatorConfig::default();
        verify_prepay(&terms, &invoice, &escrow, &chain, &config, 1_700_000_000)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn underfunded_vault_is_rejected() {
        let (chain, terms, invoice, escrow) = setup();
        chain.tokens.lock().unwrap().get_mut(&escrow.vault_ata).unwrap().amount = 90_000_000;
        let config = CoordinatorConfig::default();
        let err = verify_prepay(&terms, &invoice, &escrow, &chain, &config, 1_700_000_000)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            CoreError::Verification(VerificationError::VaultUnderfunded)
        ));
    }

    #[tokio::test]
    async fn time_too_tight_is_rejected() {
        let (chain, terms, invoice, escrow) = setup();
        let config = CoordinatorConfig::default();
        // refund_after_unix is 1_700_003_600; safety margin 600s means now
        // must be < 1_700_003_000 to pass.
        let err = verify_prepay(&terms, &invoice, &escrow, &chain, &config, 1_700_003_500)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            CoreError::Verification(VerificationError::EscrowTimeTooTight)
        ));
    }

    #[tokio::test]
    async fn mismatched_amount_is_rejected() {
        let (chain, terms, invoice, escrow) = setup();
        // Mutate the *on-chain* account, not the envelope: the verifier must
        // catch this independently of whatever the counterparty claims.
        mutate_onchain_account(&chain, &escrow.escrow_pda, |account| {
            account.amount = 90_000_000;
        });
        let config = CoordinatorConfig::default();
        let err = verify_prepay(&terms, &invoice, &escrow, &chain, &config, 1_700_000_000)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            CoreError::Verification(VerificationError::EscrowAmountMismatch)
        ));
    }

    #[tokio::test]
    async fn envelope_amount_alone_does_not_fool_the_verifier() {
        // The envelope claims a different amount than the real chain state,
        // but the chain state itself still matches terms: the verifier must
        // pass, because it proves the chain's state, not the envelope's claim.
        let (chain, terms, invoice, mut escrow) = setup();
        escrow.amount = "1".to_string();
        let config = CoordinatorConfig::default();
        verify_prepay(&terms, &invoice, &escrow, &chain, &config, 1_700_000_000)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn escrow_not_yet_funded_is_rejected() {
        let (chain, terms, invoice, escrow) = setup();
        mutate_onchain_account(&chain, &escrow.escrow_pda, |account| {
            account.status = EscrowStatus::Claimed;
        });
        let config = CoordinatorConfig::default();
        let err = verify_prepay(&terms, &invoice, &escrow, &chain, &config, 1_700_000_000)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            CoreError::Verification(VerificationError::EscrowAmountMismatch)
        ));
    }

    #[tokio::test]
    async fn missing_escrow_account_is_rejected() {
        let (chain, terms, invoice, escrow) = setup();
        chain.accounts.lock().unwrap().remove(&escrow.escrow_pda);
        let config = CoordinatorConfig::default();
        let err = verify_prepay(&terms, &invoice, &escrow, &chain, &config, 1_700_000_000)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            CoreError::Verification(VerificationError::EscrowMissing)
        ));
    }
}
