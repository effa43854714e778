//! Signing and verification (spec §4.2): detached Ed25519 signatures over
//! the canonical encoding of an unsigned envelope.

use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};

use crate::canonical::encode_canonical;
use crate::envelope::{SignedEnvelope, UnsignedEnvelope};
use crate::error::{CoreError, ProtocolError};

fn decode_pubkey(hex_key: &str) -> Result<VerifyingKey, CoreError> {
    let bytes = hex::decode(hex_key)
        .map_err(|_| CoreError::Protocol(ProtocolError::MalformedKey(hex_key.to_string())))?;
    let arr: [u8; 32] = bytes
        .try_into()
        .map_err(|_| CoreError::Protocol(ProtocolError::MalformedKey(hex_key.to_string())))?;
    VerifyingKey::from_bytes(&arr)
        .map_err(|_| CoreError::Protocol(ProtocolError::MalformedKey(hex_key.to_string())))
}

fn decode_signature(hex_sig: &str) -> Result<Signature, CoreError> {
    let bytes = hex::decode(hex_sig).map_err(|_| CoreError::Protocol(ProtocolError::BadSig))?;
    let arr: [u8; 64] = bytes
        .try_into()
        .map_err(|_| CoreError::Protocol(ProtocolError::BadSig))?;
    Ok(Signature::from_bytes(&arr))
}

/// Sign an unsigned envelope, producing the wire-ready signed form.
pub fn sign(envelope: UnsignedEnvelope, key: &SigningKey) -> Result<SignedEnvelope, CoreError> {
    let bytes = encode_canonical(&envelope)?;
    let signature = key.sign(&bytes);
    Ok(SignedEnvelope {
        unsigned: envelope,
        signer_pubkey: hex::encode(key.verifying_key().to_bytes()),
        signature: hex::encode(signature.to_bytes()),
    })
}

/// Verify a signed envelope's detached signature against its own claimed signer.
pub fn verify(signed: &SignedEnvelope) -> Result<(), CoreError> {
    let pubkey = decode_pubkey(&signed.signer_pubkey)?;
    let signature = decode_signature(&signed.signature)?;
    let bytes = encode_canonical(&signed.unsigned)?;
    pubkey
        .verify(&bytes, &signature)
        .map_err(|_| CoreError::Protocol(ProtocolError::BadSig))
}
