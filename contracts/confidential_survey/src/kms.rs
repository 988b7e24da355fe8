//! Verification of oracle attestations over decrypted cleartexts.
//!
//! The oracle returns the plaintexts of a decryption request as a bundle of
//! 32-byte big-endian words together with signatures from the key-management
//! committee. The bundle is trusted only when at least `kms_threshold`
//! distinct registered signers signed the attestation digest and no
//! signature in the set fails.

use ed25519_dalek::{Signature, VerifyingKey};
use soroban_sdk::{contracttype, xdr::ToXdr, Bytes, BytesN, Env, Vec};

use crate::decryption::DecryptionRequest;
use crate::{ContractError, SurveyConfig, PROTOCOL_ID};

const ATTESTATION_TAG: &[u8; 14] = b"survey-decrypt";

/// Width of one encoded cleartext.
pub const WORD_LEN: u32 = 32;

#[contracttype]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct KmsSignature {
    pub signer: BytesN<32>,
    pub signature: BytesN<64>,
}

#[contracttype]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct DecryptionProof {
    pub signatures: Vec<KmsSignature>,
}

pub(crate) fn verify_ed25519(
    public_key: &BytesN<32>,
    digest: &BytesN<32>,
    signature: &BytesN<64>,
) -> bool {
    let Ok(key) = VerifyingKey::from_bytes(&public_key.to_array()) else {
        return false;
    };
    let signature = Signature::from_bytes(&signature.to_array());
    key.verify_strict(&digest.to_array(), &signature).is_ok()
}

/// Digest the committee signs for a request:
///
/// `sha256(tag || protocol_id || contract || request_id || handles.. || cleartexts)`
///
/// Binding the handles ties the cleartexts to the exact ciphertexts that were
/// requested; binding the contract and request id prevents cross-use.
pub fn attestation_digest(env: &Env, request: &DecryptionRequest, cleartexts: &Bytes) -> BytesN<32> {
    let mut data = Bytes::from_array(env, ATTESTATION_TAG);
    data.extend_from_array(&PROTOCOL_ID.to_be_bytes());
    data.append(&env.current_contract_address().to_xdr(env));
    data.extend_from_array(&request.request_id.to_be_bytes());
    for handle in request.handles.iter() {
        data.extend_from_array(&handle.to_array());
    }
    data.append(cleartexts);
    env.crypto().sha256(&data).into()
}

pub(crate) fn verify_attestation(
    env: &Env,
    config: &SurveyConfig,
    digest: &BytesN<32>,
    proof: &DecryptionProof,
) -> Result<(), ContractError> {
    let mut seen: Vec<BytesN<32>> = Vec::new(env);
    for entry in proof.signatures.iter() {
        if !config.kms_signers.contains(&entry.signer) || seen.contains(&entry.signer) {
            return Err(ContractError::InvalidKmsSignatures);
        }
        if !verify_ed25519(&entry.signer, digest, &entry.signature) {
            return Err(ContractError::InvalidKmsSignatures);
        }
        seen.push_back(entry.signer);
    }
    if seen.len() < config.kms_threshold {
        return Err(ContractError::InvalidKmsSignatures);
    }
    Ok(())
}

/// Splits a bundle into exactly `N` words, each of which must fit in a `u64`.
pub fn decode_cleartexts<const N: usize>(cleartexts: &Bytes) -> Result<[u64; N], ContractError> {
    if cleartexts.len() != WORD_LEN * N as u32 {
        return Err(ContractError::InvalidCleartexts);
    }
    let mut out = [0u64; N];
    for (i, value) in out.iter_mut().enumerate() {
        let start = i as u32 * WORD_LEN;
        let mut word = [0u8; 32];
        cleartexts
            .slice(start..start + WORD_LEN)
            .copy_into_slice(&mut word);
        if word[..24].iter().any(|b| *b != 0) {
            return Err(ContractError::InvalidCleartexts);
        }
        let mut low = [0u8; 8];
        low.copy_from_slice(&word[24..]);
        *value = u64::from_be_bytes(low);
    }
    Ok(out)
}

/// Inverse of `decode_cleartexts`; used by oracle transports.
pub fn encode_cleartexts(env: &Env, values: &[u64]) -> Bytes {
    let mut out = Bytes::new(env);
    for value in values {
        let mut word = [0u8; 32];
        word[24..].copy_from_slice(&value.to_be_bytes());
        out.extend_from_array(&word);
    }
    out
}
