//! Sealed (encrypted) integers as seen by the contract.
//!
//! A `SealedValue` never exposes its plaintext. The contract can combine two
//! of them, create the sealed constants zero and one, ingest a respondent's
//! ciphertext once its input proof checks out, and derive the handle under
//! which a value is referenced in decryption requests.

use soroban_sdk::{contracttype, xdr::ToXdr, Address, Bytes, BytesN, Env};

use crate::kms::verify_ed25519;
use crate::paillier::{self, PaillierPublicKey};
use crate::{ContractError, SurveyConfig, PROTOCOL_ID};

const HANDLE_TAG: &[u8; 14] = b"survey-handle:";
const INPUT_TAG: &[u8; 13] = b"survey-input:";

#[contracttype]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct SealedValue {
    pub ciphertext: i128,
}

/// Validity proof accompanying an external ciphertext: a signature by a
/// registered input verifier over `input_digest`.
#[contracttype]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct InputProof {
    pub verifier: BytesN<32>,
    pub signature: BytesN<64>,
}

impl SealedValue {
    pub fn zero(pub_key: &PaillierPublicKey) -> Self {
        Self {
            ciphertext: paillier::trivial_encrypt(pub_key, 0),
        }
    }

    pub fn one(pub_key: &PaillierPublicKey) -> Self {
        Self {
            ciphertext: paillier::trivial_encrypt(pub_key, 1),
        }
    }

    pub fn add(&self, other: &SealedValue, pub_key: &PaillierPublicKey) -> Self {
        Self {
            ciphertext: paillier::add_ciphertexts(pub_key, self.ciphertext, other.ciphertext),
        }
    }

    /// Ingests a respondent-supplied ciphertext.
    ///
    /// The ciphertext must be a residue under the configured key and the
    /// proof must be signed by a registered input verifier over the digest
    /// binding (contract, respondent, ciphertext). A proof produced for a
    /// different respondent or a different contract does not verify.
    pub fn from_external_input(
        env: &Env,
        config: &SurveyConfig,
        respondent: &Address,
        ciphertext: i128,
        proof: &InputProof,
    ) -> Result<Self, ContractError> {
        if !config.public_key.is_residue(ciphertext) {
            return Err(ContractError::InvalidInputProof);
        }
        if !config.input_verifiers.contains(&proof.verifier) {
            return Err(ContractError::InvalidInputProof);
        }
        let digest = input_digest(env, respondent, ciphertext);
        if !verify_ed25519(&proof.verifier, &digest, &proof.signature) {
            return Err(ContractError::InvalidInputProof);
        }
        Ok(Self { ciphertext })
    }

    /// Reference to this value inside a decryption request.
    pub fn handle(&self, env: &Env) -> BytesN<32> {
        let mut data = Bytes::from_array(env, HANDLE_TAG);
        data.extend_from_array(&self.ciphertext.to_be_bytes());
        env.crypto().sha256(&data).into()
    }
}

/// `sha256(INPUT_TAG || protocol_id || contract || respondent || ciphertext)`
pub fn input_digest(env: &Env, respondent: &Address, ciphertext: i128) -> BytesN<32> {
    let mut data = Bytes::from_array(env, INPUT_TAG);
    data.extend_from_array(&PROTOCOL_ID.to_be_bytes());
    data.append(&env.current_contract_address().to_xdr(env));
    data.append(&respondent.clone().to_xdr(env));
    data.extend_from_array(&ciphertext.to_be_bytes());
    env.crypto().sha256(&data).into()
}
