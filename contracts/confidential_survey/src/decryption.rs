//! Registry of outstanding decryption requests.
//!
//! Each request gets a globally unique id from a monotonic counter and a
//! stored context describing what the eventual oracle callback refers to.
//! Publishing the `DEC_REQ` event is the outbound half of the oracle
//! transport; the callback entry points are the inbound half.

use soroban_sdk::{contracttype, symbol_short, Address, BytesN, Env, Symbol, Vec};

use crate::events;
use crate::sealed::SealedValue;
use crate::ContractError;

// ── Storage key prefixes ─────────────────────────────────────────────────────

const REQUEST_CTR: Symbol = symbol_short!("REQ_CTR");
const REQUEST: Symbol = symbol_short!("DEC_REQ");

// TTL: ~60 days at 5s/ledger
const TTL_THRESHOLD: u32 = 1_036_800;
const TTL_EXTEND_TO: u32 = 2_073_600;

// ── Types ─────────────────────────────────────────────────────────────────────

#[contracttype]
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum RequestKind {
    /// The four aggregate handles of an ended survey.
    Results,
    /// The three sealed ratings of a single submission.
    RatingVerification,
}

#[contracttype]
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum RequestStatus {
    Pending,
    Fulfilled,
}

#[contracttype]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct DecryptionRequest {
    pub request_id: u64,
    pub survey_id: u64,
    pub kind: RequestKind,
    /// Set for `RatingVerification` requests.
    pub respondent: Option<Address>,
    /// Handles in the order the cleartexts must be encoded.
    pub handles: Vec<BytesN<32>>,
    pub ciphertexts: Vec<i128>,
    pub status: RequestStatus,
    pub requested_at: u64,
    pub fulfilled_at: u64,
}

// ── Storage helpers ──────────────────────────────────────────────────────────

fn next_id(env: &Env) -> u64 {
    let id: u64 = current_id(env).saturating_add(1);
    env.storage().instance().set(&REQUEST_CTR, &id);
    id
}

pub(crate) fn current_id(env: &Env) -> u64 {
    env.storage().instance().get(&REQUEST_CTR).unwrap_or(0u64)
}

fn request_key(id: u64) -> (Symbol, u64) {
    (REQUEST, id)
}

fn store(env: &Env, request: &DecryptionRequest) {
    let key = request_key(request.request_id);
    env.storage().persistent().set(&key, request);
    env.storage()
        .persistent()
        .extend_ttl(&key, TTL_THRESHOLD, TTL_EXTEND_TO);
}

pub(crate) fn load(env: &Env, id: u64) -> Option<DecryptionRequest> {
    env.storage().persistent().get(&request_key(id))
}

// ── Registry operations ──────────────────────────────────────────────────────

/// Mints a request id for `sealed` and hands the request to the oracle.
pub(crate) fn register(
    env: &Env,
    kind: RequestKind,
    survey_id: u64,
    respondent: Option<Address>,
    sealed: Vec<SealedValue>,
) -> u64 {
    let request_id = next_id(env);

    let mut handles = Vec::new(env);
    let mut ciphertexts = Vec::new(env);
    for value in sealed.iter() {
        handles.push_back(value.handle(env));
        ciphertexts.push_back(value.ciphertext);
    }

    let request = DecryptionRequest {
        request_id,
        survey_id,
        kind,
        respondent,
        handles,
        ciphertexts,
        status: RequestStatus::Pending,
        requested_at: env.ledger().timestamp(),
        fulfilled_at: 0,
    };
    store(env, &request);
    events::publish_decryption_requested(env, &request);

    request_id
}

/// Resolves the request a callback refers to.
pub(crate) fn load_existing(env: &Env, id: u64) -> Result<DecryptionRequest, ContractError> {
    load(env, id).ok_or(ContractError::NoHandleFoundForRequestId)
}

/// Checked only once the attestation over `request` has verified: a
/// fulfilled id is a replay, and a pending id must belong to `kind`.
pub(crate) fn ensure_pending(request: &DecryptionRequest, kind: RequestKind) -> Result<(), ContractError> {
    if request.status == RequestStatus::Fulfilled {
        return Err(ContractError::HandlesAlreadySavedForRequestId);
    }
    if request.kind != kind {
        return Err(ContractError::WrongRequestKind);
    }
    Ok(())
}

pub(crate) fn mark_fulfilled(env: &Env, request: &mut DecryptionRequest) {
    request.status = RequestStatus::Fulfilled;
    request.fulfilled_at = env.ledger().timestamp();
    store(env, request);
}
