//! One-shot submission guard and per-respondent sealed ratings.

use soroban_sdk::{contracttype, symbol_short, Address, Env, Symbol};

use crate::sealed::SealedValue;

// ── Storage key prefixes ─────────────────────────────────────────────────────

const SUBMITTED: Symbol = symbol_short!("SUBMIT");
const RATINGS: Symbol = symbol_short!("RATINGS");
const VERDICT: Symbol = symbol_short!("VERDICT");

// TTL: ~60 days at 5s/ledger
const TTL_THRESHOLD: u32 = 1_036_800;
const TTL_EXTEND_TO: u32 = 2_073_600;

/// Inclusive bounds a plaintext rating must fall in.
pub const RATING_MIN: u64 = 1;
pub const RATING_MAX: u64 = 10;

/// The individually sealed ratings of one respondent, kept apart from the
/// aggregate sums for later audit.
#[contracttype]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct RespondentRatings {
    pub quality: SealedValue,
    pub price: SealedValue,
    pub ambiance: SealedValue,
    pub submitted_at: u64,
    /// 0 when rating verification was disabled at submission time.
    pub verification_request_id: u64,
}

/// Outcome of the asynchronous range check of one submission.
#[contracttype]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct RatingVerdict {
    pub request_id: u64,
    pub within_bounds: bool,
    pub verified_at: u64,
}

pub fn within_bounds(values: &[u64]) -> bool {
    values
        .iter()
        .all(|v| (RATING_MIN..=RATING_MAX).contains(v))
}

// ── Storage helpers ──────────────────────────────────────────────────────────

fn respondent_key(prefix: Symbol, survey_id: u64, respondent: &Address) -> (Symbol, u64, Address) {
    (prefix, survey_id, respondent.clone())
}

fn persist<V>(env: &Env, key: &(Symbol, u64, Address), value: &V)
where
    V: soroban_sdk::IntoVal<Env, soroban_sdk::Val>,
{
    env.storage().persistent().set(key, value);
    env.storage()
        .persistent()
        .extend_ttl(key, TTL_THRESHOLD, TTL_EXTEND_TO);
}

pub(crate) fn has_submitted(env: &Env, survey_id: u64, respondent: &Address) -> bool {
    env.storage()
        .persistent()
        .has(&respondent_key(SUBMITTED, survey_id, respondent))
}

pub(crate) fn mark_submitted(env: &Env, survey_id: u64, respondent: &Address) {
    persist(env, &respondent_key(SUBMITTED, survey_id, respondent), &true);
}

pub(crate) fn store_ratings(
    env: &Env,
    survey_id: u64,
    respondent: &Address,
    ratings: &RespondentRatings,
) {
    persist(env, &respondent_key(RATINGS, survey_id, respondent), ratings);
}

pub(crate) fn load_ratings(
    env: &Env,
    survey_id: u64,
    respondent: &Address,
) -> Option<RespondentRatings> {
    env.storage()
        .persistent()
        .get(&respondent_key(RATINGS, survey_id, respondent))
}

pub(crate) fn store_verdict(
    env: &Env,
    survey_id: u64,
    respondent: &Address,
    verdict: &RatingVerdict,
) {
    persist(env, &respondent_key(VERDICT, survey_id, respondent), verdict);
}

pub(crate) fn load_verdict(env: &Env, survey_id: u64, respondent: &Address) -> Option<RatingVerdict> {
    env.storage()
        .persistent()
        .get(&respondent_key(VERDICT, survey_id, respondent))
}
