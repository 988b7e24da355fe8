//! Survey records, lifecycle phases and storage.

use soroban_sdk::{contracttype, symbol_short, Address, Env, String, Symbol};

use crate::paillier::PaillierPublicKey;
use crate::sealed::SealedValue;

// ── Storage key prefixes ─────────────────────────────────────────────────────

pub(crate) const SURVEY_CTR: Symbol = symbol_short!("SRV_CTR");
pub(crate) const SURVEY: Symbol = symbol_short!("SURVEY");
const RESULTS: Symbol = symbol_short!("RESULTS");

// TTL: ~60 days at 5s/ledger
const TTL_THRESHOLD: u32 = 1_036_800;
const TTL_EXTEND_TO: u32 = 2_073_600;

/// Phase of the survey lifecycle.
///
/// ```text
/// Active ──end_survey──► ResultsPending ──callback_survey_results──► ResultsPublished
/// ```
///
/// Ending a survey and registering its results request happen in the same
/// call, so the ended-but-unrequested state is never stored.
#[contracttype]
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum SurveyPhase {
    Active,
    ResultsPending,
    ResultsPublished,
}

#[contracttype]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Survey {
    pub id: u64,
    pub owner: Address,
    pub restaurant_name: String,
    pub phase: SurveyPhase,
    pub quality_sum: SealedValue,
    pub price_sum: SealedValue,
    pub ambiance_sum: SealedValue,
    /// Sealed count of accepted submissions.
    pub response_count: SealedValue,
    /// Results decryption request, 0 until the survey ends.
    pub results_request_id: u64,
    /// Submissions whose verification callback found an out-of-range rating.
    pub flagged_responses: u32,
    pub created_at: u64,
    pub ended_at: u64,
}

impl Survey {
    pub fn new(
        env: &Env,
        id: u64,
        owner: Address,
        restaurant_name: String,
        pub_key: &PaillierPublicKey,
    ) -> Self {
        Self {
            id,
            owner,
            restaurant_name,
            phase: SurveyPhase::Active,
            quality_sum: SealedValue::zero(pub_key),
            price_sum: SealedValue::zero(pub_key),
            ambiance_sum: SealedValue::zero(pub_key),
            response_count: SealedValue::zero(pub_key),
            results_request_id: 0,
            flagged_responses: 0,
            created_at: env.ledger().timestamp(),
            ended_at: 0,
        }
    }

    pub fn is_active(&self) -> bool {
        self.phase == SurveyPhase::Active
    }
}

/// Public projection returned by `get_survey_info`.
#[contracttype]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct SurveyInfo {
    pub owner: Address,
    pub restaurant_name: String,
    pub is_active: bool,
}

#[contracttype]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct SurveyResults {
    pub survey_id: u64,
    pub request_id: u64,
    pub quality_avg: u64,
    pub price_avg: u64,
    pub ambiance_avg: u64,
    pub response_count: u64,
    pub published_at: u64,
}

/// Integer mean, truncated toward zero. An empty survey averages to 0.
pub fn average(sum: u64, count: u64) -> u64 {
    if count == 0 {
        return 0;
    }
    sum / count
}

// ── Storage helpers ──────────────────────────────────────────────────────────

pub(crate) fn next_id(env: &Env) -> u64 {
    let id: u64 = current_id(env).saturating_add(1);
    env.storage().instance().set(&SURVEY_CTR, &id);
    id
}

pub(crate) fn current_id(env: &Env) -> u64 {
    env.storage().instance().get(&SURVEY_CTR).unwrap_or(0u64)
}

fn survey_key(id: u64) -> (Symbol, u64) {
    (SURVEY, id)
}

fn results_key(id: u64) -> (Symbol, u64) {
    (RESULTS, id)
}

pub(crate) fn store(env: &Env, survey: &Survey) {
    let key = survey_key(survey.id);
    env.storage().persistent().set(&key, survey);
    env.storage()
        .persistent()
        .extend_ttl(&key, TTL_THRESHOLD, TTL_EXTEND_TO);
}

pub(crate) fn load(env: &Env, id: u64) -> Option<Survey> {
    env.storage().persistent().get(&survey_key(id))
}

pub(crate) fn store_results(env: &Env, results: &SurveyResults) {
    let key = results_key(results.survey_id);
    env.storage().persistent().set(&key, results);
    env.storage()
        .persistent()
        .extend_ttl(&key, TTL_THRESHOLD, TTL_EXTEND_TO);
}

pub(crate) fn load_results(env: &Env, id: u64) -> Option<SurveyResults> {
    env.storage().persistent().get(&results_key(id))
}
