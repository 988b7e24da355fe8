#![allow(deprecated)] // events().publish migration to #[contractevent] tracked separately

//! Structured event publishing for the confidential survey contract.

use soroban_sdk::{symbol_short, Address, BytesN, Env, Symbol, Vec};

use crate::decryption::{DecryptionRequest, RequestKind};
use crate::survey::{Survey, SurveyResults};

pub fn publish_initialized(env: &Env, admin: &Address) {
    env.events()
        .publish((symbol_short!("INIT"),), admin.clone());
}

pub fn publish_config_updated(env: &Env, field: Symbol) {
    env.events().publish((symbol_short!("CFG_UPD"),), field);
}

pub fn publish_survey_started(env: &Env, survey: &Survey) {
    env.events().publish(
        (symbol_short!("SRV_START"), survey.id),
        (survey.owner.clone(), survey.restaurant_name.clone()),
    );
}

pub fn publish_rating_submitted(env: &Env, respondent: &Address, survey_id: u64, request_id: u64) {
    env.events().publish(
        (symbol_short!("RATING"), survey_id),
        (respondent.clone(), request_id),
    );
}

pub fn publish_survey_ended(env: &Env, survey_id: u64, owner: &Address, request_id: u64) {
    env.events().publish(
        (symbol_short!("SRV_END"), survey_id),
        (owner.clone(), request_id),
    );
}

/// Data of the `DEC_REQ` event: kind, survey, handles and the ciphertexts
/// behind them, in the order the cleartexts must be returned.
pub type DecryptionRequestedData = (RequestKind, u64, Vec<BytesN<32>>, Vec<i128>);

pub fn decryption_requested_data(request: &DecryptionRequest) -> DecryptionRequestedData {
    (
        request.kind.clone(),
        request.survey_id,
        request.handles.clone(),
        request.ciphertexts.clone(),
    )
}

/// Outbound half of the oracle transport. The event alone is enough for an
/// oracle to decrypt and answer.
pub fn publish_decryption_requested(env: &Env, request: &DecryptionRequest) {
    env.events().publish(
        (symbol_short!("DEC_REQ"), request.request_id),
        decryption_requested_data(request),
    );
}

pub fn publish_results_decrypted(env: &Env, survey: &Survey, results: &SurveyResults) {
    env.events().publish(
        (symbol_short!("RESULTS"), survey.id),
        (
            survey.owner.clone(),
            survey.restaurant_name.clone(),
            results.quality_avg,
            results.price_avg,
            results.ambiance_avg,
            results.response_count,
        ),
    );
}

pub fn publish_rating_verified(
    env: &Env,
    survey_id: u64,
    respondent: &Address,
    within_bounds: bool,
) {
    env.events().publish(
        (symbol_short!("RATING_VF"), survey_id),
        (respondent.clone(), within_bounds),
    );
}

pub fn publish_decryption_fulfilled(env: &Env, request_id: u64) {
    env.events()
        .publish((symbol_short!("DEC_FULL"),), request_id);
}
