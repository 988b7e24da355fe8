#![no_std]

//! # Confidential Survey
//!
//! Collects restaurant ratings (quality, price, ambiance) as sealed values
//! and reveals only the averages:
//!
//! - **Sealed aggregation**: ratings arrive as Paillier ciphertexts bound to
//!   the respondent by an input proof and are folded into running sums
//!   without decryption
//! - **One-shot submissions**: each address rates a survey at most once
//! - **Oracle decryption**: ending a survey registers a decryption request;
//!   an external oracle answers through a callback carrying the cleartexts
//!   and a threshold set of KMS signatures
//! - **Replay safety**: every request id can be fulfilled exactly once
//! - **Rating verification**: optionally, each submission is decrypted
//!   out-of-band and range-checked; failures are flagged, never rolled back

pub mod decryption;
pub mod events;
pub mod kms;
pub mod paillier;
pub mod sealed;
pub mod submission;
pub mod survey;

use soroban_sdk::{
    contract, contractimpl, contracttype, log, symbol_short, vec, Address, Bytes, BytesN, Env,
    String, Symbol, Vec,
};

use decryption::{DecryptionRequest, RequestKind};
use kms::DecryptionProof;
use paillier::PaillierPublicKey;
use sealed::{InputProof, SealedValue};
use submission::{RatingVerdict, RespondentRatings};
use survey::{Survey, SurveyInfo, SurveyPhase, SurveyResults};

// ── Storage key constants ─────────────────────────────────────────────────────

const ADMIN: Symbol = symbol_short!("ADMIN");
const CONFIG: Symbol = symbol_short!("CONFIG");
const INITIALIZED: Symbol = symbol_short!("INIT");

/// Identifies the decryption protocol; mixed into every signed digest.
pub const PROTOCOL_ID: u32 = 10_001;

/// Maximum restaurant name length in bytes.
pub const MAX_NAME_LEN: u32 = 100;

// ── Error codes ───────────────────────────────────────────────────────────────

#[soroban_sdk::contracterror]
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[repr(u32)]
pub enum ContractError {
    NotInitialized = 1,
    AlreadyInitialized = 2,
    Unauthorized = 3,
    InvalidInput = 4,
    InvalidConfig = 5,
    SurveyNotFound = 6,
    SurveyNotActive = 7,
    AlreadySubmitted = 8,
    InvalidInputProof = 9,
    InvalidKmsSignatures = 10,
    NoHandleFoundForRequestId = 11,
    HandlesAlreadySavedForRequestId = 12,
    WrongRequestKind = 13,
    InvalidCleartexts = 14,
}

// ── Configuration ─────────────────────────────────────────────────────────────

#[contracttype]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct SurveyConfig {
    /// The only address allowed to deliver decryption callbacks.
    pub oracle: Address,
    /// Ed25519 keys of the key-management committee.
    pub kms_signers: Vec<BytesN<32>>,
    /// Distinct committee signatures required on a cleartext bundle.
    pub kms_threshold: u32,
    /// Ed25519 keys allowed to sign input proofs.
    pub input_verifiers: Vec<BytesN<32>>,
    pub public_key: PaillierPublicKey,
    /// Register a range-check request for every submission.
    pub rating_verification: bool,
}

impl SurveyConfig {
    fn validate(&self) -> Result<(), ContractError> {
        let signers = self.kms_signers.len();
        if self.kms_threshold == 0 || self.kms_threshold > signers {
            return Err(ContractError::InvalidConfig);
        }
        if has_duplicates(&self.kms_signers) || has_duplicates(&self.input_verifiers) {
            return Err(ContractError::InvalidConfig);
        }
        if self.input_verifiers.is_empty() || !self.public_key.is_well_formed() {
            return Err(ContractError::InvalidConfig);
        }
        Ok(())
    }
}

fn has_duplicates(keys: &Vec<BytesN<32>>) -> bool {
    for i in 0..keys.len() {
        for j in (i + 1)..keys.len() {
            if keys.get(i) == keys.get(j) {
                return true;
            }
        }
    }
    false
}

// ── Contract ──────────────────────────────────────────────────────────────────

#[contract]
pub struct ConfidentialSurveyContract;

#[contractimpl]
impl ConfidentialSurveyContract {
    // ── Initialisation ────────────────────────────────────────────────────────

    pub fn initialize(env: Env, admin: Address, config: SurveyConfig) -> Result<(), ContractError> {
        if env.storage().instance().has(&INITIALIZED) {
            return Err(ContractError::AlreadyInitialized);
        }
        admin.require_auth();
        config.validate()?;

        env.storage().instance().set(&ADMIN, &admin);
        env.storage().instance().set(&CONFIG, &config);
        env.storage().instance().set(&INITIALIZED, &true);

        events::publish_initialized(&env, &admin);
        Ok(())
    }

    // ── Survey lifecycle ──────────────────────────────────────────────────────

    /// Open a new survey owned by `owner`. Returns its id.
    pub fn start_survey(
        env: Env,
        owner: Address,
        restaurant_name: String,
    ) -> Result<u64, ContractError> {
        let config = Self::load_config(&env)?;
        owner.require_auth();

        if restaurant_name.is_empty() || restaurant_name.len() > MAX_NAME_LEN {
            return Err(ContractError::InvalidInput);
        }

        let id = survey::next_id(&env);
        let survey = Survey::new(&env, id, owner, restaurant_name, &config.public_key);
        survey::store(&env, &survey);

        log!(&env, "survey started", id);
        events::publish_survey_started(&env, &survey);
        Ok(id)
    }

    /// Submit one sealed rating triple.
    ///
    /// All three inputs are checked against their proofs before anything is
    /// written. On success the sums and the sealed response counter are
    /// updated and, when rating verification is enabled, a verification
    /// request is registered; its id is returned (0 otherwise).
    pub fn submit_rating(
        env: Env,
        respondent: Address,
        survey_id: u64,
        sealed_quality: i128,
        sealed_price: i128,
        sealed_ambiance: i128,
        proof_quality: InputProof,
        proof_price: InputProof,
        proof_ambiance: InputProof,
    ) -> Result<u64, ContractError> {
        let config = Self::load_config(&env)?;
        respondent.require_auth();

        let mut survey = survey::load(&env, survey_id).ok_or(ContractError::SurveyNotFound)?;
        if !survey.is_active() {
            return Err(ContractError::SurveyNotActive);
        }
        if submission::has_submitted(&env, survey_id, &respondent) {
            return Err(ContractError::AlreadySubmitted);
        }

        let quality = SealedValue::from_external_input(
            &env,
            &config,
            &respondent,
            sealed_quality,
            &proof_quality,
        )?;
        let price =
            SealedValue::from_external_input(&env, &config, &respondent, sealed_price, &proof_price)?;
        let ambiance = SealedValue::from_external_input(
            &env,
            &config,
            &respondent,
            sealed_ambiance,
            &proof_ambiance,
        )?;

        let pk = &config.public_key;
        survey.quality_sum = survey.quality_sum.add(&quality, pk);
        survey.price_sum = survey.price_sum.add(&price, pk);
        survey.ambiance_sum = survey.ambiance_sum.add(&ambiance, pk);
        survey.response_count = survey.response_count.add(&SealedValue::one(pk), pk);
        survey::store(&env, &survey);

        let request_id = if config.rating_verification {
            decryption::register(
                &env,
                RequestKind::RatingVerification,
                survey_id,
                Some(respondent.clone()),
                vec![&env, quality.clone(), price.clone(), ambiance.clone()],
            )
        } else {
            0
        };

        let ratings = RespondentRatings {
            quality,
            price,
            ambiance,
            submitted_at: env.ledger().timestamp(),
            verification_request_id: request_id,
        };
        submission::store_ratings(&env, survey_id, &respondent, &ratings);
        submission::mark_submitted(&env, survey_id, &respondent);

        events::publish_rating_submitted(&env, &respondent, survey_id, request_id);
        Ok(request_id)
    }

    /// Close a survey and request decryption of its aggregates.
    ///
    /// The request covers, in order: quality sum, price sum, ambiance sum,
    /// response count. Returns the request id.
    pub fn end_survey(env: Env, caller: Address, survey_id: u64) -> Result<u64, ContractError> {
        Self::require_initialized(&env)?;
        caller.require_auth();

        let mut survey = survey::load(&env, survey_id).ok_or(ContractError::SurveyNotFound)?;
        if caller != survey.owner {
            return Err(ContractError::Unauthorized);
        }
        if !survey.is_active() {
            return Err(ContractError::SurveyNotActive);
        }

        let request_id = decryption::register(
            &env,
            RequestKind::Results,
            survey_id,
            None,
            vec![
                &env,
                survey.quality_sum.clone(),
                survey.price_sum.clone(),
                survey.ambiance_sum.clone(),
                survey.response_count.clone(),
            ],
        );

        survey.phase = SurveyPhase::ResultsPending;
        survey.results_request_id = request_id;
        survey.ended_at = env.ledger().timestamp();
        survey::store(&env, &survey);

        log!(&env, "survey ended", survey_id, request_id);
        events::publish_survey_ended(&env, survey_id, &survey.owner, request_id);
        Ok(request_id)
    }

    // ── Oracle callbacks ──────────────────────────────────────────────────────

    /// Deliver the decrypted aggregates of an ended survey.
    ///
    /// `cleartexts` holds four 32-byte words in request order. The committee
    /// attestation is verified before the replay guard, so a tampered
    /// attestation fails with `InvalidKmsSignatures` even for an id that was
    /// already fulfilled.
    pub fn callback_survey_results(
        env: Env,
        caller: Address,
        request_id: u64,
        cleartexts: Bytes,
        proof: DecryptionProof,
    ) -> Result<(), ContractError> {
        let config = Self::load_config(&env)?;
        Self::require_oracle(&config, &caller)?;

        let mut request = decryption::load_existing(&env, request_id)?;
        let digest = kms::attestation_digest(&env, &request, &cleartexts);
        kms::verify_attestation(&env, &config, &digest, &proof)?;
        decryption::ensure_pending(&request, RequestKind::Results)?;
        let [quality_sum, price_sum, ambiance_sum, response_count] =
            kms::decode_cleartexts::<4>(&cleartexts)?;

        let mut survey =
            survey::load(&env, request.survey_id).ok_or(ContractError::SurveyNotFound)?;
        let results = SurveyResults {
            survey_id: survey.id,
            request_id,
            quality_avg: survey::average(quality_sum, response_count),
            price_avg: survey::average(price_sum, response_count),
            ambiance_avg: survey::average(ambiance_sum, response_count),
            response_count,
            published_at: env.ledger().timestamp(),
        };

        decryption::mark_fulfilled(&env, &mut request);
        survey.phase = SurveyPhase::ResultsPublished;
        survey::store(&env, &survey);
        survey::store_results(&env, &results);

        log!(&env, "results published", survey.id, response_count);
        events::publish_results_decrypted(&env, &survey, &results);
        events::publish_decryption_fulfilled(&env, request_id);
        Ok(())
    }

    /// Deliver the decrypted ratings of one submission for range checking.
    ///
    /// An out-of-range rating is flagged on the survey; the aggregate sums,
    /// which already include it, are left untouched.
    pub fn callback_verify_rating(
        env: Env,
        caller: Address,
        request_id: u64,
        cleartexts: Bytes,
        proof: DecryptionProof,
    ) -> Result<(), ContractError> {
        let config = Self::load_config(&env)?;
        Self::require_oracle(&config, &caller)?;

        let mut request = decryption::load_existing(&env, request_id)?;
        let digest = kms::attestation_digest(&env, &request, &cleartexts);
        kms::verify_attestation(&env, &config, &digest, &proof)?;
        decryption::ensure_pending(&request, RequestKind::RatingVerification)?;
        let respondent = request
            .respondent
            .clone()
            .ok_or(ContractError::NoHandleFoundForRequestId)?;
        let ratings = kms::decode_cleartexts::<3>(&cleartexts)?;

        let mut survey =
            survey::load(&env, request.survey_id).ok_or(ContractError::SurveyNotFound)?;
        let within_bounds = submission::within_bounds(&ratings);
        if !within_bounds {
            survey.flagged_responses = survey.flagged_responses.saturating_add(1);
            survey::store(&env, &survey);
            log!(&env, "rating out of bounds", survey.id, respondent.clone());
        }

        let verdict = RatingVerdict {
            request_id,
            within_bounds,
            verified_at: env.ledger().timestamp(),
        };
        submission::store_verdict(&env, survey.id, &respondent, &verdict);
        decryption::mark_fulfilled(&env, &mut request);

        events::publish_rating_verified(&env, survey.id, &respondent, within_bounds);
        events::publish_decryption_fulfilled(&env, request_id);
        Ok(())
    }

    // ── Admin ─────────────────────────────────────────────────────────────────

    pub fn set_oracle(env: Env, caller: Address, oracle: Address) -> Result<(), ContractError> {
        let mut config = Self::load_admin_config(&env, &caller)?;
        config.oracle = oracle;
        Self::store_config(&env, &config, symbol_short!("oracle"))
    }

    pub fn set_kms_signers(
        env: Env,
        caller: Address,
        signers: Vec<BytesN<32>>,
        threshold: u32,
    ) -> Result<(), ContractError> {
        let mut config = Self::load_admin_config(&env, &caller)?;
        config.kms_signers = signers;
        config.kms_threshold = threshold;
        Self::store_config(&env, &config, symbol_short!("kms"))
    }

    pub fn set_input_verifiers(
        env: Env,
        caller: Address,
        verifiers: Vec<BytesN<32>>,
    ) -> Result<(), ContractError> {
        let mut config = Self::load_admin_config(&env, &caller)?;
        config.input_verifiers = verifiers;
        Self::store_config(&env, &config, symbol_short!("inputs"))
    }

    pub fn set_rating_verification(
        env: Env,
        caller: Address,
        enabled: bool,
    ) -> Result<(), ContractError> {
        let mut config = Self::load_admin_config(&env, &caller)?;
        config.rating_verification = enabled;
        Self::store_config(&env, &config, symbol_short!("verify"))
    }

    // ── View functions ────────────────────────────────────────────────────────

    pub fn protocol_id(_env: Env) -> u32 {
        PROTOCOL_ID
    }

    pub fn get_admin(env: Env) -> Result<Address, ContractError> {
        env.storage()
            .instance()
            .get(&ADMIN)
            .ok_or(ContractError::NotInitialized)
    }

    pub fn get_config(env: Env) -> Result<SurveyConfig, ContractError> {
        Self::load_config(&env)
    }

    pub fn get_current_survey_id(env: Env) -> u64 {
        survey::current_id(&env)
    }

    pub fn get_survey_info(env: Env, survey_id: u64) -> Result<SurveyInfo, ContractError> {
        let survey = survey::load(&env, survey_id).ok_or(ContractError::SurveyNotFound)?;
        Ok(SurveyInfo {
            is_active: survey.is_active(),
            owner: survey.owner,
            restaurant_name: survey.restaurant_name,
        })
    }

    pub fn get_survey(env: Env, survey_id: u64) -> Option<Survey> {
        survey::load(&env, survey_id)
    }

    pub fn get_survey_phase(env: Env, survey_id: u64) -> Option<SurveyPhase> {
        survey::load(&env, survey_id).map(|s| s.phase)
    }

    pub fn is_survey_active(env: Env, survey_id: u64) -> bool {
        survey::load(&env, survey_id)
            .map(|s| s.is_active())
            .unwrap_or(false)
    }

    pub fn get_survey_results(env: Env, survey_id: u64) -> Option<SurveyResults> {
        survey::load_results(&env, survey_id)
    }

    pub fn get_has_submitted(env: Env, survey_id: u64, respondent: Address) -> bool {
        submission::has_submitted(&env, survey_id, &respondent)
    }

    pub fn get_quality_rating(env: Env, survey_id: u64, respondent: Address) -> Option<SealedValue> {
        submission::load_ratings(&env, survey_id, &respondent).map(|r| r.quality)
    }

    pub fn get_price_rating(env: Env, survey_id: u64, respondent: Address) -> Option<SealedValue> {
        submission::load_ratings(&env, survey_id, &respondent).map(|r| r.price)
    }

    pub fn get_ambiance_rating(
        env: Env,
        survey_id: u64,
        respondent: Address,
    ) -> Option<SealedValue> {
        submission::load_ratings(&env, survey_id, &respondent).map(|r| r.ambiance)
    }

    pub fn get_rating_verdict(
        env: Env,
        survey_id: u64,
        respondent: Address,
    ) -> Option<RatingVerdict> {
        submission::load_verdict(&env, survey_id, &respondent)
    }

    pub fn get_decryption_request(env: Env, request_id: u64) -> Option<DecryptionRequest> {
        decryption::load(&env, request_id)
    }

    pub fn get_current_request_id(env: Env) -> u64 {
        decryption::current_id(&env)
    }

    /// The digest the KMS committee must sign for `cleartexts` to be
    /// accepted as the answer to `request_id`.
    pub fn decryption_digest(
        env: Env,
        request_id: u64,
        cleartexts: Bytes,
    ) -> Result<BytesN<32>, ContractError> {
        let request =
            decryption::load(&env, request_id).ok_or(ContractError::NoHandleFoundForRequestId)?;
        Ok(kms::attestation_digest(&env, &request, &cleartexts))
    }

    /// The digest an input verifier must sign to vouch for `ciphertext`
    /// submitted by `respondent`.
    pub fn input_digest(env: Env, respondent: Address, ciphertext: i128) -> BytesN<32> {
        sealed::input_digest(&env, &respondent, ciphertext)
    }

    // ── Internal helpers ──────────────────────────────────────────────────────

    fn require_initialized(env: &Env) -> Result<(), ContractError> {
        if !env.storage().instance().has(&INITIALIZED) {
            return Err(ContractError::NotInitialized);
        }
        Ok(())
    }

    fn load_config(env: &Env) -> Result<SurveyConfig, ContractError> {
        env.storage()
            .instance()
            .get(&CONFIG)
            .ok_or(ContractError::NotInitialized)
    }

    fn load_admin_config(env: &Env, caller: &Address) -> Result<SurveyConfig, ContractError> {
        let config = Self::load_config(env)?;
        caller.require_auth();
        let admin: Address = env
            .storage()
            .instance()
            .get(&ADMIN)
            .ok_or(ContractError::NotInitialized)?;
        if *caller != admin {
            return Err(ContractError::Unauthorized);
        }
        Ok(config)
    }

    fn store_config(env: &Env, config: &SurveyConfig, field: Symbol) -> Result<(), ContractError> {
        config.validate()?;
        env.storage().instance().set(&CONFIG, config);
        events::publish_config_updated(env, field);
        Ok(())
    }

    fn require_oracle(config: &SurveyConfig, caller: &Address) -> Result<(), ContractError> {
        caller.require_auth();
        if *caller != config.oracle {
            return Err(ContractError::Unauthorized);
        }
        Ok(())
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
