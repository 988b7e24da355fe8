//! # Confidential Survey Integration Tests
//!
//! - Property-based tests over rating panels
//! - Action-sequence exploration with invariant checks
//! - Oracle misbehaviour (replay, forged cleartexts)

extern crate std;

use proptest::prelude::*;
use soroban_sdk::testutils::Address as _;
use soroban_sdk::Address;

use confidential_survey::kms::encode_cleartexts;
use confidential_survey::survey::SurveyPhase;
use confidential_survey::ContractError;
use test_framework::generators::*;
use test_framework::invariants::*;
use test_framework::*;

fn truncated_mean(values: impl Iterator<Item = u64>, count: u64) -> u64 {
    let sum: u64 = values.sum();
    if count == 0 {
        0
    } else {
        sum / count
    }
}

// ═════════════════════════════════════════════════════════════════════════════
//  Property-Based Tests
// ═════════════════════════════════════════════════════════════════════════════

proptest! {
    #![proptest_config(ProptestConfig::with_cases(30))]

    /// **Property**: published averages are the truncated means of the
    /// submitted ratings.
    #[test]
    fn prop_published_averages_are_truncated_means(panel in panel_strategy(8)) {
        let mut env = TestEnv::new();
        let harness = SurveyHarness::new(&mut env, false);
        let survey = harness.start_survey("Pho House");

        for ratings in panel.iter() {
            let respondent = harness.create_respondent();
            prop_assert_eq!(harness.submit(&respondent, survey, *ratings), Ok(0));
        }
        let request = harness.end_survey(survey).unwrap();
        harness.deliver_results(request).unwrap();

        let n = panel.len() as u64;
        let results = harness.client.get_survey_results(&survey).unwrap();
        prop_assert_eq!(results.response_count, n);
        prop_assert_eq!(results.quality_avg, truncated_mean(panel.iter().map(|r| r.0), n));
        prop_assert_eq!(results.price_avg, truncated_mean(panel.iter().map(|r| r.1), n));
        prop_assert_eq!(results.ambiance_avg, truncated_mean(panel.iter().map(|r| r.2), n));
    }

    /// **Property**: the sealed aggregates do not depend on submission order.
    #[test]
    fn prop_aggregation_order_independent((panel, order) in shuffled_panel_strategy(6)) {
        let mut env = TestEnv::new();
        let harness = SurveyHarness::new(&mut env, false);
        let in_order = harness.start_survey("In order");
        let shuffled = harness.start_survey("Shuffled");
        let respondents: std::vec::Vec<Address> =
            panel.iter().map(|_| harness.create_respondent()).collect();

        for (who, ratings) in respondents.iter().zip(panel.iter()) {
            harness.submit(who, in_order, *ratings).unwrap();
        }
        for idx in order {
            harness.submit(&respondents[idx], shuffled, panel[idx]).unwrap();
        }

        let a = harness.client.get_survey(&in_order).unwrap();
        let b = harness.client.get_survey(&shuffled).unwrap();
        prop_assert_eq!(a.quality_sum, b.quality_sum);
        prop_assert_eq!(a.price_sum, b.price_sum);
        prop_assert_eq!(a.ambiance_sum, b.ambiance_sum);
        prop_assert_eq!(a.response_count, b.response_count);
    }

    /// **Property**: fresh blinding changes ciphertexts but never the
    /// decrypted sums.
    #[test]
    fn prop_blinding_does_not_affect_sums(
        ratings in ratings_strategy(),
        r1 in blinding_strategy(),
        r2 in blinding_strategy(),
        r3 in blinding_strategy(),
    ) {
        let mut env = TestEnv::new();
        let harness = SurveyHarness::new(&mut env, false);
        let survey = harness.start_survey("Pho House");
        let respondent = harness.create_respondent();
        harness.submit_blinded(&respondent, survey, ratings, (r1, r2, r3)).unwrap();

        let respondents = [respondent];
        let snap = harness.snapshot(survey, &respondents);
        prop_assert_eq!((snap.quality_sum, snap.price_sum, snap.ambiance_sum), ratings);
        prop_assert_eq!(snap.response_count, 1);
    }

    /// **Property**: a second submission by the same respondent is rejected
    /// and leaves the aggregates untouched.
    #[test]
    fn prop_duplicate_submission_never_counts(
        first in ratings_strategy(),
        second in ratings_strategy(),
    ) {
        let mut env = TestEnv::new();
        let harness = SurveyHarness::new(&mut env, false);
        let survey = harness.start_survey("Pho House");
        let respondent = harness.create_respondent();

        harness.submit(&respondent, survey, first).unwrap();
        let respondents = [respondent.clone()];
        let before = harness.snapshot(survey, &respondents);

        prop_assert_eq!(
            harness.submit(&respondent, survey, second),
            Err(ContractError::AlreadySubmitted)
        );
        let after = harness.snapshot(survey, &respondents);
        prop_assert_eq!(before.sealed_sums, after.sealed_sums);
        prop_assert_eq!(after.response_count, 1);
    }

    /// **Property**: out-of-range ratings are accepted into the sums and then
    /// flagged by the verification callback.
    #[test]
    fn prop_out_of_range_ratings_flagged(ratings in invalid_ratings_strategy()) {
        let mut env = TestEnv::new();
        let harness = SurveyHarness::new(&mut env, true);
        let survey = harness.start_survey("Pho House");
        let respondent = harness.create_respondent();

        let request = harness.submit(&respondent, survey, ratings).unwrap();
        harness.deliver_verification(request).unwrap();

        let verdict = harness.client.get_rating_verdict(&survey, &respondent).unwrap();
        prop_assert!(!verdict.within_bounds);
        let stored = harness.client.get_survey(&survey).unwrap();
        prop_assert_eq!(stored.flagged_responses, 1);
        prop_assert_eq!(harness.oracle.decrypt(stored.quality_sum.ciphertext), ratings.0);
    }

    /// **Property**: in-range ratings always pass verification.
    #[test]
    fn prop_in_range_ratings_pass_verification(ratings in ratings_strategy()) {
        let mut env = TestEnv::new();
        let harness = SurveyHarness::new(&mut env, true);
        let survey = harness.start_survey("Pho House");
        let respondent = harness.create_respondent();

        let request = harness.submit(&respondent, survey, ratings).unwrap();
        prop_assert!(request > 0);
        harness.deliver_verification(request).unwrap();

        let verdict = harness.client.get_rating_verdict(&survey, &respondent).unwrap();
        prop_assert!(verdict.within_bounds);
        prop_assert_eq!(harness.client.get_survey(&survey).unwrap().flagged_responses, 0);
    }

    /// **Property**: once fulfilled, a request rejects any redelivery.
    #[test]
    fn prop_replay_always_rejected(forged in prop::collection::vec(0u64..=1_000u64, 4..=4)) {
        let mut env = TestEnv::new();
        let harness = SurveyHarness::new(&mut env, false);
        let survey = harness.start_survey("Pho House");
        harness.submit(&harness.create_respondent(), survey, (5, 6, 7)).unwrap();
        let request = harness.end_survey(survey).unwrap();
        harness.deliver_results(request).unwrap();
        let published = harness.client.get_survey_results(&survey);

        let cleartexts = encode_cleartexts(&harness.env.env, &forged);
        let proof = harness.attest(request, &cleartexts).unwrap();
        let replay = contract_result(harness.client.try_callback_survey_results(
            &harness.oracle.address,
            &request,
            &cleartexts,
            &proof,
        ));
        prop_assert_eq!(replay, Err(ContractError::HandlesAlreadySavedForRequestId));
        prop_assert_eq!(harness.client.get_survey_results(&survey), published);
    }
}

// ═════════════════════════════════════════════════════════════════════════════
//  Action-Sequence Exploration
// ═════════════════════════════════════════════════════════════════════════════

fn run_sequence(actions: &[SurveyAction], rating_verification: bool) -> TestRunSummary {
    let mut env = TestEnv::new();
    let respondents = env.generate_addresses(5);
    let harness = SurveyHarness::new(&mut env, rating_verification);
    let survey = harness.start_survey("Explorer Diner");

    let snapshot_invariants = InvariantSet::survey_defaults();
    let transition_invariants = TransitionInvariantSet::survey_defaults();
    let mut summary = TestRunSummary::new();

    let mut before = harness.snapshot(survey, &respondents);
    for action in actions {
        let outcome = harness.apply(survey, &respondents, action);
        summary.actions_executed += 1;
        if outcome != ActionOutcome::Ok {
            summary.actions_rejected += 1;
        }

        let after = harness.snapshot(survey, &respondents);
        for (name, msg) in snapshot_invariants
            .check_all(&after)
            .into_iter()
            .chain(transition_invariants.check_all(&before, &after))
        {
            summary
                .invariant_violations
                .push(std::format!("after {:?}: [{}] {}", action, name, msg));
        }
        summary.invariant_checks += 1;
        before = after;
    }
    summary
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(20))]

    #[test]
    fn prop_action_sequences_preserve_invariants(actions in survey_action_sequence(5, 25)) {
        let summary = run_sequence(&actions, false);
        prop_assert!(summary.passed(), "{:?}", summary.invariant_violations);
        prop_assert_eq!(summary.invariant_checks, actions.len());
    }

    #[test]
    fn prop_action_sequences_with_verification(actions in survey_action_sequence(5, 25)) {
        let summary = run_sequence(&actions, true);
        prop_assert!(summary.passed(), "{:?}", summary.invariant_violations);
    }
}

// ═════════════════════════════════════════════════════════════════════════════
//  Scenarios
// ═════════════════════════════════════════════════════════════════════════════

#[test]
fn test_pho_house_through_harness() {
    let mut env = TestEnv::new();
    env.set_timestamp(1_000);
    let harness = SurveyHarness::new(&mut env, false);

    let survey = harness.start_survey("Pho House");
    assert_eq!(survey, 1);
    let alice = harness.create_respondent();
    let bob = harness.create_respondent();
    harness.submit(&alice, survey, (8, 6, 9)).unwrap();
    harness.submit(&bob, survey, (6, 8, 7)).unwrap();

    harness.env.advance_time(3_600);
    let request = harness.end_survey(survey).unwrap();
    assert_eq!(
        harness.end_survey(survey),
        Err(ContractError::SurveyNotActive)
    );
    harness.deliver_results(request).unwrap();

    let results = harness.client.get_survey_results(&survey).unwrap();
    assert_eq!(
        (results.quality_avg, results.price_avg, results.ambiance_avg),
        (7, 7, 8)
    );
    assert_eq!(results.response_count, 2);
    assert_eq!(results.published_at, 4_600);
    assert_eq!(
        harness.client.get_survey_phase(&survey),
        Some(SurveyPhase::ResultsPublished)
    );
    assert_eq!(
        harness.deliver_results(request),
        Err(ContractError::HandlesAlreadySavedForRequestId)
    );

    let snapshot = harness.snapshot(survey, &[alice, bob]);
    InvariantSet::survey_defaults().assert_all(&snapshot);
}

#[test]
fn test_forged_results_rejected() {
    let mut env = TestEnv::new();
    let respondents = env.generate_addresses(2);
    let harness = SurveyHarness::new(&mut env, false);
    let survey = harness.start_survey("Pho House");
    for who in respondents.iter() {
        harness.submit(who, survey, (4, 4, 4)).unwrap();
    }
    harness.end_survey(survey).unwrap();

    let outcome = harness.apply(
        survey,
        &respondents,
        &SurveyAction::ForgeResults {
            values: std::vec![10, 10, 10, 2],
        },
    );
    assert_eq!(
        outcome,
        ActionOutcome::ExpectedError(ContractError::InvalidKmsSignatures as u32)
    );
    assert!(harness.client.get_survey_results(&survey).is_none());

    assert_eq!(
        harness.apply(survey, &respondents, &SurveyAction::DeliverResults),
        ActionOutcome::Ok
    );
    assert_eq!(harness.client.get_survey_results(&survey).unwrap().quality_avg, 4);
}

#[test]
fn test_surveys_are_isolated() {
    let mut env = TestEnv::new();
    let harness = SurveyHarness::new(&mut env, false);
    let first = harness.start_survey("First");
    let second = harness.start_survey("Second");
    let respondent = harness.create_respondent();

    harness.submit(&respondent, first, (10, 10, 10)).unwrap();
    harness.submit(&respondent, second, (2, 2, 2)).unwrap();
    let request = harness.end_survey(first).unwrap();
    harness.deliver_results(request).unwrap();

    assert_eq!(harness.client.get_survey_results(&first).unwrap().quality_avg, 10);
    assert!(harness.client.is_survey_active(&second));
    assert!(harness.client.get_survey_results(&second).is_none());

    let stranger = Address::generate(&harness.env.env);
    assert!(!harness.client.get_has_submitted(&second, &stranger));
}

#[test]
fn test_invariant_set_reports_violations() {
    let mut env = TestEnv::new();
    let respondents = env.generate_addresses(1);
    let harness = SurveyHarness::new(&mut env, false);
    let survey = harness.start_survey("Pho House");
    harness.submit(&respondents[0], survey, (3, 3, 3)).unwrap();

    let mut snapshot = harness.snapshot(survey, &respondents);
    let set = InvariantSet::survey_defaults();
    assert_eq!(set.len(), 4);
    assert!(set.check_all(&snapshot).is_empty());

    snapshot.response_count = 2;
    let violations = set.check_all(&snapshot);
    assert!(violations
        .iter()
        .any(|(name, _)| name == "response_count == |submitted|"));
}
