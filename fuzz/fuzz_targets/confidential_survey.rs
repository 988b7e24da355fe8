#![no_main]

//! Fuzz harness for `confidential_survey`.
//!
//! Drives one survey through arbitrary submissions, lifecycle calls and
//! oracle callbacks, honest or not. Every call must end in success or a
//! contract error (never a host trap), and after every action:
//!
//! - the sealed response counter opens to the number of submitters
//! - published results never change

use arbitrary::Arbitrary;
use confidential_survey::{
    kms::{encode_cleartexts, DecryptionProof, KmsSignature},
    paillier::{self, PaillierPrivateKey, PaillierPublicKey},
    sealed::InputProof,
    ConfidentialSurveyContract, ConfidentialSurveyContractClient, SurveyConfig,
};
use ed25519_dalek::{Signer, SigningKey};
use libfuzzer_sys::fuzz_target;
use soroban_sdk::{
    testutils::{Address as _, Ledger as _},
    Address, Bytes, BytesN, Env, String, Vec,
};

#[derive(Arbitrary, Debug)]
pub enum FuzzAction {
    /// Honestly sealed and proven ratings, any values.
    Submit {
        who: u8,
        quality: u8,
        price: u8,
        ambiance: u8,
        blinding: u16,
    },
    /// Unchecked ciphertext with a junk proof.
    SubmitRaw {
        who: u8,
        ciphertext: i128,
        signature: [u8; 64],
    },
    EndSurvey { by_owner: bool },
    /// Honest answer to any request id.
    Answer { request_id: u8, results: bool },
    /// Honest answer with one bit of the bundle or a signature flipped.
    Tampered {
        request_id: u8,
        bit: u16,
        in_signature: bool,
    },
    /// Entirely attacker-chosen callback.
    RawCallback {
        request_id: u8,
        cleartexts: std::vec::Vec<u8>,
        signature: [u8; 64],
        results: bool,
    },
    AdvanceTime { delta: u16 },
}

struct World {
    env: Env,
    client: ConfidentialSurveyContractClient<'static>,
    owner: Address,
    oracle: Address,
    users: std::vec::Vec<Address>,
    committee: std::vec::Vec<SigningKey>,
    verifier: SigningKey,
    pk: PaillierPublicKey,
    sk: PaillierPrivateKey,
    survey: u64,
}

/// Unwraps a `try_*` result; host traps and conversion failures are bugs.
fn settle<T, C: core::fmt::Debug, E: core::fmt::Debug, I: core::fmt::Debug>(
    result: Result<Result<T, C>, Result<E, I>>,
) -> Option<T> {
    match result {
        Ok(Ok(value)) => Some(value),
        Err(Ok(_)) => None,
        Ok(Err(conversion)) => panic!("conversion error: {:?}", conversion),
        Err(Err(invoke)) => panic!("host trap: {:?}", invoke),
    }
}

fn key_bytes(env: &Env, key: &SigningKey) -> BytesN<32> {
    BytesN::from_array(env, &key.verifying_key().to_bytes())
}

impl World {
    fn new(rating_verification: bool) -> Self {
        let env = Env::default();
        env.mock_all_auths();
        let contract_id = env.register(ConfidentialSurveyContract, ());
        let client = ConfidentialSurveyContractClient::new(&env, &contract_id);

        let admin = Address::generate(&env);
        let owner = Address::generate(&env);
        let oracle = Address::generate(&env);
        let users = (0..4).map(|_| Address::generate(&env)).collect();
        let committee: std::vec::Vec<SigningKey> =
            (1..=3u8).map(|i| SigningKey::from_bytes(&[i; 32])).collect();
        let verifier = SigningKey::from_bytes(&[0x42; 32]);
        let (pk, sk) = paillier::keypair(1009, 1013);

        let mut kms_signers = Vec::new(&env);
        for key in committee.iter() {
            kms_signers.push_back(key_bytes(&env, key));
        }
        let mut input_verifiers = Vec::new(&env);
        input_verifiers.push_back(key_bytes(&env, &verifier));
        let config = SurveyConfig {
            oracle: oracle.clone(),
            kms_signers,
            kms_threshold: 2,
            input_verifiers,
            public_key: pk.clone(),
            rating_verification,
        };
        client.initialize(&admin, &config);
        let survey = client.start_survey(&owner, &String::from_str(&env, "Fuzz Grill"));

        Self {
            env,
            client,
            owner,
            oracle,
            users,
            committee,
            verifier,
            pk,
            sk,
            survey,
        }
    }

    fn seal(&self, who: &Address, rating: u8, blinding: i128) -> (i128, InputProof) {
        let ciphertext = paillier::encrypt(&self.pk, rating as i128, blinding);
        let digest = self.client.input_digest(who, &ciphertext);
        let signature = self.verifier.sign(&digest.to_array());
        let proof = InputProof {
            verifier: key_bytes(&self.env, &self.verifier),
            signature: BytesN::from_array(&self.env, &signature.to_bytes()),
        };
        (ciphertext, proof)
    }

    fn answer(&self, request_id: u64) -> Option<(Bytes, DecryptionProof)> {
        let request = self.client.get_decryption_request(&request_id)?;
        let plain: std::vec::Vec<u64> = request
            .ciphertexts
            .iter()
            .map(|c| paillier::decrypt(&self.pk, &self.sk, c) as u64)
            .collect();
        let cleartexts = encode_cleartexts(&self.env, &plain);
        let digest = self.client.decryption_digest(&request_id, &cleartexts);
        let mut signatures = Vec::new(&self.env);
        for key in self.committee.iter().take(2) {
            signatures.push_back(KmsSignature {
                signer: key_bytes(&self.env, key),
                signature: BytesN::from_array(&self.env, &key.sign(&digest.to_array()).to_bytes()),
            });
        }
        Some((cleartexts, DecryptionProof { signatures }))
    }

    fn callback(&self, results: bool, request_id: u64, cleartexts: &Bytes, proof: &DecryptionProof) {
        if results {
            settle(self.client.try_callback_survey_results(
                &self.oracle,
                &request_id,
                cleartexts,
                proof,
            ));
        } else {
            settle(self.client.try_callback_verify_rating(
                &self.oracle,
                &request_id,
                cleartexts,
                proof,
            ));
        }
    }

    fn apply(&self, action: FuzzAction) {
        match action {
            FuzzAction::Submit {
                who,
                quality,
                price,
                ambiance,
                blinding,
            } => {
                let who = &self.users[who as usize % self.users.len()];
                // Blinding factors below the smaller prime stay coprime with n.
                let r = 2 + (blinding as i128 % 1000);
                let (q, q_proof) = self.seal(who, quality, r);
                let (p, p_proof) = self.seal(who, price, r + 1);
                let (a, a_proof) = self.seal(who, ambiance, r + 2);
                settle(self.client.try_submit_rating(
                    who,
                    &self.survey,
                    &q,
                    &p,
                    &a,
                    &q_proof,
                    &p_proof,
                    &a_proof,
                ));
            }
            FuzzAction::SubmitRaw {
                who,
                ciphertext,
                signature,
            } => {
                let who = &self.users[who as usize % self.users.len()];
                let proof = InputProof {
                    verifier: key_bytes(&self.env, &self.verifier),
                    signature: BytesN::from_array(&self.env, &signature),
                };
                let accepted = settle(self.client.try_submit_rating(
                    who,
                    &self.survey,
                    &ciphertext,
                    &ciphertext,
                    &ciphertext,
                    &proof,
                    &proof,
                    &proof,
                ));
                assert!(accepted.is_none(), "unsigned ciphertext accepted");
            }
            FuzzAction::EndSurvey { by_owner } => {
                let caller = if by_owner {
                    self.owner.clone()
                } else {
                    self.users[0].clone()
                };
                settle(self.client.try_end_survey(&caller, &self.survey));
            }
            FuzzAction::Answer {
                request_id,
                results,
            } => {
                if let Some((cleartexts, proof)) = self.answer(request_id as u64) {
                    self.callback(results, request_id as u64, &cleartexts, &proof);
                }
            }
            FuzzAction::Tampered {
                request_id,
                bit,
                in_signature,
            } => {
                let request_id = request_id as u64;
                let Some((cleartexts, mut proof)) = self.answer(request_id) else {
                    return;
                };
                let before = self.client.get_decryption_request(&request_id);
                let mut cleartexts = cleartexts;
                if in_signature {
                    let mut entry = proof.signatures.get(0).unwrap();
                    let mut raw = entry.signature.to_array();
                    let bit = bit as usize % 512;
                    raw[bit / 8] ^= 1 << (bit % 8);
                    entry.signature = BytesN::from_array(&self.env, &raw);
                    proof.signatures.set(0, entry);
                } else if !cleartexts.is_empty() {
                    let bit = bit as u32 % (cleartexts.len() * 8);
                    let byte = cleartexts.get(bit / 8).unwrap_or(0);
                    cleartexts.set(bit / 8, byte ^ (1 << (bit % 8)));
                }
                self.callback(true, request_id, &cleartexts, &proof);
                self.callback(false, request_id, &cleartexts, &proof);
                assert_eq!(
                    before,
                    self.client.get_decryption_request(&request_id),
                    "tampered callback changed request state"
                );
            }
            FuzzAction::RawCallback {
                request_id,
                cleartexts,
                signature,
                results,
            } => {
                let proof = DecryptionProof {
                    signatures: soroban_sdk::vec![
                        &self.env,
                        KmsSignature {
                            signer: key_bytes(&self.env, &self.committee[0]),
                            signature: BytesN::from_array(&self.env, &signature),
                        }
                    ],
                };
                let bundle = Bytes::from_slice(&self.env, &cleartexts);
                self.callback(results, request_id as u64, &bundle, &proof);
            }
            FuzzAction::AdvanceTime { delta } => {
                let now = self.env.ledger().timestamp();
                self.env.ledger().set_timestamp(now + delta as u64);
            }
        }
    }

    fn check(&self, published: &mut Option<confidential_survey::survey::SurveyResults>) {
        let survey = self.client.get_survey(&self.survey).unwrap();
        let submitters = self
            .users
            .iter()
            .filter(|u| self.client.get_has_submitted(&self.survey, u))
            .count() as i128;
        let count = paillier::decrypt(&self.pk, &self.sk, survey.response_count.ciphertext);
        assert_eq!(count, submitters, "sealed count drifted from submitters");

        let current = self.client.get_survey_results(&self.survey);
        if published.is_some() {
            assert_eq!(*published, current, "published results changed");
        } else {
            *published = current;
        }
    }
}

fuzz_target!(|input: (bool, std::vec::Vec<FuzzAction>)| {
    let (rating_verification, actions) = input;
    let world = World::new(rating_verification);
    let mut published = None;

    for action in actions.into_iter().take(64) {
        world.apply(action);
        world.check(&mut published);
    }
});
