//! P2PK-locked proofs through the swap state machine.

mod common;

use common::{blind_random, blind_secret, p2pk_witness, setup, unblind};
use runemint_common::Error;
use runemint_protocol::{Amount, MintRequest, Proof, Secret, SecretKey, SwapRequest};

/// Mint one proof whose secret carries P2PK conditions.
async fn mint_locked_proof(t: &common::TestMint, secret: Secret, amount: u64) -> Proof {
    let quote = t
        .mint
        .create_mint_quote(Amount::from(amount))
        .await
        .expect("quote");
    t.fund_quote(&quote, 7, amount as u128);

    let keyset = t.active_keyset().await;
    let (output, secret, r) = blind_secret(keyset.id, Amount::from(amount), secret);
    let response = t
        .mint
        .mint_tokens(MintRequest {
            quote: quote.quote,
            outputs: vec![output],
        })
        .await
        .expect("issue");

    let signature = response.signatures[0];
    let mint_key = keyset.keys.amount_key(signature.amount).expect("key");
    unblind(signature.c, &r, mint_key, signature.amount, keyset.id, secret)
}

fn p2pk_secret(owner: &SecretKey, tags: serde_json::Value) -> Secret {
    Secret::new(
        serde_json::json!([
            "P2PK",
            {
                "nonce": "b8e977e4a0c7c2e85a4d4e9c8e30b23a889e9defd0e797d3e1b6c88da08a5e1d",
                "data": owner.public_key().to_hex(),
                "tags": tags
            }
        ])
        .to_string(),
    )
}

#[tokio::test]
async fn locked_proof_needs_a_witness() {
    let t = setup().await;
    let owner = SecretKey::from_slice(&[21u8; 32]).expect("key");
    let proof = mint_locked_proof(&t, p2pk_secret(&owner, serde_json::json!([])), 32).await;

    let keyset = t.active_keyset().await;
    let (output, _, _) = blind_random(keyset.id, Amount::from(32));
    let err = t
        .mint
        .process_swap(SwapRequest {
            inputs: vec![proof],
            outputs: vec![output],
        })
        .await
        .expect_err("no witness");
    assert!(matches!(err, Error::P2PKVerificationFailed(_)));
}

#[tokio::test]
async fn valid_signature_unlocks_the_proof() {
    let t = setup().await;
    let owner = SecretKey::from_slice(&[21u8; 32]).expect("key");
    let mut proof = mint_locked_proof(&t, p2pk_secret(&owner, serde_json::json!([])), 32).await;

    proof.witness = Some(p2pk_witness(&proof, &[&owner]));

    let keyset = t.active_keyset().await;
    let (output, _, _) = blind_random(keyset.id, Amount::from(32));
    let response = t
        .mint
        .process_swap(SwapRequest {
            inputs: vec![proof],
            outputs: vec![output],
        })
        .await
        .expect("witnessed swap");
    assert_eq!(response.signatures.len(), 1);
}

#[tokio::test]
async fn wrong_signer_is_rejected() {
    let t = setup().await;
    let owner = SecretKey::from_slice(&[21u8; 32]).expect("key");
    let stranger = SecretKey::from_slice(&[22u8; 32]).expect("key");
    let mut proof = mint_locked_proof(&t, p2pk_secret(&owner, serde_json::json!([])), 32).await;

    proof.witness = Some(p2pk_witness(&proof, &[&stranger]));

    let keyset = t.active_keyset().await;
    let (output, _, _) = blind_random(keyset.id, Amount::from(32));
    let err = t
        .mint
        .process_swap(SwapRequest {
            inputs: vec![proof],
            outputs: vec![output],
        })
        .await
        .expect_err("stranger's signature");
    assert!(matches!(err, Error::P2PKVerificationFailed(_)));
}

#[tokio::test]
async fn two_of_two_multisig_is_enforced() {
    let t = setup().await;
    let alice = SecretKey::from_slice(&[21u8; 32]).expect("key");
    let bob = SecretKey::from_slice(&[22u8; 32]).expect("key");

    let secret = p2pk_secret(
        &alice,
        serde_json::json!([
            ["pubkeys", bob.public_key().to_hex()],
            ["n_sigs", "2"]
        ]),
    );
    let mut proof = mint_locked_proof(&t, secret, 64).await;
    let keyset = t.active_keyset().await;

    proof.witness = Some(p2pk_witness(&proof, &[&alice]));
    let (output, _, _) = blind_random(keyset.id, Amount::from(64));
    let err = t
        .mint
        .process_swap(SwapRequest {
            inputs: vec![proof.clone()],
            outputs: vec![output],
        })
        .await
        .expect_err("one of two");
    assert!(matches!(err, Error::P2PKVerificationFailed(_)));

    proof.witness = Some(p2pk_witness(&proof, &[&alice, &bob]));
    let (output, _, _) = blind_random(keyset.id, Amount::from(64));
    t.mint
        .process_swap(SwapRequest {
            inputs: vec![proof],
            outputs: vec![output],
        })
        .await
        .expect("two of two");
}

#[tokio::test]
async fn sig_all_inputs_are_refused() {
    let t = setup().await;
    let owner = SecretKey::from_slice(&[21u8; 32]).expect("key");
    let secret = p2pk_secret(&owner, serde_json::json!([["sigflag", "SIG_ALL"]]));
    let mut proof = mint_locked_proof(&t, secret, 32).await;
    proof.witness = Some(p2pk_witness(&proof, &[&owner]));

    let keyset = t.active_keyset().await;
    let (output, _, _) = blind_random(keyset.id, Amount::from(32));
    let err = t
        .mint
        .process_swap(SwapRequest {
            inputs: vec![proof],
            outputs: vec![output],
        })
        .await
        .expect_err("SIG_ALL");
    assert!(matches!(err, Error::P2PKVerificationFailed(_)));
}
