//! Deposit -> issue flows, amount policing and the deposit monitor.

mod common;

use common::{blind_random, setup, txid};
use runemint_common::Error;
use runemint_protocol::{
    Amount, CheckStateRequest, MintQuoteState, MintRequest, State, SwapRequest,
};

#[tokio::test]
async fn quote_is_promoted_on_exact_confirmed_deposit() {
    let t = setup().await;

    let quote = t
        .mint
        .create_mint_quote(Amount::from(500))
        .await
        .expect("quote");
    assert_eq!(quote.state, MintQuoteState::Unpaid);

    // Nothing on chain yet.
    let pending = t.mint.get_mint_quote(&quote.quote).await.expect("lookup");
    assert_eq!(pending.state, MintQuoteState::Unpaid);

    t.fund_quote(&quote, 1, 500);
    let paid = t.mint.get_mint_quote(&quote.quote).await.expect("lookup");
    assert_eq!(paid.state, MintQuoteState::Paid);

    // The deposit now backs the reserve.
    assert_eq!(t.mint.reserve.balance(&t.asset).await.expect("balance"), 500);
}

/// A confirmed deposit of the wrong amount never pays the quote, and
/// issuance reports the mismatch with both numbers.
#[tokio::test]
async fn amount_mismatch_is_rejected() {
    let t = setup().await;

    let quote = t
        .mint
        .create_mint_quote(Amount::from(500))
        .await
        .expect("quote");
    t.fund_quote(&quote, 1, 2000);

    let looked_up = t.mint.get_mint_quote(&quote.quote).await.expect("lookup");
    assert_eq!(looked_up.state, MintQuoteState::Unpaid);

    let keyset = t.active_keyset().await;
    let (output, _, _) = blind_random(keyset.id, Amount::from(500));
    let err = t
        .mint
        .mint_tokens(MintRequest {
            quote: quote.quote.clone(),
            outputs: vec![output],
        })
        .await
        .expect_err("mismatched deposit");
    assert!(matches!(
        err,
        Error::AmountMismatch {
            expected: 500,
            actual: 2000
        }
    ));

    let after = t.mint.get_mint_quote(&quote.quote).await.expect("lookup");
    assert_ne!(after.state, MintQuoteState::Issued);
}

#[tokio::test]
async fn unconfirmed_deposit_cannot_be_issued() {
    let t = setup().await;

    let quote = t
        .mint
        .create_mint_quote(Amount::from(64))
        .await
        .expect("quote");
    t.chain.add_rune_output(
        &quote.request,
        &txid(1),
        0,
        common::RUNE_NAME,
        t.asset,
        64,
        10_000,
        None,
    );

    let keyset = t.active_keyset().await;
    let (output, _, _) = blind_random(keyset.id, Amount::from(64));
    let err = t
        .mint
        .mint_tokens(MintRequest {
            quote: quote.quote.clone(),
            outputs: vec![output],
        })
        .await
        .expect_err("unconfirmed deposit");
    assert!(matches!(
        err,
        Error::InsufficientConfirmations { have: 0, need: 1 }
    ));
}

#[tokio::test]
async fn issuance_requires_outputs_summing_to_the_quote() {
    let t = setup().await;

    let quote = t
        .mint
        .create_mint_quote(Amount::from(512))
        .await
        .expect("quote");
    t.fund_quote(&quote, 1, 512);

    let keyset = t.active_keyset().await;
    let (short, _, _) = blind_random(keyset.id, Amount::from(256));
    let err = t
        .mint
        .mint_tokens(MintRequest {
            quote: quote.quote.clone(),
            outputs: vec![short],
        })
        .await
        .expect_err("short outputs");
    assert!(matches!(
        err,
        Error::AmountMismatch {
            expected: 512,
            actual: 256
        }
    ));

    // A single output of the full quote amount is legal.
    let (full, _, _) = blind_random(keyset.id, Amount::from(512));
    let response = t
        .mint
        .mint_tokens(MintRequest {
            quote: quote.quote.clone(),
            outputs: vec![full],
        })
        .await
        .expect("exact output");
    assert_eq!(response.signatures.len(), 1);
    assert_eq!(response.signatures[0].amount, Amount::from(512));

    // Issuance is once-only.
    let (again, _, _) = blind_random(keyset.id, Amount::from(512));
    let err = t
        .mint
        .mint_tokens(MintRequest {
            quote: quote.quote.clone(),
            outputs: vec![again],
        })
        .await
        .expect_err("reissue");
    assert!(matches!(err, Error::AlreadyIssued(_)));
}

#[tokio::test]
async fn minted_proofs_verify_and_swap() {
    let t = setup().await;
    let proofs = t.mint_proofs(1, &[1024]).await;
    assert_eq!(proofs.len(), 1);

    // The unblinded proof passes verification inside a swap.
    let keyset = t.active_keyset().await;
    let (output, _, _) = blind_random(keyset.id, Amount::from(1024));
    let response = t
        .mint
        .process_swap(SwapRequest {
            inputs: proofs.clone(),
            outputs: vec![output],
        })
        .await
        .expect("swap");
    assert_eq!(response.signatures.len(), 1);

    let y = proofs[0].y().expect("y");
    let states = t
        .mint
        .check_state(CheckStateRequest { ys: vec![y] })
        .await
        .expect("state");
    assert_eq!(states.states[0].state, State::Spent);
}

#[tokio::test]
async fn deposit_monitor_promotes_unpaid_quotes() {
    let t = setup().await;

    let quote = t
        .mint
        .create_mint_quote(Amount::from(300))
        .await
        .expect("quote");
    t.fund_quote(&quote, 1, 300);

    t.mint.poll_unpaid_quotes().await.expect("cycle");

    let after = t.mint.get_mint_quote(&quote.quote).await.expect("lookup");
    assert_eq!(after.state, MintQuoteState::Paid);
}

/// Chain failures during a cycle are logged and swallowed; the next cycle
/// succeeds once the chain recovers.
#[tokio::test(start_paused = true)]
async fn monitor_survives_chain_errors() {
    use runemint_common::database::MintDatabase as _;

    let t = setup().await;

    let quote = t
        .mint
        .create_mint_quote(Amount::from(200))
        .await
        .expect("quote");
    t.fund_quote(&quote, 2, 200);

    // Exhaust the retry schedule (one call plus three retries).
    t.chain.inject_transient_failures(4);
    t.mint.poll_unpaid_quotes().await.expect("cycle completes");
    let after = t
        .db
        .get_mint_quote(&quote.quote)
        .await
        .expect("lookup")
        .expect("stored");
    assert_eq!(after.state, MintQuoteState::Unpaid);

    // Chain recovered: the next cycle promotes.
    t.mint.poll_unpaid_quotes().await.expect("cycle");
    let after = t.mint.get_mint_quote(&quote.quote).await.expect("lookup");
    assert_eq!(after.state, MintQuoteState::Paid);
}

#[tokio::test]
async fn one_deposit_cannot_pay_two_quotes() {
    let t = setup().await;

    let first = t
        .mint
        .create_mint_quote(Amount::from(700))
        .await
        .expect("quote");
    let second = t
        .mint
        .create_mint_quote(Amount::from(700))
        .await
        .expect("quote");

    // Both quotes share the deposit address; one 700-rune deposit arrives.
    t.fund_quote(&first, 1, 700);

    let a = t.mint.get_mint_quote(&first.quote).await.expect("lookup");
    assert_eq!(a.state, MintQuoteState::Paid);

    // The deposit is now tracked, so the second quote stays unpaid.
    let b = t.mint.get_mint_quote(&second.quote).await.expect("lookup");
    assert_eq!(b.state, MintQuoteState::Unpaid);
}

/// Two quotes of the same amount race `mint_tokens` over one shared-address
/// deposit: the reserve claim picks exactly one winner, the loser is
/// refused issuance.
#[tokio::test]
async fn concurrent_issuance_cannot_share_one_deposit() {
    let t = setup().await;

    let first = t
        .mint
        .create_mint_quote(Amount::from(700))
        .await
        .expect("quote");
    let second = t
        .mint
        .create_mint_quote(Amount::from(700))
        .await
        .expect("quote");
    t.fund_quote(&first, 1, 700);

    let keyset = t.active_keyset().await;
    let (output_a, _, _) = blind_random(keyset.id, Amount::from(700));
    let (output_b, _, _) = blind_random(keyset.id, Amount::from(700));

    let (result_a, result_b) = tokio::join!(
        t.mint.mint_tokens(MintRequest {
            quote: first.quote.clone(),
            outputs: vec![output_a],
        }),
        t.mint.mint_tokens(MintRequest {
            quote: second.quote.clone(),
            outputs: vec![output_b],
        }),
    );

    // Exactly one issuance; the loser is told the quote is unpaid.
    assert_eq!(result_a.is_ok() as usize + result_b.is_ok() as usize, 1);
    let loser = if result_a.is_ok() {
        result_b.expect_err("loser")
    } else {
        result_a.expect_err("loser")
    };
    assert!(matches!(loser, Error::QuoteNotPaid(_)));

    let state_a = t.mint.get_mint_quote(&first.quote).await.expect("lookup").state;
    let state_b = t.mint.get_mint_quote(&second.quote).await.expect("lookup").state;
    assert_eq!(
        (state_a == MintQuoteState::Issued) as usize
            + (state_b == MintQuoteState::Issued) as usize,
        1
    );

    // One deposit row backs the single issuance.
    assert_eq!(t.mint.reserve.balance(&t.asset).await.expect("balance"), 700);
}

#[tokio::test]
async fn amount_limits_are_enforced() {
    let t = setup().await;
    let err = t
        .mint
        .create_mint_quote(Amount::from(0))
        .await
        .expect_err("zero");
    assert!(matches!(err, Error::AmountOutOfRange { .. }));

    let err = t
        .mint
        .create_mint_quote(Amount::from(2_000_000))
        .await
        .expect_err("too large");
    assert!(matches!(err, Error::AmountOutOfRange { .. }));
}
