//! Shared test fixtures: a mint over the in-memory store and the fake
//! chain, plus the client half of BDHKE (blind, unblind).

use std::sync::Arc;

use bitcoin::Network;

use runemint::memory::MintMemoryDatabase;
use runemint::Mint;
use runemint_common::{MintConfig, MintQuoteResponse};
use runemint_fake_chain::FakeChainView;
use runemint_protocol::dhke::hash_to_curve;
use runemint_protocol::{
    Amount, AssetId, BlindedMessage, CurrencyUnit, Id, KeySet, MintRequest, Proof, PublicKey,
    Secret, SecretKey, Witness,
};

pub const ASSET: &str = "1527352:1";
pub const RUNE_NAME: &str = "DUCAT";
pub const START_HEIGHT: u64 = 1000;

pub struct TestMint {
    pub mint: Mint,
    pub chain: Arc<FakeChainView>,
    pub db: Arc<MintMemoryDatabase>,
    pub asset: AssetId,
}

pub async fn setup() -> TestMint {
    let asset: AssetId = ASSET.parse().expect("asset id");
    let config = MintConfig::new(
        [7u8; 32],
        [9u8; 32],
        asset,
        RUNE_NAME,
        CurrencyUnit::Custom(RUNE_NAME.to_string()),
        Network::Bitcoin,
    );

    let chain = Arc::new(FakeChainView::new());
    chain.set_block_height(START_HEIGHT);
    let db = Arc::new(MintMemoryDatabase::new());

    let mint = Mint::new(config, db.clone(), chain.clone())
        .await
        .expect("mint");

    TestMint {
        mint,
        chain,
        db,
        asset,
    }
}

pub fn txid(n: u64) -> String {
    format!("{n:064x}")
}

impl TestMint {
    /// Script a confirmed deposit paying a quote's address.
    pub fn fund_quote(&self, quote: &MintQuoteResponse, txid_n: u64, rune_amount: u128) {
        self.chain.add_rune_output(
            &quote.request,
            &txid(txid_n),
            0,
            RUNE_NAME,
            self.asset,
            rune_amount,
            10_000,
            Some(START_HEIGHT),
        );
    }

    /// Script a confirmed fee UTXO at the mint's segwit address.
    pub fn fund_fees(&self, txid_n: u64, value_sats: u64) {
        self.chain.add_plain_output(
            &self.mint.wallet.segwit_address().to_string(),
            &txid(txid_n),
            0,
            value_sats,
            Some(START_HEIGHT),
        );
    }

    /// The active keyset, for unblinding.
    pub async fn active_keyset(&self) -> KeySet {
        let keys = self.mint.pubkeys().await.expect("pubkeys");
        keys.keysets.into_iter().next().expect("an active keyset")
    }

    /// Mint proofs for `denominations` through the full quote flow:
    /// quote, deposit, issue, unblind.
    pub async fn mint_proofs(&self, txid_n: u64, denominations: &[u64]) -> Vec<Proof> {
        let total: u64 = denominations.iter().sum();
        let quote = self
            .mint
            .create_mint_quote(Amount::from(total))
            .await
            .expect("quote");
        self.fund_quote(&quote, txid_n, total as u128);

        let keyset = self.active_keyset().await;
        let mut pre = Vec::new();
        let mut outputs = Vec::new();
        for denomination in denominations {
            let (blinded, secret, r) = blind_random(keyset.id, Amount::from(*denomination));
            outputs.push(blinded);
            pre.push((secret, r));
        }

        let response = self
            .mint
            .mint_tokens(MintRequest {
                quote: quote.quote.clone(),
                outputs,
            })
            .await
            .expect("issue");

        response
            .signatures
            .into_iter()
            .zip(pre)
            .map(|(signature, (secret, r))| {
                let mint_key = keyset
                    .keys
                    .amount_key(signature.amount)
                    .expect("denomination key");
                unblind(signature.c, &r, mint_key, signature.amount, keyset.id, secret)
            })
            .collect()
    }
}

/// Client side: pick a random secret and blinding factor, produce `B_`.
pub fn blind_random(keyset_id: Id, amount: Amount) -> (BlindedMessage, Secret, SecretKey) {
    use rand::RngCore;
    let mut secret_bytes = [0u8; 32];
    rand::rng().fill_bytes(&mut secret_bytes);
    let secret = Secret::new(hex::encode(secret_bytes));
    blind_secret(keyset_id, amount, secret)
}

/// Blind a chosen secret: `B_ = hash_to_curve(secret) + r·G`.
pub fn blind_secret(
    keyset_id: Id,
    amount: Amount,
    secret: Secret,
) -> (BlindedMessage, Secret, SecretKey) {
    use rand::RngCore;
    let mut r_bytes = [0u8; 32];
    rand::rng().fill_bytes(&mut r_bytes);
    let r = SecretKey::from_slice(&r_bytes).expect("blinding factor");

    let y = hash_to_curve(secret.as_bytes()).expect("hash to curve");
    let blinded_secret = y.combine(&r.public_key()).expect("point addition");

    (
        BlindedMessage {
            amount,
            keyset_id,
            blinded_secret,
        },
        secret,
        r,
    )
}

/// Client side: `C = C_ − r·K`.
pub fn unblind(
    c_: PublicKey,
    r: &SecretKey,
    mint_key: PublicKey,
    amount: Amount,
    keyset_id: Id,
    secret: Secret,
) -> Proof {
    let r_k = mint_key.mul_tweak(&r.as_scalar()).expect("r*K");
    let c = c_.combine(&r_k.negate()).expect("unblind");
    Proof {
        amount,
        keyset_id,
        secret,
        c,
        witness: None,
    }
}

/// A P2PK witness carrying Schnorr signatures over the raw secret string.
pub fn p2pk_witness(proof: &Proof, signers: &[&SecretKey]) -> Witness {
    Witness::P2PK(runemint_protocol::P2PKWitness {
        signatures: signers
            .iter()
            .map(|signer| hex::encode(signer.sign(proof.secret.as_bytes()).serialize()))
            .collect(),
    })
}
