//! Protocol types for a Cashu mint backed by a fungible on-chain asset.
//!
//! This crate holds the pieces of the protocol that are pure data and pure
//! cryptography: amounts, secrets, keys and keysets, proofs and blinded
//! messages, proof states, P2PK spending conditions and the BDHKE
//! primitives. Everything stateful (stores, services, chain access) lives in
//! the sibling crates.

pub mod amount;
pub mod asset;
pub mod dhke;
pub mod keys;
pub mod keyset;
pub mod messages;
pub mod p2pk;
pub mod proof;
pub mod secret;
pub mod state;
pub mod util;

pub use amount::Amount;
pub use asset::AssetId;
pub use keys::{PublicKey, SecretKey, SECP256K1};
pub use keyset::{CurrencyUnit, Id, KeySet, KeySetInfo, Keys, KeysResponse, KeysetResponse};
pub use messages::{
    CheckStateRequest, CheckStateResponse, MeltQuoteState, MeltRequest, MeltResponse,
    MintQuoteState, MintRequest, MintResponse, SwapRequest, SwapResponse,
};
pub use p2pk::{Conditions, P2PKWitness, SigFlag};
pub use proof::{BlindSignature, BlindedMessage, Proof, Proofs, ProofsMethods, Witness};
pub use secret::Secret;
pub use state::{ProofState, State};
