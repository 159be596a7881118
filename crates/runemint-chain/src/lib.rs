//! On-chain settlement for the runemint mint.
//!
//! Everything that touches Bitcoin lives here: the runestone codec, UTXO
//! selection, PSBT assembly and signing, broadcast verification, the mint
//! wallet and the reserve tracker. The chain itself is reached only through
//! the [`runemint_common::ChainView`] trait.

pub mod psbt;
pub mod reserve;
pub mod runestone;
pub mod select;
pub mod wallet;

pub use psbt::{
    DUST_LIMIT_SATS, MIN_FEE_INPUT_SATS, RECIPIENT_OUTPUT_SATS, RUNE_RETURN_OUTPUT_SATS,
    WITHDRAWAL_FEE_SATS,
};
pub use reserve::ReserveTracker;
pub use runestone::{decode_runestone, encode_runestone, Edict};
pub use select::{FeeUtxo, SelectedRuneUtxo};
pub use wallet::{validate_destination, MintWallet, WithdrawalReceipt};
