//! Proof states.

use serde::{Deserialize, Serialize};

use crate::keys::PublicKey;

/// Spend state of a proof as recorded by the mint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum State {
    /// Never seen by the mint
    Unspent,
    /// Reserved by an in-flight operation
    Pending,
    /// Irrevocably spent
    Spent,
}

/// The state of one `Y` as reported to clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProofState {
    /// `Y = hash_to_curve(secret)`
    #[serde(rename = "Y")]
    pub y: PublicKey,
    /// Spend state
    pub state: State,
    /// Stored witness JSON, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub witness: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_wire_form_is_uppercase() {
        assert_eq!(serde_json::to_string(&State::Unspent).unwrap(), "\"UNSPENT\"");
        assert_eq!(serde_json::to_string(&State::Spent).unwrap(), "\"SPENT\"");
        assert_eq!(
            serde_json::from_str::<State>("\"PENDING\"").unwrap(),
            State::Pending
        );
    }
}
