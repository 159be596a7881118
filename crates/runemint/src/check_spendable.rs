//! Spent-state lookups.

use runemint_common::Error;
use runemint_protocol::{CheckStateRequest, CheckStateResponse, ProofState, State};

use crate::Mint;

impl Mint {
    /// Report the spend state of each requested `Y`, in request order.
    ///
    /// A `Y` the mint has never recorded is UNSPENT; recorded rows report
    /// their stored state and witness.
    #[tracing::instrument(skip_all, fields(count = request.ys.len()))]
    pub async fn check_state(
        &self,
        request: CheckStateRequest,
    ) -> Result<CheckStateResponse, Error> {
        let rows = self.localstore.get_spent_proofs(&request.ys).await?;

        let states = request
            .ys
            .iter()
            .zip(rows)
            .map(|(y, row)| match row {
                Some(proof) => ProofState {
                    y: *y,
                    state: proof.state,
                    witness: proof.witness,
                },
                None => ProofState {
                    y: *y,
                    state: State::Unspent,
                    witness: None,
                },
            })
            .collect();

        Ok(CheckStateResponse { states })
    }
}
