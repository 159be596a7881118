//! The swap (spend N, sign M) state machine.

use runemint_common::Error;
use runemint_protocol::util::unix_time_ms;
use runemint_protocol::{SwapRequest, SwapResponse};
use uuid::Uuid;

use crate::Mint;

impl Mint {
    /// Swap proofs for fresh signatures of equal total value.
    ///
    /// Inputs are verified (blind signatures and spending conditions),
    /// atomically marked spent, and only then are the outputs signed.
    /// Exactly one of two concurrent swaps of the same proof succeeds; the
    /// other observes `ProofAlreadySpent`.
    #[tracing::instrument(skip_all, fields(inputs = request.inputs.len(), outputs = request.outputs.len()))]
    pub async fn process_swap(&self, request: SwapRequest) -> Result<SwapResponse, Error> {
        if request.inputs.is_empty() || request.outputs.is_empty() {
            return Err(Error::AmountMismatch {
                expected: request.input_amount()?.to_u64(),
                actual: request.output_amount()?.to_u64(),
            });
        }

        let input_total = request.input_amount()?;
        let output_total = request.output_amount()?;
        if input_total != output_total {
            return Err(Error::AmountMismatch {
                expected: input_total.to_u64(),
                actual: output_total.to_u64(),
            });
        }

        self.check_output_unit(&request.outputs).await?;
        self.check_outputs_unsigned(&request.outputs).await?;

        let ys = self.verify_inputs(&request.inputs).await?;

        let transaction_id = format!("swap_{}_{}", unix_time_ms(), Uuid::new_v4().simple());
        self.localstore
            .add_spent_proofs(&request.inputs, &ys, &transaction_id)
            .await
            .map_err(|e| match e {
                runemint_common::database::Error::ProofAlreadySpent { y } => {
                    Error::ProofAlreadySpent { y }
                }
                other => other.into(),
            })?;

        // Inputs are burned; a signing failure from here on must restore
        // them or value is destroyed.
        let signatures = match self
            .signatory
            .blind_sign_batch(request.outputs.clone())
            .await
        {
            Ok(signatures) => signatures,
            Err(e) => {
                let restored = self
                    .localstore
                    .remove_proofs_by_transaction_id(&transaction_id)
                    .await?;
                tracing::warn!(
                    "swap signing failed, restored {restored} inputs for {transaction_id}: {e}"
                );
                return Err(e);
            }
        };

        let blinded_secrets: Vec<_> = request
            .outputs
            .iter()
            .map(|output| output.blinded_secret)
            .collect();
        if let Err(e) = self
            .localstore
            .add_blind_signatures(&blinded_secrets, &signatures, None)
            .await
        {
            let restored = self
                .localstore
                .remove_proofs_by_transaction_id(&transaction_id)
                .await?;
            tracing::warn!(
                "swap signature persist failed, restored {restored} inputs for {transaction_id}: {e}"
            );
            return Err(match e {
                runemint_common::database::Error::Duplicate => {
                    Error::OutputAlreadySigned(transaction_id)
                }
                other => other.into(),
            });
        }

        tracing::info!(
            "swap {transaction_id} spent {} proofs for {} signatures",
            request.inputs.len(),
            signatures.len()
        );
        Ok(SwapResponse { signatures })
    }
}
