//! Shared input/output checks for the three state machines.

use std::collections::HashSet;

use runemint_common::Error;
use runemint_protocol::{BlindedMessage, CurrencyUnit, Id, Proof, PublicKey};

use crate::Mint;

impl Mint {
    async fn keyset_unit(&self, keyset_id: &Id) -> Result<(CurrencyUnit, bool), Error> {
        let keyset = self
            .localstore
            .get_keyset(keyset_id)
            .await?
            .ok_or_else(|| Error::KeysetNotFound(keyset_id.to_string()))?;
        Ok((keyset.unit, keyset.active))
    }

    /// Outputs must reference active keysets of the mint's unit.
    pub(crate) async fn check_output_unit(
        &self,
        outputs: &[BlindedMessage],
    ) -> Result<(), Error> {
        let keyset_ids: HashSet<Id> = outputs.iter().map(|output| output.keyset_id).collect();
        for keyset_id in keyset_ids {
            let (unit, active) = self.keyset_unit(&keyset_id).await?;
            if !active {
                return Err(Error::KeysetInactive(keyset_id.to_string()));
            }
            if unit != *self.unit() {
                return Err(Error::MultipleUnits);
            }
        }
        Ok(())
    }

    /// Inputs must reference known keysets of the mint's unit; deactivated
    /// keysets still verify.
    pub(crate) async fn check_input_unit(&self, inputs: &[Proof]) -> Result<(), Error> {
        let keyset_ids: HashSet<Id> = inputs.iter().map(|proof| proof.keyset_id).collect();
        for keyset_id in keyset_ids {
            let (unit, _) = self.keyset_unit(&keyset_id).await?;
            if unit != *self.unit() {
                return Err(Error::MultipleUnits);
            }
        }
        Ok(())
    }

    /// No output may reuse a `B_` the mint has signed before.
    pub(crate) async fn check_outputs_unsigned(
        &self,
        outputs: &[BlindedMessage],
    ) -> Result<(), Error> {
        let blinded_secrets: Vec<PublicKey> = outputs
            .iter()
            .map(|output| output.blinded_secret)
            .collect();
        let existing = self
            .localstore
            .get_blind_signatures(&blinded_secrets)
            .await?;
        for (blinded, signature) in blinded_secrets.iter().zip(existing) {
            if signature.is_some() {
                tracing::warn!("output {blinded} has already been signed");
                return Err(Error::OutputAlreadySigned(blinded.to_hex()));
            }
        }
        Ok(())
    }

    /// Verify a set of input proofs and return their `Y` values in order.
    ///
    /// Rejects duplicate inputs, then runs every proof through the
    /// signatory (spending conditions first, then the blind signature).
    pub(crate) async fn verify_inputs(&self, inputs: &[Proof]) -> Result<Vec<PublicKey>, Error> {
        let ys: Vec<PublicKey> = inputs
            .iter()
            .map(|proof| proof.y())
            .collect::<Result<_, _>>()?;

        let distinct: HashSet<&PublicKey> = ys.iter().collect();
        if distinct.len() != inputs.len() {
            return Err(Error::DuplicateInputs);
        }

        self.check_input_unit(inputs).await?;

        for proof in inputs {
            self.signatory.verify_proof(proof.clone()).await?;
        }

        Ok(ys)
    }
}
