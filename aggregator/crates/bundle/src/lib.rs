//! Bundle primitives shared by the aggregator and its clients.
//!
//! A [`Bundle`] is an ordered list of operations, one per sender, carrying a single
//! aggregate BLS signature. Public keys are G2 points (four 256-bit words) and
//! signatures are G1 points (two 256-bit words).

pub mod abi;

use alloy_primitives::{keccak256, Address, Bytes, B256, U256};
use alloy_sol_types::SolValue;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub type PublicKey = [U256; 4];
pub type Signature = [U256; 2];

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Action {
    pub value: U256,
    pub target: Address,
    pub call_data: Bytes,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Operation {
    pub nonce: U256,
    pub actions: Vec<Action>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Bundle {
    pub sender_public_keys: Vec<PublicKey>,
    pub operations: Vec<Operation>,
    pub signature: Signature,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BundleFormatError {
    #[error("Bundle has {keys} sender public keys but {operations} operations")]
    LengthMismatch { keys: usize, operations: usize },

    #[error("Bundle contains no operations")]
    Empty,

    #[error("Operation {index} has no actions")]
    NoActions { index: usize },
}

impl Bundle {
    /// The identity of aggregation: no senders, no operations and a zero signature.
    pub fn empty() -> Self {
        Self { sender_public_keys: Vec::new(), operations: Vec::new(), signature: [U256::ZERO; 2] }
    }

    pub fn operation_count(&self) -> usize {
        self.operations.len()
    }

    /// Total number of actions across all operations. This is the unit of aggregation size.
    pub fn action_count(&self) -> usize {
        self.operations.iter().map(|op| op.actions.len()).sum()
    }

    pub fn check_well_formed(&self) -> Result<(), BundleFormatError> {
        if self.sender_public_keys.len() != self.operations.len() {
            return Err(BundleFormatError::LengthMismatch {
                keys: self.sender_public_keys.len(),
                operations: self.operations.len(),
            });
        }
        if self.operations.is_empty() {
            return Err(BundleFormatError::Empty);
        }
        if let Some(index) = self.operations.iter().position(|op| op.actions.is_empty()) {
            return Err(BundleFormatError::NoActions { index });
        }
        Ok(())
    }

    /// Iterates `(sender, operation)` pairs. Extra keys or operations on a malformed
    /// bundle are skipped.
    pub fn entries(&self) -> impl Iterator<Item = (&PublicKey, &Operation)> {
        self.sender_public_keys.iter().zip(self.operations.iter())
    }

    /// Content address of the bundle: keccak256 over the ABI encoding of senders and
    /// operations. The signature is excluded so that re-signing does not change it.
    pub fn content_hash(&self) -> B256 {
        let content = abi::BundleContent {
            senderPublicKeys: self.sender_public_keys.clone(),
            operations: self.operations.iter().map(abi::OperationData::from).collect(),
        };
        keccak256(content.abi_encode())
    }

    /// Size in bytes of the bundle once ABI encoded as calldata.
    pub fn abi_encoded_size(&self) -> usize {
        abi::BundleData::from(self).abi_encode().len()
    }
}
