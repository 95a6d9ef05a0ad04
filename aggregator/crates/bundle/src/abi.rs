//! Solidity ABI layout of bundles as the gateway contract receives them.

use alloy_sol_types::sol;

use crate::{Action, Bundle, Operation};

sol! {
    #[derive(Debug, PartialEq, Eq)]
    struct ActionData {
        uint256 ethValue;
        address contractAddress;
        bytes encodedFunction;
    }

    #[derive(Debug, PartialEq, Eq)]
    struct OperationData {
        uint256 nonce;
        ActionData[] actions;
    }

    #[derive(Debug, PartialEq, Eq)]
    struct BundleData {
        uint256[4][] senderPublicKeys;
        OperationData[] operations;
        uint256[2] signature;
    }

    #[derive(Debug, PartialEq, Eq)]
    struct BundleContent {
        uint256[4][] senderPublicKeys;
        OperationData[] operations;
    }

    #[derive(Debug, PartialEq, Eq)]
    struct SimulationResult {
        bool[] successes;
        uint256 fee;
        string error;
    }

    interface IBundleGateway {
        function processBundle(BundleData calldata bundle) external returns (bool[] memory successes);
        function nonces(uint256[4] calldata publicKey) external view returns (uint256);
    }

    /// Executes bundles one after the other against a scratch copy of state and reports
    /// the fee each one paid to `beneficiary` in `feeToken` (zero address for ether).
    interface IBundleSimulator {
        function simulate(address feeToken, address beneficiary, BundleData[] calldata bundles)
            external
            returns (SimulationResult[] memory results);
    }
}

impl From<&Action> for ActionData {
    fn from(action: &Action) -> Self {
        Self { ethValue: action.value, contractAddress: action.target, encodedFunction: action.call_data.clone() }
    }
}

impl From<&Operation> for OperationData {
    fn from(operation: &Operation) -> Self {
        Self { nonce: operation.nonce, actions: operation.actions.iter().map(ActionData::from).collect() }
    }
}

impl From<&Bundle> for BundleData {
    fn from(bundle: &Bundle) -> Self {
        Self {
            senderPublicKeys: bundle.sender_public_keys.clone(),
            operations: bundle.operations.iter().map(OperationData::from).collect(),
            signature: bundle.signature,
        }
    }
}
