use aggregator_execution_client_interface::ExecutionClientError;
use alloy::transports::{RpcError, TransportErrorKind};

/// Node messages meaning the nonce is ahead of the account and will become valid later.
const NONCE_NOT_YET_VALID_MARKERS: &[&str] = &["nonce too high", "nonce not yet valid", "future nonce", "nonce gap"];

/// Node messages meaning the exact same transaction is already in the pool.
const ALREADY_KNOWN_MARKERS: &[&str] = &["already known", "already imported", "known transaction"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum RpcContext {
    Read,
    Send,
}

pub(crate) fn classify_rpc_error(err: RpcError<TransportErrorKind>, context: RpcContext) -> ExecutionClientError {
    let from_node = err.is_error_resp();
    classify(err.to_string(), from_node, context)
}

pub(crate) fn is_already_known(err: &RpcError<TransportErrorKind>) -> bool {
    contains_any(&err.to_string(), ALREADY_KNOWN_MARKERS)
}

pub(crate) fn classify(message: String, from_node: bool, context: RpcContext) -> ExecutionClientError {
    if contains_any(&message, NONCE_NOT_YET_VALID_MARKERS) {
        return ExecutionClientError::NonceNotYetValid(message);
    }
    match (from_node, context) {
        (true, RpcContext::Send) => ExecutionClientError::Rejected(message),
        (true, RpcContext::Read) => ExecutionClientError::Contract(message),
        (false, _) => ExecutionClientError::Rpc(message),
    }
}

fn contains_any(message: &str, markers: &[&str]) -> bool {
    let message = message.to_lowercase();
    markers.iter().any(|marker| message.contains(marker))
}
