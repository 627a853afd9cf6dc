//! Relay submission endpoint.
//!
//! The body is a permit record, optionally with the receiver the submitter
//! wants the relay to pay. Failures are answered with a [`RelayResponse`]
//! whose HTTP status reflects the error kind.

use axum::http::StatusCode;
use relay_core::RelayExecutor;
use relay_types::{Identity, PermitRecord, RelayErrorKind, RelayResponse};
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelayRequest {
	#[serde(flatten)]
	pub record: PermitRecord,
	/// Receiver requested by the submitter, checked against the binding mode.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub requested_receiver: Option<String>,
}

pub fn status_for(kind: RelayErrorKind) -> StatusCode {
	match kind {
		RelayErrorKind::EncodingError => StatusCode::BAD_REQUEST,
		RelayErrorKind::ExpiredPermit => StatusCode::GONE,
		RelayErrorKind::NonceAlreadyConsumed => StatusCode::CONFLICT,
		RelayErrorKind::SignatureRejected
		| RelayErrorKind::InsufficientFunds
		| RelayErrorKind::OracleRejected => StatusCode::UNPROCESSABLE_ENTITY,
		RelayErrorKind::TransientSubmissionFailure => StatusCode::SERVICE_UNAVAILABLE,
	}
}

fn encoding_failure(message: String) -> (StatusCode, RelayResponse) {
	(
		StatusCode::BAD_REQUEST,
		RelayResponse::failed(None, RelayErrorKind::EncodingError, message),
	)
}

/// Parses a relay request body and relays the permit within `timeout`.
pub async fn process_relay_request(
	body: &[u8],
	executor: &RelayExecutor,
	timeout: Duration,
) -> (StatusCode, RelayResponse) {
	let request: RelayRequest = match serde_json::from_slice(body) {
		Ok(request) => request,
		Err(e) => return encoding_failure(format!("invalid relay request: {}", e)),
	};
	let permit = match request.record.to_signed() {
		Ok(permit) => permit,
		Err(e) => return encoding_failure(e.to_string()),
	};
	let receiver = match request
		.requested_receiver
		.as_deref()
		.map(|r| Identity::parse_as(permit.family(), "requestedReceiver", r))
		.transpose()
	{
		Ok(receiver) => receiver,
		Err(e) => return encoding_failure(e.to_string()),
	};

	let id = permit.id();
	tracing::info!(permit_id = %id, owner = %permit.parameters.owner, "Received relay request");

	match tokio::time::timeout(timeout, executor.relay(&permit, receiver)).await {
		Ok(Ok(receipt)) => (StatusCode::OK, RelayResponse::settled(&receipt)),
		Ok(Err(e)) => (
			status_for(e.kind()),
			RelayResponse::failed(Some(id), e.kind(), e.to_string()),
		),
		Err(_) => (
			StatusCode::SERVICE_UNAVAILABLE,
			RelayResponse::failed(
				Some(id),
				RelayErrorKind::TransientSubmissionFailure,
				format!("relay did not finish within {}s", timeout.as_secs()),
			),
		),
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_error_status_mapping() {
		assert_eq!(status_for(RelayErrorKind::EncodingError), StatusCode::BAD_REQUEST);
		assert_eq!(status_for(RelayErrorKind::ExpiredPermit), StatusCode::GONE);
		assert_eq!(status_for(RelayErrorKind::NonceAlreadyConsumed), StatusCode::CONFLICT);
		assert_eq!(
			status_for(RelayErrorKind::InsufficientFunds),
			StatusCode::UNPROCESSABLE_ENTITY
		);
		assert_eq!(
			status_for(RelayErrorKind::TransientSubmissionFailure),
			StatusCode::SERVICE_UNAVAILABLE
		);
	}

	#[test]
	fn test_request_flattens_record() {
		let body = serde_json::json!({
			"owner": "0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266",
			"verifier": "0x5FbDB2315678afecb367f032d93F642f64180aa3",
			"asset": "0xe7f1725E7734CE288F8367e1Bb143E90bb3F0512",
			"amount": "10",
			"fee": "1",
			"deadline": 1900000000,
			"nonce": "0",
			"signature": "0x00",
			"requestedReceiver": "0x70997970C51812dc3A010C7d01b50e0d17dc79C8"
		});
		let request: RelayRequest = serde_json::from_value(body).unwrap();
		assert_eq!(request.record.amount, "10");
		assert_eq!(request.record.deadline, 1_900_000_000);
		assert!(request.requested_receiver.is_some());
	}
}
