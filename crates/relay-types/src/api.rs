//! HTTP API types for the relay endpoint.
//!
//! `POST /api/relay` accepts a [`PermitRecord`](crate::PermitRecord) body and
//! answers with [`RelayResponse`]; `GET /api/relay/{id}` answers with
//! [`RelayStatusResponse`].

use crate::{ExecutionReceipt, PermitId, RelayErrorKind, RelayStatus};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Result of a relay submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelayResponse {
	pub ok: bool,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub permit_id: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub settlement_reference: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub block_number: Option<u64>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub error: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub error_kind: Option<RelayErrorKind>,
}

impl RelayResponse {
	pub fn settled(receipt: &ExecutionReceipt) -> Self {
		Self {
			ok: true,
			permit_id: Some(receipt.permit_id.to_string()),
			settlement_reference: Some(receipt.settlement_reference.to_string()),
			block_number: Some(receipt.block_number),
			error: None,
			error_kind: None,
		}
	}

	pub fn failed(permit_id: Option<PermitId>, kind: RelayErrorKind, message: String) -> Self {
		Self {
			ok: false,
			permit_id: permit_id.map(|id| id.to_string()),
			settlement_reference: None,
			block_number: None,
			error: Some(message),
			error_kind: Some(kind),
		}
	}
}

/// Stored state of a permit.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelayStatusResponse {
	pub permit_id: String,
	#[serde(flatten)]
	pub status: RelayStatus,
}

/// Liveness and deployment summary.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
	pub status: String,
	pub relayer_id: String,
	pub family: String,
	pub verifier: String,
	pub relayer: String,
}

/// Error body for non-relay failures.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
	pub error: String,
	pub message: String,
}

/// API error with an associated HTTP status.
#[derive(Debug, Clone)]
pub enum APIError {
	/// Malformed request (400).
	BadRequest { error_type: String, message: String },
	/// Missing or wrong API key (401).
	Unauthorized { message: String },
	/// Unknown permit (404).
	NotFound { message: String },
	/// Storage or other internal failure (500).
	InternalServerError { error_type: String, message: String },
}

impl APIError {
	pub fn status_code(&self) -> u16 {
		match self {
			APIError::BadRequest { .. } => 400,
			APIError::Unauthorized { .. } => 401,
			APIError::NotFound { .. } => 404,
			APIError::InternalServerError { .. } => 500,
		}
	}

	pub fn to_error_response(&self) -> ErrorResponse {
		let (error, message) = match self {
			APIError::BadRequest {
				error_type,
				message,
			} => (error_type.clone(), message.clone()),
			APIError::Unauthorized { message } => ("UNAUTHORIZED".to_string(), message.clone()),
			APIError::NotFound { message } => ("NOT_FOUND".to_string(), message.clone()),
			APIError::InternalServerError {
				error_type,
				message,
			} => (error_type.clone(), message.clone()),
		};
		ErrorResponse { error, message }
	}
}

impl fmt::Display for APIError {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			APIError::BadRequest { message, .. } => write!(f, "Bad Request: {}", message),
			APIError::Unauthorized { message } => write!(f, "Unauthorized: {}", message),
			APIError::NotFound { message } => write!(f, "Not Found: {}", message),
			APIError::InternalServerError { message, .. } => {
				write!(f, "Internal Server Error: {}", message)
			},
		}
	}
}

impl std::error::Error for APIError {}

#[cfg(feature = "axum")]
impl axum::response::IntoResponse for APIError {
	fn into_response(self) -> axum::response::Response {
		use axum::{http::StatusCode, response::Json};

		let status = StatusCode::from_u16(self.status_code())
			.unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
		(status, Json(self.to_error_response())).into_response()
	}
}

/// Serde module for U256 decimal-string serialization.
pub mod u256_serde {
	use alloy_primitives::U256;
	use serde::{de::Error, Deserialize, Deserializer, Serialize, Serializer};

	pub fn serialize<S>(value: &U256, serializer: S) -> Result<S::Ok, S::Error>
	where
		S: Serializer,
	{
		value.to_string().serialize(serializer)
	}

	pub fn deserialize<'de, D>(deserializer: D) -> Result<U256, D::Error>
	where
		D: Deserializer<'de>,
	{
		let s = String::deserialize(deserializer)?;
		crate::utils::parse_decimal_u256("amount", &s).map_err(D::Error::custom)
	}
}
