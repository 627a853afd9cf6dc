//! Relay status lookup.

use relay_core::RelayExecutor;
use relay_storage::StorageError;
use relay_types::{APIError, PermitId, RelayStatusResponse};

/// Looks up the stored relay status of a permit id.
pub async fn get_relay_status(
	id: &str,
	executor: &RelayExecutor,
) -> Result<RelayStatusResponse, APIError> {
	let permit_id = PermitId::parse(id).map_err(|e| APIError::BadRequest {
		error_type: "INVALID_PERMIT_ID".to_string(),
		message: e.to_string(),
	})?;
	let store = executor
		.store()
		.ok_or_else(|| APIError::InternalServerError {
			error_type: "STORAGE_UNAVAILABLE".to_string(),
			message: "relayer has no permit store".to_string(),
		})?;

	match store.load_status(&permit_id).await {
		Ok(status) => Ok(RelayStatusResponse {
			permit_id: permit_id.to_string(),
			status,
		}),
		Err(StorageError::NotFound) => Err(APIError::NotFound {
			message: format!("no relay recorded for permit {}", permit_id),
		}),
		Err(e) => Err(APIError::InternalServerError {
			error_type: "STORAGE_ERROR".to_string(),
			message: e.to_string(),
		}),
	}
}
