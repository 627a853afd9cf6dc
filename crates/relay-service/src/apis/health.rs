//! Health endpoint: liveness plus the deployment this relayer serves.

use relay_core::RelayExecutor;
use relay_types::HealthResponse;

pub fn health(executor: &RelayExecutor) -> HealthResponse {
	let oracle = executor.oracle();
	HealthResponse {
		status: "ok".to_string(),
		relayer_id: executor.config().id.clone(),
		family: oracle.family().to_string(),
		verifier: oracle.verifier().to_string(),
		relayer: oracle.relayer().to_string(),
	}
}
