//! The relay executor.
//!
//! One relay is an independent request/response sequence: local prechecks,
//! plan construction, submission with bounded retries of transient failures,
//! and a bounded wait for confirmation. No locks are held across oracle
//! round-trips; at-most-once settlement is the oracle's guarantee.

pub mod plan;

use crate::RelayError;
use backoff::{backoff::Backoff, ExponentialBackoffBuilder};
use relay_config::{ReceiverBinding, RelayerConfig};
use relay_message::CanonicalMessage;
use relay_oracle::{OracleError, OracleInterface, RejectReason};
use relay_storage::PermitStore;
use relay_types::{
	truncate_id, ChainFamily, Clock, ExecutionPlan, ExecutionReceipt, Identity, PermitId,
	RelayStatus, SettlementReference, SignedPermit, SystemClock,
};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::instrument;

/// Relays signed permits through one verification oracle.
pub struct RelayExecutor {
	oracle: Arc<dyn OracleInterface>,
	config: RelayerConfig,
	clock: Arc<dyn Clock>,
	store: Option<Arc<PermitStore>>,
}

impl fmt::Debug for RelayExecutor {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("RelayExecutor")
			.field("relayer_id", &self.config.id)
			.field("family", &self.oracle.family())
			.field("verifier", &self.oracle.verifier())
			.field("store", &self.store.is_some())
			.finish()
	}
}

impl RelayExecutor {
	pub fn new(oracle: Arc<dyn OracleInterface>, config: RelayerConfig) -> Self {
		Self {
			oracle,
			config,
			clock: Arc::new(SystemClock),
			store: None,
		}
	}

	pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
		self.clock = clock;
		self
	}

	/// Records permits and their relay status in `store`.
	pub fn with_store(mut self, store: Arc<PermitStore>) -> Self {
		self.store = Some(store);
		self
	}

	pub fn oracle(&self) -> &Arc<dyn OracleInterface> {
		&self.oracle
	}

	pub fn config(&self) -> &RelayerConfig {
		&self.config
	}

	pub fn store(&self) -> Option<&Arc<PermitStore>> {
		self.store.as_ref()
	}

	/// Relays `permit`, delivering `amount` to the receiver and `fee` to the
	/// relayer.
	///
	/// `receiver` is the destination requested by the caller. Under pinned
	/// binding it must match the permit's receiver when given; under
	/// relayer-chosen binding it takes precedence over the permit's.
	#[instrument(skip_all, fields(permit_id = %truncate_id(&permit.id().to_string())))]
	pub async fn relay(
		&self,
		permit: &SignedPermit,
		receiver: Option<Identity>,
	) -> Result<ExecutionReceipt, RelayError> {
		let id = permit.id();
		let result = self.execute(&id, permit, receiver).await;
		match &result {
			Ok(receipt) => {
				tracing::info!(
					reference = %receipt.settlement_reference,
					block = receipt.block_number,
					"Relay settled"
				);
				self.record_status(&id, RelayStatus::Settled {
					receipt: receipt.clone(),
				})
				.await;
			},
			Err(e) => {
				tracing::warn!(kind = %e.kind(), error = %e, "Relay failed");
				self.record_status(&id, RelayStatus::Failed {
					kind: e.kind(),
					message: e.to_string(),
				})
				.await;
			},
		}
		result
	}

	async fn execute(
		&self,
		id: &PermitId,
		permit: &SignedPermit,
		requested: Option<Identity>,
	) -> Result<ExecutionReceipt, RelayError> {
		let receiver = self.precheck(permit, requested)?;
		let params = &permit.parameters;

		let encoder = self.oracle.encoder(&params.asset).await?;
		if let (Some(claimed), CanonicalMessage::Digest(derived)) =
			(permit.claimed_digest, encoder.encode(params)?)
		{
			if claimed != derived {
				tracing::warn!(
					claimed = %claimed,
					derived = %derived,
					"Ignoring digest supplied with the permit"
				);
			}
		}
		if self.config.precheck_signature {
			encoder
				.verify(params, &permit.signature, &permit.signer)
				.map_err(|e| match RelayError::from(e) {
					RelayError::SignatureRejected(m) => {
						RelayError::SignatureRejected(format!("local precheck: {}", m))
					},
					other => other,
				})?;
		}

		if self
			.oracle
			.is_nonce_consumed(&params.owner, &params.asset, params.nonce)
			.await?
		{
			return Err(RelayError::NonceAlreadyConsumed(format!(
				"nonce {} of {} is already used",
				params.nonce, params.owner
			)));
		}

		let plan = plan::build_plan(permit, &receiver, self.oracle.as_ref())?;
		tracing::debug!(plan = ?plan, "Built execution plan");
		self.save_pending(id, permit).await;

		let reference = match self.submit_with_retry(&plan).await {
			Ok(reference) => reference,
			Err(e) => return Err(self.classify(permit, e).await),
		};
		tracing::info!(reference = %reference, receiver = %receiver, "Submitted relay");

		let receipt = self.await_confirmation(&reference).await;
		let receipt = match receipt {
			Ok(receipt) => receipt,
			Err(e) => return Err(self.classify(permit, e).await),
		};
		if !receipt.success {
			let reverted = OracleError::rejected(
				RejectReason::Reverted,
				format!("transaction {} reverted", reference),
			);
			return Err(self.classify(permit, reverted).await);
		}

		Ok(ExecutionReceipt {
			permit_id: *id,
			settlement_reference: receipt.reference,
			block_number: receipt.block_number,
			receiver,
			amount: params.amount,
			fee: params.fee,
			settled_at: self.clock.now(),
		})
	}

	/// Checks that need no network. Returns the resolved receiver.
	fn precheck(
		&self,
		permit: &SignedPermit,
		requested: Option<Identity>,
	) -> Result<Identity, RelayError> {
		let params = &permit.parameters;
		let family = self.oracle.family();
		if params.family() != family {
			return Err(RelayError::SignatureRejected(format!(
				"verifier binding: {} permit sent to a {} oracle",
				params.family(),
				family
			)));
		}

		let now = self.clock.now();
		if params.deadline <= now {
			return Err(RelayError::ExpiredPermit(format!(
				"deadline {} is not after {}",
				params.deadline, now
			)));
		}
		if params.amount.is_zero() {
			return Err(RelayError::Encoding(
				"amount must be greater than zero".to_string(),
			));
		}
		params.total()?;

		let verifier = self.oracle.verifier();
		if params.verifier != verifier {
			return Err(RelayError::SignatureRejected(format!(
				"verifier binding: permit names {}, this relayer serves {}",
				params.verifier, verifier
			)));
		}

		let receiver = self.resolve_receiver(permit, requested)?;
		receiver.require_family(family, "receiver")?;
		Ok(receiver)
	}

	fn resolve_receiver(
		&self,
		permit: &SignedPermit,
		requested: Option<Identity>,
	) -> Result<Identity, RelayError> {
		match self.config.receiver_binding {
			ReceiverBinding::Pinned => {
				let pinned = permit.receiver.ok_or_else(|| {
					RelayError::SignatureRejected(
						"receiver binding: permit carries no receiver".to_string(),
					)
				})?;
				match requested {
					Some(requested) if requested != pinned => {
						Err(RelayError::SignatureRejected(format!(
							"receiver binding: permit pins {}, relay requested {}",
							pinned, requested
						)))
					},
					_ => Ok(pinned),
				}
			},
			ReceiverBinding::RelayerChosen => {
				let receiver = requested.or(permit.receiver).ok_or_else(|| {
					RelayError::Encoding("no receiver given for the relay".to_string())
				})?;
				tracing::warn!(
					receiver = %receiver,
					"Receiver chosen by relayer; the signature does not bind it"
				);
				Ok(receiver)
			},
		}
	}

	/// Submits `plan`, retrying transient failures on the same plan.
	async fn submit_with_retry(
		&self,
		plan: &ExecutionPlan,
	) -> Result<SettlementReference, OracleError> {
		let retry = &self.config.retry;
		let mut backoff = ExponentialBackoffBuilder::new()
			.with_initial_interval(Duration::from_millis(retry.initial_interval_ms))
			.with_max_interval(Duration::from_millis(retry.max_interval_ms))
			.with_max_elapsed_time(Some(Duration::from_secs(retry.max_elapsed_seconds)))
			.build();

		let mut attempt = 1;
		loop {
			match self.oracle.submit(plan).await {
				Ok(reference) => return Ok(reference),
				Err(e) if e.is_transient() && attempt < retry.max_attempts => {
					let Some(delay) = backoff.next_backoff() else {
						return Err(e);
					};
					tracing::warn!(
						attempt,
						error = %e,
						delay_ms = delay.as_millis() as u64,
						"Submission failed, retrying"
					);
					tokio::time::sleep(delay).await;
					attempt += 1;
				},
				Err(e) => return Err(e),
			}
		}
	}

	async fn await_confirmation(
		&self,
		reference: &SettlementReference,
	) -> Result<relay_types::TransactionReceipt, OracleError> {
		let timeout = Duration::from_secs(self.config.confirmation_timeout_seconds);
		tokio::time::timeout(
			timeout,
			self.oracle
				.wait_for_confirmation(reference, self.config.confirmations),
		)
		.await
		.map_err(|_| {
			OracleError::Timeout(format!(
				"{} not confirmed within {}s",
				reference,
				timeout.as_secs()
			))
		})?
	}

	/// Maps an oracle failure to a relay error.
	///
	/// A consumed ERC-2612 nonce makes the permit signature check fail, so
	/// account-model signature rejections and reverts are re-checked against
	/// the on-chain nonce.
	async fn classify(&self, permit: &SignedPermit, err: OracleError) -> RelayError {
		let recheck = self.oracle.family() == ChainFamily::Evm
			&& matches!(
				err,
				OracleError::Rejected {
					reason: RejectReason::InvalidSignature | RejectReason::Reverted,
					..
				}
			);
		if recheck {
			let params = &permit.parameters;
			match self
				.oracle
				.is_nonce_consumed(&params.owner, &params.asset, params.nonce)
				.await
			{
				Ok(true) => {
					return RelayError::NonceAlreadyConsumed(format!(
						"nonce {} of {} is already used ({})",
						params.nonce, params.owner, err
					))
				},
				Ok(false) => {},
				Err(e) => tracing::debug!(error = %e, "Nonce re-check failed"),
			}
		}
		err.into()
	}

	async fn save_pending(&self, id: &PermitId, permit: &SignedPermit) {
		let Some(store) = &self.store else {
			return;
		};
		if let Err(e) = store.save_permit(permit).await {
			tracing::warn!(error = %e, "Failed to store permit");
		}
		match store.update_status(id, &RelayStatus::Pending).await {
			Ok(true) => {},
			Ok(false) => tracing::debug!("Permit already settled, keeping stored status"),
			Err(e) => tracing::warn!(error = %e, "Failed to store relay status"),
		}
	}

	/// Stores a final status. A settled status is never overwritten by a
	/// duplicate relay.
	async fn record_status(&self, id: &PermitId, status: RelayStatus) {
		let Some(store) = &self.store else {
			return;
		};
		if let Err(e) = store.update_status(id, &status).await {
			tracing::warn!(error = %e, "Failed to store relay status");
		}
	}
}
