//! Permit store for the relayer.
//!
//! A small key-value abstraction with in-memory and file backends, plus
//! [`PermitStore`], which keeps signed permit records under `permits:<id>` and
//! relay outcomes under `receipts:<id>`. Records are stored in their JSON wire
//! form and fully re-validated when loaded.

use async_trait::async_trait;
use relay_types::{
	ImplementationRegistry, PermitId, PermitRecord, RelayStatus, SignedPermit, StorageKey,
};
use serde::{de::DeserializeOwned, Serialize};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Mutex;

pub mod implementations {
	pub mod file;
	pub mod memory;
}

/// Errors that can occur during storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
	#[error("Not found")]
	NotFound,
	#[error("Serialization error: {0}")]
	Serialization(String),
	#[error("Backend error: {0}")]
	Backend(String),
	#[error("Configuration error: {0}")]
	Configuration(String),
}

/// Low-level byte storage with optional expiry.
#[async_trait]
pub trait StorageInterface: Send + Sync {
	async fn get_bytes(&self, key: &str) -> Result<Vec<u8>, StorageError>;

	/// Stores `value`; `ttl` of `None` uses the backend's default for the key.
	async fn set_bytes(
		&self,
		key: &str,
		value: Vec<u8>,
		ttl: Option<Duration>,
	) -> Result<(), StorageError>;

	async fn delete(&self, key: &str) -> Result<(), StorageError>;

	async fn exists(&self, key: &str) -> Result<bool, StorageError>;

	/// Removes expired entries and returns how many were removed.
	async fn cleanup_expired(&self) -> Result<usize, StorageError> {
		Ok(0)
	}
}

pub type StorageFactory = fn(&toml::Value) -> Result<Box<dyn StorageInterface>, StorageError>;

pub trait StorageRegistry: ImplementationRegistry<Factory = StorageFactory> {}

/// All storage backends, by configuration name.
pub fn get_all_implementations() -> Vec<(&'static str, StorageFactory)> {
	use implementations::{file, memory};

	vec![
		(file::Registry::NAME, file::Registry::factory()),
		(memory::Registry::NAME, memory::Registry::factory()),
	]
}

/// Typed JSON operations over a storage backend.
pub struct StorageService {
	backend: Box<dyn StorageInterface>,
}

impl StorageService {
	pub fn new(backend: Box<dyn StorageInterface>) -> Self {
		Self { backend }
	}

	fn key(namespace: StorageKey, id: &str) -> String {
		format!("{}:{}", namespace.as_str(), id)
	}

	pub async fn store<T: Serialize>(
		&self,
		namespace: StorageKey,
		id: &str,
		data: &T,
	) -> Result<(), StorageError> {
		let bytes =
			serde_json::to_vec(data).map_err(|e| StorageError::Serialization(e.to_string()))?;
		self.backend
			.set_bytes(&Self::key(namespace, id), bytes, None)
			.await
	}

	pub async fn retrieve<T: DeserializeOwned>(
		&self,
		namespace: StorageKey,
		id: &str,
	) -> Result<T, StorageError> {
		let bytes = self.backend.get_bytes(&Self::key(namespace, id)).await?;
		serde_json::from_slice(&bytes).map_err(|e| StorageError::Serialization(e.to_string()))
	}

	pub async fn cleanup_expired(&self) -> Result<usize, StorageError> {
		self.backend.cleanup_expired().await
	}
}

/// Storage of permit records and their relay outcomes.
pub struct PermitStore {
	storage: StorageService,
	/// Held across the read and write of a status update.
	status_lock: Mutex<()>,
}

impl PermitStore {
	pub fn new(backend: Box<dyn StorageInterface>) -> Self {
		Self {
			storage: StorageService::new(backend),
			status_lock: Mutex::new(()),
		}
	}

	/// Saves the wire record of `permit` and returns its id.
	pub async fn save_permit(&self, permit: &SignedPermit) -> Result<PermitId, StorageError> {
		let id = permit.id();
		let record = PermitRecord::from_signed(permit);
		self.storage
			.store(StorageKey::Permits, &id.to_string(), &record)
			.await?;
		Ok(id)
	}

	/// Loads and re-validates a permit.
	pub async fn load_permit(&self, id: &PermitId) -> Result<SignedPermit, StorageError> {
		let record: PermitRecord = self
			.storage
			.retrieve(StorageKey::Permits, &id.to_string())
			.await?;
		record
			.to_signed()
			.map_err(|e| StorageError::Serialization(format!("stored permit {} is invalid: {}", id, e)))
	}

	async fn save_status(&self, id: &PermitId, status: &RelayStatus) -> Result<(), StorageError> {
		self.storage
			.store(StorageKey::Receipts, &id.to_string(), status)
			.await
	}

	/// Stores `status` for `id`. A stored settled status is only ever replaced
	/// by another settled status. Returns whether `status` was written.
	pub async fn update_status(
		&self,
		id: &PermitId,
		status: &RelayStatus,
	) -> Result<bool, StorageError> {
		let _guard = self.status_lock.lock().await;
		if !matches!(status, RelayStatus::Settled { .. }) {
			match self.load_status(id).await {
				Ok(RelayStatus::Settled { .. }) => return Ok(false),
				Ok(_) | Err(StorageError::NotFound) => {},
				Err(StorageError::Serialization(e)) => {
					tracing::warn!(permit_id = %id, error = %e, "Replacing unreadable relay status");
				},
				Err(e) => return Err(e),
			}
		}
		self.save_status(id, status).await?;
		Ok(true)
	}

	pub async fn load_status(&self, id: &PermitId) -> Result<RelayStatus, StorageError> {
		self.storage
			.retrieve(StorageKey::Receipts, &id.to_string())
			.await
	}

	pub async fn cleanup_expired(&self) -> Result<usize, StorageError> {
		self.storage.cleanup_expired().await
	}
}
