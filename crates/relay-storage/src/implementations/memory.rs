//! In-memory storage backend.
//!
//! Nothing survives a restart. Entries written with a TTL are hidden once
//! they expire and dropped by `cleanup_expired`.

use crate::{StorageError, StorageFactory, StorageInterface, StorageRegistry};
use async_trait::async_trait;
use relay_types::{current_timestamp, ImplementationRegistry};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

struct Entry {
	value: Vec<u8>,
	/// Unix seconds, 0 = never.
	expires_at: u64,
}

impl Entry {
	fn is_expired(&self, now: u64) -> bool {
		self.expires_at != 0 && now >= self.expires_at
	}
}

pub struct MemoryStorage {
	store: Arc<RwLock<HashMap<String, Entry>>>,
}

impl MemoryStorage {
	pub fn new() -> Self {
		Self {
			store: Arc::new(RwLock::new(HashMap::new())),
		}
	}
}

impl Default for MemoryStorage {
	fn default() -> Self {
		Self::new()
	}
}

#[async_trait]
impl StorageInterface for MemoryStorage {
	async fn get_bytes(&self, key: &str) -> Result<Vec<u8>, StorageError> {
		let store = self.store.read().await;
		match store.get(key) {
			Some(entry) if !entry.is_expired(current_timestamp()) => Ok(entry.value.clone()),
			_ => Err(StorageError::NotFound),
		}
	}

	async fn set_bytes(
		&self,
		key: &str,
		value: Vec<u8>,
		ttl: Option<Duration>,
	) -> Result<(), StorageError> {
		let expires_at = match ttl {
			Some(ttl) if !ttl.is_zero() => current_timestamp().saturating_add(ttl.as_secs().max(1)),
			_ => 0,
		};
		let mut store = self.store.write().await;
		store.insert(key.to_string(), Entry { value, expires_at });
		Ok(())
	}

	async fn delete(&self, key: &str) -> Result<(), StorageError> {
		let mut store = self.store.write().await;
		store.remove(key);
		Ok(())
	}

	async fn exists(&self, key: &str) -> Result<bool, StorageError> {
		let store = self.store.read().await;
		Ok(store
			.get(key)
			.is_some_and(|entry| !entry.is_expired(current_timestamp())))
	}

	async fn cleanup_expired(&self) -> Result<usize, StorageError> {
		let now = current_timestamp();
		let mut store = self.store.write().await;
		let before = store.len();
		store.retain(|_, entry| !entry.is_expired(now));
		Ok(before - store.len())
	}
}

/// Builds a memory store. Takes no configuration.
pub fn create_storage(_config: &toml::Value) -> Result<Box<dyn StorageInterface>, StorageError> {
	Ok(Box::new(MemoryStorage::new()))
}

pub struct Registry;

impl ImplementationRegistry for Registry {
	const NAME: &'static str = "memory";
	type Factory = StorageFactory;

	fn factory() -> Self::Factory {
		create_storage
	}
}

impl StorageRegistry for Registry {}

#[cfg(test)]
mod tests {
	use super::*;

	#[tokio::test]
	async fn test_basic_operations() {
		let storage = MemoryStorage::new();

		storage
			.set_bytes("permits:a", b"record".to_vec(), None)
			.await
			.unwrap();
		assert_eq!(storage.get_bytes("permits:a").await.unwrap(), b"record");
		assert!(storage.exists("permits:a").await.unwrap());

		storage
			.set_bytes("permits:a", b"updated".to_vec(), None)
			.await
			.unwrap();
		assert_eq!(storage.get_bytes("permits:a").await.unwrap(), b"updated");

		storage.delete("permits:a").await.unwrap();
		assert!(!storage.exists("permits:a").await.unwrap());
		assert!(matches!(
			storage.get_bytes("permits:a").await,
			Err(StorageError::NotFound)
		));
	}

	#[tokio::test]
	async fn test_expired_entries_are_hidden_and_cleaned() {
		let storage = MemoryStorage::new();
		storage
			.set_bytes("receipts:a", b"done".to_vec(), None)
			.await
			.unwrap();
		storage
			.set_bytes("receipts:b", b"stale".to_vec(), Some(Duration::from_secs(1)))
			.await
			.unwrap();

		{
			let mut store = storage.store.write().await;
			if let Some(entry) = store.get_mut("receipts:b") {
				entry.expires_at = current_timestamp() - 1;
			}
		}

		assert!(!storage.exists("receipts:b").await.unwrap());
		assert!(matches!(
			storage.get_bytes("receipts:b").await,
			Err(StorageError::NotFound)
		));
		assert_eq!(storage.cleanup_expired().await.unwrap(), 1);
		assert!(storage.exists("receipts:a").await.unwrap());
	}
}
