//! File-backed storage.
//!
//! Each key is one file under `storage_path`, prefixed with a fixed header that
//! carries the expiry time. Writes go to a temporary file that is renamed into
//! place, so a reader never observes a half-written record.

use crate::{StorageError, StorageFactory, StorageInterface, StorageRegistry};
use async_trait::async_trait;
use relay_types::{current_timestamp, ImplementationRegistry, StorageKey};
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;
use tokio::fs;

#[allow(clippy::doc_nested_refdefs)]
/// Fixed-size file header.
///
/// Binary layout (32 bytes total):
/// - [0-3]: Magic bytes "GPRS"
/// - [4-5]: Version (u16, little-endian)
/// - [6-13]: Expiration timestamp (u64, little-endian, Unix seconds, 0 = never)
/// - [14-31]: Reserved
#[derive(Debug, Clone, PartialEq, Eq)]
struct FileHeader {
	version: u16,
	expires_at: u64,
}

impl FileHeader {
	const MAGIC: &'static [u8; 4] = b"GPRS";
	const VERSION: u16 = 1;
	const SIZE: usize = 32;

	fn new(ttl: Duration) -> Self {
		let expires_at = if ttl.is_zero() {
			0
		} else {
			current_timestamp().saturating_add(ttl.as_secs().max(1))
		};
		Self {
			version: Self::VERSION,
			expires_at,
		}
	}

	fn serialize(&self) -> [u8; Self::SIZE] {
		let mut bytes = [0u8; Self::SIZE];
		bytes[0..4].copy_from_slice(Self::MAGIC);
		bytes[4..6].copy_from_slice(&self.version.to_le_bytes());
		bytes[6..14].copy_from_slice(&self.expires_at.to_le_bytes());
		bytes
	}

	fn deserialize(bytes: &[u8]) -> Result<Self, StorageError> {
		if bytes.len() < Self::SIZE {
			return Err(StorageError::Backend("file too small for header".into()));
		}
		if &bytes[0..4] != Self::MAGIC {
			return Err(StorageError::Backend("bad magic".into()));
		}

		let version = u16::from_le_bytes([bytes[4], bytes[5]]);
		if version > Self::VERSION {
			return Err(StorageError::Backend(format!(
				"unsupported file version: {}",
				version
			)));
		}

		let mut expires = [0u8; 8];
		expires.copy_from_slice(&bytes[6..14]);
		Ok(Self {
			version,
			expires_at: u64::from_le_bytes(expires),
		})
	}

	fn is_expired(&self) -> bool {
		self.expires_at != 0 && current_timestamp() >= self.expires_at
	}
}

/// Default expiry per namespace, read from `ttl_permits` / `ttl_receipts`.
#[derive(Debug, Clone, Default)]
pub struct TtlConfig {
	ttls: HashMap<StorageKey, Duration>,
}

impl TtlConfig {
	fn from_config(config: &toml::Value) -> Result<Self, StorageError> {
		let mut ttls = HashMap::new();
		for storage_key in StorageKey::all() {
			let config_key = format!("ttl_{}", storage_key.as_str());
			let Some(value) = config.get(&config_key) else {
				continue;
			};
			let secs = value
				.as_integer()
				.and_then(|v| u64::try_from(v).ok())
				.ok_or_else(|| {
					StorageError::Configuration(format!(
						"{} must be a non-negative integer",
						config_key
					))
				})?;
			ttls.insert(storage_key, Duration::from_secs(secs));
		}
		Ok(Self { ttls })
	}

	pub fn with_ttl(mut self, key: StorageKey, ttl: Duration) -> Self {
		self.ttls.insert(key, ttl);
		self
	}

	fn get_ttl(&self, storage_key: StorageKey) -> Duration {
		self.ttls
			.get(&storage_key)
			.copied()
			.unwrap_or(Duration::ZERO)
	}
}

pub struct FileStorage {
	base_path: PathBuf,
	ttl_config: TtlConfig,
}

impl FileStorage {
	pub fn new(base_path: PathBuf, ttl_config: TtlConfig) -> Self {
		Self {
			base_path,
			ttl_config,
		}
	}

	fn get_file_path(&self, key: &str) -> PathBuf {
		let safe_key = key.replace(['/', ':', '\\'], "_");
		self.base_path.join(format!("{}.bin", safe_key))
	}

	fn get_ttl_for_key(&self, key: &str) -> Duration {
		key.split(':')
			.next()
			.and_then(|namespace| namespace.parse::<StorageKey>().ok())
			.map(|sk| self.ttl_config.get_ttl(sk))
			.unwrap_or(Duration::ZERO)
	}

	async fn cleanup_expired_files(&self) -> Result<usize, StorageError> {
		let mut entries = match fs::read_dir(&self.base_path).await {
			Ok(entries) => entries,
			Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
			Err(e) => return Err(StorageError::Backend(e.to_string())),
		};

		let mut removed = 0;
		while let Some(entry) = entries
			.next_entry()
			.await
			.map_err(|e| StorageError::Backend(e.to_string()))?
		{
			let path = entry.path();
			if path.extension() != Some(std::ffi::OsStr::new("bin")) {
				continue;
			}
			let data = match fs::read(&path).await {
				Ok(data) => data,
				Err(e) => {
					tracing::debug!("Skipping file {:?}: could not be read: {}", path, e);
					continue;
				},
			};
			match FileHeader::deserialize(&data) {
				Ok(header) if header.is_expired() => {
					if let Err(e) = fs::remove_file(&path).await {
						tracing::warn!("Failed to remove expired file {:?}: {}", path, e);
					} else {
						removed += 1;
					}
				},
				Ok(_) => {},
				Err(e) => tracing::debug!("Skipping file {:?}: {}", path, e),
			}
		}
		Ok(removed)
	}
}

#[async_trait]
impl StorageInterface for FileStorage {
	async fn get_bytes(&self, key: &str) -> Result<Vec<u8>, StorageError> {
		let path = self.get_file_path(key);
		let data = match fs::read(&path).await {
			Ok(data) => data,
			Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
				return Err(StorageError::NotFound)
			},
			Err(e) => return Err(StorageError::Backend(e.to_string())),
		};

		let header = FileHeader::deserialize(&data)?;
		if header.is_expired() {
			return Err(StorageError::NotFound);
		}
		Ok(data[FileHeader::SIZE..].to_vec())
	}

	async fn set_bytes(
		&self,
		key: &str,
		value: Vec<u8>,
		ttl: Option<Duration>,
	) -> Result<(), StorageError> {
		let path = self.get_file_path(key);
		fs::create_dir_all(&self.base_path)
			.await
			.map_err(|e| StorageError::Backend(e.to_string()))?;

		let ttl = ttl.unwrap_or_else(|| self.get_ttl_for_key(key));
		let header = FileHeader::new(ttl);

		let mut file_data = Vec::with_capacity(FileHeader::SIZE + value.len());
		file_data.extend_from_slice(&header.serialize());
		file_data.extend_from_slice(&value);

		let temp_path = path.with_extension("tmp");
		fs::write(&temp_path, file_data)
			.await
			.map_err(|e| StorageError::Backend(e.to_string()))?;
		fs::rename(&temp_path, &path)
			.await
			.map_err(|e| StorageError::Backend(e.to_string()))?;

		Ok(())
	}

	async fn delete(&self, key: &str) -> Result<(), StorageError> {
		match fs::remove_file(self.get_file_path(key)).await {
			Ok(_) => Ok(()),
			Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
			Err(e) => Err(StorageError::Backend(e.to_string())),
		}
	}

	async fn exists(&self, key: &str) -> Result<bool, StorageError> {
		match self.get_bytes(key).await {
			Ok(_) => Ok(true),
			Err(StorageError::NotFound) => Ok(false),
			Err(e) => Err(e),
		}
	}

	async fn cleanup_expired(&self) -> Result<usize, StorageError> {
		self.cleanup_expired_files().await
	}
}

/// Builds a file store.
///
/// Configuration parameters:
/// - `storage_path`: base directory (default: "./data/permits")
/// - `ttl_permits`: seconds to keep permit records (default: 0, forever)
/// - `ttl_receipts`: seconds to keep relay outcomes (default: 0, forever)
pub fn create_storage(config: &toml::Value) -> Result<Box<dyn StorageInterface>, StorageError> {
	let storage_path = match config.get("storage_path") {
		None => "./data/permits",
		Some(value) => value.as_str().ok_or_else(|| {
			StorageError::Configuration("storage_path must be a string".to_string())
		})?,
	};

	Ok(Box::new(FileStorage::new(
		PathBuf::from(storage_path),
		TtlConfig::from_config(config)?,
	)))
}

pub struct Registry;

impl ImplementationRegistry for Registry {
	const NAME: &'static str = "file";
	type Factory = StorageFactory;

	fn factory() -> Self::Factory {
		create_storage
	}
}

impl StorageRegistry for Registry {}

#[cfg(test)]
mod tests {
	use super::*;
	use tempfile::TempDir;

	fn storage(dir: &TempDir) -> FileStorage {
		FileStorage::new(dir.path().to_path_buf(), TtlConfig::default())
	}

	#[test]
	fn test_header_layout() {
		let header = FileHeader {
			version: 1,
			expires_at: 0x0102_0304_0506_0708,
		};
		let bytes = header.serialize();
		assert_eq!(&bytes[0..4], b"GPRS");
		assert_eq!(&bytes[4..6], &[1, 0]);
		assert_eq!(&bytes[6..14], &[8, 7, 6, 5, 4, 3, 2, 1]);
		assert_eq!(FileHeader::deserialize(&bytes).unwrap(), header);

		let mut future = bytes;
		future[4] = 9;
		assert!(FileHeader::deserialize(&future).is_err());
		assert!(FileHeader::deserialize(&bytes[..16]).is_err());
	}

	#[tokio::test]
	async fn test_basic_operations() {
		let dir = TempDir::new().unwrap();
		let storage = storage(&dir);

		storage
			.set_bytes("permits:0xab", b"record".to_vec(), None)
			.await
			.unwrap();
		assert!(dir.path().join("permits_0xab.bin").exists());
		assert_eq!(storage.get_bytes("permits:0xab").await.unwrap(), b"record");
		assert!(storage.exists("permits:0xab").await.unwrap());

		storage.delete("permits:0xab").await.unwrap();
		storage.delete("permits:0xab").await.unwrap();
		assert!(!storage.exists("permits:0xab").await.unwrap());
		assert!(matches!(
			storage.get_bytes("permits:0xab").await,
			Err(StorageError::NotFound)
		));
	}

	#[tokio::test]
	async fn test_cleanup_removes_only_expired() {
		let dir = TempDir::new().unwrap();
		let storage = storage(&dir);

		storage
			.set_bytes("receipts:live", b"ok".to_vec(), None)
			.await
			.unwrap();

		let expired = FileHeader {
			version: 1,
			expires_at: current_timestamp() - 10,
		};
		let mut data = expired.serialize().to_vec();
		data.extend_from_slice(b"old");
		std::fs::write(dir.path().join("receipts_old.bin"), data).unwrap();
		std::fs::write(dir.path().join("notes.txt"), b"ignored").unwrap();

		assert!(!storage.exists("receipts:old").await.unwrap());
		assert_eq!(storage.cleanup_expired().await.unwrap(), 1);
		assert!(!dir.path().join("receipts_old.bin").exists());
		assert!(storage.exists("receipts:live").await.unwrap());
	}

	#[tokio::test]
	async fn test_namespace_ttl_from_config() {
		let dir = TempDir::new().unwrap();
		let config: toml::Value = toml::from_str(&format!(
			"storage_path = {:?}\nttl_receipts = 3600\n",
			dir.path().display().to_string()
		))
		.unwrap();
		let storage = create_storage(&config).unwrap();
		storage
			.set_bytes("receipts:a", b"x".to_vec(), None)
			.await
			.unwrap();
		storage
			.set_bytes("permits:a", b"y".to_vec(), None)
			.await
			.unwrap();

		let receipt = std::fs::read(dir.path().join("receipts_a.bin")).unwrap();
		let permit = std::fs::read(dir.path().join("permits_a.bin")).unwrap();
		assert!(FileHeader::deserialize(&receipt).unwrap().expires_at > current_timestamp());
		assert_eq!(FileHeader::deserialize(&permit).unwrap().expires_at, 0);
	}

	#[test]
	fn test_rejects_bad_ttl() {
		let config: toml::Value = toml::from_str("ttl_permits = -5").unwrap();
		assert!(matches!(
			create_storage(&config),
			Err(StorageError::Configuration(_))
		));
	}
}
