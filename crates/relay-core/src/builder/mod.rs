//! Construction of a relay executor from configuration.
//!
//! Oracle and storage implementations are created by factories registered
//! under the names used in the configuration tables.

use crate::RelayExecutor;
use relay_config::Config;
use relay_oracle::{OracleError, OracleInterface};
use relay_storage::{PermitStore, StorageError, StorageInterface};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BuilderError {
	#[error("Configuration error: {0}")]
	Config(String),
	#[error("Missing required component: {0}")]
	MissingComponent(String),
}

/// Factories for every pluggable component, by implementation name.
pub struct RelayerFactories<SF, OF> {
	pub storage_factories: HashMap<String, SF>,
	pub oracle_factories: HashMap<String, OF>,
}

/// Builds a [`RelayExecutor`] with its oracle client and permit store.
pub struct RelayerBuilder {
	config: Config,
}

impl RelayerBuilder {
	pub fn new(config: Config) -> Self {
		Self { config }
	}

	pub fn build<SF, OF>(
		self,
		factories: RelayerFactories<SF, OF>,
	) -> Result<RelayExecutor, BuilderError>
	where
		SF: Fn(&toml::Value) -> Result<Box<dyn StorageInterface>, StorageError>,
		OF: Fn(&toml::Value) -> Result<Box<dyn OracleInterface>, OracleError>,
	{
		let storage_name = &self.config.storage.primary;
		let storage_config = self
			.config
			.storage
			.implementations
			.get(storage_name)
			.ok_or_else(|| BuilderError::MissingComponent(format!("storage '{}'", storage_name)))?;
		let storage_factory = factories.storage_factories.get(storage_name).ok_or_else(|| {
			BuilderError::Config(format!("Unknown storage implementation '{}'", storage_name))
		})?;
		let backend = storage_factory(storage_config).map_err(|e| {
			tracing::error!(
				component = "storage",
				implementation = %storage_name,
				error = %e,
				"Failed to create storage implementation"
			);
			BuilderError::Config(format!(
				"Failed to create storage implementation '{}': {}",
				storage_name, e
			))
		})?;
		tracing::info!(component = "storage", implementation = %storage_name, "Loaded");

		let oracle_name = &self.config.oracle.primary;
		let oracle_config = self
			.config
			.oracle
			.primary_table()
			.ok_or_else(|| BuilderError::MissingComponent(format!("oracle '{}'", oracle_name)))?;
		let oracle_factory = factories.oracle_factories.get(oracle_name).ok_or_else(|| {
			BuilderError::Config(format!("Unknown oracle implementation '{}'", oracle_name))
		})?;
		let oracle = oracle_factory(oracle_config).map_err(|e| {
			tracing::error!(
				component = "oracle",
				implementation = %oracle_name,
				error = %e,
				"Failed to create oracle implementation"
			);
			BuilderError::Config(format!(
				"Failed to create oracle implementation '{}': {}",
				oracle_name, e
			))
		})?;
		tracing::info!(
			component = "oracle",
			implementation = %oracle_name,
			family = %oracle.family(),
			verifier = %oracle.verifier(),
			relayer = %oracle.relayer(),
			"Loaded"
		);

		let oracle: Arc<dyn OracleInterface> = Arc::from(oracle);
		Ok(RelayExecutor::new(oracle, self.config.relayer.clone())
			.with_store(Arc::new(PermitStore::new(backend))))
	}
}
