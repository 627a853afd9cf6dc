//! Configuration for the permit relayer.
//!
//! Configuration is a single TOML file. `${VAR}` and `${VAR:-default}`
//! references are resolved from the environment before parsing, and the
//! parsed result is validated before it is handed out. Oracle and storage
//! implementations keep their own tables as raw `toml::Value`s that are
//! interpreted by the factory registered under the table's name.

use regex::Regex;
use relay_types::{ChainFamily, SecretString};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::str::FromStr;
use thiserror::Error;

/// Errors that can occur during configuration operations.
#[derive(Debug, Error)]
pub enum ConfigError {
	#[error("IO error: {0}")]
	Io(#[from] std::io::Error),
	#[error("Configuration error: {0}")]
	Parse(String),
	#[error("Validation error: {0}")]
	Validation(String),
}

impl From<toml::de::Error> for ConfigError {
	fn from(err: toml::de::Error) -> Self {
		// Keep the message, drop the echoed input.
		ConfigError::Parse(err.message().to_string())
	}
}

/// Top-level relayer configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
	pub relayer: RelayerConfig,
	pub oracle: OracleConfig,
	pub storage: StorageConfig,
	pub api: Option<ApiConfig>,
}

/// Whether the receiver is fixed by the permit record or chosen by the relayer.
///
/// The account-model message does not cover the receiver, so `Pinned` is the
/// only setting under which the owner controls the destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReceiverBinding {
	/// The record must carry a receiver and relays to any other receiver are refused.
	#[default]
	Pinned,
	/// The relayer supplies the receiver.
	RelayerChosen,
}

/// Executor settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RelayerConfig {
	/// Identifier reported by the health endpoint and in logs.
	pub id: String,
	#[serde(default)]
	pub receiver_binding: ReceiverBinding,
	/// Verify the permit signature locally before submitting.
	#[serde(default = "default_true")]
	pub precheck_signature: bool,
	/// Confirmations to wait for before reporting success.
	#[serde(default = "default_confirmations")]
	pub confirmations: u64,
	/// Upper bound on the confirmation wait.
	#[serde(default = "default_confirmation_timeout")]
	pub confirmation_timeout_seconds: u64,
	#[serde(default)]
	pub retry: RetryConfig,
}

fn default_true() -> bool {
	true
}

fn default_confirmations() -> u64 {
	1
}

fn default_confirmation_timeout() -> u64 {
	120
}

/// Backoff applied to transient submission failures.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RetryConfig {
	/// Total submission attempts, including the first.
	#[serde(default = "default_max_attempts")]
	pub max_attempts: u32,
	#[serde(default = "default_initial_interval_ms")]
	pub initial_interval_ms: u64,
	#[serde(default = "default_max_interval_ms")]
	pub max_interval_ms: u64,
	#[serde(default = "default_max_elapsed_seconds")]
	pub max_elapsed_seconds: u64,
}

impl Default for RetryConfig {
	fn default() -> Self {
		Self {
			max_attempts: default_max_attempts(),
			initial_interval_ms: default_initial_interval_ms(),
			max_interval_ms: default_max_interval_ms(),
			max_elapsed_seconds: default_max_elapsed_seconds(),
		}
	}
}

fn default_max_attempts() -> u32 {
	4
}

fn default_initial_interval_ms() -> u64 {
	500
}

fn default_max_interval_ms() -> u64 {
	8_000
}

fn default_max_elapsed_seconds() -> u64 {
	60
}

/// Verification oracle clients.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct OracleConfig {
	/// Which implementation the executor talks to.
	pub primary: String,
	/// Implementation name to raw configuration table.
	pub implementations: HashMap<String, toml::Value>,
}

impl OracleConfig {
	/// The table of the primary implementation.
	pub fn primary_table(&self) -> Option<&toml::Value> {
		self.implementations.get(&self.primary)
	}
}

/// Permit store backend.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StorageConfig {
	pub primary: String,
	pub implementations: HashMap<String, toml::Value>,
	/// Interval between sweeps of expired entries.
	#[serde(default = "default_cleanup_interval")]
	pub cleanup_interval_seconds: u64,
}

fn default_cleanup_interval() -> u64 {
	3600
}

/// HTTP API server.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ApiConfig {
	#[serde(default)]
	pub enabled: bool,
	#[serde(default = "default_api_host")]
	pub host: String,
	#[serde(default = "default_api_port")]
	pub port: u16,
	#[serde(default = "default_api_timeout")]
	pub timeout_seconds: u64,
	#[serde(default = "default_max_request_size")]
	pub max_request_size: usize,
	/// Value expected in the `x-relayer-key` header.
	pub api_key: Option<SecretString>,
	/// Refuse to start without `api_key`.
	#[serde(default)]
	pub require_api_key: bool,
	pub cors: Option<CorsConfig>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CorsConfig {
	pub allowed_origins: Vec<String>,
}

fn default_api_host() -> String {
	"127.0.0.1".to_string()
}

fn default_api_port() -> u16 {
	3000
}

fn default_api_timeout() -> u64 {
	// Covers submission plus confirmation wait.
	180
}

fn default_max_request_size() -> usize {
	64 * 1024
}

/// Resolves `${VAR}` and `${VAR:-default}` references from the environment.
///
/// Comment lines are copied unchanged. Inputs larger than 1MB are rejected.
pub(crate) fn resolve_env_vars(input: &str) -> Result<String, ConfigError> {
	const MAX_INPUT_SIZE: usize = 1024 * 1024;
	if input.len() > MAX_INPUT_SIZE {
		return Err(ConfigError::Validation(format!(
			"Configuration file too large: {} bytes (max: {} bytes)",
			input.len(),
			MAX_INPUT_SIZE
		)));
	}

	let re = Regex::new(r"\$\{([A-Z_][A-Z0-9_]{0,127})(?::-([^}]{0,256}))?\}")
		.map_err(|e| ConfigError::Parse(format!("Regex error: {}", e)))?;

	let mut result = String::with_capacity(input.len());
	for line in input.split_inclusive('\n') {
		if line.trim_start().starts_with('#') {
			result.push_str(line);
			continue;
		}
		let mut last = 0;
		for cap in re.captures_iter(line) {
			let (Some(full), Some(name)) = (cap.get(0), cap.get(1)) else {
				continue;
			};
			let value = match std::env::var(name.as_str()) {
				Ok(v) => v,
				Err(_) => match cap.get(2) {
					Some(default) => default.as_str().to_string(),
					None => {
						return Err(ConfigError::Validation(format!(
							"Environment variable '{}' not found",
							name.as_str()
						)))
					},
				},
			};
			result.push_str(&line[last..full.start()]);
			result.push_str(&value);
			last = full.end();
		}
		result.push_str(&line[last..]);
	}
	Ok(result)
}

impl Config {
	/// Loads, resolves and validates a configuration file.
	pub async fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
		let content = tokio::fs::read_to_string(path.as_ref()).await?;
		content.parse()
	}

	/// Confirmation wait as a `Duration`.
	pub fn confirmation_timeout(&self) -> std::time::Duration {
		std::time::Duration::from_secs(self.relayer.confirmation_timeout_seconds)
	}

	fn validate(&self) -> Result<(), ConfigError> {
		if self.relayer.id.trim().is_empty() {
			return Err(ConfigError::Validation("Relayer ID cannot be empty".into()));
		}
		if self.relayer.confirmations == 0 {
			return Err(ConfigError::Validation(
				"relayer.confirmations must be at least 1".into(),
			));
		}
		if self.relayer.confirmations > 100 {
			return Err(ConfigError::Validation(
				"relayer.confirmations cannot exceed 100".into(),
			));
		}
		if self.relayer.confirmation_timeout_seconds == 0 {
			return Err(ConfigError::Validation(
				"relayer.confirmation_timeout_seconds must be greater than 0".into(),
			));
		}
		if self.relayer.retry.max_attempts == 0 {
			return Err(ConfigError::Validation(
				"relayer.retry.max_attempts must be at least 1".into(),
			));
		}

		let Some(oracle_table) = self.oracle.primary_table() else {
			return Err(ConfigError::Validation(format!(
				"Primary oracle '{}' not found in implementations",
				self.oracle.primary
			)));
		};
		if let Some(family) = oracle_table.get("family") {
			let family = family.as_str().ok_or_else(|| {
				ConfigError::Validation("oracle family must be a string".into())
			})?;
			ChainFamily::from_str(family).map_err(|e| ConfigError::Validation(e.to_string()))?;
		}

		if self.storage.primary.is_empty() {
			return Err(ConfigError::Validation(
				"Storage primary implementation cannot be empty".into(),
			));
		}
		if !self
			.storage
			.implementations
			.contains_key(&self.storage.primary)
		{
			return Err(ConfigError::Validation(format!(
				"Primary storage '{}' not found in implementations",
				self.storage.primary
			)));
		}
		if self.storage.cleanup_interval_seconds == 0 {
			return Err(ConfigError::Validation(
				"Storage cleanup_interval_seconds must be greater than 0".into(),
			));
		}

		if let Some(api) = &self.api {
			let has_key = api.api_key.as_ref().is_some_and(|k| !k.is_empty());
			if api.enabled && api.require_api_key && !has_key {
				return Err(ConfigError::Validation(
					"api.require_api_key is set but api.api_key is empty".into(),
				));
			}
		}
		Ok(())
	}
}

impl FromStr for Config {
	type Err = ConfigError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		let resolved = resolve_env_vars(s)?;
		let config: Config = toml::from_str(&resolved)?;
		config.validate()?;
		Ok(config)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::io::Write;

	const BASE: &str = r#"
[relayer]
id = "relayer-test"

[oracle]
primary = "memory"
[oracle.implementations.memory]
family = "svm"
verifier = "11111111111111111111111111111111"

[storage]
primary = "memory"
[storage.implementations.memory]
"#;

	#[test]
	fn test_env_var_resolution() {
		std::env::set_var("RELAY_TEST_HOST", "localhost");
		std::env::set_var("RELAY_TEST_PORT", "8545");

		let input = "url = \"http://${RELAY_TEST_HOST}:${RELAY_TEST_PORT}\"";
		assert_eq!(
			resolve_env_vars(input).unwrap(),
			"url = \"http://localhost:8545\""
		);

		std::env::remove_var("RELAY_TEST_HOST");
		std::env::remove_var("RELAY_TEST_PORT");
	}

	#[test]
	fn test_env_var_default_and_missing() {
		let input = "key = \"${RELAY_TEST_UNSET_A:-fallback}\"";
		assert_eq!(resolve_env_vars(input).unwrap(), "key = \"fallback\"");

		let err = resolve_env_vars("key = \"${RELAY_TEST_UNSET_B}\"").unwrap_err();
		assert!(err.to_string().contains("RELAY_TEST_UNSET_B"));
	}

	#[test]
	fn test_env_var_references_in_comments_are_ignored() {
		let input = "# set ${RELAY_TEST_UNSET_C} to override\n  # ${RELAY_TEST_UNSET_D:-x}\nkey = \"${RELAY_TEST_UNSET_E:-value}\"\n";
		assert_eq!(
			resolve_env_vars(input).unwrap(),
			"# set ${RELAY_TEST_UNSET_C} to override\n  # ${RELAY_TEST_UNSET_D:-x}\nkey = \"value\"\n"
		);

		let text = format!("# requires ${{RELAY_TEST_UNSET_F}}\n{}", BASE);
		let config: Config = text.parse().unwrap();
		assert_eq!(config.relayer.id, "relayer-test");
	}

	#[test]
	fn test_defaults() {
		let config: Config = BASE.parse().unwrap();
		assert_eq!(config.relayer.receiver_binding, ReceiverBinding::Pinned);
		assert!(config.relayer.precheck_signature);
		assert_eq!(config.relayer.confirmations, 1);
		assert_eq!(config.relayer.retry.max_attempts, 4);
		assert_eq!(config.storage.cleanup_interval_seconds, 3600);
		assert!(config.api.is_none());
		assert!(config.oracle.primary_table().is_some());
	}

	#[test]
	fn test_receiver_binding_parsing() {
		let text = BASE.replace(
			"id = \"relayer-test\"",
			"id = \"relayer-test\"\nreceiver_binding = \"relayer_chosen\"",
		);
		let config: Config = text.parse().unwrap();
		assert_eq!(
			config.relayer.receiver_binding,
			ReceiverBinding::RelayerChosen
		);

		let text = BASE.replace(
			"id = \"relayer-test\"",
			"id = \"relayer-test\"\nreceiver_binding = \"anyone\"",
		);
		assert!(matches!(text.parse::<Config>(), Err(ConfigError::Parse(_))));
	}

	#[test]
	fn test_validation_failures() {
		let cases = [
			BASE.replace("id = \"relayer-test\"", "id = \"\""),
			BASE.replace("id = \"relayer-test\"", "id = \"r\"\nconfirmations = 0"),
			BASE.replace("id = \"relayer-test\"", "id = \"r\"\nconfirmations = 101"),
			BASE.replace("primary = \"memory\"\n[oracle", "primary = \"evm\"\n[oracle"),
			BASE.replace("family = \"svm\"", "family = \"cosmos\""),
			BASE.replace(
				"primary = \"memory\"\n[storage",
				"primary = \"file\"\n[storage",
			),
		];
		for text in cases {
			assert!(
				matches!(text.parse::<Config>(), Err(ConfigError::Validation(_))),
				"accepted:\n{}",
				text
			);
		}
	}

	#[test]
	fn test_api_key_required() {
		let text = format!(
			"{}\n[api]\nenabled = true\nrequire_api_key = true\napi_key = \"${{RELAY_TEST_UNSET_KEY:-}}\"\n",
			BASE
		);
		assert!(matches!(
			text.parse::<Config>(),
			Err(ConfigError::Validation(_))
		));

		let text = format!(
			"{}\n[api]\nenabled = true\nrequire_api_key = true\napi_key = \"secret\"\n",
			BASE
		);
		let config: Config = text.parse().unwrap();
		let api = config.api.unwrap();
		assert_eq!(api.port, 3000);
		assert_eq!(api.api_key.unwrap().expose_secret(), "secret");
	}

	#[tokio::test]
	async fn test_from_file() {
		let mut file = tempfile::NamedTempFile::new().unwrap();
		file.write_all(BASE.as_bytes()).unwrap();
		let config = Config::from_file(file.path()).await.unwrap();
		assert_eq!(config.relayer.id, "relayer-test");

		let missing = Config::from_file("/nonexistent/relayer.toml").await;
		assert!(matches!(missing, Err(ConfigError::Io(_))));
	}

	#[test]
	fn test_shipped_example_parses() {
		let config: Config = include_str!("../../../config/relayer.toml").parse().unwrap();
		assert_eq!(config.relayer.id, "relayer-local");
		assert_eq!(config.storage.primary, "file");
		assert!(config.oracle.implementations.contains_key("evm_alloy"));
		assert!(config.oracle.implementations.contains_key("svm_rpc"));
		let api = config.api.unwrap();
		assert_eq!(api.cors.unwrap().allowed_origins.len(), 1);
	}
}
