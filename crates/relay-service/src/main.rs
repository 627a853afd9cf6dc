//! Main entry point for the permit relayer.
//!
//! The binary serves the relay HTTP API and offers operator commands for
//! signing permits, relaying or submitting permit records, and inspecting
//! nonces and balances on the configured deployment.

use clap::{Parser, Subcommand};
use relay_config::Config;
use relay_core::{RelayExecutor, RelayerBuilder, RelayerFactories};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

mod apis;
mod commands;
mod server;

use relay_oracle::implementations::evm::alloy::create_oracle as create_evm_oracle;
use relay_oracle::implementations::memory::create_oracle as create_memory_oracle;
use relay_oracle::implementations::svm::rpc::create_oracle as create_svm_oracle;
use relay_storage::implementations::file::create_storage as create_file_storage;
use relay_storage::implementations::memory::create_storage as create_memory_storage;

/// Command-line arguments for the relayer.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
	/// Path to configuration file
	#[arg(short, long, global = true, default_value = "config/relayer.toml")]
	config: PathBuf,

	/// Log level (trace, debug, info, warn, error)
	#[arg(short, long, global = true, default_value = "info")]
	log_level: String,

	#[command(subcommand)]
	command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
	/// Serve the relay HTTP API
	Serve,
	/// Build and sign a permit record
	Sign {
		#[command(flatten)]
		args: commands::SignArgs,

		/// Write the record here instead of stdout
		#[arg(long)]
		out: Option<PathBuf>,
	},
	/// Relay a permit record with the configured oracle
	Relay {
		/// Permit record file
		record: PathBuf,

		/// Receiver requested for the relay
		#[arg(long)]
		receiver: Option<String>,
	},
	/// Post a permit record to a remote relayer
	Submit {
		/// Permit record file
		record: PathBuf,

		/// Base URL of the relayer
		#[arg(long, default_value = "http://127.0.0.1:3000")]
		url: String,

		#[arg(long, env = "RELAYER_API_KEY", hide_env_values = true)]
		api_key: Option<String>,

		/// Receiver requested for the relay
		#[arg(long)]
		receiver: Option<String>,
	},
	/// Print the current nonce of an owner
	Nonce {
		#[arg(long)]
		owner: String,

		#[arg(long)]
		asset: String,
	},
	/// Print token balances
	Balances {
		#[arg(long)]
		asset: String,

		/// Format amounts with this many decimals
		#[arg(long)]
		decimals: Option<u8>,

		/// Accounts to query
		#[arg(required = true)]
		holders: Vec<String>,
	},
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
	let args = Args::parse();

	use tracing_subscriber::{fmt, EnvFilter};

	let default_directive = args.log_level.to_string();
	let env_filter =
		EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive));

	fmt()
		.with_env_filter(env_filter)
		.with_thread_ids(true)
		.with_target(true)
		.init();

	// Submitting to a remote relayer needs no local configuration.
	if let Command::Submit {
		record,
		url,
		api_key,
		receiver,
	} = &args.command
	{
		let (status, response) =
			commands::submit_record(record, url, api_key.as_deref(), receiver.clone()).await?;
		println!("{}", serde_json::to_string_pretty(&response)?);
		if !response.ok {
			return Err(format!("relayer answered {}", status).into());
		}
		return Ok(());
	}

	let config = Config::from_file(&args.config).await?;
	tracing::info!("Loaded configuration [{}]", config.relayer.id);

	match args.command {
		Command::Serve => serve(config).await?,
		Command::Sign { args, out } => {
			let executor = build_executor(config)?;
			let permit = commands::sign_permit(executor.oracle().as_ref(), &args).await?;
			commands::write_record(&permit, out.as_deref()).await?;
		},
		Command::Relay { record, receiver } => {
			let executor = build_executor(config)?;
			let response =
				commands::relay_record(&executor, &record, receiver.as_deref()).await?;
			println!("{}", serde_json::to_string_pretty(&response)?);
		},
		Command::Nonce { owner, asset } => {
			let executor = build_executor(config)?;
			let oracle = executor.oracle();
			let family = oracle.family();
			let owner = relay_types::Identity::parse_as(family, "owner", &owner)?;
			let asset = relay_types::Identity::parse_as(family, "asset", &asset)?;
			println!("{}", oracle.current_nonce(&owner, &asset).await?);
		},
		Command::Balances {
			asset,
			decimals,
			holders,
		} => {
			let executor = build_executor(config)?;
			for (holder, amount) in
				commands::balances(executor.oracle().as_ref(), &asset, &holders, decimals).await?
			{
				println!("{} {}", holder, amount);
			}
		},
		Command::Submit { .. } => {},
	}

	Ok(())
}

/// Runs the HTTP API and the periodic storage sweep.
async fn serve(config: Config) -> Result<(), Box<dyn std::error::Error>> {
	let api_config = match config.api.clone() {
		Some(api) if api.enabled => api,
		_ => return Err("API server is disabled in the configuration".into()),
	};
	let cleanup_interval = Duration::from_secs(config.storage.cleanup_interval_seconds);
	let executor = Arc::new(build_executor(config)?);

	if let Some(store) = executor.store().cloned() {
		tokio::spawn(async move {
			let mut interval = tokio::time::interval(cleanup_interval);
			loop {
				interval.tick().await;
				match store.cleanup_expired().await {
					Ok(0) => {},
					Ok(removed) => tracing::debug!(removed, "Removed expired storage entries"),
					Err(e) => tracing::warn!(error = %e, "Storage cleanup failed"),
				}
			}
		});
	}

	let result = server::start_server(api_config, executor).await;
	tracing::info!("Stopped relayer");
	result
}

/// Macro to create a factory HashMap with the appropriate type aliases
macro_rules! create_factory_map {
    ($interface:path, $error:path, $( $name:literal => $factory:expr ),* $(,)?) => {{
        let mut factories = std::collections::HashMap::new();
        $(
            factories.insert(
                $name.to_string(),
                $factory as fn(&toml::Value) -> Result<Box<dyn $interface>, $error>
            );
        )*
        factories
    }};
}

/// Builds the relay executor with the configured oracle client and store.
pub(crate) fn build_executor(config: Config) -> Result<RelayExecutor, Box<dyn std::error::Error>> {
	let builder = RelayerBuilder::new(config);

	let storage_factories = create_factory_map!(
		relay_storage::StorageInterface,
		relay_storage::StorageError,
		"file" => create_file_storage,
		"memory" => create_memory_storage,
	);

	let oracle_factories = create_factory_map!(
		relay_oracle::OracleInterface,
		relay_oracle::OracleError,
		"evm_alloy" => create_evm_oracle,
		"svm_rpc" => create_svm_oracle,
		"memory" => create_memory_oracle,
	);

	let factories = RelayerFactories {
		storage_factories,
		oracle_factories,
	};

	Ok(builder.build(factories)?)
}

#[cfg(test)]
mod tests {
	use super::*;
	use relay_types::ChainFamily;
	use std::io::Write;
	use tempfile::NamedTempFile;

	const CONFIG: &str = r#"
[relayer]
id = "relayer-main-test"
confirmations = 2

[oracle]
primary = "memory"
[oracle.implementations.memory]
family = "svm"
verifier = "11111111111111111111111111111112"

[storage]
primary = "file"
cleanup_interval_seconds = 60
[storage.implementations.file]
storage_path = "${RELAYER_TEST_STORAGE:-./data/relay-test}"
"#;

	#[test]
	fn test_args_parse_subcommands() {
		let args = Args::try_parse_from(["relayer", "serve"]).unwrap();
		assert_eq!(args.config, PathBuf::from("config/relayer.toml"));
		assert_eq!(args.log_level, "info");
		assert!(matches!(args.command, Command::Serve));

		let args = Args::try_parse_from([
			"relayer",
			"relay",
			"permit.json",
			"--config",
			"custom.toml",
			"--log-level",
			"debug",
		])
		.unwrap();
		assert_eq!(args.config, PathBuf::from("custom.toml"));
		assert_eq!(args.log_level, "debug");
		assert!(matches!(
			args.command,
			Command::Relay { ref record, receiver: None } if record == &PathBuf::from("permit.json")
		));
	}

	#[test]
	fn test_sign_args_conflicts() {
		let parsed = Args::try_parse_from([
			"relayer", "sign", "--key", "0x01", "--asset", "0xaa", "--amount", "1", "--deadline",
			"10", "--ttl", "5",
		]);
		assert!(parsed.is_err());

		let args = Args::try_parse_from([
			"relayer", "sign", "--key", "0x01", "--asset", "0xaa", "--amount", "1",
		])
		.unwrap();
		let Command::Sign { args, out } = args.command else {
			panic!("expected sign");
		};
		assert_eq!(args.fee, "0");
		assert_eq!(args.ttl, 3600);
		assert!(out.is_none());
	}

	#[test]
	fn test_balances_requires_holders() {
		assert!(Args::try_parse_from(["relayer", "balances", "--asset", "0xaa"]).is_err());
	}

	#[test]
	fn test_create_factory_map_macro() {
		let factories = create_factory_map!(
			relay_storage::StorageInterface,
			relay_storage::StorageError,
			"memory" => create_memory_storage,
			"file" => create_file_storage,
		);

		assert_eq!(factories.len(), 2);
		assert!(factories.contains_key("memory"));
		assert!(factories.contains_key("file"));
	}

	#[test]
	fn test_build_executor_from_config_file() {
		let dir = tempfile::tempdir().unwrap();
		let text = CONFIG.replace(
			"${RELAYER_TEST_STORAGE:-./data/relay-test}",
			&dir.path().join("store").display().to_string(),
		);
		let mut file = NamedTempFile::new().unwrap();
		file.write_all(text.as_bytes()).unwrap();

		let config = tokio_test::block_on(Config::from_file(file.path())).unwrap();
		let executor = build_executor(config).unwrap();
		assert!(format!("{:?}", executor).contains("relayer-main-test"));
		assert_eq!(executor.oracle().family(), ChainFamily::Svm);
		assert_eq!(executor.config().confirmations, 2);
		assert!(executor.store().is_some());
	}

	#[test]
	fn test_build_executor_unknown_storage() {
		let text = CONFIG.replace("primary = \"file\"", "primary = \"redis\"")
			+ "[storage.implementations.redis]\n";
		let config: Config = text.parse().unwrap();
		let err = build_executor(config)
			.err()
			.expect("build should fail for an unregistered backend");
		assert!(err.to_string().contains("Unknown storage implementation"));
	}
}
