//! Command-line operations besides `serve`.
//!
//! Each command talks to the configured oracle through the executor, or to a
//! remote relayer over HTTP for `submit`.

use crate::apis::relay::RelayRequest;
use crate::server::API_KEY_HEADER;
use alloy_primitives::U256;
use relay_account::signer_for;
use relay_core::RelayExecutor;
use relay_oracle::OracleInterface;
use relay_types::{
	current_timestamp, format_token_amount, parse_token_amount,
	utils::parse_decimal_u256, Identity, PermitParameters, PermitRecord, RelayResponse,
	SecretString, SignedPermit,
};
use std::error::Error;
use std::path::Path;

/// Arguments of the `sign` command.
#[derive(clap::Args, Debug, Clone)]
pub struct SignArgs {
	/// Owner key: hex secp256k1 key for EVM, base58 or hex ed25519 key for SVM
	#[arg(long, env = "PERMIT_OWNER_KEY", hide_env_values = true)]
	pub key: String,

	/// Token contract (EVM) or mint (SVM)
	#[arg(long)]
	pub asset: String,

	/// Amount delivered to the receiver
	#[arg(long)]
	pub amount: String,

	/// Fee paid to the relayer
	#[arg(long, default_value = "0")]
	pub fee: String,

	/// Read amounts as token units with this many decimals
	#[arg(long)]
	pub decimals: Option<u8>,

	/// Absolute deadline in unix seconds
	#[arg(long, conflicts_with = "ttl")]
	pub deadline: Option<i64>,

	/// Seconds from now until the permit expires
	#[arg(long, default_value_t = 3600)]
	pub ttl: i64,

	/// Nonce to sign; read from the oracle when omitted
	#[arg(long)]
	pub nonce: Option<String>,

	/// Receiver pinned into the record
	#[arg(long)]
	pub receiver: Option<String>,
}

fn parse_quantity(
	field: &'static str,
	value: &str,
	decimals: Option<u8>,
) -> Result<U256, Box<dyn Error>> {
	let raw = match decimals {
		Some(d) => parse_token_amount(value, d)
			.ok_or_else(|| format!("invalid {} '{}' for {} decimals", field, value, d))?,
		None => value.to_string(),
	};
	Ok(parse_decimal_u256(field, &raw)?)
}

/// Builds and signs a permit for the deployment `oracle` serves.
pub async fn sign_permit(
	oracle: &dyn OracleInterface,
	args: &SignArgs,
) -> Result<SignedPermit, Box<dyn Error>> {
	let family = oracle.family();
	let asset = Identity::parse_as(family, "asset", &args.asset)?;
	let domain = oracle.permit_domain(&asset).await?;
	let signer = signer_for(family, &SecretString::from(args.key.as_str()), domain)?;
	let owner = signer.identity();

	let nonce = match &args.nonce {
		Some(nonce) => parse_decimal_u256("nonce", nonce)?,
		None => oracle.current_nonce(&owner, &asset).await?,
	};
	let deadline = args
		.deadline
		.unwrap_or_else(|| current_timestamp() as i64 + args.ttl);

	let params = PermitParameters::new(
		owner,
		oracle.verifier(),
		asset,
		parse_quantity("amount", &args.amount, args.decimals)?,
		parse_quantity("fee", &args.fee, args.decimals)?,
		deadline,
		nonce,
	)?;
	tracing::info!(
		owner = %params.owner,
		nonce = %params.nonce,
		deadline = params.deadline,
		"Signing permit"
	);

	let mut permit = signer.sign(params)?;
	if let Some(receiver) = &args.receiver {
		permit = permit.with_receiver(Identity::parse_as(family, "receiver", receiver)?)?;
	}
	Ok(permit)
}

/// Writes `permit` as a JSON record to `out`, or stdout when absent.
pub async fn write_record(permit: &SignedPermit, out: Option<&Path>) -> Result<(), Box<dyn Error>> {
	let json = PermitRecord::from_signed(permit).to_json()?;
	match out {
		Some(path) => {
			tokio::fs::write(path, json).await?;
			tracing::info!(permit_id = %permit.id(), path = %path.display(), "Wrote permit record");
		},
		None => println!("{}", json),
	}
	Ok(())
}

async fn read_record(path: &Path) -> Result<SignedPermit, Box<dyn Error>> {
	let json = tokio::fs::read_to_string(path).await?;
	Ok(PermitRecord::parse_json(&json)?)
}

/// Relays a record file through the local executor.
pub async fn relay_record(
	executor: &RelayExecutor,
	path: &Path,
	receiver: Option<&str>,
) -> Result<RelayResponse, Box<dyn Error>> {
	let permit = read_record(path).await?;
	let receiver = receiver
		.map(|r| Identity::parse_as(permit.family(), "receiver", r))
		.transpose()?;

	let receipt = executor.relay(&permit, receiver).await?;
	if let Some(settled) = chrono::DateTime::from_timestamp(receipt.settled_at, 0) {
		tracing::info!(settled_at = %settled.to_rfc3339(), "Permit settled");
	}
	Ok(RelayResponse::settled(&receipt))
}

/// Posts a record file to a remote relayer. Returns the HTTP status and body.
pub async fn submit_record(
	path: &Path,
	url: &str,
	api_key: Option<&str>,
	receiver: Option<String>,
) -> Result<(u16, RelayResponse), Box<dyn Error>> {
	let json = tokio::fs::read_to_string(path).await?;
	let record: PermitRecord = serde_json::from_str(&json)?;
	let body = RelayRequest {
		record,
		requested_receiver: receiver,
	};

	let mut request = reqwest::Client::new()
		.post(format!("{}/api/relay", url.trim_end_matches('/')))
		.json(&body);
	if let Some(key) = api_key {
		request = request.header(API_KEY_HEADER, key);
	}
	let response = request.send().await?;
	let status = response.status().as_u16();
	let body: RelayResponse = response.json().await?;
	Ok((status, body))
}

/// Balances of `holders` in `asset`, formatted with `decimals` when given.
pub async fn balances(
	oracle: &dyn OracleInterface,
	asset: &str,
	holders: &[String],
	decimals: Option<u8>,
) -> Result<Vec<(Identity, String)>, Box<dyn Error>> {
	let family = oracle.family();
	let asset = Identity::parse_as(family, "asset", asset)?;
	let mut out = Vec::with_capacity(holders.len());
	for holder in holders {
		let holder = Identity::parse_as(family, "holder", holder)?;
		let raw = oracle.balance(&holder, &asset).await?.to_string();
		let shown = match decimals {
			Some(d) => format_token_amount(&raw, d),
			None => raw,
		};
		out.push((holder, shown));
	}
	Ok(out)
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::build_executor;
	use relay_config::Config;
	use relay_types::RelayErrorKind;
	use tempfile::tempdir;

	const OWNER_KEY: &str = "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";
	const OWNER: &str = "0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266";
	const TOKEN: &str = "0xe7f1725E7734CE288F8367e1Bb143E90bb3F0512";
	const RECEIVER: &str = "0x70997970C51812dc3A010C7d01b50e0d17dc79C8";

	const CONFIG: &str = r#"
[relayer]
id = "relayer-cli-test"

[oracle]
primary = "memory"
[oracle.implementations.memory]
family = "evm"
verifier = "0x5FbDB2315678afecb367f032d93F642f64180aa3"
balances = [
	{ holder = "0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266", asset = "0xe7f1725E7734CE288F8367e1Bb143E90bb3F0512", amount = "20000000000000000000" },
]

[storage]
primary = "memory"
[storage.implementations.memory]
"#;

	fn sign_args() -> SignArgs {
		SignArgs {
			key: OWNER_KEY.to_string(),
			asset: TOKEN.to_string(),
			amount: "10".to_string(),
			fee: "0.1".to_string(),
			decimals: Some(18),
			deadline: None,
			ttl: 600,
			nonce: None,
			receiver: Some(RECEIVER.to_string()),
		}
	}

	#[tokio::test]
	async fn test_sign_then_relay_record() {
		let executor = build_executor(CONFIG.parse::<Config>().unwrap()).unwrap();
		let oracle = executor.oracle().as_ref();
		let permit = sign_permit(oracle, &sign_args()).await.unwrap();
		assert_eq!(permit.parameters.nonce, U256::ZERO);
		assert_eq!(
			permit.parameters.fee,
			U256::from(100_000_000_000_000_000u64)
		);

		let dir = tempdir().unwrap();
		let path = dir.path().join("permit.json");
		write_record(&permit, Some(&path)).await.unwrap();

		let response = relay_record(&executor, &path, None).await.unwrap();
		assert!(response.ok);
		assert_eq!(response.permit_id, Some(permit.id().to_string()));

		let next = sign_permit(oracle, &sign_args()).await.unwrap();
		assert_eq!(next.parameters.nonce, U256::from(1u64));

		let shown = balances(oracle, TOKEN, &[OWNER.to_string(), RECEIVER.to_string()], Some(18))
			.await
			.unwrap();
		assert_eq!(shown[0].1, "9.9");
		assert_eq!(shown[1].1, "10");
	}

	#[tokio::test]
	async fn test_relay_record_rejects_other_receiver() {
		let executor = build_executor(CONFIG.parse::<Config>().unwrap()).unwrap();
		let permit = sign_permit(executor.oracle().as_ref(), &sign_args())
			.await
			.unwrap();
		let dir = tempdir().unwrap();
		let path = dir.path().join("permit.json");
		write_record(&permit, Some(&path)).await.unwrap();

		let err = relay_record(&executor, &path, Some(OWNER)).await.unwrap_err();
		let err = err.downcast::<relay_core::RelayError>().unwrap();
		assert_eq!(err.kind(), RelayErrorKind::SignatureRejected);
	}

	#[tokio::test]
	async fn test_sign_with_explicit_nonce_and_deadline() {
		let executor = build_executor(CONFIG.parse::<Config>().unwrap()).unwrap();
		let mut args = sign_args();
		args.nonce = Some("7".to_string());
		args.deadline = Some(1_900_000_000);
		args.decimals = None;
		args.amount = "1000".to_string();
		args.fee = "1".to_string();
		let permit = sign_permit(executor.oracle().as_ref(), &args).await.unwrap();
		assert_eq!(permit.parameters.nonce, U256::from(7u64));
		assert_eq!(permit.parameters.deadline, 1_900_000_000);
		assert_eq!(permit.parameters.amount, U256::from(1000u64));
	}

	#[test]
	fn test_parse_quantity() {
		assert_eq!(
			parse_quantity("amount", "1.5", Some(6)).unwrap(),
			U256::from(1_500_000u64)
		);
		assert!(parse_quantity("amount", "1.5", None).is_err());
		assert!(parse_quantity("amount", "abc", Some(6)).is_err());
	}
}
