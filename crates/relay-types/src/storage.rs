//! Storage namespaces.

use std::str::FromStr;

/// Namespaces of the permit store.
///
/// Keys are written as `<namespace>:<id>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StorageKey {
	/// Signed permit records, keyed by permit id.
	Permits,
	/// Relay outcomes, keyed by permit id.
	Receipts,
}

impl StorageKey {
	pub fn as_str(&self) -> &'static str {
		match self {
			StorageKey::Permits => "permits",
			StorageKey::Receipts => "receipts",
		}
	}

	pub fn all() -> impl Iterator<Item = Self> {
		[Self::Permits, Self::Receipts].into_iter()
	}
}

impl FromStr for StorageKey {
	type Err = ();

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s {
			"permits" => Ok(Self::Permits),
			"receipts" => Ok(Self::Receipts),
			_ => Err(()),
		}
	}
}

impl From<StorageKey> for &'static str {
	fn from(key: StorageKey) -> Self {
		key.as_str()
	}
}
