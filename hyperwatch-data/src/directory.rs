//! Tracked wallet directory.
//!
//! Read-mostly lookup of lowercased wallet address to [`TrackedWalletEntry`]. The table is
//! never mutated in place: a refresh builds a new [`WalletTable`] and swaps the reference,
//! so an enrichment step always sees either the old or the new table in full.

use crate::error::DirectoryError;
use arc_swap::ArcSwap;
use derive_more::Display;
use fnv::FnvHashMap;
use serde::{Deserialize, Serialize};
use smol_str::SmolStr;
use std::{path::Path, sync::Arc};
use tracing::info;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Display, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WalletTier {
    #[display("tracked")]
    Tracked,
    #[display("large-notional")]
    #[serde(alias = "large-notional")]
    LargeNotional,
    #[display("institutional")]
    Institutional,
}

/// Metadata for a wallet of interest. `labels` is never empty.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub struct TrackedWalletEntry {
    pub labels: Vec<SmolStr>,
    pub tier: WalletTier,
}

impl TrackedWalletEntry {
    pub fn new<I, L>(labels: I, tier: WalletTier) -> Self
    where
        I: IntoIterator<Item = L>,
        L: Into<SmolStr>,
    {
        Self {
            labels: labels.into_iter().map(Into::into).collect(),
            tier,
        }
    }

    /// Primary label shown against attributed trades.
    pub fn primary_label(&self) -> Option<&SmolStr> {
        self.labels.first()
    }
}

/// Immutable address → entry table. Keys are lowercased.
#[derive(Clone, Debug, Default)]
pub struct WalletTable(FnvHashMap<String, TrackedWalletEntry>);

impl WalletTable {
    /// Build a table, lowercasing every address and rejecting entries without labels.
    pub fn from_entries<I, A>(entries: I) -> Result<Self, DirectoryError>
    where
        I: IntoIterator<Item = (A, TrackedWalletEntry)>,
        A: AsRef<str>,
    {
        entries
            .into_iter()
            .map(|(address, entry)| {
                let address = address.as_ref().to_lowercase();
                if entry.labels.is_empty() {
                    Err(DirectoryError::EmptyLabels { address })
                } else {
                    Ok((address, entry))
                }
            })
            .collect::<Result<FnvHashMap<_, _>, _>>()
            .map(Self)
    }

    /// Parse a JSON object of the form `{"0xabc": {"labels": ["Fund"], "tier": "tracked"}}`.
    pub fn from_json(json: &str) -> Result<Self, DirectoryError> {
        let raw = serde_json::from_str::<FnvHashMap<String, TrackedWalletEntry>>(json)?;
        Self::from_entries(raw)
    }

    /// Look up an address that is already lowercased.
    pub fn get(&self, address_lowercase: &str) -> Option<&TrackedWalletEntry> {
        self.0.get(address_lowercase)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Process-wide handle onto the current [`WalletTable`], swappable as a whole.
#[derive(Debug)]
pub struct WalletDirectory {
    table: ArcSwap<WalletTable>,
}

impl WalletDirectory {
    pub fn new(table: WalletTable) -> Self {
        Self {
            table: ArcSwap::from_pointee(table),
        }
    }

    /// Load a directory from a JSON file on disk.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, DirectoryError> {
        let path = path.as_ref();
        let table = WalletTable::from_json(&std::fs::read_to_string(path)?)?;
        info!(path = %path.display(), wallets = table.len(), "loaded wallet directory");
        Ok(Self::new(table))
    }

    /// Snapshot of the current table. Holding it pins that version for the caller.
    pub fn snapshot(&self) -> Arc<WalletTable> {
        self.table.load_full()
    }

    /// Atomically replace the whole table.
    pub fn replace(&self, table: WalletTable) {
        info!(wallets = table.len(), "replacing wallet directory");
        self.table.store(Arc::new(table));
    }

    pub fn len(&self) -> usize {
        self.table.load().len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.load().is_empty()
    }
}

impl Default for WalletDirectory {
    fn default() -> Self {
        Self::new(WalletTable::default())
    }
}
