//! JSON snapshots of a [`KnowledgeStore`].
//!
//! The document has four top-level maps, `transactions`, `entities`,
//! `patterns` and `relations`, keyed by hash, address, pattern key and
//! `from:type:to` respectively. Relations are self-describing so loading
//! never has to split the composite key apart.
//!
//! `save_to_file`/`load_from_file` never fail loudly: the cause is logged
//! and the call returns `false`. The `try_*` variants return the error.

use std::collections::BTreeMap;
use std::path::Path;

use eyre::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{error, info};

use crate::store::KnowledgeStore;
use crate::types::{Entity, Pattern, Relation, Transaction};

#[derive(Serialize)]
struct SnapshotRef<'a> {
    transactions: &'a BTreeMap<String, Transaction>,
    entities: &'a BTreeMap<String, Entity>,
    patterns: &'a BTreeMap<String, Pattern>,
    relations: BTreeMap<String, &'a Relation>,
}

#[derive(Deserialize)]
struct Snapshot {
    #[serde(default)]
    transactions: BTreeMap<String, Transaction>,
    #[serde(default)]
    entities: BTreeMap<String, Entity>,
    #[serde(default)]
    patterns: BTreeMap<String, Pattern>,
    #[serde(default)]
    relations: BTreeMap<String, Relation>,
}

impl KnowledgeStore {
    /// Serialize all four maps as one pretty-printed JSON document.
    ///
    /// # Errors
    /// Returns error if a record cannot be serialized.
    pub fn to_json(&self) -> Result<String> {
        let snapshot = SnapshotRef {
            transactions: &self.transactions,
            entities: &self.entities,
            patterns: &self.patterns,
            relations: self
                .relations
                .values()
                .map(|relation| (relation.key(), relation))
                .collect(),
        };
        serde_json::to_string_pretty(&snapshot).wrap_err("failed to serialize knowledge store")
    }

    /// Build a store from a snapshot document. Missing top-level keys read as empty.
    ///
    /// # Errors
    /// Returns error if the document is not valid JSON or a record is malformed.
    pub fn from_json(json: &str) -> Result<Self> {
        let snapshot: Snapshot =
            serde_json::from_str(json).wrap_err("failed to decode knowledge store snapshot")?;

        let relations = snapshot
            .relations
            .into_values()
            .map(|relation| {
                let key = (
                    relation.entity1.clone(),
                    relation.relation_type.clone(),
                    relation.entity2.clone(),
                );
                (key, relation)
            })
            .collect();

        Ok(Self {
            transactions: snapshot.transactions,
            entities: snapshot.entities,
            patterns: snapshot.patterns,
            relations,
        })
    }

    /// Write the snapshot to `path`, overwriting any existing file.
    ///
    /// # Errors
    /// Returns error if serialization or the file write fails.
    #[tracing::instrument(skip_all)]
    pub fn try_save(&self, path: &Path) -> Result<()> {
        let json = self.to_json()?;
        std::fs::write(path, json)
            .wrap_err_with(|| format!("failed to write snapshot to {}", path.display()))?;
        info!(
            path = %path.display(),
            transactions = self.transaction_count(),
            entities = self.entity_count(),
            patterns = self.pattern_count(),
            relations = self.relation_count(),
            "knowledge store saved"
        );
        Ok(())
    }

    /// Read a snapshot from `path` into a fresh store.
    ///
    /// # Errors
    /// Returns error if the file cannot be read or decoded.
    #[tracing::instrument(skip_all)]
    pub fn try_load(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)
            .wrap_err_with(|| format!("failed to read snapshot {}", path.display()))?;
        let store = Self::from_json(&json)
            .wrap_err_with(|| format!("invalid snapshot {}", path.display()))?;
        info!(
            path = %path.display(),
            transactions = store.transaction_count(),
            entities = store.entity_count(),
            patterns = store.pattern_count(),
            relations = store.relation_count(),
            "knowledge store loaded"
        );
        Ok(store)
    }

    /// Persist the store. Returns `false` (after logging why) on any failure.
    pub fn save_to_file(&self, path: impl AsRef<Path>) -> bool {
        let path = path.as_ref();
        match self.try_save(path) {
            Ok(()) => true,
            Err(e) => {
                error!(path = %path.display(), "failed to save knowledge store: {e:#}");
                false
            }
        }
    }

    /// Replace the whole in-memory state with the snapshot at `path`.
    ///
    /// On failure the current state is left untouched and `false` is returned.
    pub fn load_from_file(&mut self, path: impl AsRef<Path>) -> bool {
        let path = path.as_ref();
        match Self::try_load(path) {
            Ok(loaded) => {
                *self = loaded;
                true
            }
            Err(e) => {
                error!(path = %path.display(), "failed to load knowledge store: {e:#}");
                false
            }
        }
    }
}
