//! Record types held by the knowledge store.

use alloy::primitives::U256;
use serde::{de, Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use crate::quantity;

/// Open property bag attached to entities and relations.
pub type Properties = Map<String, Value>;

/// A decoded transaction as handed over by upstream RPC clients.
///
/// The hash is not a field: it is the key the record is stored under.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct Transaction {
    /// Sender address.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub from: Option<String>,
    /// Recipient address (None for contract creation).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub to: Option<String>,
    /// Transferred value in wei.
    #[serde(serialize_with = "quantity::wei::serialize")]
    pub value: U256,
    /// Timestamp in unix seconds.
    #[serde(serialize_with = "quantity::epoch::serialize")]
    pub timestamp: u64,
    /// Call data (hex with 0x prefix), if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input: Option<String>,
    /// Everything else upstream sent along (gas, blockNumber, ...), kept verbatim.
    #[serde(flatten)]
    pub extra: Properties,
}

/// Decoded from the full property map first, so wide integers reach the
/// quantity decoders as exact JSON numbers rather than through serde's
/// buffered representation, which has no room for values past `u64`.
impl<'de> Deserialize<'de> for Transaction {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let fields = Properties::deserialize(deserializer)?;
        Self::from_fields(fields).map_err(de::Error::custom)
    }
}

fn take_field<T>(
    fields: &mut Properties,
    key: &str,
    decode: impl FnOnce(Value) -> serde_json::Result<T>,
) -> serde_json::Result<Option<T>> {
    fields
        .remove(key)
        .map(decode)
        .transpose()
        .map_err(|e| de::Error::custom(format_args!("field `{key}`: {e}")))
}

impl Transaction {
    fn from_fields(mut fields: Properties) -> serde_json::Result<Self> {
        let from = take_field(&mut fields, "from", |v| Option::<String>::deserialize(v))?.flatten();
        let to = take_field(&mut fields, "to", |v| Option::<String>::deserialize(v))?.flatten();
        let input = take_field(&mut fields, "input", |v| Option::<String>::deserialize(v))?.flatten();
        let value = take_field(&mut fields, "value", |v| quantity::wei::deserialize(v))?
            .unwrap_or_default();
        let timestamp = take_field(&mut fields, "timestamp", |v| quantity::epoch::deserialize(v))?
            .unwrap_or_default();

        Ok(Self {
            from,
            to,
            value,
            timestamp,
            input,
            extra: fields,
        })
    }

    /// A plain value transfer between two addresses.
    pub fn transfer(from: &str, to: &str, value: U256, timestamp: u64) -> Self {
        Self {
            from: Some(from.to_string()),
            to: Some(to.to_string()),
            value,
            timestamp,
            ..Self::default()
        }
    }

    /// A contract deployment: no recipient, non-empty init code.
    pub fn deployment(from: &str, input: &str, timestamp: u64) -> Self {
        Self {
            from: Some(from.to_string()),
            input: Some(input.to_string()),
            timestamp,
            ..Self::default()
        }
    }

    /// Sender, treating an empty string as missing.
    pub fn sender(&self) -> Option<&str> {
        self.from.as_deref().filter(|s| !s.is_empty())
    }

    /// Recipient, treating an empty string as missing.
    pub fn receiver(&self) -> Option<&str> {
        self.to.as_deref().filter(|s| !s.is_empty())
    }

    /// True when the call data carries more than the empty `0x` payload.
    pub fn has_payload(&self) -> bool {
        matches!(self.input.as_deref(), Some(input) if !input.is_empty() && input != "0x")
    }
}

/// Kind of an entity record. Plain addresses are the only kind today.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    #[default]
    Address,
}

/// An address known to the store, with every transaction it took part in.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    #[serde(rename = "type", default)]
    pub kind: EntityKind,
    /// Hashes of transactions this address sent or received, in ingestion order.
    #[serde(default)]
    pub transactions: Vec<String>,
    /// Enrichment data (balances, labels, last-queried time).
    #[serde(flatten)]
    pub properties: Properties,
}

impl Entity {
    pub fn with_properties(properties: Properties) -> Self {
        Self {
            properties,
            ..Self::default()
        }
    }
}

/// A typed, directed association between two addresses.
///
/// Serialized in the normalized `{entity1, entity2, type, data}` shape that
/// [`crate::store::KnowledgeStore::get_relations`] hands back.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Relation {
    pub entity1: String,
    pub entity2: String,
    #[serde(rename = "type")]
    pub relation_type: String,
    #[serde(default)]
    pub data: Properties,
}

impl Relation {
    /// Composite key `from:type:to` used in snapshots.
    pub fn key(&self) -> String {
        format!("{}:{}:{}", self.entity1, self.relation_type, self.entity2)
    }

    pub fn involves(&self, address: &str) -> bool {
        self.entity1 == address || self.entity2 == address
    }
}

/// A derived finding. Carries enough evidence to audit why it was raised.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Pattern {
    /// Single transfer above [`quantity::LARGE_TRANSFER_THRESHOLD`].
    LargeTransfer {
        tx_hash: String,
        from_address: Option<String>,
        #[serde(with = "quantity::wei")]
        value: U256,
        #[serde(with = "quantity::wei")]
        threshold: U256,
        timestamp: u64,
    },
    /// Transaction without recipient carrying init code.
    ContractCreation {
        tx_hash: String,
        creator: Option<String>,
        timestamp: u64,
    },
    /// One sender fanning out to many recipients within one hour bucket.
    FundSplitting {
        from_address: String,
        window_start: u64,
        recipient_count: usize,
        transaction_count: usize,
        transactions: Vec<String>,
    },
    /// Many senders converging on one recipient within one hour bucket.
    FundMerging {
        to_address: String,
        window_start: u64,
        sender_count: usize,
        transaction_count: usize,
        transactions: Vec<String>,
    },
    /// Funds returning to an address through a chain of transfers.
    CyclicTransfer {
        addresses: Vec<String>,
        transactions: Vec<String>,
    },
}

impl Pattern {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::LargeTransfer { .. } => "large_transfer",
            Self::ContractCreation { .. } => "contract_creation",
            Self::FundSplitting { .. } => "fund_splitting",
            Self::FundMerging { .. } => "fund_merging",
            Self::CyclicTransfer { .. } => "cyclic_transfer",
        }
    }

    /// Transaction hashes cited as evidence.
    pub fn transactions(&self) -> Vec<&str> {
        match self {
            Self::LargeTransfer { tx_hash, .. } | Self::ContractCreation { tx_hash, .. } => {
                vec![tx_hash.as_str()]
            }
            Self::FundSplitting { transactions, .. }
            | Self::FundMerging { transactions, .. }
            | Self::CyclicTransfer { transactions, .. } => {
                transactions.iter().map(String::as_str).collect()
            }
        }
    }

    /// Whether `address` is the party this finding is attributed to.
    pub fn involves(&self, address: &str) -> bool {
        match self {
            Self::LargeTransfer { from_address, .. } => from_address.as_deref() == Some(address),
            Self::ContractCreation { creator, .. } => creator.as_deref() == Some(address),
            Self::FundSplitting { from_address, .. } => from_address == address,
            Self::FundMerging { to_address, .. } => to_address == address,
            Self::CyclicTransfer { addresses, .. } => addresses.iter().any(|a| a == address),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transaction_keeps_unknown_fields() {
        let json = r#"{
            "from": "0xaa",
            "to": "0xbb",
            "value": "0x64",
            "timestamp": 1700000000,
            "gas": "0x5208",
            "blockNumber": 19000000
        }"#;
        let tx: Transaction = serde_json::from_str(json).unwrap();
        assert_eq!(tx.sender(), Some("0xaa"));
        assert_eq!(tx.receiver(), Some("0xbb"));
        assert_eq!(tx.value, U256::from(100));
        assert_eq!(tx.extra["gas"], "0x5208");
        assert_eq!(tx.extra["blockNumber"], 19_000_000);
        assert!(!tx.extra.contains_key("value"));
    }

    #[test]
    fn transaction_from_value_keeps_wide_integers() {
        let record = serde_json::json!({
            "from": "0xaa",
            "to": null,
            "value": 150_000_000_000_000_000_000u128,
            "timestamp": 1700000000
        });
        let tx: Transaction = serde_json::from_value(record).unwrap();
        assert_eq!(tx.value, U256::from(150_000_000_000_000_000_000u128));
        assert_eq!(tx.timestamp, 1_700_000_000);
        assert!(tx.receiver().is_none());
        assert!(tx.extra.is_empty());

        let bad = serde_json::json!({"from": "0xaa", "value": "nope"});
        let err = serde_json::from_value::<Transaction>(bad).unwrap_err();
        assert!(err.to_string().contains("value"));
    }

    #[test]
    fn empty_endpoints_read_as_missing() {
        let tx = Transaction {
            from: Some(String::new()),
            to: None,
            ..Transaction::default()
        };
        assert!(tx.sender().is_none());
        assert!(tx.receiver().is_none());
    }

    #[test]
    fn payload_detection() {
        let mut tx = Transaction::deployment("0xaa", "0x6080", 0);
        assert!(tx.has_payload());
        tx.input = Some("0x".to_string());
        assert!(!tx.has_payload());
        tx.input = None;
        assert!(!tx.has_payload());
    }

    #[test]
    fn entity_flattens_properties() {
        let mut props = Properties::new();
        props.insert("label".to_string(), Value::from("exchange"));
        let entity = Entity::with_properties(props);

        let json = serde_json::to_value(&entity).unwrap();
        assert_eq!(json["type"], "address");
        assert_eq!(json["label"], "exchange");
        assert_eq!(json["transactions"], Value::Array(vec![]));
    }

    #[test]
    fn pattern_tagged_by_type() {
        let pattern = Pattern::CyclicTransfer {
            addresses: vec!["0xa".into(), "0xb".into()],
            transactions: vec!["0x1".into(), "0x2".into()],
        };
        let json = serde_json::to_value(&pattern).unwrap();
        assert_eq!(json["type"], "cyclic_transfer");
        assert_eq!(pattern.as_str(), "cyclic_transfer");
        assert!(pattern.involves("0xb"));
        assert_eq!(pattern.transactions(), vec!["0x1", "0x2"]);

        let back: Pattern = serde_json::from_value(json).unwrap();
        assert_eq!(back, pattern);
    }

    #[test]
    fn relation_key_is_ordered() {
        let relation = Relation {
            entity1: "0xa".into(),
            entity2: "0xb".into(),
            relation_type: "funded".into(),
            data: Properties::new(),
        };
        assert_eq!(relation.key(), "0xa:funded:0xb");
        assert!(relation.involves("0xb"));
        assert!(!relation.involves("0xc"));
    }
}
