//! The declarative policy plan: which tables to probe, as whom, expecting
//! what.

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use indexmap::IndexMap;
use serde::de::{self, DeserializeOwned, MapAccess, Visitor};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::json;

use crate::claims::JwtClaims;
use crate::error::{ConfigError, ConfigResult};
use crate::op::{Expectation, Op};
use crate::scenario::Scenario;

/// A schema-qualified table identifier, rendered as `schema.name`.
///
/// A bare `name` defaults to the `public` schema.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TableKey {
    /// Schema name.
    pub schema: String,
    /// Table name.
    pub name: String,
}

impl TableKey {
    /// Create a table key from explicit parts.
    pub fn new(schema: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            schema: schema.into(),
            name: name.into(),
        }
    }

    /// Whether the table lives in the `public` schema.
    pub fn is_public_schema(&self) -> bool {
        self.schema == "public"
    }
}

impl fmt::Display for TableKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.schema, self.name)
    }
}

impl FromStr for TableKey {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (schema, name) = match s.split_once('.') {
            Some((schema, name)) => (schema, name),
            None => ("public", s),
        };

        if schema.is_empty() || name.is_empty() || name.contains('.') {
            return Err(ConfigError::InvalidTableKey(s.to_string()));
        }

        Ok(Self::new(schema, name))
    }
}

impl Serialize for TableKey {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for TableKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(de::Error::custom)
    }
}

/// The test plan for one table.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TablePlan {
    /// Scenarios to probe against this table. Empty means "use defaults".
    #[serde(default)]
    pub test_scenarios: Vec<Scenario>,

    /// Restrict probing to these operations. `None` probes all four.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_operations: Option<Vec<Op>>,
}

/// The test plan for one storage bucket.
///
/// Storage policies live on the shared `storage.objects` relation; the
/// bucket name keys the plan and supplies the `bucket_id` filter each probe
/// applies.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BucketPlan {
    /// Scenarios to probe against this bucket.
    #[serde(default)]
    pub test_scenarios: Vec<Scenario>,

    /// Restrict probing to these operations. `None` probes all four.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_operations: Option<Vec<Op>>,
}

/// Default claims per caller kind, used when a table declares no scenarios.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DefaultJwtClaims {
    /// Claims for the synthesized anonymous scenario.
    #[serde(default)]
    pub anonymous: JwtClaims,
    /// Claims for the synthesized authenticated scenario.
    #[serde(default)]
    pub authenticated: JwtClaims,
}

/// Plan-wide defaults applied to tables without explicit scenarios.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Defaults {
    /// Expected outcomes for the synthesized anonymous scenario.
    #[serde(default)]
    pub anonymous_user_expectations: std::collections::BTreeMap<Op, Expectation>,

    /// Expected outcomes for the synthesized authenticated scenario.
    #[serde(default)]
    pub authenticated_user_expectations: std::collections::BTreeMap<Op, Expectation>,

    /// Default claim sets for the synthesized scenarios.
    #[serde(default)]
    pub default_jwt_claims: DefaultJwtClaims,
}

impl Defaults {
    /// Materialize the two default scenarios.
    ///
    /// An authenticated scenario whose default claims omit `role` gets
    /// `role = "authenticated"` injected, otherwise the engine would probe
    /// it as `anon`.
    pub fn scenarios(&self) -> Vec<Scenario> {
        let mut authenticated_claims = self.default_jwt_claims.authenticated.clone();
        if authenticated_claims.role().is_none() {
            authenticated_claims.insert("role", json!("authenticated"));
        }

        vec![
            Scenario {
                name: "anonymous".to_string(),
                jwt_claims: self.default_jwt_claims.anonymous.clone(),
                expected: self.anonymous_user_expectations.clone(),
            },
            Scenario {
                name: "authenticated".to_string(),
                jwt_claims: authenticated_claims,
                expected: self.authenticated_user_expectations.clone(),
            },
        ]
    }
}

/// The whole declarative test plan, as authored in the policy file.
///
/// Table and bucket order is preserved from the authoring surface so
/// reports read in the same order the file does.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PolicyConfig {
    /// Per-table plans, keyed by `schema.name`.
    #[serde(default, deserialize_with = "unique_table_map")]
    pub tables: IndexMap<TableKey, TablePlan>,

    /// Per-bucket plans, keyed by bucket name.
    #[serde(default, deserialize_with = "unique_bucket_map", skip_serializing_if = "IndexMap::is_empty")]
    pub storage_buckets: IndexMap<String, BucketPlan>,

    /// Plan-wide defaults.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub defaults: Option<Defaults>,
}

impl PolicyConfig {
    /// Parse a plan from YAML source.
    pub fn from_yaml_str(source: &str) -> ConfigResult<Self> {
        let config: PolicyConfig =
            serde_yaml::from_str(source).map_err(|e| classify_parse_error(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Parse a plan from JSON source.
    pub fn from_json_str(source: &str) -> ConfigResult<Self> {
        let config: PolicyConfig =
            serde_json::from_str(source).map_err(|e| classify_parse_error(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load a plan from disk, dispatching on the file extension
    /// (`.json` parses as JSON, everything else as YAML).
    pub fn load(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path)?;

        match path.extension().and_then(|e| e.to_str()) {
            Some("json") => Self::from_json_str(&source),
            _ => Self::from_yaml_str(&source),
        }
    }

    /// The scenarios to run against one table plan: the plan's own, or the
    /// synthesized defaults when it declares none.
    pub fn effective_scenarios(&self, plan: &TablePlan) -> Vec<Scenario> {
        if !plan.test_scenarios.is_empty() {
            return plan.test_scenarios.clone();
        }
        self.defaults
            .as_ref()
            .map(Defaults::scenarios)
            .unwrap_or_default()
    }

    /// The operations to probe for one table plan.
    pub fn effective_ops(plan: &TablePlan) -> Vec<Op> {
        plan.custom_operations
            .clone()
            .unwrap_or_else(|| Op::ALL.to_vec())
    }

    /// The scenarios to run against one bucket plan.
    pub fn effective_bucket_scenarios(&self, plan: &BucketPlan) -> Vec<Scenario> {
        if !plan.test_scenarios.is_empty() {
            return plan.test_scenarios.clone();
        }
        self.defaults
            .as_ref()
            .map(Defaults::scenarios)
            .unwrap_or_default()
    }

    /// The operations to probe for one bucket plan.
    pub fn effective_bucket_ops(plan: &BucketPlan) -> Vec<Op> {
        plan.custom_operations
            .clone()
            .unwrap_or_else(|| Op::ALL.to_vec())
    }

    /// Plan-level validation beyond what parsing enforces.
    fn validate(&self) -> ConfigResult<()> {
        for (key, plan) in &self.tables {
            let mut seen = std::collections::HashSet::new();
            for scenario in &plan.test_scenarios {
                if scenario.name.trim().is_empty() {
                    return Err(ConfigError::validation(format!(
                        "table '{}' has a scenario with an empty name",
                        key
                    )));
                }
                if !seen.insert(scenario.name.as_str()) {
                    return Err(ConfigError::validation(format!(
                        "table '{}' declares scenario '{}' more than once",
                        key, scenario.name
                    )));
                }
            }
        }
        Ok(())
    }
}

/// Map a serde parse failure back to the typed errors the loader promises.
fn classify_parse_error(message: String) -> ConfigError {
    if let Some(key) = quoted_after(&message, DUPLICATE_TABLE_PREFIX) {
        return ConfigError::DuplicateTable(key);
    }
    if let Some(key) = quoted_after(&message, DUPLICATE_BUCKET_PREFIX) {
        return ConfigError::DuplicateBucket(key);
    }
    if let Some(op) = quoted_after(&message, "unknown variant ") {
        return ConfigError::UnknownOperation(op);
    }
    ConfigError::Parse(message)
}

fn quoted_after(message: &str, prefix: &str) -> Option<String> {
    let rest = &message[message.find(prefix)? + prefix.len()..];
    let rest = rest.strip_prefix(['\'', '`', '"'])?;
    let end = rest.find(['\'', '`', '"'])?;
    Some(rest[..end].to_string())
}

const DUPLICATE_TABLE_PREFIX: &str = "duplicate table key ";
const DUPLICATE_BUCKET_PREFIX: &str = "duplicate storage bucket ";

fn unique_table_map<'de, D>(deserializer: D) -> Result<IndexMap<TableKey, TablePlan>, D::Error>
where
    D: Deserializer<'de>,
{
    unique_map(deserializer, DUPLICATE_TABLE_PREFIX)
}

fn unique_bucket_map<'de, D>(deserializer: D) -> Result<IndexMap<String, BucketPlan>, D::Error>
where
    D: Deserializer<'de>,
{
    unique_map(deserializer, DUPLICATE_BUCKET_PREFIX)
}

/// Deserialize a map while rejecting duplicate keys.
///
/// Plain serde map deserialization silently keeps the last entry; a plan
/// that names the same table twice is a mistake the author needs to hear
/// about, not a coin toss over which block wins.
fn unique_map<'de, D, K, V>(
    deserializer: D,
    duplicate_prefix: &'static str,
) -> Result<IndexMap<K, V>, D::Error>
where
    D: Deserializer<'de>,
    K: DeserializeOwned + std::hash::Hash + Eq + fmt::Display + Clone,
    V: DeserializeOwned,
{
    struct UniqueMapVisitor<K, V> {
        duplicate_prefix: &'static str,
        marker: std::marker::PhantomData<(K, V)>,
    }

    impl<'de, K, V> Visitor<'de> for UniqueMapVisitor<K, V>
    where
        K: DeserializeOwned + std::hash::Hash + Eq + fmt::Display + Clone,
        V: DeserializeOwned,
    {
        type Value = IndexMap<K, V>;

        fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
            formatter.write_str("a map with unique keys")
        }

        fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Self::Value, A::Error> {
            let mut map = IndexMap::with_capacity(access.size_hint().unwrap_or(0));
            while let Some((key, value)) = access.next_entry::<K, V>()? {
                if map.insert(key.clone(), value).is_some() {
                    return Err(de::Error::custom(format!(
                        "{}'{}'",
                        self.duplicate_prefix, key
                    )));
                }
            }
            Ok(map)
        }
    }

    deserializer.deserialize_map(UniqueMapVisitor {
        duplicate_prefix,
        marker: std::marker::PhantomData,
    })
}
