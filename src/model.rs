//! Core data types for pipelines, records, and runs.
//!
//! The data unit flowing through a pipeline is the [`Record`]: an open JSON
//! object with no fixed schema. Operators are free to reorder, multiply, or
//! collapse records; fields accumulate as operators add or merge keys.
//! Operator configurations are typed per operator kind so that missing
//! required fields are rejected when a pipeline is loaded, not discovered
//! mid-run.

use serde::de::Error as DeError;
use serde::ser::SerializeStruct;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};
use thiserror::Error;

/// One schemaless JSON object flowing through the pipeline.
///
/// Records have no identity beyond their position in the current sequence.
/// Accessors operate on top-level keys; nested values are plain
/// [`serde_json::Value`]s.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Record(Map<String, Value>);

impl Record {
    /// Create an empty record.
    pub fn new() -> Self {
        Self::default()
    }

    /// Wrap an arbitrary JSON value into a record.
    ///
    /// Objects become records as-is; any other value is carried under a
    /// `value` key so that every item in the sequence is an open object.
    pub fn from_value(value: Value) -> Self {
        match value {
            Value::Object(map) => Self(map),
            other => {
                let mut map = Map::new();
                map.insert("value".to_string(), other);
                Self(map)
            }
        }
    }

    /// Fetch a top-level field, `None` when absent.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// Fetch a top-level field, treating absence as JSON `null`.
    pub fn get_or_null(&self, key: &str) -> Value {
        self.0.get(key).cloned().unwrap_or(Value::Null)
    }

    /// Insert or replace a top-level field.
    pub fn insert(&mut self, key: impl Into<String>, value: Value) {
        self.0.insert(key.into(), value);
    }

    /// Shallow-merge another object into this record; incoming keys win.
    pub fn merge(&mut self, other: Map<String, Value>) {
        for (key, value) in other {
            self.0.insert(key, value);
        }
    }

    /// Number of top-level fields.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the record carries no fields.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Consume the record and return it as a JSON value.
    pub fn into_value(self) -> Value {
        Value::Object(self.0)
    }

    /// Borrow the underlying map.
    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }
}

impl From<Map<String, Value>> for Record {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

impl Serialize for Record {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.0.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Record {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Ok(Self(Map::deserialize(deserializer)?))
    }
}

/// Seed the record sequence from caller-provided input.
///
/// Arrays contribute one record per element; any other value becomes a
/// single-element sequence. An empty array yields an empty sequence, which
/// every operator accepts.
pub fn seed_records(input: Value) -> Vec<Record> {
    match input {
        Value::Array(items) => items.into_iter().map(Record::from_value).collect(),
        other => vec![Record::from_value(other)],
    }
}

/// Errors raised while loading or validating a pipeline definition.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// An operator's configuration is missing or malformed.
    #[error("operator '{operator}' rejected: {reason}")]
    InvalidOperator {
        /// Name of the offending operator.
        operator: String,
        /// Human-readable description of the defect.
        reason: String,
    },
}

/// Configuration for one pipeline stage.
///
/// Wire format: `{"id", "name", "type", "config"}` where `config` is the
/// type-specific parameter bag. Unknown `type` values decode into
/// [`OperatorKind::Unknown`] and fail when the engine reaches that stage;
/// missing required fields inside `config` fail decoding outright.
#[derive(Debug, Clone, PartialEq)]
pub struct OperatorConfig {
    /// Stable identifier of the operator within its pipeline.
    pub id: String,
    /// Display name; also the key under which metrics are reported.
    pub name: String,
    /// Typed operator parameters.
    pub kind: OperatorKind,
}

/// Typed parameter bag for each supported operator.
///
/// `join` is intentionally absent: the reference design declares it but
/// never gives it semantics, so a definition using it is treated like any
/// other unknown kind.
#[derive(Debug, Clone, PartialEq)]
pub enum OperatorKind {
    /// Per-item LLM transformation.
    Map(MapConfig),
    /// Predicate-based record exclusion.
    Filter(FilterConfig),
    /// Group-by with optional LLM fold.
    Reduce(ReduceConfig),
    /// Fuzzy duplicate resolution.
    Resolve(ResolveConfig),
    /// Group records under a key.
    Gather(GatherConfig),
    /// Expand an array field into one record per element.
    Unnest(UnnestConfig),
    /// Split string content on paragraph boundaries.
    Split(SplitConfig),
    /// Operator type this engine does not implement; fails at execution.
    Unknown(String),
}

impl OperatorKind {
    /// Decode the typed config for a `type` string and raw `config` object.
    fn from_parts(kind: &str, config: Value) -> Result<Self, String> {
        fn decode<T: serde::de::DeserializeOwned>(
            kind: &str,
            config: Value,
        ) -> Result<T, String> {
            serde_json::from_value(config).map_err(|error| format!("{kind} config: {error}"))
        }

        match kind {
            "map" => decode(kind, config).map(Self::Map),
            "filter" => decode(kind, config).map(Self::Filter),
            "reduce" => decode(kind, config).map(Self::Reduce),
            "resolve" => decode(kind, config).map(Self::Resolve),
            "gather" => decode(kind, config).map(Self::Gather),
            "unnest" => decode(kind, config).map(Self::Unnest),
            "split" => decode(kind, config).map(Self::Split),
            other => Ok(Self::Unknown(other.to_string())),
        }
    }

    /// Wire name of this operator kind.
    pub fn type_name(&self) -> &str {
        match self {
            Self::Map(_) => "map",
            Self::Filter(_) => "filter",
            Self::Reduce(_) => "reduce",
            Self::Resolve(_) => "resolve",
            Self::Gather(_) => "gather",
            Self::Unnest(_) => "unnest",
            Self::Split(_) => "split",
            Self::Unknown(name) => name,
        }
    }

    fn config_value(&self) -> Value {
        match self {
            Self::Map(config) => serde_json::to_value(config),
            Self::Filter(config) => serde_json::to_value(config),
            Self::Reduce(config) => serde_json::to_value(config),
            Self::Resolve(config) => serde_json::to_value(config),
            Self::Gather(config) => serde_json::to_value(config),
            Self::Unnest(config) => serde_json::to_value(config),
            Self::Split(config) => serde_json::to_value(config),
            Self::Unknown(_) => Ok(Value::Object(Map::new())),
        }
        .unwrap_or(Value::Null)
    }
}

impl Serialize for OperatorConfig {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("OperatorConfig", 4)?;
        state.serialize_field("id", &self.id)?;
        state.serialize_field("name", &self.name)?;
        state.serialize_field("type", self.kind.type_name())?;
        state.serialize_field("config", &self.kind.config_value())?;
        state.end()
    }
}

impl<'de> Deserialize<'de> for OperatorConfig {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        struct Raw {
            id: String,
            name: String,
            #[serde(rename = "type")]
            kind: String,
            #[serde(default)]
            config: Value,
        }

        let raw = Raw::deserialize(deserializer)?;
        let config = match raw.config {
            Value::Null => Value::Object(Map::new()),
            other => other,
        };
        let kind = OperatorKind::from_parts(&raw.kind, config)
            .map_err(|reason| D::Error::custom(format!("operator '{}': {reason}", raw.name)))?;
        Ok(Self {
            id: raw.id,
            name: raw.name,
            kind,
        })
    }
}

impl OperatorConfig {
    /// Reject configurations that decode but cannot execute.
    ///
    /// Called when a pipeline is registered so defective definitions never
    /// reach the engine; the engine re-checks unknown kinds at execution
    /// time for definitions sourced from external stores.
    pub fn validate(&self) -> Result<(), PipelineError> {
        let reject = |reason: String| PipelineError::InvalidOperator {
            operator: self.name.clone(),
            reason,
        };

        match &self.kind {
            OperatorKind::Map(config) => {
                if config.prompt.trim().is_empty() {
                    return Err(reject("map requires a non-empty prompt".into()));
                }
            }
            OperatorKind::Filter(config) => {
                crate::operators::predicate::parse(&config.filter_condition)
                    .map_err(|error| reject(error.to_string()))?;
            }
            OperatorKind::Reduce(config) => {
                if config.reduce_key.is_empty() {
                    return Err(reject("reduce requires reduce_key".into()));
                }
            }
            OperatorKind::Resolve(config) => {
                if config.resolution_keys.is_empty() {
                    return Err(reject("resolve requires at least one resolution key".into()));
                }
            }
            OperatorKind::Gather(config) => {
                if config.gather_key.is_empty() {
                    return Err(reject("gather requires gather_key".into()));
                }
            }
            OperatorKind::Unnest(config) => {
                if config.unnest_key.is_empty() {
                    return Err(reject("unnest requires unnest_key".into()));
                }
            }
            OperatorKind::Split(config) => {
                if config.content_key.is_empty() {
                    return Err(reject("split content_key must not be empty".into()));
                }
            }
            OperatorKind::Unknown(kind) => {
                return Err(reject(format!("unsupported operator type '{kind}'")));
            }
        }
        Ok(())
    }
}

/// Parameters for the `map` operator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MapConfig {
    /// Instruction sent to the LLM for every record.
    pub prompt: String,
    /// Model override; falls back to the pipeline default.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    /// JSON-Schema-like shape the invoker is asked to satisfy.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_schema: Option<Value>,
}

/// Parameters for the `filter` operator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterConfig {
    /// Boolean expression over the implicit variable `item`.
    pub filter_condition: String,
}

/// Parameters for the `reduce` operator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReduceConfig {
    /// Field whose value partitions the input into groups.
    pub reduce_key: String,
    /// Optional LLM fold applied once per group.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fold_prompt: Option<String>,
    /// Model override for the fold call.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
}

/// Parameters for the `resolve` operator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolveConfig {
    /// Fields that must match exactly for records to be duplicate candidates.
    pub resolution_keys: Vec<String>,
    /// Optional LLM prompt merging a candidate group into one record.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comparison_prompt: Option<String>,
    /// Model override for the comparison call.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
}

/// Parameters for the `gather` operator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GatherConfig {
    /// Field whose value partitions the input into groups.
    pub gather_key: String,
    /// When set, gather only this field of each record instead of the whole record.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_key: Option<String>,
}

/// Parameters for the `unnest` operator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnnestConfig {
    /// Field expected to hold an array.
    pub unnest_key: String,
}

/// Parameters for the `split` operator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SplitConfig {
    /// Field holding the string content to split.
    #[serde(default = "default_content_key")]
    pub content_key: String,
}

impl Default for SplitConfig {
    fn default() -> Self {
        Self {
            content_key: default_content_key(),
        }
    }
}

fn default_content_key() -> String {
    "content".to_string()
}

/// Ordered list of operators plus pipeline-level defaults.
///
/// Immutable for the duration of one run; the engine only reads it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineDefinition {
    /// Identifier used by callers to select this pipeline.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Stages executed strictly in list order.
    pub operators: Vec<OperatorConfig>,
    /// Default model for operators that do not override it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_model: Option<String>,
}

impl PipelineDefinition {
    /// Validate every operator's configuration.
    pub fn validate(&self) -> Result<(), PipelineError> {
        for operator in &self.operators {
            operator.validate()?;
        }
        Ok(())
    }
}

/// Lifecycle states of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    /// Operators are still executing.
    Running,
    /// Every operator completed and output was persisted.
    Completed,
    /// An operator failed or the run exceeded its deadline.
    Failed,
}

/// Durable record of one pipeline execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Run {
    /// Fresh identifier generated per run.
    pub id: String,
    /// Pipeline this run executed.
    pub pipeline_id: String,
    /// Current lifecycle state.
    pub status: RunStatus,
    /// Input exactly as submitted by the caller.
    pub input_data: Value,
    /// Final record sequence, present once the run completes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_data: Option<Value>,
    /// Per-operator and aggregate metrics, present at terminal state.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metrics: Option<RunMetrics>,
    /// RFC3339 timestamp recorded before the first operator.
    pub started_at: String,
    /// RFC3339 timestamp recorded at terminal state.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<String>,
    /// Failure description when the run did not complete.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Partial update applied to a run at terminal state.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunPatch {
    /// New lifecycle state, when it changes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<RunStatus>,
    /// Final output payload.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_data: Option<Value>,
    /// Metrics accumulated over the run.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metrics: Option<RunMetrics>,
    /// Completion timestamp.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<String>,
    /// Failure description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Outcome recorded for one executed operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperatorStatus {
    /// The operator produced an output sequence.
    Completed,
    /// The operator raised a pipeline-fatal error.
    Failed,
}

/// Timing and cardinality measurements for one operator execution.
///
/// Entries exist only for operators that actually started; operators after
/// a failing stage never appear.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperatorMetrics {
    /// Operator name as declared in the pipeline definition.
    pub operator: String,
    /// Wall-clock duration of the operator.
    pub duration_ms: u64,
    /// Sequence length fed into the operator.
    pub input_count: usize,
    /// Sequence length the operator produced (input length on failure).
    pub output_count: usize,
    /// Terminal status of this operator.
    pub status: OperatorStatus,
    /// Error description when the operator failed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Aggregate metrics for one run, in execution order.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunMetrics {
    /// Per-operator entries in the order operators executed.
    pub operators: Vec<OperatorMetrics>,
    /// Total wall-clock duration across all executed operators.
    pub total_duration_ms: u64,
    /// Number of operators that ran to completion.
    pub operators_executed: usize,
}
