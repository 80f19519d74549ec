//! Compiler options
//!
//! [`Options`] is the single configuration surface named in §6: intern-table
//! retention, field ordering, flow-table post-processing toggles, and wire
//! adherence. It round-trips through JSON the way the prior incarnation of
//! this crate round-tripped its proof parameters, except via plain
//! `serde`/`serde_json` rather than `ark-serialize` (§1.1) — there is no
//! finite-field encoding left to justify that family here.

use std::io::Read;

use serde::{Deserialize, Serialize};

use crate::cache::Cache;
use crate::field::{Field, FieldOrder};
use crate::policy::SwitchId;

/// Intern-table retention policy applied before a compile (§6).
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", content = "at")]
pub enum CachePrepare {
    /// Retain every entry (the default: share across compiles).
    #[default]
    Keep,
    /// Clear the node and memo tables before compiling.
    Empty,
    /// Retain only entries reachable from the given root. Not yet
    /// implemented as a precise mark-and-sweep; currently behaves like
    /// `Keep` (see [`Cache::reset`]).
    Preserve(u32),
}

impl CachePrepare {
    pub(crate) fn apply(&self, cache: &Cache) {
        match self {
            CachePrepare::Keep => {}
            CachePrepare::Empty => cache.reset(),
            CachePrepare::Preserve(_root) => {
                tracing::warn!("cache_prepare=Preserve is not yet a precise mark-and-sweep; keeping the cache as-is");
            }
        }
    }
}

/// How the total field order is fixed for a compile (§6).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", content = "fields")]
pub enum FieldOrderOption {
    /// Declaration order (see [`crate::field::ALL_FIELDS`]).
    Default,
    /// A caller-supplied permutation of all fields.
    Static(Vec<Field>),
    /// Order by estimated branching factor: fields that occur more often as
    /// a test/modification target in the policy being compiled are ranked
    /// earlier (see [`crate::field::FieldOrder::from_weights`]).
    Heuristic,
}

impl Default for FieldOrderOption {
    fn default() -> Self {
        FieldOrderOption::Default
    }
}

impl FieldOrderOption {
    /// Resolve this option into a concrete [`FieldOrder`]. `Heuristic`
    /// requires the policy being compiled to compute occurrence weights.
    pub fn resolve(&self, policy: Option<&crate::policy::Policy>) -> Result<FieldOrder, OptionsError> {
        match self {
            FieldOrderOption::Default => Ok(FieldOrder::default_order()),
            FieldOrderOption::Static(fields) => {
                FieldOrder::from_static(fields).map_err(OptionsError::Field)
            }
            FieldOrderOption::Heuristic => {
                let policy = policy.ok_or(OptionsError::HeuristicNeedsPolicy)?;
                Ok(FieldOrder::from_weights(&policy.field_occurrences()))
            }
        }
    }
}

/// How strictly the emitter adheres to the target wire protocol (§6, §7).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum OpenflowAdherence {
    /// Reject features the wire protocol cannot express.
    #[default]
    Strict,
    /// Lower unsupported features best-effort, logging a warning.
    Sloppy,
}

/// The full set of recognized compiler options (§6).
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct Options {
    pub cache_prepare: CachePrepare,
    pub field_order: FieldOrderOption,
    pub remove_tail_drops: bool,
    pub dedup_flows: bool,
    pub optimize: bool,
    pub openflow_adherence: OpenflowAdherence,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            cache_prepare: CachePrepare::default(),
            field_order: FieldOrderOption::default(),
            remove_tail_drops: true,
            dedup_flows: false,
            optimize: false,
            openflow_adherence: OpenflowAdherence::default(),
        }
    }
}

impl Options {
    /// Parse options from a JSON string. `Strict` adherence (the field read
    /// from the JSON itself) rejects unknown object keys; `Sloppy` ignores
    /// them.
    pub fn from_json_str(s: &str) -> Result<Self, OptionsError> {
        let parsed: Options = serde_json::from_str(s).map_err(OptionsError::Json)?;
        if matches!(parsed.openflow_adherence, OpenflowAdherence::Strict) {
            let value: serde_json::Value = serde_json::from_str(s).map_err(OptionsError::Json)?;
            if let serde_json::Value::Object(map) = &value {
                for key in map.keys() {
                    if !KNOWN_KEYS.contains(&key.as_str()) {
                        return Err(OptionsError::UnknownKey(key.clone()));
                    }
                }
            }
        }
        Ok(parsed)
    }

    /// Read options from a file path, or from stdin when `path` is `"-"`.
    pub fn from_path_or_stdin(path: &str) -> Result<Self, OptionsError> {
        let contents = if path == "-" {
            let mut buf = String::new();
            std::io::stdin().read_to_string(&mut buf).map_err(OptionsError::Io)?;
            buf
        } else {
            std::fs::read_to_string(path).map_err(OptionsError::Io)?
        };
        Self::from_json_str(&contents)
    }

    /// Serialize options to a JSON string.
    pub fn to_json_string(&self) -> Result<String, OptionsError> {
        serde_json::to_string_pretty(self).map_err(OptionsError::Json)
    }
}

const KNOWN_KEYS: &[&str] = &[
    "cache_prepare",
    "field_order",
    "remove_tail_drops",
    "dedup_flows",
    "optimize",
    "openflow_adherence",
];

/// Errors parsing or validating [`Options`].
#[derive(Debug, thiserror::Error)]
pub enum OptionsError {
    #[error("invalid options JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("failed to read options: {0}")]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Field(#[from] crate::field::FieldError),
    #[error("field_order=Heuristic requires the policy being compiled to compute weights")]
    HeuristicNeedsPolicy,
    #[error("unknown option key {0:?} rejected under Strict openflow_adherence")]
    UnknownKey(String),
}

/// A switch selector and optional options bundle, the JSON shape the CLI
/// reads for `netkatc compile` (policy is carried alongside, not here).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CompileRequest {
    pub policy: crate::policy::Policy,
    pub switch: Option<SwitchId>,
    #[serde(default)]
    pub options: Options,
}
