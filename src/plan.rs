//! Plan definition, loading and validation.
//!
//! A plan names the source to harvest and the ordered list of fields to
//! extract from it. Plans are written in YAML:
//!
//! ```yaml
//! source: https://example.com/products/42
//! transformer: transformers/product.rhai
//! fields:
//!   - name: title
//!     type: text
//!     selector: "#app > h1"
//!   - name: priceWithCurrency
//!     type: decimal
//!     selector: "#app > .price"
//!   - name: publishedAt
//!     type: datetime
//!     selector: "#app > time"
//!     format: d/m/Y H:i:s
//!     timezone: Europe/Paris
//! ```
//!
//! Plans are loaded once per run and are immutable afterwards.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use chrono_tz::Tz;
use convert_case::{Case, Casing};
use serde::{Deserialize, Serialize};

use crate::convert::{FieldType, ValueKind};

/// Error raised while loading or validating a plan. Always fatal to a run.
#[derive(Debug, thiserror::Error)]
pub enum PlanError {
    #[error("failed to read plan file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse plan: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("invalid plan: {}", .0.join("; "))]
    Validation(Vec<String>),
}

/// Harvester kind used when a plan does not name one.
pub const DEFAULT_HARVESTER: &str = "website";

/// Parameters for one harvest run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Plan {
    /// Location of the document to harvest: a URL with a host, or a bare
    /// domain read as `https://`.
    pub source: String,

    /// Harvester kind; only meaningful to the external harvester.
    #[serde(rename = "type", default = "default_harvester")]
    pub harvester: String,

    /// User agents the harvester may rotate through.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub user_agents: Vec<String>,

    /// Path of an optional transform script.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transformer: Option<PathBuf>,

    /// Ordered field definitions.
    pub fields: Vec<Field>,
}

fn default_harvester() -> String {
    DEFAULT_HARVESTER.to_string()
}

/// A single datum definition within a plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Field {
    pub name: String,

    #[serde(rename = "type", default)]
    pub field_type: FieldType,

    /// Opaque locator handed to the harvester. Never interpreted here.
    pub selector: String,

    /// Pattern whose first capturing group narrows the raw value.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub regex: Option<String>,

    /// Date layout (`d/m/Y H:i:s`) for `datetime` fields.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,

    /// IANA timezone the parsed instant is expressed in.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timezone: Option<String>,
}

impl Field {
    pub fn new(name: impl Into<String>, field_type: FieldType, selector: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            field_type,
            selector: selector.into(),
            regex: None,
            format: None,
            timezone: None,
        }
    }

    pub fn with_regex(mut self, regex: impl Into<String>) -> Self {
        self.regex = Some(regex.into());
        self
    }

    pub fn with_format(mut self, format: impl Into<String>) -> Self {
        self.format = Some(format.into());
        self
    }

    pub fn with_timezone(mut self, timezone: impl Into<String>) -> Self {
        self.timezone = Some(timezone.into());
        self
    }

    pub fn kind(&self) -> ValueKind {
        self.field_type.kind()
    }

    /// Output key of this field: the name in snake_case.
    pub fn key(&self) -> String {
        canonical_name(&self.name)
    }
}

/// Rewrite a plan field name into the wire-format key.
pub fn canonical_name(name: &str) -> String {
    name.to_case(Case::Snake)
}

impl Plan {
    pub fn new(source: impl Into<String>, fields: Vec<Field>) -> Self {
        Self {
            source: source.into(),
            harvester: default_harvester(),
            user_agents: Vec::new(),
            transformer: None,
            fields,
        }
    }

    /// Load and validate a plan from a YAML (or JSON) file.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, PlanError> {
        let path = path.as_ref();

        let contents = fs::read_to_string(path).map_err(|source| PlanError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        let mut plan = Self::from_yaml_str(&contents)?;

        // Relative script paths are resolved against the plan's directory.
        if let (Some(script), Some(dir)) = (plan.transformer.as_ref(), path.parent()) {
            if script.is_relative() {
                plan.transformer = Some(dir.join(script));
            }
        }

        tracing::debug!(path = %path.display(), fields = plan.fields.len(), "loaded plan");

        Ok(plan)
    }

    /// Parse and validate a plan from YAML text.
    pub fn from_yaml_str(contents: &str) -> Result<Self, PlanError> {
        let plan: Plan = serde_yaml::from_str(contents)?;
        plan.validate()?;
        Ok(plan)
    }

    /// Check structural invariants, reporting every violation at once.
    pub fn validate(&self) -> Result<(), PlanError> {
        let mut problems = Vec::new();

        if self.source.trim().is_empty() {
            problems.push("source is required".to_string());
        } else if let Err(e) = parse_source(&self.source) {
            problems.push(format!("source `{}` is not a valid URL: {}", self.source, e));
        }

        if self.fields.is_empty() {
            problems.push("at least one field is required".to_string());
        }

        let mut seen_keys = HashSet::new();
        for (index, field) in self.fields.iter().enumerate() {
            let label = if field.name.is_empty() {
                format!("fields[{}]", index)
            } else {
                format!("field `{}`", field.name)
            };

            if field.name.is_empty() {
                problems.push(format!("{}: name is required", label));
            } else if !is_identifier(&field.name) {
                problems.push(format!(
                    "{}: name must start with a letter and contain only letters, digits or `_`",
                    label
                ));
            } else if !seen_keys.insert(field.key()) {
                problems.push(format!("{}: duplicate field name (key `{}`)", label, field.key()));
            }

            if field.selector.trim().is_empty() {
                problems.push(format!("{}: selector is required", label));
            }

            if let Some(tz) = &field.timezone {
                if tz.parse::<Tz>().is_err() {
                    problems.push(format!("{}: unknown timezone `{}`", label, tz));
                }
            }
        }

        if problems.is_empty() {
            Ok(())
        } else {
            Err(PlanError::Validation(problems))
        }
    }

    pub fn field(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.name == name)
    }
}

/// Parse a plan source. A bare domain (`example.com/page`) is read as
/// `https://`; anything that does not end up with a host is rejected.
pub fn parse_source(source: &str) -> Result<url::Url, String> {
    let url = match url::Url::parse(source.trim()) {
        Ok(url) => url,
        Err(url::ParseError::RelativeUrlWithoutBase) => {
            url::Url::parse(&format!("https://{}", source.trim())).map_err(|e| e.to_string())?
        }
        Err(e) => return Err(e.to_string()),
    };

    match url.host_str() {
        Some(host) if !host.is_empty() => Ok(url),
        _ => Err("no host".to_string()),
    }
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic())
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}
