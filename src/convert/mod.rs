//! Field type system: the enumerated field types and the converters that
//! turn a normalized string into a typed [`FieldValue`].
//!
//! Converters are resolved once per field when a plan is compiled
//! ([`Converter::for_field`]) and never re-dispatched on the type tag.
//! Conversion is total: a value that does not parse becomes the type's zero
//! value and a warning is logged.

pub mod datetime;
pub mod layout;

use std::fmt;
use std::str::FromStr;

use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use tracing::Span;

use crate::plan::Field;
use crate::record::FieldValue;

/// The scalar value kinds a field can hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueKind {
    /// Passthrough: markup captured verbatim, no normalization or conversion.
    Raw,
    Text,
    /// 64-bit signed integer.
    Number,
    /// 64-bit float.
    Decimal,
    /// ISO-8601 string.
    DateTime,
}

impl ValueKind {
    pub const ALL: [ValueKind; 5] = [
        ValueKind::Raw,
        ValueKind::Text,
        ValueKind::Number,
        ValueKind::Decimal,
        ValueKind::DateTime,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ValueKind::Raw => "raw",
            ValueKind::Text => "text",
            ValueKind::Number => "number",
            ValueKind::Decimal => "decimal",
            ValueKind::DateTime => "datetime",
        }
    }

    /// Zero value substituted for unparseable or missing values.
    pub fn zero(&self) -> FieldValue {
        match self {
            ValueKind::Raw | ValueKind::Text | ValueKind::DateTime => {
                FieldValue::Text(String::new())
            }
            ValueKind::Number => FieldValue::Integer(0),
            ValueKind::Decimal => FieldValue::Float(0.0),
        }
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, ValueKind::Number | ValueKind::Decimal)
    }
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Declared type of a plan field.
///
/// Plain tags (`text`, `number`, ...) leave cardinality to the harvester: a
/// single harvested string gives a scalar, a harvested sequence gives a
/// sequence. The `_list` tags (`text_list`, `number_list`, ...) always
/// project to a sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct FieldType {
    kind: ValueKind,
    list: bool,
}

impl FieldType {
    pub const fn new(kind: ValueKind) -> Self {
        Self { kind, list: false }
    }

    pub const fn list_of(kind: ValueKind) -> Self {
        Self { kind, list: true }
    }

    pub fn kind(&self) -> ValueKind {
        self.kind
    }

    pub fn is_list(&self) -> bool {
        self.list
    }
}

impl Default for FieldType {
    fn default() -> Self {
        Self::new(ValueKind::Text)
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.list {
            write!(f, "{}_list", self.kind)
        } else {
            write!(f, "{}", self.kind)
        }
    }
}

/// Error for a type tag outside the enumerated set.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown field type `{0}` (expected one of: raw, text, number, decimal, datetime, or a `_list` variant)")]
pub struct UnknownFieldType(pub String);

impl FromStr for FieldType {
    type Err = UnknownFieldType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let tag = s.trim().to_ascii_lowercase();
        let (base, list) = match tag.strip_suffix("_list") {
            Some(base) => (base, true),
            None => (tag.as_str(), false),
        };

        let kind = ValueKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == base)
            .ok_or_else(|| UnknownFieldType(s.to_string()))?;

        Ok(Self { kind, list })
    }
}

impl TryFrom<String> for FieldType {
    type Error = UnknownFieldType;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<FieldType> for String {
    fn from(value: FieldType) -> Self {
        value.to_string()
    }
}

/// Converter resolved for one field.
#[derive(Debug, Clone)]
pub enum Converter {
    /// `raw` and `text`: identity.
    Text,
    Number,
    Decimal,
    DateTime(DateTimeConverter),
}

/// `datetime` conversion settings, resolved from the field once.
#[derive(Debug, Clone, Default)]
pub struct DateTimeConverter {
    /// chrono format translated from the field's layout.
    format: Option<String>,
    timezone: Option<Tz>,
}

impl DateTimeConverter {
    pub fn new(layout: Option<&str>, timezone: Option<Tz>) -> Self {
        Self {
            format: layout
                .filter(|l| !l.trim().is_empty())
                .map(layout::to_strftime),
            timezone,
        }
    }

    fn convert(&self, value: &str, span: &Span) -> FieldValue {
        let parsed = match &self.format {
            Some(format) => datetime::parse_with_format(value, format),
            None => datetime::parse_auto(value),
        };

        match parsed {
            Some(instant) => {
                FieldValue::Text(datetime::to_iso8601(instant, self.timezone.as_ref()))
            }
            None => {
                tracing::warn!(
                    parent: span,
                    value,
                    format = self.format.as_deref().unwrap_or("auto"),
                    "failed to parse datetime"
                );
                ValueKind::DateTime.zero()
            }
        }
    }
}

impl Converter {
    /// Resolve the converter for a field's declared type.
    ///
    /// An unknown timezone name is logged and ignored; plans that went
    /// through [`crate::plan::Plan::validate`] never contain one.
    pub fn for_field(field: &Field, span: &Span) -> Self {
        match field.field_type.kind() {
            ValueKind::Raw | ValueKind::Text => Converter::Text,
            ValueKind::Number => Converter::Number,
            ValueKind::Decimal => Converter::Decimal,
            ValueKind::DateTime => {
                let timezone = field.timezone.as_deref().and_then(|name| {
                    match name.parse::<Tz>() {
                        Ok(tz) => Some(tz),
                        Err(e) => {
                            tracing::warn!(parent: span, timezone = name, error = %e, "ignoring unknown timezone");
                            None
                        }
                    }
                });
                Converter::DateTime(DateTimeConverter::new(field.format.as_deref(), timezone))
            }
        }
    }

    /// Convert a normalized string. Never fails.
    pub fn convert(&self, value: &str, span: &Span) -> FieldValue {
        match self {
            Converter::Text => FieldValue::Text(value.to_string()),
            Converter::Number => match value.parse::<i64>() {
                Ok(n) => FieldValue::Integer(n),
                Err(e) => {
                    tracing::warn!(parent: span, value, error = %e, "failed to parse number");
                    ValueKind::Number.zero()
                }
            },
            Converter::Decimal => match value.parse::<f64>() {
                Ok(f) if f.is_finite() => FieldValue::Float(f),
                Ok(f) => {
                    tracing::warn!(parent: span, value, parsed = f, "decimal is not finite");
                    ValueKind::Decimal.zero()
                }
                Err(e) => {
                    tracing::warn!(parent: span, value, error = %e, "failed to parse decimal");
                    ValueKind::Decimal.zero()
                }
            },
            Converter::DateTime(dt) => dt.convert(value, span),
        }
    }
}
