//! Conform pipeline: regex extraction, normalization and type conversion
//! applied to every harvested value.
//!
//! A [`Conformer`] compiles the per-field rules once (pattern, converter,
//! output key) and then maps harvested documents to [`Sanitized`] values.
//! It holds no mutable state, so one instance can be shared across threads
//! and fields can be processed in any order.

pub mod extract;
pub mod normalize;

use std::collections::HashMap;

use tracing::Span;

use crate::convert::{Converter, ValueKind};
use crate::harvest::{Harvested, RawValue};
use crate::plan::Field;
use crate::record::{FieldValue, Sanitized};

pub use extract::{Extraction, FieldExtractor};
pub use normalize::normalize;

/// Rules resolved for one plan field.
#[derive(Debug, Clone)]
pub struct FieldRule {
    name: String,
    key: String,
    kind: ValueKind,
    list: bool,
    extractor: Option<FieldExtractor>,
    converter: Converter,
    span: Span,
}

impl FieldRule {
    pub fn compile(field: &Field, parent: &Span) -> Self {
        let span = tracing::debug_span!(
            parent: parent,
            "field",
            name = %field.name,
            field_type = %field.field_type
        );

        let extractor = field
            .regex
            .as_deref()
            .filter(|pattern| !pattern.is_empty())
            .and_then(|pattern| FieldExtractor::compile(pattern, &span));

        Self {
            name: field.name.clone(),
            key: field.key(),
            kind: field.kind(),
            list: field.field_type.is_list(),
            extractor,
            converter: Converter::for_field(field, &span),
            span,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Output key (snake_case name).
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Regex -> normalize -> convert for a single raw string.
    pub fn sanitize(&self, raw: &str) -> FieldValue {
        let extracted = match &self.extractor {
            Some(extractor) => extractor.apply(raw, &self.span),
            None => raw,
        };

        if self.kind == ValueKind::Raw {
            return FieldValue::Text(extracted.to_string());
        }

        let normalized = normalize(extracted, self.kind);
        self.converter.convert(&normalized, &self.span)
    }

    /// Sanitize a harvested value, element-wise for sequences. Scalars
    /// harvested for a `_list` field become one-element sequences.
    pub fn sanitize_value(&self, raw: &RawValue) -> FieldValue {
        match raw {
            RawValue::Single(value) if self.list => FieldValue::List(vec![self.sanitize(value)]),
            RawValue::Single(value) => self.sanitize(value),
            RawValue::Many(values) => {
                FieldValue::List(values.iter().map(|value| self.sanitize(value)).collect())
            }
        }
    }
}

/// Compiled conform rules for a field list.
#[derive(Debug, Clone)]
pub struct Conformer {
    rules: Vec<FieldRule>,
    by_name: HashMap<String, usize>,
    span: Span,
}

impl Conformer {
    pub fn new(fields: &[Field]) -> Self {
        Self::with_span(fields, tracing::debug_span!("conform"))
    }

    /// Build a conformer whose diagnostics are emitted under `span`.
    pub fn with_span(fields: &[Field], span: Span) -> Self {
        let rules: Vec<FieldRule> = fields
            .iter()
            .map(|field| FieldRule::compile(field, &span))
            .collect();

        let by_name = rules
            .iter()
            .enumerate()
            .map(|(index, rule)| (rule.name.clone(), index))
            .collect();

        Self { rules, by_name, span }
    }

    pub fn rule(&self, name: &str) -> Option<&FieldRule> {
        self.by_name.get(name).map(|&index| &self.rules[index])
    }

    pub fn rules(&self) -> &[FieldRule] {
        &self.rules
    }

    /// Sanitize one raw string for the named field. `None` when the plan has
    /// no such field.
    pub fn sanitize(&self, name: &str, raw: &str) -> Option<FieldValue> {
        self.rule(name).map(|rule| rule.sanitize(raw))
    }

    /// Conform a harvested document.
    ///
    /// Entries without a matching field are dropped. Output keys are
    /// snake_case and follow the harvested order.
    pub fn conform(&self, harvested: &Harvested) -> Sanitized {
        let mut sanitized = Sanitized::with_capacity(harvested.len());

        for (name, raw) in harvested {
            let Some(rule) = self.rule(name) else {
                tracing::debug!(parent: &self.span, name = %name, "dropping undeclared harvested field");
                continue;
            };

            sanitized.insert(rule.key.clone(), rule.sanitize_value(raw));
        }

        tracing::debug!(parent: &self.span, fields = sanitized.len(), "conformed document");

        sanitized
    }
}

/// Conform a harvested document against a field list.
pub fn conform(fields: &[Field], harvested: &Harvested) -> Sanitized {
    Conformer::new(fields).conform(harvested)
}
