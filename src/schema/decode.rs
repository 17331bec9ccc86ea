//! Schema-driven decoding.
//!
//! [`RecordSeed`] is a [`DeserializeSeed`] that reads any self-describing
//! encoding through a [`RecordSchema`]: unknown keys are skipped, missing
//! keys get the property's zero value and mismatched values are coerced to
//! the property's kind or zeroed.

use std::fmt;

use serde::de::{self, DeserializeSeed, Deserializer, IgnoredAny, MapAccess, SeqAccess, Visitor};

use super::{Cardinality, Property, RecordSchema};
use crate::convert::ValueKind;
use crate::record::{FieldValue, Record};

/// Decodes a whole record.
pub struct RecordSeed<'a>(pub &'a RecordSchema);

impl<'de, 'a> DeserializeSeed<'de> for RecordSeed<'a> {
    type Value = Record;

    fn deserialize<D>(self, deserializer: D) -> Result<Self::Value, D::Error>
    where
        D: Deserializer<'de>,
    {
        deserializer.deserialize_any(self)
    }
}

impl<'a> RecordSeed<'a> {
    fn zeroed(&self) -> Record {
        self.0.zero_record()
    }
}

impl<'de, 'a> Visitor<'de> for RecordSeed<'a> {
    type Value = Record;

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("a record object")
    }

    fn visit_map<A>(self, mut map: A) -> Result<Self::Value, A::Error>
    where
        A: MapAccess<'de>,
    {
        let properties = self.0.properties();
        let mut slots: Vec<Option<FieldValue>> = vec![None; properties.len()];

        while let Some(key) = map.next_key::<String>()? {
            match self.0.position(&key) {
                Some(index) => {
                    let seed = ValueSeed::property(&properties[index]);
                    slots[index] = Some(map.next_value_seed(seed)?);
                }
                None => {
                    map.next_value::<IgnoredAny>()?;
                }
            }
        }

        let mut record = Record::new();
        for (property, slot) in properties.iter().zip(slots) {
            record.insert(property.name.clone(), slot.unwrap_or_else(|| property.zero()));
        }
        Ok(record)
    }

    // Anything that is not an object projects to the all-zero record.

    fn visit_seq<A>(self, mut seq: A) -> Result<Self::Value, A::Error>
    where
        A: SeqAccess<'de>,
    {
        while seq.next_element::<IgnoredAny>()?.is_some() {}
        Ok(self.zeroed())
    }

    fn visit_unit<E: de::Error>(self) -> Result<Self::Value, E> {
        Ok(self.zeroed())
    }

    fn visit_none<E: de::Error>(self) -> Result<Self::Value, E> {
        Ok(self.zeroed())
    }

    fn visit_some<D>(self, deserializer: D) -> Result<Self::Value, D::Error>
    where
        D: Deserializer<'de>,
    {
        deserializer.deserialize_any(self)
    }

    fn visit_bool<E: de::Error>(self, _v: bool) -> Result<Self::Value, E> {
        Ok(self.zeroed())
    }

    fn visit_i64<E: de::Error>(self, _v: i64) -> Result<Self::Value, E> {
        Ok(self.zeroed())
    }

    fn visit_u64<E: de::Error>(self, _v: u64) -> Result<Self::Value, E> {
        Ok(self.zeroed())
    }

    fn visit_f64<E: de::Error>(self, _v: f64) -> Result<Self::Value, E> {
        Ok(self.zeroed())
    }

    fn visit_str<E: de::Error>(self, _v: &str) -> Result<Self::Value, E> {
        Ok(self.zeroed())
    }
}

/// Where a value sits: directly under a property, or inside a sequence.
#[derive(Clone, Copy)]
enum Position {
    Property(Cardinality),
    Element,
}

/// Decodes one property value (or one element of a sequence property).
#[derive(Clone, Copy)]
struct ValueSeed {
    kind: ValueKind,
    position: Position,
}

impl ValueSeed {
    fn property(property: &Property) -> Self {
        Self {
            kind: property.kind,
            position: Position::Property(property.cardinality),
        }
    }

    fn element(kind: ValueKind) -> Self {
        Self {
            kind,
            position: Position::Element,
        }
    }

    fn scalar(self, scalar: Scalar<'_>) -> FieldValue {
        let value = coerce(self.kind, scalar);
        match self.position {
            Position::Property(Cardinality::List) => FieldValue::List(vec![value]),
            _ => value,
        }
    }

    fn zero(self) -> FieldValue {
        match self.position {
            Position::Property(Cardinality::List) => FieldValue::List(Vec::new()),
            _ => self.kind.zero(),
        }
    }
}

impl<'de> DeserializeSeed<'de> for ValueSeed {
    type Value = FieldValue;

    fn deserialize<D>(self, deserializer: D) -> Result<Self::Value, D::Error>
    where
        D: Deserializer<'de>,
    {
        deserializer.deserialize_any(self)
    }
}

impl<'de> Visitor<'de> for ValueSeed {
    type Value = FieldValue;

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "a {} value", self.kind)
    }

    fn visit_bool<E: de::Error>(self, v: bool) -> Result<Self::Value, E> {
        Ok(self.scalar(Scalar::Bool(v)))
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<Self::Value, E> {
        Ok(self.scalar(Scalar::Int(v)))
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<Self::Value, E> {
        Ok(self.scalar(Scalar::UInt(v)))
    }

    fn visit_f64<E: de::Error>(self, v: f64) -> Result<Self::Value, E> {
        Ok(self.scalar(Scalar::Float(v)))
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<Self::Value, E> {
        Ok(self.scalar(Scalar::Str(v)))
    }

    fn visit_unit<E: de::Error>(self) -> Result<Self::Value, E> {
        Ok(self.zero())
    }

    fn visit_none<E: de::Error>(self) -> Result<Self::Value, E> {
        Ok(self.zero())
    }

    fn visit_some<D>(self, deserializer: D) -> Result<Self::Value, D::Error>
    where
        D: Deserializer<'de>,
    {
        deserializer.deserialize_any(self)
    }

    fn visit_seq<A>(self, mut seq: A) -> Result<Self::Value, A::Error>
    where
        A: SeqAccess<'de>,
    {
        if let Position::Element = self.position {
            // Nested sequences are not part of any field type.
            while seq.next_element::<IgnoredAny>()?.is_some() {}
            return Ok(self.kind.zero());
        }

        let mut items = Vec::with_capacity(seq.size_hint().unwrap_or(0));
        while let Some(item) = seq.next_element_seed(ValueSeed::element(self.kind))? {
            items.push(item);
        }
        Ok(FieldValue::List(items))
    }

    fn visit_map<A>(self, mut map: A) -> Result<Self::Value, A::Error>
    where
        A: MapAccess<'de>,
    {
        while map.next_entry::<IgnoredAny, IgnoredAny>()?.is_some() {}
        Ok(self.zero())
    }
}

/// A scalar as found in the encoding, before coercion.
#[derive(Debug, Clone, Copy)]
enum Scalar<'a> {
    Bool(bool),
    Int(i64),
    UInt(u64),
    Float(f64),
    Str(&'a str),
}

/// Coerce a scalar to `kind`, zeroing what cannot be represented.
fn coerce(kind: ValueKind, scalar: Scalar<'_>) -> FieldValue {
    match kind {
        ValueKind::Raw | ValueKind::Text | ValueKind::DateTime => FieldValue::Text(match scalar {
            Scalar::Bool(b) => b.to_string(),
            Scalar::Int(i) => i.to_string(),
            Scalar::UInt(u) => u.to_string(),
            Scalar::Float(f) => f.to_string(),
            Scalar::Str(s) => s.to_string(),
        }),
        ValueKind::Number => FieldValue::Integer(match scalar {
            Scalar::Bool(b) => i64::from(b),
            Scalar::Int(i) => i,
            Scalar::UInt(u) => i64::try_from(u).unwrap_or(0),
            Scalar::Float(f) => float_to_i64(f),
            Scalar::Str(s) => {
                let s = s.trim();
                s.parse::<i64>()
                    .ok()
                    .or_else(|| s.parse::<f64>().ok().map(float_to_i64))
                    .unwrap_or(0)
            }
        }),
        ValueKind::Decimal => FieldValue::Float(match scalar {
            Scalar::Bool(b) => f64::from(u8::from(b)),
            Scalar::Int(i) => i as f64,
            Scalar::UInt(u) => u as f64,
            Scalar::Float(f) if f.is_finite() => f,
            Scalar::Float(_) => 0.0,
            Scalar::Str(s) => s
                .trim()
                .parse::<f64>()
                .ok()
                .filter(|f| f.is_finite())
                .unwrap_or(0.0),
        }),
    }
}

fn float_to_i64(f: f64) -> i64 {
    if f.is_finite() && f >= i64::MIN as f64 && f < i64::MAX as f64 {
        f.trunc() as i64
    } else {
        0
    }
}
