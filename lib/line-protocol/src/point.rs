use std::{collections::BTreeMap, fmt};

/// A field value.
///
/// Line protocol distinguishes between floats, signed and unsigned integers, strings, and booleans, each of which has
/// its own textual representation on the wire.
#[derive(Clone, Debug, PartialEq)]
pub enum FieldValue {
    /// A 64-bit floating-point value.
    Float(f64),

    /// A signed 64-bit integer.
    Integer(i64),

    /// An unsigned 64-bit integer.
    UnsignedInteger(u64),

    /// A string.
    String(String),

    /// A boolean.
    Boolean(bool),
}

impl FieldValue {
    /// Returns `true` if this value is "truthy".
    ///
    /// Zero-valued numbers, empty strings, and `false` are not truthy. Everything else, including `NaN`, is.
    pub fn is_truthy(&self) -> bool {
        match self {
            Self::Float(value) => *value != 0.0,
            Self::Integer(value) => *value != 0,
            Self::UnsignedInteger(value) => *value != 0,
            Self::String(value) => !value.is_empty(),
            Self::Boolean(value) => *value,
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Float(value) => write!(f, "{}", value),
            Self::Integer(value) => write!(f, "{}", value),
            Self::UnsignedInteger(value) => write!(f, "{}", value),
            Self::String(value) => write!(f, "{}", value),
            Self::Boolean(value) => write!(f, "{}", value),
        }
    }
}

macro_rules! impl_from_field_value {
    ($variant:ident, $target:ty, $($ty:ty),+) => {
        $(
            impl From<$ty> for FieldValue {
                fn from(value: $ty) -> Self {
                    Self::$variant(value as $target)
                }
            }
        )+
    };
}

impl_from_field_value!(Float, f64, f32, f64);
impl_from_field_value!(Integer, i64, i8, i16, i32, i64);
impl_from_field_value!(UnsignedInteger, u64, u8, u16, u32, u64, usize);

impl From<bool> for FieldValue {
    fn from(value: bool) -> Self {
        Self::Boolean(value)
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

/// A measurement point.
///
/// Tags and fields are held in ordered maps, so keys are unique and always encoded in sorted order, regardless of the
/// order they were added in.
#[derive(Clone, Debug, PartialEq)]
pub struct Point {
    measurement: String,
    tags: BTreeMap<String, String>,
    fields: BTreeMap<String, FieldValue>,
    timestamp: Option<i64>,
}

impl Point {
    /// Creates a new `Point` for the given measurement, with no tags, fields, or timestamp.
    pub fn new<M>(measurement: M) -> Self
    where
        M: Into<String>,
    {
        Self {
            measurement: measurement.into(),
            tags: BTreeMap::new(),
            fields: BTreeMap::new(),
            timestamp: None,
        }
    }

    /// Creates a new `Point` from its constituent parts.
    pub fn from_parts<M>(
        measurement: M, tags: BTreeMap<String, String>, fields: BTreeMap<String, FieldValue>, timestamp: Option<i64>,
    ) -> Self
    where
        M: Into<String>,
    {
        Self {
            measurement: measurement.into(),
            tags,
            fields,
            timestamp,
        }
    }

    /// Adds a tag, replacing any existing tag with the same key.
    pub fn with_tag<K, V>(mut self, key: K, value: V) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        self.tags.insert(key.into(), value.into());
        self
    }

    /// Adds a field, replacing any existing field with the same key.
    pub fn with_field<K, V>(mut self, key: K, value: V) -> Self
    where
        K: Into<String>,
        V: Into<FieldValue>,
    {
        self.fields.insert(key.into(), value.into());
        self
    }

    /// Sets the timestamp, in nanoseconds since the Unix epoch.
    pub fn with_timestamp(mut self, timestamp: i64) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    /// Returns the measurement name.
    pub fn measurement(&self) -> &str {
        &self.measurement
    }

    /// Returns the tags.
    pub fn tags(&self) -> &BTreeMap<String, String> {
        &self.tags
    }

    /// Returns the fields.
    pub fn fields(&self) -> &BTreeMap<String, FieldValue> {
        &self.fields
    }

    /// Returns the timestamp, in nanoseconds since the Unix epoch, if one is set.
    pub fn timestamp(&self) -> Option<i64> {
        self.timestamp
    }

    /// Returns `true` if at least one field value is truthy.
    ///
    /// See [`FieldValue::is_truthy`] for what is considered truthy. A point with no fields has no truthy field.
    pub fn has_truthy_field(&self) -> bool {
        self.fields.values().any(FieldValue::is_truthy)
    }
}

#[cfg(test)]
mod tests {
    use super::{FieldValue, Point};

    #[test]
    fn truthiness() {
        assert!(!FieldValue::from(0).is_truthy());
        assert!(!FieldValue::from(0.0).is_truthy());
        assert!(!FieldValue::from(-0.0).is_truthy());
        assert!(!FieldValue::from(0u64).is_truthy());
        assert!(!FieldValue::from("").is_truthy());
        assert!(!FieldValue::from(false).is_truthy());

        assert!(FieldValue::from(-1).is_truthy());
        assert!(FieldValue::from(f64::NAN).is_truthy());
        assert!(FieldValue::from(12.3).is_truthy());
        assert!(FieldValue::from("HTTP OK").is_truthy());
        assert!(FieldValue::from(true).is_truthy());
    }

    #[test]
    fn has_truthy_field() {
        assert!(!Point::new("empty").has_truthy_field());
        assert!(!Point::new("falsy").with_field("a", 0).with_field("b", "").has_truthy_field());
        assert!(Point::new("mixed")
            .with_field("a", 0)
            .with_field("b", "ok")
            .has_truthy_field());
    }

    #[test]
    fn duplicate_keys_replace() {
        let point = Point::new("m")
            .with_tag("host", "a")
            .with_tag("host", "b")
            .with_field("value", 1)
            .with_field("value", 2);

        assert_eq!(point.tags().len(), 1);
        assert_eq!(point.tags()["host"], "b");
        assert_eq!(point.fields()["value"], FieldValue::Integer(2));
    }
}
