use std::fmt::Write as _;

use bytes::{BufMut as _, Bytes, BytesMut};
use snafu::Snafu;

use crate::point::{FieldValue, Point};

/// An encoding error.
#[derive(Debug, Eq, PartialEq, Snafu)]
#[snafu(context(suffix(false)))]
pub enum EncodeError {
    /// The measurement name was empty.
    #[snafu(display("Measurement name must not be empty."))]
    EmptyMeasurement,

    /// The point had no fields.
    #[snafu(display("Point for measurement '{}' has no fields.", measurement))]
    NoFields {
        /// Name of the measurement.
        measurement: String,
    },

    /// A field had an empty key.
    #[snafu(display("Point for measurement '{}' has a field with an empty key.", measurement))]
    EmptyFieldKey {
        /// Name of the measurement.
        measurement: String,
    },

    /// A float field was `NaN` or infinite, which cannot be represented in line protocol.
    #[snafu(display("Field '{}' of measurement '{}' is not a finite number.", field, measurement))]
    NonFiniteField {
        /// Name of the measurement.
        measurement: String,

        /// Name of the offending field.
        field: String,
    },
}

/// Encodes a single point as a newline-terminated line.
///
/// # Errors
///
/// If the measurement name is empty, the point has no fields, a field key is empty, or a float field is not finite, an
/// error is returned.
pub fn encode_point(point: &Point) -> Result<Bytes, EncodeError> {
    encode_points(std::slice::from_ref(point))
}

/// Encodes a batch of points, one newline-terminated line per point.
///
/// Tags with an empty key or value are omitted, as line protocol cannot represent them.
///
/// # Errors
///
/// If any point cannot be encoded, an error is returned and nothing is produced for the batch.
pub fn encode_points<'a, I>(points: I) -> Result<Bytes, EncodeError>
where
    I: IntoIterator<Item = &'a Point>,
{
    let mut buf = BytesMut::new();
    for point in points {
        write_point(&mut buf, point)?;
    }

    Ok(buf.freeze())
}

fn write_point(buf: &mut BytesMut, point: &Point) -> Result<(), EncodeError> {
    if point.measurement().is_empty() {
        return Err(EncodeError::EmptyMeasurement);
    }

    if point.fields().is_empty() {
        return Err(EncodeError::NoFields {
            measurement: point.measurement().to_string(),
        });
    }

    if point.fields().contains_key("") {
        return Err(EncodeError::EmptyFieldKey {
            measurement: point.measurement().to_string(),
        });
    }

    if let Some((field, _)) = point
        .fields()
        .iter()
        .find(|(_, value)| matches!(value, FieldValue::Float(f) if !f.is_finite()))
    {
        return Err(EncodeError::NonFiniteField {
            measurement: point.measurement().to_string(),
            field: field.clone(),
        });
    }

    write_escaped(buf, point.measurement(), &[',', ' ']);

    for (key, value) in point.tags() {
        if key.is_empty() || value.is_empty() {
            continue;
        }

        buf.put_u8(b',');
        write_escaped(buf, key, &[',', '=', ' ']);
        buf.put_u8(b'=');
        write_escaped(buf, value, &[',', '=', ' ']);
    }

    buf.put_u8(b' ');

    for (i, (key, value)) in point.fields().iter().enumerate() {
        if i > 0 {
            buf.put_u8(b',');
        }

        write_escaped(buf, key, &[',', '=', ' ']);
        buf.put_u8(b'=');
        write_field_value(buf, value);
    }

    if let Some(timestamp) = point.timestamp() {
        // Writing into a `BytesMut` cannot fail.
        let _ = write!(buf, " {}", timestamp);
    }

    buf.put_u8(b'\n');
    Ok(())
}

fn write_escaped(buf: &mut BytesMut, raw: &str, special: &[char]) {
    for c in raw.chars() {
        match c {
            '\\' => buf.put_slice(b"\\\\"),
            '\n' => buf.put_slice(b"\\n"),
            c if special.contains(&c) => {
                buf.put_u8(b'\\');
                put_char(buf, c);
            }
            c => put_char(buf, c),
        }
    }
}

fn write_field_value(buf: &mut BytesMut, value: &FieldValue) {
    match value {
        FieldValue::Float(value) => {
            let _ = write!(buf, "{}", value);
        }
        FieldValue::Integer(value) => {
            let _ = write!(buf, "{}i", value);
        }
        FieldValue::UnsignedInteger(value) => {
            let _ = write!(buf, "{}u", value);
        }
        FieldValue::Boolean(value) => {
            let _ = write!(buf, "{}", value);
        }
        FieldValue::String(value) => {
            buf.put_u8(b'"');
            for c in value.chars() {
                match c {
                    '"' => buf.put_slice(b"\\\""),
                    '\\' => buf.put_slice(b"\\\\"),
                    '\n' => buf.put_slice(b"\\n"),
                    c => put_char(buf, c),
                }
            }
            buf.put_u8(b'"');
        }
    }
}

fn put_char(buf: &mut BytesMut, c: char) {
    let mut utf8 = [0; 4];
    buf.put_slice(c.encode_utf8(&mut utf8).as_bytes());
}
