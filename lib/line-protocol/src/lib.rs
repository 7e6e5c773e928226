//! InfluxDB line protocol.
//!
//! This crate provides the [`Point`] data model, a named and tagged set of field values with an optional timestamp,
//! and an encoder ([`encode_points`]) which serializes points into the line-oriented text format accepted by the
//! InfluxDB `/write` endpoint:
//!
//! ```text
//! measurement[,tag_key=tag_value...] field_key=field_value[,field_key=field_value...] [timestamp]
//! ```
#![deny(missing_docs)]

mod encoder;
pub use self::encoder::{encode_point, encode_points, EncodeError};

mod point;
pub use self::point::{FieldValue, Point};
