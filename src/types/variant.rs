// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Attribute values.
//!
//! [`Variant`] is the dynamically typed value carried by reads, writes, method
//! arguments and notifications. [`DataValue`] adds the status code and the
//! timestamps a server attaches to a sampled value.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ValueError;

use super::{NodeRef, StatusCode};

/// A dynamically typed value.
///
/// # Examples
///
/// ```
/// use uasub_lib::types::Variant;
///
/// let v = Variant::from(42_i32);
/// assert_eq!(v.as_i64(), Some(42));
/// assert_eq!(v.type_name(), "Int32");
///
/// let s = Variant::from("klk");
/// assert_eq!(s.as_str(), Some("klk"));
/// ```
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "type", content = "value")]
pub enum Variant {
    /// No value.
    #[default]
    Empty,
    /// Boolean.
    Boolean(bool),
    /// Signed 8-bit integer.
    SByte(i8),
    /// Unsigned 8-bit integer.
    Byte(u8),
    /// Signed 16-bit integer.
    Int16(i16),
    /// Unsigned 16-bit integer.
    UInt16(u16),
    /// Signed 32-bit integer.
    Int32(i32),
    /// Unsigned 32-bit integer.
    UInt32(u32),
    /// Signed 64-bit integer.
    Int64(i64),
    /// Unsigned 64-bit integer.
    UInt64(u64),
    /// 32-bit float.
    Float(f32),
    /// 64-bit float.
    Double(f64),
    /// UTF-8 string.
    String(String),
    /// UTC timestamp.
    DateTime(DateTime<Utc>),
    /// Raw bytes.
    ByteString(Vec<u8>),
    /// A node reference.
    NodeId(NodeRef),
    /// A status code.
    StatusCode(StatusCode),
    /// One-dimensional array.
    Array(Vec<Variant>),
}

impl Variant {
    /// Returns the name of the variant type.
    #[must_use]
    pub const fn type_name(&self) -> &'static str {
        match self {
            Self::Empty => "Empty",
            Self::Boolean(_) => "Boolean",
            Self::SByte(_) => "SByte",
            Self::Byte(_) => "Byte",
            Self::Int16(_) => "Int16",
            Self::UInt16(_) => "UInt16",
            Self::Int32(_) => "Int32",
            Self::UInt32(_) => "UInt32",
            Self::Int64(_) => "Int64",
            Self::UInt64(_) => "UInt64",
            Self::Float(_) => "Float",
            Self::Double(_) => "Double",
            Self::String(_) => "String",
            Self::DateTime(_) => "DateTime",
            Self::ByteString(_) => "ByteString",
            Self::NodeId(_) => "NodeId",
            Self::StatusCode(_) => "StatusCode",
            Self::Array(_) => "Array",
        }
    }

    /// Returns `true` for [`Variant::Empty`].
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        matches!(self, Self::Empty)
    }

    /// Returns the value as a boolean, if it is one.
    #[must_use]
    pub const fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    /// Returns any integer variant widened to `i64`.
    #[must_use]
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::SByte(v) => Some(i64::from(*v)),
            Self::Byte(v) => Some(i64::from(*v)),
            Self::Int16(v) => Some(i64::from(*v)),
            Self::UInt16(v) => Some(i64::from(*v)),
            Self::Int32(v) => Some(i64::from(*v)),
            Self::UInt32(v) => Some(i64::from(*v)),
            Self::Int64(v) => Some(*v),
            Self::UInt64(v) => i64::try_from(*v).ok(),
            _ => None,
        }
    }

    /// Returns any numeric variant as `f64`.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Float(v) => Some(f64::from(*v)),
            Self::Double(v) => Some(*v),
            Self::UInt64(v) => Some(*v as f64),
            other => other.as_i64().map(|v| v as f64),
        }
    }

    /// Returns the string content, if this is a string.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    /// Returns the array elements, if this is an array.
    #[must_use]
    pub fn as_array(&self) -> Option<&[Variant]> {
        match self {
            Self::Array(items) => Some(items),
            _ => None,
        }
    }

    /// Returns the elements of a string array.
    ///
    /// # Errors
    ///
    /// Returns `ValueError::TypeMismatch` if this is not an array of strings.
    pub fn to_string_array(&self) -> Result<Vec<String>, ValueError> {
        let items = self.as_array().ok_or(ValueError::TypeMismatch {
            expected: "Array",
            actual: self.type_name(),
        })?;
        items
            .iter()
            .map(|item| {
                item.as_str()
                    .map(str::to_string)
                    .ok_or(ValueError::TypeMismatch {
                        expected: "String",
                        actual: item.type_name(),
                    })
            })
            .collect()
    }

    /// Converts the value to plain JSON, dropping the type tag.
    #[must_use]
    pub fn to_json(&self) -> Value {
        match self {
            Self::Empty => Value::Null,
            Self::Boolean(b) => Value::from(*b),
            Self::SByte(v) => Value::from(*v),
            Self::Byte(v) => Value::from(*v),
            Self::Int16(v) => Value::from(*v),
            Self::UInt16(v) => Value::from(*v),
            Self::Int32(v) => Value::from(*v),
            Self::UInt32(v) => Value::from(*v),
            Self::Int64(v) => Value::from(*v),
            Self::UInt64(v) => Value::from(*v),
            Self::Float(v) => Value::from(*v),
            Self::Double(v) => Value::from(*v),
            Self::String(s) => Value::from(s.as_str()),
            Self::DateTime(ts) => Value::from(ts.to_rfc3339()),
            Self::ByteString(bytes) => Value::from(bytes.clone()),
            Self::NodeId(node) => Value::from(node.to_string()),
            Self::StatusCode(status) => Value::from(status.bits()),
            Self::Array(items) => Value::Array(items.iter().map(Self::to_json).collect()),
        }
    }
}

macro_rules! impl_from_scalar {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<$ty> for Variant {
                fn from(value: $ty) -> Self {
                    Self::$variant(value)
                }
            }
        )*
    };
}

impl_from_scalar! {
    bool => Boolean,
    i8 => SByte,
    u8 => Byte,
    i16 => Int16,
    u16 => UInt16,
    i32 => Int32,
    u32 => UInt32,
    i64 => Int64,
    u64 => UInt64,
    f32 => Float,
    f64 => Double,
    String => String,
    DateTime<Utc> => DateTime,
    NodeRef => NodeId,
    StatusCode => StatusCode,
}

impl From<&str> for Variant {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl<T: Into<Variant>> From<Vec<T>> for Variant {
    fn from(items: Vec<T>) -> Self {
        Self::Array(items.into_iter().map(Into::into).collect())
    }
}

/// A value together with its quality and timestamps.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct DataValue {
    /// The value itself.
    pub value: Variant,
    /// Quality of the value.
    pub status: StatusCode,
    /// When the source produced the value.
    pub source_timestamp: Option<DateTime<Utc>>,
    /// When the server received or produced the value.
    pub server_timestamp: Option<DateTime<Utc>>,
}

impl DataValue {
    /// Creates a good-quality value with no timestamps.
    #[must_use]
    pub fn new(value: impl Into<Variant>) -> Self {
        Self {
            value: value.into(),
            ..Self::default()
        }
    }

    /// Sets the status code.
    #[must_use]
    pub fn with_status(mut self, status: StatusCode) -> Self {
        self.status = status;
        self
    }

    /// Sets the source timestamp.
    #[must_use]
    pub fn with_source_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.source_timestamp = Some(timestamp);
        self
    }

    /// Sets the server timestamp.
    #[must_use]
    pub fn with_server_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.server_timestamp = Some(timestamp);
        self
    }
}
