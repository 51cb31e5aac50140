//! Dynamic value type for component properties.
//!
//! Property slots are declared with a default [`Value`] whose [`ValueKind`]
//! becomes the slot's type. Every later set is checked against that kind.
//! Lists carry the kind of their elements, and a list must not mix kinds.

use crate::error::{Result, SluiceError};
use serde::{Deserialize, Serialize};
use std::fmt;

/// The type discriminant of a [`Value`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueKind {
    /// Boolean.
    Bool,
    /// 64-bit signed integer.
    Int,
    /// 64-bit float.
    Float,
    /// UTF-8 string.
    Str,
    /// Ordered list of values of one kind. `None` until an element is seen.
    List(Option<Box<ValueKind>>),
}

impl ValueKind {
    /// A list whose elements are of `element` kind.
    pub fn list_of(element: ValueKind) -> Self {
        Self::List(Some(Box::new(element)))
    }

    /// Combine two kinds that describe the same slot.
    ///
    /// An untyped list unifies with any list and takes the other side's
    /// element kind. Returns `None` when the kinds conflict.
    pub fn unify(&self, other: &ValueKind) -> Option<ValueKind> {
        match (self, other) {
            (Self::List(None), Self::List(elem)) | (Self::List(elem), Self::List(None)) => {
                Some(Self::List(elem.clone()))
            }
            (Self::List(Some(a)), Self::List(Some(b))) => a.unify(b).map(Self::list_of),
            (a, b) if a == b => Some(a.clone()),
            _ => None,
        }
    }
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool => f.write_str("bool"),
            Self::Int => f.write_str("int"),
            Self::Float => f.write_str("float"),
            Self::Str => f.write_str("str"),
            Self::List(None) => f.write_str("list"),
            Self::List(Some(elem)) => write!(f, "list<{elem}>"),
        }
    }
}

/// A property value.
///
/// Deserializes untagged, so job files can write `10`, `10.0`, `"t1-ints1"`,
/// `true` or `[1, 2]` directly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    /// Boolean.
    Bool(bool),
    /// 64-bit signed integer.
    Int(i64),
    /// 64-bit float.
    Float(f64),
    /// UTF-8 string.
    Str(String),
    /// Ordered list of values.
    List(Vec<Value>),
}

impl Value {
    /// Get the type discriminant.
    ///
    /// A list that mixes element kinds reports an untyped list; use
    /// [`Value::checked_kind`] to detect that case.
    #[must_use]
    pub fn kind(&self) -> ValueKind {
        self.checked_kind().unwrap_or(ValueKind::List(None))
    }

    /// Get the type discriminant, or `None` if a list mixes element kinds.
    pub fn checked_kind(&self) -> Option<ValueKind> {
        match self {
            Self::Bool(_) => Some(ValueKind::Bool),
            Self::Int(_) => Some(ValueKind::Int),
            Self::Float(_) => Some(ValueKind::Float),
            Self::Str(_) => Some(ValueKind::Str),
            Self::List(items) => {
                let mut kind = ValueKind::List(None);
                for item in items {
                    kind = kind.unify(&ValueKind::list_of(item.checked_kind()?))?;
                }
                Some(kind)
            }
        }
    }

    /// Convert to bool if this is a `Bool`.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Convert to i64 if this is an `Int`.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Int(v) => Some(*v),
            _ => None,
        }
    }

    /// Convert to f64 if this is a `Float`.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Float(v) => Some(*v),
            _ => None,
        }
    }

    /// Borrow as str if this is a `Str`.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Borrow as a slice if this is a `List`.
    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Self::List(v) => Some(v),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(b) => write!(f, "{b}"),
            Self::Int(v) => write!(f, "{v}"),
            Self::Float(v) => write!(f, "{v}"),
            Self::Str(s) => write!(f, "{s:?}"),
            Self::List(items) => {
                f.write_str("[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{item}")?;
                }
                f.write_str("]")
            }
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Self::Int(i64::from(v))
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Self::Str(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Self::Str(v)
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(v: Vec<T>) -> Self {
        Self::List(v.into_iter().map(Into::into).collect())
    }
}

/// Types that can be read back out of a property [`Value`].
pub trait FromValue: Sized {
    /// The kind this type is stored as.
    const KIND: ValueKind;

    /// Extract from a value of kind [`Self::KIND`].
    fn from_value(value: &Value) -> Option<Self>;
}

impl FromValue for bool {
    const KIND: ValueKind = ValueKind::Bool;

    fn from_value(value: &Value) -> Option<Self> {
        value.as_bool()
    }
}

impl FromValue for i64 {
    const KIND: ValueKind = ValueKind::Int;

    fn from_value(value: &Value) -> Option<Self> {
        value.as_i64()
    }
}

impl FromValue for f64 {
    const KIND: ValueKind = ValueKind::Float;

    fn from_value(value: &Value) -> Option<Self> {
        value.as_f64()
    }
}

impl FromValue for String {
    const KIND: ValueKind = ValueKind::Str;

    fn from_value(value: &Value) -> Option<Self> {
        value.as_str().map(str::to_string)
    }
}

impl FromValue for Vec<Value> {
    const KIND: ValueKind = ValueKind::List(None);

    fn from_value(value: &Value) -> Option<Self> {
        value.as_list().map(<[Value]>::to_vec)
    }
}

/// Extract a typed value, failing with `TypeMismatch` on the wrong kind.
pub(crate) fn extract<T: FromValue>(name: &str, value: &Value) -> Result<T> {
    T::from_value(value).ok_or_else(|| SluiceError::TypeMismatch {
        key: name.to_string(),
        expected: T::KIND.to_string(),
        found: value.kind().to_string(),
    })
}
