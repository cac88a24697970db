//! Store value model and its JSON wire form

use std::collections::BTreeMap;
use std::fmt;

use deepsize::DeepSizeOf;
use serde::{Deserialize, Serialize};

/// A value held in the shared store.
///
/// Scalars and small structures only. On the wire a `Data` is plain JSON, so
/// `Null` is `null`, `List` is an array and `Map` is an object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, DeepSizeOf)]
#[serde(untagged)]
pub enum Data {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    List(Vec<Data>),
    Map(BTreeMap<String, Data>),
}

impl Data {
    /// Approximate memory footprint in bytes: the value itself plus every
    /// nested allocation, walked recursively.
    ///
    /// Cost is proportional to the total nested size, so large compound
    /// values pay for the walk on every write.
    pub fn deep_size(&self) -> usize {
        self.deep_size_of()
    }

    /// Serialize to JSON bytes
    ///
    /// NaN and infinities are refused: JSON would carry them as `null`.
    pub fn encode(&self) -> Result<Vec<u8>, EncodingError> {
        if !self.is_finite() {
            return Err(EncodingError::NonFinite);
        }
        Ok(serde_json::to_vec(self)?)
    }

    fn is_finite(&self) -> bool {
        match self {
            Data::Float(f) => f.is_finite(),
            Data::List(items) => items.iter().all(Data::is_finite),
            Data::Map(map) => map.values().all(Data::is_finite),
            _ => true,
        }
    }

    /// Deserialize from JSON bytes
    pub fn decode(bytes: &[u8]) -> Result<Self, EncodingError> {
        if bytes.is_empty() {
            return Err(EncodingError::Empty);
        }
        Ok(serde_json::from_slice(bytes)?)
    }

    /// `Null` is the neutral value: "nothing pending"
    pub fn is_null(&self) -> bool {
        matches!(self, Data::Null)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Data::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Data::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Data::Str(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for Data {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match serde_json::to_string(self) {
            Ok(s) => f.write_str(&s),
            Err(_) => write!(f, "{:?}", self),
        }
    }
}

impl From<bool> for Data {
    fn from(v: bool) -> Self {
        Data::Bool(v)
    }
}

impl From<i64> for Data {
    fn from(v: i64) -> Self {
        Data::Int(v)
    }
}

impl From<i32> for Data {
    fn from(v: i32) -> Self {
        Data::Int(v as i64)
    }
}

impl From<f64> for Data {
    fn from(v: f64) -> Self {
        Data::Float(v)
    }
}

impl From<&str> for Data {
    fn from(v: &str) -> Self {
        Data::Str(v.to_string())
    }
}

impl From<String> for Data {
    fn from(v: String) -> Self {
        Data::Str(v)
    }
}

impl<T: Into<Data>> From<Option<T>> for Data {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Data::Null)
    }
}

impl<T: Into<Data>> From<Vec<T>> for Data {
    fn from(v: Vec<T>) -> Self {
        Data::List(v.into_iter().map(Into::into).collect())
    }
}

/// Errors that can occur while encoding or decoding a value
#[derive(Debug, thiserror::Error)]
pub enum EncodingError {
    #[error("empty value payload")]
    Empty,

    #[error("non-finite float has no JSON form")]
    NonFinite,

    #[error("invalid value encoding: {0}")]
    Json(#[from] serde_json::Error),
}
