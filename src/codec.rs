use std::{fmt::Display, marker::PhantomData, str::FromStr};

use serde::{Serialize, de::DeserializeOwned};


/// Conversion between a typed value and the string form of one query parameter.
///
/// Both directions must be total. `decode` receives `None` when the
/// parameter is absent, and `encode` returns `None` to remove the parameter
/// from the URL.
pub trait Codec<T>: Send + Sync {
    fn decode(&self, value: Option<&str>) -> T;
    fn encode(&self, value: &T) -> Option<String>;
}

/// A codec built from a pair of functions.
pub struct FnCodec<D, E> {
    decode: D,
    encode: E,
}
impl<D, E> FnCodec<D, E> {
    pub fn new<T>(decode: D, encode: E) -> Self
    where
        D: Fn(Option<&str>) -> T,
        E: Fn(&T) -> Option<String>,
    {
        Self { decode, encode }
    }
}
impl<T, D, E> Codec<T> for FnCodec<D, E>
where
    D: Fn(Option<&str>) -> T + Send + Sync,
    E: Fn(&T) -> Option<String> + Send + Sync,
{
    fn decode(&self, value: Option<&str>) -> T {
        (self.decode)(value)
    }
    fn encode(&self, value: &T) -> Option<String> {
        (self.encode)(value)
    }
}

/// Codec for types with [`FromStr`] and [`Display`] implementations.
///
/// Absent or unparseable values decode to the default.
pub struct ParseCodec<T> {
    default: T,
    omit_default: bool,
}
impl<T: Default> Default for ParseCodec<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}
impl<T> ParseCodec<T> {
    pub fn new(default: T) -> Self {
        Self {
            default,
            omit_default: false,
        }
    }

    /// Removes the parameter from the URL while the value equals the default.
    pub fn omit_default(mut self) -> Self {
        self.omit_default = true;
        self
    }
}
impl<T> Codec<T> for ParseCodec<T>
where
    T: FromStr + Display + PartialEq + Clone + Send + Sync,
{
    fn decode(&self, value: Option<&str>) -> T {
        let Some(s) = value else {
            return self.default.clone();
        };
        match s.parse() {
            Ok(value) => value,
            Err(_) => {
                tracing::warn!(value = s, "unparseable query parameter, using default");
                self.default.clone()
            }
        }
    }
    fn encode(&self, value: &T) -> Option<String> {
        if self.omit_default && *value == self.default {
            None
        } else {
            Some(value.to_string())
        }
    }
}

/// Codec storing the value as JSON text.
///
/// Absent or malformed values decode to `T::default()`.
pub struct JsonCodec<T>(PhantomData<fn() -> T>);

impl<T> JsonCodec<T> {
    pub fn new() -> Self {
        Self(PhantomData)
    }
}
impl<T> Default for JsonCodec<T> {
    fn default() -> Self {
        Self::new()
    }
}
impl<T> Codec<T> for JsonCodec<T>
where
    T: Serialize + DeserializeOwned + Default,
{
    fn decode(&self, value: Option<&str>) -> T {
        let Some(s) = value else {
            return T::default();
        };
        serde_json::from_str(s).unwrap_or_else(|e| {
            tracing::warn!(value = s, error = %e, "malformed JSON query parameter, using default");
            T::default()
        })
    }
    fn encode(&self, value: &T) -> Option<String> {
        match serde_json::to_string(value) {
            Ok(s) => Some(s),
            Err(e) => {
                tracing::warn!(error = %e, "value could not be encoded as JSON, removing parameter");
                None
            }
        }
    }
}
