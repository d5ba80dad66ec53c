//! Logical key derivation
//!
//! A key is the context name, optionally followed by the canonical JSON form
//! of the call arguments. Object fields are emitted in sorted order, so two
//! argument values that are equal as data produce the same key regardless of
//! field order.

use std::borrow::Borrow;
use std::fmt;

use loadstate_common::{CommonError, CommonResult};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::constants::KEY_SEPARATOR;

/// Identifies one cacheable request: context plus serialized arguments
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LoadKey(String);

impl LoadKey {
    /// Derive a key from a context and call arguments
    ///
    /// Arguments that serialize to `null` or an empty array (unit, empty
    /// tuples, `None`) contribute nothing, so the key is the bare context.
    ///
    /// # Errors
    /// Returns `CommonError::Serialization` if the arguments cannot be
    /// represented as JSON (for example a map with non-string keys).
    pub fn build<A: Serialize + ?Sized>(context: &str, args: &A) -> CommonResult<Self> {
        let value = serde_json::to_value(args)?;
        if is_empty_args(&value) {
            return Ok(Self::from_context(context));
        }
        let encoded = serde_json::to_string(&value)?;
        Ok(Self(format!("{context}{KEY_SEPARATOR}{encoded}")))
    }

    /// Key for a context with no arguments
    pub fn from_context(context: &str) -> Self {
        Self(context.to_owned())
    }

    /// Parse an already-derived key string
    ///
    /// # Errors
    /// Returns `CommonError::Config` for an empty key.
    pub fn parse(raw: impl Into<String>) -> CommonResult<Self> {
        let raw = raw.into();
        if raw.is_empty() {
            return Err(CommonError::config_field("key", "must not be empty"));
        }
        Ok(Self(raw))
    }

    /// The key as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether this key was derived from `context`
    pub fn belongs_to(&self, context: &str) -> bool {
        self.0 == context
            || self
                .0
                .strip_prefix(context)
                .is_some_and(|rest| rest.starts_with(KEY_SEPARATOR))
    }
}

fn is_empty_args(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Array(items) => items.is_empty(),
        _ => false,
    }
}

impl fmt::Display for LoadKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for LoadKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Borrow<str> for LoadKey {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl From<LoadKey> for String {
    fn from(key: LoadKey) -> Self {
        key.0
    }
}
