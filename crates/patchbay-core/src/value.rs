//! Dynamic value model for instruction payloads, node parameters, and events.
//!
//! [`Value`] is a closed, recursive sum type with nine variants. Type predicates
//! (`is_*`) never fail; typed accessors (`as_*`) return
//! [`ValueError::TypeMismatch`] when the held variant differs, so untrusted
//! instruction batches surface as recoverable errors instead of panics.
//!
//! # Render-path safety
//!
//! Only [`Value::Number`], [`Value::Boolean`], and pre-sized
//! [`Value::Float32Array`] are read on the audio thread, and only by reference
//! from an immutable graph snapshot. Object and Array values are never moved or
//! cloned while rendering.
//!
//! # String coercion
//!
//! The [`Display`](core::fmt::Display) rendering is diagnostic-only:
//!
//! ```rust
//! use patchbay_core::Value;
//!
//! let v = Value::from(vec![Value::from(1.0), Value::from(2.0)]);
//! assert_eq!(v.to_string(), "[1.000000, 2.000000]");
//!
//! let long = Value::from(vec![0.5_f32; 8]);
//! assert_eq!(long.to_string(), "[0.500000, 0.500000, 0.500000, ...]");
//! ```

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde::de::{Deserialize, Deserializer};
use serde::ser::{Serialize, SerializeMap, SerializeSeq, Serializer};
use thiserror::Error;

/// Mapping from string keys to values. Key order is not significant.
pub type Object = BTreeMap<String, Value>;

/// Ordered sequence of values.
pub type Array = Vec<Value>;

/// Dense audio-rate data.
pub type Float32Array = Vec<f32>;

/// Number of leading elements shown when an array is coerced to a string.
const DISPLAY_ELEMENTS: usize = 3;

/// Native callback carried by [`Value::Function`].
///
/// Cloning copies the handle, never the closure. Functions are control-side
/// only; the audio path never touches them.
#[derive(Clone)]
pub struct Function(Arc<dyn Fn(&[Value]) -> Value + Send + Sync>);

impl Function {
    /// Wraps a closure as a callable value.
    pub fn new(f: impl Fn(&[Value]) -> Value + Send + Sync + 'static) -> Self {
        Self(Arc::new(f))
    }

    /// Invokes the callback.
    pub fn call(&self, args: &[Value]) -> Value {
        (self.0)(args)
    }

    /// Returns true if both handles point at the same closure.
    pub fn ptr_eq(&self, other: &Function) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Function")
    }
}

/// Discriminant of a [`Value`], used in error reporting and parameter specs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueKind {
    /// `undefined`
    Undefined,
    /// `null`
    Null,
    /// `true` / `false`
    Boolean,
    /// Double-precision number.
    Number,
    /// UTF-8 string.
    String,
    /// String-keyed map.
    Object,
    /// Ordered sequence.
    Array,
    /// Dense `f32` sequence.
    Float32Array,
    /// Native callback.
    Function,
}

impl ValueKind {
    /// Lowercase name used in diagnostics.
    pub const fn name(self) -> &'static str {
        match self {
            ValueKind::Undefined => "undefined",
            ValueKind::Null => "null",
            ValueKind::Boolean => "boolean",
            ValueKind::Number => "number",
            ValueKind::String => "string",
            ValueKind::Object => "object",
            ValueKind::Array => "array",
            ValueKind::Float32Array => "Float32Array",
            ValueKind::Function => "function",
        }
    }
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Errors raised by typed access to a [`Value`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValueError {
    /// The value was accessed through an accessor for a different variant.
    #[error("type mismatch: expected {expected}, found {found}")]
    TypeMismatch {
        /// Variant the accessor requires.
        expected: ValueKind,
        /// Variant actually held.
        found: ValueKind,
    },
    /// A required key was absent from an Object.
    #[error("missing key `{0}`")]
    MissingKey(String),
}

/// A dynamically-typed value.
#[derive(Debug, Clone, Default)]
pub enum Value {
    /// Absent value. The default.
    #[default]
    Undefined,
    /// Explicit null.
    Null,
    /// Boolean.
    Boolean(bool),
    /// Double-precision number.
    Number(f64),
    /// String.
    String(String),
    /// String-keyed map.
    Object(Object),
    /// Ordered sequence.
    Array(Array),
    /// Dense `f32` sequence. Not further nestable.
    Float32Array(Float32Array),
    /// Native callback, control-side only.
    Function(Function),
}

macro_rules! accessor {
    ($(#[$doc:meta])* $name:ident, $mut_name:ident, $variant:ident, $ty:ty) => {
        $(#[$doc])*
        pub fn $name(&self) -> Result<&$ty, ValueError> {
            match self {
                Value::$variant(v) => Ok(v),
                other => Err(other.mismatch(ValueKind::$variant)),
            }
        }

        /// Mutable variant of the accessor above.
        pub fn $mut_name(&mut self) -> Result<&mut $ty, ValueError> {
            match self {
                Value::$variant(v) => Ok(v),
                other => Err(other.mismatch(ValueKind::$variant)),
            }
        }
    };
}

impl Value {
    /// Returns the variant tag.
    pub fn kind(&self) -> ValueKind {
        match self {
            Value::Undefined => ValueKind::Undefined,
            Value::Null => ValueKind::Null,
            Value::Boolean(_) => ValueKind::Boolean,
            Value::Number(_) => ValueKind::Number,
            Value::String(_) => ValueKind::String,
            Value::Object(_) => ValueKind::Object,
            Value::Array(_) => ValueKind::Array,
            Value::Float32Array(_) => ValueKind::Float32Array,
            Value::Function(_) => ValueKind::Function,
        }
    }

    fn mismatch(&self, expected: ValueKind) -> ValueError {
        ValueError::TypeMismatch {
            expected,
            found: self.kind(),
        }
    }

    // --- Predicates ---

    /// True for [`Value::Undefined`].
    pub fn is_undefined(&self) -> bool {
        matches!(self, Value::Undefined)
    }

    /// True for [`Value::Null`].
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// True for [`Value::Boolean`].
    pub fn is_bool(&self) -> bool {
        matches!(self, Value::Boolean(_))
    }

    /// True for [`Value::Number`].
    pub fn is_number(&self) -> bool {
        matches!(self, Value::Number(_))
    }

    /// True for [`Value::String`].
    pub fn is_string(&self) -> bool {
        matches!(self, Value::String(_))
    }

    /// True for [`Value::Object`].
    pub fn is_object(&self) -> bool {
        matches!(self, Value::Object(_))
    }

    /// True for [`Value::Array`].
    pub fn is_array(&self) -> bool {
        matches!(self, Value::Array(_))
    }

    /// True for [`Value::Float32Array`].
    pub fn is_float32_array(&self) -> bool {
        matches!(self, Value::Float32Array(_))
    }

    /// True for [`Value::Function`].
    pub fn is_function(&self) -> bool {
        matches!(self, Value::Function(_))
    }

    /// True for the variants that may be read while rendering.
    pub fn is_render_safe(&self) -> bool {
        matches!(
            self,
            Value::Number(_) | Value::Boolean(_) | Value::Float32Array(_)
        )
    }

    // --- Typed accessors ---

    /// Returns the boolean, or `TypeMismatch`.
    pub fn as_bool(&self) -> Result<bool, ValueError> {
        match self {
            Value::Boolean(b) => Ok(*b),
            other => Err(other.mismatch(ValueKind::Boolean)),
        }
    }

    /// Returns the number, or `TypeMismatch`.
    pub fn as_number(&self) -> Result<f64, ValueError> {
        match self {
            Value::Number(n) => Ok(*n),
            other => Err(other.mismatch(ValueKind::Number)),
        }
    }

    /// Returns the string slice, or `TypeMismatch`.
    pub fn as_str(&self) -> Result<&str, ValueError> {
        match self {
            Value::String(s) => Ok(s),
            other => Err(other.mismatch(ValueKind::String)),
        }
    }

    accessor!(
        /// Returns the array, or `TypeMismatch`.
        as_array, as_array_mut, Array, Array
    );
    accessor!(
        /// Returns the float array, or `TypeMismatch`.
        as_float32_array, as_float32_array_mut, Float32Array, Float32Array
    );
    accessor!(
        /// Returns the object, or `TypeMismatch`.
        as_object, as_object_mut, Object, Object
    );
    accessor!(
        /// Returns the function handle, or `TypeMismatch`.
        as_function, as_function_mut, Function, Function
    );

    /// Looks up `key` on an Object. Non-objects and missing keys yield `None`.
    pub fn get(&self, key: &str) -> Option<&Value> {
        match self {
            Value::Object(o) => o.get(key),
            _ => None,
        }
    }

    /// Reads `key` from an Object, returning `fallback` when the key is absent.
    ///
    /// Fails with `TypeMismatch` if `self` is not an Object, or if the key is
    /// present but holds a variant `T` cannot be read from.
    pub fn get_with_default<T: FromValue>(&self, key: &str, fallback: T) -> Result<T, ValueError> {
        match self.as_object()?.get(key) {
            Some(v) => T::from_value(v),
            None => Ok(fallback),
        }
    }

    /// Reads a required `key` from an Object.
    ///
    /// Fails with `MissingKey` when the key is absent and with `TypeMismatch`
    /// when `self` is not an Object or the entry has the wrong variant.
    pub fn require<T: FromValue>(&self, key: &str) -> Result<T, ValueError> {
        let entry = self
            .as_object()?
            .get(key)
            .ok_or_else(|| ValueError::MissingKey(key.to_owned()))?;
        T::from_value(entry)
    }

    /// Coerces every element of an Array to its display string.
    ///
    /// Returns an empty vector for non-arrays.
    pub fn to_string_vec(&self) -> Vec<String> {
        match self {
            Value::Array(a) => a.iter().map(ToString::to_string).collect(),
            _ => Vec::new(),
        }
    }

    /// Parses JSON text into a value.
    pub fn from_json_str(text: &str) -> Result<Value, serde_json::Error> {
        serde_json::from_str(text)
    }

    /// Converts to a `serde_json` tree.
    ///
    /// Undefined and Function become `null`; Float32Array becomes an array of
    /// numbers; non-finite numbers become `null`.
    pub fn to_json(&self) -> serde_json::Value {
        use serde_json::Value as J;
        match self {
            Value::Undefined | Value::Null | Value::Function(_) => J::Null,
            Value::Boolean(b) => J::Bool(*b),
            Value::Number(n) => serde_json::Number::from_f64(*n).map_or(J::Null, J::Number),
            Value::String(s) => J::String(s.clone()),
            Value::Object(o) => J::Object(o.iter().map(|(k, v)| (k.clone(), v.to_json())).collect()),
            Value::Array(a) => J::Array(a.iter().map(Value::to_json).collect()),
            Value::Float32Array(f) => J::Array(
                f.iter()
                    .map(|&x| {
                        serde_json::Number::from_f64(f64::from(x)).map_or(J::Null, J::Number)
                    })
                    .collect(),
            ),
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Undefined, Value::Undefined) | (Value::Null, Value::Null) => true,
            (Value::Boolean(a), Value::Boolean(b)) => a == b,
            (Value::Number(a), Value::Number(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Object(a), Value::Object(b)) => a == b,
            (Value::Array(a), Value::Array(b)) => a == b,
            (Value::Float32Array(a), Value::Float32Array(b)) => a == b,
            (Value::Function(a), Value::Function(b)) => a.ptr_eq(b),
            _ => false,
        }
    }
}

// --- String coercion ---

fn write_truncated<T>(
    f: &mut fmt::Formatter<'_>,
    items: &[T],
    mut each: impl FnMut(&mut fmt::Formatter<'_>, &T) -> fmt::Result,
) -> fmt::Result {
    f.write_str("[")?;
    for (i, item) in items.iter().take(DISPLAY_ELEMENTS).enumerate() {
        if i > 0 {
            f.write_str(", ")?;
        }
        each(f, item)?;
    }
    if items.len() > DISPLAY_ELEMENTS {
        f.write_str(", ...")?;
    }
    f.write_str("]")
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Undefined => f.write_str("undefined"),
            Value::Null => f.write_str("null"),
            Value::Boolean(b) => write!(f, "{}", u8::from(*b)),
            Value::Number(n) => write!(f, "{n:.6}"),
            Value::String(s) => f.write_str(s),
            Value::Array(a) => write_truncated(f, a, |f, v| write!(f, "{v}")),
            Value::Float32Array(a) => write_truncated(f, a, |f, v| write!(f, "{v:.6}")),
            Value::Object(o) => {
                f.write_str("{\n")?;
                for (k, v) in o {
                    writeln!(f, "    {k}: {v}")?;
                }
                f.write_str("}\n")
            }
            Value::Function(_) => f.write_str("[Object Function]"),
        }
    }
}

// --- Construction ---

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Boolean(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Number(v)
    }
}

impl From<f32> for Value {
    fn from(v: f32) -> Self {
        Value::Number(f64::from(v))
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Number(f64::from(v))
    }
}

impl From<u32> for Value {
    fn from(v: u32) -> Self {
        Value::Number(f64::from(v))
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Number(v as f64)
    }
}

impl From<usize> for Value {
    fn from(v: usize) -> Self {
        Value::Number(v as f64)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_owned())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(v)
    }
}

impl From<Array> for Value {
    fn from(v: Array) -> Self {
        Value::Array(v)
    }
}

impl From<Vec<String>> for Value {
    fn from(v: Vec<String>) -> Self {
        Value::Array(v.into_iter().map(Value::String).collect())
    }
}

impl From<Float32Array> for Value {
    fn from(v: Float32Array) -> Self {
        Value::Float32Array(v)
    }
}

impl From<Object> for Value {
    fn from(v: Object) -> Self {
        Value::Object(v)
    }
}

impl From<Function> for Value {
    fn from(v: Function) -> Self {
        Value::Function(v)
    }
}

impl From<()> for Value {
    fn from((): ()) -> Self {
        Value::Null
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Value {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Value::Object(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

impl From<serde_json::Value> for Value {
    fn from(v: serde_json::Value) -> Self {
        use serde_json::Value as J;
        match v {
            J::Null => Value::Null,
            J::Bool(b) => Value::Boolean(b),
            J::Number(n) => Value::Number(n.as_f64().unwrap_or(f64::NAN)),
            J::String(s) => Value::String(s),
            J::Array(a) => Value::Array(a.into_iter().map(Value::from).collect()),
            J::Object(o) => Value::Object(o.into_iter().map(|(k, v)| (k, Value::from(v))).collect()),
        }
    }
}

// --- Typed extraction ---

/// Types that can be read out of a [`Value`] by reference.
pub trait FromValue: Sized {
    /// Extracts `Self`, or reports the mismatch.
    fn from_value(value: &Value) -> Result<Self, ValueError>;
}

impl FromValue for Value {
    fn from_value(value: &Value) -> Result<Self, ValueError> {
        Ok(value.clone())
    }
}

impl FromValue for bool {
    fn from_value(value: &Value) -> Result<Self, ValueError> {
        value.as_bool()
    }
}

impl FromValue for f64 {
    fn from_value(value: &Value) -> Result<Self, ValueError> {
        value.as_number()
    }
}

impl FromValue for f32 {
    fn from_value(value: &Value) -> Result<Self, ValueError> {
        value.as_number().map(|n| n as f32)
    }
}

impl FromValue for String {
    fn from_value(value: &Value) -> Result<Self, ValueError> {
        value.as_str().map(str::to_owned)
    }
}

impl FromValue for Array {
    fn from_value(value: &Value) -> Result<Self, ValueError> {
        value.as_array().cloned()
    }
}

impl FromValue for Float32Array {
    fn from_value(value: &Value) -> Result<Self, ValueError> {
        value.as_float32_array().cloned()
    }
}

impl FromValue for Object {
    fn from_value(value: &Value) -> Result<Self, ValueError> {
        value.as_object().cloned()
    }
}

// --- serde ---

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Value::Undefined | Value::Null | Value::Function(_) => serializer.serialize_unit(),
            Value::Boolean(b) => serializer.serialize_bool(*b),
            Value::Number(n) if n.is_finite() => serializer.serialize_f64(*n),
            Value::Number(_) => serializer.serialize_unit(),
            Value::String(s) => serializer.serialize_str(s),
            Value::Array(a) => {
                let mut seq = serializer.serialize_seq(Some(a.len()))?;
                for v in a {
                    seq.serialize_element(v)?;
                }
                seq.end()
            }
            Value::Float32Array(a) => {
                let mut seq = serializer.serialize_seq(Some(a.len()))?;
                for v in a {
                    seq.serialize_element(v)?;
                }
                seq.end()
            }
            Value::Object(o) => {
                let mut map = serializer.serialize_map(Some(o.len()))?;
                for (k, v) in o {
                    map.serialize_entry(k, v)?;
                }
                map.end()
            }
        }
    }
}

impl<'de> Deserialize<'de> for Value {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        serde_json::Value::deserialize(deserializer).map(Value::from)
    }
}
