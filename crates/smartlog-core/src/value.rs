//! Dynamic argument values accepted by the logger.
//!
//! Log calls take heterogeneous argument lists, so every argument is lifted
//! into a [`Value`]. Objects and arrays are reference types: cloning a
//! `Value::Object` clones the handle, not the contents, which is what makes
//! shared references and cycles representable (and detectable by the
//! formatter through pointer identity).
//!
//! ```ignore
//! use smartlog_core::{args, Value};
//!
//! let user = Value::object([("name", Value::from("Alice")), ("age", Value::from(30))]);
//! user.as_object().unwrap().insert("self", user.clone()); // cycle
//! log.info(args!["loaded", user]);
//! ```

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;
use thiserror::Error;

/// Failure reported by an [`Inspect`] implementation while being rendered.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{0}")]
pub struct InspectError(pub String);

impl InspectError {
    pub fn new(msg: impl Into<String>) -> Self {
        Self(msg.into())
    }
}

/// Hook for user types that want custom rendering.
///
/// Both methods may fail; the formatter catches the failure and falls back
/// to a best-effort string, so a misbehaving implementation can never drop
/// an entry or abort a flush.
pub trait Inspect: Send + Sync {
    /// Default string form (what `String(value)` would print).
    fn to_display(&self) -> Result<String, InspectError>;

    /// Structured view used for serialization and table rendering.
    fn inspect(&self) -> Result<Value, InspectError>;
}

/// A dynamically typed log argument.
#[derive(Clone)]
pub enum Value {
    Undefined,
    Null,
    Bool(bool),
    Number(f64),
    /// Arbitrary-precision integer; rendered as its decimal string
    BigInt(i128),
    String(String),
    /// Symbol with an optional description
    Symbol(Option<String>),
    /// Error-like value
    Error { name: String, message: String },
    Array(ArrayRef),
    Object(ObjectRef),
    Opaque(Arc<dyn Inspect>),
}

/// Shared, mutable, ordered property list with reference identity.
#[derive(Clone, Default)]
pub struct ObjectRef(Arc<RwLock<Vec<(String, Value)>>>);

impl ObjectRef {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a property. Replacing keeps the original position.
    pub fn insert(&self, key: impl Into<String>, value: impl Into<Value>) {
        let key = key.into();
        let value = value.into();
        let mut props = self.0.write();
        match props.iter_mut().find(|(k, _)| *k == key) {
            Some(slot) => slot.1 = value,
            None => props.push((key, value)),
        }
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        self.0
            .read()
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.clone())
    }

    pub fn remove(&self, key: &str) -> Option<Value> {
        let mut props = self.0.write();
        let idx = props.iter().position(|(k, _)| k == key)?;
        Some(props.remove(idx).1)
    }

    /// Own property names in insertion order.
    pub fn keys(&self) -> Vec<String> {
        self.0.read().iter().map(|(k, _)| k.clone()).collect()
    }

    /// Snapshot of the properties. The lock is released before returning,
    /// so callers can recurse into children that point back at `self`.
    pub fn entries(&self) -> Vec<(String, Value)> {
        self.0.read().clone()
    }

    pub fn len(&self) -> usize {
        self.0.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.read().is_empty()
    }

    /// Identity of the underlying allocation.
    pub fn id(&self) -> usize {
        Arc::as_ptr(&self.0) as *const () as usize
    }

    pub fn ptr_eq(&self, other: &ObjectRef) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

/// Shared, mutable list with reference identity.
#[derive(Clone, Default)]
pub struct ArrayRef(Arc<RwLock<Vec<Value>>>);

impl ArrayRef {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, value: impl Into<Value>) {
        self.0.write().push(value.into());
    }

    pub fn get(&self, index: usize) -> Option<Value> {
        self.0.read().get(index).cloned()
    }

    /// Snapshot of the items (lock released before returning).
    pub fn items(&self) -> Vec<Value> {
        self.0.read().clone()
    }

    pub fn len(&self) -> usize {
        self.0.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.read().is_empty()
    }

    pub fn id(&self) -> usize {
        Arc::as_ptr(&self.0) as *const () as usize
    }

    pub fn ptr_eq(&self, other: &ArrayRef) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl Value {
    /// Build an object from key/value pairs, preserving order.
    pub fn object<K, V, I>(props: I) -> Self
    where
        K: Into<String>,
        V: Into<Value>,
        I: IntoIterator<Item = (K, V)>,
    {
        let obj = ObjectRef::new();
        for (k, v) in props {
            obj.insert(k, v);
        }
        Value::Object(obj)
    }

    /// Build an array from items.
    pub fn array<V, I>(items: I) -> Self
    where
        V: Into<Value>,
        I: IntoIterator<Item = V>,
    {
        let arr = ArrayRef::new();
        for item in items {
            arr.push(item);
        }
        Value::Array(arr)
    }

    pub fn error(name: impl Into<String>, message: impl Into<String>) -> Self {
        Value::Error {
            name: name.into(),
            message: message.into(),
        }
    }

    /// Lift any Rust error into an error-like value named `Error`.
    pub fn from_std_error(err: &(dyn std::error::Error + 'static)) -> Self {
        Value::error("Error", err.to_string())
    }

    pub fn symbol(description: impl Into<String>) -> Self {
        Value::Symbol(Some(description.into()))
    }

    pub fn bigint(n: i128) -> Self {
        Value::BigInt(n)
    }

    pub fn opaque(inner: impl Inspect + 'static) -> Self {
        Value::Opaque(Arc::new(inner))
    }

    pub fn is_undefined(&self) -> bool {
        matches!(self, Value::Undefined)
    }

    pub fn is_nullish(&self) -> bool {
        matches!(self, Value::Undefined | Value::Null)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&ObjectRef> {
        match self {
            Value::Object(obj) => Some(obj),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&ArrayRef> {
        match self {
            Value::Array(arr) => Some(arr),
            _ => None,
        }
    }

    /// Truthiness as a dynamic language evaluates a condition: `undefined`,
    /// `null`, `false`, `0`, `NaN`, `0n` and `""` are falsy; everything else,
    /// including empty objects and arrays, is truthy.
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Undefined | Value::Null => false,
            Value::Bool(b) => *b,
            Value::Number(n) => *n != 0.0 && !n.is_nan(),
            Value::BigInt(n) => *n != 0,
            Value::String(s) => !s.is_empty(),
            Value::Symbol(_)
            | Value::Error { .. }
            | Value::Array(_)
            | Value::Object(_)
            | Value::Opaque(_) => true,
        }
    }

    /// Default string form, surfacing [`Inspect`] failures instead of
    /// substituting a placeholder.
    pub fn try_to_string(&self) -> Result<String, InspectError> {
        match self {
            Value::Opaque(inner) => inner.to_display(),
            other => Ok(other.to_string()),
        }
    }

    /// Own enumerable property names, as used for table headers. Strings
    /// expose one index per character.
    pub(crate) fn own_keys(&self) -> Result<Vec<String>, InspectError> {
        match self {
            Value::Object(obj) => Ok(obj.keys()),
            Value::Array(arr) => Ok((0..arr.len()).map(|i| i.to_string()).collect()),
            Value::String(s) => Ok((0..s.chars().count()).map(|i| i.to_string()).collect()),
            Value::Opaque(inner) => inner.inspect()?.own_keys(),
            _ => Ok(Vec::new()),
        }
    }

    /// Property lookup by name; array elements and string characters are
    /// addressed by index.
    pub(crate) fn property(&self, key: &str) -> Result<Option<Value>, InspectError> {
        match self {
            Value::Object(obj) => Ok(obj.get(key)),
            Value::Array(arr) => Ok(key.parse::<usize>().ok().and_then(|i| arr.get(i))),
            Value::String(s) => Ok(key
                .parse::<usize>()
                .ok()
                .and_then(|i| s.chars().nth(i))
                .map(|c| Value::String(c.to_string()))),
            Value::Opaque(inner) => inner.inspect()?.property(key),
            _ => Ok(None),
        }
    }

    fn write_display(&self, out: &mut String, seen: &mut HashSet<usize>) {
        match self {
            Value::Undefined => out.push_str("undefined"),
            Value::Null => out.push_str("null"),
            Value::Bool(b) => out.push_str(if *b { "true" } else { "false" }),
            Value::Number(n) => out.push_str(&format_number(*n)),
            Value::BigInt(n) => out.push_str(&n.to_string()),
            Value::String(s) => out.push_str(s),
            Value::Symbol(desc) => {
                out.push_str("Symbol(");
                if let Some(d) = desc {
                    out.push_str(d);
                }
                out.push(')');
            }
            Value::Error { name, message } => {
                out.push_str(name);
                if !message.is_empty() {
                    out.push_str(": ");
                    out.push_str(message);
                }
            }
            Value::Array(arr) => {
                // Joining a self-containing array renders the repeat as empty.
                if !seen.insert(arr.id()) {
                    return;
                }
                for (i, item) in arr.items().iter().enumerate() {
                    if i > 0 {
                        out.push(',');
                    }
                    if !item.is_nullish() {
                        item.write_display(out, seen);
                    }
                }
                seen.remove(&arr.id());
            }
            Value::Object(_) => out.push_str("[object Object]"),
            Value::Opaque(inner) => match inner.to_display() {
                Ok(s) => out.push_str(&s),
                Err(_) => out.push_str("[object]"),
            },
        }
    }
}

/// Number to string the way a dynamic language prints it: integral values
/// without a fractional part, `NaN`/`Infinity` spelled out, `-0` as `0`.
pub(crate) fn format_number(n: f64) -> String {
    if n.is_nan() {
        "NaN".to_string()
    } else if n.is_infinite() {
        if n > 0.0 {
            "Infinity".to_string()
        } else {
            "-Infinity".to_string()
        }
    } else if n == 0.0 {
        "0".to_string()
    } else if n.fract() == 0.0 && n.abs() < 1e21 {
        format!("{:.0}", n)
    } else {
        format!("{}", n)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut out = String::new();
        self.write_display(&mut out, &mut HashSet::new());
        f.write_str(&out)
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Undefined => write!(f, "Undefined"),
            Value::Null => write!(f, "Null"),
            Value::Bool(b) => write!(f, "Bool({})", b),
            Value::Number(n) => write!(f, "Number({})", n),
            Value::BigInt(n) => write!(f, "BigInt({})", n),
            Value::String(s) => write!(f, "String({:?})", s),
            Value::Symbol(desc) => write!(f, "Symbol({:?})", desc),
            Value::Error { name, message } => write!(f, "Error({}: {:?})", name, message),
            // Containers may be cyclic; only show identity and size.
            Value::Array(arr) => write!(f, "Array(#{:x}, len={})", arr.id(), arr.len()),
            Value::Object(obj) => write!(f, "Object(#{:x}, len={})", obj.id(), obj.len()),
            Value::Opaque(_) => write!(f, "Opaque"),
        }
    }
}

impl PartialEq for Value {
    /// Primitives compare by value; objects, arrays and opaque values by identity.
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Undefined, Value::Undefined) | (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Number(a), Value::Number(b)) => a == b,
            (Value::BigInt(a), Value::BigInt(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Symbol(a), Value::Symbol(b)) => a == b,
            (
                Value::Error { name: n1, message: m1 },
                Value::Error { name: n2, message: m2 },
            ) => n1 == n2 && m1 == m2,
            (Value::Array(a), Value::Array(b)) => a.ptr_eq(b),
            (Value::Object(a), Value::Object(b)) => a.ptr_eq(b),
            (Value::Opaque(a), Value::Opaque(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<&String> for Value {
    fn from(s: &String) -> Self {
        Value::String(s.clone())
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

macro_rules! impl_from_number {
    ($($t:ty),*) => {
        $(
            impl From<$t> for Value {
                fn from(n: $t) -> Self {
                    Value::Number(n as f64)
                }
            }
        )*
    };
}

impl_from_number!(i8, i16, i32, i64, isize, u8, u16, u32, u64, usize, f32, f64);

impl From<i128> for Value {
    fn from(n: i128) -> Self {
        Value::BigInt(n)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(opt: Option<T>) -> Self {
        opt.map(Into::into).unwrap_or(Value::Null)
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(items: Vec<T>) -> Self {
        Value::array(items)
    }
}

impl From<ObjectRef> for Value {
    fn from(obj: ObjectRef) -> Self {
        Value::Object(obj)
    }
}

impl From<ArrayRef> for Value {
    fn from(arr: ArrayRef) -> Self {
        Value::Array(arr)
    }
}

impl From<serde_json::Value> for Value {
    fn from(json: serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => match n.as_f64() {
                Some(f) => Value::Number(f),
                None => Value::String(n.to_string()),
            },
            serde_json::Value::String(s) => Value::String(s),
            serde_json::Value::Array(items) => Value::array(items),
            serde_json::Value::Object(map) => Value::object(map),
        }
    }
}

/// Build a `Vec<Value>` from heterogeneous expressions.
///
/// ```ignore
/// log.info(args!["user", 42, true]);
/// ```
#[macro_export]
macro_rules! args {
    () => {
        ::std::vec::Vec::<$crate::Value>::new()
    };
    ($($arg:expr),+ $(,)?) => {
        ::std::vec![$($crate::Value::from($arg)),+]
    };
}
