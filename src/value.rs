use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use crate::compiler::EvalError;

/// A dynamic value used throughout the expression engine.
///
/// This models the value space of a dynamic scripting context over JSON-like
/// state: all JSON types (with the integer/float distinction preserved), plus
/// `undefined` as a first-class kind distinct from `null`, and host functions
/// so that expressions can call into the embedding program.
///
/// # Shared identity
///
/// Arrays and objects are reference handles ([`ArrayRef`] / [`ObjectRef`]):
/// cloning a `Value` clones the handle, not the contents. Mutating a nested
/// object through one handle is visible through every other handle to the
/// same object. Scope inheritance and in-place collection watching both rely
/// on this.
///
/// # Examples
///
/// ```
/// use fennel::value::{ObjectRef, Value};
///
/// let obj = ObjectRef::new();
/// obj.set("answer", Value::Integer(42));
///
/// let alias = Value::Object(obj.clone());
/// assert_eq!(obj.get("answer"), Value::Integer(42));
/// assert!(alias.strict_eq(&Value::Object(obj)));
/// ```
#[derive(Clone)]
pub enum Value {
    /// Missing value: the result of reading an absent key or a broken
    /// member chain. Distinct from `Null`.
    Undefined,

    /// Explicit null
    Null,

    /// Boolean
    Boolean(bool),

    /// Integer number (preserved separately from floats)
    Integer(i64),

    /// Floating-point number
    Float(f64),

    /// UTF-8 string
    String(String),

    /// Shared array handle
    Array(ArrayRef),

    /// Shared object handle
    Object(ObjectRef),

    /// Host function callable from expressions
    Function(FunctionRef),
}

/// Returns a human-readable kind name for a value, for error messages.
pub fn kind_name(v: &Value) -> &'static str {
    match v {
        Value::Undefined => "undefined",
        Value::Null => "null",
        Value::Boolean(_) => "boolean",
        Value::Integer(_) => "integer",
        Value::Float(_) => "float",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
        Value::Function(_) => "function",
    }
}

impl Value {
    /// Truthiness used by conditions, logical operators, and member-chain
    /// short-circuiting.
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Undefined | Value::Null => false,
            Value::Boolean(b) => *b,
            Value::Integer(n) => *n != 0,
            Value::Float(n) => *n != 0.0 && !n.is_nan(),
            Value::String(s) => !s.is_empty(),
            Value::Array(_) | Value::Object(_) | Value::Function(_) => true,
        }
    }

    pub fn is_undefined(&self) -> bool {
        matches!(self, Value::Undefined)
    }

    /// Numeric view of the value, when it has one.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Integer(n) => Some(*n as f64),
            Value::Float(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn into_object(self) -> Option<ObjectRef> {
        match self {
            Value::Object(obj) => Some(obj),
            _ => None,
        }
    }

    pub fn into_array(self) -> Option<ArrayRef> {
        match self {
            Value::Array(arr) => Some(arr),
            _ => None,
        }
    }

    /// Strict equality (`===`): same kind (numbers compare numerically
    /// across integer/float), reference identity for arrays, objects and
    /// functions.
    pub fn strict_eq(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Undefined, Value::Undefined) => true,
            (Value::Null, Value::Null) => true,
            (Value::Boolean(a), Value::Boolean(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Array(a), Value::Array(b)) => a.ptr_eq(b),
            (Value::Object(a), Value::Object(b)) => a.ptr_eq(b),
            (Value::Function(a), Value::Function(b)) => a.ptr_eq(b),
            (a, b) => match (a.as_number(), b.as_number()) {
                (Some(x), Some(y)) => x == y,
                _ => false,
            },
        }
    }

    /// Loose equality (`==`): like [`strict_eq`](Self::strict_eq), but arrays
    /// and objects compare by structure rather than identity.
    pub fn loose_eq(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Array(a), Value::Array(b)) => {
                let a = a.to_vec();
                let b = b.to_vec();
                a.len() == b.len() && a.iter().zip(b.iter()).all(|(x, y)| x.loose_eq(y))
            }
            (Value::Object(a), Value::Object(b)) => {
                let a = a.entries();
                let b = b.entries();
                a.len() == b.len()
                    && a.iter().all(|(k, v)| {
                        let other_v = other_entry(&b, k);
                        match other_v {
                            Some(w) => v.loose_eq(w),
                            None => false,
                        }
                    })
            }
            (a, b) => a.strict_eq(b),
        }
    }

    /// Equality used by the digest engine in reference mode: strict equality
    /// with the NaN special case (NaN is considered equal to itself so a NaN
    /// watch value does not stay dirty forever).
    pub fn watch_eq(&self, other: &Value) -> bool {
        if let (Some(a), Some(b)) = (self.as_number(), other.as_number()) {
            if a.is_nan() && b.is_nan() {
                return true;
            }
        }
        self.strict_eq(other)
    }

    /// Deep structural equality used by the digest engine in value mode.
    pub fn deep_eq(&self, other: &Value) -> bool {
        if let (Some(a), Some(b)) = (self.as_number(), other.as_number()) {
            if a.is_nan() && b.is_nan() {
                return true;
            }
        }
        self.loose_eq(other)
    }

    /// Recursive copy: fresh array/object handles all the way down.
    /// Functions are shared (they have no interior state to copy).
    pub fn deep_clone(&self) -> Value {
        match self {
            Value::Array(arr) => {
                let copied = arr.to_vec().iter().map(Value::deep_clone).collect();
                Value::Array(ArrayRef::from_vec(copied))
            }
            Value::Object(obj) => {
                let copy = ObjectRef::new();
                for (k, v) in obj.entries() {
                    copy.set(&k, v.deep_clone());
                }
                Value::Object(copy)
            }
            other => other.clone(),
        }
    }
}

fn other_entry<'a>(entries: &'a [(String, Value)], key: &str) -> Option<&'a Value> {
    entries.iter().find(|(k, _)| k == key).map(|(_, v)| v)
}

/// Structural equality, as used by `==` in the expression language and by
/// test assertions. For identity comparison use [`Value::strict_eq`].
impl PartialEq for Value {
    fn eq(&self, other: &Value) -> bool {
        self.loose_eq(other)
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Undefined => write!(f, "undefined"),
            Value::Null => write!(f, "null"),
            Value::Boolean(b) => write!(f, "{}", b),
            Value::Integer(n) => write!(f, "{}", n),
            Value::Float(n) => write!(f, "{}", n),
            Value::String(s) => write!(f, "{:?}", s),
            Value::Array(arr) => fmt::Debug::fmt(arr, f),
            Value::Object(obj) => fmt::Debug::fmt(obj, f),
            Value::Function(_) => write!(f, "function"),
        }
    }
}

/// Shared handle to a mutable array of values.
#[derive(Clone)]
pub struct ArrayRef(Rc<RefCell<Vec<Value>>>);

impl ArrayRef {
    pub fn new() -> Self {
        ArrayRef(Rc::new(RefCell::new(Vec::new())))
    }

    pub fn from_vec(values: Vec<Value>) -> Self {
        ArrayRef(Rc::new(RefCell::new(values)))
    }

    pub fn get(&self, index: usize) -> Value {
        self.0
            .borrow()
            .get(index)
            .cloned()
            .unwrap_or(Value::Undefined)
    }

    /// Writes an element, extending the array with `undefined` holes when
    /// the index is past the current end.
    pub fn set(&self, index: usize, value: Value) {
        let mut values = self.0.borrow_mut();
        if index >= values.len() {
            values.resize(index + 1, Value::Undefined);
        }
        values[index] = value;
    }

    pub fn push(&self, value: Value) {
        self.0.borrow_mut().push(value);
    }

    pub fn len(&self) -> usize {
        self.0.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.borrow().is_empty()
    }

    /// Snapshot of the current elements (handles are cloned, contents are
    /// shared).
    pub fn to_vec(&self) -> Vec<Value> {
        self.0.borrow().clone()
    }

    pub fn ptr_eq(&self, other: &ArrayRef) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl Default for ArrayRef {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ArrayRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.to_vec().iter()).finish()
    }
}

struct ObjectData {
    entries: HashMap<String, Value>,
    proto: Option<ObjectRef>,
}

/// Shared handle to a mutable string-keyed object.
///
/// An object may carry a prototype link: reads that miss the own map fall
/// through to the prototype chain, while writes always land in the own map
/// ("shadow on write, inherit on read"). Scope state inheritance is built
/// directly on this.
#[derive(Clone)]
pub struct ObjectRef(Rc<RefCell<ObjectData>>);

impl ObjectRef {
    pub fn new() -> Self {
        ObjectRef(Rc::new(RefCell::new(ObjectData {
            entries: HashMap::new(),
            proto: None,
        })))
    }

    pub fn with_proto(proto: ObjectRef) -> Self {
        ObjectRef(Rc::new(RefCell::new(ObjectData {
            entries: HashMap::new(),
            proto: Some(proto),
        })))
    }

    /// Chained read: own map first, then the prototype chain. Missing keys
    /// read as `undefined`.
    pub fn get(&self, key: &str) -> Value {
        let data = self.0.borrow();
        if let Some(v) = data.entries.get(key) {
            return v.clone();
        }
        match &data.proto {
            Some(proto) => proto.get(key),
            None => Value::Undefined,
        }
    }

    /// Read that ignores the prototype chain.
    pub fn get_own(&self, key: &str) -> Value {
        self.0
            .borrow()
            .entries
            .get(key)
            .cloned()
            .unwrap_or(Value::Undefined)
    }

    pub fn has_own(&self, key: &str) -> bool {
        self.0.borrow().entries.contains_key(key)
    }

    pub fn has(&self, key: &str) -> bool {
        let data = self.0.borrow();
        data.entries.contains_key(key)
            || data.proto.as_ref().is_some_and(|proto| proto.has(key))
    }

    /// Write into the own map, shadowing any prototype entry.
    pub fn set(&self, key: &str, value: Value) {
        self.0.borrow_mut().entries.insert(key.to_string(), value);
    }

    pub fn remove(&self, key: &str) -> Value {
        self.0
            .borrow_mut()
            .entries
            .remove(key)
            .unwrap_or(Value::Undefined)
    }

    /// Snapshot of the own entries (prototype entries excluded).
    pub fn entries(&self) -> Vec<(String, Value)> {
        self.0
            .borrow()
            .entries
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.0.borrow().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.borrow().entries.is_empty()
    }

    pub fn ptr_eq(&self, other: &ObjectRef) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl Default for ObjectRef {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut map = f.debug_map();
        for (key, value) in self.entries() {
            map.entry(&key, &value);
        }
        map.finish()
    }
}

type HostFn = dyn Fn(&Value, &[Value]) -> Result<Value, EvalError>;

/// Shared handle to a host function.
///
/// The first argument is the `this` binding: the receiver object for member
/// calls, the context that supplied the function for bare identifier calls.
#[derive(Clone)]
pub struct FunctionRef(Rc<HostFn>);

impl FunctionRef {
    pub fn new(f: impl Fn(&Value, &[Value]) -> Result<Value, EvalError> + 'static) -> Self {
        FunctionRef(Rc::new(f))
    }

    pub fn call(&self, this: &Value, args: &[Value]) -> Result<Value, EvalError> {
        (self.0)(this, args)
    }

    pub fn ptr_eq(&self, other: &FunctionRef) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}
