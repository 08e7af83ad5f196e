//! The dynamic value model (spec §3, §9 "Runtime reflection / dynamic
//! values") and the worker-local container/codec machinery around it.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::graph::Endpoint;
use crate::worker::WorkerId;

/// A tagged variant standing in for the source language's heterogeneous
/// runtime values. Containers hold `Value` recursively; truly opaque user
/// objects (iterators, callables the host language can't introspect) sit
/// behind [`OpaqueHandle`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "value")]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Bytes(Vec<u8>),
    List(Vec<Value>),
    /// Preserves insertion order, like the source language's `dict`.
    Map(Vec<(Value, Value)>),
    Set(Vec<Value>),
    Tuple(Vec<Value>),
    Callable(Callable),
    #[serde(skip)]
    Opaque(OpaqueHandle),
}

impl Value {
    /// Truthiness per the source language's coercion rules, used by `If`
    /// and `While`'s `refiner_reducer`.
    pub fn truthy(&self) -> bool {
        match self {
            Value::Null => false,
            Value::Bool(b) => *b,
            Value::Int(i) => *i != 0,
            Value::Float(f) => *f != 0.0,
            Value::Str(s) => !s.is_empty(),
            Value::Bytes(b) => !b.is_empty(),
            Value::List(v) | Value::Tuple(v) | Value::Set(v) => !v.is_empty(),
            Value::Map(m) => !m.is_empty(),
            Value::Callable(_) | Value::Opaque(_) => true,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// Whether this value may be serialized and shipped between workers.
    /// Opaque handles carry their own answer (e.g. iterators are always
    /// nosend); everything else is assumed serializable until a concrete
    /// `Codec` proves otherwise.
    pub fn pickle_supported(&self) -> bool {
        match self {
            Value::Opaque(h) => h.pickle_supported(),
            _ => true,
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Bytes(a), Value::Bytes(b)) => a == b,
            (Value::List(a), Value::List(b)) => a == b,
            (Value::Map(a), Value::Map(b)) => a == b,
            (Value::Set(a), Value::Set(b)) => a == b,
            (Value::Tuple(a), Value::Tuple(b)) => a == b,
            (Value::Callable(a), Value::Callable(b)) => a.graph_id == b.graph_id,
            (Value::Opaque(a), Value::Opaque(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

/// A callable produced by evaluating a `FunctionDef` task: the body graph,
/// its parameter names, `vararg`/`kwarg` binding names, and default values
/// supplied as `default_i` inputs at definition time (spec §4.4).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Callable {
    /// Identity of the originating `FunctionDef`, for equality and display
    /// only — the body graph itself is not `Serialize` (it holds task
    /// trait objects) and is looked up from a registry keyed by this id
    /// when the callable is actually invoked.
    pub graph_id: Uuid,
    pub name: String,
    pub params: Vec<String>,
    pub vararg: Option<String>,
    pub kwarg: Option<String>,
    pub defaults: Vec<Value>,
}

/// An opaque, not-necessarily-serializable runtime object: iterators,
/// module namespaces, anything the catalog needs to pass between tasks
/// without the engine understanding its internals (spec §9).
pub type OpaqueHandle = Arc<dyn OpaqueValue>;

pub trait OpaqueValue: std::fmt::Debug + Send + Sync {
    /// Whether this handle may ever leave the worker that produced it.
    /// Iterators answer `false` unconditionally; most opaque handles
    /// answer `true` and defer to the worker's best-effort serialization.
    fn pickle_supported(&self) -> bool {
        false
    }

    fn type_tag(&self) -> &'static str;

    /// Downcasting escape hatch — tasks that produced a concrete opaque
    /// type (e.g. `Iter` producing an [`IterHandle`]) use this to recover
    /// it from the type-erased [`OpaqueHandle`] a later task receives.
    fn as_any(&self) -> &dyn std::any::Any;
}

/// An immutable snapshot-and-cursor iterator over a materialized sequence.
/// `Next` advances it functionally — it returns a *new* handle rather than
/// mutating this one in place — but the handle is still marked nosend: the
/// source language's iterator protocol is stateful enough that shipping it
/// between workers would be observably wrong.
#[derive(Debug, Clone)]
pub struct IterHandle {
    items: Arc<Vec<Value>>,
    position: usize,
}

impl IterHandle {
    pub fn over(items: Vec<Value>) -> Self {
        Self { items: Arc::new(items), position: 0 }
    }

    pub fn has_next(&self) -> bool {
        self.position < self.items.len()
    }

    /// Returns the next element and the advanced iterator, or `None` if
    /// exhausted.
    pub fn next(&self) -> Option<(Value, IterHandle)> {
        let item = self.items.get(self.position)?.clone();
        Some((item, IterHandle { items: self.items.clone(), position: self.position + 1 }))
    }
}

impl OpaqueValue for IterHandle {
    fn pickle_supported(&self) -> bool {
        false
    }

    fn type_tag(&self) -> &'static str {
        "iterator"
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }
}

/// A locally unique value identifier, paired with the endpoint that
/// produced it and an optional human label for diagnostics. Equality is
/// by id alone (spec §3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValueId {
    id: Uuid,
    pub origin: Endpoint,
    pub label: Option<String>,
}

impl ValueId {
    pub fn new(origin: Endpoint, label: Option<String>) -> Self {
        Self { id: Uuid::new_v4(), origin, label }
    }

    pub fn raw(&self) -> Uuid {
        self.id
    }
}

impl PartialEq for ValueId {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}
impl Eq for ValueId {}

impl std::hash::Hash for ValueId {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Display for ValueId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.label {
            Some(l) => write!(f, "{l}#{}", &self.id.to_string()[..8]),
            None => write!(f, "{}", &self.id.to_string()[..8]),
        }
    }
}

/// A value id plus the set of workers currently known to hold it, and an
/// optional byte size once it has been serialized at least once (spec §3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValueRef {
    pub id: ValueId,
    pub pickle_supported: bool,
    pub workers: HashSet<WorkerId>,
    pub size: Option<u64>,
}

impl ValueRef {
    pub fn new(id: ValueId, pickle_supported: bool, holder: WorkerId) -> Self {
        let mut workers = HashSet::new();
        workers.insert(holder);
        Self { id, pickle_supported, workers, size: None }
    }

    pub fn add_holder(&mut self, worker: WorkerId) {
        self.workers.insert(worker);
    }
}

/// Converts a [`Value`] to and from bytes. The default `JsonCodec` is used
/// unless a worker is configured with a denser wire format (`BincodeCodec`);
/// spec §9 calls the pickle-on-ingest redundancy (serialize, then
/// round-trip once to catch deserialize-only failures) out deliberately —
/// both codecs below preserve it in `ValueContainer::ingest`.
pub trait Codec: Send + Sync {
    fn encode(&self, value: &Value) -> Result<Vec<u8>, String>;
    fn decode(&self, bytes: &[u8]) -> Result<Value, String>;
}

#[derive(Debug, Default)]
pub struct JsonCodec;

impl Codec for JsonCodec {
    fn encode(&self, value: &Value) -> Result<Vec<u8>, String> {
        serde_json::to_vec(value).map_err(|e| e.to_string())
    }

    fn decode(&self, bytes: &[u8]) -> Result<Value, String> {
        serde_json::from_slice(bytes).map_err(|e| e.to_string())
    }
}

#[derive(Debug, Default)]
pub struct BincodeCodec;

impl Codec for BincodeCodec {
    fn encode(&self, value: &Value) -> Result<Vec<u8>, String> {
        bincode::serialize(value).map_err(|e| e.to_string())
    }

    fn decode(&self, bytes: &[u8]) -> Result<Value, String> {
        bincode::deserialize(bytes).map_err(|e| e.to_string())
    }
}

/// Worker-local storage for one value: the live form, its serialized form,
/// or both. Invariant: at least one is present. Conversion live -> serialized
/// is attempted once on ingestion; permanent failure flips `pickle_supported`
/// to `false` (spec §3).
#[derive(Debug, Clone)]
pub struct ValueContainer {
    live: Option<Value>,
    serialized: Option<Vec<u8>>,
    pickle_supported: bool,
}

impl ValueContainer {
    /// Ingest a freshly produced live value, attempting serialization
    /// unless `suppress_serialize` is set (e.g. for nosend ports). Also
    /// round-trips the serialized bytes once to catch deserialize-only
    /// failures before any downstream code assumes the container is
    /// demonstrably serializable — the redundancy spec §9 asks us to keep.
    pub fn ingest(codec: &dyn Codec, value: Value, suppress_serialize: bool) -> Self {
        if suppress_serialize || !value.pickle_supported() {
            return Self { live: Some(value), serialized: None, pickle_supported: false };
        }
        match codec.encode(&value) {
            Ok(bytes) => match codec.decode(&bytes) {
                Ok(_) => Self { live: Some(value), serialized: Some(bytes), pickle_supported: true },
                Err(_) => Self { live: Some(value), serialized: None, pickle_supported: false },
            },
            Err(_) => Self { live: Some(value), serialized: None, pickle_supported: false },
        }
    }

    /// Construct from bytes received over the wire (`set_cucumber`).
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self { live: None, serialized: Some(bytes), pickle_supported: true }
    }

    pub fn pickle_supported(&self) -> bool {
        self.pickle_supported
    }

    pub fn size(&self) -> Option<u64> {
        self.serialized.as_ref().map(|b| b.len() as u64)
    }

    pub fn bytes(&self) -> Option<&[u8]> {
        self.serialized.as_deref()
    }

    /// Returns the live value, deserializing on demand if only the
    /// serialized form is present. Errors if neither form can produce one.
    pub fn value(&self, codec: &dyn Codec) -> Result<Value, String> {
        if let Some(v) = &self.live {
            return Ok(v.clone());
        }
        match &self.serialized {
            Some(bytes) => codec.decode(bytes),
            None => Err("value has neither live nor serialized form".to_string()),
        }
    }
}
