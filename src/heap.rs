//! Object model and memory manager.
//!
//! Every heap entity lives in a slab owned by [`Heap`] and is addressed by an
//! [`ObjRef`] index handle. The collector is a precise tri-color mark-and-sweep:
//! the VM seeds the gray worklist from its root set (current environment plus
//! the compile- and runtime-root stacks), [`Heap::trace`] blackens until the
//! worklist drains, the string intern table drops entries for unmarked
//! strings, and [`Heap::sweep`] vacates everything still white.
//!
//! Handles are only valid while their object is reachable from a root. A
//! stale handle is a rooting bug in the caller, not a recoverable error, and
//! accessors panic on one.

use std::collections::HashMap;

use crate::value::Value;
use crate::vm::NativeFn;

/// Handle to a heap object. Copyable; identity is slab position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObjRef(pub(crate) u32);

impl ObjRef {
    /// Slab index, used for opaque printing (`<closure @7>`).
    pub fn index(self) -> u32 {
        self.0
    }
}

/// Hash table for Map objects: content-hashed buckets of key/value pairs.
/// Key equality is [`Heap::value_eq`], so structurally equal keys collide
/// into one entry regardless of heap identity.
#[derive(Debug, Default)]
pub struct ValueTable {
    buckets: HashMap<u32, Vec<(Value, Value)>>,
    len: usize,
}

impl ValueTable {
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    fn entries(&self) -> impl Iterator<Item = (Value, Value)> + '_ {
        self.buckets.values().flatten().copied()
    }
}

#[derive(Debug)]
pub enum ObjData {
    Str(Box<str>),
    Symbol { name: ObjRef },
    Keyword { name: ObjRef },
    List { items: Vec<Value>, meta: Value },
    Vector { items: Vec<Value>, meta: Value },
    Map { table: ValueTable, meta: Value },
    Native { func: NativeFn, meta: Value },
    Closure { env: ObjRef, params: Value, body: Value, is_macro: bool, meta: Value },
    Atom { boxed: Value },
    Exception { payload: Value },
    Env { outer: Option<ObjRef>, bindings: HashMap<ObjRef, Value> },
}

impl ObjData {
    pub fn kind_name(&self) -> &'static str {
        match self {
            ObjData::Str(_) => "String",
            ObjData::Symbol { .. } => "Symbol",
            ObjData::Keyword { .. } => "Keyword",
            ObjData::List { .. } => "List",
            ObjData::Vector { .. } => "Vector",
            ObjData::Map { .. } => "Map",
            ObjData::Native { .. } => "Function",
            ObjData::Closure { .. } => "Closure",
            ObjData::Atom { .. } => "Atom",
            ObjData::Exception { .. } => "Exception",
            ObjData::Env { .. } => "Env",
        }
    }
}

/// Object header plus payload. `hash` is memoized lazily; zero means "not yet
/// computed". `size` records the bytes charged at allocation so sweep can
/// return exactly that amount.
#[derive(Debug)]
pub struct Obj {
    pub(crate) marked: bool,
    pub(crate) hash: u32,
    size: u32,
    pub data: ObjData,
}

/// Estimated owned size of an object, charged against the GC byte counter.
pub(crate) fn obj_size(data: &ObjData) -> usize {
    let base = std::mem::size_of::<Obj>();
    base + match data {
        ObjData::Str(s) => s.len(),
        ObjData::List { items, .. } | ObjData::Vector { items, .. } => {
            items.len() * std::mem::size_of::<Value>()
        }
        ObjData::Map { table, .. } => table.len() * 3 * std::mem::size_of::<Value>(),
        ObjData::Env { bindings, .. } => bindings.len() * 3 * std::mem::size_of::<Value>(),
        _ => 0,
    }
}

pub(crate) fn fnv1a(bytes: &[u8]) -> u32 {
    let mut h: u32 = 0x811c_9dc5;
    for &b in bytes {
        h ^= b as u32;
        h = h.wrapping_mul(16_777_619);
    }
    h
}

fn mix(h: u32, x: u32) -> u32 {
    (h ^ x).wrapping_mul(16_777_619)
}

const NIL_HASH: u32 = 0x9e37_79b9;
const TRUE_HASH: u32 = 0x85eb_ca6b;
const FALSE_HASH: u32 = 0xc2b2_ae35;
const SYMBOL_SEED: u32 = 0x27d4_eb2f;
const KEYWORD_SEED: u32 = 0x1656_67b1;
const MAP_SEED: u32 = 0x6546_7b3f;
const IDENTITY_SEED: u32 = 0x4cf5_ad43;

const INITIAL_GC_THRESHOLD: usize = 1024 * 1024;
const GC_HEAP_GROW_FACTOR: usize = 2;

pub struct Heap {
    slots: Vec<Option<Obj>>,
    free: Vec<u32>,
    bytes_allocated: usize,
    next_gc: usize,
    /// Global string intern table: content -> interned String object.
    strings: HashMap<Box<str>, ObjRef>,
    gray: Vec<ObjRef>,
}

impl Heap {
    pub fn new() -> Self {
        Heap {
            slots: Vec::new(),
            free: Vec::new(),
            bytes_allocated: 0,
            next_gc: INITIAL_GC_THRESHOLD,
            strings: HashMap::new(),
            gray: Vec::new(),
        }
    }

    pub fn bytes_allocated(&self) -> usize {
        self.bytes_allocated
    }

    pub fn next_gc(&self) -> usize {
        self.next_gc
    }

    /// True when charging `upcoming` more bytes would cross the threshold.
    pub(crate) fn wants_collect(&self, upcoming: usize) -> bool {
        self.bytes_allocated + upcoming > self.next_gc
    }

    /// Register a new object. Does not collect; [`crate::vm::Vm::alloc`] is
    /// the collecting entry point.
    pub(crate) fn insert(&mut self, data: ObjData) -> ObjRef {
        let size = obj_size(&data);
        self.bytes_allocated += size;
        let obj = Obj {
            marked: false,
            hash: 0,
            size: size as u32,
            data,
        };
        match self.free.pop() {
            Some(i) => {
                self.slots[i as usize] = Some(obj);
                ObjRef(i)
            }
            None => {
                self.slots.push(Some(obj));
                ObjRef((self.slots.len() - 1) as u32)
            }
        }
    }

    pub fn get(&self, r: ObjRef) -> &Obj {
        self.slots[r.0 as usize]
            .as_ref()
            .expect("stale object handle: value was not rooted across a collection")
    }

    pub fn get_mut(&mut self, r: ObjRef) -> &mut Obj {
        self.slots[r.0 as usize]
            .as_mut()
            .expect("stale object handle: value was not rooted across a collection")
    }

    pub(crate) fn is_live(&self, r: ObjRef) -> bool {
        self.slots
            .get(r.0 as usize)
            .map_or(false, |slot| slot.is_some())
    }

    // ---- interning ----

    pub fn lookup_interned(&self, s: &str) -> Option<ObjRef> {
        self.strings.get(s).copied()
    }

    /// Insert a string that is known not to be interned yet. The content hash
    /// is computed eagerly, as every symbol and keyword derives from it.
    pub(crate) fn intern_new(&mut self, s: &str) -> ObjRef {
        let r = self.insert(ObjData::Str(s.into()));
        self.register_interned(r);
        r
    }

    /// Record a freshly allocated String object in the intern table.
    pub(crate) fn register_interned(&mut self, r: ObjRef) {
        let s: Box<str> = match &self.get(r).data {
            ObjData::Str(s) => s.clone(),
            other => panic!("expected String, found {}", other.kind_name()),
        };
        let h = fnv1a(s.as_bytes());
        self.get_mut(r).hash = if h == 0 { 0x811c_9dc5 } else { h };
        self.strings.insert(s, r);
    }

    pub fn string(&self, r: ObjRef) -> &str {
        match &self.get(r).data {
            ObjData::Str(s) => s,
            other => panic!("expected String, found {}", other.kind_name()),
        }
    }

    // ---- kind predicates and accessors ----

    pub fn is_list(&self, v: Value) -> bool {
        matches!(self.data_of(v), Some(ObjData::List { .. }))
    }

    pub fn is_vector(&self, v: Value) -> bool {
        matches!(self.data_of(v), Some(ObjData::Vector { .. }))
    }

    pub fn is_seq(&self, v: Value) -> bool {
        matches!(
            self.data_of(v),
            Some(ObjData::List { .. } | ObjData::Vector { .. })
        )
    }

    /// A non-empty list or vector.
    pub fn is_pair(&self, v: Value) -> bool {
        self.seq_items(v).map_or(false, |items| !items.is_empty())
    }

    pub fn is_map(&self, v: Value) -> bool {
        matches!(self.data_of(v), Some(ObjData::Map { .. }))
    }

    pub fn is_string(&self, v: Value) -> bool {
        matches!(self.data_of(v), Some(ObjData::Str(_)))
    }

    pub fn is_symbol(&self, v: Value) -> bool {
        matches!(self.data_of(v), Some(ObjData::Symbol { .. }))
    }

    pub fn is_keyword(&self, v: Value) -> bool {
        matches!(self.data_of(v), Some(ObjData::Keyword { .. }))
    }

    pub fn is_atom(&self, v: Value) -> bool {
        matches!(self.data_of(v), Some(ObjData::Atom { .. }))
    }

    pub fn is_native(&self, v: Value) -> bool {
        matches!(self.data_of(v), Some(ObjData::Native { .. }))
    }

    pub fn is_closure(&self, v: Value) -> bool {
        matches!(self.data_of(v), Some(ObjData::Closure { .. }))
    }

    pub fn is_macro(&self, v: Value) -> bool {
        matches!(
            self.data_of(v),
            Some(ObjData::Closure { is_macro: true, .. })
        )
    }

    pub fn is_callable(&self, v: Value) -> bool {
        matches!(
            self.data_of(v),
            Some(ObjData::Closure { .. } | ObjData::Native { .. })
        )
    }

    fn data_of(&self, v: Value) -> Option<&ObjData> {
        v.as_obj().map(|r| &self.get(r).data)
    }

    pub fn kind_name(&self, v: Value) -> &'static str {
        match v {
            Value::None => "None",
            Value::Nil => "Nil",
            Value::Bool(_) => "Bool",
            Value::Number(_) => "Number",
            Value::Obj(r) => self.get(r).data.kind_name(),
        }
    }

    /// Elements of a list or vector.
    pub fn seq_items(&self, v: Value) -> Option<&[Value]> {
        match self.data_of(v)? {
            ObjData::List { items, .. } | ObjData::Vector { items, .. } => Some(items),
            _ => None,
        }
    }

    pub fn seq_slice(&self, r: ObjRef) -> &[Value] {
        match &self.get(r).data {
            ObjData::List { items, .. } | ObjData::Vector { items, .. } => items,
            other => panic!("expected List or Vector, found {}", other.kind_name()),
        }
    }

    pub fn seq_len(&self, r: ObjRef) -> usize {
        match &self.get(r).data {
            ObjData::List { items, .. } | ObjData::Vector { items, .. } => items.len(),
            other => panic!("expected List or Vector, found {}", other.kind_name()),
        }
    }

    /// Element at `i`, or Nil when out of range.
    pub fn seq_get(&self, r: ObjRef, i: usize) -> Value {
        match &self.get(r).data {
            ObjData::List { items, .. } | ObjData::Vector { items, .. } => {
                items.get(i).copied().unwrap_or(Value::Nil)
            }
            other => panic!("expected List or Vector, found {}", other.kind_name()),
        }
    }

    pub fn seq_set(&mut self, r: ObjRef, i: usize, v: Value) {
        match &mut self.get_mut(r).data {
            ObjData::List { items, .. } | ObjData::Vector { items, .. } => items[i] = v,
            other => panic!("expected List or Vector, found {}", other.kind_name()),
        }
    }

    /// The interned-name handle of a Symbol, used as an environment key.
    pub fn symbol_name(&self, v: Value) -> Option<ObjRef> {
        match self.data_of(v)? {
            ObjData::Symbol { name } => Some(*name),
            _ => None,
        }
    }

    pub fn symbol_is(&self, v: Value, text: &str) -> bool {
        self.symbol_name(v)
            .map_or(false, |name| self.string(name) == text)
    }

    pub fn closure_parts(&self, r: ObjRef) -> (ObjRef, Value, Value, bool) {
        match &self.get(r).data {
            ObjData::Closure {
                env,
                params,
                body,
                is_macro,
                ..
            } => (*env, *params, *body, *is_macro),
            other => panic!("expected Closure, found {}", other.kind_name()),
        }
    }

    pub fn native_func(&self, r: ObjRef) -> NativeFn {
        match &self.get(r).data {
            ObjData::Native { func, .. } => *func,
            other => panic!("expected Function, found {}", other.kind_name()),
        }
    }

    pub fn atom_get(&self, r: ObjRef) -> Value {
        match &self.get(r).data {
            ObjData::Atom { boxed } => *boxed,
            other => panic!("expected Atom, found {}", other.kind_name()),
        }
    }

    pub fn atom_set(&mut self, r: ObjRef, v: Value) {
        match &mut self.get_mut(r).data {
            ObjData::Atom { boxed } => *boxed = v,
            other => panic!("expected Atom, found {}", other.kind_name()),
        }
    }

    pub fn exception_payload(&self, r: ObjRef) -> Value {
        match &self.get(r).data {
            ObjData::Exception { payload } => *payload,
            other => panic!("expected Exception, found {}", other.kind_name()),
        }
    }

    /// Meta of the kinds that carry one.
    pub fn meta(&self, v: Value) -> Option<Value> {
        match self.data_of(v)? {
            ObjData::List { meta, .. }
            | ObjData::Vector { meta, .. }
            | ObjData::Map { meta, .. }
            | ObjData::Native { meta, .. }
            | ObjData::Closure { meta, .. } => Some(*meta),
            _ => None,
        }
    }

    // ---- environments ----

    pub fn env_define(&mut self, env: ObjRef, name: ObjRef, value: Value) {
        match &mut self.get_mut(env).data {
            ObjData::Env { bindings, .. } => {
                bindings.insert(name, value);
            }
            other => panic!("expected Env, found {}", other.kind_name()),
        }
    }

    /// Lexical lookup: walk the outer chain until a binding is found.
    pub fn env_get(&self, env: ObjRef, name: ObjRef) -> Option<Value> {
        let mut current = Some(env);
        while let Some(e) = current {
            match &self.get(e).data {
                ObjData::Env { outer, bindings } => {
                    if let Some(v) = bindings.get(&name) {
                        return Some(*v);
                    }
                    current = *outer;
                }
                other => panic!("expected Env, found {}", other.kind_name()),
            }
        }
        None
    }

    // ---- maps ----

    pub fn map_len(&self, m: ObjRef) -> usize {
        match &self.get(m).data {
            ObjData::Map { table, .. } => table.len(),
            other => panic!("expected Map, found {}", other.kind_name()),
        }
    }

    pub fn map_entries(&self, m: ObjRef) -> Vec<(Value, Value)> {
        match &self.get(m).data {
            ObjData::Map { table, .. } => table.entries().collect(),
            other => panic!("expected Map, found {}", other.kind_name()),
        }
    }

    fn take_map_table(&mut self, m: ObjRef) -> ValueTable {
        match &mut self.get_mut(m).data {
            ObjData::Map { table, .. } => std::mem::take(table),
            other => panic!("expected Map, found {}", other.kind_name()),
        }
    }

    fn put_map_table(&mut self, m: ObjRef, table: ValueTable) {
        match &mut self.get_mut(m).data {
            ObjData::Map { table: slot, .. } => *slot = table,
            other => panic!("expected Map, found {}", other.kind_name()),
        }
    }

    pub fn map_insert(&mut self, m: ObjRef, key: Value, value: Value) {
        let h = self.value_hash(key);
        let mut table = self.take_map_table(m);
        let bucket = table.buckets.entry(h).or_default();
        if let Some(entry) = bucket.iter_mut().find(|(k, _)| self.value_eq(*k, key)) {
            entry.1 = value;
        } else {
            bucket.push((key, value));
            table.len += 1;
        }
        self.put_map_table(m, table);
    }

    pub fn map_get(&mut self, m: ObjRef, key: Value) -> Option<Value> {
        let h = self.value_hash(key);
        match &self.get(m).data {
            ObjData::Map { table, .. } => table
                .buckets
                .get(&h)?
                .iter()
                .find(|(k, _)| self.value_eq(*k, key))
                .map(|(_, v)| *v),
            other => panic!("expected Map, found {}", other.kind_name()),
        }
    }

    pub fn map_remove(&mut self, m: ObjRef, key: Value) -> bool {
        let h = self.value_hash(key);
        let mut table = self.take_map_table(m);
        let mut removed = false;
        if let Some(bucket) = table.buckets.get_mut(&h) {
            if let Some(i) = bucket.iter().position(|(k, _)| self.value_eq(*k, key)) {
                bucket.swap_remove(i);
                table.len -= 1;
                removed = true;
            }
        }
        self.put_map_table(m, table);
        removed
    }

    // ---- equality ----

    pub fn value_eq(&self, a: Value, b: Value) -> bool {
        match (a, b) {
            (Value::None, _) | (_, Value::None) => false,
            (Value::Nil, Value::Nil) => true,
            (Value::Bool(x), Value::Bool(y)) => x == y,
            (Value::Number(x), Value::Number(y)) => x == y,
            (Value::Obj(x), Value::Obj(y)) => self.obj_eq(x, y),
            _ => false,
        }
    }

    fn obj_eq(&self, a: ObjRef, b: ObjRef) -> bool {
        if a == b {
            return true;
        }
        match (&self.get(a).data, &self.get(b).data) {
            // Lists and vectors are both sequential and compare across kinds.
            (
                ObjData::List { items: x, .. } | ObjData::Vector { items: x, .. },
                ObjData::List { items: y, .. } | ObjData::Vector { items: y, .. },
            ) => {
                x.len() == y.len()
                    && x.iter()
                        .zip(y.iter())
                        .all(|(&xv, &yv)| self.value_eq(xv, yv))
            }
            // Interning makes name identity equivalent to content equality.
            (ObjData::Symbol { name: x }, ObjData::Symbol { name: y }) => x == y,
            (ObjData::Keyword { name: x }, ObjData::Keyword { name: y }) => x == y,
            (ObjData::Native { func: x, .. }, ObjData::Native { func: y, .. }) => x == y,
            (ObjData::Map { table: x, .. }, ObjData::Map { table: y, .. }) => {
                x.len() == y.len()
                    && x.entries().all(|(k, v)| {
                        y.entries()
                            .any(|(k2, v2)| self.value_eq(k, k2) && self.value_eq(v, v2))
                    })
            }
            (
                ObjData::Closure {
                    env: xe,
                    params: xp,
                    body: xb,
                    is_macro: xm,
                    ..
                },
                ObjData::Closure {
                    env: ye,
                    params: yp,
                    body: yb,
                    is_macro: ym,
                    ..
                },
            ) => xe == ye && xm == ym && self.value_eq(*xp, *yp) && self.value_eq(*xb, *yb),
            // Strings are interned (identity handled above); atoms, exceptions
            // and environments compare by identity.
            _ => false,
        }
    }

    // ---- hashing ----

    /// Content hash, memoized in the object header. Derived from equality:
    /// `value_eq(a, b)` implies `value_hash(a) == value_hash(b)`.
    pub fn value_hash(&mut self, v: Value) -> u32 {
        match v {
            Value::None => 0,
            Value::Nil => NIL_HASH,
            Value::Bool(true) => TRUE_HASH,
            Value::Bool(false) => FALSE_HASH,
            Value::Number(n) => {
                let bits = n.to_bits();
                (bits ^ (bits >> 32)) as u32
            }
            Value::Obj(r) => self.obj_hash(r),
        }
    }

    fn obj_hash(&mut self, r: ObjRef) -> u32 {
        let cached = self.get(r).hash;
        if cached != 0 {
            return cached;
        }
        // Snapshot the children first; hashing them recursively needs the
        // heap mutably for memoization.
        enum Pending {
            Direct(u32),
            Name(ObjRef, u32),
            Seq(Vec<Value>),
            Map(Vec<(Value, Value)>),
            Closure(ObjRef, Value, Value, bool),
        }
        let pending = match &self.get(r).data {
            ObjData::Str(s) => Pending::Direct(fnv1a(s.as_bytes())),
            ObjData::Symbol { name } => Pending::Name(*name, SYMBOL_SEED),
            ObjData::Keyword { name } => Pending::Name(*name, KEYWORD_SEED),
            // One structural hash for both sequential kinds: cross-kind
            // equality demands cross-kind hash agreement.
            ObjData::List { items, .. } | ObjData::Vector { items, .. } => {
                Pending::Seq(items.clone())
            }
            ObjData::Map { table, .. } => Pending::Map(table.entries().collect()),
            ObjData::Native { func, .. } => {
                let p = *func as usize as u64;
                Pending::Direct(mix((p ^ (p >> 32)) as u32, IDENTITY_SEED))
            }
            ObjData::Closure {
                env,
                params,
                body,
                is_macro,
                ..
            } => Pending::Closure(*env, *params, *body, *is_macro),
            ObjData::Atom { .. } | ObjData::Exception { .. } | ObjData::Env { .. } => {
                Pending::Direct(mix(r.0, IDENTITY_SEED))
            }
        };
        let h = match pending {
            Pending::Direct(h) => h,
            Pending::Name(name, seed) => mix(self.obj_hash(name), seed),
            Pending::Seq(items) => {
                let mut h = 0x811c_9dc5;
                for item in items {
                    h = mix(h, self.value_hash(item));
                }
                h
            }
            // Entry order must not matter, so entry hashes are folded with a
            // commutative combine.
            Pending::Map(entries) => {
                let mut h = MAP_SEED;
                for (k, v) in entries {
                    let kh = self.value_hash(k);
                    let vh = self.value_hash(v);
                    h ^= mix(kh, vh);
                }
                h
            }
            Pending::Closure(env, params, body, is_macro) => {
                let mut h = mix(env.0, is_macro as u32 + 1);
                h = mix(h, self.value_hash(params));
                mix(h, self.value_hash(body))
            }
        };
        let h = if h == 0 { 0x811c_9dc5 } else { h };
        self.get_mut(r).hash = h;
        h
    }

    // ---- collection ----

    pub(crate) fn mark_value(&mut self, v: Value) {
        if let Value::Obj(r) = v {
            self.mark_obj(r);
        }
    }

    pub(crate) fn mark_obj(&mut self, r: ObjRef) {
        let Some(obj) = self.slots[r.0 as usize].as_mut() else {
            return;
        };
        if obj.marked {
            return;
        }
        obj.marked = true;
        self.gray.push(r);
    }

    /// Drain the gray worklist, marking every reachable child.
    pub(crate) fn trace(&mut self) {
        while let Some(r) = self.gray.pop() {
            self.blacken(r);
        }
    }

    fn blacken(&mut self, r: ObjRef) {
        let mut children: Vec<Value> = Vec::new();
        let mut child_objs: Vec<ObjRef> = Vec::new();
        match &self.get(r).data {
            ObjData::Str(_) => {}
            ObjData::Symbol { name } | ObjData::Keyword { name } => child_objs.push(*name),
            ObjData::List { items, meta } | ObjData::Vector { items, meta } => {
                children.extend(items.iter().copied());
                children.push(*meta);
            }
            ObjData::Map { table, meta } => {
                for (k, v) in table.entries() {
                    children.push(k);
                    children.push(v);
                }
                children.push(*meta);
            }
            ObjData::Native { meta, .. } => children.push(*meta),
            ObjData::Closure {
                env,
                params,
                body,
                meta,
                ..
            } => {
                child_objs.push(*env);
                children.push(*params);
                children.push(*body);
                children.push(*meta);
            }
            ObjData::Atom { boxed } => children.push(*boxed),
            ObjData::Exception { payload } => children.push(*payload),
            ObjData::Env { outer, bindings } => {
                if let Some(o) = outer {
                    child_objs.push(*o);
                }
                for (k, v) in bindings {
                    child_objs.push(*k);
                    children.push(*v);
                }
            }
        }
        for o in child_objs {
            self.mark_obj(o);
        }
        for v in children {
            self.mark_value(v);
        }
    }

    /// Drop intern-table entries whose string did not survive marking, so
    /// sweep may reclaim them.
    pub(crate) fn purge_interned(&mut self) {
        let slots = &self.slots;
        self.strings
            .retain(|_, r| slots[r.0 as usize].as_ref().map_or(false, |o| o.marked));
    }

    /// Vacate every unmarked slot and clear the mark bits of survivors.
    /// Returns the number of objects freed.
    pub(crate) fn sweep(&mut self) -> usize {
        let mut freed = 0;
        for i in 0..self.slots.len() {
            let reclaim = match &mut self.slots[i] {
                Some(obj) if obj.marked => {
                    obj.marked = false;
                    None
                }
                Some(obj) => Some(obj.size as usize),
                None => None,
            };
            if let Some(size) = reclaim {
                self.bytes_allocated -= size;
                self.slots[i] = None;
                self.free.push(i as u32);
                freed += 1;
            }
        }
        self.next_gc = self.bytes_allocated * GC_HEAP_GROW_FACTOR;
        freed
    }
}

impl Default for Heap {
    fn default() -> Self {
        Heap::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interning_returns_the_same_handle() {
        let mut heap = Heap::new();
        let a = heap.intern_new("hello");
        let b = heap.lookup_interned("hello").unwrap();
        assert_eq!(a, b);
        assert!(heap.lookup_interned("world").is_none());
    }

    #[test]
    fn freed_slots_are_recycled() {
        let mut heap = Heap::new();
        let a = heap.insert(ObjData::List {
            items: vec![Value::Number(1.0)],
            meta: Value::Nil,
        });
        // Nothing marked: sweep reclaims everything.
        let freed = heap.sweep();
        assert_eq!(freed, 1);
        assert!(!heap.is_live(a));
        let b = heap.insert(ObjData::List {
            items: vec![],
            meta: Value::Nil,
        });
        assert_eq!(a, b);
    }

    #[test]
    fn list_and_vector_compare_and_hash_alike() {
        let mut heap = Heap::new();
        let items = vec![Value::Number(1.0), Value::Number(2.0)];
        let l = heap.insert(ObjData::List {
            items: items.clone(),
            meta: Value::Nil,
        });
        let v = heap.insert(ObjData::Vector {
            items,
            meta: Value::Nil,
        });
        assert!(heap.value_eq(Value::Obj(l), Value::Obj(v)));
        assert_eq!(heap.value_hash(Value::Obj(l)), heap.value_hash(Value::Obj(v)));
    }

    #[test]
    fn map_keys_compare_by_content() {
        let mut heap = Heap::new();
        let m = heap.insert(ObjData::Map {
            table: ValueTable::default(),
            meta: Value::Nil,
        });
        let k1 = heap.insert(ObjData::List {
            items: vec![Value::Number(1.0)],
            meta: Value::Nil,
        });
        let k2 = heap.insert(ObjData::List {
            items: vec![Value::Number(1.0)],
            meta: Value::Nil,
        });
        heap.map_insert(m, Value::Obj(k1), Value::Number(10.0));
        assert_eq!(heap.map_len(m), 1);
        assert_eq!(heap.map_get(m, Value::Obj(k2)), Some(Value::Number(10.0)));
        heap.map_insert(m, Value::Obj(k2), Value::Number(20.0));
        assert_eq!(heap.map_len(m), 1);
        assert!(heap.map_remove(m, Value::Obj(k1)));
        assert!(heap.map_get(m, Value::Obj(k2)).is_none());
    }

    #[test]
    fn byte_accounting_round_trips_through_sweep() {
        let mut heap = Heap::new();
        let before = heap.bytes_allocated();
        heap.insert(ObjData::Str("abcdef".into()));
        assert!(heap.bytes_allocated() > before);
        heap.sweep();
        assert_eq!(heap.bytes_allocated(), before);
    }
}
