//! The VM context: one value per interpreter instance.
//!
//! `Vm` owns the heap and everything the collector treats as a root: the
//! compile-root stack (pinning partially built values during reading), the
//! runtime-root stack (pinning evaluator and builtin temporaries), and the
//! current-environment pointer. Multiple `Vm`s may coexist; there is no
//! process-global state.
//!
//! The rooting protocol: before any call that may allocate, push every value
//! whose handle must survive; pop before returning. Pushing a non-heap value
//! (nil, booleans, numbers) is silently skipped, and the pop side checks the
//! same value so pushes and pops stay balanced.

use std::collections::HashMap;

use crate::corelib;
use crate::eval;
use crate::heap::{self, Heap, ObjData, ObjRef};
use crate::printer;
use crate::syntax;
use crate::value::Value;

/// Evaluation either produces a value or leaves an Exception object in
/// flight. `Err` is the exception slot: the caller observes "no value".
pub type EvalResult = Result<Value, ObjRef>;

/// The uniform native-function interface. Arguments arrive pre-evaluated and
/// stay rooted by the caller for the duration of the call; natives may call
/// back into `eval` and allocate, following the rooting protocol for any
/// value they create themselves.
pub type NativeFn = fn(&mut Vm, &[Value]) -> EvalResult;

/// Construct an Exception from a format string and return it as `Err`.
macro_rules! bail {
    ($vm:expr, $($arg:tt)*) => {
        return Err($vm.exception(format!($($arg)*)))
    };
}

macro_rules! ensure {
    ($cond:expr, $vm:expr, $($arg:tt)*) => {
        if !$cond {
            return Err($vm.exception(format!($($arg)*)));
        }
    };
}

pub(crate) use {bail, ensure};

/// One record per non-tail closure application, used to detect self
/// tail-recursion and reclaim runtime roots accumulated across tail calls.
pub(crate) struct ClosureFrame {
    pub closure: ObjRef,
    pub call_depth: usize,
    pub root_mark: usize,
}

pub struct Vm {
    pub heap: Heap,
    /// Pins partially built values while the reader runs; cleared between
    /// top-level inputs.
    compile_roots: Vec<ObjRef>,
    /// Pins evaluator and builtin temporaries across potential collection
    /// points.
    pub(crate) runtime_roots: Vec<ObjRef>,
    global_env: ObjRef,
    pub(crate) current_env: ObjRef,
    pub(crate) call_depth: usize,
    pub(crate) closure_frames: Vec<ClosureFrame>,
}

impl Vm {
    pub fn new() -> Self {
        let mut heap = Heap::new();
        let global_env = heap.insert(ObjData::Env {
            outer: None,
            bindings: HashMap::new(),
        });
        let mut vm = Vm {
            heap,
            compile_roots: Vec::new(),
            runtime_roots: Vec::new(),
            global_env,
            current_env: global_env,
            call_depth: 0,
            closure_frames: Vec::new(),
        };
        corelib::register_corelib(&mut vm);
        vm.rep("(def! *host-language* \"rust\")");
        vm.rep("(def! not (fn* [a] (if a false true)))");
        vm.rep(
            "(def! load-file (fn* [f] (eval (read-string (str \"(do \" (slurp f) \"\nnil)\")))))",
        );
        vm.rep(
            "(defmacro! cond (fn* [& xs] (if (> (count xs) 0) (list 'if (first xs) \
             (if (> (count xs) 1) (nth xs 1) (throw \"odd number of forms to cond\")) \
             (cons 'cond (rest (rest xs)))))))",
        );
        vm
    }

    pub fn global_env(&self) -> ObjRef {
        self.global_env
    }

    // ---- roots ----

    pub fn push_root(&mut self, v: Value) {
        if let Value::Obj(r) = v {
            self.runtime_roots.push(r);
        }
    }

    /// Pop the root pushed for `v`; a no-op for immediates, mirroring the
    /// push side.
    pub fn pop_root(&mut self, v: Value) {
        if let Value::Obj(_) = v {
            self.runtime_roots.pop();
        }
    }

    pub fn push_obj_root(&mut self, r: ObjRef) {
        self.runtime_roots.push(r);
    }

    pub fn pop_obj_root(&mut self) {
        self.runtime_roots.pop();
    }

    pub fn runtime_root_depth(&self) -> usize {
        self.runtime_roots.len()
    }

    pub(crate) fn push_compile_root(&mut self, v: Value) {
        if let Value::Obj(r) = v {
            self.compile_roots.push(r);
        }
    }

    pub fn clear_compile_roots(&mut self) {
        self.compile_roots.clear();
    }

    // ---- allocation ----

    /// The only way objects come into being. Runs a collection first when the
    /// byte counter would cross the threshold, so every value the caller
    /// still needs must already be rooted.
    pub fn alloc(&mut self, data: ObjData) -> ObjRef {
        if self.heap.wants_collect(heap::obj_size(&data)) {
            self.collect();
        }
        self.heap.insert(data)
    }

    pub fn collect(&mut self) {
        let before = self.heap.bytes_allocated();
        self.heap.mark_obj(self.current_env);
        for &r in &self.compile_roots {
            self.heap.mark_obj(r);
        }
        for &r in &self.runtime_roots {
            self.heap.mark_obj(r);
        }
        self.heap.trace();
        self.heap.purge_interned();
        let freed = self.heap.sweep();
        tracing::debug!(
            collected = before - self.heap.bytes_allocated(),
            in_use = self.heap.bytes_allocated(),
            next_gc = self.heap.next_gc(),
            freed,
            "gc cycle"
        );
    }

    // ---- constructors ----

    /// Content-interned: equal bytes, same object.
    pub fn intern(&mut self, s: &str) -> ObjRef {
        if let Some(r) = self.heap.lookup_interned(s) {
            return r;
        }
        let r = self.alloc(ObjData::Str(s.into()));
        self.heap.register_interned(r);
        r
    }

    pub fn make_string(&mut self, s: &str) -> Value {
        Value::Obj(self.intern(s))
    }

    pub fn make_symbol(&mut self, name: &str) -> Value {
        let n = self.intern(name);
        self.push_obj_root(n);
        let sym = self.alloc(ObjData::Symbol { name: n });
        self.pop_obj_root();
        Value::Obj(sym)
    }

    pub fn make_keyword(&mut self, name: &str) -> Value {
        let n = self.intern(name);
        self.push_obj_root(n);
        let kw = self.alloc(ObjData::Keyword { name: n });
        self.pop_obj_root();
        Value::Obj(kw)
    }

    /// The elements must be reachable from a root until the list exists.
    pub fn alloc_list(&mut self, items: Vec<Value>) -> ObjRef {
        self.alloc(ObjData::List {
            items,
            meta: Value::Nil,
        })
    }

    pub fn alloc_vector(&mut self, items: Vec<Value>) -> ObjRef {
        self.alloc(ObjData::Vector {
            items,
            meta: Value::Nil,
        })
    }

    pub fn alloc_map(&mut self) -> ObjRef {
        self.alloc(ObjData::Map {
            table: Default::default(),
            meta: Value::Nil,
        })
    }

    pub fn alloc_env(&mut self, outer: Option<ObjRef>) -> ObjRef {
        self.alloc(ObjData::Env {
            outer,
            bindings: HashMap::new(),
        })
    }

    pub fn alloc_closure(
        &mut self,
        env: ObjRef,
        params: Value,
        body: Value,
        is_macro: bool,
    ) -> ObjRef {
        self.alloc(ObjData::Closure {
            env,
            params,
            body,
            is_macro,
            meta: Value::Nil,
        })
    }

    pub fn alloc_atom(&mut self, v: Value) -> ObjRef {
        self.push_root(v);
        let r = self.alloc(ObjData::Atom { boxed: v });
        self.pop_root(v);
        r
    }

    /// An Exception carrying an arbitrary payload.
    pub fn exception_with(&mut self, payload: Value) -> ObjRef {
        self.push_root(payload);
        let r = self.alloc(ObjData::Exception { payload });
        self.pop_root(payload);
        r
    }

    /// An Exception carrying a message string.
    pub fn exception(&mut self, msg: impl AsRef<str>) -> ObjRef {
        let payload = self.make_string(msg.as_ref());
        self.exception_with(payload)
    }

    // ---- startup and driving ----

    /// Bind a native function under `name` in the global environment.
    pub fn register(&mut self, name: &str, func: NativeFn) {
        let key = self.intern(name);
        self.push_obj_root(key);
        let f = self.alloc(ObjData::Native {
            func,
            meta: Value::Nil,
        });
        self.heap.env_define(self.global_env, key, Value::Obj(f));
        self.pop_obj_root();
    }

    /// Read one form, evaluate it in the global environment, and print the
    /// result readably. Parse errors are rendered to stderr and yield the
    /// empty string; exceptions come back as `Exception: <payload>`.
    pub fn rep(&mut self, input: &str) -> String {
        let ast = match syntax::read_str(self, input) {
            Ok(v) => v,
            Err(e) => {
                self.clear_compile_roots();
                crate::errors::report(&e);
                return String::new();
            }
        };
        self.clear_compile_roots();
        if ast.is_none() {
            return String::new();
        }
        let result = eval::eval(self, ast, self.global_env);
        self.current_env = self.global_env;
        match result {
            Ok(v) => {
                self.push_root(v);
                let s = printer::print_string(self, v, true);
                self.pop_root(v);
                s
            }
            Err(exc) => {
                self.push_obj_root(exc);
                let payload = self.heap.exception_payload(exc);
                let s = printer::print_string(self, payload, false);
                self.pop_obj_root();
                format!("Exception: {}", s)
            }
        }
    }

    /// Bind `*ARGV*` and run a script through `load-file`.
    pub fn run_file(&mut self, path: &str, argv: &[String]) -> String {
        let argv_key = self.intern("*ARGV*");
        self.push_obj_root(argv_key);
        if argv.is_empty() {
            self.heap.env_define(self.global_env, argv_key, Value::Nil);
        } else {
            let l = self.alloc_list(vec![Value::Nil; argv.len()]);
            self.push_obj_root(l);
            for (i, arg) in argv.iter().enumerate() {
                let s = self.make_string(arg);
                self.heap.seq_set(l, i, s);
            }
            self.heap.env_define(self.global_env, argv_key, Value::Obj(l));
            self.pop_obj_root();
        }
        self.pop_obj_root();
        self.rep(&format!("(load-file \"{}\")", path))
    }
}

impl Default for Vm {
    fn default() -> Self {
        Vm::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn two_reads_of_one_literal_intern_to_the_same_object() {
        let mut vm = Vm::new();
        let a = vm.make_string("shared");
        let b = vm.make_string("shared");
        assert_eq!(a, b);
    }

    #[test]
    fn rooted_objects_survive_collection() {
        let mut vm = Vm::new();
        let l = vm.alloc_list(vec![Value::Number(1.0)]);
        vm.push_obj_root(l);
        for _ in 0..3 {
            vm.collect();
        }
        assert!(vm.heap.is_live(l));
        assert_eq!(vm.heap.seq_get(l, 0), Value::Number(1.0));
        vm.pop_obj_root();
    }

    #[test]
    fn unrooted_objects_are_reclaimed() {
        let mut vm = Vm::new();
        let baseline = {
            vm.collect();
            vm.heap.bytes_allocated()
        };
        for _ in 0..100 {
            vm.alloc_list(vec![Value::Number(0.0); 16]);
        }
        assert!(vm.heap.bytes_allocated() > baseline);
        vm.collect();
        assert_eq!(vm.heap.bytes_allocated(), baseline);
    }

    #[test]
    fn startup_defines_the_bootstrap_bindings() {
        let mut vm = Vm::new();
        assert_eq!(vm.rep("*host-language*"), "\"rust\"");
        assert_eq!(vm.rep("(not true)"), "false");
        assert_eq!(vm.rep("(not nil)"), "true");
    }
}
