//! The native builtin library.
//!
//! Builtin contracts:
//! - Arguments arrive pre-evaluated and stay rooted by the caller for the
//!   duration of the call; a builtin only roots values it creates itself.
//! - Failure is an Exception object returned through `Err`; the guard macros
//!   below construct one from a message and return early.
//! - Builtins that call back into the evaluator (`eval`, `apply`, `map`,
//!   `swap!`) go through [`eval::apply_value`], which saves and restores the
//!   current-environment pointer around the call.

use std::io::{BufRead, Write};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::eval;
use crate::heap::{ObjData, ObjRef};
use crate::printer::print_string;
use crate::syntax;
use crate::value::Value;
use crate::vm::{bail, ensure, EvalResult, NativeFn, Vm};

pub fn register_corelib(vm: &mut Vm) {
    vm.register("+", ADD);
    vm.register("-", SUB);
    vm.register("*", MUL);
    vm.register("/", DIV);
    vm.register("<", LT);
    vm.register("<=", LE);
    vm.register(">", GT);
    vm.register(">=", GE);
    vm.register("=", EQ);

    vm.register("pr-str", PR_STR);
    vm.register("str", STR);
    vm.register("prn", PRN);
    vm.register("println", PRINTLN);

    vm.register("list", LIST);
    vm.register("list?", LIST_P);
    vm.register("empty?", EMPTY_P);
    vm.register("count", COUNT);

    vm.register("read-string", READ_STRING);
    vm.register("slurp", SLURP);
    vm.register("eval", EVAL);

    vm.register("atom", ATOM);
    vm.register("atom?", ATOM_P);
    vm.register("deref", DEREF);
    vm.register("reset!", RESET);
    vm.register("swap!", SWAP);

    vm.register("cons", CONS);
    vm.register("concat", CONCAT);
    vm.register("nth", NTH);
    vm.register("first", FIRST);
    vm.register("rest", REST);

    vm.register("throw", THROW);
    vm.register("apply", APPLY);
    vm.register("map", MAP);

    vm.register("nil?", NIL_P);
    vm.register("true?", TRUE_P);
    vm.register("false?", FALSE_P);
    vm.register("symbol?", SYMBOL_P);
    vm.register("symbol", SYMBOL);
    vm.register("keyword", KEYWORD);
    vm.register("keyword?", KEYWORD_P);
    vm.register("vector", VECTOR);
    vm.register("vector?", VECTOR_P);
    vm.register("sequential?", SEQUENTIAL_P);
    vm.register("hash-map", HASH_MAP);
    vm.register("map?", MAP_P);

    vm.register("assoc", ASSOC);
    vm.register("dissoc", DISSOC);
    vm.register("get", GET);
    vm.register("contains?", CONTAINS_P);
    vm.register("keys", KEYS);
    vm.register("vals", VALS);

    vm.register("readline", READLINE);
    vm.register("time-ms", TIME_MS);
    vm.register("meta", META);
    vm.register("with-meta", WITH_META);
    vm.register("fn?", FN_P);
    vm.register("macro?", MACRO_P);
    vm.register("string?", STRING_P);
    vm.register("number?", NUMBER_P);
    vm.register("seq", SEQ);
    vm.register("conj", CONJ);

    vm.register("gc", GC);
}

macro_rules! one_arg {
    ($vm:expr, $args:expr, $name:expr) => {
        ensure!(
            $args.len() == 1,
            $vm,
            "RuntimeError: {} only needs one argument",
            $name
        );
    };
}

fn number_arg(vm: &mut Vm, v: Value, name: &str) -> Result<f64, ObjRef> {
    match v.as_number() {
        Some(n) => Ok(n),
        None => Err(vm.exception(format!("RuntimeError: {} arg is not a number", name))),
    }
}

fn string_ref(vm: &Vm, v: Value) -> Option<ObjRef> {
    match v {
        Value::Obj(r) if vm.heap.is_string(v) => Some(r),
        _ => None,
    }
}

fn map_ref(vm: &Vm, v: Value) -> Option<ObjRef> {
    match v {
        Value::Obj(r) if vm.heap.is_map(v) => Some(r),
        _ => None,
    }
}

fn fold_numbers(
    vm: &mut Vm,
    args: &[Value],
    name: &str,
    op: fn(f64, f64) -> f64,
) -> EvalResult {
    ensure!(
        !args.is_empty(),
        vm,
        "RuntimeError: {} needs at least one argument",
        name
    );
    let mut acc = number_arg(vm, args[0], name)?;
    for &a in &args[1..] {
        acc = op(acc, number_arg(vm, a, name)?);
    }
    Ok(Value::Number(acc))
}

fn chain_compare(
    vm: &mut Vm,
    args: &[Value],
    name: &str,
    holds: fn(f64, f64) -> bool,
) -> EvalResult {
    ensure!(
        !args.is_empty(),
        vm,
        "RuntimeError: {} needs at least one argument",
        name
    );
    let mut prev = number_arg(vm, args[0], name)?;
    for &a in &args[1..] {
        let n = number_arg(vm, a, name)?;
        if !holds(prev, n) {
            return Ok(Value::Bool(false));
        }
        prev = n;
    }
    Ok(Value::Bool(true))
}

/* ----- arithmetic and comparison ----- */

const ADD: NativeFn = |vm, args| fold_numbers(vm, args, "+", |a, b| a + b);
const SUB: NativeFn = |vm, args| fold_numbers(vm, args, "-", |a, b| a - b);
const MUL: NativeFn = |vm, args| fold_numbers(vm, args, "*", |a, b| a * b);
// IEEE-754 semantics: division by zero yields an infinity, not an error.
const DIV: NativeFn = |vm, args| fold_numbers(vm, args, "/", |a, b| a / b);

const LT: NativeFn = |vm, args| chain_compare(vm, args, "<", |a, b| a < b);
const LE: NativeFn = |vm, args| chain_compare(vm, args, "<=", |a, b| a <= b);
const GT: NativeFn = |vm, args| chain_compare(vm, args, ">", |a, b| a > b);
const GE: NativeFn = |vm, args| chain_compare(vm, args, ">=", |a, b| a >= b);

const EQ: NativeFn = |vm, args| {
    for w in args.windows(2) {
        if !vm.heap.value_eq(w[0], w[1]) {
            return Ok(Value::Bool(false));
        }
    }
    Ok(Value::Bool(true))
};

/* ----- printing ----- */

fn join_printed(vm: &mut Vm, args: &[Value], readably: bool, sep: &str) -> String {
    let mut out = String::new();
    for (i, &a) in args.iter().enumerate() {
        if i > 0 {
            out.push_str(sep);
        }
        out.push_str(&print_string(vm, a, readably));
    }
    out
}

const PR_STR: NativeFn = |vm, args| {
    let s = join_printed(vm, args, true, " ");
    Ok(vm.make_string(&s))
};

const STR: NativeFn = |vm, args| {
    let s = join_printed(vm, args, false, "");
    Ok(vm.make_string(&s))
};

const PRN: NativeFn = |vm, args| {
    println!("{}", join_printed(vm, args, true, " "));
    Ok(Value::Nil)
};

const PRINTLN: NativeFn = |vm, args| {
    println!("{}", join_printed(vm, args, false, " "));
    Ok(Value::Nil)
};

/* ----- lists and sequences ----- */

const LIST: NativeFn = |vm, args| Ok(Value::Obj(vm.alloc_list(args.to_vec())));

const LIST_P: NativeFn = |vm, args| {
    one_arg!(vm, args, "list?");
    Ok(Value::Bool(vm.heap.is_list(args[0])))
};

const EMPTY_P: NativeFn = |vm, args| {
    one_arg!(vm, args, "empty?");
    match vm.heap.seq_items(args[0]) {
        Some(items) => Ok(Value::Bool(items.is_empty())),
        None => Ok(Value::Bool(true)),
    }
};

const COUNT: NativeFn = |vm, args| {
    one_arg!(vm, args, "count");
    if let Some(items) = vm.heap.seq_items(args[0]) {
        return Ok(Value::Number(items.len() as f64));
    }
    match string_ref(vm, args[0]) {
        Some(r) => Ok(Value::Number(vm.heap.string(r).len() as f64)),
        None => Ok(Value::Number(0.0)),
    }
};

const CONS: NativeFn = |vm, args| {
    ensure!(args.len() == 2, vm, "RuntimeError: cons needs two arguments");
    let Some(l) = args[1].as_obj().filter(|_| vm.heap.is_list(args[1])) else {
        bail!(vm, "RuntimeError: cons 2nd arg is not a list");
    };
    let mut items = Vec::with_capacity(vm.heap.seq_len(l) + 1);
    items.push(args[0]);
    items.extend_from_slice(vm.heap.seq_slice(l));
    Ok(Value::Obj(vm.alloc_list(items)))
};

/// Splice every sequential argument, skip nils, keep everything else as-is.
fn concat_values(vm: &mut Vm, args: &[Value]) -> ObjRef {
    let mut out = Vec::new();
    for &v in args {
        if let Some(items) = vm.heap.seq_items(v) {
            out.extend_from_slice(items);
        } else if !v.is_nil() {
            out.push(v);
        }
    }
    vm.alloc_list(out)
}

const CONCAT: NativeFn = |vm, args| Ok(Value::Obj(concat_values(vm, args)));

const NTH: NativeFn = |vm, args| {
    ensure!(args.len() == 2, vm, "RuntimeError: nth needs two arguments");
    let Some(r) = args[0].as_obj().filter(|_| vm.heap.is_seq(args[0])) else {
        bail!(vm, "RuntimeError: nth arg is not listlike");
    };
    let idx = number_arg(vm, args[1], "nth")? as i64;
    let n = vm.heap.seq_len(r);
    if idx < 0 || idx as usize >= n {
        bail!(vm, "nth out of range ({}/{})", idx, n);
    }
    Ok(vm.heap.seq_get(r, idx as usize))
};

const FIRST: NativeFn = |vm, args| {
    one_arg!(vm, args, "first");
    if args[0].is_nil() {
        return Ok(Value::Nil);
    }
    let Some(items) = vm.heap.seq_items(args[0]) else {
        bail!(vm, "RuntimeError: first arg is not listlike");
    };
    Ok(items.first().copied().unwrap_or(Value::Nil))
};

const REST: NativeFn = |vm, args| {
    one_arg!(vm, args, "rest");
    if args[0].is_nil() {
        return Ok(Value::Obj(vm.alloc_list(Vec::new())));
    }
    let Some(items) = vm.heap.seq_items(args[0]) else {
        bail!(vm, "RuntimeError: rest arg is not listlike");
    };
    let tail: Vec<Value> = items.iter().skip(1).copied().collect();
    Ok(Value::Obj(vm.alloc_list(tail)))
};

const CONJ: NativeFn = |vm, args| {
    ensure!(!args.is_empty(), vm, "RuntimeError: conj first argument must be listlike");
    let Some(r) = args[0].as_obj().filter(|_| vm.heap.is_seq(args[0])) else {
        bail!(vm, "RuntimeError: conj first argument must be listlike");
    };
    if vm.heap.is_list(args[0]) {
        // Prepend, newest first.
        let mut items: Vec<Value> = args[1..].iter().rev().copied().collect();
        items.extend_from_slice(vm.heap.seq_slice(r));
        Ok(Value::Obj(vm.alloc_list(items)))
    } else {
        // Append in call order.
        let mut items = vm.heap.seq_slice(r).to_vec();
        items.extend_from_slice(&args[1..]);
        Ok(Value::Obj(vm.alloc_vector(items)))
    }
};

const SEQ: NativeFn = |vm, args| {
    one_arg!(vm, args, "seq");
    let v = args[0];
    if v.is_nil() {
        return Ok(v);
    }
    if vm.heap.is_list(v) {
        let empty = vm.heap.seq_items(v).map_or(true, |i| i.is_empty());
        return Ok(if empty { Value::Nil } else { v });
    }
    if vm.heap.is_vector(v) {
        let items = vm.heap.seq_items(v).map(|i| i.to_vec()).unwrap_or_default();
        if items.is_empty() {
            return Ok(Value::Nil);
        }
        return Ok(Value::Obj(vm.alloc_list(items)));
    }
    if let Some(r) = string_ref(vm, v) {
        let chars: Vec<String> = vm.heap.string(r).chars().map(String::from).collect();
        if chars.is_empty() {
            return Ok(Value::Nil);
        }
        let l = vm.alloc_list(vec![Value::Nil; chars.len()]);
        vm.push_obj_root(l);
        for (i, c) in chars.iter().enumerate() {
            let s = vm.make_string(c);
            vm.heap.seq_set(l, i, s);
        }
        vm.pop_obj_root();
        return Ok(Value::Obj(l));
    }
    bail!(vm, "RuntimeError: seq type not support")
};

/* ----- reading and evaluation ----- */

const READ_STRING: NativeFn = |vm, args| {
    one_arg!(vm, args, "read-string");
    let Some(r) = string_ref(vm, args[0]) else {
        bail!(vm, "RuntimeError: read-string arg is not string");
    };
    let source = vm.heap.string(r).to_string();
    let result = syntax::read_str(vm, &source);
    vm.clear_compile_roots();
    match result {
        Ok(v) => Ok(v),
        Err(e) => Err(vm.exception(e.to_string())),
    }
};

const SLURP: NativeFn = |vm, args| {
    one_arg!(vm, args, "slurp");
    let Some(r) = string_ref(vm, args[0]) else {
        bail!(vm, "RuntimeError: slurp arg is not string");
    };
    let path = vm.heap.string(r).to_string();
    match std::fs::read_to_string(&path) {
        Ok(content) => Ok(vm.make_string(&content)),
        Err(_) => Ok(Value::Nil),
    }
};

/// `eval` runs its argument in the global environment, not the caller's.
const EVAL: NativeFn = |vm, args| {
    let form = args.first().copied().unwrap_or(Value::Nil);
    let env = vm.global_env();
    eval::eval(vm, form, env)
};

const THROW: NativeFn = |vm, args| {
    one_arg!(vm, args, "throw");
    Err(vm.exception_with(args[0]))
};

const APPLY: NativeFn = |vm, args| {
    ensure!(
        !args.is_empty() && vm.heap.is_callable(args[0]),
        vm,
        "RuntimeError: apply arg is not callable"
    );
    let flat = concat_values(vm, &args[1..]);
    vm.push_obj_root(flat);
    let call_args = vm.heap.seq_slice(flat).to_vec();
    let ret = eval::apply_value(vm, args[0], &call_args);
    vm.pop_obj_root();
    ret
};

const MAP: NativeFn = |vm, args| {
    ensure!(
        !args.is_empty() && vm.heap.is_callable(args[0]),
        vm,
        "RuntimeError: map arg is not callable"
    );
    let flat = concat_values(vm, &args[1..]);
    vm.push_obj_root(flat);
    let n = vm.heap.seq_len(flat);
    let out = vm.alloc_list(vec![Value::Nil; n]);
    vm.push_obj_root(out);
    for i in 0..n {
        let item = vm.heap.seq_get(flat, i);
        match eval::apply_value(vm, args[0], &[item]) {
            Ok(v) => vm.heap.seq_set(out, i, v),
            Err(e) => {
                vm.pop_obj_root();
                vm.pop_obj_root();
                return Err(e);
            }
        }
    }
    vm.pop_obj_root();
    vm.pop_obj_root();
    Ok(Value::Obj(out))
};

/* ----- atoms ----- */

const ATOM: NativeFn = |vm, args| {
    one_arg!(vm, args, "atom");
    Ok(Value::Obj(vm.alloc_atom(args[0])))
};

const ATOM_P: NativeFn = |vm, args| {
    one_arg!(vm, args, "atom?");
    Ok(Value::Bool(vm.heap.is_atom(args[0])))
};

const DEREF: NativeFn = |vm, args| {
    one_arg!(vm, args, "deref");
    let Some(a) = args[0].as_obj().filter(|_| vm.heap.is_atom(args[0])) else {
        bail!(vm, "RuntimeError: deref arg is not an atom");
    };
    Ok(vm.heap.atom_get(a))
};

const RESET: NativeFn = |vm, args| {
    ensure!(args.len() == 2, vm, "RuntimeError: reset! needs two arguments");
    let Some(a) = args[0].as_obj().filter(|_| vm.heap.is_atom(args[0])) else {
        bail!(vm, "RuntimeError: reset! arg is not an atom");
    };
    vm.heap.atom_set(a, args[1]);
    Ok(args[1])
};

/// `(swap! a f x y)` sets `a` to `(f @a x y)` and returns the new value.
/// If the function raises, the atom is left unchanged.
const SWAP: NativeFn = |vm, args| {
    ensure!(args.len() >= 2, vm, "RuntimeError: swap! needs at least two arguments");
    let Some(a) = args[0].as_obj().filter(|_| vm.heap.is_atom(args[0])) else {
        bail!(vm, "RuntimeError: swap! arg is not an atom");
    };
    ensure!(
        vm.heap.is_callable(args[1]),
        vm,
        "RuntimeError: swap! 2nd arg is not callable"
    );
    let mut call_args = Vec::with_capacity(args.len() - 1);
    call_args.push(vm.heap.atom_get(a));
    call_args.extend_from_slice(&args[2..]);
    let ret = eval::apply_value(vm, args[1], &call_args)?;
    vm.heap.atom_set(a, ret);
    Ok(ret)
};

/* ----- predicates ----- */

const NIL_P: NativeFn = |vm, args| {
    one_arg!(vm, args, "nil?");
    Ok(Value::Bool(args[0].is_nil()))
};

const TRUE_P: NativeFn = |vm, args| {
    one_arg!(vm, args, "true?");
    Ok(Value::Bool(args[0] == Value::Bool(true)))
};

const FALSE_P: NativeFn = |vm, args| {
    one_arg!(vm, args, "false?");
    Ok(Value::Bool(args[0] == Value::Bool(false)))
};

const SYMBOL_P: NativeFn = |vm, args| {
    one_arg!(vm, args, "symbol?");
    Ok(Value::Bool(vm.heap.is_symbol(args[0])))
};

const KEYWORD_P: NativeFn = |vm, args| {
    one_arg!(vm, args, "keyword?");
    Ok(Value::Bool(vm.heap.is_keyword(args[0])))
};

const VECTOR_P: NativeFn = |vm, args| {
    one_arg!(vm, args, "vector?");
    Ok(Value::Bool(vm.heap.is_vector(args[0])))
};

const SEQUENTIAL_P: NativeFn = |vm, args| {
    one_arg!(vm, args, "sequential?");
    Ok(Value::Bool(vm.heap.is_pair(args[0])))
};

const MAP_P: NativeFn = |vm, args| {
    one_arg!(vm, args, "map?");
    Ok(Value::Bool(vm.heap.is_map(args[0])))
};

const FN_P: NativeFn = |vm, args| {
    one_arg!(vm, args, "fn?");
    Ok(Value::Bool(vm.heap.is_callable(args[0])))
};

const MACRO_P: NativeFn = |vm, args| {
    one_arg!(vm, args, "macro?");
    Ok(Value::Bool(vm.heap.is_macro(args[0])))
};

const STRING_P: NativeFn = |vm, args| {
    one_arg!(vm, args, "string?");
    Ok(Value::Bool(vm.heap.is_string(args[0])))
};

const NUMBER_P: NativeFn = |vm, args| {
    one_arg!(vm, args, "number?");
    Ok(Value::Bool(args[0].as_number().is_some()))
};

/* ----- symbols and keywords ----- */

const SYMBOL: NativeFn = |vm, args| {
    one_arg!(vm, args, "symbol");
    let Some(r) = string_ref(vm, args[0]) else {
        bail!(vm, "RuntimeError: symbol arg is not a string");
    };
    let sym = vm.alloc(ObjData::Symbol { name: r });
    Ok(Value::Obj(sym))
};

const KEYWORD: NativeFn = |vm, args| {
    one_arg!(vm, args, "keyword");
    let Some(r) = string_ref(vm, args[0]) else {
        bail!(vm, "RuntimeError: keyword arg is not a string");
    };
    // Keyword names always carry their leading colon.
    let name = if vm.heap.string(r).starts_with(':') {
        r
    } else {
        let text = format!(":{}", vm.heap.string(r));
        vm.intern(&text)
    };
    vm.push_obj_root(name);
    let kw = vm.alloc(ObjData::Keyword { name });
    vm.pop_obj_root();
    Ok(Value::Obj(kw))
};

/* ----- vectors and maps ----- */

const VECTOR: NativeFn = |vm, args| Ok(Value::Obj(vm.alloc_vector(args.to_vec())));

const HASH_MAP: NativeFn = |vm, args| {
    ensure!(
        args.len() % 2 == 0,
        vm,
        "RuntimeError: hash-map needs an even number of args"
    );
    let m = vm.alloc_map();
    vm.push_obj_root(m);
    for kv in args.chunks(2) {
        vm.heap.map_insert(m, kv[0], kv[1]);
    }
    vm.pop_obj_root();
    Ok(Value::Obj(m))
};

const ASSOC: NativeFn = |vm, args| {
    let Some(m) = args.first().and_then(|&v| map_ref(vm, v)) else {
        bail!(vm, "RuntimeError: assoc first arg is not a map");
    };
    ensure!(
        args.len() > 1 && (args.len() - 1) % 2 == 0,
        vm,
        "RuntimeError: assoc needs an even number of key/value args"
    );
    let out = vm.alloc_map();
    vm.push_obj_root(out);
    for (k, v) in vm.heap.map_entries(m) {
        vm.heap.map_insert(out, k, v);
    }
    for kv in args[1..].chunks(2) {
        vm.heap.map_insert(out, kv[0], kv[1]);
    }
    vm.pop_obj_root();
    Ok(Value::Obj(out))
};

const DISSOC: NativeFn = |vm, args| {
    let Some(m) = args.first().and_then(|&v| map_ref(vm, v)) else {
        bail!(vm, "RuntimeError: dissoc first arg is not a map");
    };
    // The clone keeps the original's meta.
    let meta = vm.heap.meta(args[0]).unwrap_or(Value::Nil);
    let out = vm.alloc(ObjData::Map {
        table: Default::default(),
        meta,
    });
    vm.push_obj_root(out);
    for (k, v) in vm.heap.map_entries(m) {
        vm.heap.map_insert(out, k, v);
    }
    for &k in &args[1..] {
        vm.heap.map_remove(out, k);
    }
    vm.pop_obj_root();
    Ok(Value::Obj(out))
};

const GET: NativeFn = |vm, args| {
    let Some(m) = args.first().and_then(|&v| map_ref(vm, v)) else {
        bail!(vm, "RuntimeError: get first arg is not a map");
    };
    let key = args.get(1).copied().unwrap_or(Value::Nil);
    Ok(vm.heap.map_get(m, key).unwrap_or(Value::Nil))
};

const CONTAINS_P: NativeFn = |vm, args| {
    let Some(m) = args.first().and_then(|&v| map_ref(vm, v)) else {
        bail!(vm, "RuntimeError: contains? first arg is not a map");
    };
    let key = args.get(1).copied().unwrap_or(Value::Nil);
    Ok(Value::Bool(vm.heap.map_get(m, key).is_some()))
};

const KEYS: NativeFn = |vm, args| {
    one_arg!(vm, args, "keys");
    let Some(m) = map_ref(vm, args[0]) else {
        bail!(vm, "RuntimeError: keys arg is not a map");
    };
    let keys: Vec<Value> = vm.heap.map_entries(m).into_iter().map(|(k, _)| k).collect();
    Ok(Value::Obj(vm.alloc_list(keys)))
};

const VALS: NativeFn = |vm, args| {
    one_arg!(vm, args, "vals");
    let Some(m) = map_ref(vm, args[0]) else {
        bail!(vm, "RuntimeError: vals arg is not a map");
    };
    let vals: Vec<Value> = vm.heap.map_entries(m).into_iter().map(|(_, v)| v).collect();
    Ok(Value::Obj(vm.alloc_list(vals)))
};

/* ----- meta ----- */

const META: NativeFn = |vm, args| {
    one_arg!(vm, args, "meta");
    match vm.heap.meta(args[0]) {
        Some(m) => Ok(m),
        None => bail!(vm, "RuntimeError: base type doesn't have meta value"),
    }
};

const WITH_META: NativeFn = |vm, args| {
    ensure!(args.len() == 2, vm, "RuntimeError: with-meta needs two arguments");
    let meta = args[1];
    enum CloneKind {
        List(Vec<Value>),
        Vector(Vec<Value>),
        Map(ObjRef),
        Native(NativeFn),
        Closure(ObjRef, Value, Value, bool),
        Other,
    }
    let kind = match args[0] {
        Value::Obj(r) => match &vm.heap.get(r).data {
            ObjData::List { items, .. } => CloneKind::List(items.clone()),
            ObjData::Vector { items, .. } => CloneKind::Vector(items.clone()),
            ObjData::Map { .. } => CloneKind::Map(r),
            ObjData::Native { func, .. } => CloneKind::Native(*func),
            ObjData::Closure {
                env,
                params,
                body,
                is_macro,
                ..
            } => CloneKind::Closure(*env, *params, *body, *is_macro),
            _ => CloneKind::Other,
        },
        _ => CloneKind::Other,
    };
    let cloned = match kind {
        CloneKind::List(items) => vm.alloc(ObjData::List { items, meta }),
        CloneKind::Vector(items) => vm.alloc(ObjData::Vector { items, meta }),
        CloneKind::Map(m) => {
            let out = vm.alloc(ObjData::Map {
                table: Default::default(),
                meta,
            });
            vm.push_obj_root(out);
            for (k, v) in vm.heap.map_entries(m) {
                vm.heap.map_insert(out, k, v);
            }
            vm.pop_obj_root();
            out
        }
        CloneKind::Native(func) => vm.alloc(ObjData::Native { func, meta }),
        CloneKind::Closure(env, params, body, is_macro) => vm.alloc(ObjData::Closure {
            env,
            params,
            body,
            is_macro,
            meta,
        }),
        CloneKind::Other => {
            bail!(vm, "RuntimeError: base type doesn't have meta value")
        }
    };
    Ok(Value::Obj(cloned))
};

/* ----- host I/O and time ----- */

const READLINE: NativeFn = |vm, args| {
    one_arg!(vm, args, "readline");
    let Some(r) = string_ref(vm, args[0]) else {
        bail!(vm, "RuntimeError: readline arg is not a string");
    };
    print!("{}", vm.heap.string(r));
    let _ = std::io::stdout().flush();
    let mut line = String::new();
    match std::io::stdin().lock().read_line(&mut line) {
        Ok(0) | Err(_) => Ok(Value::Nil),
        Ok(_) => {
            let trimmed = line.strip_suffix('\n').unwrap_or(&line);
            Ok(vm.make_string(trimmed))
        }
    }
};

const TIME_MS: NativeFn = |_vm, _args| {
    let ms = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as f64)
        .unwrap_or(0.0);
    Ok(Value::Number(ms))
};

const GC: NativeFn = |vm, _args| {
    vm.collect();
    Ok(Value::Nil)
};
