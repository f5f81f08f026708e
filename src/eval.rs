//! The evaluator.
//!
//! `eval` walks value trees, resolves symbols through the lexical
//! environment chain, dispatches special forms, expands macros, and applies
//! closures and native functions. Tail positions (`do`, `if`, `let*`,
//! `try*`, closure bodies, and quasiquote results) rebind `(value, env)` and
//! continue the dispatch loop instead of recursing, so tail recursion runs in
//! constant host-stack space.
//!
//! Rooting: each loop iteration pins the environment (when it changes) and
//! the form under evaluation on the runtime-root stack. `eval` records the
//! root and frame heights on entry and restores them on every exit path.
//! Same-closure tail recursion at the same call depth truncates the root
//! stack back to the frame's high-water mark so roots do not accumulate
//! across a million-iteration loop.

use crate::heap::{ObjData, ObjRef};
use crate::value::Value;
use crate::vm::{bail, ClosureFrame, EvalResult, NativeFn, Vm};

enum Form {
    Def,
    Let,
    Do,
    If,
    Fn,
    Quote,
    Quasiquote,
    Defmacro,
    Macroexpand,
    Try,
}

fn special_form(vm: &Vm, head: Value) -> Option<Form> {
    let name = vm.heap.symbol_name(head)?;
    match vm.heap.string(name) {
        "def!" => Some(Form::Def),
        "let*" => Some(Form::Let),
        "do" => Some(Form::Do),
        "if" => Some(Form::If),
        "fn*" => Some(Form::Fn),
        "quote" => Some(Form::Quote),
        "quasiquote" => Some(Form::Quasiquote),
        "defmacro!" => Some(Form::Defmacro),
        "macroexpand" => Some(Form::Macroexpand),
        "try*" => Some(Form::Try),
        _ => None,
    }
}

fn seq_ref(vm: &Vm, v: Value) -> Option<ObjRef> {
    match v {
        Value::Obj(r) if vm.heap.is_seq(v) => Some(r),
        _ => None,
    }
}

/// Evaluate `value` in `env`. `Err` carries the Exception object in flight.
pub fn eval(vm: &mut Vm, value: Value, env: ObjRef) -> EvalResult {
    vm.call_depth += 1;
    let old_env = vm.current_env;
    let root_base = vm.runtime_roots.len();
    let frame_base = vm.closure_frames.len();
    let result = eval_loop(vm, value, env);
    vm.closure_frames.truncate(frame_base);
    vm.runtime_roots.truncate(root_base);
    vm.current_env = old_env;
    vm.call_depth -= 1;
    result
}

fn eval_loop(vm: &mut Vm, mut value: Value, mut env: ObjRef) -> EvalResult {
    enum Shape {
        List(ObjRef),
        Vector(ObjRef),
        Map(ObjRef),
        Leaf,
    }
    enum Callee {
        Closure(ObjRef),
        Native(NativeFn),
        Other,
    }

    loop {
        if vm.current_env != env {
            vm.current_env = env;
            vm.push_obj_root(env);
        }
        vm.push_root(value);

        let shape = match value {
            Value::Obj(r) => match &vm.heap.get(r).data {
                ObjData::List { .. } => Shape::List(r),
                ObjData::Vector { .. } => Shape::Vector(r),
                ObjData::Map { .. } => Shape::Map(r),
                _ => Shape::Leaf,
            },
            _ => Shape::Leaf,
        };

        let lref = match shape {
            Shape::List(r) => r,
            Shape::Vector(r) => return eval_vector(vm, r, env),
            Shape::Map(r) => return eval_map(vm, r, env),
            Shape::Leaf => return eval_leaf(vm, value, env),
        };

        let len = vm.heap.seq_len(lref);
        if len == 0 {
            return Ok(value);
        }

        let (expanded, new_value) = macro_expand(vm, value, env)?;
        if expanded {
            value = new_value;
            continue;
        }

        let head = vm.heap.seq_get(lref, 0);
        if let Some(form) = special_form(vm, head) {
            match form {
                Form::Def => {
                    let key = vm.heap.seq_get(lref, 1);
                    let expr = vm.heap.seq_get(lref, 2);
                    // Evaluate first: on exception the binding is not made.
                    let val = eval(vm, expr, env)?;
                    let Some(name) = vm.heap.symbol_name(key) else {
                        bail!(vm, "RuntimeError: def! key is not a symbol");
                    };
                    vm.heap.env_define(env, name, val);
                    return Ok(val);
                }

                Form::Let => {
                    let new_env = vm.alloc_env(Some(env));
                    vm.push_obj_root(new_env);
                    let bindings = vm.heap.seq_get(lref, 1);
                    let Some(bref) = seq_ref(vm, bindings) else {
                        vm.pop_obj_root();
                        bail!(vm, "RuntimeError: let* bindings must be a list or vector");
                    };
                    let n = vm.heap.seq_len(bref);
                    // Sequential: later pairs see earlier bindings.
                    for i in (0..n).step_by(2) {
                        let key = vm.heap.seq_get(bref, i);
                        let expr = vm.heap.seq_get(bref, i + 1);
                        let val = match eval(vm, expr, new_env) {
                            Ok(v) => v,
                            Err(e) => {
                                vm.pop_obj_root();
                                return Err(e);
                            }
                        };
                        let Some(name) = vm.heap.symbol_name(key) else {
                            vm.pop_obj_root();
                            bail!(vm, "RuntimeError: let* binding key is not a symbol");
                        };
                        vm.heap.env_define(new_env, name, val);
                    }
                    value = vm.heap.seq_get(lref, 2);
                    env = new_env;
                    vm.pop_obj_root();
                    continue;
                }

                Form::Do => {
                    if len == 1 {
                        return Ok(Value::Nil);
                    }
                    for i in 1..len - 1 {
                        let child = vm.heap.seq_get(lref, i);
                        eval(vm, child, env)?;
                    }
                    value = vm.heap.seq_get(lref, len - 1);
                    continue;
                }

                Form::If => {
                    let cond = vm.heap.seq_get(lref, 1);
                    let test = eval(vm, cond, env)?;
                    if test.is_truthy() {
                        value = vm.heap.seq_get(lref, 2);
                    } else if len == 4 {
                        value = vm.heap.seq_get(lref, 3);
                    } else {
                        return Ok(Value::Nil);
                    }
                    continue;
                }

                Form::Fn => {
                    let params = vm.heap.seq_get(lref, 1);
                    let body = vm.heap.seq_get(lref, 2);
                    let clo = vm.alloc_closure(env, params, body, false);
                    return Ok(Value::Obj(clo));
                }

                Form::Quote => return Ok(vm.heap.seq_get(lref, 1)),

                Form::Quasiquote => {
                    let arg = vm.heap.seq_get(lref, 1);
                    value = quasiquote(vm, arg);
                    continue;
                }

                Form::Defmacro => {
                    let expr = vm.heap.seq_get(lref, 2);
                    let evaluated = eval(vm, expr, env)?;
                    let Some(cref) = evaluated.as_obj().filter(|_| vm.heap.is_closure(evaluated))
                    else {
                        bail!(vm, "RuntimeError: defmacro! body is not a closure");
                    };
                    vm.push_root(evaluated);
                    let (cenv, params, body, _) = vm.heap.closure_parts(cref);
                    let meta = vm.heap.meta(evaluated).unwrap_or(Value::Nil);
                    let clone = vm.alloc(ObjData::Closure {
                        env: cenv,
                        params,
                        body,
                        is_macro: true,
                        meta,
                    });
                    vm.pop_root(evaluated);
                    let key = vm.heap.seq_get(lref, 1);
                    let Some(name) = vm.heap.symbol_name(key) else {
                        bail!(vm, "RuntimeError: defmacro! key is not a symbol");
                    };
                    vm.heap.env_define(env, name, Value::Obj(clone));
                    return Ok(Value::Obj(clone));
                }

                Form::Macroexpand => {
                    let target = vm.heap.seq_get(lref, 1);
                    let (_, expanded) = macro_expand(vm, target, env)?;
                    return Ok(expanded);
                }

                Form::Try => {
                    let body = vm.heap.seq_get(lref, 1);
                    match eval(vm, body, env) {
                        Ok(v) => return Ok(v),
                        Err(exc) => {
                            if len < 3 {
                                return Err(exc);
                            }
                            let catch = vm.heap.seq_get(lref, 2);
                            let Some(cref) =
                                seq_ref(vm, catch).filter(|&r| vm.heap.seq_len(r) > 0)
                            else {
                                return Err(exc);
                            };
                            if !vm.heap.symbol_is(vm.heap.seq_get(cref, 0), "catch*") {
                                return Err(exc);
                            }
                            // The in-flight exception must survive the
                            // handler environment's allocation.
                            vm.push_obj_root(exc);
                            let new_env = vm.alloc_env(Some(env));
                            vm.pop_obj_root();
                            vm.push_obj_root(new_env);
                            let sym = vm.heap.seq_get(cref, 1);
                            let Some(name) = vm.heap.symbol_name(sym) else {
                                vm.pop_obj_root();
                                bail!(vm, "RuntimeError: catch* key is not a symbol");
                            };
                            let payload = vm.heap.exception_payload(exc);
                            vm.heap.env_define(new_env, name, payload);
                            value = vm.heap.seq_get(cref, 2);
                            env = new_env;
                            vm.pop_obj_root();
                            continue;
                        }
                    }
                }
            }
        }

        // Not a special form: evaluate every element, then apply.
        let call = eval_list_elements(vm, lref, env)?;
        vm.push_obj_root(call);
        let callee = vm.heap.seq_get(call, 0);
        let kind = match callee {
            Value::Obj(r) => match &vm.heap.get(r).data {
                ObjData::Closure { .. } => Callee::Closure(r),
                ObjData::Native { func, .. } => Callee::Native(*func),
                _ => Callee::Other,
            },
            _ => Callee::Other,
        };
        match kind {
            Callee::Closure(cref) => {
                let (cenv, params, _, _) = vm.heap.closure_parts(cref);
                let args: Vec<Value> = vm.heap.seq_slice(call)[1..].to_vec();
                let new_env = vm.alloc_env(Some(cenv));
                vm.push_obj_root(new_env);
                if let Err(e) = bind_params(vm, new_env, params, &args) {
                    vm.pop_obj_root();
                    vm.pop_obj_root();
                    return Err(e);
                }
                let (_, _, body, _) = vm.heap.closure_parts(cref);
                env = new_env;
                value = body;
                vm.pop_obj_root(); // new_env
                vm.pop_obj_root(); // call

                // Self tail-recursion at the same depth reuses the existing
                // frame and reclaims the roots pushed since it was recorded.
                let tail_mark = match vm.closure_frames.last() {
                    Some(f) if f.call_depth == vm.call_depth && f.closure == cref => {
                        Some(f.root_mark)
                    }
                    _ => None,
                };
                match tail_mark {
                    Some(mark) => vm.runtime_roots.truncate(mark),
                    None => vm.closure_frames.push(ClosureFrame {
                        closure: cref,
                        call_depth: vm.call_depth,
                        root_mark: vm.runtime_roots.len(),
                    }),
                }
                continue;
            }
            Callee::Native(func) => {
                let args: Vec<Value> = vm.heap.seq_slice(call)[1..].to_vec();
                let saved = vm.current_env;
                vm.push_obj_root(saved);
                let ret = func(vm, &args);
                vm.current_env = saved;
                vm.pop_obj_root();
                vm.pop_obj_root(); // call
                return ret;
            }
            Callee::Other => {
                vm.pop_obj_root();
                bail!(vm, "RuntimeError: value is not callable!");
            }
        }
    }
}

/// Non-list, non-seq dispatch: symbols resolve through the environment
/// chain, everything else evaluates to itself.
fn eval_leaf(vm: &mut Vm, value: Value, env: ObjRef) -> EvalResult {
    if let Some(name) = vm.heap.symbol_name(value) {
        match vm.heap.env_get(env, name) {
            Some(v) => Ok(v),
            None => {
                let text = vm.heap.string(name).to_string();
                bail!(vm, "RuntimeError: symbol ({}) not found in env", text)
            }
        }
    } else {
        Ok(value)
    }
}

/// Evaluate every element of a list into a fresh list of the same length.
fn eval_list_elements(vm: &mut Vm, lref: ObjRef, env: ObjRef) -> Result<ObjRef, ObjRef> {
    let len = vm.heap.seq_len(lref);
    let out = vm.alloc_list(vec![Value::Nil; len]);
    vm.push_obj_root(out);
    for i in 0..len {
        let child = vm.heap.seq_get(lref, i);
        match eval(vm, child, env) {
            Ok(v) => vm.heap.seq_set(out, i, v),
            Err(e) => {
                vm.pop_obj_root();
                return Err(e);
            }
        }
    }
    vm.pop_obj_root();
    Ok(out)
}

fn eval_vector(vm: &mut Vm, vref: ObjRef, env: ObjRef) -> EvalResult {
    let len = vm.heap.seq_len(vref);
    let out = vm.alloc_vector(vec![Value::Nil; len]);
    vm.push_obj_root(out);
    for i in 0..len {
        let child = vm.heap.seq_get(vref, i);
        match eval(vm, child, env) {
            Ok(v) => vm.heap.seq_set(out, i, v),
            Err(e) => {
                vm.pop_obj_root();
                return Err(e);
            }
        }
    }
    vm.pop_obj_root();
    Ok(Value::Obj(out))
}

/// Keys are carried over unchanged; only the values are evaluated.
fn eval_map(vm: &mut Vm, mref: ObjRef, env: ObjRef) -> EvalResult {
    let out = vm.alloc_map();
    vm.push_obj_root(out);
    for (k, v) in vm.heap.map_entries(mref) {
        match eval(vm, v, env) {
            Ok(nv) => vm.heap.map_insert(out, k, nv),
            Err(e) => {
                vm.pop_obj_root();
                return Err(e);
            }
        }
    }
    vm.pop_obj_root();
    Ok(Value::Obj(out))
}

/// A list whose head symbol resolves to a closure with the macro flag set.
fn macro_callee(vm: &Vm, value: Value, env: ObjRef) -> Option<ObjRef> {
    if !vm.heap.is_list(value) {
        return None;
    }
    let lref = value.as_obj()?;
    if vm.heap.seq_len(lref) == 0 {
        return None;
    }
    let head = vm.heap.seq_get(lref, 0);
    let name = vm.heap.symbol_name(head)?;
    let bound = vm.heap.env_get(env, name)?;
    match bound {
        Value::Obj(r) if vm.heap.is_macro(bound) => Some(r),
        _ => None,
    }
}

/// Repeatedly invoke the head macro on the unevaluated tail until the form is
/// no longer a macro call. Returns whether any expansion happened.
pub fn macro_expand(vm: &mut Vm, mut value: Value, env: ObjRef) -> Result<(bool, Value), ObjRef> {
    let mut expanded = false;
    while let Some(cref) = macro_callee(vm, value, env) {
        expanded = true;
        vm.push_root(value);
        let args: Vec<Value> = match value.as_obj() {
            Some(l) => vm.heap.seq_slice(l)[1..].to_vec(),
            None => Vec::new(),
        };
        let result = call_closure(vm, cref, &args);
        vm.pop_root(value);
        value = result?;
    }
    Ok((expanded, value))
}

/// Quasiquote transform:
/// - non-pair `q` -> `(quote q)`
/// - `(unquote x)` -> `x`
/// - `((splice-unquote x) ...rest)` -> `(concat x quasi(rest))`
/// - otherwise -> `(cons quasi(head) quasi(rest))`
fn quasiquote(vm: &mut Vm, q: Value) -> Value {
    let Some(qref) = seq_ref(vm, q).filter(|&r| vm.heap.seq_len(r) > 0) else {
        let sym = vm.make_symbol("quote");
        vm.push_root(sym);
        let ret = vm.alloc_list(vec![sym, q]);
        vm.pop_root(sym);
        return Value::Obj(ret);
    };

    let first = vm.heap.seq_get(qref, 0);
    if vm.heap.symbol_is(first, "unquote") {
        return vm.heap.seq_get(qref, 1);
    }

    if let Some(fref) = seq_ref(vm, first).filter(|&r| vm.heap.seq_len(r) > 0) {
        if vm.heap.symbol_is(vm.heap.seq_get(fref, 0), "splice-unquote") {
            let sym = vm.make_symbol("concat");
            vm.push_root(sym);
            let spliced = vm.heap.seq_get(fref, 1);
            let rest_items = vm.heap.seq_slice(qref)[1..].to_vec();
            let rest = Value::Obj(vm.alloc_list(rest_items));
            vm.push_root(rest);
            let handled_rest = quasiquote(vm, rest);
            vm.pop_root(rest);
            vm.push_root(handled_rest);
            let ret = vm.alloc_list(vec![sym, spliced, handled_rest]);
            vm.pop_root(handled_rest);
            vm.pop_root(sym);
            return Value::Obj(ret);
        }
    }

    let sym = vm.make_symbol("cons");
    vm.push_root(sym);
    let handled_first = quasiquote(vm, first);
    vm.push_root(handled_first);
    let rest_items = vm.heap.seq_slice(qref)[1..].to_vec();
    let rest = Value::Obj(vm.alloc_list(rest_items));
    vm.push_root(rest);
    let handled_rest = quasiquote(vm, rest);
    vm.pop_root(rest);
    vm.push_root(handled_rest);
    let ret = vm.alloc_list(vec![sym, handled_first, handled_rest]);
    vm.pop_root(handled_rest);
    vm.pop_root(handled_first);
    vm.pop_root(sym);
    Value::Obj(ret)
}

fn bind_params(vm: &mut Vm, env: ObjRef, params: Value, args: &[Value]) -> Result<(), ObjRef> {
    let Some(pref) = seq_ref(vm, params) else {
        bail!(vm, "RuntimeError: fn* params must be a list or vector");
    };
    let n = vm.heap.seq_len(pref);
    for i in 0..n {
        let p = vm.heap.seq_get(pref, i);
        let Some(name) = vm.heap.symbol_name(p) else {
            bail!(vm, "RuntimeError: fn* param is not a symbol");
        };
        // `&` binds the remaining arguments as a fresh list.
        if vm.heap.string(name) == "&" {
            let rest_p = vm.heap.seq_get(pref, i + 1);
            let Some(rest_name) = vm.heap.symbol_name(rest_p) else {
                bail!(vm, "RuntimeError: fn* param is not a symbol");
            };
            if i < args.len() {
                let rest = vm.alloc_list(args[i..].to_vec());
                vm.heap.env_define(env, rest_name, Value::Obj(rest));
            } else {
                vm.heap.env_define(env, rest_name, Value::Nil);
            }
            break;
        }
        let v = args.get(i).copied().unwrap_or(Value::Nil);
        vm.heap.env_define(env, name, v);
    }
    Ok(())
}

fn call_closure(vm: &mut Vm, cref: ObjRef, args: &[Value]) -> EvalResult {
    let (cenv, params, body, _) = vm.heap.closure_parts(cref);
    let new_env = vm.alloc_env(Some(cenv));
    vm.push_obj_root(new_env);
    if let Err(e) = bind_params(vm, new_env, params, args) {
        vm.pop_obj_root();
        return Err(e);
    }
    let result = eval(vm, body, new_env);
    vm.pop_obj_root();
    result
}

/// Invoke a callable with already-evaluated arguments, restoring the current
/// environment afterwards. This is the non-tail entry used by macro
/// expansion and by natives such as `apply`, `map`, and `swap!`. The caller
/// keeps `callee` and `args` rooted for the duration of the call.
pub fn apply_value(vm: &mut Vm, callee: Value, args: &[Value]) -> EvalResult {
    enum Kind {
        Closure(ObjRef),
        Native(NativeFn),
        Other,
    }
    let kind = match callee {
        Value::Obj(r) => match &vm.heap.get(r).data {
            ObjData::Closure { .. } => Kind::Closure(r),
            ObjData::Native { func, .. } => Kind::Native(*func),
            _ => Kind::Other,
        },
        _ => Kind::Other,
    };
    let saved = vm.current_env;
    vm.push_obj_root(saved);
    let result = match kind {
        Kind::Closure(cref) => call_closure(vm, cref, args),
        Kind::Native(func) => func(vm, args),
        Kind::Other => Err(vm.exception("RuntimeError: value is not callable!")),
    };
    vm.current_env = saved;
    vm.pop_obj_root();
    result
}
