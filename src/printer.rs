//! Printing values back to strings.
//!
//! Two modes: *readably* quotes and escapes strings so the reader can take
//! them back; *raw* emits string bytes verbatim. Results are interned heap
//! strings, and while a composite is being rendered every child string stays
//! on the runtime-root stack until the parent has been interned (interned
//! strings are still collectable once their table entry is purged).

use crate::heap::{ObjData, ObjRef};
use crate::value::Value;
use crate::vm::Vm;

/// Escapable characters and their escape letters, shared with the reader.
pub(crate) const ESCAPES: [(char, char); 11] = [
    ('\\', '\\'),
    ('"', '"'),
    ('\'', '\''),
    ('\x07', 'a'),
    ('\x08', 'b'),
    ('\x0c', 'f'),
    ('\n', 'n'),
    ('\r', 'r'),
    ('\t', 't'),
    ('\x0b', 'v'),
    ('\0', '0'),
];

/// Print to an owned host string. The internal None sentinel prints as the
/// empty string, which is how top-level "no value" output is suppressed.
pub fn print_string(vm: &mut Vm, v: Value, readably: bool) -> String {
    if v.is_none() {
        return String::new();
    }
    let r = print_value(vm, v, readably);
    vm.heap.string(r).to_string()
}

/// Print to an interned heap string.
pub fn print_value(vm: &mut Vm, v: Value, readably: bool) -> ObjRef {
    match v {
        Value::None => vm.intern(""),
        Value::Nil => vm.intern("nil"),
        Value::Bool(true) => vm.intern("true"),
        Value::Bool(false) => vm.intern("false"),
        Value::Number(n) => {
            // Integral doubles print without a decimal point.
            let s = if v.is_integral() {
                format!("{}", n as i64)
            } else {
                format!("{:.6}", n)
            };
            vm.intern(&s)
        }
        Value::Obj(r) => print_obj(vm, r, readably),
    }
}

fn print_obj(vm: &mut Vm, r: ObjRef, readably: bool) -> ObjRef {
    enum Plan {
        Verbatim,
        Quoted(Box<str>),
        Name(ObjRef),
        Seq {
            open: char,
            close: char,
            sep: &'static str,
            items: Vec<Value>,
        },
        Map(Vec<(Value, Value)>),
        Tag(&'static str),
        Payload(Value),
    }

    let plan = match &vm.heap.get(r).data {
        ObjData::Str(s) => {
            if readably {
                Plan::Quoted(s.clone())
            } else {
                Plan::Verbatim
            }
        }
        ObjData::Symbol { name } | ObjData::Keyword { name } => Plan::Name(*name),
        ObjData::List { items, .. } => Plan::Seq {
            open: '(',
            close: ')',
            sep: " ",
            items: items.clone(),
        },
        ObjData::Vector { items, .. } => Plan::Seq {
            open: '[',
            close: ']',
            sep: ", ",
            items: items.clone(),
        },
        ObjData::Map { .. } => Plan::Map(vm.heap.map_entries(r)),
        ObjData::Native { .. } => Plan::Tag("function"),
        ObjData::Closure { is_macro: true, .. } => Plan::Tag("macro"),
        ObjData::Closure { .. } => Plan::Tag("closure"),
        ObjData::Atom { .. } => Plan::Tag("atom"),
        ObjData::Exception { payload } => Plan::Payload(*payload),
        ObjData::Env { .. } => Plan::Tag("env"),
    };

    match plan {
        Plan::Verbatim => r,
        Plan::Quoted(s) => {
            let mut out = String::with_capacity(s.len() + 2);
            out.push('"');
            for c in s.chars() {
                match ESCAPES.iter().find(|(orig, _)| *orig == c) {
                    Some((_, code)) => {
                        out.push('\\');
                        out.push(*code);
                    }
                    None => out.push(c),
                }
            }
            out.push('"');
            vm.intern(&out)
        }
        Plan::Name(n) => n,
        Plan::Seq {
            open,
            close,
            sep,
            items,
        } => {
            let mut parts: Vec<ObjRef> = Vec::with_capacity(items.len());
            for item in items {
                let child = print_value(vm, item, readably);
                vm.push_obj_root(child);
                parts.push(child);
            }
            let mut out = String::new();
            out.push(open);
            for (i, part) in parts.iter().enumerate() {
                if i > 0 {
                    out.push_str(sep);
                }
                out.push_str(vm.heap.string(*part));
            }
            out.push(close);
            let interned = vm.intern(&out);
            for _ in &parts {
                vm.pop_obj_root();
            }
            interned
        }
        Plan::Map(entries) => {
            let mut parts: Vec<(ObjRef, ObjRef)> = Vec::with_capacity(entries.len());
            for (k, v) in entries {
                let pk = print_value(vm, k, readably);
                vm.push_obj_root(pk);
                let pv = print_value(vm, v, readably);
                vm.push_obj_root(pv);
                parts.push((pk, pv));
            }
            let mut out = String::new();
            out.push('{');
            for (i, (pk, pv)) in parts.iter().enumerate() {
                if i > 0 {
                    out.push_str(", ");
                }
                out.push_str(vm.heap.string(*pk));
                out.push(' ');
                out.push_str(vm.heap.string(*pv));
            }
            out.push('}');
            let interned = vm.intern(&out);
            for _ in &parts {
                vm.pop_obj_root();
                vm.pop_obj_root();
            }
            interned
        }
        Plan::Tag(tag) => {
            let s = format!("<{} @{}>", tag, r.index());
            vm.intern(&s)
        }
        // Exceptions render as their payload, unquoted.
        Plan::Payload(p) => print_value(vm, p, false),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn immediates_print_as_literals() {
        let mut vm = Vm::new();
        assert_eq!(print_string(&mut vm, Value::Nil, true), "nil");
        assert_eq!(print_string(&mut vm, Value::Bool(true), true), "true");
        assert_eq!(print_string(&mut vm, Value::Number(42.0), true), "42");
        assert_eq!(print_string(&mut vm, Value::Number(1.5), true), "1.500000");
        assert_eq!(print_string(&mut vm, Value::None, true), "");
    }

    #[test]
    fn strings_quote_in_readable_mode_only() {
        let mut vm = Vm::new();
        let s = vm.make_string("a\"b\n");
        assert_eq!(print_string(&mut vm, s, false), "a\"b\n");
        assert_eq!(print_string(&mut vm, s, true), "\"a\\\"b\\n\"");
    }

    #[test]
    fn collections_use_their_delimiters() {
        let mut vm = Vm::new();
        assert_eq!(vm.rep("(list 1 2 3)"), "(1 2 3)");
        assert_eq!(vm.rep("[1 2 3]"), "[1, 2, 3]");
        assert_eq!(vm.rep("{\"a\" 1}"), "{\"a\" 1}");
    }

    #[test]
    fn callables_print_opaquely() {
        let mut vm = Vm::new();
        let printed = vm.rep("(fn* [x] x)");
        assert!(printed.starts_with("<closure @"), "got {printed}");
    }
}
