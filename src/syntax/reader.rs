//! Parse source text and lower it into core values.
//!
//! Parsing is purely syntactic; the lowering walk allocates heap values and
//! pins every one of them on the compile-root stack so a collection triggered
//! mid-parse cannot reclaim a partially built tree. The caller clears the
//! compile roots between top-level inputs.

use pest::iterators::Pair;
use pest::Parser;
use pest_derive::Parser;

use crate::errors::ParseError;
use crate::printer::ESCAPES;
use crate::value::Value;
use crate::vm::Vm;

#[derive(Parser)]
#[grammar = "syntax/grammar.pest"]
struct MallowParser;

/// Read the first form from `source`. Empty (or comment-only) input yields
/// the internal None value, which the REPL prints as nothing.
pub fn read_str(vm: &mut Vm, source: &str) -> Result<Value, ParseError> {
    let mut pairs = MallowParser::parse(Rule::program, source)
        .map_err(|e| convert_parse_error(e, source))?;
    let program = pairs.next().unwrap(); // pest guarantees the program rule
    match program
        .into_inner()
        .find(|p| p.as_rule() != Rule::EOI)
    {
        Some(form) => build_form(vm, source, form),
        None => Ok(Value::None),
    }
}

/// Pin a freshly built value on the compile-root stack and hand it back.
fn pin(vm: &mut Vm, v: Value) -> Value {
    vm.push_compile_root(v);
    v
}

fn build_form(vm: &mut Vm, source: &str, pair: Pair<Rule>) -> Result<Value, ParseError> {
    match pair.as_rule() {
        Rule::list => {
            let items = build_items(vm, source, pair)?;
            let r = vm.alloc_list(items);
            Ok(pin(vm, Value::Obj(r)))
        }

        Rule::vector => {
            let items = build_items(vm, source, pair)?;
            let r = vm.alloc_vector(items);
            Ok(pin(vm, Value::Obj(r)))
        }

        Rule::map => {
            let (line, _) = pair.line_col();
            let offset = pair.as_span().start();
            let items = build_items(vm, source, pair)?;
            if items.len() % 2 != 0 {
                return Err(ParseError::new(
                    "map literal needs an even number of forms",
                    source,
                    offset,
                    line,
                ));
            }
            let m = vm.alloc_map();
            let pinned = pin(vm, Value::Obj(m));
            for kv in items.chunks(2) {
                vm.heap.map_insert(m, kv[0], kv[1]);
            }
            Ok(pinned)
        }

        Rule::quote => build_sugar(vm, source, pair, "quote"),
        Rule::quasiquote => build_sugar(vm, source, pair, "quasiquote"),
        Rule::splice_unquote => build_sugar(vm, source, pair, "splice-unquote"),
        Rule::unquote => build_sugar(vm, source, pair, "unquote"),
        Rule::deref => build_sugar(vm, source, pair, "deref"),

        // `^m v` reads as `(with-meta v m)`: the meta form comes first in
        // the source but second in the lowered call.
        Rule::with_meta => {
            let mut inner = pair.into_inner();
            let meta_pair = inner.next().unwrap(); // grammar guarantees two forms
            let value_pair = inner.next().unwrap();
            let sym = vm.make_symbol("with-meta");
            let sym = pin(vm, sym);
            let meta = build_form(vm, source, meta_pair)?;
            let value = build_form(vm, source, value_pair)?;
            let r = vm.alloc_list(vec![sym, value, meta]);
            Ok(pin(vm, Value::Obj(r)))
        }

        Rule::string => {
            let text = pair.as_str();
            let content = unescape(&text[1..text.len() - 1]);
            let s = vm.make_string(&content);
            Ok(pin(vm, s))
        }

        Rule::number => {
            let text = pair.as_str();
            let (line, _) = pair.line_col();
            let n = text.parse::<f64>().map_err(|_| {
                ParseError::new(
                    format!("invalid number literal '{}'", text),
                    source,
                    pair.as_span().start(),
                    line,
                )
            })?;
            Ok(Value::Number(n))
        }

        // The token keeps its leading colon; keyword identity is the
        // identity of that interned name.
        Rule::keyword => {
            let kw = vm.make_keyword(pair.as_str());
            Ok(pin(vm, kw))
        }

        Rule::symbol => match pair.as_str() {
            "nil" => Ok(Value::Nil),
            "true" => Ok(Value::Bool(true)),
            "false" => Ok(Value::Bool(false)),
            text => {
                let sym = vm.make_symbol(text);
                Ok(pin(vm, sym))
            }
        },

        rule => {
            let (line, _) = pair.line_col();
            Err(ParseError::new(
                format!("unexpected {:?} form", rule),
                source,
                pair.as_span().start(),
                line,
            ))
        }
    }
}

fn build_items(vm: &mut Vm, source: &str, pair: Pair<Rule>) -> Result<Vec<Value>, ParseError> {
    pair.into_inner()
        .map(|p| build_form(vm, source, p))
        .collect()
}

fn build_sugar(
    vm: &mut Vm,
    source: &str,
    pair: Pair<Rule>,
    name: &str,
) -> Result<Value, ParseError> {
    let inner = pair.into_inner().next().unwrap(); // grammar guarantees an inner form
    let sym = vm.make_symbol(name);
    let sym = pin(vm, sym);
    let form = build_form(vm, source, inner)?;
    let r = vm.alloc_list(vec![sym, form]);
    Ok(pin(vm, Value::Obj(r)))
}

fn unescape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some(code) => match ESCAPES.iter().find(|(_, e)| *e == code) {
                Some((orig, _)) => out.push(*orig),
                // Unknown escape: keep both characters verbatim.
                None => {
                    out.push('\\');
                    out.push(code);
                }
            },
            None => out.push(c),
        }
    }
    out
}

fn convert_parse_error(e: pest::error::Error<Rule>, source: &str) -> ParseError {
    let line = match &e.line_col {
        pest::error::LineColLocation::Pos((l, _)) => *l,
        pest::error::LineColLocation::Span((l, _), _) => *l,
    };
    let offset = match &e.location {
        pest::error::InputLocation::Pos(p) => *p,
        pest::error::InputLocation::Span((s, _)) => *s,
    };
    let message = if offset >= source.trim_end().len() {
        "unexpected end of input, missing a closing delimiter?".to_string()
    } else {
        format!("unexpected token: {}", e.variant.message())
    };
    ParseError::new(message, source, offset, line)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::printer::print_string;

    fn read_back(src: &str) -> String {
        let mut vm = Vm::new();
        let v = read_str(&mut vm, src).expect("should read");
        vm.clear_compile_roots();
        vm.push_root(v);
        print_string(&mut vm, v, true)
    }

    #[test]
    fn reads_atoms() {
        assert_eq!(read_back("42"), "42");
        assert_eq!(read_back("-7"), "-7");
        assert_eq!(read_back("1.25"), "1.250000");
        assert_eq!(read_back("nil"), "nil");
        assert_eq!(read_back("true"), "true");
        assert_eq!(read_back("a-symbol!"), "a-symbol!");
        assert_eq!(read_back(":kw"), ":kw");
        assert_eq!(read_back("\"hi\\nthere\""), "\"hi\\nthere\"");
    }

    #[test]
    fn minus_alone_is_a_symbol() {
        assert_eq!(read_back("-"), "-");
        assert_eq!(read_back("-abc"), "-abc");
    }

    #[test]
    fn commas_and_comments_are_whitespace() {
        assert_eq!(read_back("(1, 2,,3) ; trailing"), "(1 2 3)");
    }

    #[test]
    fn sugar_lowers_to_core_forms() {
        assert_eq!(read_back("'x"), "(quote x)");
        assert_eq!(read_back("`x"), "(quasiquote x)");
        assert_eq!(read_back("~x"), "(unquote x)");
        assert_eq!(read_back("~@x"), "(splice-unquote x)");
        assert_eq!(read_back("@x"), "(deref x)");
        assert_eq!(read_back("^m v"), "(with-meta v m)");
    }

    #[test]
    fn empty_input_reads_as_no_value() {
        let mut vm = Vm::new();
        assert!(read_str(&mut vm, "").unwrap().is_none());
        assert!(read_str(&mut vm, "  ; just a comment").unwrap().is_none());
    }

    #[test]
    fn unbalanced_forms_report_a_line() {
        let mut vm = Vm::new();
        let err = read_str(&mut vm, "(1 2").unwrap_err();
        assert_eq!(err.line, 1);
        let err = read_str(&mut vm, "(1\n(2 3)").unwrap_err();
        assert!(err.to_string().contains("ParseError"));
    }

    #[test]
    fn unterminated_string_is_an_error() {
        let mut vm = Vm::new();
        assert!(read_str(&mut vm, "\"abc").is_err());
    }
}
