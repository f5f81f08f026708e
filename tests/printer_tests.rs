// Printing modes and reader round-trips.

use mallow::vm::Vm;

#[test]
fn numbers_print_integrally_when_integral() {
    let mut vm = Vm::new();
    assert_eq!(vm.rep("3"), "3");
    assert_eq!(vm.rep("3.0"), "3");
    assert_eq!(vm.rep("-12"), "-12");
    assert_eq!(vm.rep("(/ 3 2)"), "1.500000");
}

#[test]
fn pr_str_quotes_and_str_does_not() {
    let mut vm = Vm::new();
    assert_eq!(vm.rep("(pr-str \"a\")"), "\"\\\"a\\\"\"");
    assert_eq!(vm.rep("(str \"a\" \"b\" 1)"), "\"ab1\"");
    assert_eq!(vm.rep("(str)"), "\"\"");
}

#[test]
fn readable_strings_escape_control_characters() {
    let mut vm = Vm::new();
    assert_eq!(vm.rep("\"tab\\there\""), "\"tab\\there\"");
    assert_eq!(vm.rep("\"line\\nbreak\""), "\"line\\nbreak\"");
    assert_eq!(vm.rep("\"back\\\\slash\""), "\"back\\\\slash\"");
}

#[test]
fn collections_print_with_their_delimiters() {
    let mut vm = Vm::new();
    assert_eq!(vm.rep("(list 1 (list 2 3))"), "(1 (2 3))");
    assert_eq!(vm.rep("[[1] [2]]"), "[[1], [2]]");
    assert_eq!(vm.rep("{}"), "{}");
    assert_eq!(vm.rep("()"), "()");
}

#[test]
fn pr_str_read_string_round_trips_value_equality() {
    let mut vm = Vm::new();
    for src in [
        "(list 1 \"two\" :three [4 5])",
        "[1 [2 [3]]]",
        "{\"k\" [1 2]}",
        "\"a string\\nwith escapes\\\\\"",
        "'(quote nested)",
    ] {
        vm.rep(&format!("(def! original {})", src));
        assert_eq!(
            vm.rep("(= original (read-string (pr-str original)))"),
            "true",
            "round trip failed for {src}"
        );
    }
}

#[test]
fn keywords_round_trip_with_their_colon() {
    let mut vm = Vm::new();
    assert_eq!(vm.rep(":kw"), ":kw");
    assert_eq!(vm.rep("(= :kw (read-string (pr-str :kw)))"), "true");
}

#[test]
fn callables_print_as_opaque_tags() {
    let mut vm = Vm::new();
    assert!(vm.rep("(fn* [] 1)").starts_with("<closure @"));
    assert!(vm.rep("+").starts_with("<function @"));
    assert!(vm.rep("(atom 1)").starts_with("<atom @"));
    vm.rep("(defmacro! m (fn* [] 1))");
    assert!(vm.rep("m").starts_with("<macro @"));
}

#[test]
fn println_prints_raw_and_returns_nil() {
    let mut vm = Vm::new();
    assert_eq!(vm.rep("(println \"hi\")"), "nil");
    assert_eq!(vm.rep("(prn \"hi\")"), "nil");
}
