// Macro definition, expansion, and quasiquotation.

use mallow::vm::Vm;

#[test]
fn quote_returns_the_form_unevaluated() {
    let mut vm = Vm::new();
    assert_eq!(vm.rep("'(1 2 (+ 1 2))"), "(1 2 (+ 1 2))");
    assert_eq!(vm.rep("(quote abc)"), "abc");
}

#[test]
fn quasiquote_without_unquotes_is_quote() {
    let mut vm = Vm::new();
    assert_eq!(vm.rep("`(1 2 3)"), "(1 2 3)");
    assert_eq!(vm.rep("`abc"), "abc");
}

#[test]
fn unquote_evaluates_inside_a_template() {
    let mut vm = Vm::new();
    vm.rep("(def! x 7)");
    assert_eq!(vm.rep("`(1 ~x 3)"), "(1 7 3)");
}

#[test]
fn splice_unquote_splices_a_list() {
    let mut vm = Vm::new();
    assert_eq!(vm.rep("`(1 ~(+ 1 1) ~@(list 3 4) 5)"), "(1 2 3 4 5)");
    assert_eq!(vm.rep("(= `(1 ~(+ 1 1) ~@(list 3 4) 5) '(1 2 3 4 5))"), "true");
}

#[test]
fn defmacro_defines_and_unless_expands() {
    let mut vm = Vm::new();
    vm.rep("(defmacro! unless (fn* [p a b] `(if ~p ~b ~a)))");
    assert_eq!(vm.rep("(unless false 1 2)"), "1");
    assert_eq!(vm.rep("(unless true 1 2)"), "2");
}

#[test]
fn macroexpand_returns_the_form_without_evaluating() {
    let mut vm = Vm::new();
    vm.rep("(defmacro! unless (fn* [p a b] `(if ~p ~b ~a)))");
    assert_eq!(vm.rep("(macroexpand (unless false 1 2))"), "(if false 2 1)");
}

#[test]
fn macros_receive_arguments_unevaluated() {
    let mut vm = Vm::new();
    vm.rep("(defmacro! ignore (fn* [x] nil))");
    // The argument would raise if it were evaluated.
    assert_eq!(vm.rep("(ignore (no-such-function 1))"), "nil");
}

#[test]
fn macro_expansion_is_repeated_until_fixed_point() {
    let mut vm = Vm::new();
    vm.rep("(defmacro! inner (fn* [] 42))");
    vm.rep("(defmacro! outer (fn* [] '(inner)))");
    assert_eq!(vm.rep("(outer)"), "42");
}

#[test]
fn macro_predicate_distinguishes_macros() {
    let mut vm = Vm::new();
    vm.rep("(defmacro! m (fn* [] 1))");
    vm.rep("(def! f (fn* [] 1))");
    assert_eq!(vm.rep("(macro? m)"), "true");
    assert_eq!(vm.rep("(macro? f)"), "false");
}

#[test]
fn defmacro_requires_a_closure() {
    let mut vm = Vm::new();
    assert_eq!(
        vm.rep("(defmacro! m 1)"),
        "Exception: RuntimeError: defmacro! body is not a closure"
    );
}

#[test]
fn macro_exceptions_short_circuit_expansion() {
    let mut vm = Vm::new();
    vm.rep("(defmacro! bad (fn* [] (throw \"expansion failed\")))");
    assert_eq!(vm.rep("(bad)"), "Exception: expansion failed");
    assert_eq!(vm.rep("(try* (bad) (catch* e e))"), "\"expansion failed\"");
}

#[test]
fn cond_bootstrap_macro() {
    let mut vm = Vm::new();
    assert_eq!(vm.rep("(cond false 1 true 2)"), "2");
    assert_eq!(vm.rep("(cond false 1 false 2)"), "nil");
    assert_eq!(vm.rep("(cond (> 2 1) \"yes\")"), "\"yes\"");
    assert_eq!(vm.rep("(try* (cond true) (catch* e e))"), "\"odd number of forms to cond\"");
}

#[test]
fn macros_defined_in_terms_of_quasiquote_recurse() {
    let mut vm = Vm::new();
    vm.rep("(defmacro! my-or (fn* [& xs] (if (empty? xs) nil `(let* [t ~(first xs)] (if t t (my-or ~@(rest xs)))))))");
    assert_eq!(vm.rep("(my-or nil false 3)"), "3");
    assert_eq!(vm.rep("(my-or nil nil)"), "nil");
}
