// Collector behavior observed through the public VM surface.

use mallow::value::Value;
use mallow::vm::Vm;

#[test]
fn string_literals_intern_to_one_object() {
    let mut vm = Vm::new();
    let a = vm.make_string("shared-literal");
    let b = vm.make_string("shared-literal");
    assert_eq!(a, b);
    assert_eq!(vm.rep("(= \"dup\" \"dup\")"), "true");
}

#[test]
fn gc_builtin_returns_nil() {
    let mut vm = Vm::new();
    assert_eq!(vm.rep("(gc)"), "nil");
}

#[test]
fn collection_reclaims_throwaway_lists() {
    let mut vm = Vm::new();
    vm.collect();
    let baseline = vm.heap.bytes_allocated();
    for _ in 0..200 {
        vm.rep("(list 1 2 3 4 5 6 7 8)");
    }
    assert!(vm.heap.bytes_allocated() > baseline);
    vm.collect();
    assert_eq!(vm.heap.bytes_allocated(), baseline);
}

#[test]
fn globally_bound_values_survive_collection() {
    let mut vm = Vm::new();
    vm.rep("(def! keep (list 1 2 3))");
    for _ in 0..5 {
        vm.collect();
    }
    assert_eq!(vm.rep("keep"), "(1 2 3)");
}

#[test]
fn explicitly_rooted_values_survive_collection() {
    let mut vm = Vm::new();
    let l = vm.alloc_list(vec![Value::Number(9.0)]);
    vm.push_obj_root(l);
    for _ in 0..5 {
        vm.collect();
    }
    assert_eq!(vm.heap.seq_get(l, 0), Value::Number(9.0));
    vm.pop_obj_root();
}

#[test]
fn intern_table_drops_dead_strings() {
    let mut vm = Vm::new();
    vm.rep("(str \"inter\" \"ned\")");
    assert!(vm.heap.lookup_interned("interned").is_some());
    vm.collect();
    assert!(vm.heap.lookup_interned("interned").is_none());
}

#[test]
fn intern_table_keeps_live_strings() {
    let mut vm = Vm::new();
    vm.rep("(def! s (str \"kept-\" \"alive\"))");
    vm.collect();
    assert!(vm.heap.lookup_interned("kept-alive").is_some());
    assert_eq!(vm.rep("s"), "\"kept-alive\"");
}

#[test]
fn atoms_hold_their_contents_across_collections() {
    let mut vm = Vm::new();
    vm.rep("(def! a (atom (list 1 2)))");
    vm.collect();
    vm.rep("(gc)");
    assert_eq!(vm.rep("(deref a)"), "(1 2)");
}

#[test]
fn closures_keep_their_captured_environment_alive() {
    let mut vm = Vm::new();
    vm.rep("(def! counter (let* [a (atom 0)] (fn* [] (swap! a + 1))))");
    vm.collect();
    assert_eq!(vm.rep("(counter)"), "1");
    vm.collect();
    assert_eq!(vm.rep("(counter)"), "2");
}

#[test]
fn allocation_pressure_collects_during_evaluation() {
    let mut vm = Vm::new();
    // Burns through far more than the GC threshold; the collector must run
    // mid-evaluation without touching anything still reachable.
    vm.rep(
        "(def! burn (fn* [n] (if (= n 0) \"ok\" (do (list 1 2 3 4 5 6 7 8) (burn (- n 1))))))",
    );
    assert_eq!(vm.rep("(burn 50000)"), "\"ok\"");
    assert!(vm.heap.bytes_allocated() < 16 * 1024 * 1024);
}

#[test]
fn threshold_resets_after_collection() {
    let mut vm = Vm::new();
    vm.collect();
    assert_eq!(vm.heap.next_gc(), vm.heap.bytes_allocated() * 2);
}

#[test]
fn quasiquote_roots_its_intermediates() {
    let mut vm = Vm::new();
    // Deep templates allocate many intermediate pairs; any unrooted one
    // would be reclaimed by a collection triggered part-way through.
    vm.rep("(def! go (fn* [n acc] (if (= n 0) acc (go (- n 1) `(x ~@acc)))))");
    let out = vm.rep("(count (go 2000 '()))");
    assert_eq!(out, "2000");
}
