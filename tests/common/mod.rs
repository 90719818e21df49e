//! Fixture programs shared by the integration tests and the demo.

#![allow(dead_code)]

use reach_rs::cfg::{Program, ProgramBuilder};
use reach_rs::domain::Lattice;
use reach_rs::expr::Expr;
use reach_rs::interval::Interval;
use reach_rs::types::Location;

/// `test1.c`: `foo(a, b)` writes `arr[b]` under `a > b`; reachable through
/// `bar` (which passes `a - 2` when `a > 5`), impossible through `baz`
/// (which passes `a + 2`).
pub fn test1() -> Program {
    let mut builder = ProgramBuilder::new();
    builder.declare_external("printf");

    let main = builder.function("main", &["argc", "argv"]);
    let entry = main.entry();
    main.input(entry, "c", Interval::from_bounds(0, 255))
        .call(entry, Some("r1"), "bar", vec![Expr::var("c")], Location::new(7, 26))
        .call(entry, None, "printf", vec![Expr::var("r1")], Location::new(7, 4))
        .call(entry, Some("r2"), "baz", vec![Expr::var("c")], Location::new(8, 26))
        .call(entry, None, "printf", vec![Expr::var("r2")], Location::new(8, 4))
        .ret(entry, Some(Expr::constant(0)));

    let bar = builder.function("bar", &["a"]);
    let entry = bar.entry();
    let then = bar.new_block("if.then");
    let exit = bar.new_block("if.end");
    bar.branch(entry, Expr::var("a").gt(Expr::constant(5)), then, exit)
        .call(
            then,
            Some("r"),
            "foo",
            vec![Expr::var("a"), Expr::offset("a", -2)],
            Location::new(14, 14),
        )
        .ret(then, Some(Expr::var("r")))
        .ret(exit, Some(Expr::constant(0)));

    let baz = builder.function("baz", &["a"]);
    let entry = baz.entry();
    baz.call(
        entry,
        Some("r"),
        "foo",
        vec![Expr::var("a"), Expr::offset("a", 2)],
        Location::new(21, 11),
    )
    .ret(entry, Some(Expr::var("r")));

    let foo = builder.function("foo", &["a", "b"]);
    let entry = foo.entry();
    let then = foo.new_block("if.then");
    let exit = foo.new_block("if.end");
    foo.declare_array("arr", 10)
        .assign(entry, "ret", Expr::constant(0))
        .branch(entry, Expr::var("a").gt(Expr::var("b")), then, exit)
        .write(then, "arr", Expr::var("b"), Location::new(30, 7))
        .read(then, "arr", Expr::var("b"), Location::new(31, 13))
        .input(then, "ret", Interval::top())
        .jump(then, exit)
        .ret(exit, Some(Expr::var("ret")));

    builder.build().expect("test1 is well-formed")
}

/// `test2.c`: a chain of `printf`s on the sign of a `scanf`ed number.
pub fn test2() -> Program {
    let mut builder = ProgramBuilder::new();
    builder.declare_external("printf").declare_external("scanf");

    let main = builder.function("main", &[]);
    let entry = main.entry();
    let positive = main.new_block("if.then");
    let not_positive = main.new_block("if.else");
    let negative = main.new_block("if.then2");
    let zero = main.new_block("if.else2");
    let exit = main.new_block("if.end");
    main.call(entry, None, "printf", vec![], Location::new(6, 5))
        .call(entry, None, "scanf", vec![], Location::new(7, 5))
        .input(entry, "number", Interval::top())
        .branch(entry, Expr::var("number").gt(Expr::constant(0)), positive, not_positive)
        .call(positive, None, "printf", vec![], Location::new(10, 9))
        .jump(positive, exit)
        .branch(not_positive, Expr::var("number").lt(Expr::constant(0)), negative, zero)
        .call(negative, None, "printf", vec![], Location::new(12, 9))
        .jump(negative, exit)
        .call(zero, None, "printf", vec![], Location::new(14, 9))
        .jump(zero, exit)
        .ret(exit, Some(Expr::constant(0)));

    builder.build().expect("test2 is well-formed")
}
