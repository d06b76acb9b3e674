use astflow::{AnalysisContext, AnalysisOutcome, ForwardAnalyzer, LibraryConfig, Mode, NodeId, Program};
use indoc::indoc;

fn parsed(src: &str) -> (Program, LibraryConfig) {
    // RUST_LOG=debug surfaces the walker's bailout reasons
    let _ = env_logger::builder().is_test(true).try_init();
    (Program::parse(src).unwrap(), LibraryConfig::default())
}

macro_rules! ctx {
    ($prog:expr, $lib:expr) => {
        AnalysisContext::new(&$prog.arena, &$prog.symbols, &$lib)
    };
}

/// Token after the `;` terminating the statement containing `from`.
fn next_statement(prog: &Program, from: NodeId) -> NodeId {
    let mut t = from;
    loop {
        if prog.arena.sym(t) == ";" {
            return prog.arena.next(t).unwrap();
        }
        t = prog.arena.next(t).unwrap();
    }
}

#[test]
fn redundant_assignment_is_found() {
    let src = indoc! {"
        void f() {
            int x;
            x = 1;
            x = 2;
            return;
        }
    "};
    let (prog, lib) = parsed(src);
    let ctx = ctx!(prog, lib);
    let fwd = ForwardAnalyzer::new(&ctx);
    let first = prog.find_pattern("x = 1").unwrap();
    let start = next_statement(&prog, first);
    let at = fwd.reassign(first, start, prog.last()).unwrap();
    let second = prog.find_pattern("x = 2").unwrap();
    assert_eq!(prog.arena.parent(second), Some(at));
}

#[test]
fn read_before_overwrite_blocks_the_finding() {
    let src = "void f(int* out) { int x; x = 1; *out = x; x = 2; }";
    let (prog, lib) = parsed(src);
    let ctx = ctx!(prog, lib);
    let fwd = ForwardAnalyzer::new(&ctx);
    let first = prog.find_pattern("x = 1").unwrap();
    let start = next_statement(&prog, first);
    assert_eq!(fwd.reassign(first, start, prog.last()), None);
}

#[test]
fn loop_body_increment_counts_as_write() {
    // the overwrite is only visible on the second pass over the body
    let src = indoc! {"
        int f(int c) {
            int x;
            x = 0;
            while (c) x = x + 1;
            return x;
        }
    "};
    let (prog, lib) = parsed(src);
    let ctx = ctx!(prog, lib);
    let fwd = ForwardAnalyzer::new(&ctx);
    let first = prog.find_pattern("x = 0").unwrap();
    let start = next_statement(&prog, first);
    let at = fwd.reassign(first, start, prog.last()).unwrap();
    let body = prog.find_pattern("x = x + 1").unwrap();
    assert_eq!(prog.arena.parent(body), Some(at));
}

#[test]
fn braced_loop_body_behaves_the_same() {
    let src = indoc! {"
        int f(int c) {
            int x;
            x = 0;
            while (c) { x = x + 1; }
            return x;
        }
    "};
    let (prog, lib) = parsed(src);
    let ctx = ctx!(prog, lib);
    let fwd = ForwardAnalyzer::new(&ctx);
    let first = prog.find_pattern("x = 0").unwrap();
    let start = next_statement(&prog, first);
    let at = fwd.reassign(first, start, prog.last()).unwrap();
    let body = prog.find_pattern("x = x + 1").unwrap();
    assert_eq!(prog.arena.parent(body), Some(at));
}

#[test]
fn goto_and_asm_bail_out_in_every_mode() {
    for stmt in ["goto done; done:", "asm ( )  ;"] {
        let src = format!("void f() {{ int x; x = 1; {stmt} x = 2; }}");
        let (prog, lib) = parsed(&src);
        let ctx = ctx!(prog, lib);
        let fwd = ForwardAnalyzer::new(&ctx);
        let first = prog.find_pattern("x = 1").unwrap();
        let start = next_statement(&prog, first);
        for mode in [Mode::Reassign, Mode::UnusedValue, Mode::ValueFlow] {
            assert!(
                fwd.analyze(first, start, prog.last(), mode).is_bailout(),
                "{stmt} must bail out in {mode:?}"
            );
        }
    }
}

#[test]
fn dead_store_at_end_of_function_is_unused() {
    let (prog, lib) = parsed("void f() { int x; x = 1; }");
    let ctx = ctx!(prog, lib);
    let fwd = ForwardAnalyzer::new(&ctx);
    let first = prog.find_pattern("x = 1").unwrap();
    let start = next_statement(&prog, first);
    assert!(fwd.unused_value(first, start, prog.last()));
}

#[test]
fn value_read_through_reference_is_used() {
    let src = indoc! {"
        int f() {
            int x;
            x = 1;
            int& r = x;
            r = 2;
            return x;
        }
    "};
    let (prog, lib) = parsed(src);
    let ctx = ctx!(prog, lib);
    let fwd = ForwardAnalyzer::new(&ctx);
    let first = prog.find_pattern("x = 1").unwrap();
    let start = next_statement(&prog, first);
    assert!(!fwd.unused_value(first, start, prog.last()));
}

#[test]
fn escaped_address_blocks_unused_value() {
    let src = "void f() { int x; int y; x = 1; record(&x); y = 2; }";
    let (prog, lib) = parsed(src);
    let ctx = ctx!(prog, lib);
    let fwd = ForwardAnalyzer::new(&ctx);
    let first = prog.find_pattern("x = 1").unwrap();
    let start = next_statement(&prog, first);
    assert!(!fwd.unused_value(first, start, prog.last()));
}

#[test]
fn prior_aliasing_blocks_unused_value() {
    // the overwrite alone would make the value dead, but the pointer seated
    // on x earlier keeps the answer conservative
    let src = "void f() { int x; int* p; int y; p = &x; x = 1; x = 2; }";
    let (prog, lib) = parsed(src);
    let ctx = ctx!(prog, lib);
    let fwd = ForwardAnalyzer::new(&ctx);
    let first = prog.find_pattern("x = 1").unwrap();
    let start = next_statement(&prog, first);
    assert_eq!(
        fwd.analyze(first, start, prog.last(), Mode::UnusedValue),
        AnalysisOutcome::None
    );
    assert!(!fwd.unused_value(first, start, prog.last()));
}

#[test]
fn switch_body_occurrence_bails_out() {
    let src = indoc! {"
        int f(int c) {
            int x;
            x = 1;
            switch (c) {
                case 0:
                    x = 2;
            }
            return x;
        }
    "};
    let (prog, lib) = parsed(src);
    let ctx = ctx!(prog, lib);
    let fwd = ForwardAnalyzer::new(&ctx);
    let first = prog.find_pattern("x = 1").unwrap();
    let start = next_statement(&prog, first);
    assert!(fwd.analyze(first, start, prog.last(), Mode::Reassign).is_bailout());
}

#[test]
fn do_while_body_write_is_seen_linearly() {
    let src = "void f(int c) { int x; x = 1; do { x = 2; } while (c); }";
    let (prog, lib) = parsed(src);
    let ctx = ctx!(prog, lib);
    let fwd = ForwardAnalyzer::new(&ctx);
    let first = prog.find_pattern("x = 1").unwrap();
    let start = next_statement(&prog, first);
    let at = fwd.reassign(first, start, prog.last()).unwrap();
    assert_eq!(prog.arena.parent(prog.find_pattern("x = 2").unwrap()), Some(at));
}

#[test]
fn return_bails_for_non_local_reassign() {
    let src = "int g; void f(int c) { g = 1; if (c) { return; } g = 2; }";
    let (prog, lib) = parsed(src);
    let ctx = ctx!(prog, lib);
    let fwd = ForwardAnalyzer::new(&ctx);
    let first = prog.find_pattern("g = 1").unwrap();
    let start = next_statement(&prog, first);
    assert_eq!(fwd.reassign(first, start, prog.last()), None);
}

#[test]
fn self_assignment_is_neither_read_nor_write() {
    let src = "void f() { int x; int y; x = 1; x = x; y = 2; }";
    let (prog, lib) = parsed(src);
    let ctx = ctx!(prog, lib);
    let fwd = ForwardAnalyzer::new(&ctx);
    let first = prog.find_pattern("x = 1").unwrap();
    let start = next_statement(&prog, first);
    assert_eq!(fwd.reassign(first, start, prog.last()), None);
    assert!(fwd.unused_value(first, start, prog.last()));
}

#[test]
fn both_branches_writing_proves_the_overwrite() {
    let src = indoc! {"
        void f(int c) {
            int x;
            x = 1;
            if (c) {
                x = 2;
            } else {
                x = 3;
            }
        }
    "};
    let (prog, lib) = parsed(src);
    let ctx = ctx!(prog, lib);
    let fwd = ForwardAnalyzer::new(&ctx);
    let first = prog.find_pattern("x = 1").unwrap();
    let start = next_statement(&prog, first);
    assert!(fwd.reassign(first, start, prog.last()).is_some());
}

#[test]
fn conditional_write_alone_proves_nothing() {
    let src = "void f(int c) { int x; x = 1; if (c) { x = 2; } }";
    let (prog, lib) = parsed(src);
    let ctx = ctx!(prog, lib);
    let fwd = ForwardAnalyzer::new(&ctx);
    let first = prog.find_pattern("x = 1").unwrap();
    let start = next_statement(&prog, first);
    assert_eq!(fwd.reassign(first, start, prog.last()), None);
    assert!(!fwd.unused_value(first, start, prog.last()));
}
