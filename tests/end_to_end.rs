// tests/end_to_end.rs
//! Whole-pipeline tests: source text through compilation, linking, and
//! execution, including the debugger boundary.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

use quill::binding::{Context, LibraryRef, Module};
use quill::debugger::{Debugger, IncomingMessage, OutgoingMessage, Transport};
use quill::errors::{Diagnostics, MessageFormat, RuntimeError};
use quill::frontend::Project;
use quill::runtime::{call_function, ExceptionReport, ExecutableState, Value};

fn compile(source: &str) -> (Context, LibraryRef) {
    let mut ctx = Context::new();
    let mut project = Project::new();
    project.add_code_from_string(source, "Test");
    let mut diagnostics = Diagnostics::new();
    let library = project
        .compile(&mut ctx, "test", &[], &mut diagnostics)
        .expect("compilation should succeed");
    assert!(diagnostics.take_errors().is_empty());
    (ctx, library)
}

fn compile_error(source: &str) -> Vec<quill::errors::CompileError> {
    let mut ctx = Context::new();
    let mut project = Project::new();
    project.add_code_from_string(source, "Test");
    let mut diagnostics = Diagnostics::new();
    let library = project.compile(&mut ctx, "test", &[], &mut diagnostics);
    assert!(library.is_none());
    let errors = diagnostics.take_errors();
    assert!(!errors.is_empty());
    errors
}

struct Run {
    ctx: Context,
    state: ExecutableState,
    report: ExceptionReport,
    value: Option<Value>,
    output: Rc<RefCell<String>>,
}

fn run_main_with(source: &str, timeout: Option<u64>, debugger: Option<Debugger>) -> Run {
    let (ctx, library) = compile(source);
    let mut module = Module::new(&ctx);
    module.add(library.clone());
    let mut state = ExecutableState::new(&ctx, module);

    let output = Rc::new(RefCell::new(String::new()));
    let sink = output.clone();
    state.set_output(Box::new(move |text| sink.borrow_mut().push_str(text)));
    if let Some(debugger) = debugger {
        state.attach_debugger(debugger);
    }

    let mut report = ExceptionReport::new();
    state.link(&ctx, &mut report);
    assert!(!report.is_set(), "static initialization failed");

    let main = quill::commands::common::find_entry_point(&ctx, &library)
        .expect("script should declare a static Main");
    if let Some(ticks) = timeout {
        state.push_timeout(ticks);
    }
    let value = call_function(&ctx, &mut state, main, None, vec![], &mut report);
    if timeout.is_some() {
        state.pop_timeout();
    }
    Run {
        ctx,
        state,
        report,
        value,
        output,
    }
}

fn run_main(source: &str) -> Run {
    run_main_with(source, None, None)
}

fn integer_result(run: &Run) -> i64 {
    assert!(
        !run.report.is_set(),
        "script failed: {}",
        run.report.format(MessageFormat::Quill)
    );
    run.value
        .as_ref()
        .and_then(Value::as_integer)
        .expect("Main should return an Integer")
}

// ----- execution semantics -----

#[test]
fn compound_field_assignment_accumulates_across_calls() {
    let run = run_main(
        r#"
class Foo
{
    var X : Integer = 5;
    function Bump()
    {
        this.X += 1;
    }
    [Static] function Main() : Integer
    {
        var foo = new Foo();
        foo.Bump();
        foo.Bump();
        return foo.X;
    }
}
"#,
    );
    assert_eq!(integer_result(&run), 7);
}

#[test]
fn value_type_composition_cycle_is_rejected() {
    let errors = compile_error(
        "struct A { var Other : B; } struct B { var Owner : A; }",
    );
    assert!(errors
        .iter()
        .any(|e| e.message().contains("contains itself by value")));
}

#[test]
fn overload_selection_is_deterministic() {
    let run = run_main(
        r#"
class A
{
    function F(x : Integer) : Integer { return 1; }
    function F(x : Real) : Integer { return 2; }
    [Static] function Main() : Integer
    {
        var a = new A();
        return a.F(3);
    }
}
"#,
    );
    assert_eq!(integer_result(&run), 1);
}

#[test]
fn virtual_call_dispatches_on_runtime_type() {
    let run = run_main(
        r#"
class Base
{
    [Virtual] function Kind() : Integer { return 1; }
}
class Derived : Base
{
    [Override] function Kind() : Integer { return 2; }
}
class Game
{
    [Static] function Main() : Integer
    {
        var b : Base = new Derived();
        return b.Kind();
    }
}
"#,
    );
    assert_eq!(integer_result(&run), 2);
}

#[test]
fn indexer_compound_assignment_reads_then_writes() {
    let run = run_main(
        r#"
class Game
{
    [Static] function Main() : Integer
    {
        var a = new Array[Integer]();
        a.Add(5);
        a[0] += 2;
        return a[0];
    }
}
"#,
    );
    assert_eq!(integer_result(&run), 7);
}

#[test]
fn static_compound_assignment_persists() {
    let run = run_main(
        r#"
class Game
{
    [Static] var Calls : Integer = 0;
    [Static] function Main() : Integer
    {
        Game.Calls += 1;
        Game.Calls += 2;
        return Game.Calls;
    }
}
"#,
    );
    assert_eq!(integer_result(&run), 3);
}

#[test]
fn template_type_annotations_in_bodies_instantiate() {
    let run = run_main(
        r#"
class Game
{
    [Static] function Main() : Integer
    {
        var a : Array[Integer] = new Array[Integer]();
        a.Add(4);
        return a.Get(0);
    }
}
"#,
    );
    assert_eq!(integer_result(&run), 4);
}

#[test]
fn indexer_compound_assignment_evaluates_operands_once() {
    let run = run_main(
        r#"
class Game
{
    [Static] var Calls : Integer = 0;
    [Static] function Index() : Integer
    {
        Game.Calls += 1;
        return 0;
    }
    [Static] function Source() : Integer
    {
        Game.Calls += 10;
        return 2;
    }
    [Static] function Main() : Integer
    {
        var a = new Array[Integer]();
        a.Add(5);
        a[Game.Index()] += Game.Source();
        return a[0] * 100 + Game.Calls;
    }
}
"#,
    );
    // Element becomes 7; each operand ran exactly once (1 + 10).
    assert_eq!(integer_result(&run), 711);
}

#[test]
fn string_interpolation_prints_values() {
    let run = run_main(
        r#"
class Game
{
    [Static] function Main() : Integer
    {
        var count = 1 + 2;
        Console.WriteLine("count is {count}");
        return 0;
    }
}
"#,
    );
    assert_eq!(integer_result(&run), 0);
    assert_eq!(run.output.borrow().as_str(), "count is 3\n");
}

#[test]
fn thrown_exception_carries_message_and_trace() {
    let run = run_main(
        r#"
class Game
{
    [Static] function Inner()
    {
        throw new Exception("boom");
    }
    [Static] function Main() : Integer
    {
        Game.Inner();
        return 0;
    }
}
"#,
    );
    assert!(run.report.is_set());
    let thrown = run.report.exception().unwrap();
    assert_eq!(
        thrown.error,
        RuntimeError::UserException {
            message: "boom".into()
        }
    );
    let trace = run.report.format(MessageFormat::Quill);
    let inner = trace.find("Inner").expect("trace should name Inner");
    let main = trace.find("Main").expect("trace should name Main");
    assert!(inner < main, "innermost frame comes first");
}

#[test]
fn deleted_object_dereference_fails_cleanly() {
    let run = run_main(
        r#"
class Foo
{
    var X : Integer = 1;
    [Static] function Main() : Integer
    {
        var foo = new Foo();
        delete foo;
        return foo.X;
    }
}
"#,
    );
    assert!(run.report.is_set());
    assert_eq!(
        run.report.exception().unwrap().error,
        RuntimeError::NullDereference
    );
}

#[test]
fn timeout_aborts_unbounded_loops() {
    let run = run_main_with(
        r#"
class Game
{
    [Static] function Main() : Integer
    {
        loop { }
    }
}
"#,
        Some(1_000),
        None,
    );
    assert!(run.report.is_set());
    assert!(matches!(
        run.report.exception().unwrap().error,
        RuntimeError::TimeoutExceeded { ticks: 1_000 }
    ));
}

#[test]
fn frames_release_their_objects() {
    let mut run = run_main(
        r#"
class Foo
{
    var X : Integer = 1;
    [Static] function Main() : Integer
    {
        var foo = new Foo();
        var bar = new Foo();
        return foo.X + bar.X;
    }
}
"#,
    );
    assert_eq!(integer_result(&run), 2);
    assert!(
        run.state.heap.live_objects().is_empty(),
        "locals must release their references when the frame dies"
    );
    run.state.teardown(&run.ctx);
    assert!(
        !run.output.borrow().contains("still referenced"),
        "no leaks should be reported"
    );
}

#[test]
fn destructor_runs_once_when_last_reference_drops() {
    let run = run_main(
        r#"
class Noisy
{
    destructor()
    {
        Console.WriteLine("gone");
    }
    [Static] function Main() : Integer
    {
        var a = new Noisy();
        var b = a;
        return 0;
    }
}
"#,
    );
    assert_eq!(integer_result(&run), 0);
    assert_eq!(run.output.borrow().as_str(), "gone\n");
}

#[test]
fn delete_runs_the_destructor_before_reclaim() {
    let run = run_main(
        r#"
class Noisy
{
    destructor()
    {
        Console.WriteLine("gone");
    }
    [Static] function Main() : Integer
    {
        var a = new Noisy();
        delete a;
        Console.WriteLine("after");
        return 0;
    }
}
"#,
    );
    assert_eq!(integer_result(&run), 0);
    assert_eq!(run.output.borrow().as_str(), "gone\nafter\n");
}

// ----- debugger boundary -----

/// A transport that records outbound traffic and feeds back one scripted
/// reply per pause (per `SetExecutionPoint` observed).
struct ScriptedTransport {
    sent: Rc<RefCell<Vec<OutgoingMessage>>>,
    replies: VecDeque<IncomingMessage>,
    answered: usize,
}

impl ScriptedTransport {
    fn new(replies: Vec<IncomingMessage>) -> (ScriptedTransport, Rc<RefCell<Vec<OutgoingMessage>>>) {
        let sent = Rc::new(RefCell::new(Vec::new()));
        (
            ScriptedTransport {
                sent: sent.clone(),
                replies: replies.into(),
                answered: 0,
            },
            sent,
        )
    }
}

impl Transport for ScriptedTransport {
    fn send(&mut self, message: &OutgoingMessage) {
        self.sent.borrow_mut().push(message.clone());
    }

    fn try_receive(&mut self) -> Option<IncomingMessage> {
        let pauses = self
            .sent
            .borrow()
            .iter()
            .filter(|m| matches!(m, OutgoingMessage::SetExecutionPoint { .. }))
            .count();
        if pauses > self.answered {
            self.answered += 1;
            return self.replies.pop_front();
        }
        None
    }
}

const DEBUG_SCRIPT: &str = r#"
class Foo
{
    var X : Integer = 5;
    function Bump()
    {
        this.X += 1;
    }
    [Static] function Main() : Integer
    {
        var foo = new Foo();
        foo.Bump();
        foo.Bump();
        return foo.X;
    }
}
"#;

/// The entry hash and the source line of the first call in Main's body.
fn first_call_site(ctx: &Context, library: &LibraryRef) -> (u64, u32) {
    let main = quill::commands::common::find_entry_point(ctx, library).unwrap();
    let code = ctx.function(main).code.as_ref().unwrap();
    let line = code
        .opcodes
        .iter()
        .zip(&code.lines)
        .find_map(|(op, &line)| {
            matches!(op, quill::codegen::Opcode::Call { .. }).then_some(line)
        })
        .expect("Main contains a call");
    (code.entry_hash, line)
}

#[test]
fn breakpoint_pauses_and_sets_exactly_one_execution_point() {
    let (ctx, library) = compile(DEBUG_SCRIPT);
    let (hash, line) = first_call_site(&ctx, &library);

    let (transport, sent) = ScriptedTransport::new(vec![IncomingMessage::Resume]);
    let mut debugger = Debugger::new(Box::new(transport));
    debugger.set_breakpoint(hash, line);

    let mut module = Module::new(&ctx);
    module.add(library.clone());
    let mut state = ExecutableState::new(&ctx, module);
    state.attach_debugger(debugger);

    let mut report = ExceptionReport::new();
    state.link(&ctx, &mut report);
    let main = quill::commands::common::find_entry_point(&ctx, &library).unwrap();
    // A breakpoint pause must not burn the timeout budget.
    state.push_timeout(1_000_000);
    let value = call_function(&ctx, &mut state, main, None, vec![], &mut report);
    state.pop_timeout();

    assert!(!report.is_set());
    assert_eq!(value.and_then(|v| v.as_integer()), Some(7));

    let sent = sent.borrow();
    let points: Vec<_> = sent
        .iter()
        .filter_map(|m| match m {
            OutgoingMessage::SetExecutionPoint {
                code_hash, line, ..
            } => Some((*code_hash, *line)),
            _ => None,
        })
        .collect();
    assert_eq!(points, vec![(hash, line)]);
    assert!(sent
        .iter()
        .any(|m| matches!(m, OutgoingMessage::ClearExecutionPoint)));
}

#[test]
fn breakpoint_does_not_refire_after_returning_from_a_call() {
    // The breakpoint line keeps executing opcodes after the callee returns;
    // that continuation is the same arrival, not a new one.
    let source = r#"
class Game
{
    [Static] function Two() : Integer
    {
        return 2;
    }
    [Static] function Main() : Integer
    {
        var r = Game.Two() + 5;
        return r;
    }
}
"#;
    let (ctx, library) = compile(source);
    let (hash, line) = first_call_site(&ctx, &library);

    // Generous replies: an unexpected second pause would consume one and
    // show up in the execution point count instead of hanging.
    let (transport, sent) = ScriptedTransport::new(vec![IncomingMessage::Resume; 4]);
    let mut debugger = Debugger::new(Box::new(transport));
    debugger.set_breakpoint(hash, line);

    let mut module = Module::new(&ctx);
    module.add(library.clone());
    let mut state = ExecutableState::new(&ctx, module);
    state.attach_debugger(debugger);

    let mut report = ExceptionReport::new();
    state.link(&ctx, &mut report);
    let main = quill::commands::common::find_entry_point(&ctx, &library).unwrap();
    let value = call_function(&ctx, &mut state, main, None, vec![], &mut report);

    assert!(!report.is_set());
    assert_eq!(value.and_then(|v| v.as_integer()), Some(7));

    let pauses = sent
        .borrow()
        .iter()
        .filter(|m| matches!(m, OutgoingMessage::SetExecutionPoint { .. }))
        .count();
    assert_eq!(pauses, 1);
}

#[test]
fn step_in_pauses_again_at_the_next_line() {
    let (ctx, library) = compile(DEBUG_SCRIPT);
    let (hash, line) = first_call_site(&ctx, &library);

    let (transport, sent) = ScriptedTransport::new(vec![
        IncomingMessage::StepIn,
        IncomingMessage::Resume,
    ]);
    let mut debugger = Debugger::new(Box::new(transport));
    debugger.set_breakpoint(hash, line);

    let mut module = Module::new(&ctx);
    module.add(library.clone());
    let mut state = ExecutableState::new(&ctx, module);
    state.attach_debugger(debugger);

    let mut report = ExceptionReport::new();
    state.link(&ctx, &mut report);
    let main = quill::commands::common::find_entry_point(&ctx, &library).unwrap();
    let value = call_function(&ctx, &mut state, main, None, vec![], &mut report);

    assert!(!report.is_set());
    assert_eq!(value.and_then(|v| v.as_integer()), Some(7));

    let pauses = sent
        .borrow()
        .iter()
        .filter(|m| matches!(m, OutgoingMessage::SetExecutionPoint { .. }))
        .count();
    assert_eq!(pauses, 2);
}
