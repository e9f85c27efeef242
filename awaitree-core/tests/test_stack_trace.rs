//! 合成値を使ったスタックトレース出力の統合テスト

use awaitree_core::synthetic::SyntheticValue;
use awaitree_core::{
    AsyncStackTracer, ResolveContext, StackTraceNode, SubFutureKind, SubFutures, TraceError,
    TraceResult, ValueHandle,
};

const PENDING: &str = "futures_util::future::pending::Pending<u32>";

fn print(tracer: &AsyncStackTracer<SyntheticValue>, root: SyntheticValue) -> (TraceResult<()>, String) {
    let mut out = Vec::new();
    let result = tracer.print_stack_trace(root, &mut out);
    (result, String::from_utf8(out).expect("output is UTF-8"))
}

fn baz(x: u32) -> SyntheticValue {
    SyntheticValue::async_fn(
        "basic_async::baz",
        3,
        vec![("x", SyntheticValue::u32(x)), ("y", SyntheticValue::u32(x << 1))],
        Some(SyntheticValue::opaque(PENDING)),
    )
}

/// `Box::pin(foo(42))` を1回pollした直後の木
fn basic_async_root() -> SyntheticValue {
    let race = SyntheticValue::structure(
        "futures_concurrency::future::race::array::Race<basic_async::baz::{async_fn_env#0}, 3>",
        vec![(
            "futures",
            SyntheticValue::array(
                "[basic_async::baz::{async_fn_env#0}; 3]",
                vec![baz(44), baz(88), baz(46)],
            ),
        )],
    );
    let bar = SyntheticValue::async_fn(
        "basic_async::bar",
        3,
        vec![("a", SyntheticValue::u32(86)), ("x", SyntheticValue::u32(43))],
        Some(race),
    );
    let foo = SyntheticValue::async_fn(
        "basic_async::foo",
        3,
        vec![("x", SyntheticValue::u32(42))],
        Some(bar),
    );

    SyntheticValue::structure(
        "core::pin::Pin<alloc::boxed::Box<basic_async::foo::{async_fn_env#0}, alloc::alloc::Global>>",
        vec![(
            "pointer",
            SyntheticValue::pointer(
                "alloc::boxed::Box<basic_async::foo::{async_fn_env#0}, alloc::alloc::Global>",
                foo,
            ),
        )],
    )
}

#[test]
fn test_basic_async_output() {
    let tracer = AsyncStackTracer::with_builtins();
    let (result, text) = print(&tracer, basic_async_root());
    result.unwrap();

    let expected = "\
basic_async::foo() [x=42]
  basic_async::bar() [a=86, x=43]
  (SELECT)
  => basic_async::baz() [x=44, y=88]
       futures_util::future::pending::Pending<u32>
  => basic_async::baz() [x=88, y=176]
       futures_util::future::pending::Pending<u32>
  => basic_async::baz() [x=46, y=92]
       futures_util::future::pending::Pending<u32>
";
    assert_eq!(text, expected);
}

#[test]
fn test_three_deep_chain() {
    let c = SyntheticValue::async_fn("pkg::fn_c", 0, vec![], None);
    let b = SyntheticValue::async_fn("pkg::fn_b", 3, vec![], Some(c));
    let a = SyntheticValue::async_fn("pkg::fn_a", 3, vec![], Some(b));

    let tracer = AsyncStackTracer::with_builtins();
    let (result, text) = print(&tracer, a);
    result.unwrap();

    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(lines, vec!["pkg::fn_a()", "  pkg::fn_b()", "    pkg::fn_c()"]);
}

#[test]
fn test_select_with_two_branches() {
    let race = SyntheticValue::structure(
        "futures_concurrency::future::race::array::Race<pkg::Leaf, 2>",
        vec![(
            "futures",
            SyntheticValue::array(
                "[pkg::Leaf; 2]",
                vec![SyntheticValue::opaque("pkg::Left"), SyntheticValue::opaque("pkg::Right")],
            ),
        )],
    );
    let root = SyntheticValue::async_fn("pkg::main", 3, vec![], Some(race));

    let tracer = AsyncStackTracer::with_builtins();
    let (result, text) = print(&tracer, root);
    result.unwrap();

    assert_eq!(text, "pkg::main()\n(SELECT)\n=> pkg::Left\n=> pkg::Right\n");
}

#[test]
fn test_root_select() {
    let race = SyntheticValue::structure(
        "futures_concurrency::future::race::array::Race<pkg::Leaf, 2>",
        vec![(
            "futures",
            SyntheticValue::array(
                "[pkg::Leaf; 2]",
                vec![SyntheticValue::opaque("pkg::Left"), SyntheticValue::opaque("pkg::Right")],
            ),
        )],
    );

    let tracer = AsyncStackTracer::with_builtins();
    let (result, text) = print(&tracer, race);
    result.unwrap();

    assert_eq!(text, "(SELECT)\n=> pkg::Left\n=> pkg::Right\n");
}

fn join_resolver(
    value: &SyntheticValue,
    _cx: &ResolveContext<'_, SyntheticValue>,
) -> TraceResult<Option<SubFutures<SyntheticValue>>> {
    if !value.type_name_starts_with("pkg::Join<") {
        return Ok(None);
    }
    Ok(Some(SubFutures::join(vec![value.field("a")?, value.field("b")?])))
}

#[test]
fn test_join_is_reported_as_unsupported() {
    let join = SyntheticValue::structure(
        "pkg::Join<pkg::A, pkg::B>",
        vec![("a", SyntheticValue::opaque("pkg::A")), ("b", SyntheticValue::opaque("pkg::B"))],
    );
    let root = SyntheticValue::async_fn("pkg::main", 3, vec![], Some(join.clone()));

    let tracer = AsyncStackTracer::builder()
        .register_builtins()
        .register_sub_future_resolver("join", join_resolver)
        .build();

    let resolved = tracer.resolve_sub_futures(join).unwrap();
    assert_eq!(resolved.kind(), SubFutureKind::Join);

    let (result, text) = print(&tracer, root);
    assert!(matches!(result, Err(TraceError::UnsupportedKind(SubFutureKind::Join))));
    // エラーより前の行は出力されている
    assert_eq!(text, "pkg::main()\n");
}

#[test]
fn test_dyn_future_is_reported() {
    let boxed = SyntheticValue::structure(
        "core::pin::Pin<alloc::boxed::Box<dyn core::future::future::Future<Output=()>, alloc::alloc::Global>>",
        vec![(
            "pointer",
            SyntheticValue::fat_pointer(
                "alloc::boxed::Box<dyn core::future::future::Future<Output=()>, alloc::alloc::Global>",
            ),
        )],
    );
    let inner = SyntheticValue::async_fn("pkg::inner", 3, vec![], Some(boxed));
    let root = SyntheticValue::async_fn("pkg::outer", 3, vec![], Some(inner));

    let tracer = AsyncStackTracer::with_builtins();
    let (result, text) = print(&tracer, root);

    match result {
        Err(TraceError::DynFuture(name)) => assert!(name.contains("dyn core::future::future::Future")),
        other => panic!("Expected DynFuture error, got {:?}", other),
    }
    assert_eq!(text, "pkg::outer()\n  pkg::inner()\n");
}

fn boxed_dyn_future() -> SyntheticValue {
    SyntheticValue::structure(
        "core::pin::Pin<alloc::boxed::Box<dyn core::future::future::Future<Output=u32>, alloc::alloc::Global>>",
        vec![(
            "pointer",
            SyntheticValue::fat_pointer(
                "alloc::boxed::Box<dyn core::future::future::Future<Output=u32>, alloc::alloc::Global>",
            ),
        )],
    )
}

#[test]
fn test_failing_select_branch_keeps_earlier_branches() {
    let boxed = SyntheticValue::async_fn("pkg::boxed", 3, vec![], Some(boxed_dyn_future()));
    let race = SyntheticValue::structure(
        "futures_concurrency::future::race::array::Race<pkg::Fut, 3>",
        vec![(
            "futures",
            SyntheticValue::array("[pkg::Fut; 3]", vec![baz(1), boxed, baz(3)]),
        )],
    );
    let root = SyntheticValue::async_fn("pkg::main", 3, vec![], Some(race));

    let tracer = AsyncStackTracer::with_builtins();
    let (result, text) = print(&tracer, root);

    assert!(matches!(result, Err(TraceError::DynFuture(_))));
    assert_eq!(
        text,
        format!(
            "pkg::main()\n(SELECT)\n=> basic_async::baz() [x=1, y=2]\n     {}\n=> pkg::boxed()\n",
            PENDING
        )
    );
}

#[test]
fn test_dyn_future_race_element_is_reported() {
    let race = SyntheticValue::structure(
        "futures_concurrency::future::race::array::Race<pkg::Fut, 2>",
        vec![(
            "futures",
            SyntheticValue::array("[pkg::Fut; 2]", vec![baz(1), boxed_dyn_future()]),
        )],
    );
    let root = SyntheticValue::async_fn("pkg::main", 3, vec![], Some(race));

    let tracer = AsyncStackTracer::with_builtins();
    let (result, text) = print(&tracer, root);

    // 分岐はすべて解決してから出力するので、select自体は出力されない
    assert!(matches!(result, Err(TraceError::DynFuture(_))));
    assert_eq!(text, "pkg::main()\n");
}

#[test]
fn test_unreadable_local_keeps_going() {
    let root = SyntheticValue::async_fn(
        "pkg::main",
        3,
        vec![("buf", SyntheticValue::unavailable("alloc::vec::Vec<u8>"))],
        Some(SyntheticValue::opaque(PENDING)),
    );

    let tracer = AsyncStackTracer::with_builtins();
    let (result, text) = print(&tracer, root);
    result.unwrap();
    assert_eq!(text, format!("pkg::main() [buf=<unavailable>]\n  {}\n", PENDING));
}

struct TimerNode<'a> {
    value: &'a SyntheticValue,
}

impl StackTraceNode<SyntheticValue> for TimerNode<'_> {
    fn label(&self) -> String {
        let deadline = self
            .value
            .field("deadline")
            .and_then(|v| v.render())
            .unwrap_or_else(|_| "?".to_string());
        format!("sleep until {}", deadline)
    }

    fn awaitee(&self) -> Option<SyntheticValue> {
        None
    }
}

fn is_timer(value: &SyntheticValue) -> bool {
    value.type_name_starts_with("pkg::Timer")
}

fn timer_node<'a>(
    value: &'a SyntheticValue,
) -> TraceResult<Box<dyn StackTraceNode<SyntheticValue> + 'a>> {
    Ok(Box::new(TimerNode { value }))
}

#[test]
fn test_custom_node_provider() {
    let timer = SyntheticValue::structure(
        "pkg::Timer",
        vec![("deadline", SyntheticValue::u32(1500))],
    );
    let root = SyntheticValue::async_fn("pkg::main", 3, vec![], Some(timer));

    let tracer = AsyncStackTracer::builder()
        .register_builtins()
        .register_stack_trace_provider("timer", is_timer, timer_node)
        .build();

    let (result, text) = print(&tracer, root);
    result.unwrap();
    assert_eq!(text, "pkg::main()\n  sleep until 1500\n");
}

#[test]
fn test_first_matching_provider_wins() {
    let tracer = AsyncStackTracer::builder()
        .register_stack_trace_provider("timer", is_timer, timer_node)
        .register_stack_trace_provider(
            "any-pkg",
            |value: &SyntheticValue| value.type_name_starts_with("pkg::"),
            timer_node,
        )
        .build();

    let timer = SyntheticValue::structure("pkg::Timer", vec![]);
    let node = tracer.classify(&timer).unwrap();
    assert_eq!(node.label(), "sleep until ?");
    assert_eq!(tracer.classifiers().names().collect::<Vec<_>>(), vec!["timer", "any-pkg"]);
}
