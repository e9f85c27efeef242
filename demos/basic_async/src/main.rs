//! 非同期スタックトレース表示のサンプルプログラム
//!
//! `foo` が `bar` を待ち、`bar` が3つの `baz` の race を待つ状態で停止します。
//! 表示されたpidと式を使って awaitree から論理スタックを表示できます。
//!
//! ```text
//! $ awaitree attach target/debug/basic_async --pid <pid>
//! (awaitree) print-stack-trace {basic_async::foo::{async_fn_env#0}} 0x...
//! ```

use std::sync::Arc;
use std::task::{Context, Poll, Waker};
use std::time::Duration;

use futures::task::{waker, ArcWake};
use futures::FutureExt;
use futures_concurrency::future::Race;

async fn foo(x: u32) -> u32 {
    bar(x + 1).await + 7
}

async fn bar(x: u32) -> u32 {
    let a = x * 2;
    [baz(x + 1), baz(a + 2), baz(x + 3)].race().await * 7 + a
}

async fn baz(x: u32) -> u32 {
    let y = x << 1;
    futures::future::pending::<u32>().await + x * y
}

/// 何もしないWaker
fn dummy_waker() -> Waker {
    struct DummyWaker;
    impl ArcWake for DummyWaker {
        fn wake_by_ref(_: &Arc<Self>) {}
    }

    waker(Arc::new(DummyWaker))
}

fn main() {
    let mut future = Box::pin(foo(42));
    let waker = dummy_waker();
    let cx = &mut Context::from_waker(&waker);

    // 1回だけpollして、全てのFutureを保留状態にする
    assert_eq!(future.poll_unpin(cx), Poll::Pending);

    println!("pid: {}", std::process::id());
    println!(
        "expression: {{basic_async::foo::{{async_fn_env#0}}}} {:p}",
        &*future
    );

    // デバッガからアタッチされるまで待機する
    loop {
        std::thread::sleep(Duration::from_secs(1));
        std::hint::black_box(&future);
    }
}
