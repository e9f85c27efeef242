//! スタックトレースの木の出力
//!
//! 出力例:
//!
//! ```text
//! basic_async::foo() [x=42]
//!   basic_async::bar() [a=86, x=43]
//!   (SELECT)
//!   => basic_async::baz() [x=44, y=88]
//!        futures_util::future::pending::Pending<u32>
//!   => basic_async::baz() [x=88, y=176]
//!        futures_util::future::pending::Pending<u32>
//! ```

use crate::{AsyncStackTracer, SubFutureKind, SubFutures, TraceError, TraceResult, ValueHandle};
use std::io::Write;

/// 入れ子1段ごとのインデント幅
const NESTED_INDENT: usize = 2;

/// select の各分岐のプレフィックス
const SELECT_BRANCH_PREFIX: &str = "=> ";

/// select の目印
const SELECT_MARKER: &str = "(SELECT)";

/// スタックトレースプリンタ
pub struct StackTracePrinter<'t, V, W> {
    tracer: &'t AsyncStackTracer<V>,
    out: W,
}

impl<'t, V: ValueHandle, W: Write> StackTracePrinter<'t, V, W> {
    /// 新しいプリンタを作成する
    pub fn new(tracer: &'t AsyncStackTracer<V>, out: W) -> Self {
        Self { tracer, out }
    }

    /// 出力先を取り出す
    pub fn into_inner(self) -> W {
        self.out
    }

    /// ルートの値を解決してから出力する
    ///
    /// ルートには `Pin<Box<..>>` やポインタをそのまま渡せます。
    pub fn print_root(&mut self, root: V) -> TraceResult<()> {
        let result = self
            .tracer
            .resolve_sub_futures(root)
            .and_then(|sub_futures| self.print_sub_futures(sub_futures, 0, 0));
        self.out.flush()?;
        result
    }

    /// 1つの値とその awaitee を再帰的に出力する
    ///
    /// # Arguments
    /// * `value` - 出力する値
    /// * `indent` - 行頭の空白数
    /// * `prefix` - ラベルの前に付ける文字列
    pub fn print_stack_trace(&mut self, value: &V, indent: usize, prefix: &str) -> TraceResult<()> {
        let result = self.print_node(value, indent, prefix, 0);
        if indent == 0 {
            self.out.flush()?;
        }
        result
    }

    fn print_node(&mut self, value: &V, indent: usize, prefix: &str, depth: usize) -> TraceResult<()> {
        let max_depth = self.tracer.config().max_depth;
        if depth > max_depth {
            return Err(TraceError::DepthExceeded(max_depth));
        }

        let node = match self.tracer.classify(value) {
            Some(node) => node,
            None => return Ok(()),
        };

        writeln!(self.out, "{:indent$}{}{}", "", prefix, node.label(), indent = indent)?;

        let indent = indent + prefix.len();
        if let Some(awaitee) = node.awaitee() {
            let sub_futures = self.tracer.resolve_sub_futures(awaitee)?;
            self.print_sub_futures(sub_futures, indent, depth + 1)?;
        }

        Ok(())
    }

    fn print_sub_futures(
        &mut self,
        sub_futures: SubFutures<V>,
        indent: usize,
        depth: usize,
    ) -> TraceResult<()> {
        match sub_futures.kind() {
            SubFutureKind::Simple => match sub_futures.into_single() {
                Some(item) => {
                    let child_indent = if depth == 0 { 0 } else { indent + NESTED_INDENT };
                    self.print_node(&item, child_indent, "", depth)
                }
                None => Ok(()),
            },
            SubFutureKind::Select => {
                writeln!(self.out, "{:indent$}{}", "", SELECT_MARKER, indent = indent)?;
                for item in sub_futures.items() {
                    self.print_node(item, indent, SELECT_BRANCH_PREFIX, depth)?;
                }
                Ok(())
            }
            SubFutureKind::Join => Err(TraceError::UnsupportedKind(SubFutureKind::Join)),
        }
    }
}
