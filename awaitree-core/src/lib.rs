//! awaitree 非同期スタックトレースのコア機能
//!
//! このクレートは、停止中のプロセスやコアダンプのメモリ上にあるFutureの木から、
//! 論理的な非同期スタックトレースを組み立てて出力します。
//! 値の読み取りは [`ValueHandle`] を実装したホスト側（DWARFローダなど）に委ねます。
//!
//! ```
//! use awaitree_core::{AsyncStackTracer, synthetic::SyntheticValue};
//!
//! let leaf = SyntheticValue::opaque("pkg::Leaf");
//! let root = SyntheticValue::async_fn("pkg::main", 3, vec![], Some(leaf));
//!
//! let tracer = AsyncStackTracer::with_builtins();
//! let mut out = Vec::new();
//! tracer.print_stack_trace(root, &mut out).unwrap();
//! assert_eq!(String::from_utf8(out).unwrap(), "pkg::main()\n  pkg::Leaf\n");
//! ```

pub mod classify;
pub mod config;
pub mod error;
pub mod generator;
pub mod node;
pub mod printer;
pub mod resolve;
pub mod resolvers;
pub mod sub_futures;
pub mod synthetic;
pub mod tracer;
pub mod value;

pub use classify::ClassifierRegistry;
pub use config::TraceConfig;
pub use error::{TraceError, TraceResult, ValueError, ValueResult};
pub use generator::GeneratorFutureNode;
pub use node::{OpaqueNode, StackTraceNode};
pub use printer::StackTracePrinter;
pub use resolve::{ResolveContext, ResolverRegistry};
pub use sub_futures::{SubFutureKind, SubFutures};
pub use tracer::{AsyncStackTracer, TracerBuilder};
pub use value::{TypeCode, ValueHandle};
