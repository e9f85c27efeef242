//! async fn / async ブロックの状態機械ノード
//!
//! コンパイラが生成する状態機械は、現在の停止点に対応するvariantを
//! 数字だけの名前のフィールドとして持ちます。そのvariantの中に、
//! 停止点をまたいで生きているローカル変数と、awaitしているFuture（`__awaitee`）が入っています。

use crate::node::{StackTraceNode, UNKNOWN_LABEL};
use crate::{TraceError, TraceResult, ValueHandle};
use regex::Regex;
use std::sync::OnceLock;
use tracing::debug;

/// 旧来の `GenFuture` ラッパーの型名プレフィックス
pub const GEN_FUTURE_PREFIX: &str = "core::future::from_generator::GenFuture<";

/// awaitしているFutureを保持するフィールド名
pub const AWAITEE_FIELD: &str = "__awaitee";

/// 値の表示に失敗したときのプレースホルダ
const UNAVAILABLE_VALUE: &str = "<unavailable>";

fn async_fn_env_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"::\{async_fn_env#\d+\}").expect("async_fn_env pattern is valid")
    })
}

fn state_machine_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"\{async_(?:fn|block)_env#\d+\}").expect("state machine pattern is valid")
    })
}

/// 状態機械の型名から `::{async_fn_env#N}` を取り除き `()` に置き換える
///
/// 例: `pkg::foo::{async_fn_env#0}` -> `pkg::foo()`
pub fn strip_async_fn_env(name: &str) -> String {
    async_fn_env_pattern().replace_all(name, "()").into_owned()
}

/// 値がコンパイラ生成の状態機械（またはそれを包む `GenFuture`）かどうか
pub fn is_generator_future<V: ValueHandle>(value: &V) -> bool {
    match value.type_name() {
        Some(name) => name.starts_with(GEN_FUTURE_PREFIX) || state_machine_pattern().is_match(&name),
        None => false,
    }
}

/// 数字だけからなるフィールド名かどうか
fn is_state_field(name: &str) -> bool {
    !name.is_empty() && name.chars().all(|c| c.is_ascii_digit())
}

/// async fn / async ブロックのノード
pub struct GeneratorFutureNode<'a, V> {
    root: &'a V,
    /// `GenFuture` の場合のみ、その中の状態機械
    inner: Option<V>,
    /// 現在の停止点のvariant
    state: V,
}

impl<'a, V: ValueHandle> GeneratorFutureNode<'a, V> {
    /// 値がコンパイラ生成の状態機械かどうか
    pub fn matches(value: &V) -> bool {
        is_generator_future(value)
    }

    /// 状態フィールドを探してノードを作成する
    pub fn new(value: &'a V) -> TraceResult<Self> {
        let inner = if value.type_name_starts_with(GEN_FUTURE_PREFIX) {
            Some(value.field("__0")?)
        } else {
            None
        };

        let machine = inner.as_ref().unwrap_or(value);
        let state_name = machine
            .field_names()?
            .into_iter()
            .find(|name| is_state_field(name))
            .ok_or_else(|| {
                TraceError::MissingGeneratorState(
                    machine.type_name().unwrap_or_else(|| UNKNOWN_LABEL.to_string()),
                )
            })?;
        debug!("generator state field: {}", state_name);
        let state = machine.field(&state_name)?;

        Ok(Self {
            root: value,
            inner,
            state,
        })
    }

    /// 状態機械本体
    fn machine(&self) -> &V {
        self.inner.as_ref().unwrap_or(self.root)
    }

    /// `name=value` の一覧（`__awaitee` を除く）
    fn locals(&self) -> Vec<String> {
        let names = match self.state.field_names() {
            Ok(names) => names,
            Err(e) => {
                debug!("cannot enumerate generator locals: {}", e);
                return Vec::new();
            }
        };

        names
            .into_iter()
            .filter(|name| name != AWAITEE_FIELD)
            .map(|name| {
                let value = self
                    .state
                    .field(&name)
                    .and_then(|v| v.render())
                    .unwrap_or_else(|_| UNAVAILABLE_VALUE.to_string());
                format!("{}={}", name, value)
            })
            .collect()
    }
}

impl<V: ValueHandle> StackTraceNode<V> for GeneratorFutureNode<'_, V> {
    fn label(&self) -> String {
        let mut name = self
            .machine()
            .type_name()
            .unwrap_or_else(|| UNKNOWN_LABEL.to_string());

        let locals = self.locals();
        if !locals.is_empty() {
            name.push_str(" [");
            name.push_str(&locals.join(", "));
            name.push(']');
        }

        strip_async_fn_env(&name)
    }

    fn awaitee(&self) -> Option<V> {
        if !self.state.has_field(AWAITEE_FIELD) {
            return None;
        }
        match self.state.field(AWAITEE_FIELD) {
            Ok(awaitee) => Some(awaitee),
            Err(e) => {
                debug!("cannot read {}: {}", AWAITEE_FIELD, e);
                None
            }
        }
    }
}

/// 分類器レジストリに登録するコンストラクタ
pub fn generator_node<'a, V: ValueHandle>(
    value: &'a V,
) -> TraceResult<Box<dyn StackTraceNode<V> + 'a>> {
    Ok(Box::new(GeneratorFutureNode::new(value)?))
}
