//! ノード分類器レジストリ
//!
//! (判定関数, コンストラクタ) の組を登録順に試し、最初にマッチしたもので
//! ノードを作ります。どれにもマッチしなければ [`OpaqueNode`] になります。

use crate::node::{OpaqueNode, StackTraceNode};
use crate::{TraceResult, ValueHandle};
use tracing::{debug, warn};

/// 値がこの分類器の対象かどうかを判定する関数
pub type Matcher<V> = Box<dyn Fn(&V) -> bool>;

/// ノードのコンストラクタ
pub type NodeFactory<V> =
    Box<dyn for<'a> Fn(&'a V) -> TraceResult<Box<dyn StackTraceNode<V> + 'a>>>;

/// 登録済みの分類器
struct NodeProvider<V> {
    name: String,
    matcher: Matcher<V>,
    factory: NodeFactory<V>,
}

/// ノード分類器レジストリ
pub struct ClassifierRegistry<V> {
    providers: Vec<NodeProvider<V>>,
}

impl<V: ValueHandle> ClassifierRegistry<V> {
    /// 空のレジストリを作成する
    pub fn new() -> Self {
        Self {
            providers: Vec::new(),
        }
    }

    /// 分類器を末尾に追加する
    pub fn register<M, F>(&mut self, name: impl Into<String>, matcher: M, factory: F)
    where
        M: Fn(&V) -> bool + 'static,
        F: for<'a> Fn(&'a V) -> TraceResult<Box<dyn StackTraceNode<V> + 'a>> + 'static,
    {
        self.providers.push(NodeProvider {
            name: name.into(),
            matcher: Box::new(matcher),
            factory: Box::new(factory),
        });
    }

    /// 値をノードに分類する
    ///
    /// マッチした分類器のコンストラクタが失敗した場合はNoneを返します。
    pub fn classify<'a>(&self, value: &'a V) -> Option<Box<dyn StackTraceNode<V> + 'a>> {
        let provider = match self.providers.iter().find(|p| (p.matcher)(value)) {
            Some(provider) => provider,
            None => return Some(Box::new(OpaqueNode::new(value))),
        };

        debug!(
            "classified {:?} as {}",
            value.type_name().unwrap_or_default(),
            provider.name
        );
        match (provider.factory)(value) {
            Ok(node) => Some(node),
            Err(e) => {
                warn!("{} could not decode {:?}: {}", provider.name, value.type_name(), e);
                None
            }
        }
    }

    /// 登録名の一覧（登録順）
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.providers.iter().map(|p| p.name.as_str())
    }

    /// 登録数
    pub fn len(&self) -> usize {
        self.providers.len()
    }

    /// 空かどうか
    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }
}

impl<V: ValueHandle> Default for ClassifierRegistry<V> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generator::generator_node;
    use crate::synthetic::SyntheticValue;

    struct TaggedNode<'a> {
        tag: &'static str,
        value: &'a SyntheticValue,
    }

    impl StackTraceNode<SyntheticValue> for TaggedNode<'_> {
        fn label(&self) -> String {
            format!("{}:{}", self.tag, self.value.type_name().unwrap_or_default())
        }

        fn awaitee(&self) -> Option<SyntheticValue> {
            None
        }
    }

    fn first_node<'a>(
        value: &'a SyntheticValue,
    ) -> TraceResult<Box<dyn StackTraceNode<SyntheticValue> + 'a>> {
        Ok(Box::new(TaggedNode { tag: "first", value }))
    }

    fn second_node<'a>(
        value: &'a SyntheticValue,
    ) -> TraceResult<Box<dyn StackTraceNode<SyntheticValue> + 'a>> {
        Ok(Box::new(TaggedNode { tag: "second", value }))
    }

    #[test]
    fn test_first_match_wins() {
        let mut registry = ClassifierRegistry::new();
        registry.register("first", |v: &SyntheticValue| v.type_name_starts_with("pkg::"), first_node);
        registry.register("second", |v: &SyntheticValue| v.type_name_starts_with("pkg::"), second_node);

        let value = SyntheticValue::opaque("pkg::Custom");
        let node = registry.classify(&value).unwrap();
        assert_eq!(node.label(), "first:pkg::Custom");
        assert_eq!(registry.names().collect::<Vec<_>>(), vec!["first", "second"]);
    }

    #[test]
    fn test_fallback_is_opaque() {
        let registry: ClassifierRegistry<SyntheticValue> = ClassifierRegistry::new();
        let value = SyntheticValue::opaque("pkg::Leaf");
        let node = registry.classify(&value).unwrap();
        assert_eq!(node.label(), "pkg::Leaf");
        assert!(node.awaitee().is_none());
    }

    #[test]
    fn test_factory_failure_yields_nothing() {
        let mut registry = ClassifierRegistry::new();
        registry.register("generator", |_: &SyntheticValue| true, generator_node::<SyntheticValue>);

        let value = SyntheticValue::opaque("pkg::foo::{async_fn_env#0}");
        assert!(registry.classify(&value).is_none());
    }
}
