//! 非同期スタックトレーサ
//!
//! 分類器とリゾルバのレジストリを束ねます。登録は [`TracerBuilder`] でのみ行え、
//! `build()` した後のトレーサは変更できません。

use crate::classify::ClassifierRegistry;
use crate::generator::{generator_node, is_generator_future};
use crate::node::StackTraceNode;
use crate::printer::StackTracePrinter;
use crate::resolve::{ResolveContext, ResolverRegistry};
use crate::resolvers::register_builtin_resolvers;
use crate::{SubFutures, TraceConfig, TraceResult, ValueHandle};
use std::io::Write;

/// 非同期スタックトレーサ
pub struct AsyncStackTracer<V> {
    classifiers: ClassifierRegistry<V>,
    resolvers: ResolverRegistry<V>,
    config: TraceConfig,
}

impl<V: ValueHandle> AsyncStackTracer<V> {
    /// 空のビルダーを作成する
    pub fn builder() -> TracerBuilder<V> {
        TracerBuilder::new()
    }

    /// 組み込みの分類器とリゾルバだけを持つトレーサを作成する
    pub fn with_builtins() -> Self {
        Self::builder().register_builtins().build()
    }

    /// 値をノードに分類する
    pub fn classify<'a>(&self, value: &'a V) -> Option<Box<dyn StackTraceNode<V> + 'a>> {
        self.classifiers.classify(value)
    }

    /// awaitee をサブFutureに解決する
    pub fn resolve_sub_futures(&self, value: V) -> TraceResult<SubFutures<V>> {
        self.resolvers.resolve(value)
    }

    /// ルートのFutureから非同期スタックトレースを出力する
    pub fn print_stack_trace<W: Write>(&self, root: V, out: W) -> TraceResult<()> {
        StackTracePrinter::new(self, out).print_root(root)
    }

    /// 分類器レジストリ
    pub fn classifiers(&self) -> &ClassifierRegistry<V> {
        &self.classifiers
    }

    /// リゾルバレジストリ
    pub fn resolvers(&self) -> &ResolverRegistry<V> {
        &self.resolvers
    }

    /// 設定
    pub fn config(&self) -> &TraceConfig {
        &self.config
    }
}

/// トレーサのビルダー
///
/// 分類器・リゾルバは登録順に試されます。[`TracerBuilder::register_builtins`] より前に
/// 登録したものは組み込みより優先され、後に登録したものは組み込みが適用されない場合にのみ使われます。
pub struct TracerBuilder<V> {
    classifiers: ClassifierRegistry<V>,
    resolvers: ResolverRegistry<V>,
    config: TraceConfig,
}

impl<V: ValueHandle> TracerBuilder<V> {
    /// 空のビルダーを作成する
    pub fn new() -> Self {
        let config = TraceConfig::default();
        Self {
            classifiers: ClassifierRegistry::new(),
            resolvers: ResolverRegistry::new(config.max_resolve_depth),
            config,
        }
    }

    /// 設定を指定する
    pub fn config(mut self, config: TraceConfig) -> Self {
        self.resolvers.set_max_depth(config.max_resolve_depth);
        self.config = config;
        self
    }

    /// ノード分類器を登録する
    pub fn register_stack_trace_provider<M, F>(
        mut self,
        name: impl Into<String>,
        matcher: M,
        factory: F,
    ) -> Self
    where
        M: Fn(&V) -> bool + 'static,
        F: for<'a> Fn(&'a V) -> TraceResult<Box<dyn StackTraceNode<V> + 'a>> + 'static,
    {
        self.classifiers.register(name, matcher, factory);
        self
    }

    /// サブFutureリゾルバを登録する
    pub fn register_sub_future_resolver<F>(mut self, name: impl Into<String>, resolve: F) -> Self
    where
        F: Fn(&V, &ResolveContext<'_, V>) -> TraceResult<Option<SubFutures<V>>> + 'static,
    {
        self.resolvers.register(name, resolve);
        self
    }

    /// 組み込みの分類器とリゾルバをこの位置に追加する
    pub fn register_builtins(mut self) -> Self {
        self.classifiers.register(
            "generator",
            is_generator_future::<V>,
            generator_node::<V>,
        );
        register_builtin_resolvers(&mut self.resolvers);
        self
    }

    /// トレーサを作成する
    pub fn build(self) -> AsyncStackTracer<V> {
        AsyncStackTracer {
            classifiers: self.classifiers,
            resolvers: self.resolvers,
            config: self.config,
        }
    }
}

impl<V: ValueHandle> Default for TracerBuilder<V> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::synthetic::SyntheticValue;

    #[test]
    fn test_builtins_registered() {
        let tracer: AsyncStackTracer<SyntheticValue> = AsyncStackTracer::with_builtins();
        assert_eq!(tracer.classifiers().names().collect::<Vec<_>>(), vec!["generator"]);
        assert_eq!(tracer.resolvers().len(), 4);
    }

    #[test]
    fn test_config_is_applied() {
        let config = TraceConfig {
            max_depth: 3,
            max_resolve_depth: 2,
        };
        let tracer: AsyncStackTracer<SyntheticValue> =
            AsyncStackTracer::builder().config(config.clone()).build();
        assert_eq!(tracer.config(), &config);
    }

    #[test]
    fn test_extension_before_builtins_takes_priority() {
        let tracer = AsyncStackTracer::builder()
            .register_sub_future_resolver(
                "pin-override",
                |value: &SyntheticValue, _: &ResolveContext<'_, SyntheticValue>| {
                    if value.type_name_starts_with("core::pin::Pin<") {
                        return Ok(Some(SubFutures::simple(SyntheticValue::opaque("overridden"))));
                    }
                    Ok(None)
                },
            )
            .register_builtins()
            .build();

        let pinned = SyntheticValue::structure(
            "core::pin::Pin<&mut pkg::Leaf>",
            vec![("pointer", SyntheticValue::reference("&mut pkg::Leaf", SyntheticValue::opaque("pkg::Leaf")))],
        );
        let resolved = tracer.resolve_sub_futures(pinned).unwrap();
        assert_eq!(resolved.items()[0].type_name().as_deref(), Some("overridden"));
    }
}
