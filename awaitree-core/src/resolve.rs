//! サブFuture解決
//!
//! awaitee を、スタックトレース上でそれぞれ独自のフレームを持つ具体的なFutureの
//! 集合に還元します。自明な場合は awaitee 自身がそのままサブFutureです
//! （async fn の中で別の async fn を .await した場合）。それ以外に:
//!
//! - ポインタや `Pin` などのラッパーの背後にある場合は参照外しする
//! - select / join などのコンビネータの場合は、中のFutureを取り出す
//!
//! リゾルバは登録順に試され、最初に結果を返したものが採用されます。

use crate::{SubFutures, TraceError, TraceResult, ValueHandle};
use tracing::debug;

/// リゾルバ関数
///
/// 対象外なら `Ok(None)` を返します。値の読み取りエラー（[`TraceError::is_recoverable`]）も
/// 「対象外」として扱われます。
pub type ResolverFn<V> =
    Box<dyn Fn(&V, &ResolveContext<'_, V>) -> TraceResult<Option<SubFutures<V>>>>;

struct NamedResolver<V> {
    name: String,
    resolve: ResolverFn<V>,
}

/// サブFutureリゾルバのレジストリ
pub struct ResolverRegistry<V> {
    resolvers: Vec<NamedResolver<V>>,
    max_depth: usize,
}

impl<V: ValueHandle> ResolverRegistry<V> {
    /// 空のレジストリを作成する
    ///
    /// # Arguments
    /// * `max_depth` - ラッパーやポインタをたどる再帰の上限
    pub fn new(max_depth: usize) -> Self {
        Self {
            resolvers: Vec::new(),
            max_depth,
        }
    }

    /// リゾルバを末尾に追加する
    pub fn register<F>(&mut self, name: impl Into<String>, resolve: F)
    where
        F: Fn(&V, &ResolveContext<'_, V>) -> TraceResult<Option<SubFutures<V>>> + 'static,
    {
        self.resolvers.push(NamedResolver {
            name: name.into(),
            resolve: Box::new(resolve),
        });
    }

    /// 再帰の上限を変更する
    pub(crate) fn set_max_depth(&mut self, max_depth: usize) {
        self.max_depth = max_depth;
    }

    /// awaitee をサブFutureに解決する
    pub fn resolve(&self, value: V) -> TraceResult<SubFutures<V>> {
        ResolveContext {
            registry: self,
            depth: 0,
        }
        .resolve(value)
    }

    /// 登録名の一覧（登録順）
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.resolvers.iter().map(|r| r.name.as_str())
    }

    /// 登録数
    pub fn len(&self) -> usize {
        self.resolvers.len()
    }

    /// 空かどうか
    pub fn is_empty(&self) -> bool {
        self.resolvers.is_empty()
    }
}

/// 解決中の文脈
///
/// リゾルバはラッパーを剥がした後の値を [`ResolveContext::resolve`] で再帰的に解決します。
pub struct ResolveContext<'r, V> {
    registry: &'r ResolverRegistry<V>,
    depth: usize,
}

impl<'r, V: ValueHandle> ResolveContext<'r, V> {
    /// 現在の再帰の深さ
    pub fn depth(&self) -> usize {
        self.depth
    }

    /// 値をサブFutureに解決する
    pub fn resolve(&self, value: V) -> TraceResult<SubFutures<V>> {
        if self.depth > self.registry.max_depth {
            return Err(TraceError::DepthExceeded(self.registry.max_depth));
        }

        let nested = ResolveContext {
            registry: self.registry,
            depth: self.depth + 1,
        };

        for resolver in &self.registry.resolvers {
            match (resolver.resolve)(&value, &nested) {
                Ok(Some(resolved)) => {
                    debug!(
                        "{} resolved {:?} into {} {} item(s)",
                        resolver.name,
                        value.type_name().unwrap_or_default(),
                        resolved.kind(),
                        resolved.len()
                    );
                    return Ok(resolved);
                }
                Ok(None) => {}
                Err(e) if e.is_recoverable() => {
                    debug!("{} skipped {:?}: {}", resolver.name, value.type_name(), e);
                }
                Err(e) => return Err(e),
            }
        }

        Ok(SubFutures::simple(value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::synthetic::SyntheticValue;
    use crate::{SubFutureKind, ValueError};

    fn deref_resolver(
        value: &SyntheticValue,
        cx: &ResolveContext<'_, SyntheticValue>,
    ) -> TraceResult<Option<SubFutures<SyntheticValue>>> {
        if value.type_code().is_thin_pointer() {
            return cx.resolve(value.dereference()?).map(Some);
        }
        Ok(None)
    }

    #[test]
    fn test_identity_without_resolvers() {
        let registry = ResolverRegistry::new(8);
        let value = SyntheticValue::opaque("pkg::Leaf");
        let resolved = registry.resolve(value.clone()).unwrap();
        assert_eq!(resolved.kind(), SubFutureKind::Simple);
        assert_eq!(resolved.len(), 1);
        assert!(resolved.items()[0].ptr_eq(&value));
    }

    #[test]
    fn test_recoverable_error_means_not_applicable() {
        let mut registry = ResolverRegistry::new(8);
        registry.register("broken", |_: &SyntheticValue, _: &ResolveContext<'_, SyntheticValue>| {
            Err(ValueError::TypeUnavailable("broken".to_string()).into())
        });
        let value = SyntheticValue::opaque("pkg::Leaf");
        let resolved = registry.resolve(value.clone()).unwrap();
        assert!(resolved.items()[0].ptr_eq(&value));
    }

    #[test]
    fn test_hard_error_propagates() {
        let mut registry = ResolverRegistry::new(8);
        registry.register("join", |_: &SyntheticValue, _: &ResolveContext<'_, SyntheticValue>| {
            Err(TraceError::UnsupportedKind(SubFutureKind::Join))
        });
        let result = registry.resolve(SyntheticValue::opaque("pkg::Leaf"));
        assert!(matches!(result, Err(TraceError::UnsupportedKind(SubFutureKind::Join))));
    }

    #[test]
    fn test_first_resolver_wins() {
        let mut registry = ResolverRegistry::new(8);
        registry.register("first", |_: &SyntheticValue, _: &ResolveContext<'_, SyntheticValue>| {
            Ok(Some(SubFutures::simple(SyntheticValue::opaque("first"))))
        });
        registry.register("second", |_: &SyntheticValue, _: &ResolveContext<'_, SyntheticValue>| {
            Ok(Some(SubFutures::simple(SyntheticValue::opaque("second"))))
        });
        let resolved = registry.resolve(SyntheticValue::opaque("pkg::Leaf")).unwrap();
        assert_eq!(resolved.items()[0].type_name().as_deref(), Some("first"));
    }

    #[test]
    fn test_depth_limit() {
        let mut registry = ResolverRegistry::new(4);
        registry.register("deref", deref_resolver);

        let mut value = SyntheticValue::opaque("pkg::Leaf");
        for _ in 0..10 {
            value = SyntheticValue::pointer("*const pkg::Leaf", value);
        }
        assert!(matches!(registry.resolve(value), Err(TraceError::DepthExceeded(4))));
    }
}
