//! awaitee を解決した結果

use std::fmt;

/// サブFutureの組み合わせ方
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SubFutureKind {
    /// 単一のFuture
    Simple,
    /// すべての完了を待つコンビネータ（未実装）
    Join,
    /// 最初に完了したものを採るコンビネータ
    Select,
}

impl fmt::Display for SubFutureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SubFutureKind::Simple => write!(f, "SIMPLE"),
            SubFutureKind::Join => write!(f, "JOIN"),
            SubFutureKind::Select => write!(f, "SELECT"),
        }
    }
}

/// awaitee から得られた具体的なFutureの並び
///
/// `Simple` は常にちょうど1要素を持ちます。
#[derive(Debug, Clone)]
pub struct SubFutures<V> {
    kind: SubFutureKind,
    items: Vec<V>,
}

impl<V> SubFutures<V> {
    /// 単一のFuture
    pub fn simple(item: V) -> Self {
        Self {
            kind: SubFutureKind::Simple,
            items: vec![item],
        }
    }

    /// select/race の各分岐（元の並び順）
    pub fn select(items: Vec<V>) -> Self {
        Self {
            kind: SubFutureKind::Select,
            items,
        }
    }

    /// join の各要素
    pub fn join(items: Vec<V>) -> Self {
        Self {
            kind: SubFutureKind::Join,
            items,
        }
    }

    /// 組み合わせ方
    pub fn kind(&self) -> SubFutureKind {
        self.kind
    }

    /// 要素
    pub fn items(&self) -> &[V] {
        &self.items
    }

    /// 要素数
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// 要素がないかどうか
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// `Simple` の唯一の要素を取り出す
    pub fn into_single(self) -> Option<V> {
        match self.kind {
            SubFutureKind::Simple => self.items.into_iter().next(),
            _ => None,
        }
    }

    /// すべての要素を取り出す
    pub fn into_items(self) -> Vec<V> {
        self.items
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_simple_has_one_item() {
        let sub = SubFutures::simple(7);
        assert_eq!(sub.kind(), SubFutureKind::Simple);
        assert_eq!(sub.items(), &[7]);
        assert_eq!(sub.into_single(), Some(7));
    }

    #[test]
    fn test_select_is_not_single() {
        let sub = SubFutures::select(vec![1, 2, 3]);
        assert_eq!(sub.len(), 3);
        assert_eq!(sub.into_single(), None);
    }

    #[test]
    fn test_kind_display() {
        assert_eq!(SubFutureKind::Simple.to_string(), "SIMPLE");
        assert_eq!(SubFutureKind::Join.to_string(), "JOIN");
        assert_eq!(SubFutureKind::Select.to_string(), "SELECT");
    }
}
