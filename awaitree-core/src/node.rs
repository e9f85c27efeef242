//! スタックトレースノード
//!
//! ノードは走査の1ステップごとに値ハンドルから作られ、使い終わると破棄されます。
//! ノードは値ハンドルを借用するだけで、所有はしません。

use crate::ValueHandle;

/// ラベルが取得できない場合の表示
pub const UNKNOWN_LABEL: &str = "<unknown>";

/// 非同期スタックトレースの木の1ノード
pub trait StackTraceNode<V> {
    /// 表示するラベル
    fn label(&self) -> String;

    /// 現在awaitしているFuture。葉ノードならNone
    fn awaitee(&self) -> Option<V>;
}

/// どの分類器にもマッチしなかった値のノード
///
/// 型名だけを表示する終端ノードです。
pub struct OpaqueNode<'a, V> {
    value: &'a V,
}

impl<'a, V: ValueHandle> OpaqueNode<'a, V> {
    /// 新しいノードを作成する
    pub fn new(value: &'a V) -> Self {
        Self { value }
    }
}

impl<V: ValueHandle> StackTraceNode<V> for OpaqueNode<'_, V> {
    fn label(&self) -> String {
        self.value
            .type_name()
            .unwrap_or_else(|| UNKNOWN_LABEL.to_string())
    }

    fn awaitee(&self) -> Option<V> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::synthetic::SyntheticValue;

    #[test]
    fn test_opaque_node_label() {
        let value = SyntheticValue::opaque("futures_util::future::pending::Pending<u32>");
        let node = OpaqueNode::new(&value);
        assert_eq!(node.label(), "futures_util::future::pending::Pending<u32>");
        assert!(node.awaitee().is_none());
    }

    #[test]
    fn test_opaque_node_unknown_type() {
        let value = SyntheticValue::unnamed();
        let node = OpaqueNode::new(&value);
        assert_eq!(node.label(), UNKNOWN_LABEL);
    }
}
