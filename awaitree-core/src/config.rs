//! トレース設定

/// トレース設定
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TraceConfig {
    /// 表示する木の最大深さ（壊れた構造での無限再帰を防ぐ）
    pub max_depth: usize,
    /// 1つの awaitee を解決する際の最大再帰深さ
    pub max_resolve_depth: usize,
}

impl Default for TraceConfig {
    fn default() -> Self {
        Self {
            max_depth: 256,
            max_resolve_depth: 64,
        }
    }
}
