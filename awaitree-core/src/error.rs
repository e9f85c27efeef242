//! エラー型
//!
//! 調査対象プロセスのメモリは信頼できない入力として扱います。
//! 読み取りに失敗した場合は [`ValueError`] となり、リゾルバや分類器の境界で
//! 「適用なし」として吸収されます。既知だが未対応の構造は [`TraceError`] の
//! 回復不能なバリアントとして呼び出し元まで伝播します。

use crate::SubFutureKind;

/// 値の読み取りエラー（データ取得不能）
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValueError {
    /// フィールドが存在しない
    #[error("field `{field}` not found in `{type_name}`")]
    NoSuchField { type_name: String, field: String },

    /// メモリを読み取れない
    #[error("cannot read {size} bytes at 0x{address:x}")]
    MemoryUnavailable { address: u64, size: usize },

    /// ポインタではない値を参照外しした
    #[error("value of type `{0}` cannot be dereferenced")]
    NotAPointer(String),

    /// 配列ではない値を添字アクセスした
    #[error("value of type `{0}` is not an array")]
    NotAnArray(String),

    /// 添字が範囲外
    #[error("index {index} out of bounds (length: {len})")]
    IndexOutOfBounds { index: u64, len: u64 },

    /// 型情報が取得できない
    #[error("type information unavailable: {0}")]
    TypeUnavailable(String),
}

/// スタックトレース構築中のエラー
#[derive(Debug, thiserror::Error)]
pub enum TraceError {
    /// 値の読み取りに失敗した（回復可能）
    #[error(transparent)]
    Value(#[from] ValueError),

    /// トレイトオブジェクト経由のFuture（fat pointer）
    #[error("cannot decode dynamically dispatched future `{0}` without a registered resolver")]
    DynFuture(String),

    /// 未実装のSubFutures種別
    #[error("{0} combinators are not implemented")]
    UnsupportedKind(SubFutureKind),

    /// コンビネータ要素がさらにコンビネータに解決された
    #[error("element {index} of `{combinator}` resolves to a {kind} combinator; nested combinators are not supported")]
    NestedCombinator {
        combinator: String,
        index: u64,
        kind: SubFutureKind,
    },

    /// 生成器の状態フィールドが見つからない
    #[error("no generator state field in `{0}`")]
    MissingGeneratorState(String),

    /// 再帰の深さ制限を超えた
    #[error("async stack exceeds the maximum depth of {0}")]
    DepthExceeded(usize),

    /// 出力エラー
    #[error("failed to write stack trace: {0}")]
    Io(#[from] std::io::Error),
}

impl TraceError {
    /// 「適用なし」として扱ってよいエラーかどうか
    pub fn is_recoverable(&self) -> bool {
        matches!(self, TraceError::Value(_))
    }
}

/// 値アクセスの結果型
pub type ValueResult<T> = std::result::Result<T, ValueError>;

/// トレース処理の結果型
pub type TraceResult<T> = std::result::Result<T, TraceError>;
