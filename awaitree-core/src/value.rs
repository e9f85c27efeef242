//! 値ハンドル
//!
//! デバッガが提供する「型付きメモリ領域への参照」を抽象化します。
//! DWARFを使った実装は awaitree-dwarf、テスト用の実装は [`crate::synthetic`] にあります。

use crate::ValueResult;
use std::ops::Range;

/// 型の分類
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TypeCode {
    /// 構造体
    Struct,
    /// 列挙型（variant partを持つ型を含む）
    Enum,
    /// 生ポインタ、または Box などポインタとして表現される型
    Pointer,
    /// 参照
    Reference,
    /// データポインタとvtableの組（`&dyn Trait`, `Box<dyn Trait>`）
    FatPointer,
    /// 固定長配列
    Array,
    /// 基本型
    Primitive,
    /// その他
    Other,
}

impl TypeCode {
    /// 参照外し可能な細いポインタかどうか
    pub fn is_thin_pointer(self) -> bool {
        matches!(self, TypeCode::Pointer | TypeCode::Reference)
    }
}

/// 調査対象プロセス内の型付き値への参照
///
/// フィールドアクセスや参照外しは、メモリが解放済み・最適化で消えている・
/// 壊れているなどの理由でいつでも失敗し得ます。
pub trait ValueHandle: Sized + 'static {
    /// 型の表示名。取得できない場合はNone
    fn type_name(&self) -> Option<String>;

    /// 型の分類
    fn type_code(&self) -> TypeCode;

    /// フィールド名の一覧（宣言順）
    fn field_names(&self) -> ValueResult<Vec<String>>;

    /// 名前でフィールドを取得する
    fn field(&self, name: &str) -> ValueResult<Self>;

    /// ポインタ・参照を参照外しする
    fn dereference(&self) -> ValueResult<Self>;

    /// 配列の添字範囲
    fn array_range(&self) -> ValueResult<Range<u64>>;

    /// 配列要素を取得する
    fn index(&self, index: u64) -> ValueResult<Self>;

    /// 既定の文字列表現
    fn render(&self) -> ValueResult<String>;

    /// 型名が指定のプレフィックスで始まるかどうか
    fn type_name_starts_with(&self, prefix: &str) -> bool {
        self.type_name()
            .map(|name| name.starts_with(prefix))
            .unwrap_or(false)
    }

    /// 指定した名前のフィールドを持つかどうか
    fn has_field(&self, name: &str) -> bool {
        self.field_names()
            .map(|names| names.iter().any(|n| n == name))
            .unwrap_or(false)
    }
}
