//! awaitree DWARF デバッグ情報解析
//!
//! このクレートは、ELFファイルのDWARF型情報を使って [`awaitree_core::ValueHandle`] を実装します。
//! 調査対象のメモリは [`MemoryReader`] を通して読み取ります。

pub mod decode;
pub mod loader;
pub mod memory;
pub mod types;
pub mod value;

pub use decode::{DecodeConfig, DisplayValue, ValueDecoder};
pub use loader::DwarfLoader;
pub use memory::{MemoryImage, MemoryReader};
pub use types::{TypeDef, TypeKind, TypeRef, TypeTable};
pub use value::{DwarfContext, DwarfValue};

/// DWARF解析の結果型
pub type Result<T> = anyhow::Result<T>;
