//! awaitree ターゲット（調査対象）へのアクセス
//!
//! このクレートは、調査対象のメモリを読み取るための低レベル機能を提供します。
//! 実行中のプロセス（ptraceでアタッチ）とELFコアダンプの両方に対応します。

pub mod core_dump;
pub mod memory;
pub mod process;

pub use core_dump::CoreDump;
pub use memory::ProcessMemory;
pub use process::Process;

/// ターゲット操作の結果型
pub type Result<T> = anyhow::Result<T>;
