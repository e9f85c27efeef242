//! デバッグセッション
//!
//! 型情報・メモリ・トレーサをまとめ、REPLコマンドから使えるようにします。

use crate::parse::Expression;
use anyhow::Result;
use awaitree_core::{AsyncStackTracer, TraceConfig};
use awaitree_dwarf::{DecodeConfig, DwarfContext, DwarfLoader, DwarfValue, MemoryReader, TypeTable};
use awaitree_target::{CoreDump, Process};
use std::io::Write;
use std::path::Path;
use std::rc::Rc;
use tracing::info;

/// デバッグセッション
pub struct Session {
    cx: Rc<DwarfContext>,
    tracer: AsyncStackTracer<DwarfValue>,
    /// アタッチ中のプロセス（dropでデタッチ）
    process: Option<Process>,
}

impl Session {
    /// 実行中のプロセスにアタッチする
    pub fn attach<P: AsRef<Path>>(binary: P, pid: i32, config: TraceConfig) -> Result<Self> {
        let types = load_types(binary.as_ref())?;
        let process = Process::attach(pid)?;
        let memory = Box::new(process.memory());
        Ok(Self::from_parts(types, memory, Some(process), config))
    }

    /// コアダンプを開く
    pub fn open_core<P: AsRef<Path>, C: AsRef<Path>>(
        binary: P,
        core: C,
        config: TraceConfig,
    ) -> Result<Self> {
        let types = load_types(binary.as_ref())?;
        let core = CoreDump::load(core)?;
        Ok(Self::from_parts(types, Box::new(core), None, config))
    }

    /// 型情報とメモリからセッションを組み立てる
    pub fn from_parts(
        types: TypeTable,
        memory: Box<dyn MemoryReader>,
        process: Option<Process>,
        config: TraceConfig,
    ) -> Self {
        let tracer = AsyncStackTracer::builder()
            .config(config)
            .register_builtins()
            .build();
        Self {
            cx: DwarfContext::new(types, memory, DecodeConfig::default()),
            tracer,
            process,
        }
    }

    /// アタッチ中のプロセスID
    pub fn pid(&self) -> Option<i32> {
        self.process.as_ref().map(Process::pid)
    }

    /// 式を評価して値を得る
    pub fn eval(&self, input: &str) -> Result<DwarfValue> {
        let expr = Expression::parse(input)?;
        self.cx.value(&expr.type_name, expr.address)
    }

    /// 式が指すFutureから非同期スタックトレースを出力する
    pub fn print_stack_trace<W: Write>(&self, input: &str, out: W) -> Result<()> {
        let root = self.eval(input)?;
        self.tracer.print_stack_trace(root, out)?;
        Ok(())
    }

    /// パターンを含む型名を検索する（ソート済み）
    pub fn find_types(&self, pattern: &str) -> Vec<&str> {
        let mut names: Vec<&str> = self
            .cx
            .types()
            .names()
            .filter(|name| name.contains(pattern))
            .collect();
        names.sort_unstable();
        names
    }
}

fn load_types(binary: &Path) -> Result<TypeTable> {
    let loader = DwarfLoader::load(binary)?;
    let types = loader.type_table()?;
    info!("indexed {} types from {:?}", types.len(), binary);
    Ok(types)
}
