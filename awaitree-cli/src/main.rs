//! awaitree CLI - コマンドラインインターフェース
//!
//! 停止中のプロセスやコアダンプから、Futureの論理的な待機スタックを表示します。

mod command;
mod parse;
mod session;

use anyhow::Result;
use awaitree_core::TraceConfig;
use clap::{Parser, Subcommand};
use command::Command;
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use session::Session;
use std::io::{self, BufWriter};
use std::ops::ControlFlow;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// awaitree - async stack traces for Rust
#[derive(Parser)]
#[command(name = "awaitree")]
#[command(version = "0.1.0")]
#[command(about = "Print logical async stack traces of suspended Rust futures", long_about = None)]
struct Cli {
    #[command(subcommand)]
    target: Target,

    /// Print the stack trace of this expression and exit
    #[arg(long, global = true, value_name = "EXPR")]
    eval: Option<String>,

    /// Maximum depth of the printed tree
    #[arg(long, global = true, default_value_t = TraceConfig::default().max_depth)]
    max_depth: usize,
}

#[derive(Subcommand)]
enum Target {
    /// Attach to a running process
    Attach {
        /// Path to the executable binary
        binary: String,

        /// Process ID to attach to
        #[arg(short, long)]
        pid: i32,
    },

    /// Open a core dump
    Core {
        /// Path to the executable binary
        binary: String,

        /// Path to the core file
        corefile: String,
    },
}

fn main() -> Result<()> {
    init_logging();

    let cli = Cli::parse();
    let config = TraceConfig {
        max_depth: cli.max_depth,
        ..TraceConfig::default()
    };
    let session = open_session(cli.target, config)?;

    match cli.eval {
        Some(expr) => print_stack_trace(&session, &expr),
        None => run_repl(&session),
    }
}

/// ログ出力を初期化する（標準エラー出力、既定は warn）
fn init_logging() {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with(
            fmt::layer()
                .compact()
                .without_time()
                .with_writer(io::stderr),
        )
        .init();
}

/// 対象を開いてセッションを作成する
fn open_session(target: Target, config: TraceConfig) -> Result<Session> {
    match target {
        Target::Attach { binary, pid } => {
            eprintln!("Loading binary: {}", binary);
            let session = Session::attach(&binary, pid, config)?;
            eprintln!("Attached to process {}", pid);
            Ok(session)
        }
        Target::Core { binary, corefile } => {
            eprintln!("Loading binary: {}", binary);
            let session = Session::open_core(&binary, &corefile, config)?;
            eprintln!("Opened core file {}", corefile);
            Ok(session)
        }
    }
}

/// REPLループを実行する
fn run_repl(session: &Session) -> Result<()> {
    println!("Type 'help' for available commands, 'quit' to exit.");
    println!();

    let mut rl = DefaultEditor::new()?;

    loop {
        let readline = rl.readline("(awaitree) ");
        match readline {
            Ok(line) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }

                rl.add_history_entry(line)?;

                match handle_command(session, line) {
                    Ok(ControlFlow::Break(())) => break,
                    Ok(ControlFlow::Continue(())) => {}
                    Err(e) => eprintln!("Error: {}", e),
                }
            }
            Err(ReadlineError::Interrupted) => {
                println!("CTRL-C");
                break;
            }
            Err(ReadlineError::Eof) => {
                println!("CTRL-D");
                break;
            }
            Err(err) => {
                eprintln!("Error: {:?}", err);
                break;
            }
        }
    }

    Ok(())
}

fn handle_command(session: &Session, line: &str) -> Result<ControlFlow<()>> {
    match Command::parse(line) {
        Some(Command::PrintStackTrace(expr)) => print_stack_trace(session, &expr)?,
        Some(Command::FindType(pattern)) => print_types(session, &pattern),
        Some(Command::Help) => print_help(),
        Some(Command::Quit) => {
            if let Some(pid) = session.pid() {
                println!("Detaching from process {}", pid);
            }
            return Ok(ControlFlow::Break(()));
        }
        None => {
            println!("Unknown command: {}", line);
            println!("Type 'help' for available commands.");
        }
    }
    Ok(ControlFlow::Continue(()))
}

/// スタックトレースを標準出力へ書き出す
///
/// 失敗した場合も、それまでに出力した行は表示されます。
fn print_stack_trace(session: &Session, expr: &str) -> Result<()> {
    let stdout = io::stdout();
    let out = BufWriter::new(stdout.lock());
    session.print_stack_trace(expr, out)
}

fn print_types(session: &Session, pattern: &str) {
    const LIMIT: usize = 20;

    let names = session.find_types(pattern);
    if names.is_empty() {
        println!("No types matching '{}'", pattern);
        return;
    }

    println!("Types matching '{}' ({} found):", pattern, names.len());
    for name in names.iter().take(LIMIT) {
        println!("  {}", name);
    }
    if names.len() > LIMIT {
        println!("  ... and {} more", names.len() - LIMIT);
    }
}

fn print_help() {
    println!("Available commands:");
    println!();
    println!("  help                     - Show this help message");
    println!("  quit/exit/q              - Exit");
    println!();
    println!("Async commands:");
    println!("  print-stack-trace <expr> - Print the async stack trace of a future (alias: pst)");
    println!("  find-type <pattern>      - List type names containing pattern (alias: ft)");
    println!();
    println!("Expressions have the form {{<type name>}} <address>.");
    println!();
    println!("Examples:");
    println!("  find-type foo::{{async_fn_env");
    println!("  print-stack-trace {{basic_async::foo::{{async_fn_env#0}}}} 0x55d0c0a01ba0");
}
