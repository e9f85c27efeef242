//! プロセス制御機能

use crate::memory::ProcessMemory;
use crate::Result;
use nix::sys::ptrace;
use nix::sys::wait::{waitpid, WaitStatus};
use nix::unistd::Pid;
use tracing::{debug, info};

/// アタッチ中のプロセス
///
/// アタッチしている間、プロセスは停止しています。dropでデタッチし、実行を再開させます。
pub struct Process {
    pid: Pid,
}

impl Process {
    /// 既存のプロセスにアタッチし、停止するまで待つ
    pub fn attach(pid: i32) -> Result<Self> {
        let pid = Pid::from_raw(pid);
        ptrace::attach(pid).map_err(|e| anyhow::anyhow!("Failed to attach to process {}: {}", pid, e))?;

        // PTRACE_ATTACH は SIGSTOP を送るので、停止を待つ
        loop {
            match waitpid(pid, None)? {
                WaitStatus::Stopped(_, signal) => {
                    debug!("process {} stopped by {:?}", pid, signal);
                    break;
                }
                WaitStatus::Exited(_, code) => {
                    anyhow::bail!("Process {} exited with status {} during attach", pid, code)
                }
                WaitStatus::Signaled(_, signal, _) => {
                    anyhow::bail!("Process {} was killed by {:?} during attach", pid, signal)
                }
                status => debug!("ignoring wait status during attach: {:?}", status),
            }
        }

        info!("attached to process {}", pid);
        Ok(Self { pid })
    }

    /// プロセスIDを取得する
    pub fn pid(&self) -> i32 {
        self.pid.as_raw()
    }

    /// このプロセスのメモリリーダーを作成する
    pub fn memory(&self) -> ProcessMemory {
        ProcessMemory::new(self.pid())
    }
}

impl Drop for Process {
    fn drop(&mut self) {
        if let Err(e) = ptrace::detach(self.pid, None) {
            debug!("failed to detach from {}: {}", self.pid, e);
        }
    }
}
