//! プロセスメモリの読み取り

use crate::Result;
use awaitree_dwarf::MemoryReader;
use nix::errno::Errno;
use nix::unistd::Pid;
use std::fs::File;
use std::io::{Read as _, Seek, SeekFrom};
use tracing::debug;

/// 実行中のプロセスのメモリ
///
/// 読み取りには対象プロセスへのptraceアタッチ（または同等の権限）が必要です。
pub struct ProcessMemory {
    pid: Pid,
}

impl ProcessMemory {
    /// メモリアクセスを作成する
    pub fn new(pid: i32) -> Self {
        Self {
            pid: Pid::from_raw(pid),
        }
    }

    /// /proc/pid/mem のパスを取得する
    fn mem_path(&self) -> String {
        format!("/proc/{}/mem", self.pid)
    }

    /// /proc/pid/mem経由でメモリを読み取る
    fn read_via_proc_mem(&self, addr: u64, size: usize) -> std::io::Result<Vec<u8>> {
        let mut file = File::open(self.mem_path())?;
        file.seek(SeekFrom::Start(addr))?;

        let mut buffer = vec![0u8; size];
        file.read_exact(&mut buffer)?;
        Ok(buffer)
    }

    /// PTRACE_PEEKDATAを使用してメモリからデータを読み取る
    ///
    /// /proc/pid/memが使用できない場合のフォールバックです。
    pub fn read_via_ptrace(&self, addr: u64, size: usize) -> Result<Vec<u8>> {
        use nix::sys::ptrace;

        let mut data = Vec::with_capacity(size);
        let word_size = std::mem::size_of::<std::ffi::c_long>();

        for offset in (0..size).step_by(word_size) {
            let word_addr = addr.checked_add(offset as u64).ok_or_else(|| {
                anyhow::anyhow!("address overflow reading {} bytes at 0x{:x}", size, addr)
            })?;
            let word = ptrace::read(self.pid, word_addr as ptrace::AddressType).map_err(|e| {
                anyhow::anyhow!("Failed to read via ptrace at 0x{:x}: {}", word_addr, e)
            })?;

            let bytes = word.to_ne_bytes();
            let copy_size = (size - offset).min(word_size);
            data.extend_from_slice(&bytes[..copy_size]);
        }

        Ok(data)
    }
}

impl MemoryReader for ProcessMemory {
    fn read(&self, addr: u64, size: usize) -> Result<Vec<u8>> {
        match self.read_via_proc_mem(addr, size) {
            Ok(data) => Ok(data),
            // 未マッピング領域はEIO、権限がない場合はEACCES/EPERM
            Err(e) if e.raw_os_error() == Some(Errno::EIO as i32) => {
                debug!("/proc/{}/mem read at 0x{:x} failed: {}", self.pid, addr, e);
                self.read_via_ptrace(addr, size)
            }
            Err(e) => Err(anyhow::anyhow!(
                "Failed to read {} bytes at 0x{:x} from {}: {}",
                size,
                addr,
                self.mem_path(),
                e
            )),
        }
    }
}
