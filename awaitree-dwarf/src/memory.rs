//! メモリ読み取り
//!
//! 調査対象のメモリ（実行中のプロセス、コアダンプ）を抽象化します。

use crate::Result;

/// メモリ読み取りトレイト
pub trait MemoryReader {
    /// `addr` から `size` バイト読み取る
    fn read(&self, addr: u64, size: usize) -> Result<Vec<u8>>;

    /// u64値を読み取る（リトルエンディアン）
    fn read_u64(&self, addr: u64) -> Result<u64> {
        let bytes = self.read(addr, 8)?;
        let array: [u8; 8] = bytes
            .as_slice()
            .try_into()
            .map_err(|_| anyhow::anyhow!("short read at 0x{:x}", addr))?;
        Ok(u64::from_le_bytes(array))
    }
}

/// メモリ上のバイト列の集合
///
/// コアダンプのロード可能セグメントや、テスト用のメモリとして使います。
#[derive(Debug, Default, Clone)]
pub struct MemoryImage {
    regions: Vec<Region>,
}

#[derive(Debug, Clone)]
struct Region {
    start: u64,
    bytes: Vec<u8>,
}

impl Region {
    fn end(&self) -> u64 {
        self.start.saturating_add(self.bytes.len() as u64)
    }
}

impl MemoryImage {
    /// 空のメモリイメージを作成する
    pub fn new() -> Self {
        Self::default()
    }

    /// 領域を追加する
    pub fn add_region(&mut self, start: u64, bytes: Vec<u8>) {
        self.regions.push(Region { start, bytes });
    }

    /// 領域を追加する（ビルダー形式）
    pub fn with_region(mut self, start: u64, bytes: Vec<u8>) -> Self {
        self.add_region(start, bytes);
        self
    }

    /// 領域の数
    pub fn region_count(&self) -> usize {
        self.regions.len()
    }
}

impl MemoryReader for MemoryImage {
    fn read(&self, addr: u64, size: usize) -> Result<Vec<u8>> {
        let end = addr
            .checked_add(size as u64)
            .ok_or_else(|| anyhow::anyhow!("address overflow at 0x{:x}", addr))?;

        let region = self
            .regions
            .iter()
            .find(|r| r.start <= addr && end <= r.end())
            .ok_or_else(|| anyhow::anyhow!("address 0x{:x} (+{}) is not mapped", addr, size))?;

        let offset = (addr - region.start) as usize;
        Ok(region.bytes[offset..offset + size].to_vec())
    }
}
