//! ELFコアダンプの読み取り

use crate::Result;
use awaitree_dwarf::{MemoryImage, MemoryReader};
use object::{Object, ObjectKind, ObjectSegment};
use std::fs;
use std::path::Path;
use tracing::{debug, info};

/// ELFコアダンプ
///
/// ロード可能セグメント（PT_LOAD）のうち、ファイルに内容が保存されている部分を読み取れます。
pub struct CoreDump {
    image: MemoryImage,
}

impl CoreDump {
    /// コアダンプファイルを読み込む
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let data = fs::read(path)
            .map_err(|e| anyhow::anyhow!("Failed to read core file {:?}: {}", path, e))?;

        let core = Self::parse(&data)
            .map_err(|e| anyhow::anyhow!("Failed to parse core file {:?}: {}", path, e))?;
        info!(
            "loaded core file {:?} ({} segments)",
            path,
            core.image.region_count()
        );
        Ok(core)
    }

    /// メモリ上のコアダンプを解析する
    pub fn parse(data: &[u8]) -> Result<Self> {
        let file = object::File::parse(data)?;
        if file.kind() != ObjectKind::Core {
            anyhow::bail!("not a core file (kind: {:?})", file.kind());
        }

        let mut image = MemoryImage::new();
        for segment in file.segments() {
            let bytes = segment.data()?;
            if bytes.is_empty() {
                // 内容がダンプされていないセグメント
                continue;
            }
            debug!(
                "segment 0x{:x}..0x{:x} ({} bytes in file)",
                segment.address(),
                segment.address() + segment.size(),
                bytes.len()
            );
            image.add_region(segment.address(), bytes.to_vec());
        }

        Ok(Self { image })
    }
}

impl MemoryReader for CoreDump {
    fn read(&self, addr: u64, size: usize) -> Result<Vec<u8>> {
        self.image.read(addr, size)
    }
}
