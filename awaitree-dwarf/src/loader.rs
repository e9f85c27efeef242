//! ELFとDWARFの読み込み機能

use crate::types::TypeTable;
use crate::Result;
use object::{Object, ObjectSection};
use std::fs;
use std::path::Path;
use tracing::info;

/// DWARFのリーダー型
pub type DwarfReader = gimli::EndianSlice<'static, gimli::RunTimeEndian>;

/// DWARFローダー
pub struct DwarfLoader {
    /// DWARFコンテキスト
    dwarf: gimli::Dwarf<DwarfReader>,
}

impl DwarfLoader {
    /// ELFファイルからDWARF情報を読み込む
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        let file_data = fs::read(path)
            .map_err(|e| anyhow::anyhow!("Failed to read file {:?}: {}", path, e))?;

        // gimliのEndianSliceに'staticライフタイムを与えるため、ファイル内容はリークさせる
        let file_data: &'static [u8] = Box::leak(file_data.into_boxed_slice());

        let loader = Self::parse(file_data)
            .map_err(|e| anyhow::anyhow!("Failed to load DWARF from {:?}: {}", path, e))?;
        info!("loaded debug info from {:?}", path);
        Ok(loader)
    }

    /// メモリ上のELFイメージからDWARF情報を読み込む
    pub fn parse(data: &'static [u8]) -> Result<Self> {
        let object_file = object::File::parse(data)
            .map_err(|e| anyhow::anyhow!("Failed to parse ELF file: {}", e))?;

        let endian = if object_file.is_little_endian() {
            gimli::RunTimeEndian::Little
        } else {
            gimli::RunTimeEndian::Big
        };

        if object_file.section_by_name(".debug_info").is_none() {
            anyhow::bail!("no .debug_info section (was the binary built with debug info?)");
        }

        let load_section = |id: gimli::SectionId| -> Result<DwarfReader> {
            let data = object_file
                .section_by_name(id.name())
                .and_then(|section| section.data().ok())
                .unwrap_or(&[]);
            Ok(gimli::EndianSlice::new(data, endian))
        };

        let dwarf = gimli::Dwarf::load(load_section)?;

        Ok(Self { dwarf })
    }

    /// DWARFコンテキストへの参照を取得
    pub fn dwarf(&self) -> &gimli::Dwarf<DwarfReader> {
        &self.dwarf
    }

    /// 型情報テーブルを構築する
    pub fn type_table(&self) -> Result<TypeTable> {
        TypeTable::from_dwarf(&self.dwarf)
    }
}
