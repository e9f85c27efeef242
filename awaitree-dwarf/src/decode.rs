//! 値デコード機能
//!
//! メモリから読み取ったバイト列を、DWARFの型情報に基づいて表示用の値に変換します。

use std::fmt;

/// デコード設定
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodeConfig {
    /// 構造体をたどる最大深さ
    pub max_depth: usize,
    /// 配列の最大表示要素数
    pub max_array_elements: usize,
    /// 文字列の最大表示バイト数
    pub max_string_bytes: usize,
}

impl Default for DecodeConfig {
    fn default() -> Self {
        Self {
            max_depth: 3,
            max_array_elements: 16,
            max_string_bytes: 256,
        }
    }
}

/// デコード結果の表示値
#[derive(Debug, Clone, PartialEq)]
pub enum DisplayValue {
    /// 整数
    Int(i64),
    /// 符号なし整数
    Uint(u64),
    /// 浮動小数点
    Float(f64),
    /// 真偽値
    Bool(bool),
    /// 文字
    Char(char),
    /// 文字列
    Str(String, bool), // (値, truncated)
    /// ポインタ
    Ptr(u64),
    /// 配列
    Array(Vec<DisplayValue>, bool), // (要素, truncated)
    /// 構造体
    Struct {
        name: String,
        fields: Vec<(String, DisplayValue)>,
    },
    /// 列挙型（有効なvariantのみ）
    Enum {
        name: String,
        variant: String,
        fields: Vec<(String, DisplayValue)>,
    },
    /// 深さ制限で省略した構造体
    Elided(String),
    /// 利用不可
    Unavailable,
}

impl fmt::Display for DisplayValue {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            DisplayValue::Int(v) => write!(f, "{}", v),
            DisplayValue::Uint(v) => write!(f, "{}", v),
            DisplayValue::Float(v) => write!(f, "{}", v),
            DisplayValue::Bool(v) => write!(f, "{}", v),
            DisplayValue::Char(c) => write!(f, "'{}'", c),
            DisplayValue::Str(s, truncated) => {
                write!(f, "\"{}\"", s)?;
                if *truncated {
                    write!(f, "...")?;
                }
                Ok(())
            }
            DisplayValue::Ptr(addr) => write!(f, "0x{:x}", addr),
            DisplayValue::Array(elements, truncated) => {
                write!(f, "[")?;
                for (i, elem) in elements.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", elem)?;
                }
                if *truncated {
                    write!(f, ", ...")?;
                }
                write!(f, "]")
            }
            DisplayValue::Struct { name, fields } => {
                if fields.is_empty() {
                    return write!(f, "{}", name);
                }
                write!(f, "{} {{ ", name)?;
                write_fields(f, fields)?;
                write!(f, " }}")
            }
            DisplayValue::Enum {
                name,
                variant,
                fields,
            } => {
                write!(f, "{}::{}", name, variant)?;
                if !fields.is_empty() {
                    // タプルvariant（__0, __1, ...）はフィールド名を省略する
                    if fields.iter().all(|(name, _)| name.starts_with("__")) {
                        write!(f, "(")?;
                        for (i, (_, value)) in fields.iter().enumerate() {
                            if i > 0 {
                                write!(f, ", ")?;
                            }
                            write!(f, "{}", value)?;
                        }
                        write!(f, ")")?;
                    } else {
                        write!(f, " {{ ")?;
                        write_fields(f, fields)?;
                        write!(f, " }}")?;
                    }
                }
                Ok(())
            }
            DisplayValue::Elided(name) => write!(f, "{} {{ .. }}", name),
            DisplayValue::Unavailable => write!(f, "<unavailable>"),
        }
    }
}

fn write_fields(f: &mut fmt::Formatter, fields: &[(String, DisplayValue)]) -> fmt::Result {
    for (i, (name, value)) in fields.iter().enumerate() {
        if i > 0 {
            write!(f, ", ")?;
        }
        write!(f, "{}: {}", name, value)?;
    }
    Ok(())
}

/// リトルエンディアンの符号なし整数を読む（最大8バイト）
pub fn read_uint(bytes: &[u8]) -> Option<u64> {
    if bytes.is_empty() || bytes.len() > 8 {
        return None;
    }
    let mut buf = [0u8; 8];
    buf[..bytes.len()].copy_from_slice(bytes);
    Some(u64::from_le_bytes(buf))
}

/// リトルエンディアンの符号付き整数を読む（最大8バイト）
pub fn read_int(bytes: &[u8]) -> Option<i64> {
    let raw = read_uint(bytes)?;
    let bits = bytes.len() * 8;
    if bits == 64 {
        return Some(raw as i64);
    }
    // 符号拡張
    let shift = 64 - bits;
    Some(((raw << shift) as i64) >> shift)
}

/// 値デコーダー
pub struct ValueDecoder {
    config: DecodeConfig,
}

impl ValueDecoder {
    /// 新しい値デコーダーを作成する
    pub fn new(config: DecodeConfig) -> Self {
        Self { config }
    }

    /// 設定
    pub fn config(&self) -> &DecodeConfig {
        &self.config
    }

    /// 基本型をDWARFのエンコーディングに従ってデコードする
    ///
    /// # Arguments
    /// * `bytes` - 値のバイト列（型のサイズ分）
    /// * `encoding` - `DW_AT_encoding`
    pub fn decode_base(&self, bytes: &[u8], encoding: gimli::DwAte) -> DisplayValue {
        let decoded = match encoding {
            gimli::DW_ATE_boolean => read_uint(bytes).map(|v| DisplayValue::Bool(v != 0)),
            gimli::DW_ATE_signed | gimli::DW_ATE_signed_char => read_int(bytes).map(DisplayValue::Int),
            gimli::DW_ATE_unsigned | gimli::DW_ATE_unsigned_char => {
                read_uint(bytes).map(DisplayValue::Uint)
            }
            gimli::DW_ATE_UTF => read_uint(bytes)
                .and_then(|code| char::from_u32(code as u32))
                .map(DisplayValue::Char),
            gimli::DW_ATE_float => match bytes.len() {
                4 => bytes
                    .try_into()
                    .ok()
                    .map(|arr| DisplayValue::Float(f32::from_le_bytes(arr) as f64)),
                8 => bytes
                    .try_into()
                    .ok()
                    .map(|arr| DisplayValue::Float(f64::from_le_bytes(arr))),
                _ => None,
            },
            _ => None,
        };
        decoded.unwrap_or(DisplayValue::Unavailable)
    }

    /// バイト列を文字列としてデコードする
    ///
    /// `len` は元の文字列の長さで、`bytes` は表示上限までに切り詰められていることがあります。
    pub fn decode_str(&self, bytes: &[u8], len: u64) -> DisplayValue {
        let truncated = len > bytes.len() as u64;
        DisplayValue::Str(String::from_utf8_lossy(bytes).into_owned(), truncated)
    }

    /// 文字列として読み取るバイト数
    pub fn str_read_len(&self, len: u64) -> usize {
        len.min(self.config.max_string_bytes as u64) as usize
    }

    /// 配列として表示する要素数と、切り詰めたかどうか
    pub fn array_display_len(&self, len: u64) -> (u64, bool) {
        let limit = self.config.max_array_elements as u64;
        (len.min(limit), len > limit)
    }
}

impl Default for ValueDecoder {
    fn default() -> Self {
        Self::new(DecodeConfig::default())
    }
}
