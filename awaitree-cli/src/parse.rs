//! 式とアドレスのパース

use anyhow::Result;

/// アドレス文字列をu64にパース
///
/// 16進数（0xプレフィックス付き）または10進数をサポート
pub fn parse_address(s: &str) -> Result<u64> {
    let s = s.trim();

    if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        u64::from_str_radix(hex, 16)
            .map_err(|e| anyhow::anyhow!("Invalid hexadecimal address '{}': {}", s, e))
    } else {
        s.parse::<u64>()
            .map_err(|e| anyhow::anyhow!("Invalid address '{}': {}", s, e))
    }
}

/// `{<型名>} <アドレス>` 形式の式
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Expression {
    /// 完全修飾された型名
    pub type_name: String,
    /// 値の先頭アドレス
    pub address: u64,
}

impl Expression {
    /// 式をパースする
    ///
    /// 型名自体が `{async_fn_env#0}` のような波括弧を含むため、対応する閉じ括弧までを型名とします。
    pub fn parse(input: &str) -> Result<Self> {
        let input = input.trim();
        let body = input
            .strip_prefix('{')
            .ok_or_else(|| anyhow::anyhow!("Expected '{{<type>}} <address>', got '{}'", input))?;

        let mut depth = 1usize;
        let mut end = None;
        for (i, c) in body.char_indices() {
            match c {
                '{' => depth += 1,
                '}' => {
                    depth -= 1;
                    if depth == 0 {
                        end = Some(i);
                        break;
                    }
                }
                _ => {}
            }
        }
        let end = end.ok_or_else(|| anyhow::anyhow!("Unbalanced braces in '{}'", input))?;

        let type_name = body[..end].trim();
        if type_name.is_empty() {
            anyhow::bail!("Empty type name in '{}'", input);
        }

        let rest = body[end + 1..].trim();
        if rest.is_empty() {
            anyhow::bail!("Missing address in '{}'", input);
        }

        Ok(Self {
            type_name: type_name.to_string(),
            address: parse_address(rest)?,
        })
    }
}
