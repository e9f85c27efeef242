//! REPLコマンド

/// REPLコマンド
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// 式が指すFutureから非同期スタックトレースを表示
    PrintStackTrace(String),
    /// 型名を検索
    FindType(String),
    /// ヘルプ表示
    Help,
    /// 終了
    Quit,
}

impl Command {
    /// コマンド文字列をパースする
    ///
    /// 引数は最初の空白以降をそのまま使います（型名には空白が含まれるため）。
    pub fn parse(input: &str) -> Option<Self> {
        let input = input.trim();
        let (name, rest) = match input.split_once(char::is_whitespace) {
            Some((name, rest)) => (name, rest.trim()),
            None => (input, ""),
        };

        match name {
            "print-stack-trace" | "pst" if !rest.is_empty() => {
                Some(Command::PrintStackTrace(rest.to_string()))
            }
            "find-type" | "ft" if !rest.is_empty() => Some(Command::FindType(rest.to_string())),
            "help" | "h" | "?" => Some(Command::Help),
            "quit" | "q" | "exit" => Some(Command::Quit),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_commands() {
        assert_eq!(Command::parse("help"), Some(Command::Help));
        assert_eq!(Command::parse("?"), Some(Command::Help));
        assert_eq!(Command::parse("  quit  "), Some(Command::Quit));
        assert_eq!(Command::parse("exit"), Some(Command::Quit));
        assert_eq!(Command::parse(""), None);
        assert_eq!(Command::parse("continue"), None);
    }

    #[test]
    fn test_parse_print_stack_trace_keeps_argument() {
        assert_eq!(
            Command::parse("print-stack-trace {pkg::Pin<&mut pkg::Fut>} 0x1000"),
            Some(Command::PrintStackTrace("{pkg::Pin<&mut pkg::Fut>} 0x1000".to_string()))
        );
        assert_eq!(
            Command::parse("pst   {pkg::Fut} 42 "),
            Some(Command::PrintStackTrace("{pkg::Fut} 42".to_string()))
        );
    }

    #[test]
    fn test_missing_argument() {
        assert_eq!(Command::parse("print-stack-trace"), None);
        assert_eq!(Command::parse("pst   "), None);
        assert_eq!(Command::parse("find-type"), None);
    }

    #[test]
    fn test_parse_find_type() {
        assert_eq!(
            Command::parse("ft async_fn_env"),
            Some(Command::FindType("async_fn_env".to_string()))
        );
    }
}
