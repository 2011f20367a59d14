use std::path::PathBuf;

use crate::types::PrintLevel;

/// Version string for the REPL banner.
pub const VERSION: &str = "0.1.0";

/// Environment variable overriding the REPL print level (0, 1 or 2).
pub const PRINT_LEVEL_VAR: &str = "MLPARSE_PRINT_LEVEL";

/// Return the path to the history file (~/.mlparse_history).
pub fn history_path() -> Option<PathBuf> {
    dirs_or_home().map(|h| h.join(".mlparse_history"))
}

/// Print level from `$MLPARSE_PRINT_LEVEL`, or [`PrintLevel::Results`].
pub fn print_level_from_env() -> PrintLevel {
    parse_print_level(std::env::var(PRINT_LEVEL_VAR).ok().as_deref())
}

fn parse_print_level(raw: Option<&str>) -> PrintLevel {
    raw.and_then(|s| s.trim().parse::<i32>().ok())
        .map_or(PrintLevel::Results, PrintLevel::from)
}

/// Get the user's home directory from $HOME.
fn dirs_or_home() -> Option<PathBuf> {
    std::env::var("HOME").ok().map(PathBuf::from)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_print_level() {
        assert_eq!(parse_print_level(None), PrintLevel::Results);
        assert_eq!(parse_print_level(Some("0")), PrintLevel::Silent);
        assert_eq!(parse_print_level(Some(" 1 ")), PrintLevel::Exceptions);
        assert_eq!(parse_print_level(Some("7")), PrintLevel::Results);
        assert_eq!(parse_print_level(Some("loud")), PrintLevel::Results);
    }
}
