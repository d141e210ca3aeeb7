//! Parsing of line-oriented command output.

/// Split command output into trimmed, non-empty lines, preserving order.
pub fn parse_lines(stdout: &str) -> Vec<String> {
    stdout
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_lines() {
        let out = "  Default Switch \r\n\r\nExternalSwitch\n   \n Internal\n";
        assert_eq!(parse_lines(out), vec!["Default Switch", "ExternalSwitch", "Internal"]);
    }

    #[test]
    fn test_parse_lines_empty() {
        assert!(parse_lines("").is_empty());
        assert!(parse_lines("\n \r\n\t\n").is_empty());
    }

    #[test]
    fn test_parse_single_line_without_newline() {
        assert_eq!(parse_lines("Running"), vec!["Running"]);
    }
}
