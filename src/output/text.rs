//! Human-friendly text output formatting
//!
//! Used when --format text is specified.

use super::types::*;

/// Format ConfigReport as the "Compiled with" listing
pub fn format_config_report(report: &ConfigReport) -> String {
    let mut output = String::new();

    output.push_str(&format!("rxtest version {}\n", report.version));
    output.push_str("\nCompiled with\n");
    for bits in &report.widths {
        output.push_str(&format!("  {}-bit support\n", bits));
    }
    if report.utf {
        output.push_str("  UTF support\n");
    } else {
        output.push_str("  No UTF support\n");
    }
    if report.jit {
        output.push_str("  Just-in-time compiler support\n");
    } else {
        output.push_str("  No just-in-time compiler support\n");
    }
    output.push_str(&format!("  Newline sequence is {}\n", report.newline));
    if report.bsr_anycrlf {
        output.push_str("  \\R matches CR, LF, or CRLF only\n");
    } else {
        output.push_str("  \\R matches all Unicode newlines\n");
    }
    output.push_str(&format!("  Internal link size = {}\n", report.link_size));
    output.push_str(&format!(
        "  Parentheses nest limit = {}\n",
        report.parens_nest_limit
    ));
    output.push_str(&format!("  Default match limit = {}\n", report.match_limit));
    output.push_str(&format!(
        "  Default recursion depth limit = {}\n",
        report.recursion_limit
    ));
    output.push_str(&format!(
        "  Match recursion uses {}",
        if report.recursion_uses_stack {
            "stack"
        } else {
            "heap"
        }
    ));

    output
}

/// Format a single configuration item: just its value
pub fn format_config_item(item: &ConfigItemResult) -> String {
    item.value.clone()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report() -> ConfigReport {
        ConfigReport {
            version: "1.2.3".to_string(),
            widths: vec![8, 16, 32],
            utf: true,
            jit: false,
            newline: "LF".to_string(),
            bsr_anycrlf: false,
            link_size: 2,
            parens_nest_limit: 250,
            match_limit: 10_000_000,
            recursion_limit: 10_000_000,
            recursion_uses_stack: false,
        }
    }

    #[test]
    fn test_config_report_lines() {
        let text = format_config_report(&report());
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "rxtest version 1.2.3");
        assert_eq!(lines[1], "");
        assert_eq!(lines[2], "Compiled with");
        assert_eq!(&lines[3..6], ["  8-bit support", "  16-bit support", "  32-bit support"]);
        assert!(lines.contains(&"  No just-in-time compiler support"));
        assert!(lines.contains(&"  \\R matches all Unicode newlines"));
        assert_eq!(lines.last(), Some(&"  Match recursion uses heap"));
    }

    #[test]
    fn test_bsr_anycrlf_line() {
        let mut report = report();
        report.bsr_anycrlf = true;
        assert!(format_config_report(&report).contains("  \\R matches CR, LF, or CRLF only\n"));
    }
}
