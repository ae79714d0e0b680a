//! Build configuration report for `-C`

use super::controls::{
    Bsr, Newline, DEFAULT_MATCH_LIMIT, DEFAULT_PARENS_NEST_LIMIT, DEFAULT_RECURSION_LIMIT,
};
use crate::output::{ConfigItemResult, ConfigReport};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Internal link size the listing offsets assume.
pub const LINK_SIZE: u32 = 2;

/// Names accepted by `-C <name>`.
pub const CONFIG_NAMES: [&str; 10] = [
    "bsr", "ebcdic", "ebcdic-nl", "jit", "linksize", "newline", "pcre16", "pcre32", "pcre8", "utf",
];

/// Value of one configuration item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ConfigValue {
    Bsr(Bsr),
    Newline(Newline),
    /// Numeric; becomes the exit status
    Number(u32),
    /// Numeric, but informational only
    Quiet(u32),
}

fn config_value(name: &str) -> Option<ConfigValue> {
    let value = match name {
        "bsr" => ConfigValue::Bsr(Bsr::default()),
        "ebcdic" => ConfigValue::Number(0),
        "ebcdic-nl" => ConfigValue::Quiet(0),
        "jit" => ConfigValue::Number(0),
        "linksize" => ConfigValue::Number(LINK_SIZE),
        "newline" => ConfigValue::Newline(Newline::default().effective()),
        "pcre8" | "pcre16" | "pcre32" | "utf" => ConfigValue::Number(1),
        _ => return None,
    };
    Some(value)
}

fn newline_name(newline: Newline) -> &'static str {
    match newline {
        Newline::Cr => "CR",
        Newline::Lf | Newline::Default => "LF",
        Newline::Crlf => "CRLF",
        Newline::Any => "ANY",
        Newline::AnyCrlf => "ANYCRLF",
    }
}

/// Look up one item. `None` for an unknown name.
pub fn config_item(name: &str) -> Option<ConfigItemResult> {
    let value = config_value(name)?;
    let (text, exit_code) = match value {
        ConfigValue::Bsr(Bsr::Unicode) => ("ANY".to_string(), 0),
        ConfigValue::Bsr(Bsr::AnyCrlf) => ("ANYCRLF".to_string(), 0),
        ConfigValue::Newline(newline) => (newline_name(newline).to_string(), 0),
        ConfigValue::Number(n) => (n.to_string(), n as i32),
        ConfigValue::Quiet(n) => (n.to_string(), 0),
    };
    Some(ConfigItemResult {
        name: name.to_string(),
        value: text,
        exit_code,
    })
}

/// The full configuration.
pub fn build_config() -> ConfigReport {
    ConfigReport {
        version: VERSION.to_string(),
        widths: vec![8, 16, 32],
        utf: true,
        jit: false,
        newline: newline_name(Newline::default()).to_string(),
        bsr_anycrlf: Bsr::default() == Bsr::AnyCrlf,
        link_size: LINK_SIZE,
        parens_nest_limit: DEFAULT_PARENS_NEST_LIMIT,
        match_limit: DEFAULT_MATCH_LIMIT,
        recursion_limit: DEFAULT_RECURSION_LIMIT,
        recursion_uses_stack: false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_name_resolves() {
        for name in CONFIG_NAMES {
            assert!(config_item(name).is_some(), "{name}");
        }
        assert!(config_item("unicode").is_none());
    }

    #[test]
    fn test_numeric_items_set_exit_code() {
        let item = config_item("linksize").unwrap();
        assert_eq!(item.value, "2");
        assert_eq!(item.exit_code, 2);
        assert_eq!(config_item("pcre16").unwrap().exit_code, 1);
        assert_eq!(config_item("ebcdic-nl").unwrap().exit_code, 0);
    }

    #[test]
    fn test_text_items() {
        assert_eq!(config_item("newline").unwrap().value, "LF");
        assert_eq!(config_item("bsr").unwrap().value, "ANY");
    }

    #[test]
    fn test_report_defaults() {
        let report = build_config();
        assert_eq!(report.widths, vec![8, 16, 32]);
        assert_eq!(report.parens_nest_limit, 250);
        assert!(!report.jit);
    }
}
