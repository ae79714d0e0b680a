//! CLI interface using clap
//!
//! Defines the command-line arguments and the handlers behind them.

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use std::fs::File;
use std::io::{self, BufReader, BufWriter, Write};
use std::path::PathBuf;

use crate::core::controls::{Control, Which};
use crate::core::{ActiveTester, LineReader, Timing, Width};

/// Repeat count used when a timing option is given without a value.
const DEFAULT_TIMING_REPEAT: &str = "500000";

#[derive(Parser)]
#[command(name = "rxtest")]
#[command(author, version, about = "Script-driven regex test harness for 8, 16 and 32-bit code units", long_about = None)]
pub struct Cli {
    /// Script to read (default: stdin)
    pub input: Option<PathBuf>,

    /// File to write results to (default: stdout)
    pub output: Option<PathBuf>,

    /// Code-unit width to test
    #[arg(long, short = 'w', default_value = "8", value_parser = parse_width)]
    pub width: Width,

    /// Suppress the version banner
    #[arg(long, short = 'q')]
    pub quiet: bool,

    /// Show the full compiled listing for every pattern
    #[arg(short = 'b')]
    pub fullbytecode: bool,

    /// Show the listing and pattern information for every pattern
    #[arg(short = 'd')]
    pub debug: bool,

    /// Show pattern information for every pattern
    #[arg(short = 'i')]
    pub info: bool,

    /// Default pattern modifiers
    #[arg(long, value_name = "MODIFIERS")]
    pub pattern: Option<String>,

    /// Default data modifiers
    #[arg(long, value_name = "MODIFIERS")]
    pub data: Option<String>,

    /// Time compilation and matching, repeating each N times
    #[arg(long, short = 't', value_name = "N", num_args = 0..=1, default_missing_value = DEFAULT_TIMING_REPEAT)]
    pub time: Option<u32>,

    /// Time matching only
    #[arg(long, value_name = "N", num_args = 0..=1, default_missing_value = DEFAULT_TIMING_REPEAT)]
    pub time_match: Option<u32>,

    /// As --time, and print totals at the end
    #[arg(long, short = 'T', value_name = "N", num_args = 0..=1, default_missing_value = DEFAULT_TIMING_REPEAT)]
    pub time_total: Option<u32>,

    /// As --time-match, and print totals at the end
    #[arg(long, value_name = "N", num_args = 0..=1, default_missing_value = DEFAULT_TIMING_REPEAT)]
    pub time_match_total: Option<u32>,

    /// Show build configuration, or a single item, and exit
    #[arg(long, short = 'C', value_name = "NAME", num_args = 0..=1, default_missing_value = "")]
    pub config: Option<String>,

    /// Output format for the configuration report
    #[arg(long, short = 'f', default_value = "text")]
    pub format: OutputFormat,
}

#[derive(Copy, Clone, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// JSON output
    Json,
    /// Human-readable text (default)
    Text,
}

fn parse_width(value: &str) -> Result<Width, String> {
    value
        .parse::<u32>()
        .ok()
        .and_then(Width::from_bits)
        .ok_or_else(|| format!("width must be 8, 16 or 32, not '{}'", value))
}

pub fn parse() -> Cli {
    Cli::parse()
}

impl Cli {
    /// Timing settings implied by the timing options; the last one given wins.
    pub fn timing(&self) -> Timing {
        let mut timing = Timing::default();
        if let Some(n) = self.time {
            timing.compile_repeat = n;
            timing.match_repeat = n;
        }
        if let Some(n) = self.time_match {
            timing.match_repeat = n;
        }
        if let Some(n) = self.time_total {
            timing.compile_repeat = n;
            timing.match_repeat = n;
            timing.show_totals = true;
        }
        if let Some(n) = self.time_match_total {
            timing.match_repeat = n;
            timing.show_totals = true;
        }
        timing
    }

    /// Pattern controls switched on for every pattern.
    pub fn default_control(&self) -> Control {
        let mut control = Control::empty();
        if self.fullbytecode {
            control |= Control::FULLBYTECODE;
        }
        if self.debug {
            control |= Control::DEBUG;
        }
        if self.info {
            control |= Control::INFO;
        }
        control
    }
}

/// Show the configuration. Returns the text and the exit status.
pub fn handle_config(name: &str, format: OutputFormat) -> Result<(String, u8), String> {
    use crate::core::{build_config, config_item};
    use crate::output::json::format_json;
    use crate::output::text::{format_config_item, format_config_report};

    if name.is_empty() {
        let report = build_config();
        let output = match format {
            OutputFormat::Json => format_json(&report),
            OutputFormat::Text => format_config_report(&report),
        };
        return Ok((output, 0));
    }

    let item = config_item(name).ok_or_else(|| format!("** Unknown -C option '{}'", name))?;
    let status = u8::try_from(item.exit_code).unwrap_or(u8::MAX);
    let output = match format {
        OutputFormat::Json => format_json(&item),
        OutputFormat::Text => format_config_item(&item),
    };
    Ok((output, status))
}

/// Run a script from the input file (or stdin) to the output file (or stdout).
pub fn handle_run(args: &Cli) -> Result<()> {
    let mut reader = match &args.input {
        Some(path) => {
            let file =
                File::open(path).with_context(|| format!("** Failed to open {}", path.display()))?;
            LineReader::from_reader(Box::new(BufReader::new(file)))
        }
        None => LineReader::stdin(),
    };
    let mut out: Box<dyn Write> = match &args.output {
        Some(path) => {
            let file =
                File::create(path).with_context(|| format!("** Failed to open {}", path.display()))?;
            Box::new(BufWriter::new(file))
        }
        None => Box::new(io::stdout().lock()),
    };

    let mut tester = ActiveTester::new(args.width, args.timing());
    tester.set_default_control(args.default_control());
    if let Some(text) = &args.pattern {
        tester.apply_defaults(text, Which::DefaultPattern)?;
    }
    if let Some(text) = &args.data {
        tester.apply_defaults(text, Which::DefaultData)?;
    }

    if !args.quiet {
        writeln!(out, "rxtest version {}", crate::core::config::VERSION)?;
    }

    let result = crate::core::run(&mut tester, &mut reader, &mut *out);
    out.flush()?;
    Ok(result?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timing_options() {
        let cli = Cli::parse_from(["rxtest", "-T", "10"]);
        let timing = cli.timing();
        assert_eq!(timing.compile_repeat, 10);
        assert_eq!(timing.match_repeat, 10);
        assert!(timing.show_totals);

        let cli = Cli::parse_from(["rxtest", "--time-match"]);
        let timing = cli.timing();
        assert_eq!(timing.compile_repeat, 0);
        assert_eq!(timing.match_repeat, 500_000);
        assert!(!timing.show_totals);
    }

    #[test]
    fn test_width_option() {
        let cli = Cli::parse_from(["rxtest", "-w", "16"]);
        assert_eq!(cli.width, Width::Sixteen);
        assert!(Cli::try_parse_from(["rxtest", "-w", "12"]).is_err());
    }

    #[test]
    fn test_default_controls() {
        let cli = Cli::parse_from(["rxtest", "-i"]);
        assert_eq!(cli.default_control(), Control::INFO);
        let cli = Cli::parse_from(["rxtest", "-d"]);
        assert!(cli.default_control().contains(Control::FULLBYTECODE));
    }

    #[test]
    fn test_config_item_status() {
        let (text, status) = handle_config("linksize", OutputFormat::Text).unwrap();
        assert_eq!(text, "2");
        assert_eq!(status, 2);
        let err = handle_config("nosuch", OutputFormat::Text).unwrap_err();
        assert_eq!(err, "** Unknown -C option 'nosuch'");
    }

    #[test]
    fn test_config_without_name() {
        let cli = Cli::parse_from(["rxtest", "-C"]);
        assert_eq!(cli.config.as_deref(), Some(""));
    }
}
