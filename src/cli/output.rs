// Output formatting for CLI

use anyhow::Result;
use serde::Serialize;
use std::io::Write;

use crate::cli::config::OutputFormat;

/// Format and output data
pub struct OutputFormatter {
    format: OutputFormat,
    quiet: bool,
}

impl OutputFormatter {
    pub fn new(format: OutputFormat, quiet: bool) -> Self {
        Self { format, quiet }
    }

    pub fn is_json(&self) -> bool {
        self.format == OutputFormat::Json
    }

    /// Write one record as a single JSON line
    pub fn output_json<T: Serialize>(&self, record: &T, writer: &mut impl Write) -> Result<()> {
        writeln!(writer, "{}", serde_json::to_string(record)?)?;
        Ok(())
    }

    /// Write aligned key/value lines
    pub fn output_table(&self, rows: &[(&str, String)], writer: &mut impl Write) -> Result<()> {
        let width = rows.iter().map(|(k, _)| k.len()).max().unwrap_or(0) + 1;
        for (key, value) in rows {
            writeln!(writer, "  {:<width$} {}", format!("{}:", key), value, width = width)?;
        }
        Ok(())
    }

    /// Print success message
    pub fn print_success(&self, message: &str) {
        if !self.quiet && !self.is_json() {
            println!("✓ {}", message);
        }
    }

    /// Print error message
    pub fn print_error(&self, message: &str) {
        eprintln!("✗ {}", message);
    }

    /// Print info message
    pub fn print_info(&self, message: &str) {
        if !self.quiet && !self.is_json() {
            println!("  {}", message);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_output_json_is_one_line() {
        let formatter = OutputFormatter::new(OutputFormat::Json, false);
        let mut out = Vec::new();
        formatter.output_json(&serde_json::json!({"a": 1, "b": [1, 2]}), &mut out).unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "{\"a\":1,\"b\":[1,2]}\n");
    }

    #[test]
    fn test_output_table_aligns_keys() {
        let formatter = OutputFormatter::new(OutputFormat::Pretty, false);
        let mut out = Vec::new();
        formatter
            .output_table(&[("serial", "1".to_string()), ("packets", "2".to_string())], &mut out)
            .unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "  serial:  1\n  packets: 2\n");
    }
}
