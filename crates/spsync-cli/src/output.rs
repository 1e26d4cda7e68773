//! Human and JSON renderings of command output

use serde_json::{json, Value};

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum OutputFormat {
    Human,
    Json,
}

impl OutputFormat {
    pub fn is_json(self) -> bool {
        self == OutputFormat::Json
    }
}

/// Sink for command messages; errors and warnings go to stderr.
pub trait OutputFormatter {
    fn success(&self, message: &str);
    fn error(&self, message: &str);
    fn warn(&self, message: &str);
    /// Indented detail line; dropped in JSON mode.
    fn info(&self, message: &str);
    /// Title of a summary block; dropped in JSON mode.
    fn section(&self, title: &str);
    /// Structured result; only printed in JSON mode.
    fn print_json(&self, value: &Value);
}

pub struct HumanFormatter;

impl OutputFormatter for HumanFormatter {
    fn success(&self, message: &str) {
        println!("\u{2713} {message}");
    }
    fn error(&self, message: &str) {
        eprintln!("\u{2717} Error: {message}");
    }
    fn warn(&self, message: &str) {
        eprintln!("\u{26a0} Warning: {message}");
    }
    fn info(&self, message: &str) {
        println!("  {message}");
    }
    fn section(&self, title: &str) {
        println!("\n{title}");
    }
    fn print_json(&self, _value: &Value) {}
}

pub struct JsonFormatter;

impl OutputFormatter for JsonFormatter {
    fn success(&self, message: &str) {
        println!("{}", json!({ "success": true, "message": message }));
    }
    fn error(&self, message: &str) {
        eprintln!("{}", json!({ "success": false, "error": message }));
    }
    fn warn(&self, message: &str) {
        eprintln!("{}", json!({ "level": "warning", "message": message }));
    }
    fn info(&self, _message: &str) {}
    fn section(&self, _title: &str) {}
    fn print_json(&self, value: &Value) {
        println!("{}", serde_json::to_string_pretty(value).unwrap_or_default());
    }
}

pub fn get_formatter(format: OutputFormat) -> Box<dyn OutputFormatter> {
    match format {
        OutputFormat::Json => Box::new(JsonFormatter),
        OutputFormat::Human => Box::new(HumanFormatter),
    }
}
