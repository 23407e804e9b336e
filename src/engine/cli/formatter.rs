//! Terminal output for the docmap CLI
//!
//! JSON output is printed by the commands themselves.

use colored::Colorize;
use serde_json::Value;

pub struct CliFormatter;

impl CliFormatter {
    pub fn success(message: &str) {
        println!("{} {}", "✓".green().bold(), message);
    }

    /// Errors go to stderr so `--format json` output stays parseable
    pub fn error(message: &str) {
        eprintln!("{} {}", "✗".red().bold(), message);
    }

    pub fn info(message: &str) {
        println!("{} {}", "ℹ".blue().bold(), message);
    }

    /// Print a section header followed by a rule of the same width
    pub fn header(title: &str) {
        println!("\n{}", title.bright_cyan().bold());
        println!("{}", "─".repeat(title.chars().count()).bright_black());
    }

    /// Print a key-value pair
    pub fn kv(key: &str, value: &str) {
        println!("  {}: {}", key.bright_white().bold(), value);
    }

    /// Print rows under a header, each column padded to its widest cell
    pub fn table(columns: &[&str], rows: &[Vec<String>]) {
        for line in table_lines(columns, rows) {
            println!("  {}", line);
        }
    }

    /// Print a document, one field per line
    pub fn document(doc: &Value) {
        match doc.as_object() {
            Some(map) => {
                for (key, value) in map {
                    Self::kv(key, &format_value(value));
                }
            }
            None => println!("  {}", doc),
        }
    }
}

/// Render a JSON value for terminal output; strings lose their quotes
pub fn format_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => "null".bright_black().to_string(),
        other => other.to_string(),
    }
}

fn table_lines(columns: &[&str], rows: &[Vec<String>]) -> Vec<String> {
    let mut widths: Vec<usize> = columns.iter().map(|c| c.chars().count()).collect();
    for row in rows {
        for (width, cell) in widths.iter_mut().zip(row) {
            *width = (*width).max(cell.chars().count());
        }
    }

    let pad = |cells: Vec<&str>| {
        cells
            .iter()
            .zip(&widths)
            .map(|(cell, width)| format!("{:<width$}", cell, width = *width))
            .collect::<Vec<_>>()
            .join(" │ ")
            .trim_end()
            .to_string()
    };

    let header = pad(columns.to_vec());
    let rule = "─".repeat(header.chars().count());
    let mut lines = vec![header.bold().to_string(), rule.bright_black().to_string()];
    lines.extend(rows.iter().map(|row| pad(row.iter().map(String::as_str).collect())));
    lines
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_table_columns_align() {
        colored::control::set_override(false);
        let rows = vec![
            vec!["cart_items".to_string(), "12".to_string()],
            vec!["users".to_string(), "3".to_string()],
        ];
        let lines = table_lines(&["table", "documents"], &rows);

        assert_eq!(lines[0], "table      │ documents");
        assert_eq!(lines[2], "cart_items │ 12");
        assert_eq!(lines[3], "users      │ 3");
    }

    #[test]
    fn test_format_value() {
        assert_eq!(format_value(&json!("abc")), "abc");
        assert_eq!(format_value(&json!(3)), "3");
        assert_eq!(format_value(&json!([1, 2])), "[1,2]");
    }
}
