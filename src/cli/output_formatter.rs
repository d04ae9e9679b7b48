use colored::*;
use serde_json::Value as JsonValue;

use crate::cli::cli_args::OutputFormat;
use crate::utils::{
    error::GateError,
    types::{DataResponse, Frame, QueryDataResponse},
};

/// Formats batch responses for CLI output
pub struct OutputFormatter;

impl OutputFormatter {
    /// Format a response according to the specified format
    pub fn format_response(response: &QueryDataResponse, format: &OutputFormat) -> String {
        match format {
            OutputFormat::Table => Self::format_table(response),
            OutputFormat::Json => Self::format_json(response),
            OutputFormat::Csv => Self::format_csv(response),
        }
    }

    /// One table per frame, grouped by reference id
    fn format_table(response: &QueryDataResponse) -> String {
        if response.is_empty() {
            return "No results found.".dimmed().to_string();
        }

        let mut output = String::new();
        for (ref_id, data) in &response.responses {
            output.push_str(&format!("{} {}\n", "Query".bold(), ref_id.cyan().bold()));
            output.push_str(&Self::format_data_response(data));
            output.push('\n');
        }

        let frames: usize = response.responses.values().map(|r| r.frames.len()).sum();
        output.push_str(&format!(
            "{} {}, {} {}\n",
            response.len().to_string().green().bold(),
            if response.len() == 1 { "query" } else { "queries" },
            frames.to_string().green().bold(),
            if frames == 1 { "frame" } else { "frames" },
        ));

        output
    }

    fn format_data_response(data: &DataResponse) -> String {
        let mut output = String::new();

        if let Some(error) = &data.error {
            output.push_str(&format!("  {} {}\n", "error:".red().bold(), error.red()));
        }
        if data.frames.is_empty() && data.error.is_none() {
            output.push_str(&format!("  {}\n", "(no frames)".dimmed()));
        }
        for frame in &data.frames {
            output.push_str(&Self::format_frame(frame));
        }

        output
    }

    fn format_frame(frame: &Frame) -> String {
        let mut output = String::new();
        if !frame.name.is_empty() {
            output.push_str(&format!("  {}\n", frame.name.yellow()));
        }

        let mut col_widths: Vec<usize> = frame.fields.iter().map(|f| f.name.len().max(8)).collect();
        for (i, field) in frame.fields.iter().enumerate() {
            for value in &field.values {
                col_widths[i] = col_widths[i].max(Self::value_to_string(value).len());
            }
        }

        output.push_str(&Self::format_table_separator(&col_widths, true));
        output.push('|');
        for (i, field) in frame.fields.iter().enumerate() {
            output.push_str(&format!(" {:<width$} |", field.name, width = col_widths[i]));
        }
        output.push('\n');
        output.push_str(&Self::format_table_separator(&col_widths, false));

        for row in 0..frame.row_count() {
            output.push('|');
            for (i, field) in frame.fields.iter().enumerate() {
                let value = field.values.get(row).map(Self::value_to_string).unwrap_or_default();
                output.push_str(&format!(" {:<width$} |", value, width = col_widths[i]));
            }
            output.push('\n');
        }

        output.push_str(&Self::format_table_separator(&col_widths, true));
        output
    }

    /// Format table separator line
    fn format_table_separator(col_widths: &[usize], is_border: bool) -> String {
        let edge = if is_border { '+' } else { '|' };
        let mut separator = String::from("  ");
        separator.push(edge);
        for &width in col_widths {
            separator.push_str(&"-".repeat(width + 2));
            separator.push(edge);
        }
        separator.push('\n');
        separator
    }

    /// Format the response verbatim as JSON
    fn format_json(response: &QueryDataResponse) -> String {
        serde_json::to_string_pretty(response).unwrap_or_else(|_| "{}".to_string())
    }

    /// Long-format CSV: one line per row of every frame
    fn format_csv(response: &QueryDataResponse) -> String {
        let mut output = String::from("ref_id,frame,field,row,value\n");

        for (ref_id, data) in &response.responses {
            for frame in &data.frames {
                for field in &frame.fields {
                    for (row, value) in field.values.iter().enumerate() {
                        output.push_str(&format!(
                            "{},{},{},{},{}\n",
                            Self::escape_csv_field(ref_id),
                            Self::escape_csv_field(&frame.name),
                            Self::escape_csv_field(&field.name),
                            row,
                            Self::escape_csv_field(&Self::value_to_string(value)),
                        ));
                    }
                }
            }
        }

        output
    }

    /// Convert a JSON cell to a display string
    fn value_to_string(value: &JsonValue) -> String {
        match value {
            JsonValue::Null => "NULL".to_string(),
            JsonValue::String(s) => s.clone(),
            JsonValue::Number(n) => match n.as_f64() {
                Some(f) if n.is_f64() => format!("{:.2}", f),
                _ => n.to_string(),
            },
            other => other.to_string(),
        }
    }

    /// Escape CSV field if it contains special characters
    fn escape_csv_field(field: &str) -> String {
        if field.contains(',') || field.contains('"') || field.contains('\n') {
            format!("\"{}\"", field.replace('"', "\"\""))
        } else {
            field.to_string()
        }
    }

    /// Format error message for CLI display
    pub fn format_error(error: &GateError) -> String {
        format!("{} {}", "Error:".red().bold(), error.to_string().red())
    }

    /// Format info message for CLI display
    pub fn format_info(message: &str) -> String {
        format!("{} {}", "Info:".blue().bold(), message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample() -> QueryDataResponse {
        let mut response = QueryDataResponse::new();
        response.insert(
            "A",
            DataResponse {
                frames: vec![Frame::new("A")
                    .with_field("time", vec![json!(1000), json!(2000)])
                    .with_field("value", vec![json!(1.5), json!("x,y")])],
                error: None,
            },
        );
        response.insert(
            "B",
            DataResponse {
                frames: Vec::new(),
                error: Some("upstream timeout".to_string()),
            },
        );
        response
    }

    #[test]
    fn test_table_output() {
        let output = OutputFormatter::format_response(&sample(), &OutputFormat::Table);
        assert!(output.contains("time"));
        assert!(output.contains("1.50"));
        assert!(output.contains("upstream timeout"));
        assert!(output.contains("queries"));
    }

    #[test]
    fn test_json_output_is_verbatim() {
        let output = OutputFormatter::format_response(&sample(), &OutputFormat::Json);
        let parsed: QueryDataResponse = serde_json::from_str(&output).unwrap();
        assert_eq!(parsed, sample());
    }

    #[test]
    fn test_csv_output_escapes() {
        let output = OutputFormatter::format_response(&sample(), &OutputFormat::Csv);
        assert!(output.starts_with("ref_id,frame,field,row,value\n"));
        assert!(output.contains("A,A,time,1,2000\n"));
        assert!(output.contains("A,A,value,1,\"x,y\"\n"));
    }

    #[test]
    fn test_empty_response() {
        let output = OutputFormatter::format_response(&QueryDataResponse::new(), &OutputFormat::Table);
        assert!(output.contains("No results found."));
    }
}
