//! Output formatting shared by the command line tools

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Default maximum length for descriptions in tables
pub const DEFAULT_DESCRIPTION_MAX_LEN: usize = 40;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OutputFormat {
    /// Pretty table with borders (default)
    #[default]
    Table,
    /// Markdown table format
    Markdown,
    /// Compact JSON
    Json,
    /// Pretty-printed JSON with indentation
    JsonPretty,
    /// One JSON object per line
    JsonLine,
}

impl OutputFormat {
    pub fn is_json(&self) -> bool {
        matches!(self, Self::Json | Self::JsonPretty | Self::JsonLine)
    }

    pub fn all_names() -> &'static [&'static str] {
        &["table", "markdown", "json", "json-pretty", "json-line"]
    }

    /// Serialize a single value; JSON lines prints it compactly
    pub fn json<T: Serialize>(&self, value: &T) -> String {
        match self {
            Self::JsonPretty => serde_json::to_string_pretty(value).unwrap_or_default(),
            _ => serde_json::to_string(value).unwrap_or_default(),
        }
    }

    /// Serialize a list; JSON lines prints one element per line
    pub fn json_list<T: Serialize>(&self, values: &[T]) -> String {
        match self {
            Self::JsonLine => values
                .iter()
                .map(|v| serde_json::to_string(v).unwrap_or_default())
                .collect::<Vec<_>>()
                .join("\n"),
            _ => self.json(&values),
        }
    }

    /// Render rows as a bordered or markdown table
    #[cfg(feature = "display")]
    pub fn table<T: tabled::Tabled>(&self, rows: &[T]) -> String {
        use tabled::settings::Style;

        let mut table = tabled::Table::new(rows);
        match self {
            Self::Markdown => table.with(Style::markdown()),
            _ => table.with(Style::rounded()),
        };
        table.to_string()
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Table => write!(f, "table"),
            Self::Markdown => write!(f, "markdown"),
            Self::Json => write!(f, "json"),
            Self::JsonPretty => write!(f, "json-pretty"),
            Self::JsonLine => write!(f, "json-line"),
        }
    }
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "table" | "pretty" => Ok(Self::Table),
            "markdown" | "md" => Ok(Self::Markdown),
            "json" => Ok(Self::Json),
            "json-pretty" | "jsonpretty" => Ok(Self::JsonPretty),
            "json-line" | "jsonline" | "jsonl" | "ndjson" => Ok(Self::JsonLine),
            _ => Err(format!(
                "Unknown output format '{}'. Valid formats: {}",
                s,
                Self::all_names().join(", ")
            )),
        }
    }
}

/// Truncate a string to `max_len` characters, ending with "..." if cut
pub fn truncate_name(name: &str, max_len: usize) -> String {
    if name.chars().count() <= max_len {
        name.to_string()
    } else {
        let truncated: String = name.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", truncated)
    }
}

/// Whole-second human readable duration, e.g. "2days 3h 4m"
pub fn format_duration(duration: Duration) -> String {
    humantime::format_duration(Duration::from_secs(duration.as_secs())).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_output_format_from_str() {
        assert_eq!(OutputFormat::from_str("pretty").unwrap(), OutputFormat::Table);
        assert_eq!(OutputFormat::from_str("md").unwrap(), OutputFormat::Markdown);
        assert_eq!(
            OutputFormat::from_str("JSON-PRETTY").unwrap(),
            OutputFormat::JsonPretty
        );
        assert_eq!(
            OutputFormat::from_str("ndjson").unwrap(),
            OutputFormat::JsonLine
        );
        assert!(OutputFormat::from_str("psv").is_err());
    }

    #[test]
    fn test_output_format_display_roundtrip() {
        for name in OutputFormat::all_names() {
            let format = OutputFormat::from_str(name).unwrap();
            assert_eq!(format.to_string(), *name);
        }
    }

    #[test]
    fn test_json_list() {
        let values = vec![1, 2, 3];
        assert_eq!(OutputFormat::Json.json_list(&values), "[1,2,3]");
        assert_eq!(OutputFormat::JsonLine.json_list(&values), "1\n2\n3");
        assert!(OutputFormat::Json.is_json());
        assert!(!OutputFormat::Markdown.is_json());
    }

    #[test]
    fn test_truncate_name() {
        assert_eq!(truncate_name("Short", 20), "Short");
        assert_eq!(
            truncate_name("PEER AS2344 192.9.23.44 3rd Peer from the sun", 20),
            "PEER AS2344 192.9..."
        );
        assert_eq!(truncate_name("Hello", 3), "...");
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(Duration::from_millis(61_500)), "1m 1s");
        assert_eq!(format_duration(Duration::ZERO), "0s");
    }
}
