// Log line parser
//
// Single-pass scanners over the raw line bytes; no allocation on the parse
// path. Every view in a produced entry borrows from the input line, which
// the borrow checker pins for as long as the entry is alive. JSON values
// are returned as raw byte ranges: escape sequences are not unescaped.

use serde::{Deserialize, Serialize};

/// Severity levels in ascending order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum LogLevel {
    Trace = 0,
    Debug = 1,
    Info = 2,
    Warn = 3,
    Error = 4,
    Fatal = 5,
}

/// Level names tried, in enum order, for prefix classification.
const LEVEL_NAMES: [(&str, LogLevel); 6] = [
    ("TRACE", LogLevel::Trace),
    ("DEBUG", LogLevel::Debug),
    ("INFO", LogLevel::Info),
    ("WARN", LogLevel::Warn),
    ("ERROR", LogLevel::Error),
    ("FATAL", LogLevel::Fatal),
];

impl Default for LogLevel {
    fn default() -> Self {
        LogLevel::Trace
    }
}

impl LogLevel {
    /// Classify a level token by case-insensitive prefix match; unknown
    /// tokens default to `Info`.
    pub fn classify(token: &str) -> LogLevel {
        let bytes = token.as_bytes();
        for (name, level) in LEVEL_NAMES {
            let n = name.len();
            if bytes.len() >= n && bytes[..n].eq_ignore_ascii_case(name.as_bytes()) {
                return level;
            }
        }
        LogLevel::Info
    }

    pub fn as_str(self) -> &'static str {
        match self {
            LogLevel::Trace => "TRACE",
            LogLevel::Debug => "DEBUG",
            LogLevel::Info => "INFO",
            LogLevel::Warn => "WARN",
            LogLevel::Error => "ERROR",
            LogLevel::Fatal => "FATAL",
        }
    }
}

/// Input formats. `Auto` sniffs per line: `{` selects JSON, `<` syslog,
/// anything else text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LogFormat {
    Auto,
    Json,
    Text,
    Syslog,
}

/// Parser configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParserConfig {
    pub format: LogFormat,
    /// Accepted for host compatibility; timestamps in the line body are
    /// skipped, not decoded.
    pub timestamp_format: Option<String>,
    /// Collect top-level JSON string fields into [`LogEntry::fields`].
    pub parse_json_fields: bool,
}

impl Default for ParserConfig {
    fn default() -> Self {
        Self {
            format: LogFormat::Auto,
            timestamp_format: None,
            parse_json_fields: false,
        }
    }
}

/// A structured view of one log line. All string slices borrow from the
/// line passed to [`LogParser::parse`].
#[derive(Debug, Clone)]
pub struct LogEntry<'a> {
    /// Monotonic ingest timestamp; 0 until the caller stamps it.
    pub timestamp: u64,
    pub level: LogLevel,
    pub message: &'a str,
    pub source: Option<&'a str>,
    /// The unmodified input line.
    pub raw: &'a str,
    /// `(name, value)` pairs extracted from JSON lines when
    /// [`ParserConfig::parse_json_fields`] is set.
    pub fields: Vec<(&'a str, &'a str)>,
}

/// Stateless line parser.
pub struct LogParser {
    config: ParserConfig,
}

impl LogParser {
    pub fn new(config: ParserConfig) -> Self {
        Self { config }
    }

    /// Parse a single line into a borrowed entry.
    pub fn parse<'a>(&self, line: &'a str) -> LogEntry<'a> {
        let format = match self.config.format {
            LogFormat::Auto => detect_format(line),
            explicit => explicit,
        };

        let mut entry = LogEntry {
            timestamp: 0,
            level: LogLevel::Info,
            message: "",
            source: None,
            raw: line,
            fields: Vec::new(),
        };

        match format {
            LogFormat::Json => self.parse_json(line, &mut entry),
            LogFormat::Syslog => {
                // Syslog framing is not decoded; the whole line is the
                // message at INFO.
                entry.message = line;
            }
            _ => parse_text(line, &mut entry),
        }

        entry
    }

    /// Parse newline-separated lines, skipping empties, stopping after
    /// `max_entries`. A trailing segment without `\n` is still parsed;
    /// streaming callers should withhold incomplete tails.
    pub fn parse_batch<'a>(&self, data: &'a str, max_entries: usize) -> Vec<LogEntry<'a>> {
        let mut entries = Vec::new();
        for line in data.split('\n') {
            if entries.len() >= max_entries {
                break;
            }
            if line.is_empty() {
                continue;
            }
            entries.push(self.parse(line));
        }
        entries
    }

    fn parse_json<'a>(&self, line: &'a str, entry: &mut LogEntry<'a>) {
        if let Some(token) = json_value_after_key(line, "\"level\"") {
            entry.level = LogLevel::classify(token);
        }

        let msg = quoted_value_after_key(line, "\"message\"")
            .or_else(|| quoted_value_after_key(line, "\"msg\""));
        if let Some(msg) = msg {
            entry.message = msg;
        }

        if self.config.parse_json_fields {
            collect_string_fields(line, &mut entry.fields);
        }
    }
}

fn detect_format(line: &str) -> LogFormat {
    match line.as_bytes().first() {
        Some(b'{') => LogFormat::Json,
        Some(b'<') => LogFormat::Syslog,
        _ => LogFormat::Text,
    }
}

/// Value token following `key:`, either a bareword or the inside of a
/// quoted string, ending at `"`, `,`, or `}`.
fn json_value_after_key<'a>(line: &'a str, key: &str) -> Option<&'a str> {
    let key_pos = line.find(key)?;
    let after_key = &line[key_pos + key.len()..];
    let colon = after_key.find(':')?;
    let rest = after_key[colon..].trim_start_matches([':', ' ', '"']);

    let end = rest
        .find(['"', ',', '}'])
        .unwrap_or(rest.len());
    Some(&rest[..end])
}

/// The raw inside of a quoted string following `key:`; `None` when the
/// value is not a string.
fn quoted_value_after_key<'a>(line: &'a str, key: &str) -> Option<&'a str> {
    let key_pos = line.find(key)?;
    let after_key = &line[key_pos + key.len()..];
    let colon = after_key.find(':')?;
    let rest = after_key[colon..].trim_start_matches([':', ' ']);

    let rest = rest.strip_prefix('"')?;
    let end = rest.find('"').unwrap_or(rest.len());
    Some(&rest[..end])
}

/// Collect top-level `"key":"value"` string pairs, skipping the keys the
/// entry already carries. Non-string values are passed over.
fn collect_string_fields<'a>(line: &'a str, fields: &mut Vec<(&'a str, &'a str)>) {
    let bytes = line.as_bytes();
    let mut i = 0;

    while i < bytes.len() {
        if bytes[i] != b'"' {
            i += 1;
            continue;
        }

        let key_start = i + 1;
        let Some(key_len) = line[key_start..].find('"') else {
            break;
        };
        let key = &line[key_start..key_start + key_len];
        i = key_start + key_len + 1;

        // Only a `"key" :` position counts; otherwise this quote opened a
        // value, which we skip over entirely.
        let mut j = i;
        while j < bytes.len() && bytes[j] == b' ' {
            j += 1;
        }
        if j >= bytes.len() || bytes[j] != b':' {
            continue;
        }
        j += 1;
        while j < bytes.len() && bytes[j] == b' ' {
            j += 1;
        }

        if j < bytes.len() && bytes[j] == b'"' {
            let value_start = j + 1;
            let Some(value_len) = line[value_start..].find('"') else {
                break;
            };
            let value = &line[value_start..value_start + value_len];
            i = value_start + value_len + 1;

            if !matches!(key, "level" | "message" | "msg") {
                fields.push((key, value));
            }
        } else {
            i = j;
        }
    }
}

/// Text path: skip a leading timestamp, classify `[LEVEL]` or a bare level
/// prefix, and take the remainder as the message.
fn parse_text<'a>(line: &'a str, entry: &mut LogEntry<'a>) {
    let bytes = line.as_bytes();
    let mut pos = 0;

    // Timestamp bytes: digits plus the separators used by common formats.
    while pos < bytes.len()
        && (bytes[pos].is_ascii_digit() || matches!(bytes[pos], b'-' | b':' | b'T' | b'Z' | b'.' | b' '))
    {
        pos += 1;
    }
    while pos < bytes.len() && bytes[pos].is_ascii_whitespace() {
        pos += 1;
    }

    if pos < bytes.len() && bytes[pos] == b'[' {
        pos += 1;
        if let Some(close) = line[pos..].find(']') {
            entry.level = LogLevel::classify(&line[pos..pos + close]);
            pos += close + 1;
        }
    } else {
        for (name, level) in LEVEL_NAMES {
            let n = name.len();
            if bytes.len() - pos >= n
                && bytes[pos..pos + n].eq_ignore_ascii_case(name.as_bytes())
            {
                entry.level = level;
                pos += n;
                break;
            }
        }
    }

    while pos < bytes.len() && bytes[pos].is_ascii_whitespace() {
        pos += 1;
    }

    entry.message = &line[pos..];
}
