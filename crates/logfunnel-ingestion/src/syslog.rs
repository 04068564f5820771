use chrono::{Datelike, Local, NaiveDateTime};
use logfunnel_core::{MessageParser, ParseError, ParsedMessage, Severity, LOGGER_PATH_SEPARATOR};
use regex::Regex;
use std::sync::OnceLock;

/// Highest valid PRI value: facility 23 (local7), severity 7
const MAX_PRIORITY: u32 = 191;

const FACILITIES: [&str; 24] = [
    "kern", "user", "mail", "daemon", "auth", "syslog", "lpr", "news", "uucp", "cron",
    "authpriv", "ftp", "ntp", "audit", "alert", "clock", "local0", "local1", "local2",
    "local3", "local4", "local5", "local6", "local7",
];

static PRIORITY_REGEX: OnceLock<Regex> = OnceLock::new();
static HEADER_REGEX: OnceLock<Regex> = OnceLock::new();

fn get_priority_regex() -> &'static Regex {
    PRIORITY_REGEX.get_or_init(|| Regex::new(r"^<(?P<priority>\d{1,3})>").unwrap())
}

fn get_header_regex() -> &'static Regex {
    HEADER_REGEX.get_or_init(|| {
        // RFC 3164 header after the PRI part:
        // Jan  1 00:00:00 hostname app[pid]: message
        Regex::new(
            r"^(?P<timestamp>[A-Z][a-z]{2}\s+\d{1,2}\s+\d{2}:\d{2}:\d{2})\s+(?P<hostname>\S+)\s+(?P<app>[^\[:\s]+)(?:\[(?P<pid>\d+)\])?:\s*(?P<message>.*)$",
        )
        .unwrap()
    })
}

/// RFC 3164 syslog text parser.
///
/// Lines that follow the BSD syslog layout are split into fields and get a
/// `hostname.app` logger path. Anything else that decodes as text is kept as
/// an opaque `Info` message. Only undecodable or empty payloads and an
/// out-of-range PRI are rejected.
#[derive(Debug, Clone, Default)]
pub struct SyslogParser {
    /// Year assumed for the year-less RFC 3164 timestamp; current year if unset
    year: Option<i32>,
}

impl SyslogParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pin the year used to complete source timestamps
    pub fn with_year(year: i32) -> Self {
        Self { year: Some(year) }
    }

    fn parse_timestamp(&self, timestamp: &str) -> Option<NaiveDateTime> {
        let year = self.year.unwrap_or_else(|| Local::now().year());
        let normalized = timestamp.split_whitespace().collect::<Vec<_>>().join(" ");
        NaiveDateTime::parse_from_str(&format!("{} {}", year, normalized), "%Y %b %d %H:%M:%S").ok()
    }

    /// `raw` is kept verbatim as the message text; fields come from `text`,
    /// its trimmed form.
    fn parse_text(&self, raw: &str, text: &str, sender: &str) -> Result<ParsedMessage, ParseError> {
        let mut parsed = ParsedMessage::opaque(raw).with_sender(sender);
        let mut rest = text;

        if let Some(caps) = get_priority_regex().captures(text) {
            let priority: u32 = caps["priority"]
                .parse()
                .map_err(|_| ParseError::InvalidPriority(u32::MAX))?;
            if priority > MAX_PRIORITY {
                return Err(ParseError::InvalidPriority(priority));
            }
            parsed = parsed
                .with_severity(Severity::from_syslog((priority % 8) as u8))
                .with_facility(FACILITIES[(priority / 8) as usize])
                .with_field("priority", priority.to_string());
            rest = &text[caps[0].len()..];
        }

        let Some(caps) = get_header_regex().captures(rest) else {
            return Ok(parsed);
        };

        let hostname = &caps["hostname"];
        let app = &caps["app"];
        parsed = parsed
            .with_logger_path(format!(
                "{}{}{}",
                path_segment(hostname),
                LOGGER_PATH_SEPARATOR,
                path_segment(app)
            ))
            .with_field("hostname", hostname)
            .with_field("app", app)
            .with_field("message", &caps["message"]);

        if let Some(pid) = caps.name("pid") {
            parsed = parsed.with_field("pid", pid.as_str());
        }
        if let Some(time) = self.parse_timestamp(&caps["timestamp"]) {
            parsed = parsed.with_source_time(time);
        }

        Ok(parsed)
    }
}

/// Dots inside a hostname would split it into several tree levels
fn path_segment(value: &str) -> String {
    value.replace(LOGGER_PATH_SEPARATOR, "_")
}

impl MessageParser for SyslogParser {
    fn name(&self) -> &'static str {
        "syslog"
    }

    fn parse(&self, payload: &[u8], sender: &str) -> Result<ParsedMessage, ParseError> {
        let raw = std::str::from_utf8(payload).map_err(|e| ParseError::InvalidUtf8(e.to_string()))?;
        let text = raw.trim_matches(|c: char| c.is_whitespace() || c == '\0');
        if text.is_empty() {
            return Err(ParseError::Empty);
        }
        self.parse_text(raw, text, sender)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Timelike;

    fn parse(line: &str) -> Result<ParsedMessage, ParseError> {
        SyslogParser::with_year(2024).parse(line.as_bytes(), "10.0.0.5:40000")
    }

    #[test]
    fn test_parse_with_priority() {
        let parsed = parse("<34>Oct 11 22:14:15 mymachine su: 'su root' failed").unwrap();

        assert_eq!(parsed.severity, Severity::Fatal); // 34 % 8 = 2 (critical)
        assert_eq!(parsed.facility.as_deref(), Some("auth")); // 34 / 8 = 4
        assert_eq!(parsed.logger_path.as_deref(), Some("mymachine.su"));
        assert_eq!(parsed.sender.as_deref(), Some("10.0.0.5:40000"));
        assert_eq!(parsed.fields["message"], "'su root' failed");
        assert_eq!(parsed.fields["priority"], "34");

        let time = parsed.timestamp_source.unwrap();
        assert_eq!(time.year(), 2024);
        assert_eq!(time.month(), 10);
        assert_eq!(time.day(), 11);
        assert_eq!(time.hour(), 22);
    }

    #[test]
    fn test_parse_with_pid_and_padded_day() {
        let parsed = parse("Jan  5 14:32:01 myhost sshd[12345]: Connection from 192.168.1.100").unwrap();

        assert_eq!(parsed.severity, Severity::Info);
        assert!(parsed.facility.is_none());
        assert_eq!(parsed.fields["pid"], "12345");
        assert_eq!(parsed.fields["app"], "sshd");
        assert_eq!(parsed.fields["message"], "Connection from 192.168.1.100");
        assert_eq!(parsed.timestamp_source.unwrap().day(), 5);
    }

    #[test]
    fn test_dotted_hostname_stays_one_segment() {
        let parsed = parse("<13>Feb 2 08:00:00 web01.example.com nginx: started").unwrap();
        assert_eq!(parsed.logger_path.as_deref(), Some("web01_example_com.nginx"));
        assert_eq!(parsed.fields["hostname"], "web01.example.com");
    }

    #[test]
    fn test_plain_text_is_opaque() {
        let parsed = parse("just some text").unwrap();
        assert_eq!(parsed.raw_text, "just some text");
        assert_eq!(parsed.severity, Severity::Info);
        assert!(parsed.logger_path.is_none());
        assert!(parsed.fields.is_empty());
    }

    #[test]
    fn test_priority_without_header() {
        let parsed = parse("<11>disk failure").unwrap();
        assert_eq!(parsed.severity, Severity::Error);
        assert_eq!(parsed.facility.as_deref(), Some("user"));
        assert!(parsed.logger_path.is_none());
        assert_eq!(parsed.raw_text, "<11>disk failure");
    }

    #[test]
    fn test_raw_text_is_kept_verbatim() {
        let parsed = parse("<13>Jan 1 00:00:00 host app: hello\r\n").unwrap();
        assert_eq!(parsed.raw_text, "<13>Jan 1 00:00:00 host app: hello\r\n");
        assert_eq!(parsed.fields["message"], "hello");
        assert_eq!(parsed.logger_path.as_deref(), Some("host.app"));

        let parsed = parse("  padded text\0").unwrap();
        assert_eq!(parsed.raw_text, "  padded text\0");
    }

    #[test]
    fn test_rejects_out_of_range_priority() {
        assert_eq!(parse("<192>hello").unwrap_err(), ParseError::InvalidPriority(192));
        assert_eq!(parse("<999>hello").unwrap_err(), ParseError::InvalidPriority(999));
    }

    #[test]
    fn test_rejects_invalid_utf8() {
        let err = SyslogParser::new().parse(&[0xc3, 0x28, 0xff], "peer").unwrap_err();
        assert!(matches!(err, ParseError::InvalidUtf8(_)));
    }

    #[test]
    fn test_rejects_empty_payload() {
        assert_eq!(parse("").unwrap_err(), ParseError::Empty);
        assert_eq!(parse(" \n\0").unwrap_err(), ParseError::Empty);
    }
}
