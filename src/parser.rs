//! sshd auth-log line parser
//!
//! Classifies raw syslog lines into typed events. Unrecognized sshd messages
//! and non-sshd lines are never fatal; the aggregator counts and skips them.

use chrono::{DateTime, Datelike, NaiveDateTime, TimeZone, Utc};
use regex::Regex;

/// One sshd log line, classified.
///
/// Each variant carries only the fields its line category can populate. The
/// `known_user` flag mirrors sshd's own wording: `invalid user` means the
/// username maps to no system account.
#[derive(Debug, Clone, PartialEq)]
pub enum SshdEvent {
    Accepted {
        user: String,
        ip: String,
        port: Option<u16>,
    },
    Failed {
        user: String,
        known_user: bool,
        ip: String,
        port: Option<u16>,
    },
    InvalidUser {
        user: String,
        ip: String,
        port: Option<u16>,
    },
    Disconnect {
        user: Option<String>,
        known_user: bool,
        ip: String,
        port: Option<u16>,
    },
    ConnectionClosed {
        user: Option<String>,
        known_user: bool,
        ip: String,
        port: Option<u16>,
    },
    Unrecognized,
}

/// Flattened view of an event for record assembly.
#[derive(Debug, Clone, PartialEq)]
pub struct AttemptFields {
    pub valid_login_attempt: bool,
    pub username_is_valid: bool,
    pub username: String,
    pub ip: String,
    /// 0 when the line carried no port.
    pub port: u16,
}

impl SshdEvent {
    /// Maps the event onto record fields, or `None` for unrecognized lines.
    pub fn attempt_fields(&self) -> Option<AttemptFields> {
        let fields = match self {
            SshdEvent::Accepted { user, ip, port } => AttemptFields {
                valid_login_attempt: true,
                username_is_valid: true,
                username: user.clone(),
                ip: ip.clone(),
                port: port.unwrap_or(0),
            },
            SshdEvent::Failed {
                user,
                known_user,
                ip,
                port,
            } => AttemptFields {
                valid_login_attempt: false,
                username_is_valid: *known_user,
                username: user.clone(),
                ip: ip.clone(),
                port: port.unwrap_or(0),
            },
            SshdEvent::InvalidUser { user, ip, port } => AttemptFields {
                valid_login_attempt: false,
                username_is_valid: false,
                username: user.clone(),
                ip: ip.clone(),
                port: port.unwrap_or(0),
            },
            SshdEvent::Disconnect {
                user,
                known_user,
                ip,
                port,
            }
            | SshdEvent::ConnectionClosed {
                user,
                known_user,
                ip,
                port,
            } => AttemptFields {
                valid_login_attempt: false,
                username_is_valid: *known_user,
                username: user.clone().unwrap_or_default(),
                ip: ip.clone(),
                port: port.unwrap_or(0),
            },
            SshdEvent::Unrecognized => return None,
        };
        Some(fields)
    }
}

/// An sshd syslog line split into its timestamp and classified message.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedLine {
    /// Raw syslog timestamp, e.g. `Jan 10 03:14:22` (no year).
    pub timestamp: String,
    pub event: SshdEvent,
}

/// Compiled pattern set for one auth-log dialect.
pub struct Classifier {
    line: Regex,
    accepted: Regex,
    failed: Regex,
    invalid_user: Regex,
    disconnected: Regex,
    received_disconnect: Regex,
    received_disconnect_legacy: Regex,
    connection_closed: Regex,
}

impl Classifier {
    pub fn new() -> Self {
        // Usernames are attacker-controlled and may contain spaces, so every
        // pattern anchors on the literal " from " / " port " markers instead
        // of splitting on whitespace.
        Self {
            line: Regex::new(
                r"^(?P<ts>[A-Z][a-z]{2}\s+\d{1,2}\s+\d{2}:\d{2}:\d{2})\s+\S+\s+sshd\[\d+\]:\s+(?P<msg>.*)$",
            )
            .expect("line pattern"),
            accepted: Regex::new(
                r"^Accepted \S+ for (?P<user>.+?) from (?P<ip>\S+) port (?P<port>\d+)",
            )
            .expect("accepted pattern"),
            failed: Regex::new(
                r"^Failed \S+ for (?P<invalid>invalid user )?(?P<user>.+?) from (?P<ip>\S+) port (?P<port>\d+)",
            )
            .expect("failed pattern"),
            invalid_user: Regex::new(
                r"^Invalid user (?P<user>.*?) from (?P<ip>\S+?)(?: port (?P<port>\d+))?\s*$",
            )
            .expect("invalid-user pattern"),
            disconnected: Regex::new(
                r"^Disconnected from (?:(?:(?P<kind>authenticating|invalid) )?user (?P<user>.+?) )?(?P<ip>\S+) port (?P<port>\d+)",
            )
            .expect("disconnected pattern"),
            received_disconnect: Regex::new(
                r"^Received disconnect from (?P<ip>\S+) port (?P<port>\d+)",
            )
            .expect("received-disconnect pattern"),
            // Pre-7.x sshd wrote "Received disconnect from 1.2.3.4: 11: ..."
            received_disconnect_legacy: Regex::new(
                r"^Received disconnect from (?P<ip>[0-9A-Fa-f:.]+):\s",
            )
            .expect("legacy disconnect pattern"),
            connection_closed: Regex::new(
                r"^Connection closed by (?:(?:(?P<kind>authenticating|invalid) )?user (?P<user>.+?) )?(?P<ip>\S+?)(?: port (?P<port>\d+))?(?:\s+\[preauth\])?\s*$",
            )
            .expect("connection-closed pattern"),
        }
    }

    /// Parses one raw line. Returns `None` for lines that are not sshd syslog
    /// lines at all (other daemons, malformed, truncated).
    pub fn parse(&self, line: &str) -> Option<ParsedLine> {
        let caps = self.line.captures(line)?;
        let timestamp = caps["ts"].to_string();
        let event = self.classify(&caps["msg"]);
        Some(ParsedLine { timestamp, event })
    }

    fn classify(&self, msg: &str) -> SshdEvent {
        if let Some(c) = self.accepted.captures(msg) {
            return SshdEvent::Accepted {
                user: c["user"].to_string(),
                ip: c["ip"].to_string(),
                port: parse_port(c.name("port")),
            };
        }
        if let Some(c) = self.failed.captures(msg) {
            return SshdEvent::Failed {
                user: c["user"].to_string(),
                known_user: c.name("invalid").is_none(),
                ip: c["ip"].to_string(),
                port: parse_port(c.name("port")),
            };
        }
        if let Some(c) = self.invalid_user.captures(msg) {
            return SshdEvent::InvalidUser {
                user: c["user"].to_string(),
                ip: c["ip"].to_string(),
                port: parse_port(c.name("port")),
            };
        }
        if let Some(c) = self.disconnected.captures(msg) {
            return SshdEvent::Disconnect {
                user: c.name("user").map(|m| m.as_str().to_string()),
                known_user: known_user(&c),
                ip: c["ip"].to_string(),
                port: parse_port(c.name("port")),
            };
        }
        if let Some(c) = self.received_disconnect.captures(msg) {
            return SshdEvent::Disconnect {
                user: None,
                known_user: false,
                ip: c["ip"].to_string(),
                port: parse_port(c.name("port")),
            };
        }
        if let Some(c) = self.received_disconnect_legacy.captures(msg) {
            return SshdEvent::Disconnect {
                user: None,
                known_user: false,
                ip: c["ip"].to_string(),
                port: None,
            };
        }
        if let Some(c) = self.connection_closed.captures(msg) {
            return SshdEvent::ConnectionClosed {
                user: c.name("user").map(|m| m.as_str().to_string()),
                known_user: known_user(&c),
                ip: c["ip"].to_string(),
                port: parse_port(c.name("port")),
            };
        }
        SshdEvent::Unrecognized
    }
}

impl Default for Classifier {
    fn default() -> Self {
        Self::new()
    }
}

fn parse_port(m: Option<regex::Match<'_>>) -> Option<u16> {
    m.and_then(|p| p.as_str().parse().ok())
}

/// `known_user` for disconnect/close lines: sshd says `invalid user` when the
/// account does not exist; `authenticating user` and plain `user` name real
/// accounts. Lines naming no user at all count as unknown.
fn known_user(caps: &regex::Captures<'_>) -> bool {
    caps.name("user").is_some() && caps.name("kind").map(|k| k.as_str()) != Some("invalid")
}

/// Resolves syslog timestamps (which carry no year) to UTC datetimes.
///
/// Policy: the base year comes from an explicit override, falling back to the
/// input file's modification-time year. When the month decreases across
/// consecutive lines the year is incremented (rollover). Timestamps are
/// interpreted as UTC.
#[derive(Debug)]
pub struct YearInference {
    year: i32,
    prev_month: Option<u32>,
}

impl YearInference {
    pub fn new(base_year: i32) -> Self {
        Self {
            year: base_year,
            prev_month: None,
        }
    }

    /// Resolves one raw stamp, e.g. `Jan 10 03:14:22`. Returns `None` when
    /// the stamp does not parse (the line is then dropped and counted).
    pub fn resolve(&mut self, stamp: &str) -> Option<DateTime<Utc>> {
        let mut dt = parse_with_year(self.year, stamp)?;
        if let Some(prev) = self.prev_month {
            if dt.month() < prev {
                self.year += 1;
                dt = parse_with_year(self.year, stamp)?;
            }
        }
        self.prev_month = Some(dt.month());
        Some(Utc.from_utc_datetime(&dt))
    }
}

fn parse_with_year(year: i32, stamp: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(&format!("{year} {stamp}"), "%Y %b %d %H:%M:%S").ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn classifier() -> Classifier {
        Classifier::new()
    }

    #[test]
    fn parses_failed_password_for_invalid_user() {
        let line =
            "Jan 10 03:14:22 host sshd[1234]: Failed password for invalid user admin from 203.0.113.5 port 54321 ssh2";
        let parsed = classifier().parse(line).unwrap();
        assert_eq!(parsed.timestamp, "Jan 10 03:14:22");
        assert_eq!(
            parsed.event,
            SshdEvent::Failed {
                user: "admin".to_string(),
                known_user: false,
                ip: "203.0.113.5".to_string(),
                port: Some(54321),
            }
        );
        let fields = parsed.event.attempt_fields().unwrap();
        assert!(!fields.valid_login_attempt);
        assert!(!fields.username_is_valid);
        assert_eq!(fields.port, 54321);
    }

    #[test]
    fn parses_accepted_publickey() {
        let line =
            "Jan 10 03:15:01 host sshd[1235]: Accepted publickey for alice from 198.51.100.9 port 22 ssh2";
        let parsed = classifier().parse(line).unwrap();
        let fields = parsed.event.attempt_fields().unwrap();
        assert!(fields.valid_login_attempt);
        assert!(fields.username_is_valid);
        assert_eq!(fields.username, "alice");
        assert_eq!(fields.ip, "198.51.100.9");
        assert_eq!(fields.port, 22);
    }

    #[test]
    fn parsing_is_deterministic() {
        let line =
            "Feb  3 11:02:44 bastion sshd[9]: Failed password for root from 198.51.100.77 port 60022 ssh2";
        let c = classifier();
        assert_eq!(c.parse(line), c.parse(line));
    }

    #[test]
    fn parses_ipv6_source() {
        let line =
            "Mar 12 08:00:00 host sshd[77]: Failed password for root from 2001:db8::1 port 2222 ssh2";
        let parsed = classifier().parse(line).unwrap();
        let fields = parsed.event.attempt_fields().unwrap();
        assert_eq!(fields.ip, "2001:db8::1");
        assert_eq!(fields.port, 2222);
    }

    #[test]
    fn username_with_spaces_does_not_split_the_line() {
        let line =
            "Jan 10 03:14:22 host sshd[1]: Failed password for invalid user test user from 192.0.2.7 port 4022 ssh2";
        let parsed = classifier().parse(line).unwrap();
        let fields = parsed.event.attempt_fields().unwrap();
        assert_eq!(fields.username, "test user");
        assert_eq!(fields.ip, "192.0.2.7");
    }

    #[test]
    fn invalid_user_line_without_port_yields_sentinel() {
        let line = "Jan 10 03:14:23 host sshd[2]: Invalid user admin from 203.0.113.5";
        let parsed = classifier().parse(line).unwrap();
        assert_eq!(
            parsed.event,
            SshdEvent::InvalidUser {
                user: "admin".to_string(),
                ip: "203.0.113.5".to_string(),
                port: None,
            }
        );
        assert_eq!(parsed.event.attempt_fields().unwrap().port, 0);
    }

    #[test]
    fn invalid_user_line_with_empty_username() {
        let line = "Jan 10 03:14:23 host sshd[2]: Invalid user  from 203.0.113.5 port 4100";
        let parsed = classifier().parse(line).unwrap();
        let fields = parsed.event.attempt_fields().unwrap();
        assert_eq!(fields.username, "");
        assert!(!fields.username_is_valid);
    }

    #[test]
    fn parses_connection_closed_preauth() {
        let line = "Jan 11 01:00:00 host sshd[3]: Connection closed by 203.0.113.9 port 48916 [preauth]";
        let parsed = classifier().parse(line).unwrap();
        assert_eq!(
            parsed.event,
            SshdEvent::ConnectionClosed {
                user: None,
                known_user: false,
                ip: "203.0.113.9".to_string(),
                port: Some(48916),
            }
        );
    }

    #[test]
    fn parses_connection_closed_by_invalid_user() {
        let line =
            "Jan 11 01:00:01 host sshd[4]: Connection closed by invalid user oracle 198.51.100.3 port 41000 [preauth]";
        let parsed = classifier().parse(line).unwrap();
        let fields = parsed.event.attempt_fields().unwrap();
        assert_eq!(fields.username, "oracle");
        assert!(!fields.username_is_valid);
    }

    #[test]
    fn parses_disconnect_from_authenticating_user() {
        let line =
            "Jan 11 01:00:02 host sshd[5]: Disconnected from authenticating user root 198.51.100.4 port 50000 [preauth]";
        let parsed = classifier().parse(line).unwrap();
        let fields = parsed.event.attempt_fields().unwrap();
        assert_eq!(fields.username, "root");
        assert!(fields.username_is_valid);
        assert!(!fields.valid_login_attempt);
    }

    #[test]
    fn parses_legacy_received_disconnect() {
        let line = "Jan 11 01:00:03 host sshd[6]: Received disconnect from 85.245.107.41: 11: Bye Bye [preauth]";
        let parsed = classifier().parse(line).unwrap();
        assert_eq!(
            parsed.event,
            SshdEvent::Disconnect {
                user: None,
                known_user: false,
                ip: "85.245.107.41".to_string(),
                port: None,
            }
        );
    }

    #[test]
    fn non_sshd_lines_are_rejected() {
        let c = classifier();
        assert_eq!(c.parse("Jan 10 03:17:01 host CRON[1433]: pam_unix(cron:session): session opened"), None);
        assert_eq!(c.parse("not a log line"), None);
        assert_eq!(c.parse(""), None);
    }

    #[test]
    fn unknown_sshd_chatter_is_unrecognized() {
        let line = "Jan 10 03:14:25 host sshd[8]: pam_unix(sshd:auth): authentication failure; logname= uid=0";
        let parsed = classifier().parse(line).unwrap();
        assert_eq!(parsed.event, SshdEvent::Unrecognized);
        assert_eq!(parsed.event.attempt_fields(), None);
    }

    #[test]
    fn year_inference_handles_rollover() {
        let mut years = YearInference::new(2022);
        let dec = years.resolve("Dec 31 23:59:59").unwrap();
        let jan = years.resolve("Jan  1 00:00:01").unwrap();
        assert_eq!(dec.year(), 2022);
        assert_eq!(jan.year(), 2023);
        assert!(jan > dec);
    }

    #[test]
    fn year_inference_uses_base_year() {
        let mut years = YearInference::new(2019);
        let dt = years.resolve("Jan 10 03:14:22").unwrap();
        assert_eq!(dt.year(), 2019);
        assert_eq!(dt.month(), 1);
        assert_eq!(dt.day(), 10);
    }

    #[test]
    fn unparseable_stamp_is_dropped_not_fatal() {
        let mut years = YearInference::new(2022);
        assert_eq!(years.resolve("Xxx 99 99:99:99"), None);
    }
}
