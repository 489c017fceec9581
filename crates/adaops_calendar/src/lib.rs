//! iCalendar export of upcoming epoch boundaries and KES expiry.

use adaops::epoch::{EpochBoundary, KesExpiration};
use std::io::Write;
use std::path::Path;
use time::macros::format_description;
use time::{Duration, OffsetDateTime, UtcOffset};

const MAX_LINE_OCTETS: usize = 75;

/// Events to put in one calendar.
#[derive(Clone, Debug)]
pub struct CalendarInput {
    /// Prefix for event summaries, e.g. the pool ticker or network name.
    pub label: String,
    pub epochs: Vec<EpochBoundary>,
    pub kes_expiry: Option<KesExpiration>,
    /// DTSTAMP of every event.
    pub generated_at: OffsetDateTime,
}

/// Write the calendar to `out_path`.
pub fn render_calendar(input: &CalendarInput, out_path: impl AsRef<Path>) -> Result<(), CalendarError> {
    let ics = build_ics(input)?;
    let mut f = std::fs::File::create(out_path.as_ref()).map_err(CalendarError::Io)?;
    f.write_all(ics.as_bytes()).map_err(CalendarError::Io)?;
    Ok(())
}

/// Build the `.ics` document in memory.
pub fn build_ics(input: &CalendarInput) -> Result<String, CalendarError> {
    let stamp = utc_stamp(input.generated_at)?;
    let mut lines = vec![
        "BEGIN:VCALENDAR".to_string(),
        "VERSION:2.0".to_string(),
        "PRODID:-//adaops//epoch calendar//EN".to_string(),
        "CALSCALE:GREGORIAN".to_string(),
    ];

    for boundary in &input.epochs {
        lines.extend(event(
            &format!("epoch-{}@adaops", boundary.epoch),
            &stamp,
            boundary.starts_at,
            &format!("{} epoch {} starts", input.label, boundary.epoch),
            None,
        )?);
    }

    if let Some(kes) = &input.kes_expiry {
        let description = format!(
            "KES key expires in {:.0} seconds; rotate keys and issue a new operational certificate.",
            kes.seconds_remaining
        );
        lines.extend(event(
            &format!("kes-{}@adaops", kes.expires_at.unix_timestamp()),
            &stamp,
            kes.expires_at,
            &format!("{} KES expiry", input.label),
            Some(&description),
        )?);
    }

    lines.push("END:VCALENDAR".to_string());

    let mut out = String::new();
    for line in lines {
        out.push_str(&fold_line(&line));
        out.push_str("\r\n");
    }
    Ok(out)
}

fn event(
    uid: &str,
    stamp: &str,
    start: OffsetDateTime,
    summary: &str,
    description: Option<&str>,
) -> Result<Vec<String>, CalendarError> {
    let mut lines = vec![
        "BEGIN:VEVENT".to_string(),
        format!("UID:{}", escape_text(uid)),
        format!("DTSTAMP:{stamp}"),
        format!("DTSTART:{}", utc_stamp(start)?),
        format!("DTEND:{}", utc_stamp(start + Duration::hours(1))?),
        format!("SUMMARY:{}", escape_text(summary)),
    ];
    if let Some(description) = description {
        lines.push(format!("DESCRIPTION:{}", escape_text(description)));
    }
    lines.push("END:VEVENT".to_string());
    Ok(lines)
}

fn utc_stamp(t: OffsetDateTime) -> Result<String, CalendarError> {
    t.to_offset(UtcOffset::UTC)
        .format(format_description!(
            "[year][month][day]T[hour][minute][second]Z"
        ))
        .map_err(CalendarError::Format)
}

/// TEXT escaping per RFC 5545 3.3.11.
fn escape_text(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            ';' => out.push_str("\\;"),
            ',' => out.push_str("\\,"),
            '\n' => out.push_str("\\n"),
            '\r' => {}
            c => out.push(c),
        }
    }
    out
}

/// Folds at 75 octets without splitting a UTF-8 sequence; continuation lines start with a space.
fn fold_line(line: &str) -> String {
    let mut out = String::with_capacity(line.len() + line.len() / MAX_LINE_OCTETS * 3);
    let mut used = 0;
    for c in line.chars() {
        let width = c.len_utf8();
        if used + width > MAX_LINE_OCTETS {
            out.push_str("\r\n ");
            used = 1;
        }
        out.push(c);
        used += width;
    }
    out
}

#[derive(Debug)]
pub enum CalendarError {
    Io(std::io::Error),
    Format(time::error::Format),
}

impl std::fmt::Display for CalendarError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CalendarError::Io(e) => write!(f, "io: {e}"),
            CalendarError::Format(e) => write!(f, "format: {e}"),
        }
    }
}

impl std::error::Error for CalendarError {}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    fn input() -> CalendarInput {
        CalendarInput {
            label: "ADAOPS, mainnet".into(),
            epochs: vec![
                EpochBoundary {
                    epoch: 501,
                    starts_at: datetime!(2024-07-19 21:44:51 UTC),
                },
                EpochBoundary {
                    epoch: 502,
                    starts_at: datetime!(2024-07-24 21:44:51 UTC),
                },
            ],
            kes_expiry: Some(KesExpiration {
                seconds_remaining: 1_295_400.0,
                expires_at: datetime!(2024-08-01 12:00 UTC),
            }),
            generated_at: datetime!(2024-07-18 10:00 +2),
        }
    }

    #[test]
    fn calendar_structure() {
        let ics = build_ics(&input()).unwrap();
        assert!(ics.starts_with("BEGIN:VCALENDAR\r\nVERSION:2.0\r\n"));
        assert!(ics.ends_with("END:VCALENDAR\r\n"));
        assert_eq!(ics.matches("BEGIN:VEVENT").count(), 3);
        assert!(ics.contains("UID:epoch-501@adaops\r\n"));
        assert!(ics.contains("DTSTART:20240719T214451Z\r\n"));
        assert!(ics.contains("DTEND:20240719T224451Z\r\n"));
        assert!(ics.contains("DTSTAMP:20240718T080000Z\r\n"));
        assert!(ics.contains("SUMMARY:ADAOPS\\, mainnet epoch 502 starts\r\n"));
        assert!(ics.contains("DTSTART:20240801T120000Z\r\n"));
        assert!(!ics.replace("\r\n", "").contains('\n'));
    }

    #[test]
    fn no_kes_event_without_expiry() {
        let mut input = input();
        input.kes_expiry = None;
        input.epochs.truncate(1);
        let ics = build_ics(&input).unwrap();
        assert_eq!(ics.matches("BEGIN:VEVENT").count(), 1);
        assert!(!ics.contains("KES"));
    }

    #[test]
    fn text_escaping() {
        assert_eq!(escape_text("a;b,c\\d\ne"), "a\\;b\\,c\\\\d\\ne");
    }

    #[test]
    fn long_lines_fold() {
        let line = format!("DESCRIPTION:{}", "é".repeat(60));
        let folded = fold_line(&line);
        for part in folded.split("\r\n") {
            assert!(part.len() <= MAX_LINE_OCTETS);
        }
        assert_eq!(folded.replace("\r\n ", ""), line);
        assert_eq!(fold_line("SHORT"), "SHORT");
    }

    #[test]
    fn renders_to_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("epochs.ics");
        render_calendar(&input(), &path).unwrap();
        let written = std::fs::read_to_string(&path).unwrap();
        assert_eq!(written, build_ics(&input()).unwrap());
    }
}
