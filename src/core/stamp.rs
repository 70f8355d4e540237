use anyhow::{Context, Result};
use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, TimeZone, Utc};

/// ISO-8601 shape written to the UTC log (millisecond precision).
pub const NORMALIZED_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.3fZ";

/// Recorded value for frames whose timestamp could not be read.
pub const SENTINEL: &str = "N/A";

/// Overlay layouts tried in order. First match wins; OCR noise that matches
/// none of them is a soft failure, not an error.
pub const DEFAULT_LAYOUTS: &[&str] = &[
    // 10/26/2024 16:18:42.482 (dashcam, four-digit year)
    "%m/%d/%Y %H:%M:%S%.f",
    // 10/26/24 16:18:42.482 (same camera, two-digit year firmware)
    "%m/%d/%y %H:%M:%S%.f",
    // 26/10/2024 16:18:42 (right-camera rig)
    "%d/%m/%Y %H:%M:%S",
    // 15.10.1993 (VHS date-only overlay)
    "%d.%m.%Y",
];

/// Parses raw overlay text against an ordered list of accepted layouts and
/// normalizes the result to UTC.
///
/// The overlay clock is a local wall clock; `offset_secs` (seconds east of
/// UTC) says which one. Layout order is configuration, so no backtracking
/// across ambiguous matches happens here.
pub struct StampParser {
    layouts: Vec<String>,
    offset: FixedOffset,
}

impl StampParser {
    pub fn new(layouts: &[String], offset_secs: i32) -> Result<Self> {
        let offset = FixedOffset::east_opt(offset_secs)
            .with_context(|| format!("invalid utc offset: {} seconds", offset_secs))?;
        let layouts = if layouts.is_empty() {
            DEFAULT_LAYOUTS.iter().map(|s| s.to_string()).collect()
        } else {
            layouts.to_vec()
        };
        Ok(Self { layouts, offset })
    }

    /// Returns the normalized UTC time, or `None` when no layout matches or
    /// a matched shape has out-of-range fields (month 13, day 32). Never
    /// panics on any input.
    pub fn parse(&self, raw: &str) -> Option<DateTime<Utc>> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return None;
        }
        for layout in &self.layouts {
            if let Ok(dt) = NaiveDateTime::parse_from_str(trimmed, layout) {
                return self.to_utc(dt);
            }
            // Date-only layouts carry no time fields; midnight local.
            if let Ok(date) = NaiveDate::parse_from_str(trimmed, layout) {
                return self.to_utc(date.and_hms_opt(0, 0, 0)?);
            }
        }
        None
    }

    fn to_utc(&self, naive: NaiveDateTime) -> Option<DateTime<Utc>> {
        self.offset
            .from_local_datetime(&naive)
            .single()
            .map(|dt| dt.with_timezone(&Utc))
    }
}

/// Formats a normalized time the way the UTC log expects it.
pub fn format_utc(utc: &DateTime<Utc>) -> String {
    utc.format(NORMALIZED_FORMAT).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn parser() -> StampParser {
        StampParser::new(&[], 0).unwrap()
    }

    #[test]
    fn parses_dashcam_layout_with_fraction() {
        let utc = parser().parse("10/26/2024 16:18:42.482").unwrap();
        let expected = Utc
            .with_ymd_and_hms(2024, 10, 26, 16, 18, 42)
            .unwrap()
            .checked_add_signed(chrono::Duration::milliseconds(482))
            .unwrap();
        assert_eq!(utc, expected);
    }

    #[test]
    fn parses_two_digit_year_layout() {
        let utc = parser().parse("10/26/24 16:18:38.127").unwrap();
        assert_eq!(format_utc(&utc), "2024-10-26T16:18:38.127Z");
    }

    #[test]
    fn parses_day_first_layout_without_fraction() {
        let utc = parser().parse("26/10/2024 16:18:42").unwrap();
        assert_eq!(format_utc(&utc), "2024-10-26T16:18:42.000Z");
    }

    #[test]
    fn parses_vhs_date_only_layout_to_midnight() {
        let utc = parser().parse("15.10.1993").unwrap();
        assert_eq!(utc, Utc.with_ymd_and_hms(1993, 10, 15, 0, 0, 0).unwrap());
    }

    #[test]
    fn rejects_out_of_range_fields() {
        let p = parser();
        assert!(p.parse("32.13.1993").is_none());
        assert!(p.parse("13/32/2024 16:18:42.482").is_none());
        assert!(p.parse("00/00/2024 25:61:61.000").is_none());
    }

    #[test]
    fn rejects_garbage_and_empty_input() {
        let p = parser();
        assert!(p.parse("").is_none());
        assert!(p.parse("   ").is_none());
        assert!(p.parse("N/A").is_none());
        assert!(p.parse("NW 47.6 122.3").is_none());
        assert!(p.parse("1O/26/2024 16:18:42.482").is_none());
    }

    #[test]
    fn source_offset_shifts_into_utc() {
        // Overlay clock at UTC-7: 16:18 local is 23:18 UTC.
        let p = StampParser::new(&[], -7 * 3600).unwrap();
        let utc = p.parse("10/26/2024 16:18:42.482").unwrap();
        assert_eq!(format_utc(&utc), "2024-10-26T23:18:42.482Z");
    }

    #[test]
    fn normalized_format_round_trips() {
        let p = parser();
        let normalized_layouts = vec![NORMALIZED_FORMAT.to_string()];
        let reparser = StampParser::new(&normalized_layouts, 0).unwrap();

        for raw in ["10/26/2024 16:18:42.482", "15.10.1993", "26/10/2024 16:18:42"] {
            let utc = p.parse(raw).unwrap();
            let again = reparser.parse(&format_utc(&utc)).unwrap();
            assert_eq!(utc, again, "round trip drifted for {:?}", raw);
        }
    }

    #[test]
    fn layout_order_decides_ambiguous_dates() {
        // 01/02 parses month-first because that layout comes first.
        let utc = parser().parse("01/02/2024 00:00:00").unwrap();
        assert_eq!(format_utc(&utc), "2024-01-02T00:00:00.000Z");
    }

    #[test]
    fn rejects_invalid_offset() {
        assert!(StampParser::new(&[], 99 * 3600).is_err());
    }
}
