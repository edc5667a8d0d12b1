use chrono::{DateTime, Duration, NaiveDate, NaiveTime, Utc};

/// Maximum session title length.
pub const MAX_TITLE_LENGTH: usize = 200;

/// Days the join window stays open after session creation, regardless of
/// the session's own duration.
pub const JOIN_WINDOW_DAYS: i64 = 3;

/// Hours the selection poll stays open after the join window closes.
pub const SELECTION_POLL_WINDOW_HOURS: i64 = 48;

/// Fixed approximation: a month is 30 days for session-length purposes.
const DAYS_PER_MONTH: i64 = 30;

/// Validate a session or suggestion title. Must be non-empty after trimming
/// and within the length limit.
pub fn validate_title(title: &str) -> Result<(), String> {
    if title.trim().is_empty() {
        return Err("Title cannot be empty".into());
    }
    if title.len() > MAX_TITLE_LENGTH {
        return Err(format!("Title too long (max {} characters)", MAX_TITLE_LENGTH));
    }
    Ok(())
}

/// Compute a session length from an amount and unit. Only whole weeks
/// (7 days each) and months (30 days each) are accepted.
pub fn session_length(amount: i64, unit: &str) -> Result<Duration, String> {
    if amount <= 0 {
        return Err("Duration must be a positive whole number".into());
    }
    match unit.trim().to_lowercase().as_str() {
        "week" | "weeks" => Ok(Duration::days(7 * amount)),
        "month" | "months" => Ok(Duration::days(DAYS_PER_MONTH * amount)),
        other => Err(format!("Unknown duration unit '{other}' (use weeks or months)")),
    }
}

/// Parse a raw duration string of the form "<amount> <unit>", e.g. "2 weeks".
pub fn parse_session_length(raw: &str) -> Result<Duration, String> {
    let mut parts = raw.split_whitespace();
    let amount = parts
        .next()
        .ok_or_else(|| "Duration cannot be empty".to_string())?;
    let unit = parts
        .next()
        .ok_or_else(|| "Duration needs a unit (weeks or months)".to_string())?;
    if parts.next().is_some() {
        return Err(format!("Could not parse duration '{raw}'"));
    }
    let amount: i64 = amount
        .parse()
        .map_err(|_| format!("'{amount}' is not a whole number"))?;
    session_length(amount, unit)
}

/// Parse a session start from "YYYY-MM-DD" and "HH:MM" strings, interpreted
/// as UTC.
pub fn parse_start(date: &str, time: &str) -> Result<DateTime<Utc>, String> {
    let date = NaiveDate::parse_from_str(date, "%Y-%m-%d")
        .map_err(|_| format!("'{date}' is not a valid date (expected YYYY-MM-DD)"))?;
    let time = NaiveTime::parse_from_str(time, "%H:%M")
        .map_err(|_| format!("'{time}' is not a valid time (expected HH:MM)"))?;
    Ok(date.and_time(time).and_utc())
}

/// Normalize a suggestion title into its dedup key: trimmed, whitespace
/// collapsed, each word title-cased. "the left hand  of darkness" becomes
/// "The Left Hand Of Darkness".
pub fn normalize_title(raw: &str) -> String {
    raw.split_whitespace()
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => {
                    first.to_uppercase().collect::<String>() + &chars.as_str().to_lowercase()
                }
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Validate a book rating. Must be within 1-10 inclusive.
pub fn validate_rating(rating: i64) -> Result<(), String> {
    if !(1..=10).contains(&rating) {
        return Err(format!("Rating must be between 1 and 10, got {rating}"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_valid_titles() {
        assert!(validate_title("Dune").is_ok());
        assert!(validate_title("  A Memory Called Empire  ").is_ok());
    }

    #[test]
    fn test_invalid_titles() {
        assert!(validate_title("").is_err());
        assert!(validate_title("   ").is_err());
        assert!(validate_title(&"a".repeat(201)).is_err());
    }

    #[test]
    fn test_session_length_weeks_and_months() {
        assert_eq!(session_length(2, "weeks").unwrap(), Duration::days(14));
        assert_eq!(session_length(1, "week").unwrap(), Duration::days(7));
        assert_eq!(session_length(1, "month").unwrap(), Duration::days(30));
        assert_eq!(session_length(3, "Months").unwrap(), Duration::days(90));
    }

    #[test]
    fn test_session_length_rejects_bad_input() {
        assert!(session_length(0, "weeks").is_err());
        assert!(session_length(-1, "weeks").is_err());
        assert!(session_length(2, "days").is_err());
        assert!(session_length(2, "fortnights").is_err());
    }

    #[test]
    fn test_parse_session_length() {
        assert_eq!(parse_session_length("2 weeks").unwrap(), Duration::days(14));
        assert_eq!(parse_session_length(" 1  month ").unwrap(), Duration::days(30));
        assert!(parse_session_length("weeks").is_err());
        assert!(parse_session_length("two weeks").is_err());
        assert!(parse_session_length("2").is_err());
        assert!(parse_session_length("2 weeks extra").is_err());
        assert!(parse_session_length("").is_err());
    }

    #[test]
    fn test_parse_start() {
        let start = parse_start("2024-01-01", "18:00").unwrap();
        assert_eq!(start, Utc.with_ymd_and_hms(2024, 1, 1, 18, 0, 0).unwrap());

        assert!(parse_start("01-01-2024", "18:00").is_err());
        assert!(parse_start("2024-01-01", "6pm").is_err());
        assert!(parse_start("2024-13-01", "18:00").is_err());
    }

    #[test]
    fn test_normalize_title() {
        assert_eq!(normalize_title("dune"), "Dune");
        assert_eq!(normalize_title("  DUNE  "), "Dune");
        assert_eq!(
            normalize_title("the left hand  of darkness"),
            "The Left Hand Of Darkness"
        );
    }

    #[test]
    fn test_normalized_case_variants_collide() {
        assert_eq!(normalize_title("Dune"), normalize_title("dune"));
        assert_eq!(normalize_title("dUNE"), normalize_title("DUNE"));
    }

    #[test]
    fn test_rating_bounds() {
        assert!(validate_rating(1).is_ok());
        assert!(validate_rating(10).is_ok());
        assert!(validate_rating(0).is_err());
        assert!(validate_rating(11).is_err());
        assert!(validate_rating(-3).is_err());
    }
}
