//! Date parsing and formatting for sheet cells, session dates and entry markers.

use time::format_description::well_known::Rfc3339;
use time::format_description::BorrowedFormatItem;
use time::macros::format_description;
use time::{Date, Month, OffsetDateTime, PrimitiveDateTime, UtcOffset};

use crate::sheet::CellValue;
use crate::SoapLogError;

const OFFSET_FORMAT: &[BorrowedFormatItem<'static>] =
    format_description!("[offset_hour sign:mandatory]:[offset_minute]");

const DATETIME_FORMATS: &[&[BorrowedFormatItem<'static>]] = &[
    format_description!("[year]-[month]-[day] [hour]:[minute]:[second]"),
    format_description!("[year]-[month]-[day]T[hour]:[minute]:[second]"),
    format_description!("[year]-[month]-[day] [hour]:[minute]"),
    format_description!(
        "[month padding:none]/[day padding:none]/[year] [hour padding:none]:[minute]:[second]"
    ),
    format_description!("[month padding:none]/[day padding:none]/[year] [hour padding:none]:[minute]"),
    format_description!(
        "[month padding:none]/[day padding:none]/[year] [hour repr:12 padding:none]:[minute]:[second] [period]"
    ),
    format_description!(
        "[month padding:none]/[day padding:none]/[year] [hour repr:12 padding:none]:[minute] [period]"
    ),
    format_description!(
        "[month padding:none]/[day padding:none]/[year], [hour repr:12 padding:none]:[minute]:[second] [period]"
    ),
    format_description!("[year]/[month]/[day] [hour]:[minute]:[second]"),
];

const DATE_FORMATS: &[&[BorrowedFormatItem<'static>]] = &[
    format_description!("[year]-[month]-[day]"),
    format_description!("[month padding:none]/[day padding:none]/[year]"),
    format_description!("[year]/[month]/[day]"),
    format_description!("[month repr:long] [day padding:none], [year]"),
    format_description!("[month repr:long] [day padding:none] [year]"),
    format_description!("[month repr:short] [day padding:none], [year]"),
    format_description!("[month repr:short] [day padding:none] [year]"),
];

/// Parses a `±HH:MM` offset string.
///
/// # Errors
/// Returns [`SoapLogError::Configuration`] when the value is not a valid offset.
pub fn parse_offset(value: &str) -> Result<UtcOffset, SoapLogError> {
    UtcOffset::parse(value.trim(), OFFSET_FORMAT).map_err(|err| {
        SoapLogError::Configuration(format!("invalid utc_offset '{value}' (expected ±HH:MM): {err}"))
    })
}

/// Parses an RFC3339 timestamp with any offset.
///
/// # Errors
/// Returns [`SoapLogError::Validation`] when the value is not RFC3339.
pub fn parse_rfc3339(value: &str) -> Result<OffsetDateTime, SoapLogError> {
    OffsetDateTime::parse(value, &Rfc3339)
        .map_err(|err| SoapLogError::Validation(format!("invalid RFC3339 timestamp: {err}")))
}

/// Formats a timestamp as RFC3339 in its own offset.
///
/// # Errors
/// Returns [`SoapLogError::Validation`] when formatting fails.
pub fn format_rfc3339(value: OffsetDateTime) -> Result<String, SoapLogError> {
    value
        .format(&Rfc3339)
        .map_err(|err| SoapLogError::Validation(format!("failed to format RFC3339 timestamp: {err}")))
}

#[must_use]
pub fn now_in_offset(offset: UtcOffset) -> OffsetDateTime {
    OffsetDateTime::now_utc().to_offset(offset)
}

/// Interprets free text from a sheet cell as a point in time.
///
/// RFC3339 values keep their own offset; date-only and naive date-time values
/// are taken to be in `offset`. Returns `None` for anything else.
#[must_use]
pub fn parse_sheet_datetime(raw: &str, offset: UtcOffset) -> Option<OffsetDateTime> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    if let Ok(parsed) = OffsetDateTime::parse(raw, &Rfc3339) {
        return Some(parsed);
    }
    for format in DATETIME_FORMATS {
        if let Ok(parsed) = PrimitiveDateTime::parse(raw, format) {
            return Some(parsed.assume_offset(offset));
        }
    }
    parse_calendar_date(raw).map(|date| date.midnight().assume_offset(offset))
}

fn parse_calendar_date(raw: &str) -> Option<Date> {
    DATE_FORMATS
        .iter()
        .find_map(|format| Date::parse(raw, format).ok())
        .or_else(|| parse_short_year_date(raw))
}

/// `M/D/YY`, with 00-49 in the 2000s and 50-99 in the 1900s.
fn parse_short_year_date(raw: &str) -> Option<Date> {
    let parts: Vec<&str> = raw.split('/').collect();
    let [month, day, year] = parts.as_slice() else {
        return None;
    };
    if year.len() != 2 || !year.bytes().all(|byte| byte.is_ascii_digit()) {
        return None;
    }
    let short_year: i32 = year.parse().ok()?;
    let year = if short_year < 50 { 2000 + short_year } else { 1900 + short_year };
    let month = Month::try_from(month.parse::<u8>().ok()?).ok()?;
    Date::from_calendar_date(year, month, day.parse().ok()?).ok()
}

/// Formats a calendar date as `M/D/YYYY`.
#[must_use]
pub fn format_us_date(date: Date) -> String {
    format!("{}/{}/{}", u8::from(date.month()), date.day(), date.year())
}

/// Canonicalizes a session-date answer to `M/D/YYYY`.
///
/// Date cells are rendered in `offset`. Text already shaped like `M/D/YYYY`
/// or `MM/DD/YYYY` is returned untouched, other parseable text is reformatted,
/// and anything unparseable (free-text answers) passes through as-is.
#[must_use]
pub fn format_session_date(value: &CellValue, offset: UtcOffset) -> String {
    match value {
        CellValue::DateTime(moment) => format_us_date(moment.to_offset(offset).date()),
        CellValue::Text(raw) => {
            if is_slash_date_text(raw) {
                return raw.clone();
            }
            match parse_sheet_datetime(raw, offset) {
                Some(moment) => format_us_date(moment.to_offset(offset).date()),
                None => raw.clone(),
            }
        }
        other => other.display_text(offset),
    }
}

/// `true` for text shaped exactly like `M/D/YYYY` (one or two digit month and day).
#[must_use]
pub fn is_slash_date_text(raw: &str) -> bool {
    let parts: Vec<&str> = raw.split('/').collect();
    let [month, day, year] = parts.as_slice() else {
        return false;
    };
    let digits = |part: &str, min: usize, max: usize| {
        (min..=max).contains(&part.len()) && part.bytes().all(|byte| byte.is_ascii_digit())
    };
    digits(month, 1, 2) && digits(day, 1, 2) && digits(year, 4, 4)
}

/// Formats the entry marker timestamp as `M/D/YYYY, h:mm:ss AM`.
#[must_use]
pub fn format_entry_timestamp(moment: OffsetDateTime) -> String {
    let hour = moment.hour();
    let (hour12, meridiem) = match hour {
        0 => (12, "AM"),
        1..=11 => (hour, "AM"),
        12 => (12, "PM"),
        _ => (hour - 12, "PM"),
    };
    format!(
        "{}, {}:{:02}:{:02} {}",
        format_us_date(moment.date()),
        hour12,
        moment.minute(),
        moment.second(),
        meridiem
    )
}

/// Formats a date-time cell for display as `M/D/YYYY H:MM:SS` in `offset`.
#[must_use]
pub fn format_cell_datetime(moment: OffsetDateTime, offset: UtcOffset) -> String {
    let local = moment.to_offset(offset);
    format!(
        "{} {}:{:02}:{:02}",
        format_us_date(local.date()),
        local.hour(),
        local.minute(),
        local.second()
    )
}
