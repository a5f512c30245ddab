//! Heuristic date parsing for the "newer than" cutoff.
//!
//! Accepts loosely formatted, user-supplied date strings (`21-11-2023`,
//! `Nov 21 2023`, `21 11 23`, ...) and resolves them into a
//! [`chrono::NaiveDate`]. Tokens are classified up front (year-like,
//! day-like, month name, ...) and only then assigned to calendar slots,
//! keeping each branch of the heuristic testable on its own.
//!
//! When day and month remain ambiguous, day-month-year positional order is
//! assumed. This matches the common non-US convention and is not
//! configurable.

use chrono::NaiveDate;
use thiserror::Error;

/// Error raised when a date string cannot be resolved into a calendar date.
#[derive(Debug, Error)]
pub enum DateError {
    /// The input is malformed or describes a day that does not exist.
    #[error("invalid date {input:?}: {reason}")]
    InvalidDate {
        /// The raw input string.
        input: String,
        /// Why resolution failed.
        reason: &'static str,
    },
}

impl DateError {
    fn invalid(input: &str, reason: &'static str) -> Self {
        Self::InvalidDate {
            input: input.to_string(),
            reason,
        }
    }
}

/// Lowercase English month names, index + 1 = month number.
const MONTH_NAMES: [&str; 12] = [
    "january",
    "february",
    "march",
    "april",
    "may",
    "june",
    "july",
    "august",
    "september",
    "october",
    "november",
    "december",
];

/// Classification of a single input token, computed before any slot
/// assignment is attempted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TokenClass {
    /// All digits, numerically above 31 and below 10000.
    YearLike,
    /// All digits, numerically in 13..=31 - can only be a day.
    DayLike,
    /// All digits, numerically 0..=12 - day or month.
    Small,
    /// Matches a full or 3-letter English month name.
    MonthName(u32),
    /// Anything else.
    Other,
}

#[derive(Debug, Clone, Copy)]
struct Token<'a> {
    raw: &'a str,
    numeric: Option<u32>,
    class: TokenClass,
}

fn classify(raw: &str) -> Token<'_> {
    let numeric = if !raw.is_empty() && raw.bytes().all(|b| b.is_ascii_digit()) {
        raw.parse::<u32>().ok()
    } else {
        None
    };

    let class = match numeric {
        Some(n) if (32..10_000).contains(&n) => TokenClass::YearLike,
        Some(n) if (13..=31).contains(&n) => TokenClass::DayLike,
        Some(n) if n <= 12 => TokenClass::Small,
        Some(_) => TokenClass::Other,
        None => match month_from_name(raw) {
            Some(m) => TokenClass::MonthName(m),
            None => TokenClass::Other,
        },
    };

    Token {
        raw,
        numeric,
        class,
    }
}

/// Matches a token against full or 3-letter English month names,
/// case-insensitively.
fn month_from_name(token: &str) -> Option<u32> {
    let lowered = token.to_ascii_lowercase();
    MONTH_NAMES
        .iter()
        .position(|name| *name == lowered || name[..3] == lowered)
        .map(|index| index as u32 + 1)
}

/// Expands a two-digit year by prefixing "20"; other widths pass through.
fn year_value(token: &Token<'_>) -> Option<u32> {
    let n = token.numeric?;
    if token.raw.len() == 2 {
        Some(2000 + n)
    } else {
        Some(n)
    }
}

/// Resolves a loosely formatted date string into a calendar date.
///
/// The input must split into exactly three tokens on any of the separators
/// `/`, `.`, `-`, `\` and space. Tokens are classified, then assigned:
///
/// 1. An all-digit token above 31 (and below 10000) is the year.
/// 2. Three numerically identical tokens are read positionally as
///    day-month-year.
/// 3. With the year known, a single token in 13..=31 is the day and the
///    other is the month; two tokens at most 12 are read day-then-month.
/// 4. With the year unknown and two tokens in 13..=31, the second token is
///    the month, the numerically largest remaining token the year, the last
///    remaining token the day.
/// 5. A month name (full or 3-letter, any case) resolves the month; failing
///    that, a sole leftover token after year and day is the month.
/// 6. Unfilled slots fall back to the original tokens in day-month-year
///    positional order, and two-digit years are expanded into 20xx.
///
/// # Errors
///
/// Returns [`DateError::InvalidDate`] when the input does not have three
/// tokens, a slot cannot be filled numerically, or the resulting triple is
/// not a real calendar date (e.g. February 31st).
pub fn resolve_date(raw: &str) -> Result<NaiveDate, DateError> {
    let pieces: Vec<&str> = raw
        .split(['/', '.', '-', '\\', ' '])
        .filter(|piece| !piece.is_empty())
        .collect();
    if pieces.len() != 3 {
        return Err(DateError::invalid(raw, "expected exactly three tokens"));
    }

    let tokens: Vec<Token<'_>> = pieces.iter().map(|piece| classify(piece)).collect();

    // Degenerate input: three identical numbers, read positionally.
    if let (Some(a), Some(b), Some(c)) = (tokens[0].numeric, tokens[1].numeric, tokens[2].numeric)
        && a == b
        && b == c
    {
        let year = year_value(&tokens[0]).unwrap_or(a);
        return build_date(raw, c, b, year);
    }

    let mut used = [false; 3];
    let mut day: Option<u32> = None;
    let mut month: Option<u32> = None;
    let mut year: Option<u32> = None;

    if let Some(index) = tokens.iter().position(|t| t.class == TokenClass::YearLike) {
        year = year_value(&tokens[index]);
        used[index] = true;
    }

    if year.is_some() {
        assign_with_known_year(&tokens, &mut used, &mut day, &mut month);
    } else {
        assign_with_unknown_year(&tokens, &mut used, &mut day, &mut month, &mut year);
    }

    // Month by name, or the sole leftover once year and day are settled.
    if month.is_none() {
        if let Some((index, m)) = tokens.iter().enumerate().find_map(|(i, t)| {
            if used[i] {
                return None;
            }
            match t.class {
                TokenClass::MonthName(m) => Some((i, m)),
                _ => None,
            }
        }) {
            month = Some(m);
            used[index] = true;
        } else if year.is_some() && day.is_some() {
            let leftovers: Vec<usize> = (0..3).filter(|&i| !used[i]).collect();
            if let [index] = leftovers[..]
                && let Some(n) = tokens[index].numeric
            {
                month = Some(n);
                used[index] = true;
            }
        }
    }

    // Positional fallback: day-month-year over the original tokens.
    let day = match day {
        Some(d) => d,
        None => tokens[0]
            .numeric
            .ok_or_else(|| DateError::invalid(raw, "day is not numeric"))?,
    };
    let month = match month {
        Some(m) => m,
        None => match tokens[1].class {
            TokenClass::MonthName(m) => m,
            _ => tokens[1]
                .numeric
                .ok_or_else(|| DateError::invalid(raw, "month is not numeric"))?,
        },
    };
    let year = match year {
        Some(y) => y,
        None => year_value(&tokens[2]).ok_or_else(|| DateError::invalid(raw, "year is not numeric"))?,
    };

    build_date(raw, day, month, year)
}

/// Year already assigned: settle day and month from the two leftover tokens.
fn assign_with_known_year(
    tokens: &[Token<'_>],
    used: &mut [bool; 3],
    day: &mut Option<u32>,
    month: &mut Option<u32>,
) {
    let remaining: Vec<usize> = (0..3).filter(|&i| !used[i]).collect();
    let day_like: Vec<usize> = remaining
        .iter()
        .copied()
        .filter(|&i| tokens[i].class == TokenClass::DayLike)
        .collect();

    if let [index] = day_like[..] {
        // Only one token can be a day; the other must be the month.
        *day = tokens[index].numeric;
        used[index] = true;
        if let Some(&other) = remaining.iter().find(|&&i| i != index)
            && let Some(n) = tokens[other].numeric
        {
            *month = Some(n);
            used[other] = true;
        }
    } else if remaining
        .iter()
        .all(|&i| matches!(tokens[i].class, TokenClass::Small))
    {
        // Both could be either; read day-then-month in given order.
        if let [first, second] = remaining[..] {
            *day = tokens[first].numeric;
            *month = tokens[second].numeric;
            used[first] = true;
            used[second] = true;
        }
    }
}

/// No year token: with two day-sized numbers present, the second positional
/// token is the month, the largest leftover the year, the last leftover the
/// day.
fn assign_with_unknown_year(
    tokens: &[Token<'_>],
    used: &mut [bool; 3],
    day: &mut Option<u32>,
    month: &mut Option<u32>,
    year: &mut Option<u32>,
) {
    let day_like_count = tokens
        .iter()
        .filter(|t| t.class == TokenClass::DayLike)
        .count();
    if day_like_count < 2 {
        return;
    }

    if tokens[1].numeric.is_some() {
        *month = tokens[1].numeric;
        used[1] = true;
    }

    if let Some(index) = (0..3)
        .filter(|&i| !used[i] && tokens[i].numeric.is_some())
        .max_by_key(|&i| tokens[i].numeric)
    {
        *year = year_value(&tokens[index]);
        used[index] = true;
    }

    if let Some(index) = (0..3).rev().find(|&i| !used[i])
        && let Some(n) = tokens[index].numeric
    {
        *day = Some(n);
        used[index] = true;
    }
}

fn build_date(raw: &str, day: u32, month: u32, year: u32) -> Result<NaiveDate, DateError> {
    let year = i32::try_from(year)
        .map_err(|_| DateError::invalid(raw, "year out of range"))?;
    NaiveDate::from_ymd_opt(year, month, day)
        .ok_or_else(|| DateError::invalid(raw, "no such calendar date"))
}
