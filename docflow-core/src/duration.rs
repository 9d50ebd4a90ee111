//! Duration strings used for SLA and re-approval timers.
//!
//! The grammar is a sequence of decimal numbers, each with an optional
//! fraction and a mandatory unit suffix:
//!
//! - `72h` - seventy-two hours
//! - `1h30m` - ninety minutes
//! - `1.5h` - ninety minutes
//! - `250ms` - a quarter second
//! - `0` - zero (the only value allowed without a unit)
//!
//! Valid units are `ns`, `us` (or `µs`), `ms`, `s`, `m` and `h`. A leading `+`
//! is accepted; negative durations are rejected. Values must fit in a signed
//! 64-bit count of nanoseconds (a little over 292 years).

use std::time::Duration;
use thiserror::Error;

const NANOS_PER_MICRO: u128 = 1_000;
const NANOS_PER_MILLI: u128 = 1_000_000;
const NANOS_PER_SEC: u128 = 1_000_000_000;
const NANOS_PER_MIN: u128 = 60 * NANOS_PER_SEC;
const NANOS_PER_HOUR: u128 = 60 * NANOS_PER_MIN;

/// Largest accepted duration, in nanoseconds.
const MAX_NANOS: u128 = i64::MAX as u128;

/// Fraction digits beyond this are ignored.
const MAX_FRACTION_DIGITS: u32 = 18;

/// Errors from duration parsing.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DurationError {
    #[error("empty duration")]
    Empty,

    #[error("negative duration '{0}'")]
    Negative(String),

    #[error("invalid duration '{0}'")]
    Invalid(String),

    #[error("missing unit in duration '{0}'")]
    MissingUnit(String),

    #[error("unknown unit '{unit}' in duration '{input}'")]
    UnknownUnit { unit: String, input: String },

    #[error("duration '{0}' out of range")]
    Overflow(String),
}

/// Parses a duration string.
pub fn parse_duration(input: &str) -> Result<Duration, DurationError> {
    Parser::new(input).parse()
}

/// Formats a duration so that [`parse_duration`] reads it back unchanged.
///
/// Whole hours, minutes and seconds are written as `h`, `m`, `s` components;
/// a sub-second remainder uses the largest unit that divides it exactly.
pub fn format_duration(duration: Duration) -> String {
    let nanos = duration.as_nanos();
    if nanos == 0 {
        return "0s".to_string();
    }

    let mut out = String::new();
    let hours = nanos / NANOS_PER_HOUR;
    let minutes = (nanos % NANOS_PER_HOUR) / NANOS_PER_MIN;
    let seconds = (nanos % NANOS_PER_MIN) / NANOS_PER_SEC;
    let sub = nanos % NANOS_PER_SEC;

    if hours > 0 {
        out.push_str(&format!("{}h", hours));
    }
    if minutes > 0 {
        out.push_str(&format!("{}m", minutes));
    }
    if seconds > 0 {
        out.push_str(&format!("{}s", seconds));
    }
    if sub > 0 {
        if sub % NANOS_PER_MILLI == 0 {
            out.push_str(&format!("{}ms", sub / NANOS_PER_MILLI));
        } else if sub % NANOS_PER_MICRO == 0 {
            out.push_str(&format!("{}us", sub / NANOS_PER_MICRO));
        } else {
            out.push_str(&format!("{}ns", sub));
        }
    }
    out
}

struct Parser<'a> {
    input: &'a str,
    pos: usize,
}

impl<'a> Parser<'a> {
    fn new(input: &'a str) -> Self {
        Self { input, pos: 0 }
    }

    fn parse(&mut self) -> Result<Duration, DurationError> {
        if self.input.is_empty() {
            return Err(DurationError::Empty);
        }

        match self.peek_char() {
            Some('-') => return Err(DurationError::Negative(self.input.to_string())),
            Some('+') => self.pos += 1,
            _ => {}
        }

        if &self.input[self.pos..] == "0" {
            return Ok(Duration::ZERO);
        }
        if self.at_end() {
            return Err(self.invalid());
        }

        let mut total: u128 = 0;
        while !self.at_end() {
            let (whole, frac, scale) = self.parse_number()?;
            let unit = self.parse_unit()?;

            let component = whole
                .checked_mul(unit)
                .and_then(|n| n.checked_add(frac * unit / scale))
                .ok_or_else(|| self.overflow())?;
            total = total
                .checked_add(component)
                .filter(|n| *n <= MAX_NANOS)
                .ok_or_else(|| self.overflow())?;
        }

        let secs = (total / NANOS_PER_SEC) as u64;
        let nanos = (total % NANOS_PER_SEC) as u32;
        Ok(Duration::new(secs, nanos))
    }

    /// Returns (whole part, fraction digits as integer, 10^fraction digits).
    fn parse_number(&mut self) -> Result<(u128, u128, u128), DurationError> {
        let start = self.pos;
        let mut whole: u128 = 0;
        while let Some(d) = self.peek_char().and_then(|c| c.to_digit(10)) {
            whole = whole
                .checked_mul(10)
                .and_then(|n| n.checked_add(d as u128))
                .filter(|n| *n <= MAX_NANOS)
                .ok_or_else(|| self.overflow())?;
            self.pos += 1;
        }
        let had_whole = self.pos > start;

        let mut frac: u128 = 0;
        let mut scale: u128 = 1;
        let mut had_frac = false;
        if self.peek_char() == Some('.') {
            self.pos += 1;
            let mut digits = 0;
            while let Some(d) = self.peek_char().and_then(|c| c.to_digit(10)) {
                if digits < MAX_FRACTION_DIGITS {
                    frac = frac * 10 + d as u128;
                    scale *= 10;
                    digits += 1;
                }
                had_frac = true;
                self.pos += 1;
            }
        }

        if !had_whole && !had_frac {
            return Err(self.invalid());
        }
        Ok((whole, frac, scale))
    }

    fn parse_unit(&mut self) -> Result<u128, DurationError> {
        let start = self.pos;
        while let Some(c) = self.peek_char() {
            if c == '.' || c.is_ascii_digit() {
                break;
            }
            self.pos += c.len_utf8();
        }

        let unit = &self.input[start..self.pos];
        match unit {
            "" => Err(DurationError::MissingUnit(self.input.to_string())),
            "ns" => Ok(1),
            "us" | "µs" | "μs" => Ok(NANOS_PER_MICRO),
            "ms" => Ok(NANOS_PER_MILLI),
            "s" => Ok(NANOS_PER_SEC),
            "m" => Ok(NANOS_PER_MIN),
            "h" => Ok(NANOS_PER_HOUR),
            other => Err(DurationError::UnknownUnit {
                unit: other.to_string(),
                input: self.input.to_string(),
            }),
        }
    }

    fn peek_char(&self) -> Option<char> {
        self.input[self.pos..].chars().next()
    }

    fn at_end(&self) -> bool {
        self.pos >= self.input.len()
    }

    fn invalid(&self) -> DurationError {
        DurationError::Invalid(self.input.to_string())
    }

    fn overflow(&self) -> DurationError {
        DurationError::Overflow(self.input.to_string())
    }
}
