use std::collections::HashMap;

use crate::errors::AppError;

/// Parses a user-supplied dollar string like "12", "12.5" or "12.50" into
/// whole cents. Fractional digits beyond two are truncated, not rounded.
/// Signs, non-digits, extra decimal points and non-positive results are
/// all rejected.
pub fn dollars_to_cents(input: &str) -> Result<i64, AppError> {
    let parts: Vec<&str> = input.trim().split('.').collect();
    let cents = match parts.as_slice() {
        [whole] => parse_segment(whole)?
            .checked_mul(100)
            .ok_or(AppError::InvalidAmount)?,
        [whole, frac] => {
            if !frac.bytes().all(|b| b.is_ascii_digit()) {
                return Err(AppError::InvalidAmount);
            }
            let padded = format!("{:0<2}", frac);
            let frac = parse_segment(&padded[..2])?;
            parse_segment(whole)?
                .checked_mul(100)
                .and_then(|w| w.checked_add(frac))
                .ok_or(AppError::InvalidAmount)?
        }
        _ => return Err(AppError::InvalidAmount),
    };
    if cents <= 0 {
        return Err(AppError::InvalidAmount);
    }
    Ok(cents)
}

fn parse_segment(segment: &str) -> Result<i64, AppError> {
    if segment.is_empty() || !segment.bytes().all(|b| b.is_ascii_digit()) {
        return Err(AppError::InvalidAmount);
    }
    segment.parse::<i64>().map_err(|_| AppError::InvalidAmount)
}

/// Renders whole cents as a dollar string, e.g. 1250 -> "$12.50".
pub fn format_cents(cents: i64) -> String {
    format!("${}.{:02}", cents / 100, cents % 100)
}

/// Tera filter exposing [`format_cents`] to templates, so balances and
/// amounts render straight from their stored integer form.
pub fn dollars_filter(
    value: &tera::Value,
    _args: &HashMap<String, tera::Value>,
) -> tera::Result<tera::Value> {
    let cents = value
        .as_i64()
        .ok_or_else(|| tera::Error::msg("dollars filter expects an integer cent amount"))?;
    Ok(tera::Value::String(format_cents(cents)))
}
