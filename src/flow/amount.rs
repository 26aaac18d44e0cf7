//! Decimal string <-> base unit conversion at the input boundary

use crate::error::ValidationError;

use ethers::types::U256;
use ethers::utils::{format_units, parse_units, ParseUnits};

/// Parse user input such as `"12.5"` into base units of an asset with `decimals`
pub fn parse_amount(input: &str, decimals: u8) -> Result<U256, ValidationError> {
    let input = input.trim();
    if input.is_empty() {
        return Err(ValidationError::InvalidAmount("amount required".to_string()));
    }
    if input.starts_with('-') {
        return Err(ValidationError::InvalidAmount("amount is negative".to_string()));
    }

    let (whole, fraction) = match input.split_once('.') {
        Some((whole, fraction)) => (whole, fraction),
        None => (input, ""),
    };
    let digits = |s: &str| s.chars().all(|c| c.is_ascii_digit());
    if (whole.is_empty() && fraction.is_empty()) || !digits(whole) || !digits(fraction) {
        return Err(ValidationError::InvalidAmount(format!("{:?} is not a number", input)));
    }
    if fraction.len() > decimals as usize {
        return Err(ValidationError::InvalidAmount(format!(
            "at most {} decimal places",
            decimals
        )));
    }

    let whole = if whole.is_empty() { "0" } else { whole };
    let normalized = if fraction.is_empty() {
        whole.to_string()
    } else {
        format!("{}.{}", whole, fraction)
    };
    match parse_units(normalized, decimals as u32) {
        Ok(ParseUnits::U256(amount)) => Ok(amount),
        Ok(ParseUnits::I256(_)) => Err(ValidationError::InvalidAmount(
            "amount is negative".to_string(),
        )),
        Err(e) => Err(ValidationError::InvalidAmount(e.to_string())),
    }
}

/// Display form of a base-unit amount, without trailing zeros
pub fn format_amount(amount: U256, decimals: u8) -> String {
    let formatted = match format_units(amount, decimals as u32) {
        Ok(s) => s,
        Err(_) => return amount.to_string(),
    };

    if formatted.contains('.') {
        formatted
            .trim_end_matches('0')
            .trim_end_matches('.')
            .to_string()
    } else {
        formatted
    }
}
