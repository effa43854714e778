//! Argument repair (spec §4.7): best-effort normalization of off-spec
//! numeric input from a higher-level assistant or UI into canonical atomic
//! decimal strings the schema validator will accept.

use num_bigint::BigUint;
use num_traits::Zero;
use serde_json::{Map, Value};

use crate::config::ArgumentRepairConfig;

/// Strip formatting artifacts the spec allows (`_`, `,`, and a trailing
/// whitespace-separated unit suffix when configured). Returns the cleaned
/// string; does not validate it is actually numeric.
fn strip_formatting(input: &str, config: &ArgumentRepairConfig) -> String {
    let mut s = input.replace(['_', ','], "");
    if config.strip_unit_suffix {
        if let Some(space_idx) = s.find(char::is_whitespace) {
            let (head, _tail) = s.split_at(space_idx);
            s = head.to_string();
        }
    }
    s.trim().to_string()
}

/// Multiply a decimal string by `10^decimals` using arbitrary-precision
/// integer arithmetic. Returns `None` if the input is not a valid
/// non-negative decimal, or if it carries more fractional digits than
/// `decimals` allows.
fn scale_decimal(cleaned: &str, decimals: u32) -> Option<String> {
    if cleaned.is_empty() {
        return None;
    }
    let (int_part, frac_part) = match cleaned.split_once('.') {
        Some((i, f)) => (i, f),
        None => (cleaned, ""),
    };
    if int_part.is_empty() && frac_part.is_empty() {
        return None;
    }
    if !int_part.is_empty() && !int_part.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    if !frac_part.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    if frac_part.len() as u32 > decimals {
        return None;
    }

    let int_part = if int_part.is_empty() { "0" } else { int_part };
    let padded_frac = format!("{:0<width$}", frac_part, width = decimals as usize);
    let digits = format!("{int_part}{padded_frac}");
    let value: BigUint = digits.parse().ok()?;
    Some(value.to_string())
}

/// Coerce a numeric argument (already an integer string, a decimal string,
/// or unparseable junk) into an atomic integer string with `decimals`
/// fractional places. Integer strings pass through untouched. Out-of-range
/// or unparseable input is returned unchanged so the schema validator can
/// reject it with a proper error (spec §4.7).
pub fn coerce_amount(input: &str, decimals: u32, config: &ArgumentRepairConfig) -> String {
    if !input.is_empty() && input.bytes().all(|b| b.is_ascii_digit()) {
        return input.to_string();
    }
    let cleaned = strip_formatting(input, config);
    match scale_decimal(&cleaned, decimals) {
        Some(scaled) => scaled,
        None => input.to_string(),
    }
}

/// Coerce a USDT-denominated argument (6 decimals, spec §4.7).
pub fn coerce_usdt(input: &str, config: &ArgumentRepairConfig) -> String {
    coerce_amount(input, config.usdt_decimals, config)
}

/// Coerce a native-lamport-denominated argument (9 decimals, spec §4.7).
pub fn coerce_lamports(input: &str, config: &ArgumentRepairConfig) -> String {
    coerce_amount(input, config.lamport_decimals, config)
}

/// Flattening repair: for `offer_post`-style requests, move top-level
/// scalar fields listed in `offer_fields` into a single-element `offers[]`
/// array. Conflicting values in an existing first offer are never
/// overwritten (spec §4.7 — no silent override).
pub fn flatten_offer_fields(request: &mut Map<String, Value>, offer_fields: &[&str]) {
    let mut offer = Map::new();
    for field in offer_fields {
        if let Some(value) = request.remove(*field) {
            offer.insert((*field).to_string(), value);
        }
    }
    if offer.is_empty() {
        return;
    }

    match request.get_mut("offers") {
        Some(Value::Array(offers)) if !offers.is_empty() => {
            if let Some(Value::Object(first)) = offers.first_mut() {
                for (key, value) in offer {
                    first.entry(key).or_insert(value);
                }
            }
        }
        _ => {
            request.insert("offers".to_string(), Value::Array(vec![Value::Object(offer)]));
        }
    }
}

#[allow(dead_code)]
fn is_zero(amount: &str) -> bool {
    amount.parse::<BigUint>().map(|v| v.is_zero()).unwrap_or(false)
}
