use crate::error::{CacheError, Result};
use serde::Serialize;
use serde_json::Value;

/// Estimate used when a value cannot be rendered as JSON.
pub const FALLBACK_SIZE: u64 = 64;

const SI_UNITS: [(&str, u64); 4] = [
    ("kb", 1_000),
    ("mb", 1_000_000),
    ("gb", 1_000_000_000),
    ("tb", 1_000_000_000_000),
];

const IEC_UNITS: [(&str, u64); 4] = [
    ("kib", 1 << 10),
    ("mib", 1 << 20),
    ("gib", 1 << 30),
    ("tib", 1u64 << 40),
];

/// Produces a deterministic byte estimate for any serializable value.
///
/// The estimate is computed over the JSON rendering of the value, so it is
/// stable across runs and independent of allocator behaviour. Per-node
/// costs:
///
/// * null: 8
/// * boolean: 4
/// * number: 8
/// * string: 2 bytes per character
/// * array: 24 plus the sum of its elements
/// * object: 16 plus, per field, 2 bytes per key character plus the value
///
/// A value whose serialization fails estimates at [`FALLBACK_SIZE`].
///
/// # Examples
///
/// ```
/// use locus_cache::size_estimator::estimate_size;
///
/// assert_eq!(estimate_size(&true), 4);
/// assert_eq!(estimate_size(&"hi"), 4);
/// assert_eq!(estimate_size(&vec![1, 2, 3]), 24 + 3 * 8);
/// ```
pub fn estimate_size<T: Serialize>(value: &T) -> u64 {
    match serde_json::to_value(value) {
        Ok(v) => estimate_value(&v),
        Err(_) => FALLBACK_SIZE,
    }
}

/// Byte estimate of an already-rendered JSON value.
pub fn estimate_value(value: &Value) -> u64 {
    match value {
        Value::Null => 8,
        Value::Bool(_) => 4,
        Value::Number(_) => 8,
        Value::String(s) => 2 * s.chars().count() as u64,
        Value::Array(items) => 24 + items.iter().map(estimate_value).sum::<u64>(),
        Value::Object(map) => {
            16 + map
                .iter()
                .map(|(k, v)| 2 * k.chars().count() as u64 + estimate_value(v))
                .sum::<u64>()
        }
    }
}

/// Parses a human-readable size limit into bytes.
///
/// Accepts plain byte counts, SI units (`KB`, `MB`, `GB`, `TB`, powers of
/// 1000) and IEC units (`KiB`, `MiB`, `GiB`, `TiB`, powers of 1024),
/// case-insensitive, with optional whitespace between number and unit and
/// decimal fractions. Empty input, zero, and negative values are rejected.
///
/// # Examples
///
/// ```
/// use locus_cache::size_estimator::parse_size_limit;
///
/// assert_eq!(parse_size_limit("1KiB").unwrap(), 1024);
/// assert_eq!(parse_size_limit("1.5GB").unwrap(), 1_500_000_000);
/// assert_eq!(parse_size_limit(" 500 ").unwrap(), 500);
/// assert!(parse_size_limit("0").is_err());
/// assert!(parse_size_limit("").is_err());
/// ```
pub fn parse_size_limit(input: &str) -> Result<u64> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(CacheError::bounds("empty size string"));
    }

    let split = trimmed
        .find(|c: char| c.is_ascii_alphabetic())
        .unwrap_or(trimmed.len());
    let (number_part, unit_part) = trimmed.split_at(split);
    let number_part = number_part.trim();
    let unit_part = unit_part.trim().to_lowercase();

    let amount: f64 = number_part
        .parse()
        .map_err(|_| CacheError::bounds(format!("unparseable size string: {input:?}")))?;
    if !amount.is_finite() || amount <= 0.0 {
        return Err(CacheError::bounds(format!(
            "size must be positive: {input:?}"
        )));
    }

    let factor = match unit_part.as_str() {
        "" | "b" => 1,
        unit => SI_UNITS
            .iter()
            .chain(IEC_UNITS.iter())
            .find(|(name, _)| *name == unit)
            .map(|(_, factor)| *factor)
            .ok_or_else(|| CacheError::bounds(format!("unknown size unit: {input:?}")))?,
    };

    Ok((amount * factor as f64).round() as u64)
}

/// Renders a byte count with the largest fitting unit.
///
/// With `binary` set, IEC units are used (powers of 1024), otherwise SI
/// units (powers of 1000). Fractions are kept to at most two decimals and
/// trailing zeros are dropped.
///
/// # Examples
///
/// ```
/// use locus_cache::size_estimator::format_bytes;
///
/// assert_eq!(format_bytes(1024, true), "1 KiB");
/// assert_eq!(format_bytes(1_500_000_000, false), "1.5 GB");
/// assert_eq!(format_bytes(512, true), "512 B");
/// ```
pub fn format_bytes(bytes: u64, binary: bool) -> String {
    let units: &[(&str, u64)] = if binary {
        &[
            ("TiB", 1u64 << 40),
            ("GiB", 1 << 30),
            ("MiB", 1 << 20),
            ("KiB", 1 << 10),
        ]
    } else {
        &[
            ("TB", 1_000_000_000_000),
            ("GB", 1_000_000_000),
            ("MB", 1_000_000),
            ("KB", 1_000),
        ]
    };

    for (name, factor) in units {
        if bytes >= *factor {
            let scaled = bytes as f64 / *factor as f64;
            return format!("{} {}", trim_decimal(scaled), name);
        }
    }
    format!("{bytes} B")
}

fn trim_decimal(value: f64) -> String {
    let rendered = format!("{value:.2}");
    let trimmed = rendered.trim_end_matches('0').trim_end_matches('.');
    trimmed.to_string()
}
