//! Field converters.
//!
//! A converter maps one trimmed raw text field to one [`Value`], or rejects it with a
//! [`ConversionError`] carrying the offending text. Converters are pure; a rejection aborts
//! materialization of the whole row.

use std::sync::LazyLock;

use regex::Regex;

use crate::error::ConversionError;
use crate::types::Value;

/// Converts one raw text field into a typed [`Value`].
///
/// Any `Fn(&str) -> Result<Value, ConversionError>` closure is a converter too.
pub trait FieldConverter: Send + Sync {
    fn convert(&self, raw: &str) -> Result<Value, ConversionError>;
}

impl<F> FieldConverter for F
where
    F: Fn(&str) -> Result<Value, ConversionError> + Send + Sync,
{
    fn convert(&self, raw: &str) -> Result<Value, ConversionError> {
        self(raw)
    }
}

/// Text passed through unchanged.
#[derive(Debug, Clone, Copy, Default)]
pub struct Utf8Converter;

impl FieldConverter for Utf8Converter {
    fn convert(&self, raw: &str) -> Result<Value, ConversionError> {
        Ok(Value::Utf8(raw.to_owned()))
    }
}

/// Floating point numbers. An empty field becomes `0.0`.
#[derive(Debug, Clone, Copy, Default)]
pub struct Float64Converter;

impl FieldConverter for Float64Converter {
    fn convert(&self, raw: &str) -> Result<Value, ConversionError> {
        if raw.is_empty() {
            return Ok(Value::Float64(0.0));
        }
        raw.parse::<f64>()
            .map(Value::Float64)
            .map_err(|_| ConversionError::new(raw, format!("{raw} is not a valid number.")))
    }
}

/// Signed integers. An empty field becomes `0`.
#[derive(Debug, Clone, Copy, Default)]
pub struct Int64Converter;

impl FieldConverter for Int64Converter {
    fn convert(&self, raw: &str) -> Result<Value, ConversionError> {
        if raw.is_empty() {
            return Ok(Value::Int64(0));
        }
        raw.parse::<i64>()
            .map(Value::Int64)
            .map_err(|_| ConversionError::new(raw, format!("{raw} is not a valid integer.")))
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct BoolConverter;

impl FieldConverter for BoolConverter {
    fn convert(&self, raw: &str) -> Result<Value, ConversionError> {
        match raw.to_ascii_lowercase().as_str() {
            "true" | "t" | "1" | "yes" | "y" => Ok(Value::Bool(true)),
            "false" | "f" | "0" | "no" | "n" => Ok(Value::Bool(false)),
            _ => Err(ConversionError::new(
                raw,
                format!("{raw} is not a valid bool (true/false/1/0/yes/no)."),
            )),
        }
    }
}

static YEAR_MONTH: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(19|20)[0-9]{2}(0[1-9]|1[0-2])$").expect("valid year-month pattern"));

/// `YYYYMM` in the 1900s or 2000s, reformatted as `YYYY-MM`.
#[derive(Debug, Clone, Copy, Default)]
pub struct YearMonthConverter;

impl FieldConverter for YearMonthConverter {
    fn convert(&self, raw: &str) -> Result<Value, ConversionError> {
        if !YEAR_MONTH.is_match(raw) {
            return Err(ConversionError::new(
                raw,
                format!("{raw} is invalid format. valid format is e.g. 202101"),
            ));
        }
        // Pattern guarantees six ASCII digits.
        let (year, month) = raw.split_at(4);
        Ok(Value::Utf8(format!("{year}-{month}")))
    }
}
