// formwork-core/src/core/data_types.rs
// ============================================================================
// Module: Formwork Data Types
// Description: Column data types with SQL mapping, input normalization, and display.
// Purpose: Turn untrusted form input into storable values per column type.
// Dependencies: crate::core::{hashing, model, upload}, serde, serde_json, time
// ============================================================================

//! ## Overview
//! Every column carries a [`DataType`]. The type decides the SQL column
//! declaration, how submitted values are normalized before a save, and how a
//! stored value is rendered as HTML-safe text. Normalization is strict about
//! shape (numbers, enums, colors) and lenient about emptiness: empty strings
//! become `null`, and a `required` column then rejects the value.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::path::PathBuf;

use serde::Deserialize;
use serde::Serialize;
use serde_json::Number;
use serde_json::Value;
use thiserror::Error;
use time::Date;
use time::OffsetDateTime;
use time::PrimitiveDateTime;
use time::Time;
use time::format_description::well_known::Rfc3339;
use time::macros::format_description;

use crate::core::hashing::salted_sha256_hex;
use crate::core::model::ColumnSpec;
use crate::core::upload::UploadRequest;
use crate::core::upload::store_upload;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Dates before this year normalize to `null`.
const MIN_DATE_YEAR: i32 = 1000;
/// Unix timestamps below this value normalize to `null`.
const MIN_UNIX_TIMESTAMP: i64 = 1000;
/// Default display format for dates (PHP-style tokens).
pub const DEFAULT_DATE_FORMAT: &str = "d.m.Y";
/// Default display format for date-times (PHP-style tokens).
pub const DEFAULT_DATETIME_FORMAT: &str = "d.m.Y H:i:s";
/// Marker values that clear an image or file column.
const CLEAR_UPLOAD_MARKERS: &[&str] = &["delete_image", "delete_file"];

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Normalization errors for a single column.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DataTypeError {
    /// Required column received an empty value.
    #[error("{0} is required")]
    Required(String),
    /// Value does not match the column type.
    #[error("{column}: {message}")]
    Invalid {
        /// Column title.
        column: String,
        /// Reason.
        message: String,
    },
}

impl DataTypeError {
    /// Builds an invalid-value error for a column.
    fn invalid(column: &ColumnSpec, message: impl Into<String>) -> Self {
        Self::Invalid {
            column: column.title(),
            message: message.into(),
        }
    }
}

// ============================================================================
// SECTION: Normalization Context
// ============================================================================

/// Environment needed while normalizing values.
#[derive(Debug, Clone)]
pub struct NormalizeContext {
    /// Upload directory for image and file columns.
    pub upload_dir: Option<PathBuf>,
    /// Salt mixed into password digests.
    pub password_salt: String,
    /// Clock reading used for upload rename patterns.
    pub now: OffsetDateTime,
}

impl NormalizeContext {
    /// Creates a context stamped with the current time.
    #[must_use]
    pub fn new(upload_dir: Option<PathBuf>, password_salt: impl Into<String>) -> Self {
        Self {
            upload_dir,
            password_salt: password_salt.into(),
            now: OffsetDateTime::now_utc(),
        }
    }
}

// ============================================================================
// SECTION: Data Type
// ============================================================================

/// Column data type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataType {
    /// Bounded string.
    Varchar,
    /// Unbounded text.
    Text,
    /// Salted password digest.
    Password,
    /// Integer.
    Int,
    /// Fixed-point decimal.
    Decimal,
    /// Floating-point number.
    Float,
    /// Boolean flag.
    Boolean,
    /// Calendar date.
    Date,
    /// Date and time.
    #[serde(rename = "datetime")]
    DateTime,
    /// Time of day.
    Time,
    /// Foreign key to another model.
    Lookup,
    /// One of a fixed set of strings.
    Enum,
    /// `#rrggbb` color.
    Color,
    /// Arbitrary JSON value.
    Json,
    /// Uploaded image path.
    Image,
    /// Uploaded file path.
    File,
}

impl DataType {
    /// Returns the SQL column type declaration.
    #[must_use]
    pub fn sql_type(self, column: &ColumnSpec) -> String {
        match self {
            Self::Varchar => format!("varchar({})", column.byte_size()),
            Self::Text | Self::Json => "text".to_string(),
            Self::Int | Self::Lookup => "integer".to_string(),
            Self::Decimal => "decimal(14,4)".to_string(),
            Self::Float => "real".to_string(),
            Self::Boolean => "boolean".to_string(),
            Self::Date => "date".to_string(),
            Self::DateTime => "datetime".to_string(),
            Self::Time => "time".to_string(),
            Self::Password | Self::Enum | Self::Color | Self::Image | Self::File => {
                "varchar(255)".to_string()
            }
        }
    }

    /// Returns true when the type participates in text search.
    #[must_use]
    pub const fn is_searchable(self) -> bool {
        matches!(self, Self::Varchar | Self::Text | Self::Enum | Self::Color)
    }

    /// Returns true when stored values are integers.
    #[must_use]
    pub const fn is_integer(self) -> bool {
        matches!(self, Self::Int | Self::Lookup)
    }

    /// Normalizes a submitted value for storage.
    ///
    /// Returns `Ok(None)` when the column should be left unchanged (an empty
    /// password on update).
    ///
    /// # Errors
    ///
    /// Returns [`DataTypeError`] when the value is empty for a required
    /// column or does not match the type.
    pub fn normalize(
        self,
        column: &ColumnSpec,
        value: &Value,
        ctx: &NormalizeContext,
    ) -> Result<Option<Value>, DataTypeError> {
        if self == Self::Password {
            return normalize_password(column, value, ctx);
        }
        let normalized = if is_empty(value) {
            Value::Null
        } else {
            match self {
                Self::Varchar => normalize_varchar(column, value)?,
                Self::Text => Value::String(scalar_text(column, value)?),
                Self::Int => Value::Number(Number::from(parse_integer(column, value)?)),
                Self::Lookup => normalize_lookup(column, value)?,
                Self::Decimal | Self::Float => normalize_number(column, value)?,
                Self::Boolean => Value::Bool(parse_boolean(column, value)?),
                Self::Date => normalize_date(column, value)?,
                Self::DateTime => normalize_datetime(column, value)?,
                Self::Time => normalize_time(column, value)?,
                Self::Enum => normalize_enum(column, value)?,
                Self::Color => normalize_color(column, value)?,
                Self::Json => normalize_json(value),
                Self::Image | Self::File => normalize_upload(self, column, value, ctx)?,
                Self::Password => Value::Null,
            }
        };
        if normalized.is_null() && column.required {
            return Err(DataTypeError::Required(column.title()));
        }
        Ok(Some(normalized))
    }

    /// Renders a stored value as HTML-escaped display text.
    #[must_use]
    pub fn display(self, column: &ColumnSpec, value: &Value) -> String {
        if value.is_null() {
            return String::new();
        }
        let text = match self {
            Self::Boolean => {
                if value.as_bool().unwrap_or(false) { "Yes".to_string() } else { "No".to_string() }
            }
            Self::Password => "********".to_string(),
            Self::Date => value
                .as_str()
                .and_then(|text| Date::parse(text, format_description!("[year]-[month]-[day]")).ok())
                .map_or_else(
                    || plain_text(value),
                    |date| {
                        let format = column.format.as_deref().unwrap_or(DEFAULT_DATE_FORMAT);
                        format_php_date(format, date, Time::MIDNIGHT)
                    },
                ),
            Self::DateTime => value
                .as_str()
                .and_then(parse_datetime_text)
                .map_or_else(
                    || plain_text(value),
                    |stamp| {
                        let format = column.format.as_deref().unwrap_or(DEFAULT_DATETIME_FORMAT);
                        format_php_date(format, stamp.date(), stamp.time())
                    },
                ),
            Self::Decimal | Self::Float | Self::Int => match &column.unit {
                Some(unit) => format!("{} {unit}", plain_text(value)),
                None => plain_text(value),
            },
            _ => plain_text(value),
        };
        escape_html(&text)
    }
}

// ============================================================================
// SECTION: Normalizers
// ============================================================================

/// Returns true for null and blank strings.
fn is_empty(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(text) => text.trim().is_empty(),
        _ => false,
    }
}

/// Converts scalars to text; rejects arrays and objects.
fn scalar_text(column: &ColumnSpec, value: &Value) -> Result<String, DataTypeError> {
    match value {
        Value::String(text) => Ok(text.clone()),
        Value::Number(number) => Ok(number.to_string()),
        Value::Bool(flag) => Ok(flag.to_string()),
        _ => Err(DataTypeError::invalid(column, "expected a text value")),
    }
}

/// Normalizes a bounded string.
fn normalize_varchar(column: &ColumnSpec, value: &Value) -> Result<Value, DataTypeError> {
    let text = scalar_text(column, value)?;
    let limit = column.byte_size() as usize;
    if text.chars().count() > limit {
        return Err(DataTypeError::invalid(column, format!("must be at most {limit} characters")));
    }
    Ok(Value::String(text))
}

/// Parses an integer from a number or numeric string.
fn parse_integer(column: &ColumnSpec, value: &Value) -> Result<i64, DataTypeError> {
    match value {
        Value::Number(number) => {
            if let Some(integer) = number.as_i64() {
                return Ok(integer);
            }
            match number.as_f64() {
                Some(float) if float.fract() == 0.0 && float.abs() < 9.0e15 => {
                    #[allow(clippy::cast_possible_truncation, reason = "Bounded integral float.")]
                    Ok(float as i64)
                }
                _ => Err(DataTypeError::invalid(column, "expected an integer")),
            }
        }
        Value::String(text) => text
            .trim()
            .parse::<i64>()
            .map_err(|_| DataTypeError::invalid(column, "expected an integer")),
        _ => Err(DataTypeError::invalid(column, "expected an integer")),
    }
}

/// Normalizes a lookup id; `0` means no reference.
fn normalize_lookup(column: &ColumnSpec, value: &Value) -> Result<Value, DataTypeError> {
    let id = parse_integer(column, value)?;
    match id {
        0 => Ok(Value::Null),
        id if id < 0 => Err(DataTypeError::invalid(column, "lookup id must be positive")),
        id => Ok(Value::Number(Number::from(id))),
    }
}

/// Normalizes decimal and float values.
fn normalize_number(column: &ColumnSpec, value: &Value) -> Result<Value, DataTypeError> {
    let parsed = match value {
        Value::Number(number) => number.as_f64(),
        Value::String(text) => text.trim().replace(',', ".").parse::<f64>().ok(),
        _ => None,
    };
    parsed
        .and_then(Number::from_f64)
        .map(Value::Number)
        .ok_or_else(|| DataTypeError::invalid(column, "expected a number"))
}

/// Parses common boolean spellings.
fn parse_boolean(column: &ColumnSpec, value: &Value) -> Result<bool, DataTypeError> {
    match value {
        Value::Bool(flag) => Ok(*flag),
        Value::Number(number) => match number.as_i64() {
            Some(0) => Ok(false),
            Some(1) => Ok(true),
            _ => Err(DataTypeError::invalid(column, "expected a boolean")),
        },
        Value::String(text) => match text.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "y" | "yes" | "on" => Ok(true),
            "0" | "false" | "n" | "no" | "off" => Ok(false),
            _ => Err(DataTypeError::invalid(column, "expected a boolean")),
        },
        _ => Err(DataTypeError::invalid(column, "expected a boolean")),
    }
}

/// Normalizes a date to `YYYY-MM-DD`; unparsable input becomes `null`.
fn normalize_date(column: &ColumnSpec, value: &Value) -> Result<Value, DataTypeError> {
    let date = match value {
        Value::String(text) => parse_date_text(text.trim()),
        Value::Number(number) => number
            .as_i64()
            .filter(|stamp| *stamp >= MIN_UNIX_TIMESTAMP)
            .and_then(|stamp| OffsetDateTime::from_unix_timestamp(stamp).ok())
            .map(OffsetDateTime::date),
        _ => return Err(DataTypeError::invalid(column, "expected a date")),
    };
    Ok(date
        .filter(|date| date.year() >= MIN_DATE_YEAR)
        .and_then(|date| date.format(format_description!("[year]-[month]-[day]")).ok())
        .map_or(Value::Null, Value::String))
}

/// Normalizes a date-time to `YYYY-MM-DD HH:MM:SS`.
fn normalize_datetime(column: &ColumnSpec, value: &Value) -> Result<Value, DataTypeError> {
    let stamp = match value {
        Value::String(text) => parse_datetime_text(text.trim()),
        Value::Number(number) => number
            .as_i64()
            .filter(|stamp| *stamp >= MIN_UNIX_TIMESTAMP)
            .and_then(|stamp| OffsetDateTime::from_unix_timestamp(stamp).ok())
            .map(|stamp| PrimitiveDateTime::new(stamp.date(), stamp.time())),
        _ => return Err(DataTypeError::invalid(column, "expected a date and time")),
    };
    Ok(stamp
        .filter(|stamp| stamp.year() >= MIN_DATE_YEAR)
        .and_then(|stamp| {
            stamp.format(format_description!("[year]-[month]-[day] [hour]:[minute]:[second]")).ok()
        })
        .map_or(Value::Null, Value::String))
}

/// Normalizes a time of day to `HH:MM:SS`.
fn normalize_time(column: &ColumnSpec, value: &Value) -> Result<Value, DataTypeError> {
    let Value::String(text) = value else {
        return Err(DataTypeError::invalid(column, "expected a time"));
    };
    let text = text.trim();
    let time = Time::parse(text, format_description!("[hour padding:none]:[minute]:[second]"))
        .or_else(|_| Time::parse(text, format_description!("[hour padding:none]:[minute]")))
        .map_err(|_| DataTypeError::invalid(column, "expected a time (HH:MM[:SS])"))?;
    time.format(format_description!("[hour]:[minute]:[second]"))
        .map(Value::String)
        .map_err(|err| DataTypeError::invalid(column, err.to_string()))
}

/// Accepts only declared enum values.
fn normalize_enum(column: &ColumnSpec, value: &Value) -> Result<Value, DataTypeError> {
    let text = scalar_text(column, value)?;
    if column.enum_values.iter().any(|allowed| *allowed == text) {
        Ok(Value::String(text))
    } else {
        Err(DataTypeError::invalid(column, format!("value not allowed: {text}")))
    }
}

/// Accepts `#rrggbb` colors, lowercased.
fn normalize_color(column: &ColumnSpec, value: &Value) -> Result<Value, DataTypeError> {
    let text = scalar_text(column, value)?;
    let trimmed = text.trim();
    let valid = trimmed.len() == 7
        && trimmed.starts_with('#')
        && trimmed[1 ..].chars().all(|ch| ch.is_ascii_hexdigit());
    if valid {
        Ok(Value::String(trimmed.to_ascii_lowercase()))
    } else {
        Err(DataTypeError::invalid(column, "expected a #rrggbb color"))
    }
}

/// Parses JSON text; other values are kept as-is.
fn normalize_json(value: &Value) -> Value {
    match value {
        Value::String(text) => {
            serde_json::from_str(text).unwrap_or_else(|_| Value::String(text.clone()))
        }
        other => other.clone(),
    }
}

/// Hashes a password; empty input leaves the stored digest unchanged.
fn normalize_password(
    column: &ColumnSpec,
    value: &Value,
    ctx: &NormalizeContext,
) -> Result<Option<Value>, DataTypeError> {
    if is_empty(value) {
        if column.required && value.is_null() {
            return Err(DataTypeError::Required(column.title()));
        }
        return Ok(None);
    }
    let text = scalar_text(column, value)?;
    Ok(Some(Value::String(salted_sha256_hex(&ctx.password_salt, &text))))
}

/// Stores uploads and validates stored paths for image and file columns.
fn normalize_upload(
    data_type: DataType,
    column: &ColumnSpec,
    value: &Value,
    ctx: &NormalizeContext,
) -> Result<Value, DataTypeError> {
    match value {
        Value::String(text) => {
            if CLEAR_UPLOAD_MARKERS.contains(&text.as_str()) {
                return Ok(Value::Null);
            }
            if text.contains("..") {
                return Err(DataTypeError::invalid(column, "invalid file path"));
            }
            Ok(Value::String(text.clone()))
        }
        Value::Object(upload) => {
            let file_name = upload.get("fileName").and_then(Value::as_str).unwrap_or_default();
            let file_data = upload.get("fileData").and_then(Value::as_str).unwrap_or_default();
            if file_name.is_empty() || file_data.is_empty() {
                return Err(DataTypeError::invalid(column, "upload requires fileName and fileData"));
            }
            let request = UploadRequest {
                file_name,
                file_data,
                folder_path: column.folder_path.as_deref().unwrap_or_default(),
                rename_pattern: column.rename_pattern.as_deref(),
                images_only: data_type == DataType::Image,
            };
            store_upload(ctx.upload_dir.as_deref(), &request, ctx.now)
                .map(Value::String)
                .map_err(|err| DataTypeError::invalid(column, err.to_string()))
        }
        _ => Err(DataTypeError::invalid(column, "expected an upload object")),
    }
}

// ============================================================================
// SECTION: Date Helpers
// ============================================================================

/// Parses dates in ISO, RFC 3339, `DD.MM.YYYY`, and ISO date-time forms.
fn parse_date_text(text: &str) -> Option<Date> {
    Date::parse(text, format_description!("[year]-[month]-[day]"))
        .ok()
        .or_else(|| Date::parse(text, format_description!("[day].[month].[year]")).ok())
        .or_else(|| parse_datetime_text(text).map(PrimitiveDateTime::date))
}

/// Parses date-times in the forms accepted by forms and APIs.
fn parse_datetime_text(text: &str) -> Option<PrimitiveDateTime> {
    if let Ok(stamp) = OffsetDateTime::parse(text, &Rfc3339) {
        return Some(PrimitiveDateTime::new(stamp.date(), stamp.time()));
    }
    PrimitiveDateTime::parse(text, format_description!("[year]-[month]-[day] [hour]:[minute]:[second]"))
        .ok()
        .or_else(|| {
            PrimitiveDateTime::parse(text, format_description!("[year]-[month]-[day]T[hour]:[minute]:[second]")).ok()
        })
        .or_else(|| {
            PrimitiveDateTime::parse(text, format_description!("[year]-[month]-[day] [hour]:[minute]")).ok()
        })
        .or_else(|| {
            PrimitiveDateTime::parse(text, format_description!("[year]-[month]-[day]T[hour]:[minute]")).ok()
        })
        .or_else(|| {
            Date::parse(text, format_description!("[year]-[month]-[day]"))
                .ok()
                .map(|date| PrimitiveDateTime::new(date, Time::MIDNIGHT))
        })
}

/// Formats a date with PHP-style tokens (`d j m n Y y H G i s`).
#[must_use]
pub fn format_php_date(format: &str, date: Date, time: Time) -> String {
    let mut out = String::with_capacity(format.len() + 8);
    for token in format.chars() {
        match token {
            'd' => out.push_str(&format!("{:02}", date.day())),
            'j' => out.push_str(&date.day().to_string()),
            'm' => out.push_str(&format!("{:02}", u8::from(date.month()))),
            'n' => out.push_str(&u8::from(date.month()).to_string()),
            'Y' => out.push_str(&format!("{:04}", date.year())),
            'y' => out.push_str(&format!("{:02}", date.year().rem_euclid(100))),
            'H' => out.push_str(&format!("{:02}", time.hour())),
            'G' => out.push_str(&time.hour().to_string()),
            'i' => out.push_str(&format!("{:02}", time.minute())),
            's' => out.push_str(&format!("{:02}", time.second())),
            other => out.push(other),
        }
    }
    out
}

// ============================================================================
// SECTION: Display Helpers
// ============================================================================

/// Converts a value to plain text without quoting strings.
fn plain_text(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// Escapes HTML special characters.
#[must_use]
pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            other => out.push(other),
        }
    }
    out
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    #![allow(
        clippy::panic,
        clippy::unwrap_used,
        clippy::expect_used,
        reason = "Test-only assertions."
    )]

    use serde_json::json;

    use super::*;

    fn ctx() -> NormalizeContext {
        NormalizeContext::new(None, "salt")
    }

    fn normalize(column: &ColumnSpec, value: Value) -> Result<Option<Value>, DataTypeError> {
        column.data_type.normalize(column, &value, &ctx())
    }

    #[test]
    fn empty_values_become_null_unless_required() {
        let optional = ColumnSpec::new("note", DataType::Varchar);
        assert_eq!(normalize(&optional, json!("  ")).unwrap(), Some(Value::Null));
        let required = ColumnSpec::new("name", DataType::Varchar).required();
        assert_eq!(normalize(&required, json!("")), Err(DataTypeError::Required("name".to_string())));
    }

    #[test]
    fn varchar_enforces_length() {
        let mut column = ColumnSpec::new("code", DataType::Varchar);
        column.byte_size = Some(3);
        assert!(normalize(&column, json!("abcd")).is_err());
        assert_eq!(normalize(&column, json!(123)).unwrap(), Some(json!("123")));
    }

    #[test]
    fn integers_and_lookups_parse_strings() {
        let int = ColumnSpec::new("count", DataType::Int);
        assert_eq!(normalize(&int, json!("42")).unwrap(), Some(json!(42)));
        assert!(normalize(&int, json!("4.2")).is_err());
        let lookup = ColumnSpec::new("id_customer", DataType::Lookup).lookup("Crm/Customer");
        assert_eq!(normalize(&lookup, json!("0")).unwrap(), Some(Value::Null));
        assert_eq!(normalize(&lookup, json!(5)).unwrap(), Some(json!(5)));
        assert!(normalize(&lookup, json!(-5)).is_err());
    }

    #[test]
    fn decimals_accept_comma_separator() {
        let column = ColumnSpec::new("price", DataType::Decimal);
        assert_eq!(normalize(&column, json!("12,5")).unwrap(), Some(json!(12.5)));
    }

    #[test]
    fn booleans_accept_common_spellings() {
        let column = ColumnSpec::new("active", DataType::Boolean);
        assert_eq!(normalize(&column, json!("Y")).unwrap(), Some(json!(true)));
        assert_eq!(normalize(&column, json!("off")).unwrap(), Some(json!(false)));
        assert_eq!(normalize(&column, json!(1)).unwrap(), Some(json!(true)));
        assert!(normalize(&column, json!("maybe")).is_err());
    }

    #[test]
    fn dates_normalize_and_reject_ancient_values() {
        let column = ColumnSpec::new("born", DataType::Date);
        assert_eq!(normalize(&column, json!("2024-02-29")).unwrap(), Some(json!("2024-02-29")));
        assert_eq!(normalize(&column, json!("05.03.2024")).unwrap(), Some(json!("2024-03-05")));
        assert_eq!(
            normalize(&column, json!("2024-03-05T10:00:00Z")).unwrap(),
            Some(json!("2024-03-05"))
        );
        assert_eq!(normalize(&column, json!("0999-01-01")).unwrap(), Some(Value::Null));
        assert_eq!(normalize(&column, json!("not a date")).unwrap(), Some(Value::Null));
        assert_eq!(normalize(&column, json!(999)).unwrap(), Some(Value::Null));
        assert_eq!(normalize(&column, json!(86_400)).unwrap(), Some(json!("1970-01-02")));
    }

    #[test]
    fn datetimes_and_times_normalize() {
        let column = ColumnSpec::new("at", DataType::DateTime);
        assert_eq!(
            normalize(&column, json!("2024-03-05T07:08")).unwrap(),
            Some(json!("2024-03-05 07:08:00"))
        );
        let time = ColumnSpec::new("opens", DataType::Time);
        assert_eq!(normalize(&time, json!("9:05")).unwrap(), Some(json!("09:05:00")));
        assert_eq!(normalize(&time, json!("17:30:15")).unwrap(), Some(json!("17:30:15")));
        assert_eq!(normalize(&time, json!("07:00")).unwrap(), Some(json!("07:00:00")));
        assert!(normalize(&time, json!("25:00")).is_err());
    }

    #[test]
    fn enums_and_colors_are_strict() {
        let column = ColumnSpec::new("state", DataType::Enum).with_enum_values(&["new", "done"]);
        assert!(normalize(&column, json!("done")).is_ok());
        assert!(normalize(&column, json!("lost")).is_err());
        let color = ColumnSpec::new("color", DataType::Color);
        assert_eq!(normalize(&color, json!("#A0B0C0")).unwrap(), Some(json!("#a0b0c0")));
        assert!(normalize(&color, json!("red")).is_err());
    }

    #[test]
    fn passwords_hash_and_keep_on_empty() {
        let column = ColumnSpec::new("password", DataType::Password);
        let hashed = normalize(&column, json!("secret")).unwrap().unwrap();
        assert_eq!(hashed, json!(salted_sha256_hex("salt", "secret")));
        assert_eq!(normalize(&column, json!("")).unwrap(), None);
    }

    #[test]
    fn uploads_clear_on_marker() {
        let column = ColumnSpec::new("photo", DataType::Image);
        assert_eq!(normalize(&column, json!("delete_image")).unwrap(), Some(Value::Null));
        assert!(normalize(&column, json!("../etc/passwd")).is_err());
        assert!(normalize(&column, json!({"fileName": "a.png", "fileData": "aGVsbG8="})).is_err());
    }

    #[test]
    fn display_formats_and_escapes() {
        let mut date = ColumnSpec::new("born", DataType::Date);
        assert_eq!(date.data_type.display(&date, &json!("2024-03-05")), "05.03.2024");
        date.format = Some("Y/n/j".to_string());
        assert_eq!(date.data_type.display(&date, &json!("2024-03-05")), "2024/3/5");
        let text = ColumnSpec::new("note", DataType::Text);
        assert_eq!(text.data_type.display(&text, &json!("<b>")), "&lt;b&gt;");
        let flag = ColumnSpec::new("active", DataType::Boolean);
        assert_eq!(flag.data_type.display(&flag, &json!(true)), "Yes");
    }

    #[test]
    fn sql_types_follow_column_attributes() {
        let mut column = ColumnSpec::new("code", DataType::Varchar);
        column.byte_size = Some(16);
        assert_eq!(DataType::Varchar.sql_type(&column), "varchar(16)");
        assert_eq!(DataType::Image.sql_type(&column), "varchar(255)");
    }
}
