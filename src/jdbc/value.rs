//! SQL values and result rows

use std::fmt;
use thiserror::Error;

/// A single SQL parameter or column value.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum SqlValue {
    /// SQL NULL
    #[default]
    Null,
    /// 64-bit signed integer
    Integer(i64),
    /// 64-bit float
    Real(f64),
    /// UTF-8 text
    Text(String),
    /// Raw bytes
    Blob(Vec<u8>),
}

impl SqlValue {
    /// Whether this is SQL NULL
    #[inline]
    pub fn is_null(&self) -> bool {
        matches!(self, SqlValue::Null)
    }

    /// Name of the variant, for error messages
    pub fn kind(&self) -> &'static str {
        match self {
            SqlValue::Null => "NULL",
            SqlValue::Integer(_) => "INTEGER",
            SqlValue::Real(_) => "REAL",
            SqlValue::Text(_) => "TEXT",
            SqlValue::Blob(_) => "BLOB",
        }
    }
}

impl fmt::Display for SqlValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SqlValue::Null => f.write_str("NULL"),
            SqlValue::Integer(v) => write!(f, "{v}"),
            SqlValue::Real(v) => write!(f, "{v}"),
            SqlValue::Text(v) => write!(f, "{v}"),
            SqlValue::Blob(v) => write!(f, "<{} bytes>", v.len()),
        }
    }
}

/// A column value that cannot be turned into the requested Rust type.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("cannot convert {found} to {expected}")]
pub struct ValueConversionError {
    /// Rust type that was requested
    pub expected: &'static str,
    /// SQL kind that was found
    pub found: &'static str,
}

impl ValueConversionError {
    fn new<T>(found: &SqlValue) -> Self {
        Self {
            expected: std::any::type_name::<T>(),
            found: found.kind(),
        }
    }
}

/// Conversion from a column value into a field type.
pub trait FromSqlValue: Sized {
    /// Convert `value`, consuming it
    fn from_sql_value(value: SqlValue) -> Result<Self, ValueConversionError>;
}

impl FromSqlValue for SqlValue {
    #[inline]
    fn from_sql_value(value: SqlValue) -> Result<Self, ValueConversionError> {
        Ok(value)
    }
}

impl FromSqlValue for i64 {
    fn from_sql_value(value: SqlValue) -> Result<Self, ValueConversionError> {
        match value {
            SqlValue::Integer(v) => Ok(v),
            other => Err(ValueConversionError::new::<Self>(&other)),
        }
    }
}

macro_rules! impl_narrow_integer {
    ($($t:ty),+) => {
        $(
            impl FromSqlValue for $t {
                fn from_sql_value(value: SqlValue) -> Result<Self, ValueConversionError> {
                    match value {
                        SqlValue::Integer(v) => <$t>::try_from(v)
                            .map_err(|_| ValueConversionError::new::<Self>(&SqlValue::Integer(v))),
                        other => Err(ValueConversionError::new::<Self>(&other)),
                    }
                }
            }

            impl From<$t> for SqlValue {
                #[inline]
                fn from(value: $t) -> Self {
                    SqlValue::Integer(i64::from(value))
                }
            }
        )+
    };
}

impl_narrow_integer!(i32, i16, u32, u16, u8);

impl FromSqlValue for bool {
    fn from_sql_value(value: SqlValue) -> Result<Self, ValueConversionError> {
        match value {
            SqlValue::Integer(v) => Ok(v != 0),
            other => Err(ValueConversionError::new::<Self>(&other)),
        }
    }
}

impl FromSqlValue for f64 {
    fn from_sql_value(value: SqlValue) -> Result<Self, ValueConversionError> {
        match value {
            SqlValue::Real(v) => Ok(v),
            SqlValue::Integer(v) => Ok(v as f64),
            other => Err(ValueConversionError::new::<Self>(&other)),
        }
    }
}

impl FromSqlValue for String {
    fn from_sql_value(value: SqlValue) -> Result<Self, ValueConversionError> {
        match value {
            SqlValue::Text(v) => Ok(v),
            other => Err(ValueConversionError::new::<Self>(&other)),
        }
    }
}

impl FromSqlValue for Vec<u8> {
    fn from_sql_value(value: SqlValue) -> Result<Self, ValueConversionError> {
        match value {
            SqlValue::Blob(v) => Ok(v),
            SqlValue::Text(v) => Ok(v.into_bytes()),
            other => Err(ValueConversionError::new::<Self>(&other)),
        }
    }
}

impl<T: FromSqlValue> FromSqlValue for Option<T> {
    fn from_sql_value(value: SqlValue) -> Result<Self, ValueConversionError> {
        match value {
            SqlValue::Null => Ok(None),
            other => T::from_sql_value(other).map(Some),
        }
    }
}

impl From<i64> for SqlValue {
    #[inline]
    fn from(value: i64) -> Self {
        SqlValue::Integer(value)
    }
}

impl From<bool> for SqlValue {
    #[inline]
    fn from(value: bool) -> Self {
        SqlValue::Integer(i64::from(value))
    }
}

impl From<f64> for SqlValue {
    #[inline]
    fn from(value: f64) -> Self {
        SqlValue::Real(value)
    }
}

impl From<String> for SqlValue {
    #[inline]
    fn from(value: String) -> Self {
        SqlValue::Text(value)
    }
}

impl From<&str> for SqlValue {
    #[inline]
    fn from(value: &str) -> Self {
        SqlValue::Text(value.to_string())
    }
}

impl From<Vec<u8>> for SqlValue {
    #[inline]
    fn from(value: Vec<u8>) -> Self {
        SqlValue::Blob(value)
    }
}

impl<T: Into<SqlValue>> From<Option<T>> for SqlValue {
    fn from(value: Option<T>) -> Self {
        value.map_or(SqlValue::Null, Into::into)
    }
}

/// One result row: column labels and values in select order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Row {
    columns: Vec<String>,
    values: Vec<SqlValue>,
}

impl Row {
    /// Build a row from parallel column and value lists
    pub fn new(columns: Vec<String>, values: Vec<SqlValue>) -> Self {
        debug_assert_eq!(columns.len(), values.len());
        Self { columns, values }
    }

    /// Value of `column` (ASCII case-insensitive), if the row has it
    pub fn get(&self, column: &str) -> Option<&SqlValue> {
        self.columns
            .iter()
            .position(|c| c.eq_ignore_ascii_case(column))
            .and_then(|idx| self.values.get(idx))
    }

    /// Column labels in select order
    #[inline]
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Values in select order
    #[inline]
    pub fn values(&self) -> &[SqlValue] {
        &self.values
    }

    /// Number of columns
    #[inline]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Whether the row has no columns
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}
