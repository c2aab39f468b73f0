//! Conversion between sqlx values and [`SqlValue`].

use sqlx::query::Query;
use sqlx::sqlite::{SqliteArguments, SqliteRow, SqliteValueRef};
use sqlx::{Row as _, Sqlite, TypeInfo as _, Value as _, ValueRef as _};

use crate::{Error, Result, SqlValue};

/// Convert a SQLite value to its storage representation.
///
/// The type name reported for a value is its storage class, so declared column
/// types do not influence the result.
pub fn to_sql_value(value: SqliteValueRef) -> Result<SqlValue> {
   if value.is_null() {
      return Ok(SqlValue::Null);
   }

   let type_info = value.type_info();
   let result = match type_info.name() {
      "INTEGER" | "NUMERIC" | "BOOLEAN" => {
         SqlValue::Integer(value.to_owned().try_decode::<i64>()?)
      }
      "REAL" => SqlValue::Real(value.to_owned().try_decode::<f64>()?),
      "TEXT" | "DATE" | "TIME" | "DATETIME" => {
         SqlValue::Text(value.to_owned().try_decode::<String>()?)
      }
      "BLOB" => SqlValue::Blob(value.to_owned().try_decode::<Vec<u8>>()?),
      "NULL" => SqlValue::Null,
      other => {
         // For unknown types, try to decode as text
         match value.to_owned().try_decode::<String>() {
            Ok(text) => SqlValue::Text(text),
            Err(_) => {
               return Err(Error::Unsupported(format!(
                  "unknown SQLite type: {other}"
               )));
            }
         }
      }
   };

   Ok(result)
}

/// Read the named column of `row`.
pub fn column(row: &SqliteRow, name: &str) -> Result<SqlValue> {
   to_sql_value(row.try_get_raw(name)?)
}

/// Read the first column of `row`.
pub fn first_column(row: &SqliteRow) -> Result<SqlValue> {
   to_sql_value(row.try_get_raw(0)?)
}

/// Bind one storage value as the next query argument.
pub fn bind_value<'a>(
   query: Query<'a, Sqlite, SqliteArguments<'a>>,
   value: SqlValue,
) -> Query<'a, Sqlite, SqliteArguments<'a>> {
   match value {
      SqlValue::Null => query.bind(None::<i64>),
      SqlValue::Integer(v) => query.bind(v),
      SqlValue::Real(v) => query.bind(v),
      SqlValue::Text(v) => query.bind(v),
      SqlValue::Blob(v) => query.bind(v),
   }
}
