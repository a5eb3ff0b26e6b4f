//! Scalar SQL functions registered on every connection.
//!
//! - `regexp(pattern, text)`: full-content regular-expression match; also
//!   backs the `text REGEXP pattern` operator.
//! - `json_float(value_json)`: the float coercion used by range comparisons,
//!   or NULL when the stored value is not numeric.

use std::sync::Arc;

use annograph_core::query::coerce_float;
use regex::Regex;
use rusqlite::{
  Connection, Error as SqlError,
  functions::{Context, FunctionFlags},
  types::ValueRef,
};

type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

pub fn register(conn: &Connection) -> rusqlite::Result<()> {
  let flags = FunctionFlags::SQLITE_UTF8 | FunctionFlags::SQLITE_DETERMINISTIC;
  conn.create_scalar_function("regexp", 2, flags, regexp)?;
  conn.create_scalar_function("json_float", 1, flags, json_float)?;
  Ok(())
}

fn regexp(ctx: &Context<'_>) -> rusqlite::Result<bool> {
  let re: Arc<Regex> = ctx.get_or_create_aux(0, |pattern| -> Result<_, BoxError> {
    Ok(Regex::new(&format!("^(?:{})$", pattern.as_str()?))?)
  })?;
  match ctx.get_raw(1) {
    ValueRef::Null => Ok(false),
    text => {
      let text = text.as_str().map_err(|e| SqlError::UserFunctionError(e.into()))?;
      Ok(re.is_match(text))
    }
  }
}

fn json_float(ctx: &Context<'_>) -> rusqlite::Result<Option<f64>> {
  let raw = match ctx.get_raw(0) {
    ValueRef::Text(bytes) => bytes,
    _ => return Ok(None),
  };
  let Ok(value) = serde_json::from_slice::<serde_json::Value>(raw) else {
    return Ok(None);
  };
  Ok(coerce_float(&value))
}
