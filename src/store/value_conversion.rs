//! Conversion of SeaQuery values into `may_postgres` parameters.
//!
//! Two passes: first every value is moved into a typed vector, then a
//! parameter slice of references into those vectors is assembled. The
//! references stay valid for the duration of the closure.

use crate::error::StoreError;
use may_postgres::types::ToSql;
use sea_query::Value;

/// Convert `values` to `ToSql` parameters and run `f` with them.
///
/// # Errors
///
/// Returns `StoreError::Query` for value kinds the attribute queries never
/// bind, or whatever `f` returns.
pub(crate) fn with_converted_params<F, R>(values: &sea_query::Values, f: F) -> Result<R, StoreError>
where
    F: FnOnce(&[&dyn ToSql]) -> Result<R, StoreError>,
{
    let mut bools: Vec<bool> = Vec::new();
    let mut ints: Vec<i32> = Vec::new();
    let mut big_ints: Vec<i64> = Vec::new();
    let mut strings: Vec<String> = Vec::new();
    let mut uuids: Vec<uuid::Uuid> = Vec::new();
    let mut jsons: Vec<serde_json::Value> = Vec::new();
    let mut nulls: Vec<Option<i32>> = Vec::new();

    for value in values.iter() {
        match value {
            Value::Bool(Some(b)) => bools.push(*b),
            Value::Int(Some(i)) => ints.push(*i),
            Value::BigInt(Some(i)) => big_ints.push(*i),
            Value::String(Some(s)) => strings.push(s.to_string()),
            Value::Uuid(Some(u)) => uuids.push(uuid::Uuid::from_bytes(*u.as_bytes())),
            Value::Json(Some(j)) => jsons.push(serde_json::Value::clone(j)),
            Value::Bool(None)
            | Value::Int(None)
            | Value::BigInt(None)
            | Value::String(None)
            | Value::Uuid(None)
            | Value::Json(None) => nulls.push(None),
            _ => {
                return Err(StoreError::Query(format!(
                    "Unsupported value type in query: {value:?}"
                )));
            }
        }
    }

    let mut bool_idx = 0;
    let mut int_idx = 0;
    let mut big_int_idx = 0;
    let mut string_idx = 0;
    let mut uuid_idx = 0;
    let mut json_idx = 0;
    let mut null_idx = 0;

    let mut params: Vec<&dyn ToSql> = Vec::new();

    for value in values.iter() {
        match value {
            Value::Bool(Some(_)) => {
                params.push(&bools[bool_idx] as &dyn ToSql);
                bool_idx += 1;
            }
            Value::Int(Some(_)) => {
                params.push(&ints[int_idx] as &dyn ToSql);
                int_idx += 1;
            }
            Value::BigInt(Some(_)) => {
                params.push(&big_ints[big_int_idx] as &dyn ToSql);
                big_int_idx += 1;
            }
            Value::String(Some(_)) => {
                params.push(&strings[string_idx] as &dyn ToSql);
                string_idx += 1;
            }
            Value::Uuid(Some(_)) => {
                params.push(&uuids[uuid_idx] as &dyn ToSql);
                uuid_idx += 1;
            }
            Value::Json(Some(_)) => {
                params.push(&jsons[json_idx] as &dyn ToSql);
                json_idx += 1;
            }
            _ => {
                params.push(&nulls[null_idx] as &dyn ToSql);
                null_idx += 1;
            }
        }
    }

    f(&params)
}
