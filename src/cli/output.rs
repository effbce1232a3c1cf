use serde::Serialize;
use serde_json::{Value, json};

use crate::error::Error;

pub fn to_json<T: Serialize>(value: &T) -> anyhow::Result<Value> {
    Ok(serde_json::to_value(value)?)
}

pub fn print_json(value: &Value) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// `{"error": {"code", "message"}}`, with the engine's code when there is one.
pub fn error_body(err: &anyhow::Error) -> Value {
    let code = err.downcast_ref::<Error>().map_or("INTERNAL", Error::code);
    json!({
        "error": {
            "code": code,
            "message": err.to_string(),
        }
    })
}
