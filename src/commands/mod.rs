pub mod departures;
pub mod lines;
pub mod resolver;
pub mod stops;

use anyhow::Result;
use serde::Serialize;

/// Write a value to stdout as pretty-printed JSON
pub fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
