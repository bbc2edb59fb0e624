//! Deterministic cache keys.
//!
//! A key is the blake3 hash of the logical slot attributes, so the same
//! {symbol, range, source, data type} request always maps to the same slot
//! across processes and backends.

/// Compute the cache key for a logical data slot.
pub fn cache_key(
    symbol: &str,
    start_date: &str,
    end_date: &str,
    data_source: &str,
    data_type: &str,
) -> String {
    let material = format!("{symbol}_{start_date}_{end_date}_{data_source}_{data_type}");
    blake3::hash(material.as_bytes()).to_hex().to_string()
}
