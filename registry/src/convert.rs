use std::path::PathBuf;
use std::time::Duration;

use utils::error::Result;

/// Reversible string codec for a property type. `decode` must reject rather
/// than guess; whatever it accepts must re-encode to the same string, modulo
/// the normalization documented on each codec.
pub trait Codec<T>: Send + Sync {
    fn decode(&self, raw: &str) -> Result<T>;
    fn encode(&self, value: &T) -> Option<String>;
}

pub struct StringCodec;

impl Codec<String> for StringCodec {
    fn decode(&self, raw: &str) -> Result<String> {
        Ok(raw.to_string())
    }

    fn encode(&self, value: &String) -> Option<String> {
        Some(value.clone())
    }
}

/// `true`/`false`, `yes`/`no`, `1`/`0`, case-insensitive. Encodes as
/// `true`/`false`.
pub struct BoolCodec;

impl Codec<bool> for BoolCodec {
    fn decode(&self, raw: &str) -> Result<bool> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "true" | "yes" | "1" => Ok(true),
            "false" | "no" | "0" => Ok(false),
            _ => Err(format!("not a boolean: '{}'", raw).into()),
        }
    }

    fn encode(&self, value: &bool) -> Option<String> {
        Some(value.to_string())
    }
}

pub struct IntCodec;

impl Codec<i32> for IntCodec {
    fn decode(&self, raw: &str) -> Result<i32> {
        raw.trim()
            .parse()
            .map_err(|e| format!("not an i32: {}", e).into())
    }

    fn encode(&self, value: &i32) -> Option<String> {
        Some(value.to_string())
    }
}

pub struct LongCodec;

impl Codec<i64> for LongCodec {
    fn decode(&self, raw: &str) -> Result<i64> {
        parse_long(raw.trim())
    }

    fn encode(&self, value: &i64) -> Option<String> {
        Some(value.to_string())
    }
}

pub struct FloatCodec;

impl Codec<f64> for FloatCodec {
    fn decode(&self, raw: &str) -> Result<f64> {
        raw.trim()
            .parse()
            .map_err(|e| format!("not an f64: {}", e).into())
    }

    fn encode(&self, value: &f64) -> Option<String> {
        Some(value.to_string())
    }
}

/// Plain integers are milliseconds; `ms`, `s`, `m` and `h` suffixes are
/// accepted. Normalizes to milliseconds on encode.
pub struct DurationCodec;

impl Codec<Duration> for DurationCodec {
    fn decode(&self, raw: &str) -> Result<Duration> {
        let s = raw.trim();
        let (digits, multiplier) = if let Some(rest) = s.strip_suffix("ms") {
            (rest, 1u64)
        } else if let Some(rest) = s.strip_suffix('s') {
            (rest, 1_000)
        } else if let Some(rest) = s.strip_suffix('m') {
            (rest, 60_000)
        } else if let Some(rest) = s.strip_suffix('h') {
            (rest, 3_600_000)
        } else {
            (s, 1)
        };
        let n: u64 = digits
            .trim()
            .parse()
            .map_err(|e| format!("not a duration: {}", e))?;
        Ok(Duration::from_millis(n * multiplier))
    }

    fn encode(&self, value: &Duration) -> Option<String> {
        Some(value.as_millis().to_string())
    }
}

pub struct PathCodec;

impl Codec<PathBuf> for PathCodec {
    fn decode(&self, raw: &str) -> Result<PathBuf> {
        Ok(PathBuf::from(raw))
    }

    fn encode(&self, value: &PathBuf) -> Option<String> {
        Some(value.to_string_lossy().to_string())
    }
}

/// Comma-separated strings; entries are trimmed and empty entries dropped.
/// Encodes as `a,b,c`.
pub struct StringListCodec;

impl Codec<Vec<String>> for StringListCodec {
    fn decode(&self, raw: &str) -> Result<Vec<String>> {
        Ok(raw
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect())
    }

    fn encode(&self, value: &Vec<String>) -> Option<String> {
        Some(value.join(","))
    }
}

/// Comma-separated longs; entries are trimmed and may carry a `L`/`l`
/// suffix, so `" 1L, 2L ,3L "` decodes to `[1, 2, 3]`. Encodes without the
/// suffix.
pub struct LongListCodec;

impl Codec<Vec<i64>> for LongListCodec {
    fn decode(&self, raw: &str) -> Result<Vec<i64>> {
        raw.split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(parse_long)
            .collect()
    }

    fn encode(&self, value: &Vec<i64>) -> Option<String> {
        Some(
            value
                .iter()
                .map(|n| n.to_string())
                .collect::<Vec<_>>()
                .join(","),
        )
    }
}

fn parse_long(s: &str) -> Result<i64> {
    let digits = s
        .strip_suffix('L')
        .or_else(|| s.strip_suffix('l'))
        .unwrap_or(s);
    digits
        .parse()
        .map_err(|e| format!("not an i64: {}", e).into())
}
