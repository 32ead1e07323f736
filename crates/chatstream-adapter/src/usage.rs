use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// Token usage as reported by one model call, before coalescing.
///
/// Counters are read leniently: a missing, negative, non-numeric or
/// malformed value becomes `0`, and oversized numbers saturate.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
pub struct RawUsage {
    #[serde(default, deserialize_with = "lenient_count")]
    pub input_tokens: Option<u64>,
    #[serde(default, deserialize_with = "lenient_count")]
    pub output_tokens: Option<u64>,
    #[serde(default, deserialize_with = "lenient_object")]
    pub input_token_details: Option<RawTokenDetails>,
}

/// Cache breakdown of the input tokens.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
pub struct RawTokenDetails {
    #[serde(default, deserialize_with = "lenient_count")]
    pub cache_read: Option<u64>,
    #[serde(default, deserialize_with = "lenient_count")]
    pub cache_creation: Option<u64>,
}

fn lenient_count<'de, D>(deserializer: D) -> Result<Option<u64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.map(|value| token_count(&value)))
}

fn token_count(value: &Value) -> u64 {
    let Value::Number(number) = value else {
        return 0;
    };
    if let Some(count) = number.as_u64() {
        return count;
    }
    match number.as_f64() {
        // `as` saturates at u64::MAX.
        Some(count) if count.is_finite() && count > 0.0 => count as u64,
        _ => 0,
    }
}

/// Deserializes `T` when the value has its shape, otherwise yields `None`.
pub(crate) fn lenient_object<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.and_then(|value| serde_json::from_value(value).ok()))
}

/// Non-negative token counters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Usage {
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub cached_read_tokens: u64,
    pub cached_write_tokens: u64,
}

impl Usage {
    pub fn new(
        input_tokens: u64,
        output_tokens: u64,
        cached_read_tokens: u64,
        cached_write_tokens: u64,
    ) -> Self {
        Self {
            input_tokens,
            output_tokens,
            cached_read_tokens,
            cached_write_tokens,
        }
    }

    /// Adds `other` into `self`, saturating instead of wrapping.
    pub fn accumulate(&mut self, other: &Usage) {
        self.input_tokens = self.input_tokens.saturating_add(other.input_tokens);
        self.output_tokens = self.output_tokens.saturating_add(other.output_tokens);
        self.cached_read_tokens = self
            .cached_read_tokens
            .saturating_add(other.cached_read_tokens);
        self.cached_write_tokens = self
            .cached_write_tokens
            .saturating_add(other.cached_write_tokens);
    }
}

impl From<&RawUsage> for Usage {
    fn from(raw: &RawUsage) -> Self {
        let details = raw.input_token_details.as_ref();
        Usage {
            input_tokens: raw.input_tokens.unwrap_or(0),
            output_tokens: raw.output_tokens.unwrap_or(0),
            cached_read_tokens: details.and_then(|d| d.cache_read).unwrap_or(0),
            cached_write_tokens: details.and_then(|d| d.cache_creation).unwrap_or(0),
        }
    }
}

/// Running totals across every model call of one turn.
#[derive(Clone, Debug, Default)]
pub struct UsageAggregator {
    totals: Usage,
    calls: u32,
}

impl UsageAggregator {
    /// Folds one model call's usage into the totals and returns the per-call
    /// value that was added.
    pub fn record(&mut self, raw: Option<&RawUsage>) -> Usage {
        let usage = raw.map(Usage::from).unwrap_or_default();
        self.totals.accumulate(&usage);
        self.calls = self.calls.saturating_add(1);
        usage
    }

    pub fn totals(&self) -> Usage {
        self.totals
    }

    /// Number of model calls recorded so far.
    pub fn calls(&self) -> u32 {
        self.calls
    }
}
