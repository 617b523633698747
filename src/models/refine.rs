use log::warn;
use serde::Serialize;
use serde_json::{ Map, Value as JsonValue };

use crate::errors::{ ExchangeError, ImageError };

pub const FALLBACK_MESSAGE: &str = "No response received";
pub const INVALID_IMAGE_NOTE: &str = "\nChart: Invalid image data";

/// Base64 encoding of the first bytes of the PNG file signature.
pub const PNG_BASE64_PREFIX: &str = "iVBORw0KGgo";

#[derive(Serialize, Debug)]
pub struct RefineRequest<'a> {
    pub prompt: &'a str,
}

/// What a stock entry carried under `chart_image_base64`.
#[derive(Debug, Clone, PartialEq)]
pub enum ChartPayload {
    Text(String),
    /// Present and truthy, but not a string.
    Other(JsonValue),
}

#[derive(Debug, Clone, PartialEq)]
pub struct StockEntry {
    pub symbol: Option<String>,
    pub chart: Option<ChartPayload>,
}

/// Validated view of the refine endpoint's body.
#[derive(Debug, Clone, PartialEq)]
pub struct RefineResponse {
    pub refined_message: Option<String>,
    pub message: Option<String>,
    pub stocks: Vec<StockEntry>,
    pub raw_output: Option<JsonValue>,
}

/// A chart that passed the prefix check but has not been decoded yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingChart {
    pub label: Option<String>,
    pub base64: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BotReply {
    pub text: String,
    pub chart: Option<PendingChart>,
}

impl RefineResponse {
    pub fn parse(raw: &JsonValue) -> Result<Self, ExchangeError> {
        let obj = raw.as_object().ok_or(ExchangeError::InvalidResponseFormat)?;

        let stocks = match obj.get("stocks") {
            Some(JsonValue::Array(items)) => items.iter().map(parse_stock).collect(),
            _ => Vec::new(),
        };

        Ok(Self {
            refined_message: display_value(obj, "refined_message"),
            message: display_value(obj, "message"),
            stocks,
            raw_output: obj.get("raw_output").filter(|v| !v.is_null()).cloned(),
        })
    }

    pub fn display_text(&self) -> &str {
        self.refined_message
            .as_deref()
            .or(self.message.as_deref())
            .unwrap_or(FALLBACK_MESSAGE)
    }

    /// Only the first stock entry is considered for a chart.
    pub fn chart(&self) -> Option<Result<PendingChart, ImageError>> {
        let first = self.stocks.first()?;
        let payload = first.chart.as_ref()?;
        Some(validate_chart(payload, first.symbol.clone()))
    }

    pub fn into_reply(self) -> BotReply {
        let mut text = self.display_text().to_string();
        let chart = match self.chart() {
            Some(Ok(chart)) => Some(chart),
            Some(Err(e)) => {
                warn!("Dropping chart from reply: {}", e);
                text.push_str(INVALID_IMAGE_NOTE);
                None
            }
            None => None,
        };
        BotReply { text, chart }
    }
}

fn validate_chart(
    payload: &ChartPayload,
    label: Option<String>
) -> Result<PendingChart, ImageError> {
    match payload {
        ChartPayload::Text(b64) if b64.starts_with(PNG_BASE64_PREFIX) => {
            Ok(PendingChart { label, base64: b64.clone() })
        }
        _ => Err(ImageError::Validation),
    }
}

fn parse_stock(item: &JsonValue) -> StockEntry {
    let Some(obj) = item.as_object() else {
        return StockEntry { symbol: None, chart: None };
    };
    let chart = match obj.get("chart_image_base64") {
        None | Some(JsonValue::Null) | Some(JsonValue::Bool(false)) => None,
        Some(JsonValue::String(s)) if s.is_empty() => None,
        Some(JsonValue::String(s)) => Some(ChartPayload::Text(s.clone())),
        Some(other) => Some(ChartPayload::Other(other.clone())),
    };
    StockEntry {
        symbol: non_empty_str(obj, "symbol"),
        chart,
    }
}

/// Text for a display field. Truthy scalars are shown as written; empty
/// strings, zero, `false`, `null` and containers fall through.
fn display_value(obj: &Map<String, JsonValue>, key: &str) -> Option<String> {
    match obj.get(key)? {
        JsonValue::String(s) if !s.is_empty() => Some(s.clone()),
        JsonValue::Number(n) if n.as_f64() != Some(0.0) => Some(n.to_string()),
        JsonValue::Bool(true) => Some("true".to_string()),
        _ => None,
    }
}

fn non_empty_str(obj: &Map<String, JsonValue>, key: &str) -> Option<String> {
    obj.get(key)
        .and_then(JsonValue::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}
