use thiserror::Error;

use crate::surface::ElementId;

/// Failures on the submission path. Everything except `Initialization` is
/// recovered inside `submit` and shown to the user as a bot message.
#[derive(Debug, Error)]
pub enum ExchangeError {
    #[error("Required UI elements are missing: {}", format_missing(.missing))]
    Initialization {
        missing: Vec<ElementId>,
    },

    #[error("{0}")]
    Transport(String),

    #[error("API error: {status} {reason}")]
    HttpStatus {
        status: u16,
        reason: String,
    },

    #[error("Malformed JSON in API response: {0}")]
    MalformedJson(String),

    #[error("Invalid API response format")]
    InvalidResponseFormat,
}

impl From<reqwest::Error> for ExchangeError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            ExchangeError::MalformedJson(err.to_string())
        } else {
            ExchangeError::Transport(err.to_string())
        }
    }
}

/// Chart problems. Neither variant fails a submission; both degrade the reply
/// to text with an appended note.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ImageError {
    #[error("chart payload is not base64 PNG data")]
    Validation,

    #[error("chart image could not be displayed: {0}")]
    Render(String),
}

fn format_missing(missing: &[ElementId]) -> String {
    missing
        .iter()
        .map(ElementId::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}
