//! Submitted label data and its validation.

use serde::Deserialize;

use crate::errors::{Error, Result};

/// Substituted for optional fields left blank.
pub const NOT_AVAILABLE: &str = "N/A";

/// Label data as submitted by the form or a JSON client.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LabelRequest {
    pub sender_name: Option<String>,
    pub sender_address: Option<String>,
    pub receiver_name: Option<String>,
    pub receiver_address: Option<String>,
}

/// Label data that passed validation. Every field is present.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedLabel {
    pub sender_name: String,
    pub sender_address: String,
    pub receiver_name: String,
    pub receiver_address: String,
}

fn required(value: Option<String>, label: &str) -> Result<String> {
    match value {
        Some(value) if !value.trim().is_empty() => Ok(value),
        _ => Err(Error::Validation {
            message: format!("{label} is required"),
        }),
    }
}

fn optional(value: Option<String>) -> String {
    value
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| NOT_AVAILABLE.to_string())
}

impl LabelRequest {
    /// Check required fields and fill in the optional ones.
    ///
    /// Accepted values are kept verbatim, without trimming or length limits.
    pub fn validate(self) -> Result<ValidatedLabel> {
        Ok(ValidatedLabel {
            sender_name: required(self.sender_name, "Sender name")?,
            sender_address: optional(self.sender_address),
            receiver_name: required(self.receiver_name, "Receiver name")?,
            receiver_address: optional(self.receiver_address),
        })
    }
}
