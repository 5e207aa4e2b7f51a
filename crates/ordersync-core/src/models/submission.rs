//! Sync request intake and validation
//!
//! Items arrive as loosely-typed JSON. Each one is validated on its own so a
//! malformed item becomes a per-item error instead of rejecting the batch.

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{LineItem, OrderStatus, OrderVersion};
use crate::error::{Error, Result};
use crate::util::{normalize_text_option, storage_precision};

/// Top-level sync request body
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct SyncRequest {
    #[serde(default)]
    pub orders: Option<Vec<Value>>,
}

impl SyncRequest {
    pub const fn new(orders: Vec<Value>) -> Self {
        Self {
            orders: Some(orders),
        }
    }

    /// Raw order items, rejecting a missing or empty `orders` array
    pub fn into_items(self) -> Result<Vec<Value>> {
        match self.orders {
            Some(orders) if !orders.is_empty() => Ok(orders),
            Some(_) => Err(Error::InvalidInput(
                "orders array must not be empty".to_string(),
            )),
            None => Err(Error::InvalidInput("orders array is required".to_string())),
        }
    }
}

/// Order as submitted by a client device
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct OrderSubmission {
    #[serde(default)]
    pub client_generated_id: String,
    #[serde(default)]
    pub client_name: String,
    #[serde(default)]
    pub client_phone: Option<String>,
    pub total: f64,
    pub delivery_date: String,
    #[serde(default)]
    pub delivery_time: Option<String>,
    pub status: OrderStatus,
    #[serde(default)]
    pub notes: Option<String>,
    pub last_modified_at: String,
    #[serde(default)]
    pub items: Vec<LineItemSubmission>,
}

/// Line item as submitted by a client device
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LineItemSubmission {
    #[serde(default)]
    pub product_name: String,
    pub quantity: u32,
    pub unit_price: f64,
    #[serde(default)]
    pub notes: Option<String>,
}

/// A submission that passed intake validation
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedSubmission {
    pub client_generated_id: String,
    pub version: OrderVersion,
}

impl ValidatedSubmission {
    /// Validate one raw item from a sync request
    pub fn from_value(raw: &Value) -> Result<Self> {
        let submission = OrderSubmission::deserialize(raw)
            .map_err(|error| Error::InvalidInput(format!("malformed order: {error}")))?;
        submission.validate()
    }
}

impl OrderSubmission {
    pub fn validate(self) -> Result<ValidatedSubmission> {
        let client_generated_id = required_text(self.client_generated_id, "client_generated_id")?;
        let client_name = required_text(self.client_name, "client_name")?;
        let total = non_negative_amount(self.total, "total")?;

        let delivery_date = NaiveDate::parse_from_str(self.delivery_date.trim(), "%Y-%m-%d")
            .map_err(|_| {
                Error::InvalidInput(format!(
                    "delivery_date must be YYYY-MM-DD, got '{}'",
                    self.delivery_date
                ))
            })?;
        let delivery_time = normalize_text_option(self.delivery_time)
            .map(|value| parse_delivery_time(&value))
            .transpose()?;
        let last_modified_at = parse_timestamp(&self.last_modified_at)?;

        if self.items.is_empty() {
            return Err(Error::InvalidInput(
                "order must contain at least one item".to_string(),
            ));
        }
        let items = self
            .items
            .into_iter()
            .enumerate()
            .map(|(index, item)| item.validate(index))
            .collect::<Result<Vec<_>>>()?;

        Ok(ValidatedSubmission {
            client_generated_id,
            version: OrderVersion {
                client_name,
                client_phone: normalize_text_option(self.client_phone),
                total,
                delivery_date,
                delivery_time,
                status: self.status,
                notes: normalize_text_option(self.notes),
                items,
                last_modified_at,
            },
        })
    }
}

impl LineItemSubmission {
    fn validate(self, index: usize) -> Result<LineItem> {
        let product_name = required_text(self.product_name, &format!("items[{index}].product_name"))?;
        if self.quantity == 0 {
            return Err(Error::InvalidInput(format!(
                "items[{index}].quantity must be positive"
            )));
        }
        let unit_price = non_negative_amount(self.unit_price, &format!("items[{index}].unit_price"))?;
        Ok(LineItem {
            product_name,
            quantity: self.quantity,
            unit_price,
            notes: normalize_text_option(self.notes),
        })
    }
}

fn required_text(value: String, field: &str) -> Result<String> {
    normalize_text_option(Some(value))
        .ok_or_else(|| Error::InvalidInput(format!("{field} is required")))
}

fn non_negative_amount(value: f64, field: &str) -> Result<f64> {
    if value.is_finite() && value >= 0.0 {
        Ok(value)
    } else {
        Err(Error::InvalidInput(format!(
            "{field} must be a non-negative number"
        )))
    }
}

fn parse_delivery_time(value: &str) -> Result<String> {
    NaiveTime::parse_from_str(value, "%H:%M")
        .or_else(|_| NaiveTime::parse_from_str(value, "%H:%M:%S"))
        .map(|time| time.format("%H:%M").to_string())
        .map_err(|_| {
            Error::InvalidInput(format!(
                "delivery_time must be HH:MM or HH:MM:SS, got '{value}'"
            ))
        })
}

fn parse_timestamp(value: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value.trim())
        .map(|instant| storage_precision(instant.with_timezone(&Utc)))
        .map_err(|_| {
            Error::InvalidInput(format!(
                "last_modified_at must be an ISO-8601 timestamp, got '{value}'"
            ))
        })
}
