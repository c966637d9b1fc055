use chrono::{NaiveDate, NaiveTime};
use serde::Serialize;

use crate::geometry::Point;
use crate::money::Money;

/// A single value read by the document service, with its confidence (0.0–1.0).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CloudField<T> {
    pub value: T,
    /// The raw text span the value was read from, when reported.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    pub confidence: f32,
}

impl<T> CloudField<T> {
    pub fn new(value: T, confidence: f32) -> Self {
        Self { value, content: None, confidence: confidence.clamp(0.0, 1.0) }
    }

    pub fn with_content(mut self, content: impl Into<String>) -> Self {
        self.content = Some(content.into());
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ReceiptItem {
    pub description: Option<CloudField<String>>,
    pub quantity: Option<CloudField<f64>>,
    pub price: Option<CloudField<Money>>,
    pub total_price: Option<CloudField<Money>>,
}

/// Structured receipt as returned by the document-structure service.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AnalyzedReceipt {
    /// Service classification, e.g. `receipt.retail`.
    pub doc_type: String,
    /// Document-level classification confidence.
    pub confidence: f32,
    pub merchant_name: Option<CloudField<String>>,
    pub merchant_address: Option<CloudField<String>>,
    pub merchant_phone: Option<CloudField<String>>,
    pub transaction_date: Option<CloudField<NaiveDate>>,
    pub transaction_time: Option<CloudField<NaiveTime>>,
    pub total: Option<CloudField<Money>>,
    pub subtotal: Option<CloudField<Money>>,
    pub tax: Option<CloudField<Money>>,
    pub items: Vec<ReceiptItem>,
    pub page_count: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LayoutLine {
    pub content: String,
    pub polygon: Vec<Point>,
}

/// Page geometry in the page's own unit (pixels for images).
#[derive(Debug, Clone, PartialEq)]
pub struct LayoutPage {
    pub width: f64,
    pub height: f64,
    pub polygon: Option<Vec<Point>>,
    pub lines: Vec<LayoutLine>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct LayoutResult {
    pub pages: Vec<LayoutPage>,
}
