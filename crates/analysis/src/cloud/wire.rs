//! JSON shapes of the Document Intelligence analyze operation, and their
//! mapping into the domain types.

use std::collections::HashMap;

use chrono::{NaiveDate, NaiveTime};
use receiptly_core::{AnalyzedReceipt, CloudField, LayoutLine, LayoutPage, LayoutResult, Money, Point, ReceiptItem};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct Operation {
    pub status: String,
    #[serde(default)]
    pub analyze_result: Option<AnalyzeResult>,
    #[serde(default)]
    pub error: Option<ErrorBody>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ErrorBody {
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

impl ErrorBody {
    pub fn describe(&self) -> String {
        match (&self.code, &self.message) {
            (Some(code), Some(message)) => format!("{code}: {message}"),
            (None, Some(message)) => message.clone(),
            (Some(code), None) => code.clone(),
            (None, None) => "unknown error".to_string(),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct AnalyzeResult {
    #[serde(default)]
    pub pages: Vec<Page>,
    #[serde(default)]
    pub documents: Vec<Document>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct Page {
    #[serde(default)]
    pub width: Option<f64>,
    #[serde(default)]
    pub height: Option<f64>,
    #[serde(default)]
    pub polygon: Option<Vec<f64>>,
    #[serde(default)]
    pub lines: Vec<Line>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct Line {
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub polygon: Vec<f64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct Document {
    #[serde(default)]
    pub doc_type: String,
    #[serde(default)]
    pub confidence: f32,
    #[serde(default)]
    pub fields: HashMap<String, Field>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct Field {
    #[serde(default)]
    pub value_string: Option<String>,
    #[serde(default)]
    pub value_phone_number: Option<String>,
    #[serde(default)]
    pub value_date: Option<String>,
    #[serde(default)]
    pub value_time: Option<String>,
    #[serde(default)]
    pub value_number: Option<f64>,
    #[serde(default)]
    pub value_currency: Option<Currency>,
    #[serde(default)]
    pub value_array: Option<Vec<Field>>,
    #[serde(default)]
    pub value_object: Option<HashMap<String, Field>>,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub confidence: Option<f32>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct Currency {
    #[serde(default)]
    pub amount: Option<f64>,
}

// ── Mapping ──────────────────────────────────────────────────────────────────

impl AnalyzeResult {
    /// The first recognised document, or `None` when the service found none.
    pub fn into_receipt(self) -> Option<AnalyzedReceipt> {
        let page_count = self.pages.len();
        let doc = self.documents.into_iter().next()?;
        let fields = &doc.fields;
        let items = fields
            .get("Items")
            .and_then(|f| f.value_array.as_ref())
            .map(|array| array.iter().filter_map(receipt_item).collect())
            .unwrap_or_default();

        Some(AnalyzedReceipt {
            doc_type: doc.doc_type.clone(),
            confidence: doc.confidence.clamp(0.0, 1.0),
            merchant_name: fields.get("MerchantName").and_then(text_field),
            merchant_address: fields.get("MerchantAddress").and_then(text_field),
            merchant_phone: fields.get("MerchantPhoneNumber").and_then(text_field),
            transaction_date: fields.get("TransactionDate").and_then(date_field),
            transaction_time: fields.get("TransactionTime").and_then(time_field),
            total: fields.get("Total").and_then(money_field),
            subtotal: fields.get("Subtotal").and_then(money_field),
            tax: fields.get("TotalTax").and_then(money_field),
            items,
            page_count,
        })
    }

    pub fn into_layout(self) -> LayoutResult {
        let pages = self
            .pages
            .into_iter()
            .map(|page| LayoutPage {
                width: page.width.unwrap_or(0.0),
                height: page.height.unwrap_or(0.0),
                polygon: page.polygon.as_deref().map(points).filter(|p| p.len() >= 3),
                lines: page
                    .lines
                    .into_iter()
                    .map(|line| LayoutLine { polygon: points(&line.polygon), content: line.content })
                    .collect(),
            })
            .collect();
        LayoutResult { pages }
    }
}

/// Flat `[x1, y1, x2, y2, ...]` coordinates to points; a trailing odd value
/// is dropped.
fn points(flat: &[f64]) -> Vec<Point> {
    flat.chunks_exact(2).map(|xy| Point::new(xy[0], xy[1])).collect()
}

fn receipt_item(field: &Field) -> Option<ReceiptItem> {
    let obj = field.value_object.as_ref()?;
    Some(ReceiptItem {
        description: obj.get("Description").and_then(text_field),
        quantity: obj.get("Quantity").and_then(|f| Some(cloud_field(f, f.value_number?))),
        price: obj.get("Price").and_then(money_field),
        total_price: obj.get("TotalPrice").and_then(money_field),
    })
}

fn cloud_field<T>(field: &Field, value: T) -> CloudField<T> {
    let cf = CloudField::new(value, field.confidence.unwrap_or(0.0));
    match &field.content {
        Some(content) => cf.with_content(content.clone()),
        None => cf,
    }
}

fn text_field(field: &Field) -> Option<CloudField<String>> {
    let value = field
        .value_string
        .clone()
        .or_else(|| field.value_phone_number.clone())
        .or_else(|| field.content.clone())?;
    Some(cloud_field(field, value))
}

fn date_field(field: &Field) -> Option<CloudField<NaiveDate>> {
    let date = NaiveDate::parse_from_str(field.value_date.as_deref()?, "%Y-%m-%d").ok()?;
    Some(cloud_field(field, date))
}

fn time_field(field: &Field) -> Option<CloudField<NaiveTime>> {
    let raw = field.value_time.as_deref()?;
    let time = NaiveTime::parse_from_str(raw, "%H:%M:%S")
        .or_else(|_| NaiveTime::parse_from_str(raw, "%H:%M"))
        .ok()?;
    Some(cloud_field(field, time))
}

fn money_field(field: &Field) -> Option<CloudField<Money>> {
    let amount = field.value_currency.as_ref().and_then(|c| c.amount).or(field.value_number)?;
    Some(cloud_field(field, Money::from_f64(amount)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;
    use std::str::FromStr;

    fn parse(json: serde_json::Value) -> AnalyzeResult {
        serde_json::from_value(json).unwrap()
    }

    #[test]
    fn maps_receipt_fields() {
        let result = parse(serde_json::json!({
            "pages": [{ "width": 1000, "height": 2000, "lines": [] }],
            "documents": [{
                "docType": "receipt.retail",
                "confidence": 0.97,
                "fields": {
                    "MerchantName": { "type": "string", "valueString": "Acme Mart", "content": "ACME MART", "confidence": 0.91 },
                    "MerchantPhoneNumber": { "type": "phoneNumber", "valuePhoneNumber": "+6561234567", "confidence": 0.8 },
                    "MerchantAddress": { "type": "address", "content": "12 Orchard Road", "confidence": 0.7 },
                    "TransactionDate": { "type": "date", "valueDate": "2024-01-15", "confidence": 0.95 },
                    "TransactionTime": { "type": "time", "valueTime": "13:59", "confidence": 0.9 },
                    "Total": { "type": "currency", "valueCurrency": { "amount": 12.5 }, "confidence": 0.98 },
                    "TotalTax": { "type": "number", "valueNumber": 0.75, "confidence": 0.6 },
                    "Items": { "type": "array", "valueArray": [
                        { "type": "object", "valueObject": {
                            "Description": { "type": "string", "valueString": "Kopi", "confidence": 0.9 },
                            "Quantity": { "type": "number", "valueNumber": 2, "confidence": 0.8 },
                            "TotalPrice": { "type": "currency", "valueCurrency": { "amount": 3.4 }, "confidence": 0.9 }
                        }}
                    ]}
                }
            }]
        }));

        let receipt = result.into_receipt().unwrap();
        assert_eq!(receipt.doc_type, "receipt.retail");
        assert_eq!(receipt.page_count, 1);
        let name = receipt.merchant_name.unwrap();
        assert_eq!(name.value, "Acme Mart");
        assert_eq!(name.content.as_deref(), Some("ACME MART"));
        assert_eq!(receipt.merchant_phone.unwrap().value, "+6561234567");
        assert_eq!(receipt.merchant_address.unwrap().value, "12 Orchard Road");
        assert_eq!(receipt.transaction_date.unwrap().value, NaiveDate::from_ymd_opt(2024, 1, 15).unwrap());
        assert_eq!(receipt.transaction_time.unwrap().value, NaiveTime::from_hms_opt(13, 59, 0).unwrap());
        assert_eq!(receipt.total.unwrap().value.amount(), Decimal::from_str("12.50").unwrap());
        assert_eq!(receipt.tax.unwrap().value.amount(), Decimal::from_str("0.75").unwrap());
        assert!(receipt.subtotal.is_none());
        assert_eq!(receipt.items.len(), 1);
        assert_eq!(receipt.items[0].quantity.as_ref().unwrap().value, 2.0);
        assert_eq!(receipt.items[0].total_price.as_ref().unwrap().value.amount(), Decimal::from_str("3.40").unwrap());
    }

    #[test]
    fn no_documents_is_none() {
        assert!(parse(serde_json::json!({ "pages": [], "documents": [] })).into_receipt().is_none());
        assert!(parse(serde_json::json!({})).into_receipt().is_none());
    }

    #[test]
    fn maps_layout_pages() {
        let layout = parse(serde_json::json!({
            "pages": [{
                "width": 800, "height": 1200,
                "lines": [{ "content": "TOTAL", "polygon": [10, 20, 110, 20, 110, 40, 10, 40] }]
            }]
        }))
        .into_layout();
        let page = &layout.pages[0];
        assert_eq!((page.width, page.height), (800.0, 1200.0));
        assert!(page.polygon.is_none());
        assert_eq!(page.lines[0].polygon.len(), 4);
        assert_eq!(page.lines[0].polygon[2], Point::new(110.0, 40.0));
    }

    #[test]
    fn odd_coordinates_are_dropped() {
        assert_eq!(points(&[1.0, 2.0, 3.0]), vec![Point::new(1.0, 2.0)]);
    }
}
