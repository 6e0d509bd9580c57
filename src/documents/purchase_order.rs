// src/documents/purchase_order.rs
use serde::{Deserialize, Serialize};

use crate::documents::{hex_bytes, validate_amount, validate_currency};
use crate::error::{DocumentError, Result};
use crate::proofs::{Field, FieldValue};

pub const PURCHASE_ORDER_DATA_TYPE_URL: &str = "documents/purchase_order.PurchaseOrderData";
pub const PURCHASE_ORDER_SALTS_TYPE_URL: &str = "documents/purchase_order.PurchaseOrderSalts";

/// Purchase order payload. Every field is committed, including empty ones.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PurchaseOrderData {
    pub po_status: String,
    pub po_number: String,
    pub order_name: String,
    pub order_street: String,
    pub order_city: String,
    pub order_zipcode: String,
    pub order_country: String,
    pub recipient_name: String,
    pub recipient_street: String,
    pub recipient_city: String,
    pub recipient_zipcode: String,
    pub recipient_country: String,
    pub currency: String,
    pub order_amount: i64,
    pub net_amount: i64,
    pub tax_amount: i64,
    pub delivery_date: i64,
    pub comment: String,
    #[serde(with = "hex_bytes")]
    pub extra_data: Vec<u8>,
}

impl PurchaseOrderData {
    pub const FIELD_NAMES: [&'static str; 19] = [
        "po_status",
        "po_number",
        "order_name",
        "order_street",
        "order_city",
        "order_zipcode",
        "order_country",
        "recipient_name",
        "recipient_street",
        "recipient_city",
        "recipient_zipcode",
        "recipient_country",
        "currency",
        "order_amount",
        "net_amount",
        "tax_amount",
        "delivery_date",
        "comment",
        "extra_data",
    ];

    pub fn fields(&self) -> Vec<Field> {
        vec![
            ("po_status", FieldValue::from(self.po_status.clone())),
            ("po_number", FieldValue::from(self.po_number.clone())),
            ("order_name", FieldValue::from(self.order_name.clone())),
            ("order_street", FieldValue::from(self.order_street.clone())),
            ("order_city", FieldValue::from(self.order_city.clone())),
            ("order_zipcode", FieldValue::from(self.order_zipcode.clone())),
            ("order_country", FieldValue::from(self.order_country.clone())),
            ("recipient_name", FieldValue::from(self.recipient_name.clone())),
            ("recipient_street", FieldValue::from(self.recipient_street.clone())),
            ("recipient_city", FieldValue::from(self.recipient_city.clone())),
            ("recipient_zipcode", FieldValue::from(self.recipient_zipcode.clone())),
            ("recipient_country", FieldValue::from(self.recipient_country.clone())),
            ("currency", FieldValue::from(self.currency.clone())),
            ("order_amount", FieldValue::from(self.order_amount)),
            ("net_amount", FieldValue::from(self.net_amount)),
            ("tax_amount", FieldValue::from(self.tax_amount)),
            ("delivery_date", FieldValue::from(self.delivery_date)),
            ("comment", FieldValue::from(self.comment.clone())),
            ("extra_data", FieldValue::from(self.extra_data.clone())),
        ]
    }

    pub fn validate(&self) -> Result<()> {
        if self.po_number.trim().is_empty() {
            return Err(DocumentError::InvalidPayload(
                "purchase order init failed: po_number is required".into(),
            ));
        }
        validate_currency(&self.currency)?;
        validate_amount("order_amount", self.order_amount)?;
        validate_amount("net_amount", self.net_amount)?;
        validate_amount("tax_amount", self.tax_amount)?;
        Ok(())
    }
}
