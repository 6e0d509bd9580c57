// src/documents/invoice.rs
use serde::{Deserialize, Serialize};

use crate::documents::{hex_bytes, validate_amount, validate_currency};
use crate::error::{DocumentError, Result};
use crate::proofs::{Field, FieldValue};

pub const INVOICE_DATA_TYPE_URL: &str = "documents/invoice.InvoiceData";
pub const INVOICE_SALTS_TYPE_URL: &str = "documents/invoice.InvoiceSalts";

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct InvoiceData {
    pub invoice_number: String,
    pub invoice_status: String,
    pub sender_name: String,
    pub sender_country: String,
    pub recipient_name: String,
    pub recipient_country: String,
    pub payee_name: String,
    pub currency: String,
    pub gross_amount: i64,
    pub net_amount: i64,
    pub tax_amount: i64,
    /// Basis points.
    pub tax_rate: i64,
    pub due_date: i64,
    pub date_created: i64,
    pub comment: String,
    #[serde(with = "hex_bytes")]
    pub extra_data: Vec<u8>,
}

impl InvoiceData {
    pub const FIELD_NAMES: [&'static str; 16] = [
        "invoice_number",
        "invoice_status",
        "sender_name",
        "sender_country",
        "recipient_name",
        "recipient_country",
        "payee_name",
        "currency",
        "gross_amount",
        "net_amount",
        "tax_amount",
        "tax_rate",
        "due_date",
        "date_created",
        "comment",
        "extra_data",
    ];

    pub fn fields(&self) -> Vec<Field> {
        vec![
            ("invoice_number", FieldValue::from(self.invoice_number.clone())),
            ("invoice_status", FieldValue::from(self.invoice_status.clone())),
            ("sender_name", FieldValue::from(self.sender_name.clone())),
            ("sender_country", FieldValue::from(self.sender_country.clone())),
            ("recipient_name", FieldValue::from(self.recipient_name.clone())),
            ("recipient_country", FieldValue::from(self.recipient_country.clone())),
            ("payee_name", FieldValue::from(self.payee_name.clone())),
            ("currency", FieldValue::from(self.currency.clone())),
            ("gross_amount", FieldValue::from(self.gross_amount)),
            ("net_amount", FieldValue::from(self.net_amount)),
            ("tax_amount", FieldValue::from(self.tax_amount)),
            ("tax_rate", FieldValue::from(self.tax_rate)),
            ("due_date", FieldValue::from(self.due_date)),
            ("date_created", FieldValue::from(self.date_created)),
            ("comment", FieldValue::from(self.comment.clone())),
            ("extra_data", FieldValue::from(self.extra_data.clone())),
        ]
    }

    pub fn validate(&self) -> Result<()> {
        if self.invoice_number.trim().is_empty() {
            return Err(DocumentError::InvalidPayload(
                "invoice init failed: invoice_number is required".into(),
            ));
        }
        validate_currency(&self.currency)?;
        validate_amount("gross_amount", self.gross_amount)?;
        validate_amount("net_amount", self.net_amount)?;
        validate_amount("tax_amount", self.tax_amount)?;
        validate_amount("tax_rate", self.tax_rate)?;
        Ok(())
    }
}
