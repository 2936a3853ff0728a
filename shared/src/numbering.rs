//! Document numbers: `{PREFIX}-{YYYYMMDD}-{NNNN}`

use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Numbered document types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentKind {
    PartPurchase,
    PartSale,
    PartSalesOrder,
    PurchaseOrder,
    ServiceOrder,
}

impl DocumentKind {
    pub const ALL: [DocumentKind; 5] = [
        DocumentKind::PartPurchase,
        DocumentKind::PartSale,
        DocumentKind::PartSalesOrder,
        DocumentKind::PurchaseOrder,
        DocumentKind::ServiceOrder,
    ];

    pub fn prefix(&self) -> &'static str {
        match self {
            DocumentKind::PartPurchase => "PUR",
            DocumentKind::PartSale => "SAL",
            DocumentKind::PartSalesOrder => "SO",
            DocumentKind::PurchaseOrder => "PO",
            DocumentKind::ServiceOrder => "SRV",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentKind::PartPurchase => "part_purchase",
            DocumentKind::PartSale => "part_sale",
            DocumentKind::PartSalesOrder => "part_sales_order",
            DocumentKind::PurchaseOrder => "purchase_order",
            DocumentKind::ServiceOrder => "service_order",
        }
    }

    pub fn from_prefix(prefix: &str) -> Option<Self> {
        DocumentKind::ALL.into_iter().find(|k| k.prefix() == prefix)
    }
}

impl fmt::Display for DocumentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A parsed document number
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentNumber {
    pub kind: DocumentKind,
    pub date: NaiveDate,
    pub sequence: u32,
}

impl fmt::Display for DocumentNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}-{}-{:04}",
            self.kind.prefix(),
            self.date.format("%Y%m%d"),
            self.sequence
        )
    }
}

impl FromStr for DocumentNumber {
    type Err = &'static str;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.splitn(3, '-');
        let (Some(prefix), Some(date), Some(sequence)) = (parts.next(), parts.next(), parts.next())
        else {
            return Err("Document number must look like PREFIX-YYYYMMDD-NNNN");
        };

        let kind = DocumentKind::from_prefix(prefix).ok_or("Unknown document prefix")?;
        if date.len() != 8 {
            return Err("Document date must be YYYYMMDD");
        }
        let date = NaiveDate::parse_from_str(date, "%Y%m%d").map_err(|_| "Invalid document date")?;
        if sequence.len() < 4 || !sequence.chars().all(|c| c.is_ascii_digit()) {
            return Err("Document sequence must be at least 4 digits");
        }
        let sequence = sequence.parse().map_err(|_| "Document sequence out of range")?;

        Ok(DocumentNumber {
            kind,
            date,
            sequence,
        })
    }
}

pub fn format_document_number(kind: DocumentKind, date: NaiveDate, sequence: u32) -> String {
    DocumentNumber {
        kind,
        date,
        sequence,
    }
    .to_string()
}

/// Highest sequence among `numbers` for the given kind and day.
///
/// Used to seed the counter from numbers issued before it existed.
pub fn max_sequence_in<'a>(
    numbers: impl IntoIterator<Item = &'a str>,
    kind: DocumentKind,
    date: NaiveDate,
) -> u32 {
    numbers
        .into_iter()
        .filter_map(|n| n.parse::<DocumentNumber>().ok())
        .filter(|n| n.kind == kind && n.date == date)
        .map(|n| n.sequence)
        .max()
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, 7).unwrap()
    }

    #[test]
    fn test_format() {
        assert_eq!(
            format_document_number(DocumentKind::PartSale, day(), 1),
            "SAL-20240307-0001"
        );
        assert_eq!(
            format_document_number(DocumentKind::PurchaseOrder, day(), 12345),
            "PO-20240307-12345"
        );
    }

    #[test]
    fn test_parse() {
        let parsed: DocumentNumber = "SO-20240307-0042".parse().unwrap();
        assert_eq!(parsed.kind, DocumentKind::PartSalesOrder);
        assert_eq!(parsed.date, day());
        assert_eq!(parsed.sequence, 42);

        assert!("XX-20240307-0001".parse::<DocumentNumber>().is_err());
        assert!("SO-2024037-0001".parse::<DocumentNumber>().is_err());
        assert!("SO-20240307-01".parse::<DocumentNumber>().is_err());
        assert!("SO-20240307".parse::<DocumentNumber>().is_err());
    }

    #[test]
    fn test_max_sequence_in() {
        let existing = [
            "SAL-20240307-0003",
            "SAL-20240307-0011",
            "SAL-20240306-0099",
            "SO-20240307-0500",
            "garbage",
        ];
        assert_eq!(max_sequence_in(existing, DocumentKind::PartSale, day()), 11);
        assert_eq!(max_sequence_in(existing, DocumentKind::ServiceOrder, day()), 0);
    }
}
