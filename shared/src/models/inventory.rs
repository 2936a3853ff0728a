//! Parts, stock movements and low-stock alerts

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A stocked part
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Part {
    pub id: Uuid,
    pub sku: String,
    pub name: String,
    /// Authoritative on-hand quantity
    pub stock: i64,
    /// Reorder threshold; 0 disables low-stock alerts
    pub minimal_stock: i64,
    /// Reference purchase price (minor units), not a transactional cost
    pub buy_price: i64,
    /// Reference selling price (minor units)
    pub sell_price: i64,
    /// Bumped on every stock write
    pub version: i64,
    pub deleted_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Part {
    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }

    /// Stock at or below a positive threshold
    pub fn is_low_stock(&self) -> bool {
        self.minimal_stock > 0 && self.stock <= self.minimal_stock
    }
}

/// Input for registering a part with the engine
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewPart {
    pub sku: String,
    pub name: String,
    pub minimal_stock: i64,
    pub buy_price: i64,
    pub sell_price: i64,
}

/// Stock movement types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MovementType {
    PurchaseReceived,
    Sale,
    AdjustmentIn,
    AdjustmentOut,
    PurchaseReversal,
    SaleReversal,
    AdjustmentInReversal,
    AdjustmentOutReversal,
}

/// Direction a movement moves stock
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MovementDirection {
    In,
    Out,
}

impl MovementType {
    pub const ALL: [MovementType; 8] = [
        MovementType::PurchaseReceived,
        MovementType::Sale,
        MovementType::AdjustmentIn,
        MovementType::AdjustmentOut,
        MovementType::PurchaseReversal,
        MovementType::SaleReversal,
        MovementType::AdjustmentInReversal,
        MovementType::AdjustmentOutReversal,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            MovementType::PurchaseReceived => "purchase_received",
            MovementType::Sale => "sale",
            MovementType::AdjustmentIn => "adjustment_in",
            MovementType::AdjustmentOut => "adjustment_out",
            MovementType::PurchaseReversal => "purchase_reversal",
            MovementType::SaleReversal => "sale_reversal",
            MovementType::AdjustmentInReversal => "adjustment_in_reversal",
            MovementType::AdjustmentOutReversal => "adjustment_out_reversal",
        }
    }

    pub fn direction(&self) -> MovementDirection {
        match self {
            MovementType::PurchaseReceived
            | MovementType::AdjustmentIn
            | MovementType::SaleReversal
            | MovementType::AdjustmentOutReversal => MovementDirection::In,
            MovementType::Sale
            | MovementType::AdjustmentOut
            | MovementType::PurchaseReversal
            | MovementType::AdjustmentInReversal => MovementDirection::Out,
        }
    }

    pub fn is_reversal(&self) -> bool {
        matches!(
            self,
            MovementType::PurchaseReversal
                | MovementType::SaleReversal
                | MovementType::AdjustmentInReversal
                | MovementType::AdjustmentOutReversal
        )
    }

    /// The compensating type for this movement, `None` for reversals
    pub fn reversal(&self) -> Option<MovementType> {
        match self {
            MovementType::PurchaseReceived => Some(MovementType::PurchaseReversal),
            MovementType::Sale => Some(MovementType::SaleReversal),
            MovementType::AdjustmentIn => Some(MovementType::AdjustmentInReversal),
            MovementType::AdjustmentOut => Some(MovementType::AdjustmentOutReversal),
            _ => None,
        }
    }

    /// Signed effect of `quantity` units of this type on stock
    pub fn signed(&self, quantity: i64) -> i64 {
        match self.direction() {
            MovementDirection::In => quantity,
            MovementDirection::Out => -quantity,
        }
    }
}

impl fmt::Display for MovementType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MovementType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        MovementType::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| format!("unknown movement type '{}'", s))
    }
}

/// Kinds of documents a movement can point at
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReferenceKind {
    PurchaseReceipt,
    SaleDocument,
    SalesOrder,
    PurchaseOrder,
    ManualAdjustment,
}

impl ReferenceKind {
    pub const ALL: [ReferenceKind; 5] = [
        ReferenceKind::PurchaseReceipt,
        ReferenceKind::SaleDocument,
        ReferenceKind::SalesOrder,
        ReferenceKind::PurchaseOrder,
        ReferenceKind::ManualAdjustment,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ReferenceKind::PurchaseReceipt => "purchase_receipt",
            ReferenceKind::SaleDocument => "sale_document",
            ReferenceKind::SalesOrder => "sales_order",
            ReferenceKind::PurchaseOrder => "purchase_order",
            ReferenceKind::ManualAdjustment => "manual_adjustment",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            ReferenceKind::PurchaseReceipt => "Purchase receipt",
            ReferenceKind::SaleDocument => "Sale",
            ReferenceKind::SalesOrder => "Sales order",
            ReferenceKind::PurchaseOrder => "Purchase order",
            ReferenceKind::ManualAdjustment => "Manual adjustment",
        }
    }
}

impl FromStr for ReferenceKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ReferenceKind::ALL
            .into_iter()
            .find(|k| k.as_str() == s)
            .ok_or_else(|| format!("unknown reference kind '{}'", s))
    }
}

/// The document a movement originates from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum MovementReference {
    PurchaseReceipt(Uuid),
    SaleDocument(Uuid),
    SalesOrder(Uuid),
    PurchaseOrder(Uuid),
    ManualAdjustment(Uuid),
    /// Orphaned or detached
    #[default]
    None,
}

impl MovementReference {
    pub fn new(kind: ReferenceKind, id: Uuid) -> Self {
        match kind {
            ReferenceKind::PurchaseReceipt => MovementReference::PurchaseReceipt(id),
            ReferenceKind::SaleDocument => MovementReference::SaleDocument(id),
            ReferenceKind::SalesOrder => MovementReference::SalesOrder(id),
            ReferenceKind::PurchaseOrder => MovementReference::PurchaseOrder(id),
            ReferenceKind::ManualAdjustment => MovementReference::ManualAdjustment(id),
        }
    }

    /// Rebuild from the persisted `(reference_type, reference_id)` column pair
    pub fn from_columns(kind: Option<&str>, id: Option<Uuid>) -> Self {
        match (kind.and_then(|k| k.parse::<ReferenceKind>().ok()), id) {
            (Some(kind), Some(id)) => MovementReference::new(kind, id),
            _ => MovementReference::None,
        }
    }

    pub fn kind(&self) -> Option<ReferenceKind> {
        match self {
            MovementReference::PurchaseReceipt(_) => Some(ReferenceKind::PurchaseReceipt),
            MovementReference::SaleDocument(_) => Some(ReferenceKind::SaleDocument),
            MovementReference::SalesOrder(_) => Some(ReferenceKind::SalesOrder),
            MovementReference::PurchaseOrder(_) => Some(ReferenceKind::PurchaseOrder),
            MovementReference::ManualAdjustment(_) => Some(ReferenceKind::ManualAdjustment),
            MovementReference::None => None,
        }
    }

    pub fn id(&self) -> Option<Uuid> {
        match self {
            MovementReference::PurchaseReceipt(id)
            | MovementReference::SaleDocument(id)
            | MovementReference::SalesOrder(id)
            | MovementReference::PurchaseOrder(id)
            | MovementReference::ManualAdjustment(id) => Some(*id),
            MovementReference::None => None,
        }
    }

    pub fn is_none(&self) -> bool {
        matches!(self, MovementReference::None)
    }

    /// `reference_type` column value
    pub fn type_column(&self) -> Option<&'static str> {
        self.kind().map(|k| k.as_str())
    }
}

/// Ledger entry. Append-only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockMovement {
    pub id: Uuid,
    /// Global write order; breaks ties between equal `created_at`
    pub sequence: i64,
    pub part_id: Uuid,
    pub movement_type: MovementType,
    /// Always positive; the sign comes from `movement_type`
    pub quantity: i64,
    pub before_stock: i64,
    pub after_stock: i64,
    pub reference: MovementReference,
    /// Human-readable document number, e.g. `SAL-20240101-0001`
    pub reference_number: Option<String>,
    pub batch_id: Option<Uuid>,
    pub reverses_movement_id: Option<Uuid>,
    pub supplier_id: Option<Uuid>,
    pub notes: Option<String>,
    pub created_by: Uuid,
    pub created_at: DateTime<Utc>,
    /// Reference held before an administrative orphan detach
    pub detached_reference: Option<MovementReference>,
}

impl StockMovement {
    pub fn signed_quantity(&self) -> i64 {
        self.movement_type.signed(self.quantity)
    }

    /// Label a report can show without looking the document up
    pub fn reference_label(&self) -> String {
        match (self.reference.kind(), &self.reference_number) {
            (Some(kind), Some(number)) => format!("{} {}", kind.label(), number),
            (Some(kind), None) => kind.label().to_string(),
            (None, _) => "Unlinked".to_string(),
        }
    }
}

/// Low-stock alert; derived from the part, never authoritative
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LowStockAlert {
    pub id: Uuid,
    pub part_id: Uuid,
    pub current_stock: i64,
    pub minimal_stock: i64,
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl LowStockAlert {
    /// Whether the snapshot already matches the part
    pub fn matches(&self, part: &Part) -> bool {
        self.current_stock == part.stock && self.minimal_stock == part.minimal_stock
    }
}

/// Published once a part enters the low-stock state
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LowStockEvent {
    pub part_id: Uuid,
    pub sku: String,
    pub current_stock: i64,
    pub minimal_stock: i64,
    pub raised_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_movement_directions() {
        assert_eq!(MovementType::PurchaseReceived.signed(5), 5);
        assert_eq!(MovementType::Sale.signed(5), -5);
        assert_eq!(MovementType::SaleReversal.signed(5), 5);
        assert_eq!(MovementType::PurchaseReversal.signed(5), -5);
        assert_eq!(MovementType::AdjustmentOutReversal.signed(2), 2);
        assert_eq!(MovementType::AdjustmentInReversal.signed(2), -2);
    }

    #[test]
    fn test_reversal_flips_direction() {
        for t in MovementType::ALL {
            if let Some(reversal) = t.reversal() {
                assert_ne!(t.direction(), reversal.direction());
                assert!(reversal.is_reversal());
                assert!(reversal.reversal().is_none());
            }
        }
    }

    #[test]
    fn test_movement_type_round_trip_names() {
        for t in MovementType::ALL {
            assert_eq!(t.as_str().parse::<MovementType>().unwrap(), t);
        }
        assert!("transfer".parse::<MovementType>().is_err());
    }

    #[test]
    fn test_reference_columns() {
        let id = Uuid::new_v4();
        let reference = MovementReference::from_columns(Some("sale_document"), Some(id));
        assert_eq!(reference, MovementReference::SaleDocument(id));
        assert_eq!(reference.type_column(), Some("sale_document"));

        // legacy document types that no longer exist resolve to None
        assert_eq!(
            MovementReference::from_columns(Some("legacy_invoice"), Some(id)),
            MovementReference::None
        );
        assert_eq!(MovementReference::from_columns(None, None), MovementReference::None);
    }

    #[test]
    fn test_reference_wire_shape() {
        let id = Uuid::nil();
        let json = serde_json::to_value(MovementReference::SalesOrder(id)).unwrap();
        assert_eq!(json["kind"], "sales_order");
        assert_eq!(json["id"], id.to_string());

        let none: MovementReference = serde_json::from_str(r#"{"kind":"none"}"#).unwrap();
        assert_eq!(none, MovementReference::None);
    }

    #[test]
    fn test_low_stock_condition() {
        let now = Utc::now();
        let mut part = Part {
            id: Uuid::new_v4(),
            sku: "BRK-001".to_string(),
            name: "Brake pad".to_string(),
            stock: 5,
            minimal_stock: 5,
            buy_price: 1000,
            sell_price: 1500,
            version: 0,
            deleted_at: None,
            created_at: now,
            updated_at: now,
        };
        assert!(part.is_low_stock());
        part.stock = 6;
        assert!(!part.is_low_stock());
        part.minimal_stock = 0;
        part.stock = 0;
        assert!(!part.is_low_stock());
    }
}
