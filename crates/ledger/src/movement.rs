use serde::{Deserialize, Serialize};

/// Why a product's stock changed.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MovementType {
    Purchase,
    ReturnIn,
    TransferIn,
    Sale,
    ReturnOut,
    TransferOut,
    AdjustmentIn,
    AdjustmentOut,
    Damaged,
    Expired,
}

/// Which way a movement pushes stock.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum StockDirection {
    Inbound,
    Outbound,
}

impl MovementType {
    /// The movement-type sign table.
    ///
    /// Total match on purpose: adding a variant without classifying it here
    /// is a compile error, not a silent fall-through.
    pub fn direction(self) -> StockDirection {
        match self {
            MovementType::Purchase
            | MovementType::ReturnIn
            | MovementType::TransferIn
            | MovementType::AdjustmentIn => StockDirection::Inbound,
            MovementType::Sale
            | MovementType::ReturnOut
            | MovementType::TransferOut
            | MovementType::AdjustmentOut
            | MovementType::Damaged
            | MovementType::Expired => StockDirection::Outbound,
        }
    }

    /// Apply the sign table to a positive magnitude.
    pub fn signed(self, quantity: i64) -> i64 {
        match self.direction() {
            StockDirection::Inbound => quantity,
            StockDirection::Outbound => -quantity,
        }
    }

    pub fn is_inbound(self) -> bool {
        self.direction() == StockDirection::Inbound
    }

    /// Stable string form used in storage and on the wire.
    pub fn as_str(self) -> &'static str {
        match self {
            MovementType::Purchase => "purchase",
            MovementType::ReturnIn => "return_in",
            MovementType::TransferIn => "transfer_in",
            MovementType::Sale => "sale",
            MovementType::ReturnOut => "return_out",
            MovementType::TransferOut => "transfer_out",
            MovementType::AdjustmentIn => "adjustment_in",
            MovementType::AdjustmentOut => "adjustment_out",
            MovementType::Damaged => "damaged",
            MovementType::Expired => "expired",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        MovementType::ALL.into_iter().find(|m| m.as_str() == s)
    }

    pub const ALL: [MovementType; 10] = [
        MovementType::Purchase,
        MovementType::ReturnIn,
        MovementType::TransferIn,
        MovementType::Sale,
        MovementType::ReturnOut,
        MovementType::TransferOut,
        MovementType::AdjustmentIn,
        MovementType::AdjustmentOut,
        MovementType::Damaged,
        MovementType::Expired,
    ];
}
