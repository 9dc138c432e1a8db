use core::str::FromStr;

use serde::{Deserialize, Serialize};

use tradelane_core::DomainError;

/// Order lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Pending,
    SupplierProcessing,
    SellerProcessing,
    AdminReview,
    Pushed,
    AdminRejected,
    Shipped,
    Delivered,
    Cancelled,
}

impl OrderStatus {
    pub const ALL: [OrderStatus; 9] = [
        OrderStatus::Pending,
        OrderStatus::SupplierProcessing,
        OrderStatus::SellerProcessing,
        OrderStatus::AdminReview,
        OrderStatus::Pushed,
        OrderStatus::AdminRejected,
        OrderStatus::Shipped,
        OrderStatus::Delivered,
        OrderStatus::Cancelled,
    ];

    /// No transition leaves a terminal status.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            OrderStatus::Delivered | OrderStatus::Cancelled | OrderStatus::AdminRejected
        )
    }

    /// Statuses only the review flow (create/approve/reject) may write.
    pub fn is_review_gated(self) -> bool {
        matches!(
            self,
            OrderStatus::AdminReview | OrderStatus::Pushed | OrderStatus::AdminRejected
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::SupplierProcessing => "supplier_processing",
            OrderStatus::SellerProcessing => "seller_processing",
            OrderStatus::AdminReview => "admin_review",
            OrderStatus::Pushed => "pushed",
            OrderStatus::AdminRejected => "admin_rejected",
            OrderStatus::Shipped => "shipped",
            OrderStatus::Delivered => "delivered",
            OrderStatus::Cancelled => "cancelled",
        }
    }
}

impl core::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OrderStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        OrderStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| DomainError::validation(format!("unknown order status '{s}'")))
    }
}
