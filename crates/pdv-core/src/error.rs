//! # Error Types
//!
//! Business rule violations raised by the sale engine and the cashier
//! session state machine.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Error Flow                                      │
//! │                                                                         │
//! │  pdv-core   CoreError  (this file)                                     │
//! │      │                                                                  │
//! │      ▼                                                                  │
//! │  pdv-db     DbError::Domain(CoreError)  rolls the transaction back      │
//! │      │                                                                  │
//! │      ▼                                                                  │
//! │  pdv-agent  anyhow context, printed to the operator                     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use thiserror::Error;

use crate::money::Money;
use crate::types::{LocalId, PaymentCategory, SaleStatus, SessionStatus};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CoreError {
    /// Items, discounts and payment can only change while a sale is pending.
    #[error("Sale {sale_id} is {status}, cannot {operation}")]
    InvalidSaleStatus {
        sale_id: LocalId,
        status: SaleStatus,
        operation: &'static str,
    },

    #[error("Sale {sale_id} has no item {item_id}")]
    ItemNotFound { sale_id: LocalId, item_id: LocalId },

    #[error("Discount of {0} bps is outside 0..=10000")]
    DiscountOutOfRange(u32),

    #[error("Sale {0} has no items")]
    EmptySale(LocalId),

    #[error("Sale {0} total must be positive")]
    NonPositiveTotal(LocalId),

    #[error("Payment {paid} does not cover total {due}")]
    InsufficientPayment { due: Money, paid: Money },

    #[error("Quantity must be positive, got {0}")]
    InvalidQuantity(i64),

    #[error("Line amount overflowed for product {0}")]
    AmountOverflow(LocalId),

    /// Operation not allowed in the session's current state.
    #[error("Cashier session {session_id} is {status}, cannot {operation}")]
    InvalidSessionStatus {
        session_id: LocalId,
        status: SessionStatus,
        operation: &'static str,
    },

    /// A cancellation larger than what the session has recorded.
    #[error("Cannot cancel {amount} from {category} total of {available}")]
    CancelExceedsTotal {
        category: PaymentCategory,
        amount: Money,
        available: Money,
    },

    #[error("Amount must be positive, got {0}")]
    NonPositiveAmount(Money),

    #[error("Unknown payment method: {0}")]
    UnknownPaymentMethod(String),
}

pub type CoreResult<T> = Result<T, CoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = CoreError::InvalidSaleStatus {
            sale_id: 7,
            status: SaleStatus::Completed,
            operation: "add items",
        };
        assert_eq!(err.to_string(), "Sale 7 is completed, cannot add items");

        let err = CoreError::CancelExceedsTotal {
            category: PaymentCategory::Pix,
            amount: Money::from_cents(500),
            available: Money::from_cents(200),
        };
        assert_eq!(
            err.to_string(),
            "Cannot cancel R$ 5.00 from pix total of R$ 2.00"
        );
    }
}
