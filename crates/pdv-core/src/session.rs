//! # Cashier Session
//!
//! Tracks the money flowing through one drawer between opening and closing.
//!
//! ```text
//!            add_sale / cancel_sale
//!                 ┌────────┐
//!                 ▼        │
//!  open ──► ┌──────────┐ ──┘    suspend    ┌───────────┐
//!           │   Open   │ ────────────────► │ Suspended │
//!           │          │ ◄──────────────── │           │
//!           └────┬─────┘      resume       └───────────┘
//!                │ close(closing_cash)
//!                ▼
//!           ┌──────────┐  expected_cash, cash_difference set once
//!           │  Closed  │  (terminal)
//!           └──────────┘
//! ```
//!
//! Sale totals are kept per payment category. The overall total is always
//! derived from the four buckets so it cannot drift from them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};
use crate::money::Money;
use crate::types::{LocalId, PaymentCategory, PaymentMethod, SessionStatus, SyncState};

/// Differences at or below one centavo count as a balanced drawer.
pub const DIFFERENCE_TOLERANCE: Money = Money::from_cents(1);

/// Running sale totals per payment category.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionTotals {
    pub cash: Money,
    pub card: Money,
    pub pix: Money,
    pub other: Money,
}

impl SessionTotals {
    pub fn get(&self, category: PaymentCategory) -> Money {
        match category {
            PaymentCategory::Cash => self.cash,
            PaymentCategory::Card => self.card,
            PaymentCategory::Pix => self.pix,
            PaymentCategory::Other => self.other,
        }
    }

    fn slot(&mut self, category: PaymentCategory) -> &mut Money {
        match category {
            PaymentCategory::Cash => &mut self.cash,
            PaymentCategory::Card => &mut self.card,
            PaymentCategory::Pix => &mut self.pix,
            PaymentCategory::Other => &mut self.other,
        }
    }

    /// Sum of all categories.
    pub fn total(&self) -> Money {
        self.cash + self.card + self.pix + self.other
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewCashierSession {
    pub session_number: String,
    pub user_id: i64,
    pub user_name: Option<String>,
    pub terminal_id: Option<String>,
    pub opening_cash: Money,
    pub opening_notes: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CashierSession {
    pub id: LocalId,
    pub session_number: String,
    pub user_id: i64,
    pub user_name: Option<String>,
    pub terminal_id: Option<String>,
    pub status: SessionStatus,
    pub opening_cash: Money,
    pub totals: SessionTotals,
    pub sales_count: i64,
    pub cancelled_sales_count: i64,
    pub closing_cash: Option<Money>,
    pub expected_cash: Option<Money>,
    pub cash_difference: Option<Money>,
    pub opening_notes: Option<String>,
    pub closing_notes: Option<String>,
    pub opened_at: DateTime<Utc>,
    pub closed_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
    pub sync: SyncState,
}

impl CashierSession {
    pub fn open(id: LocalId, new: NewCashierSession, now: DateTime<Utc>) -> Self {
        CashierSession {
            id,
            session_number: new.session_number,
            user_id: new.user_id,
            user_name: new.user_name,
            terminal_id: new.terminal_id,
            status: SessionStatus::Open,
            opening_cash: new.opening_cash,
            totals: SessionTotals::default(),
            sales_count: 0,
            cancelled_sales_count: 0,
            closing_cash: None,
            expected_cash: None,
            cash_difference: None,
            opening_notes: new.opening_notes,
            closing_notes: None,
            opened_at: now,
            closed_at: None,
            updated_at: now,
            sync: SyncState::default(),
        }
    }

    #[inline]
    pub fn total_sales(&self) -> Money {
        self.totals.total()
    }

    #[inline]
    pub fn is_open(&self) -> bool {
        self.status == SessionStatus::Open
    }

    fn ensure_status(&self, wanted: SessionStatus, operation: &'static str) -> CoreResult<()> {
        if self.status != wanted {
            return Err(CoreError::InvalidSessionStatus {
                session_id: self.id,
                status: self.status,
                operation,
            });
        }
        Ok(())
    }

    /// Records a completed sale under its payment category.
    pub fn add_sale(&mut self, amount: Money, method: PaymentMethod) -> CoreResult<()> {
        self.ensure_status(SessionStatus::Open, "record a sale")?;
        if !amount.is_positive() {
            return Err(CoreError::NonPositiveAmount(amount));
        }
        *self.totals.slot(method.category()) += amount;
        self.sales_count += 1;
        Ok(())
    }

    /// Reverses a previously recorded sale.
    ///
    /// Rejected when the category does not hold `amount` or no sale is on
    /// record, so totals and counters never go negative.
    pub fn cancel_sale(&mut self, amount: Money, method: PaymentMethod) -> CoreResult<()> {
        self.ensure_status(SessionStatus::Open, "cancel a sale")?;
        if !amount.is_positive() {
            return Err(CoreError::NonPositiveAmount(amount));
        }
        let category = method.category();
        let available = self.totals.get(category);
        if self.sales_count == 0 || available < amount {
            return Err(CoreError::CancelExceedsTotal {
                category,
                amount,
                available,
            });
        }
        *self.totals.slot(category) -= amount;
        self.sales_count -= 1;
        self.cancelled_sales_count += 1;
        Ok(())
    }

    pub fn suspend(&mut self) -> CoreResult<()> {
        self.ensure_status(SessionStatus::Open, "suspend")?;
        self.status = SessionStatus::Suspended;
        Ok(())
    }

    pub fn resume(&mut self) -> CoreResult<()> {
        self.ensure_status(SessionStatus::Suspended, "resume")?;
        self.status = SessionStatus::Open;
        Ok(())
    }

    /// Closes the drawer and settles the cash count.
    pub fn close(
        &mut self,
        closing_cash: Money,
        notes: Option<String>,
        now: DateTime<Utc>,
    ) -> CoreResult<()> {
        self.ensure_status(SessionStatus::Open, "close")?;
        let expected = self.opening_cash + self.totals.cash;
        self.closing_cash = Some(closing_cash);
        self.expected_cash = Some(expected);
        self.cash_difference = Some(closing_cash - expected);
        self.closing_notes = notes;
        self.closed_at = Some(now);
        self.status = SessionStatus::Closed;
        Ok(())
    }

    /// Mean sale value, zero when nothing was sold.
    pub fn average_sale_value(&self) -> Money {
        if self.sales_count == 0 {
            return Money::zero();
        }
        Money::from_cents(self.total_sales().cents() / self.sales_count)
    }

    pub fn has_difference(&self) -> bool {
        self.cash_difference
            .map(|d| d.abs() > DIFFERENCE_TOLERANCE)
            .unwrap_or(false)
    }

    /// Operator-facing summary of the closing count; `None` while open.
    pub fn difference_description(&self) -> Option<String> {
        let diff = self.cash_difference?;
        let text = if diff.abs() <= DIFFERENCE_TOLERANCE {
            "Drawer balanced".to_string()
        } else if diff.is_positive() {
            format!("Over by {}", diff)
        } else {
            format!("Short by {}", diff.abs())
        };
        Some(text)
    }
}
