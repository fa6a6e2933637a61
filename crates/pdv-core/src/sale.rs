//! # Sale Totals Engine
//!
//! A [`Sale`] owns its [`SaleItem`]s. Every mutation goes through a method
//! here and ends with [`Sale::recalculate`], so the stored totals are always
//! a pure function of the items and the sale-level discount.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Totals Recompute                                 │
//! │                                                                         │
//! │  items ──► subtotal = Σ item.total_price                                │
//! │        ──► discount = Σ item.discount + subtotal × discount_bps         │
//! │        ──► tax      = Σ item.tax                                        │
//! │                                                                         │
//! │  total  = subtotal − discount + tax                                     │
//! │  change = max(amount_paid − total, 0)                                   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};
use crate::money::Money;
use crate::types::{LocalId, PaymentMethod, Product, SaleStatus, SyncState, TaxRate};

/// 100% in basis points.
pub const MAX_DISCOUNT_BPS: u32 = 10_000;

// =============================================================================
// Line Items
// =============================================================================

/// A line about to be added to a sale.
///
/// Product fields are copied in so the line keeps the name and price it was
/// sold under even if the cached product changes later.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewSaleItem {
    pub product_id: LocalId,
    pub product_name: String,
    pub product_sku: Option<String>,
    pub quantity: i64,
    /// Measured weight in kg for weighed products; the line is priced by it.
    pub weight: Option<Decimal>,
    pub unit_price: Money,
    pub discount: Money,
    pub tax_rate: TaxRate,
}

/// Computed amounts for one line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinePrice {
    pub total_price: Money,
    pub tax: Money,
}

impl NewSaleItem {
    pub fn for_product(product: &Product, quantity: i64) -> Self {
        NewSaleItem {
            product_id: product.id,
            product_name: product.data.name.clone(),
            product_sku: product.data.sku.clone(),
            quantity,
            weight: None,
            unit_price: product.data.price,
            discount: Money::zero(),
            tax_rate: product.data.tax_rate,
        }
    }

    /// A weighed line: `unit_price` is per kilogram.
    pub fn weighed(product: &Product, weight: Decimal) -> Self {
        NewSaleItem {
            weight: Some(weight),
            ..NewSaleItem::for_product(product, 1)
        }
    }

    pub fn with_discount(mut self, discount: Money) -> Self {
        self.discount = discount;
        self
    }

    pub fn price(&self) -> CoreResult<LinePrice> {
        if self.quantity <= 0 {
            return Err(CoreError::InvalidQuantity(self.quantity));
        }
        let total_price = match self.weight {
            Some(weight) => self
                .unit_price
                .multiply_weight(weight)
                .ok_or(CoreError::AmountOverflow(self.product_id))?,
            None => self.unit_price.multiply_quantity(self.quantity),
        };
        let taxable = (total_price - self.discount).clamp_non_negative();
        Ok(LinePrice {
            total_price,
            tax: taxable.calculate_tax(self.tax_rate),
        })
    }
}

/// A persisted sale line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SaleItem {
    pub id: LocalId,
    pub sale_id: LocalId,
    pub product_id: LocalId,
    pub product_name: String,
    pub product_sku: Option<String>,
    pub quantity: i64,
    pub weight: Option<Decimal>,
    pub unit_price: Money,
    pub total_price: Money,
    pub discount: Money,
    pub tax_rate: TaxRate,
    pub tax: Money,
    pub created_at: DateTime<Utc>,
    /// Follows the owning sale; flipped together with it.
    pub synced: bool,
    pub sync_error: Option<String>,
}

impl SaleItem {
    /// Prices `item` and binds it to its row id and sale.
    pub fn from_new(
        id: LocalId,
        sale_id: LocalId,
        item: NewSaleItem,
        now: DateTime<Utc>,
    ) -> CoreResult<Self> {
        let price = item.price()?;
        Ok(SaleItem {
            id,
            sale_id,
            product_id: item.product_id,
            product_name: item.product_name,
            product_sku: item.product_sku,
            quantity: item.quantity,
            weight: item.weight,
            unit_price: item.unit_price,
            total_price: price.total_price,
            discount: item.discount,
            tax_rate: item.tax_rate,
            tax: price.tax,
            created_at: now,
            synced: false,
            sync_error: None,
        })
    }

    pub fn is_weighed(&self) -> bool {
        self.weight.is_some()
    }
}

// =============================================================================
// Sale
// =============================================================================

/// Header fields for a new pending sale.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewSale {
    pub sale_number: String,
    pub customer_id: Option<LocalId>,
    pub customer_name: Option<String>,
    pub customer_document: Option<String>,
    pub cashier_session_id: Option<LocalId>,
    pub user_id: Option<i64>,
    pub user_name: Option<String>,
    pub payment_method: PaymentMethod,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sale {
    pub id: LocalId,
    pub sale_number: String,
    pub customer_id: Option<LocalId>,
    pub customer_name: Option<String>,
    pub customer_document: Option<String>,
    pub cashier_session_id: Option<LocalId>,
    pub user_id: Option<i64>,
    pub user_name: Option<String>,
    pub items: Vec<SaleItem>,
    pub subtotal: Money,
    pub discount_amount: Money,
    /// Sale-level percentage discount on top of line discounts.
    pub discount_bps: u32,
    pub tax_amount: Money,
    pub total_amount: Money,
    pub payment_method: PaymentMethod,
    pub amount_paid: Money,
    pub change_amount: Money,
    pub status: SaleStatus,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub sync: SyncState,
}

impl Sale {
    /// An empty pending sale.
    pub fn new(id: LocalId, header: NewSale, now: DateTime<Utc>) -> Self {
        Sale {
            id,
            sale_number: header.sale_number,
            customer_id: header.customer_id,
            customer_name: header.customer_name,
            customer_document: header.customer_document,
            cashier_session_id: header.cashier_session_id,
            user_id: header.user_id,
            user_name: header.user_name,
            items: Vec::new(),
            subtotal: Money::zero(),
            discount_amount: Money::zero(),
            discount_bps: 0,
            tax_amount: Money::zero(),
            total_amount: Money::zero(),
            payment_method: header.payment_method,
            amount_paid: Money::zero(),
            change_amount: Money::zero(),
            status: SaleStatus::Pending,
            notes: header.notes,
            created_at: now,
            updated_at: now,
            completed_at: None,
            sync: SyncState::default(),
        }
    }

    /// Rebuilds every derived amount from the items.
    pub fn recalculate(&mut self) {
        self.subtotal = self.items.iter().map(|i| i.total_price).sum();
        let line_discounts: Money = self.items.iter().map(|i| i.discount).sum();
        self.discount_amount = line_discounts + self.subtotal.percentage(self.discount_bps);
        self.tax_amount = self.items.iter().map(|i| i.tax).sum();
        self.total_amount = self.subtotal - self.discount_amount + self.tax_amount;
        self.change_amount = (self.amount_paid - self.total_amount).clamp_non_negative();
    }

    /// True when the stored totals match a fresh recompute.
    pub fn totals_consistent(&self) -> bool {
        let mut copy = self.clone();
        copy.recalculate();
        copy.subtotal == self.subtotal
            && copy.discount_amount == self.discount_amount
            && copy.tax_amount == self.tax_amount
            && copy.total_amount == self.total_amount
            && self.total_amount == self.subtotal - self.discount_amount + self.tax_amount
    }

    fn ensure_pending(&self, operation: &'static str) -> CoreResult<()> {
        if self.status != SaleStatus::Pending {
            return Err(CoreError::InvalidSaleStatus {
                sale_id: self.id,
                status: self.status,
                operation,
            });
        }
        Ok(())
    }

    pub fn add_item(&mut self, item: SaleItem) -> CoreResult<()> {
        self.ensure_pending("add items")?;
        self.items.push(item);
        self.recalculate();
        Ok(())
    }

    pub fn remove_item(&mut self, item_id: LocalId) -> CoreResult<SaleItem> {
        self.ensure_pending("remove items")?;
        let index = self
            .items
            .iter()
            .position(|i| i.id == item_id)
            .ok_or(CoreError::ItemNotFound {
                sale_id: self.id,
                item_id,
            })?;
        let removed = self.items.remove(index);
        self.recalculate();
        Ok(removed)
    }

    pub fn clear_items(&mut self) -> CoreResult<Vec<SaleItem>> {
        self.ensure_pending("clear items")?;
        let removed = std::mem::take(&mut self.items);
        self.recalculate();
        Ok(removed)
    }

    /// Sets the sale-level percentage discount (0..=10000 bps).
    pub fn apply_discount(&mut self, bps: u32) -> CoreResult<()> {
        self.ensure_pending("apply a discount")?;
        if bps > MAX_DISCOUNT_BPS {
            return Err(CoreError::DiscountOutOfRange(bps));
        }
        self.discount_bps = bps;
        self.recalculate();
        Ok(())
    }

    pub fn set_payment(&mut self, method: PaymentMethod, amount_paid: Money) -> CoreResult<()> {
        self.ensure_pending("change payment")?;
        self.payment_method = method;
        self.amount_paid = amount_paid;
        self.recalculate();
        Ok(())
    }

    /// Checks the sale can be finalized.
    pub fn can_complete(&self) -> CoreResult<()> {
        self.ensure_pending("complete")?;
        if self.items.is_empty() {
            return Err(CoreError::EmptySale(self.id));
        }
        if !self.total_amount.is_positive() {
            return Err(CoreError::NonPositiveTotal(self.id));
        }
        if self.amount_paid < self.total_amount {
            return Err(CoreError::InsufficientPayment {
                due: self.total_amount,
                paid: self.amount_paid,
            });
        }
        Ok(())
    }

    pub fn complete(&mut self, now: DateTime<Utc>) -> CoreResult<()> {
        self.can_complete()?;
        self.status = SaleStatus::Completed;
        self.completed_at = Some(now);
        Ok(())
    }

    /// Cancels a pending or completed sale and returns the status it left.
    pub fn cancel(&mut self) -> CoreResult<SaleStatus> {
        match self.status {
            SaleStatus::Pending | SaleStatus::Completed => {
                let previous = self.status;
                self.status = SaleStatus::Cancelled;
                Ok(previous)
            }
            status => Err(CoreError::InvalidSaleStatus {
                sale_id: self.id,
                status,
                operation: "cancel",
            }),
        }
    }

    /// Units on the sale; weighed lines count once.
    pub fn item_count(&self) -> i64 {
        self.items.iter().map(|i| i.quantity).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn now() -> DateTime<Utc> {
        Utc::now()
    }

    fn line(id: LocalId, price: i64, qty: i64, tax_bps: u32) -> SaleItem {
        let new = NewSaleItem {
            product_id: id,
            product_name: format!("item {id}"),
            product_sku: None,
            quantity: qty,
            weight: None,
            unit_price: Money::from_cents(price),
            discount: Money::zero(),
            tax_rate: TaxRate::from_bps(tax_bps),
        };
        SaleItem::from_new(id, 1, new, now()).unwrap()
    }

    fn pending() -> Sale {
        Sale::new(
            1,
            NewSale {
                sale_number: "S-1".into(),
                ..Default::default()
            },
            now(),
        )
    }

    #[test]
    fn test_totals_follow_items() {
        let mut sale = pending();
        sale.add_item(line(1, 500, 2, 0)).unwrap();
        sale.add_item(line(2, 1000, 1, 1000)).unwrap();

        assert_eq!(sale.subtotal.cents(), 2000);
        assert_eq!(sale.tax_amount.cents(), 100);
        assert_eq!(sale.total_amount.cents(), 2100);
        assert!(sale.totals_consistent());

        sale.remove_item(1).unwrap();
        assert_eq!(sale.subtotal.cents(), 1000);
        assert_eq!(sale.total_amount.cents(), 1100);
        assert!(sale.totals_consistent());
    }

    #[test]
    fn test_discount_and_change() {
        let mut sale = pending();
        sale.add_item(line(1, 10000, 1, 0)).unwrap();
        sale.apply_discount(1000).unwrap();
        assert_eq!(sale.discount_amount.cents(), 1000);
        assert_eq!(sale.total_amount.cents(), 9000);

        sale.set_payment(PaymentMethod::Cash, Money::from_cents(10000))
            .unwrap();
        assert_eq!(sale.change_amount.cents(), 1000);

        assert_eq!(
            sale.apply_discount(10001),
            Err(CoreError::DiscountOutOfRange(10001))
        );
        assert_eq!(sale.discount_bps, 1000);
    }

    #[test]
    fn test_weighed_line_uses_weight() {
        let new = NewSaleItem {
            product_id: 9,
            product_name: "Queijo".into(),
            product_sku: Some("QJ".into()),
            quantity: 1,
            weight: Some(Decimal::from_str("0.350").unwrap()),
            unit_price: Money::from_cents(4990),
            discount: Money::zero(),
            tax_rate: TaxRate::zero(),
        };
        let price = new.price().unwrap();
        assert_eq!(price.total_price.cents(), 1746); // 1746.5 rounds to even
    }

    #[test]
    fn test_line_discount_reduces_tax_base() {
        let new = NewSaleItem {
            product_id: 3,
            product_name: "Cafe".into(),
            product_sku: None,
            quantity: 2,
            weight: None,
            unit_price: Money::from_cents(1000),
            discount: Money::from_cents(0),
            tax_rate: TaxRate::from_bps(1000),
        }
        .with_discount(Money::from_cents(500));
        let price = new.price().unwrap();
        assert_eq!(price.total_price.cents(), 2000);
        assert_eq!(price.tax.cents(), 150);
    }

    #[test]
    fn test_invalid_quantity_rejected() {
        let mut new = NewSaleItem {
            product_id: 3,
            product_name: "Cafe".into(),
            product_sku: None,
            quantity: 0,
            weight: None,
            unit_price: Money::from_cents(1000),
            discount: Money::zero(),
            tax_rate: TaxRate::zero(),
        };
        assert_eq!(new.price(), Err(CoreError::InvalidQuantity(0)));
        new.quantity = 1;
        assert!(new.price().is_ok());
    }

    #[test]
    fn test_complete_requires_payment() {
        let mut sale = pending();
        assert_eq!(sale.can_complete(), Err(CoreError::EmptySale(1)));

        sale.add_item(line(1, 1500, 1, 0)).unwrap();
        assert!(matches!(
            sale.complete(now()),
            Err(CoreError::InsufficientPayment { .. })
        ));

        sale.set_payment(PaymentMethod::Pix, Money::from_cents(1500))
            .unwrap();
        sale.complete(now()).unwrap();
        assert_eq!(sale.status, SaleStatus::Completed);
        assert!(sale.completed_at.is_some());

        let err = sale.add_item(line(2, 100, 1, 0)).unwrap_err();
        assert!(matches!(err, CoreError::InvalidSaleStatus { .. }));
    }

    #[test]
    fn test_cancel_transitions() {
        let mut sale = pending();
        assert_eq!(sale.cancel().unwrap(), SaleStatus::Pending);
        assert!(sale.cancel().is_err());
    }

    #[test]
    fn test_remove_missing_item() {
        let mut sale = pending();
        assert_eq!(
            sale.remove_item(42),
            Err(CoreError::ItemNotFound {
                sale_id: 1,
                item_id: 42
            })
        );
    }
}
