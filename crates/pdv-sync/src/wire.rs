//! # Wire Format
//!
//! JSON shapes exchanged with the remote API.
//!
//! ```text
//!   local (cents, bps, local ids)          remote (decimal numbers, remote ids)
//!   ─────────────────────────────          ────────────────────────────────────
//!   Money(1099)                       ──►  10.99
//!   TaxRate(1800)                     ──►  18.0          (percent)
//!   Sale.customer_id = 4 (local)      ──►  customer_id = 1002 (remote)
//!   {"id": 1002} | {"data":{"id":..}} ──►  remote_id
//!   [..] | {"data":[..]} | {"items":[..]}  ──►  records
//! ```
//!
//! Pulled records go through the same `normalized()` rules as local edits,
//! so blank strings never reach the cache.

use chrono::{DateTime, Utc};
use pdv_core::{
    CashierSession, Customer, CustomerData, Decimal, LocalId, Money, Product, ProductData, Sale,
    TaxRate,
};
use rust_decimal::prelude::ToPrimitive;
use serde_json::{json, Map, Value};
use std::collections::HashMap;
use std::str::FromStr;

use crate::error::{ApiError, ApiResult};

// =============================================================================
// Scalars
// =============================================================================

fn decimal_value(amount: Decimal) -> Value {
    amount.to_f64().map(Value::from).unwrap_or(Value::Null)
}

fn money_value(amount: Money) -> Value {
    decimal_value(amount.to_decimal())
}

fn optional_money(amount: Option<Money>) -> Value {
    amount.map(money_value).unwrap_or(Value::Null)
}

fn tax_percent(rate: TaxRate) -> Value {
    decimal_value(Decimal::new(i64::from(rate.bps()), 2))
}

fn timestamp(at: DateTime<Utc>) -> Value {
    Value::String(at.to_rfc3339())
}

/// Reads a decimal sent either as a JSON number or as a numeric string.
fn decimal_from(value: &Value) -> Option<Decimal> {
    let text = match value {
        Value::Number(n) => n.to_string(),
        Value::String(s) => s.trim().to_string(),
        _ => return None,
    };
    Decimal::from_str(&text)
        .or_else(|_| Decimal::from_scientific(&text))
        .ok()
}

fn money_field(record: &Value, key: &str) -> Option<Money> {
    record.get(key).and_then(decimal_from).and_then(Money::from_decimal)
}

fn string_field(record: &Value, key: &str) -> Option<String> {
    match record.get(key)? {
        Value::String(s) => Some(s.clone()),
        // barcodes and documents sometimes arrive as numbers
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn bool_field(record: &Value, key: &str) -> Option<bool> {
    match record.get(key)? {
        Value::Bool(b) => Some(*b),
        Value::Number(n) => n.as_i64().map(|n| n != 0),
        _ => None,
    }
}

fn integer(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Percent on the wire (`18` or `"18.00"`) to basis points.
fn tax_rate_from(value: Option<&Value>) -> TaxRate {
    value
        .and_then(decimal_from)
        .filter(|pct| !pct.is_sign_negative())
        .and_then(|pct| (pct * Decimal::ONE_HUNDRED).round().to_u32())
        .map(TaxRate::from_bps)
        .unwrap_or_default()
}

fn invalid(message: impl Into<String>) -> ApiError {
    ApiError::InvalidResponse(message.into())
}

// =============================================================================
// Response envelopes
// =============================================================================

/// The id the API assigned, from `{"id": ..}` or `{"data": {"id": ..}}`.
pub fn remote_id_from(body: &Value) -> Option<i64> {
    body.get("id")
        .and_then(integer)
        .or_else(|| body.get("data").and_then(|d| d.get("id")).and_then(integer))
}

/// The records of a list response: a bare array, or one wrapped in
/// `data` or `items`.
pub fn records_from(body: Value) -> ApiResult<Vec<Value>> {
    match body {
        Value::Array(records) => Ok(records),
        Value::Object(mut envelope) => ["data", "items"]
            .iter()
            .find_map(|key| match envelope.remove(*key) {
                Some(Value::Array(records)) => Some(records),
                _ => None,
            })
            .ok_or_else(|| invalid("list response has no data or items array")),
        Value::Null => Ok(Vec::new()),
        other => Err(invalid(format!("expected a list, got {other}"))),
    }
}

// =============================================================================
// Push payloads
// =============================================================================

pub fn product_payload(product: &Product) -> Value {
    let data = &product.data;
    json!({
        "name": data.name,
        "description": data.description,
        "sku": data.sku,
        "barcode": data.barcode,
        "price": money_value(data.price),
        "cost": optional_money(data.cost),
        "stock_quantity": data.stock_quantity,
        "category_name": data.category_name,
        "brand": data.brand,
        "requires_weighing": data.requires_weighing,
        "is_active": data.is_active,
        "tax_rate": tax_percent(data.tax_rate),
    })
}

pub fn customer_payload(customer: &Customer) -> Value {
    let data = &customer.data;
    json!({
        "name": data.name,
        "email": data.email,
        "phone": data.phone,
        "document": data.document,
        "document_type": data.document_type,
        "address": data.address,
        "city": data.city,
        "state": data.state,
        "zip_code": data.zip_code,
        "is_active": data.is_active,
        "notes": data.notes,
    })
}

pub fn session_payload(session: &CashierSession) -> Value {
    json!({
        "session_number": session.session_number,
        "user_id": session.user_id,
        "user_name": session.user_name,
        "terminal_id": session.terminal_id,
        "status": session.status,
        "opening_cash": money_value(session.opening_cash),
        "total_cash": money_value(session.totals.cash),
        "total_card": money_value(session.totals.card),
        "total_pix": money_value(session.totals.pix),
        "total_other": money_value(session.totals.other),
        "total_sales": money_value(session.total_sales()),
        "sales_count": session.sales_count,
        "cancelled_sales_count": session.cancelled_sales_count,
        "closing_cash": optional_money(session.closing_cash),
        "expected_cash": optional_money(session.expected_cash),
        "cash_difference": optional_money(session.cash_difference),
        "opening_notes": session.opening_notes,
        "closing_notes": session.closing_notes,
        "opened_at": timestamp(session.opened_at),
        "closed_at": session.closed_at.map(timestamp),
    })
}

/// Remote ids a sale refers to, resolved from the local ones.
#[derive(Debug, Clone, Default)]
pub struct SaleRefs {
    pub customer: Option<i64>,
    pub session: Option<i64>,
    pub products: HashMap<LocalId, i64>,
}

pub fn sale_payload(sale: &Sale, refs: &SaleRefs) -> Value {
    let items: Vec<Value> = sale
        .items
        .iter()
        .map(|item| {
            let mut line = Map::new();
            line.insert(
                "product_id".into(),
                refs.products.get(&item.product_id).copied().into(),
            );
            line.insert("product_name".into(), item.product_name.clone().into());
            line.insert("product_sku".into(), item.product_sku.clone().into());
            line.insert("quantity".into(), item.quantity.into());
            line.insert(
                "weight".into(),
                item.weight.map(decimal_value).unwrap_or(Value::Null),
            );
            line.insert("unit_price".into(), money_value(item.unit_price));
            line.insert("total_price".into(), money_value(item.total_price));
            line.insert("discount".into(), money_value(item.discount));
            line.insert("tax_rate".into(), tax_percent(item.tax_rate));
            line.insert("tax".into(), money_value(item.tax));
            Value::Object(line)
        })
        .collect();

    json!({
        "sale_number": sale.sale_number,
        "customer_id": refs.customer,
        "customer_name": sale.customer_name,
        "customer_document": sale.customer_document,
        "cashier_session_id": refs.session,
        "user_id": sale.user_id,
        "user_name": sale.user_name,
        "subtotal": money_value(sale.subtotal),
        "discount_amount": money_value(sale.discount_amount),
        "discount_percentage": decimal_value(Decimal::new(i64::from(sale.discount_bps), 2)),
        "tax_amount": money_value(sale.tax_amount),
        "total_amount": money_value(sale.total_amount),
        "payment_method": sale.payment_method,
        "amount_paid": money_value(sale.amount_paid),
        "change_amount": money_value(sale.change_amount),
        "status": sale.status,
        "notes": sale.notes,
        "created_at": timestamp(sale.created_at),
        "completed_at": sale.completed_at.map(timestamp),
        "items": items,
    })
}

// =============================================================================
// Pulled records
// =============================================================================

pub fn product_from_remote(record: &Value) -> ApiResult<(i64, ProductData)> {
    let remote_id = record
        .get("id")
        .and_then(integer)
        .ok_or_else(|| invalid("product without id"))?;
    let name = string_field(record, "name")
        .filter(|n| !n.trim().is_empty())
        .ok_or_else(|| invalid(format!("product {remote_id} without name")))?;
    let price = money_field(record, "price")
        .ok_or_else(|| invalid(format!("product {remote_id} without a valid price")))?;

    let category_name = string_field(record, "category_name").or_else(|| {
        record.get("category").and_then(|c| match c {
            Value::String(s) => Some(s.clone()),
            other => string_field(other, "name"),
        })
    });

    let data = ProductData {
        name,
        description: string_field(record, "description"),
        sku: string_field(record, "sku"),
        barcode: string_field(record, "barcode"),
        price,
        cost: money_field(record, "cost"),
        stock_quantity: record
            .get("stock_quantity")
            .and_then(decimal_from)
            .and_then(|q| q.trunc().to_i64())
            .unwrap_or(0),
        category_name,
        brand: string_field(record, "brand"),
        requires_weighing: bool_field(record, "requires_weighing").unwrap_or(false),
        is_active: bool_field(record, "is_active").unwrap_or(true),
        tax_rate: tax_rate_from(record.get("tax_rate")),
    };
    Ok((remote_id, data.normalized()))
}

pub fn customer_from_remote(record: &Value) -> ApiResult<(i64, CustomerData)> {
    let remote_id = record
        .get("id")
        .and_then(integer)
        .ok_or_else(|| invalid("customer without id"))?;
    let name = string_field(record, "name")
        .filter(|n| !n.trim().is_empty())
        .ok_or_else(|| invalid(format!("customer {remote_id} without name")))?;

    let data = CustomerData {
        name,
        email: string_field(record, "email"),
        phone: string_field(record, "phone"),
        document: string_field(record, "document"),
        document_type: string_field(record, "document_type"),
        address: string_field(record, "address"),
        city: string_field(record, "city"),
        state: string_field(record, "state"),
        zip_code: string_field(record, "zip_code"),
        is_active: bool_field(record, "is_active").unwrap_or(true),
        notes: string_field(record, "notes"),
    };
    Ok((remote_id, data.normalized()))
}
