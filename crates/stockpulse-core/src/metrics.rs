//! # Metrics Engine
//!
//! Deterministic KPI and trend computation over decoded rows.
//!
//! ## Sales
//! ```text
//! revenue    = Σ qty × unit_price
//! units_sold = Σ qty
//! orders     = |distinct invoice_id|
//! aov        = revenue / orders        (0 when orders = 0)
//! sales_trend: per invoice_date, ascending
//! top_items:   per item_id, revenue ↓ then units ↓ then item_id ↑, first 10
//! ```
//!
//! ## Inventory
//! ```text
//!            ┌───────────┬─────────────┬──────────────────────┐
//!            │ on_hand   │ WAC basis   │ COGS                 │
//! ┌──────────┼───────────┼─────────────┼──────────────────────┤
//! │ IN  q    │   + q     │   yes       │   -                  │
//! │ OUT q    │   − q     │   no        │   q × own unit_cost  │
//! │ ADJ q    │   + q     │   if q > 0  │   -                  │
//! └──────────┴───────────┴─────────────┴──────────────────────┘
//!
//! wac   = Σ(q × unit_cost) / Σ q   over the WAC basis (0 when Σ q = 0)
//! value = on_hand × wac
//! ```
//!
//! COGS is taken from each OUT row's recorded unit cost, not from the WAC.
//!
//! Grouping uses `BTreeMap`, so every sequence comes out in key order and the
//! same rows always yield byte-identical JSON.
//!
//! Every sum and product is checked. An overflow is returned as
//! `CoreError::MetricOverflow`, never a panic or a wrapped value.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use crate::error::{CoreError, CoreResult};
use crate::money::Money;
use crate::types::{InventoryRow, MovementType, RecordSet, SalesRow};
use crate::TOP_ITEMS_LIMIT;

// =============================================================================
// Sales Metrics
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SalesKpis {
    pub revenue: Money,
    pub units_sold: i64,
    pub orders: usize,
    pub aov: Money,
}

/// One day of sales.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SalesTrendPoint {
    pub date: NaiveDate,
    pub revenue: Money,
    pub units: i64,
}

/// One item's contribution to sales.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopItem {
    pub item_id: String,
    pub revenue: Money,
    pub units: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SalesMetrics {
    pub kpis: SalesKpis,
    pub sales_trend: Vec<SalesTrendPoint>,
    pub top_items: Vec<TopItem>,
}

/// Computes sales KPIs, the daily trend and the top items.
pub fn compute_sales_metrics(rows: &[SalesRow]) -> CoreResult<SalesMetrics> {
    let mut revenue = Money::zero();
    let mut units_sold = 0i64;
    let mut invoices = BTreeSet::new();
    let mut by_date: BTreeMap<NaiveDate, (Money, i64)> = BTreeMap::new();
    let mut by_item: BTreeMap<&str, (Money, i64)> = BTreeMap::new();

    for row in rows {
        let line = row.revenue().ok_or_else(|| overflow("revenue"))?;
        add_money(&mut revenue, line, "revenue")?;
        add_qty(&mut units_sold, row.qty, "units_sold")?;
        invoices.insert(row.invoice_id.as_str());

        let day = by_date.entry(row.invoice_date).or_default();
        add_money(&mut day.0, line, "sales_trend")?;
        add_qty(&mut day.1, row.qty, "sales_trend")?;

        let item = by_item.entry(row.item_id.as_str()).or_default();
        add_money(&mut item.0, line, "top_items")?;
        add_qty(&mut item.1, row.qty, "top_items")?;
    }

    let orders = invoices.len();
    let aov = revenue.divide_or_zero(orders as i64);

    let sales_trend = by_date
        .into_iter()
        .map(|(date, (revenue, units))| SalesTrendPoint {
            date,
            revenue,
            units,
        })
        .collect();

    let mut top_items: Vec<TopItem> = by_item
        .into_iter()
        .map(|(item_id, (revenue, units))| TopItem {
            item_id: item_id.to_string(),
            revenue,
            units,
        })
        .collect();
    top_items.sort_by(|a, b| {
        b.revenue
            .cmp(&a.revenue)
            .then_with(|| b.units.cmp(&a.units))
            .then_with(|| a.item_id.cmp(&b.item_id))
    });
    top_items.truncate(TOP_ITEMS_LIMIT);

    Ok(SalesMetrics {
        kpis: SalesKpis {
            revenue,
            units_sold,
            orders,
            aov,
        },
        sales_trend,
        top_items,
    })
}

// =============================================================================
// Inventory Metrics
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventoryKpis {
    pub cogs: Money,
}

/// Stock position and valuation of one item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventoryLevel {
    pub item_id: String,
    pub on_hand: i64,
    pub wac: Money,
    pub value: Money,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CogsTrendPoint {
    pub date: NaiveDate,
    pub cogs: Money,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventoryMetrics {
    pub kpis: InventoryKpis,
    pub inventory_levels: Vec<InventoryLevel>,
    pub cogs_trend: Vec<CogsTrendPoint>,
}

#[derive(Default)]
struct ItemLedger {
    on_hand: i64,
    basis_cost: Money,
    basis_qty: i64,
}

/// Computes on-hand, weighted-average-cost valuation and COGS.
pub fn compute_inventory_metrics(rows: &[InventoryRow]) -> CoreResult<InventoryMetrics> {
    let mut ledgers: BTreeMap<&str, ItemLedger> = BTreeMap::new();
    let mut cogs = Money::zero();
    let mut cogs_by_date: BTreeMap<NaiveDate, Money> = BTreeMap::new();

    for row in rows {
        let ledger = ledgers.entry(row.item_id.as_str()).or_default();
        let delta = row.signed_qty().ok_or_else(|| overflow("on_hand"))?;
        add_qty(&mut ledger.on_hand, delta, "on_hand")?;

        if row.is_cost_basis() || row.movement == MovementType::Out {
            let cost = row
                .unit_cost
                .checked_multiply_quantity(row.qty)
                .ok_or_else(|| overflow("movement cost"))?;

            if row.is_cost_basis() {
                add_money(&mut ledger.basis_cost, cost, "wac")?;
                add_qty(&mut ledger.basis_qty, row.qty, "wac")?;
            } else {
                add_money(&mut cogs, cost, "cogs")?;
                add_money(cogs_by_date.entry(row.move_date).or_default(), cost, "cogs_trend")?;
            }
        }
    }

    let inventory_levels = ledgers
        .into_iter()
        .map(|(item_id, ledger)| -> CoreResult<InventoryLevel> {
            let wac = ledger.basis_cost.divide_or_zero(ledger.basis_qty);
            let value = wac
                .checked_multiply_quantity(ledger.on_hand)
                .ok_or_else(|| overflow("inventory value"))?;
            Ok(InventoryLevel {
                item_id: item_id.to_string(),
                on_hand: ledger.on_hand,
                wac,
                value,
            })
        })
        .collect::<CoreResult<Vec<_>>>()?;

    let cogs_trend = cogs_by_date
        .into_iter()
        .map(|(date, cogs)| CogsTrendPoint { date, cogs })
        .collect();

    Ok(InventoryMetrics {
        kpis: InventoryKpis { cogs },
        inventory_levels,
        cogs_trend,
    })
}

fn overflow(metric: &'static str) -> CoreError {
    CoreError::MetricOverflow { metric }
}

fn add_money(total: &mut Money, amount: Money, metric: &'static str) -> CoreResult<()> {
    *total = total.checked_add(amount).ok_or_else(|| overflow(metric))?;
    Ok(())
}

fn add_qty(total: &mut i64, qty: i64, metric: &'static str) -> CoreResult<()> {
    *total = total.checked_add(qty).ok_or_else(|| overflow(metric))?;
    Ok(())
}

// =============================================================================
// Reports
// =============================================================================

/// Metrics of a single upload, tagged with its record type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "record_type", rename_all = "lowercase")]
pub enum MetricsReport {
    Sales(SalesMetrics),
    Inventory(InventoryMetrics),
}

/// Computes the metrics matching a record set's type.
pub fn compute(rows: &RecordSet) -> CoreResult<MetricsReport> {
    Ok(match rows {
        RecordSet::Sales(rows) => MetricsReport::Sales(compute_sales_metrics(rows)?),
        RecordSet::Inventory(rows) => MetricsReport::Inventory(compute_inventory_metrics(rows)?),
    })
}

/// Sales and inventory metrics side by side (pair and batch views).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CombinedMetrics {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sales: Option<SalesMetrics>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub inventory: Option<InventoryMetrics>,
}

impl CombinedMetrics {
    pub fn is_empty(&self) -> bool {
        self.sales.is_none() && self.inventory.is_none()
    }

    /// Places a report in its slot, replacing any previous one of that type.
    pub fn insert(&mut self, report: MetricsReport) {
        match report {
            MetricsReport::Sales(m) => self.sales = Some(m),
            MetricsReport::Inventory(m) => self.inventory = Some(m),
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
