use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use workshop_core::{DomainError, DomainResult, Entity, PartId};

/// Default reorder threshold for new parts.
pub const DEFAULT_MIN_STOCK_LEVEL: i64 = 5;

/// Catalog entry: a SKU-unique part with its on-hand quantity.
///
/// `stock` is signed: overselling is allowed by default and surfaces only as
/// a low-stock reporting signal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Part {
    pub id: PartId,
    pub sku: String,
    pub name: String,
    pub category: String,
    pub price: Decimal,
    pub stock: i64,
    /// Reorder threshold; reporting only, never enforced.
    pub min_stock_level: i64,
    pub created_at: DateTime<Utc>,
}

impl Part {
    pub fn is_low_stock(&self) -> bool {
        self.stock <= self.min_stock_level
    }

    /// Valuation of the on-hand quantity at catalog price.
    pub fn stock_value(&self) -> Decimal {
        self.price * Decimal::from(self.stock)
    }
}

impl Entity for Part {
    type Id = PartId;

    fn id(&self) -> PartId {
        self.id
    }
}

/// Input for adding a part to the catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewPart {
    pub sku: String,
    pub name: String,
    pub category: Option<String>,
    pub price: Decimal,
    /// Opening stock.
    pub stock: i64,
    pub min_stock_level: Option<i64>,
}

impl NewPart {
    /// Validate and fill defaults (trimmed SKU/name, `General` category).
    pub fn normalized(self) -> DomainResult<NewPart> {
        let sku = self.sku.trim().to_string();
        let name = self.name.trim().to_string();
        if sku.is_empty() || name.is_empty() {
            return Err(DomainError::invalid_input("name and SKU are required"));
        }
        if self.price < Decimal::ZERO {
            return Err(DomainError::invalid_input("price cannot be negative"));
        }
        if self.stock < 0 {
            return Err(DomainError::invalid_input("opening stock cannot be negative"));
        }
        let min_stock_level = self.min_stock_level.unwrap_or(DEFAULT_MIN_STOCK_LEVEL);
        if min_stock_level < 0 {
            return Err(DomainError::invalid_input("min_stock_level cannot be negative"));
        }
        let category = self
            .category
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty())
            .unwrap_or_else(|| "General".to_string());

        Ok(NewPart {
            sku,
            name,
            category: Some(category),
            price: self.price,
            stock: self.stock,
            min_stock_level: Some(min_stock_level),
        })
    }
}

/// Catalog edit. Stock is not editable here; it only moves through the
/// stock ledger.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartUpdate {
    pub sku: Option<String>,
    pub name: Option<String>,
    pub category: Option<String>,
    pub price: Option<Decimal>,
    pub min_stock_level: Option<i64>,
}

impl PartUpdate {
    /// Apply the edit to `part`, validating like [`NewPart::normalized`].
    pub fn apply_to(&self, part: &mut Part) -> DomainResult<()> {
        let sku = self.sku.as_deref().map(str::trim).unwrap_or(&part.sku);
        let name = self.name.as_deref().map(str::trim).unwrap_or(&part.name);
        if sku.is_empty() || name.is_empty() {
            return Err(DomainError::invalid_input("name and SKU are required"));
        }
        let price = self.price.unwrap_or(part.price);
        if price < Decimal::ZERO {
            return Err(DomainError::invalid_input("price cannot be negative"));
        }
        let min_stock_level = self.min_stock_level.unwrap_or(part.min_stock_level);
        if min_stock_level < 0 {
            return Err(DomainError::invalid_input("min_stock_level cannot be negative"));
        }

        part.sku = sku.to_string();
        part.name = name.to_string();
        if let Some(category) = self.category.as_deref().map(str::trim).filter(|c| !c.is_empty()) {
            part.category = category.to_string();
        }
        part.price = price;
        part.min_stock_level = min_stock_level;
        Ok(())
    }
}
