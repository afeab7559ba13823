//! Price and discount tables.
//!
//! Menjador charges temporary students a price per day that depends on how
//! many days they came, and refunds permanent students a flat amount per
//! absence. Acollida charges and refunds by rate type, and only refunds the
//! absences beyond a minimum.

use super::BillingError;
use crate::attendance::separator_byte;
use crate::models::Tool;
use anyhow::{Context, Result};
use csv::{ReaderBuilder, Trim};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::path::Path;
use tracing::{debug, warn};

/// Price per day for students who came more than `min_days` days.
#[derive(Debug, Clone, PartialEq)]
pub struct PriceTier {
    pub min_days: u32,
    pub price: f64,
}

/// Amount attached to a rate type.
#[derive(Debug, Clone, PartialEq)]
pub struct TypedRate {
    pub rate_type: String,
    pub amount: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ChargeRates {
    /// Sorted by `min_days`, highest first.
    Tiered(Vec<PriceTier>),
    /// Sorted by type.
    ByType(Vec<TypedRate>),
}

#[derive(Debug, Clone, PartialEq)]
pub enum RefundRates {
    /// Discount per absence; `None` when the table is empty.
    Flat(Option<f64>),
    /// Discount per absence beyond `min_days`, by type.
    ByType { rates: Vec<TypedRate>, min_days: u32 },
}

/// Effective rates for one billing run.
#[derive(Debug, Clone, PartialEq)]
pub struct Rates {
    pub charges: ChargeRates,
    pub refunds: RefundRates,
}

#[derive(Deserialize)]
struct TierRow {
    min_days: u32,
    price: String,
}

#[derive(Deserialize)]
struct TypedPriceRow {
    #[serde(rename = "type")]
    rate_type: String,
    price: String,
}

#[derive(Deserialize)]
struct FlatDiscountRow {
    discount: String,
}

#[derive(Deserialize)]
struct TypedDiscountRow {
    #[serde(rename = "type")]
    rate_type: String,
    discount: String,
}

impl Rates {
    /// Load the price and discount files for a tool.
    pub fn load(
        tool: Tool,
        prices: &Path,
        discounts: &Path,
        separator: char,
        min_days_to_discount: u32,
    ) -> Result<Self> {
        let prices_csv = std::fs::read_to_string(prices)
            .with_context(|| format!("Failed to read prices file: {}", prices.display()))?;
        let discounts_csv = std::fs::read_to_string(discounts)
            .with_context(|| format!("Failed to read discounts file: {}", discounts.display()))?;

        Self::parse(tool, &prices_csv, &discounts_csv, separator, min_days_to_discount)
    }

    /// Parse the price and discount tables from CSV content.
    pub fn parse(
        tool: Tool,
        prices_csv: &str,
        discounts_csv: &str,
        separator: char,
        min_days_to_discount: u32,
    ) -> Result<Self> {
        let rates = match tool {
            Tool::Menjador => {
                let mut tiers = Vec::new();
                for (row, entry) in read_rows::<TierRow>(prices_csv, separator, "prices")? {
                    tiers.push(PriceTier {
                        min_days: entry.min_days,
                        price: parse_amount(&entry.price, "prices", row)?,
                    });
                }
                tiers.sort_by(|a, b| b.min_days.cmp(&a.min_days));

                let flat = read_rows::<FlatDiscountRow>(discounts_csv, separator, "discounts")?
                    .into_iter()
                    .next()
                    .map(|(row, entry)| parse_amount(&entry.discount, "discounts", row))
                    .transpose()?;

                Rates {
                    charges: ChargeRates::Tiered(tiers),
                    refunds: RefundRates::Flat(flat),
                }
            }
            Tool::Acollida => {
                let mut prices = Vec::new();
                for (row, entry) in read_rows::<TypedPriceRow>(prices_csv, separator, "prices")? {
                    prices.push(TypedRate {
                        amount: parse_amount(&entry.price, "prices", row)?,
                        rate_type: entry.rate_type,
                    });
                }
                prices.sort_by(|a, b| a.rate_type.cmp(&b.rate_type));

                let mut discounts = Vec::new();
                for (row, entry) in
                    read_rows::<TypedDiscountRow>(discounts_csv, separator, "discounts")?
                {
                    discounts.push(TypedRate {
                        amount: parse_amount(&entry.discount, "discounts", row)?,
                        rate_type: entry.rate_type,
                    });
                }
                discounts.sort_by(|a, b| a.rate_type.cmp(&b.rate_type));

                Rates {
                    charges: ChargeRates::ByType(prices),
                    refunds: RefundRates::ByType {
                        rates: discounts,
                        min_days: min_days_to_discount,
                    },
                }
            }
        };

        if rates.charges.is_empty() {
            warn!("Price table is empty; temporary students will not be charged");
        }
        if rates.refunds.is_empty() {
            warn!("Discount table is empty; absences will not be refunded");
        }

        Ok(rates)
    }

    /// Apply a `KEY=AMOUNT` price override.
    pub fn override_charge(&mut self, entry: &str) -> Result<(), BillingError> {
        let (key, value) = split_override(entry)?;
        let key = key.ok_or_else(|| BillingError::InvalidOverride(entry.to_string()))?;
        let amount = parse_amount(value, "price override", 0)?;

        let slot = match &mut self.charges {
            ChargeRates::Tiered(tiers) => {
                let min_days: u32 = key
                    .parse()
                    .map_err(|_| BillingError::UnknownRateKey(key.to_string()))?;
                tiers
                    .iter_mut()
                    .find(|t| t.min_days == min_days)
                    .map(|t| &mut t.price)
            }
            ChargeRates::ByType(rates) => rates
                .iter_mut()
                .find(|r| r.rate_type == key)
                .map(|r| &mut r.amount),
        };

        let slot = slot.ok_or_else(|| BillingError::UnknownRateKey(key.to_string()))?;
        debug!("Price override {} -> {}", key, amount);
        *slot = amount;
        Ok(())
    }

    /// Apply a discount override: `AMOUNT` (flat) or `KEY=AMOUNT` (by type).
    pub fn override_refund(&mut self, entry: &str) -> Result<(), BillingError> {
        let (key, value) = split_override(entry)?;
        let amount = parse_amount(value, "discount override", 0)?;

        match &mut self.refunds {
            RefundRates::Flat(flat) => {
                if key.is_some() {
                    return Err(BillingError::InvalidOverride(entry.to_string()));
                }
                *flat = Some(amount);
            }
            RefundRates::ByType { rates, .. } => {
                let key = key.ok_or_else(|| BillingError::InvalidOverride(entry.to_string()))?;
                let rate = rates
                    .iter_mut()
                    .find(|r| r.rate_type == key)
                    .ok_or_else(|| BillingError::UnknownRateKey(key.to_string()))?;
                rate.amount = amount;
            }
        }
        debug!("Discount override {}", entry);
        Ok(())
    }

    /// Price per day for a temporary student; 0 when no rate applies.
    pub fn price_per_day(&self, present_days: u32, rate: Option<&str>) -> f64 {
        match &self.charges {
            ChargeRates::Tiered(tiers) => tiers
                .iter()
                .find(|t| present_days > t.min_days)
                .map(|t| t.price),
            ChargeRates::ByType(rates) => rate
                .and_then(|rate| rates.iter().find(|r| r.rate_type == rate))
                .map(|r| r.amount),
        }
        .unwrap_or(0.0)
    }

    /// Refundable days and discount per day for a permanent student.
    pub fn refund_per_day(&self, absent_days: u32, rate: Option<&str>) -> (u32, f64) {
        match &self.refunds {
            RefundRates::Flat(flat) => (absent_days, flat.unwrap_or(0.0)),
            RefundRates::ByType { rates, min_days } => {
                let amount = rate
                    .and_then(|rate| rates.iter().find(|r| r.rate_type == rate))
                    .map(|r| r.amount)
                    .unwrap_or(0.0);
                (absent_days.saturating_sub(*min_days), amount)
            }
        }
    }
}

impl ChargeRates {
    pub fn is_empty(&self) -> bool {
        match self {
            ChargeRates::Tiered(tiers) => tiers.is_empty(),
            ChargeRates::ByType(rates) => rates.is_empty(),
        }
    }
}

impl RefundRates {
    pub fn is_empty(&self) -> bool {
        match self {
            RefundRates::Flat(flat) => flat.is_none(),
            RefundRates::ByType { rates, .. } => rates.is_empty(),
        }
    }
}

/// Parse an amount written with either `.` or `,` as decimal separator.
pub fn parse_amount(value: &str, source_name: &str, row: usize) -> Result<f64, BillingError> {
    let invalid = || BillingError::InvalidAmount {
        source_name: source_name.to_string(),
        row,
        value: value.to_string(),
    };
    let amount: f64 = value.trim().replace(',', ".").parse().map_err(|_| invalid())?;
    if !amount.is_finite() || amount < 0.0 {
        return Err(invalid());
    }
    Ok(amount)
}

fn split_override(entry: &str) -> Result<(Option<&str>, &str), BillingError> {
    match entry.split_once('=') {
        Some((key, value)) if !key.trim().is_empty() => Ok((Some(key.trim()), value)),
        Some(_) => Err(BillingError::InvalidOverride(entry.to_string())),
        None => Ok((None, entry)),
    }
}

/// Deserialize every row of a rate table, with its line number.
fn read_rows<T: DeserializeOwned>(
    content: &str,
    separator: char,
    source_name: &str,
) -> Result<Vec<(usize, T)>> {
    let mut reader = ReaderBuilder::new()
        .delimiter(separator_byte(separator)?)
        .trim(Trim::All)
        .from_reader(content.as_bytes());

    let mut rows = Vec::new();
    for (index, result) in reader.deserialize::<T>().enumerate() {
        let line = index + 2;
        let row = result.with_context(|| format!("Invalid {} row {}", source_name, line))?;
        rows.push((line, row));
    }
    Ok(rows)
}
