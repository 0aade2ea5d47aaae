// 📈 Reports - Per-category totals and a monthly spending forecast
//
// Reports only ever see rows the caller could select, because they are fed
// from the policy-gated stores.
//
// Forecast model (per calendar month):
//   actual   = sum of amounts, months without expenses count as 0
//   trend    = ordinary least squares line over t = 0..n
//   mean     = trailing 3-month mean (fewer at the start)
//   fitted   = 0.6 * trend + 0.4 * mean
//   future   = 0.6 * extrapolated trend + 0.4 * mean of the last 3 actuals

use chrono::{Datelike, Months, NaiveDate};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

use crate::db::Ledger;
use crate::entities::{Category, Expense};
use crate::error::Result;
use crate::policy::Caller;

/// Weight of the linear trend in a forecast (the rest goes to the mean)
pub const TREND_WEIGHT: f64 = 0.6;

/// Trailing window of the moving mean, in months
pub const MEAN_WINDOW: usize = 3;

// ============================================================================
// CATEGORY TOTALS
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryTotal {
    /// Category name, `None` for uncategorized expenses
    pub category: Option<String>,
    pub total: Decimal,
    pub count: usize,
}

/// Sum expenses per category name, largest total first.
///
/// Categories sharing a name are merged. Expenses whose category is not in
/// `categories` count as uncategorized.
pub fn category_totals(categories: &[Category], expenses: &[Expense]) -> Vec<CategoryTotal> {
    let names: HashMap<i64, &str> = categories
        .iter()
        .map(|c| (c.id, c.name.as_str()))
        .collect();

    let mut grouped: BTreeMap<Option<String>, (Decimal, usize)> = BTreeMap::new();
    for expense in expenses {
        let name = expense
            .category_id
            .and_then(|id| names.get(&id))
            .map(|name| name.to_string());
        let entry = grouped.entry(name).or_insert((Decimal::ZERO, 0));
        entry.0 += expense.amount;
        entry.1 += 1;
    }

    let mut totals: Vec<CategoryTotal> = grouped
        .into_iter()
        .map(|(category, (total, count))| CategoryTotal {
            category,
            total,
            count,
        })
        .collect();

    // Stable sort keeps the name order for equal totals
    totals.sort_by(|a, b| b.total.cmp(&a.total));
    totals
}

// ============================================================================
// MONTHLY FORECAST
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonthlyTotal {
    /// First day of the month
    pub month: NaiveDate,
    pub total: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastPoint {
    /// First day of the month
    pub month: NaiveDate,
    /// Observed spending, `None` for future months
    pub actual: Option<f64>,
    pub forecast: f64,
}

impl ForecastPoint {
    pub fn is_future(&self) -> bool {
        self.actual.is_none()
    }
}

fn month_start(date: NaiveDate) -> NaiveDate {
    date.with_day(1).unwrap_or(date)
}

fn next_month(month: NaiveDate) -> NaiveDate {
    month
        .checked_add_months(Months::new(1))
        .unwrap_or(NaiveDate::MAX)
}

/// Total per calendar month from the first to the last month with
/// expenses, gaps filled with zero.
pub fn monthly_totals(expenses: &[Expense]) -> Vec<MonthlyTotal> {
    let mut sums: BTreeMap<NaiveDate, Decimal> = BTreeMap::new();
    for expense in expenses {
        *sums.entry(month_start(expense.date)).or_insert(Decimal::ZERO) += expense.amount;
    }

    let (Some(&first), Some(&last)) = (sums.keys().next(), sums.keys().next_back()) else {
        return Vec::new();
    };

    let mut totals = Vec::new();
    let mut month = first;
    while month <= last {
        totals.push(MonthlyTotal {
            month,
            total: sums.get(&month).copied().unwrap_or(Decimal::ZERO),
        });
        if month == NaiveDate::MAX {
            break;
        }
        month = next_month(month);
    }
    totals
}

/// Least squares fit of `y = slope * t + intercept` over `t = 0..n`.
///
/// A single point yields a flat line through it.
fn linear_fit(values: &[f64]) -> (f64, f64) {
    let n = values.len();
    if n == 0 {
        return (0.0, 0.0);
    }
    if n == 1 {
        return (0.0, values[0]);
    }

    let n_f = n as f64;
    let t_mean = (n_f - 1.0) / 2.0;
    let y_mean = values.iter().sum::<f64>() / n_f;

    let mut covariance = 0.0;
    let mut variance = 0.0;
    for (t, y) in values.iter().enumerate() {
        let dt = t as f64 - t_mean;
        covariance += dt * (y - y_mean);
        variance += dt * dt;
    }

    let slope = covariance / variance;
    (slope, y_mean - slope * t_mean)
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

fn blend(trend: f64, moving_mean: f64) -> f64 {
    TREND_WEIGHT * trend + (1.0 - TREND_WEIGHT) * moving_mean
}

/// Fitted values for every observed month followed by `months_ahead`
/// projected months. Empty input gives an empty forecast.
pub fn monthly_forecast(expenses: &[Expense], months_ahead: u32) -> Vec<ForecastPoint> {
    let totals = monthly_totals(expenses);
    if totals.is_empty() {
        return Vec::new();
    }

    let actuals: Vec<f64> = totals
        .iter()
        .map(|m| m.total.to_f64().unwrap_or(0.0))
        .collect();
    let (slope, intercept) = linear_fit(&actuals);

    let mut points: Vec<ForecastPoint> = totals
        .iter()
        .enumerate()
        .map(|(t, m)| {
            let window_start = (t + 1).saturating_sub(MEAN_WINDOW);
            let trailing_mean = mean(&actuals[window_start..=t]);
            let trend = slope * t as f64 + intercept;
            ForecastPoint {
                month: m.month,
                actual: Some(actuals[t]),
                forecast: blend(trend, trailing_mean),
            }
        })
        .collect();

    let tail_mean = mean(&actuals[actuals.len().saturating_sub(MEAN_WINDOW)..]);
    let last_t = actuals.len() - 1;
    let mut month = totals[last_t].month;

    for step in 1..=months_ahead as usize {
        month = next_month(month);
        let trend = slope * (last_t + step) as f64 + intercept;
        points.push(ForecastPoint {
            month,
            actual: None,
            forecast: blend(trend, tail_mean),
        });
    }

    points
}

// ============================================================================
// REPORT PERIOD
// ============================================================================

/// Length of the period shown when no bounds are given, in months
pub const DEFAULT_PERIOD_MONTHS: u32 = 3;

/// Fill in missing period bounds: `end` defaults to `today`, `start` to
/// `DEFAULT_PERIOD_MONTHS` before `end`.
pub fn default_period(
    start: Option<NaiveDate>,
    end: Option<NaiveDate>,
    today: NaiveDate,
) -> (NaiveDate, NaiveDate) {
    let end = end.unwrap_or(today);
    let start = start.unwrap_or_else(|| {
        end.checked_sub_months(Months::new(DEFAULT_PERIOD_MONTHS))
            .unwrap_or(NaiveDate::MIN)
    });
    (start, end)
}

// ============================================================================
// LEDGER SHORTCUTS
// ============================================================================

impl Ledger {
    /// Totals per category of the caller's expenses in `[start, end]`.
    pub fn category_totals(
        &self,
        caller: &Caller,
        start: Option<NaiveDate>,
        end: Option<NaiveDate>,
    ) -> Result<Vec<CategoryTotal>> {
        let categories = self.categories().list(caller)?;
        let expenses = self.expenses().list_between(caller, start, end)?;
        Ok(category_totals(&categories, &expenses))
    }

    /// Forecast over the caller's complete expense history.
    pub fn forecast(&self, caller: &Caller, months_ahead: u32) -> Result<Vec<ForecastPoint>> {
        let expenses = self.expenses().list(caller)?;
        let points = monthly_forecast(&expenses, months_ahead);
        tracing::debug!(%caller, points = points.len(), "forecast computed");
        Ok(points)
    }
}
