//! Finance records and the inputs used to create or change them.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::fmt;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct FundHistory {
    pub id: String,
    #[sqlx(rename = "code")]
    pub fund_code: String,
    #[sqlx(rename = "date")]
    pub record_date: String,
    pub nav: Option<f64>,
    pub nav_change: Option<f64>,
    pub nav_change_percent: Option<f64>,
    pub created_at: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct StockHistory {
    pub id: String,
    #[sqlx(rename = "code")]
    pub stock_code: String,
    #[sqlx(rename = "date")]
    pub record_date: String,
    #[sqlx(rename = "open")]
    pub open_price: Option<f64>,
    #[sqlx(rename = "high")]
    pub high_price: Option<f64>,
    #[sqlx(rename = "low")]
    pub low_price: Option<f64>,
    #[sqlx(rename = "close")]
    pub close_price: Option<f64>,
    pub volume: Option<i64>,
    pub amount: Option<f64>,
    pub created_at: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct FundDetail {
    pub id: String,
    #[sqlx(rename = "code")]
    pub fund_code: String,
    #[sqlx(rename = "name")]
    pub fund_name: Option<String>,
    pub full_name: Option<String>,
    pub fund_type: Option<String>,
    #[sqlx(rename = "establishment_date")]
    pub establish_date: Option<String>,
    pub asset_scale: Option<String>,
    pub tracking_target: Option<String>,
    pub nav: Option<f64>,
    pub nav_date: Option<String>,
    pub acc_nav: Option<f64>,
    pub acc_nav_date: Option<String>,
    pub estimated_nav: Option<f64>,
    pub estimated_nav_change_percent: Option<f64>,
    pub subscription_fee: Option<f64>,
    pub redemption_fee: Option<f64>,
    pub management_fee: Option<f64>,
    pub custodian_fee: Option<f64>,
    pub service_fee: Option<f64>,
    pub company: Option<String>,
    pub manager: Option<String>,
    pub custodian: Option<String>,
    pub purchase_status: Option<String>,
    pub redemption_status: Option<String>,
    pub risk_level: Option<String>,
    pub created_at: Option<String>,
    pub updated_at: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewFundHistory {
    pub fund_code: String,
    pub record_date: String,
    pub nav: f64,
    #[serde(default)]
    pub nav_change: Option<f64>,
    #[serde(default)]
    pub nav_change_percent: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewStockHistory {
    pub stock_code: String,
    pub record_date: String,
    pub close_price: f64,
    #[serde(default)]
    pub open_price: Option<f64>,
    #[serde(default)]
    pub high_price: Option<f64>,
    #[serde(default)]
    pub low_price: Option<f64>,
    #[serde(default)]
    pub volume: Option<i64>,
    #[serde(default)]
    pub amount: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NewFundDetail {
    pub fund_code: String,
    #[serde(default)]
    pub fund_name: Option<String>,
    #[serde(default)]
    pub fund_type: Option<String>,
    #[serde(default)]
    pub manager: Option<String>,
    #[serde(default)]
    pub establish_date: Option<String>,
    #[serde(default)]
    pub nav: Option<f64>,
}

/// Value bound into a column assignment.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Real(f64),
    Integer(i64),
    Text(String),
}

/// Column assignments an update is allowed to make.
pub trait ColumnUpdate {
    fn assignments(&self) -> Vec<(&'static str, FieldValue)>;
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FundHistoryUpdate {
    pub nav: Option<f64>,
    pub nav_change: Option<f64>,
    pub nav_change_percent: Option<f64>,
}

impl ColumnUpdate for FundHistoryUpdate {
    fn assignments(&self) -> Vec<(&'static str, FieldValue)> {
        [
            ("nav", self.nav),
            ("nav_change", self.nav_change),
            ("nav_change_percent", self.nav_change_percent),
        ]
        .into_iter()
        .filter_map(|(column, value)| value.map(|v| (column, FieldValue::Real(v))))
        .collect()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StockHistoryUpdate {
    pub open: Option<f64>,
    pub high: Option<f64>,
    pub low: Option<f64>,
    pub close: Option<f64>,
    pub volume: Option<i64>,
    pub amount: Option<f64>,
}

impl ColumnUpdate for StockHistoryUpdate {
    fn assignments(&self) -> Vec<(&'static str, FieldValue)> {
        let mut fields: Vec<(&'static str, FieldValue)> = [
            ("open", self.open),
            ("high", self.high),
            ("low", self.low),
            ("close", self.close),
        ]
        .into_iter()
        .filter_map(|(column, value)| value.map(|v| (column, FieldValue::Real(v))))
        .collect();

        if let Some(volume) = self.volume {
            fields.push(("volume", FieldValue::Integer(volume)));
        }
        if let Some(amount) = self.amount {
            fields.push(("amount", FieldValue::Real(amount)));
        }
        fields
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FundDetailUpdate {
    pub name: Option<String>,
    pub fund_type: Option<String>,
    pub manager: Option<String>,
    pub establishment_date: Option<String>,
    pub nav: Option<f64>,
}

impl ColumnUpdate for FundDetailUpdate {
    fn assignments(&self) -> Vec<(&'static str, FieldValue)> {
        let mut fields: Vec<(&'static str, FieldValue)> = [
            ("name", &self.name),
            ("fund_type", &self.fund_type),
            ("manager", &self.manager),
            ("establishment_date", &self.establishment_date),
        ]
        .into_iter()
        .filter_map(|(column, value)| value.clone().map(|v| (column, FieldValue::Text(v))))
        .collect();

        if let Some(nav) = self.nav {
            fields.push(("nav", FieldValue::Real(nav)));
        }
        fields
    }
}

/// Which history table a price series comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AssetKind {
    Fund,
    Stock,
}

impl fmt::Display for AssetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AssetKind::Fund => f.write_str("fund"),
            AssetKind::Stock => f.write_str("stock"),
        }
    }
}

/// Row counts per finance table.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FinanceStats {
    pub fund_history: i64,
    pub stock_history: i64,
    pub fund_details: i64,
}
