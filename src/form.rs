//! Subscription form: raw user text to a validated `OpenRequest`.
//!
//! Each field has its own parser so a UI can show messages next to the field that
//! caused them. Messages are the exact user-facing strings.

use crate::domain::{
    Address, Credential, Network, NetworkId, PubKeyHash, TimeMs, Value, LOVELACE_PER_ADA,
};
use crate::tx::OpenRequest;
use chrono::{DateTime, NaiveDateTime, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

pub const MS_PER_DAY: i64 = 86_400_000;
pub const MAX_ADA_DECIMALS: u32 = 6;
pub const DATE_FORMAT: &str = "%Y-%m-%d %H:%M";
const DEFAULT_INTERVAL_DAYS: &str = "30";
const DEFAULT_FIRST_WITHDRAWAL_DELAY_MS: i64 = 10 * 60 * 1_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FormField {
    Vendor,
    Funds,
    Price,
    Interval,
    FirstWithdrawal,
}

impl fmt::Display for FormField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FormField::Vendor => "vendor",
            FormField::Funds => "funds",
            FormField::Price => "price",
            FormField::Interval => "interval",
            FormField::FirstWithdrawal => "first withdrawal",
        };
        write!(f, "{}", name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[error("{field}: {message}")]
pub struct FieldError {
    pub field: FormField,
    pub message: &'static str,
}

impl FieldError {
    pub fn new(field: FormField, message: &'static str) -> Self {
        Self { field, message }
    }
}

/// Facts the form is validated against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FormContext {
    pub network: Network,
    pub balance_lovelace: u64,
    pub now: TimeMs,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionForm {
    pub vendor: String,
    pub funds: String,
    pub price: String,
    pub interval_days: String,
    pub first_withdrawal: String,
}

impl SubscriptionForm {
    /// Empty amounts, a 30 day interval and a first withdrawal ten minutes out.
    pub fn with_defaults(now: TimeMs) -> Self {
        Self {
            interval_days: DEFAULT_INTERVAL_DAYS.to_string(),
            first_withdrawal: format_date(now.plus_ms(DEFAULT_FIRST_WITHDRAWAL_DELAY_MS)),
            ..Self::default()
        }
    }

    /// Every field error, in field order.
    pub fn errors(&self, ctx: &FormContext) -> Vec<FieldError> {
        let checks = [
            parse_vendor(&self.vendor, ctx.network).err().map(|m| (FormField::Vendor, m)),
            parse_funds(&self.funds, ctx.balance_lovelace).err().map(|m| (FormField::Funds, m)),
            parse_ada(&self.price).err().map(|m| (FormField::Price, m)),
            parse_interval_days(&self.interval_days).err().map(|m| (FormField::Interval, m)),
            parse_date(&self.first_withdrawal, ctx.now)
                .err()
                .map(|m| (FormField::FirstWithdrawal, m)),
        ];
        checks
            .into_iter()
            .flatten()
            .map(|(field, message)| FieldError::new(field, message))
            .collect()
    }

    pub fn to_request(&self, ctx: &FormContext) -> Result<OpenRequest, FieldError> {
        let err = |field| move |message| FieldError::new(field, message);
        Ok(OpenRequest {
            vendor: parse_vendor(&self.vendor, ctx.network).map_err(err(FormField::Vendor))?,
            funds: Value::lovelace(
                parse_funds(&self.funds, ctx.balance_lovelace).map_err(err(FormField::Funds))?,
            ),
            price: Value::lovelace(parse_ada(&self.price).map_err(err(FormField::Price))?),
            interval_ms: parse_interval_days(&self.interval_days)
                .map_err(err(FormField::Interval))?,
            first_withdrawal: parse_date(&self.first_withdrawal, ctx.now)
                .map_err(err(FormField::FirstWithdrawal))?,
        })
    }
}

/// The form can only be opened by a wallet holding some Ada.
pub fn check_can_open(balance: &Value) -> Result<(), &'static str> {
    if balance.lovelace == 0 {
        return Err("wallet doesn't contain any Ada");
    }
    Ok(())
}

fn is_plain_decimal(s: &str) -> bool {
    let mut parts = s.splitn(2, '.');
    let whole = parts.next().unwrap_or("");
    let digits = |p: &str| !p.is_empty() && p.bytes().all(|b| b.is_ascii_digit());
    digits(whole) && parts.next().map_or(true, digits)
}

fn parse_decimal(s: &str) -> Result<Decimal, &'static str> {
    let s = s.trim();
    if let Some(rest) = s.strip_prefix('-') {
        if is_plain_decimal(rest) {
            return Err("can't be negative");
        }
    }
    if !is_plain_decimal(s) {
        return Err("invalid number");
    }
    Decimal::from_str(s).map_err(|_| "invalid number")
}

/// ADA amount with at most six decimals, as lovelace.
pub fn parse_ada(s: &str) -> Result<u64, &'static str> {
    let ada = parse_decimal(s)?;
    if ada.scale() > MAX_ADA_DECIMALS {
        return Err("too many decimal places (max 6)");
    }
    if ada.is_zero() {
        return Err("can't be zero");
    }
    ada.checked_mul(Decimal::from(LOVELACE_PER_ADA))
        .and_then(|l| l.to_u64())
        .ok_or("invalid number")
}

pub fn parse_funds(s: &str, balance_lovelace: u64) -> Result<u64, &'static str> {
    let lovelace = parse_ada(s)?;
    if lovelace > balance_lovelace {
        return Err("insufficient funds");
    }
    Ok(lovelace)
}

/// Interval in (possibly fractional) days, as whole milliseconds.
pub fn parse_interval_days(s: &str) -> Result<i64, &'static str> {
    let days = parse_decimal(s)?;
    if days.is_zero() {
        return Err("can't be zero");
    }
    let ms = days
        .checked_mul(Decimal::from(MS_PER_DAY))
        .map(|ms| ms.round())
        .and_then(|ms| ms.to_i64())
        .ok_or("invalid number")?;
    if ms == 0 {
        return Err("can't be zero");
    }
    Ok(ms)
}

/// `YYYY-MM-DD HH:MM` in UTC, not before `now`.
pub fn parse_date(s: &str, now: TimeMs) -> Result<TimeMs, &'static str> {
    let parsed = NaiveDateTime::parse_from_str(s.trim(), DATE_FORMAT).map_err(|_| "invalid date")?;
    let time = TimeMs::new(parsed.and_utc().timestamp_millis());
    if time < now {
        return Err("in past");
    }
    Ok(time)
}

pub fn format_date(time: TimeMs) -> String {
    DateTime::<Utc>::from_timestamp_millis(time.as_ms())
        .map(|dt| dt.format(DATE_FORMAT).to_string())
        .unwrap_or_default()
}

/// Vendor payment key from a bech32 address on the configured network.
pub fn parse_vendor(s: &str, network: Network) -> Result<PubKeyHash, &'static str> {
    let address = Address::from_bech32(s.trim()).map_err(|_| "invalid address")?;
    let pkh = match address.payment() {
        Credential::PubKey(pkh) => *pkh,
        Credential::Script(_) => return Err("not a regular payment address (script address)"),
    };
    if address.network() != network.id() {
        return Err(match network.id() {
            NetworkId::Testnet => "not a testnet address",
            NetworkId::Mainnet => "not a mainnet address",
        });
    }
    Ok(pkh)
}
