// Car quotes, extras and the server car payload they are parsed from

use chrono::NaiveDateTime;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::coupon::ApiCoupon;

// Wire format for trip dates on both collaborator endpoints
pub const DATE_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

/// A priced, dated offer for one car. Replaced wholesale, never edited in place.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct CarQuote {
    pub car_id: u64,
    /// Server-authoritative rental day count.
    pub days: u32,
    pub rate_standard_per_day: f64,
    pub rate_deposit_per_day: f64,
    pub total_standard: f64,
    pub total_with_deposit: f64,
    pub deposit_amount: f64,
    pub applied_coupon_code: Option<String>,
}

impl CarQuote {
    pub fn carries_coupon(&self, code: Option<&str>) -> bool {
        self.applied_coupon_code.as_deref() == code
    }

    pub fn with_coupon(mut self, code: &str) -> Self {
        self.applied_coupon_code = Some(code.to_string());
        self
    }
}

// Catalog entry for an optional service (child seat, full insurance, ...)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtraService {
    pub id: u64,
    pub name: String,
    pub price: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TripDates {
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
}

impl TripDates {
    /// Returns `None` unless `end` is strictly after `start`.
    pub fn new(start: NaiveDateTime, end: NaiveDateTime) -> Option<Self> {
        (end > start).then_some(Self { start, end })
    }

    // Client-side estimate, ceil of elapsed 24h periods. Advisory only.
    pub fn advisory_days(&self) -> u32 {
        const MINUTES_PER_DAY: i64 = 24 * 60;
        let minutes = (self.end - self.start).num_minutes().max(0);
        ((minutes + MINUTES_PER_DAY - 1) / MINUTES_PER_DAY) as u32
    }

    pub fn start_param(&self) -> String {
        self.start.format(DATE_FORMAT).to_string()
    }

    pub fn end_param(&self) -> String {
        self.end.format(DATE_FORMAT).to_string()
    }
}

/// Reads a money value sent either as a JSON number or a string.
///
/// Plain decimal strings are taken as-is. Anything else is read in the
/// storefront's European notation, where `.` groups thousands and `,` is the
/// decimal point (`"1.234,50"` is 1234.5). Unreadable input is 0.
pub fn parse_price(raw: &Value) -> f64 {
    match raw {
        Value::Number(n) => n.as_f64().filter(|v| v.is_finite()).unwrap_or(0.0),
        Value::String(s) => parse_price_str(s),
        _ => 0.0,
    }
}

fn parse_price_str(raw: &str) -> f64 {
    let trimmed = raw.trim();
    if let Ok(value) = trimmed.parse::<f64>() {
        return if value.is_finite() { value } else { 0.0 };
    }

    let run: String = trimmed
        .chars()
        .skip_while(|c| !(c.is_ascii_digit() || *c == '.' || *c == ','))
        .take_while(|c| c.is_ascii_digit() || *c == '.' || *c == ',')
        .collect();
    if run.is_empty() {
        return 0.0;
    }

    let normalized = run.replace('.', "").replacen(',', ".", 1);
    normalized
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .unwrap_or(0.0)
}

pub(crate) fn de_price<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Value::deserialize(deserializer)?;
    Ok(parse_price(&raw))
}

pub(crate) fn de_days<'de, D>(deserializer: D) -> Result<u32, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Value::deserialize(deserializer)?;
    let days = parse_price(&raw).round();
    Ok(if days > 0.0 { days as u32 } else { 0 })
}

// Car payload from `/front/cars/booking` and the `data` of `/coupons/validate`
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ApiCar {
    pub id: u64,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default, deserialize_with = "de_price")]
    pub rental_rate: f64,
    #[serde(default, deserialize_with = "de_price")]
    pub rental_rate_casco: f64,
    #[serde(default, deserialize_with = "de_days")]
    pub days: u32,
    #[serde(default, deserialize_with = "de_price")]
    pub deposit: f64,
    #[serde(default, deserialize_with = "de_price")]
    pub total_deposit: f64,
    #[serde(default, deserialize_with = "de_price")]
    pub total_without_deposit: f64,
    #[serde(default)]
    pub coupon: Option<ApiCoupon>,
}

impl From<ApiCar> for CarQuote {
    fn from(car: ApiCar) -> Self {
        CarQuote {
            car_id: car.id,
            days: car.days,
            rate_standard_per_day: car.rental_rate,
            rate_deposit_per_day: car.rental_rate_casco,
            total_standard: car.total_without_deposit,
            total_with_deposit: car.total_deposit,
            deposit_amount: car.deposit,
            applied_coupon_code: car.coupon.and_then(|c| c.code),
        }
    }
}

// `{data: car}`, `{data: [car, ...]}` or a bare car
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum CarEnvelope {
    Wrapped { data: OneOrMany },
    Bare(ApiCar),
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum OneOrMany {
    One(ApiCar),
    Many(Vec<ApiCar>),
}

impl CarEnvelope {
    pub fn into_car(self) -> Option<ApiCar> {
        match self {
            CarEnvelope::Wrapped {
                data: OneOrMany::One(car),
            }
            | CarEnvelope::Bare(car) => Some(car),
            CarEnvelope::Wrapped {
                data: OneOrMany::Many(cars),
            } => cars.into_iter().next(),
        }
    }
}
