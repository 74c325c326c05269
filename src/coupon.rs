// Coupon types, discount math and the coupon-validation wire format

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::quote::{de_price, parse_price, ApiCar, CarQuote, TripDates};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CouponType {
    Code,
    FixedPerDay,
    PerDay,
    Days,
    FromTotal,
    Percentage,
    Other(String),
}

impl CouponType {
    /// Normalizes the type strings the backend has used over time.
    ///
    /// Legacy aliases (`per_total`, `percent`, `percent_off`, `fixed`) map onto
    /// their current names. Matching is case-insensitive and ignores
    /// surrounding whitespace.
    pub fn normalize(raw: &str) -> Self {
        match raw.trim().to_lowercase().as_str() {
            "code" => CouponType::Code,
            "fixed_per_day" => CouponType::FixedPerDay,
            "per_day" => CouponType::PerDay,
            "days" => CouponType::Days,
            "from_total" | "per_total" | "fixed" => CouponType::FromTotal,
            "percentage" | "percent" | "percent_off" => CouponType::Percentage,
            other => CouponType::Other(other.to_string()),
        }
    }

    pub fn is_recognized(&self) -> bool {
        !matches!(self, CouponType::Other(_))
    }
}

// `coupon` object attached to the car returned by `/coupons/validate`
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ApiCoupon {
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub discount_type: String,
    #[serde(default, deserialize_with = "de_price")]
    pub discount_deposit: f64,
    #[serde(default, deserialize_with = "de_price")]
    pub discount_casco: f64,
}

/// Discount values for both rate structures of a quote.
#[derive(Debug, Clone, PartialEq)]
pub struct CouponDiscount {
    pub kind: CouponType,
    pub standard: f64,
    pub deposit: f64,
}

impl From<&ApiCoupon> for CouponDiscount {
    fn from(coupon: &ApiCoupon) -> Self {
        CouponDiscount {
            kind: CouponType::normalize(&coupon.discount_type),
            standard: coupon.discount_deposit,
            deposit: coupon.discount_casco,
        }
    }
}

impl CouponDiscount {
    // Same flat amount off both totals
    pub fn flat(amount: f64) -> Self {
        CouponDiscount {
            kind: CouponType::FromTotal,
            standard: amount,
            deposit: amount,
        }
    }

    /// Returns a new quote with the discount applied and `code` recorded.
    pub fn apply(&self, quote: &CarQuote, code: &str) -> CarQuote {
        let (rate_standard_per_day, total_standard) = self.discount_structure(
            quote.rate_standard_per_day,
            quote.total_standard,
            quote.days,
            self.standard,
        );
        let (rate_deposit_per_day, total_with_deposit) = self.discount_structure(
            quote.rate_deposit_per_day,
            quote.total_with_deposit,
            quote.days,
            self.deposit,
        );

        CarQuote {
            rate_standard_per_day,
            rate_deposit_per_day,
            total_standard,
            total_with_deposit,
            ..quote.clone()
        }
        .with_coupon(code)
    }

    fn discount_structure(&self, rate: f64, total: f64, days: u32, value: f64) -> (f64, f64) {
        let value = if value.is_finite() { value.max(0.0) } else { 0.0 };
        let days = f64::from(days);

        let (rate, total) = match self.kind {
            CouponType::Percentage => {
                let factor = (1.0 - value / 100.0).clamp(0.0, 1.0);
                (rate * factor, total * factor)
            }
            CouponType::FixedPerDay | CouponType::PerDay => (rate - value, total - value * days),
            CouponType::Days => (rate, total - value.floor().min(days) * rate),
            CouponType::FromTotal => (rate, total - value),
            CouponType::Code | CouponType::Other(_) => (rate, total),
        };

        (round_cents(rate.max(0.0)), round_cents(total.max(0.0)))
    }
}

fn round_cents(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

// Request body for `/coupons/validate`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CouponValidationRequest {
    pub code: String,
    pub car_id: u64,
    pub start_date: String,
    pub end_date: String,
    pub price: f64,
    pub price_casco: f64,
    pub total_price: f64,
    pub total_price_casco: f64,
}

impl CouponValidationRequest {
    /// Prices are taken from `quote`, which must be the undiscounted quote.
    pub fn new(code: &str, quote: &CarQuote, trip: &TripDates) -> Self {
        CouponValidationRequest {
            code: code.to_string(),
            car_id: quote.car_id,
            start_date: trip.start_param(),
            end_date: trip.end_param(),
            price: quote.rate_standard_per_day,
            price_casco: quote.rate_deposit_per_day,
            total_price: quote.total_standard,
            total_price_casco: quote.total_with_deposit,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CouponValidationResponse {
    #[serde(default)]
    pub valid: bool,
    #[serde(default)]
    pub data: Option<ApiCar>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub amount: Option<Value>,
}

/// Outcome of a coupon validation, independent of the wire format.
#[derive(Debug, Clone, PartialEq)]
pub enum CouponVerdict {
    /// Fully priced quote carrying the coupon.
    Accepted(CarQuote),
    /// Server accepted the code but only sent a flat amount off the totals.
    AcceptedFlat { amount: f64 },
    Rejected { message: Option<String> },
}

impl CouponValidationResponse {
    pub fn into_verdict(self, code: &str) -> CouponVerdict {
        if !self.valid {
            return CouponVerdict::Rejected {
                message: self.message,
            };
        }

        match self.data {
            Some(car) => {
                let discount = car.coupon.as_ref().map(CouponDiscount::from);
                let quote = CarQuote::from(car);
                let discounted = match discount {
                    Some(discount) => discount.apply(&quote, code),
                    None => quote.with_coupon(code),
                };
                CouponVerdict::Accepted(discounted)
            }
            None => CouponVerdict::AcceptedFlat {
                amount: self.amount.as_ref().map(parse_price).unwrap_or(0.0),
            },
        }
    }
}
