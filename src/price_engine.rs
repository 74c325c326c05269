// Checkout total computation
//
// Totals are always derived from the current quote, deposit preference and
// extras. Nothing here is cached between calls.

use serde::Serialize;

use crate::quote::{CarQuote, ExtraService};

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct PriceBreakdown {
    pub base_total: f64,
    pub extras_total: f64,
    pub grand_total: f64,
}

pub struct PriceEngine;

impl PriceEngine {
    /// Computes the rental total for `quote` under the given deposit
    /// preference, plus the selected extras.
    ///
    /// A missing quote prices the rental at zero. Non-finite or negative
    /// amounts count as zero, so the result is always a valid total.
    pub fn compute<'a, I>(
        quote: Option<&CarQuote>,
        deposit_preference: bool,
        extras: I,
    ) -> PriceBreakdown
    where
        I: IntoIterator<Item = &'a ExtraService>,
    {
        let base_total = quote
            .map(|q| {
                if deposit_preference {
                    q.total_with_deposit
                } else {
                    q.total_standard
                }
            })
            .map(sanitize)
            .unwrap_or(0.0);

        let extras_total: f64 = extras.into_iter().map(|e| sanitize(e.price)).sum();

        PriceBreakdown {
            base_total,
            extras_total,
            grand_total: base_total + extras_total,
        }
    }
}

fn sanitize(amount: f64) -> f64 {
    if amount.is_finite() && amount > 0.0 {
        amount
    } else {
        0.0
    }
}
