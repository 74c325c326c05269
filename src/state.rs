// Mutable checkout state shared by the session and the discount coordinator

use serde::Serialize;
use std::collections::BTreeMap;
use thiserror::Error;

use crate::price_engine::{PriceBreakdown, PriceEngine};
use crate::quote::{CarQuote, ExtraService, TripDates};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum DiscountStatus {
    #[default]
    None,
    Validating,
    Applied,
    Invalid,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct DiscountSession {
    pub code: Option<String>,
    pub status: DiscountStatus,
    /// Quote as it was before the discount. Present only while `Applied`.
    pub original_quote_snapshot: Option<CarQuote>,
    /// User-facing outcome of the last validation.
    pub message: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BookingState {
    pub trip: TripDates,
    pub deposit_preference: bool,
    pub selected_quote: CarQuote,
    pub selected_extras: BTreeMap<u64, ExtraService>,
}

impl BookingState {
    pub fn new(trip: TripDates, quote: CarQuote) -> Self {
        Self {
            trip,
            deposit_preference: false,
            selected_quote: quote,
            selected_extras: BTreeMap::new(),
        }
    }

    pub fn totals(&self) -> PriceBreakdown {
        PriceEngine::compute(
            Some(&self.selected_quote),
            self.deposit_preference,
            self.selected_extras.values(),
        )
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum InvariantViolation {
    #[error("applied coupon {expected:?} but quote carries {actual:?}")]
    CouponMismatch {
        expected: Option<String>,
        actual: Option<String>,
    },

    #[error("snapshot presence does not match discount status {0:?}")]
    SnapshotWithoutApplied(DiscountStatus),

    #[error("trip end is not after its start")]
    EmptyTrip,
}

/// Everything a checkout mutates, guarded as one record.
#[derive(Debug, Clone)]
pub struct CheckoutState {
    pub booking: BookingState,
    pub discount: DiscountSession,
    // Dates the current quote was priced for
    pub(crate) quoted_trip: TripDates,
    pub(crate) quote_generation: u64,
    pub(crate) quote_revision: u64,
    pub(crate) discount_generation: u64,
}

impl CheckoutState {
    pub fn new(booking: BookingState) -> Self {
        Self {
            quoted_trip: booking.trip,
            booking,
            discount: DiscountSession::default(),
            quote_generation: 0,
            quote_revision: 0,
            discount_generation: 0,
        }
    }

    pub(crate) fn replace_quote(&mut self, quote: CarQuote) {
        self.booking.selected_quote = quote;
        self.quote_revision += 1;
    }

    pub fn check_invariants(&self) -> Result<(), InvariantViolation> {
        let applied = self.discount.status == DiscountStatus::Applied;

        if applied && !self.booking.selected_quote.carries_coupon(self.discount.code.as_deref()) {
            return Err(InvariantViolation::CouponMismatch {
                expected: self.discount.code.clone(),
                actual: self.booking.selected_quote.applied_coupon_code.clone(),
            });
        }
        if applied != self.discount.original_quote_snapshot.is_some() {
            return Err(InvariantViolation::SnapshotWithoutApplied(self.discount.status));
        }
        if self.booking.trip.end <= self.booking.trip.start {
            return Err(InvariantViolation::EmptyTrip);
        }
        Ok(())
    }

    pub fn view(&self) -> BookingView {
        BookingView {
            booking: self.booking.clone(),
            discount: self.discount.clone(),
            totals: self.booking.totals(),
        }
    }
}

/// Read-only copy of the checkout for rendering.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BookingView {
    pub booking: BookingState,
    pub discount: DiscountSession,
    pub totals: PriceBreakdown,
}
