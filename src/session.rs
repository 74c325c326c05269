// Checkout orchestration: trip mutations, quote refresh and discount wiring

use chrono::NaiveDateTime;
use parking_lot::Mutex;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::api::{ApiError, CarSyncService, CouponValidator};
use crate::discount::DiscountCoordinator;
use crate::persistence::DiscountStore;
use crate::price_engine::PriceBreakdown;
use crate::quote::{CarQuote, ExtraService, TripDates};
use crate::state::{BookingState, BookingView, CheckoutState, DiscountSession, InvariantViolation};

// Caller-facing validation errors. Collaborator failures never surface here.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum BookingError {
    #[error("Invalid trip dates: end {end} must be after start {start}")]
    InvalidDates {
        start: NaiveDateTime,
        end: NaiveDateTime,
    },

    #[error("Discount code is empty")]
    EmptyDiscountCode,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub quote_timeout_ms: u64,
    pub coupon_timeout_ms: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            quote_timeout_ms: 10_000,
            coupon_timeout_ms: 10_000,
        }
    }
}

/// What happened to a date change's quote refresh.
#[derive(Debug, Clone, PartialEq)]
pub enum QuoteRefresh {
    Applied,
    /// Same dates as before, nothing fetched.
    Unchanged,
    /// A newer date change was issued while this one was in flight.
    Stale,
    /// The refresh failed; the last good quote and its dates were kept.
    KeptPrevious { reason: String },
}

pub struct Collaborators {
    pub car_sync: Arc<dyn CarSyncService>,
    pub coupons: Arc<dyn CouponValidator>,
    pub store: Arc<dyn DiscountStore>,
}

/// One customer's checkout. Every mutation goes through a single lock on the
/// checkout state; collaborator calls run with the lock released.
pub struct BookingSession {
    session_id: String,
    config: SessionConfig,
    car_sync: Arc<dyn CarSyncService>,
    discounts: DiscountCoordinator,
    state: Mutex<CheckoutState>,
}

impl BookingSession {
    /// Starts a checkout for the car chosen on the search results.
    pub fn new(
        session_id: impl Into<String>,
        start: NaiveDateTime,
        end: NaiveDateTime,
        quote: CarQuote,
        collaborators: Collaborators,
        config: SessionConfig,
    ) -> Result<Self, BookingError> {
        let trip = TripDates::new(start, end).ok_or(BookingError::InvalidDates { start, end })?;
        let session_id = session_id.into();
        let discounts = DiscountCoordinator::new(
            collaborators.coupons,
            collaborators.store,
            &session_id,
            Duration::from_millis(config.coupon_timeout_ms),
        );

        info!(session = %session_id, car_id = quote.car_id, "checkout started");
        Ok(Self {
            session_id,
            config,
            car_sync: collaborators.car_sync,
            discounts,
            state: Mutex::new(CheckoutState::new(BookingState::new(trip, quote))),
        })
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Changes the trip dates and refreshes the quote for them.
    ///
    /// Only the most recent date change can land: a response for an older
    /// change is discarded. An applied coupon is validated again for the new
    /// dates before this returns.
    pub async fn set_dates(
        &self,
        start: NaiveDateTime,
        end: NaiveDateTime,
    ) -> Result<QuoteRefresh, BookingError> {
        let trip = TripDates::new(start, end).ok_or(BookingError::InvalidDates { start, end })?;

        let (generation, car_id) = {
            let mut st = self.state.lock();
            if st.booking.trip == trip {
                return Ok(QuoteRefresh::Unchanged);
            }
            st.booking.trip = trip;
            st.quote_generation += 1;
            (st.quote_generation, st.booking.selected_quote.car_id)
        };
        debug!(
            session = %self.session_id,
            generation,
            advisory_days = trip.advisory_days(),
            "refreshing quote"
        );

        let fetched = self.fetch_quote(car_id, trip).await;

        let pending = {
            let mut st = self.state.lock();
            if st.quote_generation != generation {
                debug!(session = %self.session_id, generation, "discarding stale quote");
                return Ok(QuoteRefresh::Stale);
            }

            match fetched {
                Ok(quote) => {
                    st.quoted_trip = trip;
                    self.discounts.reconcile_after_quote_replaced(&mut st, quote)
                }
                Err(e) => {
                    warn!(
                        session = %self.session_id,
                        error = %e,
                        "quote refresh failed, keeping last quote"
                    );
                    st.booking.trip = st.quoted_trip;
                    return Ok(QuoteRefresh::KeptPrevious {
                        reason: e.to_string(),
                    });
                }
            }
        };

        if let Some(pending) = pending {
            self.discounts.resume(pending, &self.state).await;
        }
        Ok(QuoteRefresh::Applied)
    }

    pub fn set_deposit_preference(&self, with_deposit: bool) -> PriceBreakdown {
        let mut st = self.state.lock();
        st.booking.deposit_preference = with_deposit;
        st.booking.totals()
    }

    // Adds the extra if absent, removes it otherwise
    pub fn toggle_extra(&self, service: ExtraService) -> PriceBreakdown {
        let mut st = self.state.lock();
        let extras = &mut st.booking.selected_extras;
        if extras.remove(&service.id).is_none() {
            extras.insert(service.id, service);
        }
        st.booking.totals()
    }

    pub async fn apply_discount(&self, code: &str) -> Result<DiscountSession, BookingError> {
        let code = code.trim();
        if code.is_empty() {
            return Err(BookingError::EmptyDiscountCode);
        }
        Ok(self.discounts.validate(code, &self.state).await)
    }

    pub fn remove_discount(&self) -> DiscountSession {
        self.discounts.remove(&mut self.state.lock())
    }

    pub fn edit_discount_code(&self) -> DiscountSession {
        self.discounts.clear_rejection(&mut self.state.lock())
    }

    /// Restores a discount persisted by an earlier session with the same id.
    pub fn restore_discount(&self) -> DiscountSession {
        self.discounts.restore(&mut self.state.lock())
    }

    /// Switches to a different car. Drops any discount and ignores refreshes
    /// still in flight for the previous car.
    pub fn select_car(&self, quote: CarQuote) -> PriceBreakdown {
        let mut st = self.state.lock();
        info!(session = %self.session_id, car_id = quote.car_id, "car changed");
        st.quote_generation += 1;
        self.discounts.reset(&mut st);
        st.replace_quote(quote);
        st.quoted_trip = st.booking.trip;
        st.booking.totals()
    }

    pub fn total(&self) -> PriceBreakdown {
        self.state.lock().booking.totals()
    }

    pub fn discount(&self) -> DiscountSession {
        self.state.lock().discount.clone()
    }

    pub fn view(&self) -> BookingView {
        self.state.lock().view()
    }

    pub fn check_invariants(&self) -> Result<(), InvariantViolation> {
        self.state.lock().check_invariants()
    }

    async fn fetch_quote(&self, car_id: u64, trip: TripDates) -> Result<CarQuote, ApiError> {
        let timeout = Duration::from_millis(self.config.quote_timeout_ms);
        match tokio::time::timeout(timeout, self.car_sync.fetch_quote(car_id, trip)).await {
            Ok(result) => result,
            Err(_) => Err(ApiError::Timeout(self.config.quote_timeout_ms)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::mock_api::{MockCarSync, MockCouponValidator, RateCardBackend};
    use crate::coupon::{CouponDiscount, CouponType, CouponVerdict};
    use crate::persistence::MemoryDiscountStore;
    use crate::price_engine::PriceEngine;
    use crate::state::DiscountStatus;
    use chrono::NaiveDate;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};
    use std::collections::HashMap;
    use tokio_test::{assert_err, assert_ok};

    const CAR: u64 = 42;

    fn day(d: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2030, 8, d)
            .unwrap()
            .and_hms_opt(10, 0, 0)
            .unwrap()
    }

    fn quote_for(days: u32) -> CarQuote {
        CarQuote {
            car_id: CAR,
            days,
            rate_standard_per_day: 100.0,
            rate_deposit_per_day: 80.0,
            total_standard: 100.0 * f64::from(days),
            total_with_deposit: 80.0 * f64::from(days),
            deposit_amount: 500.0,
            applied_coupon_code: None,
        }
    }

    fn extra(id: u64, price: f64) -> ExtraService {
        ExtraService {
            id,
            name: format!("extra-{}", id),
            price,
        }
    }

    struct Harness {
        session: Arc<BookingSession>,
        car_sync: Arc<MockCarSync>,
        coupons: Arc<MockCouponValidator>,
        store: Arc<MemoryDiscountStore>,
    }

    fn harness() -> Harness {
        let car_sync = Arc::new(MockCarSync::new());
        let coupons = Arc::new(MockCouponValidator::new());
        let store = Arc::new(MemoryDiscountStore::new());
        let session = BookingSession::new(
            "session-1",
            day(1),
            day(4),
            quote_for(3),
            Collaborators {
                car_sync: car_sync.clone(),
                coupons: coupons.clone(),
                store: store.clone(),
            },
            SessionConfig::default(),
        )
        .unwrap();

        Harness {
            session: Arc::new(session),
            car_sync,
            coupons,
            store,
        }
    }

    fn wheel10(quote: &CarQuote) -> CarQuote {
        CouponDiscount {
            kind: CouponType::FromTotal,
            standard: 10.0,
            deposit: 10.0,
        }
        .apply(quote, "WHEEL10")
    }

    #[test]
    fn test_config_fills_missing_fields() {
        let config: SessionConfig = serde_json::from_str(r#"{"quote_timeout_ms": 2500}"#).unwrap();
        assert_eq!(config.quote_timeout_ms, 2500);
        assert_eq!(config.coupon_timeout_ms, 10_000);
    }

    #[tokio::test]
    async fn test_flat_coupon_scenario() {
        let h = harness();
        assert_eq!(h.session.total().base_total, 300.0);

        h.coupons
            .script
            .push_ok(CouponVerdict::Accepted(wheel10(&quote_for(3))));
        let session = assert_ok!(h.session.apply_discount(" WHEEL10 ").await);

        assert_eq!(session.status, DiscountStatus::Applied);
        let view = h.session.view();
        assert_eq!(view.booking.selected_quote.total_standard, 290.0);
        assert_eq!(view.totals.grand_total, 290.0);
        assert_eq!(h.session.check_invariants(), Ok(()));
    }

    #[tokio::test]
    async fn test_apply_then_remove_restores_quote() {
        let h = harness();
        let before = h.session.view().booking.selected_quote;
        h.coupons
            .script
            .push_ok(CouponVerdict::Accepted(wheel10(&quote_for(3))));

        h.session.apply_discount("WHEEL10").await.unwrap();
        let session = h.session.remove_discount();

        assert_eq!(session.status, DiscountStatus::None);
        assert_eq!(h.session.view().booking.selected_quote, before);
        assert!(h.store.is_empty());
    }

    #[tokio::test]
    async fn test_empty_code_is_a_validation_error() {
        let h = harness();
        let error = assert_err!(h.session.apply_discount("   ").await);
        assert_eq!(error, BookingError::EmptyDiscountCode);
        assert_eq!(h.coupons.script.call_count(), 0);
    }

    #[tokio::test]
    async fn test_local_changes_do_not_refetch() {
        let h = harness();

        let totals = h.session.set_deposit_preference(true);
        assert_eq!(totals.base_total, 240.0);

        let totals = h.session.toggle_extra(extra(1, 25.0));
        assert_eq!(totals.grand_total, 265.0);
        let totals = h.session.toggle_extra(extra(2, 10.0));
        assert_eq!(totals.grand_total, 275.0);
        let totals = h.session.toggle_extra(extra(1, 25.0));
        assert_eq!(totals.grand_total, 250.0);

        assert!(h.car_sync.requests.lock().is_empty());
        let view = h.session.view();
        assert_eq!(
            view.totals,
            PriceEngine::compute(
                Some(&view.booking.selected_quote),
                true,
                view.booking.selected_extras.values()
            )
        );
    }

    #[tokio::test]
    async fn test_invalid_dates_leave_state_unchanged() {
        let h = harness();
        let before = h.session.view();

        let error = assert_err!(h.session.set_dates(day(6), day(6)).await);
        assert_eq!(
            error,
            BookingError::InvalidDates {
                start: day(6),
                end: day(6)
            }
        );
        assert_err!(h.session.set_dates(day(6), day(2)).await);

        assert_eq!(h.session.view(), before);
        assert!(h.car_sync.requests.lock().is_empty());
    }

    #[tokio::test]
    async fn test_same_dates_do_not_refetch() {
        let h = harness();
        let refresh = assert_ok!(h.session.set_dates(day(1), day(4)).await);
        assert_eq!(refresh, QuoteRefresh::Unchanged);
        assert!(h.car_sync.requests.lock().is_empty());
    }

    #[tokio::test]
    async fn test_new_dates_use_server_day_count() {
        let h = harness();
        h.car_sync.script.push_ok(quote_for(5));

        let refresh = assert_ok!(h.session.set_dates(day(1), day(6)).await);

        assert_eq!(refresh, QuoteRefresh::Applied);
        let trip = TripDates::new(day(1), day(6)).unwrap();
        assert_eq!(h.car_sync.requests.lock()[0], (CAR, trip));
        let view = h.session.view();
        assert_eq!(view.booking.selected_quote.days, 5);
        assert_eq!(view.totals.grand_total, 500.0);
    }

    #[tokio::test]
    async fn test_local_changes_land_while_refresh_in_flight() {
        let h = harness();
        let gate = h.car_sync.script.push_gated();
        let session = &h.session;
        let script = &h.car_sync.script;

        let local = async move {
            script.wait_for_calls(1).await;
            let totals = session.set_deposit_preference(true);
            assert_eq!(totals.base_total, 240.0);
            gate.send(Ok(quote_for(5))).unwrap();
        };
        let (refresh, ()) = futures::join!(session.set_dates(day(1), day(6)), local);

        assert_eq!(refresh, Ok(QuoteRefresh::Applied));
        let view = h.session.view();
        assert!(view.booking.deposit_preference);
        assert_eq!(view.totals.base_total, 400.0);
        assert_eq!(h.car_sync.requests.lock().len(), 1);
    }

    #[tokio::test]
    async fn test_last_issued_fetch_wins() {
        let h = harness();
        let gate_a = h.car_sync.script.push_gated();
        let gate_b = h.car_sync.script.push_gated();

        let first = {
            let session = h.session.clone();
            tokio::spawn(async move { session.set_dates(day(1), day(6)).await })
        };
        h.car_sync.script.wait_for_calls(1).await;
        let second = {
            let session = h.session.clone();
            tokio::spawn(async move { session.set_dates(day(1), day(8)).await })
        };
        h.car_sync.script.wait_for_calls(2).await;

        // B resolves before A
        gate_b.send(Ok(quote_for(7))).unwrap();
        assert_eq!(second.await.unwrap(), Ok(QuoteRefresh::Applied));
        gate_a.send(Ok(quote_for(5))).unwrap();
        assert_eq!(first.await.unwrap(), Ok(QuoteRefresh::Stale));

        let view = h.session.view();
        assert_eq!(view.booking.selected_quote, quote_for(7));
        assert_eq!(view.booking.trip, TripDates::new(day(1), day(8)).unwrap());
    }

    #[tokio::test]
    async fn test_failed_refresh_keeps_last_good_quote() {
        let h = harness();
        let before = h.session.view();
        h.car_sync
            .script
            .push_err(ApiError::NetworkError("connection refused".to_string()));

        let refresh = assert_ok!(h.session.set_dates(day(2), day(9)).await);

        assert!(matches!(refresh, QuoteRefresh::KeptPrevious { .. }));
        assert_eq!(h.session.view(), before);
    }

    #[tokio::test(start_paused = true)]
    async fn test_refresh_timeout_keeps_last_good_quote() {
        let h = harness();
        h.car_sync.script.push_hang();

        let refresh = assert_ok!(h.session.set_dates(day(2), day(9)).await);

        assert_eq!(
            refresh,
            QuoteRefresh::KeptPrevious {
                reason: ApiError::Timeout(10_000).to_string()
            }
        );
        assert_eq!(h.session.view().booking.selected_quote, quote_for(3));
        assert_eq!(h.session.view().booking.trip.end, day(4));
    }

    #[tokio::test]
    async fn test_coupon_dropped_by_new_dates_goes_invalid() {
        let h = harness();
        h.coupons
            .script
            .push_ok(CouponVerdict::Accepted(wheel10(&quote_for(3))));
        h.session.apply_discount("WHEEL10").await.unwrap();
        let discounted_total = h.session.total();
        assert_eq!(discounted_total.grand_total, 290.0);

        h.car_sync.script.push_ok(quote_for(9));
        let gate = h.coupons.script.push_gated();

        let task = {
            let session = h.session.clone();
            tokio::spawn(async move { session.set_dates(day(1), day(10)).await })
        };
        h.coupons.script.wait_for_calls(2).await;

        // while revalidating the price shown is the server quote for the new dates
        let during = h.session.view();
        assert_eq!(during.discount.status, DiscountStatus::Validating);
        assert!(during.discount.original_quote_snapshot.is_none());
        assert_eq!(during.booking.selected_quote, quote_for(9));
        assert_eq!(during.totals.grand_total, 900.0);
        assert_eq!(h.session.check_invariants(), Ok(()));

        gate.send(Ok(CouponVerdict::Rejected {
            message: Some("Coupon expired for these dates".to_string()),
        }))
        .unwrap();
        assert_eq!(task.await.unwrap(), Ok(QuoteRefresh::Applied));

        let after = h.session.view();
        assert_eq!(after.discount.status, DiscountStatus::Invalid);
        assert_eq!(
            after.discount.message.as_deref(),
            Some("Coupon expired for these dates")
        );
        assert_eq!(after.totals, during.totals);
        assert!(h.store.is_empty());

        let session = h.session.edit_discount_code();
        assert_eq!(session.status, DiscountStatus::None);
    }

    #[tokio::test]
    async fn test_coupon_carried_by_refresh_is_revalidated_for_new_dates() {
        let h = harness();
        h.coupons
            .script
            .push_ok(CouponVerdict::Accepted(wheel10(&quote_for(3))));
        h.session.apply_discount("WHEEL10").await.unwrap();

        h.car_sync.script.push_ok(wheel10(&quote_for(5)));
        h.coupons
            .script
            .push_ok(CouponVerdict::Accepted(wheel10(&quote_for(5))));
        let refresh = h.session.set_dates(day(1), day(6)).await;
        assert_eq!(refresh, Ok(QuoteRefresh::Applied));

        let revalidation = h.coupons.requests.lock()[1].clone();
        assert_eq!(revalidation.end_date, "2030-08-06T10:00:00");
        assert_eq!(h.session.discount().status, DiscountStatus::Applied);
        assert_eq!(h.session.check_invariants(), Ok(()));

        h.session.remove_discount();
        let view = h.session.view();
        assert_eq!(view.booking.selected_quote.days, 5);
        assert_eq!(
            view.booking.selected_quote.days,
            view.booking.trip.advisory_days()
        );
    }

    #[tokio::test]
    async fn test_coupon_applied_during_failed_refresh_matches_kept_dates() {
        let h = harness();
        let gate = h.car_sync.script.push_gated();
        let refresh = {
            let session = h.session.clone();
            tokio::spawn(async move { session.set_dates(day(1), day(20)).await })
        };
        h.car_sync.script.wait_for_calls(1).await;

        h.coupons
            .script
            .push_ok(CouponVerdict::Accepted(wheel10(&quote_for(3))));
        let session = h.session.apply_discount("WHEEL10").await.unwrap();
        assert_eq!(session.status, DiscountStatus::Applied);

        // priced for the dates of the quote on screen, not the pending ones
        let request = h.coupons.requests.lock()[0].clone();
        assert_eq!(request.end_date, "2030-08-04T10:00:00");
        assert_eq!(request.total_price, 300.0);

        gate.send(Err(ApiError::NetworkError("connection reset".to_string())))
            .unwrap();
        assert!(matches!(
            refresh.await.unwrap(),
            Ok(QuoteRefresh::KeptPrevious { .. })
        ));

        let view = h.session.view();
        assert_eq!(view.booking.trip.end, day(4));
        assert_eq!(view.discount.status, DiscountStatus::Applied);
        assert_eq!(view.booking.selected_quote.total_standard, 290.0);
        assert_eq!(h.session.check_invariants(), Ok(()));
    }

    #[tokio::test]
    async fn test_coupon_still_valid_is_reapplied_for_new_dates() {
        let backend = Arc::new(RateCardBackend {
            rate_standard: 100.0,
            rate_deposit: 80.0,
            deposit: 500.0,
            coupons: HashMap::from([(
                "WHEEL10".to_string(),
                (CouponDiscount::flat(10.0), day(20)),
            )]),
        });
        let session = BookingSession::new(
            "session-2",
            day(1),
            day(4),
            quote_for(3),
            Collaborators {
                car_sync: backend.clone(),
                coupons: backend.clone(),
                store: Arc::new(MemoryDiscountStore::new()),
            },
            SessionConfig::default(),
        )
        .unwrap();

        session.apply_discount("WHEEL10").await.unwrap();
        session.set_dates(day(1), day(6)).await.unwrap();

        let view = session.view();
        assert_eq!(view.discount.status, DiscountStatus::Applied);
        assert_eq!(view.discount.original_quote_snapshot, Some(quote_for(5)));
        assert_eq!(view.totals.grand_total, 490.0);
        assert_eq!(session.check_invariants(), Ok(()));

        session.remove_discount();
        assert_eq!(session.view().booking.selected_quote, quote_for(5));
    }

    #[tokio::test]
    async fn test_select_car_resets_discount_and_ignores_old_refresh() {
        let h = harness();
        h.coupons
            .script
            .push_ok(CouponVerdict::Accepted(wheel10(&quote_for(3))));
        h.session.apply_discount("WHEEL10").await.unwrap();

        let gate = h.car_sync.script.push_gated();
        let task = {
            let session = h.session.clone();
            tokio::spawn(async move { session.set_dates(day(1), day(6)).await })
        };
        h.car_sync.script.wait_for_calls(1).await;

        let other_car = CarQuote {
            car_id: 77,
            ..quote_for(5)
        };
        let totals = h.session.select_car(other_car.clone());
        assert_eq!(totals.grand_total, 500.0);
        assert_eq!(h.session.discount(), DiscountSession::default());
        assert!(h.store.is_empty());

        gate.send(Ok(quote_for(5))).unwrap();
        assert_eq!(task.await.unwrap(), Ok(QuoteRefresh::Stale));
        assert_eq!(h.session.view().booking.selected_quote, other_car);
    }

    #[tokio::test]
    async fn test_discount_survives_reload() {
        let h = harness();
        h.coupons
            .script
            .push_ok(CouponVerdict::Accepted(wheel10(&quote_for(3))));
        h.session.apply_discount("WHEEL10").await.unwrap();

        // same session id, booking restored with the discounted quote
        let reloaded = BookingSession::new(
            h.session.session_id(),
            day(1),
            day(4),
            wheel10(&quote_for(3)),
            Collaborators {
                car_sync: h.car_sync.clone(),
                coupons: h.coupons.clone(),
                store: h.store.clone(),
            },
            SessionConfig::default(),
        )
        .unwrap();

        let session = reloaded.restore_discount();
        assert_eq!(session.status, DiscountStatus::Applied);
        assert_eq!(session.code.as_deref(), Some("WHEEL10"));
        assert_eq!(reloaded.check_invariants(), Ok(()));

        reloaded.remove_discount();
        assert_eq!(reloaded.view().booking.selected_quote, quote_for(3));
    }

    #[tokio::test]
    async fn test_random_operations_keep_invariants() {
        let backend = Arc::new(RateCardBackend {
            rate_standard: 100.0,
            rate_deposit: 80.0,
            deposit: 500.0,
            coupons: HashMap::from([
                ("WHEEL10".to_string(), (CouponDiscount::flat(10.0), day(12))),
                (
                    "SUMMER15".to_string(),
                    (
                        CouponDiscount {
                            kind: CouponType::Percentage,
                            standard: 15.0,
                            deposit: 15.0,
                        },
                        day(25),
                    ),
                ),
            ]),
        });
        let session = BookingSession::new(
            "session-random",
            day(1),
            day(4),
            quote_for(3),
            Collaborators {
                car_sync: backend.clone(),
                coupons: backend.clone(),
                store: Arc::new(MemoryDiscountStore::new()),
            },
            SessionConfig::default(),
        )
        .unwrap();

        let codes = ["WHEEL10", "SUMMER15", "BOGUS"];
        let mut rng = StdRng::seed_from_u64(7);

        for _ in 0..300 {
            match rng.gen_range(0..6) {
                0 => {
                    let start = rng.gen_range(1..10);
                    let end = rng.gen_range(1..28);
                    let _ = session.set_dates(day(start), day(end)).await;
                }
                1 => {
                    session.set_deposit_preference(rng.gen_bool(0.5));
                }
                2 => {
                    session.toggle_extra(extra(rng.gen_range(1..4), 15.0));
                }
                3 => {
                    let code = codes[rng.gen_range(0..codes.len())];
                    session.apply_discount(code).await.unwrap();
                }
                4 => {
                    session.remove_discount();
                }
                _ => {
                    session.edit_discount_code();
                }
            }

            assert_eq!(session.check_invariants(), Ok(()));
            let view = session.view();
            assert_eq!(
                view.booking.selected_quote.days,
                view.booking.trip.advisory_days()
            );
        }
    }
}
