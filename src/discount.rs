// Coupon validation, removal and reconciliation against refreshed quotes

use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::api::{ApiError, CouponValidator};
use crate::coupon::{CouponDiscount, CouponValidationRequest, CouponVerdict};
use crate::persistence::{discount_storage_key, DiscountStore, PersistedDiscount};
use crate::quote::CarQuote;
use crate::state::{CheckoutState, DiscountSession, DiscountStatus};

pub const MSG_APPLIED: &str = "Discount code applied.";
pub const MSG_REJECTED: &str = "Invalid or expired discount code.";
pub const MSG_UNAVAILABLE: &str = "The discount code could not be validated. Please try again.";

struct Ticket {
    discount_generation: u64,
    quote_revision: u64,
}

struct Started {
    ticket: Ticket,
    request: CouponValidationRequest,
    base_quote: CarQuote,
}

enum Completion {
    Done(DiscountSession),
    Retry,
}

/// A revalidation opened by [`DiscountCoordinator::reconcile_after_quote_replaced`].
///
/// Its ticket is taken under the same lock that replaced the quote, so any
/// discount action issued afterwards supersedes it.
pub struct PendingValidation {
    code: String,
    started: Started,
}

impl PendingValidation {
    pub fn code(&self) -> &str {
        &self.code
    }
}

/// Owns the discount lifecycle of one checkout.
///
/// All state lives in the session's [`CheckoutState`]; the coordinator only
/// ever touches it under the session lock, and never holds the lock while a
/// validation is in flight.
pub struct DiscountCoordinator {
    validator: Arc<dyn CouponValidator>,
    store: Arc<dyn DiscountStore>,
    storage_key: String,
    timeout: Duration,
}

impl DiscountCoordinator {
    pub fn new(
        validator: Arc<dyn CouponValidator>,
        store: Arc<dyn DiscountStore>,
        session_id: &str,
        timeout: Duration,
    ) -> Self {
        Self {
            validator,
            store,
            storage_key: discount_storage_key(session_id),
            timeout,
        }
    }

    /// Validates `code` against the current trip and applies it on success.
    ///
    /// Failures (rejection, network error, timeout) end in `Invalid` with a
    /// message and leave the quote untouched. A result that arrives after a
    /// newer discount action is dropped. A result priced against a quote that
    /// has since been replaced is re-requested for the current quote.
    pub async fn validate(&self, code: &str, state: &Mutex<CheckoutState>) -> DiscountSession {
        let started = match self.start(code, state) {
            Ok(started) => started,
            Err(unchanged) => return unchanged,
        };
        self.run(code, started, state).await
    }

    /// Runs a revalidation opened by a quote replacement. Returns the current
    /// session without calling the validator if a newer discount action has
    /// already superseded it.
    pub async fn resume(
        &self,
        pending: PendingValidation,
        state: &Mutex<CheckoutState>,
    ) -> DiscountSession {
        {
            let st = state.lock();
            if st.discount_generation != pending.started.ticket.discount_generation {
                debug!(code = %pending.code, "revalidation superseded before it started");
                return st.discount.clone();
            }
        }
        self.run(&pending.code, pending.started, state).await
    }

    /// Restores the pre-discount quote. No-op unless a coupon is applied.
    pub fn remove(&self, st: &mut CheckoutState) -> DiscountSession {
        if st.discount.status != DiscountStatus::Applied {
            return st.discount.clone();
        }

        let code = st.discount.code.take();
        self.restore_original(st);
        st.discount_generation += 1;
        st.discount = DiscountSession::default();
        info!(code = ?code, "discount removed");
        st.discount.clone()
    }

    /// Adopts a quote freshly priced for `st.quoted_trip`.
    ///
    /// An applied coupon is always validated again: the snapshot priced the
    /// old dates, so it is dropped whether or not the new quote still carries
    /// the code. The status moves to `Validating` and the returned validation
    /// must be driven with [`resume`].
    ///
    /// [`resume`]: DiscountCoordinator::resume
    pub fn reconcile_after_quote_replaced(
        &self,
        st: &mut CheckoutState,
        new_quote: CarQuote,
    ) -> Option<PendingValidation> {
        let applied_code = match st.discount.status {
            DiscountStatus::Applied => st.discount.code.clone(),
            _ => None,
        };
        st.replace_quote(new_quote);

        let code = applied_code?;
        if st.booking.selected_quote.carries_coupon(Some(&code)) {
            debug!(
                code = %code,
                "refreshed quote carries the coupon, revalidating for new dates"
            );
        } else {
            warn!(
                code = %code,
                car_id = st.booking.selected_quote.car_id,
                "refreshed quote no longer carries the applied coupon, revalidating"
            );
        }
        self.clear_persisted();
        let started = self.open_ticket(&code, st);
        Some(PendingValidation { code, started })
    }

    // Invalid --(user edits code)--> None
    pub fn clear_rejection(&self, st: &mut CheckoutState) -> DiscountSession {
        if st.discount.status == DiscountStatus::Invalid {
            st.discount = DiscountSession::default();
        }
        st.discount.clone()
    }

    /// Forgets any discount, e.g. when a different car is chosen. In-flight
    /// validations are invalidated.
    pub fn reset(&self, st: &mut CheckoutState) {
        if st.discount.status == DiscountStatus::Applied {
            self.restore_original(st);
        }
        st.discount_generation += 1;
        st.discount = DiscountSession::default();
        self.clear_persisted();
    }

    /// Picks up a discount persisted before a reload.
    ///
    /// The stored pair is only trusted when the current quote still carries
    /// the stored code and the snapshot is for the same car; anything else is
    /// cleared.
    pub fn restore(&self, st: &mut CheckoutState) -> DiscountSession {
        if st.discount.status != DiscountStatus::None {
            return st.discount.clone();
        }

        let persisted = match self.store.load(&self.storage_key) {
            Ok(Some(persisted)) => persisted,
            Ok(None) => return st.discount.clone(),
            Err(e) => {
                warn!(key = %self.storage_key, error = %e, "could not read persisted discount");
                self.clear_persisted();
                return st.discount.clone();
            }
        };

        let quote = &st.booking.selected_quote;
        if quote.carries_coupon(Some(&persisted.code)) && persisted.snapshot.car_id == quote.car_id
        {
            info!(code = %persisted.code, "restored persisted discount");
            st.discount = DiscountSession {
                code: Some(persisted.code),
                status: DiscountStatus::Applied,
                original_quote_snapshot: Some(persisted.snapshot),
                message: None,
            };
        } else {
            debug!(code = %persisted.code, "persisted discount does not match the quote");
            self.clear_persisted();
        }
        st.discount.clone()
    }

    fn start(&self, code: &str, state: &Mutex<CheckoutState>) -> Result<Started, DiscountSession> {
        let mut st = state.lock();

        if st.discount.status == DiscountStatus::Applied {
            if st.discount.code.as_deref() == Some(code) {
                return Err(st.discount.clone());
            }
            // one coupon at a time: price the new code from the undiscounted quote
            self.restore_original(&mut st);
        }

        Ok(self.open_ticket(code, &mut st))
    }

    // Marks `code` as validating and prices the request from the dates the
    // current quote was fetched for
    fn open_ticket(&self, code: &str, st: &mut CheckoutState) -> Started {
        st.discount_generation += 1;
        st.discount = DiscountSession {
            code: Some(code.to_string()),
            status: DiscountStatus::Validating,
            original_quote_snapshot: None,
            message: None,
        };

        let base_quote = st.booking.selected_quote.clone();
        let request = CouponValidationRequest::new(code, &base_quote, &st.quoted_trip);
        debug!(code, generation = st.discount_generation, "validating discount code");

        Started {
            ticket: Ticket {
                discount_generation: st.discount_generation,
                quote_revision: st.quote_revision,
            },
            request,
            base_quote,
        }
    }

    async fn run(
        &self,
        code: &str,
        mut started: Started,
        state: &Mutex<CheckoutState>,
    ) -> DiscountSession {
        loop {
            let outcome = self.call_validator(started.request).await;

            match self.complete(code, state, started.ticket, started.base_quote, outcome) {
                Completion::Done(session) => return session,
                Completion::Retry => {
                    let mut st = state.lock();
                    started = self.open_ticket(code, &mut st);
                }
            }
        }
    }

    async fn call_validator(
        &self,
        request: CouponValidationRequest,
    ) -> Result<CouponVerdict, ApiError> {
        match tokio::time::timeout(self.timeout, self.validator.validate_coupon(request)).await {
            Ok(result) => result,
            Err(_) => Err(ApiError::Timeout(self.timeout.as_millis() as u64)),
        }
    }

    fn complete(
        &self,
        code: &str,
        state: &Mutex<CheckoutState>,
        ticket: Ticket,
        base_quote: CarQuote,
        outcome: Result<CouponVerdict, ApiError>,
    ) -> Completion {
        let mut st = state.lock();

        if st.discount_generation != ticket.discount_generation {
            debug!(code, "discarding superseded validation result");
            return Completion::Done(st.discount.clone());
        }
        if st.quote_revision != ticket.quote_revision {
            debug!(code, "quote replaced while validating, validating again");
            return Completion::Retry;
        }

        match outcome {
            Ok(CouponVerdict::Accepted(quote)) if quote.car_id == base_quote.car_id => {
                self.apply(&mut st, code, quote.with_coupon(code));
            }
            Ok(CouponVerdict::Accepted(quote)) => {
                warn!(
                    code,
                    car_id = quote.car_id,
                    expected = base_quote.car_id,
                    "coupon priced for another car"
                );
                self.reject(&mut st, code, MSG_UNAVAILABLE.to_string());
            }
            Ok(CouponVerdict::AcceptedFlat { amount }) => {
                // a refreshed quote carrying the code is already discounted
                let discounted = if base_quote.carries_coupon(Some(code)) {
                    base_quote
                } else {
                    CouponDiscount::flat(amount).apply(&base_quote, code)
                };
                self.apply(&mut st, code, discounted);
            }
            Ok(CouponVerdict::Rejected { message }) => {
                self.reject(&mut st, code, message.unwrap_or_else(|| MSG_REJECTED.to_string()));
            }
            Err(e) => {
                warn!(code, error = %e, "discount validation failed");
                self.reject(&mut st, code, MSG_UNAVAILABLE.to_string());
            }
        }
        Completion::Done(st.discount.clone())
    }

    fn apply(&self, st: &mut CheckoutState, code: &str, discounted: CarQuote) {
        if st.discount.original_quote_snapshot.is_none() {
            st.discount.original_quote_snapshot = Some(st.booking.selected_quote.clone());
        }
        st.replace_quote(discounted);
        st.discount.status = DiscountStatus::Applied;
        st.discount.code = Some(code.to_string());
        st.discount.message = Some(MSG_APPLIED.to_string());

        if let Some(snapshot) = &st.discount.original_quote_snapshot {
            let persisted = PersistedDiscount {
                code: code.to_string(),
                snapshot: snapshot.clone(),
            };
            if let Err(e) = self.store.save(&self.storage_key, &persisted) {
                warn!(key = %self.storage_key, error = %e, "could not persist discount");
            }
        }
        info!(code, total = st.booking.selected_quote.total_standard, "discount applied");
    }

    fn reject(&self, st: &mut CheckoutState, code: &str, message: String) {
        st.discount.status = DiscountStatus::Invalid;
        st.discount.original_quote_snapshot = None;
        st.discount.message = Some(message);
        self.clear_persisted();
        info!(code, "discount code rejected");
    }

    fn restore_original(&self, st: &mut CheckoutState) {
        if let Some(snapshot) = st.discount.original_quote_snapshot.take() {
            st.replace_quote(snapshot);
        }
        self.clear_persisted();
    }

    fn clear_persisted(&self) {
        if let Err(e) = self.store.clear(&self.storage_key) {
            warn!(key = %self.storage_key, error = %e, "could not clear persisted discount");
        }
    }
}
