// Car rental checkout: quote refresh, coupon lifecycle and price totals

pub mod api;
pub mod coupon;
pub mod discount;
pub mod persistence;
pub mod price_engine;
pub mod quote;
pub mod session; // Entry point for a single checkout
pub mod state;

// Re-export key types for convenience
pub use api::{
    ApiError, CarSyncService, ClientConfig, ClientError, ClientStats, CouponValidator,
    HttpBookingApi, RetryConfig,
};
pub use coupon::{CouponDiscount, CouponType, CouponValidationRequest, CouponVerdict};
pub use discount::{DiscountCoordinator, PendingValidation};
pub use persistence::{DiscountStore, FileDiscountStore, MemoryDiscountStore, StoreError};
pub use price_engine::{PriceBreakdown, PriceEngine};
pub use quote::{CarQuote, ExtraService, TripDates};
pub use session::{BookingError, BookingSession, Collaborators, QuoteRefresh, SessionConfig};
pub use state::{BookingState, BookingView, DiscountSession, DiscountStatus, InvariantViolation};
