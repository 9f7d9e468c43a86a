pub mod classify;
pub mod config;
pub mod domain;
pub mod errors;
pub mod estimate;
pub mod phone;
pub mod routing;
pub mod template;

pub use chrono;

pub use classify::{Classification, ExtractedData, Intent};
pub use domain::driver::{Driver, DriverId};
pub use domain::guest::{Guest, GuestId};
pub use domain::hotel::{Hotel, HotelId, ReminderSettings};
pub use domain::message::{Message, MessageDirection, MessageId};
pub use domain::reminder::{ReminderKind, ReminderRecord, ReminderRecordId};
pub use domain::ride::{Ride, RideId, RideStatus};
pub use errors::{ApplicationError, DomainError};
pub use estimate::{DistanceEstimator, FixedSpeedEstimator};
pub use phone::normalize_phone;
pub use routing::{route_message, DriverForward, RideContext, RideMutation, RoutePlan};
pub use template::{render_template, RenderContext, DEFAULT_TEMPLATES};
