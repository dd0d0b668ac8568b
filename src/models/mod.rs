pub mod property;
pub mod session;
pub mod subscription;
pub mod user;

pub use property::{ListingUrl, Property};
pub use session::{AuthUser, Session};
pub use subscription::{Subscription, TrackedProperty};
pub use user::User;
