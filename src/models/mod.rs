mod priority;
mod profile;

pub use priority::Priority;
pub use profile::{BehaviorCounters, ProfileUpdate, UserProfile};
