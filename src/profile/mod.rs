mod store;

pub use store::UserProfileStore;
