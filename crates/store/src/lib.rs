mod artifacts;
mod subscriptions;

pub use artifacts::{ArtifactStore, report_path_for};
pub use subscriptions::SubscriptionStore;
