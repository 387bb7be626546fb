//! Campaign display: frequency capping, analytics and selection

mod analytics;
mod frequency;
mod selector;

pub use analytics::CampaignAnalytics;
pub use frequency::{CampaignViewRecord, FrequencyGuard, FrequencyPolicy};
pub use selector::CampaignSelector;
