//! Visitor session tracking
//!
//! - [`IdentityManager`]: persistent visitor id and per-tab session id
//! - [`VisitorContextTracker`]: the live context campaigns are targeted on
//! - [`SessionTracker`]: page view, scroll, click, time-on-page and bounce reporting

mod context;
mod identity;
mod session;

pub use context::{PageInfo, VisitorContextTracker};
pub use identity::{generate_id, IdentityManager};
pub use session::{run_time_on_page, SessionTracker, Visibility, DIRECT_REFERRER};
