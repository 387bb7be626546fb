//! # engage-core
//!
//! Core library for engage - visitor tracking, campaign targeting and live
//! dashboard notifications for an embeddable chat widget.
//!
//! This library provides:
//! - Visitor and session identity over a pluggable key-value store
//! - Best-effort tracking delivery to the collector
//! - The campaign targeting evaluator, frequency guard and selector
//! - Exit-intent detection
//! - The realtime event channel and the notification dispatcher
//! - Configuration and logging infrastructure
//!
//! ## Architecture
//!
//! Two independent flows share the storage and delivery layers:
//! - **Widget:** the session tracker and exit-intent detector feed the visitor
//!   context; the selector picks the first campaign that targets it and that
//!   the frequency guard allows, then records the view and the impression.
//! - **Dashboard:** the channel session decodes and scopes server events and
//!   hands them to the dispatcher, which updates the unread counters and
//!   raises toasts, sounds and speech.
//!
//! ## Example
//!
//! ```rust,no_run
//! use engage_core::targeting::find_matching_campaign;
//! use engage_core::{Campaign, VisitorContext};
//!
//! let campaigns: Vec<Campaign> =
//!     serde_json::from_str(&std::fs::read_to_string("campaigns.json").unwrap()).unwrap();
//! let context = VisitorContext {
//!     is_returning: false,
//!     time_on_page_secs: 45.0,
//!     current_url: "https://shop.example.com/cart".to_string(),
//!     referrer_url: "direct".to_string(),
//! };
//!
//! if let Some(campaign) = find_matching_campaign(&campaigns, &context) {
//!     println!("show campaign {}", campaign.id);
//! }
//! ```

// Re-export commonly used items at the crate root
pub use config::Config;
pub use error::{Error, Result};
pub use store::{Database, KeyValueStore, MemoryStore, SqliteStore};
pub use types::*;

// Public modules
pub mod campaign;
pub mod channel;
pub mod collector;
pub mod config;
pub mod error;
pub mod exit_intent;
pub mod logging;
pub mod notify;
pub mod store;
pub mod targeting;
pub mod tracker;
pub mod types;
