//! Change notifications for timetab.
//!
//! Takes the change-sets the diff engine produces and turns them into
//! Telegram messages: formatting, suppression rules, per-recipient fan-out,
//! and the dual-backend subscriber store behind one trait.

pub mod broadcast;
pub mod channel;
pub mod error;
pub mod format;
pub mod store;

pub use broadcast::{BroadcastOutcome, Broadcaster, SuppressReason};
pub use channel::{DeliveryChannel, TelegramChannel};
pub use error::{NotifyError, NotifyResult};
pub use store::{open_store, FileSubscriberStore, SqliteSubscriberStore, SubscriberStore};
