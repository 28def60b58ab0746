//! Notification fan-out.

use std::sync::Arc;

use tracing::{debug, info, warn};

use timetab_core::diff::ChangeSet;

use crate::channel::DeliveryChannel;
use crate::error::NotifyResult;
use crate::format::{format_change_set, Scope};
use crate::store::SubscriberStore;

/// Entries shown per day section before the tail is elided.
const DIFF_LINE_LIMIT: usize = 12;

/// Why a change-set produced no notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SuppressReason {
    Empty,
    Baseline,
    PastOnly,
}

#[derive(Debug, Default)]
pub struct BroadcastOutcome {
    pub delivered: usize,
    pub failed: Vec<i64>,
    pub suppressed: Option<SuppressReason>,
}

/// Formats a change-set once and pushes it to every subscriber of the group.
///
/// Per-recipient failures are isolated: a blocked bot or deleted chat never
/// aborts delivery to the remaining subscribers. Failures are collected and
/// summarized to the admin chat instead.
pub struct Broadcaster {
    store: Arc<dyn SubscriberStore>,
    channel: Arc<dyn DeliveryChannel>,
    admin_chat_id: Option<i64>,
    future_only: bool,
}

impl Broadcaster {
    pub fn new(
        store: Arc<dyn SubscriberStore>,
        channel: Arc<dyn DeliveryChannel>,
        admin_chat_id: Option<i64>,
        future_only: bool,
    ) -> Broadcaster {
        Broadcaster {
            store,
            channel,
            admin_chat_id,
            future_only,
        }
    }

    pub async fn broadcast(
        &self,
        group_id: &str,
        changes: &ChangeSet,
    ) -> NotifyResult<BroadcastOutcome> {
        if changes.is_empty() {
            info!(group = group_id, "no schedule changes; nothing to send");
            return Ok(suppressed(SuppressReason::Empty));
        }
        if changes.baseline {
            info!(
                group = group_id,
                events = changes.added.len(),
                "first observation; suppressing baseline notification"
            );
            return Ok(suppressed(SuppressReason::Baseline));
        }
        if self.future_only && !changes.has_future_changes() {
            info!(
                group = group_id,
                "only past lessons changed; suppressing notification"
            );
            return Ok(suppressed(SuppressReason::PastOnly));
        }

        let scope = if self.future_only {
            Scope::FutureOnly
        } else {
            Scope::All
        };
        let body = format_change_set(changes, scope, DIFF_LINE_LIMIT);
        let message = format!("{group_id}: обновление расписания\n\n{body}");

        let mut outcome = BroadcastOutcome::default();
        for chat_id in self.store.list_subscribers(group_id)? {
            match self.channel.send(chat_id, &message).await {
                Ok(()) => outcome.delivered += 1,
                Err(e) => {
                    warn!(group = group_id, chat_id, error = %e, "failed to deliver notification");
                    outcome.failed.push(chat_id);
                }
            }
        }
        info!(
            group = group_id,
            delivered = outcome.delivered,
            failed = outcome.failed.len(),
            "notifications sent"
        );

        if !outcome.failed.is_empty() {
            self.report_error(&format!(
                "Не удалось доставить уведомление группы {} в чаты: {:?}",
                group_id, outcome.failed
            ))
            .await;
        }
        Ok(outcome)
    }

    /// Best-effort error notice to the admin chat, if one is configured.
    pub async fn report_error(&self, text: &str) {
        let Some(admin) = self.admin_chat_id else {
            debug!("no admin chat configured; skipping error report");
            return;
        };
        if let Err(e) = self.channel.send(admin, &format!("❗️ Ошибка:\n{text}")).await {
            warn!(error = %e, "failed to report error to admin chat");
        }
    }
}

fn suppressed(reason: SuppressReason) -> BroadcastOutcome {
    BroadcastOutcome {
        suppressed: Some(reason),
        ..BroadcastOutcome::default()
    }
}
