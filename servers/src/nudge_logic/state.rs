use chrono::{DateTime, FixedOffset, Utc};
use chrono_tz::Tz;
use lib_common::core::{NotificationDispatcher, NotificationStore, PresenceRegistry};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Shared state handed to every route, connection task and scheduler tick.
#[derive(Clone)]
pub struct AppState {
    pub registry: PresenceRegistry,
    pub dispatcher: Arc<NotificationDispatcher>,
    pub store: Arc<dyn NotificationStore>,
    /// Timezone the rule clock runs in.
    pub timezone: Tz,
    /// Cancelled once on shutdown; connection tasks close their sockets.
    pub shutdown: CancellationToken,
}

impl AppState {
    pub fn new(
        dispatcher: Arc<NotificationDispatcher>,
        timezone: Tz,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            registry: dispatcher.registry().clone(),
            store: dispatcher.store().clone(),
            dispatcher,
            timezone,
            shutdown,
        }
    }

    /// Current time in the configured timezone.
    pub fn now(&self) -> DateTime<FixedOffset> {
        Utc::now().with_timezone(&self.timezone).fixed_offset()
    }
}
