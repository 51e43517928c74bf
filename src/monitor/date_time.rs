//! Date-time monitor: records when the modem clock becomes valid

use crate::connection::ConnectionContext;
use crate::modem::{DateTimeEvent, DateTimeHandler};
use std::sync::Arc;
use tracing::debug;

/// Posts the date-time flag once the modem has a valid clock
pub struct DateTimeMonitor {
    context: Arc<ConnectionContext>,
}

impl DateTimeMonitor {
    pub fn new(context: Arc<ConnectionContext>) -> Self {
        Self { context }
    }
}

impl DateTimeHandler for DateTimeMonitor {
    fn on_date_time_event(&self, event: DateTimeEvent) {
        if event.time_valid {
            debug!("Date and time are now known");
            self.context.notify_date_time_known();
        }
    }
}
