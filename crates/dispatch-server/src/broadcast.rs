//! Best-effort fan-out to every available driver.

use dispatch_protocol::ServerMessage;
use futures_util::future::join_all;
use tracing::{debug, warn};

use crate::registry::DispatchRegistry;

/// Outcome of one broadcast.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BroadcastReport {
    pub delivered: usize,
    pub failed: usize,
}

/// Send `message` to a snapshot of the available drivers, optionally skipping
/// one session. Writes run concurrently; each failure is logged and counted
/// and never stops delivery to the others.
pub async fn broadcast_to_drivers(
    registry: &DispatchRegistry,
    message: &ServerMessage,
    exclude_session: Option<&str>,
) -> BroadcastReport {
    let targets: Vec<_> = registry
        .list_available_drivers()
        .into_iter()
        .filter(|(_, session)| Some(session.id()) != exclude_session)
        .collect();

    let line = message.to_string();
    let results = join_all(targets.iter().map(|(name, session)| {
        let line = line.as_str();
        async move { (name, session.send_line(line).await) }
    }))
    .await;

    let mut report = BroadcastReport::default();
    for (name, result) in results {
        match result {
            Ok(()) => report.delivered += 1,
            Err(e) => {
                warn!("Failed to notify driver {name}: {e}");
                report.failed += 1;
            }
        }
    }

    debug!(
        "Broadcast {line:?}: {} delivered, {} failed",
        report.delivered, report.failed
    );
    report
}
