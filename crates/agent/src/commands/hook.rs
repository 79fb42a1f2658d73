use crate::Cli;
use crate::error::Result;

use crdb_bootstrap::Notification;
use tracing::info;

/// Handles one lifecycle hook: deferred notifications first, then the new
/// one, in a single round.
pub async fn hook(cli: &Cli, notification: Notification) -> Result<()> {
    let config = super::load_config(cli)?;
    let mut dispatcher = super::dispatcher(cli, config).await?;

    // The relation exists by the time peers report changes.
    if notification == Notification::PeerRelationChanged {
        dispatcher.coordinator().directory().relation().join().await?;
    }

    let report = dispatcher.deliver(notification).await?;

    info!(
        "{} handled ({} notification(s), {} deferred), status {}",
        notification,
        report.handled,
        report.deferred,
        dispatcher.coordinator().status()
    );

    Ok(())
}
