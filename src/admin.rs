//! Operations which act on the backend directly, outside any session.
//!
//! A session whose port is closed through one of these keeps its
//! local `Open` state until its next operation observes the backend
//! failure and corrects itself.

use itertools::Itertools;
use tracing::info;

use crate::{channel::CommandChannel, error::Error};

/// Enumerate the currently visible port identifiers, sorted.
///
/// Purely informational. Other sessions or processes may open or
/// close any of these at any time; the result is not a reservation.
pub async fn available_ports(commands: &dyn CommandChannel) -> Result<Vec<String>, Error> {
    let ports = commands.available_ports().await?;

    Ok(ports.into_iter().sorted().collect())
}

/// Close the port at `path` regardless of which session opened it.
pub async fn force_close(commands: &dyn CommandChannel, path: &str) -> Result<(), Error> {
    info!(%path, "Force-closing");
    Ok(commands.force_close(path).await?)
}

/// Close every port the backend holds open.
pub async fn close_all(commands: &dyn CommandChannel) -> Result<(), Error> {
    info!("Closing all ports");
    Ok(commands.close_all().await?)
}

/// Ask the backend to stop any emission loop it runs for `path`.
pub async fn cancel_read(commands: &dyn CommandChannel, path: &str) -> Result<(), Error> {
    Ok(commands.cancel_read(path).await?)
}
