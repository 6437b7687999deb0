//! Polling fallback for platforms or filesystems without usable notifications.

use crate::watcher::runner::WatchLoop;
use crate::watcher::WatcherError;

/// Walk, broadcast, check space, sleep; repeat.
///
/// The pause grows with the walk duration so large trees do not keep the
/// process busy walking.
pub(crate) fn run(ctx: &mut WatchLoop) -> Result<(), WatcherError> {
    tracing::debug!("Using polling for {}", ctx.walker.root().display());

    while !ctx.should_quit() {
        let took = ctx.full_refresh()?;
        ctx.refresh_space()?;
        ctx.pause(ctx.config.poll_pause(took));
    }
    Ok(())
}
