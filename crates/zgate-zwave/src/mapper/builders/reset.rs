//! DeviceResetLocally: no vDev, only a notification when the device
//! reports it was reset.

use std::sync::Arc;

use zgate_messages::{NotificationCategory, NotificationSeverity};

use super::super::context::BuildContext;
use crate::error::Result;

pub(super) fn build(ctx: &mut BuildContext<'_>) -> Result<()> {
    let notifier = ctx.notifier.clone();
    let node = ctx.key.node;
    let path = ctx.cc_path("reset");
    let read = path.clone();
    let tree = Arc::downgrade(ctx.tree);
    ctx.bindings.bind_without_sync(ctx.tree, &path, move |kind| {
        if !kind.is_valid() || kind.is_child_event() {
            return;
        }
        let reset = tree.upgrade().is_some_and(|t| t.flag(&read));
        if reset {
            notifier.notify(
                NotificationSeverity::Error,
                &format!("Device {} was reset locally and left the network", node),
                NotificationCategory::Connection,
            );
        }
    });
    Ok(())
}
