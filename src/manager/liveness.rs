// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Staleness monitor for push-bound instances.

use std::sync::Weak;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

use crate::dispatch::UpdateDispatcher;

/// Spawns a task that checks the dispatcher's liveness entity every quarter
/// window. The task ends when the dispatcher is dropped.
pub(crate) fn spawn_liveness_monitor(
    dispatcher: Weak<UpdateDispatcher>,
    window: Duration,
) -> JoinHandle<()> {
    let period = (window / 4).max(Duration::from_secs(1));
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let Some(dispatcher) = dispatcher.upgrade() else {
                break;
            };
            dispatcher.check_liveness(Instant::now(), window);
        }
        tracing::trace!("Liveness monitor stopped");
    })
}
