// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Periodic fetch loop for pull-bound instances.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use super::ApiClient;
use crate::catalog::{self, PullQuery};
use crate::dispatch::{DispatchOutcome, UpdateDispatcher};
use crate::error::ProtocolError;

/// Polls the simple API for one instance.
#[derive(Debug, Clone)]
pub struct Poller {
    client: ApiClient,
    dispatcher: Arc<UpdateDispatcher>,
    query: PullQuery,
    interval: Duration,
    failure_threshold: u32,
}

impl Poller {
    /// Creates a poller, or returns `None` for kinds the API cannot read.
    #[must_use]
    pub fn new(
        client: ApiClient,
        dispatcher: Arc<UpdateDispatcher>,
        interval: Duration,
        failure_threshold: u32,
    ) -> Option<Self> {
        let instance = dispatcher.instance();
        let query = catalog::pull_query(instance.kind(), instance.id())?;
        Some(Self {
            client,
            dispatcher,
            query,
            interval,
            failure_threshold,
        })
    }

    /// Returns the query fetched on every tick.
    #[must_use]
    pub fn query(&self) -> &PullQuery {
        &self.query
    }

    /// Fetches once and dispatches the instance document.
    ///
    /// Failures are counted towards the threshold before they are returned.
    ///
    /// # Errors
    ///
    /// Returns the fetch error, or [`ProtocolError::FetchFailed`] if the
    /// response has no document for the instance.
    pub async fn poll_once(&self) -> Result<DispatchOutcome, ProtocolError> {
        let result = self.client.fetch(&self.query).await.and_then(|response| {
            match self.query.select(&response) {
                Some(document) if document.is_object() => {
                    Ok(self.dispatcher.handle_document(document))
                }
                _ => Err(ProtocolError::FetchFailed {
                    query: self.query.query().to_string(),
                    reason: format!(
                        "no document for {}",
                        self.query.scope().unwrap_or("instance")
                    ),
                }),
            }
        });

        if let Err(e) = &result {
            self.dispatcher.record_poll_failure(self.failure_threshold);
            tracing::warn!(
                instance = %self.dispatcher.instance(),
                failures = self.dispatcher.poll_failures(),
                error = %e,
                "Poll failed"
            );
        }
        result
    }

    /// Starts the poll loop. The first fetch runs immediately; the loop only
    /// ends when the returned handle is aborted.
    #[must_use]
    pub fn spawn(self) -> JoinHandle<()> {
        self.dispatcher.begin();
        tracing::info!(
            instance = %self.dispatcher.instance(),
            query = %self.query.query(),
            interval_secs = self.interval.as_secs(),
            "Starting poller"
        );
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let _ = self.poll_once().await;
            }
        })
    }
}
