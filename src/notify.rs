//! Write notifications.
//!
//! The orchestrator emits exactly one [`Notification`] per successful write
//! and none for a failed one. Delivery failures are the relay's problem: they
//! are logged and counted, never turned into write failures.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::domain::{DatasetGroup, StorageKey};
use crate::error::{AppError, PipelineError};

/// Message placed on the notification channel after a write.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub key: String,
    pub group: DatasetGroup,
    pub written_at: DateTime<Utc>,
}

impl Notification {
    pub fn for_key(key: &StorageKey, written_at: DateTime<Utc>) -> Self {
        Self {
            key: key.path(),
            group: key.group,
            written_at,
        }
    }
}

/// A population write marks the end of a daily collection, so it is the
/// signal that downstream analytics should run.
pub fn triggers_analytics(notification: &Notification) -> bool {
    notification.group == DatasetGroup::Population
}

pub trait Notifier: Send + Sync {
    fn notify(&self, notification: &Notification) -> Result<(), PipelineError>;
}

#[derive(Debug, Default)]
pub struct NoopNotifier;

impl Notifier for NoopNotifier {
    fn notify(&self, _notification: &Notification) -> Result<(), PipelineError> {
        Ok(())
    }
}

/// In-process queue; a consumer drains it after the run.
#[derive(Debug, Default)]
pub struct MemoryQueue {
    messages: Mutex<VecDeque<Notification>>,
}

impl MemoryQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn drain(&self) -> Vec<Notification> {
        self.messages
            .lock()
            .map(|mut q| q.drain(..).collect())
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.messages.lock().map(|q| q.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Notifier for MemoryQueue {
    fn notify(&self, notification: &Notification) -> Result<(), PipelineError> {
        let mut q = self
            .messages
            .lock()
            .map_err(|_| PipelineError::upstream("notification queue lock poisoned"))?;
        q.push_back(notification.clone());
        Ok(())
    }
}

/// POSTs each notification as JSON to a fixed URL.
pub struct WebhookNotifier {
    client: Client,
    url: String,
}

impl WebhookNotifier {
    pub fn new(url: impl Into<String>) -> Result<Self, AppError> {
        Ok(Self {
            client: crate::data::http_client()?,
            url: url.into(),
        })
    }
}

impl Notifier for WebhookNotifier {
    fn notify(&self, notification: &Notification) -> Result<(), PipelineError> {
        let resp = self
            .client
            .post(&self.url)
            .json(notification)
            .send()
            .map_err(|e| PipelineError::upstream(format!("Notification for {} failed: {e}", notification.key)))?;
        if !resp.status().is_success() {
            return Err(PipelineError::upstream(format!(
                "Notification for {} failed with status {}.",
                notification.key,
                resp.status()
            )));
        }
        debug!(key = %notification.key, "notification delivered");
        Ok(())
    }
}

/// Delivers to every inner notifier; reports the first failure after trying all.
#[derive(Default)]
pub struct Fanout {
    targets: Vec<Arc<dyn Notifier>>,
}

impl Fanout {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with(mut self, target: Arc<dyn Notifier>) -> Self {
        self.targets.push(target);
        self
    }
}

impl Notifier for Fanout {
    fn notify(&self, notification: &Notification) -> Result<(), PipelineError> {
        let mut first_err = None;
        for target in &self.targets {
            if let Err(err) = target.notify(notification) {
                first_err.get_or_insert(err);
            }
        }
        match first_err {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}
