//! Notification dispatch.
//!
//! Each notification runs on its own task; the returned `JoinHandle`
//! makes completion observable. Errors are logged with the notification's
//! key here and returned, never panicking the host.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

use super::machine::{LifecycleManager, Outcome};
use crate::error::{Error, Result};
use crate::membership::{MembershipTracker, VoiceStateChange};
use crate::types::{MembershipKind, Template};

/// A normalized platform notification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Notification {
    TemplateMembership {
        template_id: String,
        kind: MembershipKind,
        #[serde(default)]
        member_id: Option<String>,
    },
    TemplateCreated {
        template: Template,
    },
    TemplateUpdated {
        template: Template,
    },
    TemplateTerminal {
        template_id: String,
    },
    CompanionMembership {
        companion_id: String,
        member_count: usize,
    },
    SubscriberAdded {
        template_id: String,
        identity_id: String,
    },
    SubscriberRemoved {
        template_id: String,
        identity_id: String,
    },
    Reclaim {
        template_id: String,
    },
}

impl Notification {
    pub fn label(&self) -> &'static str {
        match self {
            Notification::TemplateMembership { .. } => "template_membership",
            Notification::TemplateCreated { .. } => "template_created",
            Notification::TemplateUpdated { .. } => "template_updated",
            Notification::TemplateTerminal { .. } => "template_terminal",
            Notification::CompanionMembership { .. } => "companion_membership",
            Notification::SubscriberAdded { .. } => "subscriber_added",
            Notification::SubscriberRemoved { .. } => "subscriber_removed",
            Notification::Reclaim { .. } => "reclaim",
        }
    }

    /// Template or companion id the notification is about.
    pub fn key(&self) -> &str {
        match self {
            Notification::TemplateCreated { template } | Notification::TemplateUpdated { template } => {
                &template.id
            }
            Notification::CompanionMembership { companion_id, .. } => companion_id,
            Notification::TemplateMembership { template_id, .. }
            | Notification::TemplateTerminal { template_id }
            | Notification::SubscriberAdded { template_id, .. }
            | Notification::SubscriberRemoved { template_id, .. }
            | Notification::Reclaim { template_id } => template_id,
        }
    }
}

/// Routes notifications to the lifecycle manager.
#[derive(Clone)]
pub struct Dispatcher {
    manager: Arc<LifecycleManager>,
    tracker: Arc<MembershipTracker>,
}

impl Dispatcher {
    pub fn new(manager: Arc<LifecycleManager>) -> Self {
        let tracker = Arc::new(MembershipTracker::new(manager.context().store.clone()));
        Self { manager, tracker }
    }

    pub fn manager(&self) -> &Arc<LifecycleManager> {
        &self.manager
    }

    /// Spawn a task handling `notification`.
    pub fn dispatch(&self, notification: Notification) -> JoinHandle<Result<Outcome>> {
        let this = self.clone();
        tokio::spawn(async move { this.handle(notification).await })
    }

    /// Handle `notification` on the current task.
    pub async fn handle(&self, notification: Notification) -> Result<Outcome> {
        let label = notification.label();
        let key = notification.key().to_string();

        let result = match notification {
            Notification::TemplateMembership {
                template_id,
                kind,
                member_id,
            } => {
                self.manager
                    .on_template_membership_trigger(&template_id, kind, member_id.as_deref())
                    .await
            }
            Notification::TemplateCreated { template } => {
                self.manager.on_template_created(&template).await
            }
            Notification::TemplateUpdated { template } => {
                self.manager.on_template_updated(&template).await
            }
            Notification::TemplateTerminal { template_id } => {
                self.manager.on_template_terminal(&template_id).await
            }
            Notification::CompanionMembership {
                companion_id,
                member_count,
            } => {
                self.manager
                    .on_companion_membership_changed(&companion_id, member_count)
                    .await
            }
            Notification::SubscriberAdded {
                template_id,
                identity_id,
            } => {
                self.manager
                    .on_subscriber_added(&template_id, &identity_id)
                    .await
            }
            Notification::SubscriberRemoved {
                template_id,
                identity_id,
            } => {
                self.manager
                    .on_subscriber_removed(&template_id, &identity_id)
                    .await
            }
            Notification::Reclaim { template_id } => self.manager.reclaim(&template_id).await,
        };

        match &result {
            Ok(outcome) => debug!(notification = label, key = %key, ?outcome, "Notification handled"),
            Err(e) => warn!(
                notification = label,
                key = %key,
                error = %e,
                recoverable = e.is_recoverable(),
                "Notification failed"
            ),
        }
        result
    }

    /// Normalize a raw voice-state change and handle every resulting
    /// trigger. All triggers run to completion; the first failure is
    /// returned.
    pub async fn handle_voice_state(&self, change: &VoiceStateChange) -> Result<Vec<Outcome>> {
        let handles: Vec<_> = self
            .tracker
            .normalize(change)?
            .into_iter()
            .map(|n| self.dispatch(n))
            .collect();

        let mut outcomes = Vec::with_capacity(handles.len());
        let mut first_error = None;
        for handle in handles {
            let result = match handle.await {
                Ok(result) => result,
                Err(e) => {
                    error!(error = %e, "Notification task panicked");
                    Err(Error::Other(format!("notification task failed: {}", e)))
                }
            };
            match result {
                Ok(outcome) => outcomes.push(outcome),
                Err(e) => {
                    first_error.get_or_insert(e);
                }
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(outcomes),
        }
    }
}
