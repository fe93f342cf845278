// Collaborator interfaces consumed by the workflow engine

//! # External Collaborators
//!
//! The engine never talks to file storage, the role system, delivery channels
//! or the audit table directly. It goes through these narrow traits:
//!
//! | Trait | Question it answers |
//! |---|---|
//! | [`DocumentStore`] | Is a document of this type uploaded / verified? |
//! | [`ActionChecker`] | Has the applicant completed this required action? |
//! | [`PermissionStore`] | Does this actor hold this permission? |
//! | [`NotificationDispatcher`] | Deliver a notification (fire-and-forget) |
//! | [`AuditLogger`] | Record a before/after change |
//!
//! Each trait ships with an in-memory implementation used by tests and by the
//! development server.
//!
//! ## Rust Learning Notes:
//!
//! ### Async Traits and Trait Objects
//! `#[async_trait]` lets trait methods be `async` while still being usable as
//! `Arc<dyn DocumentStore>`. The `Send + Sync` bounds allow the same object to
//! be shared across tokio tasks.

use std::collections::{HashMap, HashSet};
use std::sync::RwLock;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::info;
use uuid::Uuid;

use super::lock_poisoned;
use crate::models::{Actor, Application};
use crate::{Result, WorkflowError};

/// Read access to uploaded documents
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// An uploaded, not-deleted document of this type exists
    async fn has_document(&self, application_id: Uuid, document_type: &str) -> Result<bool>;

    /// Such a document exists and has been verified
    async fn is_verified(&self, application_id: Uuid, document_type: &str) -> Result<bool>;
}

/// Per-action completion checks (essay prompts, fee payment, interviews...)
#[async_trait]
pub trait ActionChecker: Send + Sync {
    async fn is_complete(&self, application: &Application, action: &str) -> Result<bool>;
}

/// Role/permission lookups
#[async_trait]
pub trait PermissionStore: Send + Sync {
    async fn actor_has_permission(&self, actor: &Actor, permission: &str) -> Result<bool>;
}

/// Notification delivery (email, in-app, SMS); failures never block a transition
#[async_trait]
pub trait NotificationDispatcher: Send + Sync {
    async fn notify(
        &self,
        user_id: Uuid,
        event_type: &str,
        subject: &str,
        payload: serde_json::Value,
    ) -> Result<()>;
}

/// Audit trail for entity changes
#[async_trait]
pub trait AuditLogger: Send + Sync {
    async fn log_update(
        &self,
        entity_type: &str,
        entity_id: &str,
        before: serde_json::Value,
        after: serde_json::Value,
    ) -> Result<()>;
}

#[derive(Debug, Clone, Default)]
struct DocumentRecord {
    deleted: bool,
    verified: bool,
}

/// In-memory document store keyed by (application, document type)
#[derive(Default)]
pub struct InMemoryDocumentStore {
    documents: RwLock<HashMap<(Uuid, String), DocumentRecord>>,
}

impl InMemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an upload; re-uploading clears deletion and verification
    pub fn upload(&self, application_id: Uuid, document_type: &str) -> Result<()> {
        let mut documents = self.documents.write().map_err(lock_poisoned)?;
        documents.insert((application_id, document_type.to_string()), DocumentRecord::default());
        Ok(())
    }

    pub fn verify(&self, application_id: Uuid, document_type: &str) -> Result<()> {
        let mut documents = self.documents.write().map_err(lock_poisoned)?;
        match documents.get_mut(&(application_id, document_type.to_string())) {
            Some(record) if !record.deleted => {
                record.verified = true;
                Ok(())
            }
            _ => Err(WorkflowError::Internal(format!(
                "no uploaded '{}' document for application {}",
                document_type, application_id
            ))),
        }
    }

    /// Soft delete, as the document table does
    pub fn delete(&self, application_id: Uuid, document_type: &str) -> Result<()> {
        let mut documents = self.documents.write().map_err(lock_poisoned)?;
        if let Some(record) = documents.get_mut(&(application_id, document_type.to_string())) {
            record.deleted = true;
        }
        Ok(())
    }
}

#[async_trait]
impl DocumentStore for InMemoryDocumentStore {
    async fn has_document(&self, application_id: Uuid, document_type: &str) -> Result<bool> {
        let documents = self.documents.read().map_err(lock_poisoned)?;
        Ok(documents
            .get(&(application_id, document_type.to_string()))
            .map_or(false, |r| !r.deleted))
    }

    async fn is_verified(&self, application_id: Uuid, document_type: &str) -> Result<bool> {
        let documents = self.documents.read().map_err(lock_poisoned)?;
        Ok(documents
            .get(&(application_id, document_type.to_string()))
            .map_or(false, |r| !r.deleted && r.verified))
    }
}

/// In-memory action checker: an action is complete once marked
#[derive(Default)]
pub struct InMemoryActionChecker {
    completed: RwLock<HashSet<(Uuid, String)>>,
}

impl InMemoryActionChecker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn complete(&self, application_id: Uuid, action: &str) -> Result<()> {
        let mut completed = self.completed.write().map_err(lock_poisoned)?;
        completed.insert((application_id, action.to_string()));
        Ok(())
    }
}

#[async_trait]
impl ActionChecker for InMemoryActionChecker {
    async fn is_complete(&self, application: &Application, action: &str) -> Result<bool> {
        let completed = self.completed.read().map_err(lock_poisoned)?;
        Ok(completed.contains(&(application.id, action.to_string())))
    }
}

/// In-memory permission grants per user
#[derive(Default)]
pub struct InMemoryPermissionStore {
    grants: RwLock<HashMap<Uuid, HashSet<String>>>,
}

impl InMemoryPermissionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn grant(&self, user_id: Uuid, permission: &str) -> Result<()> {
        let mut grants = self.grants.write().map_err(lock_poisoned)?;
        grants.entry(user_id).or_default().insert(permission.to_string());
        Ok(())
    }

    pub fn revoke(&self, user_id: Uuid, permission: &str) -> Result<()> {
        let mut grants = self.grants.write().map_err(lock_poisoned)?;
        if let Some(held) = grants.get_mut(&user_id) {
            held.remove(permission);
        }
        Ok(())
    }
}

#[async_trait]
impl PermissionStore for InMemoryPermissionStore {
    async fn actor_has_permission(&self, actor: &Actor, permission: &str) -> Result<bool> {
        let grants = self.grants.read().map_err(lock_poisoned)?;
        Ok(grants
            .get(&actor.user_id)
            .map_or(false, |held| held.contains(permission)))
    }
}

/// A notification captured by [`InMemoryNotificationDispatcher`]
#[derive(Debug, Clone, Serialize)]
pub struct SentNotification {
    pub user_id: Uuid,
    pub event_type: String,
    pub subject: String,
    pub payload: serde_json::Value,
    pub sent_at: DateTime<Utc>,
}

/// Records notifications instead of delivering them
#[derive(Default)]
pub struct InMemoryNotificationDispatcher {
    sent: RwLock<Vec<SentNotification>>,
    fail_deliveries: RwLock<bool>,
}

impl InMemoryNotificationDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent `notify` call fail (delivery outage)
    pub fn set_failing(&self, failing: bool) -> Result<()> {
        *self.fail_deliveries.write().map_err(lock_poisoned)? = failing;
        Ok(())
    }

    pub fn sent(&self) -> Result<Vec<SentNotification>> {
        Ok(self.sent.read().map_err(lock_poisoned)?.clone())
    }
}

#[async_trait]
impl NotificationDispatcher for InMemoryNotificationDispatcher {
    async fn notify(
        &self,
        user_id: Uuid,
        event_type: &str,
        subject: &str,
        payload: serde_json::Value,
    ) -> Result<()> {
        if *self.fail_deliveries.read().map_err(lock_poisoned)? {
            return Err(WorkflowError::Storage(anyhow::anyhow!(
                "notification channel unavailable"
            )));
        }

        info!(%user_id, event_type, subject, "notification dispatched");
        self.sent.write().map_err(lock_poisoned)?.push(SentNotification {
            user_id,
            event_type: event_type.to_string(),
            subject: subject.to_string(),
            payload,
            sent_at: Utc::now(),
        });
        Ok(())
    }
}

/// One before/after change
#[derive(Debug, Clone, Serialize)]
pub struct AuditEntry {
    pub entity_type: String,
    pub entity_id: String,
    pub before: serde_json::Value,
    pub after: serde_json::Value,
    pub logged_at: DateTime<Utc>,
}

/// Keeps audit entries in memory and mirrors them to the `audit` tracing target
#[derive(Default)]
pub struct InMemoryAuditLogger {
    entries: RwLock<Vec<AuditEntry>>,
}

impl InMemoryAuditLogger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> Result<Vec<AuditEntry>> {
        Ok(self.entries.read().map_err(lock_poisoned)?.clone())
    }
}

#[async_trait]
impl AuditLogger for InMemoryAuditLogger {
    async fn log_update(
        &self,
        entity_type: &str,
        entity_id: &str,
        before: serde_json::Value,
        after: serde_json::Value,
    ) -> Result<()> {
        info!(target: "audit", entity_type, entity_id, %before, %after, "entity updated");
        self.entries.write().map_err(lock_poisoned)?.push(AuditEntry {
            entity_type: entity_type.to_string(),
            entity_id: entity_id.to_string(),
            before,
            after,
            logged_at: Utc::now(),
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_document_lifecycle() {
        let store = InMemoryDocumentStore::new();
        let app = Uuid::new_v4();

        assert!(!store.has_document(app, "transcript").await.unwrap());
        assert!(store.verify(app, "transcript").is_err());

        store.upload(app, "transcript").unwrap();
        assert!(store.has_document(app, "transcript").await.unwrap());
        assert!(!store.is_verified(app, "transcript").await.unwrap());

        store.verify(app, "transcript").unwrap();
        assert!(store.is_verified(app, "transcript").await.unwrap());

        store.delete(app, "transcript").unwrap();
        assert!(!store.has_document(app, "transcript").await.unwrap());
        assert!(!store.is_verified(app, "transcript").await.unwrap());
    }

    #[tokio::test]
    async fn test_permission_grants() {
        let store = InMemoryPermissionStore::new();
        let actor = Actor::new(Uuid::new_v4());

        assert!(!store.actor_has_permission(&actor, "review").await.unwrap());
        store.grant(actor.user_id, "review").unwrap();
        assert!(store.actor_has_permission(&actor, "review").await.unwrap());
        store.revoke(actor.user_id, "review").unwrap();
        assert!(!store.actor_has_permission(&actor, "review").await.unwrap());
    }

    #[tokio::test]
    async fn test_notification_outage() {
        let dispatcher = InMemoryNotificationDispatcher::new();
        let user = Uuid::new_v4();

        dispatcher
            .notify(user, "stage_entered", "Welcome", serde_json::json!({}))
            .await
            .unwrap();
        dispatcher.set_failing(true).unwrap();
        assert!(dispatcher
            .notify(user, "stage_entered", "Again", serde_json::json!({}))
            .await
            .is_err());

        let sent = dispatcher.sent().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].subject, "Welcome");
    }

    #[tokio::test]
    async fn test_action_checker() {
        let checker = InMemoryActionChecker::new();
        let app = Application::new("undergrad-fall", Uuid::new_v4());

        assert!(!checker.is_complete(&app, "pay_fee").await.unwrap());
        checker.complete(app.id, "pay_fee").unwrap();
        assert!(checker.is_complete(&app, "pay_fee").await.unwrap());
    }
}
