// End-to-end engine scenarios over in-memory collaborators

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;
use tokio::sync::Barrier;
use uuid::Uuid;

use super::ports::{
    InMemoryAuditLogger, InMemoryDocumentStore, InMemoryNotificationDispatcher, InMemoryPermissionStore,
};
use super::registry::StageRegistry;
use super::storage::{ApplicationStore, FaultPoint, InMemoryApplicationStore, StatusCommit};
use super::workflow_engine::WorkflowEngine;
use crate::models::{
    Actor, Application, ApplicationStatus, Condition, DomainEvent, NotificationRecipient, NotificationTrigger, StageId,
    TransitionId, Workflow, WorkflowId, WorkflowStage, WorkflowTransition,
};
use crate::{Result, WorkflowError};

const UNDERGRAD: &str = "undergrad-fall";

struct Harness {
    engine: WorkflowEngine,
    registry: Arc<StageRegistry>,
    store: Arc<InMemoryApplicationStore>,
    documents: Arc<InMemoryDocumentStore>,
    permissions: Arc<InMemoryPermissionStore>,
    notifications: Arc<InMemoryNotificationDispatcher>,
    audit: Arc<InMemoryAuditLogger>,
}

impl Harness {
    async fn new(workflows: Vec<Workflow>) -> Self {
        let store = Arc::new(InMemoryApplicationStore::new());
        Self::over(workflows, store.clone(), store).await
    }

    /// The engine writes through `engine_store`, which must wrap `store`
    async fn over(
        workflows: Vec<Workflow>,
        store: Arc<InMemoryApplicationStore>,
        engine_store: Arc<dyn ApplicationStore>,
    ) -> Self {
        let registry = Arc::new(StageRegistry::in_memory());
        for workflow in workflows {
            registry.register_workflow(workflow).await.unwrap();
        }

        let documents = Arc::new(InMemoryDocumentStore::new());
        let permissions = Arc::new(InMemoryPermissionStore::new());
        let notifications = Arc::new(InMemoryNotificationDispatcher::new());
        let audit = Arc::new(InMemoryAuditLogger::new());

        let engine = WorkflowEngine::builder()
            .registry(registry.clone())
            .store(engine_store)
            .documents(documents.clone())
            .permissions(permissions.clone())
            .notifications(notifications.clone())
            .audit(audit.clone())
            .build();

        Self {
            engine,
            registry,
            store,
            documents,
            permissions,
            notifications,
            audit,
        }
    }

    async fn application(&self, application_type: &str) -> Application {
        self.engine
            .create_application(Application::new(application_type, Uuid::new_v4()))
            .await
            .unwrap()
    }

    async fn stage_of(&self, application_id: Uuid) -> Option<StageId> {
        self.store
            .get_application(application_id)
            .await
            .unwrap()
            .and_then(|a| a.current_stage_id)
    }

    async fn history_len(&self, application_id: Uuid) -> usize {
        self.engine.status_history(application_id).await.unwrap().len()
    }

    fn reviewer(&self) -> Actor {
        let actor = Actor::new(Uuid::new_v4());
        self.permissions.grant(actor.user_id, "review").unwrap();
        actor
    }
}

/// Holds the first two callers of a method until both have arrived
struct Rendezvous {
    pending: AtomicUsize,
    barrier: Barrier,
}

impl Rendezvous {
    fn new() -> Self {
        Self {
            pending: AtomicUsize::new(0),
            barrier: Barrier::new(2),
        }
    }

    fn arm(&self) {
        self.pending.store(2, Ordering::SeqCst);
    }

    async fn meet(&self) {
        if self
            .pending
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            self.barrier.wait().await;
        }
    }
}

/// Store whose writes can be made to wait for a second writer, so both
/// decide from the same snapshot before either commits
struct RendezvousStore {
    inner: Arc<InMemoryApplicationStore>,
    commits: Rendezvous,
    submissions: Rendezvous,
}

impl RendezvousStore {
    fn new(inner: Arc<InMemoryApplicationStore>) -> Self {
        Self {
            inner,
            commits: Rendezvous::new(),
            submissions: Rendezvous::new(),
        }
    }
}

#[async_trait]
impl ApplicationStore for RendezvousStore {
    async fn create_application(&self, application: Application) -> Result<Application> {
        self.inner.create_application(application).await
    }

    async fn get_application(&self, id: Uuid) -> Result<Option<Application>> {
        self.inner.get_application(id).await
    }

    async fn set_attribute(&self, id: Uuid, key: &str, value: serde_json::Value) -> Result<Application> {
        self.inner.set_attribute(id, key, value).await
    }

    async fn mark_submitted(&self, id: Uuid) -> Result<(Application, bool)> {
        self.submissions.meet().await;
        self.inner.mark_submitted(id).await
    }

    async fn list_statuses(&self, application_id: Uuid) -> Result<Vec<ApplicationStatus>> {
        self.inner.list_statuses(application_id).await
    }

    async fn commit_transition(&self, commit: StatusCommit) -> Result<(Application, ApplicationStatus)> {
        self.commits.meet().await;
        self.inner.commit_transition(commit).await
    }
}

async fn rendezvous_harness(workflows: Vec<Workflow>) -> (Harness, Arc<RendezvousStore>) {
    let store = Arc::new(InMemoryApplicationStore::new());
    let racing = Arc::new(RendezvousStore::new(store.clone()));
    let harness = Harness::over(workflows, store, racing.clone()).await;
    (harness, racing)
}

/// Submitted → Review (manual, `review`) → Decision (automatic, all documents verified)
fn undergrad_fall() -> Workflow {
    Workflow::new(UNDERGRAD, "Undergraduate Fall", UNDERGRAD)
        .active()
        .with_stage(WorkflowStage::new(UNDERGRAD, "submitted", "Submitted", 1))
        .with_stage(
            WorkflowStage::new(UNDERGRAD, "review", "Review", 2)
                .with_documents(&["transcript", "essay"])
                .with_trigger(NotificationTrigger::on_enter(
                    NotificationRecipient::Applicant,
                    "Your application is under review",
                )),
        )
        .with_stage(WorkflowStage::new(UNDERGRAD, "decision", "Decision", 3))
        .with_transition(
            WorkflowTransition::manual(UNDERGRAD, "start_review", "submitted", "review")
                .named("Start review")
                .requires("review"),
        )
        .with_transition(WorkflowTransition::automatic(
            UNDERGRAD,
            "auto_decide",
            "review",
            "decision",
            vec![Condition::all_documents_verified()],
        ))
}

/// Two automatic edges from `review` that can hold at the same time
fn branching() -> Workflow {
    let id = "graduate";
    Workflow::new(id, "Graduate", id)
        .active()
        .with_stage(WorkflowStage::new(id, "review", "Review", 1))
        .with_stage(WorkflowStage::new(id, "rejected", "Rejected", 2))
        .with_stage(WorkflowStage::new(id, "waitlisted", "Waitlisted", 3))
        .with_transition(WorkflowTransition::automatic(
            id,
            "auto_reject",
            "review",
            "rejected",
            vec![Condition::decision_is("reject")],
        ))
        .with_transition(WorkflowTransition::automatic(
            id,
            "auto_waitlist",
            "review",
            "waitlisted",
            vec![Condition::exists("decision")],
        ))
}

#[tokio::test]
async fn test_initialize_is_idempotent() {
    let h = Harness::new(vec![undergrad_fall()]).await;
    let app = h.application(UNDERGRAD).await;

    assert!(h.engine.initialize_application_workflow(app.id, None).await.unwrap());
    assert!(h.engine.initialize_application_workflow(app.id, None).await.unwrap());

    assert_eq!(h.history_len(app.id).await, 1);
    assert_eq!(h.stage_of(app.id).await, Some(StageId::from("submitted")));
    assert_eq!(h.audit.entries().unwrap().len(), 1);
}

#[tokio::test]
async fn test_initialize_without_active_workflow_is_a_no_op() {
    let h = Harness::new(vec![undergrad_fall()]).await;
    let app = h.application("continuing-education").await;

    assert!(!h.engine.initialize_application_workflow(app.id, None).await.unwrap());
    assert_eq!(h.history_len(app.id).await, 0);
    assert!(h.engine.current_status(app.id).await.unwrap().is_none());
    assert!(!h.engine.check_automatic_transitions(app.id).await.unwrap());
}

#[tokio::test]
async fn test_unknown_application() {
    let h = Harness::new(vec![undergrad_fall()]).await;
    let err = h
        .engine
        .initialize_application_workflow(Uuid::new_v4(), None)
        .await
        .unwrap_err();
    assert!(matches!(err, WorkflowError::ApplicationNotFound(_)));
}

#[tokio::test]
async fn test_automatic_check_without_match_changes_nothing() {
    let h = Harness::new(vec![undergrad_fall()]).await;
    let app = h.application(UNDERGRAD).await;
    let reviewer = h.reviewer();
    h.engine.initialize_application_workflow(app.id, None).await.unwrap();
    h.engine
        .execute_transition(app.id, &StageId::from("review"), &reviewer, None)
        .await
        .unwrap();

    // Uploaded but unverified documents do not satisfy the condition
    h.documents.upload(app.id, "transcript").unwrap();
    h.documents.upload(app.id, "essay").unwrap();
    let before = h.history_len(app.id).await;
    let audits_before = h.audit.entries().unwrap().len();

    assert!(!h.engine.check_automatic_transitions(app.id).await.unwrap());
    assert!(!h.engine.check_automatic_transitions(app.id).await.unwrap());

    assert_eq!(h.history_len(app.id).await, before);
    assert_eq!(h.audit.entries().unwrap().len(), audits_before);
    assert_eq!(h.stage_of(app.id).await, Some(StageId::from("review")));
}

#[tokio::test]
async fn test_first_matching_automatic_transition_wins() {
    let h = Harness::new(vec![branching()]).await;
    let app = h.application("graduate").await;
    h.engine.initialize_application_workflow(app.id, None).await.unwrap();

    // "reject" satisfies both auto_reject and auto_waitlist
    let moved = h
        .engine
        .set_attribute(app.id, "decision", json!("reject"))
        .await
        .unwrap();

    assert!(moved);
    assert_eq!(h.stage_of(app.id).await, Some(StageId::from("rejected")));
    let history = h.engine.status_history(app.id).await.unwrap();
    assert_eq!(history.len(), 2);
    assert!(history[1].created_by.is_none());
}

#[tokio::test]
async fn test_available_transitions_respect_permission_subsets() {
    let id = "gated";
    let workflow = Workflow::new(id, "Gated", id)
        .active()
        .with_stage(WorkflowStage::new(id, "start", "Start", 1))
        .with_stage(WorkflowStage::new(id, "a", "A", 2))
        .with_stage(WorkflowStage::new(id, "b", "B", 3))
        .with_stage(WorkflowStage::new(id, "c", "C", 4))
        .with_stage(WorkflowStage::new(id, "d", "D", 5))
        .with_transition(WorkflowTransition::manual(id, "open", "start", "a"))
        .with_transition(WorkflowTransition::manual(id, "review_only", "start", "b").requires("review"))
        .with_transition(
            WorkflowTransition::manual(id, "both", "start", "c")
                .requires("review")
                .requires("decide"),
        )
        .with_transition(WorkflowTransition::automatic(id, "auto", "start", "d", vec![]));

    let h = Harness::new(vec![workflow.clone()]).await;
    let app = h.application(id).await;
    h.engine.initialize_application_workflow(app.id, None).await.unwrap();

    let grants: [&[&str]; 4] = [&[], &["review"], &["decide"], &["review", "decide"]];
    for granted in grants {
        let actor = Actor::new(Uuid::new_v4());
        for permission in granted {
            h.permissions.grant(actor.user_id, permission).unwrap();
        }
        let held: BTreeSet<String> = granted.iter().map(|p| p.to_string()).collect();

        let available: Vec<TransitionId> = h
            .engine
            .available_transitions(app.id, &actor)
            .await
            .unwrap()
            .into_iter()
            .map(|t| t.id)
            .collect();

        let expected: Vec<TransitionId> = workflow
            .transitions
            .iter()
            .filter(|t| !t.is_automatic && t.required_permissions.is_subset(&held))
            .map(|t| t.id.clone())
            .collect();

        assert_eq!(available, expected, "permissions {:?}", granted);
    }
}

#[tokio::test]
async fn test_fault_mid_commit_leaves_pre_transition_state() {
    let h = Harness::new(vec![undergrad_fall()]).await;
    let app = h.application(UNDERGRAD).await;
    let reviewer = h.reviewer();
    h.engine.initialize_application_workflow(app.id, None).await.unwrap();
    let before = h.store.get_application(app.id).await.unwrap().unwrap();
    let mut events = h.engine.events().subscribe();

    h.store.inject_fault(FaultPoint::AfterStatusInsert).unwrap();
    let err = h
        .engine
        .execute_transition(app.id, &StageId::from("review"), &reviewer, None)
        .await
        .unwrap_err();
    assert!(matches!(err, WorkflowError::Storage(_)));

    let after = h.store.get_application(app.id).await.unwrap().unwrap();
    assert_eq!(after, before);
    assert_eq!(h.history_len(app.id).await, 1);
    assert_eq!(h.audit.entries().unwrap().len(), 1);
    assert!(events.try_recv().is_err());
    assert!(h.notifications.sent().unwrap().is_empty());

    // Caller retry succeeds once the fault has cleared
    h.engine
        .execute_transition(app.id, &StageId::from("review"), &reviewer, None)
        .await
        .unwrap();
    assert_eq!(h.stage_of(app.id).await, Some(StageId::from("review")));
}

#[tokio::test]
async fn test_transition_requires_explicit_edge() {
    let id = "sparse";
    let workflow = Workflow::new(id, "Sparse", id)
        .active()
        .with_initial_stage("a")
        .with_stage(WorkflowStage::new(id, "a", "A", 1))
        .with_stage(WorkflowStage::new(id, "b", "B", 2))
        .with_stage(WorkflowStage::new(id, "c", "C", 3))
        .with_transition(WorkflowTransition::manual(id, "skip", "a", "c"))
        .with_transition(WorkflowTransition::manual(id, "back", "c", "b").requires("reopen"))
        .with_transition(WorkflowTransition::automatic(id, "settle", "b", "a", vec![]));

    let h = Harness::new(vec![workflow]).await;
    let app = h.application(id).await;
    let admin = Actor::new(Uuid::new_v4());
    h.permissions.grant(admin.user_id, "reopen").unwrap();
    h.engine.initialize_application_workflow(app.id, None).await.unwrap();

    // a → b is adjacent by sequence but has no edge
    let err = h
        .engine
        .execute_transition(app.id, &StageId::from("b"), &admin, None)
        .await
        .unwrap_err();
    assert!(matches!(err, WorkflowError::InvalidTransition { .. }));
    assert_eq!(h.history_len(app.id).await, 1);

    h.engine
        .execute_transition(app.id, &StageId::from("c"), &admin, None)
        .await
        .unwrap();

    // c → a has no edge either, even though a has a lower sequence
    let err = h
        .engine
        .execute_transition(app.id, &StageId::from("a"), &admin, None)
        .await
        .unwrap_err();
    assert!(matches!(err, WorkflowError::InvalidTransition { .. }));

    // An edge exists but the actor lacks its permission
    let outsider = Actor::new(Uuid::new_v4());
    let err = h
        .engine
        .execute_transition(app.id, &StageId::from("b"), &outsider, None)
        .await
        .unwrap_err();
    match err {
        WorkflowError::Authorization { transition, missing } => {
            assert_eq!(transition, "back");
            assert_eq!(missing, vec!["reopen"]);
        }
        other => panic!("expected Authorization, got {:?}", other),
    }

    // Automatic edges cannot be fired by hand
    h.engine
        .execute_transition(app.id, &StageId::from("b"), &admin, None)
        .await
        .unwrap();
    let err = h
        .engine
        .execute_transition(app.id, &StageId::from("a"), &admin, None)
        .await
        .unwrap_err();
    assert!(matches!(err, WorkflowError::InvalidTransition { .. }));
}

#[tokio::test]
async fn test_undergrad_fall_scenario() {
    let h = Harness::new(vec![undergrad_fall()]).await;
    let app = h.application(UNDERGRAD).await;
    let reviewer = h.reviewer();
    h.engine.initialize_application_workflow(app.id, Some(&reviewer)).await.unwrap();

    let available = h.engine.available_transitions(app.id, &reviewer).await.unwrap();
    let ids: Vec<&str> = available.iter().map(|t| t.id.as_str()).collect();
    assert_eq!(ids, vec!["start_review"]);
    assert_eq!(available[0].source_stage_id, StageId::from("submitted"));
    assert_eq!(available[0].target_stage_id, StageId::from("review"));

    assert!(!h.engine.check_automatic_transitions(app.id).await.unwrap());

    for document in ["transcript", "essay"] {
        h.documents.upload(app.id, document).unwrap();
        h.documents.verify(app.id, document).unwrap();
    }
    h.engine
        .execute_transition(app.id, &StageId::from("review"), &reviewer, Some("Looks complete".into()))
        .await
        .unwrap();

    assert!(h.engine.check_automatic_transitions(app.id).await.unwrap());
    assert_eq!(h.stage_of(app.id).await, Some(StageId::from("decision")));

    let current = h.engine.current_status(app.id).await.unwrap().unwrap();
    assert_eq!(current.stage.unwrap().name, "Decision");
    assert!(current.is_terminal);
    assert!(current.status.created_by.is_none());

    let history = h.engine.status_history(app.id).await.unwrap();
    let stages: Vec<&str> = history.iter().map(|s| s.workflow_stage_id.as_str()).collect();
    assert_eq!(stages, vec!["submitted", "review", "decision"]);
    assert_eq!(history[1].notes.as_deref(), Some("Looks complete"));
    assert_eq!(history[1].created_by, Some(reviewer.user_id));
}

#[tokio::test]
async fn test_side_effects_follow_commit() {
    let h = Harness::new(vec![undergrad_fall()]).await;
    let app = h.application(UNDERGRAD).await;
    let reviewer = h.reviewer();
    let mut events = h.engine.events().subscribe();

    h.engine.initialize_application_workflow(app.id, None).await.unwrap();
    let status = h
        .engine
        .execute_transition(app.id, &StageId::from("review"), &reviewer, None)
        .await
        .unwrap();

    match events.recv().await.unwrap() {
        DomainEvent::ApplicationStatusChanged(e) => {
            assert!(e.old_stage_id.is_none());
            assert_eq!(e.new_stage_id, StageId::from("submitted"));
        }
        other => panic!("unexpected event {:?}", other),
    }
    match events.recv().await.unwrap() {
        DomainEvent::ApplicationStatusChanged(e) => {
            assert_eq!(e.old_stage_id, Some(StageId::from("submitted")));
            assert_eq!(e.new_stage_id, StageId::from("review"));
            assert_eq!(e.transition_id, Some(TransitionId::from("start_review")));
            assert_eq!(e.actor_id, Some(reviewer.user_id));
            assert_eq!(e.status_id, status.id);
        }
        other => panic!("unexpected event {:?}", other),
    }

    let audit = h.audit.entries().unwrap();
    assert_eq!(audit.len(), 2);
    assert_eq!(audit[1].entity_type, "application");
    assert_eq!(audit[1].before["current_stage_id"], json!("submitted"));
    assert_eq!(audit[1].after["current_stage_id"], json!("review"));

    let sent = h.notifications.sent().unwrap();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].user_id, app.applicant_id);
    assert_eq!(sent[0].subject, "Your application is under review");
}

#[tokio::test]
async fn test_notification_outage_does_not_fail_transition() {
    let h = Harness::new(vec![undergrad_fall()]).await;
    let app = h.application(UNDERGRAD).await;
    let reviewer = h.reviewer();
    h.engine.initialize_application_workflow(app.id, None).await.unwrap();
    h.notifications.set_failing(true).unwrap();

    h.engine
        .execute_transition(app.id, &StageId::from("review"), &reviewer, None)
        .await
        .unwrap();
    assert_eq!(h.stage_of(app.id).await, Some(StageId::from("review")));
    assert!(h.notifications.sent().unwrap().is_empty());
}

#[tokio::test]
async fn test_in_flight_applications_keep_their_workflow_version() {
    let h = Harness::new(vec![undergrad_fall()]).await;
    let reviewer = h.reviewer();
    let pinned = h.application(UNDERGRAD).await;
    h.engine.initialize_application_workflow(pinned.id, None).await.unwrap();

    // v2 drops the permission requirement and adds a withdrawal path
    let mut edited = undergrad_fall()
        .with_stage(WorkflowStage::new(UNDERGRAD, "withdrawn", "Withdrawn", 4))
        .with_transition(WorkflowTransition::manual(UNDERGRAD, "withdraw", "submitted", "withdrawn"))
        .with_initial_stage("submitted");
    edited.transitions[0].required_permissions.clear();
    let v2 = h.registry.register_workflow(edited).await.unwrap();
    assert_eq!(v2.version, 2);

    let outsider = Actor::new(Uuid::new_v4());
    let err = h
        .engine
        .execute_transition(pinned.id, &StageId::from("withdrawn"), &reviewer, None)
        .await
        .unwrap_err();
    assert!(matches!(err, WorkflowError::InvalidTransition { .. }));
    assert!(h.engine.available_transitions(pinned.id, &outsider).await.unwrap().is_empty());

    let fresh = h.application(UNDERGRAD).await;
    h.engine.initialize_application_workflow(fresh.id, None).await.unwrap();
    let reloaded = h.engine.get_application(fresh.id).await.unwrap();
    assert_eq!(reloaded.workflow.map(|w| w.version), Some(2));
    h.engine
        .execute_transition(fresh.id, &StageId::from("withdrawn"), &outsider, None)
        .await
        .unwrap();

    let old = h.engine.get_application(pinned.id).await.unwrap();
    assert_eq!(old.workflow.map(|w| (w.workflow_id, w.version)), Some((WorkflowId::from(UNDERGRAD), 1)));
}

#[tokio::test]
async fn test_racing_transitions_produce_one_outcome() {
    let id = "fork";
    let workflow = Workflow::new(id, "Fork", id)
        .active()
        .with_stage(WorkflowStage::new(id, "review", "Review", 1))
        .with_stage(WorkflowStage::new(id, "admitted", "Admitted", 2))
        .with_stage(WorkflowStage::new(id, "rejected", "Rejected", 3))
        .with_transition(WorkflowTransition::manual(id, "admit", "review", "admitted"))
        .with_transition(WorkflowTransition::manual(id, "reject", "review", "rejected"));

    let (h, racing) = rendezvous_harness(vec![workflow]).await;
    let app = h.application(id).await;
    let actor = Actor::new(Uuid::new_v4());
    h.engine.initialize_application_workflow(app.id, None).await.unwrap();
    let mut events = h.engine.events().subscribe();

    // Both requests authorize against `review`, then commit together
    racing.commits.arm();
    let admitted = StageId::from("admitted");
    let rejected = StageId::from("rejected");
    let (a, b) = tokio::join!(
        h.engine.execute_transition(app.id, &admitted, &actor, None),
        h.engine.execute_transition(app.id, &rejected, &actor, None),
    );

    assert_eq!([a.is_ok(), b.is_ok()].iter().filter(|ok| **ok).count(), 1);
    let (winner, loser) = if a.is_ok() { (a, b) } else { (b, a) };
    assert!(matches!(loser, Err(WorkflowError::ConcurrentModification { .. })));

    let winner = winner.unwrap();
    assert_eq!(h.stage_of(app.id).await, Some(winner.workflow_stage_id.clone()));
    assert_eq!(h.history_len(app.id).await, 2);

    // Only the committed move announces itself
    assert!(matches!(events.try_recv(), Ok(DomainEvent::ApplicationStatusChanged(_))));
    assert!(events.try_recv().is_err());
}

#[tokio::test]
async fn test_racing_submissions_announce_once() {
    let (h, racing) = rendezvous_harness(vec![undergrad_fall()]).await;
    let app = h.application(UNDERGRAD).await;
    let applicant = Actor::new(app.applicant_id);
    let mut events = h.engine.events().subscribe();

    // Both see a draft, then flip the flag together
    racing.submissions.arm();
    let (a, b) = tokio::join!(
        h.engine.submit_application(app.id, &applicant),
        h.engine.submit_application(app.id, &applicant),
    );
    assert!(a.unwrap().is_submitted);
    assert!(b.unwrap().is_submitted);

    let submissions = h
        .audit
        .entries()
        .unwrap()
        .into_iter()
        .filter(|e| e.entity_type == "application" && e.after == json!({ "is_submitted": true }))
        .count();
    assert_eq!(submissions, 1);

    let mut announced = 0;
    while let Ok(event) = events.try_recv() {
        if matches!(event, DomainEvent::ApplicationSubmitted(_)) {
            announced += 1;
        }
    }
    assert_eq!(announced, 1);
    assert_eq!(h.history_len(app.id).await, 1);
}

#[tokio::test]
async fn test_submission_checks_completeness() {
    let h = Harness::new(vec![undergrad_fall()]).await;
    let app = h.application(UNDERGRAD).await;
    let applicant = Actor::new(app.applicant_id);
    let reviewer = h.reviewer();
    h.engine.initialize_application_workflow(app.id, None).await.unwrap();
    h.engine
        .execute_transition(app.id, &StageId::from("review"), &reviewer, None)
        .await
        .unwrap();

    let stranger = Actor::new(Uuid::new_v4());
    assert!(matches!(
        h.engine.submit_application(app.id, &stranger).await,
        Err(WorkflowError::Authorization { .. })
    ));

    h.documents.upload(app.id, "transcript").unwrap();
    match h.engine.submit_application(app.id, &applicant).await {
        Err(WorkflowError::RequirementsNotMet { missing }) => {
            assert_eq!(missing.documents, vec!["essay", "transcript"]);
        }
        other => panic!("expected RequirementsNotMet, got {:?}", other),
    }
    assert!(h.engine.get_application(app.id).await.unwrap().is_draft());

    let mut events = h.engine.events().subscribe();
    for document in ["transcript", "essay"] {
        h.documents.upload(app.id, document).unwrap();
        h.documents.verify(app.id, document).unwrap();
    }
    let submitted = h.engine.submit_application(app.id, &applicant).await.unwrap();

    assert!(submitted.is_submitted);
    assert!(matches!(events.recv().await.unwrap(), DomainEvent::ApplicationSubmitted(_)));
    // Submission re-checks automatic transitions; verified documents move it on
    assert_eq!(submitted.current_stage_id, Some(StageId::from("decision")));
}

#[tokio::test]
async fn test_submission_initializes_workflow() {
    let h = Harness::new(vec![undergrad_fall()]).await;
    let app = h.application(UNDERGRAD).await;
    let applicant = Actor::new(app.applicant_id);

    let submitted = h.engine.submit_application(app.id, &applicant).await.unwrap();
    assert!(submitted.is_submitted);
    assert_eq!(submitted.current_stage_id, Some(StageId::from("submitted")));
    assert_eq!(h.history_len(app.id).await, 1);
}
