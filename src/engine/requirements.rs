// Requirement evaluator - what a stage is still missing

//! # Requirement Evaluator
//!
//! Given an application and a stage, works out which required documents and
//! actions are outstanding. Two predicates exist:
//!
//! - [`RequirementEvaluator::evaluate`]: documents must be **uploaded** (and
//!   not deleted); verification is not checked. Used for stage progress and
//!   the `requirements_met` condition key.
//! - [`RequirementEvaluator::check_application_complete`]: documents must be
//!   uploaded **and verified**. Used before submission; fails with
//!   `RequirementsNotMet`.
//!
//! Both are pure reads over the collaborators and safe to call repeatedly
//! and concurrently.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::ports::{ActionChecker, DocumentStore};
use crate::models::{Application, WorkflowStage};
use crate::{Result, WorkflowError};

/// Outstanding items for a stage, sorted by identifier
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MissingItems {
    pub documents: Vec<String>,
    pub actions: Vec<String>,
}

impl MissingItems {
    pub fn is_empty(&self) -> bool {
        self.documents.is_empty() && self.actions.is_empty()
    }
}

impl fmt::Display for MissingItems {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return write!(f, "nothing missing");
        }

        let mut parts = Vec::new();
        if !self.documents.is_empty() {
            parts.push(format!("documents [{}]", self.documents.join(", ")));
        }
        if !self.actions.is_empty() {
            parts.push(format!("actions [{}]", self.actions.join(", ")));
        }
        write!(f, "{}", parts.join("; "))
    }
}

/// Structured result of a requirement check
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequirementCheck {
    pub met: bool,
    pub missing: MissingItems,
}

impl RequirementCheck {
    fn from_missing(missing: MissingItems) -> Self {
        Self {
            met: missing.is_empty(),
            missing,
        }
    }
}

/// Evaluates stage requirements against the document store and action checker
#[derive(Clone)]
pub struct RequirementEvaluator {
    documents: Arc<dyn DocumentStore>,
    actions: Arc<dyn ActionChecker>,
}

impl RequirementEvaluator {
    pub fn new(documents: Arc<dyn DocumentStore>, actions: Arc<dyn ActionChecker>) -> Self {
        Self { documents, actions }
    }

    /// Uploaded documents and completed actions for `stage`
    pub async fn evaluate(&self, application: &Application, stage: &WorkflowStage) -> Result<RequirementCheck> {
        let mut missing = MissingItems::default();

        for document_type in &stage.required_documents {
            if !self.documents.has_document(application.id, document_type).await? {
                missing.documents.push(document_type.clone());
            }
        }
        missing.actions = self.missing_actions(application, stage).await?;

        Ok(RequirementCheck::from_missing(missing))
    }

    /// Stricter completeness check: documents must also be verified
    ///
    /// Unverified documents are reported under `missing.documents` alongside
    /// ones never uploaded.
    pub async fn check_application_complete(
        &self,
        application: &Application,
        stage: &WorkflowStage,
    ) -> Result<()> {
        let missing = MissingItems {
            documents: self.unverified_documents(application, stage).await?,
            actions: self.missing_actions(application, stage).await?,
        };

        if missing.is_empty() {
            Ok(())
        } else {
            Err(WorkflowError::RequirementsNotMet { missing })
        }
    }

    /// Every required document of `stage` is verified (vacuously true when none)
    pub async fn all_documents_verified(&self, application: &Application, stage: &WorkflowStage) -> Result<bool> {
        Ok(self.unverified_documents(application, stage).await?.is_empty())
    }

    /// Upload state per required document type: `(type, uploaded, verified)`
    pub async fn document_states(
        &self,
        application: &Application,
        stage: &WorkflowStage,
    ) -> Result<Vec<(String, bool, bool)>> {
        let mut states = Vec::with_capacity(stage.required_documents.len());
        for document_type in &stage.required_documents {
            let uploaded = self.documents.has_document(application.id, document_type).await?;
            let verified = uploaded && self.documents.is_verified(application.id, document_type).await?;
            states.push((document_type.clone(), uploaded, verified));
        }
        Ok(states)
    }

    async fn unverified_documents(&self, application: &Application, stage: &WorkflowStage) -> Result<Vec<String>> {
        let mut unverified = Vec::new();
        for document_type in &stage.required_documents {
            if !self.documents.is_verified(application.id, document_type).await? {
                unverified.push(document_type.clone());
            }
        }
        Ok(unverified)
    }

    async fn missing_actions(&self, application: &Application, stage: &WorkflowStage) -> Result<Vec<String>> {
        let mut missing = Vec::new();
        for action in &stage.required_actions {
            if !self.actions.is_complete(application, action).await? {
                missing.push(action.clone());
            }
        }
        Ok(missing)
    }
}
