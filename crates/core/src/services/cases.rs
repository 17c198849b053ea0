//! Case workflow orchestration.
//!
//! [`CaseService::attempt_transition`] wraps the pure state machine with persistence and
//! side effects:
//!
//! 1. resolve the actor, case and (for `assign`) the target reviewer
//! 2. plan the transition: table lookup, actor check, guard
//! 3. commit status, field effect and history entry with one compare-and-swap
//! 4. dispatch the destination's notification
//! 5. on completion, render the report and attach its QR code
//!
//! Steps 4 and 5 run after the commit. Their failures come back as [`Warning`]s on a
//! successful [`TransitionOutcome`]; the committed status is never rolled back.

use super::notifications::{Dispatched, NotificationEvent, NotificationSink, Recipients};
use super::principals::require_active;
use crate::collaborators::{AuditEvent, AuditSink, QrGenerator, ReportRenderer};
use crate::config::CoreConfig;
use crate::constants::CASE_NUMBER_PREFIX;
use crate::error::{CoreError, CoreResult, Warning};
use crate::models::{
    Case, CaseContentUpdate, CaseFilter, CaseReport, ClinicalContent, EntityKind,
    NotificationKind, PatientInfo, PrincipalRecord, RelatedEntity, SoapNote,
};
use crate::store::{CaseStore, PrincipalDirectory, StatusUpdate};
use casebook_policy::Role;
use casebook_types::NonEmptyText;
use casebook_uuid::RecordId;
use casebook_workflow::{
    available_triggers, plan_transition, Audience, CaseStatus, TransitionContext,
    TransitionPayload, Trigger,
};
use chrono::{Datelike, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

const CASE_SEQUENCE: &str = "case";

/// Input for creating a case.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct NewCase {
    /// Owning student; defaults to the acting principal.
    #[serde(default)]
    pub student: Option<RecordId>,
    pub title: String,
    #[serde(default)]
    pub patient_info: PatientInfo,
    #[serde(default)]
    pub medical_history: String,
    #[serde(default)]
    pub soap_note: SoapNote,
    #[serde(default)]
    pub case_details: String,
}

/// Result of a committed transition.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TransitionOutcome {
    pub case: Case,
    /// Post-commit side effects that failed.
    pub warnings: Vec<Warning>,
    /// Notifications created for this transition.
    pub notifications: Vec<RecordId>,
}

#[derive(Clone)]
pub struct CaseService {
    config: Arc<CoreConfig>,
    cases: Arc<dyn CaseStore>,
    principals: Arc<dyn PrincipalDirectory>,
    notifier: Arc<dyn NotificationSink>,
    renderer: Arc<dyn ReportRenderer>,
    qr: Arc<dyn QrGenerator>,
    audit: Arc<dyn AuditSink>,
}

impl CaseService {
    pub fn new(
        config: Arc<CoreConfig>,
        cases: Arc<dyn CaseStore>,
        principals: Arc<dyn PrincipalDirectory>,
        notifier: Arc<dyn NotificationSink>,
        renderer: Arc<dyn ReportRenderer>,
        qr: Arc<dyn QrGenerator>,
        audit: Arc<dyn AuditSink>,
    ) -> Self {
        Self {
            config,
            cases,
            principals,
            notifier,
            renderer,
            qr,
            audit,
        }
    }

    fn actor(&self, id: RecordId) -> CoreResult<PrincipalRecord> {
        require_active(self.principals.as_ref(), id)
    }

    fn load(&self, id: RecordId) -> CoreResult<Case> {
        self.cases
            .find_case(id)?
            .filter(|case| !case.deleted)
            .ok_or_else(|| CoreError::not_found("case", id))
    }

    fn load_visible(&self, actor: &PrincipalRecord, id: RecordId) -> CoreResult<Case> {
        let case = self.load(id)?;
        if !case.is_visible_to(&actor.principal()) {
            return Err(CoreError::Authorization(format!(
                "principal {} may not view case {}",
                actor.id, case.case_number
            )));
        }
        Ok(case)
    }

    fn audit(&self, action: &'static str, case: &Case, actor: RecordId, details: String) {
        self.audit.record(&AuditEvent {
            action,
            entity: "case",
            entity_id: case.id,
            actor,
            details,
        });
    }

    /// Creates a draft case.
    ///
    /// Students create cases for themselves; managers and super-admins may create one on
    /// behalf of a student. Staff may not create cases.
    pub fn create_case(&self, actor_id: RecordId, input: NewCase) -> CoreResult<Case> {
        let actor = self.actor(actor_id)?;
        let student_id = input.student.unwrap_or(actor.id);

        match actor.role {
            Role::Student if student_id != actor.id => {
                return Err(CoreError::Authorization(
                    "students may only create their own cases".into(),
                ))
            }
            Role::Student | Role::Manager | Role::SuperAdmin => {}
            Role::Staff => {
                return Err(CoreError::Authorization(
                    "staff may not create cases".into(),
                ))
            }
        }

        let student = self
            .principals
            .find_principal(student_id)?
            .ok_or_else(|| CoreError::not_found("principal", student_id))?;
        if student.role != Role::Student {
            return Err(CoreError::Validation(format!(
                "case owner must be a student, not {}",
                student.role
            )));
        }

        let title = NonEmptyText::new(&input.title)
            .map_err(|_| CoreError::Validation("case title cannot be empty".into()))?;
        let content = ClinicalContent {
            title,
            patient_info: input.patient_info,
            medical_history: input.medical_history,
            soap_note: input.soap_note,
            case_details: input.case_details,
        };

        let now = Utc::now();
        let sequence = self.cases.next_sequence(CASE_SEQUENCE)?;
        let case_number = format!("{CASE_NUMBER_PREFIX}-{}-{sequence:05}", now.year());

        let case = Case::draft(case_number, &student.principal(), content, actor.id, now);
        self.cases.insert_case(&case)?;

        tracing::info!(case_id = %case.id, case_number = %case.case_number, "case created");
        self.audit("case.created", &case, actor.id, case.case_number.clone());
        Ok(case)
    }

    pub fn get_case(&self, actor_id: RecordId, case_id: RecordId) -> CoreResult<Case> {
        let actor = self.actor(actor_id)?;
        self.load_visible(&actor, case_id)
    }

    /// Cases matching `filter` that the actor may view. Students only ever see their own.
    pub fn list_cases(&self, actor_id: RecordId, mut filter: CaseFilter) -> CoreResult<Vec<Case>> {
        let actor = self.actor(actor_id)?;
        if actor.role == Role::Student {
            filter.student = Some(actor.id);
        }

        let principal = actor.principal();
        Ok(self
            .cases
            .list_cases(&filter)?
            .into_iter()
            .filter(|case| case.is_visible_to(&principal))
            .collect())
    }

    /// Edits clinical content. Owner only, and only while the case is editable.
    pub fn update_content(
        &self,
        actor_id: RecordId,
        case_id: RecordId,
        update: CaseContentUpdate,
    ) -> CoreResult<Case> {
        let actor = self.actor(actor_id)?;
        let case = self.load_visible(&actor, case_id)?;

        if case.student != actor.id {
            return Err(CoreError::Authorization(
                "only the case owner may edit its content".into(),
            ));
        }
        if update.is_empty() {
            return Err(CoreError::Validation("no fields to update".into()));
        }

        let case = self.cases.update_content(case_id, &update, Utc::now())?;
        self.audit("case.updated", &case, actor.id, String::new());
        Ok(case)
    }

    /// Soft-deletes a case. Students may only delete their own drafts; staff never may.
    pub fn delete_case(&self, actor_id: RecordId, case_id: RecordId) -> CoreResult<()> {
        let actor = self.actor(actor_id)?;
        let case = self.load_visible(&actor, case_id)?;

        match actor.role {
            Role::Manager | Role::SuperAdmin => {}
            Role::Student if case.student == actor.id => {
                if case.status != CaseStatus::Draft {
                    return Err(CoreError::InvalidStateTransition(format!(
                        "case {} is {}; students may only delete drafts",
                        case.case_number, case.status
                    )));
                }
            }
            Role::Student | Role::Staff => {
                return Err(CoreError::Authorization(format!(
                    "principal {} may not delete case {}",
                    actor.id, case.case_number
                )))
            }
        }

        let case = self.cases.mark_case_deleted(case_id, Utc::now())?;
        tracing::info!(case_id = %case.id, "case deleted");
        self.audit("case.deleted", &case, actor.id, String::new());
        Ok(())
    }

    /// Triggers the actor could fire on the case right now, ignoring payload guards.
    pub fn available_triggers(
        &self,
        actor_id: RecordId,
        case_id: RecordId,
    ) -> CoreResult<Vec<Trigger>> {
        let actor = self.actor(actor_id)?;
        let case = self.load_visible(&actor, case_id)?;
        Ok(available_triggers(&case.facts(), &actor.principal()))
    }

    /// Moves a case along the workflow.
    ///
    /// # Errors
    ///
    /// - `InvalidStateTransition` if the trigger is not valid from the current status, or
    ///   another writer changed the status first
    /// - `Authorization` if the actor may not fire the trigger
    /// - `Validation` if the payload fails the trigger's guard
    ///
    /// Nothing is written when an error is returned.
    pub fn attempt_transition(
        &self,
        case_id: RecordId,
        trigger: Trigger,
        actor_id: RecordId,
        payload: TransitionPayload,
    ) -> CoreResult<TransitionOutcome> {
        let actor = self.actor(actor_id)?.principal();
        let case = self.load(case_id)?;

        let assignee = match payload.assignee {
            Some(id) => self
                .principals
                .find_principal(id)?
                .filter(|p| p.active)
                .map(|p| p.principal()),
            None => None,
        };

        let ctx = TransitionContext {
            case: case.facts(),
            actor: &actor,
            payload: &payload,
            assignee: assignee.as_ref(),
            max_revision_requests: self.config.max_revision_requests(),
            now: Utc::now(),
        };
        let plan = plan_transition(trigger, &ctx)?;
        let audience = plan.audience;
        let update = StatusUpdate::planned(plan, &case);

        let mut case = self.cases.update_status_atomic(case_id, &update)?;

        tracing::info!(
            case_id = %case.id,
            case_number = %case.case_number,
            from = %update.expected,
            to = %update.next,
            actor = %actor.id,
            "case transition committed"
        );
        self.audit(
            "case.transition",
            &case,
            actor.id,
            format!("{trigger}: {} -> {}", update.expected, update.next),
        );

        let mut warnings = Vec::new();

        let notifications = match self.notify(&case, audience, actor.id, &update) {
            Ok(dispatched) => {
                for failure in dispatched.failures {
                    tracing::warn!(case_id = %case.id, "notification not stored: {failure}");
                    warnings.push(Warning::Notification(failure));
                }
                dispatched.notifications
            }
            Err(e) => {
                tracing::warn!(case_id = %case.id, "notification dispatch failed: {e}");
                warnings.push(Warning::Notification(e.to_string()));
                Vec::new()
            }
        };

        if case.status == CaseStatus::Completed {
            match self.generate_report(&case) {
                Ok(updated) => case = updated,
                Err(e) => {
                    tracing::warn!(case_id = %case.id, "report generation failed: {e}");
                    warnings.push(Warning::ReportGeneration(e.to_string()));
                }
            }
        }

        Ok(TransitionOutcome {
            case,
            warnings,
            notifications,
        })
    }

    /// Renders the report again for a completed or archived case.
    ///
    /// Unlike the completion transition, failures here are returned as errors.
    pub fn regenerate_report(&self, actor_id: RecordId, case_id: RecordId) -> CoreResult<Case> {
        let actor = self.actor(actor_id)?;
        let case = self.load_visible(&actor, case_id)?;

        if !case.status.requires_evaluation() {
            return Err(CoreError::InvalidStateTransition(format!(
                "case {} is {}; only reviewed cases have a report",
                case.case_number, case.status
            )));
        }
        if !actor.principal().is_elevated() && case.assigned_to != Some(actor.id) {
            return Err(CoreError::Authorization(
                "only the reviewer or a manager may regenerate a report".into(),
            ));
        }

        let case = self.generate_report(&case)?;
        self.audit("case.report_regenerated", &case, actor.id, String::new());
        Ok(case)
    }

    fn generate_report(&self, case: &Case) -> CoreResult<Case> {
        let artifact = self.renderer.render(case)?;
        let qr = self.qr.generate(&artifact.relative_path, &case.case_number)?;
        let report = CaseReport {
            artifact,
            qr,
            generated_at: Utc::now(),
        };
        self.cases.set_report(case.id, report)
    }

    fn notify(
        &self,
        case: &Case,
        audience: Audience,
        sender: RecordId,
        update: &StatusUpdate,
    ) -> CoreResult<Dispatched> {
        let Some(kind) = NotificationKind::for_status(case.status) else {
            return Ok(Dispatched::default());
        };

        let recipients = match audience {
            Audience::DepartmentManagers => Recipients::RoleInDepartment {
                role: Role::Manager,
                department: case.department.clone(),
            },
            Audience::Assignee => Recipients::One(case.assigned_to.ok_or_else(|| {
                CoreError::Validation(format!("case {} has no assignee", case.case_number))
            })?),
            Audience::Owner => Recipients::One(case.student),
        };

        let event = NotificationEvent {
            recipients,
            sender: Some(sender),
            kind,
            message: notification_message(case, &update.history.note),
            related: Some(RelatedEntity {
                entity: EntityKind::Case,
                id: case.id,
            }),
        };
        self.notifier.dispatch(&event)
    }
}

fn notification_message(case: &Case, note: &str) -> String {
    let subject = format!("{} \"{}\"", case.case_number, case.content.title);
    match case.status {
        CaseStatus::RevisionRequested => {
            let description = case
                .revision_requests
                .last()
                .map(|r| r.description.as_str())
                .unwrap_or(note);
            format!("{subject} needs revision: {description}")
        }
        CaseStatus::Completed => match &case.evaluation {
            Some(e) => format!(
                "{subject} has been reviewed. Score: {}/{}",
                e.score, e.max_score
            ),
            None => format!("{subject} has been reviewed."),
        },
        status => format!("{subject} is now {status}: {note}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::{CollaboratorError, Collaborators};
    use crate::models::{NewPrincipal, NotificationKind};
    use crate::store::{CaseStore, YamlRecordStore};
    use crate::Casebook;
    use casebook_files::{FileMetadata, FilesService};
    use std::sync::Barrier;
    use tempfile::TempDir;

    struct FailingRenderer;

    impl ReportRenderer for FailingRenderer {
        fn render(&self, _case: &Case) -> Result<FileMetadata, CollaboratorError> {
            Err(CollaboratorError::new("report renderer", "template missing"))
        }
    }

    struct World {
        _temp: TempDir,
        store: Arc<YamlRecordStore>,
        casebook: Casebook,
        student: PrincipalRecord,
        staff: PrincipalRecord,
        other_staff: PrincipalRecord,
        manager: PrincipalRecord,
    }

    fn world_with(max_revisions: Option<u32>, failing_renderer: bool) -> World {
        let temp = TempDir::new().unwrap();
        let config = Arc::new(
            CoreConfig::new(
                temp.path().to_path_buf(),
                "https://casebook.example".into(),
                max_revisions,
            )
            .unwrap(),
        );
        config.ensure_layout().unwrap();

        let store = Arc::new(YamlRecordStore::new(&config.records_dir()).unwrap());
        let files = FilesService::new(&config.files_dir()).unwrap();
        let mut collaborators = Collaborators::defaults(&config, files.clone());
        if failing_renderer {
            collaborators.renderer = Arc::new(FailingRenderer);
        }
        let casebook = Casebook::with_store(config, store.clone(), files, collaborators);

        let register = |name: &str, role: Role| {
            casebook
                .principals
                .register(NewPrincipal {
                    name: name.into(),
                    email: format!("{}@example.org", name.to_lowercase()),
                    role,
                    department: Some("internal-medicine".into()),
                    email_notifications: false,
                })
                .unwrap()
        };
        let student = register("Sam", Role::Student);
        let staff = register("Tess", Role::Staff);
        let other_staff = register("Omar", Role::Staff);
        let manager = register("Mina", Role::Manager);

        World {
            _temp: temp,
            store,
            casebook,
            student,
            staff,
            other_staff,
            manager,
        }
    }

    fn world() -> World {
        world_with(None, false)
    }

    fn new_case(w: &World) -> Case {
        w.casebook
            .cases
            .create_case(
                w.student.id,
                NewCase {
                    title: "Community-acquired pneumonia".into(),
                    ..NewCase::default()
                },
            )
            .unwrap()
    }

    fn fire(
        w: &World,
        case: &Case,
        trigger: Trigger,
        actor: &PrincipalRecord,
        payload: TransitionPayload,
    ) -> CoreResult<TransitionOutcome> {
        w.casebook
            .cases
            .attempt_transition(case.id, trigger, actor.id, payload)
    }

    /// Drives a fresh case to `in_review` with `w.staff` as reviewer.
    fn in_review(w: &World) -> Case {
        let case = new_case(w);
        fire(w, &case, Trigger::Submit, &w.student, TransitionPayload::default()).unwrap();
        fire(w, &case, Trigger::Assign, &w.manager, TransitionPayload::assign(w.staff.id))
            .unwrap();
        fire(w, &case, Trigger::StartReview, &w.staff, TransitionPayload::default())
            .unwrap()
            .case
    }

    #[test]
    fn fresh_case_is_a_numbered_draft() {
        let w = world();
        let case = new_case(&w);

        assert_eq!(case.status, CaseStatus::Draft);
        assert_eq!(case.workflow_history.len(), 1);
        assert!(case.assigned_to.is_none());
        assert!(case.evaluation.is_none());
        assert!(case.case_number.starts_with("CASE-"));
        assert!(case.case_number.ends_with("-00001"));
        assert_eq!(case.department, w.student.department);

        let second = new_case(&w);
        assert!(second.case_number.ends_with("-00002"));
    }

    #[test]
    fn staff_cannot_create_cases_and_students_only_their_own() {
        let w = world();
        let err = w
            .casebook
            .cases
            .create_case(
                w.staff.id,
                NewCase {
                    title: "x".into(),
                    ..NewCase::default()
                },
            )
            .unwrap_err();
        assert!(matches!(err, CoreError::Authorization(_)));

        let on_behalf = w
            .casebook
            .cases
            .create_case(
                w.manager.id,
                NewCase {
                    student: Some(w.student.id),
                    title: "Gout".into(),
                    ..NewCase::default()
                },
            )
            .unwrap();
        assert_eq!(on_behalf.student, w.student.id);
        assert_eq!(on_behalf.created_by, w.manager.id);
    }

    #[test]
    fn every_invalid_pair_is_rejected_without_change() {
        let w = world();
        let case = new_case(&w);
        let before = w.store.find_case(case.id).unwrap().unwrap();

        for trigger in Trigger::ALL {
            if trigger == Trigger::Submit {
                continue;
            }
            let err = fire(&w, &case, trigger, &w.manager, TransitionPayload::default())
                .unwrap_err();
            assert!(
                matches!(err, CoreError::InvalidStateTransition(_)),
                "{trigger} from draft gave {err:?}"
            );
        }

        assert_eq!(w.store.find_case(case.id).unwrap().unwrap(), before);
    }

    #[test]
    fn submit_notifies_department_managers() {
        let w = world();
        let case = new_case(&w);

        let outcome = fire(&w, &case, Trigger::Submit, &w.student, TransitionPayload::default())
            .unwrap();
        assert_eq!(outcome.case.status, CaseStatus::Submitted);
        assert_eq!(outcome.notifications.len(), 1);
        assert!(outcome.warnings.is_empty());

        let inbox = w
            .casebook
            .notifications
            .list_for_recipient(w.manager.id, false)
            .unwrap();
        assert_eq!(inbox.len(), 1);
        assert_eq!(inbox[0].kind, NotificationKind::CaseSubmitted);
        assert_eq!(inbox[0].sender, Some(w.student.id));
    }

    #[test]
    fn only_owner_may_submit() {
        let w = world();
        let case = new_case(&w);
        let err = fire(&w, &case, Trigger::Submit, &w.staff, TransitionPayload::default())
            .unwrap_err();
        assert!(matches!(err, CoreError::Authorization(_)));
    }

    #[test]
    fn assign_requires_staff_target() {
        let w = world();
        let case = new_case(&w);
        fire(&w, &case, Trigger::Submit, &w.student, TransitionPayload::default()).unwrap();

        let err = fire(
            &w,
            &case,
            Trigger::Assign,
            &w.manager,
            TransitionPayload::assign(w.student.id),
        )
        .unwrap_err();
        assert!(matches!(err, CoreError::Validation(_)));

        let outcome = fire(
            &w,
            &case,
            Trigger::Assign,
            &w.manager,
            TransitionPayload::assign(w.staff.id),
        )
        .unwrap();
        assert_eq!(outcome.case.assigned_to, Some(w.staff.id));
        let inbox = w
            .casebook
            .notifications
            .list_for_recipient(w.staff.id, false)
            .unwrap();
        assert_eq!(inbox[0].kind, NotificationKind::CaseAssigned);
    }

    #[test]
    fn only_assigned_reviewer_may_start_review() {
        let w = world();
        let case = new_case(&w);
        fire(&w, &case, Trigger::Submit, &w.student, TransitionPayload::default()).unwrap();
        fire(&w, &case, Trigger::Assign, &w.manager, TransitionPayload::assign(w.staff.id))
            .unwrap();

        for intruder in [&w.other_staff, &w.manager, &w.student] {
            let err = fire(&w, &case, Trigger::StartReview, intruder, TransitionPayload::default())
                .unwrap_err();
            assert!(matches!(err, CoreError::Authorization(_)));
        }
    }

    #[test]
    fn revision_scenario_records_request_and_notifies_student() {
        let w = world();
        let case = in_review(&w);

        let outcome = fire(
            &w,
            &case,
            Trigger::RequestRevision,
            &w.staff,
            TransitionPayload::revision("add dosage rationale"),
        )
        .unwrap();

        let case = outcome.case;
        assert_eq!(case.status, CaseStatus::RevisionRequested);
        assert_eq!(case.revision_requests.len(), 1);
        assert_eq!(
            case.revision_requests[0].description.as_str(),
            "add dosage rationale"
        );
        assert_eq!(case.revision_requests[0].requested_by, w.staff.id);
        assert_eq!(case.assigned_to, Some(w.staff.id));

        let inbox = w
            .casebook
            .notifications
            .list_for_recipient(w.student.id, false)
            .unwrap();
        let revision: Vec<_> = inbox
            .iter()
            .filter(|n| n.kind == NotificationKind::RevisionRequested)
            .collect();
        assert_eq!(revision.len(), 1);
        assert!(revision[0].message.contains("add dosage rationale"));
    }

    #[test]
    fn student_edits_during_revision_and_resubmits() {
        let w = world();
        let case = in_review(&w);
        fire(
            &w,
            &case,
            Trigger::RequestRevision,
            &w.staff,
            TransitionPayload::revision("add dosage rationale"),
        )
        .unwrap();

        let updated = w
            .casebook
            .cases
            .update_content(
                w.student.id,
                case.id,
                CaseContentUpdate {
                    case_details: Some("amoxicillin 1g tds, renal function normal".into()),
                    ..CaseContentUpdate::default()
                },
            )
            .unwrap();
        assert!(updated.content.case_details.contains("amoxicillin"));

        let outcome =
            fire(&w, &case, Trigger::Submit, &w.student, TransitionPayload::default()).unwrap();
        assert_eq!(outcome.case.status, CaseStatus::Submitted);
        assert!(outcome.case.assigned_to.is_none());
        assert_eq!(
            outcome.case.workflow_history.last().unwrap().note,
            "Case resubmitted after revision"
        );
    }

    #[test]
    fn revision_cap_is_enforced() {
        let w = world_with(Some(1), false);
        let case = in_review(&w);
        fire(
            &w,
            &case,
            Trigger::RequestRevision,
            &w.staff,
            TransitionPayload::revision("first"),
        )
        .unwrap();
        fire(&w, &case, Trigger::Submit, &w.student, TransitionPayload::default()).unwrap();
        fire(&w, &case, Trigger::Assign, &w.manager, TransitionPayload::assign(w.staff.id))
            .unwrap();
        fire(&w, &case, Trigger::StartReview, &w.staff, TransitionPayload::default()).unwrap();

        let err = fire(
            &w,
            &case,
            Trigger::RequestRevision,
            &w.staff,
            TransitionPayload::revision("second"),
        )
        .unwrap_err();
        assert!(matches!(err, CoreError::Validation(_)));
    }

    #[test]
    fn completion_sets_evaluation_and_attaches_report() {
        let w = world();
        let case = in_review(&w);

        let outcome = fire(
            &w,
            &case,
            Trigger::CompleteReview,
            &w.staff,
            TransitionPayload::evaluation(85.0, 100.0, "Well reasoned"),
        )
        .unwrap();

        assert!(outcome.warnings.is_empty());
        let case = outcome.case;
        assert_eq!(case.status, CaseStatus::Completed);
        let evaluation = case.evaluation.as_ref().unwrap();
        assert_eq!(evaluation.score, 85.0);
        assert_eq!(evaluation.evaluated_by, w.staff.id);

        let report = case.report.as_ref().unwrap();
        assert!(report
            .qr
            .url
            .starts_with("https://casebook.example/verify/"));
        assert_eq!(w.store.find_case(case.id).unwrap().unwrap().report, case.report);
    }

    #[test]
    fn renderer_failure_is_a_warning_not_a_rollback() {
        let w = world_with(None, true);
        let case = in_review(&w);

        let outcome = fire(
            &w,
            &case,
            Trigger::CompleteReview,
            &w.staff,
            TransitionPayload::evaluation(85.0, 100.0, "Well reasoned"),
        )
        .unwrap();

        assert_eq!(outcome.case.status, CaseStatus::Completed);
        assert_eq!(outcome.case.evaluation.as_ref().unwrap().score, 85.0);
        assert!(outcome.case.report.is_none());
        assert!(matches!(
            outcome.warnings.as_slice(),
            [Warning::ReportGeneration(_)]
        ));

        let stored = w.store.find_case(case.id).unwrap().unwrap();
        assert_eq!(stored.status, CaseStatus::Completed);

        let inbox = w
            .casebook
            .notifications
            .list_for_recipient(w.student.id, false)
            .unwrap();
        assert!(inbox
            .iter()
            .any(|n| n.kind == NotificationKind::ReviewCompleted && n.message.contains("85")));
    }

    #[test]
    fn completion_without_score_is_rejected() {
        let w = world();
        let case = in_review(&w);
        let err = fire(
            &w,
            &case,
            Trigger::CompleteReview,
            &w.staff,
            TransitionPayload::default(),
        )
        .unwrap_err();
        assert!(matches!(err, CoreError::Validation(_)));
        assert_eq!(
            w.store.find_case(case.id).unwrap().unwrap().status,
            CaseStatus::InReview
        );
    }

    #[test]
    fn concurrent_assign_has_exactly_one_winner() {
        let w = world();
        let case = new_case(&w);
        fire(&w, &case, Trigger::Submit, &w.student, TransitionPayload::default()).unwrap();

        let barrier = Barrier::new(2);
        let results: Vec<CoreResult<TransitionOutcome>> = std::thread::scope(|scope| {
            let handles: Vec<_> = [w.staff.id, w.other_staff.id]
                .into_iter()
                .map(|assignee| {
                    let barrier = &barrier;
                    let cases = &w.casebook.cases;
                    let manager = w.manager.id;
                    let case_id = case.id;
                    scope.spawn(move || {
                        barrier.wait();
                        cases.attempt_transition(
                            case_id,
                            Trigger::Assign,
                            manager,
                            TransitionPayload::assign(assignee),
                        )
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        let winners = results.iter().filter(|r| r.is_ok()).count();
        assert_eq!(winners, 1);
        let loser = results.into_iter().find_map(Result::err).unwrap();
        assert!(matches!(loser, CoreError::InvalidStateTransition(_)));

        let stored = w.store.find_case(case.id).unwrap().unwrap();
        assert_eq!(stored.status, CaseStatus::Assigned);
        assert_eq!(stored.workflow_history.len(), 3);
    }

    #[test]
    fn reject_only_from_submitted_and_archive_after_completion() {
        let w = world();
        let case = new_case(&w);
        fire(&w, &case, Trigger::Submit, &w.student, TransitionPayload::default()).unwrap();
        let rejected = fire(&w, &case, Trigger::Reject, &w.manager, TransitionPayload::default())
            .unwrap();
        assert_eq!(rejected.case.status, CaseStatus::Rejected);

        let reviewed = in_review(&w);
        assert!(matches!(
            fire(&w, &reviewed, Trigger::Reject, &w.manager, TransitionPayload::default()),
            Err(CoreError::InvalidStateTransition(_))
        ));
        fire(
            &w,
            &reviewed,
            Trigger::CompleteReview,
            &w.staff,
            TransitionPayload::evaluation(70.0, 100.0, ""),
        )
        .unwrap();
        let archived = fire(
            &w,
            &reviewed,
            Trigger::Archive,
            &w.manager,
            TransitionPayload::default(),
        )
        .unwrap();
        assert_eq!(archived.case.status, CaseStatus::Archived);
        assert!(archived.case.evaluation.is_some());
        assert_eq!(archived.case.assigned_to, Some(w.staff.id));
    }

    #[test]
    fn visibility_and_deletion_rules() {
        let w = world();
        let case = new_case(&w);

        assert!(w.casebook.cases.get_case(w.staff.id, case.id).is_ok());
        assert!(matches!(
            w.casebook.cases.delete_case(w.staff.id, case.id),
            Err(CoreError::Authorization(_))
        ));

        fire(&w, &case, Trigger::Submit, &w.student, TransitionPayload::default()).unwrap();
        assert!(matches!(
            w.casebook.cases.delete_case(w.student.id, case.id),
            Err(CoreError::InvalidStateTransition(_))
        ));

        w.casebook.cases.delete_case(w.manager.id, case.id).unwrap();
        assert!(matches!(
            w.casebook.cases.get_case(w.manager.id, case.id),
            Err(CoreError::NotFound { .. })
        ));
        assert!(w
            .casebook
            .cases
            .list_cases(w.manager.id, CaseFilter::default())
            .unwrap()
            .is_empty());
        assert_eq!(
            w.store.find_case(case.id).unwrap().unwrap().workflow_history.len(),
            2
        );
    }

    #[test]
    fn students_list_only_their_own_cases() {
        let w = world();
        new_case(&w);
        let other = w
            .casebook
            .principals
            .register(NewPrincipal {
                name: "Pat".into(),
                email: "pat@example.org".into(),
                role: Role::Student,
                department: Some("internal-medicine".into()),
                email_notifications: false,
            })
            .unwrap();

        assert!(w
            .casebook
            .cases
            .list_cases(other.id, CaseFilter::default())
            .unwrap()
            .is_empty());
        assert_eq!(
            w.casebook
                .cases
                .list_cases(w.manager.id, CaseFilter::default())
                .unwrap()
                .len(),
            1
        );
    }

    #[test]
    fn regenerate_report_requires_reviewed_case() {
        let w = world();
        let case = in_review(&w);
        assert!(matches!(
            w.casebook.cases.regenerate_report(w.manager.id, case.id),
            Err(CoreError::InvalidStateTransition(_))
        ));

        fire(
            &w,
            &case,
            Trigger::CompleteReview,
            &w.staff,
            TransitionPayload::evaluation(90.0, 100.0, ""),
        )
        .unwrap();
        let regenerated = w
            .casebook
            .cases
            .regenerate_report(w.staff.id, case.id)
            .unwrap();
        assert!(regenerated.report.is_some());
        assert!(matches!(
            w.casebook.cases.regenerate_report(w.other_staff.id, case.id),
            Err(CoreError::Authorization(_))
        ));
    }

    #[test]
    fn available_triggers_follow_role() {
        let w = world();
        let case = new_case(&w);
        assert_eq!(
            w.casebook
                .cases
                .available_triggers(w.student.id, case.id)
                .unwrap(),
            vec![Trigger::Submit]
        );
        assert!(w
            .casebook
            .cases
            .available_triggers(w.manager.id, case.id)
            .unwrap()
            .is_empty());
    }
}
