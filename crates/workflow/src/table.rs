//! The transition table and its evaluation.

use crate::record::{Evaluation, HistoryEntry, RevisionRequest, TransitionPayload};
use crate::status::{CaseStatus, Trigger};
use crate::{TransitionError, TransitionResult};
use casebook_policy::{Principal, Role};
use casebook_types::NonEmptyText;
use casebook_uuid::RecordId;
use chrono::{DateTime, Utc};

const DEFAULT_MAX_SCORE: f64 = 100.0;

/// Who may fire a trigger.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ActorRequirement {
    /// The student who owns the case.
    CaseOwner,
    /// An elevated role holding the assignment capability.
    Assigner,
    /// The staff member the case is currently assigned to, and nobody else.
    AssignedStaff,
    ManagerOrAbove,
}

impl ActorRequirement {
    pub fn permits(self, actor: &Principal, case: &CaseFacts) -> bool {
        match self {
            ActorRequirement::CaseOwner => actor.id == case.owner,
            ActorRequirement::Assigner | ActorRequirement::ManagerOrAbove => actor.is_elevated(),
            ActorRequirement::AssignedStaff => case.assigned_to == Some(actor.id),
        }
    }

    fn describe(self) -> &'static str {
        match self {
            ActorRequirement::CaseOwner => "only the case owner",
            ActorRequirement::Assigner => "only a manager or super-admin",
            ActorRequirement::AssignedStaff => "only the assigned reviewer",
            ActorRequirement::ManagerOrAbove => "only a manager or super-admin",
        }
    }
}

/// Who hears about a committed transition.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Audience {
    /// Every active manager of the case's department.
    DepartmentManagers,
    Assignee,
    Owner,
}

/// Field change committed atomically with the status change.
#[derive(Clone, Debug, PartialEq)]
pub enum TransitionEffect {
    None,
    Assign(RecordId),
    ClearAssignment,
    AppendRevisionRequest(RevisionRequest),
    SetEvaluation(Evaluation),
}

/// Validates the payload and yields the effect to commit.
pub type Guard = fn(&TransitionContext<'_>) -> TransitionResult<TransitionEffect>;

#[derive(Debug)]
pub struct TransitionRule {
    pub from: CaseStatus,
    pub trigger: Trigger,
    pub to: CaseStatus,
    pub actor: ActorRequirement,
    pub guard: Guard,
    pub audience: Audience,
    pub default_note: &'static str,
}

pub static TRANSITIONS: &[TransitionRule] = &[
    TransitionRule {
        from: CaseStatus::Draft,
        trigger: Trigger::Submit,
        to: CaseStatus::Submitted,
        actor: ActorRequirement::CaseOwner,
        guard: no_guard,
        audience: Audience::DepartmentManagers,
        default_note: "Case submitted for review",
    },
    TransitionRule {
        from: CaseStatus::RevisionRequested,
        trigger: Trigger::Submit,
        to: CaseStatus::Submitted,
        actor: ActorRequirement::CaseOwner,
        guard: resubmit_guard,
        audience: Audience::DepartmentManagers,
        default_note: "Case resubmitted after revision",
    },
    TransitionRule {
        from: CaseStatus::Submitted,
        trigger: Trigger::Assign,
        to: CaseStatus::Assigned,
        actor: ActorRequirement::Assigner,
        guard: assign_guard,
        audience: Audience::Assignee,
        default_note: "Case assigned to reviewer",
    },
    TransitionRule {
        from: CaseStatus::Assigned,
        trigger: Trigger::StartReview,
        to: CaseStatus::InReview,
        actor: ActorRequirement::AssignedStaff,
        guard: no_guard,
        audience: Audience::Owner,
        default_note: "Review started",
    },
    TransitionRule {
        from: CaseStatus::InReview,
        trigger: Trigger::RequestRevision,
        to: CaseStatus::RevisionRequested,
        actor: ActorRequirement::AssignedStaff,
        guard: revision_guard,
        audience: Audience::Owner,
        default_note: "Revision requested",
    },
    TransitionRule {
        from: CaseStatus::InReview,
        trigger: Trigger::CompleteReview,
        to: CaseStatus::Completed,
        actor: ActorRequirement::AssignedStaff,
        guard: completion_guard,
        audience: Audience::Owner,
        default_note: "Review completed",
    },
    TransitionRule {
        from: CaseStatus::Submitted,
        trigger: Trigger::Reject,
        to: CaseStatus::Rejected,
        actor: ActorRequirement::ManagerOrAbove,
        guard: no_guard,
        audience: Audience::Owner,
        default_note: "Case rejected",
    },
    TransitionRule {
        from: CaseStatus::Completed,
        trigger: Trigger::Archive,
        to: CaseStatus::Archived,
        actor: ActorRequirement::ManagerOrAbove,
        guard: no_guard,
        audience: Audience::Owner,
        default_note: "Case archived",
    },
];

/// The workflow-relevant facts about a case.
#[derive(Clone, Copy, Debug)]
pub struct CaseFacts {
    pub status: CaseStatus,
    pub owner: RecordId,
    pub assigned_to: Option<RecordId>,
    pub revision_count: usize,
}

/// Everything a rule needs to decide.
#[derive(Clone, Copy, Debug)]
pub struct TransitionContext<'a> {
    pub case: CaseFacts,
    pub actor: &'a Principal,
    pub payload: &'a TransitionPayload,
    /// The resolved `payload.assignee`, looked up by the caller.
    pub assignee: Option<&'a Principal>,
    pub max_revision_requests: Option<u32>,
    pub now: DateTime<Utc>,
}

/// A transition that passed every check, ready to be committed as one unit.
#[derive(Clone, Debug, PartialEq)]
pub struct TransitionPlan {
    pub trigger: Trigger,
    pub from: CaseStatus,
    pub to: CaseStatus,
    pub effect: TransitionEffect,
    pub history: HistoryEntry,
    pub audience: Audience,
}

fn lookup(from: CaseStatus, trigger: Trigger) -> Option<&'static TransitionRule> {
    TRANSITIONS
        .iter()
        .find(|rule| rule.from == from && rule.trigger == trigger)
}

/// Evaluates `trigger` against the table: lookup, then actor, then guard.
///
/// # Errors
///
/// - [`TransitionError::InvalidTransition`] if the pair is not in the table
/// - [`TransitionError::NotPermitted`] if the actor lacks the required capability
/// - [`TransitionError::InvalidInput`] if the guard rejects the payload
pub fn plan_transition(
    trigger: Trigger,
    ctx: &TransitionContext<'_>,
) -> TransitionResult<TransitionPlan> {
    let from = ctx.case.status;
    let rule = lookup(from, trigger).ok_or(TransitionError::InvalidTransition { from, trigger })?;

    if !rule.actor.permits(ctx.actor, &ctx.case) {
        return Err(TransitionError::NotPermitted(format!(
            "{} may {} this case",
            rule.actor.describe(),
            trigger
        )));
    }

    let effect = (rule.guard)(ctx)?;

    let note = ctx
        .payload
        .note
        .as_deref()
        .map(str::trim)
        .filter(|n| !n.is_empty())
        .unwrap_or(rule.default_note)
        .to_owned();

    Ok(TransitionPlan {
        trigger,
        from,
        to: rule.to,
        effect,
        history: HistoryEntry {
            status: rule.to,
            changed_by: ctx.actor.id,
            note,
            changed_at: ctx.now,
        },
        audience: rule.audience,
    })
}

/// Triggers the actor could fire from the case's current status, ignoring guards.
pub fn available_triggers(case: &CaseFacts, actor: &Principal) -> Vec<Trigger> {
    TRANSITIONS
        .iter()
        .filter(|rule| rule.from == case.status && rule.actor.permits(actor, case))
        .map(|rule| rule.trigger)
        .collect()
}

fn no_guard(_ctx: &TransitionContext<'_>) -> TransitionResult<TransitionEffect> {
    Ok(TransitionEffect::None)
}

fn resubmit_guard(_ctx: &TransitionContext<'_>) -> TransitionResult<TransitionEffect> {
    // A submitted case has no reviewer; it goes back into the assignment queue.
    Ok(TransitionEffect::ClearAssignment)
}

fn assign_guard(ctx: &TransitionContext<'_>) -> TransitionResult<TransitionEffect> {
    let requested = ctx
        .payload
        .assignee
        .ok_or_else(|| TransitionError::InvalidInput("assign requires an assignee".into()))?;

    let assignee = ctx
        .assignee
        .filter(|p| p.id == requested)
        .ok_or_else(|| TransitionError::InvalidInput(format!("unknown assignee: {requested}")))?;

    if assignee.role != Role::Staff {
        return Err(TransitionError::InvalidInput(format!(
            "assignee must hold the staff role, not {}",
            assignee.role
        )));
    }

    Ok(TransitionEffect::Assign(assignee.id))
}

fn revision_guard(ctx: &TransitionContext<'_>) -> TransitionResult<TransitionEffect> {
    let description = ctx
        .payload
        .revision_description
        .as_deref()
        .and_then(|d| NonEmptyText::new(d).ok())
        .ok_or_else(|| {
            TransitionError::InvalidInput("a revision description is required".into())
        })?;

    if let Some(max) = ctx.max_revision_requests {
        if ctx.case.revision_count >= max as usize {
            return Err(TransitionError::InvalidInput(format!(
                "revision limit of {max} reached for this case"
            )));
        }
    }

    Ok(TransitionEffect::AppendRevisionRequest(RevisionRequest {
        requested_by: ctx.actor.id,
        description,
        requested_at: ctx.now,
    }))
}

fn completion_guard(ctx: &TransitionContext<'_>) -> TransitionResult<TransitionEffect> {
    let input = ctx
        .payload
        .evaluation
        .as_ref()
        .ok_or_else(|| TransitionError::InvalidInput("an evaluation is required".into()))?;

    let score = input
        .score
        .filter(|s| s.is_finite())
        .ok_or_else(|| TransitionError::InvalidInput("evaluation score must be a number".into()))?;
    let max_score = input.max_score.unwrap_or(DEFAULT_MAX_SCORE);

    if !max_score.is_finite() || max_score <= 0.0 {
        return Err(TransitionError::InvalidInput(
            "evaluation max_score must be a positive number".into(),
        ));
    }
    if !(0.0..=max_score).contains(&score) {
        return Err(TransitionError::InvalidInput(format!(
            "evaluation score {score} is outside 0..={max_score}"
        )));
    }
    for item in &input.rubric {
        if !item.max_score.is_finite()
            || !item.score.is_finite()
            || !(0.0..=item.max_score).contains(&item.score)
        {
            return Err(TransitionError::InvalidInput(format!(
                "rubric item '{}' has an out-of-range score",
                item.criterion
            )));
        }
    }

    Ok(TransitionEffect::SetEvaluation(Evaluation {
        score,
        max_score,
        feedback: input.feedback.as_deref().unwrap_or_default().trim().to_owned(),
        rubric: input.rubric.clone(),
        evaluated_by: ctx.actor.id,
        evaluated_at: ctx.now,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{EvaluationInput, RubricItem};

    struct Cast {
        student: Principal,
        staff: Principal,
        other_staff: Principal,
        manager: Principal,
        admin: Principal,
    }

    fn cast() -> Cast {
        let dept = Some(NonEmptyText::new("internal-medicine").unwrap());
        Cast {
            student: Principal::new(RecordId::new(), Role::Student, dept.clone()),
            staff: Principal::new(RecordId::new(), Role::Staff, dept.clone()),
            other_staff: Principal::new(RecordId::new(), Role::Staff, dept.clone()),
            manager: Principal::new(RecordId::new(), Role::Manager, dept),
            admin: Principal::new(RecordId::new(), Role::SuperAdmin, None),
        }
    }

    fn facts(cast: &Cast, status: CaseStatus) -> CaseFacts {
        CaseFacts {
            status,
            owner: cast.student.id,
            assigned_to: status.requires_assignee().then_some(cast.staff.id),
            revision_count: 0,
        }
    }

    fn ctx<'a>(
        case: CaseFacts,
        actor: &'a Principal,
        payload: &'a TransitionPayload,
        assignee: Option<&'a Principal>,
    ) -> TransitionContext<'a> {
        TransitionContext {
            case,
            actor,
            payload,
            assignee,
            max_revision_requests: None,
            now: Utc::now(),
        }
    }

    /// An actor allowed to fire `trigger`, so only the table decides.
    fn permitted_actor(cast: &Cast, trigger: Trigger) -> &Principal {
        match trigger {
            Trigger::Submit => &cast.student,
            Trigger::Assign | Trigger::Reject | Trigger::Archive => &cast.manager,
            Trigger::StartReview | Trigger::RequestRevision | Trigger::CompleteReview => {
                &cast.staff
            }
        }
    }

    fn full_payload(cast: &Cast) -> TransitionPayload {
        TransitionPayload {
            note: None,
            assignee: Some(cast.staff.id),
            revision_description: Some("add dosage rationale".into()),
            evaluation: Some(EvaluationInput {
                score: Some(85.0),
                max_score: Some(100.0),
                feedback: Some("Solid".into()),
                rubric: Vec::new(),
            }),
        }
    }

    #[test]
    fn every_pair_outside_the_table_is_an_invalid_transition() {
        let cast = cast();
        let payload = full_payload(&cast);

        for status in CaseStatus::ALL {
            for trigger in Trigger::ALL {
                let in_table = lookup(status, trigger).is_some();
                let actor = permitted_actor(&cast, trigger);
                let result = plan_transition(
                    trigger,
                    &ctx(facts(&cast, status), actor, &payload, Some(&cast.staff)),
                );

                if in_table {
                    assert!(result.is_ok(), "{status} --{trigger}--> failed: {result:?}");
                } else {
                    assert_eq!(
                        result.unwrap_err(),
                        TransitionError::InvalidTransition {
                            from: status,
                            trigger
                        }
                    );
                }
            }
        }
    }

    #[test]
    fn table_has_no_duplicate_pairs() {
        for (i, a) in TRANSITIONS.iter().enumerate() {
            for b in &TRANSITIONS[i + 1..] {
                assert!(
                    !(a.from == b.from && a.trigger == b.trigger),
                    "duplicate rule {} --{}-->",
                    a.from,
                    a.trigger
                );
            }
        }
    }

    #[test]
    fn destination_statuses_respect_assignment_invariant() {
        let cast = cast();
        let payload = full_payload(&cast);
        for rule in TRANSITIONS {
            let actor = permitted_actor(&cast, rule.trigger);
            let plan = plan_transition(
                rule.trigger,
                &ctx(facts(&cast, rule.from), actor, &payload, Some(&cast.staff)),
            )
            .unwrap();

            let assigned_after = match &plan.effect {
                TransitionEffect::Assign(_) => true,
                TransitionEffect::ClearAssignment => false,
                _ => rule.from.requires_assignee(),
            };
            assert_eq!(
                assigned_after,
                rule.to.requires_assignee(),
                "{} --{}--> breaks the assignee invariant",
                rule.from,
                rule.trigger
            );
        }
    }

    #[test]
    fn submit_requires_owner() {
        let cast = cast();
        let payload = TransitionPayload::default();
        let case = facts(&cast, CaseStatus::Draft);

        for intruder in [&cast.staff, &cast.manager, &cast.admin] {
            let err = plan_transition(Trigger::Submit, &ctx(case, intruder, &payload, None))
                .unwrap_err();
            assert!(matches!(err, TransitionError::NotPermitted(_)));
        }

        let plan =
            plan_transition(Trigger::Submit, &ctx(case, &cast.student, &payload, None)).unwrap();
        assert_eq!(plan.to, CaseStatus::Submitted);
        assert_eq!(plan.audience, Audience::DepartmentManagers);
        assert_eq!(plan.history.changed_by, cast.student.id);
        assert_eq!(plan.history.note, "Case submitted for review");
    }

    #[test]
    fn assign_requires_elevated_actor_and_staff_target() {
        let cast = cast();
        let case = facts(&cast, CaseStatus::Submitted);
        let payload = TransitionPayload::assign(cast.staff.id);

        let err = plan_transition(
            Trigger::Assign,
            &ctx(case, &cast.staff, &payload, Some(&cast.staff)),
        )
        .unwrap_err();
        assert!(matches!(err, TransitionError::NotPermitted(_)));

        let to_student = TransitionPayload::assign(cast.student.id);
        let err = plan_transition(
            Trigger::Assign,
            &ctx(case, &cast.manager, &to_student, Some(&cast.student)),
        )
        .unwrap_err();
        assert!(matches!(err, TransitionError::InvalidInput(msg) if msg.contains("staff role")));

        let missing = TransitionPayload::default();
        let err = plan_transition(Trigger::Assign, &ctx(case, &cast.manager, &missing, None))
            .unwrap_err();
        assert!(matches!(err, TransitionError::InvalidInput(_)));

        let plan = plan_transition(
            Trigger::Assign,
            &ctx(case, &cast.admin, &payload, Some(&cast.staff)),
        )
        .unwrap();
        assert_eq!(plan.effect, TransitionEffect::Assign(cast.staff.id));
        assert_eq!(plan.audience, Audience::Assignee);
    }

    #[test]
    fn assign_rejects_mismatched_resolution() {
        let cast = cast();
        let case = facts(&cast, CaseStatus::Submitted);
        let payload = TransitionPayload::assign(cast.staff.id);

        let err = plan_transition(
            Trigger::Assign,
            &ctx(case, &cast.manager, &payload, Some(&cast.other_staff)),
        )
        .unwrap_err();
        assert!(matches!(err, TransitionError::InvalidInput(_)));
    }

    #[test]
    fn review_triggers_are_reserved_for_the_assignee() {
        let cast = cast();
        let payload = full_payload(&cast);

        for (status, trigger) in [
            (CaseStatus::Assigned, Trigger::StartReview),
            (CaseStatus::InReview, Trigger::RequestRevision),
            (CaseStatus::InReview, Trigger::CompleteReview),
        ] {
            let case = facts(&cast, status);
            for outsider in [&cast.other_staff, &cast.manager, &cast.admin, &cast.student] {
                let err =
                    plan_transition(trigger, &ctx(case, outsider, &payload, None)).unwrap_err();
                assert!(
                    matches!(err, TransitionError::NotPermitted(_)),
                    "{outsider:?} could {trigger}"
                );
            }
        }
    }

    #[test]
    fn revision_requires_description() {
        let cast = cast();
        let case = facts(&cast, CaseStatus::InReview);

        for payload in [TransitionPayload::default(), TransitionPayload::revision("   ")] {
            let err = plan_transition(
                Trigger::RequestRevision,
                &ctx(case, &cast.staff, &payload, None),
            )
            .unwrap_err();
            assert!(matches!(err, TransitionError::InvalidInput(_)));
        }

        let payload = TransitionPayload::revision("add dosage rationale");
        let plan = plan_transition(
            Trigger::RequestRevision,
            &ctx(case, &cast.staff, &payload, None),
        )
        .unwrap();
        match plan.effect {
            TransitionEffect::AppendRevisionRequest(req) => {
                assert_eq!(req.description.as_str(), "add dosage rationale");
                assert_eq!(req.requested_by, cast.staff.id);
            }
            other => panic!("unexpected effect {other:?}"),
        }
    }

    #[test]
    fn revision_cap_is_enforced_when_configured() {
        let cast = cast();
        let mut case = facts(&cast, CaseStatus::InReview);
        case.revision_count = 2;
        let payload = TransitionPayload::revision("again");

        let mut capped = ctx(case, &cast.staff, &payload, None);
        capped.max_revision_requests = Some(2);
        let err = plan_transition(Trigger::RequestRevision, &capped).unwrap_err();
        assert!(matches!(err, TransitionError::InvalidInput(msg) if msg.contains("limit")));

        let uncapped = ctx(case, &cast.staff, &payload, None);
        assert!(plan_transition(Trigger::RequestRevision, &uncapped).is_ok());
    }

    #[test]
    fn completion_validates_score() {
        let cast = cast();
        let case = facts(&cast, CaseStatus::InReview);

        let bad_inputs = [
            None,
            Some(EvaluationInput::default()),
            Some(EvaluationInput {
                score: Some(f64::NAN),
                ..EvaluationInput::default()
            }),
            Some(EvaluationInput {
                score: Some(120.0),
                ..EvaluationInput::default()
            }),
            Some(EvaluationInput {
                score: Some(5.0),
                max_score: Some(0.0),
                ..EvaluationInput::default()
            }),
            Some(EvaluationInput {
                score: Some(5.0),
                rubric: vec![RubricItem {
                    criterion: NonEmptyText::new("History").unwrap(),
                    score: 11.0,
                    max_score: 10.0,
                    comment: None,
                }],
                ..EvaluationInput::default()
            }),
        ];
        for evaluation in bad_inputs {
            let payload = TransitionPayload {
                evaluation,
                ..TransitionPayload::default()
            };
            let err = plan_transition(
                Trigger::CompleteReview,
                &ctx(case, &cast.staff, &payload, None),
            )
            .unwrap_err();
            assert!(matches!(err, TransitionError::InvalidInput(_)));
        }
    }

    #[test]
    fn completion_records_evaluator_and_defaults_max_score() {
        let cast = cast();
        let case = facts(&cast, CaseStatus::InReview);
        let payload = TransitionPayload {
            evaluation: Some(EvaluationInput {
                score: Some(85.0),
                ..EvaluationInput::default()
            }),
            ..TransitionPayload::default()
        };

        let plan = plan_transition(
            Trigger::CompleteReview,
            &ctx(case, &cast.staff, &payload, None),
        )
        .unwrap();
        match plan.effect {
            TransitionEffect::SetEvaluation(eval) => {
                assert_eq!(eval.score, 85.0);
                assert_eq!(eval.max_score, 100.0);
                assert_eq!(eval.evaluated_by, cast.staff.id);
                assert_eq!(eval.evaluated_at, plan.history.changed_at);
            }
            other => panic!("unexpected effect {other:?}"),
        }
    }

    #[test]
    fn reject_only_from_submitted() {
        let cast = cast();
        let payload = TransitionPayload::default();

        for status in [CaseStatus::Assigned, CaseStatus::InReview] {
            let err = plan_transition(
                Trigger::Reject,
                &ctx(facts(&cast, status), &cast.manager, &payload, None),
            )
            .unwrap_err();
            assert!(matches!(err, TransitionError::InvalidTransition { .. }));
        }

        let err = plan_transition(
            Trigger::Reject,
            &ctx(facts(&cast, CaseStatus::Submitted), &cast.staff, &payload, None),
        )
        .unwrap_err();
        assert!(matches!(err, TransitionError::NotPermitted(_)));
    }

    #[test]
    fn caller_note_overrides_default() {
        let cast = cast();
        let payload = TransitionPayload::with_note("  please review soon  ");
        let plan = plan_transition(
            Trigger::Submit,
            &ctx(facts(&cast, CaseStatus::Draft), &cast.student, &payload, None),
        )
        .unwrap();
        assert_eq!(plan.history.note, "please review soon");
    }

    #[test]
    fn available_triggers_follow_actor() {
        let cast = cast();
        let submitted = facts(&cast, CaseStatus::Submitted);
        assert_eq!(
            available_triggers(&submitted, &cast.manager),
            vec![Trigger::Assign, Trigger::Reject]
        );
        assert!(available_triggers(&submitted, &cast.student).is_empty());

        let in_review = facts(&cast, CaseStatus::InReview);
        assert_eq!(
            available_triggers(&in_review, &cast.staff),
            vec![Trigger::RequestRevision, Trigger::CompleteReview]
        );
        assert!(available_triggers(&in_review, &cast.other_staff).is_empty());
    }
}
