use serde::Serialize;
use tracing::{info, warn};

use crate::error::{FestError, Result};
use crate::models::{self, FestSnapshot, JudgingState, Score};
use crate::portals::{Role, Session};
use crate::services::judging::{self, JudgingStatus};
use crate::services::store::{Collection, DocumentStore};

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JudgeProgramRow {
    pub program_id: String,
    pub program_name: String,
    pub judging_state: JudgingState,
    pub status: JudgingStatus,
    pub missing: usize,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JudgeDashboard {
    pub judge_id: String,
    pub programs: Vec<JudgeProgramRow>,
    pub completed: usize,
    pub pending: usize,
}

pub fn judge_dashboard(session: &Session, snapshot: &FestSnapshot) -> Result<JudgeDashboard> {
    session.require(Role::Judge, "view the judge dashboard")?;
    let judge_id = session.user_id.as_str();

    let mut programs: Vec<JudgeProgramRow> = snapshot
        .programs
        .iter()
        .filter(|program| program.has_judge(judge_id))
        .map(|program| JudgeProgramRow {
            program_id: program.id.clone(),
            program_name: program.name.clone(),
            judging_state: program.judging_status,
            status: judging::compute(program, &snapshot.assignments, &snapshot.scores, judge_id),
            missing: judging::missing_scores(program, &snapshot.assignments, &snapshot.scores, judge_id)
                .len(),
        })
        .collect();
    programs.sort_by(|a, b| {
        a.status
            .is_complete
            .cmp(&b.status.is_complete)
            .then_with(|| a.program_name.cmp(&b.program_name))
    });

    let completed = programs.iter().filter(|row| row.status.is_complete).count();
    Ok(JudgeDashboard {
        judge_id: judge_id.to_string(),
        pending: programs.len() - completed,
        completed,
        programs,
    })
}

/// Validates and stores one mark. On failure nothing is written and the call can be retried.
pub fn record_score(
    session: &Session,
    snapshot: &FestSnapshot,
    store: &dyn DocumentStore,
    assignment_id: &str,
    value: f64,
    grade: Option<String>,
) -> Result<Score> {
    session.require(Role::Judge, "record scores")?;

    let assignment = models::find_by_id(&snapshot.assignments, assignment_id).ok_or_else(|| {
        FestError::NotFound {
            kind: "assignment",
            id: assignment_id.to_string(),
        }
    })?;
    let program = snapshot
        .program(&assignment.program_id)
        .ok_or_else(|| FestError::NotFound {
            kind: "program",
            id: assignment.program_id.clone(),
        })?;

    if session.role == Role::Judge && !program.has_judge(&session.user_id) {
        return Err(FestError::Forbidden {
            role: session.role,
            action: "score a program they do not judge",
        });
    }
    models::ensure_scoring_open(program)?;
    if !assignment.is_active_reported() {
        return Err(FestError::NotFound {
            kind: "reported assignment",
            id: assignment_id.to_string(),
        });
    }
    if !value.is_finite() || value < 0.0 {
        return Err(FestError::Invalid(format!("mark must be a non-negative number, got {value}")));
    }

    let score = Score {
        id: format!("{}_{}_{}", program.id, session.user_id, assignment.id),
        program_id: program.id.clone(),
        judge_id: session.user_id.clone(),
        assignment_id: assignment.id.clone(),
        value,
        grade,
    };

    if let Err(err) = store.upsert(Collection::Scores, serde_json::to_value(&score)?) {
        warn!("Score for {} not saved: {}", assignment.id, err);
        return Err(err);
    }
    info!(
        "Judge {} scored {} in program {}: {}",
        session.user_id, assignment.id, program.id, value
    );
    Ok(score)
}

/// Closes judging for a program. Admin only, and there is no way back.
pub fn close_program(
    session: &Session,
    snapshot: &FestSnapshot,
    store: &dyn DocumentStore,
    program_id: &str,
) -> Result<bool> {
    session.require(Role::Admin, "close judging")?;
    let mut program = snapshot
        .program(program_id)
        .cloned()
        .ok_or_else(|| FestError::NotFound {
            kind: "program",
            id: program_id.to_string(),
        })?;
    if !program.close() {
        return Ok(false);
    }
    store.upsert(Collection::Programs, serde_json::to_value(&program)?)?;
    Ok(true)
}
