use serde::Serialize;
use tracing::debug;

use crate::error::{FestError, Result};
use crate::models::FestSnapshot;
use crate::portals::{Role, Session};
use crate::services::judging;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StageSlot {
    pub code_letter: String,
    pub assignment_id: String,
    pub participant_name: String,
    pub chest_number: Option<u32>,
    pub team_id: String,
}

/// Call order for a program on stage: reported, non-cancelled entries by code letter.
pub fn stage_queue(
    session: &Session,
    snapshot: &FestSnapshot,
    program_id: &str,
) -> Result<Vec<StageSlot>> {
    session.require(Role::StageController, "run the stage queue")?;
    let program = snapshot.program(program_id).ok_or_else(|| FestError::NotFound {
        kind: "program",
        id: program_id.to_string(),
    })?;

    let mut queue: Vec<StageSlot> = judging::active_reported(program, &snapshot.assignments)
        .map(|assignment| {
            let participant = snapshot.participant(&assignment.student_id);
            StageSlot {
                code_letter: assignment
                    .code_letter
                    .as_deref()
                    .unwrap_or_default()
                    .trim()
                    .to_string(),
                assignment_id: assignment.id.clone(),
                participant_name: participant
                    .map(|participant| participant.name.clone())
                    .unwrap_or_else(|| assignment.student_id.clone()),
                chest_number: participant.map(|participant| participant.chest_number),
                team_id: assignment.team_id.clone(),
            }
        })
        .collect();

    // "B" before "AA": shorter letters first, then alphabetical.
    queue.sort_by(|a, b| {
        a.code_letter
            .len()
            .cmp(&b.code_letter.len())
            .then_with(|| a.code_letter.cmp(&b.code_letter))
    });
    debug!("Stage queue for {}: {} slots", program.id, queue.len());
    Ok(queue)
}
