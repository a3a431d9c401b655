use std::collections::{BTreeMap, HashSet};

use serde::Serialize;

use crate::error::{FestError, Result};
use crate::models::{AssignmentStatus, FestSnapshot};
use crate::portals::{Role, Session};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TeamDashboard {
    pub team_id: String,
    pub team_name: String,
    pub participant_count: usize,
    /// Participants per member category id
    pub participants_by_category: BTreeMap<String, usize>,
    pub programs_entered: usize,
    pub cancelled_entries: usize,
    /// Eligible programs the team has no active entry in
    pub not_assigned: Vec<String>,
}

/// Builds the team leader's overview.
///
/// A program counts as eligible only when the team has at least one participant in the
/// program's category, so categories the team never fielded do not inflate `not_assigned`.
pub fn team_dashboard(session: &Session, snapshot: &FestSnapshot) -> Result<TeamDashboard> {
    session.require(Role::TeamLeader, "view a team dashboard")?;
    let team_id = session.team_id.as_deref().ok_or_else(|| FestError::NotFound {
        kind: "team for session",
        id: session.user_id.clone(),
    })?;
    let team = snapshot.team(team_id).ok_or_else(|| FestError::NotFound {
        kind: "team",
        id: team_id.to_string(),
    })?;

    let mut participants_by_category: BTreeMap<String, usize> = BTreeMap::new();
    for participant in snapshot
        .participants
        .iter()
        .filter(|participant| participant.team_id == team.id)
    {
        *participants_by_category
            .entry(participant.category_id.clone())
            .or_default() += 1;
    }

    let team_entries = snapshot
        .assignments
        .iter()
        .filter(|assignment| assignment.team_id == team.id);
    let mut entered: HashSet<&str> = HashSet::new();
    let mut cancelled_entries = 0usize;
    for assignment in team_entries {
        match assignment.status {
            AssignmentStatus::Active => {
                entered.insert(assignment.program_id.as_str());
            }
            AssignmentStatus::Cancelled => cancelled_entries += 1,
        }
    }

    let mut not_assigned: Vec<String> = snapshot
        .programs
        .iter()
        .filter(|program| participants_by_category.contains_key(&program.category_id))
        .filter(|program| !entered.contains(program.id.as_str()))
        .map(|program| program.id.clone())
        .collect();
    not_assigned.sort();

    Ok(TeamDashboard {
        team_id: team.id.clone(),
        team_name: team.name.clone(),
        participant_count: participants_by_category.values().sum(),
        participants_by_category,
        programs_entered: entered.len(),
        cancelled_entries,
        not_assigned,
    })
}
