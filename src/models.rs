use std::collections::BTreeMap;

use serde::{self, Deserialize, Deserializer, Serialize};
use tracing::info;

use crate::error::{FestError, Result};
use crate::services::results::PointsConfig;
use crate::services::store::Collection;

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum JudgingState {
    #[default]
    Open,
    Closed,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum AssignmentStatus {
    #[default]
    Active,
    Cancelled,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Program {
    pub id: String,
    pub name: String,
    pub category_id: String,
    #[serde(default)]
    pub judging_status: JudgingState,
    #[serde(default)]
    pub participants_count: u32,
    /// Judge user ids allowed to score this program
    #[serde(default)]
    pub judges: Vec<String>,
    #[serde(default)]
    pub stage_id: Option<String>,
}

impl Program {
    pub fn is_closed(&self) -> bool {
        self.judging_status == JudgingState::Closed
    }

    /// Judging only moves forward, closing twice is a no-op.
    pub fn close(&mut self) -> bool {
        if self.is_closed() {
            return false;
        }
        info!("Closing judging for program {}", self.id);
        self.judging_status = JudgingState::Closed;
        true
    }

    pub fn has_judge(&self, judge_id: &str) -> bool {
        self.judges.iter().any(|judge| judge == judge_id)
    }
}

pub fn ensure_scoring_open(program: &Program) -> Result<()> {
    if program.is_closed() {
        return Err(FestError::JudgingClosed {
            program_id: program.id.clone(),
        });
    }
    Ok(())
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Assignment {
    pub id: String,
    pub program_id: String,
    pub student_id: String,
    pub team_id: String,
    #[serde(default)]
    pub status: AssignmentStatus,
    /// Set by the reporting desk once the participant checks in
    #[serde(default)]
    pub code_letter: Option<String>,
}

impl Assignment {
    pub fn is_reported(&self) -> bool {
        self.code_letter
            .as_deref()
            .is_some_and(|letter| !letter.trim().is_empty())
    }

    pub fn is_active_reported(&self) -> bool {
        self.status != AssignmentStatus::Cancelled && self.is_reported()
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Score {
    pub id: String,
    pub program_id: String,
    pub judge_id: String,
    pub assignment_id: String,
    pub value: f64,
    #[serde(default)]
    pub grade: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Participant {
    pub id: String,
    pub name: String,
    pub team_id: String,
    pub category_id: String,
    #[serde(deserialize_with = "from_number_or_string")]
    pub chest_number: u32,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Team {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub leader_id: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Category {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Stage {
    pub id: String,
    pub name: String,
}

/// Chest numbers arrive as either JSON numbers or numeric strings depending on the form that wrote them.
fn from_number_or_string<'de, D>(deserializer: D) -> std::result::Result<u32, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Number(u32),
        Text(String),
    }

    match Raw::deserialize(deserializer)? {
        Raw::Number(value) => Ok(value),
        Raw::Text(text) => text.trim().parse().map_err(|err| {
            serde::de::Error::custom(format!("invalid chest number {text:?}: {err}"))
        }),
    }
}

pub trait HasId {
    fn id(&self) -> &str;
}

impl HasId for Program {
    fn id(&self) -> &str {
        &self.id
    }
}

impl HasId for Assignment {
    fn id(&self) -> &str {
        &self.id
    }
}

impl HasId for Score {
    fn id(&self) -> &str {
        &self.id
    }
}

impl HasId for Participant {
    fn id(&self) -> &str {
        &self.id
    }
}

impl HasId for Team {
    fn id(&self) -> &str {
        &self.id
    }
}

impl HasId for Category {
    fn id(&self) -> &str {
        &self.id
    }
}

impl HasId for Stage {
    fn id(&self) -> &str {
        &self.id
    }
}

pub fn find_by_id<'a, T: HasId>(items: &'a [T], id: &str) -> Option<&'a T> {
    items.iter().find(|item| item.id() == id)
}

/// Locally-held copy of every collection the core reads.
#[derive(Debug, Default, Clone)]
pub struct FestSnapshot {
    pub programs: Vec<Program>,
    pub assignments: Vec<Assignment>,
    pub scores: Vec<Score>,
    pub participants: Vec<Participant>,
    pub teams: Vec<Team>,
    pub program_categories: Vec<Category>,
    pub member_categories: Vec<Category>,
    pub stages: Vec<Stage>,
    /// Points override stored in the settings collection
    pub points: Option<PointsConfig>,
    /// Non-fatal read and decode problems of the latest load of each collection
    pub notices: BTreeMap<Collection, Vec<String>>,
}

impl FestSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn program(&self, id: &str) -> Option<&Program> {
        find_by_id(&self.programs, id)
    }

    pub fn participant(&self, id: &str) -> Option<&Participant> {
        find_by_id(&self.participants, id)
    }

    /// Replaces the notices of one collection. An empty list clears them.
    pub fn set_notices(&mut self, collection: Collection, notices: Vec<String>) {
        if notices.is_empty() {
            self.notices.remove(&collection);
        } else {
            self.notices.insert(collection, notices);
        }
    }

    pub fn notice_lines(&self) -> impl Iterator<Item = &str> {
        self.notices.values().flatten().map(String::as_str)
    }

    pub fn team(&self, id: &str) -> Option<&Team> {
        find_by_id(&self.teams, id)
    }
}
