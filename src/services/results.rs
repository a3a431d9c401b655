use std::cmp::Ordering;
use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::models::{Assignment, FestSnapshot, Program, Score};
use crate::services::judging;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GradeBand {
    pub grade: String,
    /// Lowest average mark that still earns this grade
    #[serde(alias = "min_mark")]
    pub min_mark: f64,
    pub points: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PointsConfig {
    #[serde(default = "default_first_points")]
    pub first: u32,
    #[serde(default = "default_second_points")]
    pub second: u32,
    #[serde(default = "default_third_points")]
    pub third: u32,
    /// Checked in order, the first band the average mark reaches wins
    #[serde(default = "default_grade_bands", alias = "grade_points")]
    pub grade_points: Vec<GradeBand>,
}

impl Default for PointsConfig {
    fn default() -> Self {
        Self {
            first: default_first_points(),
            second: default_second_points(),
            third: default_third_points(),
            grade_points: default_grade_bands(),
        }
    }
}

fn default_first_points() -> u32 {
    5
}

fn default_second_points() -> u32 {
    3
}

fn default_third_points() -> u32 {
    1
}

fn default_grade_bands() -> Vec<GradeBand> {
    vec![
        GradeBand {
            grade: "A".to_string(),
            min_mark: 70.0,
            points: 5,
        },
        GradeBand {
            grade: "B".to_string(),
            min_mark: 60.0,
            points: 3,
        },
        GradeBand {
            grade: "C".to_string(),
            min_mark: 50.0,
            points: 1,
        },
    ]
}

impl PointsConfig {
    pub fn position_points(&self, position: Option<u32>) -> u32 {
        match position {
            Some(1) => self.first,
            Some(2) => self.second,
            Some(3) => self.third,
            _ => 0,
        }
    }

    pub fn grade_for(&self, average: f64) -> Option<&GradeBand> {
        self.grade_points.iter().find(|band| average >= band.min_mark)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultEntry {
    pub assignment_id: String,
    pub student_id: String,
    pub team_id: String,
    pub code_letter: String,
    pub total_mark: f64,
    pub average_mark: f64,
    pub position: Option<u32>,
    pub grade: Option<String>,
    pub points: u32,
}

/// Results are only published once judging is closed; open programs yield nothing.
pub fn program_results(
    program: &Program,
    assignments: &[Assignment],
    scores: &[Score],
    points: &PointsConfig,
) -> Vec<ResultEntry> {
    if !program.is_closed() {
        debug!("Program {} still open, no results yet", program.id);
        return Vec::new();
    }

    let mut marks: HashMap<&str, (f64, u32)> = HashMap::new();
    for score in scores.iter().filter(|score| score.program_id == program.id) {
        let entry = marks.entry(score.assignment_id.as_str()).or_insert((0.0, 0));
        entry.0 += score.value;
        entry.1 += 1;
    }

    let mut entries: Vec<ResultEntry> = judging::active_reported(program, assignments)
        .map(|assignment| {
            let (total_mark, judged) = marks.get(assignment.id.as_str()).copied().unwrap_or((0.0, 0));
            let average_mark = if judged == 0 {
                0.0
            } else {
                total_mark / f64::from(judged)
            };
            ResultEntry {
                assignment_id: assignment.id.clone(),
                student_id: assignment.student_id.clone(),
                team_id: assignment.team_id.clone(),
                code_letter: assignment.code_letter.clone().unwrap_or_default(),
                total_mark,
                average_mark,
                position: None,
                grade: None,
                points: 0,
            }
        })
        .collect();

    entries.sort_by(|a, b| {
        b.total_mark
            .partial_cmp(&a.total_mark)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.code_letter.cmp(&b.code_letter))
    });

    // Standard competition ranking: ties share a place and the next place is skipped.
    let mut rank = 0u32;
    let mut previous_total: Option<f64> = None;
    for (index, entry) in entries.iter_mut().enumerate() {
        if previous_total != Some(entry.total_mark) {
            rank = index as u32 + 1;
            previous_total = Some(entry.total_mark);
        }
        if rank <= 3 && entry.total_mark > 0.0 {
            entry.position = Some(rank);
        }
        let band = points.grade_for(entry.average_mark);
        entry.grade = band.map(|band| band.grade.clone());
        entry.points =
            points.position_points(entry.position) + band.map(|band| band.points).unwrap_or(0);
    }

    entries
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TeamStanding {
    pub team_id: String,
    pub team_name: String,
    pub total_points: u32,
    pub first_places: u32,
    pub programs_scored: u32,
}

impl TeamStanding {
    pub fn new(team_id: String, team_name: String) -> Self {
        Self {
            team_id,
            team_name,
            total_points: 0,
            first_places: 0,
            programs_scored: 0,
        }
    }

    fn add_result(&mut self, entry: &ResultEntry) {
        if entry.points == 0 {
            return;
        }
        self.total_points += entry.points;
        self.programs_scored += 1;
        if entry.position == Some(1) {
            self.first_places += 1;
        }
    }
}

impl PartialEq for TeamStanding {
    fn eq(&self, other: &Self) -> bool {
        self.team_id == other.team_id
    }
}

impl Eq for TeamStanding {}

impl PartialOrd for TeamStanding {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for TeamStanding {
    fn cmp(&self, other: &Self) -> Ordering {
        // Sort by points
        if self.total_points != other.total_points {
            return other.total_points.cmp(&self.total_points);
        }
        // Sort by first places
        if self.first_places != other.first_places {
            return other.first_places.cmp(&self.first_places);
        }
        self.team_name
            .cmp(&other.team_name)
            .then_with(|| self.team_id.cmp(&other.team_id))
    }
}

pub fn team_standings(snapshot: &FestSnapshot, points: &PointsConfig) -> Vec<TeamStanding> {
    let mut standings: HashMap<String, TeamStanding> = snapshot
        .teams
        .iter()
        .map(|team| {
            (
                team.id.clone(),
                TeamStanding::new(team.id.clone(), team.name.clone()),
            )
        })
        .collect();

    for program in snapshot.programs.iter().filter(|program| program.is_closed()) {
        for entry in program_results(program, &snapshot.assignments, &snapshot.scores, points) {
            standings
                .entry(entry.team_id.clone())
                .or_insert_with(|| TeamStanding::new(entry.team_id.clone(), entry.team_id.clone()))
                .add_result(&entry);
        }
    }

    let mut sorted: Vec<TeamStanding> = standings.into_values().collect();
    sorted.sort();

    for (rank, item) in sorted.iter().enumerate() {
        info!(
            "Standing {:0>2} Points {} Team: {}",
            rank + 1,
            item.total_points,
            item.team_name
        );
    }

    sorted
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::models::{AssignmentStatus, JudgingState, Team};

    fn closed_program(id: &str) -> Program {
        Program {
            id: id.to_string(),
            name: id.to_string(),
            category_id: "general".to_string(),
            judging_status: JudgingState::Closed,
            participants_count: 0,
            judges: vec!["j1".to_string(), "j2".to_string()],
            stage_id: None,
        }
    }

    fn entry(id: &str, program_id: &str, team_id: &str, letter: &str) -> Assignment {
        Assignment {
            id: id.to_string(),
            program_id: program_id.to_string(),
            student_id: format!("s-{id}"),
            team_id: team_id.to_string(),
            status: AssignmentStatus::Active,
            code_letter: Some(letter.to_string()),
        }
    }

    fn mark(assignment_id: &str, program_id: &str, judge_id: &str, value: f64) -> Score {
        Score {
            id: format!("{assignment_id}-{judge_id}"),
            program_id: program_id.to_string(),
            judge_id: judge_id.to_string(),
            assignment_id: assignment_id.to_string(),
            value,
            grade: None,
        }
    }

    #[test]
    fn open_program_has_no_results() {
        let mut program = closed_program("p1");
        program.judging_status = JudgingState::Open;
        let assignments = vec![entry("a1", "p1", "t1", "A")];
        let scores = vec![mark("a1", "p1", "j1", 80.0)];
        assert!(program_results(&program, &assignments, &scores, &PointsConfig::default()).is_empty());
    }

    #[test]
    fn ties_share_position_and_grades_follow_average() {
        let program = closed_program("p1");
        let assignments = vec![
            entry("a1", "p1", "t1", "A"),
            entry("a2", "p1", "t2", "B"),
            entry("a3", "p1", "t3", "C"),
            entry("a4", "p1", "t1", "D"),
        ];
        let scores = vec![
            mark("a1", "p1", "j1", 80.0),
            mark("a1", "p1", "j2", 70.0),
            mark("a2", "p1", "j1", 75.0),
            mark("a2", "p1", "j2", 75.0),
            mark("a3", "p1", "j1", 60.0),
            mark("a3", "p1", "j2", 62.0),
            mark("a4", "p1", "j1", 40.0),
            mark("a4", "p1", "j2", 40.0),
        ];

        let results = program_results(&program, &assignments, &scores, &PointsConfig::default());
        let summary: Vec<(&str, Option<u32>, Option<&str>, u32)> = results
            .iter()
            .map(|r| (r.assignment_id.as_str(), r.position, r.grade.as_deref(), r.points))
            .collect();

        assert_eq!(
            summary,
            vec![
                ("a1", Some(1), Some("A"), 10),
                ("a2", Some(1), Some("A"), 10),
                ("a3", Some(3), Some("B"), 4),
                ("a4", None, None, 0),
            ]
        );
    }

    #[test]
    fn standings_sum_closed_programs_only() {
        let mut snapshot = FestSnapshot::new();
        snapshot.teams = vec![
            Team {
                id: "t1".to_string(),
                name: "Red".to_string(),
                leader_id: None,
            },
            Team {
                id: "t2".to_string(),
                name: "Blue".to_string(),
                leader_id: None,
            },
        ];
        let mut open = closed_program("p2");
        open.judging_status = JudgingState::Open;
        snapshot.programs = vec![closed_program("p1"), open];
        snapshot.assignments = vec![
            entry("a1", "p1", "t1", "A"),
            entry("a2", "p1", "t2", "B"),
            entry("a3", "p2", "t2", "A"),
        ];
        snapshot.scores = vec![
            mark("a1", "p1", "j1", 55.0),
            mark("a2", "p1", "j1", 72.0),
            mark("a3", "p2", "j1", 99.0),
        ];

        let standings = team_standings(&snapshot, &PointsConfig::default());
        let order: Vec<(&str, u32, u32)> = standings
            .iter()
            .map(|s| (s.team_name.as_str(), s.total_points, s.first_places))
            .collect();
        assert_eq!(order, vec![("Blue", 10, 1), ("Red", 4, 0)]);
    }
}
