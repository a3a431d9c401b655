use std::collections::HashSet;

use serde::Serialize;

use crate::models::{Assignment, Program, Score};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JudgingStatus {
    pub active_reported_count: usize,
    pub scored_by_this_judge: usize,
    pub is_complete: bool,
}

/// Active entries of `program` that have been reported on stage.
pub fn active_reported<'a>(
    program: &Program,
    assignments: &'a [Assignment],
) -> impl Iterator<Item = &'a Assignment> + use<'a> {
    let program_id = program.id.clone();
    assignments
        .iter()
        .filter(move |assignment| assignment.program_id == program_id)
        .filter(|assignment| assignment.is_active_reported())
}

fn judge_scores<'a>(
    program: &Program,
    scores: &'a [Score],
    judge_id: &str,
) -> impl Iterator<Item = &'a Score> + use<'a> {
    let program_id = program.id.clone();
    let judge_id = judge_id.to_string();
    scores
        .iter()
        .filter(move |score| score.program_id == program_id && score.judge_id == judge_id)
}

/// Counts mirror the raw data. Completeness needs a score on every active reported entry,
/// so marks left on cancelled or unreported entries never fill a gap. An empty program is
/// never complete.
pub fn compute(
    program: &Program,
    assignments: &[Assignment],
    scores: &[Score],
    judge_id: &str,
) -> JudgingStatus {
    let active_reported_count = active_reported(program, assignments).count();
    let scored_by_this_judge = judge_scores(program, scores, judge_id).count();
    let uncovered = missing_scores(program, assignments, scores, judge_id).len();

    JudgingStatus {
        active_reported_count,
        scored_by_this_judge,
        is_complete: active_reported_count > 0 && uncovered == 0,
    }
}

pub fn missing_scores<'a>(
    program: &Program,
    assignments: &'a [Assignment],
    scores: &[Score],
    judge_id: &str,
) -> Vec<&'a Assignment> {
    let scored: HashSet<&str> = judge_scores(program, scores, judge_id)
        .map(|score| score.assignment_id.as_str())
        .collect();

    active_reported(program, assignments)
        .filter(|assignment| !scored.contains(assignment.id.as_str()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AssignmentStatus, JudgingState};

    fn program(id: &str) -> Program {
        Program {
            id: id.to_string(),
            name: format!("Program {id}"),
            category_id: "senior".to_string(),
            judging_status: JudgingState::Open,
            participants_count: 0,
            judges: vec!["j1".to_string(), "j2".to_string()],
            stage_id: None,
        }
    }

    fn assignment(
        id: &str,
        program_id: &str,
        code: Option<&str>,
        status: AssignmentStatus,
    ) -> Assignment {
        Assignment {
            id: id.to_string(),
            program_id: program_id.to_string(),
            student_id: format!("s-{id}"),
            team_id: "t1".to_string(),
            status,
            code_letter: code.map(str::to_string),
        }
    }

    fn score(assignment_id: &str, program_id: &str, judge_id: &str) -> Score {
        Score {
            id: format!("{program_id}-{judge_id}-{assignment_id}"),
            program_id: program_id.to_string(),
            judge_id: judge_id.to_string(),
            assignment_id: assignment_id.to_string(),
            value: 7.5,
            grade: None,
        }
    }

    fn reported(count: usize) -> Vec<Assignment> {
        (0..count)
            .map(|i| {
                let letter = char::from(b'A' + i as u8).to_string();
                assignment(&format!("a{i}"), "p1", Some(&letter), AssignmentStatus::Active)
            })
            .collect()
    }

    #[test]
    fn five_reported_and_five_scored_is_complete() {
        let assignments = reported(5);
        let scores: Vec<Score> = assignments.iter().map(|a| score(&a.id, "p1", "j1")).collect();

        let status = compute(&program("p1"), &assignments, &scores, "j1");
        assert_eq!(
            status,
            JudgingStatus {
                active_reported_count: 5,
                scored_by_this_judge: 5,
                is_complete: true,
            }
        );
    }

    #[test]
    fn four_of_five_scored_is_incomplete() {
        let assignments = reported(5);
        let scores: Vec<Score> = assignments[..4].iter().map(|a| score(&a.id, "p1", "j1")).collect();

        let status = compute(&program("p1"), &assignments, &scores, "j1");
        assert_eq!(status.scored_by_this_judge, 4);
        assert!(!status.is_complete);

        let missing = missing_scores(&program("p1"), &assignments, &scores, "j1");
        assert_eq!(missing.len(), 1);
        assert_eq!(missing[0].id, "a4");
    }

    #[test]
    fn empty_program_is_never_complete() {
        let status = compute(&program("p1"), &[], &[], "j1");
        assert_eq!(status.active_reported_count, 0);
        assert!(!status.is_complete);

        // Unreported registrations do not make the program judgeable.
        let pending = vec![assignment("a0", "p1", None, AssignmentStatus::Active)];
        assert!(!compute(&program("p1"), &pending, &[], "j1").is_complete);
    }

    #[test]
    fn cancelled_and_unreported_assignments_are_excluded() {
        let assignments = vec![
            assignment("a0", "p1", Some("A"), AssignmentStatus::Active),
            assignment("a1", "p1", Some("B"), AssignmentStatus::Cancelled),
            assignment("a2", "p1", None, AssignmentStatus::Active),
            assignment("a3", "p1", Some(""), AssignmentStatus::Active),
            assignment("a4", "p2", Some("A"), AssignmentStatus::Active),
        ];

        let status = compute(&program("p1"), &assignments, &[], "j1");
        assert_eq!(status.active_reported_count, 1);
    }

    #[test]
    fn scores_are_counted_per_judge_and_program() {
        let assignments = reported(2);
        let scores = vec![
            score("a0", "p1", "j1"),
            score("a1", "p1", "j1"),
            score("a0", "p1", "j2"),
            score("a0", "p2", "j2"),
        ];

        assert!(compute(&program("p1"), &assignments, &scores, "j1").is_complete);
        let second = compute(&program("p1"), &assignments, &scores, "j2");
        assert_eq!(second.scored_by_this_judge, 1);
        assert!(!second.is_complete);
    }

    #[test]
    fn score_on_cancelled_entry_does_not_fill_a_gap() {
        let assignments = vec![
            assignment("a1", "p1", Some("A"), AssignmentStatus::Active),
            assignment("a2", "p1", Some("B"), AssignmentStatus::Cancelled),
            assignment("a3", "p1", None, AssignmentStatus::Active),
        ];
        let scores = vec![score("a2", "p1", "j1"), score("a3", "p1", "j1")];

        let status = compute(&program("p1"), &assignments, &scores, "j1");
        assert_eq!(
            status,
            JudgingStatus {
                active_reported_count: 1,
                scored_by_this_judge: 2,
                is_complete: false,
            }
        );
        let missing = missing_scores(&program("p1"), &assignments, &scores, "j1");
        assert_eq!(missing.len(), 1);
        assert_eq!(missing[0].id, "a1");
    }

    #[test]
    fn missing_scores_outlive_a_temporary_program() {
        let assignments = reported(3);
        let missing: Vec<&Assignment> = {
            let scores = vec![score("a1", "p1", "j1")];
            missing_scores(&program("p1"), &assignments, &scores, "j1")
        };
        let ids: Vec<&str> = missing.iter().map(|a| a.id.as_str()).collect();
        assert_eq!(ids, vec!["a0", "a2"]);
    }

    #[test]
    fn completeness_matches_full_coverage_for_every_prefix() {
        let assignments = reported(6);
        for scored in 0..=assignments.len() {
            let scores: Vec<Score> = assignments[..scored]
                .iter()
                .map(|a| score(&a.id, "p1", "j1"))
                .collect();
            let status = compute(&program("p1"), &assignments, &scores, "j1");
            let covered = missing_scores(&program("p1"), &assignments, &scores, "j1").is_empty();
            assert_eq!(status.is_complete, covered, "scored {scored}");
        }
    }
}
