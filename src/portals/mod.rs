pub mod judge;
pub mod stage;
pub mod team_leader;

use serde::{Deserialize, Serialize};

use crate::error::{FestError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Role {
    Admin,
    Judge,
    TeamLeader,
    StageController,
}

/// Who is acting. Passed explicitly to every portal call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub user_id: String,
    pub role: Role,
    #[serde(default)]
    pub team_id: Option<String>,
}

impl Session {
    pub fn new(user_id: impl Into<String>, role: Role) -> Self {
        Self {
            user_id: user_id.into(),
            role,
            team_id: None,
        }
    }

    pub fn with_team(mut self, team_id: impl Into<String>) -> Self {
        self.team_id = Some(team_id.into());
        self
    }

    /// Admins pass every role check.
    pub fn require(&self, role: Role, action: &'static str) -> Result<()> {
        if self.role == role || self.role == Role::Admin {
            return Ok(());
        }
        Err(FestError::Forbidden {
            role: self.role,
            action,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn admin_passes_every_check() {
        let admin = Session::new("root", Role::Admin);
        assert!(admin.require(Role::Judge, "score").is_ok());
        assert!(admin.require(Role::StageController, "run stage").is_ok());

        let leader = Session::new("u7", Role::TeamLeader).with_team("t1");
        assert_eq!(leader.team_id.as_deref(), Some("t1"));
        assert!(matches!(
            leader.require(Role::Judge, "score"),
            Err(FestError::Forbidden {
                role: Role::TeamLeader,
                ..
            })
        ));
    }
}
