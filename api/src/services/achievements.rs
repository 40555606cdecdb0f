//! Static achievement catalog.
//!
//! Predicates run against the user state after an update. An achievement
//! already unlocked is never returned again.

use serde::Serialize;

use crate::models::{AchievementUnlock, UserState};

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Achievement {
    pub id: &'static str,
    pub name: &'static str,
    pub description: &'static str,
    pub xp_reward: i64,
    #[serde(skip)]
    predicate: fn(&UserState) -> bool,
}

impl Achievement {
    pub fn is_met(&self, user: &UserState) -> bool {
        (self.predicate)(user)
    }

    pub fn unlock(&self) -> AchievementUnlock {
        AchievementUnlock {
            achievement_id: self.id.to_string(),
            xp_reward: self.xp_reward,
        }
    }
}

pub static CATALOG: &[Achievement] = &[
    Achievement {
        id: "video_explorer",
        name: "Video Explorer",
        description: "Watch 5 videos",
        xp_reward: 100,
        predicate: |u: &UserState| u.videos_watched >= 5,
    },
    Achievement {
        id: "video_marathon",
        name: "Video Marathon",
        description: "Watch 25 videos",
        xp_reward: 250,
        predicate: |u: &UserState| u.videos_watched >= 25,
    },
    Achievement {
        id: "supportive_learner",
        name: "Supportive Learner",
        description: "Like 10 videos",
        xp_reward: 50,
        predicate: |u: &UserState| u.likes_given >= 10,
    },
    Achievement {
        id: "quiz_whiz",
        name: "Quiz Whiz",
        description: "Complete 5 quizzes",
        xp_reward: 150,
        predicate: |u: &UserState| u.quizzes_completed >= 5,
    },
    Achievement {
        id: "challenge_champion",
        name: "Challenge Champion",
        description: "Complete 5 coding challenges",
        xp_reward: 200,
        predicate: |u: &UserState| u.challenges_completed >= 5,
    },
    Achievement {
        id: "streak_3",
        name: "On a Roll",
        description: "Learn 3 days in a row",
        xp_reward: 75,
        predicate: |u: &UserState| u.best_streak >= 3,
    },
    Achievement {
        id: "streak_7",
        name: "Week Warrior",
        description: "Learn 7 days in a row",
        xp_reward: 150,
        predicate: |u: &UserState| u.best_streak >= 7,
    },
    Achievement {
        id: "streak_30",
        name: "Unstoppable",
        description: "Learn 30 days in a row",
        xp_reward: 500,
        predicate: |u: &UserState| u.best_streak >= 30,
    },
    Achievement {
        id: "early_bird",
        name: "Early Bird",
        description: "Start learning before 8am on 5 days",
        xp_reward: 100,
        predicate: |u: &UserState| u.early_bird_sessions >= 5,
    },
    Achievement {
        id: "night_owl",
        name: "Night Owl",
        description: "Learn late at night on 5 days",
        xp_reward: 100,
        predicate: |u: &UserState| u.night_owl_sessions >= 5,
    },
    Achievement {
        id: "weekend_warrior",
        name: "Weekend Warrior",
        description: "Learn on 4 weekend days",
        xp_reward: 100,
        predicate: |u: &UserState| u.weekend_sessions >= 4,
    },
    Achievement {
        id: "level_5",
        name: "Rising Star",
        description: "Reach level 5",
        xp_reward: 200,
        predicate: |u: &UserState| u.level >= 5,
    },
    Achievement {
        id: "level_10",
        name: "Seasoned Learner",
        description: "Reach level 10",
        xp_reward: 500,
        predicate: |u: &UserState| u.level >= 10,
    },
];

pub fn find(id: &str) -> Option<&'static Achievement> {
    CATALOG.iter().find(|a| a.id == id)
}

/// Achievements whose predicate holds but which the user doesn't have yet
pub fn newly_unlocked(user: &UserState) -> Vec<&'static Achievement> {
    CATALOG
        .iter()
        .filter(|a| !user.has_achievement(a.id) && a.is_met(user))
        .collect()
}
