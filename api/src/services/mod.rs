pub mod achievements;
pub mod anti_cheat;
pub mod bonuses;
pub mod error;
pub mod metrics;
pub mod rate_limit;
pub mod recorder;
pub mod streak;
pub mod user_locks;
pub mod xp;
