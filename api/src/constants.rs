//! Application constants

// Action types with dedicated XP values and counters
pub const ACTION_VIDEO_LIKE: &str = "video_like";
pub const ACTION_VIDEO_WATCH: &str = "video_watch";
pub const ACTION_QUIZ_COMPLETE: &str = "quiz_complete";
pub const ACTION_CHALLENGE_COMPLETE: &str = "challenge_complete";

/// Base XP per action type
pub const BASE_XP_VIDEO_LIKE: i64 = 15;
pub const BASE_XP_VIDEO_WATCH: i64 = 25;
pub const BASE_XP_QUIZ_COMPLETE: i64 = 50;
pub const BASE_XP_CHALLENGE_COMPLETE: i64 = 75;
pub const BASE_XP_DEFAULT: i64 = 10;

/// Bonus for an engagement score strictly above the threshold
pub const ENGAGEMENT_BONUS_XP: i64 = 10;
pub const ENGAGEMENT_BONUS_THRESHOLD: f64 = 70.0;

/// Bonus for the first (action type, target) pair a user performs
pub const FIRST_TIME_BONUS_XP: i64 = 25;

/// XP unit of the level curve: level = floor(sqrt(xp / 100)) + 1
pub const XP_PER_LEVEL_UNIT: i64 = 100;

/// How far back the validator looks at a user's history (2 hours)
pub const HISTORY_LOOKBACK_SECS: i64 = 2 * 60 * 60;

/// Default cooldown between two likes of the same video
pub const VIDEO_LIKE_COOLDOWN_MS: i64 = 3_000;

/// Client timestamps may run at most this far ahead of server time
pub const DEFAULT_MAX_FUTURE_SKEW_MS: i64 = 5_000;

/// Client timestamps older than this are treated as replays (5 minutes)
pub const DEFAULT_MAX_ACTION_AGE_MS: i64 = 5 * 60 * 1000;

/// Per-IP network window: 100 actions per 5 minutes
pub const IP_WINDOW_SECS: i64 = 5 * 60;
pub const IP_WINDOW_MAX_ACTIONS: usize = 100;
pub const IP_WINDOW_COOLDOWN_MS: i64 = 300_000;

/// Per-IP burst window: 20 actions per 10 seconds
pub const IP_BURST_SECS: i64 = 10;
pub const IP_BURST_MAX_ACTIONS: usize = 20;
pub const IP_BURST_COOLDOWN_MS: i64 = 30_000;

/// Per-user window defaults: 60 actions per minute
pub const USER_WINDOW_SECS: i64 = 60;
pub const USER_WINDOW_MAX_ACTIONS: usize = 60;

/// Upper bound for a single watch-time ping
pub const MAX_WATCH_TIME_MINUTES: f64 = 240.0;

/// Upper bound for a reported study duration (one day)
pub const MAX_STUDY_DURATION_MINUTES: f64 = 24.0 * 60.0;

/// Bonus kinds deduplicated per user, video and day
pub const BONUS_KIND_VIDEO_COMPLETE: &str = "video_complete";
pub const BONUS_KIND_ENGAGEMENT: &str = "engagement";

/// Default timeout for a single store round trip
pub const DEFAULT_STORE_TIMEOUT_MS: u64 = 5_000;

/// How often idle per-user state (locks, ping buckets) is pruned
pub const MAINTENANCE_INTERVAL_SECS: u64 = 10 * 60;
