use spacetimedb::{
    ReducerContext, Identity, Table, Timestamp, ScheduleAt,
    table, reducer, view, SpacetimeType, rand::Rng,
    client_visibility_filter, Filter,
};
use chrono::{DateTime, NaiveDate};

// Starter catalog seeded at module init
mod starter_puzzles;

// Bulk import/restore reducers for seeding and disaster recovery
mod restore;

// ==================== CONSTANTS ====================

/// Base score for any correct answer
const BASE_SCORE_AWARD: u32 = 10;

/// Extra score for completing the day's challenge puzzle
const DAILY_CHALLENGE_BONUS: u32 = 20;

/// Correct answers in a topic before it counts as mastered
const MASTERY_THRESHOLD: u32 = 3;

/// Streak length that earns the Streak Master badge
const STREAK_MASTER_THRESHOLD: u32 = 5;

/// Solved-puzzle count that earns the Puzzle Novice badge
const PUZZLE_NOVICE_THRESHOLD: u32 = 5;

const BADGE_STREAK_MASTER: &str = "Streak Master";
const BADGE_PUZZLE_NOVICE: &str = "Puzzle Novice";

/// Hint placeholder for puzzles authored without one
pub const DEFAULT_HINT: &str = "No hint available.";

const MSG_CORRECT: &str = "Correct! Great job!";
const MSG_INCORRECT: &str = "Incorrect answer, try again!";
const MSG_NO_PUZZLES: &str =
    "No new puzzles available. Please reset your seen puzzles or update your preferences.";
const MSG_INVALID_SUBMISSION: &str = "Invalid puzzle or answer";
const MSG_PUZZLE_NOT_FOUND: &str = "Puzzle not found";

/// Quiz-days roll over at midnight PST (8am UTC)
/// This ensures US students see the daily challenge reset overnight, not during homework time
const DAY_ROLLOVER_HOUR_UTC: i64 = 8;

/// Graded assignments older than this are pruned from the public tables
const ASSIGNMENT_RETENTION_MICROS: i64 = 7 * 24 * 60 * 60 * 1_000_000;

// ==================== TYPES ====================

#[derive(SpacetimeType, Debug, Clone, Copy, PartialEq, Eq)]
pub enum PuzzleKind {
    Linear,
    Fraction,
    Coding,
}

impl PuzzleKind {
    pub fn parse(value: &str) -> Option<Self> {
        match value.to_lowercase().as_str() {
            "linear" => Some(PuzzleKind::Linear),
            "fraction" => Some(PuzzleKind::Fraction),
            "coding" => Some(PuzzleKind::Coding),
            _ => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            PuzzleKind::Linear => "linear",
            PuzzleKind::Fraction => "fraction",
            PuzzleKind::Coding => "coding",
        }
    }
}

#[derive(SpacetimeType, Debug, Clone, Copy, PartialEq, Eq)]
pub enum EducationLevel {
    Primary,
    High,
    College,
    Engineering,
}

impl EducationLevel {
    pub fn parse(value: &str) -> Option<Self> {
        match value.to_lowercase().as_str() {
            "primary" => Some(EducationLevel::Primary),
            "high" => Some(EducationLevel::High),
            "college" => Some(EducationLevel::College),
            "engineering" => Some(EducationLevel::Engineering),
            _ => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            EducationLevel::Primary => "primary",
            EducationLevel::High => "high",
            EducationLevel::College => "college",
            EducationLevel::Engineering => "engineering",
        }
    }
}

// ==================== TABLES ====================

/// Session links ephemeral connection to stable learner
/// PRIVATE: Links connection identity to learner ID (no PII)
#[table(name = session)]
pub struct Session {
    #[primary_key]
    pub connection_id: Identity,

    /// Stable learner ID - verified by gateway
    pub learner_id: String,

    /// When this session was created
    pub connected_at: Timestamp,
}

/// Learner profile with cumulative game state
/// PRIVATE: Clients access via my_learner view for RLS
/// The engine is the sole writer of the game-state fields
#[table(name = learner)]
#[derive(Clone)]
pub struct Learner {
    #[primary_key]
    pub id: String,

    /// Display name
    pub name: String,

    /// Targeting filter for selection
    pub education_level: EducationLevel,

    /// Coding-language preference, None = no preference
    pub preferred_language: Option<String>,

    /// Cumulative score, never decreases
    pub score: u32,

    /// Correct answers lifetime, never decreases
    pub puzzles_solved: u32,

    /// Puzzle IDs already served, grows until explicit reset
    pub seen_puzzles: Vec<u64>,

    /// Badge names in grant order, no duplicates, never revoked
    pub badges: Vec<String>,

    /// Topics with MASTERY_THRESHOLD correct answers, never removed
    pub mastered_topics: Vec<PuzzleKind>,

    /// Correct answers on the current quiz-day, 0 after a wrong answer
    /// Counts correct answers per day, not consecutive days
    pub streak: u32,

    /// Last quiz-day a streak-affecting answer was recorded
    pub last_streak_at: Option<Timestamp>,

    /// Last quiz-day a daily challenge was completed (gates the daily pick)
    pub last_daily_challenge_at: Option<Timestamp>,

    pub created_at: Timestamp,

    /// Last selection or submission activity
    pub last_seen_at: Timestamp,
}

/// Puzzle catalog, immutable once authored
/// PRIVATE: The canonical answer must never reach a client subscription;
/// learners see puzzles only through their assignment rows
#[table(name = puzzle)]
#[derive(Clone)]
pub struct Puzzle {
    #[primary_key]
    #[auto_inc]
    pub id: u64,

    pub kind: PuzzleKind,

    pub question: String,

    /// Canonical answer, compared trimmed and case-insensitive
    pub answer: String,

    /// Targeting: which education level this puzzle is authored for
    pub education_level: EducationLevel,

    /// Coding-language tag, only meaningful when kind = Coding
    pub language: Option<String>,

    pub hint: String,

    /// Flagged at authoring time for the once-per-day bonus pick
    pub is_daily_challenge: bool,
}

/// A puzzle served to a learner - the selection response
/// Carries everything the client needs except the answer
#[table(name = assignment, public)]
#[derive(Clone)]
pub struct Assignment {
    #[primary_key]
    #[auto_inc]
    pub id: u64,

    #[index(btree)]
    pub learner_id: String,

    pub puzzle_id: u64,

    pub kind: PuzzleKind,

    pub question: String,

    pub hint: String,

    pub is_daily_challenge: bool,

    pub issued_at: Timestamp,
}

/// Graded answer record - the progression response
#[table(name = submission, public)]
pub struct Submission {
    #[primary_key]
    #[auto_inc]
    pub id: u64,

    #[index(btree)]
    pub assignment_id: u64,

    #[index(btree)]
    pub learner_id: String,

    pub is_correct: bool,

    pub message: String,

    /// Learner state after the transition
    pub score_after: u32,
    pub streak_after: u32,

    pub was_daily_challenge: bool,

    /// Full badge set at response time; clients diff against their known set
    pub badges_after: Vec<String>,

    pub submitted_at: Timestamp,
}

/// Per-topic attempt counters for a learner
/// Invariant: correct <= total, both monotone
#[table(name = topic_performance, public)]
#[derive(Clone)]
pub struct TopicPerformance {
    #[primary_key]
    #[auto_inc]
    pub id: u64,

    #[index(btree)]
    pub learner_id: String,

    pub kind: PuzzleKind,

    pub correct: u32,

    pub total: u32,

    pub last_attempt_at: Timestamp,
}

/// Free-text learner feedback about a puzzle
/// PRIVATE: Read by operators, not subscribed by clients
#[table(name = feedback)]
pub struct Feedback {
    #[primary_key]
    #[auto_inc]
    pub id: u64,

    #[index(btree)]
    pub learner_id: String,

    pub puzzle_id: u64,

    pub message: String,

    pub created_at: Timestamp,
}

/// Authorized identities that can access admin reducers
/// Used for session creation, catalog authoring, and restore
#[table(name = authorized_worker)]
pub struct AuthorizedWorker {
    #[primary_key]
    pub identity: Identity,
}

/// Schedule table for assignment retention cleanup
#[table(name = prune_schedule, scheduled(prune_graded_assignments))]
pub struct PruneSchedule {
    #[primary_key]
    #[auto_inc]
    pub id: u64,

    /// When to run the prune
    pub scheduled_at: ScheduleAt,
}

// ==================== VIEWS ====================

/// View: Returns only the current user's learner row
/// This is the secure way for clients to read their own progress
/// (score, puzzles solved, badges, mastered topics, streak)
#[view(name = my_learner, public)]
fn my_learner(ctx: &spacetimedb::ViewContext) -> Option<Learner> {
    let session = ctx.db.session().connection_id().find(ctx.sender)?;
    ctx.db.learner().id().find(&session.learner_id)
}

// ==================== ROW LEVEL SECURITY ====================

/// RLS Filter: Learners only see their own assignments
#[client_visibility_filter]
const ASSIGNMENT_VISIBILITY: Filter = Filter::Sql(
    "SELECT a.* FROM assignment a
     JOIN session s WHERE a.learner_id = s.learner_id AND s.connection_id = :sender"
);

/// RLS Filter: Learners only see their own graded submissions
#[client_visibility_filter]
const SUBMISSION_VISIBILITY: Filter = Filter::Sql(
    "SELECT sm.* FROM submission sm
     JOIN session s WHERE sm.learner_id = s.learner_id AND s.connection_id = :sender"
);

/// RLS Filter: Learners only see their own topic counters
#[client_visibility_filter]
const TOPIC_PERFORMANCE_VISIBILITY: Filter = Filter::Sql(
    "SELECT tp.* FROM topic_performance tp
     JOIN session s WHERE tp.learner_id = s.learner_id AND s.connection_id = :sender"
);

// ==================== HELPER FUNCTIONS ====================

/// Get learner from session using the sender's identity
/// This abstracts the session lookup pattern used throughout reducers
fn get_learner(ctx: &ReducerContext) -> Result<Learner, String> {
    let session = ctx.db.session()
        .connection_id()
        .find(&ctx.sender)
        .ok_or("No session found".to_string())?;

    ctx.db.learner()
        .id()
        .find(&session.learner_id)
        .ok_or("Learner not found".to_string())
}

/// Map a timestamp to its quiz-day (calendar date after the rollover offset)
fn quiz_day(ts: Timestamp) -> NaiveDate {
    let shifted = ts.to_micros_since_unix_epoch() - DAY_ROLLOVER_HOUR_UTC * 3_600_000_000;
    DateTime::from_timestamp_micros(shifted)
        .map(|dt| dt.date_naive())
        .unwrap_or(NaiveDate::MIN)
}

fn is_new_quiz_day(last: Timestamp, current: Timestamp) -> bool {
    quiz_day(current) > quiz_day(last)
}

fn same_quiz_day(a: Timestamp, b: Timestamp) -> bool {
    quiz_day(a) == quiz_day(b)
}

/// Case-insensitive, whitespace-trimmed comparison against the canonical answer
fn grade_answer(canonical: &str, submitted: &str) -> bool {
    submitted.trim().to_lowercase() == canonical.trim().to_lowercase()
}

/// Grant a badge if not already held. Returns true when newly granted.
fn grant_badge(learner: &mut Learner, badge: &str) -> bool {
    if learner.badges.iter().any(|b| b == badge) {
        return false;
    }
    learner.badges.push(badge.to_string());
    true
}

// ==================== SELECTION ENGINE ====================

/// One step of the relaxing-filter cascade
/// Each step is a superset of the previous; the first non-empty one wins
#[derive(Debug, Clone, Copy, PartialEq)]
struct SelectionFilter {
    daily_only: bool,
    education_level: Option<EducationLevel>,
    restrict_language: bool,
}

/// Daily-challenge sourcing: strict, then drop only the language restriction
fn daily_filters(level: EducationLevel) -> [SelectionFilter; 2] {
    [
        SelectionFilter { daily_only: true, education_level: Some(level), restrict_language: true },
        SelectionFilter { daily_only: true, education_level: Some(level), restrict_language: false },
    ]
}

/// Regular sourcing: strict, drop the language restriction, drop the level filter
fn regular_filters(level: EducationLevel) -> [SelectionFilter; 3] {
    [
        SelectionFilter { daily_only: false, education_level: Some(level), restrict_language: true },
        SelectionFilter { daily_only: false, education_level: Some(level), restrict_language: false },
        SelectionFilter { daily_only: false, education_level: None, restrict_language: false },
    ]
}

/// Whether a catalog puzzle passes one cascade step for this learner
/// The language restriction only binds when the learner has a preference:
/// non-coding puzzles always pass it, coding puzzles must match the preference
fn puzzle_matches(
    puzzle: &Puzzle,
    filter: &SelectionFilter,
    preferred_language: Option<&str>,
    seen: &[u64],
) -> bool {
    if puzzle.is_daily_challenge != filter.daily_only {
        return false;
    }
    if seen.contains(&puzzle.id) {
        return false;
    }
    if let Some(level) = filter.education_level {
        if puzzle.education_level != level {
            return false;
        }
    }
    if filter.restrict_language {
        if let Some(pref) = preferred_language {
            if puzzle.kind == PuzzleKind::Coding && puzzle.language.as_deref() != Some(pref) {
                return false;
            }
        }
    }
    true
}

/// Walk the cascade in order and return the first non-empty candidate set
/// (with its step index for the canonical log line)
fn first_matching_tier<'a>(
    catalog: &'a [Puzzle],
    filters: &[SelectionFilter],
    learner: &Learner,
) -> Option<(usize, Vec<&'a Puzzle>)> {
    let preferred = learner.preferred_language.as_deref();
    for (tier, filter) in filters.iter().enumerate() {
        let candidates: Vec<&Puzzle> = catalog
            .iter()
            .filter(|p| puzzle_matches(p, filter, preferred, &learner.seen_puzzles))
            .collect();
        if !candidates.is_empty() {
            return Some((tier, candidates));
        }
    }
    None
}

/// Serve the next puzzle for the calling learner
///
/// On a new quiz-day a daily-challenge candidate always takes priority over a
/// regular pick. Marks the puzzle as seen and persists the profile BEFORE the
/// assignment is visible, so a learner who abandons a puzzle without
/// answering still will not see it again.
#[reducer]
pub fn request_puzzle(ctx: &ReducerContext) -> Result<(), String> {
    let mut learner = get_learner(ctx)?;

    let catalog: Vec<Puzzle> = ctx.db.puzzle().iter().collect();

    let new_day = learner
        .last_daily_challenge_at
        .map_or(true, |last| is_new_quiz_day(last, ctx.timestamp));

    let mut from_daily = false;
    let mut picked: Option<(usize, Vec<&Puzzle>)> = None;

    if new_day {
        picked = first_matching_tier(&catalog, &daily_filters(learner.education_level), &learner);
        from_daily = picked.is_some();
    }
    if picked.is_none() {
        picked = first_matching_tier(&catalog, &regular_filters(learner.education_level), &learner);
    }

    let (tier, candidates) = match picked {
        Some(found) => found,
        None => {
            log::warn!(
                "[SELECT] exhausted learner:{} level:{} seen:{}",
                learner.id,
                learner.education_level.label(),
                learner.seen_puzzles.len()
            );
            return Err(MSG_NO_PUZZLES.to_string());
        }
    };

    let candidate_count = candidates.len();
    let index = ctx.rng().gen_range(0..candidate_count);
    let chosen = candidates[index].clone();

    // The exclusion filters make a repeat unreachable; a hit here is a
    // programming error, not a retryable condition
    if learner.seen_puzzles.contains(&chosen.id) {
        log::error!(
            "[SELECT] duplicate puzzle chosen learner:{} puzzle:{} daily:{} tier:{}",
            learner.id, chosen.id, from_daily, tier
        );
        return Err("Internal error: Duplicate puzzle detected.".to_string());
    }

    // Seen tracking happens at selection time, not at answer time
    learner.seen_puzzles.push(chosen.id);
    learner.last_seen_at = ctx.timestamp;
    ctx.db.learner().id().update(learner.clone());

    ctx.db.assignment().insert(Assignment {
        id: 0, // auto-increment
        learner_id: learner.id.clone(),
        puzzle_id: chosen.id,
        kind: chosen.kind,
        question: chosen.question.clone(),
        hint: chosen.hint.clone(),
        is_daily_challenge: chosen.is_daily_challenge,
        issued_at: ctx.timestamp,
    });

    // Wide event: one canonical log per served puzzle
    log::info!(
        "[SELECT] served learner:{} puzzle:{} kind:{} daily:{} tier:{} candidates:{} seen:{}",
        learner.id,
        chosen.id,
        chosen.kind.label(),
        from_daily,
        tier,
        candidate_count,
        learner.seen_puzzles.len()
    );

    Ok(())
}

// ==================== PROGRESSION ENGINE ====================

/// Apply one graded answer to the learner and their topic counters
/// Returns the score awarded (0 for a wrong answer)
///
/// Streak counts correct answers on the current quiz-day: same-day correct
/// answers keep incrementing, a new day restarts at 1, the first wrong
/// answer resets to 0.
fn apply_submission(
    learner: &mut Learner,
    perf: &mut TopicPerformance,
    kind: PuzzleKind,
    is_correct: bool,
    is_daily: bool,
    now: Timestamp,
) -> u32 {
    let same_day = learner
        .last_streak_at
        .map_or(false, |last| same_quiz_day(last, now));

    if !is_correct {
        learner.streak = 0;
        learner.last_streak_at = Some(now);
        perf.total = perf.total.saturating_add(1);
        perf.last_attempt_at = now;
        return 0;
    }

    learner.streak = if same_day { learner.streak.saturating_add(1) } else { 1 };
    learner.last_streak_at = Some(now);

    if learner.streak >= STREAK_MASTER_THRESHOLD {
        grant_badge(learner, BADGE_STREAK_MASTER);
    }

    let mut award = BASE_SCORE_AWARD;
    if is_daily {
        award += DAILY_CHALLENGE_BONUS;
        learner.last_daily_challenge_at = Some(now);
    }
    learner.score = learner.score.saturating_add(award);
    learner.puzzles_solved = learner.puzzles_solved.saturating_add(1);

    perf.correct = perf.correct.saturating_add(1);
    perf.total = perf.total.saturating_add(1);
    perf.last_attempt_at = now;

    if perf.correct >= MASTERY_THRESHOLD && !learner.mastered_topics.contains(&kind) {
        learner.mastered_topics.push(kind);
    }

    if learner.puzzles_solved >= PUZZLE_NOVICE_THRESHOLD {
        grant_badge(learner, BADGE_PUZZLE_NOVICE);
    }

    award
}

/// Grade a submitted answer against a served assignment
///
/// The canonical answer never left the server; it is looked up from the
/// private catalog row here. The whole transition (score, streak, badges,
/// mastery, topic counters) commits in this one reducer call.
#[reducer]
pub fn submit_answer(ctx: &ReducerContext, assignment_id: u64, answer: String) -> Result<(), String> {
    if answer.is_empty() {
        return Err(MSG_INVALID_SUBMISSION.to_string());
    }

    let mut learner = get_learner(ctx)?;

    let assignment = ctx.db.assignment()
        .id()
        .find(&assignment_id)
        .filter(|a| a.learner_id == learner.id)
        .ok_or(MSG_PUZZLE_NOT_FOUND.to_string())?;

    let chosen = match ctx.db.puzzle().id().find(&assignment.puzzle_id) {
        Some(p) => p,
        None => {
            log::error!(
                "[ANSWER] assignment {} references missing puzzle {}",
                assignment.id, assignment.puzzle_id
            );
            return Err(MSG_PUZZLE_NOT_FOUND.to_string());
        }
    };

    let is_correct = grade_answer(&chosen.answer, &answer);

    let existing = ctx.db.topic_performance()
        .learner_id()
        .filter(&learner.id)
        .find(|p| p.kind == chosen.kind);
    let is_first_attempt_on_topic = existing.is_none();
    let mut perf = existing.unwrap_or(TopicPerformance {
        id: 0, // auto-increment
        learner_id: learner.id.clone(),
        kind: chosen.kind,
        correct: 0,
        total: 0,
        last_attempt_at: ctx.timestamp,
    });

    let award = apply_submission(
        &mut learner,
        &mut perf,
        chosen.kind,
        is_correct,
        chosen.is_daily_challenge,
        ctx.timestamp,
    );

    if is_first_attempt_on_topic {
        ctx.db.topic_performance().insert(perf);
    } else {
        ctx.db.topic_performance().id().update(perf);
    }

    learner.last_seen_at = ctx.timestamp;
    ctx.db.learner().id().update(learner.clone());

    let message = if is_correct { MSG_CORRECT } else { MSG_INCORRECT };
    ctx.db.submission().insert(Submission {
        id: 0, // auto-increment
        assignment_id: assignment.id,
        learner_id: learner.id.clone(),
        is_correct,
        message: message.to_string(),
        score_after: learner.score,
        streak_after: learner.streak,
        was_daily_challenge: chosen.is_daily_challenge,
        badges_after: learner.badges.clone(),
        submitted_at: ctx.timestamp,
    });

    // Wide event: one canonical log per graded answer
    log::info!(
        "[ANSWER] graded learner:{} puzzle:{} kind:{} correct:{} award:{} score:{} streak:{} daily:{} badges:{}",
        learner.id,
        chosen.id,
        chosen.kind.label(),
        is_correct,
        award,
        learner.score,
        learner.streak,
        chosen.is_daily_challenge,
        learner.badges.len()
    );

    Ok(())
}

// ==================== RESET & PREFERENCES ====================

/// Clear the calling learner's seen-puzzle history
/// No effect on score, streak, badges, or mastery
#[reducer]
pub fn reset_seen_puzzles(ctx: &ReducerContext) -> Result<(), String> {
    let mut learner = get_learner(ctx)?;
    let cleared = learner.seen_puzzles.len();
    learner.seen_puzzles.clear();
    ctx.db.learner().id().update(learner.clone());

    log::info!("[RESET] seen puzzles cleared learner:{} cleared:{}", learner.id, cleared);
    Ok(())
}

/// Update a learner's education level
/// - Authorized workers can change any learner's level
/// - Learners can self-service their own
/// A real change clears the seen-history: exclusions recorded against the
/// old level are no longer a meaningful filter
#[reducer]
pub fn set_education_level(
    ctx: &ReducerContext,
    level: String,
    learner_id: Option<String>,
) -> Result<(), String> {
    let parsed = EducationLevel::parse(&level)
        .ok_or_else(|| format!("Unknown education level: {}", level))?;

    let is_worker = ctx.db.authorized_worker().identity().find(&ctx.sender).is_some();
    if learner_id.is_some() && !is_worker {
        log::warn!("Non-worker attempted to change another learner's education level");
        return Err("Unauthorized".to_string());
    }

    let mut learner = match learner_id {
        Some(id) => ctx.db.learner()
            .id()
            .find(&id)
            .ok_or("Learner not found".to_string())?,
        None => get_learner(ctx)?,
    };

    if learner.education_level == parsed {
        return Ok(());
    }

    let old_level = learner.education_level;
    let cleared = learner.seen_puzzles.len();
    learner.education_level = parsed;
    learner.seen_puzzles.clear();
    ctx.db.learner().id().update(learner.clone());

    log::info!(
        "[PREFS] level changed learner:{} {}→{} seen_cleared:{}",
        learner.id,
        old_level.label(),
        parsed.label(),
        cleared
    );
    Ok(())
}

/// Update the calling learner's coding-language preference
/// Empty string clears it (clients send it for the blank option)
#[reducer]
pub fn set_preferred_language(ctx: &ReducerContext, language: Option<String>) -> Result<(), String> {
    let mut learner = get_learner(ctx)?;
    let normalized = language.filter(|l| !l.is_empty());
    learner.preferred_language = normalized.clone();
    ctx.db.learner().id().update(learner.clone());

    log::info!(
        "[PREFS] language set learner:{} language:{}",
        learner.id,
        normalized.as_deref().unwrap_or("none")
    );
    Ok(())
}

// ==================== SESSION LIFECYCLE ====================

/// Create a verified session for a client identity
/// This is called by the gateway AFTER verifying the learner's credential
/// Only authorized workers (gateway with owner token) can call this
#[reducer]
pub fn create_session(ctx: &ReducerContext, client_identity: String, learner_id: String) {
    // Authorization check: only authorized workers can create sessions
    if ctx.db.authorized_worker().identity().find(&ctx.sender).is_none() {
        panic!("Unauthorized: only gateway can create sessions");
    }

    let identity = Identity::from_hex(&client_identity)
        .expect("Invalid identity hex string");

    // Delete stale sessions: same learner (unclean reconnect) OR same connection_id (prevents PK conflict)
    let stale_sessions: Vec<_> = ctx.db.session()
        .iter()
        .filter(|s| s.learner_id == learner_id || s.connection_id == identity)
        .map(|s| s.connection_id)
        .collect();
    for conn_id in stale_sessions {
        ctx.db.session().connection_id().delete(&conn_id);
    }

    ctx.db.session().insert(Session {
        connection_id: identity,
        learner_id: learner_id.clone(),
        connected_at: ctx.timestamp,
    });

    log::info!(
        "[SESSION] created learner:{} ws:{}",
        &learner_id[..8.min(learner_id.len())],
        &client_identity[..8.min(client_identity.len())]
    );
}

/// Learner connects to the service
/// The learner_id is read from the verified session created by the gateway
/// Preferences passed here follow the same rules as the dedicated reducers
#[reducer]
pub fn connect(
    ctx: &ReducerContext,
    name: String,
    education_level: Option<String>,
    preferred_language: Option<String>,
) {
    // Get learner_id from verified session (created by gateway)
    // This is the ONLY thing we verify - client can't spoof its identity
    let session = ctx.db.session()
        .connection_id()
        .find(&ctx.sender)
        .expect("Session not found - verify with gateway first");

    let learner_id = session.learner_id.clone();
    let requested_level = education_level.as_deref().and_then(EducationLevel::parse);
    let requested_language = preferred_language.filter(|l| !l.is_empty());

    if let Some(mut existing) = ctx.db.learner().id().find(&learner_id) {
        existing.name = name;
        existing.last_seen_at = ctx.timestamp;

        // Level change through connect behaves like set_education_level:
        // the old level's seen-history stops being a meaningful exclusion set
        if let Some(level) = requested_level {
            if existing.education_level != level {
                log::info!(
                    "[CONNECT] level {}→{} for {}",
                    existing.education_level.label(),
                    level.label(),
                    existing.name
                );
                existing.education_level = level;
                existing.seen_puzzles.clear();
            }
        }
        if requested_language.is_some() {
            existing.preferred_language = requested_language;
        }

        ctx.db.learner().id().update(existing.clone());

        // Wide event: one canonical log with full learner context
        let lid = &learner_id[..8.min(learner_id.len())];
        log::info!(
            "[CONNECT] learner=\"{}\" learner_id={} type=returning level={} score={} solved={} streak={}",
            existing.name,
            lid,
            existing.education_level.label(),
            existing.score,
            existing.puzzles_solved,
            existing.streak
        );
    } else {
        let level = requested_level.unwrap_or(EducationLevel::High);
        let new_learner = Learner {
            id: learner_id.clone(),
            name,
            education_level: level,
            preferred_language: requested_language,
            score: 0,
            puzzles_solved: 0,
            seen_puzzles: Vec::new(),
            badges: Vec::new(),
            mastered_topics: Vec::new(),
            streak: 0,
            last_streak_at: None,
            last_daily_challenge_at: None,
            created_at: ctx.timestamp,
            last_seen_at: ctx.timestamp,
        };
        ctx.db.learner().insert(new_learner.clone());

        let lid = &learner_id[..8.min(learner_id.len())];
        log::info!(
            "[CONNECT] learner=\"{}\" learner_id={} type=new level={} language={}",
            new_learner.name,
            lid,
            new_learner.education_level.label(),
            new_learner.preferred_language.as_deref().unwrap_or("none")
        );
    }
}

#[reducer(client_disconnected)]
pub fn on_disconnect(ctx: &ReducerContext) {
    if let Some(session) = ctx.db.session().connection_id().find(&ctx.sender) {
        let session_duration_secs = ctx.timestamp.duration_since(session.connected_at)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        log::info!(
            "[DISCONNECT] learner:{} session_min:{:.1}",
            &session.learner_id[..8.min(session.learner_id.len())],
            session_duration_secs as f32 / 60.0
        );

        // Delete session (ephemeral connection mapping)
        ctx.db.session().connection_id().delete(&ctx.sender);
    }
}

// ==================== FEEDBACK ====================

/// Record free-text feedback about a puzzle
#[reducer]
pub fn submit_feedback(ctx: &ReducerContext, puzzle_id: u64, message: String) -> Result<(), String> {
    if message.trim().is_empty() {
        return Err("Feedback and puzzle ID are required".to_string());
    }

    let learner = get_learner(ctx)?;

    if ctx.db.puzzle().id().find(&puzzle_id).is_none() {
        return Err(MSG_PUZZLE_NOT_FOUND.to_string());
    }

    ctx.db.feedback().insert(Feedback {
        id: 0, // auto-increment
        learner_id: learner.id.clone(),
        puzzle_id,
        message,
        created_at: ctx.timestamp,
    });

    log::info!("[FEEDBACK] received learner:{} puzzle:{}", learner.id, puzzle_id);
    Ok(())
}

// ==================== ADMIN & MAINTENANCE ====================

/// Author a single catalog puzzle
/// Only authorized workers (admin panel with owner token) can call this
#[reducer]
pub fn add_puzzle(
    ctx: &ReducerContext,
    kind: String,
    question: String,
    answer: String,
    education_level: String,
    language: Option<String>,
    hint: Option<String>,
    is_daily_challenge: bool,
) -> Result<(), String> {
    if ctx.db.authorized_worker().identity().find(&ctx.sender).is_none() {
        log::warn!("Unauthorized add_puzzle attempt by {}", ctx.sender);
        return Err("Unauthorized".to_string());
    }

    let kind = PuzzleKind::parse(&kind)
        .ok_or_else(|| format!("Unknown puzzle kind: {}", kind))?;
    let level = EducationLevel::parse(&education_level)
        .ok_or_else(|| format!("Unknown education level: {}", education_level))?;
    if question.trim().is_empty() || answer.trim().is_empty() {
        return Err("Question and answer are required".to_string());
    }

    ctx.db.puzzle().insert(Puzzle {
        id: 0, // auto-increment
        kind,
        question,
        answer,
        education_level: level,
        language: language.filter(|l| !l.is_empty()),
        hint: hint.filter(|h| !h.is_empty()).unwrap_or_else(|| DEFAULT_HINT.to_string()),
        is_daily_challenge,
    });

    log::info!(
        "[ADMIN] puzzle added kind:{} level:{} daily:{}",
        kind.label(),
        level.label(),
        is_daily_challenge
    );
    Ok(())
}

/// Admin: Reset a learner's progress (keep identity and preferences, wipe game state)
/// Used for demo resets and support requests
#[reducer]
pub fn admin_reset_learner(ctx: &ReducerContext, learner_id: String) {
    // Authorization check: only authorized workers (admin panel with owner token)
    if ctx.db.authorized_worker().identity().find(&ctx.sender).is_none() {
        panic!("Unauthorized: only admin can reset learners");
    }

    let mut learner = match ctx.db.learner().id().find(&learner_id) {
        Some(l) => l,
        None => {
            log::error!("admin_reset_learner: Learner {} not found", learner_id);
            return;
        }
    };

    let performances: Vec<_> = ctx.db.topic_performance()
        .learner_id().filter(&learner_id)
        .collect();
    let performance_count = performances.len();
    for perf in performances {
        ctx.db.topic_performance().id().delete(&perf.id);
    }

    let assignments: Vec<_> = ctx.db.assignment()
        .learner_id().filter(&learner_id)
        .collect();
    let assignment_count = assignments.len();
    for assignment in assignments {
        ctx.db.assignment().id().delete(&assignment.id);
    }

    let submissions: Vec<_> = ctx.db.submission()
        .learner_id().filter(&learner_id)
        .collect();
    for submission in submissions {
        ctx.db.submission().id().delete(&submission.id);
    }

    learner.score = 0;
    learner.puzzles_solved = 0;
    learner.seen_puzzles.clear();
    learner.badges.clear();
    learner.mastered_topics.clear();
    learner.streak = 0;
    learner.last_streak_at = None;
    learner.last_daily_challenge_at = None;
    learner.last_seen_at = ctx.timestamp;

    let learner_name = learner.name.clone();
    ctx.db.learner().id().update(learner);

    log::info!(
        "[ADMIN] reset learner:{} performances:{} assignments:{}",
        learner_name, performance_count, assignment_count
    );
}

/// Drop graded assignments past the retention window, with their submissions
/// Keeps the public subscription tables bounded; unanswered assignments are
/// never pruned (their puzzle ids stay in seen_puzzles either way)
#[reducer]
pub fn prune_graded_assignments(ctx: &ReducerContext, _schedule: PruneSchedule) {
    let cutoff = ctx.timestamp.to_micros_since_unix_epoch() - ASSIGNMENT_RETENTION_MICROS;

    let stale: Vec<_> = ctx.db.assignment()
        .iter()
        .filter(|a| a.issued_at.to_micros_since_unix_epoch() < cutoff)
        .filter(|a| {
            ctx.db.submission()
                .assignment_id()
                .filter(&a.id)
                .next()
                .is_some()
        })
        .collect();

    if stale.is_empty() {
        return;
    }

    let mut submissions_removed = 0;
    for assignment in &stale {
        let graded: Vec<_> = ctx.db.submission()
            .assignment_id()
            .filter(&assignment.id)
            .collect();
        for submission in graded {
            ctx.db.submission().id().delete(&submission.id);
            submissions_removed += 1;
        }
        ctx.db.assignment().id().delete(&assignment.id);
    }

    log::info!("[PRUNE] assignments:{} submissions:{}", stale.len(), submissions_removed);
}

#[reducer(init)]
pub fn init(ctx: &ReducerContext) {
    // Add module owner to authorized workers for reducer access control
    // In init, ctx.sender is the module owner identity
    if ctx.db.authorized_worker().identity().find(&ctx.sender).is_none() {
        ctx.db.authorized_worker().insert(AuthorizedWorker {
            identity: ctx.sender,
        });
    }

    // Check if scheduler already exists to avoid duplicates on hot-reload
    if ctx.db.prune_schedule().iter().count() == 0 {
        ctx.db.prune_schedule().insert(PruneSchedule {
            id: 0, // auto_inc will handle this
            scheduled_at: ScheduleAt::Interval(std::time::Duration::from_secs(24 * 60 * 60).into()),
        });
    }

    // Seed the starter catalog on first publish only
    if ctx.db.puzzle().iter().count() == 0 {
        let seeded = starter_puzzles::seed_catalog(ctx);
        log::info!("[INIT] starter catalog seeded puzzles:{}", seeded);
    }

    log::info!("Quiz engine module initialized successfully");
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ts(day: i64, hour: i64) -> Timestamp {
        Timestamp::from_micros_since_unix_epoch((day * 24 + hour) * 3_600_000_000)
    }

    fn test_learner() -> Learner {
        Learner {
            id: "learner-1".to_string(),
            name: "Ada".to_string(),
            education_level: EducationLevel::High,
            preferred_language: None,
            score: 0,
            puzzles_solved: 0,
            seen_puzzles: Vec::new(),
            badges: Vec::new(),
            mastered_topics: Vec::new(),
            streak: 0,
            last_streak_at: None,
            last_daily_challenge_at: None,
            created_at: ts(0, 9),
            last_seen_at: ts(0, 9),
        }
    }

    fn test_puzzle(
        id: u64,
        kind: PuzzleKind,
        level: EducationLevel,
        language: Option<&str>,
        daily: bool,
    ) -> Puzzle {
        Puzzle {
            id,
            kind,
            question: format!("question {}", id),
            answer: "42".to_string(),
            education_level: level,
            language: language.map(|l| l.to_string()),
            hint: DEFAULT_HINT.to_string(),
            is_daily_challenge: daily,
        }
    }

    fn test_perf(learner_id: &str, kind: PuzzleKind) -> TopicPerformance {
        TopicPerformance {
            id: 0,
            learner_id: learner_id.to_string(),
            kind,
            correct: 0,
            total: 0,
            last_attempt_at: ts(0, 9),
        }
    }

    #[test]
    fn test_grade_answer() {
        assert!(grade_answer("Paris", "paris"));
        assert!(grade_answer("  3/4 ", "3/4"));
        assert!(grade_answer("LEN", "  len  "));
        assert!(!grade_answer("4", "5"));
        assert!(!grade_answer("const", "let"));
    }

    #[test]
    fn test_quiz_day_rollover() {
        // 7:59 UTC is still the previous quiz-day, 8:01 UTC starts the next
        assert_eq!(quiz_day(ts(10, 7)), quiz_day(ts(9, 9)));
        assert!(quiz_day(ts(10, 9)) > quiz_day(ts(10, 7)));

        assert!(is_new_quiz_day(ts(10, 7), ts(10, 9)));
        assert!(!is_new_quiz_day(ts(10, 9), ts(10, 23)));
        assert!(same_quiz_day(ts(10, 9), ts(10, 23)));
        assert!(!same_quiz_day(ts(10, 7), ts(10, 9)));
    }

    #[test]
    fn test_language_restriction_only_binds_coding() {
        let filter = SelectionFilter {
            daily_only: false,
            education_level: Some(EducationLevel::High),
            restrict_language: true,
        };
        let linear = test_puzzle(1, PuzzleKind::Linear, EducationLevel::High, None, false);
        let python = test_puzzle(2, PuzzleKind::Coding, EducationLevel::High, Some("python"), false);
        let js = test_puzzle(3, PuzzleKind::Coding, EducationLevel::High, Some("javascript"), false);

        // With a preference, only matching coding puzzles pass
        assert!(puzzle_matches(&linear, &filter, Some("python"), &[]));
        assert!(puzzle_matches(&python, &filter, Some("python"), &[]));
        assert!(!puzzle_matches(&js, &filter, Some("python"), &[]));

        // Without a preference everything passes
        assert!(puzzle_matches(&js, &filter, None, &[]));
    }

    #[test]
    fn test_seen_and_daily_filters() {
        let filter = SelectionFilter {
            daily_only: true,
            education_level: Some(EducationLevel::High),
            restrict_language: false,
        };
        let daily = test_puzzle(7, PuzzleKind::Linear, EducationLevel::High, None, true);
        let regular = test_puzzle(8, PuzzleKind::Linear, EducationLevel::High, None, false);

        assert!(puzzle_matches(&daily, &filter, None, &[]));
        assert!(!puzzle_matches(&regular, &filter, None, &[]));
        assert!(!puzzle_matches(&daily, &filter, None, &[7]));
    }

    #[test]
    fn test_cascade_stops_at_first_nonempty_tier() {
        let mut learner = test_learner();
        learner.preferred_language = Some("python".to_string());

        let catalog = vec![
            test_puzzle(1, PuzzleKind::Coding, EducationLevel::High, Some("python"), false),
            test_puzzle(2, PuzzleKind::Coding, EducationLevel::High, Some("javascript"), false),
            test_puzzle(3, PuzzleKind::Linear, EducationLevel::College, None, false),
        ];

        // Strict tier has a match; the looser tiers must not be consulted
        let (tier, candidates) =
            first_matching_tier(&catalog, &regular_filters(learner.education_level), &learner)
                .expect("tier 1 should match");
        assert_eq!(tier, 0);
        assert_eq!(candidates.iter().map(|p| p.id).collect::<Vec<_>>(), vec![1]);

        // Exhaust tier 1: only the mismatched-language coding puzzle remains at the level
        learner.seen_puzzles.push(1);
        let (tier, candidates) =
            first_matching_tier(&catalog, &regular_filters(learner.education_level), &learner)
                .expect("tier 2 should match");
        assert_eq!(tier, 1);
        assert_eq!(candidates.iter().map(|p| p.id).collect::<Vec<_>>(), vec![2]);

        // Exhaust the level entirely: tier 3 drops the education-level filter
        learner.seen_puzzles.push(2);
        let (tier, candidates) =
            first_matching_tier(&catalog, &regular_filters(learner.education_level), &learner)
                .expect("tier 3 should match");
        assert_eq!(tier, 2);
        assert_eq!(candidates.iter().map(|p| p.id).collect::<Vec<_>>(), vec![3]);

        // Everything seen: the cascade is exhausted
        learner.seen_puzzles.push(3);
        assert!(
            first_matching_tier(&catalog, &regular_filters(learner.education_level), &learner)
                .is_none()
        );
    }

    #[test]
    fn test_daily_candidates_are_daily_only() {
        let learner = test_learner();
        let catalog = vec![
            test_puzzle(1, PuzzleKind::Linear, EducationLevel::High, None, false),
            test_puzzle(2, PuzzleKind::Fraction, EducationLevel::High, None, true),
            test_puzzle(3, PuzzleKind::Linear, EducationLevel::High, None, true),
        ];

        // Regular availability must not leak into a daily pick
        let (_, candidates) =
            first_matching_tier(&catalog, &daily_filters(learner.education_level), &learner)
                .expect("daily candidates exist");
        assert!(candidates.iter().all(|p| p.is_daily_challenge));
        assert_eq!(candidates.len(), 2);
    }

    #[test]
    fn test_daily_relaxation_drops_only_language() {
        let mut learner = test_learner();
        learner.preferred_language = Some("python".to_string());

        // The only daily puzzle at the learner's level is the wrong language
        let catalog = vec![
            test_puzzle(1, PuzzleKind::Coding, EducationLevel::High, Some("javascript"), true),
            test_puzzle(2, PuzzleKind::Linear, EducationLevel::College, None, true),
        ];

        let (tier, candidates) =
            first_matching_tier(&catalog, &daily_filters(learner.education_level), &learner)
                .expect("relaxed daily tier should match");
        assert_eq!(tier, 1);
        // The education-level filter never relaxes for a daily pick
        assert_eq!(candidates.iter().map(|p| p.id).collect::<Vec<_>>(), vec![1]);
    }

    #[test]
    fn test_no_repeat_over_selection_sequence() {
        let mut learner = test_learner();
        let catalog = vec![
            test_puzzle(1, PuzzleKind::Linear, EducationLevel::High, None, false),
            test_puzzle(2, PuzzleKind::Fraction, EducationLevel::High, None, false),
            test_puzzle(3, PuzzleKind::Linear, EducationLevel::High, None, false),
        ];

        let mut served = Vec::new();
        for _ in 0..3 {
            let (_, candidates) =
                first_matching_tier(&catalog, &regular_filters(learner.education_level), &learner)
                    .expect("candidates remain");
            let chosen = candidates[0].id;
            assert!(!served.contains(&chosen));
            served.push(chosen);
            learner.seen_puzzles.push(chosen);
        }

        assert_eq!(learner.seen_puzzles.len(), 3);
        assert!(
            first_matching_tier(&catalog, &regular_filters(learner.education_level), &learner)
                .is_none()
        );

        // Reset restores liveness
        learner.seen_puzzles.clear();
        assert!(
            first_matching_tier(&catalog, &regular_filters(learner.education_level), &learner)
                .is_some()
        );
    }

    #[test]
    fn test_correct_answer_scores_and_counts() {
        let mut learner = test_learner();
        let mut perf = test_perf(&learner.id, PuzzleKind::Linear);

        let award =
            apply_submission(&mut learner, &mut perf, PuzzleKind::Linear, true, false, ts(1, 9));
        assert_eq!(award, BASE_SCORE_AWARD);
        assert_eq!(learner.score, 10);
        assert_eq!(learner.puzzles_solved, 1);
        assert_eq!(learner.streak, 1);
        assert_eq!(perf.correct, 1);
        assert_eq!(perf.total, 1);
        assert!(learner.last_daily_challenge_at.is_none());
    }

    #[test]
    fn test_daily_challenge_bonus_and_stamp() {
        let mut learner = test_learner();
        learner.score = 100;
        let mut perf = test_perf(&learner.id, PuzzleKind::Fraction);

        let award =
            apply_submission(&mut learner, &mut perf, PuzzleKind::Fraction, true, true, ts(1, 9));
        assert_eq!(award, BASE_SCORE_AWARD + DAILY_CHALLENGE_BONUS);
        assert_eq!(learner.score, 130);
        assert_eq!(learner.last_daily_challenge_at, Some(ts(1, 9)));

        // A wrong daily answer must not stamp the gate
        let mut learner = test_learner();
        let mut perf = test_perf(&learner.id, PuzzleKind::Fraction);
        apply_submission(&mut learner, &mut perf, PuzzleKind::Fraction, false, true, ts(1, 9));
        assert!(learner.last_daily_challenge_at.is_none());
        assert_eq!(learner.score, 0);
    }

    #[test]
    fn test_streak_semantics() {
        let mut learner = test_learner();
        let mut perf = test_perf(&learner.id, PuzzleKind::Linear);

        // Two correct answers on the same quiz-day increment
        apply_submission(&mut learner, &mut perf, PuzzleKind::Linear, true, false, ts(1, 9));
        apply_submission(&mut learner, &mut perf, PuzzleKind::Linear, true, false, ts(1, 15));
        assert_eq!(learner.streak, 2);

        // A correct answer on a new day restarts at 1, not 3
        apply_submission(&mut learner, &mut perf, PuzzleKind::Linear, true, false, ts(2, 9));
        assert_eq!(learner.streak, 1);

        // A wrong answer resets to 0 regardless of prior value
        apply_submission(&mut learner, &mut perf, PuzzleKind::Linear, true, false, ts(2, 10));
        assert_eq!(learner.streak, 2);
        apply_submission(&mut learner, &mut perf, PuzzleKind::Linear, false, false, ts(2, 11));
        assert_eq!(learner.streak, 0);
        assert_eq!(learner.last_streak_at, Some(ts(2, 11)));

        // Recovery after the reset starts a fresh same-day streak of 1
        apply_submission(&mut learner, &mut perf, PuzzleKind::Linear, true, false, ts(2, 12));
        assert_eq!(learner.streak, 1);
    }

    #[test]
    fn test_streak_master_badge() {
        let mut learner = test_learner();
        let mut perf = test_perf(&learner.id, PuzzleKind::Linear);

        for i in 0..4 {
            apply_submission(&mut learner, &mut perf, PuzzleKind::Linear, true, false, ts(1, 9 + i));
        }
        assert_eq!(learner.streak, 4);
        assert!(!learner.badges.iter().any(|b| b == BADGE_STREAK_MASTER));

        apply_submission(&mut learner, &mut perf, PuzzleKind::Linear, true, false, ts(1, 14));
        assert_eq!(learner.streak, 5);
        assert!(learner.badges.iter().any(|b| b == BADGE_STREAK_MASTER));

        // Crossing the threshold again must not duplicate the badge
        apply_submission(&mut learner, &mut perf, PuzzleKind::Linear, true, false, ts(1, 15));
        let count = learner.badges.iter().filter(|b| *b == BADGE_STREAK_MASTER).count();
        assert_eq!(count, 1);
    }

    #[test]
    fn test_puzzle_novice_badge() {
        let mut learner = test_learner();
        let mut perf = test_perf(&learner.id, PuzzleKind::Linear);

        // Spread over days so the streak badge does not interfere
        for day in 1..=4 {
            apply_submission(&mut learner, &mut perf, PuzzleKind::Linear, true, false, ts(day, 9));
        }
        assert_eq!(learner.puzzles_solved, 4);
        assert!(!learner.badges.iter().any(|b| b == BADGE_PUZZLE_NOVICE));

        apply_submission(&mut learner, &mut perf, PuzzleKind::Linear, true, false, ts(5, 9));
        assert_eq!(learner.puzzles_solved, 5);
        assert!(learner.badges.iter().any(|b| b == BADGE_PUZZLE_NOVICE));

        apply_submission(&mut learner, &mut perf, PuzzleKind::Linear, true, false, ts(6, 9));
        let count = learner.badges.iter().filter(|b| *b == BADGE_PUZZLE_NOVICE).count();
        assert_eq!(count, 1);
    }

    #[test]
    fn test_mastery_exactly_at_threshold() {
        let mut learner = test_learner();
        let mut perf = test_perf(&learner.id, PuzzleKind::Fraction);

        // Wrong answers move total but never mastery
        apply_submission(&mut learner, &mut perf, PuzzleKind::Fraction, false, false, ts(1, 9));
        apply_submission(&mut learner, &mut perf, PuzzleKind::Fraction, true, false, ts(1, 10));
        apply_submission(&mut learner, &mut perf, PuzzleKind::Fraction, true, false, ts(1, 11));
        assert_eq!(perf.correct, 2);
        assert!(!learner.mastered_topics.contains(&PuzzleKind::Fraction));

        // The 2→3 transition is the mastery moment
        apply_submission(&mut learner, &mut perf, PuzzleKind::Fraction, true, false, ts(1, 12));
        assert_eq!(perf.correct, 3);
        assert!(learner.mastered_topics.contains(&PuzzleKind::Fraction));

        // Further correct answers do not duplicate the topic
        apply_submission(&mut learner, &mut perf, PuzzleKind::Fraction, true, false, ts(1, 13));
        let count = learner
            .mastered_topics
            .iter()
            .filter(|k| **k == PuzzleKind::Fraction)
            .count();
        assert_eq!(count, 1);

        assert!(perf.correct <= perf.total);
    }

    #[test]
    fn test_wrong_answer_counts_attempt_only() {
        let mut learner = test_learner();
        let mut perf = test_perf(&learner.id, PuzzleKind::Coding);

        apply_submission(&mut learner, &mut perf, PuzzleKind::Coding, false, false, ts(1, 9));
        assert_eq!(perf.correct, 0);
        assert_eq!(perf.total, 1);
        assert_eq!(learner.score, 0);
        assert_eq!(learner.puzzles_solved, 0);
    }

    #[test]
    fn test_score_never_decreases() {
        let mut learner = test_learner();
        let mut perf = test_perf(&learner.id, PuzzleKind::Linear);
        let mut last_score = 0;
        let mut last_solved = 0;

        let outcomes = [true, false, true, true, false, true];
        for (i, correct) in outcomes.iter().enumerate() {
            apply_submission(
                &mut learner,
                &mut perf,
                PuzzleKind::Linear,
                *correct,
                false,
                ts(1, 9 + i as i64),
            );
            assert!(learner.score >= last_score);
            assert!(learner.puzzles_solved >= last_solved);
            last_score = learner.score;
            last_solved = learner.puzzles_solved;
        }
    }

    #[test]
    fn test_grant_badge_idempotent() {
        let mut learner = test_learner();
        assert!(grant_badge(&mut learner, BADGE_STREAK_MASTER));
        assert!(!grant_badge(&mut learner, BADGE_STREAK_MASTER));
        assert_eq!(learner.badges, vec![BADGE_STREAK_MASTER.to_string()]);
    }

    #[test]
    fn test_kind_and_level_parsing() {
        assert_eq!(PuzzleKind::parse("coding"), Some(PuzzleKind::Coding));
        assert_eq!(PuzzleKind::parse("Linear"), Some(PuzzleKind::Linear));
        assert_eq!(PuzzleKind::parse("riddle"), None);
        assert_eq!(EducationLevel::parse("ENGINEERING"), Some(EducationLevel::Engineering));
        assert_eq!(EducationLevel::parse("middle"), None);

        for kind in [PuzzleKind::Linear, PuzzleKind::Fraction, PuzzleKind::Coding] {
            assert_eq!(PuzzleKind::parse(kind.label()), Some(kind));
        }
        for level in [
            EducationLevel::Primary,
            EducationLevel::High,
            EducationLevel::College,
            EducationLevel::Engineering,
        ] {
            assert_eq!(EducationLevel::parse(level.label()), Some(level));
        }
    }
}
