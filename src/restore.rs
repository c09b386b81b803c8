// Bulk import/restore reducers for catalog seeding and disaster recovery
// Accept JSON arrays exported from the admin panel (TypeScript SDK format)

use spacetimedb::{reducer, ReducerContext, Timestamp, log, Table};
use crate::{EducationLevel, Learner, Puzzle, PuzzleKind, TopicPerformance, DEFAULT_HINT};
use crate::{authorized_worker, learner, puzzle, topic_performance};
use serde_json::Value;

/// Parse Timestamp from SDK JSON format: {"__timestamp_micros_since_unix_epoch__": "123456"}
fn parse_timestamp_json(val: &Value) -> Result<Timestamp, String> {
    let micros_str = val.get("__timestamp_micros_since_unix_epoch__")
        .and_then(|v| v.as_str())
        .ok_or("Missing or invalid timestamp field")?;

    let micros: i64 = micros_str.parse()
        .map_err(|e| format!("Invalid timestamp micros: {}", e))?;

    Ok(Timestamp::from_micros_since_unix_epoch(micros))
}

/// Parse an optional SDK timestamp (absent or null means None)
fn parse_optional_timestamp(val: Option<&Value>) -> Option<Timestamp> {
    val.filter(|v| !v.is_null())
        .and_then(|v| parse_timestamp_json(v).ok())
}

fn parse_kind(val: Option<&Value>, context: &str) -> Result<PuzzleKind, String> {
    let raw = val.and_then(|v| v.as_str())
        .ok_or(format!("{}: missing kind", context))?;
    PuzzleKind::parse(raw).ok_or(format!("{}: unknown kind {}", context, raw))
}

fn parse_level(val: Option<&Value>, context: &str) -> Result<EducationLevel, String> {
    let raw = val.and_then(|v| v.as_str())
        .ok_or(format!("{}: missing educationLevel", context))?;
    EducationLevel::parse(raw).ok_or(format!("{}: unknown educationLevel {}", context, raw))
}

/// Bulk import puzzles from a JSON array
/// Protected by authorization check - only authorized workers can call this
#[reducer]
pub fn bulk_import_puzzles(ctx: &ReducerContext, json_data: String) -> Result<(), String> {
    // Authorization check: only authorized workers can import catalog data
    if ctx.db.authorized_worker().identity().find(&ctx.sender).is_none() {
        log::warn!("Unauthorized bulk_import_puzzles attempt by {}", ctx.sender);
        return Err("Unauthorized".to_string());
    }

    let data: Value = serde_json::from_str(&json_data)
        .map_err(|e| format!("Invalid JSON: {}", e))?;

    let puzzles = data.as_array()
        .ok_or("Expected JSON array of puzzles")?;

    let mut count = 0;
    for (i, p) in puzzles.iter().enumerate() {
        let context = format!("Puzzle {}", i);
        let question = p.get("question").and_then(|v| v.as_str())
            .ok_or(format!("{}: missing question", context))?;
        let answer = p.get("answer").and_then(|v| v.as_str())
            .ok_or(format!("{}: missing answer", context))?;

        let record = Puzzle {
            id: 0, // auto_inc
            kind: parse_kind(p.get("kind"), &context)?,
            question: question.to_string(),
            answer: answer.to_string(),
            education_level: parse_level(p.get("educationLevel"), &context)?,
            language: p.get("language").and_then(|v| v.as_str())
                .filter(|l| !l.is_empty())
                .map(|l| l.to_string()),
            hint: p.get("hint").and_then(|v| v.as_str())
                .filter(|h| !h.is_empty())
                .unwrap_or(DEFAULT_HINT)
                .to_string(),
            is_daily_challenge: p.get("isDailyChallenge").and_then(|v| v.as_bool()).unwrap_or(false),
        };

        ctx.db.puzzle().insert(record);
        count += 1;
    }

    log::info!("✅ Imported {} puzzle records", count);
    Ok(())
}

/// Bulk restore learner table from a JSON array
/// Protected by authorization check - only authorized workers can call this
#[reducer]
pub fn bulk_restore_learner(ctx: &ReducerContext, json_data: String) -> Result<(), String> {
    // Authorization check: only authorized workers can restore data
    if ctx.db.authorized_worker().identity().find(&ctx.sender).is_none() {
        log::warn!("Unauthorized bulk_restore_learner attempt by {}", ctx.sender);
        return Err("Unauthorized".to_string());
    }

    let data: Value = serde_json::from_str(&json_data)
        .map_err(|e| format!("Invalid JSON: {}", e))?;

    let learners = data.as_array()
        .ok_or("Expected JSON array of learners")?;

    let mut count = 0;
    for (i, l) in learners.iter().enumerate() {
        let context = format!("Learner {}", i);

        let seen_puzzles: Vec<u64> = l.get("seenPuzzles")
            .and_then(|v| v.as_array())
            .map(|arr| arr.iter().filter_map(|v| v.as_u64()).collect())
            .unwrap_or_default();

        let badges: Vec<String> = l.get("badges")
            .and_then(|v| v.as_array())
            .map(|arr| {
                arr.iter()
                    .filter_map(|v| v.as_str())
                    .map(|s| s.to_string())
                    .collect()
            })
            .unwrap_or_default();

        let mastered_topics: Vec<PuzzleKind> = l.get("masteredTopics")
            .and_then(|v| v.as_array())
            .map(|arr| {
                arr.iter()
                    .filter_map(|v| v.as_str())
                    .filter_map(PuzzleKind::parse)
                    .collect()
            })
            .unwrap_or_default();

        let record = Learner {
            id: l.get("id").and_then(|v| v.as_str())
                .ok_or(format!("{}: missing id", context))?
                .to_string(),
            name: l.get("name").and_then(|v| v.as_str())
                .ok_or(format!("{}: missing name", context))?
                .to_string(),
            education_level: parse_level(l.get("educationLevel"), &context)?,
            preferred_language: l.get("preferredCodingLanguage").and_then(|v| v.as_str())
                .filter(|s| !s.is_empty())
                .map(|s| s.to_string()),
            score: l.get("score").and_then(|v| v.as_u64()).unwrap_or(0) as u32,
            puzzles_solved: l.get("puzzlesSolved").and_then(|v| v.as_u64()).unwrap_or(0) as u32,
            seen_puzzles,
            badges,
            mastered_topics,
            streak: l.get("streak").and_then(|v| v.as_u64()).unwrap_or(0) as u32,
            last_streak_at: parse_optional_timestamp(l.get("lastStreakDate")),
            last_daily_challenge_at: parse_optional_timestamp(l.get("lastDailyChallengeDate")),
            // Default to now for old backups without the field
            created_at: parse_optional_timestamp(l.get("createdAt")).unwrap_or(ctx.timestamp),
            last_seen_at: parse_optional_timestamp(l.get("lastSeenAt")).unwrap_or(ctx.timestamp),
        };

        ctx.db.learner().insert(record);
        count += 1;
    }

    log::info!("✅ Restored {} learner records", count);
    Ok(())
}

/// Bulk restore topic_performance table from a JSON array
/// Protected by authorization check - only authorized workers can call this
#[reducer]
pub fn bulk_restore_topic_performance(ctx: &ReducerContext, json_data: String) -> Result<(), String> {
    // Authorization check: only authorized workers can restore data
    if ctx.db.authorized_worker().identity().find(&ctx.sender).is_none() {
        log::warn!("Unauthorized bulk_restore_topic_performance attempt by {}", ctx.sender);
        return Err("Unauthorized".to_string());
    }

    let data: Value = serde_json::from_str(&json_data)
        .map_err(|e| format!("Invalid JSON: {}", e))?;

    let rows = data.as_array()
        .ok_or("Expected JSON array of topic_performance records")?;

    let mut count = 0;
    for (i, r) in rows.iter().enumerate() {
        let context = format!("Performance {}", i);

        let record = TopicPerformance {
            id: 0, // auto_inc
            learner_id: r.get("learnerId").and_then(|v| v.as_str())
                .ok_or(format!("{}: missing learnerId", context))?
                .to_string(),
            kind: parse_kind(r.get("kind"), &context)?,
            correct: r.get("correct").and_then(|v| v.as_u64())
                .ok_or(format!("{}: missing correct", context))? as u32,
            total: r.get("total").and_then(|v| v.as_u64())
                .ok_or(format!("{}: missing total", context))? as u32,
            last_attempt_at: parse_optional_timestamp(r.get("lastAttemptAt"))
                .unwrap_or(ctx.timestamp),
        };

        ctx.db.topic_performance().insert(record);
        count += 1;
    }

    log::info!("✅ Restored {} topic_performance records", count);
    Ok(())
}
