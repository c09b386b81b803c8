// Starter catalog loaded on first publish
// Authored once here; live catalogs grow through add_puzzle / bulk_import_puzzles

use spacetimedb::{ReducerContext, Table};

use crate::puzzle;
use crate::{EducationLevel, Puzzle, PuzzleKind, DEFAULT_HINT};

struct Seed {
    kind: PuzzleKind,
    question: &'static str,
    answer: &'static str,
    level: EducationLevel,
    language: Option<&'static str>,
    hint: Option<&'static str>,
    daily: bool,
}

const STARTER_PUZZLES: &[Seed] = &[
    // -------------------- Primary --------------------
    Seed {
        kind: PuzzleKind::Linear,
        question: "What is x if x + 3 = 7?",
        answer: "4",
        level: EducationLevel::Primary,
        language: None,
        hint: Some("Take 3 away from both sides."),
        daily: false,
    },
    Seed {
        kind: PuzzleKind::Linear,
        question: "What is x if 2x = 10?",
        answer: "5",
        level: EducationLevel::Primary,
        language: None,
        hint: None,
        daily: false,
    },
    Seed {
        kind: PuzzleKind::Fraction,
        question: "What is 1/2 + 1/4?",
        answer: "3/4",
        level: EducationLevel::Primary,
        language: None,
        hint: Some("Use a common denominator of 4."),
        daily: false,
    },
    Seed {
        kind: PuzzleKind::Fraction,
        question: "What is 1/3 of 9?",
        answer: "3",
        level: EducationLevel::Primary,
        language: None,
        hint: None,
        daily: true,
    },
    // -------------------- High school --------------------
    Seed {
        kind: PuzzleKind::Linear,
        question: "Solve for x: 3x - 4 = 11",
        answer: "5",
        level: EducationLevel::High,
        language: None,
        hint: Some("Add 4 to both sides first."),
        daily: false,
    },
    Seed {
        kind: PuzzleKind::Linear,
        question: "Solve for x: 5x + 2 = 3x + 10",
        answer: "4",
        level: EducationLevel::High,
        language: None,
        hint: None,
        daily: false,
    },
    Seed {
        kind: PuzzleKind::Fraction,
        question: "Simplify 6/8 to lowest terms",
        answer: "3/4",
        level: EducationLevel::High,
        language: None,
        hint: None,
        daily: false,
    },
    Seed {
        kind: PuzzleKind::Coding,
        question: "In Python, which built-in function returns the number of items in a list?",
        answer: "len",
        level: EducationLevel::High,
        language: Some("python"),
        hint: Some("It works on strings and dictionaries too."),
        daily: false,
    },
    Seed {
        kind: PuzzleKind::Coding,
        question: "In JavaScript, which keyword declares a block-scoped variable that cannot be reassigned?",
        answer: "const",
        level: EducationLevel::High,
        language: Some("javascript"),
        hint: None,
        daily: false,
    },
    Seed {
        kind: PuzzleKind::Linear,
        question: "Solve for x: 2(x - 3) = 8",
        answer: "7",
        level: EducationLevel::High,
        language: None,
        hint: Some("Divide both sides by 2 before expanding."),
        daily: true,
    },
    Seed {
        kind: PuzzleKind::Coding,
        question: "In Python, which keyword defines a function?",
        answer: "def",
        level: EducationLevel::High,
        language: Some("python"),
        hint: None,
        daily: true,
    },
    // -------------------- College --------------------
    Seed {
        kind: PuzzleKind::Linear,
        question: "What is the slope of the line y = 4x - 7?",
        answer: "4",
        level: EducationLevel::College,
        language: None,
        hint: None,
        daily: false,
    },
    Seed {
        kind: PuzzleKind::Fraction,
        question: "What is 2/3 ÷ 1/6?",
        answer: "4",
        level: EducationLevel::College,
        language: None,
        hint: Some("Dividing by a fraction is multiplying by its reciprocal."),
        daily: false,
    },
    Seed {
        kind: PuzzleKind::Coding,
        question: "In Python, what does the expression 7 // 2 evaluate to?",
        answer: "3",
        level: EducationLevel::College,
        language: Some("python"),
        hint: None,
        daily: false,
    },
    Seed {
        kind: PuzzleKind::Coding,
        question: "In JavaScript, which array method creates a new array with the elements that pass a test?",
        answer: "filter",
        level: EducationLevel::College,
        language: Some("javascript"),
        hint: None,
        daily: false,
    },
    Seed {
        kind: PuzzleKind::Fraction,
        question: "What is 3/5 × 10/9 in lowest terms?",
        answer: "2/3",
        level: EducationLevel::College,
        language: None,
        hint: Some("Cancel common factors before multiplying."),
        daily: true,
    },
    // -------------------- Engineering --------------------
    Seed {
        kind: PuzzleKind::Linear,
        question: "Solve for x: 4x - 2(x + 5) = 8",
        answer: "9",
        level: EducationLevel::Engineering,
        language: None,
        hint: None,
        daily: false,
    },
    Seed {
        kind: PuzzleKind::Fraction,
        question: "Express 0.125 as a fraction in lowest terms",
        answer: "1/8",
        level: EducationLevel::Engineering,
        language: None,
        hint: None,
        daily: false,
    },
    Seed {
        kind: PuzzleKind::Coding,
        question: "In JavaScript, what does typeof null evaluate to?",
        answer: "object",
        level: EducationLevel::Engineering,
        language: Some("javascript"),
        hint: Some("A long-standing quirk of the language."),
        daily: false,
    },
    Seed {
        kind: PuzzleKind::Linear,
        question: "Solve for x: (x / 3) + 4 = 6",
        answer: "6",
        level: EducationLevel::Engineering,
        language: None,
        hint: None,
        daily: true,
    },
];

/// Insert the starter catalog. Returns the number of puzzles written.
pub fn seed_catalog(ctx: &ReducerContext) -> usize {
    for seed in STARTER_PUZZLES {
        ctx.db.puzzle().insert(Puzzle {
            id: 0, // auto-increment
            kind: seed.kind,
            question: seed.question.to_string(),
            answer: seed.answer.to_string(),
            education_level: seed.level,
            language: seed.language.map(|l| l.to_string()),
            hint: seed.hint.unwrap_or(DEFAULT_HINT).to_string(),
            is_daily_challenge: seed.daily,
        });
    }
    STARTER_PUZZLES.len()
}
