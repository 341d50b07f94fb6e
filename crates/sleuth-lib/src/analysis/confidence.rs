//! Heuristic confidence for free-text AI answers

const BASE_CONFIDENCE: i32 = 60;
const MIN_CONFIDENCE: i32 = 10;
const MAX_CONFIDENCE: i32 = 100;

const UNCERTAIN_PHRASES: &[&str] = &[
    "might",
    "maybe",
    "possibly",
    "perhaps",
    "unclear",
    "not sure",
    "could be",
    "may be",
    "unsure",
    "uncertain",
    "difficult to determine",
    "hard to say",
];

const CERTAIN_PHRASES: &[&str] = &[
    "error:",
    "failed:",
    "exception:",
    "timeout:",
    "connection refused",
    "out of memory",
    "disk full",
    "permission denied",
    "not found",
    "crashed",
    "terminated",
    "killed",
    "panic:",
    "fatal:",
];

const STRUCTURE_MARKERS: &[&str] = &["\n-", "\n*", "\n1.", "\n2.", "line ", "at line", "error at"];

const NON_ANSWER_PHRASES: &[&str] = &[
    "i cannot",
    "i can't",
    "i don't have",
    "no information",
    "please provide",
    "need more",
    "insufficient",
];

/// Score an AI answer in `[10, 100]`
pub fn score_ai_response(answer: &str) -> u8 {
    let lower = answer.to_lowercase();
    let mut confidence = BASE_CONFIDENCE;

    confidence += match answer.chars().count() {
        n if n > 200 => 20,
        n if n > 100 => 15,
        n if n > 50 => 10,
        n if n < 20 => -20,
        _ => 0,
    };

    if UNCERTAIN_PHRASES.iter().any(|p| lower.contains(p)) {
        confidence -= 15;
    }

    let certain = CERTAIN_PHRASES.iter().filter(|p| lower.contains(*p)).count() as i32;
    if certain > 0 {
        confidence = (confidence + certain * 5).min(MAX_CONFIDENCE);
    }

    if STRUCTURE_MARKERS.iter().any(|m| lower.contains(m)) {
        confidence += 8;
    }

    if NON_ANSWER_PHRASES.iter().any(|p| lower.contains(p)) {
        confidence -= 25;
    }

    confidence.clamp(MIN_CONFIDENCE, MAX_CONFIDENCE) as u8
}
