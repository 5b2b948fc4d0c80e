//! Fixed phrase tables used by the quality scorers.
//!
//! Every entry is lower-case and matched by substring containment against the
//! lower-cased message text, so "resolved" also hits "unresolved".

/// Immutable phrase tables bundled with an analyzer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Lexicon {
    /// Hedging language that makes an assistant answer read as unclear
    pub unclear: &'static [&'static str],
    /// Uncertainty admissions that cost accuracy
    pub uncertain: &'static [&'static str],
    /// Positive user sentiment markers
    pub positive: &'static [&'static str],
    /// Negative user sentiment markers
    pub negative: &'static [&'static str],
    /// Empathetic assistant phrasing
    pub empathetic: &'static [&'static str],
    /// Assistant admissions of inability to help
    pub fallback: &'static [&'static str],
    /// Explicit user requests for a human
    pub escalation_request: &'static [&'static str],
    /// Phrases in the final user message that signal a settled issue
    pub resolution: &'static [&'static str],
}

pub const UNCLEAR_PHRASES: &[&str] = &["maybe", "might", "possibly", "not sure", "i think"];

pub const UNCERTAIN_PHRASES: &[&str] = &[
    "i am not sure",
    "i cannot verify",
    "i might be wrong",
    "i don't have that information",
    "i cannot confirm",
];

pub const POSITIVE_WORDS: &[&str] = &[
    "thanks",
    "thank you",
    "great",
    "awesome",
    "perfect",
    "excellent",
    "good",
    "helpful",
    "appreciate",
    "love",
    "happy",
    "resolved",
];

pub const NEGATIVE_WORDS: &[&str] = &[
    "bad",
    "terrible",
    "worst",
    "angry",
    "frustrated",
    "sad",
    "disappointed",
    "useless",
    "horrible",
    "awful",
    "hate",
    "poor",
    "unacceptable",
];

pub const EMPATHY_PHRASES: &[&str] = &[
    "i understand",
    "i apologize",
    "i'm sorry",
    "i appreciate your patience",
    "i can imagine",
    "that must be frustrating",
    "i hear you",
    "let me help",
];

pub const FALLBACK_PHRASES: &[&str] = &[
    "i don't know",
    "i am unable to",
    "i cannot help",
    "i don't understand",
    "not sure",
    "cannot assist",
    "beyond my capability",
];

pub const ESCALATION_PHRASES: &[&str] = &[
    "speak to human",
    "talk to agent",
    "real person",
    "manager",
    "supervisor",
];

pub const RESOLUTION_INDICATORS: &[&str] = &[
    "thanks",
    "thank you",
    "resolved",
    "solved",
    "fixed",
    "worked",
    "perfect",
    "got it",
    "understood",
    "clear now",
];

pub const DEFAULT_LEXICON: Lexicon = Lexicon {
    unclear: UNCLEAR_PHRASES,
    uncertain: UNCERTAIN_PHRASES,
    positive: POSITIVE_WORDS,
    negative: NEGATIVE_WORDS,
    empathetic: EMPATHY_PHRASES,
    fallback: FALLBACK_PHRASES,
    escalation_request: ESCALATION_PHRASES,
    resolution: RESOLUTION_INDICATORS,
};

impl Default for Lexicon {
    fn default() -> Self {
        DEFAULT_LEXICON
    }
}

/// True when `text` (already lower-cased) contains any phrase of the table
pub fn contains_any(text: &str, phrases: &[&str]) -> bool {
    phrases.iter().any(|phrase| text.contains(phrase))
}

/// Number of distinct table entries contained in `text` (already lower-cased).
/// An entry counts once per text no matter how often it repeats.
pub fn count_matches(text: &str, phrases: &[&str]) -> usize {
    phrases.iter().filter(|phrase| text.contains(*phrase)).count()
}
