//! Conversation Quality Signals - Lexical scoring of support conversations
//!
//! Turns an ordered list of user/assistant turns into an [`AnalysisReport`]:
//! four bounded quality scores, a user sentiment label, an empathy score,
//! the mean assistant response latency, resolution/escalation flags, a
//! fallback count and a weighted overall score. Every scorer is a pure
//! function of the turn streams; no scorer observes another's output except
//! where a signal is defined in terms of one (empathy, escalation).

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use super::lexicon::{contains_any, count_matches, Lexicon};

// ============================================================================
// Constants
// ============================================================================

/// Ceiling every quality score starts from
pub const MAX_SCORE: f64 = 5.0;
/// Floor of every quality score
pub const MIN_SCORE: f64 = 1.0;
/// Ceiling of the empathy score (its floor is 0.0)
pub const MAX_EMPATHY: f64 = 5.0;

const TERSE_WORD_LIMIT: usize = 5;
const TERSE_PENALTY: f64 = 0.5;
const WALL_OF_TEXT_WORD_LIMIT: usize = 100;
const WALL_OF_TEXT_PENALTY: f64 = 0.3;
const UNCLEAR_PENALTY: f64 = 0.2;

const MIN_COMMON_KEYWORDS: usize = 2;
const OFF_TOPIC_PENALTY: f64 = 0.5;

const UNCERTAINTY_PENALTY: f64 = 0.5;

const SHALLOW_ANSWER_WORD_LIMIT: usize = 10;
const SHALLOW_ANSWER_PENALTY: f64 = 0.4;
const COUNTER_QUESTION_PENALTY: f64 = 0.3;

const EMPATHY_POINTS_PER_PHRASE: f64 = 1.5;

/// More fallbacks than this triggers escalation
const FALLBACK_ESCALATION_THRESHOLD: usize = 2;

static WORD_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\w+").expect("word pattern is a valid regex"));

// ============================================================================
// Conversation Input
// ============================================================================

/// Which side of the conversation produced a turn
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Sender {
    User,
    #[serde(alias = "ai")]
    Assistant,
}

impl Sender {
    pub fn as_str(&self) -> &'static str {
        match self {
            Sender::User => "user",
            Sender::Assistant => "assistant",
        }
    }
}

impl fmt::Display for Sender {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Sender {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "user" => Ok(Sender::User),
            "assistant" | "ai" => Ok(Sender::Assistant),
            other => Err(format!("unknown sender '{}'", other)),
        }
    }
}

/// One message of a conversation
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Turn {
    pub sender: Sender,
    pub text: String,
    pub timestamp: DateTime<Utc>,
}

impl Turn {
    pub fn new(sender: Sender, text: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self {
            sender,
            text: text.into(),
            timestamp,
        }
    }

    fn lowercase_text(&self) -> String {
        self.text.to_lowercase()
    }
}

/// Ordered turns of a single conversation.
///
/// The order is taken as given: input providers deliver turns sorted by
/// timestamp with ties in insertion order, and nothing here re-sorts them.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConversationInput {
    turns: Vec<Turn>,
}

impl ConversationInput {
    pub fn new(turns: Vec<Turn>) -> Self {
        Self { turns }
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    /// Split into (user, assistant) streams, each preserving relative order
    pub fn classify(&self) -> (Vec<&Turn>, Vec<&Turn>) {
        self.turns
            .iter()
            .partition(|turn| turn.sender == Sender::User)
    }
}

impl From<Vec<Turn>> for ConversationInput {
    fn from(turns: Vec<Turn>) -> Self {
        Self::new(turns)
    }
}

// ============================================================================
// Report Types
// ============================================================================

/// Overall tone of the user side of a conversation
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Sentiment {
    Positive,
    Neutral,
    Negative,
}

impl Sentiment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Sentiment::Positive => "positive",
            Sentiment::Neutral => "neutral",
            Sentiment::Negative => "negative",
        }
    }
}

impl fmt::Display for Sentiment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Sentiment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "positive" => Ok(Sentiment::Positive),
            "neutral" => Ok(Sentiment::Neutral),
            "negative" => Ok(Sentiment::Negative),
            other => Err(format!("unknown sentiment '{}'", other)),
        }
    }
}

/// Quality report for one conversation. Serialized field names follow the
/// public report API.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AnalysisReport {
    /// Structure and plainness of assistant answers (1.0-5.0)
    #[serde(rename = "clarity_score")]
    pub clarity: f64,
    /// Lexical overlap of assistant answers with user vocabulary (1.0-5.0)
    #[serde(rename = "relevance_score")]
    pub relevance: f64,
    /// Absence of uncertainty admissions (1.0-5.0)
    #[serde(rename = "accuracy_score")]
    pub accuracy: f64,
    /// Answer depth (1.0-5.0)
    #[serde(rename = "completeness_score")]
    pub completeness: f64,
    pub sentiment: Sentiment,
    /// Empathetic phrasing, only assessed for negative conversations (0.0-5.0)
    #[serde(rename = "empathy_score")]
    pub empathy: f64,
    #[serde(rename = "response_time_avg")]
    pub avg_response_time_seconds: f64,
    #[serde(rename = "resolution_rate")]
    pub resolved: bool,
    #[serde(rename = "escalation_need")]
    pub escalation_needed: bool,
    #[serde(rename = "fallback_frequency")]
    pub fallback_count: usize,
    /// Weighted sum of the four quality scores, rounded to 2 decimals
    #[serde(rename = "overall_score")]
    pub overall: f64,
}

// ============================================================================
// Aggregation
// ============================================================================

/// Weights of the quality scores in the overall score. Empathy is tracked
/// separately and carries no weight.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoreWeights {
    pub clarity: f64,
    pub relevance: f64,
    pub accuracy: f64,
    pub completeness: f64,
}

pub const SCORE_WEIGHTS: ScoreWeights = ScoreWeights {
    clarity: 0.25,
    relevance: 0.25,
    accuracy: 0.30,
    completeness: 0.20,
};

impl ScoreWeights {
    pub fn total(&self) -> f64 {
        self.clarity + self.relevance + self.accuracy + self.completeness
    }
}

/// Weighted overall score rounded to 2 decimals
pub fn overall_score(clarity: f64, relevance: f64, accuracy: f64, completeness: f64) -> f64 {
    debug_assert!((SCORE_WEIGHTS.total() - 1.0).abs() < 1e-9);

    let overall = clarity * SCORE_WEIGHTS.clarity
        + relevance * SCORE_WEIGHTS.relevance
        + accuracy * SCORE_WEIGHTS.accuracy
        + completeness * SCORE_WEIGHTS.completeness;

    round_to_hundredths(overall)
}

fn round_to_hundredths(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

fn clamp_score(score: f64) -> f64 {
    score.clamp(MIN_SCORE, MAX_SCORE)
}

fn word_count(text: &str) -> usize {
    text.split_whitespace().count()
}

fn keywords(text: &str) -> HashSet<String> {
    WORD_PATTERN
        .find_iter(&text.to_lowercase())
        .map(|m| m.as_str().to_string())
        .collect()
}

// ============================================================================
// Analyzer
// ============================================================================

/// Trait for producing a quality report from a conversation
pub trait ConversationAnalyzer: Send + Sync {
    /// Returns `None` when either side of the conversation has no turns
    fn analyze(&self, conversation: &ConversationInput) -> Option<AnalysisReport>;
}

/// Phrase-table and word-overlap heuristics over the raw message text
#[derive(Debug, Clone, Default)]
pub struct LexicalQualityAnalyzer {
    lexicon: Lexicon,
}

impl LexicalQualityAnalyzer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_lexicon(lexicon: Lexicon) -> Self {
        Self { lexicon }
    }

    pub fn lexicon(&self) -> &Lexicon {
        &self.lexicon
    }

    // ========================================================================
    // Quality Scorers
    // ========================================================================

    /// Penalizes terse answers, unpunctuated walls of text and hedging
    pub fn score_clarity(&self, assistant_turns: &[&Turn]) -> f64 {
        let mut score = MAX_SCORE;

        for turn in assistant_turns {
            let text = turn.text.trim();
            let words = word_count(text);

            if words < TERSE_WORD_LIMIT {
                score -= TERSE_PENALTY;
            }

            // A period as the very last character does not count as structure
            if words > WALL_OF_TEXT_WORD_LIMIT && !without_last_char(text).contains('.') {
                score -= WALL_OF_TEXT_PENALTY;
            }

            if contains_any(&text.to_lowercase(), self.lexicon.unclear) {
                score -= UNCLEAR_PENALTY;
            }
        }

        clamp_score(score)
    }

    /// Penalizes assistant turns sharing fewer than two words with the user side
    pub fn score_relevance(&self, user_turns: &[&Turn], assistant_turns: &[&Turn]) -> f64 {
        let mut score = MAX_SCORE;

        let user_keywords: HashSet<String> = user_turns
            .iter()
            .flat_map(|turn| keywords(&turn.text))
            .collect();

        for turn in assistant_turns {
            let common = keywords(&turn.text)
                .intersection(&user_keywords)
                .count();
            if common < MIN_COMMON_KEYWORDS {
                score -= OFF_TOPIC_PENALTY;
            }
        }

        clamp_score(score)
    }

    /// Penalizes assistant turns admitting uncertainty
    pub fn score_accuracy(&self, assistant_turns: &[&Turn]) -> f64 {
        let mut score = MAX_SCORE;

        for turn in assistant_turns {
            if contains_any(&turn.lowercase_text(), self.lexicon.uncertain) {
                score -= UNCERTAINTY_PENALTY;
            }
        }

        clamp_score(score)
    }

    /// Penalizes shallow answers and answers that ask back
    pub fn score_completeness(&self, assistant_turns: &[&Turn]) -> f64 {
        let mut score = MAX_SCORE;

        for turn in assistant_turns {
            if word_count(&turn.text) < SHALLOW_ANSWER_WORD_LIMIT {
                score -= SHALLOW_ANSWER_PENALTY;
            }
            if turn.text.contains('?') {
                score -= COUNTER_QUESTION_PENALTY;
            }
        }

        clamp_score(score)
    }

    // ========================================================================
    // Interaction Analyzers
    // ========================================================================

    pub fn detect_sentiment(&self, user_turns: &[&Turn]) -> Sentiment {
        let mut positive = 0;
        let mut negative = 0;

        for turn in user_turns {
            let text = turn.lowercase_text();
            positive += count_matches(&text, self.lexicon.positive);
            negative += count_matches(&text, self.lexicon.negative);
        }

        if positive > negative && positive > 0 {
            Sentiment::Positive
        } else if negative > positive && negative > 0 {
            Sentiment::Negative
        } else {
            Sentiment::Neutral
        }
    }

    /// Empathetic phrasing in assistant turns, 0.0 unless the user side is negative
    pub fn score_empathy(&self, assistant_turns: &[&Turn], sentiment: Sentiment) -> f64 {
        if sentiment != Sentiment::Negative {
            return 0.0;
        }

        let score: f64 = assistant_turns
            .iter()
            .map(|turn| {
                let phrases = count_matches(&turn.lowercase_text(), self.lexicon.empathetic);
                (phrases as f64 * EMPATHY_POINTS_PER_PHRASE).min(MAX_EMPATHY)
            })
            .sum();

        score.min(MAX_EMPATHY)
    }

    /// Mean seconds between a user turn and an immediately following assistant
    /// turn, over the full turn sequence. Out-of-order timestamps yield negative
    /// deltas, which are averaged in unchanged.
    pub fn average_response_time(&self, turns: &[Turn]) -> f64 {
        let deltas: Vec<f64> = turns
            .windows(2)
            .filter(|pair| pair[0].sender == Sender::User && pair[1].sender == Sender::Assistant)
            .map(|pair| seconds_between(pair[0].timestamp, pair[1].timestamp))
            .collect();

        if deltas.is_empty() {
            return 0.0;
        }

        deltas.iter().sum::<f64>() / deltas.len() as f64
    }

    // ========================================================================
    // Decision Analyzers
    // ========================================================================

    /// Whether the last user turn reads as a settled issue
    pub fn detect_resolution(&self, user_turns: &[&Turn]) -> bool {
        user_turns
            .last()
            .map(|turn| contains_any(&turn.lowercase_text(), self.lexicon.resolution))
            .unwrap_or(false)
    }

    /// Number of assistant turns containing at least one fallback phrase
    pub fn count_fallbacks(&self, assistant_turns: &[&Turn]) -> usize {
        assistant_turns
            .iter()
            .filter(|turn| contains_any(&turn.lowercase_text(), self.lexicon.fallback))
            .count()
    }

    pub fn needs_escalation(
        &self,
        user_turns: &[&Turn],
        sentiment: Sentiment,
        resolved: bool,
        fallback_count: usize,
    ) -> bool {
        if sentiment == Sentiment::Negative && !resolved {
            return true;
        }

        if fallback_count > FALLBACK_ESCALATION_THRESHOLD {
            return true;
        }

        user_turns
            .iter()
            .any(|turn| contains_any(&turn.lowercase_text(), self.lexicon.escalation_request))
    }
}

impl ConversationAnalyzer for LexicalQualityAnalyzer {
    fn analyze(&self, conversation: &ConversationInput) -> Option<AnalysisReport> {
        let (user_turns, assistant_turns) = conversation.classify();
        if user_turns.is_empty() || assistant_turns.is_empty() {
            return None;
        }

        let clarity = self.score_clarity(&assistant_turns);
        let relevance = self.score_relevance(&user_turns, &assistant_turns);
        let accuracy = self.score_accuracy(&assistant_turns);
        let completeness = self.score_completeness(&assistant_turns);

        let sentiment = self.detect_sentiment(&user_turns);
        let empathy = self.score_empathy(&assistant_turns, sentiment);
        let avg_response_time_seconds = self.average_response_time(conversation.turns());

        let resolved = self.detect_resolution(&user_turns);
        let fallback_count = self.count_fallbacks(&assistant_turns);
        let escalation_needed =
            self.needs_escalation(&user_turns, sentiment, resolved, fallback_count);

        let overall = overall_score(clarity, relevance, accuracy, completeness);

        Some(AnalysisReport {
            clarity,
            relevance,
            accuracy,
            completeness,
            sentiment,
            empathy,
            avg_response_time_seconds,
            resolved,
            escalation_needed,
            fallback_count,
            overall,
        })
    }
}

fn without_last_char(text: &str) -> &str {
    match text.char_indices().last() {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

fn seconds_between(earlier: DateTime<Utc>, later: DateTime<Utc>) -> f64 {
    let delta = later - earlier;
    match delta.num_microseconds() {
        Some(micros) => micros as f64 / 1_000_000.0,
        None => delta.num_milliseconds() as f64 / 1_000.0,
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use pretty_assertions::assert_eq;

    fn base_time() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
    }

    fn turn(sender: Sender, text: &str, offset_seconds: i64) -> Turn {
        Turn::new(sender, text, base_time() + Duration::seconds(offset_seconds))
    }

    fn user(text: &str, offset_seconds: i64) -> Turn {
        turn(Sender::User, text, offset_seconds)
    }

    fn assistant(text: &str, offset_seconds: i64) -> Turn {
        turn(Sender::Assistant, text, offset_seconds)
    }

    /// Alternating conversation, user first, one turn every 10 seconds
    fn alternating(user_texts: &[&str], assistant_texts: &[&str]) -> ConversationInput {
        let mut turns = Vec::new();
        let mut offset = 0;
        for i in 0..user_texts.len().max(assistant_texts.len()) {
            if let Some(text) = user_texts.get(i) {
                turns.push(user(text, offset));
                offset += 10;
            }
            if let Some(text) = assistant_texts.get(i) {
                turns.push(assistant(text, offset));
                offset += 10;
            }
        }
        ConversationInput::new(turns)
    }

    fn order_conversation() -> ConversationInput {
        ConversationInput::new(vec![
            user("Hi, I need help with my order", 0),
            assistant("Sure! I'd be happy to help. What's your order number?", 30),
            user("It's #12345", 60),
            assistant(
                "Thank you! Your order has been shipped and will arrive tomorrow.",
                100,
            ),
            user("Perfect! Thanks so much for your help!", 130),
        ])
    }

    // ========================================================================
    // Turn Classifier
    // ========================================================================

    #[test]
    fn test_classify_preserves_relative_order() {
        let conversation = order_conversation();
        let (users, assistants) = conversation.classify();

        assert_eq!(users.len(), 3);
        assert_eq!(assistants.len(), 2);
        assert_eq!(users[0].text, "Hi, I need help with my order");
        assert_eq!(users[2].text, "Perfect! Thanks so much for your help!");
        assert!(assistants[1].text.starts_with("Thank you!"));
    }

    #[test]
    fn test_sender_parsing_accepts_ai_alias() {
        assert_eq!("ai".parse::<Sender>().unwrap(), Sender::Assistant);
        assert_eq!("User".parse::<Sender>().unwrap(), Sender::User);
        assert!("system".parse::<Sender>().is_err());

        let parsed: Sender = serde_json::from_str("\"ai\"").unwrap();
        assert_eq!(parsed, Sender::Assistant);
    }

    // ========================================================================
    // Quality Scorers
    // ========================================================================

    #[test]
    fn test_clarity_penalizes_terse_answers() {
        let analyzer = LexicalQualityAnalyzer::new();
        let a = assistant("Ok.", 0);
        let b = assistant("Done, see you.", 0);
        assert_eq!(analyzer.score_clarity(&[&a, &b]), 4.0);
    }

    #[test]
    fn test_clarity_penalizes_unpunctuated_wall_of_text() {
        let analyzer = LexicalQualityAnalyzer::new();
        let wall = "word ".repeat(120);
        let wall_turn = assistant(&wall, 0);
        assert!((analyzer.score_clarity(&[&wall_turn]) - 4.7).abs() < 1e-9);

        // A trailing period alone is not structure
        let trailing = format!("{}end.", "word ".repeat(120));
        let trailing_turn = assistant(&trailing, 0);
        assert!((analyzer.score_clarity(&[&trailing_turn]) - 4.7).abs() < 1e-9);

        let structured = format!("{}. {}", "word ".repeat(60), "word ".repeat(60));
        let structured_turn = assistant(&structured, 0);
        assert_eq!(analyzer.score_clarity(&[&structured_turn]), 5.0);
    }

    #[test]
    fn test_clarity_penalizes_unclear_language() {
        let analyzer = LexicalQualityAnalyzer::new();
        let hedged = assistant("I think the package will maybe arrive on Monday", 0);
        assert!((analyzer.score_clarity(&[&hedged]) - 4.8).abs() < 1e-9);
    }

    #[test]
    fn test_clarity_clamps_to_floor() {
        let analyzer = LexicalQualityAnalyzer::new();
        let turns: Vec<Turn> = (0..20).map(|i| assistant("maybe", i)).collect();
        let refs: Vec<&Turn> = turns.iter().collect();
        assert_eq!(analyzer.score_clarity(&refs), MIN_SCORE);
    }

    #[test]
    fn test_relevance_requires_two_shared_words() {
        let analyzer = LexicalQualityAnalyzer::new();
        let u = user("My router keeps dropping the wifi connection", 0);
        let on_topic = assistant("Restart the router and check the wifi settings", 10);
        let off_topic = assistant("Our store opens at nine", 20);
        let one_word = assistant("Try the reset button", 30);

        assert_eq!(analyzer.score_relevance(&[&u], &[&on_topic]), 5.0);
        assert_eq!(analyzer.score_relevance(&[&u], &[&off_topic]), 4.5);
        // only "the" is shared
        assert_eq!(analyzer.score_relevance(&[&u], &[&one_word]), 4.5);
    }

    #[test]
    fn test_relevance_keywords_are_case_insensitive_word_runs() {
        let analyzer = LexicalQualityAnalyzer::new();
        let u = user("ORDER #12345 is LATE", 0);
        let a = assistant("order 12345 shipped", 10);
        assert_eq!(analyzer.score_relevance(&[&u], &[&a]), 5.0);
    }

    #[test]
    fn test_accuracy_penalizes_uncertainty_once_per_turn() {
        let analyzer = LexicalQualityAnalyzer::new();
        let doubly = assistant("I cannot verify that and I cannot confirm it either", 0);
        let certain = assistant("Your refund was issued yesterday", 0);
        assert_eq!(analyzer.score_accuracy(&[&doubly, &certain]), 4.5);
    }

    #[test]
    fn test_completeness_penalties_stack() {
        let analyzer = LexicalQualityAnalyzer::new();
        let short_question = assistant("Which order?", 0);
        assert!((analyzer.score_completeness(&[&short_question]) - 4.3).abs() < 1e-9);

        let full_answer = assistant(
            "Your order left the warehouse this morning and arrives on Friday",
            0,
        );
        assert_eq!(analyzer.score_completeness(&[&full_answer]), 5.0);
    }

    // ========================================================================
    // Interaction Analyzers
    // ========================================================================

    #[test]
    fn test_sentiment_decision_rule() {
        let analyzer = LexicalQualityAnalyzer::new();

        let positive = user("Great, thanks!", 0);
        assert_eq!(analyzer.detect_sentiment(&[&positive]), Sentiment::Positive);

        let negative = user("This is terrible, I am so angry", 0);
        assert_eq!(analyzer.detect_sentiment(&[&negative]), Sentiment::Negative);

        let nothing = user("Where is my parcel", 0);
        assert_eq!(analyzer.detect_sentiment(&[&nothing]), Sentiment::Neutral);

        let tied = user("Good product, bad delivery", 0);
        assert_eq!(analyzer.detect_sentiment(&[&tied]), Sentiment::Neutral);
    }

    #[test]
    fn test_sentiment_uses_substring_matching() {
        let analyzer = LexicalQualityAnalyzer::new();
        // "badge" contains "bad"
        let u = user("My badge does not scan", 0);
        assert_eq!(analyzer.detect_sentiment(&[&u]), Sentiment::Negative);
    }

    #[test]
    fn test_sentiment_sums_across_user_turns() {
        let analyzer = LexicalQualityAnalyzer::new();
        let a = user("awful", 0);
        let b = user("horrible", 10);
        let c = user("thanks", 20);
        assert_eq!(analyzer.detect_sentiment(&[&a, &b, &c]), Sentiment::Negative);
    }

    #[test]
    fn test_empathy_zero_unless_negative() {
        let analyzer = LexicalQualityAnalyzer::new();
        let a = assistant("I understand, I apologize, let me help", 0);
        assert_eq!(analyzer.score_empathy(&[&a], Sentiment::Positive), 0.0);
        assert_eq!(analyzer.score_empathy(&[&a], Sentiment::Neutral), 0.0);
        assert_eq!(analyzer.score_empathy(&[&a], Sentiment::Negative), 4.5);
    }

    #[test]
    fn test_empathy_total_is_capped() {
        let analyzer = LexicalQualityAnalyzer::new();
        let a = assistant("I understand, I apologize, let me help", 0);
        let b = assistant("I'm sorry about that", 10);
        assert_eq!(analyzer.score_empathy(&[&a, &b], Sentiment::Negative), MAX_EMPATHY);
    }

    #[test]
    fn test_response_time_averages_user_to_assistant_pairs() {
        let analyzer = LexicalQualityAnalyzer::new();
        let conversation = order_conversation();
        assert_eq!(analyzer.average_response_time(conversation.turns()), 35.0);
    }

    #[test]
    fn test_response_time_ignores_other_adjacencies() {
        let analyzer = LexicalQualityAnalyzer::new();
        let turns = vec![
            user("first", 0),
            user("second", 5),
            assistant("reply", 25),
            assistant("follow up", 100),
        ];
        assert_eq!(analyzer.average_response_time(&turns), 20.0);
    }

    #[test]
    fn test_response_time_zero_without_pairs() {
        let analyzer = LexicalQualityAnalyzer::new();
        assert_eq!(analyzer.average_response_time(&[]), 0.0);
        assert_eq!(analyzer.average_response_time(&[user("hi", 0)]), 0.0);
        let turns = vec![assistant("hello", 0), user("hi", 10)];
        assert_eq!(analyzer.average_response_time(&turns), 0.0);
    }

    #[test]
    fn test_response_time_keeps_sub_second_precision() {
        let analyzer = LexicalQualityAnalyzer::new();
        let start = base_time();
        let turns = vec![
            Turn::new(Sender::User, "hi", start),
            Turn::new(Sender::Assistant, "hello", start + Duration::milliseconds(1500)),
        ];
        assert_eq!(analyzer.average_response_time(&turns), 1.5);
    }

    #[test]
    fn test_response_time_passes_negative_deltas_through() {
        // Out-of-order timestamps (clock skew) are not filtered out
        let analyzer = LexicalQualityAnalyzer::new();
        let turns = vec![
            user("are you there?", 60),
            assistant("yes, how can I help?", 0),
            user("need a refund", 120),
            assistant("sure, processing it", 140),
        ];
        assert_eq!(analyzer.average_response_time(&turns), -20.0);
    }

    // ========================================================================
    // Decision Analyzers
    // ========================================================================

    #[test]
    fn test_resolution_only_considers_last_user_turn() {
        let analyzer = LexicalQualityAnalyzer::new();
        let thanked = user("thanks", 0);
        let still_broken = user("it still fails", 10);
        assert!(!analyzer.detect_resolution(&[&thanked, &still_broken]));
        assert!(analyzer.detect_resolution(&[&still_broken, &thanked]));
        assert!(!analyzer.detect_resolution(&[]));
    }

    #[test]
    fn test_resolution_substring_quirk() {
        // "unresolved" contains "resolved"
        let analyzer = LexicalQualityAnalyzer::new();
        let u = user("The ticket is still unresolved", 0);
        assert!(analyzer.detect_resolution(&[&u]));
    }

    #[test]
    fn test_fallback_counts_each_turn_once() {
        let analyzer = LexicalQualityAnalyzer::new();
        let many = assistant("I don't know, I cannot help, not sure at all", 0);
        assert_eq!(analyzer.count_fallbacks(&[&many]), 1);
    }

    #[test]
    fn test_fallback_count_is_monotonic() {
        let analyzer = LexicalQualityAnalyzer::new();
        let mut turns = vec![assistant("Here is your tracking link", 0)];
        let mut previous = 0;
        for i in 0..5 {
            turns.push(assistant("Sorry, that is beyond my capability", i + 1));
            let refs: Vec<&Turn> = turns.iter().collect();
            let count = analyzer.count_fallbacks(&refs);
            assert!(count >= previous);
            assert_eq!(count, (i + 1) as usize);
            previous = count;
        }
    }

    #[test]
    fn test_escalation_triggers() {
        let analyzer = LexicalQualityAnalyzer::new();
        let plain = user("where is my order", 0);

        assert!(analyzer.needs_escalation(&[&plain], Sentiment::Negative, false, 0));
        assert!(!analyzer.needs_escalation(&[&plain], Sentiment::Negative, true, 0));
        assert!(analyzer.needs_escalation(&[&plain], Sentiment::Neutral, true, 3));
        assert!(!analyzer.needs_escalation(&[&plain], Sentiment::Neutral, true, 2));

        let asks = user("can I talk to agent please", 0);
        assert!(analyzer.needs_escalation(&[&asks], Sentiment::Positive, true, 0));
    }

    // ========================================================================
    // Aggregator
    // ========================================================================

    #[test]
    fn test_weights_sum_to_one() {
        assert!((SCORE_WEIGHTS.total() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_overall_score_formula_and_rounding() {
        assert_eq!(overall_score(5.0, 5.0, 5.0, 5.0), 5.0);
        assert_eq!(overall_score(1.0, 1.0, 1.0, 1.0), 1.0);
        assert_eq!(overall_score(5.0, 5.0, 5.0, 4.7), 4.94);
        // 4.3*0.25 + 4.5*0.25 + 3.5*0.3 + 4.1*0.2 = 4.07
        assert_eq!(overall_score(4.3, 4.5, 3.5, 4.1), 4.07);
    }

    // ========================================================================
    // Full Analysis
    // ========================================================================

    #[test]
    fn test_full_analysis_resolved_order() {
        let analyzer = LexicalQualityAnalyzer::new();
        let report = analyzer.analyze(&order_conversation()).unwrap();

        assert_eq!(report.sentiment, Sentiment::Positive);
        assert!(report.resolved);
        assert!(!report.escalation_needed);
        assert_eq!(report.fallback_count, 0);
        assert_eq!(report.empathy, 0.0);
        assert_eq!(report.clarity, 5.0);
        assert_eq!(report.relevance, 5.0);
        assert_eq!(report.accuracy, 5.0);
        assert!((report.completeness - 4.7).abs() < 1e-9);
        assert_eq!(report.overall, 4.94);
        assert_eq!(report.avg_response_time_seconds, 35.0);
    }

    #[test]
    fn test_full_analysis_repeated_fallbacks_escalate() {
        let analyzer = LexicalQualityAnalyzer::new();
        let conversation = alternating(
            &[
                "This is the worst service",
                "Can you fix my account",
                "Still broken",
            ],
            &[
                "I don't know how to do that",
                "Sorry, I cannot help with accounts",
                "That is beyond my capability",
            ],
        );

        let report = analyzer.analyze(&conversation).unwrap();
        assert_eq!(report.fallback_count, 3);
        assert!(report.escalation_needed);
    }

    #[test]
    fn test_manager_request_always_escalates() {
        let analyzer = LexicalQualityAnalyzer::new();
        let conversation = alternating(
            &["Great service, thanks! But let me speak with your MANAGER"],
            &["Thank you for the kind words, I will pass the great feedback along."],
        );

        let report = analyzer.analyze(&conversation).unwrap();
        assert_eq!(report.sentiment, Sentiment::Positive);
        assert!(report.resolved);
        assert_eq!(report.fallback_count, 0);
        assert!(report.escalation_needed);
    }

    #[test]
    fn test_negative_unresolved_conversation() {
        let analyzer = LexicalQualityAnalyzer::new();
        let conversation = alternating(
            &["The app is useless and I am frustrated", "It keeps crashing"],
            &[
                "I understand, that must be frustrating. Let me help you with the crashing app.",
                "Please reinstall the app from the store and sign in again.",
            ],
        );

        let report = analyzer.analyze(&conversation).unwrap();
        assert_eq!(report.sentiment, Sentiment::Negative);
        assert!(!report.resolved);
        assert!(report.escalation_needed);
        // three empathetic phrases in the first answer
        assert_eq!(report.empathy, 4.5);
    }

    #[test]
    fn test_one_sided_conversations_produce_no_report() {
        let analyzer = LexicalQualityAnalyzer::new();

        let users_only = ConversationInput::new(vec![user("hello?", 0), user("anyone?", 10)]);
        assert_eq!(analyzer.analyze(&users_only), None);

        let assistants_only = ConversationInput::new(vec![assistant("How can I help?", 0)]);
        assert_eq!(analyzer.analyze(&assistants_only), None);

        assert_eq!(analyzer.analyze(&ConversationInput::default()), None);
    }

    #[test]
    fn test_analysis_is_idempotent() {
        let analyzer = LexicalQualityAnalyzer::new();
        let conversation = order_conversation();
        let first = analyzer.analyze(&conversation).unwrap();
        let second = analyzer.analyze(&conversation).unwrap();
        assert_eq!(first, second);
        assert_eq!(first.overall.to_bits(), second.overall.to_bits());
    }

    #[test]
    fn test_scores_stay_in_bounds() {
        let analyzer = LexicalQualityAnalyzer::new();
        let user_pool = [
            "hi",
            "This is terrible and useless, I hate it",
            "thanks, that worked",
            "I want a real person",
            "",
        ];
        let wall = "word ".repeat(150);
        let assistant_pool = [
            "ok",
            "I don't know",
            "Maybe? I am not sure, I cannot verify that?",
            "I understand and I apologize, let me help you reset your password right away.",
            wall.as_str(),
        ];

        for n in 1..=12 {
            let users: Vec<&str> = (0..n)
                .map(|i| user_pool[(i * 7 + n) % user_pool.len()])
                .collect();
            let assistants: Vec<&str> = (0..n)
                .map(|i| assistant_pool[(i * 3 + n) % assistant_pool.len()])
                .collect();
            let report = analyzer.analyze(&alternating(&users, &assistants)).unwrap();

            for score in [
                report.clarity,
                report.relevance,
                report.accuracy,
                report.completeness,
                report.overall,
            ] {
                assert!((MIN_SCORE..=MAX_SCORE).contains(&score), "{:?}", report);
            }
            assert!((0.0..=MAX_EMPATHY).contains(&report.empathy));
            assert!(report.avg_response_time_seconds >= 0.0);
            assert_eq!(
                report.overall,
                overall_score(
                    report.clarity,
                    report.relevance,
                    report.accuracy,
                    report.completeness
                )
            );
            if report.sentiment != Sentiment::Negative {
                assert_eq!(report.empathy, 0.0);
            }
        }
    }

    #[test]
    fn test_report_serializes_with_api_field_names() {
        let analyzer = LexicalQualityAnalyzer::new();
        let report = analyzer.analyze(&order_conversation()).unwrap();
        let json = serde_json::to_value(&report).unwrap();

        assert_eq!(json["sentiment"], "positive");
        assert_eq!(json["overall_score"], 4.94);
        assert_eq!(json["resolution_rate"], true);
        assert_eq!(json["escalation_need"], false);
        assert_eq!(json["fallback_frequency"], 0);
        assert_eq!(json["response_time_avg"], 35.0);
    }

    #[test]
    fn test_custom_lexicon_drives_scores() {
        use crate::signals::DEFAULT_LEXICON;

        let conversation = alternating(
            &["where is my parcel", "still waiting"],
            &["Please hold while I check.", "I don't know where it is."],
        );
        let (_, turns) = conversation.classify();

        let default_analyzer = LexicalQualityAnalyzer::new();
        assert_eq!(default_analyzer.count_fallbacks(&turns), 1);

        let custom = LexicalQualityAnalyzer::with_lexicon(Lexicon {
            fallback: &["please hold", "i don't know"],
            ..DEFAULT_LEXICON
        });
        assert_eq!(custom.lexicon().fallback, &["please hold", "i don't know"]);
        assert_eq!(custom.lexicon().positive, DEFAULT_LEXICON.positive);
        assert_eq!(custom.count_fallbacks(&turns), 2);

        let default_report = default_analyzer.analyze(&conversation).unwrap();
        let custom_report = custom.analyze(&conversation).unwrap();
        assert_eq!(default_report.fallback_count, 1);
        assert_eq!(custom_report.fallback_count, 2);
    }
}
