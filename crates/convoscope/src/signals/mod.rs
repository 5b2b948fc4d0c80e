pub mod analyzer;
pub mod lexicon;

pub use analyzer::{
    overall_score, AnalysisReport, ConversationAnalyzer, ConversationInput,
    LexicalQualityAnalyzer, Sender, Sentiment, Turn, SCORE_WEIGHTS,
};
pub use lexicon::{Lexicon, DEFAULT_LEXICON};
