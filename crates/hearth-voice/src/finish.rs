//! Session end: derives recall metadata and stores the transcript.
//!
//! Runs once when a connected session ends without the discard flag. Every
//! step is best-effort: a failed save is logged and never blocks
//! teardown.

use crate::collaborators::MemoryBackend;
use crate::state::SharedSession;
use hearth_types::{CompletedSession, Turn, TurnRole};

/// Character budget for the derived session summary.
const MAX_SUMMARY_CHARS: usize = 100;

/// Upper bound on derived topic keywords.
const MAX_KEYWORDS: usize = 8;

/// Topic words shorter than this are noise.
const MIN_TOPIC_WORD_LEN: usize = 4;

/// Leading words of the combined text to skip ("I want to ask ...").
const SKIP_FIRST_N_WORDS: usize = 3;

/// A first message this short that matches a nicety is not a summary.
const MAX_NICETY_LEN: usize = 25;

/// Label given to a lazily created participant so the conversation is not
/// orphaned.
const PLACEHOLDER_LABEL: &str = "Someone";

/// Greetings, fillers, and common non-nouns excluded from topic keywords.
const TOPIC_STOPWORDS: &[&str] = &[
    "a", "an", "the", "and", "or", "but", "if", "then", "so", "its", "it's", "to", "from",
    "i", "me", "my", "you", "your", "he", "she", "we", "they", "them", "us", "our", "his", "her",
    "is", "are", "was", "were", "be", "been", "being", "have", "has", "had", "do", "does", "did",
    "will", "would", "could", "should", "may", "might", "can", "just", "really", "very",
    "hello", "hi", "hey", "yes", "no", "ok", "okay", "well", "oh", "ah", "um", "uh",
    "nice", "good", "great", "lovely", "wonderful", "hear", "speak", "talking", "talk",
    "today", "now", "here", "there", "this", "that", "these", "those",
    "what", "when", "where", "which", "who", "how", "why", "about", "with", "for", "not",
    "thank", "thanks", "thankyou", "gonna", "wanna", "gotta", "also", "more",
    "help", "like", "voice", "feeling", "mind", "doing", "right", "whats", "want", "think",
    "know", "get", "see", "come", "go", "say", "make", "take", "need", "try", "ask", "tell",
    "give", "work", "call", "find", "feel", "seem", "seems", "thing", "things", "way", "day",
];

const NICETY_PREFIXES: &[&str] = &[
    "thank you", "thanks", "ok", "okay", "hi ", "hello ", "hey ", "yes.", "no.", "yeah", "yep",
    "sure.",
];

const NICETY_EXACT: &[&str] = &[
    "thank you", "thanks", "ok", "okay", "hi", "hello", "hey", "yes", "no", "yeah", "yep", "sure",
];

fn is_nicety_only(message: &str) -> bool {
    let s = message.trim().to_lowercase();
    if s.len() > MAX_NICETY_LEN {
        return false;
    }
    NICETY_PREFIXES.iter().any(|p| s.starts_with(p)) || NICETY_EXACT.contains(&s.as_str())
}

fn user_messages(turns: &[Turn]) -> Vec<&str> {
    turns
        .iter()
        .filter(|t| t.role == TurnRole::User)
        .map(|t| t.content.trim())
        .filter(|c| !c.is_empty())
        .collect()
}

/// Derives the recall summary: the first substantive user utterance,
/// truncated to the character budget. Nicety-only openers ("Thank you.")
/// are skipped; if everything is a nicety, the longest message wins.
pub fn derive_summary(turns: &[Turn]) -> Option<String> {
    let messages = user_messages(turns);
    let first = *messages.first()?;
    let chosen = if is_nicety_only(first) {
        messages
            .iter()
            .skip(1)
            .find(|m| !is_nicety_only(m))
            .copied()
            .unwrap_or_else(|| {
                messages
                    .iter()
                    .max_by_key(|m| m.len())
                    .copied()
                    .unwrap_or(first)
            })
    } else {
        first
    };

    let mut summary: String = chosen.chars().take(MAX_SUMMARY_CHARS).collect();
    if chosen.chars().count() > MAX_SUMMARY_CHARS {
        summary = summary.trim_end().to_string();
        summary.push('…');
    }
    Some(summary)
}

/// Derives topic keywords from everything the user said: lowercased,
/// punctuation-stripped, stopword-filtered, deduplicated, order-preserving,
/// capped at [`MAX_KEYWORDS`].
pub fn derive_keywords(turns: &[Turn]) -> Vec<String> {
    let combined = user_messages(turns).join(" ");
    let words: Vec<&str> = combined.split_whitespace().collect();
    let start = SKIP_FIRST_N_WORDS.min(words.len());

    let mut seen = std::collections::HashSet::new();
    let mut keywords = Vec::new();
    for word in &words[start..] {
        if keywords.len() >= MAX_KEYWORDS {
            break;
        }
        let clean: String = word
            .chars()
            .filter(|c| c.is_alphanumeric() || *c == '\'' || *c == '-')
            .collect::<String>()
            .to_lowercase();
        if clean.chars().count() < MIN_TOPIC_WORD_LEN
            || TOPIC_STOPWORDS.contains(&clean.as_str())
            || !seen.insert(clean.clone())
        {
            continue;
        }
        keywords.push(clean);
    }
    keywords
}

/// Stores the finished session with the persistence collaborator.
///
/// Lazily creates a placeholder participant when none is known, derives
/// the summary and keywords, and submits all of it. Failures are logged;
/// teardown proceeds regardless.
pub async fn persist_session<B: MemoryBackend>(backend: &B, shared: &SharedSession) {
    let turns = shared.transcript_snapshot();

    let participant_id = match shared.participant_id() {
        Some(id) => id,
        None => match backend.create_participant(PLACEHOLDER_LABEL).await {
            Ok(p) => {
                tracing::info!(participant_id = %p.id, "created placeholder participant for session");
                p.id
            }
            Err(e) => {
                tracing::error!(error = %e, "could not create placeholder participant; session not saved");
                return;
            }
        },
    };

    let summary = derive_summary(&turns).unwrap_or_else(|| "Session recorded.".to_string());
    let keywords = derive_keywords(&turns);
    let turn_count = turns.len();

    match backend
        .complete_session(CompletedSession {
            participant_id: participant_id.clone(),
            turns,
            summary,
            keywords,
        })
        .await
    {
        Ok(moment_id) => {
            tracing::info!(
                moment_id = %moment_id,
                participant_id = %participant_id,
                turns = turn_count,
                "session saved"
            );
        }
        Err(e) => {
            tracing::error!(participant_id = %participant_id, error = %e, "failed to save session");
        }
    }
}
