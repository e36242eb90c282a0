// Emotion/trait side channel: one extra completion call per turn asking for
// exactly two whitespace-separated labels describing the latest user
// message. Never fails the turn; anything malformed degrades to "Unknown".

use tracing::{debug, warn};

use crate::backend::CompletionBackend;

/// Canonical emotion vocabulary. Matches the rulebook in `persona.rs`.
pub const EMOTIONS: [&str; 6] = [
    "frustration",
    "excitement",
    "indecision",
    "curiosity",
    "impatience",
    "sadness",
];

/// The five OCEAN personality traits.
pub const TRAITS: [&str; 5] = [
    "Openness",
    "Conscientiousness",
    "Extraversion",
    "Agreeableness",
    "Neuroticism",
];

pub const UNKNOWN_LABEL: &str = "Unknown";

const CLASSIFIER_SYSTEM: &str = "You are a psychologist classifying the emotion \
and the dominant OCEAN personality trait expressed in a customer's message.";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classification {
    pub emotion: String,
    pub personality_trait: String,
}

impl Classification {
    pub fn unknown() -> Self {
        Classification {
            emotion: UNKNOWN_LABEL.to_string(),
            personality_trait: UNKNOWN_LABEL.to_string(),
        }
    }
}

fn classifier_instruction(user_text: &str) -> String {
    format!(
        "Classify the following customer message. Reply with exactly two words \
separated by a space and nothing else: first an emotion from [{}], then an \
OCEAN trait from [{}].\n\nMessage: {user_text}",
        EMOTIONS.join(", "),
        TRAITS.join(", "),
    )
}

/// Parse the classifier reply: whitespace-split, first two tokens. Fewer
/// than two tokens resolves both labels to the sentinel.
pub fn parse_labels(reply: &str) -> Classification {
    let mut tokens = reply.split_whitespace();
    match (tokens.next(), tokens.next()) {
        (Some(emotion), Some(personality_trait)) => Classification {
            emotion: emotion.to_string(),
            personality_trait: personality_trait.to_string(),
        },
        _ => Classification::unknown(),
    }
}

/// Classify the latest user message with a one-shot call against the same
/// backend. A failed call degrades to the sentinel pair rather than failing
/// the turn.
pub async fn classify(backend: &CompletionBackend, user_text: &str) -> Classification {
    match backend
        .one_shot(CLASSIFIER_SYSTEM, &classifier_instruction(user_text))
        .await
    {
        Ok(reply) => {
            debug!(%reply, "classifier reply");
            parse_labels(&reply)
        }
        Err(e) => {
            warn!(error = %e, "classification call failed, using sentinel labels");
            Classification::unknown()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_two_tokens() {
        let labels = parse_labels("excitement Openness");
        assert_eq!(labels.emotion, "excitement");
        assert_eq!(labels.personality_trait, "Openness");
    }

    #[test]
    fn test_parse_single_token_degrades_to_unknown() {
        assert_eq!(parse_labels("excitement"), Classification::unknown());
    }

    #[test]
    fn test_parse_empty_degrades_to_unknown() {
        assert_eq!(parse_labels(""), Classification::unknown());
        assert_eq!(parse_labels("   \n"), Classification::unknown());
    }

    #[test]
    fn test_parse_extra_tokens_consumes_first_two() {
        let labels = parse_labels("curiosity Extraversion trailing words ignored");
        assert_eq!(labels.emotion, "curiosity");
        assert_eq!(labels.personality_trait, "Extraversion");
    }

    #[test]
    fn test_parse_tolerates_surrounding_whitespace() {
        let labels = parse_labels("\n  sadness   Neuroticism \n");
        assert_eq!(labels.emotion, "sadness");
        assert_eq!(labels.personality_trait, "Neuroticism");
    }

    #[test]
    fn test_instruction_names_both_vocabularies() {
        let instruction = classifier_instruction("I love this car");
        for emotion in EMOTIONS {
            assert!(instruction.contains(emotion));
        }
        for personality_trait in TRAITS {
            assert!(instruction.contains(personality_trait));
        }
        assert!(instruction.contains("I love this car"));
    }
}
