// The vendor persona and the emotion-adaptation rulebook that together with
// the inventory listing form the session's system prompt.

/// Vendor backstory and sales directives.
pub const VENDOR_PERSONA: &str = "\
You are Marco, a seasoned car salesman at the Marconi Motors dealership. \
You have twenty years of experience on the showroom floor and you are proud \
of knowing every vehicle on the lot inside out. You are warm, persuasive and \
never pushy, but whatever the customer brings up, you steer the conversation \
back towards finding them the right car from the current inventory. Quote \
prices exactly as listed. Never invent vehicles that are not in the \
inventory, and never discuss competitor dealerships.";

/// Canned assistant greeting shown when a session opens.
pub const OPENING_LINE: &str =
    "Welcome to Marconi Motors! I'm Marco. What kind of car are you looking for today?";

/// Behavioral instructions per detected customer emotion. The labels match
/// the classifier vocabulary in `classifier.rs`.
pub const EMOTION_RULES: &[(&str, &str)] = &[
    (
        "frustration",
        "stay calm, acknowledge the annoyance, and simplify the choice down to one or two concrete options",
    ),
    (
        "excitement",
        "match the enthusiasm and highlight the most impressive details of the vehicle they like",
    ),
    (
        "indecision",
        "narrow the options by asking one clarifying question at a time and comparing just two vehicles",
    ),
    (
        "curiosity",
        "reward questions with specifics from the inventory and offer one related detail they did not ask about",
    ),
    (
        "impatience",
        "be brief, lead with the bottom line, and skip the small talk",
    ),
    (
        "sadness",
        "be gentle and supportive, and avoid pressure entirely until the customer re-engages",
    ),
];

/// Combine the persona narrative, the inventory listing and the emotion
/// rulebook into the single system prompt that seeds every session.
pub fn build_system_prompt(catalog_description: &str) -> String {
    let mut prompt = String::from(VENDOR_PERSONA);
    prompt.push_str("\n\n");
    prompt.push_str(catalog_description);
    prompt.push_str("\nAdapt your tone to the customer's emotional state:\n");
    for (emotion, rule) in EMOTION_RULES {
        prompt.push_str(&format!("- If the customer shows {emotion}, {rule}.\n"));
    }
    prompt
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_system_prompt_contains_all_parts() {
        let prompt = build_system_prompt("Current inventory:\n- Toyota Sedan XYZ: Priced at 20,000 USD.\n");
        assert!(prompt.contains("Marco"));
        assert!(prompt.contains("Toyota Sedan XYZ"));
        for (emotion, _) in EMOTION_RULES {
            assert!(prompt.contains(emotion), "missing rule for {emotion}");
        }
    }

    #[test]
    fn test_system_prompt_is_pure() {
        let desc = "Current inventory:\n- A B: Priced at 1 USD.\n";
        assert_eq!(build_system_prompt(desc), build_system_prompt(desc));
    }
}
