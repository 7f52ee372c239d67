//! Reserved-prefix commands typed into the conversation

use crate::grounding::EvidenceTag;

/// What a line of user input asks for
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// `remember: <fact>`, kept across sessions
    Remember(String),
    /// `memo: <fact>`, kept for this session
    Memo(String),
    /// `role: <persona>`; an empty persona clears it
    Persona(Option<String>),
    /// `show snippet [#n]`
    ShowSnippet(EvidenceTag),
    /// Anything else
    Query(String),
    /// A reserved prefix with nothing usable after it
    Invalid(String),
}

impl Command {
    /// Prefixes are matched case-insensitively; the payload is everything
    /// after the first colon, trimmed
    pub fn parse(input: &str) -> Self {
        let text = input.trim();
        let lower = text.to_lowercase();

        if let Some(payload) = prefixed(text, &lower, "remember:") {
            return match payload {
                "" => Self::Invalid("Nothing to remember after 'remember:'".to_string()),
                fact => Self::Remember(fact.to_string()),
            };
        }

        if let Some(payload) = prefixed(text, &lower, "memo:") {
            return match payload {
                "" => Self::Invalid("Nothing to note after 'memo:'".to_string()),
                fact => Self::Memo(fact.to_string()),
            };
        }

        if let Some(payload) = prefixed(text, &lower, "role:") {
            return Self::Persona(Some(payload.to_string()).filter(|p| !p.is_empty()));
        }

        if let Some(rest) = lower
            .strip_prefix("show snippet")
            .filter(|rest| rest.is_empty() || rest.starts_with([' ', '\t', '#', '[']))
        {
            return match EvidenceTag::parse(rest) {
                Some(tag) => Self::ShowSnippet(tag),
                None => Self::Invalid(format!("Unknown snippet tag: {}", rest.trim())),
            };
        }

        Self::Query(text.to_string())
    }
}

fn prefixed<'a>(text: &'a str, lower: &str, prefix: &str) -> Option<&'a str> {
    if !lower.starts_with(prefix) {
        return None;
    }
    text.split_once(':').map(|(_, payload)| payload.trim())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prefixes_case_insensitive() {
        assert_eq!(
            Command::parse("Remember: I study at LSE"),
            Command::Remember("I study at LSE".to_string())
        );
        assert_eq!(
            Command::parse("MEMO:the exam is on June 5"),
            Command::Memo("the exam is on June 5".to_string())
        );
        assert_eq!(
            Command::parse("role: a strict examiner"),
            Command::Persona(Some("a strict examiner".to_string()))
        );
    }

    #[test]
    fn test_payload_splits_at_first_colon() {
        assert_eq!(
            Command::parse("memo: meeting at 10:30"),
            Command::Memo("meeting at 10:30".to_string())
        );
    }

    #[test]
    fn test_empty_payloads() {
        assert!(matches!(Command::parse("remember:"), Command::Invalid(_)));
        assert!(matches!(Command::parse("memo:   "), Command::Invalid(_)));
        assert_eq!(Command::parse("role:"), Command::Persona(None));
    }

    #[test]
    fn test_show_snippet() {
        assert_eq!(
            Command::parse("show snippet [#2]"),
            Command::ShowSnippet(EvidenceTag::Document(2))
        );
        assert_eq!(
            Command::parse("Show snippet #U1"),
            Command::ShowSnippet(EvidenceTag::User(1))
        );
        assert_eq!(
            Command::parse("show snippet#U2"),
            Command::ShowSnippet(EvidenceTag::User(2))
        );
        assert!(matches!(Command::parse("show snippet"), Command::Invalid(_)));
    }

    #[test]
    fn test_everything_else_is_a_query() {
        assert_eq!(
            Command::parse("  what is a duty of care?  "),
            Command::Query("what is a duty of care?".to_string())
        );
        assert_eq!(
            Command::parse("show snippets about consideration"),
            Command::Query("show snippets about consideration".to_string())
        );
        assert_eq!(
            Command::parse("remembering: is not a prefix"),
            Command::Query("remembering: is not a prefix".to_string())
        );
    }
}
