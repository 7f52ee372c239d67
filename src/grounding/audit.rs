//! Citation auditing of model answers

use crate::grounding::{EvidenceItem, EvidenceSet, EvidenceTag};
use regex::Regex;
use serde::Serialize;
use std::sync::OnceLock;

/// Words that usually signal a rule, authority or checkable assertion
pub const LEGAL_KEYWORDS: &[&str] = &[
    "held", "holding", "ratio", "rule", "principle", "because", "therefore", "thus", "however",
    "applies", "application", "statute", "section", "case", "authority", "precedent", "duty",
    "breach", "liable", "liability", "defence", "defense", "test", "standard", "requirement",
    "requires", "must", "shall", "may", "where", "if", "unless",
];

/// Uncited sentences longer than this many words are flagged
pub const MAX_UNCITED_WORDS: usize = 25;

/// Tokens that end with a period without ending a sentence
const ABBREVIATIONS: &[&str] = &[
    "v", "vs", "e.g", "i.e", "s", "ss", "art", "para", "paras", "cf", "etc", "mr",
    "mrs", "ms", "dr", "lj", "j", "co", "ltd", "inc", "st", "p", "pp", "ch", "reg", "sch",
];

/// Words that label a lettered item ("Part A.", "an A.") rather than
/// precede a name initial
const LETTER_LABELS: &[&str] = &[
    "a", "an", "the", "part", "schedule", "plan", "annex", "appendix", "exhibit", "section",
    "article", "clause", "table", "figure", "class", "category", "type", "group", "grade",
    "form", "option", "item", "note", "chapter", "division", "tier", "level", "phase", "stage",
    "paragraph", "box", "vitamin",
];

/// `[#1]`, `[#U2]` or grouped `[#1, #U2]`
fn citation_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"\[\s*#[Uu]?\d+(?:\s*[,;]\s*#[Uu]?\d+)*\s*\]").expect("valid citation regex")
    })
}

fn leading_citation_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^\[\s*#[Uu]?\d+(?:\s*[,;]\s*#[Uu]?\d+)*\s*\]").expect("valid citation regex")
    })
}

fn tag_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"#[Uu]?\d+").expect("valid tag regex"))
}

/// Result of auditing one answer
#[derive(Debug, Clone, Default, Serialize)]
pub struct AuditReport {
    /// Substantive sentences without a citation
    pub offenders: Vec<String>,
    /// Evidence items the answer cites, in order of first use
    pub used: Vec<EvidenceItem>,
}

impl AuditReport {
    pub fn is_clean(&self) -> bool {
        self.offenders.is_empty()
    }
}

/// Audit an answer against the evidence it was given
pub fn audit_answer(answer: &str, evidence: &EvidenceSet) -> AuditReport {
    AuditReport {
        offenders: audit(answer),
        used: extract_used_tags(answer, evidence),
    }
}

/// Whether the text carries at least one citation tag
pub fn has_citation(text: &str) -> bool {
    citation_pattern().is_match(text)
}

/// Sentences that look substantive but cite nothing
pub fn audit(answer: &str) -> Vec<String> {
    split_sentences(answer)
        .into_iter()
        .filter(|sentence| is_offender(sentence))
        .collect()
}

fn is_offender(sentence: &str) -> bool {
    if !sentence.chars().any(|c| c.is_alphabetic()) || has_citation(sentence) {
        return false;
    }

    let words = sentence.split_whitespace().count();
    words > MAX_UNCITED_WORDS || has_legal_signal(sentence)
}

fn has_legal_signal(sentence: &str) -> bool {
    if sentence.contains('§') {
        return true;
    }
    sentence
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .any(|word| {
            let word = word.to_lowercase();
            LEGAL_KEYWORDS.contains(&word.as_str())
        })
}

/// Every tag cited in the answer, in order of first appearance
pub fn cited_tags(answer: &str) -> Vec<EvidenceTag> {
    let mut tags = Vec::new();
    for group in citation_pattern().find_iter(answer) {
        for raw in tag_pattern().find_iter(group.as_str()) {
            if let Some(tag) = EvidenceTag::parse(raw.as_str()) {
                if !tags.contains(&tag) {
                    tags.push(tag);
                }
            }
        }
    }
    tags
}

/// Resolve cited tags to their evidence items, dropping unknown tags
pub fn extract_used_tags(answer: &str, evidence: &EvidenceSet) -> Vec<EvidenceItem> {
    cited_tags(answer)
        .into_iter()
        .filter_map(|tag| evidence.get(tag).cloned())
        .collect()
}

/// Split text into sentences
///
/// Lines are hard boundaries. Within a line a sentence ends at `.`, `!` or
/// `?` (plus closing quotes or brackets) followed by whitespace, except
/// after a known abbreviation or a name initial. A citation that
/// opens a sentence belongs to the previous one.
pub fn split_sentences(text: &str) -> Vec<String> {
    let mut sentences = Vec::new();

    for line in text.lines() {
        let chars: Vec<(usize, char)> = line.char_indices().collect();
        let mut start = 0;
        let mut i = 0;

        while i < chars.len() {
            let (pos, c) = chars[i];
            if !matches!(c, '.' | '!' | '?') {
                i += 1;
                continue;
            }

            let mut j = i + 1;
            while j < chars.len()
                && matches!(chars[j].1, '.' | '!' | '?' | '"' | '\'' | ')' | '\u{201d}' | '\u{2019}')
            {
                j += 1;
            }

            let at_boundary = j >= chars.len() || chars[j].1.is_whitespace();
            let end = chars.get(j).map_or(line.len(), |(p, _)| *p);
            if at_boundary && !(c == '.' && ends_with_abbreviation(&line[start..pos], &line[end..]))
            {
                push_sentence(&mut sentences, &line[start..end]);
                start = end;
            }
            i = j;
        }

        push_sentence(&mut sentences, &line[start..]);
    }

    sentences
}

fn ends_with_abbreviation(before: &str, after: &str) -> bool {
    let mut tokens = before.split_whitespace().rev();
    let Some(token) = tokens.next() else {
        return false;
    };
    let token = trim_opening(token);

    if ABBREVIATIONS.contains(&token.to_lowercase().as_str()) {
        return true;
    }
    is_single_capital(token) && is_name_initial(tokens.next().map(trim_opening), after)
}

/// A lone capital is an initial when it follows another initial, or when
/// a capitalised word follows and the word before is not an item label
fn is_name_initial(previous: Option<&str>, after: &str) -> bool {
    if let Some(stem) = previous.and_then(|p| p.strip_suffix('.')) {
        if is_single_capital(stem) {
            return true;
        }
    }

    let next_capitalised = after
        .split_whitespace()
        .next()
        .and_then(|word| trim_opening(word).chars().next())
        .is_some_and(char::is_uppercase);
    if !next_capitalised {
        return false;
    }

    match previous {
        None => true,
        Some(word) => {
            let word = word.trim_end_matches(|c: char| !c.is_alphanumeric());
            !LETTER_LABELS.contains(&word.to_lowercase().as_str())
        }
    }
}

fn is_single_capital(token: &str) -> bool {
    let mut chars = token.chars();
    matches!((chars.next(), chars.next()), (Some(c), None) if c.is_uppercase())
}

fn trim_opening(token: &str) -> &str {
    token.trim_start_matches(['(', '[', '"', '\u{201c}'])
}

fn push_sentence(sentences: &mut Vec<String>, raw: &str) {
    let mut text = raw.trim();
    if text.is_empty() {
        return;
    }

    if let Some(lead) = leading_citation_pattern().find(text) {
        if let Some(previous) = sentences.last_mut() {
            previous.push(' ');
            previous.push_str(lead.as_str());
            text = text[lead.end()..].trim();
        }
    }

    if !text.is_empty() {
        sentences.push(text.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grounding::EvidenceOrigin;

    fn evidence() -> EvidenceSet {
        EvidenceSet {
            items: vec![
                EvidenceItem {
                    tag: EvidenceTag::Document(1),
                    origin: EvidenceOrigin::Document {
                        source_file: "torts.pdf".to_string(),
                        chunk_id: 0,
                    },
                    text: "one".to_string(),
                },
                EvidenceItem {
                    tag: EvidenceTag::Document(2),
                    origin: EvidenceOrigin::Document {
                        source_file: "contract.pdf".to_string(),
                        chunk_id: 5,
                    },
                    text: "two".to_string(),
                },
                EvidenceItem {
                    tag: EvidenceTag::User(1),
                    origin: EvidenceOrigin::User,
                    text: "three".to_string(),
                },
            ],
            ..Default::default()
        }
    }

    #[test]
    fn test_split_basic() {
        let sentences = split_sentences("First one. Second one! Third one?");
        assert_eq!(sentences, vec!["First one.", "Second one!", "Third one?"]);
    }

    #[test]
    fn test_split_keeps_case_names_and_decimals() {
        let sentences =
            split_sentences("Donoghue v. Stevenson is key, e.g. for s. 12.3 analysis. Next point.");
        assert_eq!(sentences.len(), 2);
        assert!(sentences[0].ends_with("analysis."));
    }

    #[test]
    fn test_split_reattaches_trailing_tag() {
        let sentences = split_sentences("The duty arises in negligence. [#1] Another sentence.");
        assert_eq!(
            sentences,
            vec!["The duty arises in negligence. [#1]", "Another sentence."]
        );
    }

    #[test]
    fn test_split_keeps_name_initials() {
        let sentences =
            split_sentences("The judgment of J. R. Smith was upheld. Lord Denning M. R. agreed.");
        assert_eq!(
            sentences,
            vec!["The judgment of J. R. Smith was upheld.", "Lord Denning M. R. agreed."]
        );
    }

    #[test]
    fn test_split_ends_at_lettered_items() {
        let sentences = split_sentences("I got an A. Then I went home.");
        assert_eq!(sentences, vec!["I got an A.", "Then I went home."]);

        let sentences = split_sentences("See Schedule B. It lists the parties.");
        assert_eq!(sentences, vec!["See Schedule B.", "It lists the parties."]);
    }

    #[test]
    fn test_short_sentences_after_grade_not_merged() {
        let text = "I got an A. Then I went home after school and walked slowly along the \
                    quiet river past the busy market square near the old town.";
        assert_eq!(split_sentences(text).len(), 2);
        assert!(audit(text).is_empty());
    }

    #[test]
    fn test_uncited_claim_before_cited_sentence_flagged() {
        let offenders = audit("The defendant is liable under Part A. This is settled [#1].");
        assert_eq!(offenders, vec!["The defendant is liable under Part A."]);
    }

    #[test]
    fn test_split_lines_are_boundaries() {
        let sentences = split_sentences("- Offer\n- Acceptance\n\nDone");
        assert_eq!(sentences, vec!["- Offer", "- Acceptance", "Done"]);
    }

    #[test]
    fn test_short_plain_sentence_not_flagged() {
        assert!(audit("Hello there. Nice to meet you!").is_empty());
    }

    #[test]
    fn test_long_uncited_sentence_flagged() {
        let long = vec!["word"; 30].join(" ") + ".";
        assert_eq!(audit(&long), vec![long.clone()]);
    }

    #[test]
    fn test_keyword_sentence_flagged_unless_cited() {
        let offenders = audit("The court held the defendant liable. It held so again [#1].");
        assert_eq!(offenders, vec!["The court held the defendant liable."]);
    }

    #[test]
    fn test_keywords_match_whole_words() {
        // "different" and "mayor" contain "if" and "may" but are not signals
        assert!(audit("The mayor had a different view.").is_empty());
        assert_eq!(audit("See § 4 for details.").len(), 1);
    }

    #[test]
    fn test_punctuation_only_ignored() {
        assert!(audit("... !!! ???").is_empty());
    }

    #[test]
    fn test_user_and_grouped_tags_count_as_citations() {
        assert!(audit("You said you must attend [#U1].").is_empty());
        assert!(audit("The rule applies here [#1, #U1].").is_empty());
    }

    #[test]
    fn test_extract_used_tags_resolves_and_dedupes() {
        let answer = "A rule [#2]. Another [#1, #U1]. Again [#2]. Unknown [#9] and [#U7].";
        let used = extract_used_tags(answer, &evidence());

        let tags: Vec<EvidenceTag> = used.iter().map(|item| item.tag).collect();
        assert_eq!(
            tags,
            vec![EvidenceTag::Document(2), EvidenceTag::Document(1), EvidenceTag::User(1)]
        );
        assert_eq!(used[0].label(), "contract.pdf");
    }

    #[test]
    fn test_audit_report() {
        let report = audit_answer("Negligence requires a duty [#1].", &evidence());
        assert!(report.is_clean());
        assert_eq!(report.used.len(), 1);
    }

    #[test]
    fn test_has_citation() {
        assert!(has_citation("text [#3]"));
        assert!(has_citation("text [ #U3 ]"));
        assert!(!has_citation("text #3"));
        assert!(!has_citation("text [3]"));
    }
}
