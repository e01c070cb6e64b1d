//! Sanitization: deterministic cleanup of extracted comic text before speech.
//!
//! Vision models and OCR engines hand back text that is fine for a human to
//! skim but awkward to hear: speaker tags, watermark URLs, OCR confusing `!`
//! with `l`, runs of stray capitals from panel art, words glued together.
//! [`sanitize`] runs an ordered table of regex rules grouped into ten
//! [`Stage`]s. Rule order is significant: tags go before punctuation so a
//! `NARRATOR:` prefix leaves no dangling colon, watermarks go before noise
//! removal so `www` never survives as a lowercase run, and whitespace is
//! collapsed last.
//!
//! [`clean_text`] is the reduced pass applied to raw OCR output on its own,
//! before it is joined with a caption.

use crate::voice::speaker_tag_alternation;
use once_cell::sync::Lazy;
use regex::{Captures, Regex};

/// Rule groups, in application order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Stage {
    SpeakerTags,
    VisualArtifacts,
    Watermarks,
    StructuralFixes,
    PronounRepair,
    ExclamationRepair,
    MergedWords,
    NoiseTokens,
    Punctuation,
    Whitespace,
}

enum Rewrite {
    /// Replacement template; `${n}` expands capture groups.
    Template(&'static str),
    /// Computed replacement.
    With(fn(&Captures<'_>) -> String),
}

struct Rule {
    name: &'static str,
    stage: Stage,
    pattern: Regex,
    rewrite: Rewrite,
}

impl Rule {
    fn new(name: &'static str, stage: Stage, pattern: &str, rewrite: &'static str) -> Self {
        Self {
            name,
            stage,
            pattern: Regex::new(pattern).unwrap(),
            rewrite: Rewrite::Template(rewrite),
        }
    }

    fn with(
        name: &'static str,
        stage: Stage,
        pattern: &str,
        f: fn(&Captures<'_>) -> String,
    ) -> Self {
        Self {
            name,
            stage,
            pattern: Regex::new(pattern).unwrap(),
            rewrite: Rewrite::With(f),
        }
    }

    fn apply(&self, input: &str) -> String {
        match &self.rewrite {
            Rewrite::Template(t) => self.pattern.replace_all(input, *t).into_owned(),
            Rewrite::With(f) => self.pattern.replace_all(input, *f).into_owned(),
        }
    }
}

/// Words ending in `l` that the exclamation repair must leave alone.
const PROTECTED_L_WORDS: &[&str] = &[
    "owl", "bowl", "howl", "growl", "fowl", "scowl", "prowl", "crawl", "shawl", "brawl", "drawl",
    "awl", "bawl", "sprawl", "scrawl", "trawl", "cowl", "jowl", "yowl", "vinyl", "sibyl", "spiel",
];

/// Known OCR misreadings, replaced as whole words (case-insensitive).
const WORD_FIXES: &[(&str, &str)] = &[
    ("mussel", "mouse"),
    ("mousel", "mouse"),
    ("clothl", "cloth"),
    ("youl", "you"),
    ("hatl", "hat"),
    ("timel", "time"),
    ("shopl", "shop"),
    ("kingl", "king"),
    ("heyl", "Hey"),
    ("taking said", "the king said"),
    ("taking was", "the king was"),
    ("stated", "started"),
];

/// `stem` + `l` at a word end is read as `stem!` unless the stem ends in a
/// vowel, `l`, `r` or a digit, or the whole word is a real `-l` word.
/// `-yl` words (`Cheryl`, `vinyl`) are kept unless they are known misreadings.
fn trailing_l_to_bang(caps: &Captures<'_>) -> String {
    let stem = &caps[1];
    let tail = &caps[2];
    let word = format!("{stem}l").to_lowercase();
    let keep = match stem.chars().last().map(|c| c.to_ascii_lowercase()) {
        Some('y') => !WORD_FIXES.iter().any(|(wrong, _)| *wrong == word),
        Some(c) => {
            "aeioulr".contains(c)
                || c.is_ascii_digit()
                || PROTECTED_L_WORDS.contains(&word.as_str())
        }
        None => true,
    };
    if keep {
        caps[0].to_string()
    } else {
        format!("{stem}!{tail}")
    }
}

static RULES: Lazy<Vec<Rule>> = Lazy::new(|| {
    use Stage::*;
    let tags = speaker_tag_alternation();

    let mut rules = vec![
        // 1. Speaker tags
        Rule::new(
            "bracketed_tag",
            SpeakerTags,
            &format!(r"(?i)\[\s*(?:{tags})\s*\]\s*"),
            "",
        ),
        Rule::new("bare_tag", SpeakerTags, &format!(r"\b(?:{tags})\b:?\s*"), ""),
        // 2. Visual artifacts
        Rule::new("underscores", VisualArtifacts, r"_+", " "),
        Rule::new("brackets", VisualArtifacts, r"[\[\]{}()<>]", ""),
        Rule::new("symbols", VisualArtifacts, r"[#@$%^&*+=|\\~`]", ""),
        Rule::new("decimals", VisualArtifacts, r"\b\d+\.\d+\b", ""),
        // 3. Watermarks
        Rule::new("url", Watermarks, r"https?://\S+", ""),
        Rule::new("www_host", Watermarks, r"(?i)www\.\S+", ""),
        Rule::new("www", Watermarks, r"(?i)\bwww\b", ""),
        Rule::new("dot_com", Watermarks, r"(?i)\.com\b", ""),
        Rule::new("com", Watermarks, r"(?i)\bl?com\b", ""),
        Rule::new("site_name", Watermarks, r"(?i)iskcondesiretree", ""),
        Rule::new("underscore_word", Watermarks, r"(?i)\bunderscore\b", ""),
        // 4. Structural fixes
        Rule::new(
            "dismount",
            StructuralFixes,
            r"\bThey\s+The\b",
            "They got down from their horses. The",
        ),
        Rule::new("get_down", StructuralFixes, r"\bget\s+down\s+from\b", "got down from"),
        // 5. Pronoun repair
        Rule::new(
            "can_please",
            PronounRepair,
            r"(?i)\bcan\s+please\s+I\s+have\b",
            "Can I please have",
        ),
        Rule::new(
            "can_have_please",
            PronounRepair,
            r"(?i)\bcan\s+I\s+have\s+please\b",
            "Can I please have",
        ),
        Rule::new(
            "missing_i",
            PronounRepair,
            r"(^|[.!?:]\s+)(am|have|will|shall|can|must|should|would|could|thought|realize|hope)\s+",
            "${1}I ${2} ",
        ),
        Rule::new(
            "doubled_subject",
            PronounRepair,
            r"\b(You|you|We|we|They|they)\s+I\s+have\s+(come|learned|some)\b",
            "${1} have ${2}",
        ),
        Rule::new("may_have", PronounRepair, r"\bmay\s+I\s+have\s+some\b", "may have some"),
        Rule::new("let_me", PronounRepair, r"\blet\s+I\s+have\b", "let me have"),
        // 6. Exclamation repair
        Rule::new(
            "standalone_l",
            ExclamationRepair,
            r"(\w)\s+l(\s|[.!?]|$)",
            "${1}!${2}",
        ),
        Rule::with(
            "trailing_l",
            ExclamationRepair,
            r"\b(\w+)l(\s|[.!?]|$)",
            trailing_l_to_bang,
        ),
        Rule::new("ful", ExclamationRepair, r"(\w+)fu!", "${1}ful"),
    ];

    for (wrong, right) in WORD_FIXES {
        rules.push(Rule::new(
            "word_fix",
            ExclamationRepair,
            &format!(r"(?i)\b{}\b", regex::escape(wrong)),
            right,
        ));
    }

    rules.extend([
        // 7. Merged words
        Rule::new("a_person", MergedWords, r"\bAperson\b", "A person"),
        Rule::new("a_jivatama", MergedWords, r"\bAjivatama\b", "A jivatama"),
        Rule::new("caps_then_lower", MergedWords, r"\b([A-Z]{2,})([a-z]{2,})\b", "${1} ${2}"),
        Rule::new(
            "lower_then_title",
            MergedWords,
            r"\b([a-z]{2,})([A-Z][a-z]+)\b",
            "${1} ${2}",
        ),
        // 8. Noise tokens
        Rule::new("capital_run", NoiseTokens, r"\b[A-Z](?:\s+[A-Z]){2,}\b", ""),
        Rule::new(
            "isolated_letter",
            NoiseTokens,
            r"(^|\s)[b-hj-zB-HJ-Z]\s+([A-Z])",
            "${1}${2}",
        ),
        Rule::new("digits_capitals", NoiseTokens, r"\b\d+\s+[A-Z](?:\s+[A-Z])*\b", ""),
        Rule::new("capital_digits", NoiseTokens, r"\b[A-Z](?:\s+\d+)+\b", ""),
        Rule::new("lowercase_run", NoiseTokens, r"\b[a-z](?:\s+[a-z]){2,}\b", ""),
        // 9. Punctuation
        Rule::new("dots", Punctuation, r"\.{2,}", "."),
        Rule::new("bangs", Punctuation, r"!{2,}", "!"),
        Rule::new("questions", Punctuation, r"\?{2,}", "?"),
        Rule::new("semicolons", Punctuation, r";{2,}", ";"),
        Rule::new("colons", Punctuation, r":{2,}", ":"),
        Rule::new("commas", Punctuation, r",{2,}", ","),
        Rule::new("space_before_mark", Punctuation, r"\s+([,.!?;:])", "${1}"),
        Rule::new("space_after_stop", Punctuation, r"([.!?])([A-Z])", "${1} ${2}"),
        Rule::new("space_after_pause", Punctuation, r"([,:;])([A-Za-z])", "${1} ${2}"),
        Rule::new(
            "contraction",
            Punctuation,
            r"\s+'(s|t|re|ve|ll|d|m)\b",
            "'${1}",
        ),
        // 10. Whitespace
        Rule::new("whitespace", Whitespace, r"\s+", " "),
    ]);

    rules
});

/// Turn raw extracted text into text fit for speech.
///
/// Blank input yields an empty string. Output never has leading or trailing
/// whitespace and never contains two consecutive spaces.
pub fn sanitize(input: &str) -> String {
    if input.trim().is_empty() {
        return String::new();
    }
    let mut text = input.to_string();
    for rule in RULES.iter() {
        let next = rule.apply(&text);
        if next != text {
            tracing::trace!(rule = rule.name, stage = ?rule.stage, "sanitize rule applied");
            text = next;
        }
    }
    text.trim().to_string()
}

// ── OCR-only cleanup ─────────────────────────────────────────────────────────

/// Typos seen in OCR of speech bubbles, matched case-sensitively.
const OCR_TYPOS: &[(&str, &str)] = &[
    ("Wowl", "Wow!"),
    ("mousel", "mouse!"),
    ("mussel", "mouse!"),
    ("youl", "you!"),
    ("hatl", "hat!"),
    ("timel", "time!"),
    ("shopl", "shop!"),
    ("Mel", "me!"),
    ("chui", ""),
];

static OCR_RULES: Lazy<Vec<(Regex, &'static str)>> = Lazy::new(|| {
    let mut rules: Vec<(Regex, &'static str)> = [
        r"\[\d{2}:\d{2}:\d{2}\]",
        r"https?://\S+",
        r"(?i)www\.[\w.]+",
        r"(?i)\.com\b",
        r"(?i)\bcom\b",
        r"(?i)\bwww\b",
        r"(?i)\bw\s+w\s+w\b",
    ]
    .iter()
    .map(|p| (Regex::new(p).unwrap(), ""))
    .collect();

    for (wrong, right) in OCR_TYPOS {
        rules.push((
            Regex::new(&format!(r"\b{}\b", regex::escape(wrong))).unwrap(),
            *right,
        ));
    }

    for p in [
        r"(?i)underscore",
        r"\d+\.\d+",
        r"(?i)\[music\]",
        r"(?i)\[applause\]",
        r"(?i)\[laughter\]",
        r"(?i)webvtt",
        r"(?i)kind:",
        r"(?i)language:",
        r#"[^\w\s.,!?;:'"-]"#,
    ] {
        rules.push((Regex::new(p).unwrap(), ""));
    }
    rules
});

static RE_SPACES: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());

/// Reduced cleanup for raw OCR output: timestamps, watermark fragments,
/// common speech-bubble typos, transcript labels and stray symbols.
pub fn clean_text(input: &str) -> String {
    let mut text = input.to_string();
    for (re, replacement) in OCR_RULES.iter() {
        text = re.replace_all(&text, *replacement).into_owned();
    }
    RE_SPACES.replace_all(&text, " ").trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_bracketed_narrator_tag() {
        assert_eq!(sanitize("[NARRATOR] Once upon a time"), "Once upon a time");
    }

    #[test]
    fn strips_bracketed_tag_any_case() {
        assert_eq!(sanitize("[male] I am here."), "I am here.");
    }

    #[test]
    fn strips_bare_tags_with_colon() {
        assert_eq!(
            sanitize("NARRATOR: The owl sat in a bowl."),
            "The owl sat in a bowl."
        );
        assert_eq!(sanitize("MALE2 Ok then we go"), "Ok then we go");
    }

    #[test]
    fn removes_underscores_and_watermarks() {
        assert_eq!(
            sanitize("Mouse wants to become_King www.com"),
            "Mouse wants to become King"
        );
        assert_eq!(
            sanitize("Thank you for watching iskcondesiretree.com"),
            "Thank you for watching"
        );
        assert_eq!(
            sanitize("Visit https://example.com/x now. Great"),
            "Visit now. Great"
        );
    }

    #[test]
    fn repairs_exclamations_read_as_l() {
        assert_eq!(sanitize("Wow l What a nice hatl"), "Wow! What a nice hat!");
    }

    #[test]
    fn keeps_real_words_ending_in_l() {
        let text = "The owl sat in a bowl. It was a real wonderful call.";
        assert_eq!(sanitize(text), text);
    }

    #[test]
    fn keeps_w_and_y_words_ending_in_l() {
        for text in [
            "The baby began to bawl. The king wore a cowl.",
            "The city began to sprawl. The dog had a heavy jowl.",
            "He made a scrawl on the page. The boat went out to trawl.",
            "The cat let out a yowl.",
            "Cheryl and Daryl walked to the well.",
        ] {
            assert_eq!(sanitize(text), text);
        }
        assert_eq!(sanitize("Heyl there"), "Hey! there");
    }

    #[test]
    fn restores_ful_suffix() {
        assert_eq!(sanitize("It was wonderfu! there"), "It was wonderful there");
    }

    #[test]
    fn inserts_missing_pronoun_after_colon() {
        assert_eq!(
            sanitize("The king said: am hungry."),
            "The king said: I am hungry."
        );
    }

    #[test]
    fn capitalised_verbs_are_not_pronoun_repaired() {
        let text = "The small girl was beautiful. She will tell all!";
        assert_eq!(sanitize(text), text);
    }

    #[test]
    fn pronoun_phrase_fixes() {
        assert_eq!(sanitize("You I have come home"), "You have come home");
        assert_eq!(sanitize("let I have that"), "let me have that");
        assert_eq!(
            sanitize("can please I have some water"),
            "Can I please have some water"
        );
    }

    #[test]
    fn removes_capital_noise_and_fixes_known_words() {
        assert_eq!(sanitize("P M G Z taking was happy"), "the king was happy");
        assert_eq!(sanitize("The mussel ran away"), "The mouse ran away");
    }

    #[test]
    fn removes_digit_capital_mixtures() {
        assert_eq!(sanitize("A 12 B C came"), "A came");
    }

    #[test]
    fn removes_decimal_numbers() {
        assert_eq!(sanitize("Price 3.50 for it"), "Price for it");
    }

    #[test]
    fn fixes_spacing_around_punctuation() {
        assert_eq!(sanitize("He said ,hello .And left"), "He said, hello. And left");
        assert_eq!(sanitize("The king 's crown"), "The king's crown");
    }

    #[test]
    fn collapses_whitespace() {
        assert_eq!(sanitize("  Then  he \n\t left  "), "Then he left");
    }

    #[test]
    fn blank_input_is_empty() {
        assert_eq!(sanitize(""), "");
        assert_eq!(sanitize("   \n\t "), "");
    }

    #[test]
    fn clean_prose_is_unchanged() {
        let text = "Once upon a time there was a King. A king sits on a throne.";
        assert_eq!(sanitize(text), text);
    }

    #[test]
    fn clean_prose_is_stable() {
        let text = "Once upon a time there was a King. A king sits on a throne.";
        assert_eq!(sanitize(&sanitize(text)), sanitize(text));
    }

    const CLEAN_PROSE: &[&str] = &[
        "The owl began to howl. It was a wonderful call.",
        "The baby began to bawl. The king wore a cowl.",
        "Cheryl and Daryl walked to the well.",
        "\"Don't run!\" she cried. \"It's only a mouse.\"",
        "The sign read: Keep out of the castle.",
        "Will you stop? Am I late? Can you see the river?",
        "Who goes there?! Nobody answered.",
        "Wait\u{2026} the door is open.",
        "Once upon a time there was a King. He lived in a tall castle. Every morning he fed the birds.",
        "The wise old man smiled and said: Follow me, little one.",
        "I'll be there soon, and we'll share the meal.",
    ];

    #[test]
    fn clean_prose_corpus_is_unchanged() {
        for text in CLEAN_PROSE {
            assert_eq!(sanitize(text), *text, "rewrote {text:?}");
        }
    }

    #[test]
    fn sanitize_is_idempotent() {
        let rewritten = ["Wait... what?", "He paused... Then he spoke."];
        for text in CLEAN_PROSE.iter().chain(rewritten.iter()) {
            let once = sanitize(text);
            assert_eq!(sanitize(&once), once, "second pass changed {text:?}");
        }
        assert_eq!(sanitize("He paused... Then he spoke."), "He paused. Then he spoke.");
    }

    #[test]
    fn output_has_no_double_spaces_or_edges() {
        for input in [
            "[NARRATOR]   Once  upon ___ a time  ",
            "  www.example.com  ",
            "A   B   C  d e f  hello",
        ] {
            let out = sanitize(input);
            assert!(!out.contains("  "), "double space in {out:?}");
            assert_eq!(out, out.trim());
        }
    }

    #[test]
    fn stages_are_in_order() {
        let stages: Vec<Stage> = RULES.iter().map(|r| r.stage).collect();
        let mut sorted = stages.clone();
        sorted.sort();
        assert_eq!(stages, sorted);
        assert_eq!(stages.first(), Some(&Stage::SpeakerTags));
        assert_eq!(stages.last(), Some(&Stage::Whitespace));
    }

    #[test]
    fn clean_text_drops_timestamps_and_labels() {
        assert_eq!(
            clean_text("[00:01:02] [Music] Hello there"),
            "Hello there"
        );
    }

    #[test]
    fn clean_text_fixes_bubble_typos() {
        assert_eq!(clean_text("Wowl look at the hatl"), "Wow! look at the hat!");
    }

    #[test]
    fn clean_text_leaves_real_words() {
        assert_eq!(clean_text("A tall and dull tower"), "A tall and dull tower");
    }

    #[test]
    fn clean_text_strips_watermarks() {
        assert_eq!(clean_text("Visit www.site.com today"), "Visit today");
        assert_eq!(clean_text("w w w dot"), "dot");
    }
}
