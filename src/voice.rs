//! Speaker roles, the fixed voice table, and role classification.
//!
//! One voice narrates a whole comic: [`classify`] runs once over the final
//! sanitized narration and its role picks the [`VoiceProfile`]. The tag
//! vocabulary in [`SPEAKER_TAGS`] is shared by the sanitizer (which strips
//! tags before synthesis) and the caption display rule in
//! [`crate::records::strip_voice_tags`], so both always agree on what a tag is.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Role tags that may appear in extracted or stored text.
///
/// `MALE2` has no voice of its own; it only exists as a tag to strip.
pub const SPEAKER_TAGS: &[&str] = &["NARRATOR", "MALE", "MALE2", "FEMALE", "CHILD", "OLD_MALE"];

/// Regex alternation over [`SPEAKER_TAGS`], longest first.
pub(crate) fn speaker_tag_alternation() -> String {
    let mut tags: Vec<&str> = SPEAKER_TAGS.to_vec();
    tags.sort_by(|a, b| b.len().cmp(&a.len()).then(a.cmp(b)));
    tags.join("|")
}

/// Voice role inferred from the narration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpeakerRole {
    #[default]
    Narrator,
    Male,
    Female,
    Child,
    OldMale,
}

impl SpeakerRole {
    pub fn as_str(self) -> &'static str {
        match self {
            SpeakerRole::Narrator => "narrator",
            SpeakerRole::Male => "male",
            SpeakerRole::Female => "female",
            SpeakerRole::Child => "child",
            SpeakerRole::OldMale => "old_male",
        }
    }
}

impl fmt::Display for SpeakerRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A role and the neural voice that speaks it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct VoiceProfile {
    pub role: SpeakerRole,
    pub voice_id: &'static str,
}

/// The fixed role → voice mapping.
pub const VOICE_TABLE: [VoiceProfile; 5] = [
    // Warm storytelling voice.
    VoiceProfile {
        role: SpeakerRole::Narrator,
        voice_id: "en-US-AriaNeural",
    },
    VoiceProfile {
        role: SpeakerRole::Male,
        voice_id: "en-US-GuyNeural",
    },
    VoiceProfile {
        role: SpeakerRole::Female,
        voice_id: "en-US-JennyNeural",
    },
    VoiceProfile {
        role: SpeakerRole::Child,
        voice_id: "en-US-AmberNeural",
    },
    VoiceProfile {
        role: SpeakerRole::OldMale,
        voice_id: "en-US-RogerNeural",
    },
];

/// Look up the voice for `role`.
pub fn voice_for(role: SpeakerRole) -> &'static VoiceProfile {
    VOICE_TABLE
        .iter()
        .find(|v| v.role == role)
        .unwrap_or(&VOICE_TABLE[0])
}

// ── Classification ───────────────────────────────────────────────────────────
//
// Whole-word matching over lowercased text. A plain substring test would let
// "woman" count as "man" and "told" count as "old".

static RE_MALE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b(?:king|minister|lord|sir|man)s?\b").unwrap());
static RE_ELDER: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b(?:old|sage|wise)\b").unwrap());
static RE_FEMALE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b(?:queens?|lady|ladies|wom[ae]n|she)\b").unwrap());
static RE_CHILD: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b(?:mouse|mice|chu\s+chu|little|small|child|children)\b").unwrap()
});
static RE_NARRATIVE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b(?:once\s+upon|then|after|meanwhile)\b").unwrap());

/// Infer the voice role for a whole narration. First match wins:
/// male nouns (refined to old male by old/sage/wise), female nouns,
/// child/smallness nouns, narrative transitions, then narrator.
pub fn classify(text: &str) -> SpeakerRole {
    let lower = text.to_lowercase();

    if RE_MALE.is_match(&lower) {
        if RE_ELDER.is_match(&lower) {
            return SpeakerRole::OldMale;
        }
        return SpeakerRole::Male;
    }
    if RE_FEMALE.is_match(&lower) {
        return SpeakerRole::Female;
    }
    if RE_CHILD.is_match(&lower) {
        return SpeakerRole::Child;
    }
    if RE_NARRATIVE.is_match(&lower) {
        return SpeakerRole::Narrator;
    }
    SpeakerRole::Narrator
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn queen_without_male_nouns_is_female() {
        assert_eq!(
            classify("The queen walked through her garden."),
            SpeakerRole::Female
        );
    }

    #[test]
    fn little_mouse_is_child() {
        assert_eq!(
            classify("The little mouse wanted some cheese."),
            SpeakerRole::Child
        );
    }

    #[test]
    fn no_cues_is_narrator() {
        assert_eq!(classify("It rained all day."), SpeakerRole::Narrator);
        assert_eq!(classify(""), SpeakerRole::Narrator);
    }

    #[test]
    fn king_is_male() {
        assert_eq!(
            classify("Once upon a time there was a King."),
            SpeakerRole::Male
        );
    }

    #[test]
    fn wise_king_is_old_male() {
        assert_eq!(
            classify("The wise king spoke to his people."),
            SpeakerRole::OldMale
        );
    }

    #[test]
    fn male_nouns_win_over_female_nouns() {
        assert_eq!(
            classify("The king and the queen sat together."),
            SpeakerRole::Male
        );
    }

    #[test]
    fn woman_does_not_count_as_man() {
        assert_eq!(
            classify("A woman opened the door."),
            SpeakerRole::Female
        );
    }

    #[test]
    fn told_does_not_count_as_old() {
        assert_eq!(classify("The man told a story."), SpeakerRole::Male);
    }

    #[test]
    fn plural_nouns_match() {
        assert_eq!(classify("Two kings met."), SpeakerRole::Male);
    }

    #[test]
    fn voice_table_covers_every_role() {
        for role in [
            SpeakerRole::Narrator,
            SpeakerRole::Male,
            SpeakerRole::Female,
            SpeakerRole::Child,
            SpeakerRole::OldMale,
        ] {
            assert_eq!(voice_for(role).role, role);
        }
        assert_eq!(voice_for(SpeakerRole::Male).voice_id, "en-US-GuyNeural");
    }

    #[test]
    fn tag_alternation_puts_longer_tags_first() {
        let alt = speaker_tag_alternation();
        let male2 = alt.find("MALE2").unwrap();
        let male = alt.find("|MALE|").unwrap();
        assert!(male2 < male, "got {alt}");
    }

    #[test]
    fn role_serialises_snake_case() {
        let json = serde_json::to_string(&SpeakerRole::OldMale).unwrap();
        assert_eq!(json, "\"old_male\"");
    }
}
