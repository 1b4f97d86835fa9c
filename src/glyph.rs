use std::fmt;

/// Number of distinct selector glyphs (regional indicators A..Z).
pub const GLYPH_SPACE: usize = 26;

const REGIONAL_INDICATOR_A: u32 = 0x1F1E6;

pub const CONFIRM: &str = "\u{2705}";
pub const CANCEL: &str = "\u{274C}";
pub const ACCEPT_ALL: &str = "\u{1F44D}";

/// A reaction the curation engine understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Glyph {
    /// Vote for the comment at this index.
    Selector(usize),
    Confirm,
    Cancel,
    AcceptAll,
}

impl Glyph {
    pub fn controls() -> [Glyph; 3] {
        [Glyph::Confirm, Glyph::Cancel, Glyph::AcceptAll]
    }

    /// Selector glyphs for the first `n` comments followed by the control glyphs,
    /// in the order they are attached to the ballot message.
    pub fn ballot_set(n: usize) -> Vec<Glyph> {
        (0..n)
            .map(Glyph::Selector)
            .chain(Glyph::controls())
            .collect()
    }

    /// Emoji sent to the chat platform.
    pub fn emoji(&self) -> String {
        match self {
            Glyph::Selector(i) => selector_emoji(*i),
            Glyph::Confirm => CONFIRM.to_string(),
            Glyph::Cancel => CANCEL.to_string(),
            Glyph::AcceptAll => ACCEPT_ALL.to_string(),
        }
    }

    /// Recognises an emoji as one of the glyphs of a ballot with `n` comments.
    /// Selectors beyond `n` are not part of the ballot and yield `None`.
    pub fn parse(emoji: &str, n: usize) -> Option<Glyph> {
        match emoji {
            CONFIRM => return Some(Glyph::Confirm),
            CANCEL => return Some(Glyph::Cancel),
            ACCEPT_ALL => return Some(Glyph::AcceptAll),
            _ => {}
        }
        let mut chars = emoji.chars();
        let c = chars.next()?;
        if chars.next().is_some() {
            return None;
        }
        let index = (c as u32).checked_sub(REGIONAL_INDICATOR_A)? as usize;
        (index < n.min(GLYPH_SPACE)).then_some(Glyph::Selector(index))
    }
}

impl fmt::Display for Glyph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.emoji())
    }
}

/// Regional indicator symbol for index `i`.
fn selector_emoji(i: usize) -> String {
    debug_assert!(i < GLYPH_SPACE);
    char::from_u32(REGIONAL_INDICATOR_A + i as u32)
        .map(String::from)
        .unwrap_or_default()
}

/// Letter shown next to comment `i` in the ballot text.
pub fn selector_label(i: usize) -> String {
    char::from(b'A' + (i % GLYPH_SPACE) as u8).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn selector_glyphs_are_unique_and_stable() {
        for n in 0..=crate::ballot::MAX_COMMENTS {
            let set = Glyph::ballot_set(n);
            assert_eq!(set.len(), n + 3);
            let emojis: HashSet<String> = set.iter().map(Glyph::emoji).collect();
            assert_eq!(emojis.len(), n + 3);
            assert_eq!(set, Glyph::ballot_set(n));
        }
        assert_eq!(Glyph::Selector(0).emoji(), "\u{1F1E6}");
        assert_eq!(Glyph::Selector(2).emoji(), "\u{1F1E8}");
    }

    #[test]
    fn parse_inverts_emoji() {
        for glyph in Glyph::ballot_set(17) {
            assert_eq!(Glyph::parse(&glyph.emoji(), 17), Some(glyph));
        }
    }

    #[test]
    fn parse_ignores_foreign_emoji() {
        assert_eq!(Glyph::parse("\u{1F600}", 4), None);
        assert_eq!(Glyph::parse("A", 4), None);
        assert_eq!(Glyph::parse("", 4), None);
        // selector for index 4 is outside a 4-comment ballot
        assert_eq!(Glyph::parse(&Glyph::Selector(4).emoji(), 4), None);
        // flag sequences are two indicators, not one selector
        assert_eq!(Glyph::parse("\u{1F1FA}\u{1F1F8}", 26), None);
    }

    #[test]
    fn labels_are_letters() {
        assert_eq!(selector_label(0), "A");
        assert_eq!(selector_label(16), "Q");
    }
}
