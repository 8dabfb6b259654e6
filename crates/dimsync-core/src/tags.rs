//! Tag directive codec.
//!
//! The `tags` column is free text written by several tools. It holds either a
//! JSON array of strings (`["a","b"]`) or a comma-separated list (`a,b` or
//! `a, b`). Three case-insensitive tokens carry meaning for the worker:
//!
//! - `reprocess:<W>x<H>` manual override, W and H positive
//! - `reprocess` recompute dimensions from the source
//! - `processing-failed` terminal marker, only removed by an operator
//!
//! Tags are parsed once into a [`TagSet`] which remembers the shape it was
//! found in, so rewrites go back in the same format. The regex patterns below
//! are bound into the store's selection query and are also what the unit tests
//! check the in-process classifier against.

use crate::models::Dimensions;

/// Marker written when dimensions could not be determined.
pub const FAILED_TAG: &str = "processing-failed";

/// Bare reprocess directive.
pub const REPROCESS_TAG: &str = "reprocess";

const OVERRIDE_PREFIX: &str = "reprocess:";

/// Overrides with more significant digits than this are not recognized.
/// Nine digits always fit in a `u32`.
const MAX_OVERRIDE_DIGITS: usize = 9;

/// Matches a `processing-failed` token inside a raw tags value.
pub const FAILED_TAG_PATTERN: &str =
    r#"(^|[\[",[:space:]])processing-failed($|[\]",[:space:]])"#;

/// Matches a bare `reprocess` token inside a raw tags value.
pub const BARE_REPROCESS_PATTERN: &str = r#"(^|[\[",[:space:]])reprocess($|[\]",[:space:]])"#;

/// Matches a `reprocess:<W>x<H>` token with both terms positive.
pub const OVERRIDE_PATTERN: &str =
    r#"(^|[\[",[:space:]])reprocess:0*[1-9][0-9]{0,8}x0*[1-9][0-9]{0,8}($|[\]",[:space:]])"#;

/// How a tags value was written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TagShape {
    JsonArray,
    CommaList { spaced: bool },
}

/// Directive state of an asset, derived once from its tags.
///
/// Precedence: a failure marker wins over everything, then the first valid
/// override, then a bare reprocess.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TagState {
    Failed,
    Override(Dimensions),
    ReprocessRequested,
    NoDirective,
}

impl TagState {
    /// True for states whose directive must be cleared once handled.
    pub fn has_directive(&self) -> bool {
        matches!(self, TagState::Override(_) | TagState::ReprocessRequested)
    }

    pub fn label(&self) -> &'static str {
        match self {
            TagState::Failed => "failed",
            TagState::Override(_) => "override",
            TagState::ReprocessRequested => "reprocess",
            TagState::NoDirective => "none",
        }
    }
}

/// Ordered tag tokens plus the shape they were read from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagSet {
    tokens: Vec<String>,
    shape: TagShape,
}

impl Default for TagSet {
    fn default() -> Self {
        Self {
            tokens: Vec::new(),
            shape: TagShape::JsonArray,
        }
    }
}

impl TagSet {
    /// Parse a raw tags value.
    ///
    /// Values starting with `[` must be a JSON array of strings; anything else
    /// in that form is treated as empty. Empty tokens are dropped.
    pub fn parse(raw: Option<&str>) -> Self {
        let raw = match raw.map(str::trim) {
            Some(raw) if !raw.is_empty() => raw,
            _ => return Self::default(),
        };

        if raw.starts_with('[') {
            let tokens = serde_json::from_str::<Vec<String>>(raw)
                .map(|tokens| {
                    tokens
                        .into_iter()
                        .map(|t| t.trim().to_string())
                        .filter(|t| !t.is_empty())
                        .collect()
                })
                .unwrap_or_default();
            return Self {
                tokens,
                shape: TagShape::JsonArray,
            };
        }

        let tokens = raw
            .split(',')
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(str::to_string)
            .collect();
        Self {
            tokens,
            shape: TagShape::CommaList {
                spaced: raw.contains(", "),
            },
        }
    }

    /// Encode back into the remembered shape. `None` when no tokens remain.
    pub fn encode(&self) -> Option<String> {
        if self.tokens.is_empty() {
            return None;
        }
        match self.shape {
            TagShape::JsonArray => Some(serde_json::Value::from(self.tokens.clone()).to_string()),
            TagShape::CommaList { spaced: true } => Some(self.tokens.join(", ")),
            TagShape::CommaList { spaced: false } => Some(self.tokens.join(",")),
        }
    }

    pub fn tokens(&self) -> &[String] {
        &self.tokens
    }

    pub fn shape(&self) -> TagShape {
        self.shape
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    pub fn contains(&self, token: &str) -> bool {
        self.tokens.iter().any(|t| t.eq_ignore_ascii_case(token))
    }

    pub fn is_failed(&self) -> bool {
        self.contains(FAILED_TAG)
    }

    /// Classify the directives carried by this set.
    pub fn state(&self) -> TagState {
        if self.is_failed() {
            return TagState::Failed;
        }
        if let Some(dims) = self.tokens.iter().find_map(|t| parse_override(t)) {
            return TagState::Override(dims);
        }
        if self.contains(REPROCESS_TAG) {
            return TagState::ReprocessRequested;
        }
        TagState::NoDirective
    }

    pub fn push(&mut self, token: impl Into<String>) {
        self.tokens.push(token.into());
    }

    /// Remove every token matching the predicate.
    pub fn remove_where(&mut self, mut pred: impl FnMut(&str) -> bool) {
        self.tokens.retain(|t| !pred(t));
    }

    /// Remove bare `reprocess` and every `reprocess:<digits>x<digits>` token.
    pub fn remove_directives(&mut self) {
        self.remove_where(is_directive_token);
    }
}

/// Parse `reprocess:<W>x<H>` into positive dimensions.
fn parse_override(token: &str) -> Option<Dimensions> {
    let (width, height) = split_override(token)?;
    let width = parse_positive(width)?;
    let height = parse_positive(height)?;
    Dimensions::new(width, height)
}

/// Split an override token into its two digit runs, any magnitude.
fn split_override(token: &str) -> Option<(&str, &str)> {
    let prefix = token.get(..OVERRIDE_PREFIX.len())?;
    if !prefix.eq_ignore_ascii_case(OVERRIDE_PREFIX) {
        return None;
    }
    let (width, height) = token[OVERRIDE_PREFIX.len()..].split_once(['x', 'X'])?;
    let all_digits = |s: &str| !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit());
    if all_digits(width) && all_digits(height) {
        Some((width, height))
    } else {
        None
    }
}

fn parse_positive(digits: &str) -> Option<u32> {
    let significant = digits.trim_start_matches('0');
    if significant.is_empty() || significant.len() > MAX_OVERRIDE_DIGITS {
        return None;
    }
    significant.parse().ok()
}

fn is_directive_token(token: &str) -> bool {
    token.eq_ignore_ascii_case(REPROCESS_TAG) || split_override(token).is_some()
}

/// Drop consumed reprocess directives from a raw tags value.
///
/// Returns `None` when nothing remains.
pub fn clear_directives(tags: Option<&str>) -> Option<String> {
    let mut set = TagSet::parse(tags);
    set.remove_directives();
    set.encode()
}

/// Add the `processing-failed` marker, keeping the value's shape.
///
/// A value that already carries the marker is returned untouched.
pub fn mark_failed(tags: Option<&str>) -> Option<String> {
    let mut set = TagSet::parse(tags);
    if set.is_failed() {
        return tags.map(str::to_string);
    }
    if set.is_empty() {
        set = TagSet::default();
    }
    set.push(FAILED_TAG);
    set.encode()
}

#[cfg(test)]
mod tests {
    use super::*;
    use regex::RegexBuilder;

    fn matches(pattern: &str, value: &str) -> bool {
        RegexBuilder::new(pattern)
            .case_insensitive(true)
            .build()
            .unwrap()
            .is_match(value)
    }

    #[test]
    fn parse_remembers_shape() {
        assert_eq!(TagSet::parse(None).shape(), TagShape::JsonArray);
        assert_eq!(TagSet::parse(Some("  ")).shape(), TagShape::JsonArray);
        assert_eq!(
            TagSet::parse(Some(r#"["a", "b"]"#)).shape(),
            TagShape::JsonArray
        );
        assert_eq!(
            TagSet::parse(Some("a,b")).shape(),
            TagShape::CommaList { spaced: false }
        );
        assert_eq!(
            TagSet::parse(Some("a, b")).shape(),
            TagShape::CommaList { spaced: true }
        );
    }

    #[test]
    fn malformed_array_is_empty() {
        let set = TagSet::parse(Some(r#"["reprocess", 3"#));
        assert!(set.is_empty());
        assert_eq!(set.state(), TagState::NoDirective);
        assert_eq!(clear_directives(Some("[not json")), None);
    }

    #[test]
    fn classification_precedence() {
        let dims = Dimensions::new(1920, 1080).unwrap();
        assert_eq!(
            TagSet::parse(Some("reprocess:1920x1080")).state(),
            TagState::Override(dims)
        );
        assert_eq!(
            TagSet::parse(Some(r#"["reprocess","REPROCESS:1920X1080"]"#)).state(),
            TagState::Override(dims)
        );
        assert_eq!(
            TagSet::parse(Some("reprocess:1920x1080, processing-failed")).state(),
            TagState::Failed
        );
        assert_eq!(
            TagSet::parse(Some("Reprocess")).state(),
            TagState::ReprocessRequested
        );
        assert_eq!(
            TagSet::parse(Some("featured, hero")).state(),
            TagState::NoDirective
        );
    }

    #[test]
    fn malformed_overrides_are_not_directives() {
        for raw in [
            "reprocess:abcxdef",
            "reprocess:0x720",
            "reprocess:1280x0",
            "reprocess:1280",
            "reprocess:x720",
            "reprocess:12345678901x720",
        ] {
            assert_eq!(
                TagSet::parse(Some(raw)).state(),
                TagState::NoDirective,
                "{raw}"
            );
        }
        // leading zeros are still positive
        assert_eq!(
            TagSet::parse(Some("reprocess:0640x0480")).state(),
            TagState::Override(Dimensions::new(640, 480).unwrap())
        );
        // malformed override next to a bare directive falls through to reprocess
        assert_eq!(
            TagSet::parse(Some("reprocess:0x720,reprocess")).state(),
            TagState::ReprocessRequested
        );
    }

    #[test]
    fn clear_directives_preserves_shape_and_other_tokens() {
        assert_eq!(
            clear_directives(Some(r#"["hero","reprocess:1920x1080"]"#)),
            Some(r#"["hero"]"#.to_string())
        );
        assert_eq!(
            clear_directives(Some("hero, reprocess, promo")),
            Some("hero, promo".to_string())
        );
        assert_eq!(
            clear_directives(Some("hero,reprocess:0x720")),
            Some("hero".to_string())
        );
        assert_eq!(
            clear_directives(Some("reprocess:abcxdef,reprocess")),
            Some("reprocess:abcxdef".to_string())
        );
        assert_eq!(clear_directives(Some("reprocess:1920x1080")), None);
        assert_eq!(clear_directives(Some(",,")), None);
        assert_eq!(clear_directives(None), None);
    }

    #[test]
    fn clear_directives_is_idempotent() {
        for raw in [
            r#"["hero", "reprocess", "b"]"#,
            "a, reprocess:10x10, b",
            "a,b",
            "reprocess",
            "[broken",
        ] {
            let once = clear_directives(Some(raw));
            let twice = clear_directives(once.as_deref());
            assert_eq!(once, twice, "{raw}");
        }
    }

    #[test]
    fn mark_failed_appends_once_in_shape() {
        assert_eq!(mark_failed(None), Some(r#"["processing-failed"]"#.to_string()));
        assert_eq!(
            mark_failed(Some("")),
            Some(r#"["processing-failed"]"#.to_string())
        );
        assert_eq!(
            mark_failed(Some("hero, promo")),
            Some("hero, promo, processing-failed".to_string())
        );
        assert_eq!(
            mark_failed(Some(r#"["hero"]"#)),
            Some(r#"["hero","processing-failed"]"#.to_string())
        );
        // already failed values come back byte for byte
        assert_eq!(
            mark_failed(Some("hero ,  PROCESSING-FAILED")),
            Some("hero ,  PROCESSING-FAILED".to_string())
        );

        let once = mark_failed(Some("a,b"));
        assert_eq!(mark_failed(once.as_deref()), once);
    }

    #[test]
    fn mark_failed_after_clear_drops_directive() {
        let cleared = clear_directives(Some("reprocess"));
        assert_eq!(
            mark_failed(cleared.as_deref()),
            Some(r#"["processing-failed"]"#.to_string())
        );
    }

    #[test]
    fn store_patterns_agree_with_classifier() {
        let cases = [
            r#"["processing-failed"]"#,
            "hero, processing-failed",
            "processing-failed,reprocess",
            r#"["reprocess"]"#,
            "hero,reprocess",
            "REPROCESS",
            "reprocess:1920x1080",
            r#"["hero","reprocess:0640x480"]"#,
            "reprocess:0x720",
            "reprocess:abcxdef",
            "reprocess:12345678901x720",
            "reprocessing",
            "prereprocess",
            "hero, promo",
            "",
        ];
        for raw in cases {
            let state = TagSet::parse(Some(raw)).state();
            let failed = matches(FAILED_TAG_PATTERN, raw);
            let bare = matches(BARE_REPROCESS_PATTERN, raw);
            let over = matches(OVERRIDE_PATTERN, raw);

            assert_eq!(failed, state == TagState::Failed, "{raw}");
            if !failed {
                assert_eq!(over, matches!(state, TagState::Override(_)), "{raw}");
                if !over {
                    assert_eq!(bare, state == TagState::ReprocessRequested, "{raw}");
                }
            }
        }
    }
}
