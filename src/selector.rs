//! Element queries used by the widget state machine.
//!
//! Frames are driven through [`Selector`] values rather than raw CSS strings
//! so the same query works against any automation backend, and so localized
//! labels resolve regardless of the displayed language.

use std::fmt;
use std::sync::Arc;

use regex::Regex;

/// ARIA role used for role-based lookups.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Button,
    Checkbox,
    Link,
    Textbox,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Role::Button => "button",
            Role::Checkbox => "checkbox",
            Role::Link => "link",
            Role::Textbox => "textbox",
        };
        f.write_str(label)
    }
}

/// An anchored pattern matching any localized variant of a widget label.
#[derive(Clone)]
pub struct TextPattern {
    regex: Arc<Regex>,
}

impl TextPattern {
    /// Compile a pattern that matches exactly one of the given variants.
    ///
    /// Variants are escaped, so the table entries are plain strings, not
    /// regex fragments.
    pub fn any_of(variants: &[&str]) -> Self {
        let alternation = variants
            .iter()
            .map(|variant| regex::escape(variant))
            .collect::<Vec<_>>()
            .join("|");
        let pattern = format!("^(?:{alternation})$");
        // The alternation is built from escaped literals only.
        let regex = Regex::new(&pattern).unwrap_or_else(|_| Regex::new("$^").unwrap());
        Self {
            regex: Arc::new(regex),
        }
    }

    pub fn matches(&self, text: &str) -> bool {
        self.regex.is_match(text.trim())
    }

    pub fn as_str(&self) -> &str {
        self.regex.as_str()
    }
}

impl fmt::Debug for TextPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("TextPattern").field(&self.as_str()).finish()
    }
}

impl fmt::Display for TextPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A query resolving to one element (or, for [`Selector::Css`], a list the
/// caller narrows with [`Selector::nth`]).
#[derive(Debug, Clone)]
pub enum Selector {
    /// Element with the given ARIA role whose accessible name matches the
    /// pattern.
    Role { role: Role, name: TextPattern },
    /// Element whose visible text matches the pattern.
    Text(TextPattern),
    /// Elements matching a CSS selector.
    Css(String),
    /// The n-th element (0-based) of the matches for the inner selector.
    Nth(Box<Selector>, usize),
    /// An element matching the child selector inside the parent's subtree.
    Within(Box<Selector>, Box<Selector>),
}

impl Selector {
    pub fn role(role: Role, name: TextPattern) -> Self {
        Selector::Role { role, name }
    }

    pub fn text(pattern: TextPattern) -> Self {
        Selector::Text(pattern)
    }

    pub fn css(selector: impl Into<String>) -> Self {
        Selector::Css(selector.into())
    }

    pub fn nth(self, index: usize) -> Self {
        Selector::Nth(Box::new(self), index)
    }

    pub fn within(self, child: Selector) -> Self {
        Selector::Within(Box::new(self), Box::new(child))
    }
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Selector::Role { role, name } => write!(f, "role={role}[name~{name}]"),
            Selector::Text(pattern) => write!(f, "text~{pattern}"),
            Selector::Css(css) => write!(f, "css={css}"),
            Selector::Nth(inner, index) => write!(f, "{inner} >> nth={index}"),
            Selector::Within(parent, child) => write!(f, "{parent} >> {child}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pattern_matches_any_variant_anchored() {
        let pattern = TextPattern::any_of(&["Verify", "Подтвердить", "验证"]);
        assert!(pattern.matches("Verify"));
        assert!(pattern.matches("Подтвердить"));
        assert!(pattern.matches("  验证  "));
        assert!(!pattern.matches("Verify now"));
        assert!(!pattern.matches("reVerify"));
    }

    #[test]
    fn pattern_escapes_regex_metacharacters() {
        let pattern = TextPattern::any_of(&["Treppen(stufen)"]);
        assert!(pattern.matches("Treppen(stufen)"));
        assert!(!pattern.matches("Treppenstufen"));
    }

    #[test]
    fn selector_display_is_readable() {
        let sel = Selector::css(".rc-imageselect-tile").nth(3);
        assert_eq!(sel.to_string(), "css=.rc-imageselect-tile >> nth=3");
    }
}
