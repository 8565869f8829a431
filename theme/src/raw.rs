//! Raw theme payloads as produced by theme loaders

use serde::Deserialize;

/// An ordered list of raw theme settings.
///
/// This is the wire shape handed over by theme loaders; parsing it into
/// ranked rules happens in [`crate::theme::parse_theme`].
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawTheme {
    pub name: Option<String>,
    #[serde(default)]
    pub settings: Vec<RawThemeSetting>,
}

/// One entry of the settings list: a scope selector plus a style payload.
///
/// Entries without a style payload are ignored during parsing.
#[derive(Debug, Clone, Deserialize)]
pub struct RawThemeSetting {
    #[serde(default)]
    pub scope: Option<ScopeSelector>,
    #[serde(default)]
    pub settings: Option<RawStyle>,
}

/// A scope selector: either a single comma/space-separated selector string
/// or an explicit list of selector strings.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum ScopeSelector {
    Single(String),
    Many(Vec<String>),
}

/// The style payload of a raw setting.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawStyle {
    pub font_style: Option<String>,
    pub foreground: Option<String>,
    pub background: Option<String>,
}

/// Whether `hex` is a valid `#rgb`, `#rgba`, `#rrggbb` or `#rrggbbaa` color.
pub fn is_valid_hex_color(hex: &str) -> bool {
    if !matches!(hex.len(), 4 | 5 | 7 | 9) {
        return false;
    }
    let mut chars = hex.chars();
    if chars.next() != Some('#') {
        return false;
    }
    chars.all(|c| c.is_ascii_hexdigit())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hex_color_validation() {
        assert!(is_valid_hex_color("#fff"));
        assert!(is_valid_hex_color("#fffa"));
        assert!(is_valid_hex_color("#FF0000"));
        assert!(is_valid_hex_color("#ff0000aa"));
        assert!(!is_valid_hex_color(""));
        assert!(!is_valid_hex_color("#ff00"));
        assert!(!is_valid_hex_color("ff0000"));
        assert!(!is_valid_hex_color("#ff00zz"));
        assert!(!is_valid_hex_color("#ff0000 "));
    }

    #[test]
    fn test_deserialize_single_selector() {
        let raw: RawThemeSetting = serde_json::from_str(
            r##"{"scope": "keyword, storage", "settings": {"foreground": "#ff0000"}}"##,
        )
        .expect("valid setting");
        assert_eq!(
            raw.scope,
            Some(ScopeSelector::Single("keyword, storage".into()))
        );
        let settings = raw.settings.expect("style payload");
        assert_eq!(settings.foreground.as_deref(), Some("#ff0000"));
    }

    #[test]
    fn test_deserialize_selector_list_and_font_style() {
        let raw: RawThemeSetting = serde_json::from_str(
            r##"{"scope": ["string", "comment"], "settings": {"fontStyle": "italic bold"}}"##,
        )
        .expect("valid setting");
        assert_eq!(
            raw.scope,
            Some(ScopeSelector::Many(vec![
                "string".into(),
                "comment".into()
            ]))
        );
        let settings = raw.settings.expect("style payload");
        assert_eq!(settings.font_style.as_deref(), Some("italic bold"));
    }

    #[test]
    fn test_deserialize_settings_without_scope() {
        let raw: RawTheme = serde_json::from_str(
            r##"{"settings": [{"settings": {"foreground": "#111111", "background": "#222222"}}]}"##,
        )
        .expect("valid theme");
        assert_eq!(raw.settings.len(), 1);
        assert!(raw.settings[0].scope.is_none());
    }
}
