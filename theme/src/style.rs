//! Font style flags and resolved style attributes

use bitflags::bitflags;
use std::fmt;

bitflags! {
    /// Font style bitmask for a theme rule.
    ///
    /// An empty set is the explicit "no styling" value. "Not set" (inherit
    /// from the surrounding context) is modeled as `Option::<FontStyle>::None`
    /// wherever the distinction matters.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct FontStyle: u8 {
        const ITALIC = 1;
        const BOLD = 2;
        const UNDERLINE = 4;
        const STRIKETHROUGH = 8;
    }
}

impl fmt::Display for FontStyle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return f.write_str("none");
        }
        let mut first = true;
        for (name, flag) in [
            ("italic", FontStyle::ITALIC),
            ("bold", FontStyle::BOLD),
            ("underline", FontStyle::UNDERLINE),
            ("strikethrough", FontStyle::STRIKETHROUGH),
        ] {
            if self.contains(flag) {
                if !first {
                    f.write_str(" ")?;
                }
                f.write_str(name)?;
                first = false;
            }
        }
        Ok(())
    }
}

/// Identifier of an interned color in a [`crate::ColorMap`].
///
/// Ids are 1-based; [`ColorId::NONE`] (0) means "no color" / inherit.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ColorId(pub u32);

impl ColorId {
    pub const NONE: ColorId = ColorId(0);

    pub fn is_none(self) -> bool {
        self == Self::NONE
    }
}

/// The resolved style for a scope: font style plus foreground/background
/// color ids.
///
/// `font_style == None` and [`ColorId::NONE`] fields mean "inherit from the
/// context default". Equality is structural.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StyleAttributes {
    pub font_style: Option<FontStyle>,
    pub foreground: ColorId,
    pub background: ColorId,
}

impl StyleAttributes {
    pub fn new(font_style: Option<FontStyle>, foreground: ColorId, background: ColorId) -> Self {
        Self {
            font_style,
            foreground,
            background,
        }
    }
}
