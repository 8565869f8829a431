//! Color string interning with frozen and growable modes

use crate::style::ColorId;
use rustc_hash::FxHashMap;
use snafu::Snafu;

/// Errors that can occur while resolving theme colors
#[derive(Debug, Snafu)]
pub enum ColorMapError {
    /// A frozen color map was asked for a color it was not seeded with.
    /// This indicates a corrupt theme/color-table pairing and is not retried.
    #[snafu(display("Missing color in frozen color map: {color}"))]
    MissingColorInFrozenMap { color: String },
}

/// Interns color strings to small 1-based ids.
///
/// Index 0 is reserved and unused so that [`ColorId::NONE`] can mean
/// "no color". Colors are normalized to ASCII uppercase, making lookups
/// case-insensitive. A frozen map (built from an externally supplied color
/// table) rejects unknown colors; a growable map assigns the next sequential
/// id on demand.
#[derive(Debug, Default)]
pub struct ColorMap {
    frozen: bool,
    last_id: u32,
    id_to_color: Vec<String>,
    color_to_id: FxHashMap<String, u32>,
}

impl ColorMap {
    /// Create a growable color map.
    pub fn new() -> Self {
        Self {
            frozen: false,
            last_id: 0,
            id_to_color: vec![String::new()],
            color_to_id: FxHashMap::default(),
        }
    }

    /// Create a frozen color map pre-seeded with `colors`, assigning ids
    /// `1..=colors.len()` in order.
    pub fn frozen<I, S>(colors: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut map = Self::new();
        map.frozen = true;
        for color in colors {
            let normalized = color.as_ref().to_ascii_uppercase();
            map.last_id += 1;
            map.color_to_id.insert(normalized.clone(), map.last_id);
            map.id_to_color.push(normalized);
        }
        map
    }

    /// Look up (or, in growable mode, assign) the id for a color.
    ///
    /// `None` always maps to [`ColorId::NONE`].
    pub fn get_id(&mut self, color: Option<&str>) -> Result<ColorId, ColorMapError> {
        let Some(color) = color else {
            return Ok(ColorId::NONE);
        };

        let normalized = color.to_ascii_uppercase();
        if let Some(&id) = self.color_to_id.get(&normalized) {
            return Ok(ColorId(id));
        }

        if self.frozen {
            return Err(ColorMapError::MissingColorInFrozenMap { color: normalized });
        }

        self.last_id += 1;
        self.color_to_id.insert(normalized.clone(), self.last_id);
        self.id_to_color.push(normalized);
        Ok(ColorId(self.last_id))
    }

    /// The ordered color table, including the reserved empty slot at index 0.
    pub fn colors(&self) -> &[String] {
        &self.id_to_color
    }

    /// Resolve an id back to its color string.
    pub fn lookup(&self, id: ColorId) -> Option<&str> {
        if id.is_none() {
            return None;
        }
        self.id_to_color.get(id.0 as usize).map(String::as_str)
    }
}

impl PartialEq for ColorMap {
    fn eq(&self, other: &Self) -> bool {
        self.last_id == other.last_id && self.color_to_id == other.color_to_id
    }
}

impl Eq for ColorMap {}
