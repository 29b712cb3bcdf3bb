use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

use thiserror::Error;

use crate::domain::task::Task;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("invalid color `{0}` (expected #rrggbb, #rgb, or a basic color name)")]
pub struct ColorParseError(pub String);

impl Color {
    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    pub fn to_array(self) -> [u8; 3] {
        [self.r, self.g, self.b]
    }

    /// Relative luminance on a 0..=255 scale, used to pick label contrast.
    pub fn luminance(self) -> f32 {
        0.2126 * f32::from(self.r) + 0.7152 * f32::from(self.g) + 0.0722 * f32::from(self.b)
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
    }
}

impl FromStr for Color {
    type Err = ColorParseError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let trimmed = value.trim();
        if let Some(named) = named_color(&trimmed.to_ascii_lowercase()) {
            return Ok(named);
        }

        let hex = trimmed.strip_prefix('#').unwrap_or(trimmed);
        if !hex.bytes().all(|byte| byte.is_ascii_hexdigit()) {
            return Err(ColorParseError(value.to_owned()));
        }

        let channel = |digits: &str| u8::from_str_radix(digits, 16).ok();
        let parsed = match hex.len() {
            6 => channel(&hex[0..2])
                .zip(channel(&hex[2..4]))
                .zip(channel(&hex[4..6]))
                .map(|((r, g), b)| Color::rgb(r, g, b)),
            3 => {
                let expand = |index: usize| channel(&hex[index..=index]).map(|v| v * 17);
                expand(0).zip(expand(1)).zip(expand(2)).map(|((r, g), b)| Color::rgb(r, g, b))
            }
            _ => None,
        };

        parsed.ok_or_else(|| ColorParseError(value.to_owned()))
    }
}

fn named_color(name: &str) -> Option<Color> {
    Some(match name {
        "blue" => Color::rgb(0x34, 0x98, 0xdb),
        "red" => Color::rgb(0xe7, 0x4c, 0x3c),
        "green" => Color::rgb(0x2e, 0xcc, 0x71),
        "purple" => Color::rgb(0x9b, 0x59, 0xb6),
        "orange" => Color::rgb(0xf3, 0x9c, 0x12),
        "teal" => Color::rgb(0x1a, 0xbc, 0x9c),
        "pink" => Color::rgb(0xe9, 0x1e, 0x63),
        "gray" | "grey" => Color::rgb(0x95, 0xa5, 0xa6),
        "black" => Color::rgb(0, 0, 0),
        "white" => Color::rgb(0xff, 0xff, 0xff),
        _ => return None,
    })
}

pub const DEFAULT_PALETTE: [Color; 10] = [
    Color::rgb(0x34, 0x98, 0xdb),
    Color::rgb(0xe7, 0x4c, 0x3c),
    Color::rgb(0x2e, 0xcc, 0x71),
    Color::rgb(0x9b, 0x59, 0xb6),
    Color::rgb(0xf3, 0x9c, 0x12),
    Color::rgb(0x1a, 0xbc, 0x9c),
    Color::rgb(0xe9, 0x1e, 0x63),
    Color::rgb(0x00, 0xbc, 0xd4),
    Color::rgb(0xff, 0x98, 0x00),
    Color::rgb(0x60, 0x7d, 0x8b),
];

pub const NEUTRAL_COLOR: Color = Color::rgb(0x95, 0xa5, 0xa6);

/// Category colors for one render: configured entries first, then the default
/// palette cycled over the remaining category names in sorted order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ColorAssignment {
    by_category: BTreeMap<String, Color>,
    uncategorized: Color,
}

impl ColorAssignment {
    pub fn resolve(
        tasks: &[Task],
        configured: &BTreeMap<String, Color>,
        uncategorized: Color,
    ) -> Self {
        let unmapped: BTreeSet<&str> = tasks
            .iter()
            .filter_map(|task| task.category.as_deref())
            .filter(|category| !configured.contains_key(*category))
            .collect();

        let mut by_category = configured.clone();
        for (index, category) in unmapped.into_iter().enumerate() {
            by_category.insert(category.to_owned(), DEFAULT_PALETTE[index % DEFAULT_PALETTE.len()]);
        }

        Self { by_category, uncategorized }
    }

    pub fn color_for(&self, task: &Task) -> Color {
        task.category
            .as_deref()
            .and_then(|category| self.by_category.get(category).copied())
            .unwrap_or(self.uncategorized)
    }
}
