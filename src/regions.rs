//! Named face regions and the landmark outlines that define them.
//!
//! Indices refer to the 468-point face mesh. Each outline repeats its first
//! index at the end so the polygon closes on itself.

use std::fmt;
use std::str::FromStr;

use serde::de::{self, Deserializer};
use serde::Deserialize;

use crate::error::Error;

/// Upper lip inner midpoint; paired with [`LOWER_LIP_INNER`] for the mouth-open test.
pub const UPPER_LIP_INNER: usize = 13;
/// Lower lip inner midpoint.
pub const LOWER_LIP_INNER: usize = 14;

const MOUTH: &[usize] = &[
    61, 185, 40, 39, 37, 0, 267, 269, 270, 409, 291, 375, 405, 314, 17, 84, 181, 91, 146, 61,
];

const MOUTH_INSIDE: &[usize] = &[
    78, 191, 80, 81, 82, 13, 312, 311, 310, 415, 308, 324, 318, 402, 317, 14, 87, 178, 88, 95, 78,
];

const MOUTH_OUTSIDE: &[usize] = &[
    212, 202, 204, 194, 201, 200, 421, 418, 424, 422, 432, 436, 391, 393, 164, 167, 165, 216, 212,
];

const EYE_BROW_LEFT: &[usize] = &[70, 225, 224, 223, 222, 221, 55, 107, 66, 105, 63, 70];

const EYE_BROW_RIGHT: &[usize] = &[
    336, 296, 334, 293, 300, 276, 445, 444, 443, 442, 441, 285, 336,
];

const EYE_LEFT: &[usize] = &[
    113, 30, 29, 27, 28, 56, 190, 243, 232, 231, 230, 229, 228, 31, 35, 113,
];

const EYE_RIGHT: &[usize] = &[
    342, 260, 259, 257, 258, 286, 414, 463, 453, 452, 451, 450, 449, 448, 261, 265, 342,
];

const NOSE: &[usize] = &[168, 122, 217, 126, 203, 167, 164, 393, 423, 355, 437, 351, 168];

// Face oval, clockwise from the forehead.
const FULL_FACE: &[usize] = &[
    10, 338, 297, 332, 284, 251, 389, 356, 454, 323, 361, 288, 397, 365, 379, 378, 400, 377, 152,
    148, 176, 149, 150, 136, 172, 58, 132, 93, 234, 127, 162, 21, 54, 103, 67, 109, 10,
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Region {
    Mouth,
    MouthInside,
    MouthOutside,
    EyeLeft,
    EyeRight,
    EyeBrowLeft,
    EyeBrowRight,
    Nose,
    FullFace,
}

impl Region {
    pub const ALL: &'static [Self] = &[
        Self::Mouth,
        Self::MouthInside,
        Self::MouthOutside,
        Self::EyeLeft,
        Self::EyeRight,
        Self::EyeBrowLeft,
        Self::EyeBrowRight,
        Self::Nose,
        Self::FullFace,
    ];

    const NAMES: &'static [&'static str] = &[
        "MOUTH",
        "MOUTH_INSIDE",
        "MOUTH_OUTSIDE",
        "EYE_LEFT",
        "EYE_RIGHT",
        "EYE_BROW_LEFT",
        "EYE_BROW_RIGHT",
        "NOSE",
        "FULL_FACE",
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Mouth => "MOUTH",
            Self::MouthInside => "MOUTH_INSIDE",
            Self::MouthOutside => "MOUTH_OUTSIDE",
            Self::EyeLeft => "EYE_LEFT",
            Self::EyeRight => "EYE_RIGHT",
            Self::EyeBrowLeft => "EYE_BROW_LEFT",
            Self::EyeBrowRight => "EYE_BROW_RIGHT",
            Self::Nose => "NOSE",
            Self::FullFace => "FULL_FACE",
        }
    }

    /// Ordered landmark indices describing the closed outline of this region.
    pub fn landmark_indices(&self) -> &'static [usize] {
        match self {
            Self::Mouth => MOUTH,
            Self::MouthInside => MOUTH_INSIDE,
            Self::MouthOutside => MOUTH_OUTSIDE,
            Self::EyeLeft => EYE_LEFT,
            Self::EyeRight => EYE_RIGHT,
            Self::EyeBrowLeft => EYE_BROW_LEFT,
            Self::EyeBrowRight => EYE_BROW_RIGHT,
            Self::Nose => NOSE,
            Self::FullFace => FULL_FACE,
        }
    }

    /// Order shared by the sequence and zoom games.
    pub fn game_order() -> Vec<Self> {
        vec![
            Self::EyeBrowLeft,
            Self::EyeBrowRight,
            Self::EyeLeft,
            Self::EyeRight,
            Self::Nose,
            Self::Mouth,
        ]
    }
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Region {
    type Err = Error;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|region| region.as_str() == raw)
            .ok_or_else(|| Error::UnknownRegion(raw.to_string()))
    }
}

impl<'de> Deserialize<'de> for Region {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        raw.parse()
            .map_err(|_| de::Error::unknown_variant(&raw, Self::NAMES))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_round_trip_through_from_str() {
        for region in Region::ALL {
            assert_eq!(region.as_str().parse::<Region>().unwrap(), *region);
        }
        assert!(matches!(
            "CHIN".parse::<Region>(),
            Err(Error::UnknownRegion(name)) if name == "CHIN"
        ));
    }

    #[test]
    fn outlines_are_closed() {
        for region in Region::ALL {
            let indices = region.landmark_indices();
            assert!(indices.len() >= 4, "{region} outline too short");
            assert_eq!(indices.first(), indices.last(), "{region} outline not closed");
        }
    }

    #[test]
    fn mouth_inside_contains_lip_midpoints() {
        let inside = Region::MouthInside.landmark_indices();
        assert!(inside.contains(&UPPER_LIP_INNER));
        assert!(inside.contains(&LOWER_LIP_INNER));
    }
}
