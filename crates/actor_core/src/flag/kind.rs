use std::fmt;

use serde::{Deserialize, Serialize};

/// The sixteen flag kinds. Each kind owns one category of the game-state pages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum FlagKind {
    #[serde(rename = "bool_data")]
    Bool,
    #[serde(rename = "bool_array_data")]
    BoolArray,
    #[serde(rename = "s32_data")]
    S32,
    #[serde(rename = "s32_array_data")]
    S32Array,
    #[serde(rename = "f32_data")]
    F32,
    #[serde(rename = "f32_array_data")]
    F32Array,
    #[serde(rename = "string_data")]
    String32,
    #[serde(rename = "string64_data")]
    String64,
    #[serde(rename = "string64_array_data")]
    String64Array,
    #[serde(rename = "string256_data")]
    String256,
    #[serde(rename = "string256_array_data")]
    String256Array,
    #[serde(rename = "vector2f_data")]
    Vec2,
    #[serde(rename = "vector2f_array_data")]
    Vec2Array,
    #[serde(rename = "vector3f_data")]
    Vec3,
    #[serde(rename = "vector3f_array_data")]
    Vec3Array,
    #[serde(rename = "vector4f_data")]
    Vec4,
}

impl FlagKind {
    pub const ALL: [FlagKind; 16] = [
        Self::Bool,
        Self::BoolArray,
        Self::S32,
        Self::S32Array,
        Self::F32,
        Self::F32Array,
        Self::String32,
        Self::String64,
        Self::String64Array,
        Self::String256,
        Self::String256Array,
        Self::Vec2,
        Self::Vec2Array,
        Self::Vec3,
        Self::Vec3Array,
        Self::Vec4,
    ];

    pub fn from_category(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.category() == name)
    }

    /// Key of this kind's record array inside a game-state page.
    pub fn category(&self) -> &'static str {
        match *self {
            Self::Bool => "bool_data",
            Self::BoolArray => "bool_array_data",
            Self::S32 => "s32_data",
            Self::S32Array => "s32_array_data",
            Self::F32 => "f32_data",
            Self::F32Array => "f32_array_data",
            Self::String32 => "string_data",
            Self::String64 => "string64_data",
            Self::String64Array => "string64_array_data",
            Self::String256 => "string256_data",
            Self::String256Array => "string256_array_data",
            Self::Vec2 => "vector2f_data",
            Self::Vec2Array => "vector2f_array_data",
            Self::Vec3 => "vector3f_data",
            Self::Vec3Array => "vector3f_array_data",
            Self::Vec4 => "vector4f_data",
        }
    }

    pub fn supports_revival(&self) -> bool {
        matches!(*self, Self::Bool | Self::S32)
    }

    pub fn is_array(&self) -> bool {
        matches!(
            *self,
            Self::BoolArray
                | Self::S32Array
                | Self::F32Array
                | Self::String64Array
                | Self::String256Array
                | Self::Vec2Array
                | Self::Vec3Array
        )
    }
}

impl fmt::Display for FlagKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.category())
    }
}
