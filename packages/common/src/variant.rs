#[cfg(feature = "sea-orm")]
use sea_orm::prelude::StringLen;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// A rung of the rendition ladder.
///
/// Every original gets an `Orig` rendition (a full-size JPEG re-encode). The
/// bounded rungs exist only when the original is taller than their bound.
/// When the `sea-orm` feature is enabled, this enum can be stored directly in
/// SeaORM entities.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, utoipa::ToSchema,
)]
#[cfg_attr(
    feature = "sea-orm",
    derive(sea_orm::DeriveActiveEnum, sea_orm::EnumIter),
    sea_orm(rs_type = "String", db_type = "String(StringLen::None)")
)]
pub enum Variant {
    #[serde(rename = "orig")]
    #[cfg_attr(feature = "sea-orm", sea_orm(string_value = "orig"))]
    Orig,
    #[serde(rename = "1024")]
    #[cfg_attr(feature = "sea-orm", sea_orm(string_value = "1024"))]
    Px1024,
    #[serde(rename = "640")]
    #[cfg_attr(feature = "sea-orm", sea_orm(string_value = "640"))]
    Px640,
    #[serde(rename = "256")]
    #[cfg_attr(feature = "sea-orm", sea_orm(string_value = "256"))]
    Px256,
    #[serde(rename = "128")]
    #[cfg_attr(feature = "sea-orm", sea_orm(string_value = "128"))]
    Px128,
}

impl Variant {
    /// The full ladder, largest first.
    pub const ALL: [Variant; 5] = [
        Variant::Orig,
        Variant::Px1024,
        Variant::Px640,
        Variant::Px256,
        Variant::Px128,
    ];

    /// Label used in filenames and URLs.
    pub fn label(self) -> &'static str {
        match self {
            Self::Orig => "orig",
            Self::Px1024 => "1024",
            Self::Px640 => "640",
            Self::Px256 => "256",
            Self::Px128 => "128",
        }
    }

    /// Side of the square box this rendition must fit in, if any.
    pub fn bound(self) -> Option<u32> {
        match self {
            Self::Orig => None,
            Self::Px1024 => Some(1024),
            Self::Px640 => Some(640),
            Self::Px256 => Some(256),
            Self::Px128 => Some(128),
        }
    }

    /// Whether this rendition is produced for an original of the given height.
    ///
    /// Thresholds compare against height only, and strictly: a 640px tall
    /// original gets no `640` rendition.
    pub fn applies_to_height(self, height: u32) -> bool {
        self.bound().is_none_or(|bound| height > bound)
    }

    /// Stored filename of this rendition for the original `id`.
    pub fn filename(self, id: Uuid) -> String {
        format!("{id}--{}.jpg", self.label())
    }
}

impl fmt::Display for Variant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown rendition variant: {0}")]
pub struct UnknownVariant(pub String);

impl FromStr for Variant {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|v| v.label() == s)
            .ok_or_else(|| UnknownVariant(s.to_string()))
    }
}

/// Image formats accepted at ingestion. Renditions are always JPEG.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, utoipa::ToSchema)]
#[cfg_attr(
    feature = "sea-orm",
    derive(sea_orm::DeriveActiveEnum, sea_orm::EnumIter),
    sea_orm(rs_type = "String", db_type = "String(StringLen::None)")
)]
pub enum ImageContentType {
    #[serde(rename = "image/jpeg")]
    #[cfg_attr(feature = "sea-orm", sea_orm(string_value = "image/jpeg"))]
    Jpeg,
    #[serde(rename = "image/png")]
    #[cfg_attr(feature = "sea-orm", sea_orm(string_value = "image/png"))]
    Png,
}

impl ImageContentType {
    pub fn as_mime(self) -> &'static str {
        match self {
            Self::Jpeg => "image/jpeg",
            Self::Png => "image/png",
        }
    }

    /// Parse a declared MIME type, ignoring case and any parameters.
    pub fn from_mime(mime: &str) -> Option<Self> {
        let essence = mime.split(';').next().unwrap_or_default().trim();
        if essence.eq_ignore_ascii_case("image/jpeg") {
            Some(Self::Jpeg)
        } else if essence.eq_ignore_ascii_case("image/png") {
            Some(Self::Png)
        } else {
            None
        }
    }
}

impl fmt::Display for ImageContentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_mime())
    }
}
