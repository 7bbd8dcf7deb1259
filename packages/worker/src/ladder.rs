//! Which renditions an original gets, and at what size.

use common::Variant;

use crate::imaging::Dimensions;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlannedRendition {
    pub variant: Variant,
    pub target: Dimensions,
}

/// Renditions for an original of `source` dimensions, largest first.
///
/// `orig` is always planned at full size. Each bounded rung is planned iff
/// the source is strictly taller than its bound, scaled to fit a
/// bound x bound box.
pub fn plan(source: Dimensions) -> Vec<PlannedRendition> {
    Variant::ALL
        .into_iter()
        .filter(|v| v.applies_to_height(source.height))
        .map(|variant| PlannedRendition {
            variant,
            target: variant
                .bound()
                .map_or(source, |bound| fit_within(source, bound)),
        })
        .collect()
}

/// Scale `source` to fit a `bound` x `bound` box, keeping aspect ratio.
/// Never upscales; no side drops below one pixel.
pub fn fit_within(source: Dimensions, bound: u32) -> Dimensions {
    let Dimensions { width, height } = source;
    let longest = width.max(height);
    if longest <= bound {
        return source;
    }
    let scale = |side: u32| -> u32 {
        let scaled = (u64::from(side) * u64::from(bound) + u64::from(longest) / 2) / u64::from(longest);
        u32::try_from(scaled).unwrap_or(bound).max(1)
    };
    Dimensions {
        width: scale(width),
        height: scale(height),
    }
}
