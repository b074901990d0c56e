// Hardcoded default style tables, used whenever no external/embedded TYP
// file has been loaded (or as the base layer any TYP file is overlaid
// on top of). A representative subset of the original's much larger
// per-type color tables — the exact palette of road/area colors is
// cosmetic, not structural, and is always overridable by a real TYP file.

use crate::{LineStyle, PointStyle, PolygonStyle};
use once_cell::sync::Lazy;
use std::collections::HashMap;

/// `(type, day_color, night_color, width, dashed)`
pub const POLYLINES: &[(u16, u32, u32, u8, bool)] = &[
    (0x01, 0xFF0000, 0x800000, 6, false), // motorway
    (0x02, 0xFF6600, 0x803300, 5, false), // principal highway
    (0x03, 0xFFA500, 0x804d00, 4, false), // other highway
    (0x04, 0xFFFF00, 0x808000, 4, false), // arterial road
    (0x05, 0xFFFFFF, 0x404040, 3, false), // collector road
    (0x06, 0xE0E0E0, 0x303030, 2, false), // residential/neighborhood road
    (0x07, 0xC0C0C0, 0x202020, 1, true),  // alley
    (0x08, 0x0000FF, 0x000080, 3, true),  // ferry route
    (0x09, 0x808080, 0x202020, 2, true),  // railway
    (0x0A, 0xB0B0B0, 0x282828, 1, false), // unpaved road
    (0x0B, 0x00FF00, 0x004000, 2, false), // major connector
    (0x0C, 0x00C000, 0x003000, 2, false), // ramp
    (0x0D, 0x8080FF, 0x202060, 1, true),  // walkway/trail
    (0x0E, 0x808000, 0x202000, 1, false), // bike path
    (0x0F, 0x400040, 0x100010, 1, true),  // ski trail
    (0x10, 0x00FFFF, 0x004040, 2, false), // river/stream (linear water)
    (0x11, 0x0080FF, 0x002040, 1, true),  // canal
    (0x12, 0x804000, 0x201000, 1, false), // pipeline
    (0x13, 0x000000, 0x000000, 1, false), // political boundary
    (0x14, 0x606060, 0x181818, 1, true),  // state/province boundary
    (0x15, 0x909090, 0x242424, 1, true),  // county boundary
    (0x16, 0xFFD700, 0x4d4000, 2, false), // pedestrian way
    (0x17, 0x00BFFF, 0x003040, 1, false), // shoreline (minor)
    (0x1F, 0x0000C0, 0x000030, 2, false), // coastline
    (0x20, 0x804020, 0x201008, 1, true),  // contour line, index
    (0x21, 0x804020, 0x201008, 1, true),  // contour line, intermediate
    (0x22, 0x804020, 0x201008, 1, true),  // contour line, supplementary
    (0x23, 0x804020, 0x201008, 1, true),  // contour line, depression
    (0x24, 0x804020, 0x201008, 1, true),  // contour line, glacier
    (0x25, 0x804020, 0x201008, 1, true),  // contour line, bathymetric
];

/// `(type, day_color, night_color, pattern)`
pub const POLYGONS: &[(u16, u32, u32, Option<u16>)] = &[
    (0x01, 0x98FB98, 0x183018, None),    // city/park (large)
    (0x02, 0x90EE90, 0x163016, None),    // city/park (small)
    (0x03, 0xF5F5DC, 0x2a2a20, None),    // land cover, generic
    (0x04, 0xD2B48C, 0x251f15, None),    // built-up area
    (0x05, 0xADD8E6, 0x101822, None),    // lake, major
    (0x06, 0xB0E0E6, 0x121c1e, None),    // lake, minor
    (0x07, 0x87CEEB, 0x0f1c22, None),    // river (areal)
    (0x08, 0x00008B, 0x000018, None),    // sea/ocean
    (0x09, 0xF0E68C, 0x262210, None),    // desert
    (0x0A, 0x228B22, 0x0c2c0c, None),    // forest
    (0x0B, 0x808000, 0x1c1c00, None),    // marsh/wetland
    (0x0C, 0xFFFFE0, 0x2c2c20, None),    // airport
    (0x0D, 0xD3D3D3, 0x222222, None),    // parking lot
    (0x0E, 0xA9A9A9, 0x1a1a1a, None),    // built-up, industrial
    (0x0F, 0xFAFAD2, 0x2a2a22, None),    // golf course
    (0x10, 0xEEE8AA, 0x28261c, None),    // military
    (0x11, 0xC0C0C0, 0x202020, Some(1)), // national park
    (0x12, 0xBEBEBE, 0x1e1e1e, Some(2)), // state park
    (0x13, 0x8FBC8F, 0x162416, None),    // nature reserve
    (0x14, 0xFFE4B5, 0x2a2416, None),    // beach
    (0x15, 0xF0FFF0, 0x1c241c, None),    // ice/glacier
    (0x16, 0xFFFACD, 0x2a2818, None),    // orchard
    (0x17, 0xFFDEAD, 0x2a2216, None),    // shopping center
    (0x18, 0xE6E6FA, 0x222230, None),    // university
    (0x19, 0xF08080, 0x201010, None),    // hospital
    (0x1A, 0xDDA0DD, 0x221a22, None),    // cemetery
    (0x1B, 0x7CFC00, 0x143000, None),    // sports complex
    (0x1C, 0x98FB98, 0x183018, None),    // reservation
    (0x1D, 0xB22222, 0x1c0808, None),    // restricted/danger area
    (0x28, 0xFFFFFF, 0x050505, None),    // background fill, sea level
    (0x4B, 0x000000, 0x000000, None),    // unknown/ground (tail of range)
];

/// `(type, icon, label_visible)`
pub const POINTS: &[(u16, Option<u16>, bool)] = &[
    (0x2A00, Some(0x2A00), true), // city, large
    (0x2A01, Some(0x2A01), true), // city, small
    (0x2F00, Some(0x2F00), true), // restaurant
    (0x2F01, Some(0x2F01), true), // gas station
    (0x2F02, Some(0x2F02), true), // lodging
    (0x2F03, Some(0x2F03), false),// parking
    (0x4600, Some(0x4600), true), // exit
    (0x6400, Some(0x6400), false),// contour elevation spot
    (0x6401, None, true),         // unlabeled generic POI
    (0x6500, Some(0x6500), true), // summit
    (0x6600, Some(0x6600), true), // airport
    (0x6700, Some(0x6700), false),// bridge
];

pub fn polylines() -> HashMap<u16, LineStyle> {
    POLYLINES
        .iter()
        .map(|&(t, day, night, width, dashed)| {
            (
                t,
                LineStyle {
                    day_color: day,
                    night_color: night,
                    width,
                    dashed,
                    strings: HashMap::new(),
                },
            )
        })
        .collect()
}

pub fn polygons() -> HashMap<u16, PolygonStyle> {
    POLYGONS
        .iter()
        .map(|&(t, day, night, pattern)| {
            (
                t,
                PolygonStyle {
                    day_color: day,
                    night_color: night,
                    pattern,
                    strings: HashMap::new(),
                },
            )
        })
        .collect()
}

pub fn points() -> HashMap<u16, PointStyle> {
    POINTS
        .iter()
        .map(|&(t, icon, label_visible)| {
            (
                t,
                PointStyle {
                    icon,
                    label_visible,
                    strings: HashMap::new(),
                },
            )
        })
        .collect()
}

/// `polygon_draw_order`: painter's-algorithm back-to-front order,
/// background/water first. A permutation of `0..0x80`; entries beyond
/// the fallback table's explicit coverage keep ascending numeric order.
pub fn draw_order() -> [u8; 0x80] {
    let mut used = [false; 0x80];
    let mut order = [0u8; 0x80];
    let mut cursor = 0usize;
    // Background/water/land-cover types paint before roads and labels.
    let front: &[u8] = &[0x08, 0x07, 0x06, 0x05, 0x03, 0x01, 0x02, 0x04];
    for &t in front {
        let idx = t as usize;
        if idx < used.len() && !used[idx] {
            order[cursor] = t;
            used[idx] = true;
            cursor += 1;
        }
    }
    for (v, was_used) in used.iter().enumerate() {
        if !*was_used {
            order[cursor] = v as u8;
            cursor += 1;
        }
    }
    order
}

/// Language code (0x00..0x22) to name, used to select a multilingual
/// name field out of a style's `strings` table.
pub static LANGUAGES: Lazy<HashMap<u8, &'static str>> = Lazy::new(|| {
    HashMap::from([
        (0x00, "default"),
        (0x01, "french"),
        (0x02, "german"),
        (0x03, "dutch"),
        (0x09, "english"),
        (0x0A, "spanish"),
        (0x10, "italian"),
        (0x22, "russian"),
    ])
});
