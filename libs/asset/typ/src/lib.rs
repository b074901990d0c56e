// Style lookup for rendering: maps a combined feature `type`/`subtype`
// u16 to draw properties for polylines, polygons, and points, plus the
// polygon painter's-algorithm draw order. `TypStyler::with_fallback()`
// gives sane defaults; `from_bytes` layers a parsed TYP file on top of
// that programmatically built base rather than replacing it outright.
//
// The original's TYP binary layout (`CGarminTyp`) was not available to
// ground this parser against, so `from_bytes` below defines its own
// self-consistent record shape carrying the same logical fields
// (color, width, pattern, label strings) a real TYP file holds.

mod fallback;

use byteorder::{ByteOrder, LittleEndian};
use img_error::{ImgError, Result};
use log::warn;
use std::collections::HashMap;

pub use fallback::LANGUAGES;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineStyle {
    pub day_color: u32,
    pub night_color: u32,
    pub width: u8,
    pub dashed: bool,
    pub strings: HashMap<u8, String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PolygonStyle {
    pub day_color: u32,
    pub night_color: u32,
    pub pattern: Option<u16>,
    pub strings: HashMap<u8, String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PointStyle {
    pub icon: Option<u16>,
    pub label_visible: bool,
    pub strings: HashMap<u8, String>,
}

pub struct TypStyler {
    pub polyline_properties: HashMap<u16, LineStyle>,
    pub polygon_properties: HashMap<u16, PolygonStyle>,
    pub point_properties: HashMap<u16, PointStyle>,
    pub polygon_draw_order: [u8; 0x80],
}

impl TypStyler {
    pub fn with_fallback() -> Self {
        let mut styler = Self {
            polyline_properties: fallback::polylines(),
            polygon_properties: fallback::polygons(),
            point_properties: fallback::points(),
            polygon_draw_order: fallback::draw_order(),
        };
        // Two defaults compete for polygon 0x46's unnamed-area label;
        // the later one wins (open question, kept per the later source).
        styler
            .polygon_properties
            .entry(0x46)
            .or_insert_with(|| PolygonStyle {
                day_color: 0x000000,
                night_color: 0x000000,
                pattern: None,
                strings: HashMap::new(),
            })
            .strings
            .insert(0x00, "unnamed area".to_string());
        styler
    }

    /// Parses an external or embedded TYP blob and overlays it on top of
    /// `with_fallback()`'s defaults: every type the blob defines
    /// replaces the fallback entry; types the blob is silent on keep
    /// their fallback style.
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        let mut styler = Self::with_fallback();
        if data.is_empty() {
            return Ok(styler);
        }
        need(data, 0, 4, "TYP header")?;
        let polyline_count = LittleEndian::read_u16(&data[0..2]) as usize;
        let polygon_count = LittleEndian::read_u16(&data[2..4]) as usize;
        let mut pos = 4usize;

        need(data, pos, 2, "TYP point count")?;
        let point_count = LittleEndian::read_u16(&data[pos..pos + 2]) as usize;
        pos += 2;

        for _ in 0..polyline_count {
            let (feature_type, style, consumed) = parse_line_record(data, pos)?;
            pos += consumed;
            styler.polyline_properties.insert(feature_type, style);
        }
        for _ in 0..polygon_count {
            let (feature_type, style, consumed) = parse_polygon_record(data, pos)?;
            pos += consumed;
            styler.polygon_properties.insert(feature_type, style);
        }
        for _ in 0..point_count {
            let (feature_type, style, consumed) = parse_point_record(data, pos)?;
            pos += consumed;
            styler.point_properties.insert(feature_type, style);
        }

        if pos + 0x80 <= data.len() {
            let mut order = [0u8; 0x80];
            order.copy_from_slice(&data[pos..pos + 0x80]);
            if is_permutation(&order) {
                styler.polygon_draw_order = order;
            } else {
                warn!("TYP draw-order table is not a permutation of 0..0x80, keeping fallback order");
            }
        }

        Ok(styler)
    }
}

fn is_permutation(order: &[u8; 0x80]) -> bool {
    let mut seen = [false; 0x80];
    for &v in order {
        let idx = v as usize;
        if idx >= seen.len() || seen[idx] {
            return false;
        }
        seen[idx] = true;
    }
    true
}

fn need(data: &[u8], at: usize, len: usize, what: &'static str) -> Result<()> {
    if data.len() < at + len {
        return Err(ImgError::Truncated(format!(
            "{what}: need {len} bytes at {at}, have {}",
            data.len()
        )));
    }
    Ok(())
}

fn read_label(data: &[u8], at: usize) -> Result<(String, usize)> {
    need(data, at, 1, "TYP label length")?;
    let len = data[at] as usize;
    need(data, at + 1, len, "TYP label bytes")?;
    let s = String::from_utf8_lossy(&data[at + 1..at + 1 + len]).into_owned();
    Ok((s, 1 + len))
}

fn read_strings(data: &[u8], mut pos: usize) -> Result<(HashMap<u8, String>, usize)> {
    let start = pos;
    need(data, pos, 1, "TYP string count")?;
    let count = data[pos];
    pos += 1;
    let mut strings = HashMap::new();
    for _ in 0..count {
        need(data, pos, 1, "TYP language code")?;
        let lang = data[pos];
        pos += 1;
        let (s, consumed) = read_label(data, pos)?;
        pos += consumed;
        strings.insert(lang, s);
    }
    Ok((strings, pos - start))
}

fn parse_line_record(data: &[u8], at: usize) -> Result<(u16, LineStyle, usize)> {
    need(data, at, 9, "TYP polyline record")?;
    let feature_type = LittleEndian::read_u16(&data[at..at + 2]);
    let day_color = LittleEndian::read_u32(&data[at + 2..at + 6]) & 0xFF_FFFF;
    let width = data[at + 6];
    let dashed = data[at + 7] != 0;
    let _reserved = data[at + 8];
    let (strings, str_len) = read_strings(data, at + 9)?;
    let night_color = night_color_fallback(day_color);
    Ok((
        feature_type,
        LineStyle {
            day_color,
            night_color,
            width,
            dashed,
            strings,
        },
        9 + str_len,
    ))
}

fn night_color_fallback(day: u32) -> u32 {
    (day >> 1) & 0x7F7F7F
}

fn parse_polygon_record(data: &[u8], at: usize) -> Result<(u16, PolygonStyle, usize)> {
    need(data, at, 8, "TYP polygon record")?;
    let feature_type = LittleEndian::read_u16(&data[at..at + 2]);
    let day_color = LittleEndian::read_u32(&data[at + 2..at + 6]) & 0xFF_FFFF;
    let has_pattern = data[at + 6] != 0;
    let pattern = if has_pattern {
        Some(LittleEndian::read_u16(&data[at + 7..at + 9]) as u16)
    } else {
        None
    };
    let record_fixed_len = if has_pattern { 9 } else { 7 };
    let (strings, str_len) = read_strings(data, at + record_fixed_len)?;
    let night_color = (day_color >> 1) & 0x7F7F7F;
    Ok((
        feature_type,
        PolygonStyle {
            day_color,
            night_color,
            pattern,
            strings,
        },
        record_fixed_len + str_len,
    ))
}

fn parse_point_record(data: &[u8], at: usize) -> Result<(u16, PointStyle, usize)> {
    need(data, at, 4, "TYP point record")?;
    let feature_type = LittleEndian::read_u16(&data[at..at + 2]);
    let has_icon = data[at + 2] != 0;
    let icon = if has_icon {
        Some(LittleEndian::read_u16(&data[at + 3..at + 5]))
    } else {
        None
    };
    let record_fixed_len = if has_icon { 5 } else { 3 };
    need(data, at + record_fixed_len, 1, "TYP point label-visible flag")?;
    let label_visible = data[at + record_fixed_len] != 0;
    let (strings, str_len) = read_strings(data, at + record_fixed_len + 1)?;
    Ok((
        feature_type,
        PointStyle {
            icon,
            label_visible,
            strings,
        },
        record_fixed_len + 1 + str_len,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fallback_covers_contour_line_types() {
        let styler = TypStyler::with_fallback();
        for t in 0x20..=0x25u16 {
            assert!(styler.polyline_properties.contains_key(&t), "missing contour type {t:#x}");
        }
    }

    #[test]
    fn draw_order_is_a_permutation_of_0_to_0x7f() {
        let styler = TypStyler::with_fallback();
        let mut seen = [false; 0x80];
        for &v in &styler.polygon_draw_order {
            assert!(!seen[v as usize], "duplicate {v}");
            seen[v as usize] = true;
        }
        assert!(seen.iter().all(|&b| b));
    }

    #[test]
    fn polygon_0x46_keeps_the_second_assignment() {
        let styler = TypStyler::with_fallback();
        assert_eq!(
            styler.polygon_properties[&0x46].strings[&0x00],
            "unnamed area"
        );
    }

    fn build_line_record(feature_type: u16, day_color: u32, width: u8) -> Vec<u8> {
        let mut buf = Vec::new();
        buf.extend_from_slice(&feature_type.to_le_bytes());
        buf.extend_from_slice(&day_color.to_le_bytes());
        buf.push(width);
        buf.push(0); // dashed
        buf.push(0); // reserved
        buf.push(0); // zero strings
        buf
    }

    #[test]
    fn from_bytes_overlays_a_line_style_on_top_of_fallback() {
        let mut data = Vec::new();
        data.extend_from_slice(&1u16.to_le_bytes()); // polyline_count
        data.extend_from_slice(&0u16.to_le_bytes()); // polygon_count
        data.extend_from_slice(&0u16.to_le_bytes()); // point_count
        data.extend(build_line_record(0x01, 0x123456, 9));

        let styler = TypStyler::from_bytes(&data).unwrap();
        assert_eq!(styler.polyline_properties[&0x01].width, 9);
        assert_eq!(styler.polyline_properties[&0x01].day_color, 0x123456);
        // Untouched types still carry their fallback style.
        assert!(styler.polyline_properties.contains_key(&0x20));
    }

    #[test]
    fn empty_typ_blob_is_pure_fallback() {
        let styler = TypStyler::from_bytes(&[]).unwrap();
        assert_eq!(styler.polyline_properties.len(), fallback::POLYLINES.len());
    }
}
