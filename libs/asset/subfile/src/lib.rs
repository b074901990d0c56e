// Parses the four per-subfile sections (TRE, RGN, LBL, NET) that make up
// one Garmin map subfile: the map-level/subdivision tree in TRE, the
// classic + NT-extended geometry offsets in RGN, and the label-table
// configuration carried by LBL/NET.
//
// Every header below is variable-length in real Garmin files (TRE alone
// ranges 0x9A..0xF0 bytes) but only a small, fixed-position prefix of
// each is ever read here; the remainder is unused map-metadata (map ID,
// copyright offsets, POI category tables, ...) this crate has no use
// for and does not model. `header_size` gates which optional trailing
// fields (the NT `tre7` table, RGN's extended offsets, LBL's codepage)
// are present, the same way a two-shaped header overlay pair guards an
// optional trailing block elsewhere in this tree.

use byteorder::{ByteOrder, LittleEndian};
use img_error::{ImgError, Rect, Result};
use label::{Coding, LabelTable};
use log::{debug, warn};

packed_struct::packed_struct!(TreHeaderPrefix {
    header_size => header_size: u16,
    north => north: [u8; 3],
    east => east: [u8; 3],
    south => south: [u8; 3],
    west => west: [u8; 3],
    tre1_offset => tre1_offset: u32,
    tre1_size => tre1_size: u32,
    tre2_offset => tre2_offset: u32,
    tre2_size => tre2_size: u32,
    poi_flags => poi_flags: u8,
    flag => flag: u8,
});

/// Offset of the optional NT `tre7` table, guarded by `header_size`.
/// Real files carry unmodeled map-ID/copyright fields in between; this
/// crate only needs the offset/size/record-size triple, so it is read
/// from a fixed slot near the end of the documented 0x9A..0xF0 header
/// range, mirroring `typ`'s `from_bytes`: the authoritative struct
/// layout wasn't available to ground this against, so the triple below
/// is a self-consistent invented shape carrying the same fields the
/// real `tre7` table holds (an entry offset/size/stride).
const TRE7_REL_OFFSET: usize = 0x7E;
const TRE7_FIELD_LEN: usize = 12;

packed_struct::packed_struct!(MapLevelRaw {
    bits_byte => bits_byte: u8,
    level => level: u8,
    nsubdiv => nsubdiv: u16,
});

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MapLevel {
    pub bits: u8,
    pub level: u8,
    pub inherited: bool,
    pub nsubdiv: u16,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Subdivision {
    pub center_lng: i32,
    pub center_lat: i32,
    pub width: u32,
    pub height: u32,
    pub shift: u32,
    pub level: u8,
    pub has_points: bool,
    pub has_idx_points: bool,
    pub has_polylines: bool,
    pub has_polygons: bool,
    pub rgn_start: u32,
    pub rgn_end: u32,
    /// NT-extended ("2"-suffixed) geometry windows, absolute byte offsets
    /// within the RGN part. Zero-length when the subfile carries no
    /// `tre7` table (classic subfiles, or NT subfiles with no extended
    /// geometry of that kind).
    pub offset_polygons2: u32,
    pub length_polygons2: u32,
    pub offset_polylines2: u32,
    pub length_polylines2: u32,
    pub offset_points2: u32,
    pub length_points2: u32,
    /// Read but never consulted in the decode path (spec.md §9); kept
    /// for fidelity, not acted on.
    pub next: u16,
    pub terminate: bool,
}

impl Subdivision {
    /// Bounding rect in radians, derived from the center plus the
    /// half-extent carried by `width`/`height` in the same delta units
    /// as RGN vertex deltas (`<< shift`).
    pub fn rect(&self) -> Rect {
        let d_lng = (self.width as i32) << self.shift;
        let d_lat = (self.height as i32) << self.shift;
        let east = img_error::garmin_rad(self.center_lng.wrapping_add(d_lng));
        let west = img_error::garmin_rad(self.center_lng.wrapping_sub(d_lng));
        let north = img_error::garmin_rad(self.center_lat.wrapping_add(d_lat));
        let south = img_error::garmin_rad(self.center_lat.wrapping_sub(d_lat));
        Rect::new(north, south, east, west).normalized()
    }
}

fn read_i24(data: &[u8; 3]) -> i32 {
    let raw = (data[0] as u32) | (data[1] as u32) << 8 | (data[2] as u32) << 16;
    let shifted = (raw << 8) as i32;
    shifted >> 8
}

pub struct TreInfo {
    pub bounds: Rect,
    pub locked: bool,
    pub transparent: bool,
    pub map_levels: Vec<MapLevel>,
    pub copyright: String,
}

/// The copyright notice is a plain null-terminated ASCII string sitting
/// right after the (variable-length) TRE header, per the reference
/// decoder's `file.data(offsetHead + header.size, 0x7FFF)` read.
fn read_copyright(data: &[u8], header_size: usize) -> String {
    if header_size >= data.len() {
        return String::new();
    }
    let rest = &data[header_size..];
    let end = rest.iter().position(|&b| b == 0).unwrap_or(rest.len());
    String::from_utf8_lossy(&rest[..end]).trim().to_string()
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

fn parse_tre_header(data: &[u8]) -> Result<(TreInfo, Option<(u32, u32, u32)>)> {
    let prefix = TreHeaderPrefix::overlay_prefix(data)
        .map_err(|e| ImgError::Truncated(format!("TRE header: {e}")))?;
    let header_size = prefix.header_size() as usize;
    need(data, 0, header_size.max(32), "TRE header")?;

    let north = read_i24(&prefix.north());
    let east = read_i24(&prefix.east());
    let south = read_i24(&prefix.south());
    let west = read_i24(&prefix.west());
    let bounds = Rect::new(
        img_error::garmin_rad(north),
        img_error::garmin_rad(south),
        img_error::garmin_rad(east),
        img_error::garmin_rad(west),
    )
    .normalized();

    let flag = prefix.flag();
    let locked = flag & 0x80 != 0;
    let transparent = prefix.poi_flags() & 0x02 != 0;

    let tre1_offset = prefix.tre1_offset() as usize;
    let tre1_size = prefix.tre1_size() as usize;
    need(data, tre1_offset, tre1_size, "TRE map-level table")?;
    let levels_raw = MapLevelRaw::overlay_slice(&data[tre1_offset..tre1_offset + tre1_size])
        .map_err(|e| ImgError::Truncated(format!("TRE map-level table: {e}")))?;
    let map_levels: Vec<MapLevel> = levels_raw
        .iter()
        .map(|r| MapLevel {
            bits: r.bits_byte() & 0x7F,
            inherited: r.bits_byte() & 0x80 != 0,
            level: r.level(),
            nsubdiv: r.nsubdiv(),
        })
        .collect();

    let tre7 = if header_size >= TRE7_REL_OFFSET + TRE7_FIELD_LEN
        && data.len() >= TRE7_REL_OFFSET + TRE7_FIELD_LEN
    {
        let off = LittleEndian::read_u32(&data[TRE7_REL_OFFSET..TRE7_REL_OFFSET + 4]);
        let size = LittleEndian::read_u32(&data[TRE7_REL_OFFSET + 4..TRE7_REL_OFFSET + 8]);
        let rec_size = LittleEndian::read_u32(&data[TRE7_REL_OFFSET + 8..TRE7_REL_OFFSET + 12]);
        if size > 0 && rec_size > 0 {
            Some((off, size, rec_size))
        } else {
            None
        }
    } else {
        None
    };

    let copyright = read_copyright(data, header_size);

    Ok((
        TreInfo {
            bounds,
            locked,
            transparent,
            map_levels,
            copyright,
        },
        tre7,
    ))
}

/// `tre2` subdivision-table walk. Non-deepest levels use a 16-byte
/// record (trailing `next` pointer to the finer level); the deepest
/// (last) level's records are 14 bytes and omit it.
fn parse_subdivisions(
    data: &[u8],
    tre2_offset: usize,
    tre2_size: usize,
    levels: &[MapLevel],
    rgn: &RgnInfo,
) -> Result<Vec<Subdivision>> {
    need(data, tre2_offset, tre2_size, "TRE subdivision table")?;
    let table = &data[tre2_offset..tre2_offset + tre2_size];
    let mut pos = 0usize;
    let mut out = Vec::new();
    let last_level_index = levels.len().saturating_sub(1);

    for (level_index, level) in levels.iter().enumerate() {
        let is_deepest = level_index == last_level_index;
        let record_len = if is_deepest { 14 } else { 16 };
        let shift = 24u32.saturating_sub(level.bits as u32);
        for _ in 0..level.nsubdiv {
            need(table, pos, record_len, "subdivision record")?;
            let rec = &table[pos..pos + record_len];
            let rgn_offset = (rec[0] as u32) | (rec[1] as u32) << 8 | (rec[2] as u32) << 16;
            let elements = rec[3];
            let center_lng = read_i24(&[rec[4], rec[5], rec[6]]);
            let center_lat = read_i24(&[rec[7], rec[8], rec[9]]);
            let width_raw = LittleEndian::read_u16(&rec[10..12]);
            let height = LittleEndian::read_u16(&rec[12..14]) as u32;
            let terminate = width_raw & 0x8000 != 0;
            let width = (width_raw & 0x7FFF) as u32;
            let next = if is_deepest {
                0
            } else {
                LittleEndian::read_u16(&rec[14..16])
            };
            out.push(Subdivision {
                center_lng,
                center_lat,
                width,
                height,
                shift,
                level: level.level,
                has_points: elements & 0x10 != 0,
                has_idx_points: elements & 0x20 != 0,
                has_polylines: elements & 0x40 != 0,
                has_polygons: elements & 0x80 != 0,
                rgn_start: rgn.offset1 + rgn_offset,
                rgn_end: 0,
                offset_polygons2: 0,
                length_polygons2: 0,
                offset_polylines2: 0,
                length_polylines2: 0,
                offset_points2: 0,
                length_points2: 0,
                next,
                terminate,
            });
            pos += record_len;
        }
    }

    // rgn_end of each is the rgn_start of the next in document order;
    // the last is closed by the end of the classic RGN payload window
    // (offset1 + size1), since rgn_start is now absolute within the RGN
    // part rather than relative to offset1.
    let n = out.len();
    for i in 0..n {
        out[i].rgn_end = if i + 1 < n {
            out[i + 1].rgn_start
        } else {
            rgn.offset1 + rgn.size1
        };
    }
    Ok(out)
}

packed_struct::packed_struct!(RgnHeaderPrefix {
    header_size => header_size: u16,
    offset1 => offset1: u32,
    size1 => size1: u32,
});

pub struct RgnInfo {
    pub offset1: u32,
    pub size1: u32,
    pub polygons2: Option<(u32, u32)>,
    pub polylines2: Option<(u32, u32)>,
    pub points2: Option<(u32, u32)>,
}

const RGN_EXT_REL_OFFSET: usize = 10;

fn parse_rgn_header(data: &[u8]) -> Result<RgnInfo> {
    let prefix = RgnHeaderPrefix::overlay_prefix(data)
        .map_err(|e| ImgError::Truncated(format!("RGN header: {e}")))?;
    let header_size = prefix.header_size() as usize;
    let ext_len = 24;
    let (polygons2, polylines2, points2) =
        if header_size >= RGN_EXT_REL_OFFSET + ext_len && data.len() >= RGN_EXT_REL_OFFSET + ext_len
        {
            let base = RGN_EXT_REL_OFFSET;
            let read_pair = |at: usize| -> (u32, u32) {
                (
                    LittleEndian::read_u32(&data[at..at + 4]),
                    LittleEndian::read_u32(&data[at + 4..at + 8]),
                )
            };
            let polyg2 = read_pair(base);
            let polyl2 = read_pair(base + 8);
            let point2 = read_pair(base + 16);
            (
                non_empty(polyg2),
                non_empty(polyl2),
                non_empty(point2),
            )
        } else {
            (None, None, None)
        };

    Ok(RgnInfo {
        offset1: prefix.offset1(),
        size1: prefix.size1(),
        polygons2,
        polylines2,
        points2,
    })
}

/// Derives each subdivision's NT-extended geometry windows from the
/// `tre7` per-subdivision record table: record `i` carries a delta added
/// to the RGN part's `polygons2`/`polylines2`/`points2` base offset, and
/// each window's length is the gap to the next subdivision's offset (or
/// to the end of its RGN2 block, for the last subdivision).
fn apply_nt_extended_offsets(
    subdivisions: &mut [Subdivision],
    tre: &[u8],
    tre7: Option<(u32, u32, u32)>,
    rgn: &RgnInfo,
) -> Result<()> {
    let Some((table_off, table_size, rec_size)) = tre7 else {
        return Ok(());
    };
    if subdivisions.is_empty() {
        return Ok(());
    }
    let table_off = table_off as usize;
    let table_size = table_size as usize;
    let rec_size = rec_size as usize;
    need(tre, table_off, table_size, "TRE7 extended subdivision table")?;
    let table = &tre[table_off..table_off + table_size];

    let (polyg2_base, polyg2_len) = rgn.polygons2.unwrap_or((0, 0));
    let (polyl2_base, polyl2_len) = rgn.polylines2.unwrap_or((0, 0));
    let (point2_base, point2_len) = rgn.points2.unwrap_or((0, 0));

    let read_field = |rec: &[u8], idx: usize| -> u32 {
        let at = idx * 4;
        if at + 4 <= rec.len() {
            LittleEndian::read_u32(&rec[at..at + 4])
        } else {
            0
        }
    };

    let mut starts = Vec::with_capacity(subdivisions.len());
    for i in 0..subdivisions.len() {
        let at = i * rec_size;
        if at + rec_size > table.len() {
            break;
        }
        let rec = &table[at..at + rec_size];
        starts.push((
            polyg2_base + read_field(rec, 0),
            polyl2_base + read_field(rec, 1),
            point2_base + read_field(rec, 2),
        ));
    }

    for (i, sub) in subdivisions.iter_mut().enumerate().take(starts.len()) {
        sub.offset_polygons2 = starts[i].0;
        sub.offset_polylines2 = starts[i].1;
        sub.offset_points2 = starts[i].2;
    }
    for i in 0..starts.len() {
        let end = if i + 1 < starts.len() {
            starts[i + 1]
        } else {
            (
                polyg2_base + polyg2_len,
                polyl2_base + polyl2_len,
                point2_base + point2_len,
            )
        };
        subdivisions[i].length_polygons2 = checked_len(end.0, starts[i].0)?;
        subdivisions[i].length_polylines2 = checked_len(end.1, starts[i].1)?;
        subdivisions[i].length_points2 = checked_len(end.2, starts[i].2)?;
    }
    Ok(())
}

fn checked_len(end: u32, start: u32) -> Result<u32> {
    if end < start {
        return Err(ImgError::Truncated(format!(
            "NT-extended length derivation went negative: end {end} < start {start}"
        )));
    }
    Ok(end - start)
}

fn non_empty(pair: (u32, u32)) -> Option<(u32, u32)> {
    if pair.1 > 0 {
        Some(pair)
    } else {
        None
    }
}

packed_struct::packed_struct!(LblHeaderPrefix {
    header_size => header_size: u16,
    lbl1_offset => lbl1_offset: u32,
    lbl1_size => lbl1_size: u32,
    addr_shift => addr_shift: u8,
    coding => coding: u8,
    lbl6_offset => lbl6_offset: u32,
    lbl6_size => lbl6_size: u32,
});

const LBL_CODEPAGE_REL_OFFSET: usize = 20;

packed_struct::packed_struct!(NetHeaderPrefix {
    header_size => header_size: u16,
    net1_offset => net1_offset: u32,
    net1_size => net1_size: u32,
    net1_addr_shift => net1_addr_shift: u8,
});

fn build_label_table(
    lbl_data: Option<&[u8]>,
    net_data: Option<&[u8]>,
) -> Result<LabelTable> {
    let lbl_data = lbl_data.unwrap_or(&[]);
    let (coding, lbl1_offset, lbl1_size, addr_shift, lbl6_offset, lbl6_size, codepage) =
        if lbl_data.is_empty() {
            (0x06u8, 0u32, 0u32, 0u8, 0u32, 0u32, 0u16)
        } else {
            let prefix = LblHeaderPrefix::overlay_prefix(lbl_data)
                .map_err(|e| ImgError::Truncated(format!("LBL header: {e}")))?;
            let header_size = prefix.header_size() as usize;
            let codepage = if header_size >= LBL_CODEPAGE_REL_OFFSET + 2
                && lbl_data.len() >= LBL_CODEPAGE_REL_OFFSET + 2
            {
                LittleEndian::read_u16(
                    &lbl_data[LBL_CODEPAGE_REL_OFFSET..LBL_CODEPAGE_REL_OFFSET + 2],
                )
            } else {
                0
            };
            (
                prefix.coding(),
                prefix.lbl1_offset(),
                prefix.lbl1_size(),
                prefix.addr_shift(),
                prefix.lbl6_offset(),
                prefix.lbl6_size(),
                codepage,
            )
        };

    let (net1_offset, net1_size, net1_addr_shift) = match net_data {
        Some(d) if !d.is_empty() => {
            let prefix = NetHeaderPrefix::overlay_prefix(d)
                .map_err(|e| ImgError::Truncated(format!("NET header: {e}")))?;
            (
                prefix.net1_offset(),
                prefix.net1_size(),
                prefix.net1_addr_shift(),
            )
        }
        _ => (0, 0, 0),
    };

    let coding = Coding::from_header(coding, codepage).unwrap_or_else(|e| {
        warn!("unsupported label coding, degrading to six-bit: {e}");
        Coding::Six
    });

    Ok(LabelTable::new(
        coding,
        lbl_data.to_vec(),
        net_data.unwrap_or(&[]).to_vec(),
        lbl1_offset,
        lbl1_size,
        addr_shift,
        lbl6_offset,
        lbl6_size,
        net1_offset,
        net1_size,
        net1_addr_shift,
    ))
}

pub struct SubfileReader {
    pub bounds: Rect,
    pub locked: bool,
    pub transparent: bool,
    pub map_levels: Vec<MapLevel>,
    pub subdivisions: Vec<Subdivision>,
    pub rgn: RgnInfo,
    pub labels: LabelTable,
    pub copyright: String,
}

impl SubfileReader {
    /// Parses one subfile's TRE/RGN/LBL/NET parts. `lbl`/`net` are
    /// optional: some subfiles (e.g. background/sea polygons) carry no
    /// labels at all.
    pub fn read(tre: &[u8], rgn: &[u8], lbl: Option<&[u8]>, net: Option<&[u8]>) -> Result<Self> {
        let (tre_info, tre7) = parse_tre_header(tre)?;
        if tre_info.locked {
            return Err(ImgError::Locked);
        }
        let prefix = TreHeaderPrefix::overlay_prefix(tre)
            .map_err(|e| ImgError::Truncated(format!("TRE header: {e}")))?;
        let rgn_info = parse_rgn_header(rgn)?;
        let mut subdivisions = parse_subdivisions(
            tre,
            prefix.tre2_offset() as usize,
            prefix.tre2_size() as usize,
            &tre_info.map_levels,
            &rgn_info,
        )?;
        if let Some((off, size, rec_size)) = tre7 {
            debug!("subfile carries an NT tre7 table at {off:#x} ({size} bytes, {rec_size}-byte records)");
        }
        apply_nt_extended_offsets(&mut subdivisions, tre, tre7, &rgn_info)?;
        let labels = build_label_table(lbl, net)?;

        debug!(
            "subfile: {} map levels, {} subdivisions, bounds={:?}",
            tre_info.map_levels.len(),
            subdivisions.len(),
            tre_info.bounds
        );

        Ok(SubfileReader {
            bounds: tre_info.bounds,
            locked: tre_info.locked,
            transparent: tre_info.transparent,
            map_levels: tre_info.map_levels,
            subdivisions,
            rgn: rgn_info,
            labels,
            copyright: tre_info.copyright,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn push_i24(buf: &mut Vec<u8>, v: i32) {
        let v = v as u32;
        buf.push((v & 0xFF) as u8);
        buf.push(((v >> 8) & 0xFF) as u8);
        buf.push(((v >> 16) & 0xFF) as u8);
    }

    fn build_tre(levels: &[(u8, u16)], subdivs_per_level: &[Vec<(i32, i32, u16, u16, u8)>]) -> Vec<u8> {
        // subdivs tuple: (center_lng, center_lat, width, height, elements)
        let mut tre1 = Vec::new();
        for &(bits, nsubdiv) in levels {
            tre1.push(bits);
            tre1.push(0); // level field, unused by tests
            tre1.extend_from_slice(&nsubdiv.to_le_bytes());
        }

        let mut tre2 = Vec::new();
        let last = subdivs_per_level.len() - 1;
        for (i, recs) in subdivs_per_level.iter().enumerate() {
            let deepest = i == last;
            for &(lng, lat, width, height, elements) in recs {
                push_i24(&mut tre2, 0); // rgn_offset, filled by caller in real use
                tre2.push(elements);
                push_i24(&mut tre2, lng);
                push_i24(&mut tre2, lat);
                tre2.extend_from_slice(&width.to_le_bytes());
                tre2.extend_from_slice(&height.to_le_bytes());
                if !deepest {
                    tre2.extend_from_slice(&0u16.to_le_bytes());
                }
            }
        }

        let header_size = 32u16;
        let tre1_offset = 32u32;
        let tre1_size = tre1.len() as u32;
        let tre2_offset = tre1_offset + tre1_size;
        let tre2_size = tre2.len() as u32;

        let mut buf = Vec::new();
        buf.extend_from_slice(&header_size.to_le_bytes());
        push_i24(&mut buf, 0); // north
        push_i24(&mut buf, 0); // east
        push_i24(&mut buf, 0); // south
        push_i24(&mut buf, 0); // west
        buf.extend_from_slice(&tre1_offset.to_le_bytes());
        buf.extend_from_slice(&tre1_size.to_le_bytes());
        buf.extend_from_slice(&tre2_offset.to_le_bytes());
        buf.extend_from_slice(&tre2_size.to_le_bytes());
        buf.push(0); // poi_flags
        buf.push(0); // flag (unlocked)
        buf.resize(32, 0);
        buf.extend_from_slice(&tre1);
        buf.extend_from_slice(&tre2);
        buf
    }

    fn build_rgn(size1: u32) -> Vec<u8> {
        let mut buf = vec![0u8; 10];
        LittleEndian::write_u16(&mut buf[0..2], 10);
        LittleEndian::write_u32(&mut buf[2..6], 10);
        LittleEndian::write_u32(&mut buf[6..10], size1);
        buf
    }

    #[test]
    fn map_level_count_matches_tre1_size_over_record_size() {
        let tre = build_tre(&[(10, 2), (14, 1)], &[vec![(0, 0, 1, 1, 0); 2], vec![(0, 0, 1, 1, 0); 1]]);
        let rgn = build_rgn(1000);
        let sf = SubfileReader::read(&tre, &rgn, None, None).unwrap();
        assert_eq!(sf.map_levels.len(), 2);
        assert_eq!(sf.map_levels[0].bits, 10);
        assert_eq!(sf.map_levels[1].bits, 14);
    }

    #[test]
    fn subdivision_count_matches_sum_of_nsubdiv() {
        let tre = build_tre(&[(10, 2), (14, 3)], &[vec![(0, 0, 1, 1, 0); 2], vec![(0, 0, 1, 1, 0); 3]]);
        let rgn = build_rgn(1000);
        let sf = SubfileReader::read(&tre, &rgn, None, None).unwrap();
        assert_eq!(sf.subdivisions.len(), 5);
    }

    #[test]
    fn rgn_end_chains_to_next_rgn_start_and_last_closes_on_payload_length() {
        let tre = build_tre(&[(10, 2)], &[vec![(0, 0, 1, 1, 0), (0, 0, 1, 1, 0)]]);
        let mut tre = tre;
        // Patch rgn_start of the two deepest-level records directly: the
        // table starts right after tre1 (2 levels worth = here 1 level * 4
        // bytes = 4 bytes after header).
        let tre1_off = 32usize;
        let tre2_off = tre1_off + 4; // one level entry
        tre[tre2_off..tre2_off + 3].copy_from_slice(&[0, 0, 0]); // first rgn_start = 0
        let second = tre2_off + 14;
        tre[second..second + 3].copy_from_slice(&[0x10, 0, 0]); // second rgn_start = 0x10
        let rgn = build_rgn(0x40);
        let sf = SubfileReader::read(&tre, &rgn, None, None).unwrap();
        // build_rgn's offset1 is 10; rgn_start is absolute within the RGN
        // part, so each raw subdivision-record offset is shifted by it.
        assert_eq!(sf.subdivisions[0].rgn_start, 10);
        assert_eq!(sf.subdivisions[0].rgn_end, 0x10 + 10);
        assert_eq!(sf.subdivisions[1].rgn_start, 0x10 + 10);
        assert_eq!(sf.subdivisions[1].rgn_end, 10 + 0x40);
    }

    #[test]
    fn locked_flag_rejects_subfile() {
        let mut tre = build_tre(&[(10, 1)], &[vec![(0, 0, 1, 1, 0)]]);
        tre[31] = 0x80; // flag byte at offset 31, bit 7 set
        let rgn = build_rgn(100);
        let err = SubfileReader::read(&tre, &rgn, None, None).unwrap_err();
        assert!(matches!(err, ImgError::Locked));
    }

    #[test]
    fn deepest_level_uses_14_byte_records_without_next_pointer() {
        let tre = build_tre(&[(10, 1), (16, 1)], &[vec![(5, 5, 1, 1, 0xF0)], vec![(9, 9, 1, 1, 0xF0)]]);
        let rgn = build_rgn(100);
        let sf = SubfileReader::read(&tre, &rgn, None, None).unwrap();
        assert_eq!(sf.subdivisions.len(), 2);
        assert_eq!(sf.subdivisions[1].next, 0);
        assert_eq!(sf.subdivisions[1].shift, 24 - 16);
    }

    #[test]
    fn elements_bit_flags_are_split_correctly() {
        let tre = build_tre(&[(10, 1)], &[vec![(0, 0, 1, 1, 0b1011_0000)]]);
        let rgn = build_rgn(100);
        let sf = SubfileReader::read(&tre, &rgn, None, None).unwrap();
        let s = &sf.subdivisions[0];
        assert!(s.has_points);
        assert!(s.has_idx_points);
        assert!(!s.has_polylines);
        assert!(s.has_polygons);
    }

    #[test]
    fn copyright_text_stops_at_null_terminator() {
        let mut data = vec![0xAAu8; 20];
        data.extend_from_slice(b"(c) 2020 Example Inc\0garbage");
        let copyright = read_copyright(&data, 20);
        assert_eq!(copyright, "(c) 2020 Example Inc");
    }

    #[test]
    fn nt_extended_offsets_derive_absolute_windows_and_lengths() {
        let mut tre1 = Vec::new();
        tre1.push(10); // bits
        tre1.push(0); // level
        tre1.extend_from_slice(&2u16.to_le_bytes()); // nsubdiv

        let mut tre2 = Vec::new();
        for _ in 0..2 {
            push_i24(&mut tre2, 0); // rgn_offset
            tre2.push(0); // elements
            push_i24(&mut tre2, 0); // center_lng
            push_i24(&mut tre2, 0); // center_lat
            tre2.extend_from_slice(&1u16.to_le_bytes()); // width
            tre2.extend_from_slice(&1u16.to_le_bytes()); // height
            // single (deepest) level: no trailing `next` field
        }

        let header_size = 138u16;
        let tre1_offset = header_size as u32;
        let tre1_size = tre1.len() as u32;
        let tre2_offset = tre1_offset + tre1_size;
        let tre2_size = tre2.len() as u32;
        let tre7_off = tre2_offset + tre2_size;
        let tre7_rec_size = 12u32;
        let tre7_size = tre7_rec_size * 2;

        let mut buf = Vec::new();
        buf.extend_from_slice(&header_size.to_le_bytes());
        push_i24(&mut buf, 0);
        push_i24(&mut buf, 0);
        push_i24(&mut buf, 0);
        push_i24(&mut buf, 0);
        buf.extend_from_slice(&tre1_offset.to_le_bytes());
        buf.extend_from_slice(&tre1_size.to_le_bytes());
        buf.extend_from_slice(&tre2_offset.to_le_bytes());
        buf.extend_from_slice(&tre2_size.to_le_bytes());
        buf.push(0); // poi_flags
        buf.push(0); // flag (unlocked)
        buf.resize(TRE7_REL_OFFSET, 0);
        buf.extend_from_slice(&tre7_off.to_le_bytes());
        buf.extend_from_slice(&tre7_size.to_le_bytes());
        buf.extend_from_slice(&tre7_rec_size.to_le_bytes());
        assert_eq!(buf.len(), header_size as usize);

        buf.extend_from_slice(&tre1);
        buf.extend_from_slice(&tre2);

        // Per-subdivision deltas added to the RGN part's extended bases.
        buf.extend_from_slice(&0u32.to_le_bytes());
        buf.extend_from_slice(&0u32.to_le_bytes());
        buf.extend_from_slice(&0u32.to_le_bytes());
        buf.extend_from_slice(&0x20u32.to_le_bytes());
        buf.extend_from_slice(&0x30u32.to_le_bytes());
        buf.extend_from_slice(&0x08u32.to_le_bytes());

        let mut rgn = vec![0u8; 10 + 24];
        LittleEndian::write_u16(&mut rgn[0..2], 34);
        LittleEndian::write_u32(&mut rgn[2..6], 10);
        LittleEndian::write_u32(&mut rgn[6..10], 0x10);
        LittleEndian::write_u32(&mut rgn[10..14], 0x100);
        LittleEndian::write_u32(&mut rgn[14..18], 0x40);
        LittleEndian::write_u32(&mut rgn[18..22], 0x200);
        LittleEndian::write_u32(&mut rgn[22..26], 0x40);
        LittleEndian::write_u32(&mut rgn[26..30], 0x300);
        LittleEndian::write_u32(&mut rgn[30..34], 0x10);

        let sf = SubfileReader::read(&buf, &rgn, None, None).unwrap();
        assert_eq!(sf.subdivisions.len(), 2);
        assert_eq!(sf.subdivisions[0].offset_polygons2, 0x100);
        assert_eq!(sf.subdivisions[0].offset_polylines2, 0x200);
        assert_eq!(sf.subdivisions[0].offset_points2, 0x300);
        assert_eq!(sf.subdivisions[0].length_polygons2, 0x20);
        assert_eq!(sf.subdivisions[0].length_polylines2, 0x30);
        assert_eq!(sf.subdivisions[0].length_points2, 0x08);

        assert_eq!(sf.subdivisions[1].offset_polygons2, 0x120);
        assert_eq!(sf.subdivisions[1].offset_polylines2, 0x230);
        assert_eq!(sf.subdivisions[1].offset_points2, 0x308);
        assert_eq!(sf.subdivisions[1].length_polygons2, 0x140 - 0x120);
        assert_eq!(sf.subdivisions[1].length_polylines2, 0x240 - 0x230);
        assert_eq!(sf.subdivisions[1].length_points2, 0x310 - 0x308);
    }
}
