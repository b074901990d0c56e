// Reads the 0x200-byte Garmin image header and the FAT that follows it,
// grouping FAT blocks into named subfiles with typed parts (TRE, RGN,
// LBL, NET, NOD, DEM, TYP, GMP). Memory-maps the file, overlays a fixed
// header, then walks fixed-size directory records into a `HashMap`.
//
// Byte offsets for `ImageHeaderPrefix` and `FatEntryPrefix` below are not
// invented: they come from QMapShack's `hdr_img_t`/`FATblock_t` structs,
// the reference this crate's spec was distilled from.

use byteorder::{ByteOrder, LittleEndian};
use img_error::{ImgError, Result};
use log::{debug, warn};
use memmap::{Mmap, MmapOptions};
use std::collections::{HashMap, HashSet};
use std::fs::File;
use std::path::Path;

packed_struct::packed_struct!(ImageHeaderPrefix {
    xor_byte => xor_byte: u8,
    pad0 => _pad0: [u8; 15],
    signature => signature: [u8; 7],
    pad1 => _pad1: [u8; 41],
    offset_fat => offset_fat: u8,
    identifier => identifier: [u8; 7],
    pad2 => _pad2: [u8; 1],
    pad3 => _pad3: [u8; 24],
    e1 => e1: u8,
    e2 => e2: u8,
});

const FAT_ENTRY_SIZE: usize = 512;

packed_struct::packed_struct!(FatEntryPrefix {
    flag => flag: u8,
    name => name: [u8; 8],
    part_type => part_type: [u8; 3],
    size => size: u32,
    part => part: u16,
    pad => _pad: [u8; 14],
    block0 => block0: u16,
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PartType {
    Tre,
    Rgn,
    Lbl,
    Net,
    Nod,
    Dem,
    Typ,
    Gmp,
}

impl PartType {
    fn from_bytes(raw: &[u8; 3]) -> Option<Self> {
        Some(match raw {
            b"TRE" => PartType::Tre,
            b"RGN" => PartType::Rgn,
            b"LBL" => PartType::Lbl,
            b"NET" => PartType::Net,
            b"NOD" => PartType::Nod,
            b"DEM" => PartType::Dem,
            b"TYP" => PartType::Typ,
            b"GMP" => PartType::Gmp,
            _ => return None,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PartInfo {
    pub offset: u32,
    pub size: u32,
}

#[derive(Debug, Clone, Default)]
pub struct Subfile {
    pub parts: HashMap<PartType, PartInfo>,
}

impl Subfile {
    pub fn is_valid_map_subfile(&self) -> bool {
        self.parts.contains_key(&PartType::Tre) && self.parts.contains_key(&PartType::Rgn)
    }

    pub fn is_nt_composite(&self) -> bool {
        self.parts.contains_key(&PartType::Gmp)
    }
}

pub struct ContainerReader {
    data: Mmap,
    pub blocksize: u32,
    pub subfiles: HashMap<String, Subfile>,
}

fn trimmed_ascii(raw: &[u8]) -> String {
    let end = raw.iter().position(|&b| b == 0).unwrap_or(raw.len());
    String::from_utf8_lossy(&raw[..end]).trim().to_string()
}

impl ContainerReader {
    pub fn open(path: &Path) -> Result<Self> {
        let fp = File::open(path)?;
        let data = unsafe { MmapOptions::new().map(&fp)? };

        if data.is_empty() || data[0] != 0 {
            return Err(ImgError::Locked);
        }

        let hdr = ImageHeaderPrefix::overlay_prefix(&data)
            .map_err(|e| ImgError::Truncated(format!("image header: {e}")))?;
        if &hdr.signature() != b"DSKIMG\0" {
            return Err(ImgError::BadMagic("missing DSKIMG signature".into()));
        }
        if &hdr.identifier() != b"GARMIN\0" {
            return Err(ImgError::BadMagic("missing GARMIN identifier".into()));
        }

        let blocksize: u32 = 1u32 << (hdr.e1() as u32 + hdr.e2() as u32);
        let fat_offset = hdr.offset_fat() as usize * 0x200;

        let subfiles = Self::walk_fat(&data, fat_offset, blocksize)?;

        // GMP-bearing (NT composite) subfiles are detected across the
        // whole FAT, then rejected here — not mid-walk — matching the
        // source's two-stage "collect everything, then refuse" shape.
        for (name, sf) in &subfiles {
            if sf.is_nt_composite() {
                return Err(ImgError::UnsupportedFormat(format!(
                    "subfile {name} is an NT/GMP composite, which is not supported"
                )));
            }
        }

        let subfiles: HashMap<String, Subfile> = subfiles
            .into_iter()
            .filter(|(name, sf)| {
                let ok = sf.is_valid_map_subfile();
                if !ok {
                    warn!("dropping subfile {name}: missing TRE or RGN part");
                }
                ok
            })
            .collect();

        debug!(
            "opened {}: blocksize={blocksize}, {} valid subfile(s)",
            path.display(),
            subfiles.len()
        );

        Ok(Self {
            data,
            blocksize,
            subfiles,
        })
    }

    fn walk_fat(data: &[u8], fat_offset: usize, blocksize: u32) -> Result<HashMap<String, Subfile>> {
        let mut subfiles: HashMap<String, Subfile> = HashMap::new();
        let mut seen: HashSet<String> = HashSet::new();
        let mut pos = fat_offset;

        while pos + FAT_ENTRY_SIZE <= data.len() {
            let entry = FatEntryPrefix::overlay_prefix(&data[pos..pos + FAT_ENTRY_SIZE])
                .map_err(|e| ImgError::Truncated(format!("FAT entry: {e}")))?;
            if entry.flag() != 0x01 {
                break;
            }

            let size = entry.size();
            let raw_name = entry.name();
            let name = trimmed_ascii(&raw_name);
            let part_type_raw = entry.part_type();
            let key = format!("{name}{}", trimmed_ascii(&part_type_raw));

            // A name starting with a space marks an unused directory slot
            // (matches the source's `tmpstr[0] != 0x20` check).
            if size != 0 && !seen.contains(&key) && raw_name[0] != 0x20 && !name.is_empty() {
                seen.insert(key);

                if name != "MAPSOURC" && name != "SENDMAP2" {
                    if let Some(part_type) = PartType::from_bytes(&part_type_raw) {
                        let offset = entry.block0() as u32 * blocksize;
                        subfiles
                            .entry(name.clone())
                            .or_default()
                            .parts
                            .insert(part_type, PartInfo { offset, size });
                    } else {
                        warn!(
                            "subfile {name}: unknown part type {:?}, ignoring",
                            trimmed_ascii(&part_type_raw)
                        );
                    }
                }
            }

            pos += FAT_ENTRY_SIZE;
        }

        if pos == fat_offset {
            return Err(ImgError::Truncated(
                "failed to read any FAT entries".to_string(),
            ));
        }
        Ok(subfiles)
    }

    pub fn part_bytes(&self, part: &PartInfo) -> Result<&[u8]> {
        let start = part.offset as usize;
        let end = start + part.size as usize;
        if end > self.data.len() {
            return Err(ImgError::Truncated(format!(
                "part at {start:#x}..{end:#x} exceeds file length {}",
                self.data.len()
            )));
        }
        Ok(&self.data[start..end])
    }

    pub fn read_part(&self, subfile: &str, part_type: PartType) -> Option<Result<&[u8]>> {
        let sf = self.subfiles.get(subfile)?;
        let part = sf.parts.get(&part_type)?;
        Some(self.part_bytes(part))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn put(buf: &mut [u8], at: usize, bytes: &[u8]) {
        buf[at..at + bytes.len()].copy_from_slice(bytes);
    }

    fn build_image(fat_entries: &[(u8, &str, &str, u32, u16)]) -> Vec<u8> {
        // (flag, name, type, size, block0)
        let fat_offset_units = 2u8; // offsetFAT field, in 0x200 units
        let fat_offset = fat_offset_units as usize * 0x200;
        let mut buf = vec![0u8; fat_offset + fat_entries.len() * FAT_ENTRY_SIZE + FAT_ENTRY_SIZE];
        buf[0] = 0; // xor byte, unlocked
        put(&mut buf, 0x10, b"DSKIMG\0");
        put(&mut buf, 0x40, &[fat_offset_units]);
        put(&mut buf, 0x41, b"GARMIN\0");
        buf[0x61] = 9; // e1
        buf[0x62] = 7; // e2 -> blocksize = 1<<16 = 65536

        let mut pos = fat_offset;
        for &(flag, name, ptype, size, block0) in fat_entries {
            buf[pos] = flag;
            let mut name_bytes = [0x20u8; 8];
            name_bytes[..name.len()].copy_from_slice(name.as_bytes());
            put(&mut buf, pos + 1, &name_bytes);
            let mut type_bytes = [0u8; 3];
            type_bytes[..ptype.len()].copy_from_slice(ptype.as_bytes());
            put(&mut buf, pos + 9, &type_bytes);
            LittleEndian::write_u32(&mut buf[pos + 12..pos + 16], size);
            LittleEndian::write_u16(&mut buf[pos + 32..pos + 34], block0);
            pos += FAT_ENTRY_SIZE;
        }
        // Terminator entry: flag != 0x01.
        buf[pos] = 0x00;
        buf
    }

    fn write_temp(bytes: &[u8]) -> std::path::PathBuf {
        let dir = std::env::temp_dir();
        let path = dir.join(format!(
            "garmap_test_{}_{}.img",
            std::process::id(),
            bytes.len()
        ));
        std::fs::write(&path, bytes).unwrap();
        path
    }

    #[test]
    fn valid_subfile_groups_tre_and_rgn_parts() {
        let img = build_image(&[(1, "CITY0001", "TRE", 100, 1), (1, "CITY0001", "RGN", 5000, 2)]);
        let path = write_temp(&img);
        let reader = ContainerReader::open(&path).unwrap();
        std::fs::remove_file(&path).ok();
        assert_eq!(reader.blocksize, 1 << 16);
        let sf = reader.subfiles.get("CITY0001").unwrap();
        assert!(sf.is_valid_map_subfile());
        assert_eq!(sf.parts[&PartType::Tre].offset, 1 * reader.blocksize);
        assert_eq!(sf.parts[&PartType::Rgn].offset, 2 * reader.blocksize);
    }

    #[test]
    fn subfile_missing_rgn_is_dropped() {
        let img = build_image(&[(1, "CITY0001", "TRE", 100, 1)]);
        let path = write_temp(&img);
        let reader = ContainerReader::open(&path).unwrap();
        std::fs::remove_file(&path).ok();
        assert!(reader.subfiles.get("CITY0001").is_none());
    }

    #[test]
    fn mapsourc_and_sendmap2_sections_are_skipped() {
        let img = build_image(&[
            (1, "MAPSOURC", "MPS", 10, 1),
            (1, "CITY0001", "TRE", 100, 1),
            (1, "CITY0001", "RGN", 5000, 2),
        ]);
        let path = write_temp(&img);
        let reader = ContainerReader::open(&path).unwrap();
        std::fs::remove_file(&path).ok();
        assert!(!reader.subfiles.contains_key("MAPSOURC"));
        assert_eq!(reader.subfiles.len(), 1);
    }

    #[test]
    fn gmp_bearing_subfile_is_rejected_as_unsupported() {
        let img = build_image(&[
            (1, "WORLD001", "TRE", 100, 1),
            (1, "WORLD001", "RGN", 5000, 2),
            (1, "WORLD001", "GMP", 9000, 3),
        ]);
        let path = write_temp(&img);
        let err = ContainerReader::open(&path).unwrap_err();
        std::fs::remove_file(&path).ok();
        assert!(matches!(err, ImgError::UnsupportedFormat(_)));
    }

    #[test]
    fn xor_byte_nonzero_is_locked() {
        let mut img = build_image(&[(1, "CITY0001", "TRE", 100, 1), (1, "CITY0001", "RGN", 5000, 2)]);
        img[0] = 0x5A;
        let path = write_temp(&img);
        let err = ContainerReader::open(&path).unwrap_err();
        std::fs::remove_file(&path).ok();
        assert!(matches!(err, ImgError::Locked));
    }

    #[test]
    fn second_entry_with_zero_size_does_not_override_the_first() {
        // spec.md §8 boundary scenario 3.
        let img = build_image(&[
            (1, "CITY0001", "TRE", 100, 1),
            (1, "CITY0001", "TRE", 0, 99), // same subfile+part, size=0
            (1, "CITY0001", "RGN", 5000, 2),
        ]);
        let path = write_temp(&img);
        let reader = ContainerReader::open(&path).unwrap();
        std::fs::remove_file(&path).ok();
        assert_eq!(reader.subfiles.len(), 1);
        assert_eq!(
            reader.subfiles["CITY0001"].parts[&PartType::Tre].offset,
            1 * reader.blocksize
        );
    }

    #[test]
    fn duplicate_fat_entries_are_deduped() {
        let img = build_image(&[
            (1, "CITY0001", "TRE", 100, 1),
            (1, "CITY0001", "TRE", 100, 1), // Sendmap-style duplicate
            (1, "CITY0001", "RGN", 5000, 2),
        ]);
        let path = write_temp(&img);
        let reader = ContainerReader::open(&path).unwrap();
        std::fs::remove_file(&path).ok();
        assert_eq!(reader.subfiles.len(), 1);
    }
}
