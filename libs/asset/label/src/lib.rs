// Decodes label strings out of a subfile's LBL/NET parts.
//
// Three codings are in use across the Garmin IMG corpus, selected by a
// per-subfile `coding` byte read from the LBL header: 6-bit uppercase
// ASCII (4 characters packed into 3 bytes), 8-bit text in one of the
// Windows code pages, and plain null-terminated UTF-8. Collapsed here
// into one closed `Coding` match (spec.md §9) instead of the original's
// per-coding virtual-dispatch subclasses.

use bitstream::BitReader;
use img_error::{ImgError, Result};
use log::warn;

/// The 64-entry 6-bit alphabet. Index 0 is the stream terminator and is
/// never emitted as a character.
const SIXBIT_ALPHABET: [char; 64] = [
    ' ', 'A', 'B', 'C', 'D', 'E', 'F', 'G', 'H', 'I', 'J', 'K', 'L', 'M', 'N', 'O', 'P', 'Q', 'R',
    'S', 'T', 'U', 'V', 'W', 'X', 'Y', 'Z', '0', '1', '2', '3', '4', '5', '6', '7', '8', '9', ' ',
    '!', '"', '#', '$', '%', '&', '\'', '(', ')', '*', '+', ',', '-', '.', '/', ':', ';', '<', '=',
    '>', '?', '@', '[', ']', '_',
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Coding {
    Six,
    Eight(&'static encoding_rs::Encoding),
    Utf8,
}

impl Coding {
    /// `coding` is the byte read from the LBL header (0x06/0x09/0x0A);
    /// `codepage` is only consulted for the 8-bit coding.
    pub fn from_header(coding: u8, codepage: u16) -> Result<Self> {
        match coding {
            0x06 => Ok(Coding::Six),
            0x09 => Ok(Coding::Eight(codepage_to_encoding(codepage))),
            0x0A => Ok(Coding::Utf8),
            other => Err(ImgError::UnsupportedFormat(format!(
                "unknown label coding byte 0x{other:02x}"
            ))),
        }
    }
}

fn codepage_to_encoding(codepage: u16) -> &'static encoding_rs::Encoding {
    let label: &str = match codepage {
        1250 => "windows-1250",
        1251 => "windows-1251",
        1252 => "windows-1252",
        1253 => "windows-1253",
        1254 => "windows-1254",
        1255 => "windows-1255",
        1256 => "windows-1256",
        1257 => "windows-1257",
        1258 => "windows-1258",
        other => {
            warn!("unknown label codepage {other}, degrading to raw bytes via windows-1252");
            "windows-1252"
        }
    };
    encoding_rs::Encoding::for_label(label.as_bytes()).unwrap_or(encoding_rs::WINDOWS_1252)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LookupTarget {
    Lbl1,
    Lbl6,
    Net1,
    Poi,
}

/// LBL6 POI sub-field order, matching spec.md §8 boundary scenario 5
/// (mask 0x03 == name + city, in that order).
const LBL6_FIELDS: [&str; 8] = [
    "name", "city", "number", "street", "zip", "phone", "exit", "region",
];

pub struct LabelTable {
    coding: Coding,
    lbl_data: Vec<u8>,
    net_data: Vec<u8>,
    lbl1_offset: u32,
    lbl1_size: u32,
    addr_shift: u8,
    lbl6_offset: u32,
    lbl6_size: u32,
    net1_offset: u32,
    net1_size: u32,
    net1_addr_shift: u8,
}

impl LabelTable {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        coding: Coding,
        lbl_data: Vec<u8>,
        net_data: Vec<u8>,
        lbl1_offset: u32,
        lbl1_size: u32,
        addr_shift: u8,
        lbl6_offset: u32,
        lbl6_size: u32,
        net1_offset: u32,
        net1_size: u32,
        net1_addr_shift: u8,
    ) -> Self {
        Self {
            coding,
            lbl_data,
            net_data,
            lbl1_offset,
            lbl1_size,
            addr_shift,
            lbl6_offset,
            lbl6_size,
            net1_offset,
            net1_size,
            net1_addr_shift,
        }
    }

    /// Resolves `pointer` against `target`, returning 1..N strings.
    /// Deterministic and idempotent: the same pointer always yields the
    /// same strings, since lookups never mutate the table.
    pub fn get(&self, pointer: u32, target: LookupTarget) -> Result<Vec<String>> {
        match target {
            LookupTarget::Lbl1 => {
                let offset = self.lbl1_offset + (pointer << self.addr_shift);
                let end = self.lbl1_offset + self.lbl1_size;
                Ok(vec![self.decode_one(&self.lbl_data, offset, end)?])
            }
            LookupTarget::Net1 => {
                let offset = self.net1_offset + (pointer << self.net1_addr_shift);
                let end = self.net1_offset + self.net1_size;
                Ok(vec![self.decode_one(&self.net_data, offset, end)?])
            }
            LookupTarget::Lbl6 | LookupTarget::Poi => self.decode_lbl6(pointer),
        }
    }

    fn decode_lbl6(&self, pointer: u32) -> Result<Vec<String>> {
        let offset = self.lbl6_offset + pointer;
        let end = self.lbl6_offset + self.lbl6_size;
        if offset >= end {
            return Err(ImgError::Truncated(format!(
                "LBL6 pointer {pointer} out of range"
            )));
        }
        let mask = self.lbl_data[offset as usize];
        let mut pos = offset + 1;
        let mut out = Vec::new();
        for (bit, _name) in LBL6_FIELDS.iter().enumerate() {
            if mask & (1 << bit) == 0 {
                continue;
            }
            let (s, consumed) = self.decode_one_counted(&self.lbl_data, pos, end)?;
            out.push(s);
            pos += consumed;
        }
        Ok(out)
    }

    fn decode_one(&self, data: &[u8], offset: u32, end: u32) -> Result<String> {
        self.decode_one_counted(data, offset, end).map(|(s, _)| s)
    }

    fn decode_one_counted(&self, data: &[u8], offset: u32, end: u32) -> Result<(String, u32)> {
        if offset >= end || offset as usize >= data.len() {
            return Err(ImgError::Truncated(format!(
                "label pointer {offset} out of range"
            )));
        }
        let window_end = (end as usize).min(data.len());
        let window = &data[offset as usize..window_end];
        match self.coding {
            Coding::Six => decode_six(window),
            Coding::Eight(enc) => decode_eight(window, enc),
            Coding::Utf8 => decode_utf8(window),
        }
    }
}

fn decode_six(window: &[u8]) -> Result<(String, u32)> {
    let mut br = BitReader::new(window);
    let mut s = String::new();
    loop {
        if br.bits_remaining() < 6 {
            return Err(ImgError::Truncated("6-bit label missing terminator".into()));
        }
        let v = br.read_unsigned(6)?;
        if v == 0 {
            break;
        }
        s.push(SIXBIT_ALPHABET[v as usize & 0x3F]);
    }
    // Consumed bytes rounds up to the next whole byte, matching the
    // 4-chars-per-3-bytes packing.
    let consumed = ((br.bit_position()) as u32 + 7) / 8;
    Ok((s, consumed))
}

fn find_nul(window: &[u8]) -> Result<usize> {
    window
        .iter()
        .position(|&b| b == 0)
        .ok_or_else(|| ImgError::Truncated("label missing null terminator".into()))
}

fn decode_eight(window: &[u8], enc: &'static encoding_rs::Encoding) -> Result<(String, u32)> {
    let nul = find_nul(window)?;
    let (text, _, _) = enc.decode(&window[..nul]);
    Ok((text.into_owned(), (nul + 1) as u32))
}

fn decode_utf8(window: &[u8]) -> Result<(String, u32)> {
    let nul = find_nul(window)?;
    let text = String::from_utf8_lossy(&window[..nul]).into_owned();
    Ok((text, (nul + 1) as u32))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pack_six(text: &str) -> Vec<u8> {
        let mut bits: Vec<bool> = Vec::new();
        let push6 = |bits: &mut Vec<bool>, v: u32| {
            for i in 0..6 {
                bits.push((v >> i) & 1 != 0);
            }
        };
        for c in text.chars() {
            let idx = SIXBIT_ALPHABET.iter().position(|&a| a == c).unwrap();
            push6(&mut bits, idx as u32);
        }
        push6(&mut bits, 0); // terminator
        let mut bytes = vec![0u8; (bits.len() + 7) / 8];
        for (i, b) in bits.iter().enumerate() {
            if *b {
                bytes[i / 8] |= 1 << (i % 8);
            }
        }
        bytes
    }

    #[test]
    fn six_bit_round_trips_upper_alpha() {
        let data = pack_six("HELLO");
        let table = LabelTable::new(
            Coding::Six,
            data,
            Vec::new(),
            0,
            1000,
            0,
            0,
            0,
            0,
            0,
            0,
        );
        let got = table.get(0, LookupTarget::Lbl1).unwrap();
        assert_eq!(got, vec!["HELLO".to_string()]);
    }

    #[test]
    fn lbl1_lookup_is_deterministic_and_idempotent() {
        let data = pack_six("ABC");
        let table = LabelTable::new(Coding::Six, data, Vec::new(), 0, 1000, 0, 0, 0, 0, 0, 0);
        let a = table.get(0, LookupTarget::Lbl1).unwrap();
        let b = table.get(0, LookupTarget::Lbl1).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn utf8_coding_decodes_to_terminator() {
        let mut data = b"Caf\xc3\xa9".to_vec();
        data.push(0);
        data.push(0xFF); // trailing garbage must not be included
        let table = LabelTable::new(Coding::Utf8, data, Vec::new(), 0, 1000, 0, 0, 0, 0, 0, 0);
        let got = table.get(0, LookupTarget::Lbl1).unwrap();
        assert_eq!(got, vec!["Café".to_string()]);
    }

    #[test]
    fn lbl6_mask_0x03_returns_name_and_city_in_order() {
        let mut data = vec![0u8; 0x40];
        data[0x40 - 1] = 0; // pad, overwritten below
        data.resize(0x40, 0);
        let mut record = vec![0x03u8]; // mask: name(bit0) + city(bit1)
        record.extend(pack_six("MAINST"));
        record.extend(pack_six("AUSTIN"));
        data.splice(0x40.., record.iter().cloned());
        let table = LabelTable::new(Coding::Six, data.clone(), Vec::new(), 0, 0, 0, 0x00, data.len() as u32, 0, 0, 0);
        let got = table.get(0x40, LookupTarget::Lbl6).unwrap();
        assert_eq!(got, vec!["MAINST".to_string(), "AUSTIN".to_string()]);
    }

    #[test]
    fn unknown_codepage_degrades_instead_of_failing() {
        let enc = codepage_to_encoding(9999);
        assert_eq!(enc, encoding_rs::WINDOWS_1252);
    }
}
