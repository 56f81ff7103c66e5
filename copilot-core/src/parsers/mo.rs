//! Reader for compiled gettext catalogs.
//!
//! Layout: magic, revision, string count, offset of the original-string table,
//! offset of the translation table. Each table holds `(length, offset)` pairs.
//! Plural messages join `msgid` and `msgid_plural` with NUL, and their
//! translations join every form with NUL.

use crate::model::entry::PluralForms;
use crate::model::record::RawRecord;
use crate::services::encoding;

const MAGIC: u32 = 0x9504_12de;
const HEADER_LEN: usize = 20;

#[derive(Clone, Copy)]
enum ByteOrder {
    Little,
    Big,
}

struct Reader<'a> {
    bytes: &'a [u8],
    order: ByteOrder,
}

impl<'a> Reader<'a> {
    fn u32_at(&self, pos: usize) -> Result<u32, String> {
        let raw: [u8; 4] = self
            .bytes
            .get(pos..pos + 4)
            .and_then(|s| s.try_into().ok())
            .ok_or_else(|| format!("truncated file at offset {pos}"))?;
        Ok(match self.order {
            ByteOrder::Little => u32::from_le_bytes(raw),
            ByteOrder::Big => u32::from_be_bytes(raw),
        })
    }

    /// String number `index` of the table starting at `table`.
    fn string(&self, table: usize, index: usize) -> Result<&'a [u8], String> {
        let slot = table + index * 8;
        let len = self.u32_at(slot)? as usize;
        let offset = self.u32_at(slot + 4)? as usize;
        self.bytes
            .get(offset..offset.saturating_add(len))
            .ok_or_else(|| format!("string {index} points outside the file"))
    }
}

/// Parses a compiled catalog. The header entry (empty msgid) is not returned.
pub fn parse(bytes: &[u8]) -> Result<Vec<RawRecord>, String> {
    if bytes.len() < HEADER_LEN {
        return Err("file too short for a compiled catalog".into());
    }

    let order = match (
        u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]),
        u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]),
    ) {
        (MAGIC, _) => ByteOrder::Little,
        (_, MAGIC) => ByteOrder::Big,
        _ => return Err("bad magic number".into()),
    };

    let reader = Reader { bytes, order };

    let revision = reader.u32_at(4)?;
    if revision >> 16 > 1 {
        return Err(format!("unsupported revision {revision:#x}"));
    }

    let count = reader.u32_at(8)? as usize;
    let originals = reader.u32_at(12)? as usize;
    let translations = reader.u32_at(16)? as usize;

    let mut pairs: Vec<(&[u8], &[u8])> = Vec::with_capacity(count.min(bytes.len() / 8));
    let mut header: Option<&[u8]> = None;

    for i in 0..count {
        let msgid = reader.string(originals, i)?;
        let msgstr = reader.string(translations, i)?;
        if msgid.is_empty() {
            header = Some(msgstr);
        } else {
            pairs.push((msgid, msgstr));
        }
    }

    let sample: Vec<u8> = pairs
        .iter()
        .flat_map(|(id, s)| id.iter().chain(s.iter()).copied())
        .collect();
    let enc = encoding::resolve(header, &sample);

    Ok(pairs
        .into_iter()
        .map(|(msgid, msgstr)| {
            let msgid = encoding::decode(enc, msgid);
            let msgstr = encoding::decode(enc, msgstr);
            to_record(msgid, msgstr)
        })
        .collect())
}

fn to_record(msgid: String, msgstr: String) -> RawRecord {
    match msgid.split_once('\0') {
        Some((key, plural_key)) => RawRecord {
            key: key.to_string(),
            plural_key: plural_key.to_string(),
            singular_text: String::new(),
            plural_texts: msgstr
                .split('\0')
                .enumerate()
                .map(|(i, s)| (i as u32, s.to_string()))
                .collect::<PluralForms>(),
        },
        None => RawRecord {
            key: msgid,
            plural_key: String::new(),
            singular_text: msgstr,
            plural_texts: PluralForms::new(),
        },
    }
}
