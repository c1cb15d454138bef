//! Text decoding for CSV exports of unknown origin.
//!
//! Exports come from spreadsheets saved on whatever machine the operator had at hand,
//! so the bytes are tried against a fixed list of encodings. A candidate is accepted only
//! when its decoded header carries every column the caller needs.
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextEncoding {
    Utf8,
    Utf8Bom,
    /// Strict Latin-1: C1 control bytes (0x80-0x9F) are rejected so that
    /// Windows-1252 gets a chance at them.
    Latin1,
    Windows1252,
    /// Permissive ISO-8859-1: every byte maps to the code point of the same value.
    Iso8859_1,
}

impl TextEncoding {
    pub const PRIORITY: [TextEncoding; 5] = [
        TextEncoding::Utf8,
        TextEncoding::Utf8Bom,
        TextEncoding::Latin1,
        TextEncoding::Windows1252,
        TextEncoding::Iso8859_1,
    ];

    pub fn label(self) -> &'static str {
        match self {
            TextEncoding::Utf8 => "utf-8",
            TextEncoding::Utf8Bom => "utf-8-sig",
            TextEncoding::Latin1 => "latin-1",
            TextEncoding::Windows1252 => "cp1252",
            TextEncoding::Iso8859_1 => "iso-8859-1",
        }
    }

    /// Decode `bytes`, or `None` if they are not valid in this encoding.
    pub fn decode(self, bytes: &[u8]) -> Option<String> {
        match self {
            TextEncoding::Utf8 => {
                if bytes.starts_with(b"\xEF\xBB\xBF") {
                    return None;
                }
                std::str::from_utf8(bytes).ok().map(str::to_string)
            }
            TextEncoding::Utf8Bom => {
                let body = bytes.strip_prefix(b"\xEF\xBB\xBF")?;
                std::str::from_utf8(body).ok().map(str::to_string)
            }
            TextEncoding::Latin1 => {
                if bytes.iter().any(|b| (0x80..=0x9F).contains(b)) {
                    return None;
                }
                Some(bytes.iter().map(|&b| b as char).collect())
            }
            TextEncoding::Windows1252 => bytes.iter().map(|&b| cp1252_char(b)).collect(),
            TextEncoding::Iso8859_1 => Some(bytes.iter().map(|&b| b as char).collect()),
        }
    }
}

impl fmt::Display for TextEncoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

// 0x80-0x9F block of Windows-1252; `None` marks the five unassigned bytes.
const CP1252_HIGH: [Option<char>; 32] = [
    Some('\u{20AC}'), None, Some('\u{201A}'), Some('\u{0192}'),
    Some('\u{201E}'), Some('\u{2026}'), Some('\u{2020}'), Some('\u{2021}'),
    Some('\u{02C6}'), Some('\u{2030}'), Some('\u{0160}'), Some('\u{2039}'),
    Some('\u{0152}'), None, Some('\u{017D}'), None,
    None, Some('\u{2018}'), Some('\u{2019}'), Some('\u{201C}'),
    Some('\u{201D}'), Some('\u{2022}'), Some('\u{2013}'), Some('\u{2014}'),
    Some('\u{02DC}'), Some('\u{2122}'), Some('\u{0161}'), Some('\u{203A}'),
    Some('\u{0153}'), None, Some('\u{017E}'), Some('\u{0178}'),
];

fn cp1252_char(b: u8) -> Option<char> {
    match b {
        0x80..=0x9F => CP1252_HIGH[(b - 0x80) as usize],
        _ => Some(b as char),
    }
}

/// Why no encoding was accepted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodeFailure {
    /// Not a single encoding produced text (unreachable with the permissive fallback,
    /// kept for custom priority lists).
    Undecodable,
    /// Text decoded but the header lacked these columns under every encoding;
    /// reported for the first encoding that decoded.
    MissingColumns {
        encoding: TextEncoding,
        missing: Vec<String>,
    },
}

/// Header labels of `text`, or `None` when the first record cannot be read.
fn header_labels(text: &str) -> Option<Vec<String>> {
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(text.as_bytes());
    let headers = rdr.headers().ok()?;
    Some(headers.iter().map(str::to_string).collect())
}

fn missing_columns(labels: &[String], required: &[&str]) -> Vec<String> {
    required
        .iter()
        .filter(|col| !labels.iter().any(|l| l == *col))
        .map(|col| col.to_string())
        .collect()
}

/// Try each encoding in priority order and return the first whose header has `required`.
pub fn decode_csv(
    bytes: &[u8],
    required: &[&str],
) -> Result<(TextEncoding, String), DecodeFailure> {
    let mut first_miss: Option<DecodeFailure> = None;
    for encoding in TextEncoding::PRIORITY {
        let Some(text) = encoding.decode(bytes) else {
            continue;
        };
        let Some(labels) = header_labels(&text) else {
            continue;
        };
        let missing = missing_columns(&labels, required);
        if missing.is_empty() {
            return Ok((encoding, text));
        }
        tracing::debug!(%encoding, ?missing, "header incomplete under encoding");
        first_miss.get_or_insert(DecodeFailure::MissingColumns { encoding, missing });
    }
    Err(first_miss.unwrap_or(DecodeFailure::Undecodable))
}
