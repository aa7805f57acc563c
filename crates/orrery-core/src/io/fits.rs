use std::fs::File;
use std::io::Write;
use std::path::Path;

use byteorder::{BigEndian, ByteOrder};
use memmap2::Mmap;
use ndarray::Array2;

use crate::consts::{FITS_BLOCK_SIZE, FITS_CARD_SIZE};
use crate::error::{OrreryError, Result};

/// Keywords describing data layout; regenerated rather than copied when an
/// image is written.
const STRUCTURAL_KEYWORDS: &[&str] = &[
    "SIMPLE", "XTENSION", "BITPIX", "NAXIS", "EXTEND", "PCOUNT", "GCOUNT", "BSCALE", "BZERO",
    "END", "CHECKSUM", "DATASUM",
];

/// One 80-character header record.
#[derive(Clone, Debug, PartialEq)]
pub struct Card {
    pub keyword: String,
    /// Value with string quoting removed; `None` for commentary cards.
    pub value: Option<String>,
    pub comment: Option<String>,
    raw: String,
}

impl Card {
    fn parse(raw: &[u8]) -> Self {
        let raw = String::from_utf8_lossy(raw).into_owned();
        let keyword = raw.get(..8).unwrap_or(raw.as_str()).trim_end().to_string();
        let (value, comment) = if raw.get(8..10) == Some("= ") {
            parse_value(raw.get(10..).unwrap_or(""))
        } else {
            (None, None)
        };
        Self {
            keyword,
            value,
            comment,
            raw,
        }
    }

    /// Build a value card. Strings are quoted; everything else is written
    /// right-aligned as given.
    pub fn new(keyword: &str, value: CardValue<'_>) -> Self {
        let text = match value {
            CardValue::Str(s) => format!("{:<8}= '{:<8}'", keyword, s.replace('\'', "''")),
            CardValue::Logical(b) => format!("{:<8}= {:>20}", keyword, if b { "T" } else { "F" }),
            CardValue::Int(i) => format!("{:<8}= {:>20}", keyword, i),
            CardValue::Float(f) => format!("{:<8}= {:>20}", keyword, format_float(f)),
        };
        Self::parse(pad_card(&text).as_bytes())
    }

    fn is_structural(&self) -> bool {
        STRUCTURAL_KEYWORDS.contains(&self.keyword.as_str())
            || (self.keyword.starts_with("NAXIS") && self.keyword.len() > 5)
    }
}

/// Value written by [`Card::new`].
#[derive(Clone, Copy, Debug)]
pub enum CardValue<'a> {
    Str(&'a str),
    Logical(bool),
    Int(i64),
    Float(f64),
}

fn parse_value(field: &str) -> (Option<String>, Option<String>) {
    let trimmed = field.trim_start();
    if let Some(rest) = trimmed.strip_prefix('\'') {
        let mut value = String::new();
        let mut chars = rest.chars().peekable();
        let mut tail = String::new();
        while let Some(c) = chars.next() {
            if c == '\'' {
                if chars.peek() == Some(&'\'') {
                    chars.next();
                    value.push('\'');
                } else {
                    tail = chars.collect();
                    break;
                }
            } else {
                value.push(c);
            }
        }
        let comment = tail
            .split_once('/')
            .map(|(_, c)| c.trim().to_string())
            .filter(|c| !c.is_empty());
        (Some(value.trim_end().to_string()), comment)
    } else {
        let (value, comment) = match trimmed.split_once('/') {
            Some((v, c)) => (v, Some(c.trim().to_string()).filter(|c| !c.is_empty())),
            None => (trimmed, None),
        };
        let value = value.trim();
        ((!value.is_empty()).then(|| value.to_string()), comment)
    }
}

fn format_float(f: f64) -> String {
    let s = format!("{f:E}");
    if s.len() > 20 {
        format!("{f:.12E}")
    } else {
        s
    }
}

fn pad_card(text: &str) -> String {
    let mut card: String = text
        .chars()
        .map(|c| if c.is_ascii() { c } else { '?' })
        .take(FITS_CARD_SIZE)
        .collect();
    while card.len() < FITS_CARD_SIZE {
        card.push(' ');
    }
    card
}

/// Ordered header cards of one HDU.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct FitsHeader {
    cards: Vec<Card>,
}

impl FitsHeader {
    pub fn cards(&self) -> &[Card] {
        &self.cards
    }

    pub fn push(&mut self, card: Card) {
        self.cards.push(card);
    }

    /// Value of the first card with `keyword`.
    pub fn get(&self, keyword: &str) -> Option<&str> {
        self.cards
            .iter()
            .find(|c| c.keyword == keyword)
            .and_then(|c| c.value.as_deref())
    }

    pub fn get_i64(&self, keyword: &str) -> Option<i64> {
        let v = self.get(keyword)?;
        v.parse().ok().or_else(|| self.get_f64(keyword).map(|f| f as i64))
    }

    pub fn get_f64(&self, keyword: &str) -> Option<f64> {
        self.get(keyword)?.replace(['D', 'd'], "E").parse().ok()
    }

    /// Parse cards up to END. Returns the header and its padded byte length.
    fn parse(bytes: &[u8]) -> Result<(Self, usize)> {
        let mut cards = Vec::new();
        for (i, raw) in bytes.chunks_exact(FITS_CARD_SIZE).enumerate() {
            let card = Card::parse(raw);
            if card.keyword == "END" {
                let used = (i + 1) * FITS_CARD_SIZE;
                return Ok((Self { cards }, pad_to_block(used)));
            }
            cards.push(card);
        }
        Err(OrreryError::InvalidFits("header has no END card".into()))
    }

    fn required(&self, keyword: &str) -> Result<i64> {
        self.get_i64(keyword)
            .ok_or_else(|| OrreryError::InvalidFits(format!("missing {keyword} keyword")))
    }
}

fn pad_to_block(len: usize) -> usize {
    len.div_ceil(FITS_BLOCK_SIZE) * FITS_BLOCK_SIZE
}

/// One header/data unit.
#[derive(Clone, Debug)]
pub struct Hdu {
    pub header: FitsHeader,
    data_offset: usize,
    data_len: usize,
}

impl Hdu {
    pub fn bitpix(&self) -> Option<i64> {
        self.header.get_i64("BITPIX")
    }

    /// Axis lengths, NAXIS1 first.
    pub fn axes(&self) -> Vec<usize> {
        let naxis = self.header.get_i64("NAXIS").unwrap_or(0).max(0);
        (1..=naxis)
            .map(|i| {
                self.header
                    .get_i64(&format!("NAXIS{i}"))
                    .unwrap_or(0)
                    .max(0) as usize
            })
            .collect()
    }

    fn is_image(&self) -> bool {
        let image_ext = match self.header.get("XTENSION") {
            None => true,
            Some(kind) => kind.trim() == "IMAGE",
        };
        image_ext && self.axes().len() >= 2 && self.data_len > 0
    }
}

/// Decoded 2-D image plane plus the header it came with.
#[derive(Clone, Debug)]
pub struct FitsImage {
    pub header: FitsHeader,
    /// Physical pixel values, row-major, shape = (NAXIS2, NAXIS1).
    pub data: Array2<f32>,
}

/// Reader over a complete FITS file held in memory or memory-mapped.
pub struct FitsReader<B> {
    buf: B,
    hdus: Vec<Hdu>,
}

impl FitsReader<Mmap> {
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path)?;
        let mmap = unsafe { Mmap::map(&file)? };
        Self::new(mmap)
    }
}

impl FitsReader<Vec<u8>> {
    pub fn from_bytes(bytes: Vec<u8>) -> Result<Self> {
        Self::new(bytes)
    }
}

impl<B: AsRef<[u8]>> FitsReader<B> {
    fn new(buf: B) -> Result<Self> {
        let hdus = scan_hdus(buf.as_ref())?;
        Ok(Self { buf, hdus })
    }

    pub fn hdus(&self) -> &[Hdu] {
        &self.hdus
    }

    /// First value of `keyword` found in any HDU, primary first.
    pub fn find_keyword(&self, keyword: &str) -> Option<&str> {
        self.hdus.iter().find_map(|h| h.header.get(keyword))
    }

    /// Decode the first image plane in the file.
    pub fn read_image(&self) -> Result<FitsImage> {
        let hdu = self
            .hdus
            .iter()
            .find(|h| h.is_image())
            .ok_or_else(|| OrreryError::InvalidFits("no image data found".into()))?;
        let axes = hdu.axes();
        let (width, height) = (axes[0], axes[1]);
        let bitpix = hdu.header.required("BITPIX")?;
        let value_bytes = bytes_per_value(bitpix)?;
        let bscale = hdu.header.get_f64("BSCALE").unwrap_or(1.0);
        let bzero = hdu.header.get_f64("BZERO").unwrap_or(0.0);

        let pixels = width.checked_mul(height).ok_or_else(too_large)?;
        let plane_bytes = pixels.checked_mul(value_bytes).ok_or_else(too_large)?;
        let start = hdu.data_offset;
        let end = start.checked_add(plane_bytes).ok_or_else(too_large)?;
        let raw = self
            .buf
            .as_ref()
            .get(start..end)
            .ok_or_else(|| OrreryError::InvalidFits("image data truncated".into()))?;

        let mut values = Vec::with_capacity(pixels);
        for chunk in raw.chunks_exact(value_bytes) {
            let v = match bitpix {
                8 => chunk[0] as f64,
                16 => BigEndian::read_i16(chunk) as f64,
                32 => BigEndian::read_i32(chunk) as f64,
                64 => BigEndian::read_i64(chunk) as f64,
                -32 => BigEndian::read_f32(chunk) as f64,
                // -64; anything else was rejected above.
                _ => BigEndian::read_f64(chunk),
            };
            values.push((v * bscale + bzero) as f32);
        }

        let data = Array2::from_shape_vec((height, width), values)
            .map_err(|e| OrreryError::InvalidFits(e.to_string()))?;
        Ok(FitsImage {
            header: hdu.header.clone(),
            data,
        })
    }
}

fn scan_hdus(buf: &[u8]) -> Result<Vec<Hdu>> {
    if !buf.starts_with(b"SIMPLE") {
        return Err(OrreryError::InvalidFits("missing SIMPLE keyword".into()));
    }
    let mut hdus = Vec::new();
    let mut offset = 0;
    while offset + FITS_BLOCK_SIZE <= buf.len() {
        let (header, header_len) = FitsHeader::parse(&buf[offset..])?;
        let data_offset = offset + header_len;
        let data_len = data_size(&header)?;
        hdus.push(Hdu {
            header,
            data_offset,
            data_len,
        });
        offset = data_len
            .checked_next_multiple_of(FITS_BLOCK_SIZE)
            .and_then(|padded| data_offset.checked_add(padded))
            .ok_or_else(too_large)?;
        if !buf.get(offset..).is_some_and(|rest| rest.starts_with(b"XTENSION")) {
            break;
        }
    }
    Ok(hdus)
}

fn too_large() -> OrreryError {
    OrreryError::InvalidFits("data size overflows".into())
}

/// Width in bytes of one stored value; only the standard BITPIX codes are
/// accepted.
fn bytes_per_value(bitpix: i64) -> Result<usize> {
    match bitpix {
        8 => Ok(1),
        16 => Ok(2),
        32 | -32 => Ok(4),
        64 | -64 => Ok(8),
        other => Err(OrreryError::InvalidFits(format!(
            "unsupported BITPIX {other}"
        ))),
    }
}

fn data_size(header: &FitsHeader) -> Result<usize> {
    let width = bytes_per_value(header.required("BITPIX")?)?;
    let naxis = header.required("NAXIS")?;
    if naxis <= 0 {
        return Ok(0);
    }
    let mut count: usize = 1;
    for i in 1..=naxis {
        let len = header.required(&format!("NAXIS{i}"))?.max(0);
        let len = usize::try_from(len).map_err(|_| too_large())?;
        count = count.checked_mul(len).ok_or_else(too_large)?;
    }
    let pcount = usize::try_from(header.get_i64("PCOUNT").unwrap_or(0).max(0))
        .map_err(|_| too_large())?;
    let gcount = usize::try_from(header.get_i64("GCOUNT").unwrap_or(1).max(0))
        .map_err(|_| too_large())?;
    pcount
        .checked_add(count)
        .and_then(|n| n.checked_mul(gcount))
        .and_then(|n| n.checked_mul(width))
        .ok_or_else(too_large)
}

/// Serialise `image` as a single-HDU FITS file with 32-bit float data.
///
/// Non-structural cards from the source header (DATE-OBS and friends) are
/// carried over unchanged.
pub fn encode_image(image: &FitsImage) -> Vec<u8> {
    let (height, width) = image.data.dim();
    let mut cards = vec![
        Card::new("SIMPLE", CardValue::Logical(true)),
        Card::new("BITPIX", CardValue::Int(-32)),
        Card::new("NAXIS", CardValue::Int(2)),
        Card::new("NAXIS1", CardValue::Int(width as i64)),
        Card::new("NAXIS2", CardValue::Int(height as i64)),
    ];
    cards.extend(
        image
            .header
            .cards()
            .iter()
            .filter(|c| !c.is_structural())
            .cloned(),
    );

    let mut out = Vec::with_capacity(pad_to_block((cards.len() + 1) * FITS_CARD_SIZE));
    for card in &cards {
        out.extend_from_slice(pad_card(&card.raw).as_bytes());
    }
    out.extend_from_slice(pad_card("END").as_bytes());
    out.resize(pad_to_block(out.len()), b' ');

    let data_start = out.len();
    for &v in image.data.iter() {
        out.extend_from_slice(&v.to_be_bytes());
    }
    let data_len = out.len() - data_start;
    out.resize(data_start + pad_to_block(data_len), 0);
    out
}

pub fn write_image(path: &Path, image: &FitsImage) -> Result<()> {
    let mut file = File::create(path)?;
    file.write_all(&encode_image(image))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_quoted_string_with_comment() {
        let text = "DATE-OBS= '2019-01-02T03:04:05' / start of exposure";
        let card = Card::parse(pad_card(text).as_bytes());
        assert_eq!(card.keyword, "DATE-OBS");
        assert_eq!(card.value.as_deref(), Some("2019-01-02T03:04:05"));
        assert_eq!(card.comment.as_deref(), Some("start of exposure"));
    }

    #[test]
    fn parses_escaped_quotes() {
        let card = Card::parse(pad_card("OBSERVER= 'O''Neil  '").as_bytes());
        assert_eq!(card.value.as_deref(), Some("O'Neil"));
    }

    #[test]
    fn parses_numeric_values() {
        let mut header = FitsHeader::default();
        header.push(Card::parse(pad_card("BITPIX  =                  -32").as_bytes()));
        header.push(Card::parse(pad_card("EXPTIME =              1.5D+01 / seconds").as_bytes()));
        assert_eq!(header.get_i64("BITPIX"), Some(-32));
        assert_eq!(header.get_f64("EXPTIME"), Some(15.0));
    }

    #[test]
    fn commentary_cards_have_no_value() {
        let card = Card::parse(pad_card("COMMENT   = not a value").as_bytes());
        assert_eq!(card.keyword, "COMMENT");
        assert_eq!(card.value, None);
    }

    #[test]
    fn naxis_n_is_structural() {
        assert!(Card::new("NAXIS3", CardValue::Int(1)).is_structural());
        assert!(!Card::new("DATE-OBS", CardValue::Str("x")).is_structural());
    }

    #[test]
    fn encode_then_read_preserves_pixels_and_cards() {
        let mut header = FitsHeader::default();
        header.push(Card::new("DATE-OBS", CardValue::Str("2019-01-02T03:04")));
        header.push(Card::new("BZERO", CardValue::Float(32768.0)));
        let data = Array2::from_shape_fn((3, 5), |(r, c)| (r * 5 + c) as f32 - 2.0);
        let bytes = encode_image(&FitsImage {
            header,
            data: data.clone(),
        });
        assert_eq!(bytes.len() % FITS_BLOCK_SIZE, 0);

        let reader = FitsReader::from_bytes(bytes).unwrap();
        assert_eq!(reader.find_keyword("DATE-OBS"), Some("2019-01-02T03:04"));
        let image = reader.read_image().unwrap();
        assert_eq!(image.data, data);
        assert_eq!(image.header.get("BZERO"), None);
    }

    #[test]
    fn rejects_non_fits_data() {
        assert!(FitsReader::from_bytes(b"GIF89a".to_vec()).is_err());
    }
}
