//! TrueType to WOFF2 conversion.
//!
//! Tables are stored with null transforms and the concatenated table data is
//! compressed as a single brotli stream, which is what the WOFF2 container
//! requires of a conforming encoder that skips the optional glyf/loca and
//! hmtx transforms.

use std::io::Write;

use crate::registry::Category;
use crate::task::{read_bytes, write_output, Task, TaskContext, TaskError, TaskReport};
use crate::transforms::{display_name, output_path};

const WOFF2_SIGNATURE: u32 = 0x774F_4632;
const WOFF2_HEADER_LEN: usize = 48;
const SFNT_HEADER_LEN: usize = 12;
const SFNT_RECORD_LEN: usize = 16;

const BROTLI_QUALITY: u32 = 11;
const BROTLI_WINDOW: u32 = 22;

/// Tags with a one-byte encoding in the table directory, by index.
const KNOWN_TAGS: [&[u8; 4]; 63] = [
    b"cmap", b"head", b"hhea", b"hmtx", b"maxp", b"name", b"OS/2", b"post", b"cvt ", b"fpgm",
    b"glyf", b"loca", b"prep", b"CFF ", b"VORG", b"EBDT", b"EBLC", b"gasp", b"hdmx", b"kern",
    b"LTSH", b"PCLT", b"VDMX", b"vhea", b"vmtx", b"BASE", b"GDEF", b"GPOS", b"GSUB", b"EBSC",
    b"JSTF", b"MATH", b"CBDT", b"CBLC", b"COLR", b"CPAL", b"SVG ", b"sbix", b"acnt", b"avar",
    b"bdat", b"bloc", b"bsln", b"cvar", b"fdsc", b"feat", b"fmtx", b"fvar", b"gvar", b"hsty",
    b"just", b"lcar", b"mort", b"morx", b"opbd", b"prop", b"trak", b"Zapf", b"Silf", b"Glat",
    b"Gloc", b"Feat", b"Sill",
];

/// Converts `.ttf` files to `.woff2`, one to one.
#[derive(Debug, Default, Clone, Copy)]
pub struct FontsTask;

impl Task for FontsTask {
    fn name(&self) -> &'static str {
        "fonts"
    }

    fn category(&self) -> Option<Category> {
        Some(Category::Fonts)
    }

    fn run(&self, ctx: &TaskContext) -> Result<TaskReport, TaskError> {
        let mut report = TaskReport::new(self.name());
        let out_dir = ctx.output_dir(Category::Fonts)?;

        for source in ctx.sources(Category::Fonts)? {
            let font = read_bytes(&source.path)?;

            match ttf_to_woff2(&font) {
                Ok(woff2) => write_output(
                    &mut report,
                    output_path(&out_dir, &source.relative, "woff2"),
                    woff2,
                )?,
                Err(message) => {
                    ctx.notifier.notify(
                        "Fonts",
                        &format!("{}: {}", display_name(&source.path), message),
                    );
                    report.failures += 1;
                }
            }
        }

        Ok(report)
    }
}

struct SfntTable<'a> {
    tag: [u8; 4],
    data: &'a [u8],
}

fn read_u16(bytes: &[u8], at: usize) -> Option<u16> {
    bytes.get(at..at + 2).map(|b| u16::from_be_bytes([b[0], b[1]]))
}

fn read_u32(bytes: &[u8], at: usize) -> Option<u32> {
    bytes
        .get(at..at + 4)
        .map(|b| u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
}

fn parse_sfnt(font: &[u8]) -> Result<(u32, Vec<SfntTable<'_>>), String> {
    let flavor = read_u32(font, 0).ok_or("file too short for an sfnt header")?;
    if !matches!(flavor, 0x0001_0000 | 0x7472_7565 | 0x4F54_544F) {
        return Err(format!("unsupported sfnt version {:#010x}", flavor));
    }

    let num_tables = read_u16(font, 4).ok_or("file too short for an sfnt header")? as usize;
    let mut tables = Vec::with_capacity(num_tables);

    for i in 0..num_tables {
        let record = SFNT_HEADER_LEN + i * SFNT_RECORD_LEN;
        let tag = font
            .get(record..record + 4)
            .ok_or("truncated table directory")?;
        let offset = read_u32(font, record + 8).ok_or("truncated table directory")? as usize;
        let length = read_u32(font, record + 12).ok_or("truncated table directory")? as usize;
        let data = offset
            .checked_add(length)
            .and_then(|end| font.get(offset..end))
            .ok_or_else(|| format!("table {} out of bounds", String::from_utf8_lossy(tag)))?;

        tables.push(SfntTable {
            tag: [tag[0], tag[1], tag[2], tag[3]],
            data,
        });
    }

    tables.sort_by(|a, b| a.tag.cmp(&b.tag));
    Ok((flavor, tables))
}

/// Big-endian base-128 with continuation bits, no leading zero bytes.
fn push_base128(out: &mut Vec<u8>, mut value: u32) {
    let mut groups = [0u8; 5];
    let mut len = 0;
    loop {
        groups[len] = (value & 0x7f) as u8;
        len += 1;
        value >>= 7;
        if value == 0 {
            break;
        }
    }
    for i in (0..len).rev() {
        let continuation = if i == 0 { 0 } else { 0x80 };
        out.push(groups[i] | continuation);
    }
}

fn pad4(len: usize) -> usize {
    (len + 3) & !3
}

/// Wrap a TrueType/OpenType font in a WOFF2 container.
pub(crate) fn ttf_to_woff2(font: &[u8]) -> Result<Vec<u8>, String> {
    let (flavor, tables) = parse_sfnt(font)?;
    if tables.is_empty() {
        return Err("font has no tables".to_string());
    }

    let mut directory = Vec::new();
    let mut stream = Vec::new();
    let mut sfnt_size = SFNT_HEADER_LEN + SFNT_RECORD_LEN * tables.len();

    for table in &tables {
        // glyf and loca encode the null transform as version 3; every other
        // table uses version 0.
        let transform: u8 = if &table.tag == b"glyf" || &table.tag == b"loca" {
            0xC0
        } else {
            0x00
        };

        match KNOWN_TAGS.iter().position(|known| **known == table.tag) {
            Some(index) => directory.push(transform | index as u8),
            None => {
                directory.push(transform | 0x3F);
                directory.extend_from_slice(&table.tag);
            }
        }
        push_base128(&mut directory, table.data.len() as u32);

        stream.extend_from_slice(table.data);
        sfnt_size += pad4(table.data.len());
    }

    let mut compressed = Vec::new();
    {
        let mut writer =
            brotli::CompressorWriter::new(&mut compressed, 4096, BROTLI_QUALITY, BROTLI_WINDOW);
        writer.write_all(&stream).map_err(|e| e.to_string())?;
        writer.flush().map_err(|e| e.to_string())?;
    }

    let total = pad4(WOFF2_HEADER_LEN + directory.len() + compressed.len());

    let mut out = Vec::with_capacity(total);
    out.extend_from_slice(&WOFF2_SIGNATURE.to_be_bytes());
    out.extend_from_slice(&flavor.to_be_bytes());
    out.extend_from_slice(&(total as u32).to_be_bytes());
    out.extend_from_slice(&(tables.len() as u16).to_be_bytes());
    out.extend_from_slice(&0u16.to_be_bytes());
    out.extend_from_slice(&(sfnt_size as u32).to_be_bytes());
    out.extend_from_slice(&(compressed.len() as u32).to_be_bytes());
    out.extend_from_slice(&1u16.to_be_bytes());
    out.extend_from_slice(&0u16.to_be_bytes());
    // metadata and private blocks: offset, length, original length / offset, length
    out.extend_from_slice(&[0u8; 20]);

    out.extend_from_slice(&directory);
    out.extend_from_slice(&compressed);
    out.resize(total, 0);

    Ok(out)
}
