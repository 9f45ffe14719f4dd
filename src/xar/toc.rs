//! XML table-of-contents parsing.
//!
//! The TOC describes each heap entry as a `<file>` element carrying a
//! `<name>` plus a `<data>` block with `<offset>`, `<length>`, an
//! `<encoding>` style and optional `<extracted-checksum>`. Elements without
//! a `<data>` block (directories, metadata) carry no payload and are not
//! part of the entry table.

use std::collections::HashMap;

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use tracing::debug;

use super::entry::{ChecksumKind, EntryChecksum, EntryCompression, XarEntry};
use crate::{Error, Result};

#[derive(Default)]
struct FileContext {
    name: Option<String>,
    offset: Option<u64>,
    length: Option<u64>,
    compression: EntryCompression,
    checksum_kind: Option<ChecksumKind>,
    checksum_value: Option<String>,
}

impl FileContext {
    fn into_entry(self, container_kind: ChecksumKind) -> Option<XarEntry> {
        let name = self.name?;
        let offset = self.offset?;
        let length = self.length?;
        let checksum = self.checksum_value.and_then(|value| {
            let kind = self.checksum_kind.unwrap_or(container_kind);
            match kind {
                ChecksumKind::None => None,
                kind => Some(EntryChecksum {
                    kind,
                    value: value.to_ascii_lowercase(),
                }),
            }
        });
        Some(XarEntry {
            name,
            offset,
            length,
            compression: self.compression,
            checksum,
        })
    }
}

fn style_attribute(element: &BytesStart<'_>) -> Result<Option<String>> {
    for attr in element.attributes() {
        let attr = attr.map_err(|e| Error::format(format!("bad TOC attribute: {}", e)))?;
        if attr.key.as_ref() == b"style" {
            let value = attr
                .unescape_value()
                .map_err(|e| Error::format(format!("bad TOC attribute value: {}", e)))?;
            return Ok(Some(value.into_owned()));
        }
    }
    Ok(None)
}

fn parse_field(name: &str, text: &str) -> Result<u64> {
    text.trim()
        .parse()
        .map_err(|_| Error::format(format!("non-numeric TOC field <{}>: `{}`", name, text.trim())))
}

/// Parse the inflated TOC XML into the name-keyed entry table.
///
/// `container_kind` is the header's checksum selector; entry checksums that
/// do not declare their own algorithm fall back to it.
pub(crate) fn parse(xml: &[u8], container_kind: ChecksumKind) -> Result<HashMap<String, XarEntry>> {
    let mut reader = Reader::from_reader(xml);
    let mut buf = Vec::new();

    let mut entries = HashMap::new();
    let mut file_stack: Vec<FileContext> = Vec::new();
    let mut path: Vec<String> = Vec::new();
    let mut text = String::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => {
                let tag = String::from_utf8_lossy(e.name().as_ref()).into_owned();
                if tag == "file" {
                    file_stack.push(FileContext::default());
                } else if in_data(&path) {
                    if let Some(ctx) = file_stack.last_mut() {
                        if tag == "encoding" {
                            if let Some(style) = style_attribute(&e)? {
                                ctx.compression = EntryCompression::from_style(&style);
                            }
                        } else if tag == "extracted-checksum" {
                            if let Some(style) = style_attribute(&e)? {
                                ctx.checksum_kind = Some(ChecksumKind::from_style(&style));
                            }
                        }
                    }
                }
                path.push(tag);
                text.clear();
            }
            Ok(Event::Empty(e)) => {
                let tag = e.name();
                if tag.as_ref() == b"encoding" && in_data(&path) {
                    if let Some(ctx) = file_stack.last_mut() {
                        if let Some(style) = style_attribute(&e)? {
                            ctx.compression = EntryCompression::from_style(&style);
                        }
                    }
                }
            }
            Ok(Event::End(e)) => {
                let tag = String::from_utf8_lossy(e.name().as_ref()).into_owned();

                if let Some(ctx) = file_stack.last_mut() {
                    if tag == "name" && !in_data(&path) && ctx.name.is_none() {
                        ctx.name = Some(text.trim().to_string());
                    } else if in_data(&path) {
                        if tag == "offset" && ctx.offset.is_none() {
                            ctx.offset = Some(parse_field("offset", &text)?);
                        } else if tag == "length" && ctx.length.is_none() {
                            ctx.length = Some(parse_field("length", &text)?);
                        } else if tag == "extracted-checksum" {
                            ctx.checksum_value = Some(text.trim().to_string());
                        }
                    }
                }

                if tag == "file" {
                    if let Some(ctx) = file_stack.pop() {
                        if let Some(entry) = ctx.into_entry(container_kind) {
                            entries.insert(entry.name.clone(), entry);
                        }
                    }
                }

                path.pop();
                text.clear();
            }
            Ok(Event::Text(e)) => {
                text.push_str(&String::from_utf8_lossy(e.as_ref()));
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(Error::format(format!("TOC XML parse error: {}", e))),
            _ => {}
        }
        buf.clear();
    }

    debug!(entries = entries.len(), "parsed container TOC");
    Ok(entries)
}

fn in_data(path: &[String]) -> bool {
    path.iter().any(|t| t == "data")
}
