//! Office Open XML (docx, pptx) text extraction

use super::{Document, IngestionError};
use quick_xml::events::Event;
use quick_xml::Reader;
use std::io::{Cursor, Read};
use zip::ZipArchive;

const ZIP_MAGIC: &[u8] = b"PK\x03\x04";
const EMPTY_ZIP_MAGIC: &[u8] = b"PK\x05\x06";

/// Whether the bytes start like a ZIP container
pub fn looks_like_zip(bytes: &[u8]) -> bool {
    bytes.starts_with(ZIP_MAGIC) || bytes.starts_with(EMPTY_ZIP_MAGIC)
}

fn open_archive<'a>(bytes: &'a [u8], file_name: &str) -> Result<ZipArchive<Cursor<&'a [u8]>>, IngestionError> {
    if !looks_like_zip(bytes) {
        return Err(IngestionError::NotAValidDocument {
            file: file_name.to_string(),
        });
    }

    ZipArchive::new(Cursor::new(bytes)).map_err(|_| IngestionError::NotAValidDocument {
        file: file_name.to_string(),
    })
}

fn read_entry(
    archive: &mut ZipArchive<Cursor<&[u8]>>,
    entry: &str,
    file_name: &str,
) -> Result<String, IngestionError> {
    let mut xml = String::new();
    archive
        .by_name(entry)
        .map_err(|e| IngestionError::Parse {
            file: file_name.to_string(),
            reason: format!("{}: {}", entry, e),
        })?
        .read_to_string(&mut xml)
        .map_err(|e| IngestionError::Parse {
            file: file_name.to_string(),
            reason: format!("{}: {}", entry, e),
        })?;
    Ok(xml)
}

/// Word document body as a single document
pub fn extract_docx(bytes: &[u8], file_name: &str) -> Result<Vec<Document>, IngestionError> {
    let mut archive = open_archive(bytes, file_name)?;
    let xml = read_entry(&mut archive, "word/document.xml", file_name)?;
    let text = xml_text(&xml).map_err(|reason| IngestionError::Parse {
        file: file_name.to_string(),
        reason,
    })?;

    if text.trim().is_empty() {
        return Ok(Vec::new());
    }
    Ok(vec![Document::new(text, file_name)])
}

/// One document per slide, in slide order
pub fn extract_pptx(bytes: &[u8], file_name: &str) -> Result<Vec<Document>, IngestionError> {
    let mut archive = open_archive(bytes, file_name)?;

    let mut slides: Vec<(usize, String)> = archive
        .file_names()
        .filter_map(|name| {
            let number = name
                .strip_prefix("ppt/slides/slide")?
                .strip_suffix(".xml")?
                .parse::<usize>()
                .ok()?;
            Some((number, name.to_string()))
        })
        .collect();
    slides.sort_by_key(|(number, _)| *number);

    let mut documents = Vec::new();
    for (number, entry) in slides {
        let xml = read_entry(&mut archive, &entry, file_name)?;
        let text = xml_text(&xml).map_err(|reason| IngestionError::Parse {
            file: file_name.to_string(),
            reason,
        })?;

        if text.trim().is_empty() {
            continue;
        }

        let mut document = Document::new(text, file_name);
        document
            .metadata
            .insert("slide".to_string(), serde_json::json!(number));
        documents.push(document);
    }

    Ok(documents)
}

/// Collect the text runs (`w:t`, `a:t`) of an OOXML part, one line per
/// paragraph
fn xml_text(xml: &str) -> Result<String, String> {
    let mut reader = Reader::from_str(xml);
    let mut text = String::new();
    let mut in_run = false;

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => {
                if e.local_name().as_ref() == b"t" {
                    in_run = true;
                }
            }
            Ok(Event::Empty(e)) => match e.local_name().as_ref() {
                b"tab" => text.push('\t'),
                b"br" => text.push('\n'),
                _ => {}
            },
            Ok(Event::Text(t)) if in_run => {
                let run = t.unescape().map_err(|e| e.to_string())?;
                text.push_str(&run);
            }
            Ok(Event::End(e)) => match e.local_name().as_ref() {
                b"t" => in_run = false,
                b"p" => text.push('\n'),
                _ => {}
            },
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(e) => {
                return Err(format!(
                    "XML error at position {}: {}",
                    reader.buffer_position(),
                    e
                ))
            }
        }
    }

    Ok(text.trim().to_string())
}
