//! Zip container access for `.docx` files.

use std::io::{self, Cursor, Write};

use zip::result::ZipError;
use zip::write::SimpleFileOptions;
use zip::{ZipArchive, ZipWriter};

use crate::Error;

pub const DOCUMENT_ENTRY: &str = "word/document.xml";

/// An archive opened over an in-memory buffer.
pub struct DocxPackage<'a> {
    archive: ZipArchive<Cursor<&'a [u8]>>,
}

impl<'a> DocxPackage<'a> {
    pub fn read(bytes: &'a [u8]) -> Result<Self, Error> {
        let archive = ZipArchive::new(Cursor::new(bytes)).map_err(Error::InvalidContainer)?;
        Ok(Self { archive })
    }

    pub fn entry_names(&self) -> impl Iterator<Item = &str> {
        self.archive.file_names()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.archive.index_for_name(name).is_some()
    }

    /// UTF-8 contents of `name`.
    pub fn entry_text(&mut self, name: &str) -> Result<String, Error> {
        let mut entry = match self.archive.by_name(name) {
            Ok(entry) => entry,
            Err(ZipError::FileNotFound) => {
                return Err(Error::MissingRequiredEntry(name.to_string()))
            }
            Err(err) => return Err(Error::InvalidContainer(err)),
        };
        // The declared size comes from the archive and is not trusted for allocation.
        let mut data = Vec::new();
        io::copy(&mut entry, &mut data).map_err(|e| Error::InvalidContainer(ZipError::Io(e)))?;
        String::from_utf8(data)
            .map_err(|e| Error::InvalidMarkup(format!("`{name}` is not valid UTF-8: {e}")))
    }

    /// A new archive identical to this one except for the data of `name`.
    ///
    /// Other entries are raw-copied, so their compressed bytes are untouched;
    /// the replaced entry keeps its compression method and position.
    pub fn replace_entry(&mut self, name: &str, data: &[u8]) -> Result<Vec<u8>, Error> {
        if !self.contains(name) {
            return Err(Error::MissingRequiredEntry(name.to_string()));
        }
        let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
        for idx in 0..self.archive.len() {
            let entry = self.archive.by_index(idx).map_err(Error::InvalidContainer)?;
            if entry.name() == name {
                let options =
                    SimpleFileOptions::default().compression_method(entry.compression());
                drop(entry);
                writer
                    .start_file(name, options)
                    .map_err(Error::InvalidContainer)?;
                writer
                    .write_all(data)
                    .map_err(|e| Error::InvalidContainer(ZipError::Io(e)))?;
            } else {
                writer.raw_copy_file(entry).map_err(Error::InvalidContainer)?;
            }
        }
        let cursor = writer.finish().map_err(Error::InvalidContainer)?;
        Ok(cursor.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn archive(entries: &[(&str, &str)]) -> Vec<u8> {
        let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
        for (name, body) in entries {
            writer
                .start_file(*name, SimpleFileOptions::default())
                .unwrap();
            writer.write_all(body.as_bytes()).unwrap();
        }
        writer.finish().unwrap().into_inner()
    }

    #[test]
    fn reads_required_entry() {
        let bytes = archive(&[("[Content_Types].xml", "<Types/>"), (DOCUMENT_ENTRY, "<w:document/>")]);
        let mut package = DocxPackage::read(&bytes).unwrap();
        assert_eq!(package.entry_text(DOCUMENT_ENTRY).unwrap(), "<w:document/>");
    }

    #[test]
    fn garbage_is_invalid_container() {
        let err = DocxPackage::read(b"definitely not a zip").err().unwrap();
        assert!(matches!(err, Error::InvalidContainer(_)));
    }

    #[test]
    fn missing_document_is_reported() {
        let bytes = archive(&[("docProps/app.xml", "<Properties/>")]);
        let mut package = DocxPackage::read(&bytes).unwrap();
        let err = package.entry_text(DOCUMENT_ENTRY).unwrap_err();
        assert!(matches!(err, Error::MissingRequiredEntry(name) if name == DOCUMENT_ENTRY));
    }

    /// Rewrites the zip64 uncompressed size of the first central directory entry.
    fn forge_declared_size(bytes: &mut [u8], size: u64) {
        let header = bytes
            .windows(4)
            .position(|w| w == [0x50, 0x4b, 0x01, 0x02])
            .expect("central directory header");
        let field = |bytes: &[u8], at: usize| u16::from_le_bytes([bytes[at], bytes[at + 1]]) as usize;
        // Point the 32-bit size at the zip64 extra, whose first field is the uncompressed size.
        bytes[header + 24..header + 28].copy_from_slice(&[0xff; 4]);
        let (name_len, extra_len) = (field(bytes, header + 28), field(bytes, header + 30));
        let mut at = header + 46 + name_len;
        let end = at + extra_len;
        while at + 4 <= end {
            let (id, len) = (field(bytes, at), field(bytes, at + 2));
            if id == 0x0001 {
                bytes[at + 4..at + 12].copy_from_slice(&size.to_le_bytes());
                return;
            }
            at += 4 + len;
        }
        panic!("no zip64 extra field");
    }

    #[test]
    fn oversized_declared_entry_is_not_trusted() {
        let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
        let options = SimpleFileOptions::default()
            .compression_method(zip::CompressionMethod::Stored)
            .large_file(true);
        writer.start_file(DOCUMENT_ENTRY, options).unwrap();
        writer.write_all(b"<w:document/>").unwrap();
        let mut bytes = writer.finish().unwrap().into_inner();
        forge_declared_size(&mut bytes, u64::MAX / 2);

        match DocxPackage::read(&bytes) {
            Err(err) => assert!(matches!(err, Error::InvalidContainer(_)), "{err:?}"),
            Ok(mut package) => match package.entry_text(DOCUMENT_ENTRY) {
                Ok(text) => assert_eq!(text, "<w:document/>"),
                Err(err) => assert!(matches!(err, Error::InvalidContainer(_)), "{err:?}"),
            },
        }
    }

    #[test]
    fn replace_entry_keeps_other_entries_and_order() {
        let bytes = archive(&[
            ("[Content_Types].xml", "<Types/>"),
            (DOCUMENT_ENTRY, "<old/>"),
            ("word/styles.xml", "<w:styles/>"),
        ]);
        let mut package = DocxPackage::read(&bytes).unwrap();
        let rewritten = package.replace_entry(DOCUMENT_ENTRY, b"<new/>").unwrap();

        let mut reopened = DocxPackage::read(&rewritten).unwrap();
        let names: Vec<String> = reopened.entry_names().map(str::to_string).collect();
        assert_eq!(names.len(), 3);
        assert!(names.contains(&"word/styles.xml".to_string()));
        assert_eq!(reopened.entry_text(DOCUMENT_ENTRY).unwrap(), "<new/>");
        assert_eq!(reopened.entry_text("word/styles.xml").unwrap(), "<w:styles/>");
        assert_eq!(reopened.entry_text("[Content_Types].xml").unwrap(), "<Types/>");
    }
}
