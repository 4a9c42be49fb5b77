use std::fs::File;
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};

use rayon::prelude::*;
use tracing::{debug, info};
use zip::ZipArchive;

use crate::batch::is_gml_file_name;
use crate::error::Result;
use crate::parser::{GmlDocument, GmlFeatureParser};

/// A zipped dataset of GML documents.
///
/// Only entries ending in `.gml` or `.xml` are read; each one is parsed as an
/// independent document.
pub struct ZipHandler {
    path: PathBuf,
}

impl ZipHandler {
    /// Creates a handler for the archive at `path`. The archive is opened
    /// lazily by each operation.
    ///
    /// # Arguments
    /// * `path` - Path to the zip file
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn open(&self) -> Result<ZipArchive<BufReader<File>>> {
        let file = File::open(&self.path)?;
        Ok(ZipArchive::new(BufReader::new(file))?)
    }

    /// Names of the `.gml` / `.xml` entries, in archive order.
    pub fn list_entries(&self) -> Result<Vec<String>> {
        let archive = self.open()?;
        Ok(archive
            .file_names()
            .filter(|name| is_gml_file_name(name))
            .map(str::to_owned)
            .collect())
    }

    /// Reads the content of every GML entry.
    pub fn read_entries(&self) -> Result<Vec<(String, Vec<u8>)>> {
        let mut archive = self.open()?;
        let mut entries = Vec::new();
        for i in 0..archive.len() {
            let mut file = archive.by_index(i)?;
            if file.is_dir() || !is_gml_file_name(file.name()) {
                continue;
            }
            let name = file.name().to_string();
            // the declared size comes from the archive header and is not trusted
            let mut contents = Vec::new();
            file.read_to_end(&mut contents)?;
            debug!("Read {} ({} bytes) from {:?}", name, contents.len(), self.path);
            entries.push((name, contents));
        }
        Ok(entries)
    }

    /// Parses every GML entry in parallel. Fails on the first document that
    /// does not parse.
    ///
    /// # Arguments
    /// * `parser` - Parser shared by all entries
    /// * `default_srs` - SRS name for geometries that carry no `srsName`
    ///
    /// # Returns
    /// * Entry names paired with their documents, in archive order
    pub fn parse_all(
        &self,
        parser: &GmlFeatureParser<'_>,
        default_srs: Option<&str>,
    ) -> Result<Vec<(String, GmlDocument)>> {
        let entries = self.read_entries()?;
        info!("Parsing {} documents from {:?}", entries.len(), self.path);

        entries
            .into_par_iter()
            .map(|(name, contents)| -> Result<(String, GmlDocument)> {
                let document = parser.parse_document(contents.as_slice(), default_srs)?;
                Ok((name, document))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ParseError;
    use crate::name::QName;
    use crate::schema::{ApplicationSchema, FeatureType, PropertyDeclaration, ValueCategory};
    use std::io::Write;
    use tempfile::TempDir;
    use zip::write::SimpleFileOptions;
    use zip::{CompressionMethod, ZipWriter};

    fn write_zip(dir: &TempDir, entries: &[(&str, &str)]) -> PathBuf {
        let path = dir.path().join("dataset.zip");
        let mut zip = ZipWriter::new(File::create(&path).unwrap());
        let options = SimpleFileOptions::default().compression_method(CompressionMethod::Stored);
        for (name, contents) in entries {
            zip.start_file(*name, options).unwrap();
            zip.write_all(contents.as_bytes()).unwrap();
        }
        zip.finish().unwrap();
        path
    }

    fn schema() -> ApplicationSchema {
        ApplicationSchema::builder()
            .feature_type(
                FeatureType::new(QName::new("urn:app", "Road"))
                    .with_property(PropertyDeclaration::new(QName::new("urn:app", "name"), ValueCategory::Simple)),
            )
            .build()
    }

    #[test]
    fn test_parse_all_entries() {
        let dir = TempDir::new().unwrap();
        let path = write_zip(
            &dir,
            &[
                ("a.gml", r#"<app:Road xmlns:app="urn:app" fid="a"><app:name>A</app:name></app:Road>"#),
                ("readme.txt", "not parsed"),
                ("b.xml", r#"<app:Road xmlns:app="urn:app" fid="b"><app:name>B</app:name></app:Road>"#),
            ],
        );

        let handler = ZipHandler::new(&path);
        assert_eq!(handler.list_entries().unwrap(), ["a.gml", "b.xml"]);

        let schema = schema();
        let parser = GmlFeatureParser::new(&schema);
        let documents = handler.parse_all(&parser, None).unwrap();
        assert_eq!(documents.len(), 2);
        assert_eq!(documents[0].0, "a.gml");
        assert_eq!(documents[1].1.root().id(), Some("b"));
    }

    #[test]
    fn test_parse_all_reports_failure() {
        let dir = TempDir::new().unwrap();
        let path = write_zip(
            &dir,
            &[
                ("good.gml", r#"<app:Road xmlns:app="urn:app"><app:name>A</app:name></app:Road>"#),
                ("bad.gml", r#"<app:River xmlns:app="urn:app"/>"#),
            ],
        );

        let schema = schema();
        let parser = GmlFeatureParser::new(&schema);
        let err = ZipHandler::new(path).parse_all(&parser, None).unwrap_err();
        assert!(matches!(err, ParseError::UnknownFeatureType { ref name, .. } if name.local_name() == "River"));
    }

    #[test]
    fn test_oversized_declared_entry_size_is_not_preallocated() {
        let dir = TempDir::new().unwrap();
        let body = r#"<app:Road xmlns:app="urn:app"><app:name>A</app:name></app:Road>"#;
        let path = write_zip(&dir, &[("a.gml", body)]);

        // claim an uncompressed size of almost 4 GiB in the central directory
        let mut bytes = std::fs::read(&path).unwrap();
        let header = bytes
            .windows(4)
            .position(|w| w == [0x50, 0x4b, 0x01, 0x02])
            .unwrap();
        bytes[header + 24..header + 28].copy_from_slice(&0xFFFF_FFF0u32.to_le_bytes());
        std::fs::write(&path, bytes).unwrap();

        match ZipHandler::new(&path).read_entries() {
            Ok(entries) => assert_eq!(entries[0].1, body.as_bytes()),
            Err(err) => assert!(matches!(err, ParseError::Archive(_) | ParseError::Io(_))),
        }
    }

    #[test]
    fn test_missing_archive_is_io_error() {
        let err = ZipHandler::new("/nonexistent/dataset.zip").read_entries().unwrap_err();
        assert!(matches!(err, ParseError::Io(_)));
    }
}
