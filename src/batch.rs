//! Parsing many independent documents at once.
//!
//! Every document gets its own [`ReferenceContext`](crate::ReferenceContext);
//! only the schema and the parser are shared between rayon workers.

use std::fs::{self, File};
use std::io::BufReader;
use std::path::{Path, PathBuf};

use rayon::prelude::*;
use tracing::{error, info};

use crate::error::{ParseError, Result};
use crate::parser::{GmlDocument, GmlFeatureParser};

pub(crate) fn is_gml_file_name(name: &str) -> bool {
    let name = name.to_ascii_lowercase();
    name.ends_with(".gml") || name.ends_with(".xml")
}

/// Recursively collects `.gml` and `.xml` files below `dir`, sorted by path.
pub fn collect_input_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let entries = fs::read_dir(dir)?.collect::<std::io::Result<Vec<_>>>()?;

    let nested = entries
        .into_par_iter()
        .map(|entry| -> Result<Vec<PathBuf>> {
            let path = entry.path();
            if path.is_dir() {
                collect_input_files(&path)
            } else if path
                .file_name()
                .and_then(|s| s.to_str())
                .is_some_and(is_gml_file_name)
            {
                Ok(vec![path])
            } else {
                Ok(Vec::new())
            }
        })
        .collect::<Result<Vec<_>>>()?;

    let mut files: Vec<PathBuf> = nested.into_iter().flatten().collect();
    files.sort();
    Ok(files)
}

/// Parses each file in parallel. Results keep the order of `paths`.
pub fn parse_files(
    parser: &GmlFeatureParser<'_>,
    paths: &[PathBuf],
    default_srs: Option<&str>,
) -> Vec<(PathBuf, Result<GmlDocument>)> {
    let results: Vec<_> = paths
        .par_iter()
        .map(|path| {
            let result = File::open(path)
                .map_err(ParseError::from)
                .and_then(|file| parser.parse_document(BufReader::new(file), default_srs));
            if let Err(e) = &result {
                error!("{}: {}", path.display(), e);
            }
            (path.clone(), result)
        })
        .collect();

    let failed = results.iter().filter(|(_, r)| r.is_err()).count();
    info!(
        "Parsed {} documents ({} failed)",
        results.len() - failed,
        failed
    );
    results
}

/// Collects and parses every GML document below `dir`.
pub fn parse_directory(
    parser: &GmlFeatureParser<'_>,
    dir: &Path,
    default_srs: Option<&str>,
) -> Result<Vec<(PathBuf, Result<GmlDocument>)>> {
    let files = collect_input_files(dir)?;
    info!("Found {} input files in {:?}", files.len(), dir);
    Ok(parse_files(parser, &files, default_srs))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::name::QName;
    use crate::schema::{ApplicationSchema, FeatureType, PropertyDeclaration, ValueCategory};
    use tempfile::TempDir;

    fn schema() -> ApplicationSchema {
        ApplicationSchema::builder()
            .feature_type(
                FeatureType::new(QName::new("urn:app", "Road"))
                    .with_property(PropertyDeclaration::new(QName::new("urn:app", "name"), ValueCategory::Simple)),
            )
            .build()
    }

    fn road(id: &str) -> String {
        format!(r#"<app:Road xmlns:app="urn:app" fid="{id}"><app:name>{id}</app:name></app:Road>"#)
    }

    #[test]
    fn test_collect_input_files_recurses() {
        let dir = TempDir::new().unwrap();
        fs::create_dir(dir.path().join("sub")).unwrap();
        fs::write(dir.path().join("b.gml"), road("b")).unwrap();
        fs::write(dir.path().join("sub/a.xml"), road("a")).unwrap();
        fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let files = collect_input_files(dir.path()).unwrap();
        assert_eq!(files.len(), 2);
        assert!(files.iter().all(|f| f.extension().is_some()));
        assert!(!files.iter().any(|f| f.ends_with("notes.txt")));
    }

    #[test]
    fn test_parse_directory_keeps_per_document_context() {
        let dir = TempDir::new().unwrap();
        // the same id in two documents is not a duplicate
        fs::write(dir.path().join("one.gml"), road("r1")).unwrap();
        fs::write(dir.path().join("two.gml"), road("r1")).unwrap();
        fs::write(dir.path().join("broken.gml"), "<app:River xmlns:app=\"urn:app\"/>").unwrap();

        let schema = schema();
        let parser = GmlFeatureParser::new(&schema);
        let results = parse_directory(&parser, dir.path(), None).unwrap();

        assert_eq!(results.len(), 3);
        let ok: Vec<_> = results.iter().filter_map(|(_, r)| r.as_ref().ok()).collect();
        assert_eq!(ok.len(), 2);
        assert!(ok.iter().all(|doc| doc.feature("r1").is_some()));
    }

    #[test]
    fn test_file_name_filter() {
        assert!(is_gml_file_name("tile.GML"));
        assert!(is_gml_file_name("dir/tile.xml"));
        assert!(!is_gml_file_name("tile.zip"));
    }
}
