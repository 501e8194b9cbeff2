use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use super::schema::{CompiledMapping, ElementKind, Granularity, SchemaMapping};
use super::SchemaError;
use crate::document::has_extension;

/// One row of the `elements` table.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NormalizedRecord {
    pub document: String,
    /// Index in the source element list
    pub position: u32,
    pub kind: ElementKind,
    pub path: Option<String>,
    pub text: Option<String>,
    pub page: Option<u32>,
    pub attributes: Map<String, Value>,
}

#[derive(Debug, Clone)]
pub struct NormalizedDocument {
    pub stem: String,
    pub sources: Vec<PathBuf>,
    /// Elements found in the source list, skipped kinds included
    pub element_count: usize,
    pub records: Vec<NormalizedRecord>,
}

#[derive(Debug, Default)]
pub struct NormalizeReport {
    pub documents: Vec<NormalizedDocument>,
    pub failed: Vec<(String, SchemaError)>,
}

impl NormalizeReport {
    pub fn success_count(&self) -> usize {
        self.documents.len()
    }

    pub fn failure_count(&self) -> usize {
        self.failed.len()
    }

    pub fn record_count(&self) -> usize {
        self.documents.iter().map(|d| d.records.len()).sum()
    }
}

/// Flattens structured extraction JSON into [`NormalizedRecord`]s as
/// described by a [`SchemaMapping`].
#[derive(Debug, Clone)]
pub struct JsonNormalizer {
    mapping: CompiledMapping,
}

impl JsonNormalizer {
    pub fn new(mapping: SchemaMapping) -> Result<Self, SchemaError> {
        Ok(Self {
            mapping: mapping.compile()?,
        })
    }

    pub fn mapping(&self) -> &SchemaMapping {
        self.mapping.mapping()
    }

    /// Normalize every document under `json_dir`. A missing directory has
    /// no documents; a bad document is recorded and the pass continues.
    pub fn normalize_dir(&self, json_dir: &Path) -> std::io::Result<NormalizeReport> {
        let mut report = NormalizeReport::default();

        for (stem, sources) in discover_documents(json_dir, self.mapping().document_file.as_deref())? {
            let result = if sources.is_empty() {
                Err(SchemaError::NoJson(json_dir.join(&stem)))
            } else {
                self.normalize_files(&stem, &sources)
            };
            match result {
                Ok(doc) => {
                    debug!("{}: {} rows", stem, doc.records.len());
                    report.documents.push(doc);
                }
                Err(e) => {
                    warn!("{}: {}", stem, e);
                    report.failed.push((stem, e));
                }
            }
        }

        Ok(report)
    }

    /// Normalize one document made of one or more JSON files. Positions
    /// continue across files in the given order.
    pub fn normalize_files(
        &self,
        stem: &str,
        sources: &[PathBuf],
    ) -> Result<NormalizedDocument, SchemaError> {
        let mut elements = Vec::new();
        for path in sources {
            let text = std::fs::read_to_string(path).map_err(|source| SchemaError::Io {
                path: path.clone(),
                source,
            })?;
            let root: Value = serde_json::from_str(&text).map_err(|source| {
                SchemaError::InvalidJson {
                    path: path.clone(),
                    source,
                }
            })?;
            elements.extend(self.element_list(&root)?.iter().cloned());
        }

        let records = self.rows(stem, &elements)?;
        Ok(NormalizedDocument {
            stem: stem.to_string(),
            sources: sources.to_vec(),
            element_count: elements.len(),
            records,
        })
    }

    /// Normalize an already parsed document.
    pub fn normalize_value(
        &self,
        stem: &str,
        root: &Value,
    ) -> Result<Vec<NormalizedRecord>, SchemaError> {
        self.rows(stem, self.element_list(root)?)
    }

    fn element_list<'a>(&self, root: &'a Value) -> Result<&'a [Value], SchemaError> {
        let pointer = &self.mapping().elements;
        let value = root
            .pointer(pointer)
            .ok_or_else(|| SchemaError::MissingElements {
                pointer: pointer.clone(),
            })?;
        value
            .as_array()
            .map(Vec::as_slice)
            .ok_or_else(|| SchemaError::NotAnArray {
                pointer: pointer.clone(),
            })
    }

    fn rows(&self, stem: &str, elements: &[Value]) -> Result<Vec<NormalizedRecord>, SchemaError> {
        let mut records = Vec::with_capacity(elements.len());

        for (index, element) in elements.iter().enumerate() {
            if !element.is_object() {
                return Err(SchemaError::InvalidElement { index });
            }
            let record = self.element_record(stem, index, element);
            if !self.mapping.is_skipped(record.kind) {
                records.push(record);
            }
        }

        match self.mapping().granularity {
            Granularity::Element => Ok(records),
            Granularity::Document => Ok(vec![document_record(stem, elements.len(), &records)]),
        }
    }

    fn element_record(&self, stem: &str, index: usize, element: &Value) -> NormalizedRecord {
        let columns = &self.mapping().columns;
        let lookup = |pointer: &Option<String>| pointer.as_deref().and_then(|p| element.pointer(p));

        let path = lookup(&columns.path).and_then(text_of);
        let text = lookup(&columns.text).and_then(text_of);
        let page = lookup(&columns.page)
            .and_then(Value::as_u64)
            .and_then(|p| u32::try_from(p).ok());

        let attributes = self
            .mapping()
            .attributes
            .iter()
            .filter_map(|(name, pointer)| {
                element
                    .pointer(pointer)
                    .filter(|v| !v.is_null())
                    .map(|v| (name.clone(), v.clone()))
            })
            .collect();

        NormalizedRecord {
            document: stem.to_string(),
            position: u32::try_from(index).unwrap_or(u32::MAX),
            kind: self.mapping.classify(path.as_deref()),
            path,
            text,
            page,
            attributes,
        }
    }
}

fn text_of(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

fn document_record(stem: &str, element_count: usize, records: &[NormalizedRecord]) -> NormalizedRecord {
    let text = records
        .iter()
        .filter_map(|r| r.text.as_deref())
        .map(str::trim_end)
        .filter(|t| !t.is_empty())
        .collect::<Vec<_>>()
        .join("\n");
    let pages: BTreeSet<u32> = records.iter().filter_map(|r| r.page).collect();

    let mut attributes = Map::new();
    attributes.insert("element_count".into(), element_count.into());
    attributes.insert("page_count".into(), pages.len().into());

    NormalizedRecord {
        document: stem.to_string(),
        position: 0,
        kind: ElementKind::Document,
        path: None,
        text: (!text.is_empty()).then_some(text),
        page: None,
        attributes,
    }
}

/// Find the documents under `json_dir`, ordered by name.
///
/// Each subdirectory is one document named after the directory, read from
/// `document_file` or from every `.json` file it holds directly. Hidden
/// directories (unpacks in progress) are ignored. Loose `.json` files at
/// the top level are documents named by their stem.
pub fn discover_documents(
    json_dir: &Path,
    document_file: Option<&str>,
) -> std::io::Result<Vec<(String, Vec<PathBuf>)>> {
    if !json_dir.exists() {
        return Ok(Vec::new());
    }

    let mut entries = std::fs::read_dir(json_dir)?
        .map(|entry| entry.map(|e| e.path()))
        .collect::<std::io::Result<Vec<_>>>()?;
    entries.sort();

    let mut documents = Vec::new();
    for path in entries {
        if path.is_dir() {
            let Some(stem) = path.file_name().and_then(|n| n.to_str()) else {
                warn!("Skipping non UTF-8 directory {}", path.display());
                continue;
            };
            if stem.starts_with('.') {
                debug!("Skipping hidden directory {}", path.display());
                continue;
            }
            let sources = match document_file {
                Some(name) => vec![path.join(name)],
                None => json_files(&path)?,
            };
            documents.push((stem.to_string(), sources));
        } else if has_extension(&path, "json") {
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                documents.push((stem.to_string(), vec![path.clone()]));
            }
        }
    }

    Ok(documents)
}

fn json_files(dir: &Path) -> std::io::Result<Vec<PathBuf>> {
    let mut files = std::fs::read_dir(dir)?
        .map(|entry| entry.map(|e| e.path()))
        .filter(|p| p.as_ref().map_or(true, |p| p.is_file() && has_extension(p, "json")))
        .collect::<std::io::Result<Vec<_>>>()?;
    files.sort();
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample() -> Value {
        json!({
            "version": {"json_export": "1.0"},
            "elements": [
                {"Path": "//Document/H1", "Text": "Annual Report ", "Page": 0,
                 "Font": {"name": "Arial-Bold"}, "TextSize": 24.0},
                {"Path": "//Document/P", "Text": "Revenue grew.", "Page": 0},
                {"Path": "//Document/Table", "Page": 1,
                 "filePaths": ["tables/fileoutpart0.csv"]},
                {"Path": "//Document/Table/TR/TD/P", "Text": "2020", "Page": 1},
                {"Path": "//Document/Table/TR/TD[2]/P", "Text": "41.2", "Page": 1},
                {"Path": "//Document/Figure", "Page": 1,
                 "filePaths": ["figures/fileoutpart1.png"]},
                {"Path": "//Document/P[2]", "Text": "Outlook is stable.", "Page": 2}
            ]
        })
    }

    fn normalizer() -> JsonNormalizer {
        JsonNormalizer::new(SchemaMapping::pdf_services()).unwrap()
    }

    #[test]
    fn test_one_row_per_element_in_order() {
        let records = normalizer().normalize_value("report", &sample()).unwrap();

        let text_rows = records
            .iter()
            .filter(|r| matches!(r.kind, ElementKind::Heading | ElementKind::Paragraph))
            .count();
        let cell_rows = records.iter().filter(|r| r.kind == ElementKind::TableCell).count();
        assert_eq!(text_rows, 3);
        assert_eq!(cell_rows, 2);
        assert_eq!(records.len(), 7);

        let positions: Vec<u32> = records.iter().map(|r| r.position).collect();
        assert_eq!(positions, vec![0, 1, 2, 3, 4, 5, 6]);
        assert!(records.iter().all(|r| r.document == "report"));

        assert_eq!(records[0].kind, ElementKind::Heading);
        assert_eq!(records[0].text.as_deref(), Some("Annual Report "));
        assert_eq!(records[0].attributes["font"], json!("Arial-Bold"));
        assert_eq!(records[2].kind, ElementKind::Table);
        assert_eq!(records[2].text, None);
        assert_eq!(records[2].page, Some(1));
        assert_eq!(records[5].kind, ElementKind::Figure);
        assert_eq!(
            records[5].attributes["file_paths"],
            json!(["figures/fileoutpart1.png"])
        );
    }

    #[test]
    fn test_skipped_kinds_keep_positions() {
        let mut mapping = SchemaMapping::pdf_services();
        mapping.skip_kinds = vec![ElementKind::Table, ElementKind::Figure];
        let records = JsonNormalizer::new(mapping)
            .unwrap()
            .normalize_value("report", &sample())
            .unwrap();

        let positions: Vec<u32> = records.iter().map(|r| r.position).collect();
        assert_eq!(positions, vec![0, 1, 3, 4, 6]);
    }

    #[test]
    fn test_document_granularity() {
        let mut mapping = SchemaMapping::pdf_services();
        mapping.granularity = Granularity::Document;
        let records = JsonNormalizer::new(mapping)
            .unwrap()
            .normalize_value("report", &sample())
            .unwrap();

        assert_eq!(records.len(), 1);
        let row = &records[0];
        assert_eq!(row.kind, ElementKind::Document);
        assert_eq!(row.position, 0);
        assert_eq!(
            row.text.as_deref(),
            Some("Annual Report\nRevenue grew.\n2020\n41.2\nOutlook is stable.")
        );
        assert_eq!(row.attributes["element_count"], json!(7));
        assert_eq!(row.attributes["page_count"], json!(3));
    }

    #[test]
    fn test_schema_errors() {
        let n = normalizer();

        assert!(matches!(
            n.normalize_value("x", &json!({"pages": []})),
            Err(SchemaError::MissingElements { .. })
        ));
        assert!(matches!(
            n.normalize_value("x", &json!({"elements": {"Path": "//Document"}})),
            Err(SchemaError::NotAnArray { .. })
        ));
        assert!(matches!(
            n.normalize_value("x", &json!({"elements": [{"Text": "ok"}, 3]})),
            Err(SchemaError::InvalidElement { index: 1 })
        ));
    }

    #[test]
    fn test_empty_element_list() {
        let records = normalizer()
            .normalize_value("blank", &json!({"elements": []}))
            .unwrap();
        assert!(records.is_empty());
    }

    #[test]
    fn test_normalize_dir_continues_past_bad_document() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();

        std::fs::create_dir_all(root.join("a")).unwrap();
        std::fs::write(root.join("a/structuredData.json"), sample().to_string()).unwrap();
        std::fs::create_dir_all(root.join("b")).unwrap();
        std::fs::write(root.join("b/structuredData.json"), "{ not json").unwrap();
        std::fs::create_dir_all(root.join("c")).unwrap();
        std::fs::write(root.join("c/structuredData.json"), r#"{"elements": []}"#).unwrap();
        std::fs::create_dir_all(root.join("d")).unwrap();

        let report = normalizer().normalize_dir(root).unwrap();

        let ok: Vec<&str> = report.documents.iter().map(|d| d.stem.as_str()).collect();
        assert_eq!(ok, vec!["a", "c"]);
        assert_eq!(report.record_count(), 7);
        assert_eq!(report.failure_count(), 2);
        assert_eq!(report.failed[0].0, "b");
        assert!(matches!(report.failed[0].1, SchemaError::InvalidJson { .. }));
        assert_eq!(report.failed[1].0, "d");
        assert!(matches!(report.failed[1].1, SchemaError::Io { .. }));
    }

    #[test]
    fn test_discover_loose_and_merged_files() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();

        std::fs::write(root.join("Loose Doc.json"), r#"{"elements": [{"Text": "x"}]}"#).unwrap();
        std::fs::write(root.join("notes.txt"), "ignored").unwrap();
        std::fs::create_dir_all(root.join("split")).unwrap();
        std::fs::write(root.join("split/2.json"), r#"{"elements": [{"Text": "b"}]}"#).unwrap();
        std::fs::write(root.join("split/1.json"), r#"{"elements": [{"Text": "a"}]}"#).unwrap();

        let docs = discover_documents(root, None).unwrap();
        let stems: Vec<&str> = docs.iter().map(|(s, _)| s.as_str()).collect();
        assert_eq!(stems, vec!["Loose Doc", "split"]);

        let mut mapping = SchemaMapping::pdf_services();
        mapping.document_file = None;
        let n = JsonNormalizer::new(mapping).unwrap();
        let doc = n.normalize_files("split", &docs[1].1).unwrap();

        let texts: Vec<_> = doc.records.iter().map(|r| r.text.clone().unwrap()).collect();
        assert_eq!(texts, vec!["a", "b"]);
        assert_eq!(doc.records[1].position, 1);
        assert_eq!(doc.element_count, 2);
    }

    #[test]
    fn test_directory_without_json_is_failure() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();

        std::fs::create_dir_all(root.join("ghost/figures")).unwrap();
        std::fs::write(root.join("ghost/figures/fileoutpart0.png"), b"png").unwrap();
        std::fs::create_dir_all(root.join(".real.unpacking")).unwrap();
        std::fs::write(root.join(".real.unpacking/part.json"), r#"{"elements": []}"#).unwrap();
        std::fs::create_dir_all(root.join("real")).unwrap();
        std::fs::write(root.join("real/part.json"), r#"{"elements": [{"Text": "x"}]}"#).unwrap();

        let mut mapping = SchemaMapping::pdf_services();
        mapping.document_file = None;
        let report = JsonNormalizer::new(mapping).unwrap().normalize_dir(root).unwrap();

        assert_eq!(report.success_count(), 1);
        assert_eq!(report.documents[0].stem, "real");
        assert_eq!(report.failure_count(), 1);
        assert_eq!(report.failed[0].0, "ghost");
        match &report.failed[0].1 {
            SchemaError::NoJson(path) => assert_eq!(path, &root.join("ghost")),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_missing_json_dir_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let report = normalizer().normalize_dir(&dir.path().join("absent")).unwrap();
        assert_eq!(report.success_count(), 0);
        assert_eq!(report.failure_count(), 0);
    }
}
