//! Schema mapping for structured extraction output.
//!
//! The shape of the vendor JSON is described here as data: where the
//! element list lives, which JSON pointers feed which columns, and how an
//! element's structure path maps to an [`ElementKind`]. A format change on
//! the service side is absorbed by shipping a new mapping file.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

use super::SchemaError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ElementKind {
    Heading,
    Paragraph,
    Table,
    TableCell,
    Figure,
    List,
    Footnote,
    Document,
    Other,
}

impl ElementKind {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Heading => "heading",
            Self::Paragraph => "paragraph",
            Self::Table => "table",
            Self::TableCell => "table_cell",
            Self::Figure => "figure",
            Self::List => "list",
            Self::Footnote => "footnote",
            Self::Document => "document",
            Self::Other => "other",
        }
    }
}

impl std::fmt::Display for ElementKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ElementKind {
    type Err = SchemaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "heading" => Ok(Self::Heading),
            "paragraph" => Ok(Self::Paragraph),
            "table" => Ok(Self::Table),
            "table_cell" => Ok(Self::TableCell),
            "figure" => Ok(Self::Figure),
            "list" => Ok(Self::List),
            "footnote" => Ok(Self::Footnote),
            "document" => Ok(Self::Document),
            "other" => Ok(Self::Other),
            _ => Err(SchemaError::Mapping(format!("unknown element kind '{s}'"))),
        }
    }
}

/// How many rows a document produces
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Granularity {
    /// One row per element, in element order
    #[default]
    Element,
    /// One row per document with the element texts joined
    Document,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KindRule {
    pub kind: ElementKind,
    /// Regex matched against the element's structure path
    pub pattern: String,
}

/// JSON pointers (relative to one element) for the fixed columns
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ColumnPointers {
    pub path: Option<String>,
    pub text: Option<String>,
    pub page: Option<String>,
}

impl Default for ColumnPointers {
    fn default() -> Self {
        Self {
            path: Some("/Path".into()),
            text: Some("/Text".into()),
            page: Some("/Page".into()),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchemaMapping {
    /// Recorded alongside every normalized document
    pub version: String,
    /// File to read inside each unpacked directory; every `.json` when unset
    pub document_file: Option<String>,
    /// JSON pointer to the element array
    pub elements: String,
    pub granularity: Granularity,
    pub columns: ColumnPointers,
    /// Extra per-element values copied into the `attributes` column
    pub attributes: BTreeMap<String, String>,
    /// First matching rule wins; unmatched elements are `other`
    pub kinds: Vec<KindRule>,
    pub skip_kinds: Vec<ElementKind>,
}

impl Default for SchemaMapping {
    fn default() -> Self {
        Self::pdf_services()
    }
}

impl SchemaMapping {
    /// Mapping for the PDF Services `structuredData.json` layout.
    #[must_use]
    pub fn pdf_services() -> Self {
        let attributes = [
            ("bounds", "/Bounds"),
            ("font", "/Font/name"),
            ("text_size", "/TextSize"),
            ("lang", "/Lang"),
            ("object_id", "/ObjectID"),
            ("file_paths", "/filePaths"),
            ("attributes", "/attributes"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();

        let rule = |kind, pattern: &str| KindRule {
            kind,
            pattern: pattern.to_string(),
        };

        Self {
            version: "pdfservices-structured-v1".into(),
            document_file: Some("structuredData.json".into()),
            elements: "/elements".into(),
            granularity: Granularity::Element,
            columns: ColumnPointers::default(),
            attributes,
            kinds: vec![
                rule(ElementKind::TableCell, r"/Table(\[\d+\])?/TR(\[\d+\])?/T[DH]"),
                rule(ElementKind::Table, r"/Table(\[\d+\])?$"),
                rule(ElementKind::Figure, r"/Figure(\[\d+\])?"),
                rule(ElementKind::Heading, r"/(H\d|Title)(\[\d+\])?"),
                rule(ElementKind::List, r"/L(\[\d+\])?/LI"),
                rule(ElementKind::Footnote, r"/Footnote(\[\d+\])?"),
                rule(ElementKind::Paragraph, r"/(P|ParagraphSpan|Span|StyleSpan)(\[\d+\])?"),
            ],
            skip_kinds: Vec::new(),
        }
    }

    pub fn from_file(path: &Path) -> Result<Self, SchemaError> {
        let text = std::fs::read_to_string(path).map_err(|source| SchemaError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&text)
    }

    pub fn from_toml(text: &str) -> Result<Self, SchemaError> {
        toml::from_str(text).map_err(|e| SchemaError::Mapping(e.to_string()))
    }

    /// Validate pointers and compile the kind rules.
    pub fn compile(self) -> Result<CompiledMapping, SchemaError> {
        let pointers = std::iter::once(&self.elements)
            .chain(self.columns.path.iter())
            .chain(self.columns.text.iter())
            .chain(self.columns.page.iter())
            .chain(self.attributes.values());
        for pointer in pointers {
            if !pointer.is_empty() && !pointer.starts_with('/') {
                return Err(SchemaError::Mapping(format!(
                    "'{pointer}' is not a JSON pointer"
                )));
            }
        }

        let rules = self
            .kinds
            .iter()
            .map(|rule| {
                Regex::new(&rule.pattern)
                    .map(|re| (rule.kind, re))
                    .map_err(|e| SchemaError::Mapping(format!("pattern '{}': {e}", rule.pattern)))
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(CompiledMapping {
            mapping: self,
            rules,
        })
    }
}

/// A [`SchemaMapping`] with its kind rules compiled.
#[derive(Debug, Clone)]
pub struct CompiledMapping {
    mapping: SchemaMapping,
    rules: Vec<(ElementKind, Regex)>,
}

impl CompiledMapping {
    pub fn mapping(&self) -> &SchemaMapping {
        &self.mapping
    }

    pub fn classify(&self, path: Option<&str>) -> ElementKind {
        let Some(path) = path else {
            return ElementKind::Other;
        };
        self.rules
            .iter()
            .find(|(_, re)| re.is_match(path))
            .map_or(ElementKind::Other, |(kind, _)| *kind)
    }

    pub fn is_skipped(&self, kind: ElementKind) -> bool {
        self.mapping.skip_kinds.contains(&kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn compiled() -> CompiledMapping {
        SchemaMapping::pdf_services().compile().unwrap()
    }

    #[test]
    fn test_classify_pdf_services_paths() {
        let m = compiled();

        assert_eq!(m.classify(Some("//Document/H1")), ElementKind::Heading);
        assert_eq!(m.classify(Some("//Document/Title")), ElementKind::Heading);
        assert_eq!(m.classify(Some("//Document/P[3]")), ElementKind::Paragraph);
        assert_eq!(m.classify(Some("//Document/P/ParagraphSpan[2]")), ElementKind::Paragraph);
        assert_eq!(m.classify(Some("//Document/Table[2]")), ElementKind::Table);
        assert_eq!(
            m.classify(Some("//Document/Table[2]/TR[3]/TD[2]/P")),
            ElementKind::TableCell
        );
        assert_eq!(m.classify(Some("//Document/Table/TR/TH/P")), ElementKind::TableCell);
        assert_eq!(m.classify(Some("//Document/Figure[4]")), ElementKind::Figure);
        assert_eq!(m.classify(Some("//Document/L/LI[2]/LBody")), ElementKind::List);
        assert_eq!(m.classify(Some("//Document/Footnote")), ElementKind::Footnote);
        assert_eq!(m.classify(Some("//Document/Aside")), ElementKind::Other);
        assert_eq!(m.classify(None), ElementKind::Other);
    }

    #[test]
    fn test_mapping_from_toml_overrides() {
        let mapping = SchemaMapping::from_toml(
            r#"
            version = "custom-2"
            elements = "/content/items"
            granularity = "document"
            skip_kinds = ["figure"]

            [columns]
            text = "/body"

            [[kinds]]
            kind = "heading"
            pattern = "^h"
            "#,
        )
        .unwrap();

        assert_eq!(mapping.version, "custom-2");
        assert_eq!(mapping.granularity, Granularity::Document);
        assert_eq!(mapping.columns.text.as_deref(), Some("/body"));
        assert_eq!(mapping.columns.path.as_deref(), Some("/Path"));
        assert_eq!(mapping.kinds.len(), 1);
        assert_eq!(mapping.document_file.as_deref(), Some("structuredData.json"));

        let compiled = mapping.compile().unwrap();
        assert_eq!(compiled.classify(Some("h2")), ElementKind::Heading);
        assert!(compiled.is_skipped(ElementKind::Figure));
    }

    #[test]
    fn test_compile_rejects_bad_regex() {
        let mut mapping = SchemaMapping::pdf_services();
        mapping.kinds.push(KindRule {
            kind: ElementKind::Other,
            pattern: "(".into(),
        });
        assert!(matches!(mapping.compile(), Err(SchemaError::Mapping(_))));
    }

    #[test]
    fn test_compile_rejects_bad_pointer() {
        let mut mapping = SchemaMapping::pdf_services();
        mapping.elements = "elements".into();
        assert!(matches!(mapping.compile(), Err(SchemaError::Mapping(_))));
    }

    #[test]
    fn test_kind_roundtrip_str() {
        for kind in [ElementKind::TableCell, ElementKind::Heading, ElementKind::Other] {
            assert_eq!(kind.as_str().parse::<ElementKind>().unwrap(), kind);
        }
        assert!("banner".parse::<ElementKind>().is_err());
    }
}
