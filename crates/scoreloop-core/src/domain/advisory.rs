//! Static advisory material consulted on every revision.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::domain::error::{Result, ScoreloopError};

/// One piece of reference material handed to the reasoning collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ReferenceDoc {
    /// A document read from disk at startup.
    Document { name: String, content: String },
    /// A literal instruction.
    Guidance { text: String },
}

impl ReferenceDoc {
    pub fn label(&self) -> &str {
        match self {
            ReferenceDoc::Document { name, .. } => name,
            ReferenceDoc::Guidance { text } => text,
        }
    }
}

/// Fixed set of reference documents and guidance strings.
///
/// Loaded once; never mutated afterwards.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdvisoryMaterial {
    docs: Vec<ReferenceDoc>,
}

impl AdvisoryMaterial {
    pub fn new(docs: Vec<ReferenceDoc>) -> Self {
        Self { docs }
    }

    /// Read every document (relative paths resolve against `base_dir`) and
    /// append the guidance strings after them.
    ///
    /// A missing or unreadable document is fatal.
    pub fn load(base_dir: &Path, documents: &[PathBuf], guidance: &[String]) -> Result<Self> {
        let mut docs = Vec::with_capacity(documents.len() + guidance.len());

        for doc in documents {
            let path = if doc.is_absolute() {
                doc.clone()
            } else {
                base_dir.join(doc)
            };
            let content =
                std::fs::read_to_string(&path).map_err(|e| ScoreloopError::AdvisoryLoad {
                    name: path.display().to_string(),
                    reason: e.to_string(),
                })?;
            docs.push(ReferenceDoc::Document {
                name: doc.display().to_string(),
                content,
            });
        }

        docs.extend(guidance.iter().map(|text| ReferenceDoc::Guidance {
            text: text.clone(),
        }));

        if docs.is_empty() {
            return Err(ScoreloopError::AdvisoryLoad {
                name: "<advisory>".to_string(),
                reason: "no documents or guidance configured".to_string(),
            });
        }

        Ok(Self { docs })
    }

    pub fn docs(&self) -> &[ReferenceDoc] {
        &self.docs
    }

    pub fn len(&self) -> usize {
        self.docs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.docs.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_load_reads_documents_then_guidance() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("advice1.md"), "weight recent form").unwrap();

        let material = AdvisoryMaterial::load(
            dir.path(),
            &[PathBuf::from("advice1.md")],
            &["review the added numbers".to_string()],
        )
        .unwrap();

        assert_eq!(material.len(), 2);
        assert_eq!(
            material.docs()[0],
            ReferenceDoc::Document {
                name: "advice1.md".to_string(),
                content: "weight recent form".to_string(),
            }
        );
        assert_eq!(material.docs()[1].label(), "review the added numbers");
    }

    #[test]
    fn test_missing_document_is_fatal() {
        let dir = tempdir().unwrap();
        let err = AdvisoryMaterial::load(dir.path(), &[PathBuf::from("advice2.md")], &[])
            .unwrap_err();
        assert!(matches!(err, ScoreloopError::AdvisoryLoad { .. }));
        assert!(err.is_fatal());
    }

    #[test]
    fn test_empty_material_rejected() {
        let dir = tempdir().unwrap();
        assert!(AdvisoryMaterial::load(dir.path(), &[], &[]).is_err());
    }
}
