//! Descriptor catalog loading
//!
//! A catalog is a JSON file holding one descriptor or an array of them, or
//! a directory of such files.

use anyhow::{Context, Result, bail};
use descriptor::ApplicationDescriptor;
use integration::InMemoryCatalog;
use serde::Deserialize;
use std::fs;
use std::path::Path;

#[derive(Deserialize)]
#[serde(untagged)]
enum CatalogDocument {
    Many(Vec<ApplicationDescriptor>),
    One(Box<ApplicationDescriptor>),
}

fn read_document(path: &Path) -> Result<Vec<ApplicationDescriptor>> {
    let content =
        fs::read_to_string(path).with_context(|| format!("Could not read {}", path.display()))?;
    let document: CatalogDocument = serde_json::from_str(&content)
        .with_context(|| format!("Invalid descriptor file {}", path.display()))?;
    Ok(match document {
        CatalogDocument::Many(descriptors) => descriptors,
        CatalogDocument::One(descriptor) => vec![*descriptor],
    })
}

/// Load a catalog from a file or a directory of `.json` files
pub fn load(path: &Path) -> Result<InMemoryCatalog> {
    if !path.exists() {
        bail!("Catalog not found: {}", path.display());
    }

    let mut descriptors = Vec::new();
    if path.is_dir() {
        let mut files: Vec<_> = fs::read_dir(path)
            .with_context(|| format!("Could not list {}", path.display()))?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| p.extension().is_some_and(|ext| ext == "json"))
            .collect();
        files.sort();
        for file in files {
            descriptors.extend(read_document(&file)?);
        }
    } else {
        descriptors = read_document(path)?;
    }

    let catalog = InMemoryCatalog::from_descriptors(descriptors);
    log::debug!("Loaded {} descriptors from {}", catalog.len(), path.display());
    Ok(catalog)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const APP_A: &str = r#"{
        "name": "app-a",
        "version": "1.0.0",
        "modules": [
            {
                "name": "mod-a",
                "version": "1.0.0",
                "provides": [{ "id": "a-api", "version": "1.0" }]
            }
        ]
    }"#;

    const APP_B: &str = r#"[{
        "name": "app-b",
        "version": "2.0.0",
        "dependencies": [{ "name": "app-a", "version": "^1.0.0" }]
    }]"#;

    #[test]
    fn test_load_single_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("catalog.json");
        fs::write(&path, APP_B).unwrap();

        let catalog = load(&path).unwrap();

        assert_eq!(catalog.len(), 1);
        let app = catalog.iter().next().unwrap();
        assert!(app.depends_on("app-a"));
    }

    #[test]
    fn test_load_directory() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("a.json"), APP_A).unwrap();
        fs::write(dir.path().join("b.json"), APP_B).unwrap();
        fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let catalog = load(dir.path()).unwrap();

        let ids: Vec<String> = catalog.iter().map(ApplicationDescriptor::id).collect();
        assert_eq!(ids, vec!["app-a-1.0.0", "app-b-2.0.0"]);
    }

    #[test]
    fn test_missing_catalog() {
        let dir = TempDir::new().unwrap();
        let err = load(&dir.path().join("missing.json")).unwrap_err();
        assert!(err.to_string().contains("Catalog not found"));
    }
}
