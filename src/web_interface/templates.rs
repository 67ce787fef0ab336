use log::{debug, error, info, warn};
use rust_embed::RustEmbed;
use std::collections::HashMap;
use std::fs;
use std::io::ErrorKind;
use std::path::Path;

#[derive(RustEmbed)]
#[folder = "$CARGO_MANIFEST_DIR/templates/"]
struct EmbeddedTemplates;

/// The fixed set of pages the portal can render.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Page {
    Index,
    Login,
    Success,
    Error,
}

impl Page {
    pub const ALL: [Page; 4] = [Page::Index, Page::Login, Page::Success, Page::Error];

    pub fn file_name(&self) -> &'static str {
        match self {
            Page::Index => "index.html",
            Page::Login => "login.html",
            Page::Success => "login_success.html",
            Page::Error => "login_error.html",
        }
    }
}

/// Page bodies, loaded once and never modified afterwards.
#[derive(Debug, Clone)]
pub struct TemplateSet {
    pages: HashMap<Page, Vec<u8>>,
}

impl TemplateSet {
    /// Loads every page. Files in `override_dir` win over the compiled-in copies; a page
    /// found nowhere is replaced by a minimal internal-error page.
    pub fn load(override_dir: Option<&Path>) -> Self {
        let pages = Page::ALL
            .iter()
            .map(|page| (*page, load_page(*page, override_dir)))
            .collect();
        info!(
            "Templates loaded ({})",
            override_dir.map_or("embedded".to_string(), |d| d.display().to_string())
        );
        Self { pages }
    }

    pub fn embedded() -> Self {
        Self::load(None)
    }

    /// Replaces one page body.
    pub fn with_page(mut self, page: Page, body: impl Into<Vec<u8>>) -> Self {
        self.pages.insert(page, body.into());
        self
    }

    pub fn get(&self, page: Page) -> &[u8] {
        self.pages.get(&page).map(Vec::as_slice).unwrap_or(&[])
    }
}

fn load_page(page: Page, override_dir: Option<&Path>) -> Vec<u8> {
    let name = page.file_name();

    if let Some(dir) = override_dir {
        let path = dir.join(name);
        match fs::read(&path) {
            Ok(body) => {
                debug!("Template {} read from {}", name, path.display());
                return body;
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!("No override for {} in {}", name, dir.display());
            }
            Err(e) => warn!("Unable to read template {}: {}", path.display(), e),
        }
    }

    match EmbeddedTemplates::get(name) {
        Some(file) => file.data.into_owned(),
        None => {
            error!("Template {} not found", name);
            fallback_page(name)
        }
    }
}

fn fallback_page(name: &str) -> Vec<u8> {
    format!(
        "<!DOCTYPE html><html><body><h1>Internal error</h1><p>Template {} not found.</p></body></html>",
        name
    )
    .into_bytes()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_embedded_pages_present() {
        let set = TemplateSet::embedded();
        for page in Page::ALL {
            let body = String::from_utf8_lossy(set.get(page)).to_string();
            assert!(body.contains("<html"), "{:?} missing", page);
            assert!(!body.contains("Internal error"), "{:?} fell back", page);
        }
        assert!(String::from_utf8_lossy(set.get(Page::Login)).contains("name=\"password\""));
    }

    #[test]
    fn test_override_dir_wins() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("index.html"), "<p>custom index</p>").unwrap();

        let set = TemplateSet::load(Some(dir.path()));
        assert_eq!(set.get(Page::Index), b"<p>custom index</p>");
        assert!(String::from_utf8_lossy(set.get(Page::Login)).contains("<form"));
    }

    #[test]
    fn test_fallback_page_mentions_template() {
        let body = String::from_utf8(fallback_page("login.html")).unwrap();
        assert!(body.contains("Internal error"));
        assert!(body.contains("login.html"));
    }
}
