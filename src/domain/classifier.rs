use regex::Regex;
use url::Url;

use crate::config::AllowedRoot;

use super::model::DownloadTarget;

/// Decides which intercepted navigations are data downloads.
#[derive(Debug, Clone)]
pub struct UrlClassifier {
    allow_list: Vec<AllowedRoot>,
    product_pattern: Option<Regex>,
}

impl UrlClassifier {
    pub fn new(allow_list: Vec<AllowedRoot>, product_pattern: Option<Regex>) -> Self {
        Self {
            allow_list,
            product_pattern,
        }
    }

    pub fn classify(&self, url: &str) -> Option<DownloadTarget> {
        let parsed = Url::parse(url).ok()?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return None;
        }

        let root = self
            .allow_list
            .iter()
            .find(|root| url.starts_with(&root.prefix))?;

        Some(DownloadTarget {
            url: url.to_string(),
            provider: Some(root.provider),
            product_name: None,
        })
    }

    pub fn uses_product_folders(&self) -> bool {
        self.product_pattern.is_some()
    }

    /// Product identifier embedded in a downloaded file's name.
    pub fn product_name(&self, file_name: &str) -> Option<String> {
        self.product_pattern
            .as_ref()?
            .find(file_name)
            .map(|m| m.as_str().to_string())
    }
}
