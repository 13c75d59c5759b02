//! Substring blocklist for free-form text such as usernames and variable
//! names. Note that this is not foolproof; it exists to catch the obvious.

use std::fs;
use std::path::Path;

use log::{info, warn};

// This list contains words that some may find disturbing.
// All entries MUST be lowercase.
const DEFAULT_PHRASES: &[&str] = &["bitch", "fuck", "shit"];

pub struct ContentFilter {
    phrases: Vec<String>,
    lists: usize,
}

impl ContentFilter {
    /// Build a filter from the embedded default list only.
    pub fn new() -> Self {
        Self {
            phrases: DEFAULT_PHRASES.iter().map(|s| s.to_string()).collect(),
            lists: 1,
        }
    }

    /// Build a filter from the embedded list plus blocklist files, one
    /// lowercase phrase per line. An unreadable file is skipped with a
    /// warning rather than failing startup.
    pub fn from_sources<P: AsRef<Path>>(paths: &[P]) -> Self {
        let mut filter = Self::new();
        for path in paths {
            let path = path.as_ref();
            match fs::read_to_string(path) {
                Ok(contents) => {
                    let before = filter.phrases.len();
                    filter.phrases.extend(
                        contents
                            .lines()
                            .map(str::trim)
                            .filter(|line| !line.is_empty())
                            .map(|line| line.to_lowercase()),
                    );
                    filter.lists += 1;
                    info!(
                        "Loaded {} filter phrases from {}",
                        filter.phrases.len() - before,
                        path.display()
                    );
                }
                Err(e) => warn!("Could not read filter list {}: {}", path.display(), e),
            }
        }
        filter
    }

    /// Determine whether a given string of text is probably safe for most
    /// audiences: true if safe, false if definitely unsafe.
    pub fn is_safe(&self, text: &str) -> bool {
        let normalized = normalize(text);
        !self
            .phrases
            .iter()
            .any(|phrase| normalized.contains(phrase.as_str()))
    }

    /// Total phrases loaded across all lists.
    pub fn phrase_count(&self) -> usize {
        self.phrases.len()
    }

    /// Number of lists (embedded plus files) that contributed phrases.
    pub fn list_count(&self) -> usize {
        self.lists
    }
}

impl Default for ContentFilter {
    fn default() -> Self {
        Self::new()
    }
}

// Ignore anything non-alphabetical so separators cannot defeat the scan.
fn normalize(text: &str) -> String {
    text.to_lowercase()
        .chars()
        .filter(|c| c.is_ascii_lowercase())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn catches_separated_phrases() {
        let filter = ContentFilter::new();
        assert!(filter.is_safe("gardener42"));
        assert!(!filter.is_safe("shit"));
        assert!(!filter.is_safe("s-h_i.t"));
        assert!(!filter.is_safe("ShIt123"));
    }

    #[test]
    fn counts_are_exposed() {
        let filter = ContentFilter::new();
        assert_eq!(filter.list_count(), 1);
        assert!(filter.phrase_count() >= 3);
    }
}
