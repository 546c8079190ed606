//! Fallback display names, loaded once at startup

use std::path::Path;

use rand::seq::SliceRandom;

/// Used when the names file holds no usable line
const DEFAULT_NAME: &str = "Pilot";

#[derive(Debug, thiserror::Error)]
pub enum NamesError {
    #[error("Failed to read names file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// Supplies a display name to players who did not choose one
#[derive(Debug, Clone)]
pub struct NameProvider {
    names: Vec<String>,
}

impl NameProvider {
    /// One name per line; blank lines are skipped
    pub fn load(path: impl AsRef<Path>) -> Result<Self, NamesError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|source| NamesError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Ok(Self::from_names(contents.lines().map(str::to_string)))
    }

    pub fn from_names(names: impl IntoIterator<Item = String>) -> Self {
        let names = names
            .into_iter()
            .map(|name| name.trim().to_string())
            .filter(|name| !name.is_empty())
            .collect();
        Self { names }
    }

    pub fn count(&self) -> usize {
        self.names.len()
    }

    pub fn next_fallback_name(&self) -> String {
        self.names
            .choose(&mut rand::thread_rng())
            .cloned()
            .unwrap_or_else(|| DEFAULT_NAME.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn picks_from_loaded_names() {
        let provider = NameProvider::from_names(vec![
            "Viper".to_string(),
            "  ".to_string(),
            "Jester\r".to_string(),
        ]);
        assert_eq!(provider.count(), 2);
        for _ in 0..20 {
            let name = provider.next_fallback_name();
            assert!(name == "Viper" || name == "Jester");
        }
    }

    #[test]
    fn empty_list_falls_back_to_default() {
        let provider = NameProvider::from_names(Vec::new());
        assert_eq!(provider.next_fallback_name(), DEFAULT_NAME);
    }

    #[test]
    fn missing_file_reports_path() {
        let err = NameProvider::load("/definitely/not/here.txt").unwrap_err();
        assert!(err.to_string().contains("/definitely/not/here.txt"));
    }
}
