use std::fs;
use std::path::Path;

use crate::services::text::normalize;

pub const SERVICES_FILE: &str = "services.txt";
pub const PROBLEMS_FILE: &str = "problems.txt";

/// Ordered `key -> value` mapping read from a catalog file. Keys keep the
/// position of their first appearance, so ties in matching resolve to the
/// entry listed first.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Catalog {
    entries: Vec<(String, String)>,
}

impl Catalog {
    pub fn insert(&mut self, key: String, value: String) {
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((key, value)),
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn entries(&self) -> &[(String, String)] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Catalog {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut catalog = Catalog::default();
        for (k, v) in iter {
            catalog.insert(k.into(), v.into());
        }
        catalog
    }
}

/// Service name -> description.
pub fn load_services(data_dir: &str) -> Catalog {
    load_catalog(&Path::new(data_dir).join(SERVICES_FILE))
}

/// Problem phrase -> recommended service name.
pub fn load_problems(data_dir: &str) -> Catalog {
    load_catalog(&Path::new(data_dir).join(PROBLEMS_FILE))
}

/// Reads the file on every call; a missing file yields an empty catalog.
pub fn load_catalog(path: &Path) -> Catalog {
    match fs::read_to_string(path) {
        Ok(content) => parse_catalog(&content),
        Err(e) => {
            tracing::error!(path = %path.display(), error = %e, "failed to read catalog file");
            Catalog::default()
        }
    }
}

pub fn parse_catalog(content: &str) -> Catalog {
    let mut catalog = Catalog::default();

    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        match line.split_once(':') {
            Some((key, value)) => catalog.insert(normalize(key), normalize(value)),
            None => tracing::warn!(line, "skipping malformed catalog line"),
        }
    }

    catalog
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_skips_blank_and_malformed_lines() {
        let catalog = parse_catalog(
            "Cambio de Aceite: Reemplazo del aceite.\n\n   \nlinea sin separador\nFrenos: pastillas: y discos\n",
        );
        assert_eq!(catalog.len(), 2);
        assert_eq!(catalog.get("cambio de aceite"), Some("reemplazo del aceite"));
        // only the first colon splits
        assert_eq!(catalog.get("frenos"), Some("pastillas y discos"));
    }

    #[test]
    fn test_repeated_key_keeps_first_position() {
        let catalog = parse_catalog("a1 uno: x\nbb: y\nA uno: z\n");
        let keys: Vec<&str> = catalog.entries().iter().map(|(k, _)| k.as_str()).collect();
        assert_eq!(keys, vec!["a uno", "bb"]);
        assert_eq!(catalog.get("a uno"), Some("z"));
    }

    #[test]
    fn test_missing_file_is_empty() {
        let catalog = load_services("/definitely/not/here");
        assert!(catalog.is_empty());
    }

    #[test]
    fn test_bundled_catalogs_load() {
        let dir = concat!(env!("CARGO_MANIFEST_DIR"), "/data");
        let services = load_services(dir);
        let problems = load_problems(dir);
        assert!(services.get("revision de frenos").is_some());
        assert_eq!(problems.get("ruido al frenar"), Some("revision de frenos"));
    }
}
