//! INI file configuration adapter.

use crate::ports::config_port::ConfigPort;
use configparser::ini::Ini;
use std::path::Path;

pub struct FileConfigAdapter {
    config: Ini,
}

impl FileConfigAdapter {
    pub fn from_file<P: AsRef<Path>>(path: P) -> std::io::Result<Self> {
        let mut config = Ini::new();
        config.load(path).map_err(|e| std::io::Error::other(e))?;
        Ok(Self { config })
    }

    pub fn from_string(content: &str) -> Result<Self, String> {
        let mut config = Ini::new();
        config.read(content.to_string())?;
        Ok(Self { config })
    }

    fn parse_bool(value: &str) -> Option<bool> {
        match value.to_lowercase().as_str() {
            "true" | "yes" | "1" => Some(true),
            "false" | "no" | "0" => Some(false),
            _ => None,
        }
    }
}

impl ConfigPort for FileConfigAdapter {
    fn get_string(&self, section: &str, key: &str) -> Option<String> {
        self.config.get(section, key)
    }

    fn get_int(&self, section: &str, key: &str, default: i64) -> i64 {
        self.config
            .getint(section, key)
            .ok()
            .flatten()
            .unwrap_or(default)
    }

    fn get_double(&self, section: &str, key: &str, default: f64) -> f64 {
        self.config
            .getfloat(section, key)
            .ok()
            .flatten()
            .unwrap_or(default)
    }

    fn get_bool(&self, section: &str, key: &str, default: bool) -> bool {
        self.config
            .get(section, key)
            .as_ref()
            .and_then(|v| Self::parse_bool(v))
            .unwrap_or(default)
    }

    fn section_entries(&self, section: &str) -> Vec<(String, String)> {
        let mut entries: Vec<(String, String)> = self
            .config
            .get_map_ref()
            .get(&section.to_lowercase())
            .map(|keys| {
                keys.iter()
                    .filter_map(|(k, v)| v.as_ref().map(|v| (k.clone(), v.clone())))
                    .collect()
            })
            .unwrap_or_default();
        entries.sort();
        entries
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn create_temp_config(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "{}", content).unwrap();
        file
    }

    #[test]
    fn from_string_parses_config() {
        let content = r#"
[database]
backend = sqlite

[sqlite]
path = /var/lib/alertgen/alerts.db

[run]
start = 2024-01-01 00:00:00
"#;
        let adapter = FileConfigAdapter::from_string(content).unwrap();
        assert_eq!(
            adapter.get_string("database", "backend"),
            Some("sqlite".to_string())
        );
        assert_eq!(
            adapter.get_string("sqlite", "path"),
            Some("/var/lib/alertgen/alerts.db".to_string())
        );
        assert_eq!(
            adapter.get_string("run", "start"),
            Some("2024-01-01 00:00:00".to_string())
        );
    }

    #[test]
    fn get_string_returns_none_for_missing_key() {
        let adapter = FileConfigAdapter::from_string("[run]\nworkers = 3\n").unwrap();
        assert_eq!(adapter.get_string("run", "missing"), None);
        assert_eq!(adapter.get_string("missing_section", "key"), None);
    }

    #[test]
    fn get_int_returns_value_or_default() {
        let adapter =
            FileConfigAdapter::from_string("[run]\nworkers = 5\nbad = abc\n").unwrap();
        assert_eq!(adapter.get_int("run", "workers", 0), 5);
        assert_eq!(adapter.get_int("run", "missing", 42), 42);
        assert_eq!(adapter.get_int("run", "bad", 42), 42);
    }

    #[test]
    fn get_double_returns_value_or_default() {
        let adapter =
            FileConfigAdapter::from_string("[limits]\nratio = 0.5\nbad = x\n").unwrap();
        assert_eq!(adapter.get_double("limits", "ratio", 0.0), 0.5);
        assert_eq!(adapter.get_double("limits", "missing", 99.9), 99.9);
        assert_eq!(adapter.get_double("limits", "bad", 99.9), 99.9);
    }

    #[test]
    fn get_bool_accepts_common_spellings() {
        let adapter = FileConfigAdapter::from_string(
            "[run]\na = true\nb = yes\nc = 1\nd = false\ne = no\nf = 0\n",
        )
        .unwrap();
        assert!(adapter.get_bool("run", "a", false));
        assert!(adapter.get_bool("run", "b", false));
        assert!(adapter.get_bool("run", "c", false));
        assert!(!adapter.get_bool("run", "d", true));
        assert!(!adapter.get_bool("run", "e", true));
        assert!(!adapter.get_bool("run", "f", true));
        assert!(adapter.get_bool("run", "missing", true));
    }

    #[test]
    fn section_entries_are_sorted_pairs() {
        let adapter = FileConfigAdapter::from_string(
            "[operators]\nmenor_que = <\nmayor_que = >\nentre = between\n",
        )
        .unwrap();
        assert_eq!(
            adapter.section_entries("operators"),
            vec![
                ("entre".to_string(), "between".to_string()),
                ("mayor_que".to_string(), ">".to_string()),
                ("menor_que".to_string(), "<".to_string()),
            ]
        );
        assert!(adapter.section_entries("missing").is_empty());
    }

    #[test]
    fn from_file_reads_config() {
        let file = create_temp_config("[logging]\nformat = json\n");
        let adapter = FileConfigAdapter::from_file(file.path()).unwrap();
        assert_eq!(
            adapter.get_string("logging", "format"),
            Some("json".to_string())
        );
    }

    #[test]
    fn from_file_returns_error_for_missing_file() {
        let result = FileConfigAdapter::from_file("/nonexistent/path/config.ini");
        assert!(result.is_err());
    }
}
