use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::{Deserialize, Serialize};

use hgx_core::GaoConfig;
use hgx_dispatch::DispatchConfig;
use hgx_persist::LibrarianConfig;

/// Node configuration. Missing sections take their defaults.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HgxConfig {
    pub librarian: LibrarianConfig,
    pub gao: GaoConfig,
    pub dispatch: DispatchConfig,
}

impl HgxConfig {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        toml::from_str(&text).with_context(|| format!("parsing {}", path.display()))
    }

    /// Configuration file if given, defaults otherwise; `cache_dir` wins
    /// over the file.
    pub fn resolve(path: Option<&Path>, cache_dir: Option<PathBuf>) -> anyhow::Result<Self> {
        let mut config = match path {
            Some(path) => Self::load(path)?,
            None => Self::default(),
        };
        if cache_dir.is_some() {
            config.librarian.cache_dir = cache_dir;
        }
        Ok(config)
    }

    pub fn cache_dir(&self) -> anyhow::Result<&Path> {
        self.librarian
            .cache_dir
            .as_deref()
            .context("no cache directory configured; pass --cache-dir or set librarian.cache_dir")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_file() {
        let c: HgxConfig = toml::from_str(
            r#"
            [librarian]
            memory_cache = 64
            cache_dir = "/var/cache/hgx"

            [gao]
            legroom = 12

            [dispatch]
            token_attempts = 4
            "#,
        )
        .unwrap();
        assert_eq!(c.librarian.memory_cache, 64);
        assert_eq!(c.gao.legroom, 12);
        assert_eq!(c.gao.container_retries, 3);
        assert_eq!(c.dispatch.token_attempts, 4);
    }

    #[test]
    fn cache_dir_flag_overrides_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hgx.toml");
        std::fs::write(&path, "[librarian]\ncache_dir = \"/from/file\"\n").unwrap();

        let from_file = HgxConfig::resolve(Some(&path), None).unwrap();
        assert_eq!(from_file.cache_dir().unwrap(), Path::new("/from/file"));

        let flagged = HgxConfig::resolve(Some(&path), Some("/from/flag".into())).unwrap();
        assert_eq!(flagged.cache_dir().unwrap(), Path::new("/from/flag"));
    }

    #[test]
    fn missing_cache_dir_is_an_error() {
        assert!(HgxConfig::default().cache_dir().is_err());
        assert!(HgxConfig::resolve(Some(Path::new("/does/not/exist.toml")), None).is_err());
    }
}
