mod env;
mod types;


pub use types::*;

use std::path::Path;

use anyhow::{Context, bail, ensure};

impl Config {
    /// Load configuration from a TOML file with env var overrides, then validate it.
    ///
    /// Falls back to defaults when the file does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed, or if
    /// the resulting configuration is invalid.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let mut config = if path.exists() {
            let content = std::fs::read_to_string(path).context("failed to read config file")?;
            toml::from_str::<Self>(&content).context("failed to parse config file")?
        } else {
            tracing::debug!(path = %path.display(), "config file not found, using defaults");
            Self::default()
        };

        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Reject values the pipeline cannot run with.
    ///
    /// # Errors
    ///
    /// Returns an error naming the first offending setting.
    pub fn validate(&self) -> anyhow::Result<()> {
        let tree = &self.tree;
        ensure!(tree.leaf_size > 0, "tree.leaf_size must be at least 1");
        ensure!(tree.branch_size > 0, "tree.branch_size must be at least 1");
        ensure!(tree.window_size > 0, "tree.window_size must be at least 1");
        ensure!(tree.concurrency > 0, "tree.concurrency must be at least 1");
        ensure!(
            (0.0..=2.0).contains(&tree.generation.temperature),
            "tree.generation.temperature must be within 0.0..=2.0"
        );
        ensure!(self.index.default_k > 0, "index.default_k must be at least 1");
        ensure!(
            !self.index.sqlite_path.trim().is_empty(),
            "index.sqlite_path must not be empty"
        );
        ensure!(self.embedding.dim > 0, "embedding.dim must be at least 1");
        ensure!(
            self.embedding.segment_words > 0,
            "embedding.segment_words must be at least 1"
        );

        if self.llm.provider != ProviderKind::Mock {
            ensure!(!self.llm.base_url.trim().is_empty(), "llm.base_url must not be empty");
            ensure!(!self.llm.model.trim().is_empty(), "llm.model must not be empty");
            if self.embedding.backend == EmbeddingBackend::Provider
                && self.llm.embedding_model.is_none()
            {
                bail!("embedding.backend = \"provider\" requires llm.embedding_model");
            }
        }
        Ok(())
    }

    /// Render the configuration as TOML. Secrets are never included.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_toml(&self) -> anyhow::Result<String> {
        toml::to_string_pretty(self).context("failed to serialize config")
    }

    /// Write the default configuration to `path`, refusing to replace an
    /// existing file unless `force` is set.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists without `force` or cannot be written.
    pub fn write_default(path: &Path, force: bool) -> anyhow::Result<()> {
        if path.exists() && !force {
            bail!("{} already exists, pass --force to overwrite", path.display());
        }
        let content = Self::default().to_toml()?;
        std::fs::write(path, content)
            .with_context(|| format!("failed to write {}", path.display()))?;
        Ok(())
    }
}
