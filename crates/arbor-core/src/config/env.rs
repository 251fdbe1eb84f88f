use super::{Config, Secret};

impl Config {
    pub(crate) fn apply_env_overrides(&mut self) {
        self.apply_env_overrides_llm();
        self.apply_env_overrides_tree();
        self.apply_env_overrides_index();
    }

    fn apply_env_overrides_llm(&mut self) {
        if let Ok(v) = std::env::var("ARBOR_LLM_PROVIDER") {
            if let Ok(kind) = serde_json::from_value(serde_json::Value::String(v.clone())) {
                self.llm.provider = kind;
            } else {
                tracing::warn!("ignoring invalid ARBOR_LLM_PROVIDER value: {v}");
            }
        }
        if let Ok(v) = std::env::var("ARBOR_LLM_BASE_URL") {
            self.llm.base_url = v;
        }
        if let Ok(v) = std::env::var("ARBOR_LLM_MODEL") {
            self.llm.model = v;
        }
        if let Ok(v) = std::env::var("ARBOR_LLM_EMBEDDING_MODEL") {
            self.llm.embedding_model = (!v.trim().is_empty()).then_some(v);
        }
        if let Ok(v) = std::env::var("ARBOR_LLM_MAX_RETRIES")
            && let Ok(n) = v.parse::<u32>()
        {
            self.llm.max_retries = n;
        }
        if let Ok(v) = std::env::var("ARBOR_TIMEOUT_LLM")
            && let Ok(secs) = v.parse::<u64>()
        {
            self.llm.timeout_secs = secs;
        }
        if let Ok(v) = std::env::var("ARBOR_RATE_LIMIT_CALLS_PER_MINUTE")
            && let Ok(n) = v.parse::<u32>()
        {
            self.llm.rate_limit.calls_per_minute = n;
        }
        if let Ok(v) = std::env::var("ARBOR_RATE_LIMIT_MIN_INTERVAL_MS")
            && let Ok(ms) = v.parse::<u64>()
        {
            self.llm.rate_limit.min_interval_ms = ms;
        }
        if let Ok(v) = std::env::var("ARBOR_API_KEY")
            && !v.is_empty()
        {
            self.secrets.api_key = Some(Secret::new(v));
        }
    }

    fn apply_env_overrides_tree(&mut self) {
        if let Ok(v) = std::env::var("ARBOR_TREE_LEAF_SIZE")
            && let Ok(n) = v.parse::<usize>()
        {
            self.tree.leaf_size = n;
        }
        if let Ok(v) = std::env::var("ARBOR_TREE_BRANCH_SIZE")
            && let Ok(n) = v.parse::<usize>()
        {
            self.tree.branch_size = n;
        }
        if let Ok(v) = std::env::var("ARBOR_TREE_CONCURRENCY")
            && let Ok(n) = v.parse::<usize>()
        {
            self.tree.concurrency = n;
        }
    }

    fn apply_env_overrides_index(&mut self) {
        if let Ok(v) = std::env::var("ARBOR_SQLITE_PATH") {
            self.index.sqlite_path = v;
        }
        if let Ok(v) = std::env::var("ARBOR_INDEX_DEFAULT_K")
            && let Ok(k) = v.parse::<usize>()
        {
            self.index.default_k = k;
        }
        if let Ok(v) = std::env::var("ARBOR_EMBEDDING_BACKEND") {
            if let Ok(backend) = serde_json::from_value(serde_json::Value::String(v.clone())) {
                self.embedding.backend = backend;
            } else {
                tracing::warn!("ignoring invalid ARBOR_EMBEDDING_BACKEND value: {v}");
            }
        }
    }
}
