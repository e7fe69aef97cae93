use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;

use deeptime_core::SimConfig;
use deeptime_net::{Capability, ProviderConfig, ProviderKind, RouterConfig};

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct AiConfig {
    pub base_url: Option<String>,
    pub api_key: Option<String>,
    pub provider: String,
    pub speciation_model: String,
    pub report_model: String,
    pub request_timeout_secs: u64,
    pub concurrency_limit: usize,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct EmbeddingConfig {
    pub provider: String,
    pub base_url: Option<String>,
    pub api_key: Option<String>,
    pub model: String,
    pub cache_dir: String,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct WorldConfig {
    pub map_seed: u64,
    pub map_width: u32,
    pub map_height: u32,
    pub turn_years: u64,
    pub generation_scale_factor: f64,
    pub critical_species_limit: usize,
    pub focus_batch_size: usize,
    pub focus_batch_limit: usize,
    pub background_population_threshold: u64,
    pub autosave_every_rounds: u64,
    pub autosave_slots: u64,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct LogConfig {
    pub level: String,
    pub dir: String,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub database_url: String,
    pub saves_dir: String,
    pub ai: AiConfig,
    pub embedding: EmbeddingConfig,
    pub world: WorldConfig,
    pub log: LogConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 8200,
            },
            database_url: "data/db/deeptime.db".to_string(),
            saves_dir: "data/saves".to_string(),
            ai: AiConfig {
                base_url: None,
                api_key: None,
                provider: "openai".to_string(),
                speciation_model: "gpt-4o-mini".to_string(),
                report_model: "gpt-4o-mini".to_string(),
                request_timeout_secs: 60,
                concurrency_limit: 15,
            },
            embedding: EmbeddingConfig {
                provider: "local".to_string(),
                base_url: None,
                api_key: None,
                model: "text-embedding-3-small".to_string(),
                cache_dir: "data/cache/embeddings".to_string(),
            },
            world: WorldConfig {
                map_seed: 42,
                map_width: 48,
                map_height: 24,
                turn_years: 500_000,
                generation_scale_factor: 8.0,
                critical_species_limit: 3,
                focus_batch_size: 8,
                focus_batch_limit: 3,
                background_population_threshold: 50_000,
                autosave_every_rounds: 5,
                autosave_slots: 3,
            },
            log: LogConfig {
                level: "info".to_string(),
                dir: "data/logs".to_string(),
            },
        }
    }
}

impl AppConfig {
    /// Loads `config.toml` (creating it with defaults when missing), then
    /// applies environment overrides.
    pub fn load(path: &str) -> Self {
        let mut config = if let Ok(content) = fs::read_to_string(path) {
            toml::from_str(&content).unwrap_or_default()
        } else {
            let default = Self::default();
            if let Ok(toml_str) = toml::to_string(&default) {
                let _ = fs::write(path, toml_str);
            }
            default
        };
        config.apply_env();
        config
    }

    fn apply_env(&mut self) {
        if let Ok(url) = std::env::var("DATABASE_URL") {
            self.database_url = url;
        }
        if let Ok(provider) = std::env::var("EMBEDDING_PROVIDER") {
            self.embedding.provider = provider;
        }
        if let Ok(base) = std::env::var("AI_BASE_URL") {
            self.ai.base_url = Some(base);
        }
        if let Ok(key) = std::env::var("AI_API_KEY") {
            self.ai.api_key = Some(key);
        }
        if let Ok(timeout) = std::env::var("AI_TIMEOUT") {
            if let Ok(secs) = timeout.parse() {
                self.ai.request_timeout_secs = secs;
            }
        }
        if let Ok(limit) = std::env::var("AI_CONCURRENCY_LIMIT") {
            if let Ok(parsed) = limit.parse() {
                self.ai.concurrency_limit = parsed;
            }
        }
        if let Ok(level) = std::env::var("LOG_LEVEL") {
            self.log.level = level;
        }
        if let Ok(dir) = std::env::var("LOG_DIR") {
            self.log.dir = dir;
        }
    }

    pub fn sim_config(&self) -> SimConfig {
        SimConfig {
            turn_years: self.world.turn_years,
            generation_scale: self.world.generation_scale_factor,
            critical_species_limit: self.world.critical_species_limit,
            focus_batch_size: self.world.focus_batch_size,
            focus_batch_limit: self.world.focus_batch_limit,
            background_population_threshold: self.world.background_population_threshold,
            autosave_every_rounds: self.world.autosave_every_rounds,
            autosave_slots: self.world.autosave_slots,
            saves_dir: PathBuf::from(&self.saves_dir),
            map_seed: self.world.map_seed,
            map_width: self.world.map_width,
            map_height: self.world.map_height,
            ..SimConfig::default()
        }
    }

    /// Router wiring, or None when no AI endpoint is configured; the engine
    /// then runs rule-only.
    pub fn router_config(&self) -> Option<RouterConfig> {
        let base_url = self.ai.base_url.clone()?;
        let kind = match self.ai.provider.as_str() {
            "anthropic" => ProviderKind::Anthropic,
            "gemini" => ProviderKind::Gemini,
            _ => ProviderKind::OpenAi,
        };
        let provider = |model: &str| ProviderConfig {
            kind,
            base_url: base_url.clone(),
            api_key: self.ai.api_key.clone(),
            model: model.to_string(),
        };
        let mut routes = BTreeMap::new();
        routes.insert(
            Capability::SpeciationBatch,
            vec![provider(&self.ai.speciation_model)],
        );
        routes.insert(
            Capability::SpeciesStatusEval,
            vec![provider(&self.ai.report_model)],
        );
        routes.insert(Capability::Narrative, vec![provider(&self.ai.report_model)]);
        let mut timeouts = BTreeMap::new();
        timeouts.insert(Capability::SpeciationBatch, 120);
        timeouts.insert(Capability::SpeciesStatusEval, self.ai.request_timeout_secs);
        timeouts.insert(Capability::Narrative, self.ai.request_timeout_secs);
        Some(RouterConfig {
            concurrency_limit: self.ai.concurrency_limit,
            routes,
            timeouts,
        })
    }

    /// Hash of the evolution constants; mismatched fingerprints mean saves
    /// are not comparable.
    pub fn fingerprint(&self) -> String {
        use sha2::{Digest, Sha256};
        let mut hasher = Sha256::new();
        hasher.update(format!("{:?}", self.world).as_bytes());
        hex::encode(hasher.finalize())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_roundtrips_through_toml() {
        let config = AppConfig::default();
        let text = toml::to_string(&config).unwrap();
        let parsed: AppConfig = toml::from_str(&text).unwrap();
        assert_eq!(parsed.server.port, config.server.port);
        assert_eq!(parsed.world.map_seed, config.world.map_seed);
    }

    #[test]
    fn test_fingerprint_tracks_world_constants() {
        let a = AppConfig::default();
        let mut b = AppConfig::default();
        assert_eq!(a.fingerprint(), b.fingerprint());
        b.world.turn_years = 1_000_000;
        assert_ne!(a.fingerprint(), b.fingerprint());
    }

    #[test]
    fn test_router_config_requires_base_url() {
        let config = AppConfig::default();
        assert!(config.router_config().is_none());
    }
}
