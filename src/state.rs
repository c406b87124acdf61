//! Shared application state.

use std::sync::Arc;

use crate::auth::AuthService;
use crate::config::{AppConfig, ConfigError, StorageBackend};
use crate::report::{DefaultImageEncoder, ReportGenerator, SheetLayout, TemplateSet};
use crate::storage::{InlineStorage, LocalStorage, ObjectStorage, SupabaseStorage};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub generator: Arc<ReportGenerator>,
    pub storage: Arc<dyn ObjectStorage>,
    pub auth: Arc<AuthService>,
}

impl AppState {
    pub fn new(config: AppConfig) -> Result<Self, ConfigError> {
        let storage = build_storage(&config)?;
        let auth = AuthService::from_config(&config)?;
        Self::new_with_storage(config, storage, auth)
    }

    /// Build the state around an already constructed storage backend and
    /// auth service.
    pub fn new_with_storage(
        config: AppConfig,
        storage: Arc<dyn ObjectStorage>,
        auth: AuthService,
    ) -> Result<Self, ConfigError> {
        let templates = TemplateSet::new(
            config.template_dir.clone(),
            config.word_template.clone(),
            config.excel_template.clone(),
        );
        let layout = SheetLayout::load_or_default(&config.template_dir)
            .map_err(|e| ConfigError::Layout(e.to_string()))?;
        let generator = ReportGenerator::new(
            templates,
            layout,
            Arc::new(DefaultImageEncoder),
            config.default_field_value.clone(),
        );

        Ok(Self {
            config: Arc::new(config),
            generator: Arc::new(generator),
            storage,
            auth: Arc::new(auth),
        })
    }
}

fn build_storage(config: &AppConfig) -> Result<Arc<dyn ObjectStorage>, ConfigError> {
    match config.storage_backend {
        StorageBackend::Local => {
            std::fs::create_dir_all(&config.output_dir)?;
            log::info!("Publishing reports to {}", config.output_dir.display());
            Ok(Arc::new(LocalStorage::new(
                config.output_dir.clone(),
                config.public_base_url.clone(),
            )))
        }
        StorageBackend::Supabase => {
            let supabase = config
                .supabase
                .clone()
                .ok_or(ConfigError::Missing("SUPABASE_URL"))?;
            let http_client = reqwest::Client::builder()
                .pool_idle_timeout(std::time::Duration::from_secs(900))
                .user_agent("drone-inspection-server/0.3")
                .build()?;
            log::info!("Publishing reports to Supabase bucket {}", supabase.bucket_name);
            Ok(Arc::new(SupabaseStorage::new(supabase, http_client)))
        }
        StorageBackend::Inline => {
            log::info!("Returning reports inline as data URLs");
            Ok(Arc::new(InlineStorage))
        }
    }
}
