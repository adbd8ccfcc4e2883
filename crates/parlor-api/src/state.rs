use std::sync::Arc;

use parlor_chat::ChatOrchestrator;
use parlor_llm::ImageModelCatalog;
use parlor_persist::PersistClient;

use crate::config::Config;

/// Shared application state passed to all handlers.
///
/// All resources are wrapped in Arc for sharing across async tasks; the
/// orchestrator is stateless per turn and created once at startup.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub persist: Arc<PersistClient>,
    pub orchestrator: Arc<ChatOrchestrator>,
    pub image_models: Arc<ImageModelCatalog>,
}

impl AppState {
    pub fn new(
        config: Config,
        persist: Arc<PersistClient>,
        orchestrator: ChatOrchestrator,
        image_models: Arc<ImageModelCatalog>,
    ) -> Self {
        Self {
            config: Arc::new(config),
            persist,
            orchestrator: Arc::new(orchestrator),
            image_models,
        }
    }
}
