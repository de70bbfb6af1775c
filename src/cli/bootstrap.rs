use std::sync::Arc;

use anyhow::Result;

use crate::config::{self, Settings};
use crate::core::assistants::AssistantsApi;
use crate::core::assistants::openai::OpenAiAssistants;
use crate::core::datastore::supabase::SupabaseStore;
use crate::core::datastore::{DataGateway, TableStore};
use crate::core::orchestrator::Orchestrator;
use crate::core::personas::PersonaRegistry;
use crate::core::projects::ProjectsService;
use crate::core::router::TopicRouter;

/// Everything a command needs, wired from the environment once.
pub struct Services {
    pub settings: Settings,
    pub registry: PersonaRegistry,
    pub router: TopicRouter,
    pub api: Arc<dyn AssistantsApi>,
    pub store: Arc<dyn TableStore>,
    pub gateway: Arc<DataGateway>,
}

pub fn services() -> Result<Services> {
    let settings = Settings::from_env()?;
    let persona_file = config::load_persona_file()?;
    let registry = PersonaRegistry::from_entries(&persona_file.personas)?;
    let router = TopicRouter::from_entries(&persona_file.topics);
    let api: Arc<dyn AssistantsApi> =
        Arc::new(OpenAiAssistants::new(settings.openai_api_key.clone()));
    let store: Arc<dyn TableStore> = Arc::new(SupabaseStore::new(
        settings.supabase_url.clone(),
        settings.supabase_service_key.clone(),
    ));
    let gateway = Arc::new(DataGateway::new(store.clone()));
    Ok(Services {
        settings,
        registry,
        router,
        api,
        store,
        gateway,
    })
}

impl Services {
    pub fn orchestrator(&self) -> Arc<Orchestrator> {
        Arc::new(Orchestrator::new(
            self.registry.clone(),
            self.router.clone(),
            self.api.clone(),
            self.gateway.clone(),
            self.settings.poll_interval,
        ))
    }

    pub fn projects(&self) -> ProjectsService {
        ProjectsService::new(self.store.clone())
    }
}
