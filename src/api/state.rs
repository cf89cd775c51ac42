use std::sync::Arc;

use crate::api::queue::{JobProducer, RedisPool};
use crate::application::KnowledgeBase;
use crate::infrastructure::{AppConfig, CrewCatalog, Services, ToolRegistry};

#[derive(Clone)]
pub struct AppState {
    pub redis_pool: RedisPool,
    pub job_producer: JobProducer,
    pub knowledge_base: Arc<KnowledgeBase>,
    pub tools: Arc<ToolRegistry>,
    pub crews: Arc<CrewCatalog>,
    pub config: Arc<AppConfig>,
}

impl AppState {
    pub fn new(
        redis_pool: RedisPool,
        config: Arc<AppConfig>,
        knowledge_base: Arc<KnowledgeBase>,
        tools: Arc<ToolRegistry>,
        crews: Arc<CrewCatalog>,
    ) -> Self {
        let job_producer = JobProducer::new(redis_pool.clone(), config.config.queue.job_ttl_seconds);
        Self {
            redis_pool,
            job_producer,
            knowledge_base,
            tools,
            crews,
            config,
        }
    }

    pub fn from_services(redis_pool: RedisPool, services: &Services) -> Self {
        Self::new(
            redis_pool,
            services.config.clone(),
            services.knowledge_base.clone(),
            services.tools.clone(),
            services.crews.clone(),
        )
    }
}
