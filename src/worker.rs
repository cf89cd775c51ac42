use deadpool_redis::{redis::AsyncCommands, Config, Connection, Pool, Runtime};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crew_knowledge::application::CrewRunner;
use crew_knowledge::infrastructure::{
    keys, queues, AppConfig, CrewCatalog, JobResult, RunCrewJob, Services,
};

pub type RedisPool = Pool;

#[derive(Debug, thiserror::Error)]
pub enum WorkerError {
    #[error("Redis pool error: {0}")]
    Pool(String),
    #[error("Redis error: {0}")]
    Redis(String),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("Processing error: {0}")]
    Processing(String),
}

pub type Result<T> = std::result::Result<T, WorkerError>;

pub fn create_pool(redis_url: &str) -> Result<RedisPool> {
    let cfg = Config::from_url(redis_url);
    cfg.create_pool(Some(Runtime::Tokio1))
        .map_err(|e| WorkerError::Pool(e.to_string()))
}

pub struct WorkerState {
    pub redis_pool: RedisPool,
    pub crews: Arc<CrewCatalog>,
    pub runner: Arc<CrewRunner>,
    pub ttl_seconds: u64,
    pub poll_timeout_seconds: f64,
}

impl WorkerState {
    pub fn new(redis_pool: RedisPool, services: &Services) -> Self {
        let queue = &services.config.config.queue;
        Self {
            redis_pool,
            crews: services.crews.clone(),
            runner: services.crew_runner(),
            ttl_seconds: queue.job_ttl_seconds,
            poll_timeout_seconds: queue.poll_timeout_seconds,
        }
    }
}

pub struct JobConsumer {
    state: Arc<WorkerState>,
    concurrency: usize,
}

impl JobConsumer {
    pub fn new(state: WorkerState, concurrency: usize) -> Self {
        Self {
            state: Arc::new(state),
            concurrency: concurrency.max(1),
        }
    }

    pub async fn start(&self) -> Result<()> {
        let semaphore = Arc::new(Semaphore::new(self.concurrency));
        tracing::info!(concurrency = self.concurrency, "consumer started");

        loop {
            let permit = semaphore
                .clone()
                .acquire_owned()
                .await
                .map_err(|e| WorkerError::Processing(e.to_string()))?;
            let state = self.state.clone();

            tokio::spawn(async move {
                let _permit = permit;
                if let Err(e) = process_next_job(&state).await {
                    tracing::error!(error = %e, "job failed");
                    tokio::time::sleep(tokio::time::Duration::from_secs(1)).await;
                }
            });

            tokio::time::sleep(tokio::time::Duration::from_millis(100)).await;
        }
    }
}

async fn conn(state: &WorkerState) -> Result<Connection> {
    state
        .redis_pool
        .get()
        .await
        .map_err(|e| WorkerError::Pool(e.to_string()))
}

async fn set_status(state: &WorkerState, conn: &mut Connection, status: &JobResult) -> Result<()> {
    let json = serde_json::to_string(status)?;
    conn.set_ex::<_, _, ()>(keys::job_status(&status.job_id), &json, state.ttl_seconds)
        .await
        .map_err(|e| WorkerError::Redis(e.to_string()))
}

async fn process_next_job(state: &WorkerState) -> Result<()> {
    let mut c = conn(state).await?;

    let result: Option<(String, String)> = c
        .brpop(queues::CREW_QUEUE, state.poll_timeout_seconds)
        .await
        .map_err(|e| WorkerError::Redis(e.to_string()))?;
    drop(c);

    if let Some((_, job_json)) = result {
        process_crew_job(state, serde_json::from_str(&job_json)?).await?;
    }
    Ok(())
}

async fn process_crew_job(state: &WorkerState, job: RunCrewJob) -> Result<()> {
    tracing::info!(job_id = %job.job_id, crew = %job.crew, "processing crew run");
    let mut c = conn(state).await?;

    set_status(state, &mut c, &JobResult::processing(job.job_id)).await?;

    let Some(crew) = state.crews.get(&job.crew) else {
        set_status(
            state,
            &mut c,
            &JobResult::failed(job.job_id, format!("Unknown crew '{}'", job.crew)),
        )
        .await?;
        return Ok(());
    };

    drop(c);
    let outcome = state.runner.run(&crew, &job.inputs).await;
    let mut c = conn(state).await?;

    let status = match outcome {
        Ok(report) if report.completed => {
            JobResult::completed(job.job_id, serde_json::to_value(&report)?)
        }
        Ok(report) => {
            let reason = report
                .outcomes
                .last()
                .and_then(|o| o.failure.clone())
                .unwrap_or_else(|| "crew run did not complete".to_string());
            JobResult {
                result: Some(serde_json::to_value(&report)?),
                ..JobResult::failed(job.job_id, reason)
            }
        }
        Err(e) => JobResult::failed(job.job_id, e.to_string()),
    };
    set_status(state, &mut c, &status).await?;

    tracing::info!(job_id = %job.job_id, status = ?status.status, "crew run finished");
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "worker=debug,crew_knowledge=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = AppConfig::from_env()?;
    let redis_pool = create_pool(&config.config.redis_url)?;
    info!("Redis connected");

    let concurrency = config.config.queue.concurrency;
    let services = Services::build(config)?;
    let state = WorkerState::new(redis_pool, &services);

    let consumer = JobConsumer::new(state, concurrency);

    info!(concurrency, crews = services.crews.len(), "worker started");
    consumer.start().await?;

    Ok(())
}
