//! fxrecon-engine - FX trade confirmation reconciliation service
//!
//! Ingests bank confirmation emails (uploaded files or a monitored
//! mailbox), extracts trade terms with an LLM, reconciles them against
//! unmatched client trades and drives confirmation/dispute automation.

use anyhow::Result;
use fxrecon_common::events::EventBus;
use fxrecon_engine::automation::{sms::SmsNotifier, AutomationDispatcher, OutboundMailer};
use fxrecon_engine::config::EngineConfig;
use fxrecon_engine::extract::openai::OpenAiProvider;
use fxrecon_engine::ingest::gmail::GmailClient;
use fxrecon_engine::ingest::mailbox::MailboxPoller;
use fxrecon_engine::pipeline::Pipeline;
use fxrecon_engine::tasks::scheduler::InProcessScheduler;
use fxrecon_engine::AppState;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use fxrecon_engine::automation::sms::{SmsError, SmsTransport};

/// SMS binding used until a gateway account is provisioned; logs the
/// message instead of delivering it.
struct LoggingSmsTransport;

#[async_trait::async_trait]
impl SmsTransport for LoggingSmsTransport {
    async fn send(&self, to: &str, body: &str) -> Result<String, SmsError> {
        info!(to, body, "SMS (logging transport)");
        Ok(format!("log-{}", uuid::Uuid::new_v4()))
    }

    async fn status(&self, _message_id: &str) -> Result<String, SmsError> {
        Ok("logged".to_string())
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!("Starting fxrecon-engine");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    let config_path = std::env::var("FXRECON_CONFIG")
        .unwrap_or_else(|_| "fxrecon-engine.toml".to_string());
    let config = Arc::new(EngineConfig::load(Path::new(&config_path))?);

    let db = fxrecon_engine::db::init_database_pool(config.database_path()).await?;
    info!("Database connection established");

    let event_bus = EventBus::new();

    let llm = Arc::new(OpenAiProvider::new(
        config.openai_api_key.clone().unwrap_or_default(),
        config.openai_base_url.clone(),
        config.openai_model.clone(),
    ));
    if !llm.is_configured() {
        warn!("no LLM API key configured, extraction will fall back on every email");
    }

    let scheduler = Arc::new(InProcessScheduler::new(config.callback_base()));
    let sms = Arc::new(SmsNotifier::new(Box::new(LoggingSmsTransport)));
    let automation = AutomationDispatcher::new(scheduler, sms);

    let pipeline = Arc::new(Pipeline::new(
        db.clone(),
        llm,
        automation,
        event_bus.clone(),
    ));

    let mailer: Option<Arc<dyn OutboundMailer>> = config
        .gmail_access_token
        .clone()
        .map(|token| Arc::new(GmailClient::new(token, None)) as Arc<dyn OutboundMailer>);

    let cancel = CancellationToken::new();
    if let Some(token) = config.gmail_access_token.clone() {
        let source = GmailClient::new(token, None);
        let interval = Duration::from_secs(config.poll_interval_secs());
        let poller_pipeline = pipeline.clone();
        let poller_db = db.clone();
        let poller_cancel = cancel.clone();
        tokio::spawn(async move {
            let poller = MailboxPoller::new(source, poller_db, interval, move |unit| {
                let pipeline = poller_pipeline.clone();
                async move {
                    let report = pipeline.process_unit(unit).await;
                    if let Some(error) = report.error {
                        anyhow::bail!(error);
                    }
                    Ok(())
                }
            });
            poller.run(poller_cancel).await;
        });
        info!("Mailbox poller started");
    } else {
        info!("No mailbox token configured, poller disabled");
    }

    let state = AppState::new(db, event_bus, config.clone(), pipeline, mailer);
    let app = fxrecon_engine::build_router(state);

    let listener =
        tokio::net::TcpListener::bind(("127.0.0.1", config.port())).await?;
    info!("Listening on http://127.0.0.1:{}", config.port());

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutdown signal received");
            cancel.cancel();
        })
        .await?;

    Ok(())
}
