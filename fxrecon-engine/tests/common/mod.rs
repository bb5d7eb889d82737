//! Shared fixtures for integration tests
#![allow(dead_code)]

use async_trait::async_trait;
use chrono::Utc;
use fxrecon_common::events::EventBus;
use fxrecon_common::model::{
    Direction, ProductType, SettlementType, Tenant, Trade, TradeStatus,
};
use fxrecon_engine::automation::sms::{SmsError, SmsNotifier, SmsTransport};
use fxrecon_engine::automation::AutomationDispatcher;
use fxrecon_engine::db;
use fxrecon_engine::extract::{LlmError, LlmProvider};
use fxrecon_engine::ingest::IngestUnit;
use fxrecon_engine::pipeline::Pipeline;
use fxrecon_engine::tasks::{QueueName, TaskError, TaskPayload, TaskScheduler};
use rust_decimal_macros::dec;
use sqlx::SqlitePool;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use uuid::Uuid;

pub const TENANT_ID: &str = "acme";

/// Provider returning a canned completion, or an error when empty.
pub struct FakeLlm {
    pub response: Mutex<String>,
}

impl FakeLlm {
    pub fn returning(response: &str) -> Arc<Self> {
        Arc::new(Self {
            response: Mutex::new(response.to_string()),
        })
    }

    pub fn set_response(&self, response: &str) {
        *self.response.lock().unwrap() = response.to_string();
    }
}

#[async_trait]
impl LlmProvider for FakeLlm {
    async fn complete(&self, _system: &str, _user: &str) -> Result<String, LlmError> {
        let response = self.response.lock().unwrap().clone();
        if response.is_empty() {
            return Err(LlmError::Request("provider unavailable".to_string()));
        }
        Ok(response)
    }
}

/// Scheduler that records enqueued tasks instead of dispatching them.
#[derive(Default)]
pub struct CapturingScheduler {
    pub enqueued: Mutex<Vec<(QueueName, TaskPayload, Duration)>>,
}

#[async_trait]
impl TaskScheduler for CapturingScheduler {
    async fn enqueue(
        &self,
        queue: QueueName,
        task_type: &str,
        data: serde_json::Value,
        delay: Duration,
    ) -> Result<String, TaskError> {
        let payload = TaskPayload {
            task_type: task_type.to_string(),
            task_id: Uuid::new_v4().to_string(),
            data,
            created_at: Utc::now(),
            queue_used: queue,
        };
        let task_id = payload.task_id.clone();
        self.enqueued.lock().unwrap().push((queue, payload, delay));
        Ok(task_id)
    }
}

pub struct NullSmsTransport;

#[async_trait]
impl SmsTransport for NullSmsTransport {
    async fn send(&self, _to: &str, _body: &str) -> Result<String, SmsError> {
        Ok("msg-null".to_string())
    }
    async fn status(&self, _id: &str) -> Result<String, SmsError> {
        Ok("delivered".to_string())
    }
}

pub fn tenant() -> Tenant {
    Tenant {
        id: TENANT_ID.to_string(),
        name: "Acme Corp".to_string(),
        confirmation_email: "confirmaciones+acme@fxrecon.cl".to_string(),
        language: "es".to_string(),
    }
}

/// Client trade matching scenario fixtures: USD/CLP spot, 1M at 932.88.
pub fn client_trade() -> Trade {
    Trade {
        id: Uuid::new_v4(),
        tenant_id: TENANT_ID.to_string(),
        trade_number: "32013".to_string(),
        counterparty_name: "Banco ABC".to_string(),
        product_type: ProductType::Spot,
        direction: Direction::Buy,
        currency1: "USD".to_string(),
        currency2: "CLP".to_string(),
        quantity_currency1: dec!(1000000),
        price: dec!(932.88),
        trade_date: "29-09-2025".to_string(),
        value_date: Some("30-09-2025".to_string()),
        maturity_date: None,
        payment_date: None,
        settlement_type: Some(SettlementType::Compensacion),
        settlement_currency: None,
        fixing_reference: None,
        our_payment_method: None,
        counterparty_payment_method: None,
        status: TradeStatus::Unmatched,
        created_at: Utc::now(),
    }
}

/// Extraction output mirroring `client_trade` exactly, with an
/// optional price override.
pub fn confirmation_json(price: &str) -> String {
    serde_json::json!({
        "email": { "confirmation": "Yes", "num_trades": 1 },
        "trades": [{
            "trade_number": "32013",
            "counterparty_name": "Banco ABC",
            "product_type": "Spot",
            "direction": "Buy",
            "currency1": "USD",
            "currency2": "CLP",
            "quantity_currency1": "1000000",
            "price": price,
            "trade_date": "29-09-2025",
            "value_date": "30-09-2025",
            "settlement_type": "Compensación"
        }]
    })
    .to_string()
}

/// Extraction output that matches no client trade.
pub fn unrecognized_json() -> String {
    serde_json::json!({
        "email": { "confirmation": "Yes", "num_trades": 1 },
        "trades": [{
            "trade_number": "99999",
            "counterparty_name": "Banco Lejano",
            "currency1": "EUR",
            "currency2": "JPY",
            "quantity_currency1": "5000",
            "trade_date": "01-01-2020"
        }]
    })
    .to_string()
}

pub struct Harness {
    pub db: SqlitePool,
    pub event_bus: EventBus,
    pub llm: Arc<FakeLlm>,
    pub scheduler: Arc<CapturingScheduler>,
    pub pipeline: Arc<Pipeline>,
}

pub async fn harness(llm_response: &str) -> Harness {
    let db = db::init_database_pool("sqlite::memory:").await.unwrap();
    db::tenants::insert_tenant(&db, &tenant()).await.unwrap();

    let event_bus = EventBus::new();
    let llm = FakeLlm::returning(llm_response);
    let scheduler = Arc::new(CapturingScheduler::default());
    let sms = Arc::new(SmsNotifier::new(Box::new(NullSmsTransport)));
    let automation = AutomationDispatcher::new(scheduler.clone(), sms);
    let pipeline = Arc::new(Pipeline::new(
        db.clone(),
        llm.clone(),
        automation,
        event_bus.clone(),
    ));

    Harness {
        db,
        event_bus,
        llm,
        scheduler,
        pipeline,
    }
}

pub fn unit() -> IngestUnit {
    IngestUnit {
        tenant: tenant(),
        sender_email: Some("fx@bancoabc.cl".to_string()),
        subject: Some("Confirmación operación 32013".to_string()),
        email_date: Some("29-09-2025".to_string()),
        email_time: Some("10:15:00".to_string()),
        body: "Se confirma operación spot USD/CLP".to_string(),
        attachments_text: String::new(),
        source_file: Some("confirmacion.pdf".to_string()),
    }
}
