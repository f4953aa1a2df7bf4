//! Everything a command needs: the local store, config and services over them.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use quickdesk_billing::{
    BillingConfig, LicenseService, LogMailer, MemberService, MockPaymentGateway, PaymentService,
    SubscriptionService,
};
use quickdesk_config::{ConfigError, QuickdeskConfig};
use quickdesk_events_memory::MemoryEventBus;
use quickdesk_store_memory::MemoryStore;
use quickdesk_tickets::TicketService;
use serde::Serialize;
use tracing::debug;

pub type CmdResult = Result<(), Box<dyn std::error::Error>>;

pub struct Context {
    pub store: Arc<MemoryStore>,
    /// Ticket changes made during this invocation.
    pub events: Arc<MemoryEventBus>,
    pub config: QuickdeskConfig,
    state_path: PathBuf,
}

impl Context {
    pub fn open(
        config_path: Option<&Path>,
        state_override: Option<PathBuf>,
    ) -> Result<Self, Box<dyn std::error::Error>> {
        let config = match config_path {
            Some(path) => QuickdeskConfig::load_from(path)?,
            None => match QuickdeskConfig::load() {
                Err(ConfigError::NotFound) => QuickdeskConfig::default(),
                other => other?,
            },
        };
        let state_path = match state_override {
            Some(path) => path,
            None => config.resolve_state_path()?,
        };
        debug!(state = %state_path.display(), "Opening local store");
        let store = Arc::new(MemoryStore::open_snapshot(&state_path)?);

        Ok(Self {
            store,
            events: Arc::new(MemoryEventBus::new()),
            config,
            state_path,
        })
    }

    /// Persist the store back to its snapshot file.
    pub async fn save(&self) -> CmdResult {
        self.store.save_snapshot(&self.state_path).await?;
        Ok(())
    }

    pub fn tickets(&self) -> TicketService {
        TicketService::new(self.store.clone(), self.store.clone())
            .with_event_bus(self.events.clone())
            .with_cache_capacity(self.config.cache_capacity)
            .with_defaults(self.config.ticket_defaults())
    }

    pub fn licenses(&self) -> LicenseService<MemoryStore> {
        LicenseService::new(self.store.clone())
    }

    pub fn members(&self) -> MemberService<MemoryStore> {
        MemberService::new(self.store.clone(), Arc::new(LogMailer))
    }

    pub fn subscriptions(&self) -> Result<SubscriptionService<MemoryStore>, Box<dyn std::error::Error>> {
        Ok(SubscriptionService::new(self.billing_config()?, self.store.clone()))
    }

    pub fn payments(&self) -> Result<PaymentService<MemoryStore>, Box<dyn std::error::Error>> {
        Ok(PaymentService::new(
            self.billing_config()?,
            self.store.clone(),
            Arc::new(MockPaymentGateway::new()),
        ))
    }

    /// Gateway credentials from the environment when present, otherwise
    /// the pricing defaults from the config file.
    pub fn billing_config(&self) -> Result<BillingConfig, Box<dyn std::error::Error>> {
        if std::env::var_os("PAYMONGO_SECRET_KEY").is_some() {
            return Ok(BillingConfig::from_env()?);
        }
        let defaults = &self.config.billing;
        Ok(BillingConfig {
            secret_key: String::new(),
            webhook_secret: String::new(),
            price_per_agent: defaults.price_per_agent,
            currency: defaults.currency.clone(),
            trial_days: defaults.trial_days,
        })
    }
}

pub fn print_json<T: Serialize>(value: &T) -> CmdResult {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
