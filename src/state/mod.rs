use crate::api::ApiClient;
use crate::config::EnvConfig;
use crate::form::{builtin_schemas, FormSchema, ModalForm, SchemaError};
use crate::menu::{MenuRegistry, MenuState};
use crate::sync::{InFlight, RecordTable, ShoppingList};
use crate::validation::{BrowserTimer, Debouncer};
use leptos::prelude::*;
use std::sync::{Arc, Mutex};

/// Immutable setup-time registries: menu actions and per-subtype field tables.
#[derive(Clone, Debug)]
pub(crate) struct AppConfig {
    pub menu: MenuRegistry,
    pub schemas: Vec<FormSchema>,
}

impl AppConfig {
    pub fn builtin() -> Result<Self, SchemaError> {
        Ok(Self {
            menu: MenuRegistry::builtin(),
            schemas: builtin_schemas()?,
        })
    }

    pub fn schema(&self, module: &str, subtype: &str) -> Option<&FormSchema> {
        self.schemas
            .iter()
            .find(|s| s.module == module && s.subtype == subtype)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum NoticeKind {
    Success,
    Error,
}

/// The single feedback slot above the page content.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct Notice {
    pub kind: NoticeKind,
    pub message: String,
}

impl Notice {
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            kind: NoticeKind::Success,
            message: message.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            kind: NoticeKind::Error,
            message: message.into(),
        }
    }
}

#[derive(Clone)]
pub(crate) struct AppState {
    pub env: EnvConfig,
    pub api_client: RwSignal<ApiClient>,
    pub config: StoredValue<AppConfig>,

    /// At most one context menu.
    pub menu: RwSignal<MenuState>,

    /// The shared modal. Rebuilt when a different subtype opens it.
    pub modal: RwSignal<Option<ModalForm>>,

    /// Table for the page currently shown.
    pub table: RwSignal<Option<RecordTable>>,
    pub table_loading: RwSignal<bool>,
    pub table_request_id: RwSignal<u64>,

    pub shopping_list: RwSignal<ShoppingList>,
    pub in_flight: RwSignal<InFlight>,
    pub notice: RwSignal<Option<Notice>>,

    /// Per-field validation timers for the open modal.
    pub field_timers: Arc<Mutex<Debouncer<BrowserTimer>>>,
}

impl AppState {
    pub fn new(env: EnvConfig, config: AppConfig) -> Self {
        let api_client = ApiClient::from_config(&env);
        if api_client.csrf_token.is_none() {
            log::error!("page has no CSRF token; every request will be refused");
        }

        Self {
            env,
            api_client: RwSignal::new(api_client),
            config: StoredValue::new(config),
            menu: RwSignal::new(MenuState::default()),
            modal: RwSignal::new(None),
            table: RwSignal::new(None),
            table_loading: RwSignal::new(false),
            table_request_id: RwSignal::new(0),
            shopping_list: RwSignal::new(ShoppingList::default()),
            in_flight: RwSignal::new(InFlight::default()),
            notice: RwSignal::new(None),
            field_timers: Arc::new(Mutex::new(Debouncer::new())),
        }
    }

    pub fn notify(&self, notice: Notice) {
        self.notice.set(Some(notice));
    }
}

#[derive(Clone)]
pub(crate) struct AppContext(pub AppState);
