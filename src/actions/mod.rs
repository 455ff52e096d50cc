use crate::api::{Callbacks, GatewayError};
use crate::form::{local_offset, ModalForm, ModalPhase};
use crate::menu::{MenuAction, MenuPlacement};
use crate::models::{Envelope, RecordRef};
use crate::state::{AppContext, Notice};
use crate::sync::{quantity_wanted, RecordRow, RecordTable, ShoppingList};
use crate::validation::{BrowserTimer, InputAction};
use leptos::prelude::*;
use leptos::task::spawn_local;
use serde_json::{json, Value};

/// What a user sees for a failed call. Fatal precondition failures are
/// console-only.
pub(crate) fn error_notice(e: &GatewayError) -> Option<Notice> {
    if e.is_fatal() {
        None
    } else {
        Some(Notice::error(e.user_message()))
    }
}

pub(crate) fn success_message(env: &Envelope, fallback: &str) -> String {
    if env.message.trim().is_empty() {
        fallback.to_string()
    } else {
        env.message.clone()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum QuantityChange {
    Set(i64),
    /// Dropping below one removes the item.
    Remove,
}

pub(crate) fn quantity_change(current: i64, delta: i64) -> QuantityChange {
    match current.saturating_add(delta) {
        n if n < 1 => QuantityChange::Remove,
        n => QuantityChange::Set(n),
    }
}

/// Products are their own product; transactions point at one.
pub(crate) fn product_id_for(record: &RecordRef, row: Option<&RecordRow>) -> Option<String> {
    match record.subtype.as_str() {
        "products" => Some(record.item_id.clone()),
        _ => row
            .map(|r| r.cell("product").trim().to_string())
            .filter(|id| !id.is_empty()),
    }
}

/// Field value from the response, falling back to what was sent.
fn confirmed(env: &Envelope, key: &str, sent: Value) -> Value {
    env.record().and_then(|d| d.get(key)).cloned().unwrap_or(sent)
}

/// Handlers behind menu items, row controls and the modal.
///
/// Every mutating call claims its record in `in_flight` first and releases it
/// when the response lands, so a second click while pending does nothing.
#[derive(Clone)]
pub(crate) struct EntityActions {
    app: AppContext,
}

impl EntityActions {
    pub fn new(app: AppContext) -> Self {
        Self { app }
    }

    fn claim(&self, record: &RecordRef) -> bool {
        let claimed = self
            .app
            .0
            .in_flight
            .try_update(|f| f.begin(record))
            .unwrap_or(false);
        if !claimed {
            log::debug!("{} already has a request in flight", record.item_endpoint());
        }
        claimed
    }

    fn release(&self, record: &RecordRef) {
        self.app.0.in_flight.update(|f| f.end(record));
    }

    pub fn is_busy(&self, record: &RecordRef) -> bool {
        self.app.0.in_flight.with(|f| f.contains(record))
    }

    fn report(&self, e: &GatewayError) {
        if let Some(n) = error_notice(e) {
            self.app.0.notify(n);
        }
    }

    /// Applies `f` only if the shown table still belongs to `record`'s subtype.
    fn with_table(&self, record: &RecordRef, f: impl FnOnce(&mut RecordTable)) {
        self.app.0.table.update(|t| {
            if let Some(t) = t.as_mut() {
                if t.module == record.module && t.subtype == record.subtype {
                    f(t);
                }
            }
        });
    }

    fn with_modal<U>(&self, f: impl FnOnce(&mut ModalForm) -> U) -> Option<U> {
        self.app.0.modal.try_update(|m| m.as_mut().map(f)).flatten()
    }

    /* ---------------------------- listing ---------------------------- */

    pub fn load_table(&self, module: &str, subtype: &str) {
        let table = self
            .app
            .0
            .config
            .with_value(|c| c.schema(module, subtype).map(RecordTable::for_schema));
        let Some(table) = table else {
            log::warn!("no field table for {module}/{subtype}");
            self.app.0.table.set(None);
            return;
        };

        let endpoint = table_endpoint(&table);
        self.app.0.table.set(Some(table));

        let req_id = self.app.0.table_request_id.get_untracked().saturating_add(1);
        self.app.0.table_request_id.set(req_id);
        self.app.0.table_loading.set(true);

        let api_client = self.app.0.api_client.get_untracked();
        let s = self.clone();
        spawn_local(async move {
            let result = api_client.get(&endpoint).await;

            // A newer listing was requested meanwhile.
            if s.app.0.table_request_id.get_untracked() != req_id {
                return;
            }

            match result {
                Ok(env) => {
                    let records = env.records();
                    s.app.0.table.update(|t| {
                        if let Some(t) = t.as_mut() {
                            t.load(&records);
                        }
                    });
                }
                Err(e) => s.report(&e),
            }
            s.app.0.table_loading.set(false);
        });
    }

    pub fn load_shopping_list(&self) {
        let api_client = self.app.0.api_client.get_untracked();
        let s = self.clone();
        spawn_local(async move {
            match api_client.get(&ShoppingList::endpoint()).await {
                Ok(env) => {
                    let records = env.records();
                    s.app.0.shopping_list.update(|l| l.load(&records));
                }
                Err(e) => s.report(&e),
            }
        });
    }

    /* ----------------------------- menu ------------------------------ */

    pub fn open_menu(&self, record: RecordRef, placement: MenuPlacement) {
        let menu = self.app.0.menu;
        self.app
            .0
            .config
            .with_value(|c| menu.update(|m| m.open(&c.menu, record, placement)));
    }

    pub fn dismiss_menu(&self) {
        self.app.0.menu.update(|m| m.dismiss());
    }

    /// Menu item clicked: close the menu, then run the handler.
    pub fn choose(&self, action: MenuAction) {
        let chosen = self.app.0.menu.try_update(|m| m.choose(action)).flatten();
        if let Some((action, record)) = chosen {
            self.dispatch(action, record);
        }
    }

    pub fn dispatch(&self, action: MenuAction, record: RecordRef) {
        log::debug!("{action} {}", record.item_endpoint());
        match action {
            MenuAction::Edit => self.open_edit(record),
            MenuAction::Delete => self.delete(record),
            MenuAction::AddToShoppingList => self.add_to_shopping_list(record),
            MenuAction::ToggleComplete => self.toggle_complete(record),
        }
    }

    /* ------------------------- row mutations ------------------------- */

    pub fn delete(&self, record: RecordRef) {
        if !self.claim(&record) {
            return;
        }
        let api_client = self.app.0.api_client.get_untracked();
        let s = self.clone();
        spawn_local(async move {
            let result = api_client.delete(&record.item_endpoint()).await;
            s.release(&record);
            match result {
                Ok(env) => {
                    s.with_table(&record, |t| {
                        t.remove_row(&record);
                    });
                    s.app.0.notify(Notice::success(success_message(&env, "Deleted")));
                }
                Err(e) => s.report(&e),
            }
        });
    }

    pub fn toggle_complete(&self, record: RecordRef) {
        let completed = self
            .app
            .0
            .table
            .with_untracked(|t| t.as_ref().and_then(|t| t.row(&record)).map(|r| r.completed));
        let Some(completed) = completed else {
            return;
        };
        if !self.claim(&record) {
            return;
        }

        let api_client = self.app.0.api_client.get_untracked();
        let s = self.clone();
        spawn_local(async move {
            let wanted = !completed;
            let result = api_client
                .patch(&record.item_endpoint(), json!({ "is_done": wanted }))
                .await;
            s.release(&record);
            match result {
                Ok(env) => {
                    let done = confirmed(&env, "is_done", Value::Bool(wanted))
                        .as_bool()
                        .unwrap_or(wanted);
                    s.with_table(&record, |t| {
                        t.set_completed(&record, done);
                    });
                }
                Err(e) => s.report(&e),
            }
        });
    }

    pub fn add_to_shopping_list(&self, record: RecordRef) {
        let row = self
            .app
            .0
            .table
            .with_untracked(|t| t.as_ref().and_then(|t| t.row(&record)).cloned());
        let Some(product_id) = product_id_for(&record, row.as_ref()) else {
            self.app.0.notify(Notice::error("This record has no product"));
            return;
        };
        if !self.claim(&record) {
            return;
        }

        let api_client = self.app.0.api_client.get_untracked();
        let s = self.clone();
        spawn_local(async move {
            let result = api_client
                .post(
                    &ShoppingList::endpoint(),
                    json!({ "product": product_id, "quantity_wanted": 1 }),
                )
                .await;
            s.release(&record);
            match result {
                Ok(env) => {
                    if let Some(data) = env.record() {
                        s.app.0.shopping_list.update(|l| {
                            l.insert_or_increment(data);
                        });
                    }
                    s.app
                        .0
                        .notify(Notice::success(success_message(&env, "Added to shopping list")));
                }
                Err(e) => s.report(&e),
            }
        });
    }

    /// Shopping list `+`/`-`. Both buttons stay disabled until the server answers.
    pub fn change_quantity(&self, record: RecordRef, delta: i64) {
        let current = self
            .app
            .0
            .shopping_list
            .with_untracked(|l| l.item(&record).map(|i| i.quantity_wanted));
        let Some(current) = current else {
            return;
        };
        if !self.claim(&record) {
            return;
        }

        let api_client = self.app.0.api_client.get_untracked();
        let s = self.clone();
        spawn_local(async move {
            match quantity_change(current, delta) {
                QuantityChange::Set(q) => {
                    let result = api_client
                        .patch(&record.item_endpoint(), json!({ "quantity_wanted": q }))
                        .await;
                    s.release(&record);
                    match result {
                        Ok(env) => {
                            let q = env.record().and_then(quantity_wanted).unwrap_or(q);
                            s.app.0.shopping_list.update(|l| {
                                l.set_quantity(&record, q);
                            });
                        }
                        Err(e) => s.report(&e),
                    }
                }
                QuantityChange::Remove => {
                    let result = api_client.delete(&record.item_endpoint()).await;
                    s.release(&record);
                    match result {
                        Ok(_) => s.app.0.shopping_list.update(|l| {
                            l.remove(&record);
                        }),
                        Err(e) => s.report(&e),
                    }
                }
            }
        });
    }

    /// Inline cell edit committed with Enter: PATCH the one field, show what the server stored.
    pub fn commit_cell(&self, record: RecordRef, key: String, value: String) {
        if !self.claim(&record) {
            return;
        }
        let api_client = self.app.0.api_client.get_untracked();
        let s = self.clone();
        spawn_local(async move {
            let sent = Value::String(value);
            let mut body = serde_json::Map::new();
            body.insert(key.clone(), sent.clone());

            let result = api_client
                .patch(&record.item_endpoint(), Value::Object(body))
                .await;
            s.release(&record);
            match result {
                Ok(env) => {
                    let v = confirmed(&env, &key, sent);
                    s.with_table(&record, |t| {
                        t.update_cell(&record, &key, &v);
                    });
                }
                Err(e) => s.report(&e),
            }
        });
    }

    /* ----------------------------- modal ----------------------------- */

    /// Makes sure the modal is built for `module/subtype`, closing any other session.
    fn ensure_modal(&self, module: &str, subtype: &str) -> bool {
        let schema = self
            .app
            .0
            .config
            .with_value(|c| c.schema(module, subtype).cloned());
        let Some(schema) = schema else {
            log::warn!("no form for {module}/{subtype}");
            return false;
        };

        self.cancel_field_timers();
        self.app.0.modal.update(|m| {
            let same = m
                .as_ref()
                .is_some_and(|f| f.schema().module == module && f.schema().subtype == subtype);
            if !same {
                if let Some(f) = m.as_mut() {
                    f.close();
                }
                *m = Some(ModalForm::new(schema));
            }
        });
        true
    }

    pub fn open_create(&self, module: &str, subtype: &str) {
        self.dismiss_menu();
        if !self.ensure_modal(module, subtype) {
            return;
        }
        self.with_modal(|f| f.open_create());
        self.load_remote_options();
    }

    pub fn open_edit(&self, record: RecordRef) {
        self.dismiss_menu();
        if !self.ensure_modal(&record.module, &record.subtype) {
            return;
        }
        let Some(ticket) = self.with_modal(|f| f.begin_edit(record.clone())) else {
            return;
        };

        let api_client = self.app.0.api_client.get_untracked();
        let s = self.clone();
        spawn_local(async move {
            let endpoint = record.item_endpoint();
            match api_client.get(&endpoint).await {
                Ok(env) => {
                    let Some(data) = env.record().cloned() else {
                        s.with_modal(|f| f.fail_edit(ticket));
                        s.app.0.notify(Notice::error("The record could not be loaded"));
                        return;
                    };
                    let offset = local_offset();
                    let opened = s
                        .with_modal(|f| f.finish_edit(ticket, &data, &offset))
                        .unwrap_or(false);
                    if opened {
                        s.load_remote_options();
                    } else {
                        log::debug!("ignoring stale response for {endpoint}");
                    }
                }
                Err(e) => {
                    s.with_modal(|f| f.fail_edit(ticket));
                    s.report(&e);
                }
            }
        });
    }

    fn load_remote_options(&self) {
        let sources = self
            .app
            .0
            .modal
            .with_untracked(|m| m.as_ref().map(|f| f.remote_choice_sources()))
            .unwrap_or_default();

        for (control, endpoint) in sources {
            let api_client = self.app.0.api_client.get_untracked();
            let s = self.clone();
            spawn_local(async move {
                // Failures are logged by the gateway; the select just stays empty.
                if let Ok(env) = api_client.get(&endpoint).await {
                    let records = env.records();
                    s.with_modal(|f| f.set_remote_options(&control, &records));
                }
            });
        }
    }

    pub fn on_field_input(&self, control: &str, value: &str) {
        match self.with_modal(|f| f.on_input(control, value)) {
            Some(InputAction::Cleared) => {
                if let Ok(mut timers) = self.app.0.field_timers.lock() {
                    timers.cancel(control);
                }
            }
            Some(InputAction::Debounce) => self.schedule_commit(control),
            None => {}
        }
    }

    fn schedule_commit(&self, control: &str) {
        let modal = self.app.0.modal;
        let timers = self.app.0.field_timers.clone();
        let field = control.to_string();

        let handle = BrowserTimer::schedule(self.app.0.env.debounce_ms, move || {
            if let Ok(mut t) = timers.lock() {
                t.fired(&field);
            }
            modal.update(|m| {
                if let Some(f) = m.as_mut() {
                    f.commit(&field);
                }
            });
        });

        match handle {
            Some(h) => {
                if let Ok(mut t) = self.app.0.field_timers.lock() {
                    t.schedule(control, h);
                }
            }
            None => log::warn!("could not schedule validation for {control}"),
        }
    }

    fn cancel_field_timers(&self) {
        if let Ok(mut t) = self.app.0.field_timers.lock() {
            t.cancel_all();
        }
    }

    pub fn set_checked(&self, control: &str, checked: bool) {
        self.with_modal(|f| f.set_checked(control, checked));
    }

    /// Submit handler. Validation failures render inline and never reach the network.
    pub fn submit_modal(&self) {
        let offset = local_offset();
        let Some(outcome) = self.with_modal(|f| {
            let target = (f.schema().module.clone(), f.schema().subtype.clone());
            f.begin_submit(&offset).map(|req| (target, req))
        }) else {
            return;
        };

        let ((module, subtype), req) = match outcome {
            Ok(v) => v,
            Err(errors) => {
                log::debug!("form blocked by {} invalid field(s)", errors.len());
                return;
            }
        };
        self.cancel_field_timers();

        let api_client = self.app.0.api_client.get_untracked();
        let s = self.clone();
        spawn_local(async move {
            let result = api_client
                .request(req.method, &req.endpoint, Some(req.payload.into()), Callbacks::default())
                .await;

            let still_submitting = |f: &ModalForm| matches!(f.phase(), ModalPhase::Submitting(_));
            match result {
                Ok(env) => {
                    s.with_modal(|f| {
                        if still_submitting(f) {
                            f.finish_submit_ok();
                        }
                    });
                    if let Some(data) = env.record() {
                        let anchor = RecordRef::new(module.as_str(), subtype.as_str(), "");
                        s.with_table(&anchor, |t| {
                            t.upsert_row(data);
                        });
                    }
                    s.app.0.notify(Notice::success(success_message(&env, "Saved")));
                }
                Err(e) => {
                    let message = e.user_message();
                    s.with_modal(|f| {
                        if still_submitting(f) {
                            f.finish_submit_err(message);
                        }
                    });
                }
            }
        });
    }

    /// Cancel button, Escape or backdrop click.
    pub fn close_modal(&self) {
        self.cancel_field_timers();
        self.with_modal(|f| f.close());
    }
}

fn table_endpoint(table: &RecordTable) -> String {
    crate::models::collection_endpoint(&table.module, &table.subtype)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::Column;

    #[test]
    fn quantity_never_drops_below_one() {
        assert_eq!(quantity_change(2, 1), QuantityChange::Set(3));
        assert_eq!(quantity_change(2, -1), QuantityChange::Set(1));
        assert_eq!(quantity_change(1, -1), QuantityChange::Remove);
        assert_eq!(quantity_change(i64::MAX, 1), QuantityChange::Set(i64::MAX));
    }

    #[test]
    fn product_id_comes_from_record_or_row() {
        let product = RecordRef::new("groceries", "products", "9");
        assert_eq!(product_id_for(&product, None).as_deref(), Some("9"));

        let mut table = RecordTable::new(
            "groceries",
            "transactions",
            vec![Column::new("product", "Product"), Column::new("amount", "Amount")],
        );
        let tx = table
            .upsert_row(&json!({"id": 4, "product": 12, "amount": "3.00"}).as_object().cloned().unwrap_or_default())
            .expect("row");
        assert_eq!(product_id_for(&tx, table.row(&tx)).as_deref(), Some("12"));
        assert_eq!(product_id_for(&tx, None), None);
    }

    #[test]
    fn fatal_errors_get_no_notice() {
        let fatal = GatewayError::MissingCsrfToken {
            method: crate::api::Method::Post,
            endpoint: "/x".to_string(),
        };
        assert!(error_notice(&fatal).is_none());

        let offline = error_notice(&GatewayError::Network("offline".to_string())).expect("notice");
        assert_eq!(offline.kind, crate::state::NoticeKind::Error);

        let rejected = GatewayError::Rejected {
            message: "Out of stock".to_string(),
            errors: None,
        };
        assert_eq!(error_notice(&rejected).map(|n| n.message).as_deref(), Some("Out of stock"));
    }

    #[test]
    fn confirmed_prefers_server_value() {
        let env = Envelope {
            success: true,
            message: String::new(),
            data: Some(json!({"title": "Trimmed"})),
            errors: None,
        };
        assert_eq!(confirmed(&env, "title", json!(" Trimmed ")), json!("Trimmed"));
        assert_eq!(confirmed(&env, "missing", json!("sent")), json!("sent"));
        assert_eq!(success_message(&env, "Saved"), "Saved");
    }
}
