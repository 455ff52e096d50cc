use super::schema::{ChoiceOption, ChoiceOptions, FieldKind, FormSchema};
use super::{combine_local, control_to_wire, wire_to_control, wire_to_local_date, ControlInput};
use crate::api::Method;
use crate::models::{collection_endpoint, id_string, RecordRef};
use crate::validation::{FieldState, FormValidation, InputAction};
use chrono::FixedOffset;
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Create vs edit. Edit always carries the record it edits.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) enum ModalSession {
    Create,
    Edit(RecordRef),
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub(crate) enum ModalPhase {
    #[default]
    Closed,
    Open(ModalSession),
    Submitting(ModalSession),
}

impl ModalPhase {
    pub fn session(&self) -> Option<&ModalSession> {
        match self {
            ModalPhase::Closed => None,
            ModalPhase::Open(s) | ModalPhase::Submitting(s) => Some(s),
        }
    }

    pub fn is_open(&self) -> bool {
        !matches!(self, ModalPhase::Closed)
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub(crate) struct ControlState {
    pub value: String,
    pub checked: bool,
    pub disabled: bool,
    /// Replaces the schema's options while set.
    pub options: Option<Vec<ChoiceOption>>,
}

/// One edit-mode mutation, recorded so close can undo it.
#[derive(Clone, Debug, PartialEq)]
enum Override {
    Legend(String),
    Disabled(String),
    Options {
        control: String,
        previous: Option<Vec<ChoiceOption>>,
    },
    Carried(String),
}

#[derive(Clone, Debug, PartialEq)]
pub(crate) struct SubmitRequest {
    pub method: Method,
    pub endpoint: String,
    pub payload: Value,
}

/// The shared modal for one subtype: session, control values, overrides,
/// validation and the last server error.
#[derive(Clone, Debug)]
pub(crate) struct ModalForm {
    schema: FormSchema,
    phase: ModalPhase,
    legend: String,
    controls: BTreeMap<String, ControlState>,
    /// Hidden inputs: wire key -> value.
    carried: BTreeMap<String, String>,
    overrides: Vec<Override>,
    remote_options: BTreeMap<String, Vec<ChoiceOption>>,
    validation: FormValidation,
    error: Option<String>,
    ticket: u64,
    pending_edit: Option<(u64, RecordRef)>,
}

impl ModalForm {
    pub fn new(schema: FormSchema) -> Self {
        let validation = FormValidation::new(schema.validator_map(), schema.ordered_pair.clone());
        let legend = schema.create_legend();
        let controls = schema
            .fields
            .iter()
            .map(|f| (f.control_id.clone(), ControlState::default()))
            .collect();

        Self {
            schema,
            phase: ModalPhase::Closed,
            legend,
            controls,
            carried: BTreeMap::new(),
            overrides: vec![],
            remote_options: BTreeMap::new(),
            validation,
            error: None,
            ticket: 0,
            pending_edit: None,
        }
    }

    pub fn schema(&self) -> &FormSchema {
        &self.schema
    }

    pub fn phase(&self) -> &ModalPhase {
        &self.phase
    }

    pub fn legend(&self) -> &str {
        &self.legend
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn control(&self, control_id: &str) -> Option<&ControlState> {
        self.controls.get(control_id)
    }

    pub fn carried(&self, wire_key: &str) -> Option<&str> {
        self.carried.get(wire_key).map(|s| s.as_str())
    }

    pub fn validation(&self) -> &FormValidation {
        &self.validation
    }

    /// Override > loaded remote options > static options.
    pub fn options_for(&self, control_id: &str) -> Vec<ChoiceOption> {
        if let Some(opts) = self.controls.get(control_id).and_then(|c| c.options.clone()) {
            return opts;
        }
        if let Some(opts) = self.remote_options.get(control_id) {
            return opts.clone();
        }
        match self.schema.field(control_id).map(|f| &f.kind) {
            Some(FieldKind::Choice(ChoiceOptions::Static(opts))) => opts.clone(),
            _ => vec![],
        }
    }

    /// Controls whose options come from the server: `(control_id, endpoint)`.
    pub fn remote_choice_sources(&self) -> Vec<(String, String)> {
        self.schema
            .fields
            .iter()
            .filter_map(|f| match &f.kind {
                FieldKind::Choice(ChoiceOptions::Remote { endpoint, .. }) => {
                    Some((f.control_id.clone(), endpoint.clone()))
                }
                _ => None,
            })
            .collect()
    }

    pub fn set_remote_options(&mut self, control_id: &str, records: &[Map<String, Value>]) {
        let Some(FieldKind::Choice(ChoiceOptions::Remote {
            value_key, label_key, ..
        })) = self.schema.field(control_id).map(|f| &f.kind)
        else {
            return;
        };

        let opts = records
            .iter()
            .filter_map(|r| {
                let value = r.get(value_key).and_then(id_string)?;
                let label = r
                    .get(label_key)
                    .and_then(|v| v.as_str())
                    .map(|s| s.to_string())
                    .unwrap_or_else(|| value.clone());
                Some(ChoiceOption { value, label })
            })
            .collect();
        self.remote_options.insert(control_id.to_string(), opts);
    }

    /// Tears down any open session, then shows a blank form.
    pub fn open_create(&mut self) {
        self.close();
        self.phase = ModalPhase::Open(ModalSession::Create);
    }

    /// Tears down any open session and returns the ticket the fetch result must present.
    pub fn begin_edit(&mut self, record: RecordRef) -> u64 {
        self.close();
        self.pending_edit = Some((self.ticket, record));
        self.ticket
    }

    /// Fetch succeeded. Stale tickets (closed or superseded) are ignored.
    pub fn finish_edit(&mut self, ticket: u64, data: &Map<String, Value>, offset: &FixedOffset) -> bool {
        let Some((pending, record)) = self.pending_edit.take() else {
            return false;
        };
        if pending != ticket {
            self.pending_edit = Some((pending, record));
            return false;
        }

        self.phase = ModalPhase::Open(ModalSession::Edit(record));
        self.populate(data, offset);

        let previous = std::mem::replace(&mut self.legend, self.schema.edit_legend());
        self.overrides.push(Override::Legend(previous));

        if let Some(lock) = self.schema.lock_on_edit.clone() {
            self.lock_control(&lock.control_id, &lock.display_key, data);
        }
        true
    }

    pub fn fail_edit(&mut self, ticket: u64) {
        if self.pending_edit.as_ref().is_some_and(|(t, _)| *t == ticket) {
            self.pending_edit = None;
        }
    }

    #[cfg(test)]
    pub fn is_awaiting(&self, ticket: u64) -> bool {
        self.pending_edit.as_ref().is_some_and(|(t, _)| *t == ticket)
    }

    /// Fills every control whose wire key is in `data`; others stay blank.
    fn populate(&mut self, data: &Map<String, Value>, offset: &FixedOffset) {
        for f in self.schema.fields.iter().filter(|f| f.submitted) {
            let Some(v) = data.get(&f.wire_key) else {
                continue;
            };
            let Some(ctl) = self.controls.get_mut(&f.control_id) else {
                continue;
            };
            match wire_to_control(&f.kind, v, offset) {
                ControlInput::Checked(b) => ctl.checked = b,
                ControlInput::Value(s) => {
                    self.validation.seed(&f.control_id, &s);
                    ctl.value = s;
                }
            }
        }

        if let Some(dp) = &self.schema.date_part {
            let date = dp
                .sources
                .iter()
                .find_map(|src| data.get(src).and_then(|v| wire_to_local_date(v, offset)));
            if let (Some(date), Some(ctl)) = (date, self.controls.get_mut(&dp.control_id)) {
                self.validation.seed(&dp.control_id, &date);
                ctl.value = date;
            }
        }
    }

    fn lock_control(&mut self, control_id: &str, display_key: &str, data: &Map<String, Value>) {
        let Some(field) = self.schema.field(control_id).cloned() else {
            return;
        };
        let Some(id) = data.get(&field.wire_key).and_then(id_string) else {
            return;
        };
        let label = data
            .get(display_key)
            .and_then(|v| v.as_str())
            .map(|s| s.to_string())
            .unwrap_or_else(|| id.clone());

        let Some(ctl) = self.controls.get_mut(control_id) else {
            return;
        };
        let previous = ctl.options.replace(vec![ChoiceOption::new(id.clone(), label)]);
        ctl.value = id.clone();
        ctl.disabled = true;

        self.overrides.push(Override::Options {
            control: control_id.to_string(),
            previous,
        });
        self.overrides.push(Override::Disabled(control_id.to_string()));
        self.carried.insert(field.wire_key.clone(), id);
        self.overrides.push(Override::Carried(field.wire_key));
    }

    /// Raw input event. The caller (re)starts or cancels the field's timer.
    pub fn on_input(&mut self, control_id: &str, value: &str) -> InputAction {
        if let Some(ctl) = self.controls.get_mut(control_id) {
            ctl.value = value.to_string();
        }
        self.validation.on_input(control_id, value)
    }

    pub fn set_checked(&mut self, control_id: &str, checked: bool) {
        if let Some(ctl) = self.controls.get_mut(control_id) {
            ctl.checked = checked;
        }
    }

    /// Debounce window elapsed for `control_id`.
    pub fn commit(&mut self, control_id: &str) {
        let value = self
            .controls
            .get(control_id)
            .map(|c| c.value.clone())
            .unwrap_or_default();
        if !value.trim().is_empty() {
            self.validation.commit(control_id, &value);
        }
    }

    pub fn submit_target(&self) -> Option<(Method, String)> {
        match self.phase.session()? {
            ModalSession::Create => Some((
                Method::Post,
                collection_endpoint(&self.schema.module, &self.schema.subtype),
            )),
            ModalSession::Edit(record) => Some((Method::Patch, record.item_endpoint())),
        }
    }

    fn payload(&self, offset: &FixedOffset) -> Value {
        let mut out = Map::new();

        for f in self.schema.fields.iter().filter(|f| f.submitted) {
            let Some(ctl) = self.controls.get(&f.control_id) else {
                continue;
            };
            // Disabled controls never submit; anything they must carry lives in `carried`.
            if ctl.disabled {
                continue;
            }
            out.insert(f.wire_key.clone(), control_to_wire(&f.kind, ctl));
        }

        if let Some(dp) = &self.schema.date_part {
            let date = self
                .controls
                .get(&dp.control_id)
                .map(|c| c.value.clone())
                .unwrap_or_default();
            for src in &dp.sources {
                let Some(f) = self.schema.field_by_wire_key(src) else {
                    continue;
                };
                let time = self
                    .controls
                    .get(&f.control_id)
                    .map(|c| c.value.clone())
                    .unwrap_or_default();
                if let Some(instant) = combine_local(&date, &time, offset) {
                    out.insert(src.clone(), Value::String(instant));
                }
            }
        }

        for (k, v) in &self.carried {
            out.insert(k.clone(), Value::String(v.clone()));
        }

        Value::Object(out)
    }

    /// Validates everything and, if clean, moves to `Submitting` and returns what to send.
    pub fn begin_submit(&mut self, offset: &FixedOffset) -> Result<SubmitRequest, Vec<(String, String)>> {
        let Some((method, endpoint)) = self.submit_target() else {
            return Err(vec![]);
        };
        if matches!(self.phase, ModalPhase::Submitting(_)) {
            return Err(vec![]);
        }

        let values: BTreeMap<String, String> = self
            .controls
            .iter()
            .map(|(k, c)| (k.clone(), c.value.clone()))
            .collect();
        let schema = &self.schema;
        let controls = &self.controls;
        self.validation.validate_for_submit(&values, |id| FieldState {
            required: schema.field(id).is_some_and(|f| f.required),
            disabled: controls.get(id).is_some_and(|c| c.disabled),
        })?;

        let payload = self.payload(offset);
        if let ModalPhase::Open(session) = std::mem::take(&mut self.phase) {
            self.phase = ModalPhase::Submitting(session);
        }
        self.error = None;

        Ok(SubmitRequest {
            method,
            endpoint,
            payload,
        })
    }

    /// Server accepted: reset and close.
    pub fn finish_submit_ok(&mut self) {
        self.close();
    }

    /// Server refused: stay open with its message.
    pub fn finish_submit_err(&mut self, message: String) {
        if let ModalPhase::Submitting(session) = std::mem::take(&mut self.phase) {
            self.phase = ModalPhase::Open(session);
        }
        self.error = Some(message);
    }

    /// Back to pristine. Undoes every edit-mode override in reverse order.
    pub fn close(&mut self) {
        while let Some(o) = self.overrides.pop() {
            match o {
                Override::Legend(previous) => self.legend = previous,
                Override::Disabled(control) => {
                    if let Some(c) = self.controls.get_mut(&control) {
                        c.disabled = false;
                    }
                }
                Override::Options { control, previous } => {
                    if let Some(c) = self.controls.get_mut(&control) {
                        c.options = previous;
                    }
                }
                Override::Carried(key) => {
                    self.carried.remove(&key);
                }
            }
        }

        for c in self.controls.values_mut() {
            c.value.clear();
            c.checked = false;
        }
        self.validation.reset();
        self.error = None;
        self.phase = ModalPhase::Closed;
        self.pending_edit = None;
        self.ticket = self.ticket.wrapping_add(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::form::builtin_schemas;
    use serde_json::json;

    fn utc() -> FixedOffset {
        FixedOffset::east_opt(0).expect("utc")
    }

    fn form(subtype: &str) -> ModalForm {
        let schema = builtin_schemas()
            .expect("schemas")
            .into_iter()
            .find(|s| s.subtype == subtype)
            .expect("subtype");
        ModalForm::new(schema)
    }

    fn obj(v: Value) -> Map<String, Value> {
        v.as_object().cloned().expect("object")
    }

    fn open_edit(f: &mut ModalForm, record: RecordRef, data: Value) {
        let t = f.begin_edit(record);
        assert!(f.finish_edit(t, &obj(data), &utc()));
    }

    #[test]
    fn edit_populates_decimal_by_step() {
        let mut f = form("metrics");
        open_edit(
            &mut f,
            RecordRef::new("health", "metrics", "1"),
            json!({"name": "Weight", "value": 12.5, "recorded_on": "2024-02-01"}),
        );
        assert_eq!(f.control("value").map(|c| c.value.as_str()), Some("12.50"));

        let mut h = form("habits");
        open_edit(
            &mut h,
            RecordRef::new("productivity", "habits", "2"),
            json!({"name": "Read", "target": 7, "frequency": "DAILY", "is_done": true}),
        );
        assert_eq!(h.control("target").map(|c| c.value.as_str()), Some("7"));
        assert_eq!(h.control("frequency").map(|c| c.value.as_str()), Some("daily"));
        assert_eq!(h.control("is_done").map(|c| c.checked), Some(true));
        assert_eq!(h.legend(), "Edit Habit");
    }

    #[test]
    fn edit_submit_patches_item_endpoint() {
        let mut f = form("tasks");
        open_edit(
            &mut f,
            RecordRef::new("productivity", "tasks", "42"),
            json!({"title": "Water plants", "is_done": false}),
        );

        let req = f.begin_submit(&utc()).expect("valid");
        assert_eq!(req.method, Method::Patch);
        assert_eq!(req.endpoint, "/productivity/tasks/42");
        assert_eq!(req.payload["title"], "Water plants");
        assert_eq!(req.payload["is_done"], false);
        assert!(matches!(f.phase(), ModalPhase::Submitting(ModalSession::Edit(_))));
    }

    #[test]
    fn create_submit_posts_collection_endpoint() {
        let mut f = form("tasks");
        f.open_create();
        assert_eq!(f.legend(), "New Task");
        f.on_input("title", "Buy stamps");

        let req = f.begin_submit(&utc()).expect("valid");
        assert_eq!(req.method, Method::Post);
        assert_eq!(req.endpoint, "/productivity/tasks");
        assert_eq!(req.payload["due_date"], Value::Null);
    }

    #[test]
    fn invalid_submit_stays_open_with_all_errors() {
        let mut f = form("transactions");
        f.open_create();
        f.on_input("amount", "-3");

        let errs = f.begin_submit(&utc()).expect_err("invalid");
        let fields: Vec<&str> = errs.iter().map(|(k, _)| k.as_str()).collect();
        assert_eq!(fields, vec!["amount", "occurred_on", "product"]);
        assert_eq!(f.phase(), &ModalPhase::Open(ModalSession::Create));
        assert!(f.validation().feedback("product").visible);
    }

    #[test]
    fn transaction_edit_locks_product_and_carries_id() {
        let mut f = form("transactions");
        open_edit(
            &mut f,
            RecordRef::new("groceries", "transactions", "5"),
            json!({"product": 31, "product_name": "Oat milk", "amount": "2.4", "occurred_on": "2024-05-01"}),
        );

        let product = f.control("product").expect("product control");
        assert!(product.disabled);
        assert_eq!(f.options_for("product"), vec![ChoiceOption::new("31", "Oat milk")]);
        assert_eq!(f.carried("product"), Some("31"));

        let req = f.begin_submit(&utc()).expect("disabled product is skipped");
        assert_eq!(req.payload["product"], "31");
        assert_eq!(req.payload["amount"], json!(2.4));
    }

    #[test]
    fn cancel_restores_legend_and_reenables_controls() {
        let mut f = form("transactions");
        open_edit(
            &mut f,
            RecordRef::new("groceries", "transactions", "5"),
            json!({"product": "31", "product_name": "Oat milk"}),
        );
        assert_eq!(f.legend(), "Edit Transaction");

        f.close();
        assert_eq!(f.legend(), "New Transaction");
        let product = f.control("product").expect("product control");
        assert!(!product.disabled);
        assert!(product.options.is_none());
        assert!(product.value.is_empty());
        assert_eq!(f.carried("product"), None);
        assert_eq!(f.phase(), &ModalPhase::Closed);
        assert!(f.submit_target().is_none());
    }

    #[test]
    fn reopening_for_create_after_edit_leaves_nothing_stale() {
        let mut f = form("tasks");
        open_edit(
            &mut f,
            RecordRef::new("productivity", "tasks", "1"),
            json!({"title": "Old", "priority": "High"}),
        );
        f.open_create();
        assert_eq!(f.control("title").map(|c| c.value.as_str()), Some(""));
        assert_eq!(f.control("priority").map(|c| c.value.as_str()), Some(""));
        assert_eq!(f.legend(), "New Task");
    }

    #[test]
    fn late_fetch_after_close_is_ignored() {
        let mut f = form("tasks");
        let t = f.begin_edit(RecordRef::new("productivity", "tasks", "1"));
        f.close();
        assert!(!f.finish_edit(t, &obj(json!({"title": "Late"})), &utc()));
        assert_eq!(f.phase(), &ModalPhase::Closed);
        assert_eq!(f.control("title").map(|c| c.value.as_str()), Some(""));
    }

    #[test]
    fn superseded_fetch_is_ignored() {
        let mut f = form("tasks");
        let first = f.begin_edit(RecordRef::new("productivity", "tasks", "1"));
        let second = f.begin_edit(RecordRef::new("productivity", "tasks", "2"));
        assert!(!f.finish_edit(first, &obj(json!({"title": "One"})), &utc()));
        assert!(f.is_awaiting(second));
        assert!(f.finish_edit(second, &obj(json!({"title": "Two"})), &utc()));
        assert_eq!(
            f.submit_target().map(|(_, e)| e).as_deref(),
            Some("/productivity/tasks/2")
        );
    }

    #[test]
    fn time_entry_date_is_derived_and_recombined() {
        let mut f = form("time_entries");
        open_edit(
            &mut f,
            RecordRef::new("productivity", "time_entries", "9"),
            json!({
                "description": "Review",
                "started_at": "2024-04-02T09:00:00+00:00",
                "ended_at": "2024-04-02T10:15:00+00:00"
            }),
        );
        assert_eq!(f.control("date").map(|c| c.value.as_str()), Some("2024-04-02"));
        assert_eq!(f.control("started_at").map(|c| c.value.as_str()), Some("09:00"));

        f.on_input("ended_at", "11:00");
        let req = f.begin_submit(&utc()).expect("valid");
        assert_eq!(req.payload["started_at"], "2024-04-02T09:00:00+00:00");
        assert_eq!(req.payload["ended_at"], "2024-04-02T11:00:00+00:00");
        assert!(req.payload.get("date").is_none());
    }

    #[test]
    fn edited_end_is_checked_against_loaded_start() {
        let mut f = form("time_entries");
        open_edit(
            &mut f,
            RecordRef::new("productivity", "time_entries", "9"),
            json!({
                "description": "Review",
                "started_at": "2024-04-02T09:00:00+00:00",
                "ended_at": "2024-04-02T10:15:00+00:00"
            }),
        );
        assert!(!f.validation().feedback("ended_at").invalid, "loaded values render no feedback");

        f.on_input("ended_at", "08:00");
        f.commit("ended_at");

        let end = f.validation().feedback("ended_at");
        assert!(end.visible && end.invalid);
        assert_eq!(end.message, crate::validation::ORDERING_MESSAGE);
        assert!(f.validation().feedback("started_at").invalid);
    }

    #[test]
    fn failed_submit_reopens_with_message() {
        let mut f = form("tasks");
        f.open_create();
        f.on_input("title", "x");
        f.begin_submit(&utc()).expect("valid");
        f.finish_submit_err("Title already exists".to_string());
        assert_eq!(f.phase(), &ModalPhase::Open(ModalSession::Create));
        assert_eq!(f.error(), Some("Title already exists"));

        f.begin_submit(&utc()).expect("retry");
        f.finish_submit_ok();
        assert_eq!(f.phase(), &ModalPhase::Closed);
        assert_eq!(f.control("title").map(|c| c.value.as_str()), Some(""));
    }

    #[test]
    fn double_submit_is_refused_while_in_flight() {
        let mut f = form("tasks");
        f.open_create();
        f.on_input("title", "x");
        f.begin_submit(&utc()).expect("first");
        assert!(f.begin_submit(&utc()).is_err());
    }

    #[test]
    fn remote_options_are_loaded_by_key() {
        let mut f = form("transactions");
        assert_eq!(
            f.remote_choice_sources(),
            vec![("product".to_string(), "/groceries/products".to_string())]
        );
        let records = vec![
            obj(json!({"id": 1, "name": "Eggs"})),
            obj(json!({"id": 2})),
            obj(json!({"name": "no id"})),
        ];
        f.set_remote_options("product", &records);
        assert_eq!(
            f.options_for("product"),
            vec![ChoiceOption::new("1", "Eggs"), ChoiceOption::new("2", "2")]
        );
    }

    #[test]
    fn commit_validates_current_value() {
        let mut f = form("habits");
        f.open_create();
        assert_eq!(f.on_input("name", "a"), InputAction::Debounce);
        f.commit("name");
        assert!(f.validation().feedback("name").message.contains("least"));
        assert_eq!(f.on_input("name", ""), InputAction::Cleared);
        assert!(!f.validation().feedback("name").visible);
    }
}
