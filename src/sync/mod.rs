use crate::form::FormSchema;
use crate::models::{id_string, RecordRef};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashSet};

pub(crate) const EMPTY_MESSAGE: &str = "Nothing here yet";

#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct Column {
    pub key: String,
    pub label: String,
    /// Double-click edits the cell in place.
    pub inline_edit: bool,
}

impl Column {
    pub fn new(key: &str, label: &str) -> Self {
        Self {
            key: key.to_string(),
            label: label.to_string(),
            inline_edit: false,
        }
    }

    pub fn inline(mut self) -> Self {
        self.inline_edit = true;
        self
    }
}

/// Text a cell shows for a wire value.
pub(crate) fn cell_text(v: &Value) -> String {
    match v {
        Value::Null => String::new(),
        Value::Bool(true) => "Yes".to_string(),
        Value::Bool(false) => "No".to_string(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[derive(Clone, Debug, PartialEq)]
pub(crate) struct RecordRow {
    pub record: RecordRef,
    pub cells: BTreeMap<String, String>,
    pub completed: bool,
}

impl RecordRow {
    /// `None` when the payload has no usable id.
    pub fn from_record(module: &str, subtype: &str, columns: &[Column], data: &Map<String, Value>) -> Option<Self> {
        let id = data.get("id").and_then(id_string)?;
        let cells = columns
            .iter()
            .map(|c| (c.key.clone(), data.get(&c.key).map(cell_text).unwrap_or_default()))
            .collect();
        Some(Self {
            record: RecordRef::new(module, subtype, id),
            cells,
            completed: data.get("is_done").and_then(|v| v.as_bool()).unwrap_or(false),
        })
    }

    pub fn cell(&self, key: &str) -> &str {
        self.cells.get(key).map(|s| s.as_str()).unwrap_or("")
    }
}

#[derive(Clone, Debug, PartialEq)]
pub(crate) enum BodyRow {
    Record(RecordRow),
    /// Empty-state row spanning every column.
    Placeholder { colspan: usize },
}

/// Live view of one subtype's collection. The body is never empty: with no
/// records it holds exactly one placeholder.
#[derive(Clone, Debug, PartialEq)]
pub(crate) struct RecordTable {
    pub module: String,
    pub subtype: String,
    pub columns: Vec<Column>,
    body: Vec<BodyRow>,
}

impl RecordTable {
    pub fn new(module: &str, subtype: &str, columns: Vec<Column>) -> Self {
        let mut t = Self {
            module: module.to_string(),
            subtype: subtype.to_string(),
            columns,
            body: vec![],
        };
        t.ensure_placeholder();
        t
    }

    /// One column per submitted field; text fields are editable in place.
    pub fn for_schema(schema: &FormSchema) -> Self {
        let columns = schema
            .fields
            .iter()
            .filter(|f| f.submitted)
            .map(|f| {
                let c = Column::new(&f.wire_key, &f.label);
                if matches!(f.kind, crate::form::FieldKind::Text) {
                    c.inline()
                } else {
                    c
                }
            })
            .collect();
        Self::new(&schema.module, &schema.subtype, columns)
    }

    /// Data columns plus the actions column.
    pub fn colspan(&self) -> usize {
        self.columns.len() + 1
    }

    pub fn body(&self) -> &[BodyRow] {
        &self.body
    }

    pub fn rows(&self) -> impl Iterator<Item = &RecordRow> {
        self.body.iter().filter_map(|r| match r {
            BodyRow::Record(row) => Some(row),
            BodyRow::Placeholder { .. } => None,
        })
    }

    pub fn row(&self, record: &RecordRef) -> Option<&RecordRow> {
        self.rows().find(|r| &r.record == record)
    }

    fn row_mut(&mut self, record: &RecordRef) -> Option<&mut RecordRow> {
        self.body.iter_mut().find_map(|r| match r {
            BodyRow::Record(row) if &row.record == record => Some(row),
            _ => None,
        })
    }

    pub fn is_empty(&self) -> bool {
        self.rows().next().is_none()
    }

    fn ensure_placeholder(&mut self) {
        if self.body.is_empty() {
            self.body.push(BodyRow::Placeholder {
                colspan: self.colspan(),
            });
        }
    }

    fn drop_placeholder(&mut self) {
        self.body.retain(|r| matches!(r, BodyRow::Record(_)));
    }

    /// Replaces the body with a fresh listing. Records without an id are skipped.
    pub fn load(&mut self, records: &[Map<String, Value>]) {
        self.body = records
            .iter()
            .filter_map(|d| RecordRow::from_record(&self.module, &self.subtype, &self.columns, d))
            .map(BodyRow::Record)
            .collect();
        self.ensure_placeholder();
    }

    /// Returns false if the row was already gone.
    pub fn remove_row(&mut self, record: &RecordRef) -> bool {
        let before = self.body.len();
        self.body
            .retain(|r| !matches!(r, BodyRow::Record(row) if &row.record == record));
        let removed = self.body.len() != before;
        self.ensure_placeholder();
        removed
    }

    /// Replaces an existing row in place, or appends a new one.
    pub fn upsert_row(&mut self, data: &Map<String, Value>) -> Option<RecordRef> {
        let row = RecordRow::from_record(&self.module, &self.subtype, &self.columns, data)?;
        let record = row.record.clone();

        self.drop_placeholder();
        match self.row_mut(&record) {
            Some(existing) => *existing = row,
            None => self.body.push(BodyRow::Record(row)),
        }
        Some(record)
    }

    /// Writes the server's value, not what the user typed.
    pub fn update_cell(&mut self, record: &RecordRef, key: &str, server_value: &Value) -> bool {
        let Some(row) = self.row_mut(record) else {
            return false;
        };
        let Some(cell) = row.cells.get_mut(key) else {
            return false;
        };
        *cell = cell_text(server_value);
        true
    }

    pub fn set_completed(&mut self, record: &RecordRef, completed: bool) -> bool {
        let Some(row) = self.row_mut(record) else {
            return false;
        };
        row.completed = completed;
        if let Some(cell) = row.cells.get_mut("is_done") {
            *cell = cell_text(&Value::Bool(completed));
        }
        true
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct ShoppingItem {
    pub record: RecordRef,
    pub product_id: String,
    pub name: String,
    pub quantity_wanted: i64,
}

impl ShoppingItem {
    pub fn from_record(data: &Map<String, Value>) -> Option<Self> {
        let id = data.get("id").and_then(id_string)?;
        let product_id = data.get("product").and_then(id_string)?;
        let name = data
            .get("product_name")
            .and_then(|v| v.as_str())
            .map(|s| s.to_string())
            .unwrap_or_else(|| product_id.clone());
        Some(Self {
            record: RecordRef::new(ShoppingList::MODULE, ShoppingList::SUBTYPE, id),
            product_id,
            name,
            quantity_wanted: quantity_wanted(data).unwrap_or(1),
        })
    }
}

/// `quantity_wanted` as sent by the server, number or numeric string.
pub(crate) fn quantity_wanted(data: &Map<String, Value>) -> Option<i64> {
    match data.get("quantity_wanted")? {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f.round() as i64)),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// The shopping list panel. At most one item per product.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub(crate) struct ShoppingList {
    items: Vec<ShoppingItem>,
}

impl ShoppingList {
    pub const MODULE: &'static str = "groceries";
    pub const SUBTYPE: &'static str = "shopping_list";

    pub fn endpoint() -> String {
        crate::models::collection_endpoint(Self::MODULE, Self::SUBTYPE)
    }

    pub fn items(&self) -> &[ShoppingItem] {
        &self.items
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn load(&mut self, records: &[Map<String, Value>]) {
        self.items.clear();
        for r in records {
            self.insert_or_increment(r);
        }
    }

    /// New product: append. Known product: take the server quantity, or bump by one
    /// if the response doesn't carry it.
    pub fn insert_or_increment(&mut self, data: &Map<String, Value>) -> bool {
        let Some(item) = ShoppingItem::from_record(data) else {
            return false;
        };
        match self.items.iter_mut().find(|i| i.product_id == item.product_id) {
            Some(existing) => {
                existing.quantity_wanted = quantity_wanted(data).unwrap_or(existing.quantity_wanted + 1);
            }
            None => self.items.push(item),
        }
        true
    }

    pub fn set_quantity(&mut self, record: &RecordRef, quantity_wanted: i64) -> bool {
        match self.items.iter_mut().find(|i| &i.record == record) {
            Some(item) => {
                item.quantity_wanted = quantity_wanted;
                true
            }
            None => false,
        }
    }

    pub fn remove(&mut self, record: &RecordRef) -> bool {
        let before = self.items.len();
        self.items.retain(|i| &i.record != record);
        self.items.len() != before
    }

    pub fn item(&self, record: &RecordRef) -> Option<&ShoppingItem> {
        self.items.iter().find(|i| &i.record == record)
    }
}

/// Records with a mutating request outstanding. Their controls stay disabled.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub(crate) struct InFlight {
    busy: HashSet<RecordRef>,
}

impl InFlight {
    /// False if the record is already busy; the caller must not send.
    pub fn begin(&mut self, record: &RecordRef) -> bool {
        self.busy.insert(record.clone())
    }

    pub fn end(&mut self, record: &RecordRef) {
        self.busy.remove(record);
    }

    pub fn contains(&self, record: &RecordRef) -> bool {
        self.busy.contains(record)
    }
}
