use crate::validation::{OrderedPair, Validator, ValidatorMap};
use std::collections::BTreeSet;
use thiserror::Error;

#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct ChoiceOption {
    pub value: String,
    pub label: String,
}

impl ChoiceOption {
    pub fn new(value: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            label: label.into(),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub(crate) enum ChoiceOptions {
    Static(Vec<ChoiceOption>),
    /// Loaded from a collection endpoint when the modal opens.
    Remote {
        endpoint: String,
        value_key: String,
        label_key: String,
    },
}

/// Input control kind. Decides both wire -> control and control -> wire coercion.
#[derive(Clone, Debug, PartialEq)]
pub(crate) enum FieldKind {
    Boolean,
    Date,
    Time,
    Choice(ChoiceOptions),
    Decimal { step: f64 },
    Text,
}

impl FieldKind {
    pub fn is_temporal(&self) -> bool {
        matches!(self, FieldKind::Date | FieldKind::Time)
    }

    /// `type` attribute of the rendered `<input>`.
    pub fn input_type(&self) -> &'static str {
        match self {
            FieldKind::Boolean => "checkbox",
            FieldKind::Date => "date",
            FieldKind::Time => "time",
            FieldKind::Decimal { .. } => "number",
            FieldKind::Choice(_) | FieldKind::Text => "text",
        }
    }
}

#[derive(Clone, Debug)]
pub(crate) struct FieldDescriptor {
    pub wire_key: String,
    pub control_id: String,
    pub label: String,
    pub kind: FieldKind,
    pub required: bool,
    /// False for client-only controls (e.g. a date split out of an instant).
    pub submitted: bool,
    pub validator: Validator,
}

impl FieldDescriptor {
    /// Control id defaults to the wire key.
    pub fn new(wire_key: &str, label: &str, kind: FieldKind) -> Self {
        Self {
            wire_key: wire_key.to_string(),
            control_id: wire_key.to_string(),
            label: label.to_string(),
            kind,
            required: false,
            submitted: true,
            validator: Validator::new(),
        }
    }

    pub fn control(mut self, control_id: &str) -> Self {
        self.control_id = control_id.to_string();
        self
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn client_only(mut self) -> Self {
        self.submitted = false;
        self
    }

    pub fn validator(mut self, v: Validator) -> Self {
        self.validator = v;
        self
    }
}

/// A date control fed from (and recombined with) instant-valued time controls.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct DatePart {
    pub control_id: String,
    /// Wire keys of the instants; the first one present populates the date.
    pub sources: Vec<String>,
}

/// On edit, swap a choice control for a single read-only option and carry the
/// real value in a hidden field so it still reaches the server.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct LockOnEdit {
    pub control_id: String,
    /// Response key holding the human-readable label.
    pub display_key: String,
}

#[derive(Clone, Debug, PartialEq, Error)]
pub(crate) enum SchemaError {
    #[error("{1}: control id `{0}` is used twice")]
    DuplicateControl(String, String),

    #[error("{1}: wire key `{0}` is used twice")]
    DuplicateWireKey(String, String),

    #[error("{subtype}: {role} refers to unknown control `{name}`")]
    UnknownControl {
        subtype: String,
        role: &'static str,
        name: String,
    },

    #[error("{subtype}: `{field}` needs a positive decimal step")]
    InvalidStep { subtype: String, field: String },

    #[error("{subtype}: `{field}` must be a {expected} control")]
    WrongKind {
        subtype: String,
        field: String,
        expected: &'static str,
    },

    #[error("{subtype}: `{field}` has an invalid pattern: {reason}")]
    InvalidPattern {
        subtype: String,
        field: String,
        reason: String,
    },
}

/// Per-subtype field table. Construction checks every cross reference, so a
/// mismatched id fails at setup instead of silently at populate time.
#[derive(Clone, Debug)]
pub(crate) struct FormSchema {
    pub module: String,
    pub subtype: String,
    pub title: String,
    pub fields: Vec<FieldDescriptor>,
    pub date_part: Option<DatePart>,
    pub lock_on_edit: Option<LockOnEdit>,
    pub ordered_pair: Option<OrderedPair>,
}

pub(crate) struct FormSchemaBuilder {
    schema: FormSchema,
}

impl FormSchemaBuilder {
    pub fn field(mut self, f: FieldDescriptor) -> Self {
        self.schema.fields.push(f);
        self
    }

    pub fn date_part(mut self, control_id: &str, sources: &[&str]) -> Self {
        self.schema.date_part = Some(DatePart {
            control_id: control_id.to_string(),
            sources: sources.iter().map(|s| s.to_string()).collect(),
        });
        self
    }

    pub fn lock_on_edit(mut self, control_id: &str, display_key: &str) -> Self {
        self.schema.lock_on_edit = Some(LockOnEdit {
            control_id: control_id.to_string(),
            display_key: display_key.to_string(),
        });
        self
    }

    pub fn ordered(mut self, start: &str, end: &str) -> Self {
        self.schema.ordered_pair = Some(OrderedPair::new(start, end));
        self
    }

    pub fn build(self) -> Result<FormSchema, SchemaError> {
        let s = self.schema;
        let subtype = s.subtype.clone();

        let mut controls = BTreeSet::new();
        let mut wire_keys = BTreeSet::new();
        for f in &s.fields {
            if !controls.insert(f.control_id.clone()) {
                return Err(SchemaError::DuplicateControl(f.control_id.clone(), subtype));
            }
            if f.submitted && !wire_keys.insert(f.wire_key.clone()) {
                return Err(SchemaError::DuplicateWireKey(f.wire_key.clone(), subtype));
            }
            if let FieldKind::Decimal { step } = f.kind {
                if !(step.is_finite() && step > 0.0) {
                    return Err(SchemaError::InvalidStep {
                        subtype,
                        field: f.control_id.clone(),
                    });
                }
            }
        }

        let unknown = |role: &'static str, name: &str| SchemaError::UnknownControl {
            subtype: subtype.clone(),
            role,
            name: name.to_string(),
        };
        let wrong_kind = |field: &str, expected: &'static str| SchemaError::WrongKind {
            subtype: subtype.clone(),
            field: field.to_string(),
            expected,
        };

        if let Some(dp) = &s.date_part {
            let date = s.field(&dp.control_id).ok_or_else(|| unknown("date part", &dp.control_id))?;
            if date.kind != FieldKind::Date {
                return Err(wrong_kind(&dp.control_id, "date"));
            }
            for src in &dp.sources {
                let f = s.field_by_wire_key(src).ok_or_else(|| unknown("date part source", src))?;
                if f.kind != FieldKind::Time {
                    return Err(wrong_kind(&f.control_id, "time"));
                }
            }
        }

        if let Some(lock) = &s.lock_on_edit {
            let f = s.field(&lock.control_id).ok_or_else(|| unknown("edit lock", &lock.control_id))?;
            if !matches!(f.kind, FieldKind::Choice(_)) {
                return Err(wrong_kind(&lock.control_id, "choice"));
            }
        }

        if let Some(pair) = &s.ordered_pair {
            for name in [&pair.start, &pair.end] {
                let f = s.field(name).ok_or_else(|| unknown("ordered pair", name))?;
                if !f.kind.is_temporal() {
                    return Err(wrong_kind(name, "date or time"));
                }
            }
        }

        Ok(s)
    }
}

impl FormSchema {
    pub fn builder(module: &str, subtype: &str, title: &str) -> FormSchemaBuilder {
        FormSchemaBuilder {
            schema: FormSchema {
                module: module.to_string(),
                subtype: subtype.to_string(),
                title: title.to_string(),
                fields: vec![],
                date_part: None,
                lock_on_edit: None,
                ordered_pair: None,
            },
        }
    }

    pub fn field(&self, control_id: &str) -> Option<&FieldDescriptor> {
        self.fields.iter().find(|f| f.control_id == control_id)
    }

    pub fn field_by_wire_key(&self, wire_key: &str) -> Option<&FieldDescriptor> {
        self.fields
            .iter()
            .find(|f| f.submitted && f.wire_key == wire_key)
    }

    /// Keyed by control id; required fields get a leading `Required` rule.
    pub fn validator_map(&self) -> ValidatorMap {
        self.fields
            .iter()
            .map(|f| {
                let v = if f.required {
                    f.validator.clone().ensure_required()
                } else {
                    f.validator.clone()
                };
                (f.control_id.clone(), v)
            })
            .collect()
    }

    pub fn create_legend(&self) -> String {
        format!("New {}", self.title)
    }

    pub fn edit_legend(&self) -> String {
        format!("Edit {}", self.title)
    }
}

fn choices(pairs: &[(&str, &str)]) -> FieldKind {
    FieldKind::Choice(ChoiceOptions::Static(
        pairs.iter().map(|(v, l)| ChoiceOption::new(*v, *l)).collect(),
    ))
}

/// Field tables for every record kind the dashboard shows.
pub(crate) fn builtin_schemas() -> Result<Vec<FormSchema>, SchemaError> {
    let money = || Validator::new().numeric(Some(0.0), None);

    Ok(vec![
        FormSchema::builder("productivity", "tasks", "Task")
            .field(
                FieldDescriptor::new("title", "Title", FieldKind::Text)
                    .required()
                    .validator(Validator::new().max_length(120)),
            )
            .field(
                FieldDescriptor::new("description", "Description", FieldKind::Text)
                    .validator(Validator::new().max_length(1000)),
            )
            .field(FieldDescriptor::new("due_date", "Due", FieldKind::Date))
            .field(FieldDescriptor::new(
                "priority",
                "Priority",
                choices(&[("low", "Low"), ("medium", "Medium"), ("high", "High")]),
            ))
            .field(FieldDescriptor::new("is_done", "Done", FieldKind::Boolean))
            .build()?,
        FormSchema::builder("productivity", "habits", "Habit")
            .field(
                FieldDescriptor::new("name", "Name", FieldKind::Text)
                    .required()
                    .validator(Validator::new().min_length(2).max_length(80)),
            )
            .field(
                FieldDescriptor::new(
                    "frequency",
                    "Frequency",
                    choices(&[("daily", "Daily"), ("weekly", "Weekly"), ("monthly", "Monthly")]),
                )
                .required(),
            )
            .field(
                FieldDescriptor::new("target", "Target", FieldKind::Decimal { step: 1.0 })
                    .validator(Validator::new().numeric(Some(1.0), Some(1000.0))),
            )
            .field(FieldDescriptor::new("is_done", "Done today", FieldKind::Boolean))
            .build()?,
        FormSchema::builder("productivity", "time_entries", "Time entry")
            .field(
                FieldDescriptor::new("description", "Description", FieldKind::Text)
                    .validator(Validator::new().max_length(200)),
            )
            .field(
                FieldDescriptor::new("date", "Date", FieldKind::Date)
                    .required()
                    .client_only(),
            )
            .field(FieldDescriptor::new("started_at", "Start", FieldKind::Time).required())
            .field(FieldDescriptor::new("ended_at", "End", FieldKind::Time))
            .date_part("date", &["started_at", "ended_at"])
            .ordered("started_at", "ended_at")
            .build()?,
        FormSchema::builder("groceries", "products", "Product")
            .field(
                FieldDescriptor::new("name", "Name", FieldKind::Text)
                    .required()
                    .validator(Validator::new().max_length(100)),
            )
            .field(
                FieldDescriptor::new("price", "Price", FieldKind::Decimal { step: 0.01 })
                    .validator(money()),
            )
            .field(
                FieldDescriptor::new("quantity", "In stock", FieldKind::Decimal { step: 1.0 })
                    .validator(Validator::new().numeric(Some(0.0), None)),
            )
            .field(FieldDescriptor::new(
                "category",
                "Category",
                choices(&[
                    ("produce", "Produce"),
                    ("dairy", "Dairy"),
                    ("pantry", "Pantry"),
                    ("frozen", "Frozen"),
                    ("household", "Household"),
                ]),
            ))
            .build()?,
        FormSchema::builder("groceries", "transactions", "Transaction")
            .field(
                FieldDescriptor::new(
                    "product",
                    "Product",
                    FieldKind::Choice(ChoiceOptions::Remote {
                        endpoint: "/groceries/products".to_string(),
                        value_key: "id".to_string(),
                        label_key: "name".to_string(),
                    }),
                )
                .required(),
            )
            .field(
                FieldDescriptor::new("amount", "Amount", FieldKind::Decimal { step: 0.01 })
                    .required()
                    .validator(money()),
            )
            .field(FieldDescriptor::new("occurred_on", "Date", FieldKind::Date).required())
            .field(
                FieldDescriptor::new("note", "Note", FieldKind::Text)
                    .validator(Validator::new().max_length(200)),
            )
            .lock_on_edit("product", "product_name")
            .build()?,
        FormSchema::builder("health", "metrics", "Metric")
            .field(
                FieldDescriptor::new("name", "Name", FieldKind::Text)
                    .required()
                    .validator(
                        Validator::new()
                            .max_length(60)
                            .pattern(r"^[\p{L}\p{N} _\-]+$", "Letters, digits, spaces, - and _ only")
                            .map_err(|e| SchemaError::InvalidPattern {
                                subtype: "metrics".to_string(),
                                field: "name".to_string(),
                                reason: e.to_string(),
                            })?,
                    ),
            )
            .field(
                FieldDescriptor::new("value", "Value", FieldKind::Decimal { step: 0.1 })
                    .required()
                    .validator(Validator::new().numeric(None, None)),
            )
            .field(FieldDescriptor::new("unit", "Unit", FieldKind::Text))
            .field(FieldDescriptor::new("recorded_on", "Date", FieldKind::Date).required())
            .build()?,
    ])
}
