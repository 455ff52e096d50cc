mod lifecycle;
mod schema;

pub(crate) use lifecycle::{ControlState, ModalForm, ModalPhase, ModalSession, SubmitRequest};
pub(crate) use schema::{
    builtin_schemas, ChoiceOption, ChoiceOptions, FieldDescriptor, FieldKind, FormSchema, SchemaError,
};

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime, Offset, TimeZone};
use serde_json::Value;

/// What a control receives when a record is loaded into it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) enum ControlInput {
    Checked(bool),
    Value(String),
}

/// Browser's current UTC offset.
pub(crate) fn local_offset() -> FixedOffset {
    chrono::Local::now().offset().fix()
}

fn stringify(v: &Value) -> String {
    match v {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn parse_wire_instant(s: &str, offset: &FixedOffset) -> Option<NaiveDateTime> {
    let s = s.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(offset).naive_local());
    }
    // Some endpoints drop the `T`.
    if let Ok(dt) = DateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%:z") {
        return Some(dt.with_timezone(offset).naive_local());
    }
    None
}

fn is_unit_step(step: f64) -> bool {
    (step - 1.0).abs() < f64::EPSILON
}

fn as_number(v: &Value) -> Option<f64> {
    match v {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
}

/// Wire value -> control value, by control kind. Instants are shown in `offset`.
pub(crate) fn wire_to_control(kind: &FieldKind, v: &Value, offset: &FixedOffset) -> ControlInput {
    match kind {
        FieldKind::Boolean => ControlInput::Checked(v.as_bool().unwrap_or(false)),
        FieldKind::Date => {
            let s = stringify(v);
            let out = parse_wire_instant(&s, offset)
                .map(|dt| dt.date())
                .or_else(|| NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d").ok())
                .map(|d| d.format("%Y-%m-%d").to_string())
                .unwrap_or(s);
            ControlInput::Value(out)
        }
        FieldKind::Time => {
            let s = stringify(v);
            let out = parse_wire_instant(&s, offset)
                .map(|dt| dt.time())
                .or_else(|| NaiveTime::parse_from_str(s.trim(), "%H:%M:%S").ok())
                .or_else(|| NaiveTime::parse_from_str(s.trim(), "%H:%M").ok())
                .map(|t| t.format("%H:%M").to_string())
                .unwrap_or(s);
            ControlInput::Value(out)
        }
        FieldKind::Choice(_) => ControlInput::Value(stringify(v).to_lowercase()),
        FieldKind::Decimal { step } => match as_number(v) {
            Some(n) if is_unit_step(*step) => ControlInput::Value(format!("{}", n.round() as i64)),
            Some(n) => ControlInput::Value(format!("{n:.2}")),
            None => ControlInput::Value(stringify(v)),
        },
        FieldKind::Text => ControlInput::Value(stringify(v)),
    }
}

/// Local calendar date of a wire instant (the derived date control).
pub(crate) fn wire_to_local_date(v: &Value, offset: &FixedOffset) -> Option<String> {
    parse_wire_instant(&stringify(v), offset).map(|dt| dt.date().format("%Y-%m-%d").to_string())
}

/// Control value -> wire value, by control kind.
pub(crate) fn control_to_wire(kind: &FieldKind, state: &ControlState) -> Value {
    let raw = state.value.trim();
    match kind {
        FieldKind::Boolean => Value::Bool(state.checked),
        FieldKind::Text => Value::String(state.value.clone()),
        _ if raw.is_empty() => Value::Null,
        FieldKind::Decimal { step } => match raw.parse::<f64>() {
            Ok(n) if is_unit_step(*step) && n.fract() == 0.0 => Value::from(n as i64),
            Ok(n) => serde_json::Number::from_f64(n)
                .map(Value::Number)
                .unwrap_or_else(|| Value::String(raw.to_string())),
            Err(_) => Value::String(raw.to_string()),
        },
        FieldKind::Date | FieldKind::Time | FieldKind::Choice(_) => Value::String(raw.to_string()),
    }
}

/// Local `date` + `HH:MM` -> RFC 3339 instant at `offset`.
pub(crate) fn combine_local(date: &str, time: &str, offset: &FixedOffset) -> Option<String> {
    let d = NaiveDate::parse_from_str(date.trim(), "%Y-%m-%d").ok()?;
    let t = NaiveTime::parse_from_str(time.trim(), "%H:%M")
        .or_else(|_| NaiveTime::parse_from_str(time.trim(), "%H:%M:%S"))
        .ok()?;
    offset
        .from_local_datetime(&d.and_time(t))
        .single()
        .map(|dt| dt.to_rfc3339())
}
