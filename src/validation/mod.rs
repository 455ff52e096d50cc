mod debounce;
mod rules;

pub(crate) use debounce::{BrowserTimer, Debouncer, TimerHandle};
pub(crate) use rules::Validator;

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime};
use std::cmp::Ordering;
use std::collections::BTreeMap;

/// Field name -> validator. Built once per form and shared by live and submit checks.
pub(crate) type ValidatorMap = BTreeMap<String, Validator>;

pub(crate) const ORDERING_MESSAGE: &str = "Start must be before end";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum ErrorSource {
    Field,
    Ordering,
}

/// What a control renders: message text, whether it shows, and the `invalid` marker.
#[derive(Clone, Debug, Default, PartialEq)]
pub(crate) struct FieldFeedback {
    pub message: String,
    pub visible: bool,
    pub invalid: bool,
    source: Option<ErrorSource>,
}

impl FieldFeedback {
    fn error(message: String, source: ErrorSource) -> Self {
        Self {
            message,
            visible: true,
            invalid: true,
            source: Some(source),
        }
    }
}

/// Two fields that must hold strictly increasing instants.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct OrderedPair {
    pub start: String,
    pub end: String,
}

impl OrderedPair {
    pub fn new(start: impl Into<String>, end: impl Into<String>) -> Self {
        Self {
            start: start.into(),
            end: end.into(),
        }
    }

    fn contains(&self, field: &str) -> bool {
        self.start == field || self.end == field
    }

    fn partner(&self, field: &str) -> Option<&str> {
        if self.start == field {
            Some(&self.end)
        } else if self.end == field {
            Some(&self.start)
        } else {
            None
        }
    }
}

/// Result of a raw input event; the caller owns the timers.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum InputAction {
    /// Field went blank: feedback cleared, pending timer must be cancelled.
    Cleared,
    /// (Re)start the field's debounce window, then `commit`.
    Debounce,
}

/// Control facts the submit pass needs.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub(crate) struct FieldState {
    pub required: bool,
    pub disabled: bool,
}

/// Committed values. Only `FormValidation::commit` writes here, and every
/// write re-validates.
#[derive(Clone, Debug, Default)]
struct ChangeTracker {
    values: BTreeMap<String, String>,
}

#[derive(Clone, Debug, Default)]
pub(crate) struct FormValidation {
    validators: ValidatorMap,
    pair: Option<OrderedPair>,
    tracker: ChangeTracker,
    feedback: BTreeMap<String, FieldFeedback>,
}

impl FormValidation {
    pub fn new(validators: ValidatorMap, pair: Option<OrderedPair>) -> Self {
        Self {
            validators,
            pair,
            ..Default::default()
        }
    }

    pub fn on_input(&mut self, field: &str, value: &str) -> InputAction {
        if value.trim().is_empty() {
            self.tracker.values.remove(field);
            self.feedback.remove(field);
            // The pair is no longer comparable, so the partner's ordering error goes too.
            if let Some(partner) = self.pair.as_ref().and_then(|p| p.partner(field)) {
                let stale = self
                    .feedback
                    .get(partner)
                    .is_some_and(|f| f.source == Some(ErrorSource::Ordering));
                if stale {
                    let partner = partner.to_string();
                    self.feedback.remove(&partner);
                }
            }
            InputAction::Cleared
        } else {
            InputAction::Debounce
        }
    }

    /// Debounce fired: store the value and render feedback for it.
    pub fn commit(&mut self, field: &str, value: &str) {
        self.tracker
            .values
            .insert(field.to_string(), value.to_string());

        match self.validators.get(field).and_then(|v| v.validate(value)) {
            Some(msg) => {
                self.feedback
                    .insert(field.to_string(), FieldFeedback::error(msg, ErrorSource::Field));
            }
            None => {
                self.feedback.remove(field);
            }
        }

        if self.pair.as_ref().is_some_and(|p| p.contains(field)) {
            self.check_pair();
        }
    }

    /// Records a value loaded from the server without rendering feedback for it,
    /// so later edits to the partner field are compared against it.
    pub fn seed(&mut self, field: &str, value: &str) {
        if value.trim().is_empty() {
            self.tracker.values.remove(field);
        } else {
            self.tracker
                .values
                .insert(field.to_string(), value.to_string());
        }
    }

    #[cfg(test)]
    pub fn committed(&self, field: &str) -> Option<&str> {
        self.tracker.values.get(field).map(|s| s.as_str())
    }

    fn check_pair(&mut self) {
        let Some(pair) = self.pair.clone() else {
            return;
        };
        let (Some(start), Some(end)) = (
            self.tracker.values.get(&pair.start).cloned(),
            self.tracker.values.get(&pair.end).cloned(),
        ) else {
            return;
        };
        self.apply_ordering(&pair, &start, &end);
    }

    /// Returns true when the pair is in order.
    fn apply_ordering(&mut self, pair: &OrderedPair, start: &str, end: &str) -> bool {
        let ordered = is_strictly_before(start, end);

        for field in [&pair.start, &pair.end] {
            let current = self.feedback.get(field.as_str());
            let field_error = current.is_some_and(|f| f.source == Some(ErrorSource::Field));

            if ordered {
                if current.is_some_and(|f| f.source == Some(ErrorSource::Ordering)) {
                    self.feedback.remove(field.as_str());
                }
            } else if !field_error {
                self.feedback.insert(
                    field.clone(),
                    FieldFeedback::error(ORDERING_MESSAGE.to_string(), ErrorSource::Ordering),
                );
            }
        }

        ordered
    }

    /// Full pass before sending. Every applicable error is rendered at once.
    ///
    /// Disabled fields, and optional fields left blank, are skipped.
    pub fn validate_for_submit(
        &mut self,
        values: &BTreeMap<String, String>,
        state: impl Fn(&str) -> FieldState,
    ) -> Result<(), Vec<(String, String)>> {
        let mut errors: Vec<(String, String)> = vec![];

        let fields: Vec<String> = self.validators.keys().cloned().collect();
        for field in fields {
            let st = state(&field);
            let value = values.get(&field).map(|s| s.as_str()).unwrap_or("");
            let required = st.required || self.validators.get(&field).is_some_and(|v| v.is_required());

            if st.disabled || (!required && value.trim().is_empty()) {
                self.feedback.remove(&field);
                continue;
            }

            match self.validators.get(&field).and_then(|v| v.validate(value)) {
                Some(msg) => {
                    self.feedback
                        .insert(field.clone(), FieldFeedback::error(msg.clone(), ErrorSource::Field));
                    errors.push((field, msg));
                }
                None => {
                    self.feedback.remove(&field);
                }
            }
        }

        if let Some(pair) = self.pair.clone() {
            let start = values.get(&pair.start).map(|s| s.trim()).unwrap_or("");
            let end = values.get(&pair.end).map(|s| s.trim()).unwrap_or("");
            if !start.is_empty() && !end.is_empty() && !self.apply_ordering(&pair, start, end) {
                for field in [&pair.start, &pair.end] {
                    if !errors.iter().any(|(f, _)| f == field) {
                        errors.push((field.clone(), ORDERING_MESSAGE.to_string()));
                    }
                }
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    pub fn feedback(&self, field: &str) -> FieldFeedback {
        self.feedback.get(field).cloned().unwrap_or_default()
    }

    #[cfg(test)]
    pub fn has_errors(&self) -> bool {
        self.feedback.values().any(|f| f.invalid)
    }

    pub fn reset(&mut self) {
        self.tracker = ChangeTracker::default();
        self.feedback.clear();
    }
}

enum Instant {
    DateTime(NaiveDateTime),
    Date(NaiveDate),
    Time(NaiveTime),
}

fn parse_instant(s: &str) -> Option<Instant> {
    let s = s.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(Instant::DateTime(dt.naive_utc()));
    }
    for fmt in ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%dT%H:%M", "%Y-%m-%d %H:%M:%S", "%Y-%m-%d %H:%M"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(Instant::DateTime(dt));
        }
    }
    if let Ok(d) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        return Some(Instant::Date(d));
    }
    for fmt in ["%H:%M:%S", "%H:%M"] {
        if let Ok(t) = NaiveTime::parse_from_str(s, fmt) {
            return Some(Instant::Time(t));
        }
    }
    None
}

/// Compares as times/dates when both sides parse the same way, lexically otherwise.
pub(crate) fn is_strictly_before(start: &str, end: &str) -> bool {
    let ord = match (parse_instant(start), parse_instant(end)) {
        (Some(Instant::DateTime(a)), Some(Instant::DateTime(b))) => a.cmp(&b),
        (Some(Instant::Date(a)), Some(Instant::Date(b))) => a.cmp(&b),
        (Some(Instant::Time(a)), Some(Instant::Time(b))) => a.cmp(&b),
        _ => start.trim().cmp(end.trim()),
    };
    ord == Ordering::Less
}

#[cfg(test)]
mod tests {
    use super::*;

    fn time_entry_validation() -> FormValidation {
        let mut validators = ValidatorMap::new();
        validators.insert("description".to_string(), Validator::new().max_length(10));
        validators.insert("started_at".to_string(), Validator::new().required());
        validators.insert("ended_at".to_string(), Validator::new().required());
        validators.insert("note".to_string(), Validator::new().min_length(3));
        FormValidation::new(validators, Some(OrderedPair::new("started_at", "ended_at")))
    }

    fn values(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn empty_input_clears_instead_of_erroring() {
        let mut fv = time_entry_validation();
        fv.commit("description", "far too long text");
        assert!(fv.feedback("description").visible);

        assert_eq!(fv.on_input("description", ""), InputAction::Cleared);
        assert_eq!(fv.feedback("description"), FieldFeedback::default());
        assert_eq!(fv.on_input("description", "x"), InputAction::Debounce);
    }

    #[test]
    fn commit_renders_validator_result() {
        let mut fv = time_entry_validation();
        fv.commit("description", "far too long text");
        let fb = fv.feedback("description");
        assert!(fb.visible && fb.invalid);
        assert!(fb.message.contains("most"));

        fv.commit("description", "short");
        assert!(!fv.feedback("description").invalid);
        assert_eq!(fv.committed("description"), Some("short"));
    }

    #[test]
    fn ordering_error_on_both_fields_then_cleared() {
        let mut fv = time_entry_validation();
        fv.commit("started_at", "10:00");
        assert!(!fv.feedback("started_at").invalid, "pair waits for both values");

        fv.commit("ended_at", "09:00");
        assert_eq!(fv.feedback("started_at").message, ORDERING_MESSAGE);
        assert_eq!(fv.feedback("ended_at").message, ORDERING_MESSAGE);

        fv.commit("started_at", "09:00");
        fv.commit("ended_at", "10:00");
        assert!(!fv.feedback("started_at").visible);
        assert!(!fv.feedback("ended_at").visible);
    }

    #[test]
    fn clearing_one_end_drops_the_partners_ordering_error() {
        let mut fv = time_entry_validation();
        fv.commit("started_at", "10:00");
        fv.commit("ended_at", "09:00");
        assert!(fv.feedback("started_at").invalid);

        assert_eq!(fv.on_input("ended_at", ""), InputAction::Cleared);
        assert_eq!(fv.feedback("started_at"), FieldFeedback::default());
        assert_eq!(fv.feedback("ended_at"), FieldFeedback::default());
    }

    #[test]
    fn clearing_one_end_keeps_the_partners_field_error() {
        let mut validators = ValidatorMap::new();
        validators.insert(
            "started_at".to_string(),
            Validator::new().pattern(r"^\d{2}:\d{2}$", "Use HH:MM").expect("regex"),
        );
        let mut fv = FormValidation::new(validators, Some(OrderedPair::new("started_at", "ended_at")));

        fv.commit("started_at", "9am");
        fv.commit("ended_at", "08:00");
        fv.on_input("ended_at", "");
        assert_eq!(fv.feedback("started_at").message, "Use HH:MM");
    }

    #[test]
    fn seeded_value_is_compared_without_feedback() {
        let mut fv = time_entry_validation();
        fv.seed("started_at", "09:00");
        fv.seed("ended_at", "10:15");
        assert!(!fv.has_errors());

        fv.commit("ended_at", "08:00");
        assert_eq!(fv.feedback("ended_at").message, ORDERING_MESSAGE);
        assert_eq!(fv.feedback("started_at").message, ORDERING_MESSAGE);
    }

    #[test]
    fn equal_instants_are_not_ordered() {
        let mut fv = time_entry_validation();
        fv.commit("started_at", "09:00");
        fv.commit("ended_at", "09:00");
        assert!(fv.feedback("ended_at").invalid);
    }

    #[test]
    fn clearing_ordering_keeps_field_errors() {
        let mut validators = ValidatorMap::new();
        validators.insert(
            "ended_at".to_string(),
            Validator::new().pattern(r"^\d{2}:\d{2}$", "Use HH:MM").expect("regex"),
        );
        let mut fv = FormValidation::new(validators, Some(OrderedPair::new("started_at", "ended_at")));

        fv.commit("started_at", "08:00");
        fv.commit("ended_at", "09:00:30");
        assert_eq!(fv.feedback("ended_at").message, "Use HH:MM");
        assert!(!fv.feedback("started_at").invalid);
    }

    #[test]
    fn submit_shows_all_errors_and_skips_optional_blank_and_disabled() {
        let mut fv = time_entry_validation();
        let vals = values(&[("description", "way too long"), ("started_at", ""), ("note", "")]);

        let errs = fv
            .validate_for_submit(&vals, |f| FieldState {
                required: false,
                disabled: f == "ended_at",
            })
            .expect_err("rejected");

        let fields: Vec<&str> = errs.iter().map(|(f, _)| f.as_str()).collect();
        assert_eq!(fields, vec!["description", "started_at"]);
        assert!(fv.feedback("description").visible);
        assert!(fv.feedback("started_at").visible);
        assert!(!fv.feedback("note").visible);
        assert!(!fv.feedback("ended_at").visible);
    }

    #[test]
    fn submit_evaluates_untouched_required_fields() {
        let mut fv = time_entry_validation();
        let errs = fv
            .validate_for_submit(&values(&[("started_at", "09:00")]), |f| FieldState {
                required: f == "ended_at",
                disabled: false,
            })
            .expect_err("ended_at missing");
        assert_eq!(errs, vec![("ended_at".to_string(), "This field is required".to_string())]);
    }

    #[test]
    fn submit_enforces_ordering() {
        let mut fv = time_entry_validation();
        let errs = fv
            .validate_for_submit(&values(&[("started_at", "11:00"), ("ended_at", "10:30")]), |_| {
                FieldState::default()
            })
            .expect_err("out of order");
        assert_eq!(errs.len(), 2);
        assert!(fv.has_errors());

        assert!(fv
            .validate_for_submit(&values(&[("started_at", "10:00"), ("ended_at", "10:30")]), |_| {
                FieldState::default()
            })
            .is_ok());
        assert!(!fv.has_errors());
    }

    #[test]
    fn ordering_parses_dates_and_datetimes() {
        assert!(is_strictly_before("2024-01-09", "2024-01-10"));
        assert!(is_strictly_before("2024-01-10T09:00", "2024-01-10T10:00"));
        assert!(is_strictly_before("09:00", "10:00"));
        assert!(!is_strictly_before("2024-01-10T10:00:00+02:00", "2024-01-10T07:59:00Z"));
    }

    #[test]
    fn reset_forgets_values_and_feedback() {
        let mut fv = time_entry_validation();
        fv.commit("started_at", "10:00");
        fv.commit("ended_at", "09:00");
        fv.reset();
        assert!(!fv.has_errors());
        assert_eq!(fv.committed("started_at"), None);
    }
}
