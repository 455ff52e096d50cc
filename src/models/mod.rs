use serde::{Deserialize, Serialize};

/// Identity of one server-side record, as carried by a row's data attributes.
///
/// Only lives for the duration of a single user action; nothing keeps one
/// around after its row is gone.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, Hash)]
pub(crate) struct RecordRef {
    pub module: String,

    /// Selects the endpoint segment and the UI configuration (fields, menu).
    pub subtype: String,

    /// Opaque server id. Kept as a string so large integers survive.
    #[serde(rename = "itemId")]
    pub item_id: String,
}

impl RecordRef {
    pub fn new(module: impl Into<String>, subtype: impl Into<String>, item_id: impl Into<String>) -> Self {
        Self {
            module: module.into(),
            subtype: subtype.into(),
            item_id: item_id.into(),
        }
    }

    /// `/{module}/{subtype}/{itemId}`: GET, PATCH and DELETE target.
    pub fn item_endpoint(&self) -> String {
        format!(
            "{}/{}",
            collection_endpoint(&self.module, &self.subtype),
            urlencoding::encode(&self.item_id)
        )
    }

    pub fn collection_endpoint(&self) -> String {
        collection_endpoint(&self.module, &self.subtype)
    }
}

/// `/{module}/{subtype}`: POST target for creates and GET target for listings.
pub(crate) fn collection_endpoint(module: &str, subtype: &str) -> String {
    format!(
        "/{}/{}",
        urlencoding::encode(module),
        urlencoding::encode(subtype)
    )
}

/// Uniform response shape of every endpoint.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub(crate) struct Envelope {
    pub success: bool,

    #[serde(default)]
    pub message: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub errors: Option<serde_json::Value>,
}

impl Envelope {
    /// `data` as an object, which is what item endpoints return.
    pub fn record(&self) -> Option<&serde_json::Map<String, serde_json::Value>> {
        self.data.as_ref().and_then(|d| d.as_object())
    }

    /// `data` as a list, accepting `{"results": [...]}` from paginated collections.
    pub fn records(&self) -> Vec<serde_json::Map<String, serde_json::Value>> {
        let list = match &self.data {
            Some(serde_json::Value::Array(items)) => items.clone(),
            Some(serde_json::Value::Object(obj)) => obj
                .get("results")
                .and_then(|v| v.as_array())
                .cloned()
                .unwrap_or_default(),
            _ => vec![],
        };

        list.into_iter()
            .filter_map(|v| match v {
                serde_json::Value::Object(m) => Some(m),
                _ => None,
            })
            .collect()
    }
}

/// Server ids come back as numbers or strings; rows always hold strings.
pub(crate) fn id_string(v: &serde_json::Value) -> Option<String> {
    match v {
        serde_json::Value::String(s) if !s.trim().is_empty() => Some(s.clone()),
        serde_json::Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn item_endpoint_is_collection_plus_id() {
        let r = RecordRef::new("productivity", "tasks", "9007199254740993");
        assert_eq!(r.collection_endpoint(), "/productivity/tasks");
        assert_eq!(r.item_endpoint(), "/productivity/tasks/9007199254740993");
    }

    #[test]
    fn endpoint_segments_are_encoded() {
        let r = RecordRef::new("groceries", "products", "a/b c");
        assert_eq!(r.item_endpoint(), "/groceries/products/a%2Fb%20c");
    }

    #[test]
    fn envelope_contract_deserialize() {
        let json = r#"{"success": false, "message": "Nope", "errors": {"name": ["required"]}}"#;
        let env: Envelope = serde_json::from_str(json).expect("envelope should parse");
        assert!(!env.success);
        assert_eq!(env.message, "Nope");
        assert!(env.data.is_none());
        assert!(env.errors.is_some());
    }

    #[test]
    fn envelope_records_accepts_list_or_results() {
        let a: Envelope = serde_json::from_str(r#"{"success": true, "message": "", "data": [{"id": 1}, 3]}"#)
            .expect("parse");
        assert_eq!(a.records().len(), 1);

        let b: Envelope =
            serde_json::from_str(r#"{"success": true, "message": "", "data": {"results": [{"id": 1}, {"id": 2}]}}"#)
                .expect("parse");
        assert_eq!(b.records().len(), 2);
    }

    #[test]
    fn record_ref_uses_item_id_attribute_name() {
        let r = RecordRef::new("health", "metrics", "4");
        let v = serde_json::to_value(&r).expect("serialize");
        assert_eq!(v["itemId"], "4");
    }

    #[test]
    fn id_string_accepts_numbers_and_strings() {
        assert_eq!(id_string(&serde_json::json!(12)), Some("12".to_string()));
        assert_eq!(id_string(&serde_json::json!("ab")), Some("ab".to_string()));
        assert_eq!(id_string(&serde_json::json!("")), None);
        assert_eq!(id_string(&serde_json::json!(null)), None);
    }
}
