//! Customer records as the inbox sees them.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::de;

/// A roster row: the summary shown for each customer in the inbox.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CustomerSummary {
    #[serde(deserialize_with = "de::string_or_number")]
    pub id: String,

    #[serde(default, alias = "name")]
    pub display_name: String,

    #[serde(default)]
    pub phone: String,

    #[serde(default)]
    pub last_message_preview: String,

    /// Milliseconds since epoch.
    #[serde(default)]
    pub last_message_timestamp: u64,

    #[serde(default)]
    pub unread_count: u32,

    #[serde(default)]
    pub photo_url: Option<String>,

    #[serde(default, deserialize_with = "de::opt_string_or_number")]
    pub stage_id: Option<String>,

    #[serde(default)]
    pub status: String,
}

impl CustomerSummary {
    /// Minimal summary for a customer id, mostly useful in tests.
    pub fn new(id: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            display_name: display_name.into(),
            phone: String::new(),
            last_message_preview: String::new(),
            last_message_timestamp: 0,
            unread_count: 0,
            photo_url: None,
            stage_id: None,
            status: String::new(),
        }
    }
}

/// Full customer record shown in the side panel of an open conversation.
///
/// Cached independently of [`CustomerSummary`]; the two are never merged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CustomerDetail {
    #[serde(flatten)]
    pub summary: CustomerSummary,

    #[serde(default)]
    pub email: Option<String>,

    #[serde(default)]
    pub notes: Option<String>,

    #[serde(default)]
    pub custom_fields: BTreeMap<String, serde_json::Value>,

    /// Channel-specific identifiers, keyed by channel name.
    #[serde(default)]
    pub channel_ids: BTreeMap<String, String>,
}

impl CustomerDetail {
    pub fn id(&self) -> &str {
        &self.summary.id
    }
}

/// A partial summary carried by `customer_update` events. Absent fields are
/// left untouched when merged.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CustomerUpdate {
    #[serde(deserialize_with = "de::string_or_number")]
    pub id: String,

    #[serde(default, alias = "name", skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_message_preview: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_message_timestamp: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unread_count: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub photo_url: Option<String>,

    #[serde(
        default,
        deserialize_with = "de::opt_string_or_number",
        skip_serializing_if = "Option::is_none"
    )]
    pub stage_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
}

impl CustomerUpdate {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Default::default()
        }
    }

    /// Shallow-merge the present fields into `target`.
    pub fn apply_to(&self, target: &mut CustomerSummary) {
        if let Some(ref v) = self.display_name {
            target.display_name = v.clone();
        }
        if let Some(ref v) = self.phone {
            target.phone = v.clone();
        }
        if let Some(ref v) = self.last_message_preview {
            target.last_message_preview = v.clone();
        }
        if let Some(v) = self.last_message_timestamp {
            target.last_message_timestamp = v;
        }
        if let Some(v) = self.unread_count {
            target.unread_count = v;
        }
        if let Some(ref v) = self.photo_url {
            target.photo_url = Some(v.clone());
        }
        if let Some(ref v) = self.stage_id {
            target.stage_id = Some(v.clone());
        }
        if let Some(ref v) = self.status {
            target.status = v.clone();
        }
    }
}

/// Editable fields sent with a PATCH.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CustomerPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub stage_id: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub custom_fields: Option<BTreeMap<String, serde_json::Value>>,
}

impl CustomerPatch {
    pub fn is_empty(&self) -> bool {
        *self == CustomerPatch::default()
    }

    /// The roster-visible part of this patch.
    pub fn summary_update(&self, customer_id: impl Into<String>) -> CustomerUpdate {
        CustomerUpdate {
            id: customer_id.into(),
            display_name: self.display_name.clone(),
            phone: self.phone.clone(),
            stage_id: self.stage_id.clone(),
            status: self.status.clone(),
            ..Default::default()
        }
    }
}

/// A sales pipeline stage customers can be placed in.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stage {
    #[serde(deserialize_with = "de::string_or_number")]
    pub id: String,

    #[serde(default)]
    pub name: String,

    #[serde(default)]
    pub position: i32,

    #[serde(default)]
    pub color: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_update_merges_only_present_fields() {
        let mut summary = CustomerSummary::new("c1", "Ana");
        summary.phone = "+5511999".to_string();
        summary.unread_count = 4;

        let update = CustomerUpdate {
            display_name: Some("Ana Souza".to_string()),
            stage_id: Some("lead".to_string()),
            ..CustomerUpdate::new("c1")
        };
        update.apply_to(&mut summary);

        assert_eq!(summary.display_name, "Ana Souza");
        assert_eq!(summary.stage_id.as_deref(), Some("lead"));
        assert_eq!(summary.phone, "+5511999");
        assert_eq!(summary.unread_count, 4);
    }

    #[test]
    fn test_detail_flattens_summary() {
        let detail: CustomerDetail = serde_json::from_str(
            r#"{"id": 7, "display_name": "Bo", "email": "bo@example.com",
                "custom_fields": {"plan": "pro"}, "channel_ids": {"whatsapp": "5511"}}"#,
        )
        .unwrap();
        assert_eq!(detail.id(), "7");
        assert_eq!(detail.summary.display_name, "Bo");
        assert_eq!(detail.email.as_deref(), Some("bo@example.com"));
        assert_eq!(detail.custom_fields["plan"], "pro");
        assert_eq!(detail.channel_ids["whatsapp"], "5511");
    }

    #[test]
    fn test_patch_serializes_only_set_fields() {
        let patch = CustomerPatch {
            notes: Some("vip".to_string()),
            ..Default::default()
        };
        assert_eq!(serde_json::to_string(&patch).unwrap(), r#"{"notes":"vip"}"#);
        assert!(!patch.is_empty());
        assert!(CustomerPatch::default().is_empty());

        let update = patch.summary_update("c9");
        assert_eq!(update, CustomerUpdate::new("c9"));
    }
}
