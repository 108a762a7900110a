//! Activity log (append-only audit trail)

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

/// Actor name used for scheduled and automatic entries
pub const SYSTEM_ACTOR: &str = "system";

/// Audit entry from database
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct ActivityEntry {
    pub id: Uuid,
    pub actor: String,
    pub action: String,
    #[schema(value_type = Option<Object>)]
    pub details: Option<serde_json::Value>,
    pub entity_type: Option<String>,
    pub entity_id: Option<String>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Request metadata captured alongside privileged actions
#[derive(Debug, Clone, Default)]
pub struct RequestMeta {
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

/// Entry to append
#[derive(Debug, Clone)]
pub struct NewActivity {
    pub actor: String,
    pub action: String,
    pub details: serde_json::Value,
    pub entity_type: Option<&'static str>,
    pub entity_id: Option<String>,
    pub meta: RequestMeta,
}

impl NewActivity {
    pub fn new(actor: impl Into<String>, action: impl Into<String>, details: serde_json::Value) -> Self {
        Self {
            actor: actor.into(),
            action: action.into(),
            details,
            entity_type: None,
            entity_id: None,
            meta: RequestMeta::default(),
        }
    }

    pub fn entity(mut self, entity_type: &'static str, entity_id: impl ToString) -> Self {
        self.entity_type = Some(entity_type);
        self.entity_id = Some(entity_id.to_string());
        self
    }

    pub fn meta(mut self, meta: &RequestMeta) -> Self {
        self.meta = meta.clone();
        self
    }
}

/// Activity listing filter
#[derive(Debug, Default, Deserialize, IntoParams, ToSchema)]
#[into_params(parameter_in = Query)]
pub struct ActivityQuery {
    pub action: Option<String>,
    pub entity_type: Option<String>,
    pub actor: Option<String>,
    pub page: Option<i64>,
    pub per_page: Option<i64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_sets_entity_and_meta() {
        let id = Uuid::new_v4();
        let meta = RequestMeta {
            ip_address: Some("10.0.0.1".to_string()),
            user_agent: None,
        };
        let entry = NewActivity::new("admin", "loan_renewed", serde_json::json!({}))
            .entity("loan", id)
            .meta(&meta);

        assert_eq!(entry.entity_type, Some("loan"));
        assert_eq!(entry.entity_id, Some(id.to_string()));
        assert_eq!(entry.meta.ip_address.as_deref(), Some("10.0.0.1"));
    }
}
