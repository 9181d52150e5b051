use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Account record from `condenser_api.get_accounts`. Only the name is modelled.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Account {
    pub name: String,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl Account {
    pub fn field(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }
}
