use tracing::error;

use crate::protocol::command::{check_arity, key_arg, Command};
use crate::protocol::resp::Value;
use crate::store::SharedStore;

/// GET command: GET key
#[derive(Debug, Clone, PartialEq)]
pub struct GetCmd {
    pub key: String,
}

impl GetCmd {
    /// Create a new GET command
    pub fn new(key: impl Into<String>) -> Self {
        Self { key: key.into() }
    }

    /// Parse GET command from RESP array items
    pub fn parse(items: &[Value]) -> Command {
        let parsed = check_arity(items, 2, "get").and_then(|_| key_arg(&items[1]));
        match parsed {
            Ok(key) => Command::Get(GetCmd::new(key)),
            Err(unknown) => unknown,
        }
    }

    pub fn to_resp(&self) -> Value {
        Value::command([b"GET".to_vec(), self.key.clone().into_bytes()])
    }

    /// Execute the GET command
    pub fn execute(&self, store: &SharedStore) -> Value {
        match store.get(&self.key) {
            Some(value) => match value.encode() {
                Ok(bytes) => Value::bulk(bytes),
                Err(e) => {
                    error!("Failed to encode value of '{}': {}", self.key, e);
                    Value::error(format!("ERR {}", e))
                }
            },
            // Null bulk string for key not found
            None => Value::null(),
        }
    }
}
