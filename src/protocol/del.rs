use crate::protocol::command::{check_arity, key_arg, Command};
use crate::protocol::resp::Value;
use crate::store::SharedStore;

/// DEL command: DEL key
#[derive(Debug, Clone, PartialEq)]
pub struct DelCmd {
    pub key: String,
}

impl DelCmd {
    pub fn new(key: impl Into<String>) -> Self {
        Self { key: key.into() }
    }

    pub fn parse(items: &[Value]) -> Command {
        match check_arity(items, 2, "del").and_then(|_| key_arg(&items[1])) {
            Ok(key) => Command::Del(DelCmd::new(key)),
            Err(unknown) => unknown,
        }
    }

    pub fn to_resp(&self) -> Value {
        Value::command([b"DEL".to_vec(), self.key.clone().into_bytes()])
    }

    /// `:1` if the key existed
    pub fn execute(&self, store: &SharedStore) -> Value {
        Value::flag(store.delete(&self.key))
    }
}
