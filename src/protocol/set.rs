use crate::encoding::{Data, EncodingError};
use crate::protocol::command::{check_arity, data_arg, key_arg, Command};
use crate::protocol::resp::Value;
use crate::store::SharedStore;

/// SET command: SET key json-value
///
/// Replies `:1` when stored and `:0` when a quota refused the write.
#[derive(Debug, Clone, PartialEq)]
pub struct SetCmd {
    pub key: String,
    pub value: Data,
}

impl SetCmd {
    pub fn new(key: impl Into<String>, value: Data) -> Self {
        Self {
            key: key.into(),
            value,
        }
    }

    /// Parse SET command from RESP array items
    pub fn parse(items: &[Value]) -> Command {
        let parsed = check_arity(items, 3, "set").and_then(|_| {
            let key = key_arg(&items[1])?;
            let value = data_arg(&items[2])?;
            Ok(SetCmd::new(key, value))
        });
        match parsed {
            Ok(cmd) => Command::Set(cmd),
            Err(unknown) => unknown,
        }
    }

    pub fn to_resp(&self) -> Result<Value, EncodingError> {
        Ok(Value::command([
            b"SET".to_vec(),
            self.key.clone().into_bytes(),
            self.value.encode()?,
        ]))
    }

    /// Execute the SET command
    pub fn execute(&self, store: &SharedStore) -> Value {
        Value::flag(store.update(self.key.clone(), self.value.clone()))
    }
}
