use crate::encoding::{Data, EncodingError};
use crate::protocol::command::{check_arity, data_arg, key_arg, Command};
use crate::protocol::resp::Value;
use crate::store::SharedStore;

/// CLEARIF command: CLEARIF key expected-json
///
/// Deletes the key only while it still holds `expected`.
#[derive(Debug, Clone, PartialEq)]
pub struct ClearIfCmd {
    pub key: String,
    pub expected: Data,
}

impl ClearIfCmd {
    pub fn new(key: impl Into<String>, expected: Data) -> Self {
        Self {
            key: key.into(),
            expected,
        }
    }

    pub fn parse(items: &[Value]) -> Command {
        let parsed = check_arity(items, 3, "clearif").and_then(|_| {
            Ok(ClearIfCmd::new(key_arg(&items[1])?, data_arg(&items[2])?))
        });
        match parsed {
            Ok(cmd) => Command::ClearIf(cmd),
            Err(unknown) => unknown,
        }
    }

    pub fn to_resp(&self) -> Result<Value, EncodingError> {
        Ok(Value::command([
            b"CLEARIF".to_vec(),
            self.key.clone().into_bytes(),
            self.expected.encode()?,
        ]))
    }

    pub fn execute(&self, store: &SharedStore) -> Value {
        Value::flag(store.compare_and_delete(&self.key, &self.expected))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clearif_only_clears_matching_value() {
        let store = SharedStore::new();
        store.update("recording_command", Data::Bool(false));

        let stale = ClearIfCmd::new("recording_command", Data::Bool(true));
        assert_eq!(stale.execute(&store), Value::flag(false));
        assert_eq!(store.get("recording_command"), Some(Data::Bool(false)));

        let current = ClearIfCmd::new("recording_command", Data::Bool(false));
        assert_eq!(current.execute(&store), Value::flag(true));
        assert_eq!(store.get("recording_command"), None);
    }

    #[test]
    fn test_clearif_wrong_args() {
        let items = vec![Value::bulk("CLEARIF"), Value::bulk("k")];
        assert_eq!(
            ClearIfCmd::parse(&items),
            Command::Unknown("ERR wrong number of arguments for 'clearif' command".to_string())
        );
    }
}
