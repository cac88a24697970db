use crate::encoding::{Data, EncodingError};
use crate::protocol::clearif::ClearIfCmd;
use crate::protocol::del::DelCmd;
use crate::protocol::get::GetCmd;
use crate::protocol::resp::Value;
use crate::protocol::set::SetCmd;
use crate::store::SharedStore;

/// Store commands accepted from an authenticated session
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// GET key
    Get(GetCmd),
    /// SET key value
    Set(SetCmd),
    /// DEL key
    Del(DelCmd),
    /// CLEARIF key expected
    ClearIf(ClearIfCmd),
    /// Unknown, malformed or unsupported command; carries the error reply
    Unknown(String),
}

impl Command {
    /// Parse a RESP array into a Command
    pub fn from_resp(value: Value) -> Option<Self> {
        match value {
            Value::Array(Some(items)) if !items.is_empty() => {
                let cmd_name = match items[0].as_bytes() {
                    Some(data) => String::from_utf8_lossy(data).to_uppercase(),
                    None => return Some(Command::Unknown("ERR invalid command format".to_string())),
                };

                match cmd_name.as_str() {
                    "GET" => Some(GetCmd::parse(&items)),
                    "SET" => Some(SetCmd::parse(&items)),
                    "DEL" => Some(DelCmd::parse(&items)),
                    "CLEARIF" => Some(ClearIfCmd::parse(&items)),
                    _ => Some(Command::Unknown(format!("ERR unknown command '{}'", cmd_name))),
                }
            }
            _ => None,
        }
    }

    /// Name used in logs
    pub fn name(&self) -> &'static str {
        match self {
            Command::Get(_) => "GET",
            Command::Set(_) => "SET",
            Command::Del(_) => "DEL",
            Command::ClearIf(_) => "CLEARIF",
            Command::Unknown(_) => "UNKNOWN",
        }
    }

    /// Execute the command on the given store and return the reply
    pub fn apply(&self, store: &SharedStore) -> Value {
        match self {
            Command::Get(cmd) => cmd.execute(store),
            Command::Set(cmd) => cmd.execute(store),
            Command::Del(cmd) => cmd.execute(store),
            Command::ClearIf(cmd) => cmd.execute(store),
            Command::Unknown(msg) => Value::error(msg.clone()),
        }
    }

    /// Parse and execute a RESP command on the given store
    pub fn execute(value: Value, store: &SharedStore) -> Value {
        match Self::from_resp(value) {
            Some(cmd) => cmd.apply(store),
            None => Value::error("ERR failed to parse command"),
        }
    }
}

/// Check arity; `expected` counts the command name
pub(crate) fn check_arity(items: &[Value], expected: usize, name: &str) -> Result<(), Command> {
    if items.len() == expected {
        Ok(())
    } else {
        Err(Command::Unknown(format!(
            "ERR wrong number of arguments for '{}' command",
            name
        )))
    }
}

pub(crate) fn key_arg(item: &Value) -> Result<String, Command> {
    match item.as_bytes() {
        Some(data) => std::str::from_utf8(data)
            .map(str::to_owned)
            .map_err(|_| Command::Unknown("ERR invalid key argument".to_string())),
        None => Err(Command::Unknown("ERR invalid key argument".to_string())),
    }
}

pub(crate) fn data_arg(item: &Value) -> Result<Data, Command> {
    let bytes = item.as_bytes().ok_or(EncodingError::Empty);
    bytes
        .and_then(Data::decode)
        .map_err(|e| Command::Unknown(format!("ERR {}", e)))
}
