use atoi::FromRadix10SignedChecked;

/// Largest bulk payload accepted from a peer. Well above the store's
/// per-entry quota so oversized values still reach the quota check.
pub const MAX_BULK_LEN: usize = 64 * 1024 * 1024;

/// Largest encoded frame accepted from an authenticated peer
pub const MAX_FRAME_LEN: usize = MAX_BULK_LEN + 1024;

/// Most elements a request array may carry (`CLEARIF key expected` needs 3)
pub const MAX_ARRAY_LEN: usize = 8;

/// Longest header, integer or simple-string line
pub const MAX_LINE_LEN: usize = 1024;

/// RESP (REdis Serialization Protocol) frame
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
  /// Status replies such as `WELCOME`
  SimpleString(String),
  /// Error replies
  Error(String),
  Integer(i64),
  /// Binary-safe payload (can be null)
  BulkString(Option<Vec<u8>>),
  /// Arrays of other frames (can be null)
  Array(Option<Vec<Value>>),
}

impl Value {
  /// Create an error reply
  pub fn error(msg: impl Into<String>) -> Self {
    Value::Error(msg.into())
  }

  pub fn bulk(data: impl Into<Vec<u8>>) -> Self {
    Value::BulkString(Some(data.into()))
  }

  pub fn null() -> Self {
    Value::BulkString(None)
  }

  /// `:1` / `:0` reply used for boolean results
  pub fn flag(b: bool) -> Self {
    Value::Integer(b as i64)
  }

  /// Build a request frame: an array of bulk strings
  pub fn command<I, T>(parts: I) -> Self
  where
    I: IntoIterator<Item = T>,
    T: Into<Vec<u8>>,
  {
    Value::Array(Some(parts.into_iter().map(Value::bulk).collect()))
  }

  /// Payload of a bulk or simple string
  pub fn as_bytes(&self) -> Option<&[u8]> {
    match self {
      Value::BulkString(Some(data)) => Some(data),
      Value::SimpleString(s) => Some(s.as_bytes()),
      _ => None,
    }
  }

  /// Encode Value to RESP bytes
  pub fn encode(&self) -> Vec<u8> {
    let mut buf = Vec::new();
    self.encode_to(&mut buf);
    buf
  }

  fn encode_to(&self, buf: &mut Vec<u8>) {
    match self {
      Value::SimpleString(s) => {
        buf.push(b'+');
        buf.extend_from_slice(s.as_bytes());
        buf.extend_from_slice(b"\r\n");
      }
      Value::Error(e) => {
        buf.push(b'-');
        buf.extend_from_slice(e.as_bytes());
        buf.extend_from_slice(b"\r\n");
      }
      Value::Integer(i) => {
        buf.push(b':');
        buf.extend_from_slice(i.to_string().as_bytes());
        buf.extend_from_slice(b"\r\n");
      }
      Value::BulkString(None) => buf.extend_from_slice(b"$-1\r\n"),
      Value::BulkString(Some(data)) => {
        buf.push(b'$');
        buf.extend_from_slice(data.len().to_string().as_bytes());
        buf.extend_from_slice(b"\r\n");
        buf.extend_from_slice(data);
        buf.extend_from_slice(b"\r\n");
      }
      Value::Array(None) => buf.extend_from_slice(b"*-1\r\n"),
      Value::Array(Some(items)) => {
        buf.push(b'*');
        buf.extend_from_slice(items.len().to_string().as_bytes());
        buf.extend_from_slice(b"\r\n");
        for item in items {
          item.encode_to(buf);
        }
      }
    }
  }
}

/// Malformed input that can never become a valid frame
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FrameError {
  #[error("unknown frame type byte 0x{0:02x}")]
  UnknownType(u8),

  #[error("invalid length or integer field")]
  InvalidNumber,

  #[error("bulk payload of {0} bytes exceeds the frame limit")]
  TooLarge(usize),

  #[error("frame of at least {0} bytes exceeds the limit")]
  FrameTooLarge(usize),

  #[error("array of {0} elements exceeds the limit")]
  TooManyItems(usize),

  #[error("nested arrays are not accepted")]
  Nested,

  #[error("header line exceeds the length limit")]
  LineTooLong,

  #[error("bulk payload not terminated by CRLF")]
  MissingTerminator,
}

/// Parser for RESP protocol
pub struct Parser;

impl Parser {
  /// Parse one frame from the front of `buffer`.
  ///
  /// `Ok(None)` means more bytes are needed; `Ok(Some((value, consumed)))`
  /// returns the frame and how many bytes it occupied.
  pub fn parse(buffer: &[u8]) -> Result<Option<(Value, usize)>, FrameError> {
    Self::parse_with_limit(buffer, MAX_FRAME_LEN)
  }

  /// Like [`Parser::parse`], rejecting any frame that would occupy more
  /// than `limit` bytes as soon as its headers say so.
  pub fn parse_with_limit(
    buffer: &[u8],
    limit: usize,
  ) -> Result<Option<(Value, usize)>, FrameError> {
    if buffer.is_empty() {
      return Ok(None);
    }

    let mut pos = 0;
    let value = if buffer[0] == b'*' {
      pos += 1;
      let Some(line) = Self::read_line(buffer, &mut pos)? else {
        return Ok(None);
      };
      Self::parse_array(buffer, &mut pos, Self::number(line)?, limit)?
    } else {
      Self::parse_scalar(buffer, &mut pos, limit)?
    };
    Ok(value.map(|v| (v, pos)))
  }

  /// Any frame except an array. Arrays only appear at the top level.
  fn parse_scalar(
    buffer: &[u8],
    pos: &mut usize,
    limit: usize,
  ) -> Result<Option<Value>, FrameError> {
    let Some(&type_byte) = buffer.get(*pos) else {
      return Ok(None);
    };
    if type_byte == b'*' {
      return Err(FrameError::Nested);
    }
    *pos += 1;

    let Some(line) = Self::read_line(buffer, pos)? else {
      return Ok(None);
    };

    match type_byte {
      b'+' => Ok(Some(Value::SimpleString(String::from_utf8_lossy(line).into_owned()))),
      b'-' => Ok(Some(Value::Error(String::from_utf8_lossy(line).into_owned()))),
      b':' => Ok(Some(Value::Integer(Self::number(line)?))),
      b'$' => Self::parse_bulk_string(buffer, pos, Self::number(line)?, limit),
      other => Err(FrameError::UnknownType(other)),
    }
  }

  fn number(line: &[u8]) -> Result<i64, FrameError> {
    // atoi stops at the first non-digit, so reject anything left over
    match i64::from_radix_10_signed_checked(line) {
      (Some(n), used) if used == line.len() && used > 0 => Ok(n),
      _ => Err(FrameError::InvalidNumber),
    }
  }

  fn parse_bulk_string(
    buffer: &[u8],
    pos: &mut usize,
    len: i64,
    limit: usize,
  ) -> Result<Option<Value>, FrameError> {
    if len == -1 {
      return Ok(Some(Value::BulkString(None)));
    }
    if len < 0 {
      return Err(FrameError::InvalidNumber);
    }

    let len = len as usize;
    if len > MAX_BULK_LEN {
      return Err(FrameError::TooLarge(len));
    }
    if *pos + len + 2 > limit {
      return Err(FrameError::FrameTooLarge(*pos + len + 2));
    }

    // Payload plus trailing \r\n
    if *pos + len + 2 > buffer.len() {
      return Ok(None);
    }
    if &buffer[*pos + len..*pos + len + 2] != b"\r\n" {
      return Err(FrameError::MissingTerminator);
    }

    let data = buffer[*pos..*pos + len].to_vec();
    *pos += len + 2;
    Ok(Some(Value::BulkString(Some(data))))
  }

  fn parse_array(
    buffer: &[u8],
    pos: &mut usize,
    count: i64,
    limit: usize,
  ) -> Result<Option<Value>, FrameError> {
    if count == -1 {
      return Ok(Some(Value::Array(None)));
    }
    if count < 0 {
      return Err(FrameError::InvalidNumber);
    }

    let count = count as usize;
    if count > MAX_ARRAY_LEN {
      return Err(FrameError::TooManyItems(count));
    }

    let mut items = Vec::with_capacity(count);
    for _ in 0..count {
      match Self::parse_scalar(buffer, pos, limit)? {
        Some(item) => items.push(item),
        None => return Ok(None),
      }
    }
    Ok(Some(Value::Array(Some(items))))
  }

  fn read_line<'a>(buffer: &'a [u8], pos: &mut usize) -> Result<Option<&'a [u8]>, FrameError> {
    let start = *pos;
    let window = &buffer[start..buffer.len().min(start + MAX_LINE_LEN + 2)];
    match window.windows(2).position(|w| w == b"\r\n") {
      Some(len) => {
        *pos = start + len + 2;
        Ok(Some(&buffer[start..start + len]))
      }
      None if window.len() == MAX_LINE_LEN + 2 => Err(FrameError::LineTooLong),
      None => Ok(None),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_parse_simple_string() {
    let (value, consumed) = Parser::parse(b"+WELCOME\r\n").unwrap().unwrap();
    assert_eq!(value, Value::SimpleString("WELCOME".to_string()));
    assert_eq!(consumed, 10);
  }

  #[test]
  fn test_parse_command_frame() {
    let data = b"*3\r\n$3\r\nSET\r\n$9\r\nrecording\r\n$1\r\n1\r\n";
    let (value, consumed) = Parser::parse(data).unwrap().unwrap();
    assert_eq!(value, Value::command(["SET", "recording", "1"]));
    assert_eq!(consumed, data.len());
  }

  #[test]
  fn test_parse_incomplete_needs_more() {
    assert_eq!(Parser::parse(b"").unwrap(), None);
    assert_eq!(Parser::parse(b"$5\r\nhel").unwrap(), None);
    assert_eq!(Parser::parse(b"*2\r\n$3\r\nGET\r\n").unwrap(), None);
    assert_eq!(Parser::parse(b":12").unwrap(), None);
  }

  #[test]
  fn test_parse_garbage_is_an_error() {
    assert_eq!(Parser::parse(b"hello\r\n"), Err(FrameError::UnknownType(b'h')));
    assert_eq!(Parser::parse(b"$abc\r\n"), Err(FrameError::InvalidNumber));
    assert_eq!(Parser::parse(b"$2\r\nabcd\r\n"), Err(FrameError::MissingTerminator));
    assert_eq!(
      Parser::parse(format!("${}\r\n", MAX_BULK_LEN + 1).as_bytes()),
      Err(FrameError::TooLarge(MAX_BULK_LEN + 1))
    );
  }

  #[test]
  fn test_deeply_nested_arrays_are_rejected() {
    assert_eq!(Parser::parse(b"*1\r\n*1\r\n:1\r\n"), Err(FrameError::Nested));

    let hostile = b"*1\r\n".repeat(200_000);
    assert_eq!(Parser::parse(&hostile), Err(FrameError::Nested));
  }

  #[test]
  fn test_oversized_frames_are_rejected_from_headers() {
    assert_eq!(Parser::parse(b"*1000000\r\n"), Err(FrameError::TooManyItems(1_000_000)));

    // Four maximal bulks: the second header already crosses the frame limit
    let header = format!("*4\r\n${}\r\n", MAX_BULK_LEN);
    let mut data = header.clone().into_bytes();
    data.resize(header.len() + MAX_BULK_LEN, b'x');
    data.extend_from_slice(format!("\r\n${}\r\n", MAX_BULK_LEN).as_bytes());
    assert!(matches!(Parser::parse(&data), Err(FrameError::FrameTooLarge(_))));

    assert_eq!(
      Parser::parse_with_limit(b"*2\r\n$4\r\nAUTH\r\n$5000\r\n", 4096),
      Err(FrameError::FrameTooLarge(5023))
    );
  }

  #[test]
  fn test_unterminated_line_is_bounded() {
    let mut data = b"+".to_vec();
    data.resize(MAX_LINE_LEN + 10, b'a');
    assert_eq!(Parser::parse(&data), Err(FrameError::LineTooLong));
    assert_eq!(Parser::parse(&data[..MAX_LINE_LEN]).unwrap(), None);
  }

  #[test]
  fn test_parse_two_frames_back_to_back() {
    let data = b":1\r\n$-1\r\n";
    let (first, used) = Parser::parse(data).unwrap().unwrap();
    assert_eq!(first, Value::flag(true));
    let (second, _) = Parser::parse(&data[used..]).unwrap().unwrap();
    assert_eq!(second, Value::null());
  }

  #[test]
  fn test_encode() {
    assert_eq!(Value::flag(false).encode(), b":0\r\n");
    assert_eq!(Value::bulk("null").encode(), b"$4\r\nnull\r\n");
    assert_eq!(Value::error("NOAUTH").encode(), b"-NOAUTH\r\n");
  }
}
