//! Purpose: Consume a server-sent event stream lazily.
//! Exports: `Event`, `EventStream`.
//! Role: Cancellable pull-based reader over the streaming response body.
//! Invariants: Blocking happens only inside `next_event`, never eagerly.
//! Invariants: `cancel` drops the reader, releasing the underlying connection.
//! Invariants: Events are yielded in emission order; a stream is not restartable.

use crate::api::transport::ApiResult;
use crate::core::error::{Error, ErrorKind};
use std::io::{BufRead, BufReader, Read};

/// One server-pushed event. `event` defaults to `message` when the server
/// omits the field, per the SSE format.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Event {
    pub event: String,
    pub data: String,
    pub id: Option<String>,
}

pub struct EventStream {
    reader: Option<BufReader<Box<dyn Read + Send + Sync>>>,
}

impl EventStream {
    pub(crate) fn new(reader: Box<dyn Read + Send + Sync>) -> Self {
        Self {
            reader: Some(BufReader::new(reader)),
        }
    }

    /// Blocks until the next event arrives. `Ok(None)` means the stream is
    /// exhausted or was cancelled; a partial event at end of stream is
    /// discarded, as the format requires.
    pub fn next_event(&mut self) -> ApiResult<Option<Event>> {
        let Some(reader) = self.reader.as_mut() else {
            return Ok(None);
        };
        let mut event_name: Option<String> = None;
        let mut event_id: Option<String> = None;
        let mut data_lines: Vec<String> = Vec::new();
        loop {
            let mut line = String::new();
            let bytes = reader.read_line(&mut line).map_err(|err| {
                Error::new(ErrorKind::Transport)
                    .with_message("failed to read event stream")
                    .with_source(err)
            })?;
            if bytes == 0 {
                self.reader = None;
                return Ok(None);
            }
            let line = line.trim_end_matches(['\r', '\n']);
            if line.is_empty() {
                if data_lines.is_empty() {
                    // Dispatch only fires for events that carried data.
                    event_name = None;
                    event_id = None;
                    continue;
                }
                return Ok(Some(Event {
                    event: event_name.unwrap_or_else(|| "message".to_string()),
                    data: data_lines.join("\n"),
                    id: event_id,
                }));
            }
            if line.starts_with(':') {
                continue;
            }
            let (field, value) = match line.split_once(':') {
                Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
                None => (line, ""),
            };
            match field {
                "event" => event_name = Some(value.to_string()),
                "data" => data_lines.push(value.to_string()),
                "id" => event_id = Some(value.to_string()),
                _ => {}
            }
        }
    }

    /// Stops the stream and releases the connection. Safe to call more than
    /// once; later `next_event` calls return `Ok(None)`.
    pub fn cancel(&mut self) {
        self.reader = None;
    }
}
