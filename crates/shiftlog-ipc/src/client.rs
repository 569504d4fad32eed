//! IPC client for shiftd

use serde::de::DeserializeOwned;
use shiftlog_api::{Command, Event, Request, Response, ResponsePayload, ResponseResult};
use std::path::{Path, PathBuf};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::UnixStream;
use tokio::net::unix::{OwnedReadHalf, OwnedWriteHalf};
use tracing::debug;

use crate::{IpcError, IpcResult};

/// Read one NDJSON line and decode it
async fn read_message<T: DeserializeOwned>(reader: &mut BufReader<OwnedReadHalf>) -> IpcResult<T> {
    let mut line = String::new();
    if reader.read_line(&mut line).await? == 0 {
        return Err(IpcError::ConnectionClosed);
    }
    Ok(serde_json::from_str(line.trim())?)
}

/// Connection to shiftd
///
/// Requests are answered in order; one request is in flight at a time.
pub struct IpcClient {
    reader: BufReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
    next_request_id: u64,
}

impl IpcClient {
    pub async fn connect(socket_path: impl AsRef<Path>) -> IpcResult<Self> {
        let stream = UnixStream::connect(socket_path.as_ref()).await?;
        debug!(socket = %socket_path.as_ref().display(), "Connected to shiftd");
        let (read_half, write_half) = stream.into_split();

        Ok(Self {
            reader: BufReader::new(read_half),
            writer: write_half,
            next_request_id: 1,
        })
    }

    /// Connect to `socket_path`, or to the default socket when `None`
    pub async fn connect_default(socket_path: Option<PathBuf>) -> IpcResult<Self> {
        let path = socket_path.unwrap_or_else(shiftlog_util::default_socket_path);
        Self::connect(path).await
    }

    /// Send a command and return the raw response envelope
    pub async fn send(&mut self, command: Command) -> IpcResult<Response> {
        let request_id = self.next_request_id;
        self.next_request_id += 1;

        let mut json = serde_json::to_string(&Request::new(request_id, command))?;
        json.push('\n');
        self.writer.write_all(json.as_bytes()).await?;

        let response: Response = read_message(&mut self.reader).await?;
        // Id 0 answers a line the service could not parse
        if response.request_id != request_id && response.request_id != 0 {
            return Err(IpcError::InvalidMessage(format!(
                "expected response to request {}, got {}",
                request_id, response.request_id
            )));
        }

        Ok(response)
    }

    /// Send a command; a refusal from the service becomes `IpcError::Rejected`
    pub async fn request(&mut self, command: Command) -> IpcResult<ResponsePayload> {
        match self.send(command).await?.result {
            ResponseResult::Ok(payload) => Ok(payload),
            ResponseResult::Err(info) => Err(IpcError::Rejected {
                code: info.code,
                message: info.message,
            }),
        }
    }

    /// Turn this connection into an event stream
    pub async fn subscribe(mut self) -> IpcResult<EventStream> {
        self.request(Command::SubscribeEvents).await?;
        Ok(EventStream {
            reader: self.reader,
        })
    }
}

/// Events broadcast by shiftd to a subscribed connection
pub struct EventStream {
    reader: BufReader<OwnedReadHalf>,
}

impl EventStream {
    /// Wait for the next event
    pub async fn next(&mut self) -> IpcResult<Event> {
        read_message(&mut self.reader).await
    }
}
