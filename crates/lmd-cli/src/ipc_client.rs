//! IPC client for querying the daemon.

use lmd_core::ipc::{
    Char3GramsRequest, Char3GramsResponse, Request, Response, TrigramsRequest, TrigramsResponse,
};
use lmd_core::{Error, Result};
use std::io::{BufRead, BufReader, Write};
use std::os::unix::net::UnixStream;
use std::path::PathBuf;
use std::time::Duration;

/// Thin client sending one request per connection.
pub struct QueryClient {
    socket_path: PathBuf,
    timeout: Duration,
}

impl QueryClient {
    /// Client for the daemon at `socket_path`. `timeout` bounds each socket
    /// read and write.
    pub fn new(socket_path: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            socket_path: socket_path.into(),
            timeout,
        }
    }

    fn connect(&self) -> Result<UnixStream> {
        let stream = UnixStream::connect(&self.socket_path).map_err(|e| {
            Error::Ipc(format!(
                "Failed to connect to daemon at {}: {}. Is the daemon running?",
                self.socket_path.display(),
                e
            ))
        })?;
        stream.set_read_timeout(Some(self.timeout))?;
        stream.set_write_timeout(Some(self.timeout))?;
        Ok(stream)
    }

    /// Send a request and receive the raw response.
    pub fn request(&self, req: &Request) -> Result<Response> {
        let mut stream = self.connect()?;

        let mut request_json = req
            .to_json()
            .map_err(|e| Error::Ipc(format!("Failed to serialize request: {}", e)))?;
        request_json.push('\n');

        stream
            .write_all(request_json.as_bytes())
            .map_err(|e| Error::Ipc(format!("Failed to send request: {}", e)))?;

        let mut reader = BufReader::new(&stream);
        let mut line = String::new();
        reader
            .read_line(&mut line)
            .map_err(|e| Error::Ipc(format!("Failed to read response: {}", e)))?;

        Response::from_json(&line)
            .map_err(|e| Error::Ipc(format!("Failed to parse response: {}", e)))
    }

    pub fn char3grams(&self, req: Char3GramsRequest) -> Result<Char3GramsResponse> {
        match self.request(&Request::Char3Grams(req))? {
            Response::Char3Grams(resp) => Ok(resp),
            other => Err(unexpected(other)),
        }
    }

    pub fn trigrams(&self, req: TrigramsRequest) -> Result<TrigramsResponse> {
        match self.request(&Request::Trigrams(req))? {
            Response::Trigrams(resp) => Ok(resp),
            other => Err(unexpected(other)),
        }
    }

    /// Ask the daemon to stop after answering.
    pub fn shutdown(&self) -> Result<()> {
        match self.request(&Request::Shutdown)? {
            Response::Ok => Ok(()),
            other => Err(unexpected(other)),
        }
    }
}

fn unexpected(response: Response) -> Error {
    match response {
        Response::Error { kind, message } => {
            Error::Ipc(format!("daemon returned {:?}: {}", kind, message))
        }
        other => Error::Ipc(format!("unexpected response: {:?}", other)),
    }
}
