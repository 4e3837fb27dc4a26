//! IPC server answering trigram lookups.

use lmd_core::ipc::{ErrorKind, Request, Response};
use lmd_core::Result;
use lmd_model::query::deadline_from;
use lmd_model::{QueryEngine, QueryError};
use std::io::{BufRead, BufReader, Write};
use std::os::unix::net::{UnixListener, UnixStream};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// How long a connected client may take to send its request line.
const CLIENT_READ_TIMEOUT: Duration = Duration::from_secs(30);

/// IPC server handling one connection at a time.
pub struct IpcServer {
    listener: UnixListener,
    engine: QueryEngine,
    shutdown: Arc<AtomicBool>,
    socket_path: PathBuf,
}

impl IpcServer {
    /// Bind the socket. Fails if another daemon is already listening on it.
    pub fn new(socket_path: &Path, engine: QueryEngine, shutdown: Arc<AtomicBool>) -> Result<Self> {
        if socket_path.exists() {
            match UnixStream::connect(socket_path) {
                Ok(_) => {
                    return Err(lmd_core::Error::Ipc(format!(
                        "Daemon already running (socket active at {})",
                        socket_path.display()
                    )));
                }
                Err(_) => {
                    // Stale socket, remove it.
                    let _ = std::fs::remove_file(socket_path);
                }
            }
        }

        if let Some(parent) = socket_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let listener = UnixListener::bind(socket_path)
            .map_err(|e| lmd_core::Error::Ipc(format!("Failed to bind socket: {}", e)))?;
        listener
            .set_nonblocking(true)
            .map_err(|e| lmd_core::Error::Ipc(format!("Failed to set nonblocking: {}", e)))?;

        info!("IPC server listening on {}", socket_path.display());

        Ok(Self {
            listener,
            engine,
            shutdown,
            socket_path: socket_path.to_path_buf(),
        })
    }

    /// Serve until a shutdown request arrives or the shutdown flag is set.
    pub fn run(&self) -> Result<()> {
        while !self.shutdown.load(Ordering::Relaxed) {
            match self.listener.accept() {
                Ok((stream, _addr)) => {
                    // Client streams block; only the listener polls.
                    if let Err(e) = stream.set_nonblocking(false) {
                        error!("Failed to set client stream blocking mode: {}", e);
                    }
                    self.handle_client(stream);
                }
                Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                    std::thread::sleep(Duration::from_millis(25));
                }
                Err(e) => {
                    error!("Failed to accept connection: {}", e);
                    std::thread::sleep(Duration::from_millis(100));
                }
            }
        }

        info!("IPC server stopped");
        Ok(())
    }

    fn handle_client(&self, mut stream: UnixStream) {
        debug!("Client connected");
        if let Err(e) = stream.set_read_timeout(Some(CLIENT_READ_TIMEOUT)) {
            warn!("Failed to set client read timeout: {}", e);
        }

        let reader = match stream.try_clone() {
            Ok(s) => s,
            Err(e) => {
                error!("Failed to clone client stream: {}", e);
                return;
            }
        };
        let mut reader = BufReader::new(reader);
        let mut line = String::new();

        match reader.read_line(&mut line) {
            Ok(0) => debug!("Client disconnected"),
            Ok(_) => {
                let response = match Request::from_json(&line) {
                    Ok(request) => {
                        debug!("Received request: {:?}", request);
                        self.handle_request(request)
                    }
                    Err(e) => {
                        warn!("Failed to parse request: {}", e);
                        Response::bad_request(format!("Invalid request: {}", e))
                    }
                };
                send_response(&mut stream, &response);
            }
            Err(e) => error!("Failed to read from client: {}", e),
        }
    }

    /// Answer one request.
    pub fn handle_request(&self, request: Request) -> Response {
        match request {
            Request::Char3Grams(req) => {
                let deadline = deadline_from(req.timeout_ms);
                match self.engine.char3grams(&req, deadline) {
                    Ok(resp) => Response::Char3Grams(resp),
                    Err(e) => query_error(e),
                }
            }
            Request::Trigrams(req) => {
                let deadline = deadline_from(req.timeout_ms);
                match self.engine.trigrams(&req, deadline) {
                    Ok(resp) => Response::Trigrams(resp),
                    Err(e) => query_error(e),
                }
            }
            Request::Shutdown => {
                info!("Shutdown requested");
                self.shutdown.store(true, Ordering::Relaxed);
                Response::Ok
            }
        }
    }
}

impl Drop for IpcServer {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.socket_path);
    }
}

fn query_error(e: QueryError) -> Response {
    let kind = match e {
        QueryError::InvalidRegex { .. } => ErrorKind::BadRequest,
        QueryError::DeadlineExceeded => ErrorKind::DeadlineExceeded,
    };
    debug!("Query failed: {}", e);
    Response::Error {
        kind,
        message: e.to_string(),
    }
}

/// Encode `response` as one line. Encoding failures are reported to the
/// client as an internal error.
fn encode_response(response: &Response) -> String {
    let mut json = match response.to_json() {
        Ok(json) => json,
        Err(e) => {
            error!("Failed to serialize response: {}", e);
            let fallback = Response::internal(format!("cannot encode response: {}", e));
            match fallback.to_json() {
                Ok(json) => json,
                Err(_) => r#"{"type":"error","kind":"internal","message":"cannot encode response"}"#
                    .to_string(),
            }
        }
    };
    json.push('\n');
    json
}

fn send_response(stream: &mut UnixStream, response: &Response) {
    if let Err(e) = stream.write_all(encode_response(response).as_bytes()) {
        error!("Failed to send response: {}", e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lmd_core::ipc::{Char3GramsRequest, TrigramMatches, TrigramsRequest};
    use lmd_model::{CharTrigrams, Layout};

    fn server(dir: &Path) -> IpcServer {
        let mut chars = CharTrigrams::new();
        chars.add("abcab");
        let engine = QueryEngine::with_char3grams(Layout::new(dir, 4), chars);
        IpcServer::new(
            &dir.join("daemon.sock"),
            engine,
            Arc::new(AtomicBool::new(false)),
        )
        .unwrap()
    }

    #[test]
    fn test_char3grams_lookup() {
        let dir = tempfile::tempdir().unwrap();
        let server = server(dir.path());

        let response = server.handle_request(Request::Char3Grams(Char3GramsRequest {
            q: "abc".to_string(),
            regex: false,
            timeout_ms: None,
        }));
        match response {
            Response::Char3Grams(resp) => {
                assert_eq!(resp.total, 3);
                assert_eq!(resp.matches[0].count, 1);
            }
            other => panic!("unexpected response: {:?}", other),
        }
    }

    #[test]
    fn test_invalid_regex_is_bad_request() {
        let dir = tempfile::tempdir().unwrap();
        let server = server(dir.path());

        let response = server.handle_request(Request::Char3Grams(Char3GramsRequest {
            q: "(".to_string(),
            regex: true,
            timeout_ms: None,
        }));
        assert!(matches!(
            response,
            Response::Error {
                kind: ErrorKind::BadRequest,
                ..
            }
        ));
    }

    #[test]
    fn test_expired_deadline() {
        let dir = tempfile::tempdir().unwrap();
        let server = server(dir.path());

        let response = server.handle_request(Request::Char3Grams(Char3GramsRequest {
            q: ".".to_string(),
            regex: true,
            timeout_ms: Some(0),
        }));
        assert!(matches!(
            response,
            Response::Error {
                kind: ErrorKind::DeadlineExceeded,
                ..
            }
        ));
    }

    #[test]
    fn test_trigrams_without_data() {
        let dir = tempfile::tempdir().unwrap();
        let server = server(dir.path());

        let response = server.handle_request(Request::Trigrams(TrigramsRequest {
            first: "a".to_string(),
            second: "b".to_string(),
            ..Default::default()
        }));
        match response {
            Response::Trigrams(resp) => {
                assert_eq!(resp.total, 0);
                assert_eq!(resp.matches, TrigramMatches::Thirds(Default::default()));
            }
            other => panic!("unexpected response: {:?}", other),
        }
    }

    #[test]
    fn test_shutdown_sets_flag() {
        let dir = tempfile::tempdir().unwrap();
        let server = server(dir.path());

        assert_eq!(server.handle_request(Request::Shutdown), Response::Ok);
        assert!(server.shutdown.load(Ordering::Relaxed));
        server.run().unwrap();
    }

    #[test]
    fn test_socket_removed_on_drop() {
        let dir = tempfile::tempdir().unwrap();
        let socket = dir.path().join("daemon.sock");
        drop(server(dir.path()));
        assert!(!socket.exists());
    }

    #[test]
    fn test_encoded_response_is_one_line() {
        let line = encode_response(&Response::bad_request("nope"));
        assert!(line.ends_with('\n'));
        assert_eq!(line.matches('\n').count(), 1);
        assert_eq!(
            Response::from_json(line.trim_end()).unwrap(),
            Response::bad_request("nope")
        );
    }
}
