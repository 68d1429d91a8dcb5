//! Best-effort HTTP/1.0 client for pushing detection and stack events (spec
//! §4.6; grounded on `original_source/src/event_push.c`, which explicitly
//! avoids any HTTP library dependency — a single blocking `TcpStream` per
//! request is the idiomatic Rust equivalent of that raw-socket design,
//! rather than pulling in `reqwest`/`hyper` for three fire-and-forget POSTs).

use log::warn;
use std::io::{Read, Write};
use std::net::TcpStream;
use std::time::Duration;

const READ_CHUNK: usize = 8192;

/// Connection parameters for the event receiver.
#[derive(Debug, Clone)]
pub struct PushConfig {
    pub server_ip: String,
    pub server_port: u16,
    pub timeout: Duration,
}

/// Best-effort HTTP/1.0 POST client. Every method returns `true` iff the
/// connection and all writes succeeded; failures are logged as warnings and
/// never propagated — matching the pipeline's "never block on the network"
/// error policy.
pub struct EventPusher {
    config: PushConfig,
}

impl EventPusher {
    pub fn new(config: PushConfig) -> Self {
        Self { config }
    }

    fn connect(&self) -> std::io::Result<TcpStream> {
        let addr = format!("{}:{}", self.config.server_ip, self.config.server_port);
        let stream = TcpStream::connect(&addr)?;
        stream.set_write_timeout(Some(self.config.timeout))?;
        stream.set_read_timeout(Some(self.config.timeout))?;
        Ok(stream)
    }

    /// `POST <endpoint>` with a JSON body.
    pub fn post_json(&self, endpoint: &str, body: &str) -> bool {
        let request = format!(
            "POST {endpoint} HTTP/1.0\r\n\
             Host: {host}\r\n\
             Content-Type: application/json\r\n\
             Content-Length: {len}\r\n\
             Connection: close\r\n\r\n\
             {body}",
            host = self.config.server_ip,
            len = body.len(),
        );
        self.send_and_drain(request.as_bytes())
    }

    /// `POST <endpoint>` streaming a file's contents as the body.
    pub fn post_file(&self, endpoint: &str, content_type: &str, path: &std::path::Path, basename: &str) -> bool {
        let mut file = match std::fs::File::open(path) {
            Ok(f) => f,
            Err(e) => {
                warn!("event push: could not open {path:?}: {e}");
                return false;
            }
        };
        let len = match file.metadata() {
            Ok(m) => m.len(),
            Err(e) => {
                warn!("event push: could not stat {path:?}: {e}");
                return false;
            }
        };

        let head = format!(
            "POST {endpoint} HTTP/1.0\r\n\
             Host: {host}\r\n\
             Content-Type: {content_type}\r\n\
             Content-Length: {len}\r\n\
             X-Filename: {basename}\r\n\
             Connection: close\r\n\r\n",
            host = self.config.server_ip,
        );

        let mut stream = match self.connect() {
            Ok(s) => s,
            Err(e) => {
                warn!("event push: connect failed: {e}");
                return false;
            }
        };
        if let Err(e) = stream.write_all(head.as_bytes()) {
            warn!("event push: failed writing headers: {e}");
            return false;
        }

        let mut buf = [0u8; READ_CHUNK];
        loop {
            let n = match file.read(&mut buf) {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) => {
                    warn!("event push: failed reading {path:?}: {e}");
                    return false;
                }
            };
            if let Err(e) = stream.write_all(&buf[..n]) {
                warn!("event push: failed streaming body: {e}");
                return false;
            }
        }
        true
    }

    /// `POST <endpoint>` with an in-memory byte body (used for encoded
    /// images, which are never written to disk before upload).
    pub fn post_bytes(&self, endpoint: &str, content_type: &str, body: &[u8], basename: &str) -> bool {
        let head = format!(
            "POST {endpoint} HTTP/1.0\r\n\
             Host: {host}\r\n\
             Content-Type: {content_type}\r\n\
             Content-Length: {len}\r\n\
             X-Filename: {basename}\r\n\
             Connection: close\r\n\r\n",
            host = self.config.server_ip,
            len = body.len(),
        );

        let mut stream = match self.connect() {
            Ok(s) => s,
            Err(e) => {
                warn!("event push: connect failed: {e}");
                return false;
            }
        };
        if let Err(e) = stream.write_all(head.as_bytes()) {
            warn!("event push: failed writing headers: {e}");
            return false;
        }
        if let Err(e) = stream.write_all(body) {
            warn!("event push: failed writing body: {e}");
            return false;
        }
        true
    }

    fn send_and_drain(&self, bytes: &[u8]) -> bool {
        let mut stream = match self.connect() {
            Ok(s) => s,
            Err(e) => {
                warn!("event push: connect failed: {e}");
                return false;
            }
        };
        if let Err(e) = stream.write_all(bytes) {
            warn!("event push: failed writing request: {e}");
            return false;
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::BufRead;
    use std::net::TcpListener;

    fn spawn_echo_server() -> (TcpListener, u16) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        (listener, port)
    }

    #[test]
    fn test_post_json_sends_well_formed_request() {
        let (listener, port) = spawn_echo_server();
        let handle = std::thread::spawn(move || {
            let (stream, _) = listener.accept().unwrap();
            let mut reader = std::io::BufReader::new(stream);
            let mut request_line = String::new();
            reader.read_line(&mut request_line).unwrap();
            let mut headers = String::new();
            loop {
                let mut line = String::new();
                reader.read_line(&mut line).unwrap();
                if line == "\r\n" {
                    break;
                }
                headers.push_str(&line);
            }
            let mut body = vec![0u8; 13];
            reader.read_exact(&mut body).unwrap();
            (request_line, headers, String::from_utf8(body).unwrap())
        });

        let pusher = EventPusher::new(PushConfig {
            server_ip: "127.0.0.1".to_string(),
            server_port: port,
            timeout: Duration::from_secs(2),
        });
        assert!(pusher.post_json("/event", "{\"ok\": true}"));

        let (request_line, headers, body) = handle.join().unwrap();
        assert_eq!(request_line, "POST /event HTTP/1.0\r\n");
        assert!(headers.contains("Content-Type: application/json"));
        assert!(headers.contains("Content-Length: 13"));
        assert_eq!(body, "{\"ok\": true}");
    }

    #[test]
    fn test_post_json_to_unreachable_host_returns_false() {
        let pusher = EventPusher::new(PushConfig {
            server_ip: "127.0.0.1".to_string(),
            server_port: 1,
            timeout: Duration::from_millis(200),
        });
        assert!(!pusher.post_json("/event", "{}"));
    }

    #[test]
    fn test_post_file_streams_body_and_sets_filename_header() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("F_XX0001_test.bin");
        std::fs::write(&path, vec![1u8, 2, 3, 4, 5]).unwrap();

        let (listener, port) = spawn_echo_server();
        let handle = std::thread::spawn(move || {
            let (stream, _) = listener.accept().unwrap();
            let mut reader = std::io::BufReader::new(stream);
            let mut request_line = String::new();
            reader.read_line(&mut request_line).unwrap();
            let mut headers = String::new();
            loop {
                let mut line = String::new();
                reader.read_line(&mut line).unwrap();
                if line == "\r\n" {
                    break;
                }
                headers.push_str(&line);
            }
            let mut body = vec![0u8; 5];
            reader.read_exact(&mut body).unwrap();
            (headers, body)
        });

        let pusher = EventPusher::new(PushConfig {
            server_ip: "127.0.0.1".to_string(),
            server_port: port,
            timeout: Duration::from_secs(2),
        });
        assert!(pusher.post_file("/ff", "application/octet-stream", &path, "F_XX0001_test.bin"));

        let (headers, body) = handle.join().unwrap();
        assert!(headers.contains("X-Filename: F_XX0001_test.bin"));
        assert!(headers.contains("Content-Length: 5"));
        assert_eq!(body, vec![1, 2, 3, 4, 5]);
    }
}
