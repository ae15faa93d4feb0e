//! Test helpers: a wiremock portal driven from synchronous tests.
//!
//! The mock server runs on its own multi-thread tokio runtime so the blocking client can be used
//! from the test thread directly.

use crate::scraper::PortalClient;
use std::io::{BufRead, BufReader, Write};
use std::net::TcpListener;
use std::thread;
use std::time::Duration;
use wiremock::{Mock, MockServer, Request};

pub(crate) struct MockPortal {
    // Declared before `runtime` so the server shuts down while the runtime is still alive.
    server: MockServer,
    runtime: tokio::runtime::Runtime,
}

impl MockPortal {
    pub(crate) fn start() -> Self {
        let runtime = tokio::runtime::Runtime::new().expect("tokio runtime");
        let server = runtime.block_on(MockServer::start());
        MockPortal { server, runtime }
    }

    pub(crate) fn uri(&self) -> String {
        self.server.uri()
    }

    pub(crate) fn mount(&self, mock: Mock) {
        self.runtime.block_on(mock.mount(&self.server));
    }

    pub(crate) fn requests(&self) -> Vec<Request> {
        self.runtime
            .block_on(self.server.received_requests())
            .unwrap_or_default()
    }

    /// Panics if any mounted `expect(n)` was not met.
    pub(crate) fn verify(&self) {
        self.runtime.block_on(self.server.verify());
    }

    pub(crate) fn client(&self) -> PortalClient {
        self.client_with_timeout(Duration::from_secs(2))
    }

    pub(crate) fn client_with_timeout(&self, timeout: Duration) -> PortalClient {
        PortalClient::builder()
            .base_url(self.uri())
            .timeout(timeout)
            .build()
            .expect("portal client")
    }
}

/// Serve one response whose body stops after `sent` although `Content-Length` promises
/// `declared` bytes, then close the connection. Returns the server root URL.
pub(crate) fn cut_off_body_server(declared: usize, sent: &'static [u8]) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
    let addr = listener.local_addr().expect("local addr");
    thread::spawn(move || {
        let Ok((stream, _)) = listener.accept() else {
            return;
        };
        let mut reader = BufReader::new(stream);
        let mut line = String::new();
        while reader.read_line(&mut line).map_or(false, |n| n > 0) && line != "\r\n" {
            line.clear();
        }
        let mut stream = reader.into_inner();
        let head = format!(
            "HTTP/1.1 200 OK\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
            declared
        );
        let _ = stream.write_all(head.as_bytes());
        let _ = stream.write_all(sent);
        let _ = stream.flush();
    });
    format!("http://{}", addr)
}
