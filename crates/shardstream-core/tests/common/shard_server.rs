//! Minimal HTTP/1.1 server for integration tests.
//!
//! Serves a fixed set of paths. Each route can be told to fail its first N
//! requests (with a status code, or with a corrupted body) before serving the
//! real payload, and every request is counted per path.

use std::collections::HashMap;
use std::io::{Read, Write};
use std::net::TcpListener;
use std::sync::{Arc, Mutex};
use std::thread;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Failure {
    /// Respond with this status and an empty body.
    Status(u16),
    /// Respond 200 with bytes that do not match the payload.
    Corrupt,
}

#[derive(Debug, Clone)]
pub struct Route {
    pub body: Vec<u8>,
    pub fail_first: u32,
    pub failure: Failure,
}

impl Route {
    pub fn ok(body: Vec<u8>) -> Self {
        Self {
            body,
            fail_first: 0,
            failure: Failure::Status(500),
        }
    }

    pub fn failing(body: Vec<u8>, fail_first: u32, failure: Failure) -> Self {
        Self {
            body,
            fail_first,
            failure,
        }
    }
}

#[derive(Debug, Default)]
struct State {
    routes: HashMap<String, Route>,
    hits: HashMap<String, u32>,
}

/// Handle to a running server. The server runs until the process exits.
#[derive(Debug, Clone)]
pub struct ShardServer {
    base: String,
    state: Arc<Mutex<State>>,
}

impl ShardServer {
    /// Base URL with trailing slash, e.g. "http://127.0.0.1:12345/".
    pub fn base(&self) -> &str {
        &self.base
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base, path.trim_start_matches('/'))
    }

    /// Serve `route` at `path` from now on (e.g. a manifest that embeds this server's URLs).
    pub fn add(&self, path: &str, route: Route) {
        let key = format!("/{}", path.trim_start_matches('/'));
        self.state.lock().unwrap().routes.insert(key, route);
    }

    /// Requests received for `path` so far.
    pub fn hits(&self, path: &str) -> u32 {
        let key = format!("/{}", path.trim_start_matches('/'));
        self.state.lock().unwrap().hits.get(&key).copied().unwrap_or(0)
    }
}

/// Start serving `routes` (path without leading slash → route) on a random port.
pub fn start(routes: Vec<(&str, Route)>) -> ShardServer {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
    let port = listener.local_addr().unwrap().port();
    let state = Arc::new(Mutex::new(State {
        routes: routes
            .into_iter()
            .map(|(p, r)| (format!("/{}", p.trim_start_matches('/')), r))
            .collect(),
        hits: HashMap::new(),
    }));
    let shared = Arc::clone(&state);
    thread::spawn(move || {
        for stream in listener.incoming().flatten() {
            let state = Arc::clone(&shared);
            thread::spawn(move || handle(stream, &state));
        }
    });
    ShardServer {
        base: format!("http://127.0.0.1:{}/", port),
        state,
    }
}

fn handle(mut stream: std::net::TcpStream, state: &Mutex<State>) {
    let _ = stream.set_read_timeout(Some(std::time::Duration::from_secs(2)));
    let _ = stream.set_write_timeout(Some(std::time::Duration::from_secs(2)));
    let mut buf = [0u8; 8192];
    let n = match stream.read(&mut buf) {
        Ok(0) | Err(_) => return,
        Ok(n) => n,
    };
    let Ok(request) = std::str::from_utf8(&buf[..n]) else {
        return;
    };
    let mut parts = request.lines().next().unwrap_or("").split_whitespace();
    let method = parts.next().unwrap_or("");
    let path = parts.next().unwrap_or("/").to_string();
    if !method.eq_ignore_ascii_case("GET") {
        let _ = stream.write_all(b"HTTP/1.1 405 Method Not Allowed\r\nContent-Length: 0\r\n\r\n");
        return;
    }

    let (status, body) = {
        let mut st = state.lock().unwrap();
        let hit = {
            let h = st.hits.entry(path.clone()).or_insert(0);
            *h += 1;
            *h
        };
        match st.routes.get(&path) {
            None => ("404 Not Found".to_string(), Vec::new()),
            Some(route) if hit <= route.fail_first => match route.failure {
                Failure::Status(code) => (format!("{} Injected", code), Vec::new()),
                Failure::Corrupt => {
                    let mut bad = route.body.clone();
                    bad.extend_from_slice(b"corrupt");
                    ("200 OK".to_string(), bad)
                }
            },
            Some(route) => ("200 OK".to_string(), route.body.clone()),
        }
    };
    let head = format!(
        "HTTP/1.1 {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
        status,
        body.len()
    );
    let _ = stream.write_all(head.as_bytes());
    let _ = stream.write_all(&body);
}
