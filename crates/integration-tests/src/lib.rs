//! Runs Turnstile in-process on a free port and talks to it over HTTP.

use std::net::SocketAddr;
use std::sync::Once;
use std::time::Duration;

use config::Config;
use reqwest::{Method, RequestBuilder, Response};
use server::ServeConfig;
use tokio::{net::TcpListener, sync::oneshot, task::JoinHandle};
use tokio_util::sync::CancellationToken;

const STARTUP_ATTEMPTS: usize = 40;
const STARTUP_POLL: Duration = Duration::from_millis(25);

static CRYPTO: Once = Once::new();

pub struct TestClient {
    base_url: String,
    client: reqwest::Client,
}

impl TestClient {
    fn new(address: SocketAddr) -> Self {
        Self {
            base_url: format!("http://{address}"),
            client: reqwest::Client::new(),
        }
    }

    pub async fn get(&self, path: &str) -> Response {
        self.request(Method::GET, path).send().await.unwrap()
    }

    /// A request to `path` that still takes headers before it is sent.
    pub fn request(&self, method: Method, path: &str) -> RequestBuilder {
        self.client.request(method, format!("{}{path}", self.base_url))
    }

    /// Asks `/check` whether `user`, optionally acting in `workspace`, may send `method uri`, the way a
    /// forward-auth proxy would.
    pub async fn check(&self, user: &str, workspace: Option<&str>, method: &str, uri: &str) -> Response {
        let request = self
            .request(Method::GET, "/check")
            .header("x-user-id", user)
            .header("x-forwarded-method", method)
            .header("x-forwarded-uri", uri);

        match workspace {
            Some(workspace) => request.header("x-workspace-id", workspace),
            None => request,
        }
        .send()
        .await
        .unwrap()
    }
}

/// A running server. Dropping it cancels the server's shutdown token.
pub struct TestServer {
    pub client: TestClient,
    shutdown: CancellationToken,
    _task: JoinHandle<()>,
}

impl TestServer {
    /// Starts a server on the given TOML configuration and waits until it accepts connections.
    pub async fn start(config_toml: &str) -> Self {
        CRYPTO.call_once(|| {
            // Another test binary in the same process may have installed one already.
            let _ = rustls::crypto::aws_lc_rs::default_provider().install_default();
        });

        let config: Config = toml::from_str(config_toml).unwrap();
        let address = free_address().await;
        let shutdown = CancellationToken::new();

        let serve_config = ServeConfig {
            listen_address: address,
            config,
            shutdown: shutdown.clone(),
        };

        let (result_tx, mut result_rx) = oneshot::channel();

        let task = tokio::spawn(async move {
            let _ = result_tx.send(server::serve(serve_config).await);
        });

        for _ in 0..STARTUP_ATTEMPTS {
            if let Ok(Err(error)) = result_rx.try_recv() {
                eprintln!("Server failed to start: {error:#}");
                std::process::exit(1);
            }

            if tokio::net::TcpStream::connect(address).await.is_ok() {
                break;
            }

            tokio::time::sleep(STARTUP_POLL).await;
        }

        TestServer {
            client: TestClient::new(address),
            shutdown,
            _task: task,
        }
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

async fn free_address() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap()
}
