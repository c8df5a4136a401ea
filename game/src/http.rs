use std::io;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use bytes::Bytes;
use http_body_util::Full;
use hyper::http::uri::InvalidUri;
use hyper::{Method, Request, Uri, header};
use hyper_util::client::legacy::Client;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::rt::TokioExecutor;
use serde::Serialize;
use serde_json::json;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing::{debug, warn};

use crate::ports::{AdvisorError, RobotAdvisor};
use crate::round::EntityId;
use crate::telemetry::{TelemetryError, TelemetryPayload, TelemetrySink};

pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);
pub const DEFAULT_TELEMETRY_PATH: &str = "/experiment_logs";

#[derive(Debug, Error)]
pub enum PostError {
    #[error("invalid url `{url}`: {source}")]
    InvalidUrl {
        url: String,
        #[source]
        source: InvalidUri,
    },
    #[error("failed to encode request body: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("http worker has shut down")]
    WorkerGone,
    #[error("failed to start http worker: {0}")]
    Spawn(#[from] io::Error),
}

#[derive(Debug)]
struct PostJob {
    uri: Uri,
    body: Bytes,
}

/// Fire-and-forget JSON POSTs on a dedicated worker thread.
///
/// `post_json` only enqueues. Each request runs as its own task, so one
/// stalled endpoint never delays the requests queued behind it. Failures are
/// logged by the worker. Dropping the poster gives in-flight requests one
/// timeout period to finish and aborts whatever is left.
pub struct HttpPoster {
    base: String,
    timeout: Duration,
    tx: Option<mpsc::UnboundedSender<PostJob>>,
    worker: Option<JoinHandle<()>>,
}

impl HttpPoster {
    pub fn start(base_url: &str) -> Result<Self, PostError> {
        Self::with_timeout(base_url, REQUEST_TIMEOUT)
    }

    pub fn with_timeout(base_url: &str, timeout: Duration) -> Result<Self, PostError> {
        let base = base_url.trim_end_matches('/').to_string();
        base.parse::<Uri>().map_err(|source| PostError::InvalidUrl {
            url: base.clone(),
            source,
        })?;

        let (tx, rx) = mpsc::unbounded_channel::<PostJob>();
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;
        let worker = thread::Builder::new()
            .name("defusal-http".to_string())
            .spawn(move || runtime.block_on(drain(rx, timeout)))?;

        Ok(Self {
            base,
            timeout,
            tx: Some(tx),
            worker: Some(worker),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn post_json<T: Serialize + ?Sized>(&self, path: &str, body: &T) -> Result<(), PostError> {
        let url = format!("{}{}", self.base, path);
        let uri = url
            .parse::<Uri>()
            .map_err(|source| PostError::InvalidUrl { url, source })?;
        let body = Bytes::from(serde_json::to_vec(body)?);
        let tx = self.tx.as_ref().ok_or(PostError::WorkerGone)?;
        tx.send(PostJob { uri, body })
            .map_err(|_| PostError::WorkerGone)
    }
}

impl Drop for HttpPoster {
    fn drop(&mut self) {
        self.tx.take();
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                warn!("http worker panicked");
            }
        }
    }
}

type HttpClient = Client<HttpConnector, Full<Bytes>>;

async fn drain(mut rx: mpsc::UnboundedReceiver<PostJob>, timeout: Duration) {
    let client: HttpClient = Client::builder(TokioExecutor::new()).build_http();
    let mut in_flight = JoinSet::new();
    while let Some(job) = rx.recv().await {
        in_flight.spawn(send(client.clone(), job, timeout));
        while in_flight.try_join_next().is_some() {}
    }

    let pending = in_flight.len();
    if pending == 0 {
        return;
    }
    debug!(pending, "waiting for in-flight posts");
    let finished = tokio::time::timeout(timeout, async {
        while in_flight.join_next().await.is_some() {}
    })
    .await;
    if finished.is_err() {
        warn!(aborted = in_flight.len(), "abandoning posts still in flight at shutdown");
        in_flight.abort_all();
    }
}

async fn send(client: HttpClient, job: PostJob, timeout: Duration) {
    let uri = job.uri.clone();
    let request = match Request::builder()
        .method(Method::POST)
        .uri(job.uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Full::new(job.body))
    {
        Ok(request) => request,
        Err(err) => {
            warn!(%uri, error = %err, "failed to build request");
            return;
        }
    };

    match tokio::time::timeout(timeout, client.request(request)).await {
        Ok(Ok(response)) if response.status().is_success() => {
            debug!(%uri, status = %response.status(), "post delivered");
        }
        Ok(Ok(response)) => warn!(%uri, status = %response.status(), "post rejected"),
        Ok(Err(err)) => warn!(%uri, error = %err, "post failed"),
        Err(_) => warn!(%uri, "post timed out"),
    }
}

/// Posts each payload as JSON to `<base><path>`.
pub struct HttpTelemetrySink {
    poster: HttpPoster,
    path: String,
}

impl HttpTelemetrySink {
    pub fn new(poster: HttpPoster) -> Self {
        Self::with_path(poster, DEFAULT_TELEMETRY_PATH)
    }

    pub fn with_path(poster: HttpPoster, path: impl Into<String>) -> Self {
        Self {
            poster,
            path: path.into(),
        }
    }
}

impl TelemetrySink for HttpTelemetrySink {
    fn deliver(&mut self, payload: &TelemetryPayload) -> Result<(), TelemetryError> {
        self.poster.post_json(&self.path, payload)?;
        Ok(())
    }
}

/// Drives the robot's companion server: `/think`, `/suggest`, `/celebrate`, `/sad`.
pub struct HttpRobotAdvisor {
    poster: HttpPoster,
}

impl HttpRobotAdvisor {
    pub fn new(poster: HttpPoster) -> Self {
        Self { poster }
    }

    fn command(&self, path: &str, body: serde_json::Value) -> Result<(), AdvisorError> {
        self.poster
            .post_json(path, &body)
            .map_err(|err| AdvisorError::Unavailable(err.to_string()))
    }
}

impl RobotAdvisor for HttpRobotAdvisor {
    fn think(&mut self) -> Result<(), AdvisorError> {
        self.command("/think", json!({}))
    }

    fn suggest(&mut self, entity: &EntityId) -> Result<(), AdvisorError> {
        self.command("/suggest", json!({ "color": entity }))
    }

    fn celebrate(&mut self) -> Result<(), AdvisorError> {
        self.command("/celebrate", json!({}))
    }

    fn feel_sad(&mut self) -> Result<(), AdvisorError> {
        self.command("/sad", json!({}))
    }
}
