//! Test doubles shared by the unit tests.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::oneshot;

use crate::error::FetchError;
use crate::models::{AdDescriptor, MediaKind, SlotId, ToggleView};
use crate::services::{
    AdSource, AnalyticsEvent, AnalyticsSink, ImageMount, MediaSlotSink, VideoMount,
    VisibilityProbe,
};

/// Image ad with the given id and weight.
pub fn ad(id: &str, weight: f64) -> AdDescriptor {
    AdDescriptor {
        id: id.to_string(),
        media_kind: MediaKind::Image,
        media_url: format!("/{id}.png"),
        poster_url: None,
        image_url: None,
        link_url: None,
        title: None,
        weight,
        duration_seconds: None,
        loop_media: false,
    }
}

/// `AdSource` answering from a script, then from a fallback.
pub struct ScriptedSource {
    script: Mutex<VecDeque<Result<Value, FetchError>>>,
    fallback: Option<Result<Value, FetchError>>,
    delay: Option<Duration>,
    hang: bool,
    calls: AtomicUsize,
    last_count: Mutex<Option<u32>>,
}

impl ScriptedSource {
    pub fn new(script: Vec<Result<Value, FetchError>>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            fallback: None,
            delay: None,
            hang: false,
            calls: AtomicUsize::new(0),
            last_count: Mutex::new(None),
        }
    }

    /// Same response on every call.
    pub fn always(response: Result<Value, FetchError>) -> Self {
        Self {
            fallback: Some(response),
            ..Self::new(Vec::new())
        }
    }

    /// Never answers.
    pub fn hanging() -> Self {
        Self {
            hang: true,
            ..Self::new(Vec::new())
        }
    }

    /// Answer only after `delay`.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn last_count(&self) -> Option<u32> {
        *self.last_count.lock().unwrap()
    }
}

#[async_trait]
impl AdSource for ScriptedSource {
    async fn request(&self, count: u32) -> Result<Value, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last_count.lock().unwrap() = Some(count);

        if self.hang {
            std::future::pending::<()>().await;
        }
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let next = self.script.lock().unwrap().pop_front();
        match next {
            Some(response) => response,
            None => self
                .fallback
                .clone()
                .unwrap_or_else(|| Err(FetchError::network("script exhausted"))),
        }
    }
}

/// Everything a `RecordingSlot` was asked to do.
#[derive(Debug, Clone, PartialEq)]
pub enum SinkCall {
    Clear,
    MountImage(ImageMount),
    MountVideo(VideoMount),
    SetMuted(bool),
    Toggle(ToggleView),
    Play,
    Pause,
    StartProgress(Duration),
    ResetProgress,
}

/// `MediaSlotSink` that records its calls.
pub struct RecordingSlot {
    calls: Mutex<Vec<SinkCall>>,
    in_viewport: AtomicBool,
}

impl RecordingSlot {
    pub fn new(in_viewport: bool) -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            in_viewport: AtomicBool::new(in_viewport),
        }
    }

    pub fn set_in_viewport(&self, visible: bool) {
        self.in_viewport.store(visible, Ordering::SeqCst);
    }

    pub fn calls(&self) -> Vec<SinkCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn take_calls(&self) -> Vec<SinkCall> {
        std::mem::take(&mut *self.calls.lock().unwrap())
    }

    pub fn count(&self, predicate: impl Fn(&SinkCall) -> bool) -> usize {
        self.calls.lock().unwrap().iter().filter(|c| predicate(c)).count()
    }

    fn push(&self, call: SinkCall) {
        self.calls.lock().unwrap().push(call);
    }
}

impl MediaSlotSink for RecordingSlot {
    fn clear(&self) {
        self.push(SinkCall::Clear);
    }

    fn mount_image(&self, mount: &ImageMount) {
        self.push(SinkCall::MountImage(mount.clone()));
    }

    fn mount_video(&self, mount: &VideoMount) {
        self.push(SinkCall::MountVideo(mount.clone()));
    }

    fn set_muted(&self, muted: bool) {
        self.push(SinkCall::SetMuted(muted));
    }

    fn render_sound_toggle(&self, view: ToggleView) {
        self.push(SinkCall::Toggle(view));
    }

    fn play(&self) {
        self.push(SinkCall::Play);
    }

    fn pause(&self) {
        self.push(SinkCall::Pause);
    }

    fn start_progress(&self, fill: Duration) {
        self.push(SinkCall::StartProgress(fill));
    }

    fn reset_progress(&self) {
        self.push(SinkCall::ResetProgress);
    }

    fn in_viewport(&self) -> bool {
        self.in_viewport.load(Ordering::SeqCst)
    }
}

#[derive(Default)]
pub struct RecordingAnalytics {
    events: Mutex<Vec<AnalyticsEvent>>,
}

impl RecordingAnalytics {
    pub fn events(&self) -> Vec<AnalyticsEvent> {
        self.events.lock().unwrap().clone()
    }
}

impl AnalyticsSink for RecordingAnalytics {
    fn send(&self, event: AnalyticsEvent) {
        self.events.lock().unwrap().push(event);
    }
}

/// `VisibilityProbe` that records observe/unobserve calls.
#[derive(Default)]
pub struct FakeProbe {
    downlink: Option<f64>,
    observed: Mutex<Vec<(SlotId, f64)>>,
    unobserved: Mutex<Vec<SlotId>>,
}

impl FakeProbe {
    pub fn with_downlink(downlink: Option<f64>) -> Self {
        Self {
            downlink,
            ..Self::default()
        }
    }

    pub fn observed(&self) -> Vec<(SlotId, f64)> {
        self.observed.lock().unwrap().clone()
    }

    pub fn unobserved(&self) -> Vec<SlotId> {
        self.unobserved.lock().unwrap().clone()
    }
}

impl VisibilityProbe for FakeProbe {
    fn observe(&self, slot: SlotId, threshold: f64) {
        self.observed.lock().unwrap().push((slot, threshold));
    }

    fn unobserve(&self, slot: SlotId) {
        self.unobserved.lock().unwrap().push(slot);
    }

    fn downlink_mbps(&self) -> Option<f64> {
        self.downlink
    }
}

/// Local HTTP endpoint that answers one request with a canned response.
pub struct CannedServer {
    pub base: String,
    request: oneshot::Receiver<String>,
}

impl CannedServer {
    pub async fn start(status: u16, body: &str) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base = format!("http://{}", listener.local_addr().unwrap());
        let body = body.to_string();
        let (tx, rx) = oneshot::channel();

        tokio::spawn(async move {
            let Ok((mut stream, _)) = listener.accept().await else {
                return;
            };
            let request = read_request(&mut stream).await;
            let response = format!(
                "HTTP/1.1 {status} Canned\r\nContent-Type: application/json\r\n\
                 Content-Length: {}\r\nConnection: close\r\n\r\n{body}",
                body.len()
            );
            let _ = stream.write_all(response.as_bytes()).await;
            let _ = stream.shutdown().await;
            let _ = tx.send(request);
        });

        Self { base, request: rx }
    }

    /// Raw text of the request the server received.
    pub async fn request(self) -> String {
        tokio::time::timeout(Duration::from_secs(5), self.request)
            .await
            .expect("no request within 5s")
            .expect("server task dropped")
    }
}

async fn read_request(stream: &mut TcpStream) -> String {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 1024];
    loop {
        let n = stream.read(&mut chunk).await.unwrap_or(0);
        if n == 0 {
            break;
        }
        buf.extend_from_slice(&chunk[..n]);

        let Some(end) = buf.windows(4).position(|w| w == b"\r\n\r\n") else {
            continue;
        };
        let head = String::from_utf8_lossy(&buf[..end]).to_lowercase();
        let body_len = head
            .lines()
            .find_map(|line| line.strip_prefix("content-length:"))
            .and_then(|v| v.trim().parse::<usize>().ok())
            .unwrap_or(0);
        if buf.len() >= end + 4 + body_len {
            break;
        }
    }
    String::from_utf8_lossy(&buf).into_owned()
}
