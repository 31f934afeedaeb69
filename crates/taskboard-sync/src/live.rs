//! Live update channel over WebSocket.
//!
//! The channel runs in its own task and reports to the owner through an
//! `mpsc` event stream. It is driven by [`ReconnectMachine`]:
//!
//! ```text
//! Disconnected -> Connecting -> Connected -> Disconnected (close/error)
//!                     ^                            |
//!                     +------ backoff delay -------+
//! ```
//!
//! After the attempt budget is spent the channel stays `Disconnected` with
//! `exhausted = true` until a manual reconnect resets the counter. Shutdown
//! (or dropping the [`LiveHandle`]) cancels any pending reconnect timer and
//! the keepalive timer and closes the socket.

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde::Serialize;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, trace, warn};

use taskboard_protocol::{ChangeSet, ChartItem, FrameAction, InboundFrame, OutboundFrame};

use crate::backoff::ReconnectPolicy;
use crate::SyncError;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

const SHUTDOWN_GRACE: Duration = Duration::from_secs(3);

/// Connection state of the live channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelState {
    Disconnected,
    Connecting,
    Connected,
}

impl std::fmt::Display for ChannelState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
        };
        write!(f, "{s}")
    }
}

/// Snapshot of the channel for status displays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ChannelStatus {
    pub state: ChannelState,
    /// Consecutive failed attempts since the last successful open.
    pub attempt: u32,
    /// The reconnect budget is spent; only a manual reconnect helps.
    pub exhausted: bool,
    /// Delay before the next automatic attempt, if one is scheduled.
    pub retry_in_ms: Option<u64>,
}

/// What to do after the socket closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reconnect {
    After(Duration),
    GiveUp,
}

/// Reconnect bookkeeping, free of any I/O.
#[derive(Debug, Clone)]
pub struct ReconnectMachine {
    policy: ReconnectPolicy,
    state: ChannelState,
    attempts: u32,
    exhausted: bool,
    retry_in: Option<Duration>,
}

impl ReconnectMachine {
    pub fn new(policy: ReconnectPolicy) -> Self {
        Self {
            policy,
            state: ChannelState::Disconnected,
            attempts: 0,
            exhausted: false,
            retry_in: None,
        }
    }

    pub fn state(&self) -> ChannelState {
        self.state
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn is_exhausted(&self) -> bool {
        self.exhausted
    }

    pub fn status(&self) -> ChannelStatus {
        ChannelStatus {
            state: self.state,
            attempt: self.attempts,
            exhausted: self.exhausted,
            retry_in_ms: self.retry_in.map(|d| d.as_millis() as u64),
        }
    }

    pub fn begin_connect(&mut self) {
        self.state = ChannelState::Connecting;
        self.retry_in = None;
    }

    pub fn on_open(&mut self) {
        self.state = ChannelState::Connected;
        self.attempts = 0;
        self.exhausted = false;
        self.retry_in = None;
    }

    /// Record a close or a failed connect and decide on the next step.
    pub fn on_close(&mut self) -> Reconnect {
        self.state = ChannelState::Disconnected;
        self.attempts += 1;
        if self.policy.allows(self.attempts) {
            let delay = self.policy.delay_for_attempt(self.attempts);
            self.retry_in = Some(delay);
            Reconnect::After(delay)
        } else {
            self.exhausted = true;
            self.retry_in = None;
            Reconnect::GiveUp
        }
    }

    /// Operator-requested reconnect: forget previous failures.
    pub fn manual_reconnect(&mut self) {
        self.state = ChannelState::Disconnected;
        self.attempts = 0;
        self.exhausted = false;
        self.retry_in = None;
    }

    pub fn teardown(&mut self) {
        self.state = ChannelState::Disconnected;
        self.retry_in = None;
    }
}

/// Configuration of the live channel.
#[derive(Debug, Clone)]
pub struct LiveConfig {
    /// Normalized `ws://` or `wss://` URL.
    pub url: String,
    pub policy: ReconnectPolicy,
    /// Interval of `{"type":"ping"}` keepalives. `None` disables them.
    pub keepalive_interval: Option<Duration>,
    pub connect_timeout: Duration,
}

impl LiveConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            policy: ReconnectPolicy::default(),
            keepalive_interval: Some(Duration::from_secs(25)),
            connect_timeout: Duration::from_secs(10),
        }
    }

    pub fn with_policy(mut self, policy: ReconnectPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_keepalive(mut self, interval: Option<Duration>) -> Self {
        self.keepalive_interval = interval;
        self
    }
}

/// Turn a configured channel URL into a WebSocket URL.
///
/// No scheme becomes `wss://`; `https://` and `http://` map to `wss://` and
/// `ws://`. Returns `None` for an empty value.
pub fn normalize_channel_url(raw: &str) -> Option<String> {
    let url = raw.trim();
    if url.is_empty() {
        return None;
    }
    if let Some(rest) = url.strip_prefix("https://") {
        return Some(format!("wss://{rest}"));
    }
    if let Some(rest) = url.strip_prefix("http://") {
        return Some(format!("ws://{rest}"));
    }
    if url.contains("://") {
        return Some(url.to_string());
    }
    Some(format!("wss://{}", url.trim_start_matches('/')))
}

/// Notifications from the channel task to its owner.
#[derive(Debug, Clone, PartialEq)]
pub enum LiveEvent {
    Status(ChannelStatus),
    /// Update without payload: fetch the full snapshot.
    Refetch,
    /// Update carrying a full chart list.
    Replace(Vec<ChartItem>),
    /// Update carrying per-label changes.
    Diff(ChangeSet),
}

/// Decode a text frame into the event it triggers.
///
/// `Ok(None)` for keepalive acknowledgements and unknown frame types.
pub fn interpret_frame(text: &str) -> Result<Option<LiveEvent>, SyncError> {
    let frame =
        InboundFrame::parse(text).map_err(|e| SyncError::MalformedMessage(e.to_string()))?;
    match &frame {
        InboundFrame::Pong => trace!("Keepalive acknowledged"),
        InboundFrame::Other => debug!("Ignoring live frame of unknown type"),
        InboundFrame::Update { .. } => {}
    }
    Ok(match frame.into_action() {
        FrameAction::Refetch => Some(LiveEvent::Refetch),
        FrameAction::Replace(items) => Some(LiveEvent::Replace(items)),
        FrameAction::ApplyDiff(changes) => Some(LiveEvent::Diff(changes)),
        FrameAction::Ignore => None,
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LiveCommand {
    Reconnect,
    Shutdown,
}

/// Owner's handle on a running channel task.
///
/// Dropping the handle aborts the task, so a channel never outlives its owner.
pub struct LiveHandle {
    commands: mpsc::Sender<LiveCommand>,
    task: Option<JoinHandle<()>>,
}

impl LiveHandle {
    /// Close the current socket (without auto-reconnect), cancel any pending
    /// reconnect timer, reset the attempt counter and connect again.
    pub async fn reconnect(&self) -> Result<(), SyncError> {
        self.commands
            .send(LiveCommand::Reconnect)
            .await
            .map_err(|_| SyncError::Channel("live channel task has stopped".into()))
    }

    /// Close the channel and wait for the task to finish. A task that does
    /// not stop within the grace period is aborted.
    pub async fn shutdown(mut self) {
        let Some(mut task) = self.task.take() else {
            return;
        };
        let stop = async {
            let _ = self.commands.send(LiveCommand::Shutdown).await;
            let _ = (&mut task).await;
        };
        if tokio::time::timeout(SHUTDOWN_GRACE, stop).await.is_err() {
            warn!(
                grace_ms = SHUTDOWN_GRACE.as_millis() as u64,
                "Live channel did not stop in time, aborting"
            );
            task.abort();
        }
    }

    pub fn is_finished(&self) -> bool {
        self.task.as_ref().map_or(true, |t| t.is_finished())
    }
}

impl Drop for LiveHandle {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

/// Spawn the channel task. Events are delivered on `events`; the task ends
/// when the handle shuts it down or the event receiver is dropped.
pub fn connect_live(config: LiveConfig, events: mpsc::Sender<LiveEvent>) -> LiveHandle {
    let (tx, rx) = mpsc::channel(8);
    let task = tokio::spawn(run_channel(config, events, rx));
    LiveHandle {
        commands: tx,
        task: Some(task),
    }
}

/// Outcome of handing an event to the owner.
enum Delivery {
    Sent,
    Reconnect,
    /// Shutdown requested or the owner has gone away.
    Stop,
}

enum SessionEnd {
    Closed(String),
    ManualReconnect,
    Shutdown,
}

async fn run_channel(
    config: LiveConfig,
    events: mpsc::Sender<LiveEvent>,
    mut commands: mpsc::Receiver<LiveCommand>,
) {
    let mut machine = ReconnectMachine::new(config.policy.clone());

    'outer: loop {
        machine.begin_connect();
        match emit(&events, &mut commands, LiveEvent::Status(machine.status())).await {
            Delivery::Sent => {}
            Delivery::Reconnect => {
                machine.manual_reconnect();
                continue;
            }
            Delivery::Stop => break,
        }
        info!(url = %config.url, "Connecting live channel");

        let connect = tokio::time::timeout(config.connect_timeout, connect_async(config.url.as_str()));
        let connected = tokio::select! {
            res = connect => res,
            cmd = commands.recv() => match cmd {
                Some(LiveCommand::Reconnect) => {
                    machine.manual_reconnect();
                    continue 'outer;
                }
                Some(LiveCommand::Shutdown) | None => break 'outer,
            },
        };

        let end = match connected {
            Ok(Ok((ws, _response))) => {
                machine.on_open();
                info!(url = %config.url, "Live channel connected");
                match emit(&events, &mut commands, LiveEvent::Status(machine.status())).await {
                    Delivery::Sent => run_session(ws, &config, &events, &mut commands).await,
                    Delivery::Reconnect => SessionEnd::ManualReconnect,
                    Delivery::Stop => SessionEnd::Shutdown,
                }
            }
            Ok(Err(e)) => SessionEnd::Closed(SyncError::from(e).to_string()),
            Err(_) => SessionEnd::Closed(format!(
                "channel error: connect timed out after {:?}",
                config.connect_timeout
            )),
        };

        match end {
            SessionEnd::Shutdown => break,
            SessionEnd::ManualReconnect => {
                info!("Manual reconnect requested");
                machine.manual_reconnect();
                continue;
            }
            SessionEnd::Closed(reason) => match machine.on_close() {
                Reconnect::After(delay) => {
                    warn!(
                        reason = %reason,
                        attempt = machine.attempts(),
                        delay_ms = delay.as_millis() as u64,
                        "Live channel closed, scheduling reconnect"
                    );
                    match emit(&events, &mut commands, LiveEvent::Status(machine.status())).await {
                        Delivery::Sent => {}
                        Delivery::Reconnect => {
                            machine.manual_reconnect();
                            continue;
                        }
                        Delivery::Stop => break,
                    }
                    tokio::select! {
                        _ = tokio::time::sleep(delay) => {}
                        cmd = commands.recv() => match cmd {
                            Some(LiveCommand::Reconnect) => machine.manual_reconnect(),
                            Some(LiveCommand::Shutdown) | None => break 'outer,
                        },
                    }
                }
                Reconnect::GiveUp => {
                    warn!(
                        reason = %reason,
                        attempts = machine.attempts(),
                        "Live channel giving up after exhausting reconnect budget"
                    );
                    match emit(&events, &mut commands, LiveEvent::Status(machine.status())).await {
                        Delivery::Sent => {}
                        Delivery::Reconnect => {
                            machine.manual_reconnect();
                            continue;
                        }
                        Delivery::Stop => break,
                    }
                    match commands.recv().await {
                        Some(LiveCommand::Reconnect) => machine.manual_reconnect(),
                        Some(LiveCommand::Shutdown) | None => break,
                    }
                }
            },
        }
    }

    machine.teardown();
    let _ = events.try_send(LiveEvent::Status(machine.status()));
    debug!("Live channel task stopped");
}

async fn run_session(
    ws: WsStream,
    config: &LiveConfig,
    events: &mpsc::Sender<LiveEvent>,
    commands: &mut mpsc::Receiver<LiveCommand>,
) -> SessionEnd {
    let (mut write, mut read) = ws.split();
    let mut keepalive = config.keepalive_interval.map(|period| {
        let mut interval = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        interval
    });

    loop {
        tokio::select! {
            msg = read.next() => match msg {
                Some(Ok(Message::Text(text))) => match interpret_frame(&text) {
                    Ok(Some(event)) => match emit(events, commands, event).await {
                        Delivery::Sent => {}
                        Delivery::Reconnect => {
                            let _ = write.send(Message::Close(None)).await;
                            return SessionEnd::ManualReconnect;
                        }
                        Delivery::Stop => {
                            let _ = write.send(Message::Close(None)).await;
                            return SessionEnd::Shutdown;
                        }
                    },
                    Ok(None) => {}
                    Err(e) => warn!(error = %e, "Dropping live channel frame"),
                },
                Some(Ok(Message::Close(frame))) => {
                    let reason = frame
                        .map(|f| f.reason.to_string())
                        .unwrap_or_else(|| "closed by server".to_string());
                    return SessionEnd::Closed(reason);
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => return SessionEnd::Closed(SyncError::from(e).to_string()),
                None => return SessionEnd::Closed("stream ended".to_string()),
            },
            _ = next_keepalive(&mut keepalive) => {
                if let Err(e) = write.send(Message::Text(OutboundFrame::Ping.to_text().into())).await {
                    debug!(error = %e, "Failed to send keepalive");
                }
            }
            cmd = commands.recv() => {
                let _ = write.send(Message::Close(None)).await;
                return match cmd {
                    Some(LiveCommand::Reconnect) => SessionEnd::ManualReconnect,
                    Some(LiveCommand::Shutdown) | None => SessionEnd::Shutdown,
                };
            }
        }
    }
}

async fn next_keepalive(interval: &mut Option<tokio::time::Interval>) {
    match interval {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending::<()>().await,
    }
}

/// Deliver an event. A full event buffer must not hide commands, so the send
/// races the command queue; the event is dropped if a command wins.
async fn emit(
    events: &mpsc::Sender<LiveEvent>,
    commands: &mut mpsc::Receiver<LiveCommand>,
    event: LiveEvent,
) -> Delivery {
    tokio::select! {
        sent = events.send(event) => match sent {
            Ok(()) => Delivery::Sent,
            Err(_) => Delivery::Stop,
        },
        cmd = commands.recv() => match cmd {
            Some(LiveCommand::Reconnect) => Delivery::Reconnect,
            Some(LiveCommand::Shutdown) | None => Delivery::Stop,
        },
    }
}
