//! Async driver.
//!
//! A single task owns the [`BridgeSession`]. Consumer requests, socket
//! lines, connect results and timer expiries all arrive through one
//! mailbox and are applied in order, so roster and cache mutations never
//! interleave. Socket and timer tasks post back with the generation they
//! were started for; the session discards anything stale.

use bytes::Bytes;
use futures_util::{SinkExt, StreamExt};
use tokio::io::{ReadHalf, WriteHalf};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::codec::{FramedRead, FramedWrite};
use tracing::{debug, info};

use crate::cache::{CacheInfo, CacheSnapshot};
use crate::config::ServerProfile;
use crate::error::{BridgeError, Result, Submission};
use crate::event::{BridgeEvent, DiagnosticKind, Notifier};
use crate::framer::LineFramer;
use crate::session::{Action, BridgeSession, ConnectionState, SessionSnapshot, Timer};
use crate::transport::Transport;

enum Request {
    Connect(Option<ServerProfile>, oneshot::Sender<Result<()>>),
    Disconnect(oneshot::Sender<Result<()>>),
    Submit(String, oneshot::Sender<Submission>),
    State(oneshot::Sender<SessionSnapshot>),
    History(oneshot::Sender<Vec<String>>),
    CacheInfo(oneshot::Sender<CacheInfo>),
    Erase(oneshot::Sender<()>),
    Prune(String, oneshot::Sender<Result<()>>),
    Snapshot(oneshot::Sender<CacheSnapshot>),
    Shutdown(oneshot::Sender<CacheSnapshot>),
}

enum Input {
    Request(Request),
    Connected { generation: u64, transport: Transport },
    ConnectFailed { generation: u64, error: String },
    Line { generation: u64, line: Bytes },
    Dropped { generation: u64, count: usize },
    Closed { generation: u64, error: Option<String> },
    Timer(Timer),
}

type Inbox = mpsc::WeakUnboundedSender<Input>;

/// Post to the driver. False once every [`Bridge`] handle is gone.
fn post(inbox: &Inbox, input: Input) -> bool {
    match inbox.upgrade() {
        Some(tx) => tx.send(input).is_ok(),
        None => false,
    }
}

/// Handle to a running driver. Cheap to clone.
#[derive(Clone)]
pub struct Bridge {
    tx: mpsc::UnboundedSender<Input>,
}

impl Bridge {
    /// Start the driver task for `session`, pushing events to `notifier`.
    ///
    /// The task ends after [`shutdown`](Self::shutdown) or once every
    /// handle has been dropped.
    pub fn spawn<N>(session: BridgeSession, notifier: N) -> (Self, JoinHandle<()>)
    where
        N: Notifier + Send + 'static,
    {
        let (tx, rx) = mpsc::unbounded_channel();
        let driver = Driver {
            session,
            notifier,
            inbox: tx.downgrade(),
            link: None,
        };
        let handle = tokio::spawn(driver.run(rx));
        (Self { tx }, handle)
    }

    /// Ask the session to connect. Returns once the request is accepted.
    pub async fn connect(&self, profile: Option<ServerProfile>) -> Result<()> {
        self.request(|reply| Request::Connect(profile, reply)).await?
    }

    pub async fn disconnect(&self) -> Result<()> {
        self.request(Request::Disconnect).await?
    }

    /// Send a consumer-authored line through the outbound filter.
    pub async fn submit(&self, text: impl Into<String>) -> Result<Submission> {
        let text = text.into();
        self.request(|reply| Request::Submit(text, reply)).await
    }

    pub async fn state(&self) -> Result<SessionSnapshot> {
        self.request(Request::State).await
    }

    pub async fn cached_history(&self) -> Result<Vec<String>> {
        self.request(Request::History).await
    }

    pub async fn cache_info(&self) -> Result<CacheInfo> {
        self.request(Request::CacheInfo).await
    }

    pub async fn erase_cached_history(&self) -> Result<()> {
        self.request(Request::Erase).await
    }

    pub async fn prune_channel(&self, name: impl Into<String>) -> Result<()> {
        let name = name.into();
        self.request(|reply| Request::Prune(name, reply)).await?
    }

    /// Capture the cache for persistence without stopping.
    pub async fn cache_snapshot(&self) -> Result<CacheSnapshot> {
        self.request(Request::Snapshot).await
    }

    /// Close the connection, stop the driver and return the final cache.
    pub async fn shutdown(&self) -> Result<CacheSnapshot> {
        self.request(Request::Shutdown).await
    }

    async fn request<T>(&self, make: impl FnOnce(oneshot::Sender<T>) -> Request) -> Result<T> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(Input::Request(make(reply)))
            .map_err(|_| BridgeError::Stopped)?;
        rx.await.map_err(|_| BridgeError::Stopped)
    }
}

struct Link {
    generation: u64,
    outgoing: mpsc::UnboundedSender<Bytes>,
    reader: JoinHandle<()>,
}

struct Driver<N> {
    session: BridgeSession,
    notifier: N,
    inbox: Inbox,
    link: Option<Link>,
}

impl<N: Notifier> Driver<N> {
    async fn run(mut self, mut rx: mpsc::UnboundedReceiver<Input>) {
        info!("bridge driver started");
        while let Some(input) = rx.recv().await {
            let actions = match input {
                Input::Request(Request::Shutdown(reply)) => {
                    let actions = self.session.shutdown();
                    self.perform(actions);
                    let _ = reply.send(self.session.cache_snapshot(now()));
                    break;
                }
                Input::Request(request) => self.handle_request(request),
                Input::Connected {
                    generation,
                    transport,
                } => {
                    if generation != self.session.generation()
                        || self.session.state() != ConnectionState::Connecting
                    {
                        debug!(generation, "dropping transport for stale connect");
                        continue;
                    }
                    self.attach(generation, transport);
                    self.session.on_connected(generation)
                }
                Input::ConnectFailed { generation, error } => {
                    self.session.on_connect_failed(generation, &error)
                }
                Input::Line { generation, line } => self.session.on_line(generation, &line),
                Input::Dropped { generation, count } => self.session.on_dropped(generation, count),
                Input::Closed { generation, error } => {
                    self.session.on_closed(generation, error.as_deref())
                }
                Input::Timer(timer) => self.session.on_timer(timer),
            };
            self.perform(actions);
        }

        if self.session.state() != ConnectionState::Closed {
            let actions = self.session.shutdown();
            self.perform(actions);
        }
        info!("bridge driver stopped");
    }

    fn handle_request(&mut self, request: Request) -> Vec<Action> {
        match request {
            Request::Connect(profile, reply) => {
                let (result, actions) = split(self.session.connect(profile));
                let _ = reply.send(result);
                actions
            }
            Request::Disconnect(reply) => {
                let (result, actions) = split(self.session.disconnect());
                let _ = reply.send(result);
                actions
            }
            Request::Submit(text, reply) => match self.session.submit(&text) {
                Ok(actions) => {
                    let _ = reply.send(Submission::default());
                    actions
                }
                Err(rejection) => {
                    debug!(reason = %rejection, "consumer command rejected");
                    let text = format!("command rejected: {}", rejection);
                    let _ = reply.send(Err(rejection).into());
                    vec![Action::Notify(BridgeEvent::diagnostic(
                        DiagnosticKind::Rejected,
                        text,
                    ))]
                }
            },
            Request::State(reply) => {
                let _ = reply.send(self.session.snapshot());
                Vec::new()
            }
            Request::History(reply) => {
                let _ = reply.send(self.session.cached_history());
                Vec::new()
            }
            Request::CacheInfo(reply) => {
                let _ = reply.send(self.session.cache_info());
                Vec::new()
            }
            Request::Erase(reply) => {
                self.session.erase_cached_history();
                let _ = reply.send(());
                Vec::new()
            }
            Request::Prune(name, reply) => {
                let (result, actions) = split(self.session.prune_channel(&name));
                let _ = reply.send(result);
                actions
            }
            Request::Snapshot(reply) => {
                let _ = reply.send(self.session.cache_snapshot(now()));
                Vec::new()
            }
            Request::Shutdown(_) => Vec::new(),
        }
    }

    fn perform(&mut self, actions: Vec<Action>) {
        for action in actions {
            match action {
                Action::Open {
                    generation,
                    host,
                    port,
                    tls,
                    timeout,
                } => {
                    let inbox = self.inbox.clone();
                    tokio::spawn(async move {
                        let connect = Transport::connect(&host, port, tls);
                        let input = match tokio::time::timeout(timeout, connect).await {
                            Ok(Ok(transport)) => Input::Connected {
                                generation,
                                transport,
                            },
                            Ok(Err(e)) => Input::ConnectFailed {
                                generation,
                                error: format!("{:#}", e),
                            },
                            Err(_) => Input::ConnectFailed {
                                generation,
                                error: format!("timed out after {}s", timeout.as_secs()),
                            },
                        };
                        post(&inbox, input);
                    });
                }
                Action::Send { generation, line } => match &self.link {
                    Some(link) if link.generation == generation => {
                        let _ = link.outgoing.send(line);
                    }
                    _ => debug!(generation, "no live link for outgoing line"),
                },
                Action::Close { generation } => {
                    if self.link.as_ref().map_or(false, |l| l.generation == generation) {
                        if let Some(link) = self.link.take() {
                            // the writer drains queued lines, then shuts down
                            link.reader.abort();
                            drop(link.outgoing);
                        }
                    }
                }
                Action::Schedule { timer, delay } => {
                    let inbox = self.inbox.clone();
                    tokio::spawn(async move {
                        tokio::time::sleep(delay).await;
                        post(&inbox, Input::Timer(timer));
                    });
                }
                Action::Notify(event) => self.notifier.notify(event),
            }
        }
    }

    fn attach(&mut self, generation: u64, transport: Transport) {
        let tls = transport.is_tls();
        let (read, write) = tokio::io::split(transport);
        let (outgoing, rx) = mpsc::unbounded_channel();

        let reader = tokio::spawn(read_lines(
            generation,
            FramedRead::new(read, LineFramer::new()),
            self.inbox.clone(),
        ));
        tokio::spawn(write_lines(
            generation,
            FramedWrite::new(write, LineFramer::new()),
            rx,
            self.inbox.clone(),
        ));
        debug!(generation, tls, "transport attached");

        if let Some(old) = self.link.replace(Link {
            generation,
            outgoing,
            reader,
        }) {
            old.reader.abort();
        }
    }
}

async fn read_lines(
    generation: u64,
    mut lines: FramedRead<ReadHalf<Transport>, LineFramer>,
    inbox: Inbox,
) {
    let mut dropped = 0;
    let error = loop {
        let next = lines.next().await;
        let total = lines.decoder().dropped();
        if total > dropped {
            let count = total - dropped;
            dropped = total;
            if !post(&inbox, Input::Dropped { generation, count }) {
                return;
            }
        }
        match next {
            Some(Ok(line)) => {
                if !post(&inbox, Input::Line { generation, line }) {
                    return;
                }
            }
            Some(Err(e)) => break Some(e.to_string()),
            None => break None,
        }
    };
    post(&inbox, Input::Closed { generation, error });
}

async fn write_lines(
    generation: u64,
    mut sink: FramedWrite<WriteHalf<Transport>, LineFramer>,
    mut rx: mpsc::UnboundedReceiver<Bytes>,
    inbox: Inbox,
) {
    while let Some(line) = rx.recv().await {
        if let Err(e) = sink.send(line).await {
            post(
                &inbox,
                Input::Closed {
                    generation,
                    error: Some(e.to_string()),
                },
            );
            return;
        }
    }
    if let Err(e) = sink.close().await {
        debug!(generation, error = %e, "error closing write half");
    }
}

fn split(result: Result<Vec<Action>>) -> (Result<()>, Vec<Action>) {
    match result {
        Ok(actions) => (Ok(()), actions),
        Err(e) => (Err(e), Vec::new()),
    }
}

fn now() -> i64 {
    chrono::Utc::now().timestamp()
}
