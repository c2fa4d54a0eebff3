//! Remote control of the engine.
//!
//! Requests arrive as [`RemoteCommand`]s on the engine queue and are answered
//! with JSON values over a per-request reply channel. The bundled adapter reads
//! one request per line from stdin and never waits on an answer; replies and
//! notifications are printed to stdout as they arrive:
//!
//! ```text
//! status            -> {"playing": "song.wav"}
//! list              -> [{"title": ..., "filename": ...}, ...]
//! play <file>       -> {"confirm": true} once the song starts
//! stop              -> halt after the current song
//! stop now          -> halt immediately
//! connect           -> only play queued songs
//! disconnect        -> play random songs whenever idle
//! quit
//! ```

use std::io::{self, BufRead};
use std::thread;

use crossbeam_channel::{bounded, unbounded, Receiver, RecvError, Select, Sender};
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use crate::engine::EngineEvent;
use crate::error::Result;

/// Requests handled by the engine loop
#[derive(Debug, Clone)]
pub enum RemoteCommand {
    /// Reply with the file currently playing, or "none"
    GetStatus { reply: Sender<Value> },
    /// Reply with the full playlist
    ListSongs { reply: Sender<Value> },
    /// Queue a song to play next; confirmed once it starts
    PlayNext { song: String, reply: Sender<Value> },
    /// Halt playback, now or after the current song
    Stop { immediately: bool },
}

/// Messages the engine pushes to the remote side unprompted
#[derive(Debug, Clone, PartialEq)]
pub enum Notification {
    SongFinished { song: String },
}

impl Notification {
    pub fn to_json(&self) -> Value {
        match self {
            Self::SongFinished { song } => json!({ "event": "song finished", "song": song }),
        }
    }
}

/// One parsed line of the text protocol
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    Status,
    List,
    Play(String),
    Stop { immediately: bool },
    Connect,
    Disconnect,
    Quit,
}

impl Request {
    /// Parse a protocol line; `None` for blank or unknown input
    pub fn parse(line: &str) -> Option<Self> {
        let line = line.trim();
        let (verb, rest) = match line.split_once(char::is_whitespace) {
            Some((verb, rest)) => (verb, rest.trim()),
            None => (line, ""),
        };

        match (verb.to_ascii_lowercase().as_str(), rest) {
            ("status", "") => Some(Self::Status),
            ("list", "") => Some(Self::List),
            ("play", song) if !song.is_empty() => Some(Self::Play(song.to_string())),
            ("stop", "") => Some(Self::Stop { immediately: false }),
            ("stop", "now") | ("stop", "immediately") => Some(Self::Stop { immediately: true }),
            ("connect", "") => Some(Self::Connect),
            ("disconnect", "") => Some(Self::Disconnect),
            ("quit", "") | ("exit", "") => Some(Self::Quit),
            _ => None,
        }
    }

    /// Engine event for this request, plus the reply receiver if one is expected
    pub fn into_event(self) -> (EngineEvent, Option<Receiver<Value>>) {
        let (reply, answer) = bounded(1);
        match self {
            Self::Status => (
                EngineEvent::Remote(RemoteCommand::GetStatus { reply }),
                Some(answer),
            ),
            Self::List => (
                EngineEvent::Remote(RemoteCommand::ListSongs { reply }),
                Some(answer),
            ),
            Self::Play(song) => (
                EngineEvent::Remote(RemoteCommand::PlayNext { song, reply }),
                Some(answer),
            ),
            Self::Stop { immediately } => {
                (EngineEvent::Remote(RemoteCommand::Stop { immediately }), None)
            }
            Self::Connect => (EngineEvent::Link { connected: true }, None),
            Self::Disconnect => (EngineEvent::Link { connected: false }, None),
            Self::Quit => (EngineEvent::Shutdown, None),
        }
    }
}

/// One ready operation of the output loop
enum Ready {
    Notice(std::result::Result<Notification, RecvError>),
    Pending(std::result::Result<Receiver<Value>, RecvError>),
    Reply(usize, std::result::Result<Value, RecvError>),
}

/// Emit notifications and request replies in arrival order.
///
/// `pending` carries the reply receiver of each request sent to the engine;
/// each is answered at most once, whenever the engine gets to it. Returns once
/// both input channels are closed and no reply is outstanding.
pub fn pump_output(
    notices: Receiver<Notification>,
    pending: Receiver<Receiver<Value>>,
    mut emit: impl FnMut(Value),
) {
    let mut waiting: Vec<Receiver<Value>> = Vec::new();
    let mut notices_open = true;
    let mut pending_open = true;

    while notices_open || pending_open || !waiting.is_empty() {
        let ready = {
            let mut select = Select::new();
            let notice_op = notices_open.then(|| select.recv(&notices));
            let pending_op = pending_open.then(|| select.recv(&pending));
            let reply_ops: Vec<usize> = waiting.iter().map(|r| select.recv(r)).collect();

            let op = select.select();
            let index = op.index();
            if Some(index) == notice_op {
                Ready::Notice(op.recv(&notices))
            } else if Some(index) == pending_op {
                Ready::Pending(op.recv(&pending))
            } else {
                match reply_ops.iter().position(|&i| i == index) {
                    Some(slot) => Ready::Reply(slot, op.recv(&waiting[slot])),
                    None => continue,
                }
            }
        };

        match ready {
            Ready::Notice(Ok(notice)) => emit(notice.to_json()),
            Ready::Notice(Err(_)) => notices_open = false,
            Ready::Pending(Ok(answer)) => waiting.push(answer),
            Ready::Pending(Err(_)) => pending_open = false,
            Ready::Reply(slot, result) => {
                waiting.swap_remove(slot);
                match result {
                    Ok(value) => emit(value),
                    Err(_) => debug!("Request dropped without a reply"),
                }
            }
        }
    }
}

/// Start the stdin adapter. Returns the sender the engine should push
/// notifications into.
pub fn spawn_stdin_remote(events: Sender<EngineEvent>) -> Result<Sender<Notification>> {
    let (notify_tx, notify_rx) = unbounded::<Notification>();
    let (pending_tx, pending_rx) = unbounded::<Receiver<Value>>();

    thread::Builder::new()
        .name("remote-output".to_string())
        .spawn(move || pump_output(notify_rx, pending_rx, |value| println!("{}", value)))?;

    thread::Builder::new()
        .name("remote-stdin".to_string())
        .spawn(move || {
            info!("Remote control listening on stdin");
            for line in io::stdin().lock().lines() {
                let line = match line {
                    Ok(line) => line,
                    Err(e) => {
                        warn!("Remote input failed: {}", e);
                        break;
                    }
                };
                if line.trim().is_empty() {
                    continue;
                }
                let Some(request) = Request::parse(&line) else {
                    warn!("Unknown remote command: {:?}", line.trim());
                    continue;
                };

                let quit = request == Request::Quit;
                let (event, answer) = request.into_event();
                if let Some(answer) = answer {
                    let _ = pending_tx.send(answer);
                }
                if events.send(event).is_err() || quit {
                    break;
                }
            }
            debug!("Remote input closed");
        })?;

    Ok(notify_tx)
}
