use std::net::{Shutdown, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use base64::engine::general_purpose::STANDARD as BASE64_ENGINE;
use base64::Engine as _;
use sha1::{Digest, Sha1};
use uuid::Uuid;

use crate::net::frame::{self, FrameError, MAX_FRAME_BYTES};
use crate::net::message::{ClientData, ClientHello, GameData, HelloAck, Message, PROTOCOL_VERSION};

const HANDSHAKE_GUID: &str = "1d4f5a2e-9c3b-4e6d-8a7f-2b5c9e0d3f61";
const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

/// One live message-oriented connection, client-facing or server-facing.
/// Read and write halves carry their own locks so the two relay
/// directions can share a session; close is idempotent.
pub trait MessageSession: Send + Sync {
    fn read_message(&self) -> Result<Message, FrameError>;
    fn write_message(&self, message: &Message) -> Result<(), FrameError>;
    fn close(&self);
}

pub struct Session {
    reader: Mutex<TcpStream>,
    writer: Mutex<TcpStream>,
    // Held outside the halves so close() never waits behind a blocked
    // read.
    ctrl: TcpStream,
    client: ClientData,
    game: Option<GameData>,
    closed: AtomicBool,
}

pub(crate) fn accept_digest(key: &str) -> String {
    let mut sha1 = Sha1::new();
    sha1.update(key.trim().as_bytes());
    sha1.update(HANDSHAKE_GUID.as_bytes());
    BASE64_ENGINE.encode(sha1.finalize())
}

fn read_handshake_message(stream: &mut TcpStream) -> Result<Message, String> {
    let payload = frame::read_frame(stream, MAX_FRAME_BYTES)
        .map_err(|err| format!("handshake read failed: {}", err))?;
    Message::decode(&payload).map_err(|err| format!("handshake decode failed: {}", err))
}

fn write_handshake_message(stream: &mut TcpStream, message: &Message) -> Result<(), String> {
    frame::write_frame(stream, &message.encode())
        .map_err(|err| format!("handshake write failed: {}", err))
}

impl Session {
    /// Server side of the hello exchange for an accepted inbound
    /// connection.
    pub fn accept(mut stream: TcpStream) -> Result<Self, String> {
        stream
            .set_read_timeout(Some(HANDSHAKE_TIMEOUT))
            .map_err(|err| format!("handshake timeout set failed: {}", err))?;
        let hello = match read_handshake_message(&mut stream)? {
            Message::ClientHello(hello) => hello,
            other => return Err(format!("expected client hello, got 0x{:02x}", other.id())),
        };
        if hello.protocol_version != PROTOCOL_VERSION {
            return Err(format!(
                "unsupported protocol version {}",
                hello.protocol_version
            ));
        }
        let ack = Message::HelloAck(HelloAck {
            accept: accept_digest(&hello.key),
        });
        write_handshake_message(&mut stream, &ack)?;
        stream
            .set_read_timeout(None)
            .map_err(|err| format!("handshake timeout clear failed: {}", err))?;
        Self::from_stream(stream, hello.client, None)
    }

    /// Dials the remote server, presenting the given client metadata
    /// and credential token. Completes the hello exchange and receives
    /// the game-start state.
    pub fn dial(addr: &str, client: ClientData, token: &str) -> Result<Self, String> {
        let mut stream =
            TcpStream::connect(addr).map_err(|err| format!("dial {} failed: {}", addr, err))?;
        stream
            .set_read_timeout(Some(HANDSHAKE_TIMEOUT))
            .map_err(|err| format!("handshake timeout set failed: {}", err))?;
        let key = Uuid::new_v4().to_string();
        let hello = Message::ClientHello(ClientHello {
            protocol_version: PROTOCOL_VERSION,
            key: key.clone(),
            client: client.clone(),
            token: token.to_string(),
        });
        write_handshake_message(&mut stream, &hello)?;
        match read_handshake_message(&mut stream)? {
            Message::HelloAck(ack) => {
                if ack.accept != accept_digest(&key) {
                    return Err("handshake accept digest mismatch".to_string());
                }
            }
            other => return Err(format!("expected hello ack, got 0x{:02x}", other.id())),
        }
        let game = match read_handshake_message(&mut stream)? {
            Message::StartGame(game) => game,
            other => return Err(format!("expected start game, got 0x{:02x}", other.id())),
        };
        stream
            .set_read_timeout(None)
            .map_err(|err| format!("handshake timeout clear failed: {}", err))?;
        Self::from_stream(stream, client, Some(game))
    }

    fn from_stream(
        stream: TcpStream,
        client: ClientData,
        game: Option<GameData>,
    ) -> Result<Self, String> {
        let reader = stream
            .try_clone()
            .map_err(|err| format!("session clone failed: {}", err))?;
        let writer = stream
            .try_clone()
            .map_err(|err| format!("session clone failed: {}", err))?;
        Ok(Self {
            reader: Mutex::new(reader),
            writer: Mutex::new(writer),
            ctrl: stream,
            client,
            game,
            closed: AtomicBool::new(false),
        })
    }

    pub fn client_data(&self) -> &ClientData {
        &self.client
    }

    /// Game-start state received while dialing. Absent on accepted
    /// (client-facing) sessions.
    pub fn game_data(&self) -> Option<GameData> {
        self.game.clone()
    }

    /// Inbound half of the start barrier: replays the remote server's
    /// game-start state to the client and waits for it to come up.
    pub fn start_game(&self, game: &GameData) -> Result<(), String> {
        self.write_message(&Message::StartGame(game.clone()))
            .map_err(|err| format!("start game write failed: {}", err))?;
        match self
            .read_message()
            .map_err(|err| format!("start game read failed: {}", err))?
        {
            Message::SpawnReady => {}
            other => return Err(format!("expected spawn ready, got 0x{:02x}", other.id())),
        }
        self.write_message(&Message::SpawnAck)
            .map_err(|err| format!("spawn ack write failed: {}", err))
    }

    /// Outbound half of the start barrier: announces readiness to the
    /// remote server and waits for its acknowledgement.
    pub fn complete_spawn(&self) -> Result<(), String> {
        self.write_message(&Message::SpawnReady)
            .map_err(|err| format!("spawn ready write failed: {}", err))?;
        match self
            .read_message()
            .map_err(|err| format!("spawn ack read failed: {}", err))?
        {
            Message::SpawnAck => Ok(()),
            other => Err(format!("expected spawn ack, got 0x{:02x}", other.id())),
        }
    }
}

impl MessageSession for Session {
    fn read_message(&self) -> Result<Message, FrameError> {
        let mut reader = self
            .reader
            .lock()
            .map_err(|_| FrameError::Protocol("session read lock poisoned".to_string()))?;
        let payload = frame::read_frame(&mut *reader, MAX_FRAME_BYTES)?;
        Message::decode(&payload).map_err(|err| FrameError::Protocol(err.to_string()))
    }

    fn write_message(&self, message: &Message) -> Result<(), FrameError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(FrameError::Closed);
        }
        let mut writer = self
            .writer
            .lock()
            .map_err(|_| FrameError::Protocol("session write lock poisoned".to_string()))?;
        frame::write_frame(&mut *writer, &message.encode())
    }

    fn close(&self) {
        // Second close is a no-op; shutdown of an already-gone peer is
        // not an error either.
        if !self.closed.swap(true, Ordering::SeqCst) {
            let _ = self.ctrl.shutdown(Shutdown::Both);
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::sync::mpsc::{channel, Receiver, Sender};

    /// In-memory stand-in for a TCP session: a pair of crossed mpsc
    /// channels with the same blocking and close semantics the relay
    /// loops rely on.
    pub struct PipeSession {
        tx: Mutex<Option<Sender<Message>>>,
        rx: Mutex<Receiver<Message>>,
        closed: AtomicBool,
    }

    pub fn pipe() -> (PipeSession, PipeSession) {
        let (a_tx, b_rx) = channel();
        let (b_tx, a_rx) = channel();
        (
            PipeSession {
                tx: Mutex::new(Some(a_tx)),
                rx: Mutex::new(a_rx),
                closed: AtomicBool::new(false),
            },
            PipeSession {
                tx: Mutex::new(Some(b_tx)),
                rx: Mutex::new(b_rx),
                closed: AtomicBool::new(false),
            },
        )
    }

    impl MessageSession for PipeSession {
        fn read_message(&self) -> Result<Message, FrameError> {
            let rx = self
                .rx
                .lock()
                .map_err(|_| FrameError::Protocol("pipe read lock poisoned".to_string()))?;
            rx.recv().map_err(|_| FrameError::Closed)
        }

        fn write_message(&self, message: &Message) -> Result<(), FrameError> {
            let tx = self
                .tx
                .lock()
                .map_err(|_| FrameError::Protocol("pipe write lock poisoned".to_string()))?;
            match tx.as_ref() {
                Some(tx) => tx.send(message.clone()).map_err(|_| FrameError::Closed),
                None => Err(FrameError::Closed),
            }
        }

        fn close(&self) {
            if !self.closed.swap(true, Ordering::SeqCst) {
                if let Ok(mut tx) = self.tx.lock() {
                    // Dropping the sender unblocks the peer's reader.
                    tx.take();
                }
            }
        }
    }
}
