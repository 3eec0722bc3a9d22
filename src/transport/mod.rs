// Line-based TCP transport for chatterbox-relay
// One task per connection: handshake, connect, frames in order, disconnect.

use anyhow::Result;
use log::{debug, error, info, warn};
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

pub mod framing;
pub mod hub;
pub mod protocol;

pub use framing::FrameReader;
pub use hub::SessionHub;
pub use protocol::{ClientFrame, ProtocolError, MAX_FRAME_BYTES};

use crate::models::{Identity, ServerEvent, SessionHandle};
use crate::realtime::TypingSignal;
use crate::service::{ChatError, ChatService, OutgoingMessage};

#[derive(Clone)]
pub struct LineServer {
    service: ChatService,
    sessions: Arc<SessionHub>,
    max_frame_bytes: usize,
}

impl LineServer {
    /// `sessions` must be the notifier the service's hub was built with.
    pub fn new(service: ChatService, sessions: Arc<SessionHub>) -> Self {
        Self {
            service,
            sessions,
            max_frame_bytes: MAX_FRAME_BYTES,
        }
    }

    pub fn with_max_frame_bytes(mut self, max_frame_bytes: usize) -> Self {
        self.max_frame_bytes = max_frame_bytes;
        self
    }

    /// Accept connections until the listener fails.
    pub async fn run(self, listener: TcpListener) -> Result<()> {
        info!("Listening on {}", listener.local_addr()?);
        loop {
            let (stream, addr) = listener.accept().await?;
            debug!("Accepted connection from {}", addr);
            let server = self.clone();
            tokio::spawn(async move {
                if let Err(e) = server.handle_connection(stream).await {
                    warn!("Connection from {} ended with error: {}", addr, e);
                }
            });
        }
    }

    async fn handle_connection(&self, stream: TcpStream) -> Result<()> {
        let (read_half, write_half) = stream.into_split();
        self.serve(read_half, write_half).await
    }

    /// Drive one connection over any byte stream pair.
    pub async fn serve<R, W>(&self, reader: R, mut writer: W) -> Result<()>
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let mut frames = FrameReader::new(reader, self.max_frame_bytes);
        let first = frames.next_frame().await?.ok_or(ProtocolError::NoHandshake)?;
        let identity = match first.and_then(|line| protocol::parse_handshake(&line)) {
            Ok(identity) => identity,
            Err(e) => {
                let reply = protocol::encode_event(&ServerEvent::Error { message: e.to_string() })?;
                if let Err(write_err) = writer.write_all(reply.as_bytes()).await {
                    debug!("Could not report rejected handshake: {}", write_err);
                }
                return Err(e.into());
            }
        };

        let session = SessionHandle::new();
        let mut events = self.sessions.attach(session);
        let writer_task = tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                let line = match protocol::encode_event(&event) {
                    Ok(line) => line,
                    Err(e) => {
                        error!("Failed to encode event: {}", e);
                        continue;
                    }
                };
                if let Err(e) = writer.write_all(line.as_bytes()).await {
                    debug!("Writer for session {} stopped: {}", session, e);
                    break;
                }
            }
        });

        self.service.hub().connect(identity.clone(), session);
        let result = self.read_frames(&identity, session, &mut frames).await;
        self.service.hub().disconnect(&identity, session);
        self.sessions.detach(session);

        if let Err(e) = writer_task.await {
            error!("Writer task for session {} failed: {}", session, e);
        }
        result
    }

    async fn read_frames<R>(
        &self,
        identity: &Identity,
        session: SessionHandle,
        frames: &mut FrameReader<R>,
    ) -> Result<()>
    where
        R: AsyncRead + Unpin,
    {
        while let Some(line) = frames.next_frame().await? {
            let frame = match line {
                Ok(line) if line.trim().is_empty() => continue,
                Ok(line) => protocol::parse_frame(&line),
                Err(e) => Err(e),
            };
            match frame {
                Ok(frame) => self.dispatch(identity, session, frame).await,
                Err(e) => {
                    warn!("Bad frame from {}: {}", identity, e);
                    self.service
                        .hub()
                        .notify_session(session, ServerEvent::Error { message: e.to_string() });
                }
            }
        }
        Ok(())
    }

    async fn dispatch(&self, identity: &Identity, session: SessionHandle, frame: ClientFrame) {
        let reply: Result<Option<ServerEvent>, ChatError> = match frame {
            ClientFrame::Typing { to, is_typing } => {
                let signal = TypingSignal {
                    from: identity.clone(),
                    to,
                    is_typing,
                };
                self.service.hub().relay_typing_signal(&signal);
                Ok(None)
            }
            ClientFrame::MessageStatus { message_id, status, receiver } => {
                self.service.hub().relay_status_update(&message_id, status, &receiver);
                Ok(None)
            }
            ClientFrame::SendMessage { to, text, image } => self
                .service
                .send_message(identity, &to, OutgoingMessage { text, image })
                .await
                .map(|message| Some(ServerEvent::MessageSent(message))),
            ClientFrame::FetchHistory { peer } => self
                .service
                .fetch_history(identity, &peer)
                .await
                .map(|messages| Some(ServerEvent::History { peer, messages })),
            ClientFrame::ListPeers => self
                .service
                .list_peers(identity)
                .await
                .map(|peers| Some(ServerEvent::Peers(peers))),
            ClientFrame::ClearChat { peer } => self
                .service
                .clear_chat(identity, &peer)
                .await
                .map(|removed| Some(ServerEvent::ChatCleared { peer, removed })),
            ClientFrame::DeleteMessage { peer, message_id } => self
                .service
                .delete_message(identity, &peer, &message_id)
                .await
                .map(|()| Some(ServerEvent::MessageDeleted { message_id })),
        };

        match reply {
            Ok(Some(event)) => self.service.hub().notify_session(session, event),
            Ok(None) => {}
            Err(e) => {
                warn!("Request from {} failed: {}", identity, e);
                self.service
                    .hub()
                    .notify_session(session, ServerEvent::Error { message: e.to_string() });
            }
        }
    }
}
