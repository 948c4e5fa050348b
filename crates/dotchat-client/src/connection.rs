use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::{debug, info, warn};

use dotchat_types::{Envelope, MediaKind};

use crate::error::ClientError;
use crate::protocol::{ClientEvent, ClientState};

type Ws = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Rendering callback supplied by the hosting UI.
pub trait Renderer {
    fn render(&mut self, event: ClientEvent);
}

impl<F: FnMut(ClientEvent)> Renderer for F {
    fn render(&mut self, event: ClientEvent) {
        self(event)
    }
}

/// What the UI asks the client to do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Text(String),
    Media {
        media_type: MediaKind,
        /// Base64 content.
        data: String,
        file_name: Option<String>,
    },
    Quit,
}

/// One live connection to a relay plus the protocol state driving it.
pub struct ChatClient {
    state: ClientState,
    ws: Ws,
    closed: bool,
}

impl ChatClient {
    /// Connect to `url` and send the greeting (`presence:join`, then
    /// `crypto:pubkey`).
    pub async fn connect(url: &str, state: ClientState) -> Result<Self, ClientError> {
        let (ws, _) = connect_async(url).await.map_err(|e| ClientError::Connect {
            url: url.to_string(),
            source: Box::new(e),
        })?;
        info!("connected to {}", url);

        let mut client = Self {
            state,
            ws,
            closed: false,
        };
        for envelope in client.state.greeting() {
            client.send_envelope(&envelope).await?;
        }
        Ok(client)
    }

    pub fn state(&self) -> &ClientState {
        &self.state
    }

    /// Send a chat message, sealed when a peer key is known. Returns the
    /// envelope that went out.
    pub async fn send_text(&mut self, text: &str) -> Result<Envelope, ClientError> {
        let envelope = self.state.compose_message(text)?;
        self.send_envelope(&envelope).await?;
        Ok(envelope)
    }

    pub async fn send_media(
        &mut self,
        media_type: MediaKind,
        data: &str,
        file_name: Option<String>,
    ) -> Result<Envelope, ClientError> {
        let envelope = self.state.compose_media(media_type, data, file_name)?;
        self.send_envelope(&envelope).await?;
        Ok(envelope)
    }

    async fn send_envelope(&mut self, envelope: &Envelope) -> Result<(), ClientError> {
        debug!("sending {}", envelope.kind());
        self.ws.send(Message::Text(envelope.to_json().into())).await?;
        Ok(())
    }

    /// Wait for the next frame that produces something to render.
    /// Returns `None` once the connection has ended.
    pub async fn next_event(&mut self) -> Option<ClientEvent> {
        if self.closed {
            return None;
        }
        while let Some(frame) = self.ws.next().await {
            let text = match frame {
                Ok(Message::Text(text)) => text.as_str().to_string(),
                Ok(Message::Binary(data)) => String::from_utf8_lossy(&data).into_owned(),
                Ok(Message::Close(_)) => break,
                Ok(_) => continue,
                Err(e) => {
                    warn!("connection error: {}", e);
                    break;
                }
            };
            if let Some(event) = self.state.handle_frame(&text) {
                return Some(event);
            }
        }
        self.closed = true;
        None
    }

    /// Close the connection. Closing twice is a no-op.
    pub async fn close(&mut self) -> Result<(), ClientError> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        match self.ws.close(None).await {
            Ok(()) | Err(tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// Drive `client` until the relay disconnects or the UI sends
/// [`Command::Quit`]. Own messages are rendered locally since their echoes
/// are dropped. A message that cannot be sent is reported and the loop
/// keeps going; a dead connection still ends it through the read side.
pub async fn run(
    mut client: ChatClient,
    mut commands: mpsc::UnboundedReceiver<Command>,
    renderer: &mut impl Renderer,
) -> Result<(), ClientError> {
    loop {
        tokio::select! {
            event = client.next_event() => match event {
                Some(event) => renderer.render(event),
                None => {
                    renderer.render(ClientEvent::Disconnected);
                    return Ok(());
                }
            },
            command = commands.recv() => match command {
                Some(Command::Text(text)) => match client.send_text(&text).await {
                    Ok(envelope) => renderer.render(ClientEvent::Message {
                        name: client.state().display_name(),
                        text,
                        encrypted: envelope.kind() == "message:e2e",
                    }),
                    Err(e) => send_failed(renderer, e),
                },
                Some(Command::Media { media_type, data, file_name }) => {
                    match client.send_media(media_type, &data, file_name.clone()).await {
                        Ok(envelope) => renderer.render(ClientEvent::Media {
                            name: client.state().display_name(),
                            media_type,
                            data,
                            file_name,
                            encrypted: envelope.kind() == "media:e2e",
                        }),
                        Err(e) => send_failed(renderer, e),
                    }
                }
                Some(Command::Quit) | None => {
                    client.close().await?;
                    renderer.render(ClientEvent::Disconnected);
                    return Ok(());
                }
            },
        }
    }
}

fn send_failed(renderer: &mut impl Renderer, error: ClientError) {
    warn!("send failed: {}", error);
    renderer.render(ClientEvent::SendFailed {
        reason: error.to_string(),
    });
}
