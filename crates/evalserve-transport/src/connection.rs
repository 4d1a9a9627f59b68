//! Per-connection command loop.

use std::{io, net::SocketAddr, sync::Arc};

use evalserve_session::{Action, Command, Dispatcher, Frame};
use tokio::{
    io::{AsyncBufReadExt, BufReader},
    net::TcpStream,
};
use tokio_util::sync::CancellationToken;
use tracing::Instrument;
use uuid::Uuid;

use crate::protocol::write_frames;

/// Shared state handed to every connection.
#[derive(Clone)]
pub struct ConnectionContext {
    pub dispatcher: Dispatcher,
    pub greeting: Arc<str>,
    pub shutdown: CancellationToken,
}

/// Serve one client until it leaves, the transport fails or the server
/// shuts down. Never returns an error: faults are logged and end only this
/// connection.
pub async fn handle_connection(stream: TcpStream, peer: SocketAddr, ctx: ConnectionContext) {
    let span = tracing::info_span!("connection", client = %peer, id = %Uuid::new_v4());

    async move {
        match serve(stream, &ctx).await {
            Ok(()) => tracing::info!("Client disconnected"),
            Err(e) if is_connection_lost(&e) => {
                tracing::warn!("Client connection lost: {e}");
            }
            Err(e) => tracing::error!("An error occurred: {e}"),
        }
    }
    .instrument(span)
    .await;
}

async fn serve(stream: TcpStream, ctx: &ConnectionContext) -> io::Result<()> {
    let (reader, mut writer) = stream.into_split();
    let mut reader = BufReader::new(reader);

    write_frames(&mut writer, &[Frame::Line(ctx.greeting.to_string())]).await?;
    tracing::info!("Client connected and sent greeting");

    let mut line = String::new();
    loop {
        line.clear();
        let read = tokio::select! {
            biased;
            () = ctx.shutdown.cancelled() => {
                tracing::info!("Server stopping, closing connection");
                return Ok(());
            }
            read = reader.read_line(&mut line) => read?,
        };
        if read == 0 {
            return Ok(());
        }

        let Some(command) = Command::parse(&line) else {
            return Ok(());
        };
        tracing::info!("Received command: '{}'", line.trim());

        let reply = ctx.dispatcher.dispatch(command).await;
        write_frames(&mut writer, &reply.frames).await?;

        match reply.action {
            Action::Continue => {}
            Action::Exit => return Ok(()),
            Action::Shutdown => {
                ctx.shutdown.cancel();
                return Ok(());
            }
        }
    }
}

fn is_connection_lost(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::BrokenPipe
            | io::ErrorKind::UnexpectedEof
    )
}
