//! Session actor. One task owns the [`MeshMessageHandler`] and feeds it incoming PDUs, write
//! completions, timer expiries and application commands. Everything else talks to it through a
//! cloneable [`MeshSessionHandle`].
use crate::address::{Address, UnicastAddress};
use crate::models::MeshMessage;
use crate::stack::bearer::{Bearer, IncomingPdu};
use crate::stack::handler::{
    CorrelationId, HandlerError, MeshMessageHandler, MeshStatusCallbacks, Notification,
};
use crate::stack::registry::{KeyStore, NodeRegistry};
use crate::stack::segments::Expiry;
use crate::stack::state::MessageState;
use crate::stack::{RecvError, SendError, TransportConfig};
use futures_core::Stream;
use futures_util::StreamExt;
use slog::Logger;
use tokio::sync::{mpsc, oneshot};

pub const COMMAND_CHANNEL_SIZE: usize = 8;

pub enum Command {
    Send {
        src: UnicastAddress,
        dst: Address,
        message: MeshMessage,
        reply: oneshot::Sender<Result<CorrelationId, HandlerError>>,
    },
    /// The bearer finished writing this PDU.
    WriteComplete(Vec<u8>),
    State {
        id: CorrelationId,
        reply: oneshot::Sender<MessageState>,
    },
    Cancel {
        id: CorrelationId,
        reply: oneshot::Sender<bool>,
    },
    CancelPeer {
        peer: UnicastAddress,
        reply: oneshot::Sender<Vec<CorrelationId>>,
    },
    Shutdown,
}

#[derive(Clone, Debug)]
pub struct MeshSessionHandle {
    sender: mpsc::Sender<Command>,
}
impl MeshSessionHandle {
    async fn request<R>(
        &self,
        command: impl FnOnce(oneshot::Sender<R>) -> Command,
    ) -> Result<R, SendError> {
        let (reply, response) = oneshot::channel();
        self.sender
            .send(command(reply))
            .await
            .map_err(|_| SendError::ChannelClosed)?;
        response.await.map_err(|_| SendError::ChannelClosed)
    }
    pub async fn send_mesh_message(
        &self,
        src: UnicastAddress,
        dst: Address,
        message: MeshMessage,
    ) -> Result<CorrelationId, HandlerError> {
        self.request(|reply| Command::Send {
            src,
            dst,
            message,
            reply,
        })
        .await?
    }
    pub async fn write_complete(&self, pdu: Vec<u8>) -> Result<(), SendError> {
        self.sender
            .send(Command::WriteComplete(pdu))
            .await
            .map_err(|_| SendError::ChannelClosed)
    }
    pub async fn message_state(&self, id: CorrelationId) -> Result<MessageState, SendError> {
        self.request(|reply| Command::State { id, reply }).await
    }
    pub async fn cancel(&self, id: CorrelationId) -> Result<bool, SendError> {
        self.request(|reply| Command::Cancel { id, reply }).await
    }
    pub async fn cancel_peer(&self, peer: UnicastAddress) -> Result<Vec<CorrelationId>, SendError> {
        self.request(|reply| Command::CancelPeer { peer, reply })
            .await
    }
    /// Stops the session. Commands already queued are dropped.
    pub async fn shutdown(&self) -> Result<(), SendError> {
        self.sender
            .send(Command::Shutdown)
            .await
            .map_err(|_| SendError::ChannelClosed)
    }
}

pub struct MeshSession<N, B, C> {
    logger: Logger,
    handler: MeshMessageHandler<N, B, C>,
    commands: mpsc::Receiver<Command>,
    expiries: mpsc::UnboundedReceiver<Expiry>,
}
impl<N, B, C> MeshSession<N, B, C>
where
    N: NodeRegistry + KeyStore,
    B: Bearer,
    C: MeshStatusCallbacks,
{
    pub fn new(
        parent_logger: &Logger,
        config: TransportConfig,
        network: N,
        bearer: B,
        callbacks: C,
    ) -> (Self, MeshSessionHandle) {
        let logger = parent_logger.new(o!("component" => "session"));
        let (handler, expiries) =
            MeshMessageHandler::new(&logger, config, network, bearer, callbacks);
        let (sender, commands) = mpsc::channel(COMMAND_CHANNEL_SIZE);
        (
            Self {
                logger,
                handler,
                commands,
                expiries,
            },
            MeshSessionHandle { sender },
        )
    }
    pub fn handler(&self) -> &MeshMessageHandler<N, B, C> {
        &self.handler
    }
    /// Runs until [`MeshSessionHandle::shutdown`] or until every handle is dropped. Hands the
    /// handler back so the network state (sequence numbers especially) can be saved.
    pub async fn run<S: Stream<Item = IncomingPdu>>(self, incoming: S) -> MeshMessageHandler<N, B, C> {
        let MeshSession {
            logger,
            mut handler,
            mut commands,
            mut expiries,
        } = self;
        futures_util::pin_mut!(incoming);
        let mut bearer_open = true;
        debug!(logger, "session started");
        loop {
            tokio::select! {
                command = commands.recv() => match command {
                    Some(Command::Shutdown) | None => break,
                    Some(command) => handle_command(&mut handler, command),
                },
                pdu = incoming.next(), if bearer_open => match pdu {
                    Some(pdu) => handle_incoming(&logger, &mut handler, &pdu),
                    None => {
                        debug!(logger, "bearer closed");
                        bearer_open = false;
                    }
                },
                Some(expiry) = expiries.recv() => {
                    if let Err(e) = handler.on_timer_expired(expiry) {
                        warn!(logger, "timer handling failed"; "error" => %e);
                    }
                }
            }
        }
        debug!(logger, "session stopped"; "in_flight" => handler.in_flight_count());
        handler
    }
}

fn handle_command<N, B, C>(handler: &mut MeshMessageHandler<N, B, C>, command: Command)
where
    N: NodeRegistry + KeyStore,
    B: Bearer,
    C: MeshStatusCallbacks,
{
    // The requester may have given up. Dropped replies are fine.
    match command {
        Command::Send {
            src,
            dst,
            message,
            reply,
        } => {
            let _ = reply.send(handler.send_mesh_message(src, dst, message));
        }
        Command::WriteComplete(pdu) => handler.handle_write_callback(&pdu),
        Command::State { id, reply } => {
            let _ = reply.send(handler.message_state(&id));
        }
        Command::Cancel { id, reply } => {
            let _ = reply.send(handler.cancel(&id));
        }
        Command::CancelPeer { peer, reply } => {
            let _ = reply.send(handler.cancel_peer(peer));
        }
        Command::Shutdown => (),
    }
}

fn handle_incoming<N, B, C>(logger: &Logger, handler: &mut MeshMessageHandler<N, B, C>, pdu: &IncomingPdu)
where
    N: NodeRegistry + KeyStore,
    B: Bearer,
    C: MeshStatusCallbacks,
{
    match handler.parse_notification(&pdu.pdu, pdu.pdu_type) {
        Ok(Notification::Status { src, .. }) => trace!(logger, "status"; "src" => %src),
        Ok(_) => (),
        // Traffic for other networks and our own relayed PDUs end up here all the time.
        Err(HandlerError::Recv(RecvError::Network(e))) => {
            trace!(logger, "not for us"; "error" => %e)
        }
        Err(HandlerError::Recv(RecvError::OldSeq)) => trace!(logger, "replayed PDU"),
        Err(e) => warn!(logger, "incoming PDU dropped"; "error" => %e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mesh::{AppKeyIndex, TTL};
    use crate::models::generic::{opcodes, OnOffMessage, OnOffStatus};
    use crate::models::{ModelMessage, StatusMessage};
    use crate::stack::bearer::OutgoingPdu;
    use crate::stack::handler::StatusEvent;
    use crate::stack::testing::{self, NODE, PROVISIONER};
    use crate::stack::transport::MeshTransport;
    use crate::upper::SecurityKey;

    #[tokio::test]
    async fn test_session_round_trip() {
        let (local, peer) = testing::networks();
        let (bearer, mut written) = mpsc::unbounded_channel::<OutgoingPdu>();
        let (callbacks, mut events) = mpsc::unbounded_channel();
        let (incoming_tx, incoming_rx) = mpsc::unbounded_channel::<IncomingPdu>();
        let incoming = futures_util::stream::unfold(incoming_rx, |mut rx| async move {
            rx.recv().await.map(|pdu| (pdu, rx))
        });
        let (session, handle) = MeshSession::new(
            &testing::logger(),
            TransportConfig::default(),
            local,
            bearer,
            callbacks,
        );
        let task = tokio::spawn(session.run(incoming));

        let id = handle
            .send_mesh_message(
                PROVISIONER,
                NODE.into(),
                MeshMessage::generic(AppKeyIndex(0), ModelMessage::OnOff(OnOffMessage::Get)),
            )
            .await
            .unwrap();
        let pdu = written.recv().await.unwrap();
        assert_eq!(pdu.dst, Address::from(NODE));
        handle.write_complete(pdu.pdu).await.unwrap();
        assert_eq!(
            handle.message_state(id).await.unwrap(),
            MessageState::GenericOnOffGet
        );
        assert!(matches!(
            events.recv().await.unwrap(),
            StatusEvent::Processed { .. }
        ));

        let status = MeshTransport::new(&testing::logger(), TransportConfig::default())
            .create_mesh_message(
                &peer,
                NODE,
                PROVISIONER.into(),
                TTL::DEFAULT,
                &SecurityKey::Application(testing::app_key()),
                false,
                opcodes::ON_OFF_STATUS,
                &[0x01],
            )
            .unwrap();
        incoming_tx
            .send(IncomingPdu::network(status.network_pdus[&0].pdu.clone()))
            .unwrap();
        assert_eq!(
            events.recv().await.unwrap(),
            StatusEvent::Received {
                src: NODE,
                status: StatusMessage::OnOff(OnOffStatus {
                    present: true,
                    target: None
                }),
                correlation: Some(id),
            }
        );
        assert_eq!(
            handle.message_state(id).await.unwrap(),
            MessageState::NoOperation
        );

        handle.shutdown().await.unwrap();
        let handler = task.await.unwrap();
        assert_eq!(handler.in_flight_count(), 0);
        assert_eq!(
            handle.cancel(id).await,
            Err(SendError::ChannelClosed)
        );
    }
    #[tokio::test]
    async fn test_unknown_correlation_cancel() {
        let (local, _) = testing::networks();
        let (session, handle) = MeshSession::new(
            &testing::logger(),
            TransportConfig::default(),
            local,
            Vec::<OutgoingPdu>::new(),
            (),
        );
        let task = tokio::spawn(session.run(futures_util::stream::empty::<IncomingPdu>()));
        let id = handle
            .send_mesh_message(
                PROVISIONER,
                NODE.into(),
                MeshMessage::generic(AppKeyIndex(0), ModelMessage::OnOff(OnOffMessage::Get)),
            )
            .await
            .unwrap();
        assert!(handle.cancel(id).await.unwrap());
        assert!(!handle.cancel(id).await.unwrap());
        assert!(handle.cancel_peer(NODE).await.unwrap().is_empty());
        drop(handle);
        let handler = task.await.unwrap();
        assert_eq!(handler.bearer().len(), 1);
    }
}
