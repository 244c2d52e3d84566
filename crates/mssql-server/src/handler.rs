//! Per-connection protocol handling.
//!
//! A connection goes through PRELOGIN, LOGIN7 and then a loop of SQL
//! batches, RPC requests and attention signals. Requests are handled one at
//! a time; the next message is read only after the previous response has
//! been written.

use std::net::SocketAddr;
use std::sync::Arc;

use bytes::Bytes;
use mssql_codec::Connection;
use mssql_engine::{BatchError, BatchOutcome, Catalog, EngineError, LoginInfo, Session};
use tds_protocol::token::{EnvChange, EnvChangeType};
use tds_protocol::{
    DEFAULT_PACKET_SIZE, Done, Login7, LoginAck, PacketType, PreLogin, ResultSetEncoder,
    RpcRequest, decode_sql_batch,
};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::broadcast;

use crate::config::ServerConfig;
use crate::error::{Result, ServerError};
use crate::response::{error_message, rpc_argument, write_outcome};

/// Smallest packet size a client may negotiate.
const MIN_PACKET_SIZE: usize = 512;

/// Serves one client connection.
pub struct ConnectionHandler<T>
where
    T: AsyncRead + AsyncWrite,
{
    conn: Connection<T>,
    peer: SocketAddr,
    spid: u16,
    config: Arc<ServerConfig>,
    catalog: Arc<Catalog>,
}

impl<T> ConnectionHandler<T>
where
    T: AsyncRead + AsyncWrite + Send + 'static,
{
    /// Wrap an accepted transport.
    pub fn new(
        transport: T,
        peer: SocketAddr,
        spid: u16,
        config: Arc<ServerConfig>,
        catalog: Arc<Catalog>,
    ) -> Self {
        let mut conn = Connection::with_packet_size(transport, DEFAULT_PACKET_SIZE)
            .with_max_message_size(config.max_message_size);
        conn.set_spid(spid);
        Self {
            conn,
            peer,
            spid,
            config,
            catalog,
        }
    }

    /// Run the connection until the client leaves or the server shuts down.
    pub async fn run(mut self, mut shutdown: broadcast::Receiver<()>) -> Result<()> {
        let login = self.handshake().await?;
        let Some(session) = self.login(login).await? else {
            return Ok(());
        };
        let (peer, spid) = (self.peer, self.spid);
        tokio::select! {
            result = self.serve(session) => result,
            _ = shutdown.recv() => {
                tracing::debug!(peer = %peer, spid, "closing connection for shutdown");
                Ok(())
            }
        }
    }

    async fn read_handshake(&mut self, stage: &'static str, expected: PacketType) -> Result<Bytes> {
        let message = self
            .conn
            .read_message()
            .await?
            .ok_or(ServerError::ClosedDuringHandshake(stage))?;
        if message.packet_type != expected {
            return Err(ServerError::UnexpectedPacket {
                expected: stage,
                actual: message.packet_type,
            });
        }
        Ok(message.payload)
    }

    /// PRELOGIN exchange followed by reading LOGIN7.
    async fn handshake(&mut self) -> Result<Login7> {
        let payload = self.read_handshake("PRELOGIN", PacketType::PreLogin).await?;
        let request = PreLogin::decode(&payload)?;
        let response = PreLogin::response(
            &request,
            self.config.server_version,
            self.config.encryption,
            self.config.instance_name.as_str(),
        );
        tracing::debug!(
            peer = %self.peer,
            client_version = %request.version,
            requested = ?request.encryption,
            encryption = ?response.encryption,
            "pre-login"
        );
        self.conn
            .send_message(PacketType::TabularResult, response.encode())
            .await?;

        let payload = self.read_handshake("LOGIN7", PacketType::Login).await?;
        let login = Login7::decode(&payload)?;
        tracing::debug!(
            peer = %self.peer,
            tds_version = %login.tds_version,
            user = %login.username,
            application = %login.app_name,
            packet_size = login.packet_size,
            "login"
        );
        Ok(login)
    }

    /// Open the session and answer LOGIN7.
    ///
    /// Credentials are not checked. A login naming an unknown database gets
    /// an ERROR token and the connection ends.
    async fn login(&mut self, login: Login7) -> Result<Option<Session>> {
        let info = LoginInfo {
            user: login.username.clone(),
            application: login.app_name.clone(),
            host: login.hostname.clone(),
            database: Some(
                login
                    .requested_database()
                    .unwrap_or(self.config.default_database.as_str())
                    .to_owned(),
            ),
        };
        let spid = self.spid;
        let catalog = self.catalog.clone();
        let executor_config = self.config.executor_config();
        let opened = tokio::task::spawn_blocking(move || {
            Session::open(spid, catalog, info, executor_config)
        })
        .await
        .map_err(|e| ServerError::TaskFailed(e.to_string()))?;

        let mut enc = ResultSetEncoder::new();
        let session = match opened {
            Ok(session) => session,
            Err(err) => {
                tracing::warn!(peer = %self.peer, error = %err, "login rejected");
                enc.error(&error_message(&err, &self.config.server_name));
                enc.done(Done::error());
                self.conn
                    .send_message(PacketType::TabularResult, enc.finish())
                    .await?;
                return Ok(None);
            }
        };

        let packet_size = negotiate_packet_size(login.packet_size, self.config.max_packet_size);
        enc.login_ack(&LoginAck::new(
            self.config.tds_version,
            self.config.server_version,
        ));
        enc.env_change(&EnvChange::new(
            EnvChangeType::Database,
            session.database(),
            "",
        ));
        enc.env_change(&EnvChange::new(
            EnvChangeType::PacketSize,
            packet_size.to_string(),
            DEFAULT_PACKET_SIZE.to_string(),
        ));
        enc.done(Done::default());
        self.conn
            .send_message(PacketType::TabularResult, enc.finish())
            .await?;
        self.conn.set_packet_size(packet_size);

        tracing::info!(
            peer = %self.peer,
            spid = self.spid,
            user = %session.login().user,
            database = %session.database(),
            "client logged in"
        );
        Ok(Some(session))
    }

    async fn serve(&mut self, mut session: Session) -> Result<()> {
        loop {
            let Some(message) = self.conn.read_message().await? else {
                tracing::debug!(peer = %self.peer, spid = self.spid, "client disconnected");
                return Ok(());
            };

            let request = match message.packet_type {
                PacketType::SqlBatch => Request::Batch(decode_sql_batch(&message.payload)?),
                PacketType::Rpc => Request::Rpc(RpcRequest::decode(&message.payload)?),
                PacketType::Attention => {
                    tracing::debug!(spid = self.spid, "attention");
                    let mut enc = ResultSetEncoder::new();
                    enc.done(Done::attention());
                    self.conn
                        .send_message(PacketType::TabularResult, enc.finish())
                        .await?;
                    continue;
                }
                other => {
                    tracing::warn!(peer = %self.peer, packet_type = ?other, "ignoring unexpected packet");
                    continue;
                }
            };

            let database = session.database().to_owned();
            let (returned, outcome) = tokio::task::spawn_blocking(move || {
                let outcome = request.execute(&mut session);
                (session, outcome)
            })
            .await
            .map_err(|e| ServerError::TaskFailed(e.to_string()))?;
            session = returned;

            let mut enc = ResultSetEncoder::new();
            if session.database() != database {
                enc.env_change(&EnvChange::new(
                    EnvChangeType::Database,
                    session.database(),
                    database,
                ));
            }
            write_outcome(&mut enc, &outcome, &self.config.server_name);
            self.conn
                .send_message(PacketType::TabularResult, enc.finish())
                .await?;
        }
    }
}

enum Request {
    Batch(String),
    Rpc(RpcRequest),
}

impl Request {
    fn execute(self, session: &mut Session) -> BatchOutcome {
        match self {
            Self::Batch(sql) => session.execute_batch(&sql),
            Self::Rpc(request) => match request.target() {
                Some((name, params)) => {
                    let args: Vec<_> = params.iter().map(rpc_argument).collect();
                    session.execute_rpc(name, &args)
                }
                None => BatchOutcome {
                    results: Vec::new(),
                    error: Some(EngineError::Batch(BatchError::Syntax {
                        near: "RPC".to_owned(),
                        reason: "no procedure name".to_owned(),
                    })),
                },
            },
        }
    }
}

/// Packet size for the rest of the connection.
///
/// The client's request wins when it is within `512..=max`; zero or an
/// out-of-range value falls back to the limit.
fn negotiate_packet_size(requested: u32, max: usize) -> usize {
    let requested = usize::try_from(requested).unwrap_or(usize::MAX);
    if (MIN_PACKET_SIZE..=max).contains(&requested) {
        requested
    } else {
        max
    }
}
