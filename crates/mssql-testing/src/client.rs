//! A minimal TDS client for driving the server in tests.
//!
//! It speaks just enough of the protocol to log in and send requests, and
//! hands back the decoded token stream so tests can assert on exactly what
//! went over the wire.

use std::net::SocketAddr;

use bytes::Bytes;
use mssql_codec::{CodecError, Connection};
use tds_protocol::token::EnvChange;
use tds_protocol::{
    ColumnMeta, DEFAULT_PACKET_SIZE, Done, Login7, LoginAck, PacketType, PreLogin,
    ProtocolError, RpcRequest, ServerMessage, Token, TokenParser, encode_sql_batch,
};
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;

/// Errors raised by [`TestClient`].
#[derive(Debug, Error)]
pub enum TestClientError {
    /// Framing failed.
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),

    /// A response could not be decoded.
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// Connecting failed.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// The server closed the connection instead of answering.
    #[error("connection closed by server")]
    Closed,

    /// The server answered with something other than a tabular result.
    #[error("unexpected response packet type {0:?}")]
    UnexpectedPacket(PacketType),
}

/// Result type for test client operations.
pub type Result<T> = std::result::Result<T, TestClientError>;

/// Raw TDS client.
pub struct TestClient<T = TcpStream>
where
    T: AsyncRead + AsyncWrite,
{
    conn: Connection<T>,
}

impl TestClient<TcpStream> {
    /// Open a TCP connection without sending anything.
    pub async fn connect(addr: SocketAddr) -> Result<Self> {
        let stream = TcpStream::connect(addr).await?;
        stream.set_nodelay(true)?;
        Ok(Self::new(stream))
    }

    /// Connect, exchange PRELOGIN and log in with default settings.
    pub async fn connect_and_login(addr: SocketAddr) -> Result<(Self, Response)> {
        let mut client = Self::connect(addr).await?;
        client.prelogin().await?;
        let response = client.login(Login7::new().with_sql_auth("sa", "")).await?;
        Ok((client, response))
    }
}

impl<T> TestClient<T>
where
    T: AsyncRead + AsyncWrite,
{
    /// Wrap an existing transport.
    pub fn new(transport: T) -> Self {
        Self {
            conn: Connection::with_packet_size(transport, DEFAULT_PACKET_SIZE),
        }
    }

    /// Send a default PRELOGIN and decode the server's answer.
    pub async fn prelogin(&mut self) -> Result<PreLogin> {
        self.prelogin_with(&PreLogin::new()).await
    }

    /// Send a specific PRELOGIN and decode the server's answer.
    pub async fn prelogin_with(&mut self, request: &PreLogin) -> Result<PreLogin> {
        self.conn
            .send_message(PacketType::PreLogin, request.encode())
            .await?;
        let payload = self.read_payload().await?;
        Ok(PreLogin::decode(&payload)?)
    }

    /// Send LOGIN7.
    ///
    /// When the server acknowledges and announces a packet size, the client
    /// switches to it.
    pub async fn login(&mut self, login: Login7) -> Result<Response> {
        self.conn
            .send_message(PacketType::Login, login.encode())
            .await?;
        let response = self.read_response().await?;
        if let Some(size) = response.packet_size() {
            self.conn.set_packet_size(size);
        }
        Ok(response)
    }

    /// Run a SQL batch.
    pub async fn batch(&mut self, sql: &str) -> Result<Response> {
        self.conn
            .send_message(PacketType::SqlBatch, encode_sql_batch(sql))
            .await?;
        self.read_response().await
    }

    /// Call a procedure over RPC.
    pub async fn rpc(&mut self, request: &RpcRequest) -> Result<Response> {
        self.conn
            .send_message(PacketType::Rpc, request.encode()?)
            .await?;
        self.read_response().await
    }

    /// Send an attention signal and read the acknowledgement.
    pub async fn attention(&mut self) -> Result<Response> {
        self.conn
            .send_message(PacketType::Attention, Bytes::new())
            .await?;
        self.read_response().await
    }

    /// Send an arbitrary message without waiting for an answer.
    pub async fn send_raw(&mut self, packet_type: PacketType, payload: Bytes) -> Result<()> {
        self.conn.send_message(packet_type, payload).await?;
        Ok(())
    }

    /// Read and decode the next tabular response.
    pub async fn read_response(&mut self) -> Result<Response> {
        let payload = self.read_payload().await?;
        let tokens = TokenParser::new(payload).collect_tokens()?;
        Ok(Response { tokens })
    }

    /// Whether the server has closed the connection.
    ///
    /// Consumes any pending message.
    pub async fn is_closed(&mut self) -> bool {
        matches!(self.conn.read_message().await, Ok(None) | Err(_))
    }

    async fn read_payload(&mut self) -> Result<Bytes> {
        let message = self
            .conn
            .read_message()
            .await?
            .ok_or(TestClientError::Closed)?;
        if message.packet_type != PacketType::TabularResult {
            return Err(TestClientError::UnexpectedPacket(message.packet_type));
        }
        Ok(message.payload)
    }
}

/// One result set, rebuilt from COLMETADATA and ROW tokens.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResultSet {
    /// Column names.
    pub columns: Vec<String>,
    /// Row values as text; `None` is NULL.
    pub rows: Vec<Vec<Option<String>>>,
}

impl ResultSet {
    /// The value at `row`, `column`, when present and not NULL.
    #[must_use]
    pub fn value(&self, row: usize, column: usize) -> Option<&str> {
        self.rows.get(row)?.get(column)?.as_deref()
    }
}

/// The decoded tokens of one server response.
#[derive(Debug, Clone, Default)]
pub struct Response {
    /// Tokens in wire order.
    pub tokens: Vec<Token>,
}

impl Response {
    /// Result sets in order.
    #[must_use]
    pub fn result_sets(&self) -> Vec<ResultSet> {
        let mut sets = Vec::new();
        let mut current: Option<ResultSet> = None;
        for token in &self.tokens {
            match token {
                Token::ColMetaData(columns) => {
                    if let Some(set) = current.take() {
                        sets.push(set);
                    }
                    current = Some(ResultSet {
                        columns: columns.iter().map(|c: &ColumnMeta| c.name.clone()).collect(),
                        rows: Vec::new(),
                    });
                }
                Token::Row(values) => {
                    if let Some(set) = current.as_mut() {
                        set.rows.push(values.clone());
                    }
                }
                Token::Done(_) => {
                    if let Some(set) = current.take() {
                        sets.push(set);
                    }
                }
                _ => {}
            }
        }
        sets.extend(current);
        sets
    }

    /// The first result set, if any.
    #[must_use]
    pub fn first_result_set(&self) -> Option<ResultSet> {
        self.result_sets().into_iter().next()
    }

    /// ERROR tokens.
    #[must_use]
    pub fn errors(&self) -> Vec<&ServerMessage> {
        self.tokens
            .iter()
            .filter_map(|t| match t {
                Token::Error(m) => Some(m),
                _ => None,
            })
            .collect()
    }

    /// INFO token texts.
    #[must_use]
    pub fn messages(&self) -> Vec<&str> {
        self.tokens
            .iter()
            .filter_map(|t| match t {
                Token::Info(m) => Some(m.message.as_str()),
                _ => None,
            })
            .collect()
    }

    /// DONE tokens.
    #[must_use]
    pub fn dones(&self) -> Vec<&Done> {
        self.tokens
            .iter()
            .filter_map(|t| match t {
                Token::Done(d) => Some(d),
                _ => None,
            })
            .collect()
    }

    /// The DONE that ends the response.
    #[must_use]
    pub fn final_done(&self) -> Option<&Done> {
        self.dones().last().copied()
    }

    /// ENVCHANGE tokens.
    #[must_use]
    pub fn env_changes(&self) -> Vec<&EnvChange> {
        self.tokens
            .iter()
            .filter_map(|t| match t {
                Token::EnvChange(e) => Some(e),
                _ => None,
            })
            .collect()
    }

    /// The LOGINACK token, if the response has one.
    #[must_use]
    pub fn login_ack(&self) -> Option<&LoginAck> {
        self.tokens.iter().find_map(|t| match t {
            Token::LoginAck(ack) => Some(ack),
            _ => None,
        })
    }

    /// The database named by the last database ENVCHANGE.
    #[must_use]
    pub fn database(&self) -> Option<&str> {
        self.env_changes()
            .into_iter()
            .rev()
            .find(|e| e.env_type == tds_protocol::EnvChangeType::Database)
            .map(|e| e.new_value.as_str())
    }

    /// The packet size announced by ENVCHANGE.
    #[must_use]
    pub fn packet_size(&self) -> Option<usize> {
        self.env_changes()
            .into_iter()
            .find(|e| e.env_type == tds_protocol::EnvChangeType::PacketSize)
            .and_then(|e| e.new_value.parse().ok())
    }

    /// Whether any ERROR token or DONE error bit is present.
    #[must_use]
    pub fn has_error(&self) -> bool {
        !self.errors().is_empty() || self.dones().iter().any(|d| d.has_error())
    }
}
