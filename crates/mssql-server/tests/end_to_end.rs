//! End-to-end tests: a real server on a loopback port and the raw test client.

#![allow(clippy::unwrap_used, clippy::panic)]

use std::net::SocketAddr;

use mssql_server::{Server, ServerConfig, ServerHandle};
use mssql_testing::{TestClient, TestFixture};
use tds_protocol::{
    EncryptionLevel, EnvChangeType, Login7, PacketType, PreLogin, RpcParam, RpcRequest,
    TdsVersion,
};

async fn start(config: ServerConfig) -> ServerHandle {
    let server = Server::bind(config.listen_addr("127.0.0.1:0".parse().unwrap()))
        .await
        .unwrap();
    let handle = server.handle();
    tokio::spawn(server.run());
    handle
}

async fn start_default() -> (ServerHandle, SocketAddr) {
    let handle = start(ServerConfig::new().server_name("E2E")).await;
    let addr = handle.addr();
    (handle, addr)
}

async fn logged_in(addr: SocketAddr) -> TestClient {
    let (client, response) = TestClient::connect_and_login(addr).await.unwrap();
    assert!(!response.has_error(), "login failed: {:?}", response.errors());
    client
}

async fn with_fixture(client: &mut TestClient, fixture: &TestFixture) {
    let response = client.batch(&fixture.create_database_sql()).await.unwrap();
    assert!(!response.has_error(), "{:?}", response.errors());
    let response = client.batch(&fixture.use_sql()).await.unwrap();
    assert!(!response.has_error(), "{:?}", response.errors());
    for batch in fixture.setup_batches() {
        let response = client.batch(&batch).await.unwrap();
        assert!(!response.has_error(), "{batch}: {:?}", response.errors());
    }
}

#[tokio::test]
async fn test_prelogin_never_negotiates_encryption() {
    let (handle, addr) = start_default().await;
    let mut client = TestClient::connect(addr).await.unwrap();

    let response = client
        .prelogin_with(&PreLogin::new().with_encryption(EncryptionLevel::On))
        .await
        .unwrap();
    assert_ne!(response.encryption, EncryptionLevel::On);
    assert!(!response.mars);

    handle.shutdown();
}

#[tokio::test]
async fn test_login_acknowledges_and_reports_database() {
    let (handle, addr) = start_default().await;
    let (_client, response) = TestClient::connect_and_login(addr).await.unwrap();

    let ack = response.login_ack().unwrap();
    assert_eq!(ack.tds_version, TdsVersion::V7_4);
    assert_eq!(response.database(), Some("master"));
    assert_eq!(response.packet_size(), Some(4096));
    assert!(!response.final_done().unwrap().has_error());

    handle.shutdown();
}

#[tokio::test]
async fn test_login_to_unknown_database_is_rejected() {
    let (handle, addr) = start_default().await;
    let mut client = TestClient::connect(addr).await.unwrap();
    client.prelogin().await.unwrap();

    let response = client
        .login(Login7::new().with_database("no_such_db"))
        .await
        .unwrap();
    assert!(response.login_ack().is_none());
    assert!(response.has_error());
    assert!(client.is_closed().await);

    handle.shutdown();
}

#[tokio::test]
async fn test_select_returns_rows_and_count() {
    let (handle, addr) = start_default().await;
    let mut client = logged_in(addr).await;
    with_fixture(&mut client, &TestFixture::orders("shop")).await;

    let response = client
        .batch("SELECT id, name, city FROM customers ORDER BY id")
        .await
        .unwrap();
    let set = response.first_result_set().unwrap();
    assert_eq!(set.columns, vec!["id", "name", "city"]);
    assert_eq!(set.rows.len(), 3);
    assert_eq!(set.value(0, 1), Some("Ada"));
    assert_eq!(set.value(2, 2), None);
    let done = response.final_done().unwrap();
    assert_eq!(done.row_count, 3);
    assert!(!done.has_more());

    handle.shutdown();
}

#[tokio::test]
async fn test_batch_with_variables_and_control_flow() {
    let (handle, addr) = start_default().await;
    let mut client = logged_in(addr).await;

    let response = client
        .batch(
            "DECLARE @i INT = 0; DECLARE @total INT = 0; \
             WHILE @i < 5 BEGIN SET @i = @i + 1; SET @total = @total + @i; END; \
             IF @total = 15 THEN SELECT @total AS total ELSE SELECT 0 AS total END",
        )
        .await
        .unwrap();
    assert!(!response.has_error(), "{:?}", response.errors());
    let set = response.first_result_set().unwrap();
    assert_eq!(set.columns, vec!["total"]);
    assert_eq!(set.value(0, 0), Some("15"));

    handle.shutdown();
}

#[tokio::test]
async fn test_procedure_over_rpc_and_exec() {
    let (handle, addr) = start_default().await;
    let mut client = logged_in(addr).await;
    with_fixture(&mut client, &TestFixture::orders("shop")).await;

    let response = client
        .rpc(&RpcRequest::call("customer_orders").param(RpcParam::int("@customer", 1)))
        .await
        .unwrap();
    assert!(!response.has_error(), "{:?}", response.errors());
    let set = response.first_result_set().unwrap();
    assert_eq!(set.rows.len(), 2);

    let response = client.batch("EXEC customer_orders @customer = 2").await.unwrap();
    assert!(!response.has_error(), "{:?}", response.errors());
    assert_eq!(response.first_result_set().unwrap().rows.len(), 1);

    let response = client
        .rpc(&RpcRequest::call("add_order").param(RpcParam::int("@customer", 3)))
        .await
        .unwrap();
    assert!(!response.has_error(), "{:?}", response.errors());

    let response = client
        .batch("SELECT COUNT(*) AS n FROM orders WHERE customer_id = 3")
        .await
        .unwrap();
    assert_eq!(response.first_result_set().unwrap().value(0, 0), Some("1"));

    handle.shutdown();
}

#[tokio::test]
async fn test_sp_executesql_binds_parameters() {
    let (handle, addr) = start_default().await;
    let mut client = logged_in(addr).await;

    let response = client
        .rpc(
            &RpcRequest::call("sp_executesql")
                .param(RpcParam::nvarchar("", "SELECT @a + @b AS total"))
                .param(RpcParam::nvarchar("", "@a INT, @b INT"))
                .param(RpcParam::int("@a", 40))
                .param(RpcParam::int("@b", 2)),
        )
        .await
        .unwrap();
    assert!(!response.has_error(), "{:?}", response.errors());
    assert_eq!(response.first_result_set().unwrap().value(0, 0), Some("42"));

    handle.shutdown();
}

#[tokio::test]
async fn test_errors_keep_the_connection_open() {
    let (handle, addr) = start_default().await;
    let mut client = logged_in(addr).await;

    let response = client.batch("EXEC does_not_exist").await.unwrap();
    let errors = response.errors();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].number, 2812);
    assert!(response.final_done().unwrap().has_error());

    let response = client.batch("SELECT @undeclared").await.unwrap();
    assert_eq!(response.errors()[0].number, 137);

    let response = client.batch("SELECT 1 AS one").await.unwrap();
    assert!(!response.has_error());
    assert_eq!(response.first_result_set().unwrap().value(0, 0), Some("1"));

    handle.shutdown();
}

#[tokio::test]
async fn test_print_becomes_info() {
    let (handle, addr) = start_default().await;
    let mut client = logged_in(addr).await;

    let response = client.batch("PRINT 'hello'").await.unwrap();
    assert_eq!(response.messages(), vec!["hello"]);
    assert!(!response.has_error());
    assert!(response.final_done().is_some());

    handle.shutdown();
}

#[tokio::test]
async fn test_use_sends_database_change() {
    let (handle, addr) = start_default().await;
    let mut client = logged_in(addr).await;

    client.batch("CREATE DATABASE sales").await.unwrap();
    let response = client.batch("USE sales").await.unwrap();
    let change = response
        .env_changes()
        .into_iter()
        .find(|e| e.env_type == EnvChangeType::Database)
        .unwrap();
    assert_eq!(change.new_value, "sales");
    assert_eq!(change.old_value, "master");

    let response = client.batch("USE nowhere").await.unwrap();
    assert_eq!(response.errors()[0].number, 911);
    assert!(response.env_changes().is_empty());

    handle.shutdown();
}

#[tokio::test]
async fn test_attention_is_acknowledged() {
    let (handle, addr) = start_default().await;
    let mut client = logged_in(addr).await;

    let response = client.attention().await.unwrap();
    let done = response.final_done().unwrap();
    assert!(done.status.contains(tds_protocol::DoneStatus::ATTN));

    let response = client.batch("SELECT 2 AS two").await.unwrap();
    assert_eq!(response.first_result_set().unwrap().value(0, 0), Some("2"));

    handle.shutdown();
}

#[tokio::test]
async fn test_unexpected_packet_is_ignored() {
    let (handle, addr) = start_default().await;
    let mut client = logged_in(addr).await;

    client
        .send_raw(PacketType::PreLogin, PreLogin::new().encode())
        .await
        .unwrap();
    let response = client.batch("SELECT 3 AS three").await.unwrap();
    assert_eq!(response.first_result_set().unwrap().value(0, 0), Some("3"));

    handle.shutdown();
}

#[tokio::test]
async fn test_sessions_share_databases_but_not_variables() {
    let (handle, addr) = start_default().await;
    let mut first = logged_in(addr).await;
    let mut second = logged_in(addr).await;

    first
        .batch("CREATE TABLE shared (v INTEGER); INSERT INTO shared VALUES (7)")
        .await
        .unwrap();
    let response = second.batch("SELECT v FROM shared").await.unwrap();
    assert_eq!(response.first_result_set().unwrap().value(0, 0), Some("7"));

    first.batch("DECLARE @x INT = 1").await.unwrap();
    let response = second.batch("SELECT @x").await.unwrap();
    assert!(response.has_error());

    handle.shutdown();
}

#[tokio::test]
async fn test_connection_limit() {
    let handle = start(ServerConfig::new().max_connections(1)).await;
    let addr = handle.addr();
    let _first = logged_in(addr).await;

    let mut second = TestClient::connect(addr).await.unwrap();
    assert!(second.prelogin().await.is_err());

    handle.shutdown();
}

#[tokio::test]
async fn test_oversized_request_drops_the_connection() {
    let handle = start(ServerConfig::new().max_message_size(8 * 1024)).await;
    let addr = handle.addr();
    let mut client = logged_in(addr).await;

    let padding = "x".repeat(8 * 1024);
    assert!(client.batch(&format!("SELECT '{padding}' AS v")).await.is_err());
    assert!(client.is_closed().await);

    let mut other = logged_in(addr).await;
    let response = other.batch("SELECT 4 AS four").await.unwrap();
    assert_eq!(response.first_result_set().unwrap().value(0, 0), Some("4"));

    handle.shutdown();
}

#[tokio::test]
async fn test_shutdown_closes_idle_connections() {
    let (handle, addr) = start_default().await;
    let mut client = logged_in(addr).await;

    handle.shutdown();
    assert!(client.is_closed().await);
}
