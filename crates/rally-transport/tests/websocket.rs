//! Integration tests for the WebSocket transport.
//!
//! These tests spin up a real WebSocket server and client on a random
//! local port to verify that the upgrade request is captured and that
//! data and close codes actually flow over the network.

#[cfg(feature = "websocket")]
mod websocket {
    use futures_util::{SinkExt, StreamExt};
    use rally_transport::{
        CloseReason, Connection, Transport, WebSocketConnection,
        WebSocketTransport,
    };
    use tokio_tungstenite::tungstenite::client::IntoClientRequest;
    use tokio_tungstenite::tungstenite::http::HeaderValue;
    use tokio_tungstenite::tungstenite::Message;

    type ClientWs = tokio_tungstenite::WebSocketStream<
        tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
    >;

    /// Binds on an OS-assigned port and accepts exactly one connection
    /// in the background.
    async fn serve_one() -> (
        String,
        tokio::task::JoinHandle<WebSocketConnection>,
    ) {
        let mut transport = WebSocketTransport::bind("127.0.0.1:0")
            .await
            .expect("should bind");
        let addr = transport.local_addr().expect("local addr").to_string();
        let handle = tokio::spawn(async move {
            transport.accept().await.expect("should accept")
        });
        (addr, handle)
    }

    async fn connect_client(addr: &str, path: &str) -> ClientWs {
        let (ws, _) =
            tokio_tungstenite::connect_async(format!("ws://{addr}{path}"))
                .await
                .expect("client should connect");
        ws
    }

    #[tokio::test]
    async fn test_websocket_accept_and_send_receive() {
        let (addr, handle) = serve_one().await;
        let mut client_ws = connect_client(&addr, "/ws/chat/").await;
        let server_conn = handle.await.expect("task should complete");

        assert!(server_conn.id().into_inner() > 0);
        assert_eq!(server_conn.request().path, "/ws/chat/");

        // --- Server sends, client receives (as a text frame) ---
        server_conn
            .send_text(r#"{"type":"hello"}"#)
            .await
            .expect("send should succeed");

        let msg = client_ws.next().await.unwrap().unwrap();
        assert!(msg.is_text(), "JSON goes out as text frames");
        assert_eq!(msg.into_text().unwrap().as_str(), r#"{"type":"hello"}"#);

        // --- Client sends, server receives ---
        client_ws
            .send(Message::text("hello from client"))
            .await
            .unwrap();

        let received = server_conn
            .recv()
            .await
            .expect("recv should succeed")
            .expect("should have data");
        assert_eq!(received, b"hello from client");

        server_conn.close(None).await.expect("close should succeed");
    }

    #[tokio::test]
    async fn test_websocket_captures_query_token() {
        let (addr, handle) = serve_one().await;
        let _client = connect_client(&addr, "/ws?gameId=g-1&token=secret").await;
        let server_conn = handle.await.unwrap();

        let req = server_conn.request();
        assert_eq!(req.path, "/ws");
        assert_eq!(req.query_param("gameId"), Some("g-1"));
        assert_eq!(req.token.as_deref(), Some("secret"));
    }

    #[tokio::test]
    async fn test_websocket_subprotocol_token_is_echoed() {
        let (addr, handle) = serve_one().await;

        let mut request = format!("ws://{addr}/ws/chat/")
            .into_client_request()
            .unwrap();
        request.headers_mut().insert(
            "Sec-WebSocket-Protocol",
            HeaderValue::from_static("jwt-token"),
        );
        let (_client, response) = tokio_tungstenite::connect_async(request)
            .await
            .expect("handshake should accept the echoed subprotocol");

        assert_eq!(
            response
                .headers()
                .get("sec-websocket-protocol")
                .and_then(|v| v.to_str().ok()),
            Some("jwt-token")
        );
        let server_conn = handle.await.unwrap();
        assert_eq!(server_conn.request().token.as_deref(), Some("jwt-token"));
    }

    #[tokio::test]
    async fn test_websocket_close_carries_application_code() {
        let (addr, handle) = serve_one().await;
        let mut client_ws = connect_client(&addr, "/ws/unknown").await;
        let server_conn = handle.await.unwrap();

        server_conn
            .close(Some(CloseReason::new(4004, "session not found")))
            .await
            .expect("close should succeed");

        match client_ws.next().await {
            Some(Ok(Message::Close(Some(frame)))) => {
                assert_eq!(u16::from(frame.code), 4004);
                assert_eq!(frame.reason.as_str(), "session not found");
            }
            other => panic!("expected close frame, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_websocket_recv_returns_none_on_client_close() {
        let (addr, handle) = serve_one().await;
        let mut client_ws = connect_client(&addr, "/").await;
        let server_conn = handle.await.unwrap();

        client_ws.send(Message::Close(None)).await.unwrap();

        let result = server_conn.recv().await.expect("recv should not error");
        assert!(result.is_none(), "should return None on client close");
    }
}
