//! WebSocket upgrade handler

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
};
use futures::{SinkExt, StreamExt};
use tracing::{debug, info, warn};

use crate::app::AppState;
use crate::game::PlayerId;
use crate::ws::outbound::ReliableHandle;

/// WebSocket upgrade handler
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// Handle the upgraded WebSocket connection
async fn handle_socket(socket: WebSocket, state: AppState) {
    let (ws_sink, ws_stream) = socket.split();

    let (handle, outbox) = ReliableHandle::channel(state.config.reliable_queue_capacity);
    let player_id = state.registry().register(handle.clone());
    info!(player_id = %player_id, "New WebSocket connection");

    run_session(&state, player_id, handle, ws_sink, ws_stream, outbox).await;

    state.processor.connection_lost(player_id);
    info!(player_id = %player_id, "WebSocket connection closed");
}

/// Run the WebSocket session with read/write split
async fn run_session(
    state: &AppState,
    player_id: PlayerId,
    handle: ReliableHandle,
    mut ws_sink: futures::stream::SplitSink<WebSocket, Message>,
    mut ws_stream: futures::stream::SplitStream<WebSocket>,
    mut outbox: tokio::sync::mpsc::Receiver<crate::ws::protocol::Frame>,
) {
    // Spawn writer task: outbox -> WebSocket
    let writer_handle = tokio::spawn(async move {
        while let Some(frame) = outbox.recv().await {
            if let Err(e) = ws_sink.send(Message::Text(frame.to_string())).await {
                debug!(player_id = %player_id, error = %e, "WebSocket send failed");
                break;
            }
        }
    });

    // Reader loop: events are applied one at a time, in arrival order
    loop {
        let result = tokio::select! {
            _ = handle.kicked() => {
                warn!(player_id = %player_id, "Disconnecting peer that stopped reading");
                break;
            }
            result = ws_stream.next() => result,
        };

        match result {
            Some(Ok(Message::Text(text))) => {
                state.processor.handle_text(&handle, player_id, &text);
            }
            Some(Ok(Message::Binary(_))) => {
                warn!(player_id = %player_id, "Received binary message, ignoring");
            }
            Some(Ok(Message::Ping(_))) => {
                debug!(player_id = %player_id, "Received ping");
            }
            Some(Ok(Message::Pong(_))) => {
                debug!(player_id = %player_id, "Received pong");
            }
            Some(Ok(Message::Close(_))) => {
                info!(player_id = %player_id, "Client initiated close");
                break;
            }
            Some(Err(e)) => {
                warn!(player_id = %player_id, error = %e, "WebSocket error");
                break;
            }
            None => break,
        }
    }

    // Abort writer task
    writer_handle.abort();
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::net::SocketAddr;
    use std::time::Duration;

    use futures::{SinkExt, StreamExt};
    use serde_json::{json, Value};
    use tokio::net::{TcpListener, TcpStream};
    use tokio_tungstenite::{
        connect_async, tungstenite::Message as WsMessage, MaybeTlsStream, WebSocketStream,
    };

    use crate::app::AppState;
    use crate::config::Config;
    use crate::http::build_router;
    use crate::store::NameProvider;

    type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

    async fn spawn_server() -> (SocketAddr, AppState) {
        spawn_server_with(&[]).await
    }

    async fn spawn_server_with(vars: &[(&str, &str)]) -> (SocketAddr, AppState) {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        let config = Config::from_lookup(|key| vars.get(key).cloned()).unwrap();
        let state = AppState::new(config, NameProvider::from_names(vec!["Merlin".to_string()]));
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let router = build_router(state.clone());
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        (addr, state)
    }

    async fn connect(addr: SocketAddr) -> Client {
        let (client, _) = connect_async(format!("ws://{addr}/ws")).await.unwrap();
        client
    }

    async fn recv(client: &mut Client) -> Value {
        loop {
            let message = tokio::time::timeout(Duration::from_secs(2), client.next())
                .await
                .expect("message within timeout")
                .expect("stream open")
                .unwrap();
            if let WsMessage::Text(text) = message {
                return serde_json::from_str(&text).unwrap();
            }
        }
    }

    async fn send(client: &mut Client, value: Value) {
        client.send(WsMessage::Text(value.to_string())).await.unwrap();
    }

    async fn eventually(check: impl Fn() -> bool) {
        for _ in 0..100 {
            if check() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("condition not reached");
    }

    #[tokio::test]
    async fn two_pilots_share_a_room_until_both_leave() {
        let (addr, state) = spawn_server().await;

        let mut a = connect(addr).await;
        assert_eq!(recv(&mut a).await, json!({"type": "setId", "newId": "69"}));

        send(
            &mut a,
            json!({
                "type": "createRoom", "Id": "69", "name": "Maverick", "planeType": "F14",
                "startHealth": 200, "worldIndex": "1",
                "gameModeInfo": {"teamColors": "[red blue]"}
            }),
        )
        .await;
        assert_eq!(recv(&mut a).await["type"], "clientConnected");
        let created = recv(&mut a).await;
        assert_eq!(created["type"], "createdRoom");
        assert_eq!(created["startHealth"], "200");
        let code = created["newRoomId"].as_str().unwrap().to_string();

        let mut b = connect(addr).await;
        assert_eq!(recv(&mut b).await["newId"], "70");
        send(
            &mut b,
            json!({
                "type": "joinRoom", "Id": "70", "roomId": code, "name": "",
                "planeType": "F18", "startHealth": 100
            }),
        )
        .await;

        let seen_by_a = recv(&mut a).await;
        assert_eq!(seen_by_a["type"], "clientConnected");
        assert_eq!(seen_by_a["Id"], "70");
        assert!(["red", "blue"].contains(&seen_by_a["Team"].as_str().unwrap()));
        assert_eq!(recv(&mut b).await["Id"], "70");
        let joined = recv(&mut b).await;
        assert_eq!(joined["type"], "joinSuccess");
        assert!(joined["otherClients"]
            .as_array()
            .unwrap()
            .iter()
            .any(|c| c["Id"] == "69"));

        b.close(None).await.unwrap();
        assert_eq!(
            recv(&mut a).await,
            json!({"type": "clientDisconnected", "Id": "70"})
        );
        assert!(state.registry().room(&code).is_some());

        a.close(None).await.unwrap();
        let registry = state.registry().clone();
        eventually(move || registry.room(&code).is_none()).await;
        assert_eq!(state.registry().lobby_len(), 2);
    }

    #[tokio::test]
    async fn owner_leaving_hands_over_the_room() {
        let (addr, _state) = spawn_server().await;
        let mut a = connect(addr).await;
        recv(&mut a).await;
        send(
            &mut a,
            json!({
                "type": "createRoom", "Id": "69", "name": "Ice", "planeType": "F14",
                "startHealth": 100, "worldIndex": "1", "gameModeInfo": {}
            }),
        )
        .await;
        recv(&mut a).await;
        let code = recv(&mut a).await["newRoomId"].clone();

        let mut b = connect(addr).await;
        recv(&mut b).await;
        send(
            &mut b,
            json!({"type": "joinRoom", "Id": "70", "roomId": code, "startHealth": 100}),
        )
        .await;
        recv(&mut a).await;
        recv(&mut b).await;
        recv(&mut b).await;

        send(
            &mut a,
            json!({"type": "clientDisconnected", "roomId": code, "Id": "69", "wasOwner": true}),
        )
        .await;

        assert_eq!(recv(&mut b).await["Id"], "69");
        assert_eq!(
            recv(&mut b).await,
            json!({"type": "transferOwnership", "newOwner": "70"})
        );
    }

    #[tokio::test]
    async fn schema_errors_are_reported_to_the_sender() {
        let (addr, _state) = spawn_server().await;
        let mut a = connect(addr).await;
        recv(&mut a).await;

        send(&mut a, json!({"type": "joinRoom", "Id": "69", "roomId": "QQQQQQ", "startHealth": 1})).await;
        assert_eq!(
            recv(&mut a).await,
            json!({"type": "Error", "value": "No room with such Id exists"})
        );

        send(&mut a, json!({"type": "joinRoom", "Id": "69"})).await;
        let reply = recv(&mut a).await;
        assert_eq!(reply["type"], "Error");
        assert!(reply["value"].as_str().unwrap().contains("roomId"));
    }

    #[tokio::test]
    async fn overflowing_outbox_closes_the_socket() {
        let (addr, state) = spawn_server_with(&[("RELIABLE_QUEUE_CAPACITY", "1")]).await;
        let mut a = connect(addr).await;
        assert_eq!(recv(&mut a).await["newId"], "69");

        // createRoom queues two replies back to back; the second finds the
        // single slot still taken
        send(
            &mut a,
            json!({
                "type": "createRoom", "Id": "69", "name": "Sundown", "planeType": "F14",
                "startHealth": 100, "worldIndex": "1", "gameModeInfo": {}
            }),
        )
        .await;

        loop {
            let next = tokio::time::timeout(Duration::from_secs(2), a.next())
                .await
                .expect("socket closed within timeout");
            match next {
                None | Some(Err(_)) | Some(Ok(WsMessage::Close(_))) => break,
                Some(Ok(_)) => continue,
            }
        }

        let registry = state.registry().clone();
        eventually(move || registry.room_count() == 0).await;
        assert_eq!(state.registry().lobby_len(), 1);
    }
}
