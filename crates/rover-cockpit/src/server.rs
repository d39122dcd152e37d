//! [`CockpitServer`] – HTTP, streaming and WebSocket front door of the rover.
//!
//! Listens on `0.0.0.0:5000` (configurable via [`CockpitServer::with_port`]).
//! Every accepted connection gets its own task and tracing span; the request
//! head is parsed once and dispatched by [`Route`].

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use rover_middleware::{Broadcaster, Subscription};
use rover_runtime::ActuatorController;
use rover_types::{ActuatorState, DriveCommand, DriveSnapshot, Frame, RoverError, SensorSample};
use serde_json::json;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::TcpListener;
use tokio_tungstenite::tungstenite::handshake::derive_accept_key;
use tokio_tungstenite::tungstenite::protocol::Role;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;
use tracing::{debug, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::http::{error_status, read_head, write_response, Request, Route};
use crate::stream::{stream_events, stream_frames};

/// Default TCP port for the cockpit.
pub const DEFAULT_PORT: u16 = 5000;

/// The compiled-in cockpit page.
const COCKPIT_HTML: &str = include_str!("cockpit.html");

// ---------------------------------------------------------------------------
// Gateway
// ---------------------------------------------------------------------------

/// Everything a connection handler can reach: the actuator controller and
/// the two broadcasters.  Cloning shares all three.
#[derive(Clone)]
pub struct Gateway {
    pub actuators: Arc<ActuatorController>,
    pub frames: Broadcaster<Frame>,
    pub readings: Broadcaster<SensorSample>,
}

impl Gateway {
    /// Wrap `actuators` with fresh `frames` and `readings` broadcasters.
    pub fn new(actuators: Arc<ActuatorController>) -> Self {
        Self {
            actuators,
            frames: Broadcaster::new("frames"),
            readings: Broadcaster::new("readings"),
        }
    }

    /// Run `command` on the blocking pool; driver calls are synchronous.
    pub async fn apply(&self, command: DriveCommand) -> Result<ActuatorState, RoverError> {
        let actuators = Arc::clone(&self.actuators);
        tokio::task::spawn_blocking(move || actuators.apply(command))
            .await
            .map_err(|e| RoverError::hardware("actuator_controller", e))?
    }

    /// Read the drive state on the blocking pool; it waits on the same lock
    /// as [`Gateway::apply`].
    pub async fn snapshot(&self) -> Result<DriveSnapshot, RoverError> {
        let actuators = Arc::clone(&self.actuators);
        tokio::task::spawn_blocking(move || actuators.snapshot())
            .await
            .map_err(|e| RoverError::hardware("actuator_controller", e))?
    }

    fn health(&self) -> serde_json::Value {
        let status = |closed: bool| if closed { "closed" } else { "live" };
        json!({
            "video": status(self.frames.is_closed()),
            "sensor": status(self.readings.is_closed()),
            "viewers": self.frames.subscriber_count(),
            "listeners": self.readings.subscriber_count(),
        })
    }
}

// ---------------------------------------------------------------------------
// CockpitServer
// ---------------------------------------------------------------------------

pub struct CockpitServer {
    gateway: Gateway,
    port: u16,
}

impl CockpitServer {
    /// Create a server for `gateway` on the [`DEFAULT_PORT`].
    pub fn new(gateway: Gateway) -> Self {
        Self {
            gateway,
            port: DEFAULT_PORT,
        }
    }

    /// Override the listening port (builder-style).
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Bind `0.0.0.0:<port>` and serve forever.
    ///
    /// # Errors
    ///
    /// Returns [`RoverError::Io`] if the listener cannot bind.
    pub async fn run(self) -> Result<(), RoverError> {
        let addr = SocketAddr::from(([0, 0, 0, 0], self.port));
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| RoverError::Io(format!("bind error on {addr}: {e}")))?;
        self.serve(listener).await
    }

    /// Serve on an already bound listener.
    pub async fn serve(self, listener: TcpListener) -> Result<(), RoverError> {
        self.serve_until(listener, std::future::pending()).await
    }

    /// Serve until `shutdown` resolves.  Connections already in flight keep
    /// running until their own feeds close.
    pub async fn serve_until<F>(self, listener: TcpListener, shutdown: F) -> Result<(), RoverError>
    where
        F: Future<Output = ()>,
    {
        let addr = listener.local_addr()?;
        info!(%addr, "cockpit listening");
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("cockpit server shutting down");
                    return Ok(());
                }
                accepted = listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        let gateway = self.gateway.clone();
                        let span = info_span!("connection", id = %Uuid::new_v4(), %peer);
                        tokio::spawn(
                            async move {
                                if let Err(e) = handle_connection(stream, gateway).await {
                                    debug!(error = %e, "connection ended with error");
                                }
                            }
                            .instrument(span),
                        );
                    }
                    Err(e) => warn!(error = %e, "accept error"),
                },
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Per-connection handler
// ---------------------------------------------------------------------------

/// Serve exactly one request on `stream`.
pub async fn handle_connection<S>(stream: S, gateway: Gateway) -> Result<(), RoverError>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    let mut stream = BufReader::new(stream);
    let head = read_head(&mut stream).await?;

    let request = match Request::parse(&head) {
        Ok(request) => request,
        Err(e) => return respond_error(&mut stream, &e).await,
    };
    if !request.method.eq_ignore_ascii_case("GET") {
        debug!(method = %request.method, path = %request.path, "method not allowed");
        return write_response(&mut stream, 405, "text/plain", b"method not allowed").await;
    }
    let route = match Route::resolve(&request) {
        Ok(route) => route,
        Err(e) => return respond_error(&mut stream, &e).await,
    };
    debug!(path = %request.path, ?route, "request");

    match route {
        Route::Index => {
            write_response(&mut stream, 200, "text/html; charset=utf-8", COCKPIT_HTML.as_bytes())
                .await
        }
        Route::Command(command) => match gateway.apply(command).await {
            Ok(_) => write_response(&mut stream, 200, "text/plain", b"").await,
            Err(e) => respond_error(&mut stream, &e).await,
        },
        Route::Readings => {
            respond_json(&mut stream, &json!(gateway.readings.current_or_default())).await
        }
        Route::State => match gateway.snapshot().await {
            Ok(snapshot) => respond_json(&mut stream, &json!(snapshot)).await,
            Err(e) => respond_error(&mut stream, &e).await,
        },
        Route::Health => respond_json(&mut stream, &gateway.health()).await,
        Route::Events => {
            if let Err(e) = ensure_live(&gateway.readings) {
                return respond_error(&mut stream, &e).await;
            }
            let outcome = stream_events(&mut stream, gateway.readings.subscribe()).await;
            debug!(sent = outcome.sent, end = ?outcome.end, "event stream finished");
            Ok(())
        }
        Route::VideoStream => {
            if let Err(e) = ensure_live(&gateway.frames) {
                return respond_error(&mut stream, &e).await;
            }
            let outcome = stream_frames(&mut stream, gateway.frames.subscribe()).await;
            debug!(sent = outcome.sent, end = ?outcome.end, "video stream finished");
            Ok(())
        }
        Route::WebSocket => handle_ws(stream, &request, gateway).await,
        Route::NotFound => write_response(&mut stream, 404, "text/plain", b"not found").await,
    }
}

/// A closed feed has nothing left to stream; refuse before sending a 200.
fn ensure_live<T: Clone>(feed: &Broadcaster<T>) -> Result<(), RoverError> {
    if feed.is_closed() {
        return Err(RoverError::Closed(feed.name().to_string()));
    }
    Ok(())
}

async fn respond_json<W: AsyncWrite + Unpin>(
    writer: &mut W,
    body: &serde_json::Value,
) -> Result<(), RoverError> {
    write_response(writer, 200, "application/json", body.to_string().as_bytes()).await
}

async fn respond_error<W: AsyncWrite + Unpin>(
    writer: &mut W,
    e: &RoverError,
) -> Result<(), RoverError> {
    let status = error_status(e);
    if status >= 500 {
        warn!(error = %e, status, "request failed");
    } else {
        debug!(error = %e, status, "request rejected");
    }
    let body = json!({ "error": e.to_string() }).to_string();
    write_response(writer, status, "application/json", body.as_bytes()).await
}

// ---------------------------------------------------------------------------
// WebSocket: sensor push + command upstream
// ---------------------------------------------------------------------------

async fn handle_ws<S>(
    mut stream: BufReader<S>,
    request: &Request,
    gateway: Gateway,
) -> Result<(), RoverError>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    let Some(key) = request.header("sec-websocket-key") else {
        let e = RoverError::InvalidCommand("missing Sec-WebSocket-Key".to_string());
        return respond_error(&mut stream, &e).await;
    };
    let handshake = format!(
        "HTTP/1.1 101 Switching Protocols\r\n\
         Upgrade: websocket\r\n\
         Connection: Upgrade\r\n\
         Sec-WebSocket-Accept: {}\r\n\
         \r\n",
        derive_accept_key(key.as_bytes())
    );
    stream.write_all(handshake.as_bytes()).await?;
    stream.flush().await?;

    let ws_stream = WebSocketStream::from_raw_socket(stream, Role::Server, None).await;
    let (mut ws_tx, mut ws_rx) = ws_stream.split();
    // Commands stay live after the sensor feed closes; only the push side
    // goes quiet.
    let mut readings = (!gateway.readings.is_closed()).then(|| gateway.readings.subscribe());
    debug!(sensor_live = readings.is_some(), "websocket session opened");

    loop {
        tokio::select! {
            // Downstream: sensor samples.
            sample = next_sample(&mut readings), if readings.is_some() => {
                let sample = match sample {
                    Ok(sample) => sample,
                    Err(e) => {
                        debug!(reason = %e, "sensor feed closed; websocket keeps accepting commands");
                        readings = None;
                        continue;
                    }
                };
                let json = json!(sample).to_string();
                if ws_tx.send(Message::Text(json.into())).await.is_err() {
                    break;
                }
            }
            // Upstream: drive commands.
            msg = ws_rx.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        let reply = match handle_upstream_message(text.as_str(), &gateway).await {
                            Ok(state) => json!({ "state": state }),
                            Err(e) => json!({ "error": e.to_string() }),
                        };
                        if ws_tx.send(Message::Text(reply.to_string().into())).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(e)) => {
                        debug!(error = %e, "websocket read failed");
                        break;
                    }
                    _ => {}
                }
            }
        }
    }

    debug!("websocket session closed");
    Ok(())
}

/// Next sample from `readings`, or never once the feed is gone.
async fn next_sample(
    readings: &mut Option<Subscription<SensorSample>>,
) -> Result<SensorSample, RoverError> {
    match readings {
        Some(subscription) => subscription.next().await,
        None => std::future::pending().await,
    }
}

/// Parse one upstream `{"command": ...}` message and apply it.
///
/// Speed values go through the same range check as `/speed`.
pub(crate) async fn handle_upstream_message(
    text: &str,
    gateway: &Gateway,
) -> Result<ActuatorState, RoverError> {
    let command: DriveCommand = serde_json::from_str(text)
        .map_err(|e| RoverError::InvalidCommand(format!("unrecognised message: {e}")))?;
    gateway.apply(command).await
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use rover_hal::sim::{SimMotor, SimPwm};
    use rover_hal::Motor;
    use rover_runtime::DriveTrain;
    use rover_types::{Direction, MotorDirection};
    use std::time::Duration;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::time::timeout;

    const WAIT: Duration = Duration::from_secs(2);

    fn sim_drive() -> DriveTrain {
        DriveTrain {
            left: SimMotor::new("left_motor"),
            right: SimMotor::new("right_motor"),
            left_enable: SimPwm::new("left_enable"),
            right_enable: SimPwm::new("right_enable"),
        }
    }

    fn make_gateway() -> Gateway {
        Gateway::new(Arc::new(ActuatorController::new(sim_drive())))
    }

    /// Send one raw request through an in-memory connection and return the
    /// full response once the handler finishes.
    async fn exchange(gateway: &Gateway, raw: &str) -> String {
        let (server, mut client) = tokio::io::duplex(64 * 1024);
        let handler = tokio::spawn(handle_connection(server, gateway.clone()));
        client.write_all(raw.as_bytes()).await.unwrap();
        let mut out = Vec::new();
        timeout(WAIT, client.read_to_end(&mut out)).await.unwrap().unwrap();
        timeout(WAIT, handler).await.unwrap().unwrap().unwrap();
        String::from_utf8(out).unwrap()
    }

    async fn get(gateway: &Gateway, target: &str) -> String {
        exchange(gateway, &format!("GET {target} HTTP/1.1\r\nHost: rover\r\n\r\n")).await
    }

    fn body(response: &str) -> &str {
        response.split_once("\r\n\r\n").map_or("", |(_, b)| b)
    }

    // ── CockpitServer constructor ─────────────────────────────────────────────

    #[test]
    fn default_port_is_5000() {
        let server = CockpitServer::new(make_gateway());
        assert_eq!(server.port(), DEFAULT_PORT);
        assert_eq!(DEFAULT_PORT, 5000);
    }

    #[test]
    fn with_port_overrides_default() {
        let server = CockpitServer::new(make_gateway()).with_port(9999);
        assert_eq!(server.port(), 9999);
    }

    // ── Plain HTTP routes ─────────────────────────────────────────────────────

    #[tokio::test]
    async fn index_serves_cockpit_page() {
        let gateway = make_gateway();
        let response = get(&gateway, "/").await;
        assert!(response.starts_with("HTTP/1.1 200 OK"));
        assert!(response.contains("text/html"));
        assert!(body(&response).contains("/stream.mjpg"));
    }

    #[tokio::test]
    async fn direction_routes_drive_the_controller() {
        let gateway = make_gateway();
        for (path, direction) in [
            ("/forward", Direction::Forward),
            ("/left", Direction::Left),
            ("/right", Direction::Right),
            ("/reverse", Direction::Reverse),
            ("/stop", Direction::Stopped),
        ] {
            let response = get(&gateway, path).await;
            assert!(response.starts_with("HTTP/1.1 200 OK"), "{path}: {response}");
            assert_eq!(body(&response), "");
            assert_eq!(gateway.actuators.state().unwrap().direction, direction);
        }
    }

    #[tokio::test]
    async fn speed_route_validates_value() {
        let gateway = make_gateway();

        let ok = get(&gateway, "/speed?value=50").await;
        assert!(ok.starts_with("HTTP/1.1 200 OK"));
        assert!((gateway.actuators.state().unwrap().speed - 0.5).abs() < f32::EPSILON);

        for target in ["/speed?value=150", "/speed?value=-5", "/speed?value=abc", "/speed"] {
            let response = get(&gateway, target).await;
            assert!(response.starts_with("HTTP/1.1 400"), "{target}: {response}");
        }
        // Rejected requests leave the last good speed in place.
        assert!((gateway.actuators.state().unwrap().speed - 0.5).abs() < f32::EPSILON);
    }

    #[tokio::test]
    async fn readings_defaults_to_zero_then_tracks_latest() {
        let gateway = make_gateway();
        assert_eq!(body(&get(&gateway, "/readings").await), r#"{"gas":0}"#);

        gateway.readings.publish(SensorSample::new(37));
        gateway.readings.publish(SensorSample::new(64));
        assert_eq!(body(&get(&gateway, "/readings").await), r#"{"gas":64}"#);
    }

    #[tokio::test]
    async fn state_reports_snapshot() {
        let gateway = make_gateway();
        gateway.actuators.set_speed(25).unwrap();
        gateway.actuators.left().unwrap();

        let response = get(&gateway, "/state").await;
        let state: serde_json::Value = serde_json::from_str(body(&response)).unwrap();
        assert_eq!(state["direction"], "left");
        assert_eq!(state["left"], "forward");
        assert_eq!(state["right"], "stopped");
        assert!((state["speed"].as_f64().unwrap() - 0.25).abs() < 1e-6);
    }

    #[tokio::test]
    async fn gateway_snapshot_follows_applied_commands() {
        let gateway = make_gateway();
        gateway.apply(DriveCommand::Right).await.unwrap();

        let snapshot = timeout(WAIT, gateway.snapshot()).await.unwrap().unwrap();
        assert_eq!(snapshot.direction, Direction::Right);
        assert_eq!(snapshot.left, MotorDirection::Stopped);
        assert_eq!(snapshot.right, MotorDirection::Forward);
    }

    #[tokio::test]
    async fn health_reports_feed_status() {
        let gateway = make_gateway();
        let _viewer = gateway.frames.subscribe();
        gateway.readings.close();

        let response = get(&gateway, "/health").await;
        let health: serde_json::Value = serde_json::from_str(body(&response)).unwrap();
        assert_eq!(health["video"], "live");
        assert_eq!(health["sensor"], "closed");
        assert_eq!(health["viewers"], 1);
        assert_eq!(health["listeners"], 0);
    }

    #[tokio::test]
    async fn unknown_path_is_404_and_post_is_405() {
        let gateway = make_gateway();
        assert!(get(&gateway, "/launch").await.starts_with("HTTP/1.1 404"));

        let response = exchange(&gateway, "POST /forward HTTP/1.1\r\n\r\n").await;
        assert!(response.starts_with("HTTP/1.1 405"));
        assert_eq!(gateway.actuators.state().unwrap().direction, Direction::Stopped);
    }

    struct BrokenMotor;

    impl Motor for BrokenMotor {
        fn id(&self) -> &str {
            "left_motor"
        }
        fn set(&mut self, _direction: MotorDirection) -> Result<(), RoverError> {
            Err(RoverError::hardware("left_motor", "driver not responding"))
        }
        fn direction(&self) -> MotorDirection {
            MotorDirection::Stopped
        }
    }

    #[tokio::test]
    async fn hardware_fault_is_500() {
        let mut drive = sim_drive();
        drive.left = Box::new(BrokenMotor);
        let gateway = Gateway::new(Arc::new(ActuatorController::new(drive)));

        let response = get(&gateway, "/forward").await;
        assert!(response.starts_with("HTTP/1.1 500"), "{response}");
        assert!(body(&response).contains("driver not responding"));
    }

    // ── Streaming routes ──────────────────────────────────────────────────────

    #[tokio::test]
    async fn video_stream_ends_when_capture_closes() {
        let gateway = make_gateway();
        let (server, mut client) = tokio::io::duplex(64 * 1024);
        let handler = tokio::spawn(handle_connection(server, gateway.clone()));
        client
            .write_all(b"GET /stream.mjpg HTTP/1.1\r\n\r\n")
            .await
            .unwrap();

        // Wait for the viewer to register before publishing.
        timeout(WAIT, async {
            while gateway.frames.subscriber_count() == 0 {
                tokio::task::yield_now().await;
            }
        })
        .await
        .unwrap();
        gateway.frames.publish(Frame::from(vec![0xFF, 0xD8, 0xFF, 0xD9]));

        let mut head = vec![0u8; 512];
        let mut seen = Vec::new();
        while !seen.windows(7).any(|w| w == b"--FRAME") {
            let n = timeout(WAIT, client.read(&mut head)).await.unwrap().unwrap();
            assert!(n > 0);
            seen.extend_from_slice(&head[..n]);
        }

        gateway.frames.close();
        timeout(WAIT, handler).await.unwrap().unwrap().unwrap();
        assert_eq!(gateway.frames.subscriber_count(), 0);
        // The rest of the gateway keeps working.
        assert!(get(&gateway, "/forward").await.starts_with("HTTP/1.1 200 OK"));
    }

    #[tokio::test]
    async fn streaming_routes_on_closed_feeds_are_503() {
        let gateway = make_gateway();
        gateway.readings.close();
        gateway.frames.close();

        for target in ["/events", "/stream.mjpg"] {
            let response = get(&gateway, target).await;
            assert!(response.starts_with("HTTP/1.1 503"), "{target}: {response}");
            let error: serde_json::Value = serde_json::from_str(body(&response)).unwrap();
            assert!(error["error"].as_str().unwrap().contains("Closed"), "{response}");
        }
        assert_eq!(gateway.readings.subscriber_count(), 0);
        assert_eq!(gateway.frames.subscriber_count(), 0);
        assert!(get(&gateway, "/forward").await.starts_with("HTTP/1.1 200 OK"));
    }

    #[tokio::test]
    async fn event_stream_viewer_disconnect_is_cleaned_up() {
        let gateway = make_gateway();
        let (server, mut client) = tokio::io::duplex(4096);
        let handler = tokio::spawn(handle_connection(server, gateway.clone()));
        client
            .write_all(b"GET /events HTTP/1.1\r\n\r\n")
            .await
            .unwrap();

        timeout(WAIT, async {
            while gateway.readings.subscriber_count() == 0 {
                tokio::task::yield_now().await;
            }
        })
        .await
        .unwrap();

        drop(client);
        gateway.readings.publish(SensorSample::new(10));
        timeout(WAIT, handler).await.unwrap().unwrap().unwrap();
        assert_eq!(gateway.readings.subscriber_count(), 0);
    }

    // ── Upstream message handling ─────────────────────────────────────────────

    #[tokio::test]
    async fn upstream_direction_command_is_applied() {
        let gateway = make_gateway();
        let state = handle_upstream_message(r#"{"command":"reverse"}"#, &gateway)
            .await
            .unwrap();
        assert_eq!(state.direction, Direction::Reverse);
    }

    #[tokio::test]
    async fn upstream_speed_command_is_range_checked() {
        let gateway = make_gateway();
        let state = handle_upstream_message(r#"{"command":"speed","value":80}"#, &gateway)
            .await
            .unwrap();
        assert!((state.speed - 0.8).abs() < f32::EPSILON);

        let err = handle_upstream_message(r#"{"command":"speed","value":101}"#, &gateway)
            .await
            .unwrap_err();
        assert!(matches!(err, RoverError::InvalidCommand(_)));
        assert!((gateway.actuators.state().unwrap().speed - 0.8).abs() < f32::EPSILON);
    }

    #[tokio::test]
    async fn upstream_garbage_is_rejected() {
        let gateway = make_gateway();
        for text in ["not json", r#"{"command":"launch"}"#, r#"{"topic":"/cmd_vel"}"#] {
            let err = handle_upstream_message(text, &gateway).await.unwrap_err();
            assert!(matches!(err, RoverError::InvalidCommand(_)), "{text}");
        }
        assert_eq!(gateway.actuators.state().unwrap().direction, Direction::Stopped);
    }

    // ── Real sockets ──────────────────────────────────────────────────────────

    async fn spawn_server(gateway: Gateway) -> (SocketAddr, tokio::sync::oneshot::Sender<()>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (stop_tx, stop_rx) = tokio::sync::oneshot::channel::<()>();
        tokio::spawn(CockpitServer::new(gateway).serve_until(listener, async {
            let _ = stop_rx.await;
        }));
        (addr, stop_tx)
    }

    #[tokio::test]
    async fn tcp_round_trip() {
        let gateway = make_gateway();
        let (addr, stop) = spawn_server(gateway.clone()).await;

        let mut conn = tokio::net::TcpStream::connect(addr).await.unwrap();
        conn.write_all(b"GET /forward HTTP/1.1\r\nHost: rover\r\n\r\n")
            .await
            .unwrap();
        let mut out = String::new();
        timeout(WAIT, conn.read_to_string(&mut out)).await.unwrap().unwrap();
        assert!(out.starts_with("HTTP/1.1 200 OK"));
        assert_eq!(gateway.actuators.state().unwrap().direction, Direction::Forward);

        let _ = stop.send(());
    }

    #[tokio::test]
    async fn websocket_pushes_samples_and_accepts_commands() {
        let gateway = make_gateway();
        let (addr, stop) = spawn_server(gateway.clone()).await;

        let (mut ws, _) = tokio_tungstenite::connect_async(format!("ws://{addr}/ws"))
            .await
            .unwrap();

        ws.send(Message::Text(String::from(r#"{"command":"left"}"#).into()))
            .await
            .unwrap();
        let reply = timeout(WAIT, ws.next()).await.unwrap().unwrap().unwrap();
        let reply: serde_json::Value = serde_json::from_str(reply.to_text().unwrap()).unwrap();
        assert_eq!(reply["state"]["direction"], "left");
        assert_eq!(gateway.actuators.state().unwrap().direction, Direction::Left);

        // The session's subscription is registered before its first read.
        assert_eq!(gateway.readings.subscriber_count(), 1);
        gateway.readings.publish(SensorSample::new(88));
        let pushed = timeout(WAIT, ws.next()).await.unwrap().unwrap().unwrap();
        assert_eq!(pushed.to_text().unwrap(), r#"{"gas":88}"#);

        let _ = stop.send(());
    }

    async fn ws_command(
        ws: &mut tokio_tungstenite::WebSocketStream<
            tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
        >,
        command: &str,
    ) -> serde_json::Value {
        let text = format!(r#"{{"command":"{command}"}}"#);
        ws.send(Message::Text(text.into())).await.unwrap();
        let reply = timeout(WAIT, ws.next()).await.unwrap().unwrap().unwrap();
        serde_json::from_str(reply.to_text().unwrap()).unwrap()
    }

    #[tokio::test]
    async fn websocket_accepts_commands_without_sensor_feed() {
        let gateway = make_gateway();
        gateway.readings.close();
        let (addr, stop) = spawn_server(gateway.clone()).await;

        let (mut ws, _) = tokio_tungstenite::connect_async(format!("ws://{addr}/ws"))
            .await
            .unwrap();

        let reply = ws_command(&mut ws, "forward").await;
        assert_eq!(reply["state"]["direction"], "forward");
        assert_eq!(gateway.actuators.state().unwrap().direction, Direction::Forward);

        let _ = stop.send(());
    }

    #[tokio::test]
    async fn websocket_outlives_sensor_feed_closing_mid_session() {
        let gateway = make_gateway();
        let (addr, stop) = spawn_server(gateway.clone()).await;

        let (mut ws, _) = tokio_tungstenite::connect_async(format!("ws://{addr}/ws"))
            .await
            .unwrap();
        let reply = ws_command(&mut ws, "left").await;
        assert_eq!(reply["state"]["direction"], "left");

        gateway.readings.close();
        timeout(WAIT, async {
            while gateway.readings.subscriber_count() > 0 {
                tokio::task::yield_now().await;
            }
        })
        .await
        .unwrap();

        let reply = ws_command(&mut ws, "reverse").await;
        assert_eq!(reply["state"]["direction"], "reverse");
        assert_eq!(gateway.actuators.state().unwrap().direction, Direction::Reverse);

        let _ = stop.send(());
    }
}
