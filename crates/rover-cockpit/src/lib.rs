//! `rover-cockpit` – the viewer-facing HTTP surface.
//!
//! A small HTTP/1.1 server on a raw Tokio `TcpListener` (default port
//! `5000`).  Each connection is one request:
//!
//! | Route | Effect | Response |
//! |---|---|---|
//! | `/` | – | embedded cockpit page |
//! | `/forward` `/left` `/stop` `/right` `/reverse` | drive command | empty 200 |
//! | `/speed?value=<0-100>` | speed command | empty 200, 400 if invalid |
//! | `/readings` | latest gas sample | `{"gas": <int>}` |
//! | `/state` | drive snapshot | JSON |
//! | `/health` | feed status | JSON |
//! | `/events` | sensor subscription | Server-Sent Events |
//! | `/stream.mjpg` | frame subscription | `multipart/x-mixed-replace; boundary=FRAME` |
//!
//! A request carrying `Upgrade: websocket` on any path becomes a
//! bidirectional session: sensor samples go down, `{"command": ...}` messages
//! come up and are applied through the same [`ActuatorController`].
//!
//! # Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use rover_cockpit::{CockpitServer, Gateway};
//! # fn drive() -> rover_runtime::DriveTrain { unimplemented!() }
//!
//! #[tokio::main]
//! async fn main() {
//!     let gateway = Gateway::new(Arc::new(rover_runtime::ActuatorController::new(drive())));
//!     CockpitServer::new(gateway)
//!         .run()
//!         .await
//!         .expect("cockpit server failed");
//! }
//! ```
//!
//! [`ActuatorController`]: rover_runtime::ActuatorController

pub mod http;
pub mod server;
pub mod stream;

pub use server::{CockpitServer, Gateway, DEFAULT_PORT};
pub use stream::{StreamEnd, StreamOutcome};
