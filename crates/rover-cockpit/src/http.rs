//! Minimal HTTP/1.1 request parsing, routing and response writing.
//!
//! Only what the cockpit needs: GET requests without bodies, one request per
//! connection, query strings of plain `key=value` pairs.

use rover_types::{DriveCommand, RoverError, SpeedPercent};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Upper bound on the request line plus headers.
pub const MAX_HEAD_BYTES: usize = 8 * 1024;

/// A parsed request head.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    pub method: String,
    pub path: String,
    pub query: Option<String>,
    headers: Vec<(String, String)>,
}

impl Request {
    /// Parse a request line followed by header lines.
    pub fn parse(head: &str) -> Result<Self, RoverError> {
        let mut lines = head.lines().skip_while(|l| l.trim().is_empty());
        let request_line = lines
            .next()
            .ok_or_else(|| RoverError::InvalidCommand("empty request".to_string()))?;

        let mut parts = request_line.split_whitespace();
        let (Some(method), Some(target)) = (parts.next(), parts.next()) else {
            return Err(RoverError::InvalidCommand(format!(
                "malformed request line: {request_line:?}"
            )));
        };
        let (path, query) = match target.split_once('?') {
            Some((path, query)) => (path, Some(query.to_string())),
            None => (target, None),
        };

        let headers = lines
            .take_while(|l| !l.trim().is_empty())
            .filter_map(|l| l.split_once(':'))
            .map(|(k, v)| (k.trim().to_string(), v.trim().to_string()))
            .collect();

        Ok(Self {
            method: method.to_string(),
            path: path.to_string(),
            query,
            headers,
        })
    }

    /// Case-insensitive header lookup.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn query_param(&self, key: &str) -> Option<&str> {
        self.query
            .as_deref()?
            .split('&')
            .filter_map(|pair| pair.split_once('=').or(Some((pair, ""))))
            .find(|(k, _)| *k == key)
            .map(|(_, v)| v)
    }

    pub fn is_websocket_upgrade(&self) -> bool {
        self.header("upgrade")
            .is_some_and(|v| v.to_ascii_lowercase().contains("websocket"))
    }
}

/// Read one request head (up to and including the blank line).
pub async fn read_head<R: AsyncBufRead + Unpin>(reader: &mut R) -> Result<String, RoverError> {
    let mut limited = reader.take(MAX_HEAD_BYTES as u64);
    let mut head = String::new();
    loop {
        let mut line = String::new();
        if limited.read_line(&mut line).await? == 0 {
            return Err(if head.is_empty() {
                RoverError::Io("connection closed before request".to_string())
            } else {
                RoverError::InvalidCommand("request head too large or truncated".to_string())
            });
        }
        let blank = line.trim().is_empty();
        if blank && head.trim().is_empty() {
            continue;
        }
        head.push_str(&line);
        if blank {
            return Ok(head);
        }
    }
}

/// What a request asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    Index,
    Command(DriveCommand),
    Readings,
    State,
    Health,
    Events,
    VideoStream,
    WebSocket,
    NotFound,
}

impl Route {
    /// Map a GET request to its route, validating command parameters.
    ///
    /// # Errors
    ///
    /// Returns [`RoverError::InvalidCommand`] when `/speed` has a missing,
    /// non-integer or out-of-range `value`.
    pub fn resolve(req: &Request) -> Result<Self, RoverError> {
        if req.is_websocket_upgrade() {
            return Ok(Route::WebSocket);
        }
        let route = match req.path.as_str() {
            "/" | "/index.html" => Route::Index,
            "/forward" => Route::Command(DriveCommand::Forward),
            "/left" => Route::Command(DriveCommand::Left),
            "/stop" => Route::Command(DriveCommand::Stop),
            "/right" => Route::Command(DriveCommand::Right),
            "/reverse" => Route::Command(DriveCommand::Reverse),
            "/speed" => Route::Command(DriveCommand::Speed {
                value: parse_speed(req.query_param("value"))?,
            }),
            "/readings" => Route::Readings,
            "/state" => Route::State,
            "/health" => Route::Health,
            "/events" => Route::Events,
            "/stream.mjpg" => Route::VideoStream,
            _ => Route::NotFound,
        };
        Ok(route)
    }
}

fn parse_speed(value: Option<&str>) -> Result<SpeedPercent, RoverError> {
    let value = value.ok_or_else(|| {
        RoverError::InvalidCommand("missing `value` query parameter".to_string())
    })?;
    let percent = value.trim().parse::<i64>().map_err(|_| {
        RoverError::InvalidCommand(format!("speed must be an integer, got {value:?}"))
    })?;
    SpeedPercent::try_from(percent)
}

/// HTTP status for an error surfaced to a client.
pub fn error_status(e: &RoverError) -> u16 {
    match e {
        RoverError::InvalidCommand(_) => 400,
        RoverError::Closed(_) => 503,
        _ => 500,
    }
}

pub fn reason_phrase(status: u16) -> &'static str {
    match status {
        101 => "Switching Protocols",
        200 => "OK",
        400 => "Bad Request",
        404 => "Not Found",
        405 => "Method Not Allowed",
        500 => "Internal Server Error",
        503 => "Service Unavailable",
        _ => "Unknown",
    }
}

/// Write a complete, non-streaming response and close the exchange.
pub async fn write_response<W: AsyncWrite + Unpin>(
    writer: &mut W,
    status: u16,
    content_type: &str,
    body: &[u8],
) -> Result<(), RoverError> {
    let head = format!(
        "HTTP/1.1 {status} {}\r\n\
         Content-Type: {content_type}\r\n\
         Content-Length: {}\r\n\
         Cache-Control: no-cache\r\n\
         Connection: close\r\n\
         \r\n",
        reason_phrase(status),
        body.len(),
    );
    writer.write_all(head.as_bytes()).await?;
    writer.write_all(body).await?;
    writer.flush().await?;
    Ok(())
}

/// Write the head of an open-ended streaming response.
pub async fn write_stream_head<W: AsyncWrite + Unpin>(
    writer: &mut W,
    content_type: &str,
) -> Result<(), RoverError> {
    let head = format!(
        "HTTP/1.1 200 OK\r\n\
         Content-Type: {content_type}\r\n\
         Cache-Control: no-cache, private\r\n\
         Pragma: no-cache\r\n\
         Connection: close\r\n\
         \r\n"
    );
    writer.write_all(head.as_bytes()).await?;
    writer.flush().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::BufReader;

    fn get(target: &str) -> Request {
        Request::parse(&format!("GET {target} HTTP/1.1\r\nHost: rover\r\n\r\n")).unwrap()
    }

    #[test]
    fn parse_request_line_and_headers() {
        let req = Request::parse(
            "GET /speed?value=50 HTTP/1.1\r\nHost: rover.local\r\nUpgrade: WebSocket\r\n\r\n",
        )
        .unwrap();
        assert_eq!(req.method, "GET");
        assert_eq!(req.path, "/speed");
        assert_eq!(req.query_param("value"), Some("50"));
        assert_eq!(req.header("host"), Some("rover.local"));
        assert!(req.is_websocket_upgrade());
    }

    #[test]
    fn parse_rejects_garbage() {
        assert!(Request::parse("").is_err());
        assert!(Request::parse("GARBAGE\r\n\r\n").is_err());
    }

    #[test]
    fn query_param_handles_missing_and_flag_values() {
        let req = get("/speed?debug&value=7");
        assert_eq!(req.query_param("value"), Some("7"));
        assert_eq!(req.query_param("debug"), Some(""));
        assert_eq!(req.query_param("other"), None);
        assert_eq!(get("/speed").query_param("value"), None);
    }

    #[test]
    fn resolve_command_routes() {
        assert_eq!(
            Route::resolve(&get("/forward")).unwrap(),
            Route::Command(DriveCommand::Forward)
        );
        assert_eq!(
            Route::resolve(&get("/stop")).unwrap(),
            Route::Command(DriveCommand::Stop)
        );
        assert_eq!(
            Route::resolve(&get("/speed?value=100")).unwrap(),
            Route::Command(DriveCommand::Speed {
                value: SpeedPercent::new(100).unwrap()
            })
        );
        assert_eq!(Route::resolve(&get("/stream.mjpg")).unwrap(), Route::VideoStream);
        assert_eq!(Route::resolve(&get("/nope")).unwrap(), Route::NotFound);
    }

    #[test]
    fn resolve_rejects_invalid_speed() {
        for target in ["/speed?value=150", "/speed?value=-1", "/speed?value=fast", "/speed"] {
            let result = Route::resolve(&get(target));
            assert!(
                matches!(result, Err(RoverError::InvalidCommand(_))),
                "{target} must be rejected"
            );
        }
    }

    #[test]
    fn error_status_mapping() {
        assert_eq!(error_status(&RoverError::InvalidCommand("x".into())), 400);
        assert_eq!(error_status(&RoverError::hardware("left_motor", "x")), 500);
        assert_eq!(error_status(&RoverError::Closed("frames".into())), 503);
    }

    #[tokio::test]
    async fn read_head_stops_at_blank_line() {
        let raw: &[u8] = b"\r\nGET /left HTTP/1.1\r\nHost: x\r\n\r\nleftover";
        let mut reader = BufReader::new(raw);
        let head = read_head(&mut reader).await.unwrap();
        assert!(head.starts_with("GET /left"));
        assert!(head.ends_with("\r\n\r\n"));
    }

    #[tokio::test]
    async fn read_head_rejects_oversized_requests() {
        let mut raw = b"GET / HTTP/1.1\r\n".to_vec();
        raw.extend(std::iter::repeat_n(b'a', MAX_HEAD_BYTES + 10));
        let mut reader = BufReader::new(raw.as_slice());
        let result = read_head(&mut reader).await;
        assert!(matches!(result, Err(RoverError::InvalidCommand(_))));
    }

    #[tokio::test]
    async fn read_head_reports_early_close() {
        let mut reader = BufReader::new(&b""[..]);
        assert!(matches!(
            read_head(&mut reader).await,
            Err(RoverError::Io(_))
        ));
    }

    #[tokio::test]
    async fn write_response_formats_head_and_body() {
        let mut out = Vec::new();
        write_response(&mut out, 200, "application/json", br#"{"gas":1}"#)
            .await
            .unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.starts_with("HTTP/1.1 200 OK\r\n"));
        assert!(text.contains("Content-Length: 9\r\n"));
        assert!(text.ends_with("\r\n\r\n{\"gas\":1}"));
    }
}
