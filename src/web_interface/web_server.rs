use super::request::{
    content_length, find_header_end, is_suspicious_path, parse_form, parse_request_line,
    route_path,
};
use super::response::Response;
use super::routes::{resolve, Route};
use super::templates::{Page, TemplateSet};
use crate::authentication::{authenticate, CredentialStore};
use crate::error_handling::types::HttpError;
use crate::network::address_resolver::AddressResolver;
use crate::session_management::SessionStore;
use log::{debug, error, info, warn};
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::time::timeout;
use uuid::Uuid;

const READ_CHUNK: usize = 1024;

/// One-request-per-connection HTTP handler for the portal pages and the login form.
///
/// The handler is transport-agnostic: plain TCP, TLS and in-memory streams all go through
/// [`WebServer::handle_connection`].
pub struct WebServer {
    credentials: Arc<dyn CredentialStore>,
    resolver: Arc<dyn AddressResolver>,
    sessions: Arc<SessionStore>,
    templates: Arc<TemplateSet>,
    max_request_bytes: usize,
    read_timeout: Duration,
}

enum Head {
    /// Request bytes read so far and the offset where the body starts.
    Complete(Vec<u8>, usize),
    TooLarge,
    Closed,
}

impl WebServer {
    pub fn new(
        credentials: Arc<dyn CredentialStore>,
        resolver: Arc<dyn AddressResolver>,
        sessions: Arc<SessionStore>,
        templates: Arc<TemplateSet>,
        max_request_bytes: usize,
        read_timeout: Duration,
    ) -> Self {
        Self {
            credentials,
            resolver,
            sessions,
            templates,
            max_request_bytes,
            read_timeout,
        }
    }

    /// Serves exactly one request on `stream`, then closes it.
    ///
    /// Never fails: every problem ends as an error response or a silent close.
    pub async fn handle_connection<S>(&self, mut stream: S, peer: SocketAddr, id: Uuid)
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let peer_ip = peer.ip().to_canonical();

        let Some(response) = self.respond(&mut stream, peer_ip, id).await else {
            debug!("[{}] Closing without response", id);
            return;
        };

        debug!("[{}] Responding {}", id, response.status);
        let bytes = response.to_bytes();
        let sent = timeout(self.read_timeout, async {
            stream.write_all(&bytes).await?;
            stream.flush().await?;
            stream.shutdown().await
        })
        .await;
        match sent {
            Ok(Ok(())) => self.drain(&mut stream).await,
            Ok(Err(e)) => debug!("[{}] Failed to send response: {}", id, e),
            Err(_) => debug!("[{}] Timed out sending response", id),
        }
    }

    async fn respond<S>(&self, stream: &mut S, peer: IpAddr, id: Uuid) -> Option<Response>
    where
        S: AsyncRead + Unpin,
    {
        let (buf, head_end) = match self.read_head(stream, id).await {
            Head::Complete(buf, head_end) => (buf, head_end),
            Head::TooLarge => {
                warn!("[{}] Request from {} exceeds {} bytes", id, peer, self.max_request_bytes);
                return Some(Response::bad_request("Request too large."));
            }
            Head::Closed => return None,
        };

        let line = match parse_request_line(&buf[..head_end]) {
            Ok(line) => line,
            Err(e) => {
                warn!("[{}] {} from {}", id, e, peer);
                return None;
            }
        };
        info!("[{}] {} {} from {}", id, line.method, line.target, peer);

        if buf.len() > self.max_request_bytes
            || content_length(&buf[..head_end], self.max_request_bytes)
                == Err(HttpError::RequestTooLarge)
        {
            warn!("[{}] Declared body from {} exceeds {} bytes", id, peer, self.max_request_bytes);
            return Some(Response::bad_request("Request too large."));
        }

        let path = route_path(&line.target);
        let response = match resolve(&line.method, path) {
            Route::Page(page) => Response::ok(self.templates.get(page)),
            Route::NotFound => {
                if is_suspicious_path(path) {
                    warn!("[{}] Rejected path {:?} from {}", id, line.target, peer);
                }
                Response::not_found()
            }
            Route::MethodNotAllowed(allow) => Response::method_not_allowed(allow),
            Route::Login => self.login(stream, buf, head_end, peer, id).await,
        };
        Some(response)
    }

    /// Reads until the header block is complete, the size cap is crossed, or the peer stops
    /// sending. A peer that closes mid-headers gets whatever it sent parsed as-is.
    async fn read_head<S>(&self, stream: &mut S, id: Uuid) -> Head
    where
        S: AsyncRead + Unpin,
    {
        let mut buf = Vec::with_capacity(READ_CHUNK);
        let mut chunk = [0u8; READ_CHUNK];

        loop {
            match timeout(self.read_timeout, stream.read(&mut chunk)).await {
                Ok(Ok(0)) => {
                    if buf.is_empty() {
                        return Head::Closed;
                    }
                    let end = buf.len();
                    return Head::Complete(buf, end);
                }
                Ok(Ok(n)) => buf.extend_from_slice(&chunk[..n]),
                Ok(Err(e)) => {
                    debug!("[{}] Read error: {}", id, e);
                    return Head::Closed;
                }
                Err(_) => {
                    debug!("[{}] Read timed out after {} byte(s)", id, buf.len());
                    return Head::Closed;
                }
            }

            match find_header_end(&buf) {
                Some(end) if end > self.max_request_bytes => return Head::TooLarge,
                Some(end) => return Head::Complete(buf, end),
                None if buf.len() > self.max_request_bytes => return Head::TooLarge,
                None => {}
            }
        }
    }

    async fn login<S>(
        &self,
        stream: &mut S,
        buf: Vec<u8>,
        head_end: usize,
        peer: IpAddr,
        id: Uuid,
    ) -> Response
    where
        S: AsyncRead + Unpin,
    {
        let body = match self.read_body(stream, buf, head_end, id).await {
            Ok(body) => body,
            Err(e) => {
                warn!("[{}] Rejected login body from {}: {}", id, peer, e);
                return Response::bad_request("Malformed login request.");
            }
        };
        let form = match parse_form(&body) {
            Ok(form) => form,
            Err(e) => {
                warn!("[{}] Rejected login body from {}: {}", id, peer, e);
                return Response::bad_request("Malformed login request.");
            }
        };
        let username = form.get("username").cloned().unwrap_or_default();
        let password = form.get("password").cloned().unwrap_or_default();

        let credentials = self.credentials.clone();
        let user = username.clone();
        let verdict = tokio::task::spawn_blocking(move || {
            authenticate(credentials.as_ref(), &user, &password)
        })
        .await;
        match verdict {
            Ok(Ok(true)) => {}
            Ok(Ok(false)) => {
                info!("[{}] Login failed for {:?} from {}", id, username, peer);
                return Response::ok(self.templates.get(Page::Error));
            }
            Ok(Err(e)) => {
                error!("[{}] Credential validation fault: {}", id, e);
                return Response::internal_error();
            }
            Err(e) => {
                error!("[{}] Credential validation task failed: {}", id, e);
                return Response::internal_error();
            }
        }

        let resolver = self.resolver.clone();
        let sessions = self.sessions.clone();
        let user = username.clone();
        let created = tokio::task::spawn_blocking(move || {
            let mac = resolver.resolve(peer);
            sessions.create(&user, peer, mac, None)
        })
        .await;
        match created {
            Ok(Ok(session)) => {
                info!(
                    "[{}] Login succeeded for {:?} from {} ({})",
                    id,
                    username,
                    peer,
                    session.mac.as_ref().map_or("no MAC".to_string(), |m| m.to_string())
                );
                Response::ok(self.templates.get(Page::Success))
            }
            Ok(Err(e)) => {
                error!("[{}] Session not created for {:?}: {}", id, username, e);
                Response::internal_error()
            }
            Err(e) => {
                error!("[{}] Session creation task failed: {}", id, e);
                Response::internal_error()
            }
        }
    }

    /// Collects exactly `Content-Length` body bytes, reusing what arrived with the headers.
    async fn read_body<S>(
        &self,
        stream: &mut S,
        mut buf: Vec<u8>,
        head_end: usize,
        id: Uuid,
    ) -> Result<Vec<u8>, HttpError>
    where
        S: AsyncRead + Unpin,
    {
        let expected = content_length(&buf[..head_end], self.max_request_bytes)?;
        let mut body = buf.split_off(head_end);
        body.truncate(expected);

        let mut chunk = [0u8; READ_CHUNK];
        while body.len() < expected {
            let want = (expected - body.len()).min(READ_CHUNK);
            match timeout(self.read_timeout, stream.read(&mut chunk[..want])).await {
                Ok(Ok(0)) => break,
                Ok(Ok(n)) => body.extend_from_slice(&chunk[..n]),
                Ok(Err(e)) => {
                    debug!("[{}] Body read error: {}", id, e);
                    break;
                }
                Err(_) => {
                    debug!("[{}] Body read timed out", id);
                    break;
                }
            }
        }

        if body.len() < expected {
            return Err(HttpError::IncompleteBody {
                expected,
                received: body.len(),
            });
        }
        Ok(body)
    }

    // Discard what the peer is still sending so closing does not reset the connection
    // before the response is read. The whole drain shares one read timeout.
    async fn drain<S>(&self, stream: &mut S)
    where
        S: AsyncRead + Unpin,
    {
        let mut chunk = [0u8; READ_CHUNK];
        let mut discarded = 0;
        let _ = timeout(self.read_timeout, async {
            while discarded < self.max_request_bytes {
                match stream.read(&mut chunk).await {
                    Ok(n) if n > 0 => discarded += n,
                    _ => break,
                }
            }
        })
        .await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error_handling::types::AuthError;
    use crate::firewall::fake_backend::FakePacketFilter;
    use crate::firewall::Firewall;
    use crate::network::address_resolver::NoopResolver;
    use crate::network::types::MacAddr;
    use crate::storage::FileStorage;
    use tempfile::TempDir;
    use tokio::io::duplex;
    use tokio_test::io::Builder;

    struct FixedResolver(MacAddr);

    impl AddressResolver for FixedResolver {
        fn resolve(&self, _ip: IpAddr) -> Option<MacAddr> {
            Some(self.0.clone())
        }
    }

    struct FaultyStore;

    impl CredentialStore for FaultyStore {
        fn validate(&self, _username: &str, _secret: &str) -> Result<bool, AuthError> {
            Err(AuthError::BackendFault("users table vanished".to_string()))
        }
    }

    struct Harness {
        _dir: TempDir,
        sessions: Arc<SessionStore>,
        server: WebServer,
    }

    fn templates() -> Arc<TemplateSet> {
        Arc::new(
            TemplateSet::embedded()
                .with_page(Page::Index, "INDEX")
                .with_page(Page::Success, "SUCCESS")
                .with_page(Page::Error, "FAILURE"),
        )
    }

    fn harness_with(
        credentials: Arc<dyn CredentialStore>,
        resolver: Arc<dyn AddressResolver>,
        max_request_bytes: usize,
    ) -> Harness {
        let dir = TempDir::new().unwrap();
        let storage = Arc::new(FileStorage::new(dir.path().join("sessions.json")));
        let firewall = Arc::new(Firewall::new(
            Arc::new(FakePacketFilter::new()),
            "eth1",
            80,
            32,
        ));
        let sessions = Arc::new(SessionStore::open(storage, firewall, 3600));
        let server = WebServer::new(
            credentials,
            resolver,
            sessions.clone(),
            templates(),
            max_request_bytes,
            Duration::from_millis(200),
        );
        Harness {
            _dir: dir,
            sessions,
            server,
        }
    }

    fn harness() -> Harness {
        let users = crate::authentication::FileCredentialStore::parse("admin:admin\n").unwrap();
        harness_with(Arc::new(users), Arc::new(NoopResolver), 4096)
    }

    fn peer() -> SocketAddr {
        "10.0.2.15:50000".parse().unwrap()
    }

    async fn exchange(server: &WebServer, request: &[u8]) -> String {
        let (mut client, server_side) = duplex(64 * 1024);
        client.write_all(request).await.unwrap();
        client.shutdown().await.unwrap();
        server
            .handle_connection(server_side, peer(), Uuid::new_v4())
            .await;
        let mut out = Vec::new();
        client.read_to_end(&mut out).await.unwrap();
        String::from_utf8(out).unwrap()
    }

    fn login_request(body: &str) -> Vec<u8> {
        format!(
            "POST /login HTTP/1.1\r\nHost: portal\r\nContent-Type: application/x-www-form-urlencoded\r\nContent-Length: {}\r\n\r\n{}",
            body.len(),
            body
        )
        .into_bytes()
    }

    #[tokio::test]
    async fn test_get_index_exact_bytes() {
        let h = harness();
        let mock = Builder::new()
            .read(b"GET / HTTP/1.1\r\nHost: portal\r\n\r\n")
            .write(
                b"HTTP/1.1 200 OK\r\nContent-Type: text/html; charset=utf-8\r\nContent-Length: 5\r\nConnection: close\r\n\r\nINDEX",
            )
            .build();
        h.server.handle_connection(mock, peer(), Uuid::new_v4()).await;
    }

    #[tokio::test]
    async fn test_malformed_request_line_gets_no_response() {
        let h = harness();
        let mock = Builder::new().read(b"HELLO\r\n\r\n").build();
        h.server.handle_connection(mock, peer(), Uuid::new_v4()).await;
    }

    #[tokio::test]
    async fn test_silent_peer_is_dropped() {
        let h = harness();
        let (_client, server_side) = duplex(1024);
        h.server
            .handle_connection(server_side, peer(), Uuid::new_v4())
            .await;
    }

    #[tokio::test]
    async fn test_headers_split_across_reads() {
        let h = harness();
        let mock = Builder::new()
            .read(b"GET /ind")
            .read(b"ex?from=lobby HTTP/1.1\r\nHo")
            .read(b"st: portal\r\n\r\n")
            .write(
                b"HTTP/1.1 200 OK\r\nContent-Type: text/html; charset=utf-8\r\nContent-Length: 5\r\nConnection: close\r\n\r\nINDEX",
            )
            .build();
        h.server.handle_connection(mock, peer(), Uuid::new_v4()).await;
    }

    #[tokio::test]
    async fn test_unknown_path_and_traversal_are_404() {
        let h = harness();
        let out = exchange(&h.server, b"GET /admin HTTP/1.1\r\n\r\n").await;
        assert!(out.starts_with("HTTP/1.1 404 Not Found\r\n"));
        let out = exchange(&h.server, b"GET /../../etc/passwd HTTP/1.1\r\n\r\n").await;
        assert!(out.starts_with("HTTP/1.1 404 Not Found\r\n"));
        let out = exchange(&h.server, b"POST /%2e%2e HTTP/1.1\r\n\r\n").await;
        assert!(out.starts_with("HTTP/1.1 404 Not Found\r\n"));
    }

    #[tokio::test]
    async fn test_405_allow_header() {
        let h = harness();
        let out = exchange(&h.server, b"PUT /login HTTP/1.1\r\n\r\n").await;
        assert!(out.starts_with("HTTP/1.1 405 Method Not Allowed\r\n"));
        assert!(out.contains("\r\nAllow: GET, POST\r\n"));

        let out = exchange(&h.server, b"POST /index HTTP/1.1\r\nContent-Length: 3\r\n\r\na=b").await;
        assert!(out.contains("\r\nAllow: GET\r\n"));
    }

    #[tokio::test]
    async fn test_oversized_headers_are_400() {
        let h = harness();
        let mut request = b"GET / HTTP/1.1\r\nX-Filler: ".to_vec();
        request.extend(std::iter::repeat(b'a').take(5000));
        let out = exchange(&h.server, &request).await;
        assert!(out.starts_with("HTTP/1.1 400 Bad Request\r\n"));
    }

    #[tokio::test]
    async fn test_declared_oversized_body_is_400_on_any_route() {
        let h = harness();
        let out = exchange(&h.server, b"GET / HTTP/1.1\r\nContent-Length: 5000\r\n\r\n").await;
        assert!(out.starts_with("HTTP/1.1 400 Bad Request\r\n"));
        let out = exchange(&h.server, b"POST /login HTTP/1.1\r\nContent-Length: 5000\r\n\r\n").await;
        assert!(out.starts_with("HTTP/1.1 400 Bad Request\r\n"));
        assert!(h.sessions.is_empty());
    }

    #[tokio::test]
    async fn test_login_bad_content_length() {
        let h = harness();
        for head in [
            "POST /login HTTP/1.1\r\n\r\nusername=admin&password=admin",
            "POST /login HTTP/1.1\r\nContent-Length: 0\r\n\r\n",
            "POST /login HTTP/1.1\r\nContent-Length: -4\r\n\r\n",
            "POST /login HTTP/1.1\r\nContent-Length: ten\r\n\r\n",
        ] {
            let out = exchange(&h.server, head.as_bytes()).await;
            assert!(out.starts_with("HTTP/1.1 400 Bad Request\r\n"), "{:?}", head);
        }
        assert!(h.sessions.is_empty());
    }

    #[tokio::test]
    async fn test_login_truncated_body() {
        let h = harness();
        let out = exchange(
            &h.server,
            b"POST /login HTTP/1.1\r\nContent-Length: 40\r\n\r\nusername=admin",
        )
        .await;
        assert!(out.starts_with("HTTP/1.1 400 Bad Request\r\n"));
        assert!(h.sessions.is_empty());
    }

    #[tokio::test]
    async fn test_login_malformed_form() {
        let h = harness();
        let out = exchange(&h.server, &login_request("garbage")).await;
        assert!(out.starts_with("HTTP/1.1 400 Bad Request\r\n"));
    }

    #[tokio::test]
    async fn test_login_wrong_and_blank_passwords() {
        let h = harness();
        for body in [
            "username=admin&password=wrong",
            "username=admin&password=",
            "username=&password=admin",
            "other=1",
        ] {
            let out = exchange(&h.server, &login_request(body)).await;
            assert!(out.starts_with("HTTP/1.1 200 OK\r\n"), "{:?}", body);
            assert!(out.ends_with("FAILURE"), "{:?}", body);
        }
        assert!(h.sessions.is_empty());
    }

    #[tokio::test]
    async fn test_login_success_creates_session() {
        let h = harness();
        let out = exchange(&h.server, &login_request("username=admin&password=admin")).await;
        assert!(out.starts_with("HTTP/1.1 200 OK\r\n"));
        assert!(out.ends_with("SUCCESS"));

        let session = h.sessions.get(peer().ip(), None).unwrap();
        assert_eq!(session.username, "admin");
    }

    #[tokio::test]
    async fn test_login_pins_resolved_mac() {
        let users = crate::authentication::FileCredentialStore::parse("admin:admin\n").unwrap();
        let mac = MacAddr::parse("aa:bb:cc:dd:ee:ff").unwrap();
        let h = harness_with(
            Arc::new(users),
            Arc::new(FixedResolver(mac.clone())),
            4096,
        );
        exchange(&h.server, &login_request("username=admin&password=admin")).await;

        assert!(h.sessions.get(peer().ip(), None).is_none());
        assert!(h.sessions.get(peer().ip(), Some(&mac)).is_some());
    }

    #[tokio::test]
    async fn test_validation_fault_is_generic_500() {
        let h = harness_with(Arc::new(FaultyStore), Arc::new(NoopResolver), 4096);
        let out = exchange(&h.server, &login_request("username=admin&password=admin")).await;
        assert!(out.starts_with("HTTP/1.1 500 Internal Server Error\r\n"));
        assert!(!out.contains("vanished"));
        assert!(h.sessions.is_empty());
    }

    #[tokio::test]
    async fn test_ipv4_mapped_peer_is_canonical() {
        let h = harness();
        let (mut client, server_side) = duplex(64 * 1024);
        client
            .write_all(&login_request("username=admin&password=admin"))
            .await
            .unwrap();
        client.shutdown().await.unwrap();
        h.server
            .handle_connection(
                server_side,
                "[::ffff:10.0.2.15]:50000".parse().unwrap(),
                Uuid::new_v4(),
            )
            .await;

        assert!(h.sessions.get("10.0.2.15".parse().unwrap(), None).is_some());
    }

    #[tokio::test]
    async fn test_trickling_peer_released_after_response() {
        let h = harness();
        let (client, server_side) = duplex(64 * 1024);
        let (mut reader, mut writer) = tokio::io::split(client);
        let trickle = tokio::spawn(async move {
            writer.write_all(b"GET / HTTP/1.1\r\n\r\n").await?;
            for _ in 0..100 {
                tokio::time::sleep(Duration::from_millis(50)).await;
                writer.write_all(b"x").await?;
            }
            Ok::<_, std::io::Error>(())
        });

        let started = std::time::Instant::now();
        h.server
            .handle_connection(server_side, peer(), Uuid::new_v4())
            .await;
        assert!(started.elapsed() < Duration::from_secs(1));

        let mut out = Vec::new();
        reader.read_to_end(&mut out).await.unwrap();
        assert!(String::from_utf8(out)
            .unwrap()
            .starts_with("HTTP/1.1 200 OK\r\n"));
        trickle.abort();
    }
}
