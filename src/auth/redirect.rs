//! Redirect handling: loopback listener for popup sign-in and parsing of the
//! URL the identity provider redirects back to.

use std::io;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinSet;
use url::Url;

use super::AuthError;

const SUCCESS_PAGE: &str = "<html><body><h3>Signed in.</h3>\
<p>You can close this window and return to the terminal.</p></body></html>";

/// Extract the authorization code from a redirect URL, checking the CSRF state.
pub(crate) fn parse_redirect_response(url: &str, expected_state: &str) -> Result<String, AuthError> {
    let url = Url::parse(url).map_err(|e| AuthError::InvalidResponse(format!("{}: {}", url, e)))?;

    let mut code = None;
    let mut state = None;
    let mut error = None;
    let mut description = None;
    // Response parameters come in the query, or the fragment for response_mode=fragment.
    let fragment_pairs = url
        .fragment()
        .map(|f| url::form_urlencoded::parse(f.as_bytes()).into_owned().collect::<Vec<_>>())
        .unwrap_or_default();
    for (key, value) in url.query_pairs().into_owned().chain(fragment_pairs) {
        match key.as_str() {
            "code" => code = Some(value),
            "state" => state = Some(value),
            "error" => error = Some(value),
            "error_description" => description = Some(value),
            _ => {}
        }
    }

    if let Some(code) = error {
        return Err(AuthError::Server {
            code,
            description: description.unwrap_or_default(),
        });
    }
    if state.as_deref() != Some(expected_state) {
        return Err(AuthError::StateMismatch);
    }
    code.ok_or_else(|| AuthError::InvalidResponse("redirect carries no authorization code".into()))
}

fn is_loopback(url: &Url) -> bool {
    matches!(url.host_str(), Some("localhost") | Some("127.0.0.1") | Some("[::1]"))
}

/// How long a connection may take to send its request line and headers.
/// Browsers open speculative sockets that never send anything.
const REQUEST_READ_TIMEOUT: Duration = Duration::from_secs(10);

/// Listeners on 127.0.0.1 and ::1 sharing one port. `localhost` may resolve
/// to either, so both are bound when the host allows it.
async fn bind_dual_stack(
    port: u16,
) -> Result<(Option<TcpListener>, Option<TcpListener>, u16), AuthError> {
    let mut port = port;
    let mut last_err = None;
    let mut bound: [Option<TcpListener>; 2] = [None, None];
    let hosts: [IpAddr; 2] = [Ipv4Addr::LOCALHOST.into(), Ipv6Addr::LOCALHOST.into()];

    for (slot, host) in bound.iter_mut().zip(hosts) {
        match TcpListener::bind((host, port)).await {
            Ok(listener) => {
                if port == 0 {
                    port = listener.local_addr()?.port();
                }
                *slot = Some(listener);
            }
            Err(e) => {
                tracing::debug!("Loopback bind on {}:{} failed: {}", host, port, e);
                last_err = Some(e);
            }
        }
    }

    let [v4, v6] = bound;
    if v4.is_none() && v6.is_none() {
        let err = last_err.unwrap_or_else(|| io::Error::from(io::ErrorKind::AddrNotAvailable));
        return Err(err.into());
    }
    Ok((v4, v6, port))
}

/// One-shot HTTP listener on the loopback interface receiving the sign-in redirect.
pub(crate) struct LoopbackListener {
    v4: Option<TcpListener>,
    v6: Option<TcpListener>,
    redirect_uri: String,
    path: String,
}

impl LoopbackListener {
    /// Bind on the port of a loopback `redirect_uri`, else on an ephemeral port.
    pub async fn bind(redirect_uri: Option<&str>) -> Result<Self, AuthError> {
        let configured = redirect_uri
            .and_then(|u| Url::parse(u).ok())
            .filter(|u| u.scheme() == "http" && is_loopback(u));

        if let Some(url) = configured {
            let (v4, v6, _) = bind_dual_stack(url.port().unwrap_or(80)).await?;
            return Ok(Self {
                v4,
                v6,
                path: url.path().to_string(),
                redirect_uri: redirect_uri.map(str::to_string).unwrap_or_else(|| url.to_string()),
            });
        }
        if let Some(other) = redirect_uri {
            tracing::warn!(
                "Redirect URI {} is not a loopback address; using an ephemeral localhost port",
                other
            );
        }

        let (v4, v6, port) = bind_dual_stack(0).await?;
        Ok(Self {
            v4,
            v6,
            redirect_uri: format!("http://localhost:{}", port),
            path: "/".to_string(),
        })
    }

    pub fn redirect_uri(&self) -> &str {
        &self.redirect_uri
    }

    /// Wait for the redirect and return it as an absolute URL.
    pub async fn wait_for_redirect(self, timeout: Duration) -> Result<String, AuthError> {
        tokio::time::timeout(timeout, self.accept_redirect())
            .await
            .map_err(|_| AuthError::Timeout)?
    }

    async fn accept(&self) -> io::Result<(TcpStream, SocketAddr)> {
        match (&self.v4, &self.v6) {
            (Some(v4), Some(v6)) => tokio::select! {
                accepted = v4.accept() => accepted,
                accepted = v6.accept() => accepted,
            },
            (Some(listener), None) | (None, Some(listener)) => listener.accept().await,
            (None, None) => Err(io::Error::from(io::ErrorKind::NotConnected)),
        }
    }

    /// Serve connections concurrently until one of them is the redirect.
    async fn accept_redirect(&self) -> Result<String, AuthError> {
        let mut connections = JoinSet::new();
        loop {
            tokio::select! {
                accepted = self.accept() => {
                    let (stream, peer) = accepted?;
                    tracing::debug!("Loopback connection from {}", peer);
                    let path = self.path.clone();
                    connections.spawn(async move {
                        match tokio::time::timeout(
                            REQUEST_READ_TIMEOUT,
                            handle_connection(stream, &path),
                        )
                        .await
                        {
                            Ok(Ok(target)) => target,
                            Ok(Err(e)) => {
                                tracing::debug!("Loopback connection from {} failed: {}", peer, e);
                                None
                            }
                            Err(_) => {
                                tracing::debug!("Loopback connection from {} sent no request", peer);
                                None
                            }
                        }
                    });
                }
                Some(served) = connections.join_next() => {
                    if let Ok(Some(target)) = served {
                        return Ok(format!("http://localhost{}", target));
                    }
                }
            }
        }
    }
}

/// Answer one request. Returns the request target if it is the redirect to `path`.
async fn handle_connection(mut stream: TcpStream, path: &str) -> Result<Option<String>, AuthError> {
    let (read_half, mut write_half) = stream.split();
    let mut reader = BufReader::new(read_half);
    let mut request_line = String::new();
    reader.read_line(&mut request_line).await?;
    // Drain headers so closing the socket does not reset the connection.
    let mut header = String::new();
    loop {
        header.clear();
        if reader.read_line(&mut header).await? == 0 || header.trim().is_empty() {
            break;
        }
    }

    // "GET /path?query HTTP/1.1"
    let target = request_line.split_whitespace().nth(1).unwrap_or("/").to_string();
    let is_redirect = target.split('?').next() == Some(path) && target.contains('?');

    let response = if is_redirect {
        format!(
            "HTTP/1.1 200 OK\r\nContent-Type: text/html; charset=utf-8\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
            SUCCESS_PAGE.len(),
            SUCCESS_PAGE
        )
    } else {
        "HTTP/1.1 404 Not Found\r\nContent-Length: 0\r\nConnection: close\r\n\r\n".to_string()
    };
    write_half.write_all(response.as_bytes()).await?;
    write_half.shutdown().await?;

    Ok(is_redirect.then_some(target))
}
