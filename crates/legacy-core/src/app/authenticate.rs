//! One-shot OAuth callback listener.
//!
//! # Flow
//! 1. bind an ephemeral port on the loopback interface
//! 2. build the provider's authorization URL for `http://localhost:<port>`
//! 3. wait for the browser redirect and hand it to the email client
//! 4. answer 200 or 500 and return
//!
//! The listener lives in this function's scope and is dropped on every
//! return path. Each connection is read in its own task with a deadline on
//! the whole request head, so browser preconnects that stay silent or stall
//! mid-headers never hold up the real redirect.

use std::net::SocketAddr;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::task::JoinSet;

use crate::domain::{NotifierError, PortError};
use crate::ports::{EmailClient, RedirectRequest};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const MAX_HEADER_LINES: usize = 100;

pub const SUCCESS_BODY: &str = "Authentication successful. You can close this tab now.";
pub const FAILURE_BODY: &str = "Authentication failed. Check the logs for details.";

pub(crate) async fn run<F>(email_client: &dyn EmailClient, on_request_url: F) -> Result<(), NotifierError>
where
    F: FnOnce(SocketAddr, &str) + Send,
{
    let listener = TcpListener::bind(("127.0.0.1", 0)).await.map_err(PortError::from)?;
    let local_addr = listener.local_addr().map_err(PortError::from)?;
    let redirect_uri = format!("http://localhost:{}", local_addr.port());

    let authentication = email_client.build_authentication(&redirect_uri);
    on_request_url(local_addr, &authentication.build_request_url());

    let (tx, mut rx) = mpsc::channel(1);
    let mut readers = JoinSet::new();
    let (mut stream, request) = loop {
        tokio::select! {
            accepted = listener.accept() => {
                let (stream, peer) = accepted.map_err(PortError::from)?;
                readers.spawn(read_connection(stream, peer, tx.clone()));
            }
            Some(received) = rx.recv() => break received,
            Some(_) = readers.join_next(), if !readers.is_empty() => {}
        }
    };
    // remaining connections are abandoned
    readers.abort_all();

    let result = authentication.handle_token_redirect_request(&request).await;
    let (status, body) = match &result {
        Ok(()) => ("200 OK", SUCCESS_BODY),
        Err(err) => {
            tracing::error!(error = %err, "token exchange failed");
            ("500 Internal Server Error", FAILURE_BODY)
        }
    };
    if let Err(err) = write_response(&mut stream, status, body).await {
        tracing::warn!(error = %err, "failed to answer the redirect request");
    }
    result.map_err(NotifierError::from)
}

/// Forwards the connection once a full request head arrived within the deadline.
async fn read_connection(
    mut stream: TcpStream,
    peer: SocketAddr,
    requests: mpsc::Sender<(TcpStream, RedirectRequest)>,
) {
    match tokio::time::timeout(REQUEST_TIMEOUT, read_request(&mut stream)).await {
        Ok(Some(request)) => {
            tracing::debug!(%peer, method = %request.method, "redirect request received");
            let _ = requests.send((stream, request)).await;
        }
        Ok(None) => tracing::debug!(%peer, "connection closed without a request"),
        Err(_) => tracing::debug!(%peer, "connection timed out before completing a request"),
    }
}

/// Reads the request line and headers; `None` if nothing usable arrived.
async fn read_request(stream: &mut TcpStream) -> Option<RedirectRequest> {
    let mut reader = BufReader::new(stream);
    let mut line = String::new();

    match reader.read_line(&mut line).await {
        Ok(n) if n > 0 => {}
        _ => return None,
    }
    let request = RedirectRequest::parse_request_line(line.trim_end())?;

    for _ in 0..MAX_HEADER_LINES {
        let mut header = String::new();
        match reader.read_line(&mut header).await {
            Ok(n) if n > 0 && !header.trim_end().is_empty() => continue,
            Ok(n) if n > 0 => return Some(request),
            _ => return None,
        }
    }
    Some(request)
}

async fn write_response(stream: &mut TcpStream, status: &str, body: &str) -> std::io::Result<()> {
    let response = format!(
        "HTTP/1.1 {status}\r\nContent-Type: text/plain; charset=utf-8\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
        body.len()
    );
    stream.write_all(response.as_bytes()).await?;
    stream.shutdown().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::impls::memory::InMemoryEmailClient;
    use std::sync::Arc;
    use tokio::sync::oneshot;

    async fn start(client: Arc<InMemoryEmailClient>) -> (SocketAddr, String, tokio::task::JoinHandle<Result<(), NotifierError>>) {
        let (tx, rx) = oneshot::channel();
        let handle = tokio::spawn(async move {
            run(client.as_ref(), move |addr, url| {
                let _ = tx.send((addr, url.to_string()));
            })
            .await
        });
        let (addr, url) = rx.await.unwrap();
        (addr, url, handle)
    }

    #[tokio::test]
    async fn redirect_with_code_succeeds() {
        let client = Arc::new(InMemoryEmailClient::new());
        let (addr, url, handle) = start(client.clone()).await;
        assert_eq!(url, format!("memory://authorize?redirect_uri=http://localhost:{}", addr.port()));

        let response = reqwest::get(format!("http://{addr}/?code=abc")).await.unwrap();
        assert_eq!(response.status(), 200);
        assert_eq!(response.text().await.unwrap(), SUCCESS_BODY);

        handle.await.unwrap().unwrap();
        assert_eq!(client.redirects()[0].target, "/?code=abc");
        // listener is gone once the handshake returned
        assert!(TcpStream::connect(addr).await.is_err());
    }

    #[tokio::test]
    async fn handler_error_answers_500_and_fails() {
        let client = Arc::new(InMemoryEmailClient::new());
        let (addr, _, handle) = start(client.clone()).await;

        let response = reqwest::get(format!("http://{addr}/?error=access_denied")).await.unwrap();
        assert_eq!(response.status(), 500);

        let err = handle.await.unwrap().unwrap_err();
        assert!(matches!(err, NotifierError::Port(PortError::Authentication(_))));
        assert!(client.redirects().is_empty());
    }

    #[tokio::test]
    async fn silent_connections_are_skipped() {
        let client = Arc::new(InMemoryEmailClient::new());
        let (addr, _, handle) = start(client.clone()).await;

        drop(TcpStream::connect(addr).await.unwrap());

        let response = reqwest::get(format!("http://{addr}/?code=second")).await.unwrap();
        assert_eq!(response.status(), 200);
        handle.await.unwrap().unwrap();
        assert_eq!(client.redirects().len(), 1);
    }

    #[tokio::test]
    async fn idle_connection_does_not_delay_the_redirect() {
        let client = Arc::new(InMemoryEmailClient::new());
        let (addr, _, handle) = start(client.clone()).await;

        let _idle = TcpStream::connect(addr).await.unwrap();

        let response = tokio::time::timeout(
            Duration::from_secs(5),
            reqwest::get(format!("http://{addr}/?code=abc")),
        )
        .await
        .expect("redirect answered while another connection stays open")
        .unwrap();
        assert_eq!(response.status(), 200);
        handle.await.unwrap().unwrap();
        assert_eq!(client.redirects()[0].target, "/?code=abc");
    }

    #[tokio::test]
    async fn stalled_headers_do_not_win_over_a_complete_request() {
        let client = Arc::new(InMemoryEmailClient::new());
        let (addr, _, handle) = start(client.clone()).await;

        let mut stalled = TcpStream::connect(addr).await.unwrap();
        stalled
            .write_all(b"GET /?code=stalled HTTP/1.1\r\nHost: localhost\r\n")
            .await
            .unwrap();

        let response = tokio::time::timeout(
            Duration::from_secs(5),
            reqwest::get(format!("http://{addr}/?code=real")),
        )
        .await
        .expect("complete request answered while another one stalls")
        .unwrap();
        assert_eq!(response.status(), 200);
        handle.await.unwrap().unwrap();
        assert_eq!(client.redirects().len(), 1);
        assert_eq!(client.redirects()[0].target, "/?code=real");
    }
}
