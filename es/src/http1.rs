//! Manual HTTP/1.1 request serialization and response parsing. Enough to
//! speak to a well-behaved origin: status line, headers, and a body
//! delimited by `Content-Length`, `Transfer-Encoding: chunked` (RFC 7230
//! §4.1), or connection close, in that priority order.

use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};

use tunnel_core::envelope::HeaderMap;
use tunnel_core::error::TunnelError;

pub async fn write_request<W>(
    writer: &mut W,
    method: &str,
    target: &str,
    authority: &str,
    headers: &HeaderMap,
    body: Option<&str>,
) -> Result<(), TunnelError>
where
    W: AsyncWrite + Unpin,
{
    let mut out = format!("{method} {target} HTTP/1.1\r\nHost: {authority}\r\n");
    for (name, value) in headers.iter() {
        let lower = name.to_ascii_lowercase();
        if lower == "host" || lower == "content-length" || lower == "connection" {
            continue;
        }
        out.push_str(name);
        out.push_str(": ");
        out.push_str(value);
        out.push_str("\r\n");
    }
    if let Some(body) = body {
        out.push_str(&format!("Content-Length: {}\r\n", body.len()));
    }
    out.push_str("Connection: close\r\n\r\n");
    if let Some(body) = body {
        out.push_str(body);
    }

    writer
        .write_all(out.as_bytes())
        .await
        .map_err(|err| TunnelError::UpstreamIoError(err.to_string()))?;
    writer
        .flush()
        .await
        .map_err(|err| TunnelError::UpstreamIoError(err.to_string()))?;
    Ok(())
}

#[derive(Debug)]
pub struct ParsedResponse {
    pub status: u16,
    pub headers: HeaderMap,
    pub body: String,
}

pub async fn read_response<R>(reader: R) -> Result<ParsedResponse, TunnelError>
where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(reader);

    let status_line = read_line(&mut reader).await?;
    let status = parse_status_line(&status_line)?;

    let mut headers = HeaderMap::new();
    loop {
        let line = read_line(&mut reader).await?;
        if line.is_empty() {
            break;
        }
        let (name, value) = line
            .split_once(':')
            .ok_or_else(|| TunnelError::ResponseMalformed(format!("malformed header line: {line}")))?;
        headers.insert(name.trim().to_string(), value.trim().to_string());
    }

    let body = read_body(&mut reader, &headers).await?;

    Ok(ParsedResponse { status, headers, body })
}

async fn read_line<R: AsyncRead + Unpin>(reader: &mut BufReader<R>) -> Result<String, TunnelError> {
    let mut buf = Vec::new();
    let n = reader
        .read_until(b'\n', &mut buf)
        .await
        .map_err(|err| TunnelError::UpstreamIoError(err.to_string()))?;
    if n == 0 {
        return Err(TunnelError::ResponseMalformed(
            "connection closed before response headers completed".to_string(),
        ));
    }
    while matches!(buf.last(), Some(b'\n') | Some(b'\r')) {
        buf.pop();
    }
    Ok(String::from_utf8_lossy(&buf).into_owned())
}

fn parse_status_line(line: &str) -> Result<u16, TunnelError> {
    let mut parts = line.splitn(3, ' ');
    parts
        .next()
        .ok_or_else(|| TunnelError::ResponseMalformed("empty status line".to_string()))?;
    let status = parts
        .next()
        .ok_or_else(|| TunnelError::ResponseMalformed(format!("malformed status line: {line}")))?;
    status
        .parse()
        .map_err(|_| TunnelError::ResponseMalformed(format!("non-numeric status code: {status}")))
}

async fn read_body<R: AsyncRead + Unpin>(
    reader: &mut BufReader<R>,
    headers: &HeaderMap,
) -> Result<String, TunnelError> {
    let transfer_encoding = headers.get("transfer-encoding").map(|v| v.to_ascii_lowercase());
    if transfer_encoding.as_deref() == Some("chunked") {
        return read_chunked_body(reader).await;
    }

    if let Some(len) = headers.get("content-length") {
        let len: usize = len
            .trim()
            .parse()
            .map_err(|_| TunnelError::ResponseMalformed(format!("invalid content-length: {len}")))?;
        let mut buf = vec![0u8; len];
        reader
            .read_exact(&mut buf)
            .await
            .map_err(|err| TunnelError::UpstreamIoError(err.to_string()))?;
        return Ok(String::from_utf8_lossy(&buf).into_owned());
    }

    let mut buf = Vec::new();
    reader
        .read_to_end(&mut buf)
        .await
        .map_err(|err| TunnelError::UpstreamIoError(err.to_string()))?;
    Ok(String::from_utf8_lossy(&buf).into_owned())
}

async fn read_chunked_body<R: AsyncRead + Unpin>(reader: &mut BufReader<R>) -> Result<String, TunnelError> {
    let mut body = Vec::new();
    loop {
        let size_line = read_line(reader).await?;
        let size_str = size_line.split(';').next().unwrap_or("").trim();
        let size = usize::from_str_radix(size_str, 16)
            .map_err(|_| TunnelError::ResponseMalformed(format!("invalid chunk size: {size_line}")))?;
        if size == 0 {
            loop {
                let trailer = read_line(reader).await?;
                if trailer.is_empty() {
                    break;
                }
            }
            break;
        }
        let mut chunk = vec![0u8; size];
        reader
            .read_exact(&mut chunk)
            .await
            .map_err(|err| TunnelError::UpstreamIoError(err.to_string()))?;
        body.extend_from_slice(&chunk);
        let _ = read_line(reader).await?;
    }
    Ok(String::from_utf8_lossy(&body).into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn parses_content_length_body() {
        let raw = b"HTTP/1.1 200 OK\r\nContent-Type: text/plain\r\nContent-Length: 5\r\n\r\nhello";
        let parsed = read_response(&raw[..]).await.unwrap();
        assert_eq!(parsed.status, 200);
        assert_eq!(parsed.headers.get("content-type").unwrap(), "text/plain");
        assert_eq!(parsed.body, "hello");
    }

    #[tokio::test]
    async fn parses_chunked_body() {
        let raw = b"HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\n\r\n5\r\nhello\r\n6\r\n world\r\n0\r\n\r\n";
        let parsed = read_response(&raw[..]).await.unwrap();
        assert_eq!(parsed.body, "hello world");
    }

    #[tokio::test]
    async fn parses_eof_terminated_body() {
        let raw = b"HTTP/1.1 200 OK\r\nConnection: close\r\n\r\nno length header here";
        let parsed = read_response(&raw[..]).await.unwrap();
        assert_eq!(parsed.body, "no length header here");
    }

    #[tokio::test]
    async fn rejects_malformed_status_line() {
        let raw = b"not a status line\r\n\r\n";
        let err = read_response(&raw[..]).await.unwrap_err();
        assert!(matches!(err, TunnelError::ResponseMalformed(_)));
    }

    #[tokio::test]
    async fn write_request_omits_hop_by_hop_overrides() {
        let mut headers = HeaderMap::new();
        headers.insert("Host".to_string(), "ignored".to_string());
        headers.insert("Accept".to_string(), "application/json".to_string());
        let mut out = Vec::new();
        write_request(&mut out, "GET", "/widgets", "example.com", &headers, None)
            .await
            .unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.starts_with("GET /widgets HTTP/1.1\r\nHost: example.com\r\n"));
        assert!(text.contains("Accept: application/json\r\n"));
        assert!(!text.contains("Host: ignored"));
        assert!(text.ends_with("Connection: close\r\n\r\n"));
    }

    #[tokio::test]
    async fn write_request_includes_port_in_host_for_non_default_authority() {
        let headers = HeaderMap::new();
        let mut out = Vec::new();
        write_request(&mut out, "GET", "/", "example.com:8443", &headers, None)
            .await
            .unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.starts_with("GET / HTTP/1.1\r\nHost: example.com:8443\r\n"));
    }
}
