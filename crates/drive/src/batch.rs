//! `multipart/mixed` batch envelope: one `application/http` part per
//! sub-request out, one embedded HTTP response per part back.

use serde::de::DeserializeOwned;

use crate::error::{BatchError, PartError};

/// One sub-request inside a batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubRequest {
    pub content_id: usize,
    pub path: String,
}

/// A batch of GET sub-requests. Content ids are assigned 1..N in insertion
/// order.
#[derive(Debug, Clone)]
pub struct BatchRequest {
    boundary: String,
    parts: Vec<SubRequest>,
}

impl Default for BatchRequest {
    fn default() -> Self {
        Self::new()
    }
}

impl BatchRequest {
    /// New batch with a fresh random boundary.
    pub fn new() -> Self {
        Self::with_boundary(format!("batch_{}", uuid::Uuid::new_v4().simple()))
    }

    pub fn with_boundary(boundary: impl Into<String>) -> Self {
        Self {
            boundary: boundary.into(),
            parts: Vec::new(),
        }
    }

    /// Queue a GET for `path` and return its content id.
    pub fn get(&mut self, path: impl Into<String>) -> usize {
        let content_id = self.parts.len() + 1;
        self.parts.push(SubRequest {
            content_id,
            path: path.into(),
        });
        content_id
    }

    pub fn boundary(&self) -> &str {
        &self.boundary
    }

    pub fn parts(&self) -> &[SubRequest] {
        &self.parts
    }

    pub fn len(&self) -> usize {
        self.parts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parts.is_empty()
    }

    pub fn content_type(&self) -> String {
        format!("multipart/mixed; boundary={}", self.boundary)
    }

    pub fn encode(&self) -> String {
        let mut body = String::new();
        for part in &self.parts {
            body.push_str(&format!(
                "--{}\r\nContent-Type: application/http\r\nContent-ID: {}\r\n\r\nGET {}\r\n\r\n",
                self.boundary, part.content_id, part.path
            ));
        }
        body.push_str(&format!("--{}--\r\n", self.boundary));
        body
    }
}

/// One embedded HTTP response, matched to its request by `content_id`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubResponse {
    pub content_id: usize,
    pub status: u16,
    pub body: String,
}

impl SubResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Decode the JSON body of a successful sub-response.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, PartError> {
        if !self.is_success() {
            return Err(PartError::Status {
                status: self.status,
                body: self.body.clone(),
            });
        }
        Ok(serde_json::from_str(&self.body)?)
    }
}

/// Extract the boundary parameter from a `Content-Type` header value.
pub fn boundary_from_content_type(content_type: &str) -> Result<String, BatchError> {
    content_type
        .split(';')
        .filter_map(|param| param.split_once('='))
        .find(|(name, _)| name.trim().eq_ignore_ascii_case("boundary"))
        .map(|(_, value)| value.trim().trim_matches('"').to_string())
        .filter(|boundary| !boundary.is_empty())
        .ok_or_else(|| BatchError::MissingBoundary(content_type.to_string()))
}

/// Split a batch response body into parts. Each part decodes on its own;
/// a malformed part does not affect its neighbours. A body that never opens
/// or never closes the declared boundary fails as a whole.
pub fn decode(
    body: &str,
    boundary: &str,
) -> Result<Vec<Result<SubResponse, PartError>>, BatchError> {
    let delimiter = format!("--{boundary}");
    let mut segments = body.split(delimiter.as_str());
    segments.next();

    let mut parts = Vec::new();
    let mut closed = false;
    for segment in segments {
        if segment.starts_with("--") {
            closed = true;
            break;
        }
        let segment = segment.trim_start_matches(['\r', '\n']);
        if segment.trim().is_empty() {
            continue;
        }
        parts.push(decode_part(segment));
    }

    if !closed {
        return Err(BatchError::UnmatchedBoundary(boundary.to_string()));
    }
    Ok(parts)
}

fn decode_part(part: &str) -> Result<SubResponse, PartError> {
    let (headers, inner) = split_head(part).ok_or(PartError::MissingStatusLine)?;
    let content_id = correlation_id(headers).ok_or(PartError::MissingContentId)?;

    let inner = inner.trim_start_matches(['\r', '\n']);
    let (status_line, rest) = inner.split_once('\n').unwrap_or((inner, ""));
    let status = parse_status_line(status_line.trim_end()).ok_or(PartError::MissingStatusLine)?;
    let body = split_head(rest).map(|(_, body)| body).unwrap_or("");

    Ok(SubResponse {
        content_id,
        status,
        body: body.trim().to_string(),
    })
}

/// Split header lines from what follows the first blank line.
fn split_head(text: &str) -> Option<(&str, &str)> {
    if let Some(rest) = text.strip_prefix("\r\n").or_else(|| text.strip_prefix('\n')) {
        return Some(("", rest));
    }
    let crlf = text.find("\r\n\r\n").map(|i| (i, 4));
    let lf = text.find("\n\n").map(|i| (i, 2));
    let (at, len) = match (crlf, lf) {
        (Some(a), Some(b)) => a.min(b),
        (a, b) => a.or(b)?,
    };
    Some((&text[..at], &text[at + len..]))
}

/// `Content-ID: <response-N>` → N.
fn correlation_id(headers: &str) -> Option<usize> {
    headers.lines().find_map(|line| {
        let (name, value) = line.split_once(':')?;
        if !name.trim().eq_ignore_ascii_case("content-id") {
            return None;
        }
        value
            .trim()
            .trim_start_matches('<')
            .trim_end_matches('>')
            .strip_prefix("response-")?
            .parse()
            .ok()
    })
}

/// `HTTP/1.1 200 OK` → 200.
fn parse_status_line(line: &str) -> Option<u16> {
    let mut fields = line.split_whitespace();
    if !fields.next()?.starts_with("HTTP/") {
        return None;
    }
    fields.next()?.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encodes_one_part_per_request() {
        let mut batch = BatchRequest::with_boundary("b0");
        assert_eq!(batch.get("/drive/v3/files/A?fields=id"), 1);
        assert_eq!(batch.get("/drive/v3/files/B?fields=id"), 2);

        let body = batch.encode();
        assert_eq!(
            body,
            "--b0\r\nContent-Type: application/http\r\nContent-ID: 1\r\n\r\n\
             GET /drive/v3/files/A?fields=id\r\n\r\n\
             --b0\r\nContent-Type: application/http\r\nContent-ID: 2\r\n\r\n\
             GET /drive/v3/files/B?fields=id\r\n\r\n\
             --b0--\r\n"
        );
        assert_eq!(batch.content_type(), "multipart/mixed; boundary=b0");
    }

    #[test]
    fn boundaries_are_fresh_per_batch() {
        assert_ne!(BatchRequest::new().boundary(), BatchRequest::new().boundary());
    }

    #[test]
    fn boundary_parsing() {
        assert_eq!(
            boundary_from_content_type("multipart/mixed; boundary=batch_abc").unwrap(),
            "batch_abc"
        );
        assert_eq!(
            boundary_from_content_type("multipart/mixed; charset=utf-8; Boundary=\"q r\"").unwrap(),
            "q r"
        );
        assert!(matches!(
            boundary_from_content_type("application/json"),
            Err(BatchError::MissingBoundary(_))
        ));
    }

    #[test]
    fn decodes_parts_and_isolates_failures() {
        let body = "\r\n--resp\r\n\
            Content-Type: application/http\r\n\
            Content-ID: <response-2>\r\n\r\n\
            HTTP/1.1 200 OK\r\n\
            Content-Type: application/json; charset=UTF-8\r\n\r\n\
            {\"id\": \"x\"}\r\n\
            --resp\r\n\
            Content-Type: application/http\r\n\r\n\
            HTTP/1.1 200 OK\r\n\r\n{}\r\n\
            --resp\r\n\
            Content-Type: application/http\r\n\
            Content-ID: <response-1>\r\n\r\n\
            HTTP/1.1 404 Not Found\r\n\
            Content-Type: application/json\r\n\r\n\
            {\"error\": {\"code\": 404}}\r\n\
            --resp--\r\n";

        let parts = decode(body, "resp").unwrap();
        assert_eq!(parts.len(), 3);

        let first = parts[0].as_ref().unwrap();
        assert_eq!(first.content_id, 2);
        assert_eq!(first.status, 200);
        assert_eq!(first.body, "{\"id\": \"x\"}");

        assert!(matches!(parts[1], Err(PartError::MissingContentId)));

        let third = parts[2].as_ref().unwrap();
        assert_eq!(third.content_id, 1);
        assert!(matches!(
            third.json::<serde_json::Value>(),
            Err(PartError::Status { status: 404, .. })
        ));
    }

    #[test]
    fn tolerates_bare_newlines_and_missing_inner_headers() {
        let body = "--r\nContent-ID: response-7\n\nHTTP/1.1 200 OK\n\n{\"a\":1}\n--r--";
        let parts = decode(body, "r").unwrap();
        let part = parts[0].as_ref().unwrap();
        assert_eq!(part.content_id, 7);
        assert_eq!(part.json::<serde_json::Value>().unwrap()["a"], 1);
    }

    #[test]
    fn missing_status_line_is_a_part_error() {
        let body = "--r\r\nContent-ID: <response-1>\r\n\r\ngarbage\r\n--r--\r\n";
        assert!(matches!(decode(body, "r").unwrap()[0], Err(PartError::MissingStatusLine)));
    }

    #[test]
    fn body_without_declared_boundary_is_rejected() {
        let body = "--other\r\nContent-ID: <response-1>\r\n\r\nHTTP/1.1 200 OK\r\n\r\n{}\r\n--other--\r\n";
        assert!(matches!(decode(body, "declared"), Err(BatchError::UnmatchedBoundary(_))));
    }

    #[test]
    fn unterminated_body_is_rejected() {
        let body = "--r\r\nContent-ID: <response-1>\r\n\r\nHTTP/1.1 200 OK\r\n\r\n{}\r\n";
        assert!(matches!(decode(body, "r"), Err(BatchError::UnmatchedBoundary(_))));
    }

    #[test]
    fn empty_batch_with_closing_delimiter_is_valid() {
        assert!(decode("--r--\r\n", "r").unwrap().is_empty());
    }
}
