use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusCode {
    Ok,
    BadRequest,
    NotFound,
    MethodNotAllowed,
    InternalServerError,
}

impl StatusCode {
    pub fn code(&self) -> u16 {
        match self {
            StatusCode::Ok => 200,
            StatusCode::BadRequest => 400,
            StatusCode::NotFound => 404,
            StatusCode::MethodNotAllowed => 405,
            StatusCode::InternalServerError => 500,
        }
    }

    pub fn reason(&self) -> &'static str {
        match self {
            StatusCode::Ok => "OK",
            StatusCode::BadRequest => "Bad Request",
            StatusCode::NotFound => "Not Found",
            StatusCode::MethodNotAllowed => "Method Not Allowed",
            StatusCode::InternalServerError => "Internal Server Error",
        }
    }
}

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.code(), self.reason())
    }
}

/// A complete response. The connection is always closed after it is written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub status: StatusCode,
    pub allow: Option<&'static str>,
    pub body: Vec<u8>,
}

impl Response {
    pub fn html(status: StatusCode, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            allow: None,
            body: body.into(),
        }
    }

    pub fn ok(body: impl Into<Vec<u8>>) -> Self {
        Self::html(StatusCode::Ok, body)
    }

    pub fn bad_request(detail: &str) -> Self {
        Self::html(StatusCode::BadRequest, error_page(StatusCode::BadRequest, detail))
    }

    pub fn not_found() -> Self {
        Self::html(
            StatusCode::NotFound,
            error_page(StatusCode::NotFound, "Page not found."),
        )
    }

    pub fn method_not_allowed(allow: &'static str) -> Self {
        Self {
            status: StatusCode::MethodNotAllowed,
            allow: Some(allow),
            body: error_page(
                StatusCode::MethodNotAllowed,
                &format!("Allowed methods: {}.", allow),
            )
            .into_bytes(),
        }
    }

    /// Generic failure page; never carries detail about the cause.
    pub fn internal_error() -> Self {
        Self::html(
            StatusCode::InternalServerError,
            error_page(
                StatusCode::InternalServerError,
                "The request could not be processed. Please try again later.",
            ),
        )
    }

    /// Serializes status line, fixed headers and body.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut head = format!(
            "HTTP/1.1 {}\r\nContent-Type: text/html; charset=utf-8\r\nContent-Length: {}\r\nConnection: close\r\n",
            self.status,
            self.body.len()
        );
        if let Some(allow) = self.allow {
            head.push_str(&format!("Allow: {}\r\n", allow));
        }
        head.push_str("\r\n");

        let mut out = head.into_bytes();
        out.extend_from_slice(&self.body);
        out
    }
}

fn error_page(status: StatusCode, detail: &str) -> String {
    format!(
        "<!DOCTYPE html><html><head><title>{status}</title></head><body><h1>{status}</h1><p>{detail}</p></body></html>",
        status = status,
        detail = detail
    )
}
