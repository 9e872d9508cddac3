//! Blocking HTTP seam for the catalog and playlist clients

use std::time::Duration;

use thiserror::Error;

/// Status and body of a completed request, including non-2xx ones.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpReply {
    pub status: u16,
    pub body: String,
}

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("request timed out")]
    Timeout,
    #[error("transport error: {0}")]
    Other(String),
}

pub trait HttpTransport {
    fn get(&self, url: &str, bearer: &str, timeout: Duration) -> Result<HttpReply, TransportError>;

    fn post_form(
        &self,
        url: &str,
        authorization: &str,
        form: &[(&str, &str)],
    ) -> Result<HttpReply, TransportError>;

    fn post_json(&self, url: &str, body: &serde_json::Value) -> Result<HttpReply, TransportError>;
}

/// Walks the error chain for an I/O timeout. Connect and read deadlines surface
/// as `TimedOut` or `WouldBlock` depending on the platform.
fn is_timeout(err: &(dyn std::error::Error + 'static)) -> bool {
    let mut current = Some(err);
    while let Some(e) = current {
        if let Some(io) = e.downcast_ref::<std::io::Error>() {
            if matches!(
                io.kind(),
                std::io::ErrorKind::TimedOut | std::io::ErrorKind::WouldBlock
            ) {
                return true;
            }
            // a custom io::Error hides its payload from `source()`
            if let Some(inner) = io.get_ref() {
                if is_timeout(inner) {
                    return true;
                }
            }
        }
        current = e.source();
    }
    false
}

pub struct UreqTransport {
    agent: ureq::Agent,
}

impl Default for UreqTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl UreqTransport {
    pub fn new() -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout_connect(Duration::from_secs(10))
            .timeout_read(Duration::from_secs(30))
            .timeout_write(Duration::from_secs(30))
            .build();
        Self { agent }
    }

    fn finish(result: Result<ureq::Response, ureq::Error>) -> Result<HttpReply, TransportError> {
        match result {
            Ok(response) => Ok(Self::into_reply(response)),
            Err(ureq::Error::Status(_, response)) => Ok(Self::into_reply(response)),
            Err(ureq::Error::Transport(transport)) => {
                if is_timeout(&transport) {
                    Err(TransportError::Timeout)
                } else {
                    Err(TransportError::Other(transport.to_string()))
                }
            }
        }
    }

    fn into_reply(response: ureq::Response) -> HttpReply {
        let status = response.status();
        let body = response.into_string().unwrap_or_default();
        HttpReply { status, body }
    }
}

impl HttpTransport for UreqTransport {
    fn get(&self, url: &str, bearer: &str, timeout: Duration) -> Result<HttpReply, TransportError> {
        let result = self
            .agent
            .get(url)
            .set("Authorization", &format!("Bearer {bearer}"))
            .set("Accept", "application/vnd.api+json")
            .timeout(timeout)
            .call();
        Self::finish(result)
    }

    fn post_form(
        &self,
        url: &str,
        authorization: &str,
        form: &[(&str, &str)],
    ) -> Result<HttpReply, TransportError> {
        let result = self
            .agent
            .post(url)
            .set("Authorization", authorization)
            .send_form(form);
        Self::finish(result)
    }

    fn post_json(&self, url: &str, body: &serde_json::Value) -> Result<HttpReply, TransportError> {
        let result = self
            .agent
            .post(url)
            .set("Content-Type", "application/json")
            .send_json(body);
        Self::finish(result)
    }
}

#[cfg(test)]
pub mod testing {
    use std::{cell::RefCell, collections::VecDeque, time::Duration};

    use super::{HttpReply, HttpTransport, TransportError};

    /// Replays canned replies in order and records requested urls and JSON bodies.
    #[derive(Default)]
    pub struct ScriptedTransport {
        pub replies: RefCell<VecDeque<Result<HttpReply, TransportError>>>,
        pub requests: RefCell<Vec<String>>,
        pub json_bodies: RefCell<Vec<serde_json::Value>>,
    }

    impl ScriptedTransport {
        pub fn new(replies: Vec<Result<HttpReply, TransportError>>) -> Self {
            Self {
                replies: RefCell::new(replies.into()),
                ..Default::default()
            }
        }

        fn next(&self, url: &str) -> Result<HttpReply, TransportError> {
            self.requests.borrow_mut().push(url.to_string());
            self.replies
                .borrow_mut()
                .pop_front()
                .unwrap_or_else(|| Err(TransportError::Other("script exhausted".into())))
        }
    }

    pub fn reply(status: u16, body: &str) -> Result<HttpReply, TransportError> {
        Ok(HttpReply {
            status,
            body: body.to_string(),
        })
    }

    impl HttpTransport for ScriptedTransport {
        fn get(&self, url: &str, _bearer: &str, _timeout: Duration) -> Result<HttpReply, TransportError> {
            self.next(url)
        }

        fn post_form(
            &self,
            url: &str,
            _authorization: &str,
            _form: &[(&str, &str)],
        ) -> Result<HttpReply, TransportError> {
            self.next(url)
        }

        fn post_json(&self, url: &str, body: &serde_json::Value) -> Result<HttpReply, TransportError> {
            self.json_bodies.borrow_mut().push(body.clone());
            self.next(url)
        }
    }
}
