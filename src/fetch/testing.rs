use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;
use reqwest::header::HeaderMap;
use reqwest::{Request, Response, Url};

use super::HttpClient;

#[derive(Debug, Clone)]
pub(crate) struct RecordedRequest {
    pub url: Url,
    pub headers: HeaderMap,
}

type Canned = (u16, Vec<(String, String)>, String);

/// Replays queued responses in order and records every request it sees.
#[derive(Default)]
pub(crate) struct MockClient {
    responses: Mutex<VecDeque<Canned>>,
    requests: Mutex<Vec<RecordedRequest>>,
}

impl MockClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_json(&self, status: u16, body: &str) {
        self.push_with_headers(status, &[("content-type", "application/json")], body);
    }

    pub fn push_with_headers(&self, status: u16, headers: &[(&str, &str)], body: &str) {
        let headers = headers
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        self.responses
            .lock()
            .unwrap()
            .push_back((status, headers, body.to_string()));
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl HttpClient for MockClient {
    async fn execute(&self, req: Request) -> reqwest::Result<Response> {
        self.requests.lock().unwrap().push(RecordedRequest {
            url: req.url().clone(),
            headers: req.headers().clone(),
        });

        let (status, headers, body) = self
            .responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| panic!("unexpected request to {}", req.url()));

        let mut builder = http::Response::builder().status(status);
        for (name, value) in &headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        Ok(Response::from(builder.body(body).unwrap()))
    }
}
