// Licensed to the Apache Software Foundation (ASF) under one
// or more contributor license agreements.  See the NOTICE file
// distributed with this work for additional information
// regarding copyright ownership.  The ASF licenses this file
// to you under the Apache License, Version 2.0 (the
// "License"); you may not use this file except in compliance
// with the License.  You may obtain a copy of the License at
//
//   http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing,
// software distributed under the License is distributed on an
// "AS IS" BASIS, WITHOUT WARRANTIES OR CONDITIONS OF ANY
// KIND, either express or implied.  See the License for the
// specific language governing permissions and limitations
// under the License.
use std::fmt::Debug;
use std::sync::Arc;

use bytes::Bytes;
use http::StatusCode;
use log::{debug, warn};

use crate::service_error::parse_service_error;
use crate::utils::redact_uri;
use crate::{Context, Error, ErrorKind, RequestDescriptor, Result, SignRequest};

/// OperationResult is the single channel through which every outcome of a
/// storage operation is reported, success and failure alike.
///
/// A success always carries a payload and an empty error message; a failure
/// never carries a payload.
#[derive(Debug)]
pub struct OperationResult<T> {
    status: Option<StatusCode>,
    outcome: Result<T>,
}

impl<T> OperationResult<T> {
    /// Build a successful result.
    pub fn success(status: StatusCode, payload: T) -> Self {
        Self {
            status: Some(status),
            outcome: Ok(payload),
        }
    }

    /// Build a failed result, taking the status from the error.
    pub fn failure(err: Error) -> Self {
        Self {
            status: err.status(),
            outcome: Err(err),
        }
    }

    /// Whether the operation succeeded.
    pub fn is_success(&self) -> bool {
        self.outcome.is_ok()
    }

    /// Observed status code, `None` when no response status is available
    /// (transport or deserialization failures).
    pub fn status(&self) -> Option<StatusCode> {
        self.status
    }

    /// Payload of a successful result.
    pub fn payload(&self) -> Option<&T> {
        self.outcome.as_ref().ok()
    }

    /// Error of a failed result.
    pub fn error(&self) -> Option<&Error> {
        self.outcome.as_ref().err()
    }

    /// Human readable error message; empty on success.
    pub fn error_message(&self) -> &str {
        match &self.outcome {
            Ok(_) => "",
            Err(e) => e.message(),
        }
    }

    /// Convert into a plain `Result`.
    pub fn into_result(self) -> Result<T> {
        self.outcome
    }

    /// Map the payload of a successful result.
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> OperationResult<U> {
        OperationResult {
            status: self.status,
            outcome: self.outcome.map(f),
        }
    }
}

impl<T> From<Error> for OperationResult<T> {
    fn from(err: Error) -> Self {
        Self::failure(err)
    }
}

/// RequestPipeline executes exactly one signed request per call and
/// translates the response into an [`OperationResult`].
///
/// The pipeline never retries; see [`crate::retry`] for the policies callers
/// wrap around it.
#[derive(Clone, Debug)]
pub struct RequestPipeline {
    ctx: Context,
    signer: Arc<dyn SignRequest>,
}

impl RequestPipeline {
    /// Create a new pipeline.
    pub fn new(ctx: Context, signer: impl SignRequest) -> Self {
        Self {
            ctx,
            signer: Arc::new(signer),
        }
    }

    /// The context requests are sent through.
    pub fn context(&self) -> &Context {
        &self.ctx
    }

    /// Send the request and map a successful response with `mapper`.
    ///
    /// Mapper failures are reported as [`ErrorKind::Deserialization`] with no
    /// status.
    pub async fn send<T, F>(&self, desc: &RequestDescriptor, mapper: F) -> OperationResult<T>
    where
        F: FnOnce(http::Response<Bytes>) -> anyhow::Result<T>,
    {
        let expected = desc.expected_status();
        let resp = match self.round_trip(desc).await {
            Ok(resp) => resp,
            Err(err) => return OperationResult::failure(err),
        };

        let status = resp.status();
        if status != expected {
            return OperationResult::failure(response_error(status, resp.body()));
        }

        match mapper(resp) {
            Ok(payload) => OperationResult::success(status, payload),
            Err(err) => {
                warn!("failed to map response of {}: {err}", desc.method());
                OperationResult::failure(Error::deserialization(err.to_string()).with_source(err))
            }
        }
    }

    /// Send a request whose success is its only payload.
    pub async fn send_bool(&self, desc: &RequestDescriptor) -> OperationResult<bool> {
        self.send(desc, |_| Ok(true)).await
    }

    /// Send the request and deliver the result to `callback` through the
    /// context's dispatcher, or inline when none is configured.
    pub async fn send_then<T, F, C>(&self, desc: &RequestDescriptor, mapper: F, callback: C)
    where
        T: Send + 'static,
        F: FnOnce(http::Response<Bytes>) -> anyhow::Result<T>,
        C: FnOnce(OperationResult<T>) + Send + 'static,
    {
        let result = self.send(desc, mapper).await;
        self.ctx.dispatch(Box::new(move || callback(result)));
    }

    async fn round_trip(&self, desc: &RequestDescriptor) -> Result<http::Response<Bytes>> {
        let (mut parts, body) = desc.to_request()?.into_parts();
        if desc.is_delegated() {
            self.signer.sign_lite(&self.ctx, &mut parts).await?;
        } else {
            self.signer
                .sign_request(&self.ctx, &mut parts, body.len() as u64)
                .await?;
        }

        debug!("sending {} {}", parts.method, redact_uri(&parts.uri));
        let resp = self
            .ctx
            .http_send(http::Request::from_parts(parts, body))
            .await
            .map_err(transport_error)?;
        debug!("got response status {}", resp.status());
        Ok(resp)
    }
}

/// Classify a response that did not carry the expected status.
fn response_error(status: StatusCode, body: &Bytes) -> Error {
    let (message, code) = match parse_service_error(body) {
        Some(e) => (e.message, e.code),
        None => {
            let text = String::from_utf8_lossy(body).trim().to_string();
            if text.is_empty() {
                (format!("{}: error performing request", status.as_u16()), None)
            } else {
                (text, None)
            }
        }
    };
    warn!("request failed with status {status}: {message}");

    let mut err = if status == StatusCode::PRECONDITION_FAILED {
        Error::precondition_failed(message)
    } else {
        Error::protocol(status, message)
    };
    if let Some(code) = code {
        err = err.with_code(code);
    }
    err
}

/// Errors from the http sender that are not already classified become
/// transport failures, keeping any status the sender recovered.
fn transport_error(err: Error) -> Error {
    match err.kind() {
        ErrorKind::Transport => {
            warn!("transport failure: {err}");
            err
        }
        _ => {
            let status = err.status();
            Error::transport(err.to_string())
                .with_status(status)
                .with_source(err)
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::Mutex;

    use async_trait::async_trait;
    use http::request::Parts;
    use http::{HeaderValue, Method};
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::{Dispatch, HttpSend};

    #[derive(Debug, Default, Clone)]
    struct MockHttpSend {
        requests: Arc<Mutex<Vec<http::Request<Bytes>>>>,
        responses: Arc<Mutex<VecDeque<Result<http::Response<Bytes>>>>>,
    }

    impl MockHttpSend {
        fn respond(self, status: u16, body: &'static str) -> Self {
            let resp = http::Response::builder()
                .status(status)
                .body(Bytes::from_static(body.as_bytes()))
                .unwrap();
            self.responses.lock().unwrap().push_back(Ok(resp));
            self
        }

        fn fail(self, err: Error) -> Self {
            self.responses.lock().unwrap().push_back(Err(err));
            self
        }
    }

    #[async_trait]
    impl HttpSend for MockHttpSend {
        async fn http_send(&self, req: http::Request<Bytes>) -> Result<http::Response<Bytes>> {
            self.requests.lock().unwrap().push(req);
            self.responses
                .lock()
                .unwrap()
                .pop_front()
                .expect("unexpected request")
        }
    }

    #[derive(Debug)]
    struct StampSigner;

    #[async_trait]
    impl SignRequest for StampSigner {
        async fn sign_request(&self, _: &Context, req: &mut Parts, len: u64) -> Result<()> {
            req.headers.insert(
                http::header::AUTHORIZATION,
                HeaderValue::from_str(&format!("signed:{len}"))?,
            );
            Ok(())
        }

        async fn sign_lite(&self, _: &Context, req: &mut Parts) -> Result<()> {
            req.headers.insert("x-lite", HeaderValue::from_static("true"));
            Ok(())
        }
    }

    fn pipeline(http: &MockHttpSend) -> RequestPipeline {
        let _ = env_logger::builder().is_test(true).try_init();
        RequestPipeline::new(Context::new().with_http_send(http.clone()), StampSigner)
    }

    fn put_blob() -> RequestDescriptor {
        RequestDescriptor::builder(Method::PUT, "https://acct.blob.core.windows.net/c")
            .path("b")
            .body(Bytes::from_static(b"0123456789"))
            .expect(StatusCode::CREATED)
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn test_success_maps_payload() {
        let http = MockHttpSend::default().respond(201, "");
        let result = pipeline(&http)
            .send(&put_blob(), |resp| Ok(resp.status().as_u16()))
            .await;

        assert!(result.is_success());
        assert_eq!(result.status(), Some(StatusCode::CREATED));
        assert_eq!(result.payload(), Some(&201));
        assert_eq!(result.error_message(), "");

        let requests = http.requests.lock().unwrap();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].headers()["authorization"], "signed:10");
        assert_eq!(requests[0].headers()["content-length"], "10");
    }

    #[tokio::test]
    async fn test_unexpected_status_uses_body_text() {
        let http = MockHttpSend::default().respond(200, "it was fine, really");
        let result = pipeline(&http).send_bool(&put_blob()).await;

        assert!(!result.is_success());
        assert_eq!(result.payload(), None);
        assert_eq!(result.status(), Some(StatusCode::OK));
        assert_eq!(result.error_message(), "it was fine, really");
        assert_eq!(result.error().unwrap().kind(), ErrorKind::Protocol);
    }

    #[tokio::test]
    async fn test_unexpected_status_without_body() {
        let http = MockHttpSend::default().respond(404, "");
        let result = pipeline(&http).send_bool(&put_blob()).await;

        assert_eq!(result.status(), Some(StatusCode::NOT_FOUND));
        assert_eq!(result.error_message(), "404: error performing request");
    }

    #[tokio::test]
    async fn test_structured_error_and_precondition() {
        let http = MockHttpSend::default().respond(
            412,
            "<Error><Code>ConditionNotMet</Code><Message>The condition specified using HTTP conditional header(s) is not met.</Message></Error>",
        );
        let result = pipeline(&http).send_bool(&put_blob()).await;

        let err = result.error().unwrap();
        assert!(err.is_precondition_failed());
        assert_eq!(err.code(), Some("ConditionNotMet"));
        assert_eq!(
            result.error_message(),
            "The condition specified using HTTP conditional header(s) is not met."
        );
    }

    #[tokio::test]
    async fn test_transport_failure() {
        let http = MockHttpSend::default()
            .fail(Error::transport("connection reset by peer"))
            .fail(Error::unexpected("dns error").with_status(Some(StatusCode::BAD_GATEWAY)));
        let p = pipeline(&http);

        let result = p.send_bool(&put_blob()).await;
        assert_eq!(result.status(), None);
        assert_eq!(result.error_message(), "connection reset by peer");
        assert_eq!(result.error().unwrap().kind(), ErrorKind::Transport);

        let result = p.send_bool(&put_blob()).await;
        assert_eq!(result.status(), Some(StatusCode::BAD_GATEWAY));
        assert_eq!(result.error().unwrap().kind(), ErrorKind::Transport);
    }

    #[tokio::test]
    async fn test_mapper_failure_is_deserialization() {
        let http = MockHttpSend::default().respond(201, "not a number");
        let result: OperationResult<u32> = pipeline(&http)
            .send(&put_blob(), |resp| {
                Ok(std::str::from_utf8(resp.body())?.parse::<u32>()?)
            })
            .await;

        assert_eq!(result.status(), None);
        assert_eq!(result.error().unwrap().kind(), ErrorKind::Deserialization);
        assert_eq!(result.error_message(), "invalid digit found in string");
        assert_eq!(http.requests.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_delegated_request_uses_lite_signing() {
        let http = MockHttpSend::default().respond(200, "");
        let desc = RequestDescriptor::builder(Method::GET, "https://acct.blob.core.windows.net/c")
            .signature("se=2030-01-01T00%3A00%3A00Z&sig=abc")
            .build()
            .unwrap();
        assert!(pipeline(&http).send_bool(&desc).await.is_success());

        let requests = http.requests.lock().unwrap();
        assert!(requests[0].headers().get("authorization").is_none());
        assert_eq!(requests[0].headers()["x-lite"], "true");
    }

    #[derive(Default)]
    struct QueueDispatch {
        tasks: Arc<Mutex<Vec<Box<dyn FnOnce() + Send>>>>,
    }

    impl std::fmt::Debug for QueueDispatch {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            f.debug_struct("QueueDispatch")
                .field("pending", &self.tasks.lock().unwrap().len())
                .finish()
        }
    }

    impl Dispatch for QueueDispatch {
        fn dispatch(&self, task: Box<dyn FnOnce() + Send>) {
            self.tasks.lock().unwrap().push(task);
        }
    }

    #[tokio::test]
    async fn test_send_then_hops_through_dispatcher() {
        let http = MockHttpSend::default().respond(201, "");
        let tasks = Arc::new(Mutex::new(Vec::new()));
        let ctx = Context::new()
            .with_http_send(http.clone())
            .with_dispatch(QueueDispatch {
                tasks: tasks.clone(),
            });
        let p = RequestPipeline::new(ctx, StampSigner);
        assert!(format!("{:?}", p.context()).contains("QueueDispatch { pending: 0 }"));

        let seen = Arc::new(Mutex::new(None));
        let slot = seen.clone();
        p.send_then(&put_blob(), |_| Ok(()), move |r| {
            *slot.lock().unwrap() = Some(r.is_success())
        })
        .await;

        // Nothing runs until the execution context drains its queue.
        assert_eq!(*seen.lock().unwrap(), None);
        let pending: Vec<_> = tasks.lock().unwrap().drain(..).collect();
        assert_eq!(pending.len(), 1);
        for task in pending {
            task();
        }
        assert_eq!(*seen.lock().unwrap(), Some(true));
    }

    #[tokio::test]
    async fn test_send_then_runs_inline_without_dispatcher() {
        let http = MockHttpSend::default().respond(500, "");
        let seen = Arc::new(Mutex::new(None));
        let slot = seen.clone();
        pipeline(&http)
            .send_then(&put_blob(), |_| Ok(()), move |r| {
                *slot.lock().unwrap() = r.status()
            })
            .await;
        assert_eq!(*seen.lock().unwrap(), Some(StatusCode::INTERNAL_SERVER_ERROR));
    }
}
