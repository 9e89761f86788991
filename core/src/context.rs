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

use crate::{Error, Result};

/// Context carries the pluggable runtime pieces shared by every request.
///
/// ## Important
///
/// reqstore provides NO default implementations. Any unconfigured component
/// will use a no-op implementation that returns errors when called.
///
/// ## Example
///
/// ```
/// use reqstore_core::Context;
///
/// let ctx = Context::new();
/// // ctx.with_http_send(my_http_client)
/// //    .with_dispatch(my_ui_dispatcher);
/// ```
#[derive(Clone)]
pub struct Context {
    http: Arc<dyn HttpSend>,
    dispatch: Option<Arc<dyn Dispatch>>,
}

impl Debug for Context {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Context")
            .field("http", &self.http)
            .field("dispatch", &self.dispatch)
            .finish()
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::new()
    }
}

impl Context {
    /// Create a new Context with a no-op http sender and no dispatcher.
    pub fn new() -> Self {
        Self {
            http: Arc::new(NoopHttpSend),
            dispatch: None,
        }
    }

    /// Replace the HTTP client implementation.
    pub fn with_http_send(mut self, http: impl HttpSend) -> Self {
        self.http = Arc::new(http);
        self
    }

    /// Deliver completion callbacks through the given execution context.
    pub fn with_dispatch(mut self, dispatch: impl Dispatch) -> Self {
        self.dispatch = Some(Arc::new(dispatch));
        self
    }

    /// Send http request and return the response.
    ///
    /// Any status code is returned as `Ok`; only failures to obtain a
    /// response at all are `Err`.
    #[inline]
    pub async fn http_send(&self, req: http::Request<Bytes>) -> Result<http::Response<Bytes>> {
        self.http.http_send(req).await
    }

    /// Run `task` on the configured execution context, or inline when none
    /// was configured.
    pub fn dispatch(&self, task: Box<dyn FnOnce() + Send>) {
        match &self.dispatch {
            Some(d) => d.dispatch(task),
            None => task(),
        }
    }
}

/// HttpSend issues exactly one HTTP round trip.
///
/// Implementations must return every received response, whatever its status,
/// and report connection level failures as [`ErrorKind::Transport`] carrying
/// the status of any partial response.
///
/// [`ErrorKind::Transport`]: crate::ErrorKind::Transport
#[async_trait::async_trait]
pub trait HttpSend: Debug + Send + Sync + 'static {
    /// Send http request and return the response.
    async fn http_send(&self, req: http::Request<Bytes>) -> Result<http::Response<Bytes>>;
}

/// Dispatch hops a completion callback onto a caller-chosen execution
/// context, such as a UI thread.
///
/// This is a pure hop: implementations must run the task exactly once and
/// must not transform or retry it.
pub trait Dispatch: Debug + Send + Sync + 'static {
    /// Schedule `task` on this execution context.
    fn dispatch(&self, task: Box<dyn FnOnce() + Send>);
}

/// NoopHttpSend is a no-op implementation that always returns an error.
///
/// This is used when no HTTP client is configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopHttpSend;

#[async_trait::async_trait]
impl HttpSend for NoopHttpSend {
    async fn http_send(&self, _req: http::Request<Bytes>) -> Result<http::Response<Bytes>> {
        Err(Error::unexpected(
            "HTTP sending not supported: no HTTP client configured",
        ))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;

    #[derive(Debug, Default)]
    struct RecordingDispatch {
        hops: Arc<Mutex<usize>>,
    }

    impl Dispatch for RecordingDispatch {
        fn dispatch(&self, task: Box<dyn FnOnce() + Send>) {
            *self.hops.lock().unwrap() += 1;
            task();
        }
    }

    #[tokio::test]
    async fn test_noop_http_send() {
        let ctx = Context::new();
        let req = http::Request::get("https://example.com")
            .body(Bytes::new())
            .unwrap();
        let err = ctx.http_send(req).await.unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::Unexpected);
    }

    #[test]
    fn test_dispatch_inline_without_context() {
        let ran = Arc::new(Mutex::new(false));
        let flag = ran.clone();
        Context::new().dispatch(Box::new(move || *flag.lock().unwrap() = true));
        assert!(*ran.lock().unwrap());
    }

    #[test]
    fn test_dispatch_hops_through_context() {
        let hops = Arc::new(Mutex::new(0));
        let ctx = Context::new().with_dispatch(RecordingDispatch { hops: hops.clone() });
        ctx.dispatch(Box::new(|| {}));
        ctx.dispatch(Box::new(|| {}));
        assert_eq!(*hops.lock().unwrap(), 2);
    }
}
