// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::fmt;
use std::io::Write;
use std::thread;

use async_trait::async_trait;
use flate2::write::GzEncoder;
use flate2::Compression;
use http::header::CONTENT_ENCODING;
use http::{HeaderValue, Request, Response};
use opentelemetry_http::{Bytes, HttpClient, HttpError};

/// HTTP client for the OTLP exporters that gzip-compresses every outgoing
/// payload and advertises it with a `Content-Encoding: gzip` header.
///
/// The OTLP/HTTP exporter builders take a whole client rather than a
/// compression option, so the content encoding is applied here, in front of
/// the client that actually sends the request.
#[derive(Clone)]
pub(crate) struct GzipHttpClient<C = reqwest::blocking::Client> {
    inner: C,
}

impl GzipHttpClient {
    /// Creates a client backed by a blocking reqwest client, which the
    /// export threads can drive without an async runtime.
    pub(crate) fn new() -> Self {
        // A blocking reqwest client cannot be constructed on an async
        // runtime thread; hop to a short-lived thread so providers can be
        // started from async contexts too.
        let inner = thread::spawn(reqwest::blocking::Client::new)
            .join()
            .unwrap_or_else(|_| reqwest::blocking::Client::new());
        GzipHttpClient { inner }
    }
}

impl<C> fmt::Debug for GzipHttpClient<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GzipHttpClient").finish()
    }
}

fn gzip(payload: &[u8]) -> std::io::Result<Vec<u8>> {
    let mut encoder = GzEncoder::new(
        Vec::with_capacity(payload.len() / 2),
        Compression::default(),
    );
    encoder.write_all(payload)?;
    encoder.finish()
}

#[async_trait]
impl<C: HttpClient> HttpClient for GzipHttpClient<C> {
    async fn send_bytes(&self, request: Request<Bytes>) -> Result<Response<Bytes>, HttpError> {
        let (mut parts, body) = request.into_parts();
        let compressed = gzip(&body)?;
        parts
            .headers
            .insert(CONTENT_ENCODING, HeaderValue::from_static("gzip"));
        self.inner
            .send_bytes(Request::from_parts(parts, Bytes::from(compressed)))
            .await
    }
}
