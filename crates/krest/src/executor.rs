//! Terminal step of the interceptor chain: validate, encode, send with
//! retries, classify.

use std::ops::ControlFlow;
use std::sync::Arc;

use bytes::Bytes;
use http::{HeaderMap, HeaderName, HeaderValue, Method};
use krest_core::retry::{BackoffStrategy, Retried, retry};
use krest_core::RequestContext;
use krest_transport::{Transport, TransportError, TransportRequest, TransportResponse};
use tokio::io::AsyncReadExt;

use crate::body::BodyPlan;
use crate::error::Error;
use crate::middleware::Outcome;
use crate::request::{Headers, RequestData};
use crate::response::Response;

enum AttemptError {
    Transport(TransportError),
    Encoding(String),
}

type Attempt = Result<TransportResponse, AttemptError>;

/// Sends one logical request through the transport.
#[derive(Clone)]
pub(crate) struct Executor {
    transport: Arc<dyn Transport>,
}

impl Executor {
    pub(crate) fn new(transport: Arc<dyn Transport>) -> Self {
        Self { transport }
    }

    pub(crate) async fn execute(&self, ctx: &RequestContext, method: Method, url: String, data: RequestData) -> Outcome {
        let RequestData {
            body,
            headers,
            retry: policy,
            tls,
            follow_redirects,
            stream,
        } = data;

        if let Err(source) = url::Url::parse(&url) {
            return Outcome::err(Error::InvalidUrl { method, url, source });
        }

        let mut header_map = match build_headers(&method, &url, &headers) {
            Ok(map) => map,
            Err(err) => return Outcome::err(err),
        };

        let (backoff, rule) = policy.resolved();

        let mut plan = match BodyPlan::new(body) {
            Ok(plan) => plan,
            Err(err) => {
                return Outcome::err(Error::Encoding {
                    method,
                    url,
                    message: err.to_string(),
                });
            }
        };
        if plan.is_single_use() && backoff.max_attempts() > 1 {
            return Outcome::err(Error::SingleUseBody {
                method,
                url,
                max_attempts: backoff.max_attempts(),
            });
        }
        plan.apply_content_type(&mut header_map);

        if let Some(reason) = ctx.done_reason() {
            return Outcome::err(Error::Transport {
                method,
                url,
                source: reason.into(),
            });
        }

        let Retried {
            value,
            attempts,
            interrupted,
        } = retry(ctx, &backoff, |attempt| {
            let request = TransportRequest {
                method: method.clone(),
                url: url.clone(),
                headers: header_map.clone(),
                body: plan.next_body(),
                tls: tls.clone(),
                follow_redirects,
            };
            let failure = plan.failure();
            let transport = Arc::clone(&self.transport);
            let rule = Arc::clone(&rule);
            let ctx = ctx.clone();

            async move {
                tracing::debug!(attempt, method = %request.method, url = %request.url, "sending attempt");
                let result = transport.send(&ctx, request).await;

                if let Some(message) = failure.message() {
                    return ControlFlow::Break(Err(AttemptError::Encoding(message.to_string())));
                }

                let should_retry = match &result {
                    Ok(response) => rule(Some(response), None),
                    Err(err) => rule(None, Some(err)),
                };
                let result: Attempt = result.map_err(AttemptError::Transport);
                if should_retry {
                    ControlFlow::Continue(result)
                } else {
                    ControlFlow::Break(result)
                }
            }
        })
        .await;

        if let Some(reason) = interrupted {
            tracing::debug!(%method, %url, attempts, %reason, "retries interrupted");
        }

        match value {
            Ok(response) => classify(ctx, method, url, response, stream).await,
            Err(AttemptError::Encoding(message)) => Outcome::err(Error::Encoding { method, url, message }),
            Err(AttemptError::Transport(source)) => {
                tracing::debug!(%method, %url, attempts, error = %source, "transport failed");
                Outcome::err(Error::Transport { method, url, source })
            }
        }
    }
}

fn build_headers(method: &Method, url: &str, headers: &Headers) -> Result<HeaderMap, Error> {
    let invalid = |key: &str, reason: String| Error::InvalidHeader {
        method: method.clone(),
        url: url.to_string(),
        key: key.to_string(),
        reason,
    };

    let mut map = HeaderMap::new();
    for (key, values) in headers {
        let name = HeaderName::from_bytes(key.as_bytes()).map_err(|e| invalid(key, e.to_string()))?;
        for value in values.iter() {
            let value = HeaderValue::from_str(value).map_err(|e| invalid(key, e.to_string()))?;
            map.append(name.clone(), value);
        }
    }
    Ok(map)
}

async fn classify(ctx: &RequestContext, method: Method, url: String, response: TransportResponse, stream: bool) -> Outcome {
    let TransportResponse {
        status,
        headers,
        body: mut reader,
    } = response;
    let success = (200..300).contains(&status);

    if stream && success {
        return Outcome::ok(Response::streaming(status, &headers, Box::pin(ctx.bind_reader(reader))));
    }

    let mut buf = Vec::new();
    let read = match ctx.run(reader.read_to_end(&mut buf)).await {
        Ok(Ok(_)) => Ok(()),
        Ok(Err(err)) => Err(TransportError::Body(err.to_string())),
        Err(reason) => Err(TransportError::from(reason)),
    };
    let body = Bytes::from(buf);

    if let Err(source) = read {
        let response = Response::buffered(status, &headers, body);
        return Outcome::new(response, Some(Error::Transport { method, url, source }));
    }

    tracing::debug!(%method, %url, status, bytes = body.len(), "response received");

    if success {
        return Outcome::ok(Response::buffered(status, &headers, body));
    }

    let error = Error::UnexpectedStatus {
        method,
        url,
        status,
        payload: String::from_utf8_lossy(&body).into_owned(),
    };
    Outcome::new(Response::buffered(status, &headers, body), Some(error))
}
