//! The verb surface as a trait, and a closure-backed mock of it.
//!
//! Code that only needs to make calls can depend on `Arc<dyn Provider>` and
//! receive a [`MockProvider`] in its tests instead of a real [`Client`].

use std::sync::Arc;

use async_trait::async_trait;
use krest_core::RequestContext;

use crate::client::Client;
use crate::middleware::Outcome;
use crate::request::RequestData;

/// Anything that can perform the six verb operations.
#[async_trait]
pub trait Provider: Send + Sync {
    /// `GET url`.
    async fn get(&self, ctx: &RequestContext, url: &str, data: RequestData) -> Outcome;

    /// `POST url`.
    async fn post(&self, ctx: &RequestContext, url: &str, data: RequestData) -> Outcome;

    /// `PUT url`.
    async fn put(&self, ctx: &RequestContext, url: &str, data: RequestData) -> Outcome;

    /// `PATCH url`.
    async fn patch(&self, ctx: &RequestContext, url: &str, data: RequestData) -> Outcome;

    /// `DELETE url`.
    async fn delete(&self, ctx: &RequestContext, url: &str, data: RequestData) -> Outcome;

    /// `OPTIONS url`.
    async fn options(&self, ctx: &RequestContext, url: &str, data: RequestData) -> Outcome;
}

#[async_trait]
impl Provider for Client {
    async fn get(&self, ctx: &RequestContext, url: &str, data: RequestData) -> Outcome {
        Client::get(self, ctx, url, data).await
    }

    async fn post(&self, ctx: &RequestContext, url: &str, data: RequestData) -> Outcome {
        Client::post(self, ctx, url, data).await
    }

    async fn put(&self, ctx: &RequestContext, url: &str, data: RequestData) -> Outcome {
        Client::put(self, ctx, url, data).await
    }

    async fn patch(&self, ctx: &RequestContext, url: &str, data: RequestData) -> Outcome {
        Client::patch(self, ctx, url, data).await
    }

    async fn delete(&self, ctx: &RequestContext, url: &str, data: RequestData) -> Outcome {
        Client::delete(self, ctx, url, data).await
    }

    async fn options(&self, ctx: &RequestContext, url: &str, data: RequestData) -> Outcome {
        Client::options(self, ctx, url, data).await
    }
}

/// Handler installed on a [`MockProvider`] verb.
pub type MockHandler = Arc<dyn Fn(&RequestContext, &str, RequestData) -> Outcome + Send + Sync>;

/// [`Provider`] whose verbs call user-supplied closures.
///
/// Verbs without a handler return an empty successful [`Outcome`].
///
/// ```rust
/// use krest::{MockProvider, Outcome, Provider, RequestContext, RequestData, Response};
///
/// # async fn example() {
/// let mock = MockProvider::new().on_get(|_, url, _| {
///     Outcome::ok(Response::new(200).with_body(format!("fetched {url}")))
/// });
///
/// let outcome = mock.get(&RequestContext::new(), "http://api/items", RequestData::new()).await;
/// assert_eq!(outcome.response.text(), "fetched http://api/items");
/// # }
/// ```
#[derive(Clone, Default)]
pub struct MockProvider {
    get: Option<MockHandler>,
    post: Option<MockHandler>,
    put: Option<MockHandler>,
    patch: Option<MockHandler>,
    delete: Option<MockHandler>,
    options: Option<MockHandler>,
}

macro_rules! handler_setter {
    ($name:ident, $field:ident, $verb:literal) => {
        #[doc = concat!("Handle `", $verb, "` calls with `handler`.")]
        pub fn $name<F>(mut self, handler: F) -> Self
        where
            F: Fn(&RequestContext, &str, RequestData) -> Outcome + Send + Sync + 'static,
        {
            self.$field = Some(Arc::new(handler));
            self
        }
    };
}

impl MockProvider {
    /// Mock with no handlers.
    pub fn new() -> Self {
        Self::default()
    }

    handler_setter!(on_get, get, "GET");
    handler_setter!(on_post, post, "POST");
    handler_setter!(on_put, put, "PUT");
    handler_setter!(on_patch, patch, "PATCH");
    handler_setter!(on_delete, delete, "DELETE");
    handler_setter!(on_options, options, "OPTIONS");
}

fn dispatch(handler: &Option<MockHandler>, ctx: &RequestContext, url: &str, data: RequestData) -> Outcome {
    match handler {
        Some(handler) => handler(ctx, url, data),
        None => Outcome::default(),
    }
}

#[async_trait]
impl Provider for MockProvider {
    async fn get(&self, ctx: &RequestContext, url: &str, data: RequestData) -> Outcome {
        dispatch(&self.get, ctx, url, data)
    }

    async fn post(&self, ctx: &RequestContext, url: &str, data: RequestData) -> Outcome {
        dispatch(&self.post, ctx, url, data)
    }

    async fn put(&self, ctx: &RequestContext, url: &str, data: RequestData) -> Outcome {
        dispatch(&self.put, ctx, url, data)
    }

    async fn patch(&self, ctx: &RequestContext, url: &str, data: RequestData) -> Outcome {
        dispatch(&self.patch, ctx, url, data)
    }

    async fn delete(&self, ctx: &RequestContext, url: &str, data: RequestData) -> Outcome {
        dispatch(&self.delete, ctx, url, data)
    }

    async fn options(&self, ctx: &RequestContext, url: &str, data: RequestData) -> Outcome {
        dispatch(&self.options, ctx, url, data)
    }
}

impl std::fmt::Debug for MockProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockProvider")
            .field("get", &self.get.is_some())
            .field("post", &self.post.is_some())
            .field("put", &self.put.is_some())
            .field("patch", &self.patch.is_some())
            .field("delete", &self.delete.is_some())
            .field("options", &self.options.is_some())
            .finish()
    }
}
