//! Per-request context — the request plus routing and middleware state.
//!
//! A [`Context`] is created once per request at the head of the middleware
//! pipeline and handed down the chain by value. It carries:
//!
//! - the parsed [`Request`],
//! - [`PathParams`] captured by the matched route (`/leads/:id` → `id`),
//! - a type-erased [`Extensions`] map for per-request state such as the
//!   authenticated session, injected by middleware for downstream handlers.

use std::{
    any::{Any, TypeId},
    collections::HashMap,
};

use crate::Request;

/// Type-erased request extensions map — used to inject per-request state
/// into handlers without requiring handlers to know about each other's types.
#[derive(Default)]
pub struct Extensions {
    map: HashMap<TypeId, Box<dyn Any + Send + Sync>>,
}

impl Extensions {
    /// Create a new empty extensions map
    pub fn new() -> Self {
        Self {
            map: HashMap::new(),
        }
    }

    /// Insert a value, replacing any previous value of the same type
    pub fn insert<T>(&mut self, value: T)
    where
        T: Send + Sync + 'static,
    {
        self.map.insert(TypeId::of::<T>(), Box::new(value));
    }

    /// Get a value by type
    pub fn get<T>(&self) -> Option<&T>
    where
        T: Send + Sync + 'static,
    {
        self.map
            .get(&TypeId::of::<T>())
            .and_then(|value| value.downcast_ref::<T>())
    }

    /// Get a mutable reference to a value by type
    pub fn get_mut<T>(&mut self) -> Option<&mut T>
    where
        T: Send + Sync + 'static,
    {
        self.map
            .get_mut(&TypeId::of::<T>())
            .and_then(|value| value.downcast_mut::<T>())
    }

    /// Remove and return a value by type
    pub fn remove<T>(&mut self) -> Option<T>
    where
        T: Send + Sync + 'static,
    {
        self.map
            .remove(&TypeId::of::<T>())
            .and_then(|value| value.downcast::<T>().ok())
            .map(|value| *value)
    }
}

/// Path parameters extracted from the matched route pattern.
#[derive(Default, Debug, Clone)]
pub struct PathParams {
    map: HashMap<String, String>,
}

impl PathParams {
    /// Create a new empty parameters map
    pub fn new() -> Self {
        Self {
            map: HashMap::new(),
        }
    }

    /// Insert a captured parameter
    pub fn insert(&mut self, key: String, value: String) {
        self.map.insert(key, value);
    }

    /// Get a captured parameter by name
    pub fn get(&self, key: &str) -> Option<&str> {
        self.map.get(key).map(|value| value.as_str())
    }

    /// Returns `true` when no parameters were captured
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

/// Per-request context flowing through the middleware pipeline and into handlers.
pub struct Context {
    request: Request,
    params: PathParams,
    extensions: Extensions,
}

impl Context {
    /// Create a new context from a request, with no path parameters
    pub fn new(request: Request) -> Self {
        Self {
            request,
            params: PathParams::new(),
            extensions: Extensions::new(),
        }
    }

    /// Create a context carrying path parameters from a matched route
    pub fn with_params(request: Request, params: PathParams) -> Self {
        Self {
            request,
            params,
            extensions: Extensions::new(),
        }
    }

    pub fn request(&self) -> &Request {
        &self.request
    }

    pub fn params(&self) -> &PathParams {
        &self.params
    }

    /// Replace the path parameters. Called by the router once a route matches.
    pub fn set_params(&mut self, params: PathParams) {
        self.params = params;
    }

    pub fn extensions(&self) -> &Extensions {
        &self.extensions
    }

    pub fn extensions_mut(&mut self) -> &mut Extensions {
        &mut self.extensions
    }

    /// Deserialize the request body as JSON
    pub fn json<T>(&self) -> Result<T, serde_json::Error>
    where
        T: serde::de::DeserializeOwned,
    {
        let body = self.request.body();
        serde_json::from_slice(body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    fn make_request(raw: &[u8]) -> Request {
        let (req, _) = Request::parse(raw).unwrap();
        req
    }

    #[test]
    fn extensions_store_and_retrieve() {
        #[derive(Debug, PartialEq)]
        struct SessionUser(String);

        let mut ext = Extensions::new();
        ext.insert(SessionUser("u-42".to_owned()));
        assert_eq!(ext.get::<SessionUser>(), Some(&SessionUser("u-42".into())));
        assert_eq!(ext.remove::<SessionUser>(), Some(SessionUser("u-42".into())));
        assert!(ext.get::<SessionUser>().is_none());
    }

    #[test]
    fn params_set_after_route_match() {
        let req = make_request(b"GET /leads/7 HTTP/1.1\r\nHost: crm.local\r\n\r\n");
        let mut ctx = Context::new(req);
        assert!(ctx.params().is_empty());

        let mut params = PathParams::new();
        params.insert("id".to_owned(), "7".to_owned());
        ctx.set_params(params);
        assert_eq!(ctx.params().get("id"), Some("7"));
    }

    #[test]
    fn json_body_deserializes() {
        #[derive(Deserialize)]
        struct NewLead {
            name: String,
        }

        let raw =
            b"POST /leads HTTP/1.1\r\nHost: crm.local\r\nContent-Length: 15\r\n\r\n{\"name\":\"Acme\"}";
        let ctx = Context::new(make_request(raw));
        let lead: NewLead = ctx.json().unwrap();
        assert_eq!(lead.name, "Acme");
    }
}
