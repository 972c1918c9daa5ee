//! A miniature Leadify CRM backend: leads and projects endpoints behind the
//! full middleware stack — request logging, CORS, the permission guard, and
//! the response cache with its background sweep.
//!
//! Run with `cargo run --example crm_server`, then:
//!
//! ```text
//! curl http://127.0.0.1:8080/leads
//! curl http://127.0.0.1:8080/leads            # served from cache
//! curl http://127.0.0.1:8080/leads/1
//! curl -X POST http://127.0.0.1:8080/leads -d '{"name":"Acme"}'
//! ```

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use leadify::cache::{CacheMiddleware, ResponseCache};
use leadify::context::Context;
use leadify::middleware::{LoggerMiddleware, Pipeline};
use leadify::security::{
    AuthError, CorsMiddleware, PermissionResolver, RequirePermission, SessionProvider,
    StaticRoleStore, UserSession,
};
use leadify::{Response, Router, Server, StatusCode};

#[derive(Debug, Clone, Serialize)]
struct Lead {
    id: u32,
    name: String,
    status: &'static str,
}

#[derive(Debug, Deserialize)]
struct NewLead {
    name: String,
}

/// Every request runs as the same demo user; a real deployment would read the
/// session from the request's auth token.
struct DemoSession;

impl SessionProvider for DemoSession {
    fn current_user(
        &self,
    ) -> Pin<Box<dyn Future<Output = Result<Option<UserSession>, AuthError>> + Send + '_>> {
        Box::pin(async { Ok(Some(UserSession::new("u-demo", Some("sales".to_owned())))) })
    }
}

fn sample_leads() -> Vec<Lead> {
    vec![
        Lead {
            id: 1,
            name: "Acme Corp".to_owned(),
            status: "open",
        },
        Lead {
            id: 2,
            name: "Globex".to_owned(),
            status: "won",
        },
    ]
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,leadify=debug".into()),
        )
        .init();

    // Role table: sales can work leads, admin can do anything.
    let roles = StaticRoleStore::new()
        .with_role("sales", ["lead.read", "lead.write"])
        .with_role("admin", ["all"]);
    let resolver = Arc::new(PermissionResolver::new(
        Arc::new(DemoSession),
        Arc::new(roles),
    ));

    // Response cache: 30 s TTL for list endpoints, stock sweep cadence.
    let cache = Arc::new(ResponseCache::new());
    let _sweeper = cache.start_sweep_default();

    let mut router = Router::new();

    router.get("/leads", |_ctx| async {
        Response::json(StatusCode::Ok, &sample_leads())
    });

    router.get("/leads/:id", |ctx: Context| async move {
        let id: Option<u32> = ctx.params().get("id").and_then(|v| v.parse().ok());
        match id.and_then(|id| sample_leads().into_iter().find(|l| l.id == id)) {
            Some(lead) => Response::json(StatusCode::Ok, &lead),
            None => Response::new(StatusCode::NotFound).body("no such lead"),
        }
    });

    router.post("/leads", |ctx: Context| async move {
        match ctx.json::<NewLead>() {
            Ok(new_lead) => {
                let lead = Lead {
                    id: 3,
                    name: new_lead.name,
                    status: "open",
                };
                Response::json(StatusCode::Created, &lead)
            }
            Err(e) => Response::new(StatusCode::UnprocessableEntity).body(format!("bad payload: {e}")),
        }
    });

    // Guard before cache: a cached response must never leak past a permission
    // check.
    let pipeline = Pipeline::new()
        .with(Arc::new(LoggerMiddleware))
        .with(Arc::new(CorsMiddleware::new()))
        .with(Arc::new(RequirePermission::any_of(
            Arc::clone(&resolver),
            ["lead.read", "lead.write"],
        )))
        .with(Arc::new(CacheMiddleware::with_ttl(
            Arc::clone(&cache),
            Duration::from_secs(30),
        )))
        .router(router);

    let server = Server::bind("127.0.0.1:8080").await?;
    println!("leadify demo listening on http://{}", server.local_addr());

    server
        .run(move |req| {
            let pipeline = pipeline.clone();
            async move { pipeline.dispatch(req).await }
        })
        .await?;

    Ok(())
}
