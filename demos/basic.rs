//! Minimal tern example: an in-memory products API with health checks and
//! request counters.
//!
//! Run with:
//!   RUST_LOG=info SALES_WEB_ADDRESS=127.0.0.1:8000 cargo run --example basic
//!
//! Try:
//!   curl http://localhost:8000/v1/products
//!   curl http://localhost:8000/v1/products/1
//!   curl http://localhost:8000/v1/products/abc        # 400
//!   curl http://localhost:8000/v1/products/99         # 404
//!   curl -X POST http://localhost:8000/v1/products \
//!        -H 'content-type: application/json' \
//!        -d '{"name":"mug","cost":12,"quantity":4}'
//!   curl http://localhost:8000/v1/health
//!   curl http://localhost:8000/debug/vars

use std::collections::BTreeMap;
use std::process::ExitCode;
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use tern::middleware::{self, metrics::Metrics};
use tern::{BoxFuture, Failure, Handler, Logger, Method, Outcome, Request, ResponseWriter};
use tern::{Router, Server, ServiceConfig, StatusCode, health};
use tracing_subscriber::EnvFilter;

#[derive(Clone, Debug, Serialize)]
struct Product {
    id: u32,
    name: String,
    cost: u32,
    quantity: u32,
}

#[derive(Debug, Deserialize)]
struct NewProduct {
    name: String,
    cost: u32,
    quantity: u32,
}

#[derive(Default)]
struct Store {
    products: Mutex<BTreeMap<u32, Product>>,
}

impl Store {
    fn seeded() -> Self {
        let store = Self::default();
        for (name, cost, quantity) in [("comic books", 50, 42), ("mcdonalds toys", 75, 120)] {
            store.insert(NewProduct { name: name.to_owned(), cost, quantity });
        }
        store
    }

    fn insert(&self, np: NewProduct) -> Product {
        let mut products = self.products.lock().unwrap_or_else(|e| e.into_inner());
        let id = products.keys().next_back().map_or(1, |last| last + 1);
        let product = Product { id, name: np.name, cost: np.cost, quantity: np.quantity };
        products.insert(id, product.clone());
        product
    }
}

/// The three product routes share one store, so they are one handler type
/// dispatching on the route it was registered for.
#[derive(Clone)]
struct Products {
    store: Arc<Store>,
    op: Op,
}

#[derive(Clone, Copy)]
enum Op {
    List,
    Retrieve,
    Create,
}

impl Products {
    fn route(&self, op: Op) -> Self {
        Self { store: Arc::clone(&self.store), op }
    }
}

impl Handler for Products {
    fn call<'a>(&'a self, w: &'a mut ResponseWriter, req: Request) -> BoxFuture<'a, Outcome> {
        Box::pin(async move {
            match self.op {
                Op::List => {
                    let list: Vec<Product> = {
                        let products = self.store.products.lock().unwrap_or_else(|e| e.into_inner());
                        products.values().cloned().collect()
                    };
                    w.respond_json(&list, StatusCode::OK)?;
                }
                Op::Retrieve => {
                    let id: u32 = req
                        .param("id")
                        .unwrap_or_default()
                        .parse()
                        .map_err(|_| Failure::new("ID is not in its proper form", StatusCode::BAD_REQUEST))?;
                    let product = self.store.products.lock().unwrap_or_else(|e| e.into_inner()).get(&id).cloned();
                    let product = product.ok_or_else(|| Failure::new("product not found", StatusCode::NOT_FOUND))?;
                    w.respond_json(&product, StatusCode::OK)?;
                }
                Op::Create => {
                    let np: NewProduct = req
                        .decode()
                        .map_err(|e| Failure::new(format!("decoding new product: {e}"), StatusCode::BAD_REQUEST))?;
                    let product = self.store.insert(np);
                    w.respond_json(&product, StatusCode::CREATED)?;
                }
            }
            Ok(())
        })
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    // Created after the subscriber so the service span is enabled.
    let log = Logger::new("sales-api");

    let config = match ServiceConfig::from_env("SALES") {
        Ok(config) => config,
        Err(e) => {
            tracing::error!(parent: log.span(), error = %e, "loading config");
            return ExitCode::FAILURE;
        }
    };

    let stats = Arc::new(Metrics::default());
    let products = Products { store: Arc::new(Store::seeded()), op: Op::List };

    let app = Router::with_middleware(log.clone(), [
            middleware::logger(log.clone()),
            middleware::errors(log.clone()),
            middleware::metrics(Arc::clone(&stats)),
        ])
        .on(Method::Get,  "/v1/health",        health::liveness)
        .on(Method::Get,  "/v1/products",      products.route(Op::List))
        .on(Method::Post, "/v1/products",      products.route(Op::Create))
        .on(Method::Get,  "/v1/products/{id}", products.route(Op::Retrieve))
        .on(Method::Get,  "/debug/vars",       Metrics::handler(&stats));

    match Server::new(config, log.clone()).run(app).await {
        Ok(stop) => {
            tracing::info!(parent: log.span(), ?stop, "main: completed");
            ExitCode::SUCCESS
        }
        Err(e) => {
            tracing::error!(parent: log.span(), error = %e, "main: server error");
            ExitCode::FAILURE
        }
    }
}
