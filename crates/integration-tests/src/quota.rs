//! In-process quota backend answering `POST /take`.

use std::{
    collections::HashMap,
    net::SocketAddr,
    sync::{Arc, Mutex},
};

use axum::{Json, Router, extract::State, http::StatusCode, response::IntoResponse, routing::post};
use jiff::Timestamp;
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;

/// Reset time reported by the `tight` and `three` buckets, in epoch seconds.
pub const RESET: u64 = 1_700_003_600;

/// A consumption request as received by the backend.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Take {
    #[serde(rename = "type")]
    pub bucket_type: String,
    pub key: String,
    pub count: u32,
}

#[derive(Debug, Serialize)]
struct TakeResponse {
    limit: u64,
    remaining: i64,
    reset: u64,
    conformant: bool,
}

#[derive(Default)]
struct Buckets {
    takes: Mutex<Vec<Take>>,
    counters: Mutex<HashMap<(String, String), u64>>,
}

/// Mock quota backend with a fixed set of bucket types:
///
/// - `empty`: never conformant, limit 0, resets at 0
/// - `users`: always conformant, limit 1000000 with 999999 remaining, resets in an hour
/// - `tight`: always conformant, limit 10 with 1 remaining
/// - `three`: counts per key, 3 units per window
/// - `failing`: answers with a 500
pub struct QuotaBackend {
    address: SocketAddr,
    buckets: Arc<Buckets>,
}

impl QuotaBackend {
    /// Starts the backend on a random local port.
    pub async fn start() -> Self {
        let buckets = Arc::new(Buckets::default());

        let app = Router::new().route("/take", post(take)).with_state(buckets.clone());

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap();

        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self { address, buckets }
    }

    /// Base URL of the backend.
    pub fn url(&self) -> String {
        format!("http://{}", self.address)
    }

    /// Every consumption received so far, in order.
    pub fn takes(&self) -> Vec<Take> {
        self.buckets.takes.lock().unwrap().clone()
    }
}

async fn take(State(buckets): State<Arc<Buckets>>, Json(take): Json<Take>) -> axum::response::Response {
    buckets.takes.lock().unwrap().push(take.clone());

    let response = match take.bucket_type.as_str() {
        "empty" => TakeResponse {
            limit: 0,
            remaining: 0,
            reset: 0,
            conformant: false,
        },
        "users" => TakeResponse {
            limit: 1_000_000,
            remaining: 999_999,
            reset: Timestamp::now().as_second().unsigned_abs() + 3600,
            conformant: true,
        },
        "tight" => TakeResponse {
            limit: 10,
            remaining: 1,
            reset: RESET,
            conformant: true,
        },
        "three" => {
            let mut counters = buckets.counters.lock().unwrap();
            let used = counters.entry((take.bucket_type.clone(), take.key.clone())).or_default();
            *used += u64::from(take.count);

            TakeResponse {
                limit: 3,
                remaining: (3 - *used as i64).max(0),
                reset: RESET,
                conformant: *used <= 3,
            }
        }
        _ => return (StatusCode::INTERNAL_SERVER_ERROR, "bucket not available").into_response(),
    };

    Json(response).into_response()
}
