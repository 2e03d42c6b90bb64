use std::sync::{Arc, Mutex};

use actix_web::{http::StatusCode, test, test::TestRequest, App};
use futures::future::BoxFuture;
use relay_indexer::{
    channels::{ChannelError, Publisher},
    test_utils::prepare_env::{prepare_test_env, random_db_path},
    IndexerMetrics,
};

use crate::{
    server::ServerState,
    workers::{ChannelMonitor, Publishers},
};

/// Records every payload it is asked to publish, or fails every call once closed.
#[derive(Default)]
pub struct MockPublisher {
    messages: Mutex<Vec<String>>,
    closed: bool,
}

impl MockPublisher {
    pub fn closed() -> Self {
        Self { closed: true, ..Default::default() }
    }

    pub fn messages(&self) -> Vec<String> {
        self.messages.lock().unwrap().clone()
    }
}

impl Publisher for MockPublisher {
    fn publish(&self, payload: String) -> BoxFuture<'_, Result<(), ChannelError>> {
        Box::pin(async move {
            if self.closed {
                return Err(ChannelError::Closed("mock".into()));
            }
            self.messages.lock().unwrap().push(payload);
            Ok(())
        })
    }
}

/// A server state backed by a fresh database, with `publisher` behind every ingest route.
pub async fn mock_state(publisher: Arc<MockPublisher>) -> ServerState {
    let db = prepare_test_env(&random_db_path()).await;
    let publishers = Publishers { fills: publisher.clone(), spends: publisher.clone(), orders: publisher };
    ServerState { db, publishers, metrics: Arc::new(IndexerMetrics::default()), monitor: ChannelMonitor::default() }
}

pub async fn send_request(state: &ServerState, req: TestRequest) -> (StatusCode, String) {
    let app = App::new().configure(|cfg| state.configure(cfg));
    let service = test::init_service(app).await;
    let res = test::call_service(&service, req.to_request()).await;
    let status = res.status();
    let body = test::read_body(res).await;
    (status, String::from_utf8_lossy(&body).into_owned())
}

pub fn error_message(body: &str) -> String {
    let value: serde_json::Value = serde_json::from_str(body).expect("Error response was not JSON");
    value["error"].as_str().expect("No error field").to_string()
}
