mod auth;
pub mod metrics;
pub mod rpc;
pub mod status;

use std::sync::Arc;

use metrics_exporter_prometheus::PrometheusHandle;

use crate::dispatcher::Dispatcher;

#[derive(Clone)]
pub struct AppState {
    pub dispatcher: Arc<Dispatcher>,
    pub token: Option<String>,
    pub metrics_handle: PrometheusHandle,
}
