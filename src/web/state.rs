use crate::pipeline::ScrapePipeline;
use crate::storage::SharedStorage;
use std::sync::Arc;

pub struct AppState {
    pub storage: SharedStorage,
    pub pipeline: Arc<ScrapePipeline>,
    pub listing_limit: u32,
}
