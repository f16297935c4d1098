use std::sync::Arc;

use monsync_writer::Writer;

#[derive(Clone)]
pub struct AppState {
    pub writer: Arc<Writer>,
}
