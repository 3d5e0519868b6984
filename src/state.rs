//! State shared by every connection handler

use crate::broadcaster::RoomHandle;
use crate::config::SharedConfig;
use crate::filter::ContentFilter;

/// Cheap to clone; one copy per connection task
#[derive(Debug, Clone)]
pub struct AppState {
    pub room: RoomHandle,
    pub config: SharedConfig,
    pub filter: ContentFilter,
}

impl AppState {
    pub fn new(room: RoomHandle, config: SharedConfig) -> Self {
        let filter = ContentFilter::new(config.clone());
        Self {
            room,
            config,
            filter,
        }
    }
}
