//! Application state shared across routes

use std::sync::Arc;

use tokio::sync::mpsc;

use crate::config::Config;
use crate::game::{SimInput, SimulationStats};
use crate::ws::hub::ClientHub;

/// Network events buffered ahead of the simulation task
pub const INPUT_QUEUE_CAPACITY: usize = 4096;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    /// Queue drained by the simulation task at the top of each tick
    pub input_tx: mpsc::Sender<SimInput>,
    pub hub: Arc<ClientHub>,
    pub stats: Arc<SimulationStats>,
}

impl AppState {
    /// Build the shared state and the receiving end of the input queue
    pub fn new(config: Config) -> (Self, mpsc::Receiver<SimInput>) {
        let (input_tx, input_rx) = mpsc::channel(INPUT_QUEUE_CAPACITY);

        let state = Self {
            config: Arc::new(config),
            input_tx,
            hub: Arc::new(ClientHub::new()),
            stats: Arc::new(SimulationStats::new()),
        };

        (state, input_rx)
    }
}
