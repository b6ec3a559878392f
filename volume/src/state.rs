use std::sync::Arc;

use crate::fault_injection::FaultInjector;
use crate::replicate::PropagationHandle;
use crate::store::LocalStore;

#[derive(Clone)]
pub struct VolumeState {
    pub node_id: String,
    pub service_name: String,
    pub store: Arc<LocalStore>,
    /// Absent when the node has no peers configured.
    pub propagation: Option<PropagationHandle>,
    pub max_file_size: usize,
    pub fault_injector: Arc<FaultInjector>,
}

impl VolumeState {
    pub fn new(store: Arc<LocalStore>, service_name: impl Into<String>) -> Self {
        Self {
            node_id: store.node_id().to_string(),
            service_name: service_name.into(),
            store,
            propagation: None,
            max_file_size: 1024 * 1024 * 1024,
            fault_injector: Arc::new(FaultInjector::new()),
        }
    }

    pub fn with_propagation(mut self, handle: PropagationHandle) -> Self {
        self.propagation = Some(handle);
        self
    }
}
