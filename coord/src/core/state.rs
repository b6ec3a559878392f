use crate::core::coordinator::Coordinator;

#[derive(Clone)]
pub struct CoordinatorState {
    pub coordinator: Coordinator,
    pub max_size: usize,
}
