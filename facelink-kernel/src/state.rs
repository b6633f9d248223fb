use parking_lot::Mutex;
use std::sync::Arc;

// état partagé entre handlers axum (config, map des devices)
pub type Shared<T> = Arc<Mutex<T>>;

pub fn new_state<T>(value: T) -> Shared<T> {
    Arc::new(Mutex::new(value))
}
