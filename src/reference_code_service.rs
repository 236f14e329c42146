use std::sync::Arc;

use chrono::Utc;
use cos_core::{CoreError, ReferenceCode};
use tokio::sync::Mutex;

use crate::error::RuntimeResult;
use crate::sequence_store::SequenceStore;

/// Monotonic, date-scoped, persistable identifier generator (C1).
///
/// `generate` serialises `load -> increment -> save -> emit` behind an
/// internal lock so concurrent callers never observe a torn read of the
/// counter, regardless of what `SequenceStore` does internally.
pub struct ReferenceCodeService {
    store: Arc<dyn SequenceStore>,
    lock: Mutex<()>,
}

impl ReferenceCodeService {
    pub fn new(store: Arc<dyn SequenceStore>) -> Self {
        Self {
            store,
            lock: Mutex::new(()),
        }
    }

    pub async fn generate(&self) -> RuntimeResult<ReferenceCode> {
        let _guard = self.lock.lock().await;
        let today = Utc::now().date_naive();

        // Corrupt or absent persisted state is treated as zeroed for today.
        let next_sequence = match self.store.load().await.ok().flatten() {
            Some((date, sequence)) if date == today => sequence + 1,
            _ => 1,
        };

        if next_sequence > 9999 {
            return Err(CoreError::SequenceExhausted(today).into());
        }

        let code = ReferenceCode::from_parts(today, next_sequence)?;
        self.store.save(today, next_sequence).await?;
        Ok(code)
    }
}
