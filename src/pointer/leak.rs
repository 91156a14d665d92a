//! Pointers and containers still alive at shutdown.

use super::error::Trace;

#[derive(Debug, Clone)]
pub struct LeakedPointer {
    pub url: String,
    pub usage_count: usize,
    pub created: Trace,
}

#[derive(Debug, Clone, Default)]
pub struct LeakReport {
    pub pointers: Vec<LeakedPointer>,
    /// Creation sites of containers never disposed.
    pub containers: Vec<Trace>,
}

impl LeakReport {
    pub fn is_empty(&self) -> bool {
        self.pointers.is_empty() && self.containers.is_empty()
    }

    pub fn len(&self) -> usize {
        self.pointers.len() + self.containers.len()
    }

    /// One `leak` line per leaked object.
    pub fn log(&self) {
        for leaked in &self.pointers {
            crate::log!(
                "leak";
                "pointer {} ({} usage(s)) created at {}",
                leaked.url, leaked.usage_count, leaked.created
            );
        }
        for created in &self.containers {
            crate::log!("leak"; "container created at {}", created);
        }
    }
}
