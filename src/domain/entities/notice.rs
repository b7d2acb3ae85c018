use std::time::Duration;

pub const NOTICE_TTL: Duration = Duration::from_secs(5);
pub const UPDATE_FAILED_MESSAGE: &str = "Database update failed.";

/// Single transient notification slot.
///
/// Each `raise` bumps the generation, so a dismissal timer started for an
/// earlier raise cannot hide a newer message.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Notice {
    message: Option<String>,
    generation: u64,
}

impl Notice {
    pub fn raise(&mut self, message: impl Into<String>) -> u64 {
        self.generation += 1;
        self.message = Some(message.into());
        self.generation
    }

    /// Dismisses the notice if `generation` is still the latest raise.
    pub fn expire(&mut self, generation: u64) -> bool {
        if generation != self.generation || self.message.is_none() {
            return false;
        }
        self.message = None;
        true
    }

    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }

    pub fn is_visible(&self) -> bool {
        self.message.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expire_hides_current_notice() {
        let mut notice = Notice::default();
        let generation = notice.raise(UPDATE_FAILED_MESSAGE);

        assert_eq!(notice.message(), Some(UPDATE_FAILED_MESSAGE));
        assert!(notice.expire(generation));
        assert!(!notice.is_visible());
    }

    #[test]
    fn repeat_raise_resets_dismissal() {
        let mut notice = Notice::default();
        let first = notice.raise(UPDATE_FAILED_MESSAGE);
        let second = notice.raise(UPDATE_FAILED_MESSAGE);

        assert!(!notice.expire(first), "stale timer must not dismiss");
        assert!(notice.is_visible());
        assert!(notice.expire(second));
        assert!(!notice.expire(second), "second expire is a no-op");
    }
}
