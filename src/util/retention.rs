use std::num::NonZeroUsize;

/// Configure retention of backups.
///
/// Only the `keep` most recent backups of a job are retained, everything older
/// is up for deletion.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct RetentionConfig {
    /// Defines how many of the newest backups to keep.
    pub keep: NonZeroUsize,
}

impl RetentionConfig {
    pub fn new(keep: NonZeroUsize) -> Self {
        Self { keep }
    }
}

#[derive(Clone, Debug)]
pub struct Retention {
    pub config: RetentionConfig,
    retained: usize,
}

impl From<RetentionConfig> for Retention {
    fn from(config: RetentionConfig) -> Self {
        Self::new(config)
    }
}

impl Retention {
    pub fn new(config: RetentionConfig) -> Self {
        Self {
            config,
            retained: 0,
        }
    }

    /// Returns if the next backup is to be retained.
    ///
    /// Backups have to be fed newest first.
    pub fn retain(&mut self) -> bool {
        let Self { config, retained } = self;

        let keep = *retained < config.keep.get();
        if keep {
            *retained += 1;
        }
        keep
    }

    /// Splits off the entries to delete from `entries`, which are ordered oldest first.
    ///
    /// The returned entries keep their relative (oldest first) order.
    pub fn select_for_deletion<T>(mut self, entries: Vec<T>) -> Vec<T> {
        let mut to_delete: Vec<T> = entries
            .into_iter()
            .rev()
            .filter(|_| !self.retain())
            .collect();
        to_delete.reverse();
        to_delete
    }
}
