use std::sync::{Arc, OnceLock};

use tracing::{debug, warn};

use crate::error::ScanError;

/// A read-only resource built on first use and shared for the rest of the
/// process (OCR engines, word vectors, classifier artifacts).
///
/// `get_or_create` runs the constructor exactly once even when several
/// threads race on the first call; the losers block until the winner is done.
/// Both outcomes are cached: `Ok(None)` means "not configured", `Err` means
/// the artifacts were present but unusable.
pub(crate) struct LazyResource<T> {
    label: &'static str,
    cell: OnceLock<Result<Option<Arc<T>>, ScanError>>,
}

impl<T> LazyResource<T> {
    pub(crate) const fn new(label: &'static str) -> Self {
        Self {
            label,
            cell: OnceLock::new(),
        }
    }

    /// A resource that is already initialised, used to inject test doubles.
    pub(crate) fn ready(label: &'static str, value: T) -> Self {
        let cell = OnceLock::new();
        let _ = cell.set(Ok(Some(Arc::new(value))));
        Self { label, cell }
    }

    pub(crate) fn get_or_create<F>(&self, create: F) -> Result<Option<Arc<T>>, ScanError>
    where
        F: FnOnce() -> Result<Option<T>, ScanError>,
    {
        self.cell
            .get_or_init(|| {
                debug!("initialising {}", self.label);
                match create() {
                    Ok(Some(value)) => Ok(Some(Arc::new(value))),
                    Ok(None) => {
                        debug!("{} not configured", self.label);
                        Ok(None)
                    }
                    Err(err) => {
                        warn!("{} unavailable: {}", self.label, err);
                        Err(err)
                    }
                }
            })
            .clone()
    }

    #[cfg(test)]
    pub(crate) fn is_initialised(&self) -> bool {
        self.cell.get().is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;

    #[test]
    fn concurrent_first_use_constructs_once() {
        let resource = Arc::new(LazyResource::<String>::new("reader"));
        let constructions = Arc::new(AtomicUsize::new(0));

        let handles = (0..8)
            .map(|_| {
                let resource = Arc::clone(&resource);
                let constructions = Arc::clone(&constructions);
                thread::spawn(move || {
                    resource
                        .get_or_create(|| {
                            constructions.fetch_add(1, Ordering::SeqCst);
                            thread::sleep(std::time::Duration::from_millis(20));
                            Ok(Some("reader".to_string()))
                        })
                        .expect("create")
                })
            })
            .collect::<Vec<_>>();

        for handle in handles {
            let value = handle.join().expect("join").expect("value");
            assert_eq!(value.as_str(), "reader");
        }
        assert_eq!(constructions.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn failures_are_cached() {
        let resource = LazyResource::<u32>::new("classifier");
        let first = resource.get_or_create(|| Err(ScanError::artifact("scaler.json", "corrupt")));
        assert!(first.is_err());
        let second = resource.get_or_create(|| Ok(Some(7)));
        assert_eq!(second, Err(ScanError::artifact("scaler.json", "corrupt")));
    }

    #[test]
    fn ready_skips_construction() {
        let resource = LazyResource::ready("embedder", 3u8);
        assert!(resource.is_initialised());
        let value = resource
            .get_or_create(|| panic!("must not construct"))
            .expect("ready");
        assert_eq!(value.as_deref(), Some(&3));
    }
}
