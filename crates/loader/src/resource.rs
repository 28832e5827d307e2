//! The resource mediator
//!
//! A [`ResourceReader`] contributes one URI scheme. The mediator caches
//! every read and glob listing indefinitely per normalized URI so that two
//! reads of the same resource within one evaluation always see the same
//! bytes, even if the backing store changes mid-run.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use pkl_rt::{PklError, PklResult};

use crate::security::SecurityManager;

/// A single resource, contributing one URI scheme (e.g. `file`, `https`,
/// `env`). Implementations live outside this core.
pub trait ResourceReader: Send + Sync {
    fn scheme(&self) -> &str;
    fn read(&self, uri: &str) -> PklResult<Option<Vec<u8>>>;
    fn is_globbable(&self) -> bool;
    fn list_elements(&self, uri: &str) -> PklResult<Vec<String>>;
    fn has_element(&self, uri: &str) -> PklResult<bool>;
}

fn normalize(uri: &str) -> String {
    uri.trim_end_matches('/').to_string()
}

#[derive(Clone)]
enum ReadEntry {
    Found(Arc<[u8]>),
    Missing,
    Failed(PklError),
}

#[derive(Clone)]
enum ListEntry {
    Found(Arc<[String]>),
    Failed(PklError),
}

/// A reference-counted handle onto whatever a [`ResourceReader`] opened to
/// answer a request (an open file descriptor, a pooled connection). The
/// core hands out clones; the underlying resource, if the core itself
/// opened it, closes once every clone is dropped.
pub struct ResourceHandle<T> {
    inner: Arc<T>,
}

impl<T> ResourceHandle<T> {
    pub fn new(resource: T) -> Self {
        ResourceHandle { inner: Arc::new(resource) }
    }

    pub fn get(&self) -> &T {
        &self.inner
    }

    pub fn open_count(&self) -> usize {
        Arc::strong_count(&self.inner)
    }
}

impl<T> Clone for ResourceHandle<T> {
    fn clone(&self) -> Self {
        ResourceHandle { inner: self.inner.clone() }
    }
}

pub struct ResourceMediator {
    readers: HashMap<String, Arc<dyn ResourceReader>>,
    reads: Mutex<HashMap<String, ReadEntry>>,
    listings: Mutex<HashMap<String, ListEntry>>,
}

impl ResourceMediator {
    pub fn new(readers: Vec<Arc<dyn ResourceReader>>) -> Self {
        let mut by_scheme = HashMap::new();
        for reader in readers {
            by_scheme.insert(reader.scheme().to_string(), reader);
        }
        ResourceMediator {
            readers: by_scheme,
            reads: Mutex::new(HashMap::new()),
            listings: Mutex::new(HashMap::new()),
        }
    }

    fn scheme_of(uri: &str) -> PklResult<&str> {
        uri.split_once(':')
            .map(|(scheme, _)| scheme)
            .ok_or_else(|| PklError::eval(format!("resource URI `{uri}` has no scheme")))
    }

    fn reader_for(&self, uri: &str) -> PklResult<&Arc<dyn ResourceReader>> {
        let scheme = Self::scheme_of(uri)?;
        self.readers
            .get(scheme)
            .ok_or_else(|| PklError::eval(format!("no resource reader registered for scheme `{scheme}`")))
    }

    /// `read(uri)`, cached per normalized URI.
    pub fn read(&self, uri: &str, security_manager: &dyn SecurityManager) -> PklResult<Option<Arc<[u8]>>> {
        let key = normalize(uri);
        if let Some(entry) = self.reads.lock().unwrap().get(&key) {
            return match entry {
                ReadEntry::Found(bytes) => Ok(Some(bytes.clone())),
                ReadEntry::Missing => Ok(None),
                ReadEntry::Failed(err) => Err(err.clone()),
            };
        }
        security_manager.check_read_resource(uri)?;
        let reader = self.reader_for(uri);
        let result = match reader {
            Ok(reader) => reader.read(uri).map(|payload| payload.map(Arc::<[u8]>::from)),
            Err(err) => Err(err),
        };
        let entry = match &result {
            Ok(Some(bytes)) => ReadEntry::Found(bytes.clone()),
            Ok(None) => ReadEntry::Missing,
            Err(err) => ReadEntry::Failed(err.clone()),
        };
        self.reads.lock().unwrap().insert(key, entry);
        result
    }

    pub fn is_globbable(&self, uri: &str) -> bool {
        self.reader_for(uri).map(|reader| reader.is_globbable()).unwrap_or(false)
    }

    /// `listElements(uri)`, cached per normalized URI. Resolving a glob
    /// import goes through here: the caller expands `glob_pattern` against
    /// the enclosing module's URI, then asks each matched element for its
    /// own `hasElement` to prune non-existent matches.
    pub fn list_elements(&self, uri: &str, security_manager: &dyn SecurityManager) -> PklResult<Arc<[String]>> {
        let key = normalize(uri);
        if let Some(entry) = self.listings.lock().unwrap().get(&key) {
            return match entry {
                ListEntry::Found(elements) => Ok(elements.clone()),
                ListEntry::Failed(err) => Err(err.clone()),
            };
        }
        security_manager.check_read_resource(uri)?;
        let result = self.reader_for(uri).and_then(|reader| reader.list_elements(uri));
        let entry = match &result {
            Ok(elements) => ListEntry::Found(Arc::from(elements.clone())),
            Err(err) => ListEntry::Failed(err.clone()),
        };
        self.listings.lock().unwrap().insert(key, entry);
        result.map(Arc::from)
    }

    pub fn has_element(&self, uri: &str, security_manager: &dyn SecurityManager) -> PklResult<bool> {
        security_manager.check_read_resource(uri)?;
        self.reader_for(uri).and_then(|reader| reader.has_element(uri))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::security::AllowAllSecurityManager;

    struct FakeReader {
        calls: Mutex<usize>,
    }
    impl ResourceReader for FakeReader {
        fn scheme(&self) -> &str {
            "fake"
        }
        fn read(&self, uri: &str) -> PklResult<Option<Vec<u8>>> {
            *self.calls.lock().unwrap() += 1;
            if uri.ends_with("missing.txt") {
                Ok(None)
            } else {
                Ok(Some(b"hello".to_vec()))
            }
        }
        fn is_globbable(&self) -> bool {
            true
        }
        fn list_elements(&self, _uri: &str) -> PklResult<Vec<String>> {
            Ok(vec!["a.pkl".to_string(), "b.pkl".to_string()])
        }
        fn has_element(&self, uri: &str) -> PklResult<bool> {
            Ok(!uri.ends_with("missing.txt"))
        }
    }

    #[test]
    fn reads_are_cached_per_normalized_uri() {
        let reader = Arc::new(FakeReader { calls: Mutex::new(0) });
        let mediator = ResourceMediator::new(vec![reader.clone()]);
        let sm = AllowAllSecurityManager;
        let first = mediator.read("fake://host/data.txt", &sm).unwrap();
        let second = mediator.read("fake://host/data.txt/", &sm).unwrap();
        assert_eq!(first, second);
        assert_eq!(*reader.calls.lock().unwrap(), 1);
    }

    #[test]
    fn missing_resource_reads_as_none_without_error() {
        let reader = Arc::new(FakeReader { calls: Mutex::new(0) });
        let mediator = ResourceMediator::new(vec![reader]);
        let sm = AllowAllSecurityManager;
        assert_eq!(mediator.read("fake://host/missing.txt", &sm).unwrap(), None);
    }

    #[test]
    fn unregistered_scheme_reports_missing_reader() {
        let mediator = ResourceMediator::new(vec![]);
        let sm = AllowAllSecurityManager;
        assert!(mediator.read("unknown://x", &sm).is_err());
    }

    #[test]
    fn resource_handle_refcounts_like_an_open_file() {
        let handle = ResourceHandle::new("payload");
        let clone = handle.clone();
        assert_eq!(handle.open_count(), 2);
        drop(clone);
        assert_eq!(handle.open_count(), 1);
        assert_eq!(*handle.get(), "payload");
    }
}
