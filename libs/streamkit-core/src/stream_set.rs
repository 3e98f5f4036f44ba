//! Named container of streams (SPEC_FULL.md §4.4).

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::stream::{Stream, StreamDescription};

struct StreamSetInner {
    uri: String,
    default_slot_count: usize,
    streams: Mutex<HashMap<StreamDescription, Stream>>,
}

/// A mapping from (type, subtype) to [`Stream`], unique per set. Owns its streams.
#[derive(Clone)]
pub struct StreamSet(pub(crate) Arc<StreamSetInner>);

impl StreamSet {
    pub(crate) fn new(uri: impl Into<String>, default_slot_count: usize) -> Self {
        Self(Arc::new(StreamSetInner {
            uri: uri.into(),
            default_slot_count,
            streams: Mutex::new(HashMap::new()),
        }))
    }

    pub fn uri(&self) -> &str {
        &self.0.uri
    }

    pub(crate) fn ptr_eq(a: &StreamSet, b: &StreamSet) -> bool {
        Arc::ptr_eq(&a.0, &b.0)
    }

    pub fn find_by_type_subtype(&self, description: StreamDescription) -> Option<Stream> {
        self.0.streams.lock().get(&description).cloned()
    }

    /// Registers a stream with no producer callbacks. A connection to it is
    /// valid but receives no frames until `create_stream` promotes it.
    pub fn create_placeholder(&self, description: StreamDescription) -> Stream {
        let mut streams = self.0.streams.lock();
        streams
            .entry(description)
            .or_insert_with(|| Stream::new_placeholder(description, self.0.default_slot_count))
            .clone()
    }

    /// Creates (or, if a placeholder already exists for `description`,
    /// promotes) a producer stream. At most one Stream exists per
    /// (type, subtype) within a set.
    pub fn create_stream(
        &self,
        description: StreamDescription,
        callbacks: Box<dyn crate::stream::StreamCallbacks>,
    ) -> Stream {
        let mut streams = self.0.streams.lock();
        let stream = streams
            .entry(description)
            .or_insert_with(|| Stream::new_placeholder(description, self.0.default_slot_count))
            .clone();
        stream.promote(callbacks);
        stream
    }

    pub fn destroy_stream(&self, stream: &Stream) {
        self.0.streams.lock().retain(|_, s| !Stream::ptr_eq(s, stream));
    }

    pub fn stream_count(&self) -> usize {
        self.0.streams.lock().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Result;

    struct NoopCallbacks;
    impl crate::stream::StreamCallbacks for NoopCallbacks {
        fn on_set_parameter(&self, _param_id: u32, _bytes: &[u8]) -> Result<()> {
            Ok(())
        }
        fn on_get_parameter(&self, _param_id: u32, _token: u64) -> Result<Option<Vec<u8>>> {
            Ok(Some(Vec::new()))
        }
        fn on_invoke(&self, _cmd_id: u32, _in_bytes: &[u8], _token: u64) -> Result<Option<Vec<u8>>> {
            Ok(Some(Vec::new()))
        }
    }

    #[test]
    fn at_most_one_stream_per_description() {
        let set = StreamSet::new("device/0", 3);
        let desc = StreamDescription::new(1, 0);
        let a = set.create_stream(desc, Box::new(NoopCallbacks));
        let b = set.create_stream(desc, Box::new(NoopCallbacks));
        assert!(Stream::ptr_eq(&a, &b));
        assert_eq!(set.stream_count(), 1);
    }

    #[test]
    fn create_stream_promotes_existing_placeholder_in_place() {
        let set = StreamSet::new("device/0", 3);
        let desc = StreamDescription::new(2, 0);
        let placeholder = set.create_placeholder(desc);
        assert!(placeholder.is_placeholder());
        let promoted = set.create_stream(desc, Box::new(NoopCallbacks));
        assert!(Stream::ptr_eq(&placeholder, &promoted));
        assert!(!placeholder.is_placeholder());
    }
}
